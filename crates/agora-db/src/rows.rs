//! Row decoding helpers shared by the Postgres repositories.

use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::Row;

use agora_core::{Error, Result, Scope, ScopeKind};

pub(crate) fn scope_from_row(row: &PgRow, kind_col: &str, id_col: &str) -> Result<Scope> {
    let kind: String = row.get(kind_col);
    let kind = kind.parse::<ScopeKind>().map_err(Error::Internal)?;
    Ok(Scope::new(kind, row.get::<String, _>(id_col)))
}

pub(crate) fn from_json<T: serde::de::DeserializeOwned>(value: JsonValue) -> Result<T> {
    serde_json::from_value(value).map_err(Error::from)
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<JsonValue> {
    serde_json::to_value(value).map_err(Error::from)
}
