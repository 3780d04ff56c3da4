//! Embedding repository implementation (pgvector).

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};

use agora_core::{
    ContentRef, EmbeddingFilter, EmbeddingRecord, EmbeddingRepository, Error, Result,
};

use crate::rows::scope_from_row;

const EMBEDDING_COLUMNS: &str = "id, content_type, content_id, scope_kind, scope_id, model, \
     vector, dimensions, excerpt, indexed, indexed_at, created_at";

/// PostgreSQL implementation of EmbeddingRepository.
pub struct PgEmbeddingRepository {
    pool: Pool<Postgres>,
}

impl PgEmbeddingRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: &PgRow) -> Result<EmbeddingRecord> {
        let vector: Vector = row.get("vector");
        let dimensions: i32 = row.get("dimensions");
        Ok(EmbeddingRecord {
            id: row.get("id"),
            content: ContentRef::new(
                row.get::<String, _>("content_type"),
                row.get::<String, _>("content_id"),
            ),
            scope: scope_from_row(row, "scope_kind", "scope_id")?,
            model: row.get("model"),
            vector: vector.to_vec(),
            dimensions: dimensions as usize,
            excerpt: row.get("excerpt"),
            indexed: row.get("indexed"),
            indexed_at: row.get("indexed_at"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl EmbeddingRepository for PgEmbeddingRepository {
    async fn insert(&self, record: &EmbeddingRecord) -> Result<EmbeddingRecord> {
        record.validate()?;
        let dimensions = i32::try_from(record.dimensions)
            .map_err(|_| Error::InvalidInput("dimensions out of range".to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO ai_embedding (
                id, content_type, content_id, scope_kind, scope_id, model, vector,
                dimensions, excerpt, indexed, indexed_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (content_type, content_id) DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(&record.content.content_type)
        .bind(&record.content.content_id)
        .bind(record.scope.kind.as_str())
        .bind(&record.scope.id)
        .bind(&record.model)
        .bind(Vector::from(record.vector.clone()))
        .bind(dimensions)
        .bind(&record.excerpt)
        .bind(record.indexed)
        .bind(record.indexed_at)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        self.get(&record.content)
            .await?
            .ok_or_else(|| Error::Internal(format!("embedding {} vanished", record.content)))
    }

    async fn get(&self, content: &ContentRef) -> Result<Option<EmbeddingRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM ai_embedding WHERE content_type = $1 AND content_id = $2",
            EMBEDDING_COLUMNS
        ))
        .bind(&content.content_type)
        .bind(&content.content_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn mark_indexed(&self, content: &ContentRef) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE ai_embedding SET indexed = TRUE, indexed_at = COALESCE(indexed_at, now())
             WHERE content_type = $1 AND content_id = $2",
        )
        .bind(&content.content_type)
        .bind(&content.content_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, content: &ContentRef) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM ai_embedding WHERE content_type = $1 AND content_id = $2")
                .bind(&content.content_type)
                .bind(&content.content_id)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn candidates(&self, filter: &EmbeddingFilter) -> Result<Vec<EmbeddingRecord>> {
        let mut clauses = Vec::new();
        let mut binds: Vec<&str> = Vec::new();

        if let Some(content_type) = &filter.content_type {
            binds.push(content_type);
            clauses.push(format!("content_type = ${}", binds.len()));
        }
        if let Some(scope) = &filter.scope {
            binds.push(scope.kind.as_str());
            clauses.push(format!("scope_kind = ${}", binds.len()));
            binds.push(&scope.id);
            clauses.push(format!("scope_id = ${}", binds.len()));
        }
        if let Some(model) = &filter.model {
            binds.push(model);
            clauses.push(format!("model = ${}", binds.len()));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {} FROM ai_embedding {} ORDER BY created_at",
            EMBEDDING_COLUMNS, where_clause
        );

        let mut query = sqlx::query(&sql);
        for value in binds {
            query = query.bind(value);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        rows.iter().map(Self::parse_row).collect()
    }
}
