//! Scoped configuration repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};

use agora_core::{
    budget_period, Budget, Error, Result, Scope, ScopedConfig, ScopedConfigRepository,
    SpendUpdate,
};

use crate::rows::{from_json, scope_from_row, to_json};

const CONFIG_COLUMNS: &str = "id, scope_kind, scope_id, active, operations, rate_limits, \
     cache_policy, fallback, features, monthly_limit_usd, current_month_spent, \
     alert_threshold, budget_period, alert_sent_for_period, created_at, updated_at";

/// PostgreSQL implementation of ScopedConfigRepository.
pub struct PgScopedConfigRepository {
    pool: Pool<Postgres>,
}

impl PgScopedConfigRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: &PgRow) -> Result<ScopedConfig> {
        Ok(ScopedConfig {
            id: row.get("id"),
            scope: scope_from_row(row, "scope_kind", "scope_id")?,
            active: row.get("active"),
            operations: from_json(row.get("operations"))?,
            rate_limits: from_json(row.get("rate_limits"))?,
            cache: from_json(row.get("cache_policy"))?,
            budget: Budget {
                monthly_limit_usd: row.get("monthly_limit_usd"),
                current_month_spent: row.get("current_month_spent"),
                alert_threshold: row.get("alert_threshold"),
                period: row.get("budget_period"),
                alert_sent_for_period: row.get("alert_sent_for_period"),
            },
            fallback: from_json(row.get("fallback"))?,
            features: from_json(row.get("features"))?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl ScopedConfigRepository for PgScopedConfigRepository {
    async fn find(&self, scope: &Scope) -> Result<Option<ScopedConfig>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM ai_scoped_config WHERE scope_kind = $1 AND scope_id = $2",
            CONFIG_COLUMNS
        ))
        .bind(scope.kind.as_str())
        .bind(&scope.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_row).transpose()
    }

    async fn upsert(&self, config: &ScopedConfig) -> Result<()> {
        config.validate()?;
        sqlx::query(
            r#"
            INSERT INTO ai_scoped_config (
                id, scope_kind, scope_id, active, operations, rate_limits, cache_policy,
                fallback, features, monthly_limit_usd, current_month_spent, alert_threshold,
                budget_period, alert_sent_for_period, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (scope_kind, scope_id) DO UPDATE SET
                active = EXCLUDED.active,
                operations = EXCLUDED.operations,
                rate_limits = EXCLUDED.rate_limits,
                cache_policy = EXCLUDED.cache_policy,
                fallback = EXCLUDED.fallback,
                features = EXCLUDED.features,
                monthly_limit_usd = EXCLUDED.monthly_limit_usd,
                alert_threshold = EXCLUDED.alert_threshold,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(config.id)
        .bind(config.scope.kind.as_str())
        .bind(&config.scope.id)
        .bind(config.active)
        .bind(to_json(&config.operations)?)
        .bind(to_json(&config.rate_limits)?)
        .bind(to_json(&config.cache)?)
        .bind(to_json(&config.fallback)?)
        .bind(to_json(&config.features)?)
        .bind(config.budget.monthly_limit_usd)
        .bind(config.budget.current_month_spent)
        .bind(config.budget.alert_threshold)
        .bind(&config.budget.period)
        .bind(config.budget.alert_sent_for_period)
        .bind(config.created_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn deactivate(&self, scope: &Scope) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE ai_scoped_config SET active = FALSE, updated_at = now()
             WHERE scope_kind = $1 AND scope_id = $2",
        )
        .bind(scope.kind.as_str())
        .bind(&scope.id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<ScopedConfig>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM ai_scoped_config ORDER BY scope_kind, scope_id",
            CONFIG_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::parse_row).collect()
    }

    async fn record_spend(
        &self,
        scope: &Scope,
        amount: f64,
        at: DateTime<Utc>,
    ) -> Result<SpendUpdate> {
        let period = budget_period(at);
        // Single-statement read-modify-write; the row lock serializes
        // concurrent increments on the same scope.
        let row = sqlx::query(
            r#"
            UPDATE ai_scoped_config AS c SET
                current_month_spent =
                    (CASE WHEN c.budget_period = $3 THEN c.current_month_spent ELSE 0 END) + $4,
                alert_sent_for_period =
                    (CASE WHEN c.budget_period = $3 THEN c.alert_sent_for_period ELSE FALSE END),
                budget_period = $3,
                updated_at = now()
            FROM (
                SELECT id, budget_period AS old_period, current_month_spent AS old_spent
                FROM ai_scoped_config
                WHERE scope_kind = $1 AND scope_id = $2
                FOR UPDATE
            ) AS old
            WHERE c.id = old.id
            RETURNING
                (CASE WHEN old.old_period = $3 THEN old.old_spent ELSE 0 END) AS before_spent,
                c.current_month_spent AS after_spent,
                c.monthly_limit_usd,
                c.alert_threshold,
                c.alert_sent_for_period
            "#,
        )
        .bind(scope.kind.as_str())
        .bind(&scope.id)
        .bind(&period)
        .bind(amount)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or_else(|| Error::NotFound(format!("scoped config {}", scope)))?;

        Ok(SpendUpdate {
            before: row.get("before_spent"),
            after: row.get("after_spent"),
            limit: row.get("monthly_limit_usd"),
            alert_threshold: row.get("alert_threshold"),
            period,
            alert_sent_for_period: row.get("alert_sent_for_period"),
        })
    }

    async fn mark_alert_sent(&self, scope: &Scope, period: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE ai_scoped_config SET alert_sent_for_period = TRUE, updated_at = now()
             WHERE scope_kind = $1 AND scope_id = $2
               AND budget_period = $3 AND alert_sent_for_period = FALSE",
        )
        .bind(scope.kind.as_str())
        .bind(&scope.id)
        .bind(period)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() == 1)
    }
}
