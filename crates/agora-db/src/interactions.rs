//! Interaction ledger repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use agora_core::{
    Error, Feedback, Interaction, InteractionRepository, InteractionStatus, Result, Scope,
    UsageSummary,
};

use crate::rows::{from_json, to_json};

/// PostgreSQL implementation of InteractionRepository.
pub struct PgInteractionRepository {
    pool: Pool<Postgres>,
}

impl PgInteractionRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InteractionRepository for PgInteractionRepository {
    async fn insert(&self, interaction: &Interaction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ai_interaction (
                request_id, scope_kind, scope_id, operation, provider, model, status,
                cost_usd, tokens_in, tokens_out, latency_ms, cache_hit, record,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(interaction.request_id)
        .bind(interaction.scope.kind.as_str())
        .bind(&interaction.scope.id)
        .bind(interaction.operation.as_str())
        .bind(interaction.provider.map(|p| p.as_str()))
        .bind(interaction.model.as_deref())
        .bind(interaction.status.as_str())
        .bind(interaction.metrics.cost_usd)
        .bind(i64::from(interaction.metrics.tokens_in))
        .bind(i64::from(interaction.metrics.tokens_out))
        .bind(interaction.metrics.latency.total_ms as i64)
        .bind(interaction.metrics.cache_hit)
        .bind(to_json(interaction)?)
        .bind(interaction.created_at)
        .bind(interaction.updated_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn update(&self, interaction: &Interaction) -> Result<()> {
        // Feedback is owned by attach_feedback; keep whatever is stored.
        let result = sqlx::query(
            r#"
            UPDATE ai_interaction SET
                provider = $2,
                model = $3,
                status = $4,
                cost_usd = $5,
                tokens_in = $6,
                tokens_out = $7,
                latency_ms = $8,
                cache_hit = $9,
                record = CASE
                    WHEN record #> '{quality,feedback}' IS NULL THEN $10
                    ELSE jsonb_set($10, '{quality,feedback}', record #> '{quality,feedback}')
                END,
                updated_at = $11
            WHERE request_id = $1
            "#,
        )
        .bind(interaction.request_id)
        .bind(interaction.provider.map(|p| p.as_str()))
        .bind(interaction.model.as_deref())
        .bind(interaction.status.as_str())
        .bind(interaction.metrics.cost_usd)
        .bind(i64::from(interaction.metrics.tokens_in))
        .bind(i64::from(interaction.metrics.tokens_out))
        .bind(interaction.metrics.latency.total_ms as i64)
        .bind(interaction.metrics.cache_hit)
        .bind(to_json(interaction)?)
        .bind(interaction.updated_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!(
                "interaction {}",
                interaction.request_id
            )));
        }
        Ok(())
    }

    async fn get(&self, request_id: Uuid) -> Result<Option<Interaction>> {
        let row = sqlx::query("SELECT record FROM ai_interaction WHERE request_id = $1")
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(|r| from_json(r.get("record"))).transpose()
    }

    async fn attach_feedback(&self, request_id: Uuid, feedback: &Feedback) -> Result<()> {
        let result = sqlx::query(
            "UPDATE ai_interaction
             SET record = jsonb_set(record, '{quality,feedback}', $2, true), updated_at = now()
             WHERE request_id = $1",
        )
        .bind(request_id)
        .bind(to_json(feedback)?)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("interaction {}", request_id)));
        }
        Ok(())
    }

    async fn list_for_scope(&self, scope: &Scope, limit: i64) -> Result<Vec<Interaction>> {
        let rows = sqlx::query(
            "SELECT record FROM ai_interaction
             WHERE scope_kind = $1 AND scope_id = $2
             ORDER BY created_at DESC
             LIMIT $3",
        )
        .bind(scope.kind.as_str())
        .bind(&scope.id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(|r| from_json(r.get("record"))).collect()
    }

    async fn usage_summary(&self, scope: &Scope, since: DateTime<Utc>) -> Result<UsageSummary> {
        let rows = sqlx::query(
            r#"
            SELECT status,
                   COUNT(*)::BIGINT AS n,
                   COALESCE(SUM(cost_usd), 0)::DOUBLE PRECISION AS cost,
                   COALESCE(SUM(tokens_in), 0)::BIGINT AS tokens_in,
                   COALESCE(SUM(tokens_out), 0)::BIGINT AS tokens_out,
                   COALESCE(SUM(latency_ms), 0)::BIGINT AS latency_ms,
                   COUNT(*) FILTER (WHERE cache_hit)::BIGINT AS hits
            FROM ai_interaction
            WHERE scope_kind = $1 AND scope_id = $2 AND created_at >= $3
            GROUP BY status
            "#,
        )
        .bind(scope.kind.as_str())
        .bind(&scope.id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut summary = UsageSummary {
            scope: scope.key(),
            ..Default::default()
        };
        let mut hits = 0i64;
        let mut latency = 0i64;
        for row in &rows {
            let status: String = row.get("status");
            let status = status
                .parse::<InteractionStatus>()
                .map_err(Error::Internal)?;
            let n: i64 = row.get("n");
            summary.by_status.insert(status, n as u64);
            summary.total += n as u64;
            summary.total_cost_usd += row.get::<f64, _>("cost");
            summary.tokens_in += row.get::<i64, _>("tokens_in") as u64;
            summary.tokens_out += row.get::<i64, _>("tokens_out") as u64;
            latency += row.get::<i64, _>("latency_ms");
            hits += row.get::<i64, _>("hits");
        }
        if summary.total > 0 {
            summary.cache_hit_rate = hits as f64 / summary.total as f64;
            summary.avg_latency_ms = latency as f64 / summary.total as f64;
        }

        debug!(
            subsystem = "db",
            component = "interactions",
            op = "usage_summary",
            scope = %scope,
            total = summary.total,
            "Usage summary computed"
        );
        Ok(summary)
    }
}
