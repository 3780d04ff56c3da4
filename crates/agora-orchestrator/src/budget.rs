//! Monthly budget enforcement.
//!
//! Budgets are soft: the pre-call check reads the current spend and the
//! post-call charge is an atomic increment in the repository. Calls that pass
//! the check concurrently may push spend slightly past the limit, but no
//! increment is ever lost.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use agora_core::{
    budget_period, AiEvent, Error, EventBus, Result, ScopedConfig, ScopedConfigRepository,
    SpendUpdate,
};

/// Budget check and spend accounting for the resolved config's scope.
#[derive(Clone)]
pub struct BudgetGuard {
    repo: Arc<dyn ScopedConfigRepository>,
    events: EventBus,
}

impl BudgetGuard {
    pub fn new(repo: Arc<dyn ScopedConfigRepository>, events: EventBus) -> Self {
        Self { repo, events }
    }

    /// Fail with [`Error::OverBudget`] when the scope's spend for the
    /// current period has reached its limit.
    ///
    /// Spend is read fresh from the repository; `config` supplies the
    /// scope and is the fallback when the stored record has vanished.
    pub async fn check(&self, config: &ScopedConfig, at: DateTime<Utc>) -> Result<()> {
        let budget = match self.repo.find(&config.scope).await? {
            Some(stored) => stored.budget,
            None => config.budget.clone(),
        };
        let period = budget_period(at);
        if budget.is_exhausted(&period) {
            return Err(Error::OverBudget {
                scope: config.scope.key(),
                spent: budget.spent_in(&period),
                limit: budget.monthly_limit_usd,
            });
        }
        Ok(())
    }

    /// Add `cost` to the scope's monthly spend. Emits a budget alert the
    /// first time spend reaches the alert level in a period.
    pub async fn charge(
        &self,
        config: &ScopedConfig,
        cost: f64,
        at: DateTime<Utc>,
    ) -> Result<Option<SpendUpdate>> {
        if cost <= 0.0 {
            return Ok(None);
        }
        let update = self.repo.record_spend(&config.scope, cost, at).await?;
        debug!(
            scope = %config.scope,
            cost,
            spent = update.after,
            limit = update.limit,
            "Spend recorded"
        );

        if update.alert_due()
            && self.repo.mark_alert_sent(&config.scope, &update.period).await?
        {
            warn!(
                scope = %config.scope,
                spent = update.after,
                limit = update.limit,
                threshold = update.alert_threshold,
                period = %update.period,
                "Budget alert threshold reached"
            );
            self.events.emit(AiEvent::BudgetAlert {
                scope: config.scope.key(),
                spent: update.after,
                limit: update.limit,
                threshold: update.alert_threshold,
                period: update.period.clone(),
            });
        }
        Ok(Some(update))
    }
}

impl std::fmt::Debug for BudgetGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetGuard").finish_non_exhaustive()
    }
}
