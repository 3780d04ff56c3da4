//! Interaction ledger: durable, state-checked records of every AI call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error};
use uuid::Uuid;

use agora_core::{
    Error, Feedback, Interaction, InteractionRepository, InteractionStatus, Result, Scope,
    UsageSummary,
};

/// Ledger over an [`InteractionRepository`].
///
/// Records are only ever moved forward through the interaction state
/// machine. Terminal records are immutable except for feedback.
#[derive(Clone)]
pub struct InteractionLedger {
    repo: Arc<dyn InteractionRepository>,
    unrecorded: Arc<AtomicU64>,
}

/// Attempts at persisting a finished record before giving up.
const FINAL_SAVE_ATTEMPTS: u32 = 2;

impl InteractionLedger {
    pub fn new(repo: Arc<dyn InteractionRepository>) -> Self {
        Self {
            repo,
            unrecorded: Arc::default(),
        }
    }

    /// Calls whose final record could not be persisted.
    pub fn unrecorded(&self) -> u64 {
        self.unrecorded.load(Ordering::Relaxed)
    }

    /// Count a call that left no complete record behind.
    pub fn note_unrecorded(&self) {
        self.unrecorded.fetch_add(1, Ordering::Relaxed);
    }

    /// Persist the finished record, retrying once. Returns whether it was stored;
    /// a lost record is counted in [`Self::unrecorded`].
    pub async fn save_final(&self, interaction: &Interaction) -> bool {
        for _ in 0..FINAL_SAVE_ATTEMPTS {
            if self.save(interaction).await.is_ok() {
                return true;
            }
        }
        self.note_unrecorded();
        error!(
            request_id = %interaction.request_id,
            status = %interaction.status,
            "Interaction record lost after retries"
        );
        false
    }

    /// Persist a freshly created `Pending` record.
    pub async fn open(&self, interaction: &Interaction) -> Result<()> {
        if interaction.status != InteractionStatus::Pending {
            return Err(Error::InvalidInput(format!(
                "new interaction must be pending, got {}",
                interaction.status
            )));
        }
        self.repo.insert(interaction).await?;
        debug!(request_id = %interaction.request_id, "Interaction opened");
        Ok(())
    }

    /// Advance `interaction` and persist it.
    pub async fn transition(
        &self,
        interaction: &mut Interaction,
        next: InteractionStatus,
    ) -> Result<()> {
        interaction.advance(next)?;
        self.save(interaction).await
    }

    /// Persist the record's current fields.
    pub async fn save(&self, interaction: &Interaction) -> Result<()> {
        if let Err(e) = self.repo.update(interaction).await {
            error!(
                request_id = %interaction.request_id,
                status = %interaction.status,
                error = %e,
                "Failed to persist interaction"
            );
            return Err(e);
        }
        Ok(())
    }

    pub async fn get(&self, request_id: Uuid) -> Result<Option<Interaction>> {
        self.repo.get(request_id).await
    }

    /// Attach human feedback once the interaction has finished processing.
    pub async fn attach_feedback(&self, request_id: Uuid, feedback: &Feedback) -> Result<()> {
        let interaction = self
            .repo
            .get(request_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("interaction {}", request_id)))?;

        if matches!(
            interaction.status,
            InteractionStatus::Pending | InteractionStatus::Processing
        ) {
            return Err(Error::InvalidInput(format!(
                "interaction {} is still {}",
                request_id, interaction.status
            )));
        }
        self.repo.attach_feedback(request_id, feedback).await?;
        debug!(request_id = %request_id, rating = feedback.rating, "Feedback attached");
        Ok(())
    }

    pub async fn recent(&self, scope: &Scope, limit: i64) -> Result<Vec<Interaction>> {
        self.repo.list_for_scope(scope, limit).await
    }

    pub async fn usage_summary(&self, scope: &Scope, since: DateTime<Utc>) -> Result<UsageSummary> {
        self.repo.usage_summary(scope, since).await
    }
}

impl std::fmt::Debug for InteractionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionLedger").finish_non_exhaustive()
    }
}
