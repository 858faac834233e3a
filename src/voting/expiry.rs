//! Reverting time-limited vote effects when their deadline comes up.

use crate::chat::Collaborators;
use crate::praetor::{DeadlineHandler, PraetorError, PraetorResult};
use crate::vote::{VoteId, VoteRecord};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

/// Deadline handler that undoes the effect of an archived, passed vote.
pub struct VoteExpiry {
    ctx: Collaborators,
}

impl VoteExpiry {
    pub fn new(ctx: Collaborators) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl DeadlineHandler for VoteExpiry {
    async fn on_deadline(&self, id: VoteId, record: Option<Value>) -> PraetorResult<()> {
        let Some(record) = record else {
            warn!(vote = id, "deadline for a vote with no archived record");
            return Ok(());
        };

        let record: VoteRecord = serde_json::from_value(record)?;
        if !record.outcome.is_passed() {
            return Ok(());
        }

        let chan = record.vote.chan().to_string();
        record
            .vote
            .kind()
            .expire(&chan, &self.ctx)
            .await
            .map_err(|e| PraetorError::Handler {
                id,
                reason: e.to_string(),
            })?;
        info!(vote = id, channel = %chan, "vote effect expired");
        Ok(())
    }
}
