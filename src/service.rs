//! Wiring for a running governance service.

use crate::chat::Collaborators;
use crate::praetor::{Praetor, PraetorResult, PraetorStore};
use crate::voting::{VoteExpiry, Voting};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// A started registry plus scheduler sharing one set of collaborators.
pub struct Governance {
    voting: Voting,
    praetor: Arc<Praetor>,
}

impl Governance {
    /// Load scheduler state from `store`, then start both workers.
    ///
    /// Fails only if the store cannot be read.
    pub async fn start(
        ctx: Collaborators,
        store: Arc<dyn PraetorStore>,
        poll_interval: Duration,
    ) -> PraetorResult<Self> {
        let praetor = Arc::new(Praetor::new());
        praetor
            .start(store, Arc::new(VoteExpiry::new(ctx.clone())))
            .await?;

        let voting = Voting::new(ctx, praetor.clone());
        voting.start(poll_interval);
        info!(poll_interval = ?poll_interval, "governance started");

        Ok(Self { voting, praetor })
    }

    pub fn voting(&self) -> &Voting {
        &self.voting
    }

    pub fn praetor(&self) -> &Arc<Praetor> {
        &self.praetor
    }

    /// Stop the registry worker first so its last archives reach the store,
    /// then the scheduler.
    pub async fn shutdown(self) {
        self.voting.shutdown().await;
        self.praetor.shutdown().await;
        info!("governance stopped");
    }
}
