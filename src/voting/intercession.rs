//! Early conclusion of decisively won votes.

use crate::vote::Vote;

/// Decides whether a live vote can be resolved before its deadline.
///
/// Evaluated on every worker scan while the registry lock is held, so
/// implementations must not block.
pub trait Intercession: Send + Sync {
    fn interceded(&self, vote: &Vote) -> bool;
}

/// Never conclude early.
#[derive(Debug, Clone, Copy, Default)]
pub struct Never;

impl Intercession for Never {
    fn interceded(&self, _vote: &Vote) -> bool {
        false
    }
}

/// Conclude once `intercede.yes` yes votes are in, provided the vote would
/// also pass on plurality and the fixed ballot minimums. `intercede.yes = 0`
/// turns it off.
#[derive(Debug, Clone, Copy, Default)]
pub struct Supermajority;

impl Intercession for Supermajority {
    fn interceded(&self, vote: &Vote) -> bool {
        let policy = vote.policy();
        if policy.intercede_yes == 0 {
            return false;
        }
        let (yes, _) = vote.tally();
        let yes = yes as u64;
        let total = vote.total() as u64;
        yes >= policy.intercede_yes
            && yes >= policy.required(total)
            && total >= policy.min_yes.max(policy.min_ballots)
    }
}
