//! Resolved votes as they are archived.

use super::state::Vote;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a vote ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum Outcome {
    Passed { yes: usize, no: usize },
    Failed { reason: Failure },
    Canceled,
}

/// Why a vote did not pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Failure {
    /// Not enough ballots.
    Quorum { total: u64, minimum: u64 },
    /// Not enough yes votes among the ballots cast.
    Plurality { yes: usize, no: usize, required: u64 },
    /// A hook or collaborator failed while resolving.
    Rejected { message: String },
}

impl Outcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, Outcome::Passed { .. })
    }

    pub fn failed(reason: Failure) -> Self {
        Outcome::Failed { reason }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Passed { yes, no } => write!(f, "passed ({} yes, {} no)", yes, no),
            Outcome::Failed { reason } => write!(f, "failed: {}", reason),
            Outcome::Canceled => write!(f, "canceled"),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Quorum { total, minimum } => {
                write!(f, "quorum ({} of {} ballots)", total, minimum)
            }
            Failure::Plurality { yes, no, required } => write!(
                f,
                "plurality ({} yes, {} no, {} required)",
                yes, no, required
            ),
            Failure::Rejected { message } => write!(f, "rejected ({})", message),
        }
    }
}

/// A vote that has left the live registry, with its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub vote: Vote,
    pub outcome: Outcome,
    /// Unix seconds when the vote was resolved.
    pub ended: u64,
    /// When a time-limited effect gets reverted, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<u64>,
}
