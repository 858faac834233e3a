//! Vote errors.
//!
//! Most variants are policy rejections: they are reported back to the person
//! who asked and never take down a worker. Collaborator, configuration and
//! invariant failures are the rest.

use super::ballot::{Ballot, VoteId};
use crate::chat::ChatError;
use crate::config::ConfigError;

/// Result type for vote operations
pub type VoteResult<T> = Result<T, VoteError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VoteError {
    #[error("There is no active vote with that ID (#{0}).")]
    NotFound(VoteId),

    #[error("There are no active votes {0}.")]
    NoneActive(&'static str),

    #[error("There are multiple votes {0}. Specify an ID#.")]
    Ambiguous(&'static str),

    #[error("You must be logged in with services to {0}.")]
    NotLoggedIn(&'static str),

    #[error("You can not cast another vote from this hostname.")]
    HostRepeat,

    #[error("You are not yet enfranchised in this channel.")]
    NotEnfranchised,

    #[error("You have not been active enough to qualify for this vote.")]
    NotQualified,

    #[error("You have already voted {0}.")]
    AlreadyVoted(Ballot),

    #[error("{0}")]
    Ineligible(String),

    #[error("Votes of this type are disabled by the configuration.")]
    Disabled,

    #[error("Too many active votes for this channel.")]
    TooManyActive,

    #[error("Too many active votes started by you on this channel.")]
    TooManyPerUser,

    #[error("You can't cancel a vote by {0}.")]
    NotInitiator(String),

    #[error("You can't cancel after someone else has voted.")]
    CancelAfterVotes,

    #[error("Invalid vote: {0}")]
    Invalid(String),

    #[error("Collaborator error: {0}")]
    Chat(#[from] ChatError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal invariant violated: {0}")]
    Invariant(String),
}

impl VoteError {
    /// True for policy rejections (reported to the caller, state untouched).
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            VoteError::Chat(_) | VoteError::Config(_) | VoteError::Invariant(_)
        )
    }
}
