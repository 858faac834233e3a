//! Votes: ballots, kinds, the casting state machine and pass/fail policy.

pub mod ballot;
pub mod error;
pub mod kind;
pub mod policy;
pub mod record;
pub mod state;

pub use ballot::{Ballot, Stat, VoteId};
pub use error::{VoteError, VoteResult};
pub use kind::VoteKind;
pub use policy::Policy;
pub use record::{Failure, Outcome, VoteRecord};
pub use state::{Resolution, Vote};
