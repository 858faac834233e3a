//! The live vote registry and its background resolution.

pub mod expiry;
pub mod intercession;
pub mod registry;

pub use expiry::VoteExpiry;
pub use intercession::{Intercession, Never, Supermajority};
pub use registry::{Voting, DEFAULT_POLL_INTERVAL};
