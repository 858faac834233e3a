//! SPQF - channel governance
//!
//! Members of a chat channel open votes, cast yes/no ballots and have the
//! outcome applied: a configuration change, a kick, a channel mode (possibly
//! reverted later) or just a recorded decision.
//!
//! - [`vote`]: a single vote, its casting rules and pass/fail policy
//! - [`voting`]: the registry of live votes and its resolution worker
//! - [`praetor`]: deadline scheduling and the archive of resolved votes
//! - [`config`]: config documents and the built-in vote defaults
//! - [`chat`]: the collaborator traits the core runs against
//!
//! [`service::Governance`] ties the registry and the scheduler together.

pub mod chat;
pub mod clock;
pub mod config;
pub mod praetor;
pub mod service;
pub mod vote;
pub mod voting;
