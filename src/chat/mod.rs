//! Chat collaborators consumed by the voting core.
//!
//! The transport, the channel/user directory, the activity log and the
//! document store all live outside this crate; the traits here are the narrow
//! surface the core relies on.

pub mod doc_store;
pub mod mock;
pub mod traits;

pub use doc_store::JsonDocStore;
pub use mock::MockChat;
pub use traits::{
    ActivityLog, ChannelDirectory, ChatError, ChatResult, Collaborators, ConfigStore, LogFilter,
    Notifier, User,
};
