//! Chat Collaborator Trait Abstractions
//!
//! The voting core never talks to the chat network directly. Everything it
//! needs from the outside world goes through these traits so the registry,
//! the ballots and the scheduler can be driven entirely by `MockChat` in tests.

use crate::config::ConfigDoc;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Activity type recorded for channel lines (messages, joins, actions).
pub const CHANNEL_ACTIVITY: &str = "CHA";

/// A chat participant as resolved by the caller.
///
/// `acct` is the persistent (services) account; a user without one is not
/// logged in and can neither open nor cast votes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct User {
    pub nick: String,
    pub host: String,
    pub acct: Option<String>,
}

impl User {
    pub fn new(nick: impl Into<String>, host: impl Into<String>, acct: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            host: host.into(),
            acct: Some(acct.into().to_lowercase()),
        }
    }

    /// A user that is connected but not logged in.
    pub fn anonymous(nick: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            host: host.into(),
            acct: None,
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.acct.as_deref().is_some_and(|a| !a.is_empty())
    }

    /// Account name, or `""` when not logged in.
    pub fn acct(&self) -> &str {
        self.acct.as_deref().unwrap_or("")
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.acct {
            Some(acct) => write!(f, "{} ({})", self.nick, acct),
            None => write!(f, "{}", self.nick),
        }
    }
}

/// Query against the activity log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub acct: String,
    /// Inclusive window start (unix seconds).
    pub since: u64,
    /// Inclusive window end (unix seconds).
    pub until: u64,
    /// Activity type, e.g. [`CHANNEL_ACTIVITY`].
    pub kind: String,
}

/// Result type for collaborator operations
pub type ChatResult<T> = Result<T, ChatError>;

/// Collaborator errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChatError {
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Log store error: {0}")]
    LogStore(String),

    #[error("Document store error: {0}")]
    DocStore(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Unauthorized operation: {0}")]
    Unauthorized(String),
}

/// Channel and user directory.
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    /// Access flags held by `acct` in `chan` (one character per flag).
    async fn flags(&self, chan: &str, acct: &str) -> ChatResult<String>;

    /// Number of channel members currently logged in to an account.
    async fn count_logged_in(&self, chan: &str) -> ChatResult<usize>;

    /// Remove `nick` from `chan`.
    async fn kick(&self, chan: &str, nick: &str, reason: &str) -> ChatResult<()>;

    /// Apply a mode delta such as `+m` or `+b *!*@host` to `chan`.
    async fn set_mode(&self, chan: &str, delta: &str) -> ChatResult<()>;
}

/// Channel activity history.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    /// True if at least `threshold` entries in `chan` match `filter`.
    async fn at_least(&self, chan: &str, filter: &LogFilter, threshold: u64) -> ChatResult<bool>;
}

/// Hierarchical document persistence keyed by channel or account name.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Load a document. Unknown keys load as an empty document.
    async fn load(&self, key: &str) -> ChatResult<ConfigDoc>;

    async fn save(&self, key: &str, doc: &ConfigDoc) -> ChatResult<()>;
}

/// Outbound notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_channel(&self, chan: &str, text: &str) -> ChatResult<()>;

    async fn notify_user(&self, nick: &str, text: &str) -> ChatResult<()>;
}

/// Handles to every collaborator the voting core uses.
#[derive(Clone)]
pub struct Collaborators {
    pub directory: Arc<dyn ChannelDirectory>,
    pub logs: Arc<dyn ActivityLog>,
    pub docs: Arc<dyn ConfigStore>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    /// Use one object for every role (e.g. `MockChat`).
    pub fn uniform<T>(chat: Arc<T>) -> Self
    where
        T: ChannelDirectory + ActivityLog + ConfigStore + Notifier + 'static,
    {
        Self {
            directory: chat.clone(),
            logs: chat.clone(),
            docs: chat.clone(),
            notifier: chat,
        }
    }

    /// Best-effort channel notification; failures are logged and dropped.
    pub async fn tell_channel(&self, chan: &str, text: &str) {
        if let Err(e) = self.notifier.notify_channel(chan, text).await {
            tracing::debug!(channel = %chan, "notification dropped: {}", e);
        }
    }

    /// Best-effort private notification; failures are logged and dropped.
    pub async fn tell_user(&self, nick: &str, text: &str) {
        if let Err(e) = self.notifier.notify_user(nick, text).await {
            tracing::debug!(nick = %nick, "notification dropped: {}", e);
        }
    }
}
