//! Mock Chat Collaborators for Testing
//!
//! `MockChat` implements every collaborator trait in memory so the voting
//! core can be exercised without a chat network, log database or document
//! store.

use super::traits::*;
use crate::config::ConfigDoc;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// In-memory stand-in for the directory, activity log, document store and
/// notifier.
#[derive(Clone, Default)]
pub struct MockChat {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    flags: HashMap<(String, String), String>,
    logged_in: HashMap<String, usize>,
    activity: Vec<Activity>,
    documents: HashMap<String, ConfigDoc>,
    saved_documents: usize,
    sent_messages: Vec<SentMessage>,
    kicks: Vec<(String, String)>,
    modes: Vec<(String, String)>,
    fail_logs: bool,
    fail_directory: bool,
    fail_delivery: bool,
}

struct Activity {
    chan: String,
    acct: String,
    at: u64,
    kind: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub recipient: Recipient,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recipient {
    Channel(String),
    User(String),
}

impl MockChat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant access flags to an account in a channel.
    pub fn set_flags(&self, chan: &str, acct: &str, flags: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .flags
            .insert((chan.to_string(), acct.to_string()), flags.to_string());
    }

    pub fn set_logged_in(&self, chan: &str, count: usize) {
        let mut state = self.state.lock().unwrap();
        state.logged_in.insert(chan.to_string(), count);
    }

    /// Record `lines` channel-activity entries for `acct` at time `at`.
    pub fn seed_history(&self, chan: &str, acct: &str, at: u64, lines: usize) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..lines {
            state.activity.push(Activity {
                chan: chan.to_string(),
                acct: acct.to_string(),
                at,
                kind: CHANNEL_ACTIVITY.to_string(),
            });
        }
    }

    pub fn set_document(&self, key: &str, doc: ConfigDoc) {
        let mut state = self.state.lock().unwrap();
        state.documents.insert(key.to_string(), doc);
    }

    pub fn document(&self, key: &str) -> Option<ConfigDoc> {
        self.state.lock().unwrap().documents.get(key).cloned()
    }

    /// Number of document saves performed so far.
    pub fn saved_documents(&self) -> usize {
        self.state.lock().unwrap().saved_documents
    }

    /// Get sent messages for assertions
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.state.lock().unwrap().sent_messages.clone()
    }

    /// Messages sent to a specific channel
    pub fn channel_messages(&self, chan: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .sent_messages
            .iter()
            .filter_map(|msg| match &msg.recipient {
                Recipient::Channel(c) if c == chan => Some(msg.content.clone()),
                _ => None,
            })
            .collect()
    }

    /// Messages sent privately to a nick
    pub fn user_messages(&self, nick: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .sent_messages
            .iter()
            .filter_map(|msg| match &msg.recipient {
                Recipient::User(n) if n == nick => Some(msg.content.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn kicks(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().kicks.clone()
    }

    pub fn modes(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().modes.clone()
    }

    /// Make every activity-log query fail.
    pub fn fail_logs(&self, fail: bool) {
        self.state.lock().unwrap().fail_logs = fail;
    }

    /// Make every directory query fail.
    pub fn fail_directory(&self, fail: bool) {
        self.state.lock().unwrap().fail_directory = fail;
    }

    /// Make every notification fail.
    pub fn fail_delivery(&self, fail: bool) {
        self.state.lock().unwrap().fail_delivery = fail;
    }

    /// Clear all state
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        *state = MockState::default();
    }
}

#[async_trait]
impl ChannelDirectory for MockChat {
    async fn flags(&self, chan: &str, acct: &str) -> ChatResult<String> {
        let state = self.state.lock().unwrap();
        if state.fail_directory {
            return Err(ChatError::ChannelNotFound(chan.to_string()));
        }
        Ok(state
            .flags
            .get(&(chan.to_string(), acct.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn count_logged_in(&self, chan: &str) -> ChatResult<usize> {
        let state = self.state.lock().unwrap();
        if state.fail_directory {
            return Err(ChatError::ChannelNotFound(chan.to_string()));
        }
        Ok(state.logged_in.get(chan).copied().unwrap_or(0))
    }

    async fn kick(&self, chan: &str, nick: &str, _reason: &str) -> ChatResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_directory {
            return Err(ChatError::ChannelNotFound(chan.to_string()));
        }
        state.kicks.push((chan.to_string(), nick.to_string()));
        Ok(())
    }

    async fn set_mode(&self, chan: &str, delta: &str) -> ChatResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_directory {
            return Err(ChatError::ChannelNotFound(chan.to_string()));
        }
        state.modes.push((chan.to_string(), delta.to_string()));
        Ok(())
    }
}

#[async_trait]
impl ActivityLog for MockChat {
    async fn at_least(&self, chan: &str, filter: &LogFilter, threshold: u64) -> ChatResult<bool> {
        let state = self.state.lock().unwrap();
        if state.fail_logs {
            return Err(ChatError::LogStore("mock log store offline".to_string()));
        }
        let count = state
            .activity
            .iter()
            .filter(|a| {
                a.chan == chan
                    && a.acct == filter.acct
                    && a.kind == filter.kind
                    && a.at >= filter.since
                    && a.at <= filter.until
            })
            .count();
        Ok(count as u64 >= threshold)
    }
}

#[async_trait]
impl ConfigStore for MockChat {
    async fn load(&self, key: &str) -> ChatResult<ConfigDoc> {
        Ok(self.document(key).unwrap_or_default())
    }

    async fn save(&self, key: &str, doc: &ConfigDoc) -> ChatResult<()> {
        let mut state = self.state.lock().unwrap();
        state.documents.insert(key.to_string(), doc.clone());
        state.saved_documents += 1;
        Ok(())
    }
}

#[async_trait]
impl Notifier for MockChat {
    async fn notify_channel(&self, chan: &str, text: &str) -> ChatResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_delivery {
            return Err(ChatError::Delivery(chan.to_string()));
        }
        state.sent_messages.push(SentMessage {
            recipient: Recipient::Channel(chan.to_string()),
            content: text.to_string(),
        });
        Ok(())
    }

    async fn notify_user(&self, nick: &str, text: &str) -> ChatResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_delivery {
            return Err(ChatError::Delivery(nick.to_string()));
        }
        state.sent_messages.push(SentMessage {
            recipient: Recipient::User(nick.to_string()),
            content: text.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_activity_window() {
        let chat = MockChat::new();
        chat.seed_history("#senate", "alice", 100, 3);

        let filter = LogFilter {
            acct: "alice".to_string(),
            since: 0,
            until: 150,
            kind: CHANNEL_ACTIVITY.to_string(),
        };
        assert!(chat.at_least("#senate", &filter, 3).await.unwrap());
        assert!(!chat.at_least("#senate", &filter, 4).await.unwrap());

        let early = LogFilter {
            until: 99,
            ..filter.clone()
        };
        assert!(!chat.at_least("#senate", &early, 1).await.unwrap());
        assert!(!chat.at_least("#other", &filter, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_notifications_recorded() {
        let chat = MockChat::new();
        chat.notify_channel("#senate", "hello").await.unwrap();
        chat.notify_user("bob", "psst").await.unwrap();

        assert_eq!(chat.channel_messages("#senate"), vec!["hello".to_string()]);
        assert_eq!(chat.user_messages("bob"), vec!["psst".to_string()]);

        chat.fail_delivery(true);
        assert!(chat.notify_channel("#senate", "lost").await.is_err());
        assert_eq!(chat.sent_messages().len(), 2);
    }

    #[tokio::test]
    async fn test_documents() {
        let chat = MockChat::new();
        assert!(chat.load("#senate").await.unwrap().is_empty());

        let mut doc = ConfigDoc::new();
        doc.put("config.vote.duration", 60);
        chat.save("#senate", &doc).await.unwrap();

        assert_eq!(chat.load("#senate").await.unwrap(), doc);
        assert_eq!(chat.saved_documents(), 1);
    }
}
