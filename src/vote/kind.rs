//! Vote kinds.
//!
//! Every vote runs the same casting and resolution machinery; the kind decides
//! what the vote is about and what happens when it passes. The set is closed:
//!
//! - `Issue`: a plain question, no effect
//! - `Config`: set `config.<key>` in the channel document
//! - `Kick`: remove a nick from the channel
//! - `Mode`: apply a channel mode delta, optionally reverted after
//!   `mode.expiry` seconds via the scheduler

use super::ballot::Ballot;
use super::error::{VoteError, VoteResult};
use super::state::Vote;
use crate::chat::{Collaborators, User};
use crate::clock::now_secs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VoteKind {
    Issue,
    Config { key: String, value: String },
    Kick { target: String },
    Mode { delta: String },
}

impl VoteKind {
    /// Configuration subtree name for this kind (`<type>.disable`, ...).
    pub fn type_str(&self) -> &'static str {
        match self {
            VoteKind::Issue => "issue",
            VoteKind::Config { .. } => "config",
            VoteKind::Kick { .. } => "kick",
            VoteKind::Mode { .. } => "mode",
        }
    }

    /// Reject malformed kinds before a vote is built around them.
    pub fn validate(&self) -> VoteResult<()> {
        match self {
            VoteKind::Issue => Ok(()),
            VoteKind::Config { key, .. } => {
                if key.is_empty() || key.contains(char::is_whitespace) {
                    return Err(VoteError::Invalid(format!("bad config key '{}'", key)));
                }
                Ok(())
            }
            VoteKind::Kick { target } => {
                if target.trim().is_empty() {
                    return Err(VoteError::Invalid("kick needs a target".to_string()));
                }
                Ok(())
            }
            VoteKind::Mode { delta } => {
                if delta.len() < 2 || !(delta.starts_with('+') || delta.starts_with('-')) {
                    return Err(VoteError::Invalid(format!("bad mode delta '{}'", delta)));
                }
                Ok(())
            }
        }
    }

    /// Line announcing what a passing vote will do.
    pub fn proposal(&self, issue: &str) -> String {
        match self {
            VoteKind::Issue => issue.to_string(),
            VoteKind::Config { key, value } => format!("set {} = {}", key, value),
            VoteKind::Kick { target } => format!("kick {}", target),
            VoteKind::Mode { delta } => format!("mode {}", delta),
        }
    }

    /// Kind-specific eligibility check, run after the general casting rules.
    pub fn proffer(&self, _vote: &Vote, _ballot: Ballot, user: &User) -> VoteResult<()> {
        match self {
            VoteKind::Kick { target } if target.eq_ignore_ascii_case(&user.nick) => Err(
                VoteError::Ineligible("You can not vote on your own removal.".to_string()),
            ),
            _ => Ok(()),
        }
    }

    /// Apply the effect of a passed vote. Returns when the effect should be
    /// reverted, if it is time-limited.
    pub async fn passed(&self, vote: &Vote, ctx: &Collaborators) -> VoteResult<Option<u64>> {
        let chan = vote.chan();
        match self {
            VoteKind::Issue => Ok(None),
            VoteKind::Config { key, value } => {
                let mut doc = ctx.docs.load(chan).await?;
                doc.put(&format!("config.{}", key), value.clone());
                ctx.docs.save(chan, &doc).await?;
                info!(vote = vote.id(), channel = %chan, key = %key, "configuration changed by vote");
                Ok(None)
            }
            VoteKind::Kick { target } => {
                let reason = format!("Voted off in #{}", vote.id());
                ctx.directory.kick(chan, target, &reason).await?;
                info!(vote = vote.id(), channel = %chan, target = %target, "kicked by vote");
                Ok(None)
            }
            VoteKind::Mode { delta } => {
                ctx.directory.set_mode(chan, delta).await?;
                info!(vote = vote.id(), channel = %chan, delta = %delta, "mode changed by vote");
                let expiry = vote.cfg().get_u64_or("mode.expiry", 0);
                Ok((expiry > 0).then(|| now_secs() + expiry))
            }
        }
    }

    /// Called once when the vote opens, before it is announced.
    pub async fn starting(&self, vote: &Vote, _ctx: &Collaborators) -> VoteResult<()> {
        debug!(vote = vote.id(), kind = self.type_str(), channel = %vote.chan(), "vote starting");
        Ok(())
    }

    pub async fn failed(&self, vote: &Vote, _ctx: &Collaborators) -> VoteResult<()> {
        debug!(vote = vote.id(), kind = self.type_str(), "vote failed");
        Ok(())
    }

    pub async fn canceled(&self, vote: &Vote, _ctx: &Collaborators) -> VoteResult<()> {
        debug!(vote = vote.id(), kind = self.type_str(), "vote canceled");
        Ok(())
    }

    /// Revert a time-limited effect.
    pub async fn expire(&self, chan: &str, ctx: &Collaborators) -> VoteResult<()> {
        match self {
            VoteKind::Mode { delta } => {
                let revert = invert_mode(delta);
                ctx.directory.set_mode(chan, &revert).await?;
                info!(channel = %chan, delta = %revert, "mode reverted on expiry");
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Flip every sign in the mode letters of a delta: `+b *!*@h` → `-b *!*@h`,
/// `+m-i` → `-m+i`. Arguments are kept as they are.
pub fn invert_mode(delta: &str) -> String {
    let (modes, args) = match delta.split_once(' ') {
        Some((modes, args)) => (modes, Some(args)),
        None => (delta, None),
    };

    let flipped: String = modes
        .chars()
        .map(|c| match c {
            '+' => '-',
            '-' => '+',
            c => c,
        })
        .collect();

    match args {
        Some(args) => format!("{} {}", flipped, args),
        None => flipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invert_mode() {
        assert_eq!(invert_mode("+m"), "-m");
        assert_eq!(invert_mode("+b *!*@bad.host"), "-b *!*@bad.host");
        assert_eq!(invert_mode("+m-i"), "-m+i");
        assert_eq!(invert_mode("-q nick!*@*"), "+q nick!*@*");
    }

    #[test]
    fn test_validate() {
        assert!(VoteKind::Issue.validate().is_ok());
        assert!(VoteKind::Mode { delta: "m".into() }.validate().is_err());
        assert!(VoteKind::Mode { delta: "+".into() }.validate().is_err());
        assert!(VoteKind::Mode { delta: "+m".into() }.validate().is_ok());
        assert!(VoteKind::Kick { target: " ".into() }.validate().is_err());
        assert!(VoteKind::Config {
            key: "vote.duration".into(),
            value: "60".into()
        }
        .validate()
        .is_ok());
        assert!(VoteKind::Config {
            key: "bad key".into(),
            value: "1".into()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_kind_serialization_is_tagged() {
        let kind = VoteKind::Kick {
            target: "spammer".into(),
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["type"], "kick");
        assert_eq!(json["target"], "spammer");

        let back: VoteKind = serde_json::from_value(json).unwrap();
        assert_eq!(back, kind);
    }
}
