//! A single ballot: tallies, casting rules and lifecycle.
//!
//! Votes are plain data so they can be archived once they leave the live
//! registry. Every operation that needs the outside world takes the
//! [`Collaborators`] handle explicitly. Lifecycle hooks (`start`, `finish`,
//! `cancel`) are called by the registry only, under its lock, and so never
//! race with `cast` on the same vote.

use super::ballot::{Ballot, Stat, VoteId};
use super::error::{VoteError, VoteResult};
use super::kind::VoteKind;
use super::policy::{any_flag, Policy};
use super::record::{Failure, Outcome};
use crate::chat::traits::CHANNEL_ACTIVITY;
use crate::chat::{Collaborators, LogFilter, User};
use crate::clock::now_secs;
use crate::config::{ConfigDoc, DefaultConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

/// Outcome of [`Vote::finish`] plus when a time-limited effect should be
/// reverted.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub outcome: Outcome,
    pub expires: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    id: VoteId,
    kind: VoteKind,
    cfg: ConfigDoc,
    began: u64,
    chan: String,
    /// Account of the initiating user.
    acct: String,
    issue: String,
    yes: BTreeSet<String>,
    no: BTreeSet<String>,
    /// Every hostname a ballot was accepted from. Only grows.
    hosts: BTreeSet<String>,
}

impl Vote {
    /// Build a vote. `cfg` is completed from the built-in defaults.
    ///
    /// Fails if the kind is malformed or disabled, or if `user` is not logged
    /// in. The initiator is recorded as a yes vote.
    pub fn new(
        id: VoteId,
        kind: VoteKind,
        mut cfg: ConfigDoc,
        chan: &str,
        user: &User,
        issue: &str,
    ) -> VoteResult<Self> {
        kind.validate()?;
        DefaultConfig::configure(&mut cfg);

        if !user.is_logged_in() {
            return Err(VoteError::NotLoggedIn("create a vote"));
        }

        let mut vote = Self {
            id,
            kind,
            cfg,
            began: now_secs(),
            chan: chan.to_string(),
            acct: user.acct().to_string(),
            issue: issue.to_string(),
            yes: BTreeSet::new(),
            no: BTreeSet::new(),
            hosts: BTreeSet::new(),
        };

        if vote.disabled() {
            return Err(VoteError::Disabled);
        }

        // Initiation implies a yes vote.
        vote.yes.insert(vote.acct.clone());
        vote.hosts.insert(user.host.clone());
        Ok(vote)
    }

    pub fn id(&self) -> VoteId {
        self.id
    }

    pub fn kind(&self) -> &VoteKind {
        &self.kind
    }

    pub fn cfg(&self) -> &ConfigDoc {
        &self.cfg
    }

    pub fn began(&self) -> u64 {
        self.began
    }

    pub fn chan(&self) -> &str {
        &self.chan
    }

    /// Account of the initiating user.
    pub fn acct(&self) -> &str {
        &self.acct
    }

    pub fn issue(&self) -> &str {
        &self.issue
    }

    pub fn yes(&self) -> &BTreeSet<String> {
        &self.yes
    }

    pub fn no(&self) -> &BTreeSet<String> {
        &self.no
    }

    pub fn hosts(&self) -> &BTreeSet<String> {
        &self.hosts
    }

    pub fn policy(&self) -> Policy {
        Policy::from_config(&self.cfg)
    }

    pub fn tally(&self) -> (usize, usize) {
        (self.yes.len(), self.no.len())
    }

    pub fn total(&self) -> usize {
        self.yes.len() + self.no.len()
    }

    pub fn position(&self, acct: &str) -> Option<Ballot> {
        if self.yes.contains(acct) {
            Some(Ballot::Yes)
        } else if self.no.contains(acct) {
            Some(Ballot::No)
        } else {
            None
        }
    }

    pub fn voted_acct(&self, acct: &str) -> bool {
        self.position(acct).is_some()
    }

    pub fn voted_host(&self, host: &str) -> bool {
        self.hosts.contains(host)
    }

    pub fn elapsed(&self) -> u64 {
        now_secs().saturating_sub(self.began)
    }

    /// Seconds left before the deadline; zero or negative once it has passed.
    pub fn remaining(&self) -> i64 {
        let duration = i64::try_from(self.policy().duration).unwrap_or(i64::MAX);
        let elapsed = i64::try_from(self.elapsed()).unwrap_or(i64::MAX);
        duration.saturating_sub(elapsed)
    }

    pub fn plurality(&self) -> u64 {
        self.policy().plurality(self.total() as u64)
    }

    pub fn required(&self) -> u64 {
        self.policy().required(self.total() as u64)
    }

    /// Minimum number of ballots, asking the directory for the logged-in
    /// count when a turnout is configured.
    pub async fn minimum(&self, ctx: &Collaborators) -> VoteResult<u64> {
        let policy = self.policy();
        let eligible = if policy.turnout > 0.0 {
            ctx.directory.count_logged_in(&self.chan).await? as u64
        } else {
            0
        };
        Ok(policy.minimum(eligible))
    }

    /// True if `<type>.disable` is `"1"` in the configuration.
    pub fn disabled(&self) -> bool {
        let key = self.kind.type_str();
        self.cfg.has_child(key) && self.cfg.get_str(&format!("{}.disable", key)) == "1"
    }

    /// Whether `acct` may vote at all in this channel.
    ///
    /// With `enfranchise.access` set, holding any listed flag is required.
    /// Otherwise the account needs `enfranchise.lines` lines of channel
    /// activity older than `began - enfranchise.age`. Lookup failures count
    /// as not enfranchised.
    pub async fn enfranchised(&self, acct: &str, ctx: &Collaborators) -> bool {
        let access = self.cfg.get_str("enfranchise.access");
        if !access.is_empty() {
            return match ctx.directory.flags(&self.chan, acct).await {
                Ok(held) => any_flag(&held, &access),
                Err(e) => {
                    warn!(vote = self.id, acct = %acct, "flag lookup failed: {}", e);
                    false
                }
            };
        }

        let filter = LogFilter {
            acct: acct.to_string(),
            since: 0,
            until: self
                .began
                .saturating_sub(self.cfg.get_u64_or("enfranchise.age", 1800)),
            kind: CHANNEL_ACTIVITY.to_string(),
        };
        let lines = self.cfg.get_u64_or("enfranchise.lines", 6);
        self.history(&filter, lines, ctx).await
    }

    /// Whether `acct` has been recently active enough to cast a first ballot.
    ///
    /// Holding a `qualify.access` flag bypasses the check; otherwise the
    /// account needs `qualify.lines` lines within `qualify.age` seconds before
    /// the vote began.
    pub async fn qualified(&self, acct: &str, ctx: &Collaborators) -> bool {
        let access = self.cfg.get_str("qualify.access");
        if !access.is_empty() {
            match ctx.directory.flags(&self.chan, acct).await {
                Ok(held) if any_flag(&held, &access) => return true,
                Ok(_) => {}
                Err(e) => warn!(vote = self.id, acct = %acct, "flag lookup failed: {}", e),
            }
        }

        let filter = LogFilter {
            acct: acct.to_string(),
            since: self
                .began
                .saturating_sub(self.cfg.get_u64_or("qualify.age", 900)),
            until: self.began,
            kind: CHANNEL_ACTIVITY.to_string(),
        };
        let lines = self.cfg.get_u64_or("qualify.lines", 3);
        self.history(&filter, lines, ctx).await
    }

    async fn history(&self, filter: &LogFilter, lines: u64, ctx: &Collaborators) -> bool {
        match ctx.logs.at_least(&self.chan, filter, lines).await {
            Ok(enough) => enough,
            Err(e) => {
                warn!(vote = self.id, acct = %filter.acct, "activity lookup failed: {}", e);
                false
            }
        }
    }

    /// Validate and record a ballot.
    ///
    /// Checks, first failure wins: logged in; no repeat of a held position
    /// from a hostname already seen; enfranchised and qualified (first ballot
    /// only); the kind's own rule. A rejected cast changes nothing.
    pub async fn cast(&mut self, ballot: Ballot, user: &User, ctx: &Collaborators) -> VoteResult<Stat> {
        if !user.is_logged_in() {
            return Err(VoteError::NotLoggedIn("vote"));
        }

        let acct = user.acct().to_string();
        let position = self.position(&acct);

        if position == Some(ballot) && self.voted_host(&user.host) {
            return Err(VoteError::HostRepeat);
        }

        if position.is_none() && !self.enfranchised(&acct, ctx).await {
            return Err(VoteError::NotEnfranchised);
        }

        if position.is_none() && !self.qualified(&acct, ctx).await {
            return Err(VoteError::NotQualified);
        }

        self.kind.proffer(self, ballot, user)?;

        let (side, other) = match ballot {
            Ballot::Yes => (&mut self.yes, &mut self.no),
            Ballot::No => (&mut self.no, &mut self.yes),
        };

        if !side.insert(acct.clone()) {
            return Err(VoteError::AlreadyVoted(ballot));
        }

        let stat = if other.remove(&acct) {
            Stat::Changed
        } else {
            Stat::Added
        };

        self.hosts.insert(user.host.clone());
        Ok(stat)
    }

    /// [`Vote::cast`] plus the acknowledgement or rejection notices selected
    /// by the `ballot.*` settings.
    pub async fn vote(&mut self, ballot: Ballot, user: &User, ctx: &Collaborators) -> VoteResult<Stat> {
        match self.cast(ballot, user, ctx).await {
            Ok(stat) => {
                let text = match stat {
                    Stat::Added => format!("Thanks for casting your vote on {}!", self),
                    Stat::Changed => format!("You have changed your vote on {}!", self),
                };
                if self.cfg.get_bool_or("ballot.ack_chan", false) {
                    ctx.tell_channel(&self.chan, &format!("{}: {}", user.nick, text))
                        .await;
                }
                if self.cfg.get_bool_or("ballot.ack_priv", true) {
                    ctx.tell_user(&user.nick, &text).await;
                }
                Ok(stat)
            }
            Err(e) => {
                let text = format!("Your vote was not accepted for {}: {}", self, e);
                if self.cfg.get_bool_or("ballot.rej_chan", false) {
                    ctx.tell_channel(&self.chan, &format!("{}: {}", user.nick, text))
                        .await;
                }
                if self.cfg.get_bool_or("ballot.rej_priv", true) {
                    ctx.tell_user(&user.nick, &text).await;
                }
                Err(e)
            }
        }
    }

    /// Run the kind's starting hook and announce the vote.
    pub async fn start(&self, ctx: &Collaborators) -> VoteResult<()> {
        self.kind.starting(self, ctx).await?;
        let duration = Duration::from_secs(self.policy().duration);
        let text = format!(
            "Voting has started! Issue {}: {}. You have {} to vote! Type or PM: !vote y {} or !vote n {}",
            self,
            self.kind.proposal(&self.issue),
            humantime::format_duration(duration),
            self.id,
            self.id,
        );
        ctx.tell_channel(&self.chan, &text).await;
        Ok(())
    }

    /// Resolve the vote.
    ///
    /// Fewer ballots than [`Vote::minimum`] fails; fewer yes votes than
    /// [`Vote::required`] fails; anything else passes and the kind's effect is
    /// applied. An error from a hook or a collaborator turns the result into
    /// [`Failure::Rejected`].
    pub async fn finish(&self, ctx: &Collaborators) -> Resolution {
        match self.resolve(ctx).await {
            Ok(resolution) => resolution,
            Err(e) => {
                warn!(vote = self.id, channel = %self.chan, "vote rejected: {}", e);
                self.announce(ctx, &format!("The vote {} was rejected: {}", self, e))
                    .await;
                Resolution {
                    outcome: Outcome::failed(Failure::Rejected {
                        message: e.to_string(),
                    }),
                    expires: None,
                }
            }
        }
    }

    async fn resolve(&self, ctx: &Collaborators) -> VoteResult<Resolution> {
        let (yes, no) = self.tally();
        let total = self.total() as u64;
        let minimum = self.minimum(ctx).await?;

        if total < minimum {
            self.kind.failed(self, ctx).await?;
            self.announce(
                ctx,
                &format!(
                    "{}: Failed to reach minimum number of votes: {} of {} required.",
                    self, total, minimum
                ),
            )
            .await;
            return Ok(Resolution {
                outcome: Outcome::failed(Failure::Quorum { total, minimum }),
                expires: None,
            });
        }

        let required = self.required();
        if (yes as u64) < required {
            self.kind.failed(self, ctx).await?;
            self.announce(
                ctx,
                &format!(
                    "{}: The nays have it. Yeas: {}. Nays: {}. Required at least: {} yeas.",
                    self, yes, no, required
                ),
            )
            .await;
            return Ok(Resolution {
                outcome: Outcome::failed(Failure::Plurality { yes, no, required }),
                expires: None,
            });
        }

        let expires = self.kind.passed(self, ctx).await?;
        self.announce(
            ctx,
            &format!("{}: The yeas have it. Yeas: {}. Nays: {}.", self, yes, no),
        )
        .await;
        info!(vote = self.id, channel = %self.chan, yes, no, "vote passed");

        Ok(Resolution {
            outcome: Outcome::Passed { yes, no },
            expires,
        })
    }

    /// Withdraw the vote. Only allowed before anyone besides the initiator
    /// has voted.
    pub async fn cancel(&self, ctx: &Collaborators) -> VoteResult<()> {
        if self.total() > 1 {
            return Err(VoteError::CancelAfterVotes);
        }
        self.kind.canceled(self, ctx).await?;
        self.announce(ctx, &format!("The vote {} has been canceled.", self))
            .await;
        Ok(())
    }

    async fn announce(&self, ctx: &Collaborators, text: &str) {
        if self.cfg.get_bool_or("result.ack_chan", true) {
            ctx.tell_channel(&self.chan, text).await;
        }
    }
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.id)
    }
}
