//! Live vote registry.
//!
//! Holds every open vote, indexed by channel and by initiating account, and
//! runs the worker that resolves votes whose deadline has passed. One async
//! mutex guards the whole ledger; every operation, including the worker's
//! scan, holds it from start to finish, so a vote is never cast on while it is
//! being resolved.
//!
//! Resolved and canceled votes are handed to the [`Praetor`] for archiving.

use super::intercession::{Intercession, Supermajority};
use crate::chat::{Collaborators, User};
use crate::clock::now_secs;
use crate::config::{ConfigDoc, DefaultConfig};
use crate::praetor::Praetor;
use crate::vote::{
    Ballot, Outcome, Stat, Vote, VoteError, VoteId, VoteKind, VoteRecord, VoteResult,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default wait between worker scans.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Default)]
struct Ledger {
    votes: BTreeMap<VoteId, Vote>,
    by_chan: HashMap<String, BTreeSet<VoteId>>,
    by_acct: HashMap<String, BTreeSet<VoteId>>,
}

fn index_key(name: &str) -> String {
    name.to_lowercase()
}

impl Ledger {
    /// Smallest id not used by a live or archived vote.
    fn allocate(&self, praetor: &Praetor) -> VoteId {
        let mut id = 0;
        while self.votes.contains_key(&id) || praetor.exists(id) {
            id += 1;
        }
        id
    }

    fn insert(&mut self, vote: Vote) {
        let id = vote.id();
        self.by_chan
            .entry(index_key(vote.chan()))
            .or_default()
            .insert(id);
        self.by_acct
            .entry(index_key(vote.acct()))
            .or_default()
            .insert(id);
        self.votes.insert(id, vote);
    }

    /// Remove a vote from the map and both indices. Index entries that are
    /// already missing are logged and otherwise ignored.
    fn remove(&mut self, id: VoteId) -> VoteResult<Vote> {
        let Some(vote) = self.votes.remove(&id) else {
            error!(vote = id, "vote missing from ledger during removal");
            return Err(VoteError::Invariant(format!("vote #{} not in ledger", id)));
        };

        if !unindex(&mut self.by_chan, &index_key(vote.chan()), id) {
            error!(vote = id, channel = %vote.chan(), "channel index out of sync");
        }
        if !unindex(&mut self.by_acct, &index_key(vote.acct()), id) {
            error!(vote = id, acct = %vote.acct(), "account index out of sync");
        }
        Ok(vote)
    }

    fn ids_in_channel(&self, chan: &str) -> Vec<VoteId> {
        self.by_chan
            .get(&index_key(chan))
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    fn ids_by_account(&self, acct: &str) -> Vec<VoteId> {
        self.by_acct
            .get(&index_key(acct))
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    fn count_account_in_channel(&self, acct: &str, chan: &str) -> usize {
        self.ids_by_account(acct)
            .iter()
            .filter_map(|id| self.votes.get(id))
            .filter(|v| v.chan().eq_ignore_ascii_case(chan))
            .count()
    }

    fn get(&self, id: VoteId) -> VoteResult<&Vote> {
        self.votes.get(&id).ok_or(VoteError::NotFound(id))
    }

    fn get_mut(&mut self, id: VoteId) -> VoteResult<&mut Vote> {
        self.votes.get_mut(&id).ok_or(VoteError::NotFound(id))
    }
}

fn unindex(index: &mut HashMap<String, BTreeSet<VoteId>>, key: &str, id: VoteId) -> bool {
    let Some(ids) = index.get_mut(key) else {
        return false;
    };
    let removed = ids.remove(&id);
    if ids.is_empty() {
        index.remove(key);
    }
    removed
}

fn only(ids: Vec<VoteId>, what: &'static str) -> VoteResult<VoteId> {
    match ids.as_slice() {
        [] => Err(VoteError::NoneActive(what)),
        [id] => Ok(*id),
        _ => Err(VoteError::Ambiguous(what)),
    }
}

struct Inner {
    ledger: Mutex<Ledger>,
    ctx: Collaborators,
    praetor: Arc<Praetor>,
    intercession: Arc<dyn Intercession>,
    notify: Notify,
    interrupted: AtomicBool,
}

impl Inner {
    fn wake(&self) {
        self.notify.notify_one();
    }

    async fn poll(&self) -> usize {
        let mut ledger = self.ledger.lock().await;

        let due: Vec<VoteId> = ledger
            .votes
            .values()
            .filter(|v| v.remaining() <= 0 || self.intercession.interceded(v))
            .map(|v| v.id())
            .collect();

        let mut resolved = 0;
        for id in due {
            let Some(vote) = ledger.votes.get(&id) else {
                continue;
            };
            let resolution = vote.finish(&self.ctx).await;

            let vote = match ledger.remove(id) {
                Ok(vote) => vote,
                Err(e) => {
                    error!(vote = id, "failed to remove resolved vote: {}", e);
                    continue;
                }
            };
            info!(vote = id, channel = %vote.chan(), outcome = %resolution.outcome, "vote resolved");

            let record = VoteRecord {
                vote,
                outcome: resolution.outcome,
                ended: now_secs(),
                expires: resolution.expires,
            };
            self.archive(&record);
            if let Some(at) = record.expires {
                self.praetor.schedule(id, at);
            }
            resolved += 1;
        }
        resolved
    }

    fn archive(&self, record: &VoteRecord) {
        let id = record.vote.id();
        if let Err(e) = self.praetor.archive(id, record) {
            error!(vote = id, "failed to archive vote: {}", e);
        }
    }
}

async fn run(inner: Arc<Inner>, interval: Duration) {
    debug!(interval = ?interval, "voting worker started");
    while !inner.interrupted.load(Ordering::SeqCst) {
        inner.poll().await;
        if inner.interrupted.load(Ordering::SeqCst) {
            break;
        }
        let _ = tokio::time::timeout(interval, inner.notify.notified()).await;
    }
    debug!("voting worker stopped");
}

/// Registry of live votes.
pub struct Voting {
    inner: Arc<Inner>,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Voting {
    pub fn new(ctx: Collaborators, praetor: Arc<Praetor>) -> Self {
        Self::with_intercession(ctx, praetor, Arc::new(Supermajority))
    }

    pub fn with_intercession(
        ctx: Collaborators,
        praetor: Arc<Praetor>,
        intercession: Arc<dyn Intercession>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                ledger: Mutex::new(Ledger::default()),
                ctx,
                praetor,
                intercession,
                notify: Notify::new(),
                interrupted: AtomicBool::new(false),
            }),
            worker: std::sync::Mutex::new(None),
        }
    }

    pub fn praetor(&self) -> &Arc<Praetor> {
        &self.inner.praetor
    }

    /// Spawn the resolution worker, scanning at most every `interval`.
    pub fn start(&self, interval: Duration) {
        let mut worker = self.worker.lock().unwrap_or_else(|e| e.into_inner());
        if worker.is_some() {
            warn!("voting worker already running");
            return;
        }
        self.inner.interrupted.store(false, Ordering::SeqCst);
        *worker = Some(tokio::spawn(run(self.inner.clone(), interval)));
    }

    /// Stop the worker and wait for it to exit.
    pub async fn shutdown(&self) {
        self.inner.interrupted.store(true, Ordering::SeqCst);
        self.inner.wake();
        let handle = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("voting worker panicked: {}", e);
            }
        }
    }

    /// Resolve every vote that is past its deadline or interceded. Returns
    /// how many were resolved.
    pub async fn poll(&self) -> usize {
        self.inner.poll().await
    }

    /// Open a vote and announce it.
    ///
    /// Without `cfg` the channel's stored `config.vote` settings are used,
    /// after seeding any missing defaults into the channel document.
    pub async fn open(
        &self,
        chan: &str,
        user: &User,
        issue: &str,
        kind: VoteKind,
        cfg: Option<ConfigDoc>,
    ) -> VoteResult<VoteId> {
        let inner = &self.inner;
        let mut ledger = inner.ledger.lock().await;

        let cfg = match cfg {
            Some(cfg) => cfg,
            None => DefaultConfig::configure_channel(&*inner.ctx.docs, chan).await?,
        };

        let id = ledger.allocate(&inner.praetor);
        let vote = Vote::new(id, kind, cfg, chan, user, issue)?;
        let policy = vote.policy();

        if ledger.ids_in_channel(chan).len() as u64 >= policy.max_active {
            return Err(VoteError::TooManyActive);
        }
        if ledger.count_account_in_channel(vote.acct(), chan) as u64 >= policy.max_per_user {
            return Err(VoteError::TooManyPerUser);
        }

        vote.start(&inner.ctx).await?;
        info!(vote = id, channel = %chan, kind = vote.kind().type_str(), acct = %vote.acct(), "vote opened");
        ledger.insert(vote);
        inner.wake();
        Ok(id)
    }

    /// Cast a ballot on a live vote. The voter is notified either way.
    pub async fn cast(&self, id: VoteId, ballot: Ballot, user: &User) -> VoteResult<Stat> {
        let inner = &self.inner;
        let mut ledger = inner.ledger.lock().await;

        let vote = match ledger.get_mut(id) {
            Ok(vote) => vote,
            Err(e) => {
                inner.ctx.tell_user(&user.nick, &e.to_string()).await;
                return Err(e);
            }
        };

        let stat = vote.vote(ballot, user, &inner.ctx).await?;
        debug!(vote = id, acct = %user.acct(), ballot = %ballot, "ballot accepted");
        inner.wake();
        Ok(stat)
    }

    /// Cancel a vote on behalf of its initiator.
    pub async fn cancel(&self, id: VoteId, chan: &str, user: &User) -> VoteResult<()> {
        let inner = &self.inner;
        let mut ledger = inner.ledger.lock().await;

        let vote = ledger.get(id)?;
        if !vote.chan().eq_ignore_ascii_case(chan) {
            return Err(VoteError::NotFound(id));
        }
        if !user.is_logged_in() {
            return Err(VoteError::NotLoggedIn("cancel a vote"));
        }
        if user.acct() != vote.acct() {
            return Err(VoteError::NotInitiator(vote.acct().to_string()));
        }
        vote.cancel(&inner.ctx).await?;

        let vote = ledger.remove(id)?;
        info!(vote = id, channel = %chan, "vote canceled");
        inner.archive(&VoteRecord {
            vote,
            outcome: Outcome::Canceled,
            ended: now_secs(),
            expires: None,
        });
        inner.wake();
        Ok(())
    }

    /// Snapshot of a live vote.
    pub async fn get(&self, id: VoteId) -> VoteResult<Vote> {
        let ledger = self.inner.ledger.lock().await;
        ledger.get(id).cloned()
    }

    /// Run `f` against a live vote under the registry lock.
    pub async fn with_vote<R>(&self, id: VoteId, f: impl FnOnce(&Vote) -> R) -> VoteResult<R> {
        let ledger = self.inner.ledger.lock().await;
        ledger.get(id).map(f)
    }

    /// The only live vote in `chan`.
    pub async fn get_id_by_channel(&self, chan: &str) -> VoteResult<VoteId> {
        let ledger = self.inner.ledger.lock().await;
        only(ledger.ids_in_channel(chan), "in this channel")
    }

    /// The only live vote started by `acct`.
    pub async fn get_id_by_account(&self, acct: &str) -> VoteResult<VoteId> {
        let ledger = self.inner.ledger.lock().await;
        only(ledger.ids_by_account(acct), "started by this account")
    }

    pub async fn count_channel(&self, chan: &str) -> usize {
        self.inner.ledger.lock().await.ids_in_channel(chan).len()
    }

    pub async fn count_account(&self, acct: &str) -> usize {
        self.inner.ledger.lock().await.ids_by_account(acct).len()
    }

    pub async fn len(&self) -> usize {
        self.inner.ledger.lock().await.votes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Visit every live vote. Errors from `f` are logged and the walk
    /// continues. Returns how many visits succeeded.
    pub async fn for_each<F>(&self, mut f: F) -> usize
    where
        F: FnMut(&Vote) -> VoteResult<()>,
    {
        let ledger = self.inner.ledger.lock().await;
        let mut visited = 0;
        for vote in ledger.votes.values() {
            if visit(vote.id(), f(vote)) {
                visited += 1;
            }
        }
        visited
    }

    pub async fn for_each_mut<F>(&self, mut f: F) -> usize
    where
        F: FnMut(&mut Vote) -> VoteResult<()>,
    {
        let mut ledger = self.inner.ledger.lock().await;
        let mut visited = 0;
        for vote in ledger.votes.values_mut() {
            let id = vote.id();
            if visit(id, f(vote)) {
                visited += 1;
            }
        }
        visited
    }

    pub async fn for_each_in_channel<F>(&self, chan: &str, f: F) -> usize
    where
        F: FnMut(&Vote) -> VoteResult<()>,
    {
        let ledger = self.inner.ledger.lock().await;
        let ids = ledger.ids_in_channel(chan);
        visit_ids(&ledger, &ids, f)
    }

    pub async fn for_each_in_channel_mut<F>(&self, chan: &str, f: F) -> usize
    where
        F: FnMut(&mut Vote) -> VoteResult<()>,
    {
        let mut ledger = self.inner.ledger.lock().await;
        let ids = ledger.ids_in_channel(chan);
        visit_ids_mut(&mut ledger, &ids, f)
    }

    pub async fn for_each_by_account<F>(&self, acct: &str, f: F) -> usize
    where
        F: FnMut(&Vote) -> VoteResult<()>,
    {
        let ledger = self.inner.ledger.lock().await;
        let ids = ledger.ids_by_account(acct);
        visit_ids(&ledger, &ids, f)
    }

    pub async fn for_each_by_account_mut<F>(&self, acct: &str, f: F) -> usize
    where
        F: FnMut(&mut Vote) -> VoteResult<()>,
    {
        let mut ledger = self.inner.ledger.lock().await;
        let ids = ledger.ids_by_account(acct);
        visit_ids_mut(&mut ledger, &ids, f)
    }
}

impl Drop for Voting {
    fn drop(&mut self) {
        self.inner.interrupted.store(true, Ordering::SeqCst);
        self.inner.wake();
    }
}

fn visit(id: VoteId, result: VoteResult<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(vote = id, "skipping vote: {}", e);
            false
        }
    }
}

fn visit_ids<F>(ledger: &Ledger, ids: &[VoteId], mut f: F) -> usize
where
    F: FnMut(&Vote) -> VoteResult<()>,
{
    let mut visited = 0;
    for &id in ids {
        let result = match ledger.votes.get(&id) {
            Some(vote) => f(vote),
            None => {
                error!(vote = id, "index refers to a vote not in the ledger");
                Err(VoteError::Invariant(format!("dangling index entry #{}", id)))
            }
        };
        if visit(id, result) {
            visited += 1;
        }
    }
    visited
}

fn visit_ids_mut<F>(ledger: &mut Ledger, ids: &[VoteId], mut f: F) -> usize
where
    F: FnMut(&mut Vote) -> VoteResult<()>,
{
    let mut visited = 0;
    for &id in ids {
        let result = match ledger.votes.get_mut(&id) {
            Some(vote) => f(vote),
            None => {
                error!(vote = id, "index refers to a vote not in the ledger");
                Err(VoteError::Invariant(format!("dangling index entry #{}", id)))
            }
        };
        if visit(id, result) {
            visited += 1;
        }
    }
    visited
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::MockChat;
    use serde_json::json;

    const CHAN: &str = "#senate";

    fn setup() -> (Arc<MockChat>, Voting) {
        let chat = Arc::new(MockChat::new());
        let voting = Voting::new(Collaborators::uniform(chat.clone()), Arc::new(Praetor::new()));
        (chat, voting)
    }

    fn user(name: &str) -> User {
        User::new(name, format!("{}.host", name), name)
    }

    fn cfg(pairs: &[(&str, u64)]) -> ConfigDoc {
        let mut cfg = ConfigDoc::new();
        for (key, value) in pairs {
            cfg.put(key, *value);
        }
        cfg
    }

    async fn open_issue(voting: &Voting, who: &str, cfg: ConfigDoc) -> VoteResult<VoteId> {
        voting
            .open(CHAN, &user(who), "Adopt the charter", VoteKind::Issue, Some(cfg))
            .await
    }

    #[tokio::test]
    async fn test_open_indexes_and_announces() {
        let (chat, voting) = setup();
        let id = open_issue(&voting, "alice", ConfigDoc::new()).await.unwrap();

        assert_eq!(voting.len().await, 1);
        assert_eq!(voting.count_channel("#SENATE").await, 1);
        assert_eq!(voting.count_account("alice").await, 1);
        assert_eq!(voting.get_id_by_channel(CHAN).await.unwrap(), id);
        assert_eq!(voting.get_id_by_account("alice").await.unwrap(), id);
        assert!(chat.channel_messages(CHAN)[0].starts_with("Voting has started! Issue #0"));
    }

    #[tokio::test]
    async fn test_open_without_config_seeds_channel_defaults() {
        let (chat, voting) = setup();
        let mut doc = ConfigDoc::new();
        doc.put("config.vote.duration", 120);
        chat.set_document(CHAN, doc);

        let id = voting
            .open(CHAN, &user("alice"), "x", VoteKind::Issue, None)
            .await
            .unwrap();

        let duration = voting.with_vote(id, |v| v.policy().duration).await.unwrap();
        assert_eq!(duration, 120);
        let stored = chat.document(CHAN).unwrap();
        assert_eq!(stored.get_u64("config.vote.duration").unwrap(), 120);
        assert_eq!(stored.get_u64("config.vote.max_active").unwrap(), 16);
    }

    #[tokio::test]
    async fn test_quotas() {
        let (_chat, voting) = setup();
        let limits = cfg(&[("max_active", 2), ("max_per_user", 1)]);

        open_issue(&voting, "alice", limits.clone()).await.unwrap();
        assert_eq!(
            open_issue(&voting, "alice", limits.clone()).await.unwrap_err(),
            VoteError::TooManyPerUser
        );
        open_issue(&voting, "bob", limits.clone()).await.unwrap();
        assert_eq!(
            open_issue(&voting, "carol", limits).await.unwrap_err(),
            VoteError::TooManyActive
        );
        assert_eq!(voting.len().await, 2);
    }

    #[tokio::test]
    async fn test_ambiguous_channel_lookup() {
        let (_chat, voting) = setup();
        assert_eq!(
            voting.get_id_by_channel(CHAN).await.unwrap_err(),
            VoteError::NoneActive("in this channel")
        );

        open_issue(&voting, "alice", ConfigDoc::new()).await.unwrap();
        open_issue(&voting, "bob", ConfigDoc::new()).await.unwrap();
        assert_eq!(
            voting.get_id_by_channel(CHAN).await.unwrap_err(),
            VoteError::Ambiguous("in this channel")
        );
    }

    #[tokio::test]
    async fn test_cast_unknown_id_notifies_user() {
        let (chat, voting) = setup();
        let err = voting.cast(42, Ballot::Yes, &user("bob")).await.unwrap_err();

        assert_eq!(err, VoteError::NotFound(42));
        assert_eq!(chat.user_messages("bob").len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_rules() {
        let (chat, voting) = setup();
        let id = open_issue(&voting, "alice", ConfigDoc::new()).await.unwrap();

        assert_eq!(
            voting.cancel(id, "#other", &user("alice")).await.unwrap_err(),
            VoteError::NotFound(id)
        );
        assert_eq!(
            voting.cancel(id, CHAN, &user("bob")).await.unwrap_err(),
            VoteError::NotInitiator("alice".to_string())
        );

        voting.cancel(id, CHAN, &user("alice")).await.unwrap();
        assert!(voting.is_empty().await);
        assert_eq!(voting.count_channel(CHAN).await, 0);
        assert!(voting.praetor().exists(id));
        let record = voting.praetor().record(id).await.unwrap().unwrap();
        assert_eq!(record["outcome"], json!({"result": "canceled"}));
        assert!(chat
            .channel_messages(CHAN)
            .iter()
            .any(|m| m.contains("has been canceled")));
    }

    #[tokio::test]
    async fn test_ids_skip_archived_votes() {
        let (_chat, voting) = setup();
        voting.praetor().archive(0, &json!({})).unwrap();
        voting.praetor().archive(1, &json!({})).unwrap();

        let id = open_issue(&voting, "alice", ConfigDoc::new()).await.unwrap();
        assert_eq!(id, 2);
    }

    #[tokio::test]
    async fn test_poll_resolves_expired_votes_once() {
        let (_chat, voting) = setup();
        let expired = open_issue(&voting, "alice", cfg(&[("duration", 0)])).await.unwrap();
        let live = open_issue(&voting, "bob", ConfigDoc::new()).await.unwrap();

        assert_eq!(voting.poll().await, 1);
        assert_eq!(voting.poll().await, 0);

        assert!(voting.get(expired).await.is_err());
        assert!(voting.get(live).await.is_ok());
        let record = voting.praetor().record(expired).await.unwrap().unwrap();
        let record: VoteRecord = serde_json::from_value(record).unwrap();
        assert_eq!(record.outcome, Outcome::Passed { yes: 1, no: 0 });
    }

    #[tokio::test]
    async fn test_poll_concludes_interceded_votes() {
        let (_chat, voting) = setup();
        open_issue(&voting, "alice", cfg(&[("intercede.yes", 1)])).await.unwrap();

        assert_eq!(voting.poll().await, 1);
        assert!(voting.is_empty().await);
    }

    #[tokio::test]
    async fn test_passed_mode_vote_schedules_expiry() {
        let (_chat, voting) = setup();
        let id = voting
            .open(
                CHAN,
                &user("alice"),
                "",
                VoteKind::Mode { delta: "+m".into() },
                Some(cfg(&[("duration", 0), ("mode.expiry", 600)])),
            )
            .await
            .unwrap();

        voting.poll().await;
        let pending = voting.praetor().pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
    }

    #[tokio::test]
    async fn test_iteration_skips_failures() {
        let (_chat, voting) = setup();
        let a = open_issue(&voting, "alice", ConfigDoc::new()).await.unwrap();
        open_issue(&voting, "bob", ConfigDoc::new()).await.unwrap();

        let visited = voting
            .for_each(|v| {
                if v.id() == a {
                    Err(VoteError::Invalid("skip me".to_string()))
                } else {
                    Ok(())
                }
            })
            .await;
        assert_eq!(visited, 1);

        let mut seen = Vec::new();
        voting
            .for_each_by_account("ALICE", |v| {
                seen.push(v.id());
                Ok(())
            })
            .await;
        assert_eq!(seen, vec![a]);

        assert_eq!(voting.for_each_in_channel_mut(CHAN, |_| Ok(())).await, 2);
        assert_eq!(voting.for_each_in_channel("#empty", |_| Ok(())).await, 0);
    }

    #[tokio::test]
    async fn test_worker_resolves_and_stops() {
        let (_chat, voting) = setup();
        voting.start(Duration::from_millis(10));
        open_issue(&voting, "alice", cfg(&[("duration", 0)])).await.unwrap();

        for _ in 0..200 {
            if voting.is_empty().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(voting.is_empty().await);
        voting.shutdown().await;
    }

    #[test]
    fn test_unindex_drops_empty_sets() {
        let mut index: HashMap<String, BTreeSet<VoteId>> = HashMap::new();
        index.entry("#a".into()).or_default().insert(1);

        assert!(unindex(&mut index, "#a", 1));
        assert!(index.is_empty());
        assert!(!unindex(&mut index, "#a", 1));
    }
}
