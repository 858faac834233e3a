//! Deadline scheduler and vote archive.
//!
//! The praetor keeps an ordered list of `(vote id, deadline)` pairs and runs a
//! background task that hands each one to a [`DeadlineHandler`] once it falls
//! due. It also owns the archive of resolved votes: records are accepted
//! synchronously (so id allocation sees them at once) and written to the
//! [`PraetorStore`] by the worker.
//!
//! Pending entries are removed from the store only after their handler has
//! run, so a crash mid-run replays them on the next start.

pub mod schedule;
pub mod store;

pub use schedule::{Deadline, Schedule};
pub use store::{JsonFileStore, MemoryStore, PraetorError, PraetorResult, PraetorStore};

use crate::clock::now_secs;
use crate::vote::VoteId;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Upper bound on a single worker sleep, in seconds.
pub const MAX_SLEEP: i64 = 3600;

/// Called by the worker for every deadline that falls due.
#[async_trait]
pub trait DeadlineHandler: Send + Sync {
    /// `record` is the archived record for `id`, if there is one.
    async fn on_deadline(&self, id: VoteId, record: Option<Value>) -> PraetorResult<()>;
}

pub struct Praetor {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    state: Mutex<State>,
    notify: Notify,
    interrupted: AtomicBool,
}

#[derive(Default)]
struct State {
    schedule: Schedule,
    archived: BTreeSet<VoteId>,
    /// Records accepted but not yet written.
    outbox: Vec<(VoteId, Value)>,
    /// Schedule differs from what was last persisted.
    dirty: bool,
    store: Option<Arc<dyn PraetorStore>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    fn wake(&self) {
        self.notify.notify_one();
    }
}

impl Default for Praetor {
    fn default() -> Self {
        Self::new()
    }
}

impl Praetor {
    /// An idle scheduler. Scheduling and archiving work before [`start`],
    /// but nothing is persisted or processed until then.
    ///
    /// [`start`]: Praetor::start
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
                interrupted: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Load persisted state from `store` and spawn the worker.
    ///
    /// Entries scheduled before the call are kept alongside the loaded ones.
    pub async fn start(
        &self,
        store: Arc<dyn PraetorStore>,
        handler: Arc<dyn DeadlineHandler>,
    ) -> PraetorResult<()> {
        let pending = store.load_pending().await?;
        let archived = store.archived_ids().await?;

        {
            let mut state = self.shared.lock();
            if state.store.is_some() {
                return Err(PraetorError::Store("scheduler already started".to_string()));
            }
            let loaded = pending.len();
            let mut schedule = Schedule::from_entries(pending);
            for entry in state.schedule.entries() {
                schedule.insert(entry.id, entry.at);
            }
            state.dirty = schedule.len() != loaded;
            state.schedule = schedule;
            state.archived.extend(archived);
            state.store = Some(store.clone());
            info!(
                pending = state.schedule.len(),
                archived = state.archived.len(),
                "praetor started"
            );
        }

        self.shared.interrupted.store(false, Ordering::SeqCst);
        let shared = self.shared.clone();
        let handle = tokio::spawn(run(shared, store, handler));
        *self.worker.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(())
    }

    /// Stop the worker and wait for it. An entry already being handled
    /// completes, and queued archive records are written before it exits.
    pub async fn shutdown(&self) {
        self.shared.interrupted.store(true, Ordering::SeqCst);
        self.shared.wake();
        let handle = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("praetor worker panicked: {}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Schedule `id` for processing at the absolute unix time `at`.
    ///
    /// The worker is always woken so the new entry reaches the store
    /// promptly, not only when it becomes the earliest deadline.
    pub fn schedule(&self, id: VoteId, at: u64) {
        let earliest = {
            let mut state = self.shared.lock();
            state.dirty = true;
            state.schedule.insert(id, at)
        };
        debug!(vote = id, at, earliest, "deadline scheduled");
        self.shared.wake();
    }

    /// Archive a resolved vote under `id`.
    pub fn archive<R: Serialize>(&self, id: VoteId, record: &R) -> PraetorResult<()> {
        let value = serde_json::to_value(record)?;
        {
            let mut state = self.shared.lock();
            state.archived.insert(id);
            state.outbox.push((id, value));
        }
        self.shared.wake();
        Ok(())
    }

    /// True if `id` has been archived.
    pub fn exists(&self, id: VoteId) -> bool {
        self.shared.lock().archived.contains(&id)
    }

    /// Read back an archived record, including ones not yet written.
    pub async fn record(&self, id: VoteId) -> PraetorResult<Option<Value>> {
        lookup(&self.shared, id).await
    }

    /// Snapshot of the schedule in processing order.
    pub fn pending(&self) -> Vec<Deadline> {
        self.shared.lock().schedule.entries()
    }
}

impl Drop for Praetor {
    fn drop(&mut self) {
        self.shared.interrupted.store(true, Ordering::SeqCst);
        self.shared.wake();
    }
}

async fn lookup(shared: &Shared, id: VoteId) -> PraetorResult<Option<Value>> {
    let store = {
        let state = shared.lock();
        if let Some((_, record)) = state.outbox.iter().rev().find(|(i, _)| *i == id) {
            return Ok(Some(record.clone()));
        }
        state.store.clone()
    };
    match store {
        Some(store) => store.record(id).await,
        None => Ok(None),
    }
}

async fn flush(shared: &Shared, store: &dyn PraetorStore) {
    let outbox = std::mem::take(&mut shared.lock().outbox);
    if outbox.is_empty() {
        return;
    }
    if let Err(e) = store.store_records(&outbox).await {
        warn!(records = outbox.len(), "archive write failed: {}", e);
        let mut state = shared.lock();
        let newer = std::mem::replace(&mut state.outbox, outbox);
        state.outbox.extend(newer);
    }
}

async fn persist(shared: &Shared, store: &dyn PraetorStore) {
    let snapshot = {
        let mut state = shared.lock();
        if !state.dirty {
            return;
        }
        state.dirty = false;
        state.schedule.entries()
    };
    if let Err(e) = store.save_pending(&snapshot).await {
        warn!(pending = snapshot.len(), "pending write failed: {}", e);
        shared.lock().dirty = true;
    }
}

async fn run(shared: Arc<Shared>, store: Arc<dyn PraetorStore>, handler: Arc<dyn DeadlineHandler>) {
    loop {
        flush(&shared, &*store).await;
        persist(&shared, &*store).await;
        if shared.interrupted() {
            break;
        }

        loop {
            let due = {
                let mut state = shared.lock();
                let due = state.schedule.pop_due(now_secs());
                if due.is_some() {
                    state.dirty = true;
                }
                due
            };
            let Some(deadline) = due else { break };

            let record = match lookup(&shared, deadline.id).await {
                Ok(record) => record,
                Err(e) => {
                    warn!(vote = deadline.id, "archived record unavailable: {}", e);
                    None
                }
            };
            match handler.on_deadline(deadline.id, record).await {
                Ok(()) => debug!(vote = deadline.id, "deadline handled"),
                Err(e) => error!(vote = deadline.id, "deadline handler failed: {}", e),
            }

            if shared.interrupted() {
                break;
            }
        }

        flush(&shared, &*store).await;
        persist(&shared, &*store).await;
        if shared.interrupted() {
            break;
        }

        let wait = shared.lock().schedule.next_rel().clamp(0, MAX_SLEEP);
        if wait > 0 {
            let _ = tokio::time::timeout(
                Duration::from_secs(wait as u64),
                shared.notify.notified(),
            )
            .await;
        }
    }
    info!("praetor stopped");
}
