//! Operation repo: the durable queue of pending remote effects.
//!
//! Operations are kept in a single FIFO queue that is persisted on every
//! change. Dispatch runs one lane task per model key; a lane drains its
//! key's operations in order while lanes of different keys run in parallel,
//! bounded by `max_workers`. A retryable failure keeps the operation, and
//! everything queued behind it, at the head of its lane and backs the lane
//! off; a terminal failure drops it and reports it to the observer.

use crate::error::{SyncError, SyncResult};
use crate::executor::{ExecutionOutcome, ExecutionResult, OperationExecutor};
use crate::observer::{RepoEvent, RepoObserver};
use crate::operation::{Operation, OperationKind};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, warn};
use usersync_storage::{PersistedEntry, Persistence};
use usersync_types::{ModelKey, OperationId};

/// Configuration for the operation repo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    /// Maximum number of batches executing at once.
    pub max_workers: usize,
    /// Maximum operations handed to an executor in one call.
    pub batch_size: usize,
    /// Delay before the first retry (ms).
    pub retry_base_delay_ms: u64,
    /// Upper bound on the retry delay (ms).
    pub retry_max_delay_ms: u64,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            batch_size: 100,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 60_000,
        }
    }
}

impl RepoConfig {
    /// Delay before retry number `attempt` (1-based):
    /// `base * 2^(attempt - 1)`, capped at the maximum.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u64::MAX);
        let millis = self
            .retry_base_delay_ms
            .saturating_mul(factor)
            .min(self.retry_max_delay_ms);
        Duration::from_millis(millis)
    }
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Operation>,
    /// Model keys with a running lane task.
    lanes: HashSet<ModelKey>,
    /// Failed attempts per queued operation.
    attempts: HashMap<OperationId, u32>,
    /// False until the persisted queue has been merged in. Saving before
    /// that would overwrite it.
    restored: bool,
}

impl QueueState {
    fn contains(&self, id: OperationId) -> bool {
        self.pending.iter().any(|op| op.id() == id)
    }

    fn remove(&mut self, id: OperationId) -> Option<Operation> {
        self.attempts.remove(&id);
        let index = self.pending.iter().position(|op| op.id() == id)?;
        self.pending.remove(index)
    }
}

/// The durable operation queue and its dispatcher.
pub struct OperationRepo {
    config: RepoConfig,
    persistence: Arc<dyn Persistence>,
    store_key: String,
    observer: Arc<dyn RepoObserver>,
    runtime: Handle,
    executors: RwLock<Vec<Arc<dyn OperationExecutor>>>,
    queue: Mutex<QueueState>,
    workers: Arc<Semaphore>,
    started: AtomicBool,
    stopped: AtomicBool,
    weak: Weak<Self>,
}

impl OperationRepo {
    /// Creates a repo persisting its queue under `store_key`.
    ///
    /// Must be called from within a tokio runtime; lanes are spawned on it.
    pub fn new(
        config: RepoConfig,
        persistence: Arc<dyn Persistence>,
        store_key: impl Into<String>,
        observer: Arc<dyn RepoObserver>,
    ) -> SyncResult<Arc<Self>> {
        let runtime = Handle::try_current().map_err(|_| SyncError::NoRuntime)?;
        let workers = Arc::new(Semaphore::new(config.max_workers.max(1)));
        let store_key = store_key.into();
        Ok(Arc::new_cyclic(|weak| Self {
            config,
            persistence,
            store_key,
            observer,
            runtime,
            executors: RwLock::new(Vec::new()),
            queue: Mutex::new(QueueState::default()),
            workers,
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            weak: weak.clone(),
        }))
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    /// Registers an executor. Fails if it declares a kind another executor
    /// already handles.
    pub fn add_executor(&self, executor: Arc<dyn OperationExecutor>) -> SyncResult<()> {
        {
            let mut executors = self.executors.write().unwrap_or_else(PoisonError::into_inner);
            for existing in executors.iter() {
                if let Some(kind) = executor
                    .supported_kinds()
                    .iter()
                    .find(|kind| existing.can_handle(**kind))
                {
                    return Err(SyncError::CapabilityConflict {
                        kind: *kind,
                        existing: existing.name(),
                        incoming: executor.name(),
                    });
                }
            }
            debug!(
                "registered executor {} for {:?}",
                executor.name(),
                executor.supported_kinds()
            );
            executors.push(executor);
        }

        // Operations that were waiting for this executor can go now.
        if self.is_started() {
            self.kick_all();
        }
        Ok(())
    }

    /// Restores the persisted queue and begins dispatching. Restored
    /// operations run before anything enqueued earlier in this session.
    ///
    /// Returns the number of operations restored. Calling it again is a
    /// no-op returning 0.
    pub fn start(&self) -> SyncResult<usize> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(0);
        }

        let entries = match self.persistence.load(&self.store_key) {
            Ok(entries) => entries.unwrap_or_default(),
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };

        let restored = {
            let mut queue = self.lock_queue();
            let mut restored = Vec::with_capacity(entries.len());
            for (id, data) in &entries {
                match serde_json::from_str::<Operation>(data) {
                    Ok(op) if queue.contains(op.id()) => {
                        debug!("operation {} already queued", op.id());
                    }
                    Ok(op) => restored.push(op),
                    Err(e) => warn!("skipping unreadable cached operation {}: {}", id, e),
                }
            }
            let count = restored.len();
            for op in restored.into_iter().rev() {
                queue.pending.push_front(op);
            }
            queue.restored = true;
            self.persist(&queue);
            count
        };

        self.observer.on_event(&RepoEvent::Started { restored });
        self.kick_all();
        Ok(restored)
    }

    /// Appends an operation to the queue and persists it. Never blocks on
    /// remote work. Before [`start`](Self::start) the operation is held in
    /// memory and persisted once the cached queue has been restored.
    pub fn enqueue(&self, operation: Operation) {
        let key = operation.model_key().clone();
        self.observer.on_event(&RepoEvent::Enqueued {
            operation: operation.clone(),
        });
        {
            let mut queue = self.lock_queue();
            queue.pending.push_back(operation);
            self.persist(&queue);
        }
        if self.is_started() {
            self.kick(&key);
        }
    }

    /// Snapshot of every queued operation in queue order.
    pub fn pending(&self) -> Vec<Operation> {
        self.lock_queue().pending.iter().cloned().collect()
    }

    /// Queued operations for one model key, in queue order.
    pub fn pending_for(&self, key: &ModelKey) -> Vec<Operation> {
        self.lock_queue()
            .pending
            .iter()
            .filter(|op| op.model_key() == key)
            .cloned()
            .collect()
    }

    /// Drops every queued operation for `key`. A batch already in flight
    /// still reaches the executor, but its results are ignored.
    pub fn cancel_pending(&self, key: &ModelKey) -> usize {
        let count = {
            let mut queue = self.lock_queue();
            let QueueState {
                pending, attempts, ..
            } = &mut *queue;
            let before = pending.len();
            pending.retain(|op| {
                let keep = op.model_key() != key;
                if !keep {
                    attempts.remove(&op.id());
                }
                keep
            });
            let count = before - pending.len();
            if count > 0 {
                self.persist(&queue);
            }
            count
        };

        if count > 0 {
            self.observer.on_event(&RepoEvent::Cancelled {
                model_key: key.clone(),
                count,
            });
        }
        count
    }

    /// Waits until the queue is empty and no lane is running. Returns false
    /// if `timeout` elapses first.
    pub async fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let queue = self.lock_queue();
                if queue.pending.is_empty() && queue.lanes.is_empty() {
                    return true;
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Stops dispatching. Queued operations stay persisted for the next
    /// start; in-flight batches finish and are settled.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.workers.close();
        self.observer.on_event(&RepoEvent::Stopped);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }

    // ── Dispatch ─────────────────────────────────────────────────

    fn kick_all(&self) {
        let keys: Vec<ModelKey> = {
            let queue = self.lock_queue();
            let mut seen = HashSet::new();
            queue
                .pending
                .iter()
                .map(|op| op.model_key().clone())
                .filter(|key| seen.insert(key.clone()))
                .collect()
        };
        for key in &keys {
            self.kick(key);
        }
    }

    /// Spawns a lane for `key` unless one is already running.
    fn kick(&self, key: &ModelKey) {
        let Some(repo) = self.weak.upgrade() else {
            return;
        };
        {
            let mut queue = self.lock_queue();
            if queue.lanes.contains(key) || !queue.pending.iter().any(|op| op.model_key() == key)
            {
                return;
            }
            queue.lanes.insert(key.clone());
        }
        let key = key.clone();
        self.runtime.spawn(async move { repo.run_lane(key).await });
    }

    async fn run_lane(self: Arc<Self>, key: ModelKey) {
        loop {
            let permit = match Arc::clone(&self.workers).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    self.lock_queue().lanes.remove(&key);
                    return;
                }
            };
            let Some((executor, batch)) = self.next_batch(&key) else {
                return;
            };

            self.observer.on_event(&RepoEvent::Dispatched {
                executor: executor.name(),
                model_key: key.clone(),
                operations: batch.iter().map(Operation::id).collect(),
            });
            let results = executor.execute(&batch).await;
            drop(permit);

            if let Some((operation_id, attempt, error)) = self.settle(&batch, results) {
                let delay = self.config.backoff(attempt);
                self.observer.on_event(&RepoEvent::Retrying {
                    operation_id,
                    attempt,
                    delay,
                    reason: error.to_string(),
                });
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Takes the next batch for a lane: the contiguous run of the key's
    /// operations at the head of its lane that one executor handles. When
    /// there is nothing runnable the lane is released.
    fn next_batch(&self, key: &ModelKey) -> Option<(Arc<dyn OperationExecutor>, Vec<Operation>)> {
        let mut queue = self.lock_queue();
        let QueueState { pending, lanes, .. } = &mut *queue;

        if self.stopped.load(Ordering::SeqCst) {
            lanes.remove(key);
            return None;
        }

        let mut ops = pending.iter().filter(|op| op.model_key() == key);
        let Some(head) = ops.next() else {
            lanes.remove(key);
            return None;
        };
        let Some(executor) = self.executor_for(head.kind()) else {
            debug!(
                "no executor for {}, {} waits in the queue",
                head.kind(),
                head.id()
            );
            lanes.remove(key);
            return None;
        };

        let mut batch = vec![head.clone()];
        batch.extend(
            ops.take_while(|op| executor.can_handle(op.kind()))
                .take(self.config.batch_size.max(1) - 1)
                .cloned(),
        );
        Some((executor, batch))
    }

    /// Applies executor results to the queue in batch order.
    ///
    /// The first retryable failure ends the batch: that operation and every
    /// one after it stay queued, in order, whatever was reported for them,
    /// so a later operation never lands remotely before an earlier one.
    /// Returns the failed operation, its attempt number and the error.
    fn settle(
        &self,
        batch: &[Operation],
        results: Vec<ExecutionResult>,
    ) -> Option<(OperationId, u32, SyncError)> {
        let mut outcomes: HashMap<OperationId, ExecutionOutcome> = results
            .into_iter()
            .map(|r| (r.operation_id, r.outcome))
            .collect();

        let mut events = Vec::new();
        let mut dropped = Vec::new();
        let mut retry: Option<(OperationId, u32, SyncError)> = None;
        {
            let mut queue = self.lock_queue();
            for op in batch {
                if !queue.contains(op.id()) {
                    debug!("ignoring result for cancelled operation {}", op.id());
                    continue;
                }
                if retry.is_some() {
                    continue;
                }
                let outcome = outcomes
                    .remove(&op.id())
                    .unwrap_or_else(|| ExecutionOutcome::Retryable("no result reported".into()));
                match outcome.into_error() {
                    None => {
                        queue.remove(op.id());
                        events.push(RepoEvent::Completed {
                            operation_id: op.id(),
                        });
                    }
                    Some(error) if error.is_retryable() => {
                        let attempts = queue.attempts.entry(op.id()).or_insert(0);
                        *attempts += 1;
                        retry = Some((op.id(), *attempts, error));
                    }
                    Some(error) => {
                        queue.remove(op.id());
                        events.push(RepoEvent::Dropped {
                            operation: op.clone(),
                            reason: error.to_string(),
                        });
                        dropped.push((op.clone(), error));
                    }
                }
            }
            self.persist(&queue);
        }

        for event in &events {
            self.observer.on_event(event);
        }
        for (op, error) in &dropped {
            self.observer.on_terminal_failure(op, error);
        }
        retry
    }

    fn executor_for(&self, kind: OperationKind) -> Option<Arc<dyn OperationExecutor>> {
        self.executors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|e| e.can_handle(kind))
            .cloned()
    }

    // ── Persistence ──────────────────────────────────────────────

    /// Saves the queue. Called with the queue lock held so saves land in
    /// mutation order.
    fn persist(&self, queue: &QueueState) {
        if !queue.restored {
            return;
        }
        let serialized: Result<Vec<PersistedEntry>, serde_json::Error> = queue
            .pending
            .iter()
            .map(|op| serde_json::to_string(op).map(|data| (op.id().to_string(), data)))
            .collect();
        let result = match serialized {
            Ok(entries) => self
                .persistence
                .save(&self.store_key, &entries)
                .map_err(SyncError::from),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!("failed to persist operation queue: {}", e);
        }
    }

    fn lock_queue(&self) -> MutexGuard<'_, QueueState> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for OperationRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRepo")
            .field("store_key", &self.store_key)
            .field("pending", &self.lock_queue().pending.len())
            .field("started", &self.is_started())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        let config = RepoConfig {
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 1_000,
            ..RepoConfig::default()
        };
        assert_eq!(config.backoff(1), Duration::from_millis(100));
        assert_eq!(config.backoff(2), Duration::from_millis(200));
        assert_eq!(config.backoff(4), Duration::from_millis(800));
        assert_eq!(config.backoff(5), Duration::from_millis(1_000));
        assert_eq!(config.backoff(200), Duration::from_millis(1_000));
    }

    #[test]
    fn config_fills_missing_fields_with_defaults() {
        let config: RepoConfig = serde_json::from_str(r#"{"batch_size": 10}"#).unwrap();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.retry_max_delay_ms, 60_000);
    }
}
