//! Observation of the operation repo.
//!
//! The repo reports every queue transition to a [`RepoObserver`]. Terminal
//! failures are additionally surfaced through
//! [`RepoObserver::on_terminal_failure`] since nothing else will ever see
//! the dropped operation again.

use crate::error::SyncError;
use crate::operation::Operation;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};
use usersync_types::{ModelKey, OperationId};

/// A transition of the operation queue.
#[derive(Debug, Clone, PartialEq)]
pub enum RepoEvent {
    /// The repo started and restored `restored` operations from the cache.
    Started { restored: usize },
    Enqueued { operation: Operation },
    /// A batch was handed to an executor.
    Dispatched {
        executor: &'static str,
        model_key: ModelKey,
        operations: Vec<OperationId>,
    },
    Completed { operation_id: OperationId },
    Retrying {
        operation_id: OperationId,
        attempt: u32,
        delay: Duration,
        reason: String,
    },
    /// The operation was rejected and removed from the queue.
    Dropped { operation: Operation, reason: String },
    /// Pending operations of a model were discarded.
    Cancelled { model_key: ModelKey, count: usize },
    Stopped,
}

/// Receives queue transitions. Called from worker tasks; must not block.
pub trait RepoObserver: Send + Sync {
    fn on_event(&self, event: &RepoEvent);

    fn on_terminal_failure(&self, _operation: &Operation, _error: &SyncError) {}
}

/// Logs every transition with `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RepoObserver for TracingObserver {
    fn on_event(&self, event: &RepoEvent) {
        match event {
            RepoEvent::Started { restored } => {
                info!("operation repo started, {} operations restored", restored)
            }
            RepoEvent::Enqueued { operation } => debug!(
                "enqueued {} {} for {}",
                operation.kind(),
                operation.id(),
                operation.model_key()
            ),
            RepoEvent::Dispatched {
                executor,
                model_key,
                operations,
            } => debug!(
                "dispatching {} operations for {} to {}",
                operations.len(),
                model_key,
                executor
            ),
            RepoEvent::Completed { operation_id } => debug!("operation {} completed", operation_id),
            RepoEvent::Retrying {
                operation_id,
                attempt,
                delay,
                reason,
            } => warn!(
                "operation {} failed (attempt {}), retrying in {:?}: {}",
                operation_id, attempt, delay, reason
            ),
            RepoEvent::Dropped { operation, reason } => warn!(
                "dropping {} {} for {}: {}",
                operation.kind(),
                operation.id(),
                operation.model_key(),
                reason
            ),
            RepoEvent::Cancelled { model_key, count } => {
                info!("cancelled {} pending operations for {}", count, model_key)
            }
            RepoEvent::Stopped => info!("operation repo stopped"),
        }
    }
}

/// Ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RepoObserver for NoopObserver {
    fn on_event(&self, _event: &RepoEvent) {}
}

/// Keeps every event in memory. Meant for tests and diagnostics.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<RepoEvent>>,
    failures: Mutex<Vec<(OperationId, String)>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RepoEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Operations reported through `on_terminal_failure`, with the error text.
    pub fn terminal_failures(&self) -> Vec<(OperationId, String)> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn completed(&self) -> Vec<OperationId> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RepoEvent::Completed { operation_id } => Some(operation_id),
                _ => None,
            })
            .collect()
    }
}

impl RepoObserver for RecordingObserver {
    fn on_event(&self, event: &RepoEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }

    fn on_terminal_failure(&self, operation: &Operation, error: &SyncError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((operation.id(), error.to_string()));
    }
}
