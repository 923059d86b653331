//! Operation executor capability contract.

use crate::error::SyncError;
use crate::operation::{Operation, OperationKind};
use crate::transport::TransportOutcome;
use async_trait::async_trait;
use usersync_types::OperationId;

/// Outcome of executing one operation.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// The remote effect is durable. The operation leaves the queue.
    Success,
    /// Transient failure. The operation stays queued and is retried.
    Retryable(String),
    /// Permanent rejection. The operation is dropped and reported.
    Terminal(String),
}

impl ExecutionOutcome {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// The remote failure this outcome reports, if any.
    pub fn into_error(self) -> Option<SyncError> {
        match self {
            Self::Success => None,
            Self::Retryable(reason) => Some(SyncError::RetryableRemoteFailure(reason)),
            Self::Terminal(reason) => Some(SyncError::TerminalRemoteFailure(reason)),
        }
    }
}

impl From<TransportOutcome> for ExecutionOutcome {
    fn from(outcome: TransportOutcome) -> Self {
        match outcome {
            TransportOutcome::Success(_) => Self::Success,
            TransportOutcome::RetryableFailure(reason) => Self::Retryable(reason),
            TransportOutcome::TerminalFailure(reason) => Self::Terminal(reason),
        }
    }
}

/// Per-operation result. Batched executors still report one result per
/// operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub operation_id: OperationId,
    pub outcome: ExecutionOutcome,
}

impl ExecutionResult {
    pub fn new(operation_id: OperationId, outcome: impl Into<ExecutionOutcome>) -> Self {
        Self {
            operation_id,
            outcome: outcome.into(),
        }
    }
}

/// Performs the remote side of the operation kinds it declares.
///
/// The repo hands an executor batches of consecutive operations for a
/// single model key, all of kinds it supports. Operations missing from the
/// returned results are treated as retryable.
///
/// Batches must be sent in order. Once a request fails retryably, nothing
/// after it may be sent: the rest of the batch is reported retryable and
/// goes out again, in order, behind the failed operation.
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    /// Name used in logs and conflict errors.
    fn name(&self) -> &'static str;

    /// The operation kinds this executor handles.
    fn supported_kinds(&self) -> &'static [OperationKind];

    fn can_handle(&self, kind: OperationKind) -> bool {
        self.supported_kinds().contains(&kind)
    }

    async fn execute(&self, batch: &[Operation]) -> Vec<ExecutionResult>;
}
