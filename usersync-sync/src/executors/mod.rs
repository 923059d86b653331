//! Executors for the user, identity, property, subscription and outcome
//! operations.
//!
//! Each executor maps its operations onto backend requests through a
//! [`Transport`](crate::transport::Transport) and reports one result per
//! operation.

mod identity;
mod outcome;
mod property;
mod subscription;
mod user;

pub use identity::IdentityOperationExecutor;
pub use outcome::OutcomeOperationExecutor;
pub use property::PropertyOperationExecutor;
pub use subscription::SubscriptionOperationExecutor;
pub use user::UserOperationExecutor;

use crate::executor::{ExecutionOutcome, ExecutionResult};
use crate::operation::Operation;
use serde_json::{Map, Value};
use usersync_model::ModelSnapshot;

/// Applies one outcome to every operation of a batch.
fn results_for(batch: &[Operation], outcome: ExecutionOutcome) -> Vec<ExecutionResult> {
    batch
        .iter()
        .map(|op| ExecutionResult::new(op.id(), outcome.clone()))
        .collect()
}

/// Results for the operations of a batch left unsent after a retryable
/// failure.
fn not_sent(ops: &[Operation]) -> Vec<ExecutionResult> {
    results_for(
        ops,
        ExecutionOutcome::Retryable("not sent after an earlier failure".into()),
    )
}

fn unexpected_payload(op: &Operation) -> ExecutionResult {
    ExecutionResult::new(
        op.id(),
        ExecutionOutcome::Terminal(format!("unexpected payload for {}", op.kind())),
    )
}

/// Properties of a snapshot as a JSON object.
fn properties_json(snapshot: &ModelSnapshot) -> Map<String, Value> {
    snapshot
        .properties
        .iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect()
}

/// Subscription body: the local key plus the stored properties.
fn subscription_json(snapshot: &ModelSnapshot) -> Value {
    let mut body = properties_json(snapshot);
    body.insert("id".into(), Value::String(snapshot.key.to_string()));
    Value::Object(body)
}
