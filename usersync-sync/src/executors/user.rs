//! User creation executor.

use super::{not_sent, properties_json, subscription_json, unexpected_payload};
use crate::executor::{ExecutionOutcome, ExecutionResult, OperationExecutor};
use crate::operation::{Operation, OperationKind, OperationPayload};
use crate::transport::{Endpoint, Transport};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

/// Creates users remotely, one request per operation. Stops at the first
/// retryable failure.
pub struct UserOperationExecutor {
    transport: Arc<dyn Transport>,
}

impl UserOperationExecutor {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl OperationExecutor for UserOperationExecutor {
    fn name(&self) -> &'static str {
        "user"
    }

    fn supported_kinds(&self) -> &'static [OperationKind] {
        &[OperationKind::CreateUser]
    }

    async fn execute(&self, batch: &[Operation]) -> Vec<ExecutionResult> {
        let mut results = Vec::with_capacity(batch.len());
        for (index, op) in batch.iter().enumerate() {
            let OperationPayload::User {
                identity,
                properties,
                subscriptions,
            } = op.payload()
            else {
                results.push(unexpected_payload(op));
                continue;
            };

            let subscriptions: Vec<Value> = subscriptions.iter().map(subscription_json).collect();
            let body = json!({
                "local_key": identity.key.as_str(),
                "identity": properties_json(identity),
                "properties": { "tags": properties_json(properties) },
                "subscriptions": subscriptions,
            });
            debug!("creating user {}", identity.key);
            let outcome = ExecutionOutcome::from(
                self.transport.send(&Endpoint::post("users"), body).await,
            );
            let stop = outcome.is_retryable();
            results.push(ExecutionResult::new(op.id(), outcome));
            if stop {
                results.extend(not_sent(&batch[index + 1..]));
                break;
            }
        }
        results
    }
}
