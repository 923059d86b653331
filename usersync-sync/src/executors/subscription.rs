//! Subscription executor.

use super::{not_sent, subscription_json, unexpected_payload};
use crate::executor::{ExecutionOutcome, ExecutionResult, OperationExecutor};
use crate::operation::{Operation, OperationKind, OperationPayload};
use crate::transport::{Endpoint, Transport, TransportOutcome};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// Creates, updates and deletes subscriptions, one request per operation.
/// Stops at the first retryable failure.
pub struct SubscriptionOperationExecutor {
    transport: Arc<dyn Transport>,
}

impl SubscriptionOperationExecutor {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    async fn send_one(&self, op: &Operation) -> Option<TransportOutcome> {
        let key = op.model_key();
        let (endpoint, body) = match (op.kind(), op.payload()) {
            (OperationKind::CreateSubscription, OperationPayload::Snapshot { model }) => {
                let owner = model.properties.get("owner").and_then(|v| v.as_str())?;
                (
                    Endpoint::post(format!("users/by/key/{owner}/subscriptions")),
                    json!({ "subscription": subscription_json(model) }),
                )
            }
            (
                OperationKind::UpdateSubscription,
                OperationPayload::Delta {
                    property,
                    new_value,
                    ..
                },
            ) => {
                let mut changes = Map::new();
                changes.insert(property.clone(), new_value.to_json());
                (
                    Endpoint::patch(format!("subscriptions/{key}")),
                    json!({ "subscription": Value::Object(changes) }),
                )
            }
            (OperationKind::DeleteSubscription, OperationPayload::Snapshot { .. }) => {
                (Endpoint::delete(format!("subscriptions/{key}")), Value::Null)
            }
            _ => return None,
        };
        Some(self.transport.send(&endpoint, body).await)
    }
}

#[async_trait]
impl OperationExecutor for SubscriptionOperationExecutor {
    fn name(&self) -> &'static str {
        "subscription"
    }

    fn supported_kinds(&self) -> &'static [OperationKind] {
        &[
            OperationKind::CreateSubscription,
            OperationKind::UpdateSubscription,
            OperationKind::DeleteSubscription,
        ]
    }

    async fn execute(&self, batch: &[Operation]) -> Vec<ExecutionResult> {
        let mut results = Vec::with_capacity(batch.len());
        for (index, op) in batch.iter().enumerate() {
            let Some(outcome) = self.send_one(op).await else {
                results.push(unexpected_payload(op));
                continue;
            };
            let outcome = ExecutionOutcome::from(outcome);
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
