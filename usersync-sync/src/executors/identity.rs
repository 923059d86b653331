//! Alias executor.

use super::{not_sent, results_for, unexpected_payload};
use crate::executor::{ExecutionOutcome, ExecutionResult, OperationExecutor};
use crate::operation::{Operation, OperationKind, OperationPayload};
use crate::transport::{Endpoint, Transport};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// Adds and removes aliases.
///
/// Consecutive `set-alias` operations go out as one request; each
/// `delete-alias` is its own request.
pub struct IdentityOperationExecutor {
    transport: Arc<dyn Transport>,
}

impl IdentityOperationExecutor {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    async fn set_aliases(&self, ops: &[Operation]) -> ExecutionOutcome {
        let Some(first) = ops.first() else {
            return ExecutionOutcome::Success;
        };
        let mut aliases = Map::new();
        for op in ops {
            if let OperationPayload::Delta {
                property,
                new_value,
                ..
            } = op.payload()
            {
                aliases.insert(property.clone(), new_value.to_json());
            }
        }
        let endpoint = Endpoint::patch(format!("users/by/key/{}/identity", first.model_key()));
        self.transport
            .send(&endpoint, json!({ "identity": Value::Object(aliases) }))
            .await
            .into()
    }

    async fn delete_alias(&self, op: &Operation, label: &str) -> ExecutionOutcome {
        let endpoint = Endpoint::delete(format!(
            "users/by/key/{}/identity/{}",
            op.model_key(),
            label
        ));
        self.transport.send(&endpoint, Value::Null).await.into()
    }
}

fn is_set_alias(op: &Operation) -> bool {
    op.kind() == OperationKind::SetAlias && matches!(op.payload(), OperationPayload::Delta { .. })
}

#[async_trait]
impl OperationExecutor for IdentityOperationExecutor {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn supported_kinds(&self) -> &'static [OperationKind] {
        &[OperationKind::SetAlias, OperationKind::DeleteAlias]
    }

    async fn execute(&self, batch: &[Operation]) -> Vec<ExecutionResult> {
        let mut results = Vec::with_capacity(batch.len());
        let mut index = 0;

        while index < batch.len() {
            let op = &batch[index];
            let (sent, outcome) = if is_set_alias(op) {
                let run = batch[index..].iter().take_while(|op| is_set_alias(op)).count();
                let sent = &batch[index..index + run];
                (sent, self.set_aliases(sent).await)
            } else if let (OperationKind::DeleteAlias, OperationPayload::Delta { property, .. }) =
                (op.kind(), op.payload())
            {
                (
                    std::slice::from_ref(op),
                    self.delete_alias(op, property).await,
                )
            } else {
                results.push(unexpected_payload(op));
                index += 1;
                continue;
            };

            index += sent.len();
            let stop = outcome.is_retryable();
            results.extend(results_for(sent, outcome));
            if stop {
                results.extend(not_sent(&batch[index..]));
                break;
            }
        }
        results
    }
}
