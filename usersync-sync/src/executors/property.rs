//! Tag executor.

use super::{results_for, unexpected_payload};
use crate::executor::{ExecutionResult, OperationExecutor};
use crate::operation::{Operation, OperationKind, OperationPayload};
use crate::transport::{Endpoint, Transport};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// Sends tag updates. A batch becomes one request and its single outcome
/// applies to every operation in it; later writes to the same tag win.
pub struct PropertyOperationExecutor {
    transport: Arc<dyn Transport>,
}

impl PropertyOperationExecutor {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl OperationExecutor for PropertyOperationExecutor {
    fn name(&self) -> &'static str {
        "property"
    }

    fn supported_kinds(&self) -> &'static [OperationKind] {
        &[OperationKind::UpdateProperty]
    }

    async fn execute(&self, batch: &[Operation]) -> Vec<ExecutionResult> {
        let mut results = Vec::new();
        let mut tags = Map::new();
        let mut sendable = Vec::with_capacity(batch.len());

        for op in batch {
            match op.payload() {
                OperationPayload::Delta {
                    property,
                    new_value,
                    ..
                } => {
                    tags.insert(property.clone(), new_value.to_json());
                    sendable.push(op.clone());
                }
                _ => results.push(unexpected_payload(op)),
            }
        }
        let Some(first) = sendable.first() else {
            return results;
        };

        let endpoint = Endpoint::patch(format!("users/by/key/{}/properties", first.model_key()));
        let body = json!({ "properties": { "tags": Value::Object(tags) } });
        let outcome = self.transport.send(&endpoint, body).await;
        results.extend(results_for(&sendable, outcome.into()));
        results
    }
}
