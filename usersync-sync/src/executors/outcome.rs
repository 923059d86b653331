//! Outcome executor.

use super::{not_sent, unexpected_payload};
use crate::executor::{ExecutionOutcome, ExecutionResult, OperationExecutor};
use crate::operation::{Operation, OperationKind, OperationPayload};
use crate::transport::{Endpoint, Transport};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// Reports outcomes, one request per operation. Stops at the first
/// retryable failure.
pub struct OutcomeOperationExecutor {
    transport: Arc<dyn Transport>,
}

impl OutcomeOperationExecutor {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl OperationExecutor for OutcomeOperationExecutor {
    fn name(&self) -> &'static str {
        "outcome"
    }

    fn supported_kinds(&self) -> &'static [OperationKind] {
        &[OperationKind::TrackOutcome]
    }

    async fn execute(&self, batch: &[Operation]) -> Vec<ExecutionResult> {
        let mut results = Vec::with_capacity(batch.len());
        for (index, op) in batch.iter().enumerate() {
            let OperationPayload::Outcome {
                name,
                value,
                unique,
            } = op.payload()
            else {
                results.push(unexpected_payload(op));
                continue;
            };

            let mut body = Map::new();
            body.insert("local_key".into(), json!(op.model_key().as_str()));
            body.insert("id".into(), json!(name));
            body.insert("unique".into(), json!(unique));
            if let Some(value) = value {
                body.insert("value".into(), json!(value));
            }
            let outcome = ExecutionOutcome::from(
                self.transport
                    .send(&Endpoint::post("outcomes/measure"), Value::Object(body))
                    .await,
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
