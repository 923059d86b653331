use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use usersync_model::{IdentityModel, PropertiesModel, SubscriptionKind, SubscriptionModel};
use usersync_sync::transport::mock::MockTransport;
use usersync_sync::{
    Endpoint, ExecutionOutcome, IdentityOperationExecutor, Operation, OperationExecutor,
    OperationKind, OutcomeOperationExecutor, PropertyOperationExecutor,
    SubscriptionOperationExecutor, TransportOutcome, UserOperationExecutor,
};
use usersync_types::{ModelKey, PropertyValue};

fn key(s: &str) -> ModelKey {
    ModelKey::new(s).unwrap()
}

fn delta(kind: OperationKind, model: &str, property: &str, new_value: PropertyValue) -> Operation {
    Operation::delta(kind, key(model), property, PropertyValue::Null, new_value)
}

fn outcomes(results: &[usersync_sync::ExecutionResult]) -> Vec<ExecutionOutcome> {
    results.iter().map(|r| r.outcome.clone()).collect()
}

// ── Properties ───────────────────────────────────────────────────

#[tokio::test]
async fn property_batch_is_one_request() {
    let transport = Arc::new(MockTransport::new());
    let executor = PropertyOperationExecutor::new(transport.clone());
    let batch = vec![
        delta(OperationKind::UpdateProperty, "u1", "plan", "free".into()),
        delta(OperationKind::UpdateProperty, "u1", "level", 3i64.into()),
        delta(OperationKind::UpdateProperty, "u1", "plan", "pro".into()),
    ];

    let results = executor.execute(&batch).await;

    assert_eq!(outcomes(&results), vec![ExecutionOutcome::Success; 3]);
    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].endpoint, Endpoint::patch("users/by/key/u1/properties"));
    assert_eq!(
        requests[0].payload,
        json!({ "properties": { "tags": { "plan": "pro", "level": 3.0 } } })
    );
}

#[tokio::test]
async fn property_failure_applies_to_whole_batch() {
    let transport = Arc::new(MockTransport::new());
    transport.push_outcome("properties", TransportOutcome::RetryableFailure("503".into()));
    let executor = PropertyOperationExecutor::new(transport.clone());
    let batch = vec![
        delta(OperationKind::UpdateProperty, "u1", "a", "1".into()),
        delta(OperationKind::UpdateProperty, "u1", "b", PropertyValue::Null),
    ];

    let results = executor.execute(&batch).await;

    assert_eq!(
        outcomes(&results),
        vec![ExecutionOutcome::Retryable("503".into()); 2]
    );
    assert_eq!(
        transport.requests()[0].payload,
        json!({ "properties": { "tags": { "a": "1", "b": null } } })
    );
}

// ── Identity ─────────────────────────────────────────────────────

#[tokio::test]
async fn consecutive_aliases_share_a_request() {
    let transport = Arc::new(MockTransport::new());
    transport.push_outcome("identity/old", TransportOutcome::TerminalFailure("404".into()));
    let executor = IdentityOperationExecutor::new(transport.clone());
    let batch = vec![
        delta(OperationKind::SetAlias, "u1", "crm", "c-1".into()),
        delta(OperationKind::SetAlias, "u1", "shop", "s-1".into()),
        delta(OperationKind::DeleteAlias, "u1", "old", PropertyValue::Null),
        delta(OperationKind::SetAlias, "u1", "web", "w-1".into()),
    ];

    let results = executor.execute(&batch).await;

    let ids: Vec<_> = results.iter().map(|r| r.operation_id).collect();
    assert_eq!(ids, batch.iter().map(Operation::id).collect::<Vec<_>>());
    assert_eq!(
        outcomes(&results),
        vec![
            ExecutionOutcome::Success,
            ExecutionOutcome::Success,
            ExecutionOutcome::Terminal("404".into()),
            ExecutionOutcome::Success,
        ]
    );

    let endpoints: Vec<String> = transport
        .requests()
        .iter()
        .map(|r| r.endpoint.to_string())
        .collect();
    assert_eq!(
        endpoints,
        vec![
            "PATCH users/by/key/u1/identity",
            "DELETE users/by/key/u1/identity/old",
            "PATCH users/by/key/u1/identity",
        ]
    );
    assert_eq!(
        transport.requests()[0].payload,
        json!({ "identity": { "crm": "c-1", "shop": "s-1" } })
    );
}

#[tokio::test]
async fn retryable_alias_failure_stops_the_batch() {
    let transport = Arc::new(MockTransport::new());
    transport.push_outcome("identity", TransportOutcome::RetryableFailure("503".into()));
    let executor = IdentityOperationExecutor::new(transport.clone());
    let batch = vec![
        delta(OperationKind::SetAlias, "u1", "crm", "c-1".into()),
        delta(OperationKind::DeleteAlias, "u1", "crm", PropertyValue::Null),
        delta(OperationKind::SetAlias, "u1", "web", "w-1".into()),
    ];

    let results = executor.execute(&batch).await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].outcome, ExecutionOutcome::Retryable("503".into()));
    assert!(results[1..].iter().all(|r| r.outcome.is_retryable()));
    assert_eq!(transport.requests().len(), 1);
}

// ── Users ────────────────────────────────────────────────────────

#[tokio::test]
async fn create_user_carries_identity_tags_and_subscriptions() {
    let transport = Arc::new(MockTransport::new());
    let executor = UserOperationExecutor::new(transport.clone());

    let identity = IdentityModel::new(key("u1"));
    identity.model().hydrate(usersync_model::EXTERNAL_ID, "alice");
    let properties = PropertiesModel::new(key("u1"));
    properties.set_tag("plan", "pro");
    let push = SubscriptionModel::new(SubscriptionKind::Push, Some("token-1"), None);

    let op = Operation::create_user(
        identity.model().snapshot(),
        properties.model().snapshot(),
        vec![push.model().snapshot()],
    );
    assert_eq!(op.model_key(), &key("u1"));

    let results = executor.execute(std::slice::from_ref(&op)).await;
    assert_eq!(outcomes(&results), vec![ExecutionOutcome::Success]);

    let requests = transport.requests_to("users");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].endpoint, Endpoint::post("users"));
    assert_eq!(
        requests[0].payload,
        json!({
            "local_key": "u1",
            "identity": { "external_id": "alice" },
            "properties": { "tags": { "plan": "pro" } },
            "subscriptions": [{
                "id": push.key().as_str(),
                "type": "push",
                "address": "token-1",
                "enabled": false,
            }],
        })
    );
}

#[tokio::test]
async fn wrong_payload_is_terminal() {
    let transport = Arc::new(MockTransport::new());
    let executor = UserOperationExecutor::new(transport.clone());
    let op = delta(OperationKind::CreateUser, "u1", "x", "y".into());

    let results = executor.execute(&[op]).await;

    assert!(matches!(results[0].outcome, ExecutionOutcome::Terminal(_)));
    assert!(transport.requests().is_empty());
}

// ── Subscriptions ────────────────────────────────────────────────

#[tokio::test]
async fn subscription_lifecycle_requests() {
    let transport = Arc::new(MockTransport::new());
    let executor = SubscriptionOperationExecutor::new(transport.clone());
    let email = SubscriptionModel::new(SubscriptionKind::Email, Some("a@b.c"), Some(&key("u1")));
    let sub_key = email.key().clone();

    let create = Operation::snapshot(OperationKind::CreateSubscription, email.model().snapshot());
    let update = Operation::delta(
        OperationKind::UpdateSubscription,
        sub_key.clone(),
        "enabled",
        PropertyValue::from(true),
        PropertyValue::from(false),
    );
    let delete = Operation::snapshot(OperationKind::DeleteSubscription, email.model().snapshot());

    let results = executor.execute(&[create, update, delete]).await;
    assert_eq!(outcomes(&results), vec![ExecutionOutcome::Success; 3]);

    let requests = transport.requests();
    assert_eq!(
        requests
            .iter()
            .map(|r| r.endpoint.clone())
            .collect::<Vec<_>>(),
        vec![
            Endpoint::post("users/by/key/u1/subscriptions"),
            Endpoint::patch(format!("subscriptions/{sub_key}")),
            Endpoint::delete(format!("subscriptions/{sub_key}")),
        ]
    );
    assert_eq!(requests[0].payload["subscription"]["address"], json!("a@b.c"));
    assert_eq!(
        requests[1].payload,
        json!({ "subscription": { "enabled": false } })
    );
}

#[tokio::test]
async fn retryable_subscription_failure_stops_the_batch() {
    let transport = Arc::new(MockTransport::new());
    transport.push_outcome("subscriptions", TransportOutcome::RetryableFailure("timeout".into()));
    let executor = SubscriptionOperationExecutor::new(transport.clone());
    let email = SubscriptionModel::new(SubscriptionKind::Email, Some("a@b.c"), Some(&key("u1")));
    let create = Operation::snapshot(OperationKind::CreateSubscription, email.model().snapshot());
    let delete = Operation::snapshot(OperationKind::DeleteSubscription, email.model().snapshot());

    let results = executor.execute(&[create, delete]).await;

    assert_eq!(
        outcomes(&results)[0],
        ExecutionOutcome::Retryable("timeout".into())
    );
    assert!(results[1].outcome.is_retryable());
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn create_without_owner_is_terminal() {
    let transport = Arc::new(MockTransport::new());
    let executor = SubscriptionOperationExecutor::new(transport.clone());
    let orphan = SubscriptionModel::new(SubscriptionKind::Sms, Some("+15550100"), None);
    let op = Operation::snapshot(OperationKind::CreateSubscription, orphan.model().snapshot());

    let results = executor.execute(&[op]).await;

    assert!(matches!(results[0].outcome, ExecutionOutcome::Terminal(_)));
    assert!(transport.requests().is_empty());
}

// ── Outcomes ─────────────────────────────────────────────────────

#[tokio::test]
async fn outcomes_are_reported_one_request_each() {
    let transport = Arc::new(MockTransport::new());
    let executor = OutcomeOperationExecutor::new(transport.clone());
    let batch = vec![
        Operation::outcome(key("u1"), "opened", None, true),
        Operation::outcome(key("u1"), "purchase", Some(4.5), false),
    ];

    let results = executor.execute(&batch).await;

    assert_eq!(outcomes(&results), vec![ExecutionOutcome::Success; 2]);
    let requests = transport.requests_to("outcomes/measure");
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[0].payload,
        json!({ "local_key": "u1", "id": "opened", "unique": true })
    );
    assert_eq!(
        requests[1].payload,
        json!({ "local_key": "u1", "id": "purchase", "unique": false, "value": 4.5 })
    );
}

#[test]
fn executors_declare_disjoint_kinds() {
    let transport = Arc::new(MockTransport::new());
    let executors: Vec<Box<dyn OperationExecutor>> = vec![
        Box::new(UserOperationExecutor::new(transport.clone())),
        Box::new(IdentityOperationExecutor::new(transport.clone())),
        Box::new(PropertyOperationExecutor::new(transport.clone())),
        Box::new(SubscriptionOperationExecutor::new(transport.clone())),
        Box::new(OutcomeOperationExecutor::new(transport)),
    ];
    for kind in OperationKind::ALL {
        let handlers = executors.iter().filter(|e| e.can_handle(kind)).count();
        assert_eq!(handlers, 1, "{kind} should have exactly one executor");
    }
}
