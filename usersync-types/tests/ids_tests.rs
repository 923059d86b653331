use std::collections::HashSet;
use usersync_types::{ModelKey, OperationId};

// ── ModelKey ─────────────────────────────────────────────────────

#[test]
fn model_key_from_external_id() {
    let key = ModelKey::new("user-42").unwrap();
    assert_eq!(key.as_str(), "user-42");
    assert_eq!(key.to_string(), "user-42");
    assert!(!key.is_local());
}

#[test]
fn model_key_rejects_empty() {
    assert!(ModelKey::new("").is_err());
    assert!(ModelKey::new("   ").is_err());
}

#[test]
fn generated_keys_are_local_and_unique() {
    let keys: HashSet<ModelKey> = (0..100).map(|_| ModelKey::generate()).collect();
    assert_eq!(keys.len(), 100);
    assert!(keys.iter().all(ModelKey::is_local));
}

#[test]
fn model_key_parse() {
    let key: ModelKey = "abc".parse().unwrap();
    assert_eq!(key, ModelKey::new("abc").unwrap());
    assert!("".parse::<ModelKey>().is_err());
}

#[test]
fn model_key_serializes_as_plain_string() {
    let key = ModelKey::new("abc").unwrap();
    assert_eq!(serde_json::to_string(&key).unwrap(), r#""abc""#);
    let back: ModelKey = serde_json::from_str(r#""abc""#).unwrap();
    assert_eq!(back, key);
}

// ── OperationId ──────────────────────────────────────────────────

#[test]
fn operation_ids_are_time_ordered() {
    let a = OperationId::new();
    let b = OperationId::new();
    assert!(a < b);
}

#[test]
fn operation_id_display_parse() {
    let id = OperationId::new();
    let parsed: OperationId = id.to_string().parse().unwrap();
    assert_eq!(parsed, id);
    assert!("not-a-uuid".parse::<OperationId>().is_err());
}
