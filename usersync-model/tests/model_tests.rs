use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::{Arc, Mutex};
use std::thread;
use usersync_model::{
    IdentityModel, Model, ModelChangedArgs, ModelChangedHandler, ModelKey, PropertiesModel,
    PropertyValue, SubscriptionKind, SubscriptionModel, EXTERNAL_ID,
};

#[derive(Debug, Clone, PartialEq)]
struct Seen {
    key: String,
    property: String,
    old_value: PropertyValue,
    new_value: PropertyValue,
    hydrating: bool,
}

#[derive(Default)]
struct Recorder(Mutex<Vec<Seen>>);

impl Recorder {
    fn events(&self) -> Vec<Seen> {
        self.0.lock().unwrap().clone()
    }
}

impl ModelChangedHandler for Recorder {
    fn on_model_updated(&self, args: &ModelChangedArgs<'_>) {
        self.0.lock().unwrap().push(Seen {
            key: args.model.key().to_string(),
            property: args.property.to_string(),
            old_value: args.old_value.clone(),
            new_value: args.new_value.clone(),
            hydrating: args.hydrating,
        });
    }
}

fn key(s: &str) -> ModelKey {
    ModelKey::new(s).unwrap()
}

fn observed(model: &Model) -> Arc<Recorder> {
    let recorder = Arc::new(Recorder::default());
    model.subscribe(recorder.clone());
    recorder
}

// ── Change events ────────────────────────────────────────────────

#[test]
fn set_fires_one_event_with_old_and_new() {
    let model = Model::new(key("u1"));
    let recorder = observed(&model);

    assert!(model.set("plan", "pro"));

    assert_eq!(
        recorder.events(),
        vec![Seen {
            key: "u1".into(),
            property: "plan".into(),
            old_value: PropertyValue::Null,
            new_value: PropertyValue::from("pro"),
            hydrating: false,
        }]
    );
    assert_eq!(model.get("plan"), Some(PropertyValue::from("pro")));
    assert_eq!(model.version(), 1);
}

#[test]
fn setting_same_value_is_silent() {
    let model = Model::new(key("u1"));
    model.set("plan", "pro");
    let recorder = observed(&model);

    assert!(!model.set("plan", "pro"));
    assert!(!model.hydrate("plan", "pro"));

    assert!(recorder.events().is_empty());
    assert_eq!(model.version(), 1);
}

#[test]
fn removing_absent_property_is_silent() {
    let model = Model::new(key("u1"));
    let recorder = observed(&model);
    assert!(!model.remove("missing"));
    assert!(!model.set("missing", PropertyValue::Null));
    assert!(recorder.events().is_empty());
}

#[test]
fn non_finite_number_writes_as_null() {
    let model = Model::new(key("u1"));
    let recorder = observed(&model);

    assert!(!model.set("score", f64::NAN));
    assert!(!model.set("score", PropertyValue::Number(f64::NAN)));
    assert!(recorder.events().is_empty());

    model.set("score", 1.0);
    assert!(model.set("score", PropertyValue::Number(f64::INFINITY)));
    assert!(!model.set("score", f64::NAN));
    assert_eq!(model.get("score"), None);
    assert_eq!(recorder.events().len(), 2);
}

#[test]
fn remove_fires_with_null_new_value() {
    let model = Model::new(key("u1"));
    model.set("plan", "pro");
    let recorder = observed(&model);

    assert!(model.remove("plan"));

    let events = recorder.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].old_value, PropertyValue::from("pro"));
    assert_eq!(events[0].new_value, PropertyValue::Null);
    assert_eq!(model.get("plan"), None);
}

#[test]
fn hydrate_is_flagged() {
    let model = Model::new(key("u1"));
    let recorder = observed(&model);

    model.hydrate("plan", "free");

    let events = recorder.events();
    assert_eq!(events.len(), 1);
    assert!(events[0].hydrating);
}

#[test]
fn observers_can_read_model_during_delivery() {
    struct Reader(Mutex<Option<PropertyValue>>);
    impl ModelChangedHandler for Reader {
        fn on_model_updated(&self, args: &ModelChangedArgs<'_>) {
            *self.0.lock().unwrap() = args.model.get(args.property);
        }
    }

    let model = Model::new(key("u1"));
    let reader = Arc::new(Reader(Mutex::new(None)));
    model.subscribe(reader.clone());

    model.set("level", 3i64);
    assert_eq!(*reader.0.lock().unwrap(), Some(PropertyValue::Number(3.0)));
}

#[test]
fn unsubscribed_observer_stops_receiving() {
    let model = Model::new(key("u1"));
    let recorder = Arc::new(Recorder::default());
    let id = model.subscribe(recorder.clone());
    model.set("a", "1");
    assert!(model.unsubscribe(id));
    model.set("a", "2");
    assert_eq!(recorder.events().len(), 1);
    assert_eq!(model.subscriber_count(), 0);
}

// ── Snapshots ────────────────────────────────────────────────────

#[test]
fn hydrate_from_snapshot_restores_state_and_version() {
    let source = Model::new(key("u1"));
    source.set("a", "1");
    source.set("b", true);
    source.set("a", "2");
    let snapshot = source.snapshot();
    assert_eq!(snapshot.version, 3);

    let restored = Model::new(key("u1"));
    let recorder = observed(&restored);
    restored.hydrate_from(&snapshot);

    assert_eq!(restored.snapshot(), snapshot);
    assert!(recorder.events().iter().all(|e| e.hydrating));
    assert_eq!(recorder.events().len(), 2);
}

#[test]
fn snapshot_json_shape() {
    let model = Model::new(key("u1"));
    model.set("plan", "pro");
    let json = serde_json::to_value(model.snapshot()).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"key": "u1", "version": 1, "properties": {"plan": "pro"}})
    );
}

// ── Concurrency ──────────────────────────────────────────────────

#[test]
fn concurrent_writers_produce_consistent_event_chain() {
    let model = Arc::new(Model::new(key("u1")));
    let recorder = observed(&model);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let model = model.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    model.set("counter", format!("{t}-{i}"));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    // Serialized writers: each event's old value is the previous event's new value.
    let events = recorder.events();
    assert_eq!(events.len() as u64, model.version());
    for pair in events.windows(2) {
        assert_eq!(pair[1].old_value, pair[0].new_value);
    }
    assert_eq!(model.get("counter"), Some(events.last().unwrap().new_value.clone()));
}

proptest! {
    #[test]
    fn repeated_write_never_fires_twice(value in "[a-z]{1,8}") {
        let model = Model::new(key("p"));
        let recorder = observed(&model);
        model.set("k", value.as_str());
        model.set("k", value.as_str());
        prop_assert_eq!(recorder.events().len(), 1);
    }
}

// ── Typed wrappers ───────────────────────────────────────────────

#[test]
fn identity_aliases() {
    let identity = IdentityModel::new(key("u1"));
    identity.model().hydrate(EXTERNAL_ID, "abc");
    identity.set_alias("crm", "c-1");

    assert_eq!(identity.external_id().as_deref(), Some("abc"));
    assert_eq!(identity.alias("crm").as_deref(), Some("c-1"));
    assert_eq!(identity.aliases().len(), 2);

    assert!(identity.remove_alias("crm"));
    assert_eq!(identity.alias("crm"), None);
}

#[test]
fn properties_tags() {
    let properties = PropertiesModel::new(key("u1"));
    properties.set_tag("plan", "pro");
    properties.set_tag("seats", 4i64);

    assert_eq!(properties.tag("plan"), Some(PropertyValue::from("pro")));
    assert_eq!(properties.tags().len(), 2);
    assert!(properties.remove_tag("plan"));
    assert!(!properties.remove_tag("plan"));
}

#[test]
fn subscription_defaults() {
    let owner = key("u1");
    let email = SubscriptionModel::new(SubscriptionKind::Email, Some("a@b.c"), Some(&owner));
    assert_eq!(email.kind(), Some(SubscriptionKind::Email));
    assert_eq!(email.address().as_deref(), Some("a@b.c"));
    assert!(email.enabled());
    assert!(email.is_owned_by(&owner));
    assert!(email.key().is_local());

    let push = SubscriptionModel::new(SubscriptionKind::Push, None, None);
    assert!(!push.enabled());
    assert_eq!(push.owner(), None);
    assert!(push.set_address(Some("token")));
    assert!(push.set_enabled(true));
    assert!(push.enabled());
}
