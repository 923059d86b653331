use std::sync::Arc;
use usersync_model::{Model, ModelKey, PropertyValue};
use usersync_storage::{ModelStore, Persistence, SqlitePersistence};

#[test]
fn unknown_store_loads_none() {
    let db = SqlitePersistence::open_in_memory().unwrap();
    assert_eq!(db.load("identity").unwrap(), None);
}

#[test]
fn empty_save_is_distinct_from_never_saved() {
    let db = SqlitePersistence::open_in_memory().unwrap();
    db.save("identity", &[]).unwrap();
    assert_eq!(db.load("identity").unwrap(), Some(vec![]));
}

#[test]
fn save_replaces_previous_entries_in_order() {
    let db = SqlitePersistence::open_in_memory().unwrap();
    db.save(
        "s",
        &[("a".into(), "1".into()), ("b".into(), "2".into())],
    )
    .unwrap();
    db.save(
        "s",
        &[("c".into(), "3".into()), ("a".into(), "4".into())],
    )
    .unwrap();

    assert_eq!(
        db.load("s").unwrap(),
        Some(vec![("c".into(), "3".into()), ("a".into(), "4".into())])
    );
}

#[test]
fn stores_are_isolated() {
    let db = SqlitePersistence::open_in_memory().unwrap();
    db.save("x", &[("a".into(), "1".into())]).unwrap();
    db.save("y", &[("b".into(), "2".into())]).unwrap();
    assert_eq!(db.load("x").unwrap().unwrap().len(), 1);
    assert_eq!(db.load("y").unwrap().unwrap()[0].0, "b");
}

#[test]
fn store_survives_reopen_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let key = ModelKey::new("user-1").unwrap();

    {
        let db = Arc::new(SqlitePersistence::open(&path).unwrap());
        let store = ModelStore::new("properties", db);
        let model = Model::shared(key.clone());
        store.add(model.clone()).unwrap();
        model.set("plan", "pro");
        model.set("beta", true);
    }

    let db = Arc::new(SqlitePersistence::open(&path).unwrap());
    let store = ModelStore::new("properties", db);
    assert_eq!(store.load().unwrap(), 1);
    let model = store.get(&key).unwrap();
    assert_eq!(model.get("plan"), Some(PropertyValue::from("pro")));
    assert_eq!(model.get("beta"), Some(PropertyValue::Bool(true)));
}
