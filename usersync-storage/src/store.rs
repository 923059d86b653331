//! Keyed model stores.

use crate::error::{StorageError, StorageResult};
use crate::persistence::{PersistedEntry, Persistence};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, warn};
use usersync_model::{
    EventProducer, Model, ModelChangedArgs, ModelChangedHandler, ModelKey, ModelSnapshot,
    SubscriptionId,
};

/// Receives store-level add/remove events.
///
/// `hydrating` is true when the event replays the cache (on
/// [`ModelStore::load`]) or tears down local state (on
/// [`ModelStore::evict`] / [`ModelStore::clear`]). Such events describe
/// bookkeeping, not user intent, and must not be synced.
pub trait ModelStoreChangedHandler: Send + Sync {
    fn on_added(&self, model: &Arc<Model>, hydrating: bool);

    fn on_removed(&self, model: &Arc<Model>, hydrating: bool);
}

struct Entry {
    model: Arc<Model>,
    subscription: SubscriptionId,
}

/// Persists the owning store whenever one of its models changes.
struct PersistOnChange {
    store: Weak<ModelStore>,
}

impl ModelChangedHandler for PersistOnChange {
    fn on_model_updated(&self, _args: &ModelChangedArgs<'_>) {
        if let Some(store) = self.store.upgrade() {
            store.persist();
        }
    }
}

/// An insertion-ordered collection of models of one kind, keyed by
/// [`ModelKey`].
///
/// Adds and removes are serialized per store. Handlers run synchronously
/// while that serialization lock is held, so they may read the store but
/// must not add to or remove from it.
pub struct ModelStore {
    store_key: String,
    persistence: Arc<dyn Persistence>,
    mutations: Mutex<()>,
    entries: Mutex<Vec<Entry>>,
    persist_lock: Mutex<()>,
    producer: EventProducer<dyn ModelStoreChangedHandler>,
    change_handler: Arc<dyn ModelChangedHandler>,
    loading: AtomicBool,
    persist_failures: AtomicU64,
}

impl ModelStore {
    /// Creates an empty store that caches its contents under `store_key`.
    pub fn new(store_key: impl Into<String>, persistence: Arc<dyn Persistence>) -> Arc<Self> {
        let store_key = store_key.into();
        Arc::new_cyclic(|weak| Self {
            store_key,
            persistence,
            mutations: Mutex::new(()),
            entries: Mutex::new(Vec::new()),
            persist_lock: Mutex::new(()),
            producer: EventProducer::new(),
            change_handler: Arc::new(PersistOnChange {
                store: weak.clone(),
            }),
            loading: AtomicBool::new(false),
            persist_failures: AtomicU64::new(0),
        })
    }

    pub fn store_key(&self) -> &str {
        &self.store_key
    }

    // ── Reads ────────────────────────────────────────────────────

    pub fn get(&self, key: &ModelKey) -> Option<Arc<Model>> {
        self.entries()
            .iter()
            .find(|e| e.model.key() == key)
            .map(|e| Arc::clone(&e.model))
    }

    pub fn contains(&self, key: &ModelKey) -> bool {
        self.entries().iter().any(|e| e.model.key() == key)
    }

    /// Snapshot of the store in insertion order. Later adds and removes do
    /// not affect a returned snapshot.
    pub fn get_all(&self) -> Vec<(ModelKey, Arc<Model>)> {
        self.entries()
            .iter()
            .map(|e| (e.model.key().clone(), Arc::clone(&e.model)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of cache writes that failed since the store was created.
    pub fn persist_failures(&self) -> u64 {
        self.persist_failures.load(Ordering::Relaxed)
    }

    // ── Mutations ────────────────────────────────────────────────

    /// Adds a model under its own key. Fails with
    /// [`StorageError::DuplicateKey`] if the key is taken; the existing
    /// model is left untouched.
    pub fn add(&self, model: Arc<Model>) -> StorageResult<()> {
        let _guard = self.lock_mutations();
        self.insert(model, false, false).map(|_| ())
    }

    /// Adds a model, replacing any model with the same key. Returns the
    /// replaced model.
    pub fn add_or_replace(&self, model: Arc<Model>) -> Option<Arc<Model>> {
        let _guard = self.lock_mutations();
        self.insert(model, true, false).unwrap_or_default()
    }

    /// Removes a model as user intent. No-op if absent.
    pub fn remove(&self, key: &ModelKey) -> Option<Arc<Model>> {
        let _guard = self.lock_mutations();
        self.take(key, false)
    }

    /// Removes a model as local teardown. Listeners see `hydrating = true`.
    pub fn evict(&self, key: &ModelKey) -> Option<Arc<Model>> {
        let _guard = self.lock_mutations();
        self.take(key, true)
    }

    /// Evicts every model.
    pub fn clear(&self) -> usize {
        let _guard = self.lock_mutations();
        let keys: Vec<ModelKey> = self.entries().iter().map(|e| e.model.key().clone()).collect();
        keys.iter().filter(|key| self.take(key, true).is_some()).count()
    }

    /// Restores models from the cache.
    ///
    /// Each restored model fires `on_added` with `hydrating = true`, then
    /// its properties are hydrated. Keys already present are skipped.
    /// Returns the number of models restored.
    pub fn load(&self) -> StorageResult<usize> {
        let Some(entries) = self.persistence.load(&self.store_key)? else {
            debug!("store {}: nothing cached", self.store_key);
            return Ok(0);
        };

        let mut snapshots = Vec::with_capacity(entries.len());
        for (key, data) in &entries {
            let snapshot: ModelSnapshot = serde_json::from_str(data)?;
            if snapshot.key.as_str() != key.as_str() {
                return Err(StorageError::InvalidData(format!(
                    "entry {key} holds model {}",
                    snapshot.key
                )));
            }
            snapshots.push(snapshot);
        }

        let _guard = self.lock_mutations();
        self.loading.store(true, Ordering::SeqCst);
        let mut restored = 0;
        for snapshot in &snapshots {
            if self.contains(&snapshot.key) {
                debug!("store {}: {} already loaded", self.store_key, snapshot.key);
                continue;
            }
            let model = Model::shared(snapshot.key.clone());
            if self.insert(Arc::clone(&model), false, true).is_ok() {
                model.hydrate_from(snapshot);
                restored += 1;
            }
        }
        self.loading.store(false, Ordering::SeqCst);

        debug!("store {}: restored {} models", self.store_key, restored);
        Ok(restored)
    }

    // ── Subscriptions ────────────────────────────────────────────

    pub fn subscribe(&self, handler: Arc<dyn ModelStoreChangedHandler>) -> SubscriptionId {
        self.producer.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.producer.unsubscribe(id)
    }

    // ── Internals ────────────────────────────────────────────────

    fn insert(
        &self,
        model: Arc<Model>,
        replace: bool,
        hydrating: bool,
    ) -> StorageResult<Option<Arc<Model>>> {
        let replaced = {
            let mut entries = self.entries();
            let replaced = match entries.iter().position(|e| e.model.key() == model.key()) {
                Some(_) if !replace => {
                    return Err(StorageError::DuplicateKey {
                        store: self.store_key.clone(),
                        key: model.key().clone(),
                    });
                }
                Some(index) => {
                    let old = entries.remove(index);
                    old.model.unsubscribe(old.subscription);
                    Some(old.model)
                }
                None => None,
            };
            let subscription = model.subscribe(Arc::clone(&self.change_handler));
            entries.push(Entry {
                model: Arc::clone(&model),
                subscription,
            });
            replaced
        };

        debug!("store {}: added {}", self.store_key, model.key());
        self.persist();
        if let Some(old) = &replaced {
            self.producer.fire(|h| h.on_removed(old, hydrating));
        }
        self.producer.fire(|h| h.on_added(&model, hydrating));
        Ok(replaced)
    }

    fn take(&self, key: &ModelKey, hydrating: bool) -> Option<Arc<Model>> {
        let removed = {
            let mut entries = self.entries();
            let index = entries.iter().position(|e| e.model.key() == key)?;
            let entry = entries.remove(index);
            entry.model.unsubscribe(entry.subscription);
            entry.model
        };

        debug!(
            "store {}: removed {} (hydrating={})",
            self.store_key, key, hydrating
        );
        self.persist();
        self.producer.fire(|h| h.on_removed(&removed, hydrating));
        Some(removed)
    }

    /// Writes the full store contents to the cache. Failures are logged and
    /// counted; in-memory state is never rolled back.
    fn persist(&self) {
        if self.loading.load(Ordering::SeqCst) {
            return;
        }
        let _persist = self
            .persist_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let serialized: Result<Vec<PersistedEntry>, serde_json::Error> = self
            .entries()
            .iter()
            .map(|e| {
                serde_json::to_string(&e.model.snapshot())
                    .map(|data| (e.model.key().to_string(), data))
            })
            .collect();

        let result = match serialized {
            Ok(entries) => self.persistence.save(&self.store_key, &entries),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            self.persist_failures.fetch_add(1, Ordering::Relaxed);
            warn!("store {}: failed to persist: {}", self.store_key, e);
        }
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_mutations(&self) -> MutexGuard<'_, ()> {
        self.mutations.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ModelStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelStore")
            .field("store_key", &self.store_key)
            .field("len", &self.len())
            .finish()
    }
}
