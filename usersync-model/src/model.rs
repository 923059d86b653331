//! The observable model: a versioned property bag with change events.

use crate::producer::{EventProducer, SubscriptionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::trace;
use usersync_types::{ModelKey, PropertyValue};

/// Arguments of a model change event.
#[derive(Debug)]
pub struct ModelChangedArgs<'a> {
    /// The full model in its current (post-change) state.
    pub model: &'a Model,
    /// The property that was changed.
    pub property: &'a str,
    /// The value before the change. `Null` if the property was absent.
    pub old_value: PropertyValue,
    /// The value after the change. `Null` if the property was removed.
    pub new_value: PropertyValue,
    /// True when the change replays cached or remote state rather than
    /// recording new user intent.
    pub hydrating: bool,
}

/// Receives change events from a [`Model`].
///
/// Handlers run synchronously on the writer's thread while the model's
/// writer lock is held. They may read the model but must not write to it.
pub trait ModelChangedHandler: Send + Sync {
    fn on_model_updated(&self, args: &ModelChangedArgs<'_>);
}

/// Serializable state of a [`Model`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub key: ModelKey,
    pub version: u64,
    pub properties: BTreeMap<String, PropertyValue>,
}

#[derive(Debug, Default)]
struct ModelState {
    version: u64,
    properties: BTreeMap<String, PropertyValue>,
}

/// A versioned, observable bag of named properties.
///
/// Writers of one model are serialized by a per-model lock, so the
/// compare-update-fire sequence is atomic with respect to other writers of
/// the same model. Distinct models never contend.
pub struct Model {
    key: ModelKey,
    writer: Mutex<()>,
    state: RwLock<ModelState>,
    producer: EventProducer<dyn ModelChangedHandler>,
}

impl Model {
    /// Creates an empty model.
    pub fn new(key: ModelKey) -> Self {
        Self {
            key,
            writer: Mutex::new(()),
            state: RwLock::new(ModelState::default()),
            producer: EventProducer::new(),
        }
    }

    /// Creates an empty model behind an `Arc`, the form stores hold.
    pub fn shared(key: ModelKey) -> Arc<Self> {
        Arc::new(Self::new(key))
    }

    pub fn key(&self) -> &ModelKey {
        &self.key
    }

    /// Number of effective writes applied since creation (or since the
    /// version restored by [`hydrate_from`](Self::hydrate_from)).
    pub fn version(&self) -> u64 {
        self.read_state().version
    }

    /// Returns a property value, or `None` if absent.
    pub fn get(&self, property: &str) -> Option<PropertyValue> {
        self.read_state().properties.get(property).cloned()
    }

    /// Returns all properties in name order.
    pub fn properties(&self) -> BTreeMap<String, PropertyValue> {
        self.read_state().properties.clone()
    }

    /// Returns the current state as a serializable snapshot.
    pub fn snapshot(&self) -> ModelSnapshot {
        let state = self.read_state();
        ModelSnapshot {
            key: self.key.clone(),
            version: state.version,
            properties: state.properties.clone(),
        }
    }

    /// Writes a property as new user intent. Returns true if the value
    /// changed (and an event was fired). A non-finite number is written as
    /// `Null`.
    pub fn set(&self, property: &str, value: impl Into<PropertyValue>) -> bool {
        self.write(property, value.into(), false)
    }

    /// Removes a property as new user intent. Same as writing `Null`.
    pub fn remove(&self, property: &str) -> bool {
        self.write(property, PropertyValue::Null, false)
    }

    /// Writes a property replayed from cache or from the remote side.
    /// Listeners see `hydrating = true` and do not sync it back.
    pub fn hydrate(&self, property: &str, value: impl Into<PropertyValue>) -> bool {
        self.write(property, value.into(), true)
    }

    /// Hydrates every property of a snapshot, then restores its version.
    pub fn hydrate_from(&self, snapshot: &ModelSnapshot) {
        for (property, value) in &snapshot.properties {
            self.hydrate(property, value.clone());
        }
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.version = state.version.max(snapshot.version);
    }

    /// Subscribes a change handler.
    pub fn subscribe(&self, handler: Arc<dyn ModelChangedHandler>) -> SubscriptionId {
        self.producer.subscribe(handler)
    }

    /// Unsubscribes a change handler.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.producer.unsubscribe(id)
    }

    /// Number of subscribed change handlers.
    pub fn subscriber_count(&self) -> usize {
        self.producer.len()
    }

    fn write(&self, property: &str, value: PropertyValue, hydrating: bool) -> bool {
        let value = value.normalized();
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let old_value = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            let old_value = state
                .properties
                .get(property)
                .cloned()
                .unwrap_or(PropertyValue::Null);
            if old_value == value {
                return false;
            }
            if value.is_null() {
                state.properties.remove(property);
            } else {
                state.properties.insert(property.to_string(), value.clone());
            }
            state.version += 1;
            old_value
        };

        trace!(
            "model {} property {} changed (hydrating={})",
            self.key, property, hydrating
        );

        let args = ModelChangedArgs {
            model: self,
            property,
            old_value,
            new_value: value,
            hydrating,
        };
        self.producer.fire(|handler| handler.on_model_updated(&args));
        true
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, ModelState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read_state();
        f.debug_struct("Model")
            .field("key", &self.key)
            .field("version", &state.version)
            .field("properties", &state.properties)
            .finish()
    }
}
