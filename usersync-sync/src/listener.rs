//! Bridges model stores to the operation repo.

use crate::operation::Operation;
use crate::repo::OperationRepo;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, trace};
use usersync_model::{Model, ModelChangedArgs, ModelChangedHandler, ModelKey, SubscriptionId};
use usersync_storage::{ModelStore, ModelStoreChangedHandler};

/// Turns user-originated model changes into operations.
///
/// Hydrating events never reach a builder. Each callback produces at most
/// one operation; `None` means the change needs no remote effect.
pub trait OperationBuilder: Send + Sync {
    fn on_update(&self, args: &ModelChangedArgs<'_>) -> Option<Operation>;

    fn on_added(&self, _model: &Model) -> Option<Operation> {
        None
    }

    fn on_removed(&self, _model: &Model) -> Option<Operation> {
        None
    }
}

#[derive(Default)]
struct ListenerState {
    store_subscription: Option<SubscriptionId>,
    attached: HashMap<ModelKey, (Arc<Model>, SubscriptionId)>,
}

struct ListenerCore {
    store: Arc<ModelStore>,
    repo: Arc<OperationRepo>,
    builder: Box<dyn OperationBuilder>,
    state: Mutex<ListenerState>,
    weak: Weak<ListenerCore>,
}

impl ListenerCore {
    fn lock_state(&self) -> MutexGuard<'_, ListenerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn attach(&self, model: &Arc<Model>) {
        let Some(handler) = self.weak.upgrade() else {
            return;
        };
        let mut state = self.lock_state();
        if state.store_subscription.is_none() {
            return;
        }
        if let Some((existing, subscription)) = state.attached.get(model.key()) {
            if Arc::ptr_eq(existing, model) {
                return;
            }
            existing.unsubscribe(*subscription);
        }
        let subscription = model.subscribe(handler);
        state
            .attached
            .insert(model.key().clone(), (Arc::clone(model), subscription));
        trace!("listener on {}: attached {}", self.store.store_key(), model.key());
    }

    fn detach(&self, model: &Arc<Model>) {
        let mut state = self.lock_state();
        let same = state
            .attached
            .get(model.key())
            .is_some_and(|(existing, _)| Arc::ptr_eq(existing, model));
        if same {
            if let Some((existing, subscription)) = state.attached.remove(model.key()) {
                existing.unsubscribe(subscription);
            }
        }
    }

    fn submit(&self, operation: Option<Operation>) {
        if let Some(operation) = operation {
            self.repo.enqueue(operation);
        }
    }
}

impl ModelStoreChangedHandler for ListenerCore {
    fn on_added(&self, model: &Arc<Model>, hydrating: bool) {
        self.attach(model);
        if !hydrating {
            self.submit(self.builder.on_added(model));
        }
    }

    fn on_removed(&self, model: &Arc<Model>, hydrating: bool) {
        self.detach(model);
        if !hydrating {
            self.submit(self.builder.on_removed(model));
        }
    }
}

impl ModelChangedHandler for ListenerCore {
    fn on_model_updated(&self, args: &ModelChangedArgs<'_>) {
        if args.hydrating {
            return;
        }
        self.submit(self.builder.on_update(args));
    }
}

/// Observes one store and every model in it, forwarding user edits to the
/// repo as operations.
///
/// Added models are attached automatically and removed models detached.
/// Dropping the listener stops it.
pub struct ModelStoreListener {
    core: Arc<ListenerCore>,
}

impl ModelStoreListener {
    pub fn new(
        store: Arc<ModelStore>,
        repo: Arc<OperationRepo>,
        builder: Box<dyn OperationBuilder>,
    ) -> Self {
        let core = Arc::new_cyclic(|weak| ListenerCore {
            store,
            repo,
            builder,
            state: Mutex::new(ListenerState::default()),
            weak: weak.clone(),
        });
        Self { core }
    }

    /// Subscribes to the store and attaches to every model already in it.
    /// Idempotent.
    pub fn start(&self) {
        {
            let mut state = self.core.lock_state();
            if state.store_subscription.is_some() {
                return;
            }
            let handler: Arc<dyn ModelStoreChangedHandler> = self.core.clone();
            state.store_subscription = Some(self.core.store.subscribe(handler));
        }
        for (_, model) in self.core.store.get_all() {
            self.core.attach(&model);
        }
        debug!("listener on {} started", self.core.store.store_key());
    }

    /// Detaches from the store and from every model.
    pub fn stop(&self) {
        let mut state = self.core.lock_state();
        let Some(subscription) = state.store_subscription.take() else {
            return;
        };
        self.core.store.unsubscribe(subscription);
        for (_, (model, id)) in state.attached.drain() {
            model.unsubscribe(id);
        }
        debug!("listener on {} stopped", self.core.store.store_key());
    }

    /// Stops observing one model while it stays in the store. Its edits no
    /// longer produce operations; removing it later is still bookkeeping
    /// only. Returns false if the model was not observed.
    pub fn detach(&self, key: &ModelKey) -> bool {
        let Some((model, subscription)) = self.core.lock_state().attached.remove(key) else {
            return false;
        };
        model.unsubscribe(subscription);
        trace!("listener on {}: detached {}", self.core.store.store_key(), key);
        true
    }

    pub fn is_started(&self) -> bool {
        self.core.lock_state().store_subscription.is_some()
    }

    /// Number of models currently observed.
    pub fn attached_count(&self) -> usize {
        self.core.lock_state().attached.len()
    }
}

impl Drop for ModelStoreListener {
    fn drop(&mut self) {
        self.stop();
    }
}
