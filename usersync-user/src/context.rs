//! The explicitly constructed SDK context.

use crate::config::SdkConfig;
use crate::error::UserResult;
use crate::user::User;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};
use usersync_storage::{ModelStore, Persistence};
use usersync_sync::{
    IdentityDeltas, IdentityOperationExecutor, ModelStoreListener, OperationRepo,
    OutcomeOperationExecutor, PropertiesDeltas, PropertyOperationExecutor, RepoObserver,
    SubscriptionDeltas, SubscriptionOperationExecutor, TracingObserver, Transport,
    UserOperationExecutor,
};

/// Owns the stores, the operation repo, the executors and the listeners
/// that connect them.
///
/// Construct one per SDK instance and hand it to a
/// [`UserManager`](crate::UserManager).
pub struct SdkContext {
    config: SdkConfig,
    identity_store: Arc<ModelStore>,
    properties_store: Arc<ModelStore>,
    subscription_store: Arc<ModelStore>,
    repo: Arc<OperationRepo>,
    identity_listener: ModelStoreListener,
    properties_listener: ModelStoreListener,
    subscription_listener: ModelStoreListener,
    started: AtomicBool,
}

impl SdkContext {
    /// Creates a context reporting repo events through `tracing`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: SdkConfig,
        persistence: Arc<dyn Persistence>,
        transport: Arc<dyn Transport>,
    ) -> UserResult<Self> {
        Self::with_observer(config, persistence, transport, Arc::new(TracingObserver))
    }

    /// Creates a context with a custom repo observer.
    pub fn with_observer(
        config: SdkConfig,
        persistence: Arc<dyn Persistence>,
        transport: Arc<dyn Transport>,
        observer: Arc<dyn RepoObserver>,
    ) -> UserResult<Self> {
        let identity_store = ModelStore::new(&config.identity_store_key, persistence.clone());
        let properties_store = ModelStore::new(&config.properties_store_key, persistence.clone());
        let subscription_store =
            ModelStore::new(&config.subscription_store_key, persistence.clone());

        let repo = OperationRepo::new(
            config.repo.clone(),
            persistence,
            &config.operation_store_key,
            observer,
        )?;
        repo.add_executor(Arc::new(UserOperationExecutor::new(transport.clone())))?;
        repo.add_executor(Arc::new(IdentityOperationExecutor::new(transport.clone())))?;
        repo.add_executor(Arc::new(PropertyOperationExecutor::new(transport.clone())))?;
        repo.add_executor(Arc::new(SubscriptionOperationExecutor::new(transport.clone())))?;
        repo.add_executor(Arc::new(OutcomeOperationExecutor::new(transport)))?;

        let identity_listener =
            ModelStoreListener::new(identity_store.clone(), repo.clone(), Box::new(IdentityDeltas));
        let properties_listener = ModelStoreListener::new(
            properties_store.clone(),
            repo.clone(),
            Box::new(PropertiesDeltas),
        );
        let subscription_listener = ModelStoreListener::new(
            subscription_store.clone(),
            repo.clone(),
            Box::new(SubscriptionDeltas),
        );

        Ok(Self {
            config,
            identity_store,
            properties_store,
            subscription_store,
            repo,
            identity_listener,
            properties_listener,
            subscription_listener,
            started: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn identity_store(&self) -> &Arc<ModelStore> {
        &self.identity_store
    }

    pub fn properties_store(&self) -> &Arc<ModelStore> {
        &self.properties_store
    }

    pub fn subscription_store(&self) -> &Arc<ModelStore> {
        &self.subscription_store
    }

    pub fn repo(&self) -> &Arc<OperationRepo> {
        &self.repo
    }

    /// Restores the operation queue, starts dispatching and starts the
    /// listeners. Idempotent.
    pub fn start(&self) -> UserResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match self.repo.start() {
            Ok(restored) => debug!("context started, {} operations restored", restored),
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        }
        for listener in self.listeners() {
            listener.start();
        }
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Loads all three stores from the cache. Listeners see the restored
    /// models as hydration.
    ///
    /// Every store is loaded even if another fails, so the device push
    /// subscription is restored when the user stores are unreadable. The
    /// first error is returned.
    pub fn load_cache(&self) -> UserResult<()> {
        let subscriptions = self.subscription_store.load();
        let identities = self.identity_store.load();
        let properties = self.properties_store.load();
        let (subscriptions, identities, properties) = (subscriptions?, identities?, properties?);
        debug!(
            "cache loaded: {} identities, {} properties, {} subscriptions",
            identities, properties, subscriptions
        );
        Ok(())
    }

    /// Stops syncing a user's models while they stay cached: its identity,
    /// its properties and the email and SMS subscriptions it owns.
    pub(crate) fn detach_user(&self, user: &User) {
        self.identity_listener.detach(user.key());
        self.properties_listener.detach(user.key());
        for sub in user.owned_subscriptions() {
            self.subscription_listener.detach(sub.key());
        }
        debug!("detached user {} from sync", user.key());
    }

    /// Stops the listeners and the repo. Queued operations stay persisted.
    pub fn shutdown(&self) {
        for listener in self.listeners() {
            listener.stop();
        }
        self.repo.shutdown();
        info!("sdk context shut down");
    }

    fn listeners(&self) -> [&ModelStoreListener; 3] {
        [
            &self.identity_listener,
            &self.properties_listener,
            &self.subscription_listener,
        ]
    }
}

impl std::fmt::Debug for SdkContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkContext")
            .field("identity_store", &self.identity_store)
            .field("properties_store", &self.properties_store)
            .field("subscription_store", &self.subscription_store)
            .field("repo", &self.repo)
            .finish()
    }
}
