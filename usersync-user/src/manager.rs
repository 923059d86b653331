//! User session orchestration.

use crate::context::SdkContext;
use crate::error::{UserError, UserResult};
use crate::user::User;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use usersync_model::{
    EXTERNAL_ID, IdentityModel, ModelKey, PropertiesModel, SubscriptionKind, SubscriptionModel,
};
use usersync_sync::Operation;

/// Lifecycle of the active user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserState {
    /// No session yet.
    NoUser,
    /// A session is being restored or replaced.
    Resolving,
    /// A user is active.
    ActiveUser,
}

struct ManagerState {
    state: UserState,
    active: Option<User>,
    /// The logged-in user a guest session replaced. Kept in the stores,
    /// detached from sync, until the next transition.
    retained: Option<User>,
    /// Set once the cache has been consulted.
    restored: bool,
}

/// Owns the active user and its transitions.
///
/// Transitions (`start`, `login`, `login_guest`, `logout`) are serialized
/// by the manager's state lock. The first transition restores the cached
/// session, whichever it is.
///
/// The stores hold at most two user pairs: the active one and, after
/// `login_guest` replaced a logged-in user, that user's pair. A replaced
/// guest pair is always evicted.
pub struct UserManager {
    context: Arc<SdkContext>,
    state: Mutex<ManagerState>,
}

impl UserManager {
    pub fn new(context: SdkContext) -> Self {
        Self {
            context: Arc::new(context),
            state: Mutex::new(ManagerState {
                state: UserState::NoUser,
                active: None,
                retained: None,
                restored: false,
            }),
        }
    }

    pub fn context(&self) -> &Arc<SdkContext> {
        &self.context
    }

    pub fn state(&self) -> UserState {
        self.lock_state().state
    }

    /// The active user. Fails with [`UserError::NoActiveUser`] until a
    /// session is established.
    pub fn user(&self) -> UserResult<User> {
        self.lock_state().active.clone().ok_or(UserError::NoActiveUser)
    }

    /// Starts the context and restores the cached session.
    ///
    /// Restoring only hydrates: no operations are produced. A cache holding
    /// an identity without its properties (or the reverse) is discarded and
    /// a fresh guest session is created instead. Calling `start` with a user
    /// already active returns that user.
    pub fn start(&self) -> UserResult<User> {
        let mut guard = self.lock_state();
        if let Some(active) = &guard.active {
            return Ok(active.clone());
        }
        guard.state = UserState::Resolving;

        let result = self.resume(&mut guard).and_then(|restored| match restored {
            Some(user) => {
                info!("restored cached user {}", user.key());
                Ok(user)
            }
            None => {
                debug!("no cached user, starting a guest session");
                self.create_user(None, None)
            }
        });
        self.settle(&mut guard, result)
    }

    /// Logs in as `external_id`. If that user is already active its handle
    /// is returned and nothing is created.
    pub fn login(&self, external_id: &str) -> UserResult<User> {
        self.login_inner(external_id, None)
    }

    /// Like [`login`](Self::login), also recording an auth token on the
    /// handle.
    pub fn login_with_token(&self, external_id: &str, token: &str) -> UserResult<User> {
        if token.trim().is_empty() {
            return Err(UserError::InvalidInput("empty token".into()));
        }
        self.login_inner(external_id, Some(token))
    }

    /// Starts an anonymous session.
    ///
    /// A logged-in user being replaced keeps its models in the stores,
    /// detached from sync; only the active reference changes. A guest being
    /// replaced is evicted.
    pub fn login_guest(&self) -> UserResult<User> {
        let mut guard = self.lock_state();
        guard.state = UserState::Resolving;
        let result = self.switch_to_guest(&mut guard);
        self.settle(&mut guard, result)
    }

    /// Ends the active session: its models are removed locally (nothing is
    /// deleted remotely) and a guest session takes its place.
    pub fn logout(&self) -> UserResult<User> {
        let mut guard = self.lock_state();
        let Some(previous) = guard.active.take() else {
            return Err(UserError::NoActiveUser);
        };
        guard.state = UserState::Resolving;

        info!("logging out user {}", previous.key());
        self.release_retained(&mut guard);
        self.retire(&previous);
        let result = self.create_user(None, None);
        self.settle(&mut guard, result)
    }

    // ── Transitions ──────────────────────────────────────────────

    fn login_inner(&self, external_id: &str, token: Option<&str>) -> UserResult<User> {
        if external_id.trim().is_empty() {
            return Err(UserError::InvalidInput("empty external id".into()));
        }

        let mut guard = self.lock_state();
        guard.state = UserState::Resolving;
        let result = self.switch_to_login(&mut guard, external_id, token);
        self.settle(&mut guard, result)
    }

    fn switch_to_login(
        &self,
        state: &mut ManagerState,
        external_id: &str,
        token: Option<&str>,
    ) -> UserResult<User> {
        let current = self
            .resume(state)?
            .filter(|active| active.external_id().as_deref() == Some(external_id));
        if let Some(active) = current {
            debug!("user {} already active", external_id);
            if let Some(token) = token {
                active.set_token(Some(token.to_string()));
            }
            return Ok(active);
        }

        self.release_retained(state);
        if let Some(previous) = state.active.take() {
            self.retire(&previous);
        }
        info!("logging in user {}", external_id);
        self.create_user(Some(external_id), token)
    }

    fn switch_to_guest(&self, state: &mut ManagerState) -> UserResult<User> {
        self.resume(state)?;
        self.release_retained(state);
        if let Some(previous) = state.active.take() {
            if previous.external_id().is_some() {
                self.retain(&previous);
                state.retained = Some(previous);
            } else {
                self.retire(&previous);
            }
        }
        self.create_user(None, None)
    }

    /// Starts the context and, on the first transition, restores the
    /// cached session into `state`. Returns the active user, if any.
    fn resume(&self, state: &mut ManagerState) -> UserResult<Option<User>> {
        self.context.start()?;
        if !state.restored {
            match self.restore_cached() {
                Ok(Some((active, retained))) => {
                    state.active = Some(active);
                    state.retained = retained;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("discarding cached user: {}", e);
                    self.discard_cache();
                }
            }
            state.restored = true;
        }
        Ok(state.active.clone())
    }

    fn settle(
        &self,
        guard: &mut MutexGuard<'_, ManagerState>,
        result: UserResult<User>,
    ) -> UserResult<User> {
        match result {
            Ok(user) => {
                guard.active = Some(user.clone());
                guard.state = UserState::ActiveUser;
                Ok(user)
            }
            Err(e) => {
                guard.state = if guard.active.is_some() {
                    UserState::ActiveUser
                } else {
                    UserState::NoUser
                };
                Err(e)
            }
        }
    }

    /// Creates a user pair, registers it and enqueues its creation. The
    /// external ID is hydrated: it travels with the create-user operation.
    fn create_user(&self, external_id: Option<&str>, token: Option<&str>) -> UserResult<User> {
        let key = ModelKey::generate();
        let identity = IdentityModel::new(key.clone());
        let properties = PropertiesModel::new(key);
        let push = self.push_subscription()?;

        self.context.identity_store().add(identity.model().clone())?;
        if let Err(e) = self.context.properties_store().add(properties.model().clone()) {
            self.context.identity_store().evict(identity.key());
            return Err(e.into());
        }
        if let Some(external_id) = external_id {
            identity.model().hydrate(EXTERNAL_ID, external_id);
        }

        self.context.repo().enqueue(Operation::create_user(
            identity.model().snapshot(),
            properties.model().snapshot(),
            vec![push.model().snapshot()],
        ));
        debug!("created user {}", identity.key());

        Ok(self.handle(identity, properties, push, token))
    }

    /// Removes a user's models locally and detaches them from sync.
    fn retire(&self, user: &User) {
        self.release_pending(user);
        for sub in user.owned_subscriptions() {
            if self.context.config().discard_pending_on_switch {
                self.context.repo().cancel_pending(sub.key());
            }
            self.context.subscription_store().evict(sub.key());
        }
        self.context.identity_store().evict(user.key());
        self.context.properties_store().evict(user.key());
        user.mark_replaced();
    }

    /// Keeps a replaced user's models cached but stops syncing them.
    fn retain(&self, user: &User) {
        self.release_pending(user);
        self.context.detach_user(user);
        user.mark_replaced();
        debug!("retained user {}", user.key());
    }

    fn release_retained(&self, state: &mut ManagerState) {
        if let Some(retained) = state.retained.take() {
            self.retire(&retained);
        }
    }

    /// Applies the pending-operation policy to a user being replaced.
    fn release_pending(&self, user: &User) {
        if self.context.config().discard_pending_on_switch {
            let cancelled = self.context.repo().cancel_pending(user.key());
            debug!("discarded {} pending operations of {}", cancelled, user.key());
        }
    }

    // ── Cache ────────────────────────────────────────────────────

    /// Loads the stores and picks the most recent complete identity and
    /// properties pair. If that is a guest, the most recent earlier
    /// logged-in pair is retained (detached); every other pair is evicted.
    fn restore_cached(&self) -> UserResult<Option<(User, Option<User>)>> {
        self.context
            .load_cache()
            .map_err(|e| UserError::CorruptedCache(e.to_string()))?;

        let identities = self.context.identity_store().get_all();
        let properties = self.context.properties_store().get_all();
        let identity_keys: HashSet<&ModelKey> = identities.iter().map(|(k, _)| k).collect();
        let properties_keys: HashSet<&ModelKey> = properties.iter().map(|(k, _)| k).collect();

        if let Some(key) = identity_keys.symmetric_difference(&properties_keys).next() {
            return Err(UserError::CorruptedCache(format!(
                "identity and properties disagree on {key}"
            )));
        }
        let Some(((active_key, _), earlier)) = identities.split_last() else {
            return Ok(None);
        };

        let push = self.push_subscription()?;
        let active = self.cached_user(active_key, &push)?;
        let mut retained = None;
        for (key, _) in earlier.iter().rev() {
            let user = self.cached_user(key, &push)?;
            let keep = retained.is_none()
                && active.external_id().is_none()
                && user.external_id().is_some();
            if keep {
                self.retain(&user);
                retained = Some(user);
            } else {
                debug!("evicting stale cached user {}", key);
                self.retire(&user);
            }
        }
        Ok(Some((active, retained)))
    }

    fn cached_user(&self, key: &ModelKey, push: &SubscriptionModel) -> UserResult<User> {
        let identity = self.context.identity_store().get(key);
        let properties = self.context.properties_store().get(key);
        let (Some(identity), Some(properties)) = (identity, properties) else {
            return Err(UserError::CorruptedCache(format!("incomplete pair {key}")));
        };
        Ok(self.handle(
            IdentityModel::from_model(identity),
            PropertiesModel::from_model(properties),
            push.clone(),
            None,
        ))
    }

    /// Drops every cached user model. The push subscription belongs to the
    /// device and is kept.
    fn discard_cache(&self) {
        let cleared = self.context.identity_store().clear() + self.context.properties_store().clear();
        let subscriptions = self.context.subscription_store();
        for (key, model) in subscriptions.get_all() {
            if SubscriptionKind::of(&model) != Some(SubscriptionKind::Push) {
                subscriptions.evict(&key);
            }
        }
        warn!("cleared {} cached user models", cleared);
    }

    /// The device push subscription, created on first need.
    fn push_subscription(&self) -> UserResult<SubscriptionModel> {
        let store = self.context.subscription_store();
        let existing = store
            .get_all()
            .into_iter()
            .map(|(_, model)| SubscriptionModel::from_model(model))
            .find(|sub| sub.kind() == Some(SubscriptionKind::Push));
        if let Some(push) = existing {
            return Ok(push);
        }
        let push = SubscriptionModel::new(SubscriptionKind::Push, None, None);
        store.add(push.model().clone())?;
        debug!("created push subscription {}", push.key());
        Ok(push)
    }

    fn handle(
        &self,
        identity: IdentityModel,
        properties: PropertiesModel,
        push: SubscriptionModel,
        token: Option<&str>,
    ) -> User {
        User::new(
            identity,
            properties,
            push,
            self.context.subscription_store().clone(),
            self.context.repo().clone(),
            token.map(str::to_string),
        )
    }

    fn lock_state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for UserManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("UserManager")
            .field("state", &state.state)
            .field("active", &state.active)
            .field("retained", &state.retained)
            .finish()
    }
}
