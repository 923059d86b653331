//! The user handle.

use crate::error::{UserError, UserResult};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;
use usersync_model::{
    EXTERNAL_ID, IdentityModel, ModelKey, PropertiesModel, PropertyValue, SubscriptionKind,
    SubscriptionModel,
};
use usersync_storage::ModelStore;
use usersync_sync::{Operation, OperationRepo};

struct UserInner {
    identity: IdentityModel,
    properties: PropertiesModel,
    push: SubscriptionModel,
    subscriptions: Arc<ModelStore>,
    repo: Arc<OperationRepo>,
    token: Mutex<Option<String>>,
    triggers: Mutex<BTreeMap<String, PropertyValue>>,
    unique_outcomes: Mutex<HashSet<String>>,
    replaced: AtomicBool,
}

/// A handle to one user session.
///
/// Every call resolves against the in-memory models and returns at once;
/// syncing happens in the background. Handles are cheap to clone.
///
/// Once the manager switches to another user, an old handle is replaced:
/// its models are detached from sync, email, SMS and outcome calls through
/// it are ignored, and nothing it does reaches the remote side or the new
/// user. The push subscription belongs to the device and is the exception.
#[derive(Clone)]
pub struct User {
    inner: Arc<UserInner>,
}

impl User {
    pub(crate) fn new(
        identity: IdentityModel,
        properties: PropertiesModel,
        push: SubscriptionModel,
        subscriptions: Arc<ModelStore>,
        repo: Arc<OperationRepo>,
        token: Option<String>,
    ) -> Self {
        Self {
            inner: Arc::new(UserInner {
                identity,
                properties,
                push,
                subscriptions,
                repo,
                token: Mutex::new(token),
                triggers: Mutex::new(BTreeMap::new()),
                unique_outcomes: Mutex::new(HashSet::new()),
                replaced: AtomicBool::new(false),
            }),
        }
    }

    /// Marks the handle as no longer the active user.
    pub(crate) fn mark_replaced(&self) {
        self.inner.replaced.store(true, Ordering::SeqCst);
    }

    /// True once the manager has switched to another user.
    pub fn is_replaced(&self) -> bool {
        self.inner.replaced.load(Ordering::SeqCst)
    }

    /// The local key shared by this user's identity and properties models.
    pub fn key(&self) -> &ModelKey {
        self.inner.identity.key()
    }

    pub fn external_id(&self) -> Option<String> {
        self.inner.identity.external_id()
    }

    /// Auth token supplied at login, if any.
    pub fn token(&self) -> Option<String> {
        lock(&self.inner.token).clone()
    }

    pub(crate) fn set_token(&self, token: Option<String>) {
        *lock(&self.inner.token) = token;
    }

    /// True if both handles refer to the same session.
    pub fn same_user(&self, other: &User) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ── Aliases ──────────────────────────────────────────────────

    pub fn add_alias(&self, label: &str, id: &str) -> UserResult<()> {
        validate_alias(label, id)?;
        self.inner.identity.set_alias(label, id);
        Ok(())
    }

    /// Adds several aliases. Nothing is written unless all are valid.
    pub fn add_aliases<'a>(
        &self,
        aliases: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> UserResult<()> {
        let aliases: Vec<(&str, &str)> = aliases.into_iter().collect();
        for (label, id) in &aliases {
            validate_alias(label, id)?;
        }
        for (label, id) in aliases {
            self.inner.identity.set_alias(label, id);
        }
        Ok(())
    }

    pub fn remove_alias(&self, label: &str) -> UserResult<()> {
        validate_label(label)?;
        self.inner.identity.remove_alias(label);
        Ok(())
    }

    pub fn remove_aliases<'a>(&self, labels: impl IntoIterator<Item = &'a str>) -> UserResult<()> {
        let labels: Vec<&str> = labels.into_iter().collect();
        for label in &labels {
            validate_label(label)?;
        }
        for label in labels {
            self.inner.identity.remove_alias(label);
        }
        Ok(())
    }

    /// Aliases by label, without `external_id`.
    pub fn aliases(&self) -> BTreeMap<String, String> {
        let mut aliases = self.inner.identity.aliases();
        aliases.remove(EXTERNAL_ID);
        aliases
    }

    // ── Tags ─────────────────────────────────────────────────────

    pub fn set_tag(&self, key: &str, value: impl Into<PropertyValue>) -> UserResult<()> {
        validate_key("tag", key)?;
        self.inner.properties.set_tag(key, value);
        Ok(())
    }

    pub fn set_tags<'a, V: Into<PropertyValue>>(
        &self,
        tags: impl IntoIterator<Item = (&'a str, V)>,
    ) -> UserResult<()> {
        let tags: Vec<(&str, V)> = tags.into_iter().collect();
        for (key, _) in &tags {
            validate_key("tag", key)?;
        }
        for (key, value) in tags {
            self.inner.properties.set_tag(key, value);
        }
        Ok(())
    }

    pub fn remove_tag(&self, key: &str) -> UserResult<()> {
        validate_key("tag", key)?;
        self.inner.properties.remove_tag(key);
        Ok(())
    }

    pub fn remove_tags<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> UserResult<()> {
        let keys: Vec<&str> = keys.into_iter().collect();
        for key in &keys {
            validate_key("tag", key)?;
        }
        for key in keys {
            self.inner.properties.remove_tag(key);
        }
        Ok(())
    }

    pub fn tag(&self, key: &str) -> Option<PropertyValue> {
        self.inner.properties.tag(key)
    }

    pub fn tags(&self) -> BTreeMap<String, PropertyValue> {
        self.inner.properties.tags()
    }

    // ── Triggers ─────────────────────────────────────────────────
    //
    // Triggers live only in memory for the lifetime of this handle.

    pub fn set_trigger(&self, key: &str, value: impl Into<PropertyValue>) -> UserResult<()> {
        validate_key("trigger", key)?;
        let value = value.into();
        let mut triggers = lock(&self.inner.triggers);
        if value.is_null() {
            triggers.remove(key);
        } else {
            triggers.insert(key.to_string(), value);
        }
        Ok(())
    }

    pub fn set_triggers<'a, V: Into<PropertyValue>>(
        &self,
        triggers: impl IntoIterator<Item = (&'a str, V)>,
    ) -> UserResult<()> {
        let triggers: Vec<(&str, V)> = triggers.into_iter().collect();
        for (key, _) in &triggers {
            validate_key("trigger", key)?;
        }
        for (key, value) in triggers {
            self.set_trigger(key, value)?;
        }
        Ok(())
    }

    pub fn remove_trigger(&self, key: &str) -> UserResult<()> {
        self.set_trigger(key, PropertyValue::Null)
    }

    pub fn remove_triggers<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> UserResult<()> {
        let keys: Vec<&str> = keys.into_iter().collect();
        for key in &keys {
            validate_key("trigger", key)?;
        }
        let mut triggers = lock(&self.inner.triggers);
        for key in keys {
            triggers.remove(key);
        }
        Ok(())
    }

    pub fn trigger(&self, key: &str) -> Option<PropertyValue> {
        lock(&self.inner.triggers).get(key).cloned()
    }

    pub fn triggers(&self) -> BTreeMap<String, PropertyValue> {
        lock(&self.inner.triggers).clone()
    }

    // ── Outcomes ─────────────────────────────────────────────────

    /// Reports an outcome for this user.
    pub fn send_outcome(&self, name: &str) -> UserResult<()> {
        self.track_outcome(name, None, false)
    }

    /// Reports an outcome at most once for this session; repeats are
    /// ignored.
    pub fn send_unique_outcome(&self, name: &str) -> UserResult<()> {
        validate_key("outcome", name)?;
        if !lock(&self.inner.unique_outcomes).insert(name.to_string()) {
            debug!("unique outcome {} already sent", name);
            return Ok(());
        }
        self.track_outcome(name, None, true)
    }

    /// Reports an outcome carrying a value. The value must be finite.
    pub fn send_outcome_with_value(&self, name: &str, value: f64) -> UserResult<()> {
        if !value.is_finite() {
            return Err(UserError::InvalidInput(format!(
                "outcome {name} has non-finite value {value}"
            )));
        }
        self.track_outcome(name, Some(value), false)
    }

    fn track_outcome(&self, name: &str, value: Option<f64>, unique: bool) -> UserResult<()> {
        validate_key("outcome", name)?;
        if self.is_replaced() {
            debug!("ignoring outcome {} from replaced user {}", name, self.key());
            return Ok(());
        }
        self.inner
            .repo
            .enqueue(Operation::outcome(self.key().clone(), name, value, unique));
        Ok(())
    }

    // ── Subscriptions ────────────────────────────────────────────

    /// The device push subscription. Shared by every user on this device.
    pub fn push_subscription(&self) -> &SubscriptionModel {
        &self.inner.push
    }

    /// Adds an email subscription owned by this user. No-op if the address
    /// is already subscribed.
    pub fn add_email(&self, address: &str) -> UserResult<()> {
        self.add_owned(SubscriptionKind::Email, address)
    }

    pub fn remove_email(&self, address: &str) -> UserResult<()> {
        self.remove_owned(SubscriptionKind::Email, address)
    }

    pub fn emails(&self) -> Vec<String> {
        self.addresses(SubscriptionKind::Email)
    }

    /// Adds an SMS subscription owned by this user. No-op if the number is
    /// already subscribed.
    pub fn add_sms_number(&self, number: &str) -> UserResult<()> {
        self.add_owned(SubscriptionKind::Sms, number)
    }

    pub fn remove_sms_number(&self, number: &str) -> UserResult<()> {
        self.remove_owned(SubscriptionKind::Sms, number)
    }

    pub fn sms_numbers(&self) -> Vec<String> {
        self.addresses(SubscriptionKind::Sms)
    }

    /// Email and SMS subscriptions owned by this user, in insertion order.
    pub(crate) fn owned_subscriptions(&self) -> Vec<SubscriptionModel> {
        self.inner
            .subscriptions
            .get_all()
            .into_iter()
            .map(|(_, model)| SubscriptionModel::from_model(model))
            .filter(|sub| sub.is_owned_by(self.key()))
            .collect()
    }

    fn find_owned(&self, kind: SubscriptionKind, address: &str) -> Option<SubscriptionModel> {
        self.owned_subscriptions()
            .into_iter()
            .find(|sub| sub.kind() == Some(kind) && sub.address().as_deref() == Some(address))
    }

    fn addresses(&self, kind: SubscriptionKind) -> Vec<String> {
        self.owned_subscriptions()
            .into_iter()
            .filter(|sub| sub.kind() == Some(kind))
            .filter_map(|sub| sub.address())
            .collect()
    }

    fn add_owned(&self, kind: SubscriptionKind, address: &str) -> UserResult<()> {
        validate_key(kind.as_str(), address)?;
        if self.is_replaced() {
            debug!("ignoring {} add from replaced user {}", kind, self.key());
            return Ok(());
        }
        if self.find_owned(kind, address).is_some() {
            return Ok(());
        }
        let sub = SubscriptionModel::new(kind, Some(address), Some(self.key()));
        self.inner.subscriptions.add(sub.model().clone())?;
        Ok(())
    }

    fn remove_owned(&self, kind: SubscriptionKind, address: &str) -> UserResult<()> {
        validate_key(kind.as_str(), address)?;
        if self.is_replaced() {
            debug!("ignoring {} removal from replaced user {}", kind, self.key());
            return Ok(());
        }
        if let Some(sub) = self.find_owned(kind, address) {
            self.inner.subscriptions.remove(sub.key());
        }
        Ok(())
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("key", self.key())
            .field("external_id", &self.external_id())
            .finish()
    }
}

fn validate_key(what: &str, key: &str) -> UserResult<()> {
    if key.trim().is_empty() {
        return Err(UserError::InvalidInput(format!("empty {what}")));
    }
    Ok(())
}

fn validate_label(label: &str) -> UserResult<()> {
    validate_key("alias label", label)?;
    if label == EXTERNAL_ID {
        return Err(UserError::InvalidInput(format!(
            "alias label {EXTERNAL_ID} is reserved, use login"
        )));
    }
    Ok(())
}

fn validate_alias(label: &str, id: &str) -> UserResult<()> {
    validate_label(label)?;
    validate_key("alias id", id)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
