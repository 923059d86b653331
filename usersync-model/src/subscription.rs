//! Subscription model: push, email and SMS channels.

use crate::Model;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use usersync_types::ModelKey;

const KIND: &str = "type";
const ADDRESS: &str = "address";
const ENABLED: &str = "enabled";
const OWNER: &str = "owner";

/// The channel a subscription delivers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    /// Device push channel. Device-scoped: survives user switches.
    Push,
    /// Email address. Owned by one user.
    Email,
    /// SMS number. Owned by one user.
    Sms,
}

impl SubscriptionKind {
    /// Reads the kind stored on a subscription model.
    pub fn of(model: &Model) -> Option<Self> {
        model
            .get(KIND)
            .and_then(|v| v.as_str().and_then(|s| s.parse().ok()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Email => "email",
            Self::Sms => "sms",
        }
    }
}

impl fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(Self::Push),
            "email" => Ok(Self::Email),
            "sms" => Ok(Self::Sms),
            other => Err(format!("unknown subscription kind: {other}")),
        }
    }
}

/// Typed view over a subscription model.
#[derive(Debug, Clone)]
pub struct SubscriptionModel {
    model: Arc<Model>,
}

impl SubscriptionModel {
    /// Creates a subscription with a generated key. The initial properties
    /// are hydrated: they describe the subscription, they are not edits.
    pub fn new(kind: SubscriptionKind, address: Option<&str>, owner: Option<&ModelKey>) -> Self {
        let model = Model::shared(ModelKey::generate());
        model.hydrate(KIND, kind.as_str());
        model.hydrate(ADDRESS, address);
        model.hydrate(ENABLED, kind != SubscriptionKind::Push);
        model.hydrate(OWNER, owner.map(ModelKey::as_str));
        Self { model }
    }

    pub fn from_model(model: Arc<Model>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn key(&self) -> &ModelKey {
        self.model.key()
    }

    /// `None` if the stored kind is missing or unknown.
    pub fn kind(&self) -> Option<SubscriptionKind> {
        SubscriptionKind::of(&self.model)
    }

    /// Push token, email address or phone number.
    pub fn address(&self) -> Option<String> {
        self.model
            .get(ADDRESS)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    pub fn enabled(&self) -> bool {
        self.model
            .get(ENABLED)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Key of the user that owns an email/SMS subscription.
    pub fn owner(&self) -> Option<String> {
        self.model
            .get(OWNER)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    pub fn is_owned_by(&self, user: &ModelKey) -> bool {
        self.owner().as_deref() == Some(user.as_str())
    }

    pub fn set_address(&self, address: Option<&str>) -> bool {
        self.model.set(ADDRESS, address)
    }

    pub fn set_enabled(&self, enabled: bool) -> bool {
        self.model.set(ENABLED, enabled)
    }
}
