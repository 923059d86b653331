//! Identity model: the user's aliases, including `external_id`.

use crate::Model;
use std::collections::BTreeMap;
use std::sync::Arc;
use usersync_types::{ModelKey, PropertyValue};

/// Alias label reserved for the host application's own user ID.
pub const EXTERNAL_ID: &str = "external_id";

/// Typed view over an identity model.
///
/// Every property is an alias: label → ID. The `external_id` label is
/// reserved and only written by the user manager during login.
#[derive(Debug, Clone)]
pub struct IdentityModel {
    model: Arc<Model>,
}

impl IdentityModel {
    /// Creates a fresh, empty identity model.
    pub fn new(key: ModelKey) -> Self {
        Self {
            model: Model::shared(key),
        }
    }

    /// Wraps an existing model (e.g. one restored from cache).
    pub fn from_model(model: Arc<Model>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn key(&self) -> &ModelKey {
        self.model.key()
    }

    pub fn external_id(&self) -> Option<String> {
        self.alias(EXTERNAL_ID)
    }

    pub fn alias(&self, label: &str) -> Option<String> {
        self.model
            .get(label)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    /// All aliases, including `external_id` when set.
    pub fn aliases(&self) -> BTreeMap<String, String> {
        self.model
            .properties()
            .into_iter()
            .filter_map(|(label, value)| match value {
                PropertyValue::String(id) => Some((label, id)),
                _ => None,
            })
            .collect()
    }

    pub fn set_alias(&self, label: &str, id: &str) -> bool {
        self.model.set(label, id)
    }

    pub fn remove_alias(&self, label: &str) -> bool {
        self.model.remove(label)
    }
}
