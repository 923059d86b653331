//! Properties model: the user's tags.

use crate::Model;
use std::collections::BTreeMap;
use std::sync::Arc;
use usersync_types::{ModelKey, PropertyValue};

/// Typed view over a properties model. Tags are stored as properties named
/// by their tag key.
#[derive(Debug, Clone)]
pub struct PropertiesModel {
    model: Arc<Model>,
}

impl PropertiesModel {
    pub fn new(key: ModelKey) -> Self {
        Self {
            model: Model::shared(key),
        }
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

    pub fn tag(&self, key: &str) -> Option<PropertyValue> {
        self.model.get(key)
    }

    pub fn tags(&self) -> BTreeMap<String, PropertyValue> {
        self.model.properties()
    }

    pub fn set_tag(&self, key: &str, value: impl Into<PropertyValue>) -> bool {
        self.model.set(key, value)
    }

    pub fn remove_tag(&self, key: &str) -> bool {
        self.model.remove(key)
    }
}
