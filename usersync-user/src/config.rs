//! SDK configuration.

use crate::error::UserResult;
use serde::{Deserialize, Serialize};
use usersync_sync::RepoConfig;

/// Configuration for an [`SdkContext`](crate::SdkContext).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    /// Operation repo tuning.
    pub repo: RepoConfig,
    /// Cache key of the identity store.
    pub identity_store_key: String,
    /// Cache key of the properties store.
    pub properties_store_key: String,
    /// Cache key of the subscription store.
    pub subscription_store_key: String,
    /// Cache key of the operation queue.
    pub operation_store_key: String,
    /// Cancel the previous user's queued operations when the active user
    /// changes. By default they are still delivered.
    pub discard_pending_on_switch: bool,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            repo: RepoConfig::default(),
            identity_store_key: "identity".to_string(),
            properties_store_key: "properties".to_string(),
            subscription_store_key: "subscriptions".to_string(),
            operation_store_key: "operations".to_string(),
            discard_pending_on_switch: false,
        }
    }
}

impl SdkConfig {
    /// Parses a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> UserResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
