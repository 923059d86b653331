//! Operations: immutable descriptions of pending remote effects.

use serde::{Deserialize, Serialize};
use std::fmt;
use usersync_model::ModelSnapshot;
use usersync_types::{ModelKey, OperationId, PropertyValue, Timestamp};

/// The kind of remote effect an operation describes. Executors declare the
/// kinds they handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    CreateUser,
    SetAlias,
    DeleteAlias,
    UpdateProperty,
    CreateSubscription,
    UpdateSubscription,
    DeleteSubscription,
    TrackOutcome,
}

impl OperationKind {
    pub const ALL: [OperationKind; 8] = [
        Self::CreateUser,
        Self::SetAlias,
        Self::DeleteAlias,
        Self::UpdateProperty,
        Self::CreateSubscription,
        Self::UpdateSubscription,
        Self::DeleteSubscription,
        Self::TrackOutcome,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateUser => "create-user",
            Self::SetAlias => "set-alias",
            Self::DeleteAlias => "delete-alias",
            Self::UpdateProperty => "update-property",
            Self::CreateSubscription => "create-subscription",
            Self::UpdateSubscription => "update-subscription",
            Self::DeleteSubscription => "delete-subscription",
            Self::TrackOutcome => "track-outcome",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an operation carries to the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationPayload {
    /// A single property change.
    Delta {
        property: String,
        old_value: PropertyValue,
        new_value: PropertyValue,
    },
    /// The full state of one model (subscription create/delete).
    Snapshot { model: ModelSnapshot },
    /// Everything needed to create a user remotely in one call.
    User {
        identity: ModelSnapshot,
        properties: ModelSnapshot,
        subscriptions: Vec<ModelSnapshot>,
    },
    /// A named outcome attributed to a user, with an optional value.
    Outcome {
        name: String,
        value: Option<f64>,
        unique: bool,
    },
}

/// One pending remote effect.
///
/// Operations are never edited after construction: retries re-submit the
/// same value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    id: OperationId,
    kind: OperationKind,
    model_key: ModelKey,
    payload: OperationPayload,
    created_at: Timestamp,
}

impl Operation {
    pub fn new(kind: OperationKind, model_key: ModelKey, payload: OperationPayload) -> Self {
        Self {
            id: OperationId::new(),
            kind,
            model_key,
            payload,
            created_at: Timestamp::now(),
        }
    }

    /// Creates a single-property delta operation.
    pub fn delta(
        kind: OperationKind,
        model_key: ModelKey,
        property: impl Into<String>,
        old_value: PropertyValue,
        new_value: PropertyValue,
    ) -> Self {
        Self::new(
            kind,
            model_key,
            OperationPayload::Delta {
                property: property.into(),
                old_value,
                new_value,
            },
        )
    }

    /// Creates a whole-model operation targeting the snapshot's key.
    pub fn snapshot(kind: OperationKind, model: ModelSnapshot) -> Self {
        Self::new(kind, model.key.clone(), OperationPayload::Snapshot { model })
    }

    /// Creates the user-creation operation, targeting the identity key.
    pub fn create_user(
        identity: ModelSnapshot,
        properties: ModelSnapshot,
        subscriptions: Vec<ModelSnapshot>,
    ) -> Self {
        Self::new(
            OperationKind::CreateUser,
            identity.key.clone(),
            OperationPayload::User {
                identity,
                properties,
                subscriptions,
            },
        )
    }

    /// Creates an outcome operation for the user keyed `user_key`.
    pub fn outcome(
        user_key: ModelKey,
        name: impl Into<String>,
        value: Option<f64>,
        unique: bool,
    ) -> Self {
        Self::new(
            OperationKind::TrackOutcome,
            user_key,
            OperationPayload::Outcome {
                name: name.into(),
                value,
                unique,
            },
        )
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn model_key(&self) -> &ModelKey {
        &self.model_key
    }

    pub fn payload(&self) -> &OperationPayload {
        &self.payload
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }
}
