//! Operation builders for the identity, properties and subscription stores.

use crate::listener::OperationBuilder;
use crate::operation::{Operation, OperationKind};
use usersync_model::{EXTERNAL_ID, Model, ModelChangedArgs, SubscriptionKind};

/// Alias writes become `set-alias`, alias removals `delete-alias`.
///
/// `external_id` is owned by user creation and never synced on its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityDeltas;

impl OperationBuilder for IdentityDeltas {
    fn on_update(&self, args: &ModelChangedArgs<'_>) -> Option<Operation> {
        if args.property == EXTERNAL_ID {
            return None;
        }
        let kind = if args.new_value.is_null() {
            OperationKind::DeleteAlias
        } else {
            OperationKind::SetAlias
        };
        Some(Operation::delta(
            kind,
            args.model.key().clone(),
            args.property,
            args.old_value.clone(),
            args.new_value.clone(),
        ))
    }
}

/// Every property change becomes `update-property`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PropertiesDeltas;

impl OperationBuilder for PropertiesDeltas {
    fn on_update(&self, args: &ModelChangedArgs<'_>) -> Option<Operation> {
        Some(Operation::delta(
            OperationKind::UpdateProperty,
            args.model.key().clone(),
            args.property,
            args.old_value.clone(),
            args.new_value.clone(),
        ))
    }
}

/// Subscription edits become `update-subscription`. Email and SMS
/// subscriptions added or removed by the user become
/// `create-subscription` / `delete-subscription`; the push subscription is
/// created along with the user.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubscriptionDeltas;

impl SubscriptionDeltas {
    fn owned_channel(model: &Model) -> bool {
        SubscriptionKind::of(model).is_some_and(|kind| kind != SubscriptionKind::Push)
    }
}

impl OperationBuilder for SubscriptionDeltas {
    fn on_update(&self, args: &ModelChangedArgs<'_>) -> Option<Operation> {
        Some(Operation::delta(
            OperationKind::UpdateSubscription,
            args.model.key().clone(),
            args.property,
            args.old_value.clone(),
            args.new_value.clone(),
        ))
    }

    fn on_added(&self, model: &Model) -> Option<Operation> {
        Self::owned_channel(model)
            .then(|| Operation::snapshot(OperationKind::CreateSubscription, model.snapshot()))
    }

    fn on_removed(&self, model: &Model) -> Option<Operation> {
        Self::owned_channel(model)
            .then(|| Operation::snapshot(OperationKind::DeleteSubscription, model.snapshot()))
    }
}
