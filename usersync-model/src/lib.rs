//! Observable model layer for usersync.
//!
//! Defines the types every other layer builds on:
//! - [`EventProducer`]: synchronous one-to-many fan-out to subscribed handlers
//! - [`Model`]: a versioned bag of named [`PropertyValue`]s that fires a
//!   [`ModelChangedArgs`] on every effective write
//! - [`ModelSnapshot`]: the serializable state of a model
//! - [`IdentityModel`], [`PropertiesModel`], [`SubscriptionModel`]: typed
//!   accessors over a [`Model`] for each model kind
//!
//! Models never talk to storage or the network. Stores persist them and
//! listeners turn their change events into operations.

mod identity;
mod model;
mod producer;
mod properties;
mod subscription;

pub use identity::{IdentityModel, EXTERNAL_ID};
pub use model::{Model, ModelChangedArgs, ModelChangedHandler, ModelSnapshot};
pub use producer::{EventProducer, SubscriptionId};
pub use properties::PropertiesModel;
pub use subscription::{SubscriptionKind, SubscriptionModel};
pub use usersync_types::{ModelKey, PropertyValue};
