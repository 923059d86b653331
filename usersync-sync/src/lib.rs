//! Operation pipeline for usersync.
//!
//! Turns local model changes into durable, ordered remote effects:
//! - [`ModelStoreListener`] observes a store and its models and hands user
//!   edits to an [`OperationBuilder`] ([`IdentityDeltas`],
//!   [`PropertiesDeltas`], [`SubscriptionDeltas`])
//! - [`OperationRepo`] persists the resulting [`Operation`]s and dispatches
//!   them per model key to registered [`OperationExecutor`]s
//! - executors talk to the backend through a [`Transport`]
//! - every queue transition is reported to a [`RepoObserver`]

pub mod deltas;
pub mod error;
pub mod executor;
pub mod executors;
pub mod listener;
pub mod observer;
pub mod operation;
pub mod repo;
pub mod transport;

pub use deltas::{IdentityDeltas, PropertiesDeltas, SubscriptionDeltas};
pub use error::{SyncError, SyncResult};
pub use executor::{ExecutionOutcome, ExecutionResult, OperationExecutor};
pub use executors::{
    IdentityOperationExecutor, OutcomeOperationExecutor, PropertyOperationExecutor,
    SubscriptionOperationExecutor, UserOperationExecutor,
};
pub use listener::{ModelStoreListener, OperationBuilder};
pub use observer::{NoopObserver, RecordingObserver, RepoEvent, RepoObserver, TracingObserver};
pub use operation::{Operation, OperationKind, OperationPayload};
pub use repo::{OperationRepo, RepoConfig};
pub use transport::{Endpoint, Method, Transport, TransportOutcome};
