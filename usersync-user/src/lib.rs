//! User sessions for usersync.
//!
//! [`SdkContext`] wires the model stores, the operation repo, its executors
//! and the store listeners together. [`UserManager`] owns the active user:
//! it restores the cached session on [`start`](UserManager::start), switches
//! users on login and hands out [`User`] handles through which the host
//! application edits aliases, tags and subscriptions.
//!
//! ```ignore
//! let context = SdkContext::new(SdkConfig::default(), persistence, transport)?;
//! let manager = UserManager::new(context);
//! let user = manager.start()?;
//! user.set_tag("plan", "pro")?;
//! ```

mod config;
mod context;
mod error;
mod manager;
mod user;

pub use config::SdkConfig;
pub use context::SdkContext;
pub use error::{UserError, UserResult};
pub use manager::{UserManager, UserState};
pub use user::User;
