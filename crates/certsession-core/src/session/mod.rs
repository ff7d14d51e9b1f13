//! Session lifecycle management.
//!
//! - `SessionManager`: owns the token store and the background renewal task
//! - `RenewalPolicy` / `FailureTracker`: keep-alive interval and reconnect escalation
//! - `ErrorNotifier`: hands background failures to a user callback off the renewal path

pub mod manager;
pub mod notifier;
pub mod policy;

pub use manager::{SessionManager, SessionState};
pub use notifier::{ErrorHandler, ErrorNotifier};
pub use policy::{FailureTracker, RenewalPolicy};
