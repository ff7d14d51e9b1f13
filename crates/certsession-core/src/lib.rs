//! Certificate-authenticated session management.
//!
//! Log in with a client certificate, keep the session alive in the
//! background, reconnect with backoff when keep-alives fail, and hand the
//! live token to any number of concurrent callers.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod session;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use auth::{Credentials, SessionToken};
pub use config::{Config, SessionConfig};
pub use error::{Result, SessionError};
pub use session::{ErrorHandler, RenewalPolicy, SessionManager, SessionState};
