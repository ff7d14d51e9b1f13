//! Authentication module for certificate sessions.
//!
//! This module provides:
//! - `Credentials`: login material, validated before any network call
//! - `AuthClient`: login, keep-alive and logout against the identity service
//! - `SessionToken` / `TokenStore`: the live token and its concurrent holder
//!
//! Tokens are always 44 characters; anything else is a protocol failure.

pub mod credentials;
pub mod protocol;
pub mod token;

pub use credentials::Credentials;
pub use protocol::AuthClient;
pub use token::{SessionToken, TokenStore, SESSION_TOKEN_LENGTH};
