use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::error::{preview_token, Result, SessionError};

/// Length of every token the identity service issues.
pub const SESSION_TOKEN_LENGTH: usize = 44;

/// A session token accepted from a successful login or keep-alive.
///
/// Clone is cheap; the token text is shared.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    value: Arc<str>,
    issued_at: DateTime<Utc>,
}

impl SessionToken {
    /// Accept a token only if it has the exact length the service issues
    pub fn parse(value: &str) -> Option<Self> {
        if value.len() != SESSION_TOKEN_LENGTH {
            return None;
        }
        Some(Self {
            value: Arc::from(value),
            issued_at: Utc::now(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Minutes since the token was issued (for display)
    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.issued_at).num_minutes().max(0)
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("value", &preview_token(&self.value))
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&preview_token(&self.value))
    }
}

/// Holder for the live session token.
///
/// Readers take a short read borrow and clone the `Arc`, so they never wait
/// on a keep-alive or reconnect in flight. The renewal loop is the only writer
/// and replaces the whole value at once.
pub struct TokenStore {
    tx: watch::Sender<Option<SessionToken>>,
}

impl TokenStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// The current token, or `NotInitialized` before the first login and after shutdown
    pub fn current(&self) -> Result<SessionToken> {
        self.tx.borrow().clone().ok_or(SessionError::NotInitialized)
    }

    pub fn replace(&self, token: SessionToken) {
        self.tx.send_replace(Some(token));
    }

    /// Replace the token unless `closed` reports shutdown.
    ///
    /// The check runs under the store's write lock, so a `clear` issued after
    /// shutdown began is never overwritten.
    pub fn replace_unless(&self, token: SessionToken, closed: impl FnOnce() -> bool) -> bool {
        self.tx.send_if_modified(|slot| {
            if closed() {
                return false;
            }
            *slot = Some(token);
            true
        })
    }

    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    /// Watch renewals; the receiver sees `None` once the session is closed
    pub fn subscribe(&self) -> watch::Receiver<Option<SessionToken>> {
        self.tx.subscribe()
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}
