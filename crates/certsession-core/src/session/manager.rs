//! Session lifecycle: login, periodic keep-alive, reconnect with backoff,
//! and shutdown.
//!
//! One background task owns the renewal loop for the life of the session.
//! Callers read the token through [`SessionManager::current_token`], which
//! never waits on that task.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::notifier::{ErrorHandler, ErrorNotifier};
use super::policy::{FailureTracker, RenewalPolicy};
use crate::api::ApiClient;
use crate::auth::{AuthClient, Credentials, SessionToken, TokenStore};
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::transport;

const STATE_STARTING: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_CLOSED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Running,
    Closed,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            STATE_STARTING => SessionState::Starting,
            STATE_RUNNING => SessionState::Running,
            _ => SessionState::Closed,
        }
    }
}

/// State shared between the manager handle and its renewal task.
struct Shared {
    auth: AuthClient,
    tokens: TokenStore,
    notifier: ErrorNotifier,
    state: AtomicU8,
    policy: RenewalPolicy,
    /// Cancelled to ask the renewal task to stop
    shutdown: CancellationToken,
    /// Cancelled by the renewal task as it exits, however it exits
    finished: CancellationToken,
}

/// A logged-in session kept alive in the background.
pub struct SessionManager {
    shared: Arc<Shared>,
    api: ApiClient,
}

impl SessionManager {
    /// Validate credentials, log in, and start keeping the session alive.
    ///
    /// Returns only once the first token is stored, so a manager is never
    /// observed unauthenticated. Validation and certificate problems are
    /// reported before any network call.
    pub async fn connect(
        credentials: Credentials,
        config: SessionConfig,
        handler: Option<ErrorHandler>,
    ) -> Result<Self> {
        credentials.validate()?;

        let client = transport::build_client(&credentials, &config.transport)?;
        let api = ApiClient::new(client.clone(), &config.api_url, credentials.app_key.clone());
        let auth = AuthClient::new(client, &config.identity_url, credentials);

        info!(identity_url = %config.identity_url, "Logging in");
        let token = auth.login().await?;
        info!(token = %token, "Session established");

        let shared = Arc::new(Shared {
            auth,
            tokens: TokenStore::new(),
            notifier: ErrorNotifier::spawn(handler),
            state: AtomicU8::new(STATE_STARTING),
            policy: config.policy,
            shutdown: CancellationToken::new(),
            finished: CancellationToken::new(),
        });
        shared.tokens.replace(token);
        shared.state.store(STATE_RUNNING, Ordering::Release);

        tokio::spawn(Self::run_renewal(Arc::clone(&shared)));

        Ok(Self { shared, api })
    }

    /// The live token; `NotInitialized` once the session has closed
    pub fn current_token(&self) -> Result<SessionToken> {
        self.shared.tokens.current()
    }

    /// Receive every renewed token; `None` marks the session closing
    pub fn subscribe(&self) -> watch::Receiver<Option<SessionToken>> {
        self.shared.tokens.subscribe()
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    pub fn set_error_handler(&self, handler: ErrorHandler) {
        self.shared.notifier.set_handler(handler);
    }

    pub fn clear_error_handler(&self) {
        self.shared.notifier.clear_handler();
    }

    /// POST to a business endpoint with the live token attached.
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T> {
        let token = self.current_token()?;
        self.api.post(endpoint, &token, body).await
    }

    /// Stop the renewal task, log out, and wait a bounded time for it to finish.
    ///
    /// A second call fails with `AlreadyClosed`. On timeout the session stays
    /// closed; the task finishes on its own.
    pub async fn close(&self) -> Result<()> {
        if self
            .shared
            .state
            .compare_exchange(STATE_RUNNING, STATE_CLOSED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SessionError::AlreadyClosed);
        }

        info!("Closing session");
        self.shared.shutdown.cancel();

        let timeout = self.shared.policy.shutdown_timeout;
        let waited = tokio::time::timeout(timeout, self.shared.finished.cancelled()).await;
        if waited.is_err() {
            warn!(timeout_ms = timeout.as_millis() as u64, "Renewal task did not stop in time");
            self.shared.tokens.clear();
            return Err(SessionError::ShutdownTimeout(timeout));
        }

        info!("Session closed");
        Ok(())
    }

    async fn run_renewal(shared: Arc<Shared>) {
        // Marks completion for `close`, including on panic
        let _finished = shared.finished.clone().drop_guard();

        let period = shared.policy.keepalive_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures = FailureTracker::new();

        debug!(interval_secs = period.as_secs(), "Renewal task started");

        loop {
            tokio::select! {
                biased;

                _ = shared.shutdown.cancelled() => {
                    shared.logout().await;
                    shared.tokens.clear();
                    debug!("Renewal task stopped");
                    return;
                }

                _ = ticker.tick() => {
                    if shared.renew(&mut failures).await.is_break() {
                        return;
                    }
                }
            }
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        // Let the background task log out and exit
        self.shared.shutdown.cancel();
    }
}

impl Shared {
    /// One keep-alive tick, escalating to reconnects on failure.
    /// Breaks when the session has given up and closed itself.
    async fn renew(&self, failures: &mut FailureTracker) -> ControlFlow<()> {
        let renewed = match self.tokens.current() {
            Ok(token) => self.auth.keep_alive(&token).await,
            Err(e) => Err(e),
        };

        match renewed {
            Ok(token) => {
                failures.reset();
                if !self.store_renewed(token) {
                    debug!("Keep-alive finished after shutdown, discarding token");
                }
                return ControlFlow::Continue(());
            }
            Err(err) => {
                let count = failures.record_failure();
                warn!(error = %err, failures = count, "Keep-alive failed");
                self.notifier.notify(SessionError::KeepAliveFailed(Box::new(err)));
            }
        }

        if let Some(delay) = self.policy.backoff_with_jitter(failures.count()) {
            debug!(delay_ms = delay.as_millis() as u64, "Backing off before reconnect");
            tokio::time::sleep(delay).await;
        }

        if self.shutdown.is_cancelled() {
            return ControlFlow::Continue(());
        }

        match self.auth.login().await {
            Ok(token) => {
                failures.reset();
                if self.store_renewed(token) {
                    info!("Reconnected");
                } else {
                    debug!("Reconnect finished after shutdown, discarding token");
                }
                ControlFlow::Continue(())
            }
            Err(err) => {
                let attempt = failures.count();
                warn!(error = %err, attempt, "Reconnect failed");
                self.notifier.notify(SessionError::ReconnectFailed {
                    attempt,
                    source: Box::new(err),
                });

                if !failures.is_exhausted(&self.policy) {
                    return ControlFlow::Continue(());
                }

                error!(attempts = attempt, "Max reconnect attempts reached, closing session");
                self.notifier.notify(SessionError::RetriesExhausted { attempts: attempt });
                self.logout().await;
                self.tokens.clear();
                self.state.store(STATE_CLOSED, Ordering::Release);
                self.shutdown.cancel();
                ControlFlow::Break(())
            }
        }
    }

    /// Store a renewed token while the session is still running.
    /// A `close` that has already begun wins and the token is dropped.
    fn store_renewed(&self, token: SessionToken) -> bool {
        debug!(token = %token, "Storing renewed token");
        self.tokens.replace_unless(token, || self.shutdown.is_cancelled())
    }

    /// Best-effort logout; failures are reported, never propagated
    async fn logout(&self) {
        let Ok(token) = self.tokens.current() else {
            return;
        };

        match self.auth.logout(&token).await {
            Ok(()) => info!("Logged out"),
            Err(err) => {
                warn!(error = %err, "Logout failed");
                self.notifier.notify(SessionError::LogoutFailed(Box::new(err)));
            }
        }
    }
}
