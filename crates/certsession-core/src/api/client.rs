//! Authenticated JSON calls against the business API.
//!
//! The session manager supplies the token; this module only knows how to
//! attach it, send the body and decode the reply.

use std::time::Duration;

use rand::Rng;
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

use crate::auth::SessionToken;
use crate::error::{Result, SessionError};

/// Attempts per call, including the first.
const MAX_ATTEMPTS: u32 = 3;

/// Base delay for retries, doubled per attempt.
const RETRY_BASE_DELAY_MS: u64 = 800;

/// Jitter added on top of each retry delay.
const RETRY_MAX_JITTER_MS: u64 = 100;

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    app_key: String,
    retry_base: Duration,
}

impl ApiClient {
    pub fn new(client: Client, base_url: &str, app_key: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            app_key,
            retry_base: Duration::from_millis(RETRY_BASE_DELAY_MS),
        }
    }

    /// Shorten retry delays; used by tests
    pub fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }

    fn auth_headers(&self, token: &SessionToken) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        headers.insert("x-application", header::HeaderValue::from_str(&self.app_key)?);
        headers.insert("x-authentication", header::HeaderValue::from_str(token.as_str())?);
        Ok(headers)
    }

    fn should_retry(status: reqwest::StatusCode) -> bool {
        status.as_u16() == 429 || status.is_server_error()
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(0..=RETRY_MAX_JITTER_MS);
        self.retry_base.saturating_mul(1 << attempt) + Duration::from_millis(jitter)
    }

    /// POST `body` as JSON to `{base}/{endpoint}/` and decode the reply as `T`.
    ///
    /// Network errors, unreadable bodies, 429 and 5xx are retried with
    /// exponential backoff; any other non-success status fails immediately.
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        token: &SessionToken,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}/{}/", self.base_url, endpoint.trim_matches('/'));
        let mut last_err = None;

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let delay = self.retry_delay(attempt);
                warn!(url = %url, attempt, delay_ms = delay.as_millis() as u64, "Retrying API call");
                tokio::time::sleep(delay).await;
            }

            let response = match self
                .client
                .post(&url)
                .headers(self.auth_headers(token)?)
                .json(body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    last_err = Some(SessionError::Transport(e));
                    continue;
                }
            };

            let status = response.status();
            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    last_err = Some(SessionError::Transport(e));
                    continue;
                }
            };

            if !status.is_success() {
                let err = SessionError::from_status(status, &text);
                if Self::should_retry(status) {
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }

            // A truncated or garbled body is treated like a dropped connection
            match serde_json::from_str(&text) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(url = %url, attempt, error = %e, "Undecodable API response");
                    last_err = Some(SessionError::Parse(e));
                }
            }
        }

        Err(last_err.unwrap_or(SessionError::Http {
            status: 0,
            body: format!("request failed after {} attempts", MAX_ATTEMPTS),
        }))
    }
}
