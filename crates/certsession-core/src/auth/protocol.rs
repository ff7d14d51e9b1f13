//! Login, keep-alive and logout against the certificate identity service.
//!
//! Each call is a single HTTP exchange. Retry decisions belong to the
//! session manager, which knows how many failures came before.

use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::debug;

use super::{Credentials, SessionToken};
use crate::error::{preview_token, Result, SessionError};

const HEADER_APPLICATION: &str = "x-application";
const HEADER_AUTHENTICATION: &str = "x-authentication";

/// Success sentinel shared by all three identity responses
const STATUS_SUCCESS: &str = "SUCCESS";

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(rename = "sessionToken", default)]
    session_token: String,
    #[serde(rename = "loginStatus", default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct KeepAliveResponse {
    #[serde(default)]
    token: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LogoutResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the identity endpoints.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

impl AuthClient {
    pub fn new(client: Client, base_url: &str, credentials: Credentials) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    pub fn app_key(&self) -> &str {
        &self.credentials.app_key
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    /// Full certificate login; the result replaces whatever session existed
    pub async fn login(&self) -> Result<SessionToken> {
        let response = self
            .client
            .post(self.url("certlogin"))
            .header(HEADER_APPLICATION, &self.credentials.app_key)
            .header(header::ACCEPT, "application/json")
            .form(&[
                ("username", self.credentials.username.as_str()),
                ("password", self.credentials.password.as_str()),
            ])
            .send()
            .await?;

        let login: LoginResponse = Self::read_json(response).await?;

        if login.status == STATUS_SUCCESS {
            if let Some(token) = SessionToken::parse(&login.session_token) {
                debug!(token = %token, "Login accepted");
                return Ok(token);
            }
        }

        Err(SessionError::AuthRejected {
            status: login.status,
            token: preview_token(&login.session_token),
        })
    }

    /// Extend the session; the service answers with the token to use from now on
    pub async fn keep_alive(&self, token: &SessionToken) -> Result<SessionToken> {
        let response = self
            .client
            .post(self.url("keepAlive"))
            .headers(self.session_headers(token)?)
            .send()
            .await?;

        let keep_alive: KeepAliveResponse = Self::read_json(response).await?;

        if keep_alive.status == STATUS_SUCCESS {
            if let Some(renewed) = SessionToken::parse(&keep_alive.token) {
                return Ok(renewed);
            }
        }

        Err(SessionError::KeepAliveRejected {
            status: keep_alive.status,
            error: keep_alive.error.unwrap_or_default(),
            token: preview_token(&keep_alive.token),
        })
    }

    pub async fn logout(&self, token: &SessionToken) -> Result<()> {
        let response = self
            .client
            .post(self.url("logout"))
            .headers(self.session_headers(token)?)
            .send()
            .await?;

        let logout: LogoutResponse = Self::read_json(response).await?;

        if logout.status == STATUS_SUCCESS {
            return Ok(());
        }

        Err(SessionError::LogoutRejected {
            status: logout.status,
            error: logout.error.unwrap_or_default(),
        })
    }

    fn session_headers(&self, token: &SessionToken) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        headers.insert(HEADER_APPLICATION, header_value(&self.credentials.app_key)?);
        headers.insert(HEADER_AUTHENTICATION, header_value(token.as_str())?);
        Ok(headers)
    }

    /// Parse the body whatever the status; the identity service reports
    /// failures in the JSON. A non-JSON error page becomes an HTTP error.
    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let body = response.text().await?;

        match serde_json::from_str(&body) {
            Ok(parsed) => Ok(parsed),
            Err(_) if !status.is_success() => Err(SessionError::from_status(status, &body)),
            Err(e) => Err(SessionError::Parse(e)),
        }
    }
}

fn header_value(value: &str) -> Result<header::HeaderValue> {
    Ok(header::HeaderValue::from_str(value)?)
}
