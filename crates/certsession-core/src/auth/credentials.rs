use std::fmt;

use crate::error::{Result, SessionError};

/// Environment variable names read by [`Credentials::from_env`]
pub const ENV_USERNAME: &str = "CERTSESSION_USERNAME";
pub const ENV_PASSWORD: &str = "CERTSESSION_PASSWORD";
pub const ENV_APP_KEY: &str = "CERTSESSION_APP_KEY";
pub const ENV_CERT: &str = "CERTSESSION_CERT_BASE64";
pub const ENV_KEY: &str = "CERTSESSION_KEY_BASE64";
pub const ENV_PROXY: &str = "CERTSESSION_PROXY_URL";

/// Login material for the identity service.
///
/// The certificate and key are PEM documents wrapped in standard base64,
/// which is how they are usually shipped through environment variables.
#[derive(Clone, Default)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub app_key: String,
    pub cert_base64: String,
    pub key_base64: String,
    pub proxy_url: Option<String>,
}

impl Credentials {
    /// Read credentials from `CERTSESSION_*` environment variables.
    /// Missing variables come back empty and are rejected by [`validate`](Self::validate).
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).unwrap_or_default();
        Self {
            username: var(ENV_USERNAME),
            password: var(ENV_PASSWORD),
            app_key: var(ENV_APP_KEY),
            cert_base64: var(ENV_CERT),
            key_base64: var(ENV_KEY),
            proxy_url: std::env::var(ENV_PROXY).ok().filter(|p| !p.trim().is_empty()),
        }
    }

    /// Check the required fields before any network work happens
    pub fn validate(&self) -> Result<()> {
        if self.app_key.is_empty() {
            return Err(SessionError::MissingField { field: "app key" });
        }
        if self.username.is_empty() {
            return Err(SessionError::MissingField { field: "username" });
        }
        if self.password.is_empty() {
            return Err(SessionError::MissingField { field: "password" });
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("app_key", &self.app_key)
            .field("cert_base64", &format_args!("<{} bytes>", self.cert_base64.len()))
            .field("key_base64", &"<redacted>")
            .field("proxy_url", &self.proxy_url)
            .finish()
    }
}
