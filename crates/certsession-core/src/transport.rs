//! HTTP client assembly for certificate-authenticated calls.
//!
//! Builds one reusable `reqwest::Client` carrying the client certificate,
//! pool and timeout settings, and an optional forward proxy. Nothing here
//! retries or holds state.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, Identity, Proxy};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::auth::Credentials;
use crate::error::{Result, SessionError};

/// Maximum idle connections kept per host.
const DEFAULT_POOL_MAX_IDLE: usize = 100;

/// Idle connections are dropped after 90s.
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 90;

/// Covers TCP connect plus the TLS handshake.
const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 10;

/// Whole-request timeout, including reading the body.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub pool_max_idle_per_host: usize,
    pub idle_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            handshake_timeout_secs: DEFAULT_HANDSHAKE_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Build the HTTP client used for every identity and API call.
pub fn build_client(credentials: &Credentials, config: &TransportConfig) -> Result<Client> {
    let cert_pem = decode_pem("certificate", &credentials.cert_base64)?;
    let key_pem = decode_pem("private key", &credentials.key_base64)?;

    let mut bundle = cert_pem;
    if !bundle.ends_with(b"\n") {
        bundle.push(b'\n');
    }
    bundle.extend_from_slice(&key_pem);

    let identity = Identity::from_pem(&bundle).map_err(|e| SessionError::InvalidCertificate {
        which: "certificate/key pair",
        reason: e.to_string(),
    })?;

    let mut builder = Client::builder()
        .use_rustls_tls()
        .identity(identity)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .pool_idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect_timeout(Duration::from_secs(config.handshake_timeout_secs))
        .timeout(Duration::from_secs(config.request_timeout_secs));

    if let Some(ref raw) = credentials.proxy_url {
        let proxy_url = Url::parse(raw)?;
        debug!(proxy = %proxy_url.host_str().unwrap_or_default(), "Routing traffic through proxy");
        let proxy = Proxy::all(proxy_url).map_err(SessionError::ClientBuild)?;
        builder = builder.proxy(proxy);
    }

    builder.build().map_err(SessionError::ClientBuild)
}

/// Unwrap base64 and check the result at least looks like a PEM document.
fn decode_pem(which: &'static str, encoded: &str) -> Result<Vec<u8>> {
    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|e| SessionError::InvalidCertificate {
            which,
            reason: format!("must be base64 encoded: {}", e),
        })?;

    let is_pem = std::str::from_utf8(&decoded)
        .map(|text| text.contains("-----BEGIN ") && text.contains("-----END "))
        .unwrap_or(false);
    if !is_pem {
        return Err(SessionError::InvalidCertificate {
            which,
            reason: "decoded value is not PEM".to_string(),
        });
    }

    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{credentials, UNRELATED_KEY_PEM};

    #[test]
    fn test_build_client_with_valid_material() {
        assert!(build_client(&credentials(), &TransportConfig::default()).is_ok());
    }

    #[test]
    fn test_rejects_non_base64_certificate() {
        let mut creds = credentials();
        creds.cert_base64 = "not base64 !!".to_string();
        let err = build_client(&creds, &TransportConfig::default()).unwrap_err();
        assert!(matches!(err, SessionError::InvalidCertificate { which: "certificate", .. }));
    }

    #[test]
    fn test_rejects_non_pem_key() {
        let mut creds = credentials();
        creds.key_base64 = STANDARD.encode("just some bytes");
        let err = build_client(&creds, &TransportConfig::default()).unwrap_err();
        assert!(matches!(err, SessionError::InvalidCertificate { which: "private key", .. }));
        assert!(err.is_validation());
    }

    #[test]
    fn test_rejects_key_not_matching_certificate() {
        let mut creds = credentials();
        creds.key_base64 = STANDARD.encode(UNRELATED_KEY_PEM);
        let err = build_client(&creds, &TransportConfig::default()).unwrap_err();
        assert!(err.is_validation(), "unexpected error: {err:?}");
    }

    #[test]
    fn test_rejects_bad_proxy_url() {
        let mut creds = credentials();
        creds.proxy_url = Some("not a url".to_string());
        let err = build_client(&creds, &TransportConfig::default()).unwrap_err();
        assert!(matches!(err, SessionError::InvalidProxy(_)));
    }

    #[test]
    fn test_accepts_proxy_url() {
        let mut creds = credentials();
        creds.proxy_url = Some("http://127.0.0.1:3128".to_string());
        assert!(build_client(&creds, &TransportConfig::default()).is_ok());
    }

    #[test]
    fn test_default_transport_config() {
        let config = TransportConfig::default();
        assert_eq!(config.pool_max_idle_per_host, 100);
        assert_eq!(config.idle_timeout_secs, 90);
        assert_eq!(config.handshake_timeout_secs, 10);
        assert_eq!(config.request_timeout_secs, 10);
    }
}
