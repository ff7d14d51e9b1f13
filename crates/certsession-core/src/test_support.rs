//! Fixtures shared by the unit tests.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::Mutex;
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::auth::{AuthClient, Credentials};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::session::{ErrorHandler, RenewalPolicy};
use crate::transport::{build_client, TransportConfig};

/// Self-signed client certificate, only ever presented to mock servers
const CLIENT_CERT_PEM: &str = include_str!("testdata/client-cert.pem");
const CLIENT_KEY_PEM: &str = include_str!("testdata/client-key.pem");
/// A valid P-256 key that does not belong to the certificate above
pub const UNRELATED_KEY_PEM: &str = include_str!("testdata/other-key.pem");

pub const VALID_TOKEN: &str = "0123456789abcdefghijklmnopqrstuvwxyzABCDEFGH";

pub fn credentials() -> Credentials {
    Credentials {
        username: "user".to_string(),
        password: "secret".to_string(),
        app_key: "APPKEY123".to_string(),
        cert_base64: STANDARD.encode(CLIENT_CERT_PEM),
        key_base64: STANDARD.encode(CLIENT_KEY_PEM),
        proxy_url: None,
    }
}

pub fn http_client() -> reqwest::Client {
    build_client(&credentials(), &TransportConfig::default()).unwrap()
}

pub fn auth_client(base_url: &str) -> AuthClient {
    AuthClient::new(http_client(), base_url, credentials())
}

/// Endpoints pointed at `base_url` and a policy with millisecond backoff
pub fn session_config(base_url: &str) -> SessionConfig {
    SessionConfig {
        identity_url: base_url.to_string(),
        api_url: base_url.to_string(),
        policy: RenewalPolicy {
            backoff_base: Duration::from_millis(1),
            max_jitter: Duration::ZERO,
            shutdown_timeout: Duration::from_secs(2),
            ..RenewalPolicy::default()
        },
        transport: TransportConfig::default(),
    }
}

pub fn token_json(status: &str, token: &str) -> serde_json::Value {
    serde_json::json!({ "loginStatus": status, "sessionToken": token })
}

pub async fn mount_login(server: &MockServer, status: &str, token: &str) {
    Mock::given(path("/certlogin"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_json(status, token)))
        .mount(server)
        .await;
}

pub async fn mount_keep_alive(server: &MockServer, status: &str, token: &str) {
    Mock::given(path("/keepAlive"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": status,
            "token": token,
            "error": if status == "SUCCESS" { "" } else { "NO_SESSION" }
        })))
        .mount(server)
        .await;
}

pub async fn mount_logout(server: &MockServer, status: &str) {
    Mock::given(path("/logout"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": status,
            "error": ""
        })))
        .mount(server)
        .await;
}

/// Handler that records each error's message
pub fn recording_handler() -> (ErrorHandler, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handler: ErrorHandler = Arc::new(move |err: SessionError| {
        sink.lock().push(err.to_string());
    });
    (handler, seen)
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn wait_for(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
