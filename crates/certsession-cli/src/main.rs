//! certsession - keep a certificate-authenticated session alive.
//!
//! Logs in with credentials from the environment (or a `.env` file), prints
//! the session status, optionally issues raw authenticated calls, and can
//! hold the session open while the background keep-alive runs.

use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use certsession_core::auth::credentials::ENV_PASSWORD;
use certsession_core::{Config, Credentials, ErrorHandler, SessionError, SessionManager};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Directory for rolling log files; stderr only when unset
const ENV_LOG_DIR: &str = "CERTSESSION_LOG_DIR";

const USAGE: &str = "usage: certsession [--hold SECS] [--call ENDPOINT [JSON]]...";

#[derive(Debug, Default, PartialEq)]
struct Args {
    hold: Option<Duration>,
    calls: Vec<(String, serde_json::Value)>,
}

impl Args {
    fn parse(raw: &[String]) -> Result<Self> {
        let mut args = Args::default();
        let mut iter = raw.iter().peekable();

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--hold" => {
                    let secs: u64 = iter
                        .next()
                        .context("--hold needs a number of seconds")?
                        .parse()
                        .context("--hold needs a number of seconds")?;
                    args.hold = Some(Duration::from_secs(secs));
                }
                "--call" => {
                    let endpoint = iter.next().context("--call needs an endpoint")?.clone();
                    let body = match iter.peek() {
                        Some(next) if !next.starts_with("--") => {
                            let raw_body = iter.next().map(String::as_str).unwrap_or("{}");
                            serde_json::from_str(raw_body)
                                .with_context(|| format!("Invalid JSON body for {}", endpoint))?
                        }
                        _ => serde_json::json!({}),
                    };
                    args.calls.push((endpoint, body));
                }
                "-h" | "--help" => bail!(USAGE),
                other => bail!("unknown argument '{}'\n{}", other, USAGE),
            }
        }

        Ok(args)
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(ENV_LOG_DIR) {
        Ok(dir) if !dir.is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "certsession.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

/// Fill in a missing password interactively when a terminal is attached
fn prompt_password(credentials: &mut Credentials) -> Result<()> {
    if credentials.password.is_empty() && io::stdin().is_terminal() {
        credentials.password = rpassword::prompt_password(format!(
            "Password for {} ({} not set): ",
            credentials.username, ENV_PASSWORD
        ))
        .context("Failed to read password")?;
    }
    Ok(())
}

fn error_handler() -> ErrorHandler {
    Arc::new(|err: SessionError| {
        if err.is_terminal() {
            error!(error = %err, "Session gave up");
        } else {
            warn!(error = %err, "Background session error");
        }
    })
}

async fn run_calls(session: &SessionManager, calls: &[(String, serde_json::Value)]) -> Result<()> {
    let futures = calls
        .iter()
        .map(|(endpoint, body)| session.post::<serde_json::Value, _>(endpoint, body));
    let results = futures::future::join_all(futures).await;

    let mut failed = 0;
    for ((endpoint, _), result) in calls.iter().zip(results) {
        match result {
            Ok(value) => {
                println!("== {}", endpoint);
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
            Err(e) => {
                failed += 1;
                eprintln!("== {} failed: {}", endpoint, e);
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} calls failed", failed, calls.len());
    }
    Ok(())
}

async fn hold(session: &SessionManager, duration: Option<Duration>) {
    let mut renewals = session.subscribe();
    let until = async {
        match duration {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(until);

    loop {
        tokio::select! {
            _ = &mut until => return,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                return;
            }
            changed = renewals.changed() => {
                if changed.is_err() {
                    return;
                }
                match renewals.borrow_and_update().as_ref() {
                    Some(token) => eprintln!("Session renewed at {} ({})", token.issued_at(), token),
                    None => {
                        eprintln!("Session closed");
                        return;
                    }
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = Args::parse(&raw)?;

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    };

    let mut credentials = Credentials::from_env();
    prompt_password(&mut credentials)?;

    let session = SessionManager::connect(credentials, config.session_config(), Some(error_handler()))
        .await
        .context("Unable to create session")?;

    let token = session.current_token()?;
    eprintln!("Logged in: token {} issued at {}", token, token.issued_at());

    let calls_result = run_calls(&session, &args.calls).await;

    if args.hold.is_some() || args.calls.is_empty() {
        if args.hold.is_none() {
            eprintln!("Holding session open; press Ctrl-C to log out");
        }
        hold(&session, args.hold).await;
    }

    match session.close().await {
        Ok(()) | Err(SessionError::AlreadyClosed) => {}
        Err(e) => warn!(error = %e, "Session did not shut down cleanly"),
    }

    calls_result
}
