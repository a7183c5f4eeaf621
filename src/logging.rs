/*!
 * Logging and tracing initialization
 *
 * Diagnostics go to stderr in compact form so tables and status lines on
 * stdout stay clean. With `log_file` set they go to that file as JSON lines
 * instead, one object per event.
 */

use std::fs::OpenOptions;
use std::path::Path;
use tracing::Subscriber;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};

/// Initialize structured logging based on configuration
pub fn init_logging(config: &RelayConfig) -> Result<()> {
    let filter = log_filter(config)?;

    match config.log_file {
        Some(ref path) => file_subscriber(path, filter)?.init(),
        None => stderr_subscriber(filter).init(),
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise `relayctl=<configured level>`
fn log_filter(config: &RelayConfig) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(config)))
        .map_err(|e| RelayError::Config(format!("Failed to create log filter: {}", e)))
}

fn default_directive(config: &RelayConfig) -> String {
    format!(
        "relayctl={}",
        config.effective_log_level().as_str().to_lowercase()
    )
}

fn stderr_subscriber(filter: EnvFilter) -> impl Subscriber + Send + Sync {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_span_events(FmtSpan::NONE)
        .compact();

    tracing_subscriber::registry().with(filter).with(fmt_layer)
}

/// JSON lines appended to `log_path`, so several sessions share one log
fn file_subscriber(log_path: &Path, filter: EnvFilter) -> Result<impl Subscriber + Send + Sync> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|e| {
            RelayError::Config(format!(
                "Failed to open log file {}: {}",
                log_path.display(),
                e
            ))
        })?;

    let fmt_layer = fmt::layer()
        .with_writer(file)
        .with_target(true)
        .with_thread_names(true)
        .with_ansi(false)
        .json();

    Ok(tracing_subscriber::registry().with(filter).with(fmt_layer))
}
