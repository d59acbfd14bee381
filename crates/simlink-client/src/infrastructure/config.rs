//! Key-value settings file for the visualization client.
//!
//! The file is plain text with one `KEY value` pair per line:
//!
//! ```text
//! # where the simulation listens
//! SIM_HOST 10.0.4.20
//! SIM_PORT 7100
//! CONNECT_TIMEOUT_MS 1500
//! ```
//!
//! Keys are case-insensitive; the first run of whitespace separates the key
//! from its value.  Blank lines and lines starting with `#` are skipped.
//!
//! # Defaults
//!
//! Every key is optional.  A missing file, or a file that omits a key, falls
//! back to the value in [`ClientSettings::default`], which targets a
//! simulation on the loopback interface.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Error type for settings file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("I/O error reading settings at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A recognised key carries a value that does not parse.
    #[error("line {line}: invalid value {value:?} for {key}")]
    InvalidValue {
        line: usize,
        key: String,
        value: String,
    },
}

/// Connection and logging settings read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Host name or IP address of the simulation.
    pub sim_host: String,
    /// TCP port of the simulation.
    pub sim_port: u16,
    /// Upper bound for a single connect attempt.
    pub connect_timeout: Duration,
    /// First delay after a failed connect; doubles per consecutive failure.
    pub retry_backoff: Duration,
    /// Ceiling for the doubling delay.
    pub max_retry_backoff: Duration,
    /// Largest payload the receive state machine will buffer.
    pub max_payload_bytes: usize,
    /// Fallback `tracing` filter directive when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            sim_host: "127.0.0.1".to_string(),
            sim_port: 7100,
            connect_timeout: Duration::from_millis(2000),
            retry_backoff: Duration::from_millis(250),
            max_retry_backoff: Duration::from_millis(4000),
            max_payload_bytes: simlink_core::protocol::DEFAULT_MAX_PAYLOAD,
            log_level: "info".to_string(),
        }
    }
}

impl ClientSettings {
    /// `host:port` string accepted by `tokio::net::lookup_host`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.sim_host, self.sim_port)
    }
}

/// Loads settings from `path`, returning the defaults if the file does not
/// exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for read failures other than "not found", and
/// [`ConfigError::InvalidValue`] for the first value that fails to parse.
pub fn load_settings(path: &Path) -> Result<ClientSettings, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_settings(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "settings file not found, using defaults");
            Ok(ClientSettings::default())
        }
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Parses settings text.  Keys absent from `content` keep their defaults.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] for the first recognised key whose
/// value does not parse.
pub fn parse_settings(content: &str) -> Result<ClientSettings, ConfigError> {
    let mut settings = ClientSettings::default();

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = match line.split_once(char::is_whitespace) {
            Some((k, v)) => (k, v.trim()),
            None => (line, ""),
        };
        let line_no = index + 1;
        let invalid = || ConfigError::InvalidValue {
            line: line_no,
            key: key.to_string(),
            value: value.to_string(),
        };

        match key.to_ascii_uppercase().as_str() {
            "SIM_HOST" => {
                if value.is_empty() {
                    return Err(invalid());
                }
                settings.sim_host = value.to_string();
            }
            "SIM_PORT" => settings.sim_port = value.parse().map_err(|_| invalid())?,
            "CONNECT_TIMEOUT_MS" => settings.connect_timeout = parse_millis(value).ok_or_else(invalid)?,
            "RETRY_BACKOFF_MS" => settings.retry_backoff = parse_millis(value).ok_or_else(invalid)?,
            "MAX_RETRY_BACKOFF_MS" => {
                settings.max_retry_backoff = parse_millis(value).ok_or_else(invalid)?
            }
            "MAX_PAYLOAD_BYTES" => {
                settings.max_payload_bytes = value.parse().map_err(|_| invalid())?
            }
            "LOG_LEVEL" => {
                if value.is_empty() {
                    return Err(invalid());
                }
                settings.log_level = value.to_string();
            }
            _ => warn!(line = line_no, key, "ignoring unknown settings key"),
        }
    }

    if settings.max_retry_backoff < settings.retry_backoff {
        settings.max_retry_backoff = settings.retry_backoff;
    }
    Ok(settings)
}

fn parse_millis(value: &str) -> Option<Duration> {
    value.parse::<u64>().ok().map(Duration::from_millis)
}
