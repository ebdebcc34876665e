//! Layered configuration for the shadowlink device agent.
//!
//! Values are merged by [`ortho_config`] from built-in defaults, an optional
//! TOML file (`--config-path` or `SHADOWLINK_CONFIG_PATH`), `SHADOWLINK_*`
//! environment variables, and finally command-line flags. The resolved
//! [`Config`] covers discovery, session parameters, shadow timings, actuator
//! programs, and telemetry.
//!
//! Durations are stored as integer milliseconds so every field maps onto a
//! plain flag or environment variable; accessors expose them as
//! [`Duration`].

mod defaults;
mod logging;

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_CLIMATE_COMMAND, DEFAULT_INITIAL_STATE,
    DEFAULT_LIGHT_COMMAND, DEFAULT_LOG_FILTER, DEFAULT_STATE_KEY, DEFAULT_TELEMETRY_TOPIC,
    default_log_filter, default_log_format, default_output_dir,
};
pub use logging::{LogFormat, LogFormatParseError};

use defaults::{
    DEFAULT_ACK_SETTLE_MS, DEFAULT_ACTION_TIMEOUT_MS, DEFAULT_CONNECT_SETTLE_MS,
    DEFAULT_DISCOVER_BACKOFF_MS, DEFAULT_DISCOVER_MAX_RETRIES, DEFAULT_DISCOVER_TIMEOUT_MS,
    DEFAULT_KEEP_ALIVE_SECS,
};

/// Resolved agent configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "SHADOWLINK")]
#[serde(default)]
pub struct Config {
    /// Device identity used for discovery and as the shadow name.
    pub thing_name: String,
    /// Session client id; falls back to the thing name when empty.
    pub client_id: String,
    /// Previously persisted discovery document to replay instead of a live
    /// discovery call.
    pub discovery_file: Option<Utf8PathBuf>,
    /// Client certificate presented during the secure handshake.
    pub client_cert_path: Option<Utf8PathBuf>,
    /// Private key matching [`Config::client_cert_path`].
    pub client_key_path: Option<Utf8PathBuf>,
    /// Timeout of a single discovery attempt, in milliseconds.
    pub discover_timeout_ms: u64,
    /// Retries allowed after the first failed discovery attempt.
    pub discover_max_retries: u32,
    /// Backoff after a transient discovery failure, in milliseconds.
    pub discover_backoff_ms: u64,
    /// Delay after every connect attempt, in milliseconds.
    pub connect_settle_ms: u64,
    /// Time to wait for a shadow response, in milliseconds.
    pub action_timeout_ms: u64,
    /// Delay after an acknowledged update before consuming more events.
    pub ack_settle_ms: u64,
    /// Keep-alive interval requested for the session, in seconds.
    pub keep_alive_secs: u16,
    /// Whether the session starts without persisted broker state.
    pub clean_session: bool,
    /// Directory receiving the discovery artefact and trust anchors.
    pub output_dir: Utf8PathBuf,
    /// Shadow key carrying the actuator token.
    pub state_key: String,
    /// Token reported as the baseline before any desired state is applied.
    pub initial_state: String,
    /// Topic receiving telemetry for each applied state change.
    pub telemetry_topic: String,
    /// Issue a shadow `get` whenever waiting for a delta times out.
    pub resync_on_idle: bool,
    /// Program driving the status light.
    pub light_command: String,
    /// Program driving the heater, fan, and temperature window.
    pub climate_command: String,
    /// `tracing` filter expression.
    pub log_filter: String,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            thing_name: String::new(),
            client_id: String::new(),
            discovery_file: None,
            client_cert_path: None,
            client_key_path: None,
            discover_timeout_ms: DEFAULT_DISCOVER_TIMEOUT_MS,
            discover_max_retries: DEFAULT_DISCOVER_MAX_RETRIES,
            discover_backoff_ms: DEFAULT_DISCOVER_BACKOFF_MS,
            connect_settle_ms: DEFAULT_CONNECT_SETTLE_MS,
            action_timeout_ms: DEFAULT_ACTION_TIMEOUT_MS,
            ack_settle_ms: DEFAULT_ACK_SETTLE_MS,
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            clean_session: true,
            output_dir: default_output_dir(),
            state_key: DEFAULT_STATE_KEY.to_owned(),
            initial_state: DEFAULT_INITIAL_STATE.to_owned(),
            telemetry_topic: DEFAULT_TELEMETRY_TOPIC.to_owned(),
            resync_on_idle: false,
            light_command: DEFAULT_LIGHT_COMMAND.to_owned(),
            climate_command: DEFAULT_CLIMATE_COMMAND.to_owned(),
            log_filter: default_log_filter().to_owned(),
            log_format: default_log_format(),
        }
    }
}

/// Semantic problems detected after the layers have been merged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No device identity was configured.
    #[error("thing_name must be configured")]
    MissingThingName,
    /// A zero action timeout would turn every wait into an immediate timeout.
    #[error("action_timeout_ms must be greater than zero")]
    ZeroActionTimeout,
    /// The baseline token cannot be empty.
    #[error("initial_state must not be empty")]
    EmptyInitialState,
}

impl Config {
    /// Loads configuration from the process arguments and environment.
    pub fn load() -> Result<Self, Arc<OrthoError>> {
        Self::load_from_iter(std::env::args_os())
    }

    /// Loads configuration from an explicit argument list.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, Arc<OrthoError>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as OrthoConfig>::load_from_iter(args)
    }

    /// Checks invariants that the layered loader cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thing_name.trim().is_empty() {
            return Err(ConfigError::MissingThingName);
        }
        if self.action_timeout_ms == 0 {
            return Err(ConfigError::ZeroActionTimeout);
        }
        if self.initial_state.trim().is_empty() {
            return Err(ConfigError::EmptyInitialState);
        }
        Ok(())
    }

    /// Client id presented to the session, defaulting to the thing name.
    #[must_use]
    pub fn client_id(&self) -> &str {
        if self.client_id.is_empty() {
            self.thing_name.as_str()
        } else {
            self.client_id.as_str()
        }
    }

    /// Per-attempt discovery timeout.
    #[must_use]
    pub fn discover_timeout(&self) -> Duration {
        Duration::from_millis(self.discover_timeout_ms)
    }

    /// Sleep between transient discovery failures.
    #[must_use]
    pub fn discover_backoff(&self) -> Duration {
        Duration::from_millis(self.discover_backoff_ms)
    }

    /// Delay after each connect attempt.
    #[must_use]
    pub fn connect_settle(&self) -> Duration {
        Duration::from_millis(self.connect_settle_ms)
    }

    /// Shadow response timeout.
    #[must_use]
    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    /// Delay after an acknowledged update.
    #[must_use]
    pub fn ack_settle(&self) -> Duration {
        Duration::from_millis(self.ack_settle_ms)
    }

    /// Session keep-alive interval.
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(u64::from(self.keep_alive_secs))
    }

    /// Directory receiving runtime artefacts.
    #[must_use]
    pub fn output_dir(&self) -> &Utf8Path {
        self.output_dir.as_path()
    }

    /// Path of the persisted discovery document.
    #[must_use]
    pub fn discovery_artifact_path(&self) -> Utf8PathBuf {
        self.output_dir.join("discovery_output.json")
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
