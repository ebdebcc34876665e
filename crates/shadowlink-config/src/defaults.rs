use camino::Utf8PathBuf;

/// Default log filter expression used by the binary.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default shadow key carrying the actuator token.
pub const DEFAULT_STATE_KEY: &str = "myState";

/// Token reported before any desired state has been applied.
pub const DEFAULT_INITIAL_STATE: &str = "off";

/// Topic receiving one telemetry message per applied state change.
pub const DEFAULT_TELEMETRY_TOPIC: &str = "/topic/state";

/// Program driving the status light.
pub const DEFAULT_LIGHT_COMMAND: &str = "light_control.sh";

/// Program driving the heater, fan, and target temperature display.
pub const DEFAULT_CLIMATE_COMMAND: &str = "temperature";

pub(crate) const DEFAULT_DISCOVER_TIMEOUT_MS: u64 = 4_000;
pub(crate) const DEFAULT_DISCOVER_MAX_RETRIES: u32 = 9;
pub(crate) const DEFAULT_DISCOVER_BACKOFF_MS: u64 = 5_000;
pub(crate) const DEFAULT_CONNECT_SETTLE_MS: u64 = 500;
pub(crate) const DEFAULT_ACTION_TIMEOUT_MS: u64 = 20_000;
pub(crate) const DEFAULT_ACK_SETTLE_MS: u64 = 1_000;
pub(crate) const DEFAULT_KEEP_ALIVE_SECS: u16 = 600;

/// Default log filter expression used by the binary.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binary.
#[must_use]
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Directory receiving the discovery artefact and trust anchors.
///
/// Relative to the working directory the agent was started from, matching
/// where operators expect `discovery_output.json` to appear.
#[must_use]
pub fn default_output_dir() -> Utf8PathBuf {
    Utf8PathBuf::from(".")
}
