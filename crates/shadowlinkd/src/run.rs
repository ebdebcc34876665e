//! Process wiring: configuration, telemetry, bootstrap, and reconciliation.

use std::ffi::OsString;
use std::io::Write;
use std::sync::Arc;

use ortho_config::OrthoError;
use shadowlink_config::{Config, ConfigError};
use thiserror::Error;
use tracing::{error, info};

use crate::actuator::{Actuator, CommandActuator};
use crate::bootstrap::{BootstrapError, BootstrapSettings, ConnectBootstrap, SessionState};
use crate::discovery::{DiscoveryClient, FileDiscoveryClient};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::placeholder_connector::UnlinkedConnector;
use crate::reconcile::{ReconcileError, ReconcileSettings, ReconciliationLoop};
use crate::session::{Session, SessionConnector, SessionError};
use crate::shutdown::{Shutdown, ShutdownError, SignalListener};
use crate::status::ExitStatus;
use crate::telemetry::{self, TelemetryError};

const RUN_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::run");

/// Errors that end the agent process.
#[derive(Debug, Error)]
pub enum RunError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Configuration loaded but is unusable.
    #[error("invalid configuration: {source}")]
    InvalidConfiguration {
        /// Validation failure.
        #[source]
        source: ConfigError,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// Signal handlers could not be installed.
    #[error("failed to install signal handling: {source}")]
    Signals {
        /// Underlying listener error.
        #[source]
        source: ShutdownError,
    },
    /// Bootstrap failed.
    #[error("bootstrap failed: {source}")]
    Bootstrap {
        /// Underlying bootstrap error.
        #[source]
        source: BootstrapError,
    },
    /// Reconciliation ended with a fatal error.
    #[error("reconciliation failed: {source}")]
    Reconcile {
        /// Underlying reconciliation error.
        #[source]
        source: ReconcileError,
    },
    /// The session could not be closed cleanly.
    #[error("failed to disconnect: {source}")]
    Disconnect {
        /// Underlying session error.
        #[source]
        source: SessionError,
    },
}

/// External collaborators used by [`run_with`].
pub struct Collaborators<D, C, A> {
    /// Discovery transport.
    pub discovery: D,
    /// Secure session factory.
    pub connector: C,
    /// Physical actuator.
    pub actuator: A,
}

/// Bootstraps a session, reconciles until shutdown or failure, then
/// disconnects.
///
/// A shutdown during bootstrap is a clean outcome.
pub fn run_with<D, C, A>(
    config: &Config,
    collaborators: Collaborators<D, C, A>,
    reporter: Arc<dyn HealthReporter>,
    shutdown: &Shutdown,
) -> Result<(), RunError>
where
    D: DiscoveryClient,
    C: SessionConnector,
    A: Actuator,
{
    let Collaborators {
        discovery,
        connector,
        actuator,
    } = collaborators;
    let bootstrap = ConnectBootstrap::new(
        discovery,
        connector,
        Arc::clone(&reporter),
        shutdown.clone(),
        BootstrapSettings::from_config(config),
    );
    let state = match bootstrap.bootstrap() {
        Ok(state) => state,
        Err(BootstrapError::Interrupted) => {
            info!(target: RUN_TARGET, "shutdown requested before a session was established");
            return Ok(());
        }
        Err(source) => return Err(RunError::Bootstrap { source }),
    };

    let outcome = reconcile(&state, actuator, reporter, shutdown, config);
    let closed = state.disconnect();
    outcome?;
    closed.map_err(|source| RunError::Disconnect { source })?;
    info!(target: RUN_TARGET, "session closed");
    Ok(())
}

fn reconcile<S, A>(
    state: &SessionState<S>,
    actuator: A,
    reporter: Arc<dyn HealthReporter>,
    shutdown: &Shutdown,
    config: &Config,
) -> Result<(), RunError>
where
    S: Session,
    A: Actuator,
{
    let mut reconciliation = ReconciliationLoop::attach(
        state.session(),
        actuator,
        reporter,
        shutdown.clone(),
        ReconcileSettings::from_config(config),
    )
    .map_err(|source| RunError::Reconcile { source })?;
    reconciliation
        .run()
        .map_err(|source| RunError::Reconcile { source })
}

/// Runs the agent with production collaborators.
///
/// Failures that occur before telemetry is available are written to
/// `stderr`.
pub fn run<I, T, E>(args: I, stderr: &mut E) -> ExitStatus
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    E: Write,
{
    let config = match load_config(args) {
        Ok(config) => config,
        Err(error) => return report_early(stderr, &error),
    };
    if let Err(source) = telemetry::initialise(&config) {
        return report_early(stderr, &RunError::Telemetry { source });
    }

    let shutdown = Shutdown::new();
    let listener = match SignalListener::install(shutdown.clone()) {
        Ok(listener) => listener,
        Err(source) => return report(&RunError::Signals { source }),
    };

    let discovery_path = config
        .discovery_file
        .clone()
        .unwrap_or_else(|| config.discovery_artifact_path());
    let collaborators = Collaborators {
        discovery: FileDiscoveryClient::new(discovery_path),
        connector: UnlinkedConnector,
        actuator: CommandActuator::from_config(&config),
    };
    let reporter: Arc<dyn HealthReporter> = Arc::new(StructuredHealthReporter::new());
    let outcome = run_with(&config, collaborators, reporter, &shutdown);
    drop(listener);

    match outcome {
        Ok(()) => ExitStatus::Clean,
        Err(error) => report(&error),
    }
}

fn load_config<I, T>(args: I) -> Result<Config, RunError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let config = Config::load_from_iter(args).map_err(|source| RunError::Configuration { source })?;
    config
        .validate()
        .map_err(|source| RunError::InvalidConfiguration { source })?;
    Ok(config)
}

fn report_early<E: Write>(stderr: &mut E, error: &RunError) -> ExitStatus {
    let status = ExitStatus::from(error);
    if writeln!(stderr, "shadowlinkd: {error}").is_err() {
        // Nothing left to report through.
    }
    status
}

fn report(error: &RunError) -> ExitStatus {
    let status = ExitStatus::from(error);
    error!(target: RUN_TARGET, code = status.code(), error = %error, "agent stopped");
    status
}
