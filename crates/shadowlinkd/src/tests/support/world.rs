//! BDD test world: collaborator doubles plus bootstrap and reconciliation
//! outcomes for step functions.

use std::cell::RefCell;
use std::sync::Arc;

use camino::Utf8PathBuf;
use tempfile::TempDir;

use shadowlink_config::Config;

use crate::bootstrap::{BootstrapError, BootstrapSettings, ConnectBootstrap, SessionState};
use crate::health::HealthReporter;
use crate::reconcile::{ReconcileError, ReconcileSettings, ReconcileState, ReconciliationLoop};
use crate::shutdown::Shutdown;

use super::connector::ScriptedConnector;
use super::doubles::{CountingDiscovery, RecordingActuator};
use super::reporter::RecordingHealthReporter;
use super::session::{Scripted, ScriptedSession, SessionProbe};

/// Thing used by every scenario.
pub const THING: &str = "kitchen-lamp";
/// Shadow key used by every scenario.
pub const STATE_KEY: &str = "myState";

/// Configuration with instant backoffs rooted at `dir`.
pub fn test_config(dir: &TempDir) -> Config {
    let output_dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
        .expect("temporary directory should be UTF-8");
    Config {
        thing_name: THING.to_owned(),
        output_dir,
        state_key: STATE_KEY.to_owned(),
        discover_timeout_ms: 50,
        discover_backoff_ms: 0,
        connect_settle_ms: 0,
        action_timeout_ms: 2_000,
        ack_settle_ms: 0,
        ..Config::default()
    }
}

/// Scenario world shared across BDD steps.
pub struct TestWorld {
    _dir: TempDir,
    pub config: Config,
    pub shutdown: Shutdown,
    pub reporter: Arc<RecordingHealthReporter>,
    pub discovery: CountingDiscovery,
    pub connector: ScriptedConnector,
    pub actuator: RecordingActuator,
    script: Vec<Vec<Scripted>>,
    session: Option<SessionState<ScriptedSession>>,
    bootstrap_error: Option<BootstrapError>,
    reconcile_outcome: Option<Result<(), ReconcileError>>,
    final_state: Option<ReconcileState>,
    probe: Option<SessionProbe>,
}

impl TestWorld {
    /// Builds a world with an empty script and unconfigured discovery.
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temporary directory");
        let config = test_config(&dir);
        let shutdown = Shutdown::new();
        Self {
            _dir: dir,
            config,
            connector: ScriptedConnector::new(shutdown.clone()),
            shutdown,
            reporter: Arc::new(RecordingHealthReporter::default()),
            discovery: CountingDiscovery::new(),
            actuator: RecordingActuator::default(),
            script: Vec::new(),
            session: None,
            bootstrap_error: None,
            reconcile_outcome: None,
            final_state: None,
            probe: None,
        }
    }

    /// Starts a new reply batch released by the next shadow request.
    pub fn reply(&mut self, item: Scripted) {
        self.script.push(vec![item]);
    }

    /// Appends to the most recent reply batch.
    pub fn then(&mut self, item: Scripted) {
        match self.script.last_mut() {
            Some(batch) => batch.push(item),
            None => self.script.push(vec![item]),
        }
    }

    /// Runs discovery and connect once.
    pub fn bootstrap(&mut self) {
        let bootstrap = ConnectBootstrap::new(
            self.discovery.clone(),
            self.connector.clone(),
            self.reporter(),
            self.shutdown.clone(),
            BootstrapSettings::from_config(&self.config),
        );
        match bootstrap.bootstrap() {
            Ok(state) => self.session = Some(state),
            Err(error) => self.bootstrap_error = Some(error),
        }
    }

    /// Runs the reconciliation loop over a scripted session until it stops.
    pub fn reconcile(&mut self) {
        let session = ScriptedSession::new(self.shutdown.clone());
        for batch in self.script.drain(..) {
            session.reply(batch);
        }
        self.probe = Some(session.probe());
        let attached = ReconciliationLoop::attach(
            &session,
            self.actuator.clone(),
            self.reporter(),
            self.shutdown.clone(),
            ReconcileSettings::from_config(&self.config),
        );
        let outcome = match attached {
            Ok(mut reconciliation) => {
                let result = reconciliation.run();
                self.final_state = Some(reconciliation.state());
                result
            }
            Err(error) => Err(error),
        };
        self.reconcile_outcome = Some(outcome);
    }

    /// The established session, if bootstrap succeeded.
    #[must_use]
    pub fn session(&self) -> Option<&SessionState<ScriptedSession>> {
        self.session.as_ref()
    }

    /// The bootstrap failure, if any.
    #[must_use]
    pub fn bootstrap_error(&self) -> Option<&BootstrapError> {
        self.bootstrap_error.as_ref()
    }

    /// The reconciliation outcome, if reconciliation ran.
    #[must_use]
    pub fn reconcile_outcome(&self) -> Option<&Result<(), ReconcileError>> {
        self.reconcile_outcome.as_ref()
    }

    /// State the loop ended in.
    #[must_use]
    pub fn final_state(&self) -> Option<ReconcileState> {
        self.final_state
    }

    /// Traffic of the reconciled session.
    #[must_use]
    pub fn probe(&self) -> Option<&SessionProbe> {
        self.probe.as_ref()
    }

    fn reporter(&self) -> Arc<dyn HealthReporter> {
        self.reporter.clone()
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Default test world fixture.
#[must_use]
pub fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::new())
}
