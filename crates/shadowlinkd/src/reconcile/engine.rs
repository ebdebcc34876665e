//! Reconciliation state machine driving the actuator from shadow deltas.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use shadowlink_config::Config;
use thiserror::Error;
use tracing::{debug, warn};

use crate::actuator::Actuator;
use crate::health::HealthReporter;
use crate::session::Session;
use crate::shadow::{
    ResponseOutcome, ShadowDocument, ShadowError, ShadowOperation, ShadowRejection, ShadowSync,
};
use crate::shutdown::Shutdown;

use super::dispatch::{self, TokenOutcome};

const RECONCILE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::reconcile");

/// Reconciliation lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcileState {
    /// Nothing sent yet.
    Idle,
    /// Waiting for the baseline report to be accepted.
    AwaitingInitialAck,
    /// Waiting for desired state to diverge.
    AwaitingDelta,
    /// Applying a desired token.
    Actuating,
    /// Waiting for a reported update to be accepted.
    AwaitingUpdateAck,
    /// Terminal.
    Stopped,
}

impl ReconcileState {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingInitialAck => "awaiting_initial_ack",
            Self::AwaitingDelta => "awaiting_delta",
            Self::Actuating => "actuating",
            Self::AwaitingUpdateAck => "awaiting_update_ack",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal reconciliation outcomes.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The baseline report was refused.
    #[error("baseline report was rejected: {rejection}")]
    BaselineRejected {
        /// Error body sent by the service.
        rejection: ShadowRejection,
    },
    /// A reported update was refused.
    #[error("update reporting '{token}' was rejected: {rejection}")]
    UpdateRejected {
        /// Token that was being reported.
        token: String,
        /// Error body sent by the service.
        rejection: ShadowRejection,
    },
    /// The session dropped while reconciling.
    #[error("session lost while reconciling")]
    SessionLost,
    /// The shadow protocol failed.
    #[error("shadow protocol failure: {source}")]
    Shadow {
        /// Underlying shadow error.
        #[source]
        source: ShadowError,
    },
}

/// Tunables for the reconciliation loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileSettings {
    /// Thing whose shadow is reconciled.
    pub thing_name: String,
    /// Shadow key carrying the token.
    pub state_key: String,
    /// Token reported as the baseline.
    pub initial_state: String,
    /// Topic receiving telemetry.
    pub telemetry_topic: String,
    /// Wait applied to every shadow response.
    pub action_timeout: Duration,
    /// Delay after an acknowledged update.
    pub ack_settle: Duration,
    /// Issue a `get` when waiting for a delta times out.
    pub resync_on_idle: bool,
}

impl ReconcileSettings {
    /// Extracts the loop settings from the agent configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            thing_name: config.thing_name.clone(),
            state_key: config.state_key.clone(),
            initial_state: config.initial_state.clone(),
            telemetry_topic: config.telemetry_topic.clone(),
            action_timeout: config.action_timeout(),
            ack_settle: config.ack_settle(),
            resync_on_idle: config.resync_on_idle,
        }
    }
}

enum Halt {
    Shutdown,
    Fatal(ReconcileError),
}

impl From<ShadowError> for Halt {
    fn from(error: ShadowError) -> Self {
        match error {
            ShadowError::Interrupted => Self::Shutdown,
            ShadowError::SessionLost => Self::Fatal(ReconcileError::SessionLost),
            source => Self::Fatal(ReconcileError::Shadow { source }),
        }
    }
}

/// Keeps the actuator aligned with the shadow's desired state.
///
/// `current_state` is updated after the actuator has been invoked and
/// before the reported update is published, so a repeated delta for the same
/// token never actuates twice.
pub struct ReconciliationLoop<'s, S: Session, A: Actuator> {
    shadow: ShadowSync<'s, S>,
    session: &'s S,
    actuator: A,
    reporter: Arc<dyn HealthReporter>,
    shutdown: Shutdown,
    settings: ReconcileSettings,
    state: ReconcileState,
    current_state: String,
    last_invalid: Option<String>,
}

impl<'s, S: Session, A: Actuator> ReconciliationLoop<'s, S, A> {
    /// Attaches to the thing's shadow on `session`.
    pub fn attach(
        session: &'s S,
        actuator: A,
        reporter: Arc<dyn HealthReporter>,
        shutdown: Shutdown,
        settings: ReconcileSettings,
    ) -> Result<Self, ReconcileError> {
        let shadow = ShadowSync::attach(session, &settings.thing_name, &shutdown)
            .map_err(|source| ReconcileError::Shadow { source })?;
        let current_state = settings.initial_state.clone();
        Ok(Self {
            shadow,
            session,
            actuator,
            reporter,
            shutdown,
            settings,
            state: ReconcileState::Idle,
            current_state,
            last_invalid: None,
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ReconcileState {
        self.state
    }

    /// Last applied token.
    #[must_use]
    pub fn current_state(&self) -> &str {
        self.current_state.as_str()
    }

    /// Shadow driver, for inspecting the server snapshot.
    #[must_use]
    pub fn shadow(&self) -> &ShadowSync<'s, S> {
        &self.shadow
    }

    /// Runs until shutdown or a fatal error. Always ends in
    /// [`ReconcileState::Stopped`].
    pub fn run(&mut self) -> Result<(), ReconcileError> {
        let outcome = self.drive();
        self.transition(ReconcileState::Stopped);
        match outcome {
            Ok(()) | Err(Halt::Shutdown) => Ok(()),
            Err(Halt::Fatal(error)) => Err(error),
        }
    }

    fn drive(&mut self) -> Result<(), Halt> {
        self.send_baseline()?;
        while !self.shutdown.is_requested() {
            match self.state {
                ReconcileState::AwaitingInitialAck => self.await_initial_ack()?,
                ReconcileState::AwaitingDelta => self.await_delta()?,
                ReconcileState::AwaitingUpdateAck => self.await_update_ack()?,
                ReconcileState::Idle | ReconcileState::Actuating | ReconcileState::Stopped => {
                    break;
                }
            }
        }
        Ok(())
    }

    fn send_baseline(&mut self) -> Result<(), Halt> {
        let baseline = ShadowDocument::reporting(&self.settings.state_key, &self.current_state);
        self.shadow.update_reported_state(baseline);
        self.shadow.perform_update_async()?;
        self.transition(ReconcileState::AwaitingInitialAck);
        Ok(())
    }

    fn await_initial_ack(&mut self) -> Result<(), Halt> {
        match self.shadow.await_response(self.settings.action_timeout)? {
            ResponseOutcome::Accepted {
                operation: ShadowOperation::Update,
            } => {
                self.settle_after_ack()?;
                self.enter_awaiting_delta()
            }
            ResponseOutcome::Rejected {
                operation: ShadowOperation::Update,
                rejection,
            } => Err(Halt::Fatal(ReconcileError::BaselineRejected { rejection })),
            ResponseOutcome::Delta => {
                debug!(target: RECONCILE_TARGET, "delta deferred until the baseline is acknowledged");
                Ok(())
            }
            other => {
                self.note_unrelated(&other);
                Ok(())
            }
        }
    }

    fn await_delta(&mut self) -> Result<(), Halt> {
        match self.shadow.await_response(self.settings.action_timeout)? {
            ResponseOutcome::Delta | ResponseOutcome::Accepted { .. } => self.evaluate_desired(),
            ResponseOutcome::Rejected {
                operation,
                rejection,
            } => {
                warn!(
                    target: RECONCILE_TARGET,
                    %operation,
                    %rejection,
                    "ignoring rejection while waiting for a delta"
                );
                Ok(())
            }
            ResponseOutcome::Timeout => {
                self.reporter.response_timed_out(self.state);
                if self.settings.resync_on_idle && self.shadow.pending().is_none() {
                    self.shadow.perform_get_async()?;
                }
                Ok(())
            }
        }
    }

    fn await_update_ack(&mut self) -> Result<(), Halt> {
        match self.shadow.await_response(self.settings.action_timeout)? {
            ResponseOutcome::Accepted {
                operation: ShadowOperation::Update,
            } => {
                self.settle_after_ack()?;
                self.enter_awaiting_delta()
            }
            ResponseOutcome::Rejected {
                operation: ShadowOperation::Update,
                rejection,
            } => Err(Halt::Fatal(ReconcileError::UpdateRejected {
                token: self.current_state.clone(),
                rejection,
            })),
            ResponseOutcome::Delta => {
                debug!(target: RECONCILE_TARGET, "delta deferred until the update is acknowledged");
                Ok(())
            }
            other => {
                self.note_unrelated(&other);
                Ok(())
            }
        }
    }

    fn note_unrelated(&self, outcome: &ResponseOutcome) {
        match outcome {
            ResponseOutcome::Timeout => self.reporter.response_timed_out(self.state),
            other => debug!(
                target: RECONCILE_TARGET,
                state = %self.state,
                outcome = ?other,
                "ignoring response unrelated to the outstanding update"
            ),
        }
    }

    fn settle_after_ack(&self) -> Result<(), Halt> {
        self.shutdown
            .sleep(self.settings.ack_settle)
            .map_err(|_| Halt::Shutdown)
    }

    fn enter_awaiting_delta(&mut self) -> Result<(), Halt> {
        self.transition(ReconcileState::AwaitingDelta);
        self.evaluate_desired()
    }

    fn evaluate_desired(&mut self) -> Result<(), Halt> {
        let Some(token) = self
            .shadow
            .latest_server_document()
            .desired_token(&self.settings.state_key)
        else {
            return Ok(());
        };
        if self
            .last_invalid
            .as_deref()
            .is_some_and(|invalid| invalid != token)
        {
            self.last_invalid = None;
        }
        if token == self.current_state || self.last_invalid.as_deref() == Some(token.as_str()) {
            return Ok(());
        }
        self.actuate(&token)
    }

    fn actuate(&mut self, token: &str) -> Result<(), Halt> {
        self.transition(ReconcileState::Actuating);
        let actuation = match dispatch::resolve(token) {
            TokenOutcome::Known(actuation) => actuation,
            TokenOutcome::Invalid { token: invalid } => {
                self.reporter.invalid_token(&invalid);
                self.last_invalid = Some(invalid);
                self.transition(ReconcileState::AwaitingDelta);
                return Ok(());
            }
        };
        self.last_invalid = None;

        if let Err(error) = self.actuator.apply(&actuation) {
            self.reporter.actuation_failed(&actuation, &error);
        }
        actuation.token().clone_into(&mut self.current_state);
        self.publish_telemetry(actuation.label());

        // A resync `get` may still be outstanding; the update supersedes it.
        self.shadow.discard_pending();
        self.shadow.update_reported_state(ShadowDocument::reporting(
            &self.settings.state_key,
            actuation.token(),
        ));
        self.shadow.perform_update_async()?;
        self.transition(ReconcileState::AwaitingUpdateAck);
        Ok(())
    }

    fn publish_telemetry(&self, label: &str) {
        let payload = json!({ "state": label }).to_string();
        if let Err(error) = self
            .session
            .publish(&self.settings.telemetry_topic, payload.as_bytes())
        {
            warn!(
                target: RECONCILE_TARGET,
                topic = %self.settings.telemetry_topic,
                error = %error,
                "telemetry publish failed"
            );
        }
    }

    fn transition(&mut self, to: ReconcileState) {
        if self.state != to {
            self.reporter.state_changed(self.state, to);
            self.state = to;
        }
    }
}
