//! Test double for [`HealthReporter`] that records structured events for
//! assertions.

use std::sync::Mutex;

use crate::actuator::ActuatorError;
use crate::bootstrap::BootstrapError;
use crate::catalog::ConnectivityCandidate;
use crate::discovery::DiscoveryError;
use crate::health::HealthReporter;
use crate::reconcile::{Actuation, ReconcileState};
use crate::session::ConnectError;

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HealthEvent {
    BootstrapStarting(String),
    DiscoveryAttemptFailed(u32),
    DiscoverySucceeded(u32),
    ConnectAttemptFailed { host: String, anchor_index: usize },
    Connected { host: String, anchor_index: usize },
    BootstrapFailed(String),
    StateChanged { from: ReconcileState, to: ReconcileState },
    ResponseTimedOut(ReconcileState),
    InvalidToken(String),
    ActuationFailed(String),
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    /// Reconciliation states entered, in order.
    #[must_use]
    pub fn states_entered(&self) -> Vec<ReconcileState> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HealthEvent::StateChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self, thing_name: &str) {
        self.record(HealthEvent::BootstrapStarting(thing_name.to_owned()));
    }

    fn discovery_attempt_failed(&self, attempt: u32, _error: &DiscoveryError) {
        self.record(HealthEvent::DiscoveryAttemptFailed(attempt));
    }

    fn discovery_succeeded(&self, attempt: u32) {
        self.record(HealthEvent::DiscoverySucceeded(attempt));
    }

    fn connect_attempt_failed(
        &self,
        candidate: &ConnectivityCandidate,
        anchor_index: usize,
        _error: &ConnectError,
    ) {
        self.record(HealthEvent::ConnectAttemptFailed {
            host: candidate.host().to_owned(),
            anchor_index,
        });
    }

    fn connected(&self, candidate: &ConnectivityCandidate, anchor_index: usize) {
        self.record(HealthEvent::Connected {
            host: candidate.host().to_owned(),
            anchor_index,
        });
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn state_changed(&self, from: ReconcileState, to: ReconcileState) {
        self.record(HealthEvent::StateChanged { from, to });
    }

    fn response_timed_out(&self, state: ReconcileState) {
        self.record(HealthEvent::ResponseTimedOut(state));
    }

    fn invalid_token(&self, token: &str) {
        self.record(HealthEvent::InvalidToken(token.to_owned()));
    }

    fn actuation_failed(&self, actuation: &Actuation, _error: &ActuatorError) {
        self.record(HealthEvent::ActuationFailed(actuation.token().to_owned()));
    }
}
