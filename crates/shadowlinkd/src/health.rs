//! Structured health reporting for bootstrap and reconciliation events.

use std::sync::Arc;

use crate::actuator::ActuatorError;
use crate::bootstrap::BootstrapError;
use crate::catalog::ConnectivityCandidate;
use crate::discovery::DiscoveryError;
use crate::reconcile::{Actuation, ReconcileState};
use crate::session::ConnectError;

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before discovery begins.
    fn bootstrap_starting(&self, thing_name: &str);

    /// Invoked after a transient discovery failure.
    fn discovery_attempt_failed(&self, attempt: u32, error: &DiscoveryError);

    /// Invoked when discovery returns a document.
    fn discovery_succeeded(&self, attempt: u32);

    /// Invoked after a failed connect attempt.
    fn connect_attempt_failed(
        &self,
        candidate: &ConnectivityCandidate,
        anchor_index: usize,
        error: &ConnectError,
    );

    /// Invoked once a session is established.
    fn connected(&self, candidate: &ConnectivityCandidate, anchor_index: usize);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked on every reconciliation state transition.
    fn state_changed(&self, from: ReconcileState, to: ReconcileState);

    /// Invoked when no shadow event arrived within the action timeout.
    fn response_timed_out(&self, state: ReconcileState);

    /// Invoked when a desired token cannot be dispatched.
    fn invalid_token(&self, token: &str);

    /// Invoked when the actuator reports a failure.
    fn actuation_failed(&self, actuation: &Actuation, error: &ActuatorError);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self, thing_name: &str) {
        (**self).bootstrap_starting(thing_name);
    }

    fn discovery_attempt_failed(&self, attempt: u32, error: &DiscoveryError) {
        (**self).discovery_attempt_failed(attempt, error);
    }

    fn discovery_succeeded(&self, attempt: u32) {
        (**self).discovery_succeeded(attempt);
    }

    fn connect_attempt_failed(
        &self,
        candidate: &ConnectivityCandidate,
        anchor_index: usize,
        error: &ConnectError,
    ) {
        (**self).connect_attempt_failed(candidate, anchor_index, error);
    }

    fn connected(&self, candidate: &ConnectivityCandidate, anchor_index: usize) {
        (**self).connected(candidate, anchor_index);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn state_changed(&self, from: ReconcileState, to: ReconcileState) {
        (**self).state_changed(from, to);
    }

    fn response_timed_out(&self, state: ReconcileState) {
        (**self).response_timed_out(state);
    }

    fn invalid_token(&self, token: &str) {
        (**self).invalid_token(token);
    }

    fn actuation_failed(&self, actuation: &Actuation, error: &ActuatorError) {
        (**self).actuation_failed(actuation, error);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self, thing_name: &str) {
        tracing::info!(
            target: "shadowlinkd::health",
            event = "bootstrap_starting",
            thing = thing_name,
            "starting device bootstrap"
        );
    }

    fn discovery_attempt_failed(&self, attempt: u32, error: &DiscoveryError) {
        tracing::warn!(
            target: "shadowlinkd::health",
            event = "discovery_attempt_failed",
            attempt,
            error = %error,
            "discovery attempt failed"
        );
    }

    fn discovery_succeeded(&self, attempt: u32) {
        tracing::info!(
            target: "shadowlinkd::health",
            event = "discovery_succeeded",
            attempt,
            "discovery succeeded"
        );
    }

    fn connect_attempt_failed(
        &self,
        candidate: &ConnectivityCandidate,
        anchor_index: usize,
        error: &ConnectError,
    ) {
        tracing::warn!(
            target: "shadowlinkd::health",
            event = "connect_attempt_failed",
            candidate = candidate.id(),
            host = candidate.host(),
            port = candidate.port(),
            anchor_index,
            message = error.message(),
            error = ?error,
            "connect attempt failed"
        );
    }

    fn connected(&self, candidate: &ConnectivityCandidate, anchor_index: usize) {
        tracing::info!(
            target: "shadowlinkd::health",
            event = "connected",
            candidate = candidate.id(),
            group = candidate.group(),
            host = candidate.host(),
            port = candidate.port(),
            anchor_index,
            "session established"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: "shadowlinkd::health",
            event = "bootstrap_failed",
            error = %error,
            "device bootstrap failed"
        );
    }

    fn state_changed(&self, from: ReconcileState, to: ReconcileState) {
        tracing::info!(
            target: "shadowlinkd::health",
            event = "state_changed",
            %from,
            %to,
            "reconciliation state changed"
        );
    }

    fn response_timed_out(&self, state: ReconcileState) {
        tracing::debug!(
            target: "shadowlinkd::health",
            event = "response_timed_out",
            %state,
            "no shadow event within the action timeout"
        );
    }

    fn invalid_token(&self, token: &str) {
        tracing::warn!(
            target: "shadowlinkd::health",
            event = "invalid_token",
            token,
            "desired token cannot be dispatched"
        );
    }

    fn actuation_failed(&self, actuation: &Actuation, error: &ActuatorError) {
        tracing::error!(
            target: "shadowlinkd::health",
            event = "actuation_failed",
            token = actuation.token(),
            error = %error,
            "actuator reported a failure"
        );
    }
}
