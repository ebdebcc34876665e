//! Mocked collaborators and canned discovery documents.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mockall::mock;
use serde_json::json;

use crate::actuator::{Actuator, ActuatorError};
use crate::discovery::{DiscoveryClient, DiscoveryError, DiscoveryResponse};
use crate::reconcile::Actuation;

mock! {
    pub DiscoveryService {}

    impl DiscoveryClient for DiscoveryService {
        fn discover(
            &self,
            timeout: Duration,
            thing_name: &str,
        ) -> Result<DiscoveryResponse, DiscoveryError>;
    }
}

mock! {
    pub Hardware {}

    impl Actuator for Hardware {
        fn apply(&self, actuation: &Actuation) -> Result<(), ActuatorError>;
    }
}

/// Discovery document for one group whose candidates are identified and
/// addressed by `hosts`, trusting `anchors` root certificates.
pub fn discovery_document(group: &str, hosts: &[&str], anchors: usize) -> DiscoveryResponse {
    let connectivity: Vec<_> = hosts
        .iter()
        .map(|host| json!({ "Id": host, "HostAddress": host, "PortNumber": 8883 }))
        .collect();
    let cas: Vec<_> = (1..=anchors)
        .map(|index| format!("-----BEGIN CERTIFICATE-----\n{group}-{index}\n-----END CERTIFICATE-----\n"))
        .collect();
    let document = json!({
        "GGGroups": [{
            "GGGroupId": group,
            "Cores": [{
                "thingArn": format!("arn:aws:iot:eu-west-1:1:thing/{group}-core"),
                "Connectivity": connectivity,
            }],
            "CAs": cas,
        }]
    });
    DiscoveryResponse::new(document.to_string())
}

/// Discovery double that fails transiently `failures` times, then answers
/// with `response`, counting every attempt.
#[derive(Clone)]
pub struct CountingDiscovery {
    outcome: Arc<Mutex<DiscoveryScript>>,
}

#[derive(Default)]
struct DiscoveryScript {
    failures: u32,
    unregistered: bool,
    response: Option<DiscoveryResponse>,
    attempts: u32,
}

impl CountingDiscovery {
    /// Builds a client that has no information until a response is set.
    pub fn new() -> Self {
        Self {
            outcome: Arc::default(),
        }
    }

    /// Sets the document returned once the scripted failures are spent.
    pub fn answer_with(&self, response: DiscoveryResponse) {
        self.lock().response = Some(response);
    }

    /// Makes the first `failures` attempts time out.
    pub fn fail_first(&self, failures: u32) {
        self.lock().failures = failures;
    }

    /// Makes every attempt report that the thing is not registered.
    pub fn unregistered(&self) {
        self.lock().unregistered = true;
    }

    /// Attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.lock().attempts
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DiscoveryScript> {
        self.outcome.lock().expect("discovery script mutex poisoned")
    }
}

impl DiscoveryClient for CountingDiscovery {
    fn discover(
        &self,
        timeout: Duration,
        _thing_name: &str,
    ) -> Result<DiscoveryResponse, DiscoveryError> {
        let mut script = self.lock();
        script.attempts += 1;
        if script.unregistered {
            return Err(DiscoveryError::NoInformationPresent);
        }
        if script.attempts <= script.failures {
            return Err(DiscoveryError::TimedOut { timeout });
        }
        script
            .response
            .clone()
            .ok_or(DiscoveryError::NoInformationPresent)
    }
}

/// Actuator double recording the tokens it was asked to apply.
#[derive(Clone, Default)]
pub struct RecordingActuator {
    applied: Arc<Mutex<Vec<String>>>,
}

impl RecordingActuator {
    /// Tokens applied so far, in order.
    pub fn applied(&self) -> Vec<String> {
        self.applied
            .lock()
            .expect("actuator mutex poisoned")
            .clone()
    }
}

impl Actuator for RecordingActuator {
    fn apply(&self, actuation: &Actuation) -> Result<(), ActuatorError> {
        self.applied
            .lock()
            .expect("actuator mutex poisoned")
            .push(actuation.token().to_owned());
        Ok(())
    }
}
