//! Test harness utilities for the bootstrap and reconciliation suites.

mod connector;
mod doubles;
mod reporter;
mod session;
mod world;

pub use connector::{ConnectAttempt, ScriptedConnector};
pub use doubles::{
    CountingDiscovery, MockDiscoveryService, MockHardware, RecordingActuator, discovery_document,
};
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use session::{
    Scripted, ScriptedSession, SessionProbe, accepted_get, accepted_update, delta,
    rejected_update,
};
pub use world::{STATE_KEY, THING, TestWorld, test_config, world};
