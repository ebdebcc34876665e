//! Device-side agent that bootstraps into an edge gateway and keeps a device
//! shadow reconciled with local actuators.
//!
//! The agent runs in two phases. [`ConnectBootstrap`] asks the discovery
//! service which gateways serve this thing, persists the returned trust
//! anchors, and walks every candidate endpoint with every anchor of its group
//! until one secure session is established. The [`reconcile`] module then
//! drives the device shadow over that session: it reports a baseline state,
//! waits for desired-state deltas, actuates them, and reports the new state
//! back.
//!
//! Health reporting hooks emit structured telemetry at each stage so
//! operators can diagnose failures from the logs alone. External
//! collaborators (discovery transport, secure session factory, actuator
//! commands) sit behind traits so the whole flow runs against scripted
//! doubles in tests.

mod actuator;
mod anchors;
mod bootstrap;
mod catalog;
mod discovery;
mod health;
mod placeholder_connector;
pub mod reconcile;
mod run;
mod session;
pub mod shadow;
mod shutdown;
mod status;
pub mod telemetry;

pub use actuator::{Actuator, ActuatorCommand, ActuatorError, CommandActuator};
pub use anchors::{AnchorError, AnchorPaths, TrustAnchorStore};
pub use bootstrap::{
    BootstrapError, BootstrapSettings, ConnectBootstrap, RetryPolicy, SessionState,
};
pub use catalog::{CatalogError, ConnectivityCandidate, EndpointCatalog, TrustAnchorSet};
pub use discovery::{DiscoveryClient, DiscoveryError, DiscoveryResponse, FileDiscoveryClient};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use run::{Collaborators, RunError, run, run_with};
pub use session::{
    ConnectError, ConnectRequest, MessageSink, Session, SessionConnector, SessionError,
};
pub use shutdown::{Interrupt, Interrupted, Shutdown, ShutdownError, SignalListener};
pub use status::ExitStatus;
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
