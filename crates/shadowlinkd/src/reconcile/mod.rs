//! Desired-state reconciliation.

mod dispatch;
mod engine;

pub use dispatch::{Actuation, Effect, LightColour, TEMPERATURE_LABEL, TokenOutcome, resolve};
pub use engine::{ReconcileError, ReconcileSettings, ReconcileState, ReconciliationLoop};
