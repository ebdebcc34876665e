//! Process exit statuses for every terminal outcome.

use std::process::ExitCode;

use crate::bootstrap::BootstrapError;
use crate::reconcile::ReconcileError;
use crate::run::RunError;
use crate::shadow::ShadowError;

/// Exit status of the agent process.
///
/// Codes 3 to 6 mean the device never reached a gateway, 7 means the
/// service refused its reports, and 8 means an established session was lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitStatus {
    /// Shut down cleanly after disconnecting.
    Clean,
    /// Configuration could not be loaded or is invalid.
    Configuration,
    /// Discovery holds no information for the thing.
    NoRegistration,
    /// Every discovery attempt failed.
    DiscoveryExhausted,
    /// Every connect attempt failed.
    ConnectExhausted,
    /// Discovery or shadow data could not be decoded.
    MalformedData,
    /// The shadow service rejected a report.
    ProtocolRejected,
    /// The session dropped after it was established.
    SessionLost,
    /// A local runtime or IO failure.
    Runtime,
    /// Telemetry could not be initialised.
    Telemetry,
}

impl ExitStatus {
    /// Numeric process exit code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Clean => 0,
            Self::Configuration => 2,
            Self::NoRegistration => 3,
            Self::DiscoveryExhausted => 4,
            Self::ConnectExhausted => 5,
            Self::MalformedData => 6,
            Self::ProtocolRejected => 7,
            Self::SessionLost => 8,
            Self::Runtime => 9,
            Self::Telemetry => 10,
        }
    }
}

impl From<&BootstrapError> for ExitStatus {
    fn from(error: &BootstrapError) -> Self {
        match error {
            BootstrapError::NoRegistration { .. } => Self::NoRegistration,
            BootstrapError::DiscoveryExhausted { .. } => Self::DiscoveryExhausted,
            BootstrapError::ConnectExhausted { .. } => Self::ConnectExhausted,
            BootstrapError::MalformedDiscoveryData { .. } => Self::MalformedData,
            BootstrapError::Anchors { .. } => Self::Runtime,
            BootstrapError::Interrupted => Self::Clean,
        }
    }
}

impl From<&ReconcileError> for ExitStatus {
    fn from(error: &ReconcileError) -> Self {
        match error {
            ReconcileError::BaselineRejected { .. } | ReconcileError::UpdateRejected { .. } => {
                Self::ProtocolRejected
            }
            ReconcileError::SessionLost => Self::SessionLost,
            ReconcileError::Shadow {
                source: ShadowError::MalformedDocument { .. },
            } => Self::MalformedData,
            ReconcileError::Shadow { .. } => Self::Runtime,
        }
    }
}

impl From<&RunError> for ExitStatus {
    fn from(error: &RunError) -> Self {
        match error {
            RunError::Configuration { .. } | RunError::InvalidConfiguration { .. } => {
                Self::Configuration
            }
            RunError::Telemetry { .. } => Self::Telemetry,
            RunError::Signals { .. } | RunError::Disconnect { .. } => Self::Runtime,
            RunError::Bootstrap { source } => Self::from(source),
            RunError::Reconcile { source } => Self::from(source),
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        Self::from(status.code())
    }
}
