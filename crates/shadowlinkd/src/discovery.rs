//! Discovery transport seam and the replaying file client.

use std::fs;
use std::io;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// Raw payload returned by a successful discovery call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryResponse {
    raw: String,
}

impl DiscoveryResponse {
    /// Wraps a raw discovery document.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// The document exactly as returned by the service.
    #[must_use]
    pub fn raw(&self) -> &str {
        self.raw.as_str()
    }

    /// Writes the raw document to `path`, replacing any previous contents.
    pub fn write_to_path(&self, path: &Utf8Path) -> io::Result<()> {
        fs::write(path, self.raw.as_bytes())
    }
}

/// Classified discovery failure.
///
/// Only [`DiscoveryError::NoInformationPresent`] is terminal; every other
/// variant is treated as transient by the bootstrap retry loop.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The service holds no connectivity information for this thing.
    #[error("no discovery information is present for this thing")]
    NoInformationPresent,
    /// The attempt did not complete within its timeout.
    #[error("discovery timed out after {} ms", .timeout.as_millis())]
    TimedOut {
        /// Timeout that elapsed.
        timeout: Duration,
    },
    /// The transport reported a failure.
    #[error("discovery transport failed: {message}")]
    Transport {
        /// Transport description of the failure.
        message: String,
    },
    /// A local discovery document could not be read.
    #[error("failed to read discovery document '{path}': {source}")]
    Io {
        /// Document path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl DiscoveryError {
    /// Whether retrying cannot change the outcome.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::NoInformationPresent)
    }
}

/// Client performing one discovery attempt per call.
pub trait DiscoveryClient {
    /// Looks up connectivity information for `thing_name`.
    fn discover(
        &self,
        timeout: Duration,
        thing_name: &str,
    ) -> Result<DiscoveryResponse, DiscoveryError>;
}

/// Replays a previously persisted discovery document.
///
/// A missing document means the device was never registered and is reported
/// as [`DiscoveryError::NoInformationPresent`].
#[derive(Debug, Clone)]
pub struct FileDiscoveryClient {
    path: Utf8PathBuf,
}

impl FileDiscoveryClient {
    /// Builds a client reading from `path`.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Document location.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        self.path.as_path()
    }
}

impl DiscoveryClient for FileDiscoveryClient {
    fn discover(
        &self,
        _timeout: Duration,
        _thing_name: &str,
    ) -> Result<DiscoveryResponse, DiscoveryError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(DiscoveryResponse::new(raw)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                Err(DiscoveryError::NoInformationPresent)
            }
            Err(source) => Err(DiscoveryError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}
