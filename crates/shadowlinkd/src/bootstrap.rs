//! Device bootstrap: discovery with bounded retries, then one secure session.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use shadowlink_config::Config;
use thiserror::Error;
use tracing::{debug, warn};

use crate::anchors::{AnchorError, AnchorPaths, TrustAnchorStore};
use crate::catalog::{CatalogError, ConnectivityCandidate, EndpointCatalog};
use crate::discovery::{DiscoveryClient, DiscoveryError, DiscoveryResponse};
use crate::health::HealthReporter;
use crate::session::{ConnectRequest, Session, SessionConnector, SessionError};
use crate::shutdown::Shutdown;

const BOOTSTRAP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bootstrap");

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Discovery holds no information for this thing.
    #[error("thing '{thing_name}' is not registered with any gateway group")]
    NoRegistration {
        /// Identity that was looked up.
        thing_name: String,
    },
    /// Every discovery attempt failed transiently.
    #[error("discovery failed after {attempts} attempts: {last}")]
    DiscoveryExhausted {
        /// Attempts made.
        attempts: u32,
        /// Failure of the final attempt.
        #[source]
        last: DiscoveryError,
    },
    /// The discovery document could not be decomposed.
    #[error("discovery returned unusable data: {source}")]
    MalformedDiscoveryData {
        /// Underlying catalog error.
        #[source]
        source: CatalogError,
    },
    /// Trust anchors could not be persisted.
    #[error("failed to persist trust anchors: {source}")]
    Anchors {
        /// Underlying filesystem error.
        #[source]
        source: AnchorError,
    },
    /// No candidate and trust anchor pair produced a session.
    #[error("all {attempts} connect attempts failed")]
    ConnectExhausted {
        /// Attempts made.
        attempts: usize,
    },
    /// Shutdown was requested during bootstrap.
    #[error("bootstrap interrupted by shutdown")]
    Interrupted,
}

/// Discovery retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Sleep after each transient failure except the last.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Total attempts permitted.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Inputs for discovery and connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapSettings {
    /// Identity looked up through discovery.
    pub thing_name: String,
    /// Client id presented to the broker.
    pub client_id: String,
    /// Per-attempt discovery timeout.
    pub discover_timeout: Duration,
    /// Discovery retry budget.
    pub retry: RetryPolicy,
    /// Delay after every connect attempt.
    pub connect_settle: Duration,
    /// Keep-alive requested for the session.
    pub keep_alive: Duration,
    /// Whether broker state is discarded on connect.
    pub clean_session: bool,
    /// Client certificate.
    pub client_cert_path: Option<Utf8PathBuf>,
    /// Client private key.
    pub client_key_path: Option<Utf8PathBuf>,
    /// Directory receiving the trust anchors.
    pub output_dir: Utf8PathBuf,
    /// Where the raw discovery document is persisted.
    pub artifact_path: Utf8PathBuf,
}

impl BootstrapSettings {
    /// Extracts bootstrap settings from the agent configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            thing_name: config.thing_name.clone(),
            client_id: config.client_id().to_owned(),
            discover_timeout: config.discover_timeout(),
            retry: RetryPolicy {
                max_retries: config.discover_max_retries,
                backoff: config.discover_backoff(),
            },
            connect_settle: config.connect_settle(),
            keep_alive: config.keep_alive(),
            clean_session: config.clean_session,
            client_cert_path: config.client_cert_path.clone(),
            client_key_path: config.client_key_path.clone(),
            output_dir: config.output_dir().to_path_buf(),
            artifact_path: config.discovery_artifact_path(),
        }
    }
}

/// The established session and the endpoint that produced it.
#[derive(Debug)]
pub struct SessionState<S> {
    session: S,
    candidate: ConnectivityCandidate,
    anchor_index: usize,
}

impl<S: Session> SessionState<S> {
    /// Connected session.
    #[must_use]
    pub fn session(&self) -> &S {
        &self.session
    }

    /// Candidate that accepted the connection.
    #[must_use]
    pub fn candidate(&self) -> &ConnectivityCandidate {
        &self.candidate
    }

    /// Zero-based index of the trust anchor that validated the candidate.
    #[must_use]
    pub fn anchor_index(&self) -> usize {
        self.anchor_index
    }

    /// Closes the session.
    pub fn disconnect(mut self) -> Result<(), SessionError> {
        self.session.disconnect()
    }
}

/// Runs discovery and connect with injected collaborators.
pub struct ConnectBootstrap<D, C> {
    discovery: D,
    connector: C,
    reporter: Arc<dyn HealthReporter>,
    shutdown: Shutdown,
    settings: BootstrapSettings,
}

impl<D, C> ConnectBootstrap<D, C>
where
    D: DiscoveryClient,
    C: SessionConnector,
{
    /// Builds a bootstrapper.
    pub fn new(
        discovery: D,
        connector: C,
        reporter: Arc<dyn HealthReporter>,
        shutdown: Shutdown,
        settings: BootstrapSettings,
    ) -> Self {
        Self {
            discovery,
            connector,
            reporter,
            shutdown,
            settings,
        }
    }

    /// Discovers, persists artefacts, and connects.
    ///
    /// Every failure except an interruption is reported before returning.
    pub fn bootstrap(&self) -> Result<SessionState<C::Session>, BootstrapError> {
        self.reporter.bootstrap_starting(&self.settings.thing_name);
        let result = self.establish();
        if let Err(error) = &result {
            if !matches!(error, BootstrapError::Interrupted) {
                self.reporter.bootstrap_failed(error);
            }
        }
        result
    }

    /// Performs discovery within the retry budget.
    ///
    /// [`DiscoveryError::NoInformationPresent`] ends the loop immediately;
    /// any other failure sleeps for the backoff and retries until the budget
    /// is spent.
    pub fn discover(&self) -> Result<DiscoveryResponse, BootstrapError> {
        let budget = self.settings.retry.attempts();
        let mut attempt = 0;
        loop {
            if self.shutdown.is_requested() {
                return Err(BootstrapError::Interrupted);
            }
            attempt += 1;
            let error = match self
                .discovery
                .discover(self.settings.discover_timeout, &self.settings.thing_name)
            {
                Ok(response) => {
                    self.reporter.discovery_succeeded(attempt);
                    return Ok(response);
                }
                Err(error) if error.is_terminal() => {
                    return Err(BootstrapError::NoRegistration {
                        thing_name: self.settings.thing_name.clone(),
                    });
                }
                Err(error) => error,
            };
            self.reporter.discovery_attempt_failed(attempt, &error);
            if attempt >= budget {
                return Err(BootstrapError::DiscoveryExhausted {
                    attempts: attempt,
                    last: error,
                });
            }
            self.shutdown
                .sleep(self.settings.retry.backoff)
                .map_err(|_| BootstrapError::Interrupted)?;
        }
    }

    /// Tries every candidate with every anchor of its group; first success
    /// wins.
    pub fn connect(
        &self,
        catalog: &EndpointCatalog,
        anchors: &AnchorPaths,
    ) -> Result<SessionState<C::Session>, BootstrapError> {
        let mut attempts = 0;
        for candidate in catalog.candidates() {
            for (anchor_index, root_ca) in anchors.for_group(candidate.group()).iter().enumerate() {
                if self.shutdown.is_requested() {
                    return Err(BootstrapError::Interrupted);
                }
                attempts += 1;
                let request = ConnectRequest {
                    host: candidate.host(),
                    port: candidate.port(),
                    root_ca_path: root_ca,
                    client_id: &self.settings.client_id,
                    client_cert_path: self.settings.client_cert_path.as_deref(),
                    client_key_path: self.settings.client_key_path.as_deref(),
                    keep_alive: self.settings.keep_alive,
                    clean_session: self.settings.clean_session,
                };
                let result = self.connector.connect(&request);
                let settled = self.shutdown.sleep(self.settings.connect_settle);
                match result {
                    Ok(session) => {
                        let state = SessionState {
                            session,
                            candidate: candidate.clone(),
                            anchor_index,
                        };
                        if settled.is_err() {
                            close_quietly(state);
                            return Err(BootstrapError::Interrupted);
                        }
                        self.reporter.connected(candidate, anchor_index);
                        return Ok(state);
                    }
                    Err(error) => {
                        self.reporter
                            .connect_attempt_failed(candidate, anchor_index, &error);
                        settled.map_err(|_| BootstrapError::Interrupted)?;
                    }
                }
            }
        }
        Err(BootstrapError::ConnectExhausted { attempts })
    }

    fn establish(&self) -> Result<SessionState<C::Session>, BootstrapError> {
        let response = self.discover()?;
        self.persist_artifact(&response);
        let catalog = EndpointCatalog::build_from(&response)
            .map_err(|source| BootstrapError::MalformedDiscoveryData { source })?;
        let anchors = TrustAnchorStore::new(self.settings.output_dir.clone())
            .persist(catalog.anchors())
            .map_err(|source| BootstrapError::Anchors { source })?;
        debug!(
            target: BOOTSTRAP_TARGET,
            candidates = catalog.candidates().len(),
            "endpoint catalog ready"
        );
        self.connect(&catalog, &anchors)
    }

    fn persist_artifact(&self, response: &DiscoveryResponse) {
        let path = &self.settings.artifact_path;
        let written = match path.parent() {
            Some(dir) if !dir.as_str().is_empty() => fs::create_dir_all(dir),
            _ => Ok(()),
        }
        .and_then(|()| response.write_to_path(path));
        match written {
            Ok(()) => debug!(target: BOOTSTRAP_TARGET, path = %path, "discovery document persisted"),
            Err(error) => warn!(
                target: BOOTSTRAP_TARGET,
                path = %path,
                error = %error,
                "failed to persist discovery document"
            ),
        }
    }
}

fn close_quietly<S: Session>(state: SessionState<S>) {
    if let Err(error) = state.disconnect() {
        warn!(target: BOOTSTRAP_TARGET, error = %error, "failed to close session after shutdown");
    }
}
