//! Test session connector: records attempts and refuses scripted endpoints.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use camino::Utf8PathBuf;

use crate::session::{ConnectError, ConnectRequest, SessionConnector};
use crate::shutdown::Shutdown;

use super::session::ScriptedSession;

/// One recorded connect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAttempt {
    pub host: String,
    pub port: u16,
    pub root_ca: Utf8PathBuf,
}

impl ConnectAttempt {
    /// File name of the trust anchor used for the attempt.
    pub fn anchor_file(&self) -> &str {
        self.root_ca.file_name().unwrap_or_default()
    }
}

#[derive(Default)]
struct ConnectorState {
    attempts: Vec<ConnectAttempt>,
    refused_hosts: HashSet<String>,
    refused_anchors: HashSet<(String, String)>,
    sessions: Vec<ScriptedSession>,
}

/// Connector that succeeds unless the host or host/anchor pair is refused.
#[derive(Clone)]
pub struct ScriptedConnector {
    state: Arc<Mutex<ConnectorState>>,
    shutdown: Shutdown,
}

impl ScriptedConnector {
    /// Builds a connector whose fresh sessions request `shutdown` on cue.
    pub fn new(shutdown: Shutdown) -> Self {
        Self {
            state: Arc::default(),
            shutdown,
        }
    }

    /// Refuses every attempt against `host`.
    pub fn refuse_host(&self, host: &str) {
        self.lock().refused_hosts.insert(host.to_owned());
    }

    /// Refuses attempts against `host` validated with `anchor_file`.
    pub fn refuse_anchor(&self, host: &str, anchor_file: &str) {
        self.lock()
            .refused_anchors
            .insert((host.to_owned(), anchor_file.to_owned()));
    }

    /// Hands out `session` on the next successful attempt.
    pub fn hand_out(&self, session: ScriptedSession) {
        self.lock().sessions.push(session);
    }

    /// Attempts made so far, in order.
    pub fn attempts(&self) -> Vec<ConnectAttempt> {
        self.lock().attempts.clone()
    }

    /// Hosts attempted so far, in order.
    pub fn attempted_hosts(&self) -> Vec<String> {
        self.lock()
            .attempts
            .iter()
            .map(|attempt| attempt.host.clone())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ConnectorState> {
        self.state.lock().expect("connector state mutex poisoned")
    }
}

impl SessionConnector for ScriptedConnector {
    type Session = ScriptedSession;

    fn connect(&self, request: &ConnectRequest<'_>) -> Result<Self::Session, ConnectError> {
        let mut state = self.lock();
        let attempt = ConnectAttempt {
            host: request.host.to_owned(),
            port: request.port,
            root_ca: request.root_ca_path.to_path_buf(),
        };
        let refused = state.refused_hosts.contains(&attempt.host)
            || state
                .refused_anchors
                .contains(&(attempt.host.clone(), attempt.anchor_file().to_owned()));
        state.attempts.push(attempt);
        if refused {
            return Err(ConnectError::new(
                request.host,
                request.port,
                "scripted handshake failure",
            ));
        }
        Ok(state
            .sessions
            .pop()
            .unwrap_or_else(|| ScriptedSession::new(self.shutdown.clone())))
    }
}
