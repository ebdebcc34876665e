//! Placeholder session connector used until a secure transport is linked in.

use std::sync::Arc;

use crate::session::{ConnectError, ConnectRequest, MessageSink, Session, SessionConnector, SessionError};

const CONNECTOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session::unlinked");

/// Connector that refuses every attempt.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct UnlinkedConnector;

/// Session type that cannot be constructed.
#[derive(Debug)]
pub(crate) enum UnlinkedSession {}

impl SessionConnector for UnlinkedConnector {
    type Session = UnlinkedSession;

    fn connect(&self, request: &ConnectRequest<'_>) -> Result<Self::Session, ConnectError> {
        tracing::warn!(
            target: CONNECTOR_TARGET,
            host = request.host,
            port = request.port,
            root_ca = %request.root_ca_path,
            "connect requested but no secure transport is linked"
        );
        Err(ConnectError::new(
            request.host,
            request.port,
            "no secure transport is linked into this build",
        ))
    }
}

impl Session for UnlinkedSession {
    fn publish(&self, _topic: &str, _payload: &[u8]) -> Result<(), SessionError> {
        match *self {}
    }

    fn subscribe(&self, _topic: &str, _sink: Arc<dyn MessageSink>) -> Result<(), SessionError> {
        match *self {}
    }

    fn disconnect(&mut self) -> Result<(), SessionError> {
        match *self {}
    }
}
