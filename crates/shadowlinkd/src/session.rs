//! Seams for the secure session and its publish/subscribe traffic.
//!
//! The TLS handshake and the wire protocol live outside this crate. A
//! [`SessionConnector`] turns a [`ConnectRequest`] into a connected
//! [`Session`]; inbound messages are pushed by the session's own delivery
//! thread into a [`MessageSink`].

use std::sync::Arc;
use std::time::Duration;

use camino::Utf8Path;
use thiserror::Error;

/// Receiver for inbound messages delivered by a session.
///
/// Implementations are called from the session's delivery thread, never from
/// the thread that issued the subscription.
pub trait MessageSink: Send + Sync {
    /// Hands over one inbound message.
    fn deliver(&self, topic: &str, payload: &[u8]);

    /// Signals that the underlying connection has been lost.
    fn connection_lost(&self);
}

/// A connected secure session.
pub trait Session {
    /// Publishes a fire-and-forget message.
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), SessionError>;

    /// Routes every message received on `topic` to `sink`.
    fn subscribe(&self, topic: &str, sink: Arc<dyn MessageSink>) -> Result<(), SessionError>;

    /// Closes the session.
    fn disconnect(&mut self) -> Result<(), SessionError>;
}

/// Parameters for a single secure connect attempt.
#[derive(Debug, Clone, Copy)]
pub struct ConnectRequest<'a> {
    /// Gateway host address.
    pub host: &'a str,
    /// Gateway port.
    pub port: u16,
    /// Trust anchor used to validate the gateway.
    pub root_ca_path: &'a Utf8Path,
    /// Client id presented to the broker.
    pub client_id: &'a str,
    /// Client certificate, when the connector does not supply its own.
    pub client_cert_path: Option<&'a Utf8Path>,
    /// Client private key, when the connector does not supply its own.
    pub client_key_path: Option<&'a Utf8Path>,
    /// Requested keep-alive interval.
    pub keep_alive: Duration,
    /// Whether to discard persisted broker state.
    pub clean_session: bool,
}

/// Establishes secure sessions.
pub trait SessionConnector {
    /// Session type produced by a successful handshake.
    type Session: Session;

    /// Attempts one secure connect.
    fn connect(&self, request: &ConnectRequest<'_>) -> Result<Self::Session, ConnectError>;
}

/// A failed connect attempt.
#[derive(Debug, Error)]
#[error("connect to {host}:{port} failed: {message}")]
pub struct ConnectError {
    host: String,
    port: u16,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ConnectError {
    /// Builds an error without an underlying source.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, message: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            message: message.into(),
            source: None,
        }
    }

    /// Builds an error that wraps an underlying source.
    #[must_use]
    pub fn with_source(
        host: impl Into<String>,
        port: u16,
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Human-readable reason for the failure.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }
}

/// Errors raised by an established session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Publishing a message failed.
    #[error("failed to publish to '{topic}': {message}")]
    Publish {
        /// Destination topic.
        topic: String,
        /// Transport description of the failure.
        message: String,
    },
    /// Subscribing to a topic failed.
    #[error("failed to subscribe to '{topic}': {message}")]
    Subscribe {
        /// Requested topic.
        topic: String,
        /// Transport description of the failure.
        message: String,
    },
    /// Disconnecting failed.
    #[error("failed to disconnect: {message}")]
    Disconnect {
        /// Transport description of the failure.
        message: String,
    },
    /// The session was already closed.
    #[error("session is closed")]
    Closed,
}
