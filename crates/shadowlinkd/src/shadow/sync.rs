//! Correlation of fire-and-forget shadow requests with their responses.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

use crate::session::{MessageSink, Session, SessionError};
use crate::shutdown::{Interrupt, Shutdown};

use super::SHADOW_TARGET;
use super::document::{DeltaDocument, ShadowDocument, ShadowRejection};
use super::handoff::{Handoff, InboundEvent, Take};
use super::topics::{RequestKind, ResponseKind, ShadowOperation, ShadowTopics};

/// The single request awaiting a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    kind: RequestKind,
    issued_at: Instant,
}

impl PendingRequest {
    fn issue(kind: RequestKind) -> Self {
        Self {
            kind,
            issued_at: Instant::now(),
        }
    }

    /// What was requested.
    #[must_use]
    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    /// When the request was issued.
    #[must_use]
    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }
}

/// Result of waiting for one inbound shadow event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// The service applied a request.
    Accepted {
        /// Operation that was applied.
        operation: ShadowOperation,
    },
    /// The service refused a request.
    Rejected {
        /// Operation that was refused.
        operation: ShadowOperation,
        /// Error body sent by the service.
        rejection: ShadowRejection,
    },
    /// Desired state changed; the snapshot already holds the merged delta.
    Delta,
    /// Nothing arrived in time.
    Timeout,
}

/// Errors raised by [`ShadowSync`].
#[derive(Debug, Error)]
pub enum ShadowError {
    /// The session refused a publish or subscription.
    #[error("shadow session failure: {source}")]
    Session {
        /// Underlying session error.
        #[source]
        source: SessionError,
    },
    /// The staged document could not be encoded.
    #[error("failed to encode shadow document: {source}")]
    Encode {
        /// Underlying encoder error.
        #[source]
        source: serde_json::Error,
    },
    /// An inbound payload could not be decoded.
    #[error("malformed shadow payload on {operation}/{response:?}: {source}")]
    MalformedDocument {
        /// Operation the payload belongs to.
        operation: ShadowOperation,
        /// Classification of the payload.
        response: ResponseKind,
        /// Underlying decoder error.
        #[source]
        source: serde_json::Error,
    },
    /// Another request is still awaiting its response.
    #[error("a {kind:?} request is still outstanding")]
    RequestOutstanding {
        /// Kind of the outstanding request.
        kind: RequestKind,
    },
    /// An update was requested with nothing staged.
    #[error("no reported state has been staged")]
    NothingStaged,
    /// Shutdown was requested while waiting.
    #[error("shadow wait interrupted by shutdown")]
    Interrupted,
    /// The session dropped its connection.
    #[error("shadow session was lost")]
    SessionLost,
}

/// Delivery-thread side of the handoff.
struct ShadowInbox {
    topics: ShadowTopics,
    handoff: Arc<Handoff>,
}

impl MessageSink for ShadowInbox {
    fn deliver(&self, topic: &str, payload: &[u8]) {
        let Some((operation, response)) = self.topics.classify(topic) else {
            debug!(target: SHADOW_TARGET, topic, "ignoring message outside the shadow");
            return;
        };
        let event = InboundEvent::Message {
            operation,
            response,
            payload: payload.to_vec(),
        };
        if !self.handoff.deposit(event) {
            debug!(target: SHADOW_TARGET, topic, "dropping message after handoff closed");
        }
    }

    fn connection_lost(&self) {
        if !self.handoff.deposit(InboundEvent::SessionLost) {
            debug!(target: SHADOW_TARGET, "connection lost after handoff closed");
        }
    }
}

/// Shadow protocol driver bound to one session.
///
/// At most one request is outstanding. Inbound payloads are decoded and
/// merged into the server snapshot on the caller's thread inside
/// [`ShadowSync::await_response`].
pub struct ShadowSync<'s, S: Session> {
    session: &'s S,
    topics: ShadowTopics,
    handoff: Arc<Handoff>,
    staged: Option<ShadowDocument>,
    server: ShadowDocument,
    pending: Option<PendingRequest>,
}

impl<'s, S: Session> ShadowSync<'s, S> {
    /// Subscribes to every response topic of `thing_name`'s shadow.
    pub fn attach(session: &'s S, thing_name: &str, shutdown: &Shutdown) -> Result<Self, ShadowError> {
        let topics = ShadowTopics::new(thing_name);
        let handoff = Arc::new(Handoff::default());
        shutdown.watch(Arc::downgrade(&handoff) as Weak<dyn Interrupt>);

        let mut sync = Self {
            session,
            topics: topics.clone(),
            handoff: Arc::clone(&handoff),
            staged: None,
            server: ShadowDocument::default(),
            pending: Some(PendingRequest::issue(RequestKind::DeltaSubscribe)),
        };
        let inbox: Arc<dyn MessageSink> = Arc::new(ShadowInbox { topics, handoff });
        for topic in sync.topics.subscriptions() {
            session
                .subscribe(&topic, Arc::clone(&inbox))
                .map_err(|source| ShadowError::Session { source })?;
        }
        sync.pending = None;
        debug!(target: SHADOW_TARGET, thing = thing_name, "shadow subscriptions established");
        Ok(sync)
    }

    /// Stages a reported fragment, merging it with anything already staged.
    pub fn update_reported_state(&mut self, document: ShadowDocument) {
        match self.staged.as_mut() {
            Some(staged) => staged.stage(document),
            None => self.staged = Some(document),
        }
    }

    /// Publishes the staged document to the `update` topic.
    pub fn perform_update_async(&mut self) -> Result<(), ShadowError> {
        self.ensure_idle()?;
        let staged = self.staged.as_ref().ok_or(ShadowError::NothingStaged)?;
        let payload = staged
            .to_vec()
            .map_err(|source| ShadowError::Encode { source })?;
        self.publish(ShadowOperation::Update, &payload)?;
        self.staged = None;
        Ok(())
    }

    /// Publishes a `get` request.
    pub fn perform_get_async(&mut self) -> Result<(), ShadowError> {
        self.ensure_idle()?;
        self.publish(ShadowOperation::Get, &[])
    }

    /// Publishes a `delete` request.
    pub fn perform_delete_async(&mut self) -> Result<(), ShadowError> {
        self.ensure_idle()?;
        self.publish(ShadowOperation::Delete, &[])
    }

    /// Waits up to `timeout` for one inbound event.
    ///
    /// Accepted and rejected responses to the outstanding request resolve
    /// it, and a timeout discards it. A delta leaves it outstanding.
    pub fn await_response(&mut self, timeout: Duration) -> Result<ResponseOutcome, ShadowError> {
        match self.handoff.take(timeout) {
            Take::Event(InboundEvent::Message {
                operation,
                response,
                payload,
            }) => self.absorb(operation, response, &payload),
            Take::Event(InboundEvent::SessionLost) => {
                self.pending = None;
                Err(ShadowError::SessionLost)
            }
            Take::TimedOut => {
                if let Some(pending) = self.pending.take() {
                    debug!(
                        target: SHADOW_TARGET,
                        kind = ?pending.kind(),
                        waited_ms = pending.issued_at().elapsed().as_millis(),
                        "discarding request after timeout"
                    );
                }
                Ok(ResponseOutcome::Timeout)
            }
            Take::Closed => Err(ShadowError::Interrupted),
        }
    }

    /// The last merged server snapshot.
    #[must_use]
    pub fn latest_server_document(&self) -> &ShadowDocument {
        &self.server
    }

    /// The request awaiting a response, if any.
    #[must_use]
    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    /// The document staged for the next update, if any.
    #[must_use]
    pub fn staged(&self) -> Option<&ShadowDocument> {
        self.staged.as_ref()
    }

    /// Forgets the outstanding request without waiting for it.
    pub fn discard_pending(&mut self) {
        self.pending = None;
    }

    fn ensure_idle(&self) -> Result<(), ShadowError> {
        match self.pending {
            Some(pending) => Err(ShadowError::RequestOutstanding {
                kind: pending.kind(),
            }),
            None => Ok(()),
        }
    }

    fn publish(&mut self, operation: ShadowOperation, payload: &[u8]) -> Result<(), ShadowError> {
        let topic = self.topics.request(operation);
        self.session
            .publish(&topic, payload)
            .map_err(|source| ShadowError::Session { source })?;
        self.pending = Some(PendingRequest::issue(operation.into()));
        debug!(target: SHADOW_TARGET, %operation, topic = %topic, "shadow request published");
        Ok(())
    }

    fn resolve(&mut self, operation: ShadowOperation) {
        let kind = RequestKind::from(operation);
        if self.pending.is_some_and(|pending| pending.kind() == kind) {
            self.pending = None;
        }
    }

    fn absorb(
        &mut self,
        operation: ShadowOperation,
        response: ResponseKind,
        payload: &[u8],
    ) -> Result<ResponseOutcome, ShadowError> {
        let malformed = |source| ShadowError::MalformedDocument {
            operation,
            response,
            source,
        };
        match response {
            ResponseKind::Accepted => {
                self.resolve(operation);
                match operation {
                    ShadowOperation::Update => self
                        .server
                        .apply_accepted(ShadowDocument::from_slice(payload).map_err(malformed)?),
                    ShadowOperation::Get => self
                        .server
                        .replace(ShadowDocument::from_slice(payload).map_err(malformed)?),
                    ShadowOperation::Delete => self.server.clear(),
                }
                Ok(ResponseOutcome::Accepted { operation })
            }
            ResponseKind::Rejected => {
                self.resolve(operation);
                Ok(ResponseOutcome::Rejected {
                    operation,
                    rejection: ShadowRejection::from_payload(payload),
                })
            }
            ResponseKind::Delta => {
                let delta = DeltaDocument::from_slice(payload).map_err(malformed)?;
                self.server.apply_delta(delta);
                Ok(ResponseOutcome::Delta)
            }
        }
    }
}

impl<S: Session> Drop for ShadowSync<'_, S> {
    fn drop(&mut self) {
        self.handoff.close();
    }
}
