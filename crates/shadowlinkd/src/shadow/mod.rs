//! Device shadow protocol: topics, documents, and request correlation.

mod document;
mod handoff;
mod sync;
mod topics;

pub use document::{ShadowDocument, ShadowRejection};
pub use sync::{PendingRequest, ResponseOutcome, ShadowError, ShadowSync};
pub use topics::{RequestKind, ResponseKind, ShadowOperation, ShadowTopics};

pub(crate) const SHADOW_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::shadow");
