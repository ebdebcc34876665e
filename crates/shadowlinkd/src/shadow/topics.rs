//! Shadow topic naming and inbound classification.

use std::fmt;

/// Shadow operation a topic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShadowOperation {
    /// Fetch the full document.
    Get,
    /// Merge a reported or desired fragment.
    Update,
    /// Remove the document.
    Delete,
}

impl ShadowOperation {
    const ALL: [Self; 3] = [Self::Get, Self::Update, Self::Delete];

    fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    fn parse(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == segment)
    }
}

impl fmt::Display for ShadowOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of request tracked while awaiting its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// A `get` publish.
    Get,
    /// An `update` publish.
    Update,
    /// A `delete` publish.
    Delete,
    /// The initial topic subscriptions.
    DeltaSubscribe,
}

impl From<ShadowOperation> for RequestKind {
    fn from(operation: ShadowOperation) -> Self {
        match operation {
            ShadowOperation::Get => Self::Get,
            ShadowOperation::Update => Self::Update,
            ShadowOperation::Delete => Self::Delete,
        }
    }
}

/// Classification of an inbound shadow message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKind {
    /// The service applied the request.
    Accepted,
    /// The service refused the request.
    Rejected,
    /// Desired state diverges from reported state.
    Delta,
}

/// Topic names for one thing's shadow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowTopics {
    prefix: String,
}

impl ShadowTopics {
    /// Topics under `$aws/things/<thing_name>/shadow`.
    #[must_use]
    pub fn new(thing_name: &str) -> Self {
        Self {
            prefix: format!("$aws/things/{thing_name}/shadow"),
        }
    }

    /// Topic a request for `operation` is published to.
    #[must_use]
    pub fn request(&self, operation: ShadowOperation) -> String {
        format!("{}/{operation}", self.prefix)
    }

    /// Every topic the device subscribes to, delta last.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        let mut topics: Vec<String> = ShadowOperation::ALL
            .into_iter()
            .flat_map(|operation| {
                ["accepted", "rejected"]
                    .into_iter()
                    .map(move |outcome| format!("{}/{operation}/{outcome}", self.prefix))
            })
            .collect();
        topics.push(format!("{}/update/delta", self.prefix));
        topics
    }

    /// Classifies an inbound topic by its suffix.
    ///
    /// Returns `None` for topics outside this shadow.
    #[must_use]
    pub fn classify(&self, topic: &str) -> Option<(ShadowOperation, ResponseKind)> {
        let suffix = topic.strip_prefix(self.prefix.as_str())?.strip_prefix('/')?;
        let (operation, outcome) = suffix.split_once('/')?;
        let operation = ShadowOperation::parse(operation)?;
        let response = match outcome {
            "accepted" => ResponseKind::Accepted,
            "rejected" => ResponseKind::Rejected,
            "delta" if operation == ShadowOperation::Update => ResponseKind::Delta,
            _ => return None,
        };
        Some((operation, response))
    }
}
