//! Shadow documents and the merge rules applied to server payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `{ "state": { "reported": {...}, "desired": {...} }, "version": n }`.
///
/// Documents built locally only carry `reported`; `desired` is populated by
/// merging server payloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShadowDocument {
    #[serde(default)]
    state: ShadowState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ShadowState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reported: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    desired: Option<Map<String, Value>>,
}

impl ShadowDocument {
    /// Builds a reported-state fragment carrying `token` under `key`.
    #[must_use]
    pub fn reporting(key: &str, token: &str) -> Self {
        let mut reported = Map::new();
        reported.insert(key.to_owned(), Value::String(token.to_owned()));
        Self {
            state: ShadowState {
                reported: Some(reported),
                desired: None,
            },
            version: None,
        }
    }

    /// Decodes a document from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Encodes the document as JSON bytes.
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Reported section, if any.
    #[must_use]
    pub fn reported(&self) -> Option<&Map<String, Value>> {
        self.state.reported.as_ref()
    }

    /// Desired section, if any.
    #[must_use]
    pub fn desired(&self) -> Option<&Map<String, Value>> {
        self.state.desired.as_ref()
    }

    /// Document version reported by the service.
    #[must_use]
    pub fn version(&self) -> Option<u64> {
        self.version
    }

    /// Reported token under `key`.
    #[must_use]
    pub fn reported_token(&self, key: &str) -> Option<String> {
        self.reported().and_then(|section| token_at(section, key))
    }

    /// Desired token under `key`.
    ///
    /// Numbers are rendered in their JSON form so `{"myState": 72}` yields
    /// `"72"`.
    #[must_use]
    pub fn desired_token(&self, key: &str) -> Option<String> {
        self.desired().and_then(|section| token_at(section, key))
    }

    /// Whether the document holds no state at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.reported.as_ref().is_none_or(Map::is_empty)
            && self.state.desired.as_ref().is_none_or(Map::is_empty)
    }

    /// Folds another locally staged fragment into this one.
    pub(crate) fn stage(&mut self, fragment: Self) {
        merge_section(&mut self.state.reported, fragment.state.reported);
        merge_section(&mut self.state.desired, fragment.state.desired);
    }

    /// Applies an accepted `update` payload.
    pub(crate) fn apply_accepted(&mut self, accepted: Self) {
        merge_section(&mut self.state.reported, accepted.state.reported);
        merge_section(&mut self.state.desired, accepted.state.desired);
        self.version = accepted.version.or(self.version);
    }

    /// Applies a delta payload to the desired section.
    pub(crate) fn apply_delta(&mut self, delta: DeltaDocument) {
        merge_section(&mut self.state.desired, Some(delta.state));
        self.version = delta.version.or(self.version);
    }

    /// Replaces the snapshot with the result of a `get`.
    pub(crate) fn replace(&mut self, fetched: Self) {
        *self = fetched;
    }

    /// Forgets every section after an accepted `delete`.
    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Payload published on the `update/delta` topic.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub(crate) struct DeltaDocument {
    #[serde(default)]
    state: Map<String, Value>,
    #[serde(default)]
    version: Option<u64>,
}

impl DeltaDocument {
    pub(crate) fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Error body published on a `rejected` topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ShadowRejection {
    /// Service error code.
    #[serde(default)]
    pub code: Option<u16>,
    /// Service error message.
    #[serde(default)]
    pub message: String,
}

impl ShadowRejection {
    /// Decodes a rejection, keeping undecodable bodies as the message.
    #[must_use]
    pub fn from_payload(payload: &[u8]) -> Self {
        serde_json::from_slice(payload).unwrap_or_else(|_| Self {
            code: None,
            message: String::from_utf8_lossy(payload).into_owned(),
        })
    }
}

impl std::fmt::Display for ShadowRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "{code}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

fn token_at(section: &Map<String, Value>, key: &str) -> Option<String> {
    match section.get(key)? {
        Value::String(token) => Some(token.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn merge_section(target: &mut Option<Map<String, Value>>, patch: Option<Map<String, Value>>) {
    if let Some(patch) = patch {
        merge_into(target.get_or_insert_with(Map::new), patch);
    }
}

// A null value removes the key; objects merge recursively; anything else
// replaces the existing value.
fn merge_into(target: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        match value {
            Value::Null => {
                target.remove(&key);
            }
            Value::Object(nested) => match target.get_mut(&key) {
                Some(Value::Object(existing)) => merge_into(existing, nested),
                _ => {
                    let mut fresh = Map::new();
                    merge_into(&mut fresh, nested);
                    target.insert(key, Value::Object(fresh));
                }
            },
            other => {
                target.insert(key, other);
            }
        }
    }
}
