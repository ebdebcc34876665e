//! Decomposition of a discovery document into connectable candidates.
//!
//! A discovery document lists groups; each group carries one or more cores,
//! each core one or more connectivity entries, and the group lists the trust
//! anchors that validate its cores. The catalog flattens this into an ordered
//! candidate list plus a per-group anchor set.

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

use crate::discovery::DiscoveryResponse;

/// Reasons a discovery document cannot be turned into a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The document is not valid JSON of the expected shape.
    #[error("discovery document is malformed: {source}")]
    Parse {
        /// Underlying decoder error.
        #[source]
        source: serde_json::Error,
    },
    /// The document lists no connectivity entries.
    #[error("discovery document contains no connectivity candidates")]
    NoCandidates,
    /// No candidate's group carries a trust anchor.
    #[error("no group with connectivity candidates carries trust anchors")]
    MissingAnchors,
}

/// One connectable gateway endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityCandidate {
    id: String,
    group: String,
    host: String,
    port: u16,
    core_name: String,
    metadata: Option<String>,
}

impl ConnectivityCandidate {
    /// Builds a candidate without metadata.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        group: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        core_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            group: group.into(),
            host: host.into(),
            port,
            core_name: core_name.into(),
            metadata: None,
        }
    }

    /// Attaches free-form metadata reported by discovery.
    #[must_use]
    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    /// Ordering key.
    #[must_use]
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Group whose anchors validate this endpoint.
    #[must_use]
    pub fn group(&self) -> &str {
        self.group.as_str()
    }

    /// Host address.
    #[must_use]
    pub fn host(&self) -> &str {
        self.host.as_str()
    }

    /// Port number.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Name of the core serving this endpoint.
    #[must_use]
    pub fn core_name(&self) -> &str {
        self.core_name.as_str()
    }

    /// Metadata reported by discovery, if any.
    #[must_use]
    pub fn metadata(&self) -> Option<&str> {
        self.metadata.as_deref()
    }
}

/// PEM trust anchors keyed by group, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustAnchorSet {
    by_group: BTreeMap<String, Vec<String>>,
}

impl TrustAnchorSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends anchors for `group`.
    pub fn extend_group<I>(&mut self, group: impl Into<String>, anchors: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.by_group.entry(group.into()).or_default().extend(anchors);
    }

    /// Anchors for `group`; empty when the group is unknown.
    #[must_use]
    pub fn for_group(&self, group: &str) -> &[String] {
        self.by_group
            .get(group)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Iterates groups with their anchors.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.by_group
            .iter()
            .map(|(group, anchors)| (group.as_str(), anchors.as_slice()))
    }
}

/// Ordered candidates plus their trust anchors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointCatalog {
    candidates: Vec<ConnectivityCandidate>,
    anchors: TrustAnchorSet,
}

impl EndpointCatalog {
    /// Decomposes a raw discovery document.
    pub fn build_from(response: &DiscoveryResponse) -> Result<Self, CatalogError> {
        let payload: DiscoveryPayload = serde_json::from_str(response.raw())
            .map_err(|source| CatalogError::Parse { source })?;

        let mut candidates = Vec::new();
        let mut anchors = TrustAnchorSet::new();
        for group in payload.groups {
            for core in &group.cores {
                for entry in &core.connectivity {
                    let mut candidate = ConnectivityCandidate::new(
                        entry.id.clone(),
                        group.group_id.clone(),
                        entry.host_address.clone(),
                        entry.port_number,
                        core.thing_arn.clone(),
                    );
                    if let Some(metadata) = entry.metadata.as_deref().filter(|m| !m.is_empty()) {
                        candidate = candidate.with_metadata(metadata);
                    }
                    candidates.push(candidate);
                }
            }
            anchors.extend_group(group.group_id, group.certificate_authorities);
        }

        Self::from_parts(candidates, anchors)
    }

    /// Validates and orders already-decoded parts.
    ///
    /// Candidates are stably sorted by identifier so equal identifiers keep
    /// their discovery order. A candidate whose group has no anchors is kept;
    /// connecting simply has nothing to try for it.
    pub fn from_parts(
        mut candidates: Vec<ConnectivityCandidate>,
        anchors: TrustAnchorSet,
    ) -> Result<Self, CatalogError> {
        if candidates.is_empty() {
            return Err(CatalogError::NoCandidates);
        }
        if candidates
            .iter()
            .all(|candidate| anchors.for_group(candidate.group()).is_empty())
        {
            return Err(CatalogError::MissingAnchors);
        }
        candidates.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(Self {
            candidates,
            anchors,
        })
    }

    /// Candidates in connect order.
    #[must_use]
    pub fn candidates(&self) -> &[ConnectivityCandidate] {
        &self.candidates
    }

    /// Trust anchors keyed by group.
    #[must_use]
    pub fn anchors(&self) -> &TrustAnchorSet {
        &self.anchors
    }
}

#[derive(Debug, Deserialize)]
struct DiscoveryPayload {
    #[serde(rename = "GGGroups")]
    groups: Vec<GroupPayload>,
}

#[derive(Debug, Deserialize)]
struct GroupPayload {
    #[serde(rename = "GGGroupId")]
    group_id: String,
    #[serde(rename = "Cores", default)]
    cores: Vec<CorePayload>,
    #[serde(rename = "CAs", default)]
    certificate_authorities: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CorePayload {
    #[serde(rename = "thingArn")]
    thing_arn: String,
    #[serde(rename = "Connectivity", default)]
    connectivity: Vec<ConnectivityPayload>,
}

#[derive(Debug, Deserialize)]
struct ConnectivityPayload {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "HostAddress")]
    host_address: String,
    #[serde(rename = "PortNumber")]
    port_number: u16,
    #[serde(rename = "Metadata", default)]
    metadata: Option<String>,
}
