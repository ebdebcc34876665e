//! Persistence of per-group trust anchors.

use std::collections::BTreeMap;
use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::catalog::TrustAnchorSet;

/// Errors raised while writing trust anchors.
#[derive(Debug, Error)]
pub enum AnchorError {
    /// The output directory could not be created.
    #[error("failed to create anchor directory '{path}': {source}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// An anchor file could not be written.
    #[error("failed to write trust anchor '{path}': {source}")]
    Write {
        /// File that could not be written.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A group name would escape the output directory.
    #[error("group name '{group}' cannot be used as a file name")]
    UnsafeGroupName {
        /// Offending group name.
        group: String,
    },
}

/// Anchor file paths keyed by group, in anchor index order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnchorPaths {
    by_group: BTreeMap<String, Vec<Utf8PathBuf>>,
}

impl AnchorPaths {
    /// Records the anchor files of `group`, replacing previous entries.
    pub fn insert(&mut self, group: impl Into<String>, paths: Vec<Utf8PathBuf>) {
        self.by_group.insert(group.into(), paths);
    }

    /// Anchor files of `group`; empty when the group is unknown.
    #[must_use]
    pub fn for_group(&self, group: &str) -> &[Utf8PathBuf] {
        self.by_group
            .get(group)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Writes anchors as `<group>_root_ca<n>.pem`, numbering from one.
#[derive(Debug, Clone)]
pub struct TrustAnchorStore {
    dir: Utf8PathBuf,
}

impl TrustAnchorStore {
    /// Builds a store rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of anchor `index` (zero-based) for `group`.
    #[must_use]
    pub fn anchor_path(&self, group: &str, index: usize) -> Utf8PathBuf {
        self.dir.join(format!("{group}_root_ca{}.pem", index + 1))
    }

    /// Truncates and rewrites every anchor in `anchors`.
    pub fn persist(&self, anchors: &TrustAnchorSet) -> Result<AnchorPaths, AnchorError> {
        fs::create_dir_all(&self.dir).map_err(|source| AnchorError::CreateDirectory {
            path: self.dir.clone(),
            source,
        })?;

        let mut paths = AnchorPaths::default();
        for (group, pems) in anchors.iter() {
            ensure_safe_group(group)?;
            let mut written = Vec::with_capacity(pems.len());
            for (index, pem) in pems.iter().enumerate() {
                let path = self.anchor_path(group, index);
                write_anchor(&path, pem)?;
                written.push(path);
            }
            paths.insert(group, written);
        }
        Ok(paths)
    }
}

fn ensure_safe_group(group: &str) -> Result<(), AnchorError> {
    let unsafe_name =
        group.is_empty() || group == "." || group == ".." || group.contains(['/', '\\']);
    if unsafe_name {
        return Err(AnchorError::UnsafeGroupName {
            group: group.to_owned(),
        });
    }
    Ok(())
}

fn write_anchor(path: &Utf8Path, pem: &str) -> Result<(), AnchorError> {
    fs::write(path, pem.as_bytes()).map_err(|source| AnchorError::Write {
        path: path.to_path_buf(),
        source,
    })
}
