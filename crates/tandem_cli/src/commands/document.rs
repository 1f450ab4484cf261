//! Snapshot documents read from disk.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tandem_core::{
    BatchFingerprint, Entity, NodeIdentity, PermissionGrant, Snapshot, Uid,
};
use thiserror::Error;

/// Errors raised while loading a snapshot document.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// Document path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not a valid snapshot document.
    #[error("invalid snapshot document {path}: {source}")]
    Parse {
        /// Document path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
}

/// JSON form of one side's snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotDocument {
    /// Node display name; defaults to the file stem.
    #[serde(default)]
    pub node: Option<String>,
    /// Node identity; random when absent.
    #[serde(default)]
    pub node_uid: Option<Uid>,
    /// Objects held by the node.
    #[serde(default)]
    pub objects: Vec<Entity>,
    /// Parent → children.
    #[serde(default)]
    pub dependencies: BTreeMap<Uid, Vec<Uid>>,
    /// Permission grants.
    #[serde(default)]
    pub permissions: Vec<PermissionGrant>,
    /// Batches previously ignored on this node.
    #[serde(default)]
    pub ignored: BTreeMap<Uid, BatchFingerprint>,
}

impl SnapshotDocument {
    /// Parses a document from JSON text.
    pub fn from_json(path: &Path, text: &str) -> Result<Self, DocumentError> {
        serde_json::from_str(text).map_err(|source| DocumentError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Converts the document into a snapshot.
    pub fn into_snapshot(self, default_name: &str) -> Snapshot {
        let name = self.node.unwrap_or_else(|| default_name.to_string());
        let node = match self.node_uid {
            Some(uid) => NodeIdentity::with_uid(uid, name),
            None => NodeIdentity::new(name),
        };

        let mut builder = Snapshot::builder(node).objects(self.objects);
        for (parent, children) in self.dependencies {
            builder = builder.depends_all(parent, children);
        }
        for grant in self.permissions {
            builder = builder.grant(grant);
        }
        for (root, fingerprint) in self.ignored {
            builder = builder.ignore(root, fingerprint);
        }
        builder.build()
    }
}

/// Reads a document and converts it into a snapshot named after the file.
pub fn load_snapshot(path: &Path) -> Result<Snapshot, DocumentError> {
    let text = std::fs::read_to_string(path).map_err(|source| DocumentError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let default_name = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("snapshot");
    let snapshot = SnapshotDocument::from_json(path, &text)?.into_snapshot(default_name);
    tracing::debug!(path = %path.display(), objects = snapshot.len(), "loaded snapshot");
    Ok(snapshot)
}
