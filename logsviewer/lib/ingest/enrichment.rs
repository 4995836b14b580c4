use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};

use crate::{manifest::PodManifest, models::Pod, LogsViewerResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Host and ownership data of one pod, used to enrich shipped log lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentEntry {
    /// The node the pod runs on.
    #[serde(rename = "host.name", default)]
    pub host_name: String,

    /// The IP of that node.
    #[serde(rename = "host.ip", default)]
    pub host_ip: String,

    /// The pod UID.
    #[serde(rename = "pod.uid", default)]
    pub uid: String,

    /// UIDs of the pod's owners.
    #[serde(
        rename = "pod.ownerReferences",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub owner_references: Vec<String>,
}

/// Enrichment entries keyed by `<namespace>/<name>`.
///
/// The table is loaded from its file before an import and written back afterwards, so entries
/// from earlier imports survive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnrichmentTable {
    entries: BTreeMap<String, EnrichmentEntry>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl EnrichmentEntry {
    /// Builds the entry of a pod record from its summary and its original manifest.
    pub fn from_pod(pod: &Pod) -> Self {
        let manifest = PodManifest::deserialize(&pod.content).unwrap_or_default();
        Self {
            host_name: pod.node_name.clone(),
            host_ip: manifest.status.host_ip,
            uid: pod.uuid.clone(),
            owner_references: manifest
                .metadata
                .owner_references
                .into_iter()
                .map(|owner| owner.uid)
                .filter(|uid| !uid.is_empty())
                .collect(),
        }
    }
}

impl EnrichmentTable {
    /// Loads the table from `path`. A missing file gives an empty table; an unreadable one is
    /// logged and replaced.
    pub async fn load(path: impl AsRef<Path>) -> LogsViewerResult<Self> {
        let path = path.as_ref();
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&bytes) {
            Ok(table) => Ok(table),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable enrichment data");
                Ok(Self::default())
            }
        }
    }

    /// Writes the table to `path`, creating parent directories.
    pub async fn save(&self, path: impl AsRef<Path>) -> LogsViewerResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, serde_json::to_vec(self)?).await?;
        Ok(())
    }

    /// Adds or replaces the entry of `pod`.
    pub fn insert_pod(&mut self, pod: &Pod) {
        let key = format!("{}/{}", pod.namespace, pod.name);
        self.entries.insert(key, EnrichmentEntry::from_pod(pod));
    }

    /// The entry of the pod `name` in `namespace`.
    pub fn get(&self, namespace: &str, name: &str) -> Option<&EnrichmentEntry> {
        self.entries.get(&format!("{namespace}/{name}"))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
