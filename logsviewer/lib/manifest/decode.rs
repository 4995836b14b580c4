use std::path::Path;

use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

use crate::{
    models::{Record, RecordKind},
    LogsViewerError, LogsViewerResult,
};

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// A typed manifest view that can be turned into a canonical record.
pub trait Manifest: DeserializeOwned {
    /// The record kind this manifest produces.
    const KIND: RecordKind;

    /// Builds the canonical record, keeping `content` as the opaque manifest.
    ///
    /// Returns the reason as a string when a required field is missing.
    fn into_record(self, content: Value) -> Result<Record, String>;
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Splits a YAML file into the objects it holds.
///
/// The file may be a single object, a `List` wrapping `items`, or a stream of `---` separated
/// documents, each of which may itself be a list. Empty documents are skipped.
pub fn decode_documents(bytes: &[u8]) -> Result<Vec<Value>, serde_yaml::Error> {
    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_slice(bytes) {
        match Value::deserialize(document)? {
            Value::Null => continue,
            Value::Object(mut map) if matches!(map.get("items"), Some(Value::Array(_))) => {
                if let Some(Value::Array(items)) = map.remove("items") {
                    objects.extend(items.into_iter().filter(|item| !item.is_null()));
                }
            }
            other => objects.push(other),
        }
    }

    Ok(objects)
}

/// Decodes every object in a manifest file into a canonical record of kind `M`.
///
/// Any failure, whether in YAML parsing or in one of the objects, fails the whole file.
pub fn decode_manifests<M: Manifest>(path: &Path, bytes: &[u8]) -> LogsViewerResult<Vec<Record>> {
    let decode_error = |reason: String| LogsViewerError::ManifestDecode {
        path: path.to_path_buf(),
        reason,
    };

    let objects = decode_documents(bytes).map_err(|e| decode_error(e.to_string()))?;

    let mut records = Vec::with_capacity(objects.len());
    for content in objects {
        let view = M::deserialize(&content).map_err(|e| decode_error(e.to_string()))?;
        records.push(view.into_record(content).map_err(decode_error)?);
    }

    Ok(records)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::manifest::PodManifest;

    const POD_A: &str = r#"
apiVersion: v1
kind: Pod
metadata:
  name: virt-launcher-a
  namespace: default
  uid: pod-a
  creationTimestamp: "2024-01-01T10:00:00Z"
spec:
  nodeName: node-a
  containers:
    - name: compute
"#;

    #[test]
    fn test_decode_single_object() -> anyhow::Result<()> {
        let objects = decode_documents(POD_A.as_bytes())?;
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0]["metadata"]["uid"], "pod-a");
        Ok(())
    }

    #[test]
    fn test_decode_list_and_stream() -> anyhow::Result<()> {
        let yaml = r#"
apiVersion: v1
kind: List
items:
  - metadata: {uid: one}
  - metadata: {uid: two}
---
metadata: {uid: three}
---
"#;
        let objects = decode_documents(yaml.as_bytes())?;
        let uids: Vec<_> = objects
            .iter()
            .map(|o| o["metadata"]["uid"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(uids, vec!["one", "two", "three"]);
        Ok(())
    }

    #[test]
    fn test_decode_manifests_reports_path() {
        let path = PathBuf::from("namespaces/default/pods/broken/broken.yaml");
        let err = decode_manifests::<PodManifest>(&path, b"metadata: [unterminated")
            .expect_err("malformed yaml must fail");
        match err {
            LogsViewerError::ManifestDecode { path: p, .. } => assert_eq!(p, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decode_manifests_requires_uid() {
        let yaml = POD_A.replace("  uid: pod-a\n", "");
        let err = decode_manifests::<PodManifest>(Path::new("pod.yaml"), yaml.as_bytes())
            .expect_err("missing uid must fail");
        assert!(err.to_string().contains("metadata.uid"));
    }
}
