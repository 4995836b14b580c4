use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The label KubeVirt puts on launcher pods to name the owning VMI by UID.
pub const CREATED_BY_LABEL: &str = "kubevirt.io/created-by";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The subset of `metadata` shared by every manifest.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ObjectMeta {
    /// The object name.
    pub name: Option<String>,

    /// The object namespace.
    pub namespace: Option<String>,

    /// The object UID.
    pub uid: Option<String>,

    /// When the object was created.
    pub creation_timestamp: Option<DateTime<Utc>>,

    /// The object labels.
    pub labels: BTreeMap<String, String>,

    /// The owners of the object.
    pub owner_references: Vec<OwnerReference>,
}

/// A reference to an owning object.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OwnerReference {
    /// The owner kind.
    pub kind: String,

    /// The owner name.
    pub name: String,

    /// The owner UID.
    pub uid: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ObjectMeta {
    /// The UID, or a decode failure reason if it is missing.
    pub fn required_uid(&self) -> Result<String, String> {
        non_empty(&self.uid).ok_or_else(|| "metadata.uid is missing".to_string())
    }

    /// The name, or a decode failure reason if it is missing.
    pub fn required_name(&self) -> Result<String, String> {
        non_empty(&self.name).ok_or_else(|| "metadata.name is missing".to_string())
    }

    /// The creation timestamp, or a decode failure reason if it is missing.
    pub fn required_creation_timestamp(&self) -> Result<DateTime<Utc>, String> {
        self.creation_timestamp
            .ok_or_else(|| "metadata.creationTimestamp is missing".to_string())
    }

    /// The namespace, empty for cluster-scoped objects.
    pub fn namespace(&self) -> String {
        self.namespace.clone().unwrap_or_default()
    }

    /// The value of a label, if set and non-empty.
    pub fn label(&self, key: &str) -> Option<String> {
        self.labels.get(key).filter(|v| !v.is_empty()).cloned()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}
