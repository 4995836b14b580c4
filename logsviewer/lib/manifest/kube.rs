use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::models::{Node, PersistentVolumeClaim, Pod, Record, RecordKind};

use super::{Manifest, ObjectMeta, CREATED_BY_LABEL};

//--------------------------------------------------------------------------------------------------
// Types: Pod
//--------------------------------------------------------------------------------------------------

/// A `v1/Pod` manifest.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PodManifest {
    /// The manifest kind.
    pub kind: Option<String>,

    /// The pod metadata.
    pub metadata: ObjectMeta,

    /// The pod spec.
    pub spec: PodSpec,

    /// The pod status.
    pub status: PodStatus,
}

/// The parts of a pod spec used for summaries.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PodSpec {
    /// The node the pod is scheduled on.
    pub node_name: String,

    /// The declared containers.
    pub containers: Vec<Container>,

    /// The declared volumes.
    pub volumes: Vec<Volume>,
}

/// A container declared in a pod spec.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Container {
    /// The container name.
    pub name: String,
}

/// A volume declared in a pod spec.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Volume {
    /// The volume name.
    pub name: String,

    /// Set when the volume is backed by a PVC.
    pub persistent_volume_claim: Option<PersistentVolumeClaimSource>,
}

/// A volume source referencing a PVC.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PersistentVolumeClaimSource {
    /// The claim name.
    pub claim_name: String,
}

/// The parts of a pod status used for summaries.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PodStatus {
    /// The pod phase.
    pub phase: String,

    /// The IP of the node hosting the pod.
    #[serde(rename = "hostIP")]
    pub host_ip: String,

    /// The runtime status of each container.
    pub container_statuses: Vec<ContainerStatus>,
}

/// The runtime status of a container.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContainerStatus {
    /// The container name.
    pub name: String,

    /// The current state; exactly one of its members is set.
    pub state: ContainerState,
}

/// The current state of a container.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContainerState {
    /// Set when the container is running.
    pub running: Option<Value>,

    /// Set when the container is waiting.
    pub waiting: Option<Value>,

    /// Set when the container terminated.
    pub terminated: Option<Value>,
}

//--------------------------------------------------------------------------------------------------
// Types: Node
//--------------------------------------------------------------------------------------------------

/// A `v1/Node` manifest.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeManifest {
    /// The node metadata.
    pub metadata: ObjectMeta,

    /// The node status.
    pub status: NodeStatus,
}

/// The parts of a node status used for summaries.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeStatus {
    /// The node conditions.
    pub conditions: Vec<NodeCondition>,

    /// The node addresses.
    pub addresses: Vec<NodeAddress>,

    /// Version and identity information reported by the kubelet.
    pub node_info: NodeSystemInfo,
}

/// A node condition.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeCondition {
    /// The condition type, e.g. `Ready`.
    #[serde(rename = "type")]
    pub kind: String,

    /// `True`, `False` or `Unknown`.
    pub status: String,
}

/// A node address.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeAddress {
    /// The address type, e.g. `InternalIP`.
    #[serde(rename = "type")]
    pub kind: String,

    /// The address.
    pub address: String,
}

/// Identity and version information of a node.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeSystemInfo {
    /// The machine system UUID.
    #[serde(rename = "systemUUID")]
    pub system_uuid: String,

    /// The OS image.
    pub os_image: String,

    /// The kernel version.
    pub kernel_version: String,

    /// The kubelet version.
    pub kubelet_version: String,

    /// The container runtime version.
    pub container_runtime_version: String,
}

//--------------------------------------------------------------------------------------------------
// Types: PersistentVolumeClaim
//--------------------------------------------------------------------------------------------------

/// A `v1/PersistentVolumeClaim` manifest.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PersistentVolumeClaimManifest {
    /// The claim metadata.
    pub metadata: ObjectMeta,

    /// The claim spec.
    pub spec: PersistentVolumeClaimSpec,

    /// The claim status.
    pub status: PersistentVolumeClaimStatus,
}

/// The parts of a claim spec used for summaries.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PersistentVolumeClaimSpec {
    /// The requested access modes.
    pub access_modes: Vec<String>,

    /// The storage class.
    pub storage_class_name: Option<String>,

    /// The bound volume.
    pub volume_name: String,

    /// `Filesystem` or `Block`.
    pub volume_mode: Option<String>,
}

/// The parts of a claim status used for summaries.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PersistentVolumeClaimStatus {
    /// The claim phase.
    pub phase: String,

    /// The bound capacity by resource name.
    pub capacity: BTreeMap<String, Value>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl PodManifest {
    /// Number of containers currently running.
    pub fn active_containers(&self) -> usize {
        self.status
            .container_statuses
            .iter()
            .filter(|status| status.state.running.is_some())
            .count()
    }

    /// Names of the PVCs mounted by the pod, in volume order.
    pub fn pvc_names(&self) -> Vec<String> {
        self.spec
            .volumes
            .iter()
            .filter_map(|volume| volume.persistent_volume_claim.as_ref())
            .map(|source| source.claim_name.clone())
            .filter(|name| !name.is_empty())
            .collect()
    }
}

impl NodeManifest {
    /// `Ready` when the `Ready` condition is true, `NotReady` otherwise.
    pub fn readiness(&self) -> &'static str {
        let ready = self
            .status
            .conditions
            .iter()
            .any(|c| c.kind == "Ready" && c.status == "True");
        if ready {
            "Ready"
        } else {
            "NotReady"
        }
    }

    /// The first address of the given type.
    pub fn address(&self, kind: &str) -> String {
        self.status
            .addresses
            .iter()
            .find(|a| a.kind == kind)
            .map(|a| a.address.clone())
            .unwrap_or_default()
    }
}

impl PersistentVolumeClaimStatus {
    /// The bound storage capacity rendered as a quantity string.
    pub fn storage(&self) -> String {
        match self.capacity.get("storage") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Manifest for PodManifest {
    const KIND: RecordKind = RecordKind::Pod;

    fn into_record(self, content: Value) -> Result<Record, String> {
        let uuid = self.metadata.required_uid()?;
        let name = self.metadata.required_name()?;
        let creation_time = self.metadata.required_creation_timestamp()?;

        Ok(Record::Pod(Pod {
            uuid,
            kind: self.kind.clone().unwrap_or_else(|| "Pod".to_string()),
            name,
            namespace: self.metadata.namespace(),
            phase: self.status.phase.clone(),
            active_containers: self.active_containers() as i64,
            total_containers: self.spec.containers.len() as i64,
            node_name: self.spec.node_name.clone(),
            creation_time,
            pvcs: self.pvc_names().join(","),
            created_by: self.metadata.label(CREATED_BY_LABEL),
            content,
        }))
    }
}

impl Manifest for NodeManifest {
    const KIND: RecordKind = RecordKind::Node;

    fn into_record(self, content: Value) -> Result<Record, String> {
        let name = self.metadata.required_name()?;
        let status = self.readiness().to_string();
        let internal_ip = self.address("InternalIP");
        let hostname = self.address("Hostname");
        let info = self.status.node_info;

        Ok(Record::Node(Node {
            name,
            system_uuid: info.system_uuid,
            status,
            internal_ip,
            hostname,
            os_image: info.os_image,
            kernel_version: info.kernel_version,
            kubelet_version: info.kubelet_version,
            container_runtime_version: info.container_runtime_version,
            content,
        }))
    }
}

impl Manifest for PersistentVolumeClaimManifest {
    const KIND: RecordKind = RecordKind::Pvc;

    fn into_record(self, content: Value) -> Result<Record, String> {
        let uuid = self.metadata.required_uid()?;
        let name = self.metadata.required_name()?;
        let capacity = self.status.storage();

        Ok(Record::PersistentVolumeClaim(PersistentVolumeClaim {
            uuid,
            name,
            namespace: self.metadata.namespace(),
            access_modes: self.spec.access_modes.join(","),
            storage_class_name: self.spec.storage_class_name.unwrap_or_default(),
            volume_name: self.spec.volume_name,
            volume_mode: self.spec.volume_mode.unwrap_or_default(),
            phase: self.status.phase,
            capacity,
            creation_time: self.metadata.creation_timestamp,
            content,
        }))
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
