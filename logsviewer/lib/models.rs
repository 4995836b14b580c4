//! Canonical records stored for each ingested resource, and the correlation bundle handed to
//! query builders.

use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

//--------------------------------------------------------------------------------------------------
// Types: Records
//--------------------------------------------------------------------------------------------------

/// A pod snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    /// The pod UID, used as identity.
    pub uuid: String,

    /// The manifest kind, normally `Pod`.
    pub kind: String,

    /// The pod name.
    pub name: String,

    /// The pod namespace.
    pub namespace: String,

    /// The pod phase.
    pub phase: String,

    /// Number of containers whose runtime state is running.
    pub active_containers: i64,

    /// Number of containers declared in the spec.
    pub total_containers: i64,

    /// The node the pod was scheduled on.
    pub node_name: String,

    /// When the pod was created.
    pub creation_time: DateTime<Utc>,

    /// Comma-joined names of the persistent volume claims the pod mounts.
    pub pvcs: String,

    /// UID of the virtual machine instance that created this pod, taken from the owner label.
    pub created_by: Option<String>,

    /// The full original manifest.
    pub content: serde_json::Value,
}

/// A node snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// The node name, used as identity.
    pub name: String,

    /// The machine system UUID.
    pub system_uuid: String,

    /// `Ready` or `NotReady`.
    pub status: String,

    /// The `InternalIP` address.
    pub internal_ip: String,

    /// The `Hostname` address.
    pub hostname: String,

    /// The OS image.
    pub os_image: String,

    /// The kernel version.
    pub kernel_version: String,

    /// The kubelet version.
    pub kubelet_version: String,

    /// The container runtime version.
    pub container_runtime_version: String,

    /// The full original manifest.
    pub content: serde_json::Value,
}

/// A virtual machine snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachine {
    /// The VM UID.
    pub uuid: String,

    /// The VM name.
    pub name: String,

    /// The VM namespace.
    pub namespace: String,

    /// Whether the VM is requested to run.
    pub running: bool,

    /// Whether the VMI for this VM exists.
    pub created: bool,

    /// Whether the VMI for this VM is ready.
    pub ready: bool,

    /// The printable status.
    pub status: String,

    /// The full original manifest.
    pub content: serde_json::Value,
}

/// A virtual machine instance snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineInstance {
    /// The VMI UID.
    pub uuid: String,

    /// The VMI name.
    pub name: String,

    /// The VMI namespace.
    pub namespace: String,

    /// The status reason.
    pub reason: String,

    /// The VMI phase.
    pub phase: String,

    /// The node currently running the VMI.
    pub node_name: String,

    /// When the VMI was created.
    pub creation_time: DateTime<Utc>,

    /// The migration state surfaced in the VMI status, if any.
    pub migration_state: Option<MigrationState>,

    /// The full original manifest.
    pub content: serde_json::Value,
}

/// The migration state a VMI status carries while or after it migrates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationState {
    /// UID of the migration object.
    pub migration_uid: String,

    /// The launcher pod the VMI moves to.
    pub target_pod: Option<String>,

    /// The node the VMI moves from.
    pub source_node: Option<String>,

    /// The node the VMI moves to.
    pub target_node: Option<String>,

    /// When the migration started.
    pub start_timestamp: Option<DateTime<Utc>>,

    /// When the migration ended.
    pub end_timestamp: Option<DateTime<Utc>>,

    /// Whether the migration completed.
    pub completed: bool,

    /// Whether the migration failed.
    pub failed: bool,
}

/// A virtual machine instance migration snapshot.
///
/// Rows are written both from explicit migration manifests and from the migration state embedded
/// in a VMI status; fields unknown to one path are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMachineInstanceMigration {
    /// The migration UID.
    pub uuid: String,

    /// The migration name.
    pub name: Option<String>,

    /// The migration namespace.
    pub namespace: String,

    /// The migration phase.
    pub phase: Option<String>,

    /// Name of the migrated VMI.
    pub vmi_name: String,

    /// When the migration object was created.
    pub creation_time: Option<DateTime<Utc>>,

    /// The launcher pod the VMI moves to.
    pub target_pod: Option<String>,

    /// The node the VMI moves from.
    pub source_node: Option<String>,

    /// The node the VMI moves to.
    pub target_node: Option<String>,

    /// When the migration started.
    pub start_timestamp: Option<DateTime<Utc>>,

    /// When the migration ended.
    pub end_timestamp: Option<DateTime<Utc>>,

    /// Whether the migration completed.
    pub completed: Option<bool>,

    /// Whether the migration failed.
    pub failed: Option<bool>,

    /// The full original manifest, absent for rows derived from a VMI.
    pub content: Option<serde_json::Value>,
}

/// A persistent volume claim snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeClaim {
    /// The claim UID.
    pub uuid: String,

    /// The claim name.
    pub name: String,

    /// The claim namespace.
    pub namespace: String,

    /// Comma-joined access modes.
    pub access_modes: String,

    /// The storage class.
    pub storage_class_name: String,

    /// The bound volume.
    pub volume_name: String,

    /// `Filesystem` or `Block`.
    pub volume_mode: String,

    /// The claim phase.
    pub phase: String,

    /// The bound storage capacity.
    pub capacity: String,

    /// When the claim was created.
    pub creation_time: Option<DateTime<Utc>>,

    /// The full original manifest.
    pub content: serde_json::Value,
}

/// An operator subscription snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// The subscription UID.
    pub uuid: String,

    /// The subscribed package.
    pub name: String,

    /// The subscription namespace.
    pub namespace: String,

    /// The catalog source.
    pub source: String,

    /// The catalog source namespace.
    pub source_namespace: String,

    /// The CSV the subscription started from.
    pub starting_csv: String,

    /// The current CSV.
    pub current_csv: String,

    /// The installed CSV.
    pub installed_csv: String,

    /// The subscription state.
    pub state: String,

    /// When the subscription was created.
    pub creation_time: Option<DateTime<Utc>>,

    /// The full original manifest.
    pub content: serde_json::Value,
}

/// A processed archive in the import ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedMustGather {
    /// The archive file name.
    pub name: String,

    /// When the archive was imported.
    pub import_time: DateTime<Utc>,

    /// When the archive was gathered.
    pub gather_time: DateTime<Utc>,
}

/// Any canonical record the persistence queue can store.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// A pod.
    Pod(Pod),

    /// A node.
    Node(Node),

    /// A virtual machine.
    VirtualMachine(VirtualMachine),

    /// A virtual machine instance.
    VirtualMachineInstance(VirtualMachineInstance),

    /// A virtual machine instance migration.
    Migration(VirtualMachineInstanceMigration),

    /// A persistent volume claim.
    PersistentVolumeClaim(PersistentVolumeClaim),

    /// An operator subscription.
    Subscription(Subscription),

    /// An import ledger entry.
    ImportedMustGather(ImportedMustGather),
}

/// The resource kinds kept in the store, one table each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// Pods.
    Pod,

    /// Nodes.
    Node,

    /// Virtual machines.
    Vm,

    /// Virtual machine instances.
    Vmi,

    /// Virtual machine instance migrations.
    Migration,

    /// Persistent volume claims.
    Pvc,

    /// Operator subscriptions.
    Subscription,

    /// Import ledger entries.
    ImportedMustGather,
}

/// The identity of a record: its kind plus its per-kind key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    /// The record kind.
    pub kind: RecordKind,

    /// The UUID, or the name for nodes and ledger entries.
    pub id: String,
}

//--------------------------------------------------------------------------------------------------
// Types: Queries
//--------------------------------------------------------------------------------------------------

/// Everything the resolver correlated for one workload event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResults {
    /// The namespace of the workload.
    pub namespace: String,

    /// UID of the source (or only) launcher pod.
    pub source_pod_uuid: String,

    /// UID of the migration target pod.
    pub target_pod_uuid: String,

    /// UID of the virtual machine instance.
    pub vmi_uuid: String,

    /// UID of the migration.
    pub migration_uuid: String,

    /// Name of the source (or only) launcher pod.
    pub source_pod: String,

    /// Name of the migration target pod.
    pub target_pod: String,

    /// Window start, already moved back by the lead time.
    pub start_timestamp: Option<DateTime<Utc>>,

    /// Window end; `None` means open-ended ("to now").
    pub end_timestamp: Option<DateTime<Utc>>,

    /// Name of the virt-handler on the source node.
    pub source_handler: String,

    /// Name of the virt-handler on the target node.
    pub target_handler: String,

    /// UIDs of the persistent volume claims attached to the workload.
    pub pvcs: Vec<String>,

    /// Every launcher pod the VMI ever had, oldest first.
    pub involved_virt_launchers: Vec<Pod>,

    /// The virt-handler of every node the VMI visited.
    pub involved_virt_handlers: Vec<Pod>,

    /// Nodes the VMI visited for which no virt-handler was found.
    #[serde(default)]
    pub skipped_nodes: Vec<String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl VirtualMachineInstance {
    /// The migration row implied by this VMI's status, if it carries a migration state.
    pub fn derived_migration(&self) -> Option<VirtualMachineInstanceMigration> {
        let state = self.migration_state.as_ref()?;
        if state.migration_uid.is_empty() {
            return None;
        }

        Some(VirtualMachineInstanceMigration {
            uuid: state.migration_uid.clone(),
            name: None,
            namespace: self.namespace.clone(),
            phase: None,
            vmi_name: self.name.clone(),
            creation_time: None,
            target_pod: state.target_pod.clone(),
            source_node: state.source_node.clone(),
            target_node: state.target_node.clone(),
            start_timestamp: state.start_timestamp,
            end_timestamp: state.end_timestamp,
            completed: Some(state.completed),
            failed: Some(state.failed),
            content: None,
        })
    }
}

impl Pod {
    /// The PVC names this pod mounts.
    pub fn pvc_names(&self) -> impl Iterator<Item = &str> {
        self.pvcs.split(',').map(str::trim).filter(|s| !s.is_empty())
    }
}

impl Record {
    /// The identity of the record.
    pub fn key(&self) -> RecordKey {
        let (kind, id) = match self {
            Record::Pod(r) => (RecordKind::Pod, &r.uuid),
            Record::Node(r) => (RecordKind::Node, &r.name),
            Record::VirtualMachine(r) => (RecordKind::Vm, &r.uuid),
            Record::VirtualMachineInstance(r) => (RecordKind::Vmi, &r.uuid),
            Record::Migration(r) => (RecordKind::Migration, &r.uuid),
            Record::PersistentVolumeClaim(r) => (RecordKind::Pvc, &r.uuid),
            Record::Subscription(r) => (RecordKind::Subscription, &r.uuid),
            Record::ImportedMustGather(r) => (RecordKind::ImportedMustGather, &r.name),
        };

        RecordKey {
            kind,
            id: id.clone(),
        }
    }
}

impl RecordKind {
    /// All kinds, in the order stats are reported.
    pub const ALL: [RecordKind; 8] = [
        RecordKind::Pod,
        RecordKind::Node,
        RecordKind::Vm,
        RecordKind::Vmi,
        RecordKind::Migration,
        RecordKind::Pvc,
        RecordKind::Subscription,
        RecordKind::ImportedMustGather,
    ];

    /// The short name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Pod => "pod",
            RecordKind::Node => "node",
            RecordKind::Vm => "vm",
            RecordKind::Vmi => "vmi",
            RecordKind::Migration => "migration",
            RecordKind::Pvc => "pvc",
            RecordKind::Subscription => "subscription",
            RecordKind::ImportedMustGather => "importedmustgather",
        }
    }

    /// The table holding records of this kind.
    pub fn table(&self) -> &'static str {
        match self {
            RecordKind::Pod => "pods",
            RecordKind::Node => "nodes",
            RecordKind::Vm => "vms",
            RecordKind::Vmi => "vmis",
            RecordKind::Migration => "vmimigrations",
            RecordKind::Pvc => "pvcs",
            RecordKind::Subscription => "subscriptions",
            RecordKind::ImportedMustGather => "imported_must_gathers",
        }
    }

    /// The identity column of the kind's table.
    pub fn key_column(&self) -> &'static str {
        match self {
            RecordKind::Node | RecordKind::ImportedMustGather => "name",
            _ => "uuid",
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

impl std::str::FromStr for RecordKind {
    type Err = crate::LogsViewerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| crate::LogsViewerError::InvalidArgument(format!("unknown kind: {s}")))
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn vmi_with_state(state: Option<MigrationState>) -> VirtualMachineInstance {
        VirtualMachineInstance {
            uuid: "vmi-1".to_string(),
            name: "fedora".to_string(),
            namespace: "default".to_string(),
            reason: String::new(),
            phase: "Running".to_string(),
            node_name: "node-b".to_string(),
            creation_time: Utc::now(),
            migration_state: state,
            content: serde_json::json!({}),
        }
    }

    #[test]
    fn test_derived_migration_from_vmi_state() {
        let vmi = vmi_with_state(Some(MigrationState {
            migration_uid: "mig-1".to_string(),
            target_pod: Some("virt-launcher-fedora-xyz".to_string()),
            source_node: Some("node-a".to_string()),
            target_node: Some("node-b".to_string()),
            start_timestamp: None,
            end_timestamp: None,
            completed: true,
            failed: false,
        }));

        let derived = vmi.derived_migration().expect("derived migration");
        assert_eq!(derived.uuid, "mig-1");
        assert_eq!(derived.vmi_name, "fedora");
        assert_eq!(derived.namespace, "default");
        assert_eq!(derived.completed, Some(true));
        assert!(derived.name.is_none());
        assert!(derived.content.is_none());
    }

    #[test]
    fn test_no_derived_migration_without_uid() {
        assert!(vmi_with_state(None).derived_migration().is_none());

        let vmi = vmi_with_state(Some(MigrationState {
            migration_uid: String::new(),
            target_pod: None,
            source_node: None,
            target_node: None,
            start_timestamp: None,
            end_timestamp: None,
            completed: false,
            failed: false,
        }));
        assert!(vmi.derived_migration().is_none());
    }

    #[test]
    fn test_record_kind_parse() {
        assert_eq!("vmi".parse::<RecordKind>().unwrap(), RecordKind::Vmi);
        assert!("deployment".parse::<RecordKind>().is_err());
    }
}
