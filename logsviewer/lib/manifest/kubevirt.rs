use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::models::{
    MigrationState, Record, RecordKind, VirtualMachine, VirtualMachineInstance,
    VirtualMachineInstanceMigration,
};

use super::{Manifest, ObjectMeta};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A `kubevirt.io/VirtualMachine` manifest.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VirtualMachineManifest {
    /// The VM metadata.
    pub metadata: ObjectMeta,

    /// The VM spec.
    pub spec: VirtualMachineSpec,

    /// The VM status.
    pub status: VirtualMachineStatus,
}

/// The parts of a VM spec used for summaries.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VirtualMachineSpec {
    /// The legacy run switch.
    pub running: Option<bool>,

    /// The run strategy, used when `running` is absent.
    pub run_strategy: Option<String>,
}

/// The parts of a VM status used for summaries.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VirtualMachineStatus {
    /// Whether the VMI exists.
    pub created: bool,

    /// Whether the VMI is ready.
    pub ready: bool,

    /// The printable status.
    pub printable_status: String,
}

/// A `kubevirt.io/VirtualMachineInstance` manifest.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VirtualMachineInstanceManifest {
    /// The VMI metadata.
    pub metadata: ObjectMeta,

    /// The VMI status.
    pub status: VirtualMachineInstanceStatus,
}

/// The parts of a VMI status used for summaries.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VirtualMachineInstanceStatus {
    /// The status reason.
    pub reason: String,

    /// The VMI phase.
    pub phase: String,

    /// The node running the VMI.
    pub node_name: String,

    /// The state of the current or last migration.
    pub migration_state: Option<MigrationStateManifest>,
}

/// The `migrationState` block of a VMI or migration status.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MigrationStateManifest {
    /// UID of the migration object.
    pub migration_uid: String,

    /// The target launcher pod.
    pub target_pod: Option<String>,

    /// The source node.
    pub source_node: Option<String>,

    /// The target node.
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

/// A `kubevirt.io/VirtualMachineInstanceMigration` manifest.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MigrationManifest {
    /// The migration metadata.
    pub metadata: ObjectMeta,

    /// The migration spec.
    pub spec: MigrationSpec,

    /// The migration status.
    pub status: MigrationStatus,
}

/// The migration spec.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MigrationSpec {
    /// Name of the VMI to migrate.
    pub vmi_name: String,
}

/// The parts of a migration status used for summaries.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MigrationStatus {
    /// The migration phase.
    pub phase: Option<String>,

    /// The migration state, once the handler started it.
    pub migration_state: Option<MigrationStateManifest>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl VirtualMachineSpec {
    /// Whether the VM is requested to run.
    pub fn is_running(&self) -> bool {
        self.running.unwrap_or_else(|| {
            matches!(
                self.run_strategy.as_deref(),
                Some("Always") | Some("RerunOnFailure")
            )
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Manifest for VirtualMachineManifest {
    const KIND: RecordKind = RecordKind::Vm;

    fn into_record(self, content: Value) -> Result<Record, String> {
        Ok(Record::VirtualMachine(VirtualMachine {
            uuid: self.metadata.required_uid()?,
            name: self.metadata.required_name()?,
            namespace: self.metadata.namespace(),
            running: self.spec.is_running(),
            created: self.status.created,
            ready: self.status.ready,
            status: self.status.printable_status,
            content,
        }))
    }
}

impl Manifest for VirtualMachineInstanceManifest {
    const KIND: RecordKind = RecordKind::Vmi;

    fn into_record(self, content: Value) -> Result<Record, String> {
        Ok(Record::VirtualMachineInstance(VirtualMachineInstance {
            uuid: self.metadata.required_uid()?,
            name: self.metadata.required_name()?,
            namespace: self.metadata.namespace(),
            reason: self.status.reason,
            phase: self.status.phase,
            node_name: self.status.node_name,
            creation_time: self.metadata.required_creation_timestamp()?,
            migration_state: self.status.migration_state.map(MigrationState::from),
            content,
        }))
    }
}

impl Manifest for MigrationManifest {
    const KIND: RecordKind = RecordKind::Migration;

    fn into_record(self, content: Value) -> Result<Record, String> {
        let state = self.status.migration_state;

        Ok(Record::Migration(VirtualMachineInstanceMigration {
            uuid: self.metadata.required_uid()?,
            name: Some(self.metadata.required_name()?),
            namespace: self.metadata.namespace(),
            phase: self.status.phase,
            vmi_name: self.spec.vmi_name,
            creation_time: self.metadata.creation_timestamp,
            target_pod: state.as_ref().and_then(|s| s.target_pod.clone()),
            source_node: state.as_ref().and_then(|s| s.source_node.clone()),
            target_node: state.as_ref().and_then(|s| s.target_node.clone()),
            start_timestamp: state.as_ref().and_then(|s| s.start_timestamp),
            end_timestamp: state.as_ref().and_then(|s| s.end_timestamp),
            completed: state.as_ref().map(|s| s.completed),
            failed: state.as_ref().map(|s| s.failed),
            content: Some(content),
        }))
    }
}

impl From<MigrationStateManifest> for MigrationState {
    fn from(state: MigrationStateManifest) -> Self {
        MigrationState {
            migration_uid: state.migration_uid,
            target_pod: state.target_pod,
            source_node: state.source_node,
            target_node: state.target_node,
            start_timestamp: state.start_timestamp,
            end_timestamp: state.end_timestamp,
            completed: state.completed,
            failed: state.failed,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
