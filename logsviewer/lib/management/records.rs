use sqlx::{Executor, Pool, Sqlite};

use crate::{
    models::{
        ImportedMustGather, Node, PersistentVolumeClaim, Pod, Record, Subscription,
        VirtualMachine, VirtualMachineInstance, VirtualMachineInstanceMigration,
    },
    LogsViewerResult,
};

use super::record_import;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Upserts any canonical record into the table of its kind.
pub async fn upsert_record(pool: &Pool<Sqlite>, record: &Record) -> LogsViewerResult<()> {
    match record {
        Record::Pod(pod) => upsert_pod(pool, pod).await,
        Record::Node(node) => upsert_node(pool, node).await,
        Record::VirtualMachine(vm) => upsert_vm(pool, vm).await,
        Record::VirtualMachineInstance(vmi) => upsert_vmi(pool, vmi).await,
        Record::Migration(migration) => upsert_migration(pool, migration).await,
        Record::PersistentVolumeClaim(pvc) => upsert_pvc(pool, pvc).await,
        Record::Subscription(subscription) => upsert_subscription(pool, subscription).await,
        Record::ImportedMustGather(ImportedMustGather {
            name,
            import_time,
            gather_time,
        }) => record_import(pool, name, *import_time, *gather_time).await,
    }
}

/// Inserts a pod or overwrites the row with the same UUID.
pub async fn upsert_pod(pool: &Pool<Sqlite>, pod: &Pod) -> LogsViewerResult<()> {
    sqlx::query(
        r#"
        INSERT INTO pods (
            uuid, kind, name, namespace, phase, active_containers, total_containers,
            node_name, creation_time, pvcs, created_by, content
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(uuid) DO UPDATE SET
            kind = excluded.kind,
            name = excluded.name,
            namespace = excluded.namespace,
            phase = excluded.phase,
            active_containers = excluded.active_containers,
            total_containers = excluded.total_containers,
            node_name = excluded.node_name,
            creation_time = excluded.creation_time,
            pvcs = excluded.pvcs,
            created_by = excluded.created_by,
            content = excluded.content
        "#,
    )
    .bind(&pod.uuid)
    .bind(&pod.kind)
    .bind(&pod.name)
    .bind(&pod.namespace)
    .bind(&pod.phase)
    .bind(pod.active_containers)
    .bind(pod.total_containers)
    .bind(&pod.node_name)
    .bind(pod.creation_time)
    .bind(&pod.pvcs)
    .bind(&pod.created_by)
    .bind(serde_json::to_string(&pod.content)?)
    .execute(pool)
    .await?;

    Ok(())
}

/// Inserts a node or overwrites the row with the same name.
pub async fn upsert_node(pool: &Pool<Sqlite>, node: &Node) -> LogsViewerResult<()> {
    sqlx::query(
        r#"
        INSERT INTO nodes (
            name, system_uuid, status, internal_ip, hostname, os_image,
            kernel_version, kubelet_version, container_runtime_version, content
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(name) DO UPDATE SET
            system_uuid = excluded.system_uuid,
            status = excluded.status,
            internal_ip = excluded.internal_ip,
            hostname = excluded.hostname,
            os_image = excluded.os_image,
            kernel_version = excluded.kernel_version,
            kubelet_version = excluded.kubelet_version,
            container_runtime_version = excluded.container_runtime_version,
            content = excluded.content
        "#,
    )
    .bind(&node.name)
    .bind(&node.system_uuid)
    .bind(&node.status)
    .bind(&node.internal_ip)
    .bind(&node.hostname)
    .bind(&node.os_image)
    .bind(&node.kernel_version)
    .bind(&node.kubelet_version)
    .bind(&node.container_runtime_version)
    .bind(serde_json::to_string(&node.content)?)
    .execute(pool)
    .await?;

    Ok(())
}

/// Inserts a virtual machine or overwrites the row with the same UUID.
pub async fn upsert_vm(pool: &Pool<Sqlite>, vm: &VirtualMachine) -> LogsViewerResult<()> {
    sqlx::query(
        r#"
        INSERT INTO vms (uuid, name, namespace, running, created, ready, status, content)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(uuid) DO UPDATE SET
            name = excluded.name,
            namespace = excluded.namespace,
            running = excluded.running,
            created = excluded.created,
            ready = excluded.ready,
            status = excluded.status,
            content = excluded.content
        "#,
    )
    .bind(&vm.uuid)
    .bind(&vm.name)
    .bind(&vm.namespace)
    .bind(vm.running)
    .bind(vm.created)
    .bind(vm.ready)
    .bind(&vm.status)
    .bind(serde_json::to_string(&vm.content)?)
    .execute(pool)
    .await?;

    Ok(())
}

/// Inserts a VMI or overwrites the row with the same UUID.
///
/// When the VMI status carries a migration state, the migration row it implies is upserted in the
/// same transaction (see [`upsert_derived_migration`]).
pub async fn upsert_vmi(pool: &Pool<Sqlite>, vmi: &VirtualMachineInstance) -> LogsViewerResult<()> {
    let migration_state = vmi
        .migration_state
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO vmis (
            uuid, name, namespace, reason, phase, node_name, creation_time,
            migration_state, content
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(uuid) DO UPDATE SET
            name = excluded.name,
            namespace = excluded.namespace,
            reason = excluded.reason,
            phase = excluded.phase,
            node_name = excluded.node_name,
            creation_time = excluded.creation_time,
            migration_state = excluded.migration_state,
            content = excluded.content
        "#,
    )
    .bind(&vmi.uuid)
    .bind(&vmi.name)
    .bind(&vmi.namespace)
    .bind(&vmi.reason)
    .bind(&vmi.phase)
    .bind(&vmi.node_name)
    .bind(vmi.creation_time)
    .bind(migration_state)
    .bind(serde_json::to_string(&vmi.content)?)
    .execute(&mut *tx)
    .await?;

    if let Some(migration) = vmi.derived_migration() {
        upsert_derived_migration(&mut *tx, &migration).await?;
    }

    tx.commit().await?;

    Ok(())
}

/// Inserts a migration from its own manifest or updates the row with the same UUID.
///
/// Identity columns are overwritten. Migration-state columns keep their stored value when the
/// manifest carries none, so state already learned from the VMI is not lost.
pub async fn upsert_migration(
    pool: &Pool<Sqlite>,
    migration: &VirtualMachineInstanceMigration,
) -> LogsViewerResult<()> {
    let content = migration
        .content
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO vmimigrations (
            uuid, name, namespace, phase, vmi_name, creation_time, target_pod,
            source_node, target_node, start_timestamp, end_timestamp, completed, failed, content
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(uuid) DO UPDATE SET
            name = excluded.name,
            namespace = excluded.namespace,
            phase = excluded.phase,
            vmi_name = excluded.vmi_name,
            creation_time = excluded.creation_time,
            content = excluded.content,
            target_pod = COALESCE(excluded.target_pod, vmimigrations.target_pod),
            source_node = COALESCE(excluded.source_node, vmimigrations.source_node),
            target_node = COALESCE(excluded.target_node, vmimigrations.target_node),
            start_timestamp = COALESCE(excluded.start_timestamp, vmimigrations.start_timestamp),
            end_timestamp = COALESCE(excluded.end_timestamp, vmimigrations.end_timestamp),
            completed = COALESCE(excluded.completed, vmimigrations.completed),
            failed = COALESCE(excluded.failed, vmimigrations.failed)
        "#,
    )
    .bind(&migration.uuid)
    .bind(&migration.name)
    .bind(&migration.namespace)
    .bind(&migration.phase)
    .bind(&migration.vmi_name)
    .bind(migration.creation_time)
    .bind(&migration.target_pod)
    .bind(&migration.source_node)
    .bind(&migration.target_node)
    .bind(migration.start_timestamp)
    .bind(migration.end_timestamp)
    .bind(migration.completed)
    .bind(migration.failed)
    .bind(content)
    .execute(pool)
    .await?;

    Ok(())
}

/// Upserts the migration row implied by a VMI's migration state.
///
/// A new row takes its namespace and VMI name from the VMI. An existing row keeps its identity
/// columns and only has the migration-state columns the VMI actually carries overwritten, so an
/// explicit manifest and a VMI state converge on the same row in either order.
pub async fn upsert_derived_migration<'e, E>(
    executor: E,
    migration: &VirtualMachineInstanceMigration,
) -> LogsViewerResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO vmimigrations (
            uuid, namespace, vmi_name, target_pod, source_node, target_node,
            start_timestamp, end_timestamp, completed, failed
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(uuid) DO UPDATE SET
            target_pod = COALESCE(excluded.target_pod, vmimigrations.target_pod),
            source_node = COALESCE(excluded.source_node, vmimigrations.source_node),
            target_node = COALESCE(excluded.target_node, vmimigrations.target_node),
            start_timestamp = COALESCE(excluded.start_timestamp, vmimigrations.start_timestamp),
            end_timestamp = COALESCE(excluded.end_timestamp, vmimigrations.end_timestamp),
            completed = COALESCE(excluded.completed, vmimigrations.completed),
            failed = COALESCE(excluded.failed, vmimigrations.failed)
        "#,
    )
    .bind(&migration.uuid)
    .bind(&migration.namespace)
    .bind(&migration.vmi_name)
    .bind(&migration.target_pod)
    .bind(&migration.source_node)
    .bind(&migration.target_node)
    .bind(migration.start_timestamp)
    .bind(migration.end_timestamp)
    .bind(migration.completed)
    .bind(migration.failed)
    .execute(executor)
    .await?;

    Ok(())
}

/// Inserts a PVC or overwrites the row with the same UUID.
pub async fn upsert_pvc(pool: &Pool<Sqlite>, pvc: &PersistentVolumeClaim) -> LogsViewerResult<()> {
    sqlx::query(
        r#"
        INSERT INTO pvcs (
            uuid, name, namespace, access_modes, storage_class_name, volume_name,
            volume_mode, phase, capacity, creation_time, content
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(uuid) DO UPDATE SET
            name = excluded.name,
            namespace = excluded.namespace,
            access_modes = excluded.access_modes,
            storage_class_name = excluded.storage_class_name,
            volume_name = excluded.volume_name,
            volume_mode = excluded.volume_mode,
            phase = excluded.phase,
            capacity = excluded.capacity,
            creation_time = excluded.creation_time,
            content = excluded.content
        "#,
    )
    .bind(&pvc.uuid)
    .bind(&pvc.name)
    .bind(&pvc.namespace)
    .bind(&pvc.access_modes)
    .bind(&pvc.storage_class_name)
    .bind(&pvc.volume_name)
    .bind(&pvc.volume_mode)
    .bind(&pvc.phase)
    .bind(&pvc.capacity)
    .bind(pvc.creation_time)
    .bind(serde_json::to_string(&pvc.content)?)
    .execute(pool)
    .await?;

    Ok(())
}

/// Inserts a subscription or overwrites the row with the same UUID.
pub async fn upsert_subscription(
    pool: &Pool<Sqlite>,
    subscription: &Subscription,
) -> LogsViewerResult<()> {
    sqlx::query(
        r#"
        INSERT INTO subscriptions (
            uuid, name, namespace, source, source_namespace, starting_csv,
            current_csv, installed_csv, state, creation_time, content
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(uuid) DO UPDATE SET
            name = excluded.name,
            namespace = excluded.namespace,
            source = excluded.source,
            source_namespace = excluded.source_namespace,
            starting_csv = excluded.starting_csv,
            current_csv = excluded.current_csv,
            installed_csv = excluded.installed_csv,
            state = excluded.state,
            creation_time = excluded.creation_time,
            content = excluded.content
        "#,
    )
    .bind(&subscription.uuid)
    .bind(&subscription.name)
    .bind(&subscription.namespace)
    .bind(&subscription.source)
    .bind(&subscription.source_namespace)
    .bind(&subscription.starting_csv)
    .bind(&subscription.current_csv)
    .bind(&subscription.installed_csv)
    .bind(&subscription.state)
    .bind(subscription.creation_time)
    .bind(serde_json::to_string(&subscription.content)?)
    .execute(pool)
    .await?;

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
