use std::collections::BTreeMap;

use serde_json::Value;
use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite};

use crate::{
    models::{
        Node, PersistentVolumeClaim, Pod, RecordKind, Subscription, VirtualMachine,
        VirtualMachineInstance, VirtualMachineInstanceMigration,
    },
    resolver::unique_pvc_names,
    LogsViewerError, LogsViewerResult,
};

//--------------------------------------------------------------------------------------------------
// Functions: Lookups
//--------------------------------------------------------------------------------------------------

/// Gets a pod by UUID.
pub async fn get_pod(pool: &Pool<Sqlite>, uuid: &str) -> LogsViewerResult<Pod> {
    let row = sqlx::query("SELECT * FROM pods WHERE uuid = ?")
        .bind(uuid)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| not_found("pod", uuid))?;

    pod_from_row(&row)
}

/// Finds a pod by name and namespace.
pub async fn find_pod_by_name(
    pool: &Pool<Sqlite>,
    name: &str,
    namespace: &str,
) -> LogsViewerResult<Option<Pod>> {
    sqlx::query("SELECT * FROM pods WHERE name = ? AND namespace = ? ORDER BY creation_time DESC")
        .bind(name)
        .bind(namespace)
        .fetch_optional(pool)
        .await?
        .map(|row| pod_from_row(&row))
        .transpose()
}

/// Lists the pods labelled as created by the given VMI, oldest first.
///
/// With `node_name` set, only pods scheduled on that node are returned.
pub async fn pods_created_by(
    pool: &Pool<Sqlite>,
    vmi_uuid: &str,
    node_name: Option<&str>,
) -> LogsViewerResult<Vec<Pod>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM pods
        WHERE created_by = ? AND (? IS NULL OR node_name = ?)
        ORDER BY creation_time, uuid
        "#,
    )
    .bind(vmi_uuid)
    .bind(node_name)
    .bind(node_name)
    .fetch_all(pool)
    .await?;

    rows.iter().map(pod_from_row).collect()
}

/// Lists the pods on a node whose name starts with `prefix`, oldest first.
pub async fn pods_on_node_with_prefix(
    pool: &Pool<Sqlite>,
    node_name: &str,
    prefix: &str,
) -> LogsViewerResult<Vec<Pod>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM pods
        WHERE node_name = ? AND name LIKE ? ESCAPE '\'
        ORDER BY creation_time, uuid
        "#,
    )
    .bind(node_name)
    .bind(like_prefix(prefix))
    .fetch_all(pool)
    .await?;

    // LIKE is case-insensitive for ASCII in SQLite
    rows.iter()
        .map(pod_from_row)
        .filter(|pod| pod.as_ref().map_or(true, |p| p.name.starts_with(prefix)))
        .collect()
}

/// Gets a node by name.
pub async fn get_node(pool: &Pool<Sqlite>, name: &str) -> LogsViewerResult<Node> {
    let row = sqlx::query("SELECT * FROM nodes WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| not_found("node", name))?;

    node_from_row(&row)
}

/// Gets a virtual machine by UUID.
pub async fn get_vm(pool: &Pool<Sqlite>, uuid: &str) -> LogsViewerResult<VirtualMachine> {
    let row = sqlx::query("SELECT * FROM vms WHERE uuid = ?")
        .bind(uuid)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| not_found("virtual machine", uuid))?;

    vm_from_row(&row)
}

/// Gets a VMI by UUID.
pub async fn get_vmi(pool: &Pool<Sqlite>, uuid: &str) -> LogsViewerResult<VirtualMachineInstance> {
    let row = sqlx::query("SELECT * FROM vmis WHERE uuid = ?")
        .bind(uuid)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| not_found("virtual machine instance", uuid))?;

    vmi_from_row(&row)
}

/// Finds a VMI by name and namespace.
pub async fn find_vmi_by_name(
    pool: &Pool<Sqlite>,
    name: &str,
    namespace: &str,
) -> LogsViewerResult<Option<VirtualMachineInstance>> {
    sqlx::query("SELECT * FROM vmis WHERE name = ? AND namespace = ? ORDER BY creation_time DESC")
        .bind(name)
        .bind(namespace)
        .fetch_optional(pool)
        .await?
        .map(|row| vmi_from_row(&row))
        .transpose()
}

/// Gets a migration by UUID.
pub async fn get_migration(
    pool: &Pool<Sqlite>,
    uuid: &str,
) -> LogsViewerResult<VirtualMachineInstanceMigration> {
    let row = sqlx::query("SELECT * FROM vmimigrations WHERE uuid = ?")
        .bind(uuid)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| not_found("migration", uuid))?;

    migration_from_row(&row)
}

/// Finds a PVC by name and namespace.
pub async fn find_pvc_by_name(
    pool: &Pool<Sqlite>,
    name: &str,
    namespace: &str,
) -> LogsViewerResult<Option<PersistentVolumeClaim>> {
    sqlx::query("SELECT * FROM pvcs WHERE name = ? AND namespace = ?")
        .bind(name)
        .bind(namespace)
        .fetch_optional(pool)
        .await?
        .map(|row| pvc_from_row(&row))
        .transpose()
}

/// Resolves PVC names in one namespace to their rows, skipping names with no row.
pub async fn pvcs_by_names(
    pool: &Pool<Sqlite>,
    names: &[String],
    namespace: &str,
) -> LogsViewerResult<Vec<PersistentVolumeClaim>> {
    let mut pvcs = Vec::with_capacity(names.len());
    for name in names {
        match find_pvc_by_name(pool, name, namespace).await? {
            Some(pvc) => pvcs.push(pvc),
            None => tracing::debug!("pvc {namespace}/{name} not found, skipping"),
        }
    }

    Ok(pvcs)
}

/// Gets the PVCs mounted by a pod.
pub async fn pod_pvcs(
    pool: &Pool<Sqlite>,
    pod_uuid: &str,
) -> LogsViewerResult<Vec<PersistentVolumeClaim>> {
    let pod = get_pod(pool, pod_uuid).await?;
    let names = unique_pvc_names(std::slice::from_ref(&pod));
    pvcs_by_names(pool, &names, &pod.namespace).await
}

/// Gets the PVCs mounted by any launcher pod of a VMI.
pub async fn vmi_pvcs(
    pool: &Pool<Sqlite>,
    vmi_uuid: &str,
) -> LogsViewerResult<Vec<PersistentVolumeClaim>> {
    let vmi = get_vmi(pool, vmi_uuid).await?;
    let launchers = pods_created_by(pool, vmi_uuid, None).await?;
    let names = unique_pvc_names(&launchers);
    pvcs_by_names(pool, &names, &vmi.namespace).await
}

//--------------------------------------------------------------------------------------------------
// Functions: Raw Objects
//--------------------------------------------------------------------------------------------------

/// Gets the original manifest stored for an object.
///
/// Migration rows derived from a VMI carry no manifest and yield `Value::Null`.
pub async fn object_content(
    pool: &Pool<Sqlite>,
    kind: RecordKind,
    id: &str,
) -> LogsViewerResult<Value> {
    if kind == RecordKind::ImportedMustGather {
        return Err(LogsViewerError::InvalidArgument(format!(
            "{kind} records carry no manifest"
        )));
    }

    // Table and column names come from the kind, never from the caller
    let sql = format!(
        "SELECT content FROM {} WHERE {} = ?",
        kind.table(),
        kind.key_column()
    );
    let content: Option<String> = sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| not_found(kind.as_str(), id))?;

    match content {
        Some(content) => Ok(serde_json::from_str(&content)?),
        None => Ok(Value::Null),
    }
}

/// Gets the original manifest stored for an object, rendered as YAML.
pub async fn object_yaml(
    pool: &Pool<Sqlite>,
    kind: RecordKind,
    id: &str,
) -> LogsViewerResult<String> {
    let content = object_content(pool, kind, id).await?;
    Ok(serde_yaml::to_string(&content)?)
}

/// Counts the rows of every table.
pub async fn resource_stats(pool: &Pool<Sqlite>) -> LogsViewerResult<BTreeMap<RecordKind, i64>> {
    let mut stats = BTreeMap::new();
    for kind in RecordKind::ALL {
        let sql = format!("SELECT COUNT(*) FROM {}", kind.table());
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(pool).await?;
        stats.insert(kind, count);
    }

    Ok(stats)
}

//--------------------------------------------------------------------------------------------------
// Functions: Row Mapping
//--------------------------------------------------------------------------------------------------

pub(crate) fn pod_from_row(row: &SqliteRow) -> LogsViewerResult<Pod> {
    Ok(Pod {
        uuid: row.try_get("uuid")?,
        kind: row.try_get("kind")?,
        name: row.try_get("name")?,
        namespace: row.try_get("namespace")?,
        phase: row.try_get("phase")?,
        active_containers: row.try_get("active_containers")?,
        total_containers: row.try_get("total_containers")?,
        node_name: row.try_get("node_name")?,
        creation_time: row.try_get("creation_time")?,
        pvcs: row.try_get("pvcs")?,
        created_by: row.try_get("created_by")?,
        content: content_from_row(row)?,
    })
}

pub(crate) fn node_from_row(row: &SqliteRow) -> LogsViewerResult<Node> {
    Ok(Node {
        name: row.try_get("name")?,
        system_uuid: row.try_get("system_uuid")?,
        status: row.try_get("status")?,
        internal_ip: row.try_get("internal_ip")?,
        hostname: row.try_get("hostname")?,
        os_image: row.try_get("os_image")?,
        kernel_version: row.try_get("kernel_version")?,
        kubelet_version: row.try_get("kubelet_version")?,
        container_runtime_version: row.try_get("container_runtime_version")?,
        content: content_from_row(row)?,
    })
}

pub(crate) fn vm_from_row(row: &SqliteRow) -> LogsViewerResult<VirtualMachine> {
    Ok(VirtualMachine {
        uuid: row.try_get("uuid")?,
        name: row.try_get("name")?,
        namespace: row.try_get("namespace")?,
        running: row.try_get("running")?,
        created: row.try_get("created")?,
        ready: row.try_get("ready")?,
        status: row.try_get("status")?,
        content: content_from_row(row)?,
    })
}

pub(crate) fn vmi_from_row(row: &SqliteRow) -> LogsViewerResult<VirtualMachineInstance> {
    let migration_state = row
        .try_get::<Option<String>, _>("migration_state")?
        .map(|state| serde_json::from_str(&state))
        .transpose()?;

    Ok(VirtualMachineInstance {
        uuid: row.try_get("uuid")?,
        name: row.try_get("name")?,
        namespace: row.try_get("namespace")?,
        reason: row.try_get("reason")?,
        phase: row.try_get("phase")?,
        node_name: row.try_get("node_name")?,
        creation_time: row.try_get("creation_time")?,
        migration_state,
        content: content_from_row(row)?,
    })
}

pub(crate) fn migration_from_row(
    row: &SqliteRow,
) -> LogsViewerResult<VirtualMachineInstanceMigration> {
    let content = row
        .try_get::<Option<String>, _>("content")?
        .map(|content| serde_json::from_str(&content))
        .transpose()?;

    Ok(VirtualMachineInstanceMigration {
        uuid: row.try_get("uuid")?,
        name: row.try_get("name")?,
        namespace: row.try_get("namespace")?,
        phase: row.try_get("phase")?,
        vmi_name: row.try_get("vmi_name")?,
        creation_time: row.try_get("creation_time")?,
        target_pod: row.try_get("target_pod")?,
        source_node: row.try_get("source_node")?,
        target_node: row.try_get("target_node")?,
        start_timestamp: row.try_get("start_timestamp")?,
        end_timestamp: row.try_get("end_timestamp")?,
        completed: row.try_get("completed")?,
        failed: row.try_get("failed")?,
        content,
    })
}

pub(crate) fn pvc_from_row(row: &SqliteRow) -> LogsViewerResult<PersistentVolumeClaim> {
    Ok(PersistentVolumeClaim {
        uuid: row.try_get("uuid")?,
        name: row.try_get("name")?,
        namespace: row.try_get("namespace")?,
        access_modes: row.try_get("access_modes")?,
        storage_class_name: row.try_get("storage_class_name")?,
        volume_name: row.try_get("volume_name")?,
        volume_mode: row.try_get("volume_mode")?,
        phase: row.try_get("phase")?,
        capacity: row.try_get("capacity")?,
        creation_time: row.try_get("creation_time")?,
        content: content_from_row(row)?,
    })
}

pub(crate) fn subscription_from_row(row: &SqliteRow) -> LogsViewerResult<Subscription> {
    Ok(Subscription {
        uuid: row.try_get("uuid")?,
        name: row.try_get("name")?,
        namespace: row.try_get("namespace")?,
        source: row.try_get("source")?,
        source_namespace: row.try_get("source_namespace")?,
        starting_csv: row.try_get("starting_csv")?,
        current_csv: row.try_get("current_csv")?,
        installed_csv: row.try_get("installed_csv")?,
        state: row.try_get("state")?,
        creation_time: row.try_get("creation_time")?,
        content: content_from_row(row)?,
    })
}

fn content_from_row(row: &SqliteRow) -> LogsViewerResult<Value> {
    let content: String = row.try_get("content")?;
    Ok(serde_json::from_str(&content)?)
}

fn not_found(kind: &'static str, id: &str) -> LogsViewerError {
    LogsViewerError::EntityNotFound {
        kind,
        id: id.to_string(),
    }
}

/// Turns a literal prefix into a `LIKE` pattern using `\` as the escape character.
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
