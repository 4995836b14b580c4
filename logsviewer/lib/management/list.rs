use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Pool, QueryBuilder, Sqlite};
use typed_builder::TypedBuilder;

use crate::{
    models::{
        Node, PersistentVolumeClaim, Pod, RecordKind, Subscription, VirtualMachine,
        VirtualMachineInstance, VirtualMachineInstanceMigration,
    },
    LogsViewerError, LogsViewerResult,
};

use super::{
    migration_from_row, node_from_row, pod_from_row, pvc_from_row, subscription_from_row,
    vm_from_row, vmi_from_row,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Filters and pagination for listing records of one kind.
///
/// Every set filter must match. The single-value filters are equality checks, the list filters
/// are `IN` sets, and `status` matches the phase set of its bucket.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
pub struct ListFilter {
    /// Match this identity (UUID, or name for nodes).
    #[builder(default, setter(strip_option, into))]
    pub uuid: Option<String>,

    /// Match this name.
    #[builder(default, setter(strip_option, into))]
    pub name: Option<String>,

    /// Match this namespace.
    #[builder(default, setter(strip_option, into))]
    pub namespace: Option<String>,

    /// Match any of these identities.
    #[builder(default)]
    pub uuids: Vec<String>,

    /// Match any of these names.
    #[builder(default)]
    pub names: Vec<String>,

    /// Match any of these namespaces.
    #[builder(default)]
    pub namespaces: Vec<String>,

    /// Match the phases of this bucket.
    #[builder(default, setter(strip_option))]
    pub status: Option<StatusBucket>,

    /// The 1-based page to return.
    #[builder(default = 1)]
    pub page: u32,

    /// Rows per page; `None` returns every row on a single page.
    #[builder(default, setter(strip_option))]
    pub per_page: Option<u32>,
}

/// A coarse status used to filter listings, translated to a set of phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusBucket {
    /// Running workloads.
    Running,

    /// Workloads not yet running.
    Pending,

    /// Failed workloads.
    Failed,

    /// Workloads that completed successfully.
    Succeeded,

    /// Bound claims.
    Bound,

    /// Ready nodes.
    Ready,

    /// Nodes that are not ready.
    NotReady,

    /// Objects whose status is unknown.
    Unknown,
}

/// One page of listed records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// The rows on this page.
    pub data: Vec<T>,

    /// Pagination details.
    pub meta: PageMeta,
}

/// Pagination details of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    /// The 1-based page returned.
    pub page: u32,

    /// Rows per page, `None` when unpaginated.
    #[serde(rename = "per_page")]
    pub per_page: Option<u32>,

    /// Rows matching the filter across all pages.
    #[serde(rename = "totalRowCount")]
    pub total_rows: i64,

    /// Number of pages.
    pub total_pages: i64,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl StatusBucket {
    /// The phases this bucket stands for.
    pub fn phases(&self) -> &'static [&'static str] {
        match self {
            StatusBucket::Running => &["Running"],
            StatusBucket::Pending => &["Pending", "Scheduling", "Scheduled", "PreparingTarget"],
            StatusBucket::Failed => &["Failed"],
            StatusBucket::Succeeded => &["Succeeded"],
            StatusBucket::Bound => &["Bound"],
            StatusBucket::Ready => &["Ready"],
            StatusBucket::NotReady => &["NotReady"],
            StatusBucket::Unknown => &["Unknown", ""],
        }
    }
}

impl PageMeta {
    fn new(page: u32, per_page: Option<u32>, total_rows: i64) -> Self {
        let total_pages = match per_page {
            Some(per_page) => (total_rows + per_page as i64 - 1) / per_page as i64,
            None => 1,
        };

        Self {
            page,
            per_page,
            total_rows,
            total_pages,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Lists pods, newest first.
pub async fn list_pods(pool: &Pool<Sqlite>, filter: &ListFilter) -> LogsViewerResult<Page<Pod>> {
    list_rows(pool, RecordKind::Pod, filter, pod_from_row).await
}

/// Lists nodes by name.
pub async fn list_nodes(pool: &Pool<Sqlite>, filter: &ListFilter) -> LogsViewerResult<Page<Node>> {
    list_rows(pool, RecordKind::Node, filter, node_from_row).await
}

/// Lists virtual machines by namespace and name.
pub async fn list_vms(
    pool: &Pool<Sqlite>,
    filter: &ListFilter,
) -> LogsViewerResult<Page<VirtualMachine>> {
    list_rows(pool, RecordKind::Vm, filter, vm_from_row).await
}

/// Lists VMIs, newest first.
pub async fn list_vmis(
    pool: &Pool<Sqlite>,
    filter: &ListFilter,
) -> LogsViewerResult<Page<VirtualMachineInstance>> {
    list_rows(pool, RecordKind::Vmi, filter, vmi_from_row).await
}

/// Lists migrations, most recently started first.
pub async fn list_migrations(
    pool: &Pool<Sqlite>,
    filter: &ListFilter,
) -> LogsViewerResult<Page<VirtualMachineInstanceMigration>> {
    list_rows(pool, RecordKind::Migration, filter, migration_from_row).await
}

/// Lists PVCs by namespace and name.
pub async fn list_pvcs(
    pool: &Pool<Sqlite>,
    filter: &ListFilter,
) -> LogsViewerResult<Page<PersistentVolumeClaim>> {
    list_rows(pool, RecordKind::Pvc, filter, pvc_from_row).await
}

/// Lists subscriptions by namespace and name.
pub async fn list_subscriptions(
    pool: &Pool<Sqlite>,
    filter: &ListFilter,
) -> LogsViewerResult<Page<Subscription>> {
    list_rows(pool, RecordKind::Subscription, filter, subscription_from_row).await
}

async fn list_rows<T>(
    pool: &Pool<Sqlite>,
    kind: RecordKind,
    filter: &ListFilter,
    map: fn(&SqliteRow) -> LogsViewerResult<T>,
) -> LogsViewerResult<Page<T>> {
    if filter.page == 0 {
        return Err(LogsViewerError::InvalidArgument(
            "page numbers start at 1".to_string(),
        ));
    }

    if filter.per_page == Some(0) {
        return Err(LogsViewerError::InvalidArgument(
            "per_page must be greater than 0".to_string(),
        ));
    }

    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM ");
    count.push(kind.table());
    push_filters(&mut count, kind, filter)?;
    let total_rows = count.build_query_scalar::<i64>().fetch_one(pool).await?;

    let mut select = QueryBuilder::<Sqlite>::new("SELECT * FROM ");
    select.push(kind.table());
    push_filters(&mut select, kind, filter)?;
    select.push(" ORDER BY ").push(order_by(kind));
    if let Some(per_page) = filter.per_page {
        let offset = (filter.page as i64 - 1) * per_page as i64;
        select
            .push(" LIMIT ")
            .push_bind(per_page as i64)
            .push(" OFFSET ")
            .push_bind(offset);
    }

    let rows = select.build().fetch_all(pool).await?;
    let data = rows.iter().map(map).collect::<LogsViewerResult<Vec<_>>>()?;

    Ok(Page {
        data,
        meta: PageMeta::new(filter.page, filter.per_page, total_rows),
    })
}

/// Appends the `WHERE` clause for `filter`, binding every value.
fn push_filters(
    query: &mut QueryBuilder<'_, Sqlite>,
    kind: RecordKind,
    filter: &ListFilter,
) -> LogsViewerResult<()> {
    let has_namespace = !matches!(kind, RecordKind::Node | RecordKind::ImportedMustGather);
    if !has_namespace && (filter.namespace.is_some() || !filter.namespaces.is_empty()) {
        return Err(LogsViewerError::InvalidArgument(format!(
            "{kind} records have no namespace"
        )));
    }

    query.push(" WHERE 1 = 1");

    let equals = [
        (kind.key_column(), &filter.uuid),
        ("name", &filter.name),
        ("namespace", &filter.namespace),
    ];
    for (column, value) in equals {
        if let Some(value) = value {
            query
                .push(" AND ")
                .push(column)
                .push(" = ")
                .push_bind(value.clone());
        }
    }

    let sets = [
        (kind.key_column(), &filter.uuids),
        ("name", &filter.names),
        ("namespace", &filter.namespaces),
    ];
    for (column, values) in sets {
        let values: Vec<&str> = values.iter().map(String::as_str).collect();
        push_in(query, column, &values);
    }

    if let Some(status) = filter.status {
        push_in(query, status_column(kind), status.phases());
    }

    Ok(())
}

fn push_in(query: &mut QueryBuilder<'_, Sqlite>, column: &str, values: &[&str]) {
    if values.is_empty() {
        return;
    }

    query.push(" AND ").push(column).push(" IN (");
    let mut separated = query.separated(", ");
    for value in values {
        separated.push_bind(value.to_string());
    }
    separated.push_unseparated(")");
}

fn status_column(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Node | RecordKind::Vm => "status",
        RecordKind::Subscription => "state",
        _ => "phase",
    }
}

fn order_by(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Pod | RecordKind::Vmi => "creation_time DESC, uuid",
        RecordKind::Migration => "start_timestamp DESC, creation_time DESC, uuid",
        RecordKind::Node => "name",
        RecordKind::ImportedMustGather => "import_time DESC, name",
        _ => "namespace, name, uuid",
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for ListFilter {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl FromStr for StatusBucket {
    type Err = LogsViewerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "running" => Ok(StatusBucket::Running),
            "pending" => Ok(StatusBucket::Pending),
            "failed" => Ok(StatusBucket::Failed),
            "succeeded" => Ok(StatusBucket::Succeeded),
            "bound" => Ok(StatusBucket::Bound),
            "ready" => Ok(StatusBucket::Ready),
            "notready" => Ok(StatusBucket::NotReady),
            "unknown" => Ok(StatusBucket::Unknown),
            _ => Err(LogsViewerError::InvalidArgument(format!(
                "unknown status: {s}"
            ))),
        }
    }
}

impl fmt::Display for StatusBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusBucket::Running => "running",
            StatusBucket::Pending => "pending",
            StatusBucket::Failed => "failed",
            StatusBucket::Succeeded => "succeeded",
            StatusBucket::Bound => "bound",
            StatusBucket::Ready => "ready",
            StatusBucket::NotReady => "notready",
            StatusBucket::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use crate::management::{init_db, upsert_pod, LOGSVIEWER_DB_MIGRATOR};

    fn pod(index: i64, namespace: &str, phase: &str) -> Pod {
        Pod {
            uuid: format!("pod-{index}"),
            kind: "Pod".to_string(),
            name: format!("virt-launcher-{index}"),
            namespace: namespace.to_string(),
            phase: phase.to_string(),
            active_containers: 1,
            total_containers: 1,
            node_name: "worker-1".to_string(),
            creation_time: Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
                + Duration::minutes(index),
            pvcs: String::new(),
            created_by: None,
            content: json!({}),
        }
    }

    #[test]
    fn test_page_meta() {
        assert_eq!(PageMeta::new(1, Some(2), 5).total_pages, 3);
        assert_eq!(PageMeta::new(1, Some(5), 5).total_pages, 1);
        assert_eq!(PageMeta::new(1, Some(5), 0).total_pages, 0);
        assert_eq!(PageMeta::new(1, None, 5).total_pages, 1);
    }

    #[test]
    fn test_status_bucket_parse() {
        assert_eq!("Running".parse::<StatusBucket>().unwrap(), StatusBucket::Running);
        assert!("sleeping".parse::<StatusBucket>().is_err());
    }

    #[test_log::test(tokio::test)]
    async fn test_list_pods_with_filters() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let pool = init_db(temp_dir.path().join("test.db"), &LOGSVIEWER_DB_MIGRATOR).await?;

        for i in 0..5 {
            upsert_pod(&pool, &pod(i, "vms", "Running")).await?;
        }
        upsert_pod(&pool, &pod(5, "vms", "Failed")).await?;
        upsert_pod(&pool, &pod(6, "other", "Running")).await?;

        let page = list_pods(
            &pool,
            &ListFilter::builder()
                .namespace("vms")
                .status(StatusBucket::Running)
                .page(2)
                .per_page(2)
                .build(),
        )
        .await?;
        assert_eq!(page.meta.total_rows, 5);
        assert_eq!(page.meta.total_pages, 3);
        let uuids: Vec<_> = page.data.iter().map(|p| p.uuid.as_str()).collect();
        assert_eq!(uuids, vec!["pod-2", "pod-1"]);

        let page = list_pods(
            &pool,
            &ListFilter::builder()
                .names(vec!["virt-launcher-5".to_string(), "virt-launcher-6".to_string()])
                .build(),
        )
        .await?;
        assert_eq!(page.meta.total_rows, 2);

        let injected = list_pods(
            &pool,
            &ListFilter::builder().name("x' OR '1'='1").build(),
        )
        .await?;
        assert!(injected.data.is_empty());

        assert!(list_nodes(&pool, &ListFilter::builder().namespace("vms").build())
            .await
            .is_err());
        Ok(())
    }
}
