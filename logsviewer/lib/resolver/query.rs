use chrono::{DateTime, Utc};
use futures::future;
use sqlx::{Pool, Sqlite};

use crate::{
    management::{
        find_pod_by_name, find_vmi_by_name, get_migration, get_pod, get_vmi, pods_created_by,
        pods_on_node_with_prefix, pvcs_by_names,
    },
    models::{Pod, QueryResults},
    LogsViewerError, LogsViewerResult, MissingLink,
};

use super::{
    select_handler, select_launcher, select_source_launcher, unique_pvc_names, visited_nodes,
    window_start, HANDLER_NAME_PREFIX,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Rebuilds the pods, handlers, window and volumes relevant to a workload event.
///
/// The resolver only reads from the store. Every lookup that comes back empty is reported as
/// [`LogsViewerError::EntityNotFound`] for the queried entity itself, or
/// [`LogsViewerError::CorrelationIncomplete`] naming the dependent lookup that failed.
#[derive(Debug, Clone)]
pub struct Resolver {
    pool: Pool<Sqlite>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Resolver {
    /// Creates a resolver reading from `pool`.
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Resolves a single pod: its name, namespace, window start and PVCs.
    pub async fn resolve_by_pod(&self, pod_uuid: &str) -> LogsViewerResult<QueryResults> {
        let pod = get_pod(&self.pool, pod_uuid).await?;
        let pvcs = self.pvc_uuids(std::slice::from_ref(&pod), &pod.namespace).await?;

        Ok(QueryResults {
            namespace: pod.namespace.clone(),
            source_pod_uuid: pod.uuid.clone(),
            source_pod: pod.name.clone(),
            start_timestamp: Some(window_start(pod.creation_time)),
            end_timestamp: None,
            pvcs,
            ..Default::default()
        })
    }

    /// Resolves a VMI on one node: its launcher there, the node's virt-handler and its PVCs.
    pub async fn resolve_by_vmi(
        &self,
        vmi_uuid: &str,
        node_name: &str,
    ) -> LogsViewerResult<QueryResults> {
        let candidates = pods_created_by(&self.pool, vmi_uuid, Some(node_name)).await?;
        let launcher = select_launcher(&candidates, vmi_uuid, node_name)
            .ok_or(LogsViewerError::CorrelationIncomplete(MissingLink::LauncherPod))?;

        let handler = self
            .handler_at(node_name, launcher.creation_time)
            .await?
            .ok_or(LogsViewerError::CorrelationIncomplete(MissingLink::Handler))?;

        let pvcs = self
            .pvc_uuids(std::slice::from_ref(launcher), &launcher.namespace)
            .await?;

        Ok(QueryResults {
            namespace: launcher.namespace.clone(),
            source_pod_uuid: launcher.uuid.clone(),
            vmi_uuid: vmi_uuid.to_string(),
            source_pod: launcher.name.clone(),
            start_timestamp: Some(window_start(launcher.creation_time)),
            end_timestamp: None,
            source_handler: handler.name,
            pvcs,
            ..Default::default()
        })
    }

    /// Resolves a migration: the VMI, the launchers on both sides, both virt-handlers, the
    /// migration window and the VMI's PVCs.
    pub async fn resolve_by_migration(
        &self,
        migration_uuid: &str,
    ) -> LogsViewerResult<QueryResults> {
        let migration = get_migration(&self.pool, migration_uuid).await?;
        let namespace = migration.namespace.as_str();

        let started = migration
            .start_timestamp
            .ok_or(LogsViewerError::CorrelationIncomplete(MissingLink::MigrationStart))?;

        let vmi = find_vmi_by_name(&self.pool, &migration.vmi_name, namespace)
            .await?
            .ok_or(LogsViewerError::CorrelationIncomplete(MissingLink::Vmi))?;

        let target = match migration.target_pod.as_deref() {
            Some(name) => find_pod_by_name(&self.pool, name, namespace).await?,
            None => None,
        }
        .ok_or(LogsViewerError::CorrelationIncomplete(MissingLink::TargetPod))?;

        let source_node = migration
            .source_node
            .as_deref()
            .ok_or(LogsViewerError::CorrelationIncomplete(MissingLink::SourcePod))?;
        let candidates = pods_created_by(&self.pool, &vmi.uuid, Some(source_node)).await?;
        let source = select_source_launcher(
            &candidates,
            &vmi.uuid,
            source_node,
            vmi.creation_time,
            started,
        )
        .ok_or(LogsViewerError::CorrelationIncomplete(MissingLink::SourcePod))?;

        let source_handler = self
            .handler_at(source_node, started)
            .await?
            .ok_or(LogsViewerError::CorrelationIncomplete(MissingLink::SourceHandler))?;

        let target_node = migration
            .target_node
            .as_deref()
            .unwrap_or(target.node_name.as_str());
        let target_handler = self
            .handler_at(target_node, started)
            .await?
            .ok_or(LogsViewerError::CorrelationIncomplete(MissingLink::TargetHandler))?;

        let launchers = pods_created_by(&self.pool, &vmi.uuid, None).await?;
        let pvcs = self.pvc_uuids(&launchers, &vmi.namespace).await?;

        Ok(QueryResults {
            namespace: namespace.to_string(),
            source_pod_uuid: source.uuid.clone(),
            target_pod_uuid: target.uuid.clone(),
            vmi_uuid: vmi.uuid.clone(),
            migration_uuid: migration.uuid.clone(),
            source_pod: source.name.clone(),
            target_pod: target.name.clone(),
            start_timestamp: Some(window_start(started)),
            end_timestamp: migration.end_timestamp,
            source_handler: source_handler.name,
            target_handler: target_handler.name,
            pvcs,
            ..Default::default()
        })
    }

    /// Resolves the whole life of a VMI: every launcher it ever had and the virt-handler of every
    /// node it visited, from its creation to now.
    ///
    /// A visited node without a virt-handler does not fail the query; it is listed in
    /// `skipped_nodes` instead.
    pub async fn resolve_full_history(&self, vmi_uuid: &str) -> LogsViewerResult<QueryResults> {
        let vmi = get_vmi(&self.pool, vmi_uuid).await?;

        let launchers = pods_created_by(&self.pool, vmi_uuid, None).await?;
        if launchers.is_empty() {
            return Err(LogsViewerError::CorrelationIncomplete(
                MissingLink::LauncherPod,
            ));
        }

        let nodes = visited_nodes(&launchers);
        let lookups = nodes
            .iter()
            .map(|(node, first_seen)| self.handler_at(node, *first_seen));

        let mut handlers = Vec::with_capacity(nodes.len());
        let mut skipped_nodes = Vec::new();
        for ((node, _), handler) in nodes.iter().zip(future::join_all(lookups).await) {
            match handler? {
                Some(handler) => handlers.push(handler),
                None => {
                    tracing::warn!("no virt-handler found on node {node}, skipping");
                    skipped_nodes.push(node.clone());
                }
            }
        }

        let pvcs = self.pvc_uuids(&launchers, &vmi.namespace).await?;

        Ok(QueryResults {
            namespace: vmi.namespace.clone(),
            vmi_uuid: vmi.uuid.clone(),
            start_timestamp: Some(window_start(vmi.creation_time)),
            end_timestamp: None,
            pvcs,
            involved_virt_launchers: launchers,
            involved_virt_handlers: handlers,
            skipped_nodes,
            ..Default::default()
        })
    }

    async fn handler_at(
        &self,
        node_name: &str,
        reference: DateTime<Utc>,
    ) -> LogsViewerResult<Option<Pod>> {
        let pods = pods_on_node_with_prefix(&self.pool, node_name, HANDLER_NAME_PREFIX).await?;
        Ok(select_handler(&pods, node_name, reference).cloned())
    }

    async fn pvc_uuids(&self, pods: &[Pod], namespace: &str) -> LogsViewerResult<Vec<String>> {
        let names = unique_pvc_names(pods);
        let pvcs = pvcs_by_names(&self.pool, &names, namespace).await?;
        Ok(pvcs.into_iter().map(|pvc| pvc.uuid).collect())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
