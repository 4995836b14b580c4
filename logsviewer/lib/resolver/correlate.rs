//! Correlation heuristics over plain rows.
//!
//! The store keeps no relations between snapshots, so these functions rebuild them from owner
//! labels, node names and creation timestamps. They never touch the store.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use crate::models::Pod;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Name prefix of the per-node KubeVirt handler pods.
pub const HANDLER_NAME_PREFIX: &str = "virt-handler";

/// How far a window starts before the earliest relevant timestamp.
pub const LEAD_TIME_SECS: i64 = 30;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Whether `pod` is the virt-handler of `node_name`.
pub fn is_handler_pod(pod: &Pod, node_name: &str) -> bool {
    pod.node_name == node_name && pod.name.starts_with(HANDLER_NAME_PREFIX)
}

/// Whether `pod` was created by the VMI `vmi_uuid`.
pub fn is_launcher_of(pod: &Pod, vmi_uuid: &str) -> bool {
    pod.created_by.as_deref() == Some(vmi_uuid)
}

/// Picks the launcher that was running on the source node when a migration started.
///
/// Candidates are the pods created by the VMI on `source_node` whose creation time lies within
/// `[vmi_created, migration_start]`. The candidate created last wins; equal creation times fall
/// back to the smaller UUID.
pub fn select_source_launcher<'a>(
    pods: &'a [Pod],
    vmi_uuid: &str,
    source_node: &str,
    vmi_created: DateTime<Utc>,
    migration_start: DateTime<Utc>,
) -> Option<&'a Pod> {
    pods.iter()
        .filter(|pod| is_launcher_of(pod, vmi_uuid) && pod.node_name == source_node)
        .filter(|pod| pod.creation_time >= vmi_created && pod.creation_time <= migration_start)
        .min_by(|a, b| {
            b.creation_time
                .cmp(&a.creation_time)
                .then_with(|| a.uuid.cmp(&b.uuid))
        })
}

/// Picks the launcher of a VMI on a node: the earliest created one.
pub fn select_launcher<'a>(pods: &'a [Pod], vmi_uuid: &str, node_name: &str) -> Option<&'a Pod> {
    pods.iter()
        .filter(|pod| is_launcher_of(pod, vmi_uuid) && pod.node_name == node_name)
        .min_by(|a, b| oldest_first(a, b))
}

/// Picks the virt-handler of a node as seen at `reference`.
///
/// The most recently created handler created at or before `reference` wins. When every handler
/// is younger than `reference`, the earliest created one is used.
pub fn select_handler<'a>(
    pods: &'a [Pod],
    node_name: &str,
    reference: DateTime<Utc>,
) -> Option<&'a Pod> {
    let handlers = || pods.iter().filter(|pod| is_handler_pod(pod, node_name));

    handlers()
        .filter(|pod| pod.creation_time <= reference)
        .max_by(|a, b| oldest_first(a, b))
        .or_else(|| handlers().min_by(|a, b| oldest_first(a, b)))
}

/// The distinct nodes the launchers ran on, in order of first visit, each with the creation time
/// of the first launcher scheduled there.
pub fn visited_nodes(launchers: &[Pod]) -> Vec<(String, DateTime<Utc>)> {
    let mut sorted: Vec<&Pod> = launchers.iter().collect();
    sorted.sort_by(|a, b| oldest_first(a, b));

    let mut nodes: Vec<(String, DateTime<Utc>)> = Vec::new();
    for pod in sorted {
        if pod.node_name.is_empty() || nodes.iter().any(|(name, _)| *name == pod.node_name) {
            continue;
        }
        nodes.push((pod.node_name.clone(), pod.creation_time));
    }

    nodes
}

/// The PVC names mounted by the pods, de-duplicated in first-seen order.
pub fn unique_pvc_names(pods: &[Pod]) -> Vec<String> {
    let mut seen = HashSet::new();
    pods.iter()
        .flat_map(|pod| pod.pvc_names())
        .filter(|name| seen.insert(*name))
        .map(str::to_string)
        .collect()
}

/// The start of a log window whose earliest relevant event happened at `earliest`.
pub fn window_start(earliest: DateTime<Utc>) -> DateTime<Utc> {
    earliest - Duration::seconds(LEAD_TIME_SECS)
}

fn oldest_first(a: &Pod, b: &Pod) -> std::cmp::Ordering {
    a.creation_time
        .cmp(&b.creation_time)
        .then_with(|| a.uuid.cmp(&b.uuid))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
