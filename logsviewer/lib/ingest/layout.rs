use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use walkdir::WalkDir;

use crate::{models::RecordKind, LogsViewerResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Where the manifests of one kind live in an extracted archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindLayout {
    /// The record kind.
    pub kind: RecordKind,

    /// Pattern of the one-file-per-object layout.
    pub per_object: &'static str,

    /// Pattern of the single-file layout, used when nothing matches `per_object`. A matching file
    /// may hold a list, one object or a stream of documents.
    pub fallback: &'static str,
}

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Layouts of every ingested kind, in ingestion order.
pub const KIND_LAYOUTS: [KindLayout; 7] = [
    KindLayout {
        kind: RecordKind::Pod,
        per_object: "namespaces/*/pods/*/*.yaml",
        fallback: "namespaces/*/core/pods.yaml",
    },
    KindLayout {
        kind: RecordKind::Migration,
        per_object: "namespaces/*/kubevirt.io/virtualmachineinstancemigrations/*.yaml",
        fallback: "namespaces/*/kubevirt.io/virtualmachineinstancemigrations.yaml",
    },
    KindLayout {
        kind: RecordKind::Node,
        per_object: "cluster-scoped-resources/core/nodes/*.yaml",
        fallback: "cluster-scoped-resources/core/nodes.yaml",
    },
    KindLayout {
        kind: RecordKind::Vm,
        per_object: "namespaces/*/kubevirt.io/virtualmachines/*.yaml",
        fallback: "namespaces/*/kubevirt.io/virtualmachines.yaml",
    },
    KindLayout {
        kind: RecordKind::Vmi,
        per_object: "namespaces/*/kubevirt.io/virtualmachineinstances/*.yaml",
        fallback: "namespaces/*/kubevirt.io/virtualmachineinstances.yaml",
    },
    KindLayout {
        kind: RecordKind::Pvc,
        per_object: "namespaces/*/core/persistentvolumeclaims/*.yaml",
        fallback: "namespaces/*/core/persistentvolumeclaims.yaml",
    },
    KindLayout {
        kind: RecordKind::Subscription,
        per_object: "namespaces/*/operators.coreos.com/subscriptions/*.yaml",
        fallback: "namespaces/*/operators.coreos.com/subscriptions.yaml",
    },
];

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Finds the manifest files of `layout` below `root`, in sorted path order.
///
/// Files matching the per-object pattern win. The fallback pattern is only tried when none do.
/// Copies renamed on extraction (`pods_1.yaml` next to `pods.yaml`) match the pattern of the
/// file they were renamed from.
pub fn find_manifests(root: &Path, layout: &KindLayout) -> LogsViewerResult<Vec<PathBuf>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let files = list_files(root)?;

    let per_object = matcher(layout.per_object)?;
    let found = matching(root, &files, &per_object);
    if !found.is_empty() {
        return Ok(found);
    }

    let fallback = matcher(layout.fallback)?;
    let found = matching(root, &files, &fallback);
    if !found.is_empty() {
        tracing::debug!(kind = %layout.kind, pattern = layout.fallback, "Using single-file layout");
    }

    Ok(found)
}

fn matcher(pattern: &str) -> LogsViewerResult<GlobMatcher> {
    Ok(GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()?
        .compile_matcher())
}

fn list_files(root: &Path) -> LogsViewerResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn matching(root: &Path, files: &[PathBuf], matcher: &GlobMatcher) -> Vec<PathBuf> {
    files
        .iter()
        .filter(|path| {
            path.strip_prefix(root).is_ok_and(|relative| {
                matcher.is_match(relative)
                    || name_before_rename(relative).is_some_and(|name| matcher.is_match(name))
            })
        })
        .cloned()
        .collect()
}

/// The path a renamed copy was extracted over: `dir/pods_2.yaml` gives `dir/pods.yaml`.
fn name_before_rename(relative: &Path) -> Option<PathBuf> {
    let stem = relative.file_stem()?.to_str()?;
    let (base, index) = stem.rsplit_once('_')?;
    if base.is_empty() || index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let file_name = match relative.extension().and_then(|e| e.to_str()) {
        Some(extension) => format!("{base}.{extension}"),
        None => base.to_string(),
    };
    Some(relative.with_file_name(file_name))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(kind: RecordKind) -> KindLayout {
        KIND_LAYOUTS
            .into_iter()
            .find(|layout| layout.kind == kind)
            .expect("layout for kind")
    }

    fn touch(root: &Path, relative: &str) -> anyhow::Result<()> {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().expect("parent"))?;
        std::fs::write(path, "")?;
        Ok(())
    }

    #[test]
    fn test_per_object_layout_wins() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let root = temp_dir.path();
        touch(root, "namespaces/vms/pods/b/b.yaml")?;
        touch(root, "namespaces/vms/pods/a/a.yaml")?;
        touch(root, "namespaces/vms/pods/a/logs/compute.yaml")?;
        touch(root, "namespaces/vms/core/pods.yaml")?;

        let found = find_manifests(root, &layout(RecordKind::Pod))?;
        assert_eq!(
            found,
            vec![
                root.join("namespaces/vms/pods/a/a.yaml"),
                root.join("namespaces/vms/pods/b/b.yaml"),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_falls_back_to_list_file() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let root = temp_dir.path();
        touch(root, "namespaces/vms/core/pods.yaml")?;
        touch(root, "namespaces/other/core/pods.yaml")?;
        touch(root, "namespaces/vms/core/services.yaml")?;

        let found = find_manifests(root, &layout(RecordKind::Pod))?;
        assert_eq!(
            found,
            vec![
                root.join("namespaces/other/core/pods.yaml"),
                root.join("namespaces/vms/core/pods.yaml"),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_cluster_scoped_and_missing_root() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let root = temp_dir.path();
        touch(root, "cluster-scoped-resources/core/nodes/node-a.yaml")?;

        let nodes = find_manifests(root, &layout(RecordKind::Node))?;
        assert_eq!(nodes.len(), 1);
        assert!(find_manifests(root, &layout(RecordKind::Vmi))?.is_empty());
        assert!(find_manifests(&root.join("missing"), &layout(RecordKind::Node))?.is_empty());
        Ok(())
    }

    #[test]
    fn test_fallback_includes_renamed_copies() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let root = temp_dir.path();
        touch(root, "namespaces/vms/core/pods.yaml")?;
        touch(root, "namespaces/vms/core/pods_1.yaml")?;
        touch(root, "namespaces/vms/core/pods_2.yaml")?;
        touch(root, "namespaces/vms/core/pods_backup.yaml")?;
        touch(root, "namespaces/vms/core/services_1.yaml")?;

        let found = find_manifests(root, &layout(RecordKind::Pod))?;
        assert_eq!(
            found,
            vec![
                root.join("namespaces/vms/core/pods.yaml"),
                root.join("namespaces/vms/core/pods_1.yaml"),
                root.join("namespaces/vms/core/pods_2.yaml"),
            ]
        );
        Ok(())
    }
}
