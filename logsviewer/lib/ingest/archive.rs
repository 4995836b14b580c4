use std::{
    fs::File,
    io::BufReader,
    path::{Component, Path, PathBuf},
};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};

use crate::{LogsViewerError, LogsViewerResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Root directory of namespaced resource manifests.
pub const NAMESPACES_ROOT: &str = "namespaces";

/// Root directory of cluster-scoped resource manifests.
pub const CLUSTER_SCOPED_ROOT: &str = "cluster-scoped-resources";

/// Name of the file recording when the archive was gathered.
pub const TIMESTAMP_FILENAME: &str = "timestamp";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// What an extraction wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// The producer-specific prefix stripped from every resource path, if any resource was found.
    pub prefix: Option<PathBuf>,

    /// Number of regular files written, the timestamp file excluded.
    pub files: usize,

    /// Number of files written under a suffixed name because the path was taken.
    pub renamed: usize,

    /// Whether a timestamp file was written.
    pub timestamp: bool,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Extracts the resource manifests and the timestamp file of a gzip-compressed tar archive into
/// `target`.
///
/// Only entries below a `namespaces/` or `cluster-scoped-resources/` directory are extracted. The
/// path prefix in front of that directory is taken from the first such entry and stripped from
/// every entry, so archives from different producers land on the same relative paths. A file
/// whose output path is taken is written under a numbered name (`pod.yaml` -> `pod_1.yaml`). The
/// first `timestamp` file outside the resource roots is written to `target/timestamp`.
///
/// ## Errors
///
/// Returns [`LogsViewerError::Archive`] if the archive cannot be read or decompressed and
/// [`LogsViewerError::Io`] if the output cannot be written.
pub async fn extract_archive(
    archive_path: impl AsRef<Path>,
    target: impl AsRef<Path>,
) -> LogsViewerResult<Extraction> {
    let archive_path = archive_path.as_ref().to_path_buf();
    let target = target.as_ref().to_path_buf();
    tokio::fs::create_dir_all(&target).await?;

    let extraction =
        tokio::task::spawn_blocking(move || extract_blocking(&archive_path, &target)).await??;

    tracing::info!(
        files = extraction.files,
        renamed = extraction.renamed,
        prefix = ?extraction.prefix,
        "Extracted archive"
    );

    Ok(extraction)
}

fn extract_blocking(archive_path: &Path, target: &Path) -> LogsViewerResult<Extraction> {
    let archive_error = |source: std::io::Error| LogsViewerError::Archive {
        path: archive_path.to_path_buf(),
        source,
    };

    let file = File::open(archive_path).map_err(archive_error)?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));
    let mut extraction = Extraction::default();

    for entry in archive.entries().map_err(archive_error)? {
        let mut entry = entry.map_err(archive_error)?;
        let entry_path = entry.path().map_err(archive_error)?.into_owned();

        let Some(components) = normal_components(&entry_path) else {
            tracing::warn!(path = %entry_path.display(), "Skipping archive entry with unsafe path");
            continue;
        };

        let Some(root) = components
            .iter()
            .position(|c| c == NAMESPACES_ROOT || c == CLUSTER_SCOPED_ROOT)
        else {
            if components.last().map(String::as_str) == Some(TIMESTAMP_FILENAME)
                && entry.header().entry_type().is_file()
            {
                let destination = target.join(TIMESTAMP_FILENAME);
                if destination.exists() {
                    tracing::debug!(path = %entry_path.display(), "Timestamp file already extracted, skipping");
                    continue;
                }
                let mut output = File::create(&destination)?;
                std::io::copy(&mut entry, &mut output).map_err(archive_error)?;
                extraction.timestamp = true;
            }
            continue;
        };

        let prefix: &PathBuf = extraction
            .prefix
            .get_or_insert_with(|| components[..root].iter().collect());

        let relative: PathBuf = components.iter().collect();
        let relative = relative
            .strip_prefix(prefix)
            .map(Path::to_path_buf)
            .unwrap_or(relative);
        let destination = target.join(&relative);

        match entry.header().entry_type() {
            EntryType::Directory => std::fs::create_dir_all(&destination)?,
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = destination.parent() {
                    std::fs::create_dir_all(parent)?;
                }

                let free = next_free_path(&destination);
                if free != destination {
                    tracing::debug!(
                        path = %destination.display(),
                        renamed = %free.display(),
                        "Output path taken, writing under a numbered name"
                    );
                    extraction.renamed += 1;
                }

                let mut output = File::create(&free)?;
                std::io::copy(&mut entry, &mut output).map_err(archive_error)?;
                extraction.files += 1;
            }
            other => {
                tracing::debug!(path = %entry_path.display(), entry_type = ?other, "Skipping archive entry");
            }
        }
    }

    Ok(extraction)
}

/// Splits an entry path into plain components, dropping `.` and rejecting anything that could
/// escape the target directory.
fn normal_components(path: &Path) -> Option<Vec<String>> {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => components.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(components)
}

/// Returns `path` if it is free, otherwise the first free numbered variant of it.
pub fn next_free_path(path: &Path) -> PathBuf {
    let mut candidate = path.to_path_buf();
    while candidate.exists() {
        candidate = with_bumped_suffix(&candidate);
    }
    candidate
}

/// Adds `_1` in front of the extension, or increments an existing numeric `_<n>` suffix.
pub fn with_bumped_suffix(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let bumped = match stem.rsplit_once('_') {
        Some((base, index)) => match index.parse::<u64>() {
            Ok(index) => format!("{base}_{}", index + 1),
            Err(_) => format!("{stem}_1"),
        },
        None => format!("{stem}_1"),
    };

    let file_name = match path.extension() {
        Some(extension) => format!("{bumped}.{}", extension.to_string_lossy()),
        None => bumped,
    };

    path.with_file_name(file_name)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
