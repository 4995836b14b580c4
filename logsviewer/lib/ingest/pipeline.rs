use std::{
    collections::BTreeMap,
    fmt::{self, Display},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    management,
    manifest::{
        decode_manifests, MigrationManifest, NodeManifest, PersistentVolumeClaimManifest,
        PodManifest, SubscriptionManifest, VirtualMachineInstanceManifest, VirtualMachineManifest,
    },
    models::{ImportedMustGather, Record, RecordKind},
    store::ObjectStore,
    LogsViewerError, LogsViewerResult,
};

use super::{
    extract_archive, find_manifests, read_gather_timestamp, EnrichmentTable, Extraction,
    KIND_LAYOUTS,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Turns must-gather archives into canonical records and hands them to the persistence queue.
///
/// Only one archive is processed at a time; concurrent calls wait for the running one to finish
/// because they share the staging directory.
#[derive(Debug)]
pub struct Ingester {
    store: ObjectStore,
    staging_dir: PathBuf,
    enrichment_file: PathBuf,
    session: Mutex<()>,
}

/// The outcome of ingesting one archive.
#[derive(Debug)]
pub struct IngestReport {
    /// When the archive was gathered.
    pub gather_time: DateTime<Utc>,

    /// What was extracted.
    pub extraction: Extraction,

    /// Number of records handed to the store.
    pub imported: usize,

    /// Records handed to the store, per kind.
    pub per_kind: BTreeMap<RecordKind, usize>,

    /// Manifest files that could not be read or decoded.
    pub errors: Vec<FileError>,
}

/// A manifest file that was skipped.
#[derive(Debug)]
pub struct FileError {
    /// The file, inside the staging directory.
    pub path: PathBuf,

    /// Why it was skipped.
    pub error: LogsViewerError,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Ingester {
    /// Creates an ingester extracting into `staging_dir` and keeping enrichment data in
    /// `enrichment_file`.
    pub fn new(
        store: ObjectStore,
        staging_dir: impl Into<PathBuf>,
        enrichment_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            staging_dir: staging_dir.into(),
            enrichment_file: enrichment_file.into(),
            session: Mutex::new(()),
        }
    }

    /// The store records are handed to.
    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    /// Imports an archive: rejects it if an archive with the same file name was imported before,
    /// ingests it, records it in the import ledger and waits until every record is stored.
    ///
    /// The store's workers must be running.
    pub async fn import(&self, archive: impl AsRef<Path>) -> LogsViewerResult<IngestReport> {
        let archive = archive.as_ref();
        let name = archive
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                LogsViewerError::InvalidArgument(format!("not a file: {}", archive.display()))
            })?;

        let _session = self.session.lock().await;

        let pool = self.store.pool().await?;
        if management::is_already_imported(&pool, &name).await? {
            tracing::warn!(archive = %name, "Must-gather already imported");
            return Err(LogsViewerError::AlreadyImported(name));
        }

        let report = self.ingest_locked(archive).await?;

        self.store.add(Record::ImportedMustGather(ImportedMustGather {
            name: name.clone(),
            import_time: Utc::now(),
            gather_time: report.gather_time,
        }));
        self.store.drain().await;

        tracing::info!(
            archive = %name,
            imported = report.imported,
            errors = report.errors.len(),
            stats = ?self.store.stats(),
            "Imported must-gather"
        );

        Ok(report)
    }

    /// Extracts an archive into the staging directory and enqueues a record for every manifest
    /// found. A manifest that cannot be decoded is reported in [`IngestReport::errors`] and
    /// skipped.
    ///
    /// ## Errors
    ///
    /// Fails if the archive cannot be extracted or carries no valid `timestamp` file.
    pub async fn ingest(&self, archive: impl AsRef<Path>) -> LogsViewerResult<IngestReport> {
        let _session = self.session.lock().await;
        self.ingest_locked(archive.as_ref()).await
    }

    async fn ingest_locked(&self, archive: &Path) -> LogsViewerResult<IngestReport> {
        if is_within(archive, &self.staging_dir).await {
            return Err(LogsViewerError::InvalidArgument(format!(
                "archive must live outside the staging directory: {}",
                archive.display()
            )));
        }

        self.reset_staging().await?;
        let extraction = extract_archive(archive, &self.staging_dir).await?;
        let gather_time = read_gather_timestamp(&self.staging_dir).await?;

        let mut enrichment = EnrichmentTable::load(&self.enrichment_file).await?;
        let mut report = IngestReport {
            gather_time,
            extraction,
            imported: 0,
            per_kind: BTreeMap::new(),
            errors: Vec::new(),
        };

        for layout in KIND_LAYOUTS.iter() {
            let files = find_manifests(&self.staging_dir, layout)?;
            tracing::info!(kind = %layout.kind, files = files.len(), "Processing manifests");

            for path in files {
                let records = match read_and_decode(layout.kind, &path).await {
                    Ok(records) => records,
                    Err(error) => {
                        tracing::warn!(path = %path.display(), %error, "Skipping manifest");
                        report.errors.push(FileError { path, error });
                        continue;
                    }
                };

                for record in records {
                    if let Record::Pod(pod) = &record {
                        enrichment.insert_pod(pod);
                    }
                    *report.per_kind.entry(layout.kind).or_default() += 1;
                    report.imported += 1;
                    self.store.add(record);
                }
            }
        }

        enrichment.save(&self.enrichment_file).await?;
        Ok(report)
    }

    async fn reset_staging(&self) -> LogsViewerResult<()> {
        match tokio::fs::remove_dir_all(&self.staging_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&self.staging_dir).await?;
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Whether `path` lies below `dir`, comparing resolved paths when they exist so that `..`
/// components and symlinks cannot hide the relation.
async fn is_within(path: &Path, dir: &Path) -> bool {
    if path.starts_with(dir) {
        return true;
    }

    match (
        tokio::fs::canonicalize(path).await,
        tokio::fs::canonicalize(dir).await,
    ) {
        (Ok(path), Ok(dir)) => path.starts_with(dir),
        _ => false,
    }
}

async fn read_and_decode(kind: RecordKind, path: &Path) -> LogsViewerResult<Vec<Record>> {
    let bytes = tokio::fs::read(path).await?;
    match kind {
        RecordKind::Pod => decode_manifests::<PodManifest>(path, &bytes),
        RecordKind::Node => decode_manifests::<NodeManifest>(path, &bytes),
        RecordKind::Vm => decode_manifests::<VirtualMachineManifest>(path, &bytes),
        RecordKind::Vmi => decode_manifests::<VirtualMachineInstanceManifest>(path, &bytes),
        RecordKind::Migration => decode_manifests::<MigrationManifest>(path, &bytes),
        RecordKind::Pvc => decode_manifests::<PersistentVolumeClaimManifest>(path, &bytes),
        RecordKind::Subscription => decode_manifests::<SubscriptionManifest>(path, &bytes),
        RecordKind::ImportedMustGather => Err(LogsViewerError::InvalidArgument(
            "import ledger entries have no manifests".to_string(),
        )),
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.error)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::fs::File;

    use flate2::{write::GzEncoder, Compression};
    use tar::{Builder, Header};
    use tokio::sync::watch;

    use crate::store::StoreOptions;

    use super::*;

    const TIMESTAMP: &str = "2024-03-01 08:00:00.0 +0000 UTC m=+0.1";

    fn pod_yaml(name: &str, uid: &str) -> String {
        format!(
            r#"apiVersion: v1
kind: Pod
metadata:
  name: {name}
  namespace: vms
  uid: {uid}
  creationTimestamp: "2024-03-01T07:00:00Z"
  labels:
    kubevirt.io/created-by: vmi-1
spec:
  nodeName: node-a
  containers:
    - name: compute
status:
  phase: Running
  hostIP: 10.0.0.7
"#
        )
    }

    fn write_archive(path: &Path, entries: &[(String, String)]) -> anyhow::Result<()> {
        let encoder = GzEncoder::new(File::create(path)?, Compression::default());
        let mut builder = Builder::new(encoder);
        for (name, content) in entries {
            let mut header = Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, name, content.as_bytes())?;
        }
        builder.into_inner()?.finish()?;
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_import_stores_records_and_ledger() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let home = temp_dir.path().join("home");
        let archive = temp_dir.path().join("must-gather.tar.gz");
        write_archive(
            &archive,
            &[
                ("mg/timestamp".to_string(), TIMESTAMP.to_string()),
                (
                    "mg/namespaces/vms/pods/virt-launcher-a/virt-launcher-a.yaml".to_string(),
                    pod_yaml("virt-launcher-a", "pod-a"),
                ),
                (
                    "mg/namespaces/vms/pods/broken/broken.yaml".to_string(),
                    "metadata: [not, a, map".to_string(),
                ),
            ],
        )?;

        let store = ObjectStore::new(home.join("logsviewer.db"), StoreOptions::default());
        let (stop_tx, stop_rx) = watch::channel(false);
        let runner = {
            let store = store.clone();
            tokio::spawn(async move { store.run(2, stop_rx).await })
        };

        let ingester = Ingester::new(store.clone(), home.join("space"), home.join("result.json"));
        let report = ingester.import(&archive).await?;

        assert_eq!(report.imported, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].path.ends_with("broken.yaml"));
        assert_eq!(report.per_kind.get(&RecordKind::Pod), Some(&1));

        let pool = store.pool().await?;
        let pod = management::get_pod(&pool, "pod-a").await?;
        assert_eq!(pod.created_by.as_deref(), Some("vmi-1"));
        assert!(management::is_already_imported(&pool, "must-gather.tar.gz").await?);

        let enrichment = EnrichmentTable::load(home.join("result.json")).await?;
        assert_eq!(
            enrichment.get("vms", "virt-launcher-a").map(|e| e.host_ip.as_str()),
            Some("10.0.0.7")
        );

        let again = ingester.import(&archive).await;
        assert!(matches!(again, Err(LogsViewerError::AlreadyImported(_))));

        stop_tx.send(true)?;
        runner.await??;
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_missing_timestamp_aborts_ingest() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let archive = temp_dir.path().join("no-timestamp.tar.gz");
        write_archive(
            &archive,
            &[(
                "mg/namespaces/vms/pods/a/a.yaml".to_string(),
                pod_yaml("a", "pod-a"),
            )],
        )?;

        let store = ObjectStore::new(temp_dir.path().join("db"), StoreOptions::default());
        let ingester = Ingester::new(
            store,
            temp_dir.path().join("space"),
            temp_dir.path().join("result.json"),
        );

        let result = ingester.ingest(&archive).await;
        assert!(matches!(result, Err(LogsViewerError::TimestampMissing(_))));
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_archive_reached_through_dotdot_inside_staging_is_rejected() -> anyhow::Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let staging = temp_dir.path().join("space");
        let detour = temp_dir.path().join("uploads");
        std::fs::create_dir_all(&staging)?;
        std::fs::create_dir_all(&detour)?;

        let archive = staging.join("must-gather.tar.gz");
        write_archive(&archive, &[("mg/timestamp".to_string(), TIMESTAMP.to_string())])?;

        let store = ObjectStore::new(temp_dir.path().join("db"), StoreOptions::default());
        let ingester = Ingester::new(store, &staging, temp_dir.path().join("result.json"));

        let sneaky = detour.join("..").join("space").join("must-gather.tar.gz");
        let result = ingester.ingest(&sneaky).await;
        assert!(matches!(result, Err(LogsViewerError::InvalidArgument(_))));
        assert!(archive.is_file());
        Ok(())
    }
}
