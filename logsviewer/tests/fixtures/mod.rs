//! Builders for must-gather fixture archives and a running ingestion stack.

#![allow(dead_code)]

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use flate2::{write::GzEncoder, Compression};
use logsviewer::{
    ingest::Ingester,
    resolver::Resolver,
    store::{ObjectStore, StoreOptions},
    LogsViewerResult,
};
use sqlx::{Pool, Sqlite};
use tar::{Builder, Header};
use tempfile::TempDir;
use tokio::{sync::watch, task::JoinHandle};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

pub const TIMESTAMP: &str = "2024-03-01 09:00:00.123456 +0000 UTC m=+0.004512";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A must-gather archive under construction.
#[derive(Debug, Default)]
pub struct ArchiveFixture {
    prefix: String,
    entries: Vec<(String, String)>,
}

/// A store with running workers and an ingester writing to it.
pub struct Stack {
    pub temp_dir: TempDir,
    pub store: ObjectStore,
    pub ingester: Ingester,
    stop: watch::Sender<bool>,
    runner: JoinHandle<LogsViewerResult<()>>,
}

/// A launcher or handler pod in a fixture.
#[derive(Debug, Clone)]
pub struct PodFixture<'a> {
    pub uid: &'a str,
    pub name: &'a str,
    pub namespace: &'a str,
    pub node: &'a str,
    pub created: &'a str,
    pub created_by: Option<&'a str>,
    pub pvcs: &'a [&'a str],
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ArchiveFixture {
    /// An archive whose entries live below `prefix`, with a valid timestamp file.
    pub fn new(prefix: &str) -> Self {
        let mut fixture = Self {
            prefix: prefix.trim_end_matches('/').to_string(),
            entries: Vec::new(),
        };
        fixture.entries.push((fixture.path("timestamp"), TIMESTAMP.to_string()));
        fixture
    }

    /// An archive without a timestamp file.
    pub fn without_timestamp(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
            entries: Vec::new(),
        }
    }

    /// Adds a file at `relative` below the prefix.
    pub fn file(mut self, relative: &str, content: impl Into<String>) -> Self {
        let path = self.path(relative);
        self.entries.push((path, content.into()));
        self
    }

    /// Adds a pod in the one-file-per-object layout.
    pub fn pod(self, pod: &PodFixture) -> Self {
        let relative = format!(
            "namespaces/{ns}/pods/{name}/{name}.yaml",
            ns = pod.namespace,
            name = pod.name
        );
        self.file(&relative, pod_yaml(pod))
    }

    /// Writes the archive to `path`.
    pub fn write(&self, path: &Path) -> anyhow::Result<PathBuf> {
        let encoder = GzEncoder::new(File::create(path)?, Compression::default());
        let mut builder = Builder::new(encoder);
        for (name, content) in &self.entries {
            let mut header = Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, name, content.as_bytes())?;
        }
        builder.into_inner()?.finish()?;
        Ok(path.to_path_buf())
    }

    fn path(&self, relative: &str) -> String {
        if self.prefix.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{}", self.prefix, relative)
        }
    }
}

impl Stack {
    /// Starts two workers on a fresh database.
    pub async fn start() -> anyhow::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let home = temp_dir.path().join("home");

        let store = ObjectStore::new(home.join("logsviewer.db"), StoreOptions::default());
        let (stop, stop_rx) = watch::channel(false);
        let runner = {
            let store = store.clone();
            tokio::spawn(async move { store.run(2, stop_rx).await })
        };

        let ingester = Ingester::new(store.clone(), home.join("space"), home.join("result.json"));

        Ok(Self {
            temp_dir,
            store,
            ingester,
            stop,
            runner,
        })
    }

    /// Where fixture archives are written.
    pub fn archive_path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// The database pool.
    pub async fn pool(&self) -> anyhow::Result<Pool<Sqlite>> {
        Ok(self.store.pool().await?)
    }

    /// A resolver over the database.
    pub async fn resolver(&self) -> anyhow::Result<Resolver> {
        Ok(Resolver::new(self.pool().await?))
    }

    /// Stops the workers.
    pub async fn stop(self) -> anyhow::Result<()> {
        self.stop.send(true)?;
        self.runner.await??;
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

pub fn pod_yaml(pod: &PodFixture) -> String {
    let labels = match pod.created_by {
        Some(owner) => format!("  labels:\n    kubevirt.io/created-by: {owner}\n"),
        None => String::new(),
    };

    let mut volumes = String::new();
    if !pod.pvcs.is_empty() {
        volumes.push_str("  volumes:\n");
        for claim in pod.pvcs {
            volumes.push_str(&format!(
                "    - name: {claim}\n      persistentVolumeClaim:\n        claimName: {claim}\n"
            ));
        }
    }

    format!(
        r#"apiVersion: v1
kind: Pod
metadata:
  name: {name}
  namespace: {namespace}
  uid: {uid}
  creationTimestamp: "{created}"
{labels}spec:
  nodeName: {node}
  containers:
    - name: compute
{volumes}status:
  phase: Running
  hostIP: 10.0.0.1
  containerStatuses:
    - name: compute
      state:
        running:
          startedAt: "{created}"
"#,
        name = pod.name,
        namespace = pod.namespace,
        uid = pod.uid,
        created = pod.created,
        node = pod.node,
    )
}

pub fn handler(uid: &'static str, node: &'static str) -> PodFixture<'static> {
    PodFixture {
        uid,
        name: uid,
        namespace: "openshift-cnv",
        node,
        created: "2024-03-01T07:00:00Z",
        created_by: None,
        pvcs: &[],
    }
}

pub fn vmi_yaml(uid: &str, name: &str, namespace: &str, node: &str, created: &str) -> String {
    format!(
        r#"apiVersion: kubevirt.io/v1
kind: VirtualMachineInstance
metadata:
  name: {name}
  namespace: {namespace}
  uid: {uid}
  creationTimestamp: "{created}"
status:
  phase: Running
  nodeName: {node}
"#
    )
}

pub fn pvc_yaml(uid: &str, name: &str, namespace: &str) -> String {
    format!(
        r#"apiVersion: v1
kind: PersistentVolumeClaim
metadata:
  name: {name}
  namespace: {namespace}
  uid: {uid}
  creationTimestamp: "2024-03-01T07:30:00Z"
spec:
  accessModes: [ReadWriteMany]
  storageClassName: ocs-storagecluster-ceph-rbd
  volumeName: pvc-{uid}
  volumeMode: Block
status:
  phase: Bound
  capacity:
    storage: 30Gi
"#
    )
}

pub fn node_yaml(name: &str) -> String {
    format!(
        r#"apiVersion: v1
kind: Node
metadata:
  name: {name}
status:
  conditions:
    - type: Ready
      status: "True"
  addresses:
    - type: InternalIP
      address: 10.0.0.1
    - type: Hostname
      address: {name}
  nodeInfo:
    systemUUID: sys-{name}
    osImage: Red Hat Enterprise Linux CoreOS
    kernelVersion: 5.14.0
    kubeletVersion: v1.29.0
    containerRuntimeVersion: cri-o://1.29.0
"#
    )
}
