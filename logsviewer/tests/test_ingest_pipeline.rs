mod fixtures;

use fixtures::{handler, node_yaml, pvc_yaml, vmi_yaml, ArchiveFixture, PodFixture, Stack};
use logsviewer::{
    ingest::EnrichmentTable,
    management::{self, ListFilter, StatusBucket},
    models::RecordKind,
    LogsViewerError,
};

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_single_file_layout_yields_one_record_per_item() -> anyhow::Result<()> {
    let stack = Stack::start().await?;

    let pods = r#"apiVersion: v1
kind: List
items:
  - metadata:
      name: web-0
      namespace: shop
      uid: pod-web-0
      creationTimestamp: "2024-03-01T07:00:00Z"
    spec:
      nodeName: node-a
    status:
      phase: Running
  - metadata:
      name: web-1
      namespace: shop
      uid: pod-web-1
      creationTimestamp: "2024-03-01T07:01:00Z"
    spec:
      nodeName: node-a
    status:
      phase: Pending
  - metadata:
      name: web-2
      namespace: shop
      uid: pod-web-2
      creationTimestamp: "2024-03-01T07:02:00Z"
    spec:
      nodeName: node-b
    status:
      phase: Failed
"#;
    let archive = ArchiveFixture::new("must-gather.local.123/quay-io-image-sha256")
        .file("namespaces/shop/core/pods.yaml", pods)
        .file("cluster-scoped-resources/core/nodes.yaml", node_yaml("node-a"))
        .write(&stack.archive_path("list-layout.tar.gz"))?;

    let report = stack.ingester.import(&archive).await?;
    assert_eq!(report.per_kind.get(&RecordKind::Pod), Some(&3));
    assert_eq!(report.per_kind.get(&RecordKind::Node), Some(&1));
    assert!(report.errors.is_empty());

    let pool = stack.pool().await?;
    let page = management::list_pods(&pool, &ListFilter::default()).await?;
    assert_eq!(page.meta.total_rows, 3);

    let running = management::list_pods(
        &pool,
        &ListFilter {
            status: Some(StatusBucket::Running),
            ..ListFilter::default()
        },
    )
    .await?;
    let names: Vec<_> = running.data.iter().map(|pod| pod.name.as_str()).collect();
    assert_eq!(names, vec!["web-0"]);

    let node = management::get_node(&pool, "node-a").await?;
    assert_eq!(node.name, "node-a");

    stack.stop().await
}

#[test_log::test(tokio::test)]
async fn test_colliding_list_files_are_both_ingested() -> anyhow::Result<()> {
    let stack = Stack::start().await?;

    let list = |names: &[&str]| {
        let items: String = names
            .iter()
            .map(|name| {
                format!(
                    "  - metadata:\n      name: {name}\n      namespace: shop\n      uid: uid-{name}\n      creationTimestamp: \"2024-03-01T07:00:00Z\"\n    spec:\n      nodeName: node-a\n    status:\n      phase: Running\n"
                )
            })
            .collect();
        format!("apiVersion: v1\nkind: List\nitems:\n{items}")
    };

    let archive = ArchiveFixture::new("mg")
        .file("namespaces/shop/core/pods.yaml", list(&["web-0", "web-1"]))
        .file("namespaces/shop/core/pods.yaml", list(&["db-0"]))
        .write(&stack.archive_path("collision.tar.gz"))?;

    let report = stack.ingester.import(&archive).await?;
    assert_eq!(report.extraction.renamed, 1);
    assert_eq!(report.per_kind.get(&RecordKind::Pod), Some(&3));
    assert!(report.errors.is_empty());

    let pool = stack.pool().await?;
    for uid in ["uid-web-0", "uid-web-1", "uid-db-0"] {
        assert_eq!(management::get_pod(&pool, uid).await?.namespace, "shop");
    }

    stack.stop().await
}

#[test_log::test(tokio::test)]
async fn test_prefix_depth_does_not_change_extracted_paths() -> anyhow::Result<()> {
    let stack = Stack::start().await?;
    let pod = PodFixture {
        uid: "pod-1",
        name: "virt-launcher-fedora-abcde",
        namespace: "vms",
        node: "node-a",
        created: "2024-03-01T08:00:00Z",
        created_by: Some("vmi-1"),
        pvcs: &[],
    };

    let shallow = ArchiveFixture::new("mg")
        .pod(&pod)
        .write(&stack.archive_path("shallow.tar.gz"))?;
    let deep = ArchiveFixture::new("must-gather.local.42/registry-redhat-io-cnv-must-gather/extra")
        .pod(&pod)
        .write(&stack.archive_path("deep.tar.gz"))?;

    let staged = stack
        .temp_dir
        .path()
        .join("home/space/namespaces/vms/pods/virt-launcher-fedora-abcde/virt-launcher-fedora-abcde.yaml");

    let shallow = stack.ingester.ingest(&shallow).await?;
    assert!(staged.is_file());
    let deep = stack.ingester.ingest(&deep).await?;
    assert!(staged.is_file());

    assert_eq!(shallow.extraction.prefix.as_deref(), Some(std::path::Path::new("mg")));
    assert_eq!(
        deep.extraction.prefix.as_deref(),
        Some(std::path::Path::new(
            "must-gather.local.42/registry-redhat-io-cnv-must-gather/extra"
        ))
    );
    assert_eq!(shallow.extraction.files, deep.extraction.files);
    assert!(shallow.extraction.timestamp);
    assert!(deep.extraction.timestamp);
    assert_eq!(shallow.imported, 1);
    assert_eq!(deep.imported, 1);

    stack.store.drain().await;
    let pool = stack.pool().await?;
    assert_eq!(management::get_pod(&pool, "pod-1").await?.namespace, "vms");

    stack.stop().await
}

#[test_log::test(tokio::test)]
async fn test_malformed_manifest_does_not_abort_import() -> anyhow::Result<()> {
    let stack = Stack::start().await?;

    let names: Vec<String> = (0..10).map(|i| format!("worker-{i}")).collect();
    let uids: Vec<String> = (0..10).map(|i| format!("pod-{i}")).collect();

    let mut archive = ArchiveFixture::new("mg");
    for (i, (name, uid)) in names.iter().zip(&uids).enumerate() {
        if i == 4 {
            archive = archive.file(
                &format!("namespaces/batch/pods/{name}/{name}.yaml"),
                "metadata:\n  name: [unterminated\n",
            );
            continue;
        }
        archive = archive.pod(&PodFixture {
            uid,
            name,
            namespace: "batch",
            node: "node-a",
            created: "2024-03-01T08:00:00Z",
            created_by: None,
            pvcs: &[],
        });
    }
    let archive = archive.write(&stack.archive_path("partly-broken.tar.gz"))?;

    let report = stack.ingester.import(&archive).await?;
    assert_eq!(report.imported, 9);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].path.ends_with("worker-4.yaml"));

    let pool = stack.pool().await?;
    let stats = management::resource_stats(&pool).await?;
    assert_eq!(stats.get(&RecordKind::Pod), Some(&9));
    assert!(matches!(
        management::get_pod(&pool, "pod-4").await,
        Err(LogsViewerError::EntityNotFound { .. })
    ));

    stack.stop().await
}

#[test_log::test(tokio::test)]
async fn test_reimport_of_same_archive_is_rejected() -> anyhow::Result<()> {
    let stack = Stack::start().await?;
    let archive = ArchiveFixture::new("mg")
        .pod(&handler("virt-handler-aaaaa", "node-a"))
        .write(&stack.archive_path("cluster-a.tar.gz"))?;

    let first = stack.ingester.import(&archive).await?;
    assert_eq!(first.imported, 1);

    let second = stack.ingester.import(&archive).await;
    assert!(matches!(
        second,
        Err(LogsViewerError::AlreadyImported(ref name)) if name == "cluster-a.tar.gz"
    ));

    let pool = stack.pool().await?;
    let imports = management::list_imports(&pool).await?;
    assert_eq!(imports.len(), 1);
    assert_eq!(imports[0].name, "cluster-a.tar.gz");
    assert_eq!(
        imports[0].gather_time.to_rfc3339(),
        "2024-03-01T09:00:00.123456+00:00"
    );

    stack.stop().await
}

#[test_log::test(tokio::test)]
async fn test_archive_without_timestamp_is_rejected() -> anyhow::Result<()> {
    let stack = Stack::start().await?;
    let archive = ArchiveFixture::without_timestamp("mg")
        .pod(&handler("virt-handler-aaaaa", "node-a"))
        .write(&stack.archive_path("no-timestamp.tar.gz"))?;

    let result = stack.ingester.import(&archive).await;
    assert!(matches!(result, Err(LogsViewerError::TimestampMissing(_))));

    let pool = stack.pool().await?;
    assert!(management::list_imports(&pool).await?.is_empty());

    stack.stop().await
}

#[test_log::test(tokio::test)]
async fn test_multi_document_vmi_stream_and_enrichment() -> anyhow::Result<()> {
    let stack = Stack::start().await?;

    let stream = format!(
        "{}---\n{}",
        vmi_yaml("vmi-1", "fedora", "vms", "node-a", "2024-03-01T08:00:00Z"),
        vmi_yaml("vmi-2", "rhel", "vms", "node-b", "2024-03-01T08:05:00Z"),
    );
    let archive = ArchiveFixture::new("mg")
        .file("namespaces/vms/kubevirt.io/virtualmachineinstances.yaml", stream)
        .file(
            "namespaces/vms/core/persistentvolumeclaims/rootdisk.yaml",
            pvc_yaml("pvc-1", "rootdisk", "vms"),
        )
        .pod(&PodFixture {
            uid: "pod-1",
            name: "virt-launcher-fedora-abcde",
            namespace: "vms",
            node: "node-a",
            created: "2024-03-01T08:00:10Z",
            created_by: Some("vmi-1"),
            pvcs: &["rootdisk"],
        })
        .write(&stack.archive_path("vmis.tar.gz"))?;

    let report = stack.ingester.import(&archive).await?;
    assert_eq!(report.per_kind.get(&RecordKind::Vmi), Some(&2));

    let pool = stack.pool().await?;
    assert_eq!(management::get_vmi(&pool, "vmi-2").await?.node_name, "node-b");

    let pvcs = management::vmi_pvcs(&pool, "vmi-1").await?;
    let uids: Vec<_> = pvcs.iter().map(|pvc| pvc.uuid.as_str()).collect();
    assert_eq!(uids, vec!["pvc-1"]);

    let enrichment = EnrichmentTable::load(stack.temp_dir.path().join("home/result.json")).await?;
    let entry = enrichment
        .get("vms", "virt-launcher-fedora-abcde")
        .expect("enrichment entry for the launcher");
    assert_eq!(entry.host_name, "node-a");
    assert_eq!(entry.host_ip, "10.0.0.1");
    assert_eq!(entry.uid, "pod-1");

    stack.stop().await
}
