use geosync::config::{GeoFileSpec, SyncConfig};
use geosync::cycle::{self, Phase};
use geosync::store::LocalStore;
use geosync::test_support::{FakeContainer, InMemoryRemote, InMemoryRuntime};

fn four_file_config(cache_dir: &std::path::Path) -> SyncConfig {
    SyncConfig {
        files: vec![
            GeoFileSpec::new("https://geo.test/geoip.dat", "geoip.dat"),
            GeoFileSpec::new("https://geo.test/geosite.dat", "geosite.dat"),
            GeoFileSpec::new("https://geo.test/ru/geoip.dat", "geoip_RU.dat"),
            GeoFileSpec::new("https://geo.test/ru/geosite.dat", "geosite_RU.dat"),
        ],
        container_name: "3x-ui".into(),
        container_dir: "/app/bin".into(),
        process_name: "xray-linux".into(),
        cache_dir: cache_dir.to_path_buf(),
        ..SyncConfig::default()
    }
}

fn populated_remote(config: &SyncConfig) -> InMemoryRemote {
    let mut remote = InMemoryRemote::new();
    for (i, spec) in config.files.iter().enumerate() {
        remote.put(&spec.url, vec![b'x'; 100 + i]);
    }
    remote
}

fn xray_container() -> FakeContainer {
    FakeContainer::new("c1", "3x-ui").with_process(42, "xray-linux")
}

#[tokio::test]
async fn cold_start_downloads_uploads_and_reloads_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = four_file_config(dir.path());
    let store = LocalStore::open(&config.cache_dir).unwrap();
    let remote = populated_remote(&config);
    let runtime = InMemoryRuntime::new();
    runtime.add_container(xray_container());

    let outcome = cycle::run_cycle(&config, &remote, &runtime, &store)
        .await
        .unwrap();

    assert_eq!(outcome.downloaded, 4);
    assert_eq!(outcome.uploaded, 4);
    assert!(outcome.reload_triggered);
    assert!(outcome.updated());
    assert!(outcome.is_clean());

    // exactly one reload signal, never one per file
    assert_eq!(runtime.kills(), vec![42]);

    // container copies match the local cache byte-for-byte in size
    for spec in &config.files {
        let path = format!("/app/bin/{}", spec.filename);
        assert_eq!(
            runtime.file_size("3x-ui", &path),
            Some(store.size_of(&spec.filename))
        );
    }
}

#[tokio::test]
async fn all_in_sync_is_a_no_op_without_reload() {
    let dir = tempfile::tempdir().unwrap();
    let config = four_file_config(dir.path());
    let store = LocalStore::open(&config.cache_dir).unwrap();
    let remote = populated_remote(&config);

    let mut container = xray_container();
    for (i, spec) in config.files.iter().enumerate() {
        let bytes = vec![b'x'; 100 + i];
        std::fs::write(store.path_for(&spec.filename), &bytes).unwrap();
        container = container.with_file(format!("/app/bin/{}", spec.filename), bytes.len() as u64);
    }
    let runtime = InMemoryRuntime::new();
    runtime.add_container(container);

    let outcome = cycle::run_cycle(&config, &remote, &runtime, &store)
        .await
        .unwrap();

    assert_eq!(outcome.downloaded, 0);
    assert_eq!(outcome.uploaded, 0);
    assert!(!outcome.reload_triggered);
    assert!(!outcome.updated());
    assert_eq!(remote.downloads(), 0);
    assert!(runtime.kills().is_empty());
    assert!(runtime.uploads().is_empty());
}

#[tokio::test]
async fn missing_size_indicator_fails_that_file_only() {
    let dir = tempfile::tempdir().unwrap();
    let config = four_file_config(dir.path());
    let store = LocalStore::open(&config.cache_dir).unwrap();

    let mut remote = InMemoryRemote::new();
    let mut container = xray_container();
    for (i, spec) in config.files.iter().enumerate() {
        let bytes = vec![b'x'; 100 + i];
        std::fs::write(store.path_for(&spec.filename), &bytes).unwrap();
        container = container.with_file(format!("/app/bin/{}", spec.filename), bytes.len() as u64);
        if i == 1 {
            remote.put_without_size(&spec.url, bytes);
        } else {
            remote.put(&spec.url, bytes);
        }
    }
    let runtime = InMemoryRuntime::new();
    runtime.add_container(container);

    let outcome = cycle::run_cycle(&config, &remote, &runtime, &store)
        .await
        .unwrap();

    // the probe failure is surfaced, not silently skipped
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].filename, "geosite.dat");
    assert_eq!(outcome.failures[0].phase, Phase::Download);

    // the other three files were still processed, and were in sync
    assert_eq!(outcome.downloaded, 0);
    assert_eq!(outcome.uploaded, 0);
    assert!(!outcome.reload_triggered);
}

#[tokio::test]
async fn recreated_container_is_resynced_without_new_downloads() {
    let dir = tempfile::tempdir().unwrap();
    let config = four_file_config(dir.path());
    let store = LocalStore::open(&config.cache_dir).unwrap();
    let remote = populated_remote(&config);

    // local cache already matches upstream, but the container was recreated
    // and lost its copies
    for (i, spec) in config.files.iter().enumerate() {
        std::fs::write(store.path_for(&spec.filename), vec![b'x'; 100 + i]).unwrap();
    }
    let runtime = InMemoryRuntime::new();
    runtime.add_container(xray_container());

    let outcome = cycle::run_cycle(&config, &remote, &runtime, &store)
        .await
        .unwrap();

    assert_eq!(outcome.downloaded, 0);
    assert_eq!(remote.downloads(), 0);
    assert_eq!(outcome.uploaded, 4);
    assert!(outcome.reload_triggered);
    assert_eq!(runtime.kills(), vec![42]);
}

#[tokio::test]
async fn changed_remote_size_triggers_redownload() {
    let dir = tempfile::tempdir().unwrap();
    let config = four_file_config(dir.path());
    let store = LocalStore::open(&config.cache_dir).unwrap();
    let remote = populated_remote(&config);

    let mut container = xray_container();
    for (i, spec) in config.files.iter().enumerate() {
        // stale local copies, one byte short of upstream
        let stale = vec![b'x'; 99 + i];
        std::fs::write(store.path_for(&spec.filename), &stale).unwrap();
        container = container.with_file(format!("/app/bin/{}", spec.filename), stale.len() as u64);
    }
    let runtime = InMemoryRuntime::new();
    runtime.add_container(container);

    let outcome = cycle::run_cycle(&config, &remote, &runtime, &store)
        .await
        .unwrap();

    assert_eq!(outcome.downloaded, 4);
    assert_eq!(outcome.uploaded, 4);
    assert!(outcome.reload_triggered);
    assert_eq!(store.size_of("geoip.dat"), 100);
}

#[tokio::test]
async fn unresolvable_container_fails_the_sync_phase() {
    let dir = tempfile::tempdir().unwrap();
    let config = four_file_config(dir.path());
    let store = LocalStore::open(&config.cache_dir).unwrap();
    let remote = populated_remote(&config);
    let runtime = InMemoryRuntime::new(); // no containers at all

    let result = cycle::run_cycle(&config, &remote, &runtime, &store).await;
    assert!(result.is_err());

    // downloads persisted anyway; the next cycle only needs the sync phase
    for spec in &config.files {
        assert!(store.contains(&spec.filename));
    }
}

#[tokio::test]
async fn empty_download_is_an_error_and_does_not_block_other_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = four_file_config(dir.path());
    let store = LocalStore::open(&config.cache_dir).unwrap();

    let mut remote = InMemoryRemote::new();
    for (i, spec) in config.files.iter().enumerate() {
        if i == 0 {
            remote.put(&spec.url, Vec::new());
        } else {
            remote.put(&spec.url, vec![b'x'; 100 + i]);
        }
    }
    let runtime = InMemoryRuntime::new();
    runtime.add_container(xray_container());

    let outcome = cycle::run_cycle(&config, &remote, &runtime, &store)
        .await
        .unwrap();

    assert_eq!(outcome.downloaded, 3);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].filename, "geoip.dat");
    assert_eq!(outcome.failures[0].phase, Phase::Download);

    // the three good files still reached the container and one reload fired
    assert_eq!(outcome.uploaded, 3);
    assert!(outcome.reload_triggered);
    assert_eq!(runtime.kills().len(), 1);
}

#[tokio::test]
async fn failed_download_does_not_clobber_container_copy() {
    let dir = tempfile::tempdir().unwrap();
    let config = four_file_config(dir.path());
    let store = LocalStore::open(&config.cache_dir).unwrap();

    // cache and container hold a good copy everywhere, but upstream now
    // serves an empty body for the first file
    let mut remote = InMemoryRemote::new();
    let mut container = xray_container();
    for (i, spec) in config.files.iter().enumerate() {
        let bytes = vec![b'x'; 100 + i];
        std::fs::write(store.path_for(&spec.filename), &bytes).unwrap();
        container = container.with_file(format!("/app/bin/{}", spec.filename), bytes.len() as u64);
        if i == 0 {
            remote.put(&spec.url, Vec::new());
        } else {
            remote.put(&spec.url, bytes);
        }
    }
    let runtime = InMemoryRuntime::new();
    runtime.add_container(container);

    let outcome = cycle::run_cycle(&config, &remote, &runtime, &store)
        .await
        .unwrap();

    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].filename, "geoip.dat");
    assert_eq!(outcome.failures[0].phase, Phase::Download);

    // the failed download's artifact never reaches the container, and the
    // good copy there survives untouched
    assert_eq!(outcome.uploaded, 0);
    assert_eq!(runtime.file_size("3x-ui", "/app/bin/geoip.dat"), Some(100));
    assert!(!outcome.reload_triggered);
    assert!(runtime.kills().is_empty());
    assert!(runtime.uploads().is_empty());
}

#[tokio::test]
async fn reload_failure_is_recorded_but_uploads_stand() {
    let dir = tempfile::tempdir().unwrap();
    let config = four_file_config(dir.path());
    let store = LocalStore::open(&config.cache_dir).unwrap();
    let remote = populated_remote(&config);

    // container exists but the target process is not running
    let runtime = InMemoryRuntime::new();
    runtime.add_container(FakeContainer::new("c1", "3x-ui"));

    let outcome = cycle::run_cycle(&config, &remote, &runtime, &store)
        .await
        .unwrap();

    assert_eq!(outcome.uploaded, 4);
    assert!(!outcome.reload_triggered);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].phase, Phase::Reload);
    assert!(runtime.kills().is_empty());
}
