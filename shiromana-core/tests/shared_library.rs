//! Loading a real plugin binary built with `export_media_plugin!`
//!
//! The binary is built once per test run into its own target directory, so
//! the nested cargo never waits on the lock held by the outer build.

mod common;

use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use tempfile::TempDir;

use shiromana_core::plugins::{
    DomainEvent, InvokeStatus, ModuleState, PluginHost, PluginHostConfig,
};
use shiromana_plugin_api::{AbiGeneration, MediaHandle, TriggerKind};

use common::{LIBRARY, host};

const PACKAGE: &str = "shiromana-test-plugin";

fn test_plugin() -> &'static Path {
    static BUILT: OnceLock<PathBuf> = OnceLock::new();
    BUILT.get_or_init(|| {
        let workspace = Path::new(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .expect("shiromana-core lives inside the workspace");
        let target_dir = std::env::var_os("CARGO_TARGET_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| workspace.join("target"))
            .join("test-plugins");

        let status = Command::new(env!("CARGO"))
            .arg("build")
            .arg("--manifest-path")
            .arg(workspace.join("Cargo.toml"))
            .args(["--package", PACKAGE, "--target-dir"])
            .arg(&target_dir)
            .status()
            .expect("failed to run cargo");
        assert!(status.success(), "building {PACKAGE} failed: {status}");

        let file = format!("{DLL_PREFIX}{}{DLL_SUFFIX}", PACKAGE.replace('-', "_"));
        let path = target_dir.join("debug").join(file);
        assert!(path.exists(), "{} was not produced", path.display());
        path
    })
}

#[test]
fn shared_library_loads_and_handles_its_trigger() {
    let (host, catalog) = host();
    let id = host.load(test_plugin()).unwrap();

    let info = host.module_info(id).unwrap();
    assert_eq!(info.name, "test_plugin");
    assert_eq!(info.generation, AbiGeneration::V2);
    assert_eq!(info.triggers, ["media_add", "explode"]);
    assert_eq!(info.state, ModuleState::Active);

    let media = MediaHandle::new(21).unwrap();
    catalog.insert(media);
    let records = host
        .dispatch(&DomainEvent::of(TriggerKind::MediaAdd, LIBRARY, Some(media)))
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].plugin, "test_plugin");
    assert_eq!(records[0].status, InvokeStatus::Success);

    assert_eq!(host.unload(id).unwrap(), Some(InvokeStatus::Success));
    assert_eq!(host.module_info(id).unwrap().state, ModuleState::Unloaded);
}

#[test]
fn panic_inside_shared_library_is_a_fault() {
    let (host, catalog) = host();
    let id = host.load(test_plugin()).unwrap();

    let records = host.dispatch(&DomainEvent::new("explode", LIBRARY)).unwrap();
    assert_eq!(records.len(), 1);
    match &records[0].status {
        InvokeStatus::Fault(fault) => {
            assert_eq!(fault.plugin, "test_plugin");
            assert_eq!(fault.entry_point, "on_trigger");
        }
        other => panic!("expected fault, got {other:?}"),
    }

    assert_eq!(host.module_info(id).unwrap().state, ModuleState::Failed);
    assert_eq!(host.active_count(), 0);
    assert!(host.lookup("media_add").is_empty());
    assert_eq!(host.unload(id).unwrap(), None);

    let media = MediaHandle::new(4).unwrap();
    catalog.insert(media);
    let after = host
        .dispatch(&DomainEvent::of(TriggerKind::MediaAdd, LIBRARY, Some(media)))
        .unwrap();
    assert!(after.is_empty());
}

#[test]
fn load_all_picks_up_shared_library() {
    let dir = TempDir::new().unwrap();
    let installed = dir.path().join(test_plugin().file_name().unwrap());
    std::fs::copy(test_plugin(), &installed).unwrap();

    let host = PluginHost::new(
        PluginHostConfig::with_dir(dir.path()),
        std::sync::Arc::new(shiromana_core::catalog::FixedCatalog::new(LIBRARY)),
    );
    let summary = host.load_all();
    assert!(summary.failed.is_empty(), "{:?}", summary.failed);
    assert_eq!(summary.loaded.len(), 1);
    assert_eq!(host.lookup("explode"), ["test_plugin"]);

    let records = host
        .dispatch(&DomainEvent::of(TriggerKind::MediaAdd, LIBRARY, MediaHandle::new(9)))
        .unwrap();
    assert_eq!(records[0].status, InvokeStatus::Success);
    assert_eq!(host.shutdown().len(), 1);
}
