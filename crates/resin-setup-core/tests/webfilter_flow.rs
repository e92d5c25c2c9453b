mod common;

use std::path::Path;
use std::sync::Arc;

use resin_setup_core::config::FilterConfig;
use resin_setup_core::ports::{FilterEntry, RunState};
use resin_setup_core::session::{SetupSession, WEB_SERVER_SERVICE};
use resin_setup_core::webfilter::{ConfigureStatus, WebFilterIntegrator};

use common::{config_with_state_dir, unique_temp_dir, CleanupDir, FakeController, FakeHost, FakeMetabase};

fn write_filter_binary(home: &Path) {
    let dir = home.join("win32");
    std::fs::create_dir_all(&dir).expect("create win32 dir");
    std::fs::write(dir.join("isapi_srun.dll"), b"dll-v2").expect("write filter binary");
}

#[test]
fn register_deregister_maintains_load_order() {
    let root = unique_temp_dir("resin-webfilter");
    let _cleanup = CleanupDir(root.clone());
    let home = root.join("resin");
    let scripts = root.join("scripts");
    write_filter_binary(&home);
    std::fs::create_dir_all(&scripts).unwrap();

    let metabase = FakeMetabase::with_load_order("A,B");
    let filter = FilterConfig::default();
    let integrator = WebFilterIntegrator::new(&metabase, &filter);

    let info = integrator.register(&home, &scripts);
    assert_eq!(info.status, ConfigureStatus::ConfiguredOk);
    assert_eq!(metabase.load_order_value(), "Resin,A,B");
    assert_eq!(std::fs::read(scripts.join("isapi_srun.dll")).unwrap(), b"dll-v2");

    let entries = metabase.entries.lock().unwrap().clone();
    assert_eq!(
        entries,
        vec![FilterEntry {
            name: "Resin".to_string(),
            enabled: true,
            state: 4,
            path: scripts.join("isapi_srun.dll").to_string_lossy().into_owned(),
            description: "isapi_srun Extension".to_string(),
        }]
    );

    let again = integrator.register(&home, &scripts);
    assert_eq!(again.status, ConfigureStatus::AlreadyConfigured);
    assert_eq!(metabase.load_order_value(), "Resin,A,B");
    assert_eq!(metabase.commit_count(), 1);

    let removed = integrator.deregister(&scripts);
    assert_eq!(removed.status, ConfigureStatus::RemovedOk);
    assert_eq!(metabase.load_order_value(), "A,B");
    assert!(!scripts.join("isapi_srun.dll").exists());

    let second = integrator.deregister(&scripts);
    assert_eq!(second.status, ConfigureStatus::AlreadyRemoved);
    assert_eq!(metabase.load_order_value(), "A,B");
}

#[test]
fn copy_failure_keeps_registration() {
    let root = unique_temp_dir("resin-webfilter-io");
    let _cleanup = CleanupDir(root.clone());
    let home = root.join("resin-without-binary");
    let scripts = root.join("scripts");
    std::fs::create_dir_all(&scripts).unwrap();

    let metabase = FakeMetabase::with_load_order("A");
    let filter = FilterConfig::default();
    let info = WebFilterIntegrator::new(&metabase, &filter).register(&home, &scripts);

    assert_eq!(info.status, ConfigureStatus::IoError);
    assert!(info.error.is_some());
    assert_eq!(metabase.load_order_value(), "Resin,A");
    assert_eq!(metabase.entries.lock().unwrap().len(), 1);
}

#[test]
fn existing_binary_is_overwritten() {
    let root = unique_temp_dir("resin-webfilter-overwrite");
    let _cleanup = CleanupDir(root.clone());
    let home = root.join("resin");
    let scripts = root.join("scripts");
    write_filter_binary(&home);
    std::fs::create_dir_all(&scripts).unwrap();
    std::fs::write(scripts.join("isapi_srun.dll"), b"dll-v1").unwrap();

    let metabase = FakeMetabase::default();
    let filter = FilterConfig::default();
    let info = WebFilterIntegrator::new(&metabase, &filter).register(&home, &scripts);

    assert!(info.is_success());
    assert_eq!(std::fs::read(scripts.join("isapi_srun.dll")).unwrap(), b"dll-v2");
    assert_eq!(metabase.load_order_value(), "Resin");
}

#[test]
fn metabase_failure_is_reported_without_copying() {
    let root = unique_temp_dir("resin-webfilter-metabase");
    let _cleanup = CleanupDir(root.clone());
    let home = root.join("resin");
    let scripts = root.join("scripts");
    write_filter_binary(&home);
    std::fs::create_dir_all(&scripts).unwrap();

    let metabase = FakeMetabase {
        fail: true,
        ..FakeMetabase::default()
    };
    let filter = FilterConfig::default();
    let integrator = WebFilterIntegrator::new(&metabase, &filter);

    assert_eq!(integrator.register(&home, &scripts).status, ConfigureStatus::MetabaseError);
    assert!(!scripts.join("isapi_srun.dll").exists());
    assert_eq!(integrator.deregister(&scripts).status, ConfigureStatus::MetabaseError);
}

#[test]
fn deregister_finds_name_only_in_load_order() {
    let root = unique_temp_dir("resin-webfilter-order");
    let _cleanup = CleanupDir(root.clone());

    let metabase = FakeMetabase::with_load_order("A,resin,B");
    let filter = FilterConfig::default();
    let info = WebFilterIntegrator::new(&metabase, &filter).deregister(&root);

    assert_eq!(info.status, ConfigureStatus::RemovedOk);
    assert_eq!(metabase.load_order_value(), "A,B");
}

#[test]
fn session_registers_into_scripts_dir_and_restarts_web_server() {
    let root = unique_temp_dir("resin-webfilter-session");
    let _cleanup = CleanupDir(root.clone());
    let home = root.join("resin");
    let scripts = root.join("scripts");
    write_filter_binary(&home);
    std::fs::create_dir_all(&scripts).unwrap();

    let metabase = Arc::new(FakeMetabase {
        scripts: Some(scripts.clone()),
        ..FakeMetabase::default()
    });
    let controller = Arc::new(FakeController::with(WEB_SERVER_SERVICE, RunState::Running));
    let host = FakeHost {
        controller: Arc::clone(&controller),
        metabase: Arc::clone(&metabase),
        ..FakeHost::default()
    };
    let session =
        SetupSession::with_marker_probe(config_with_state_dir(&root.join("state")), host.into_ports()).unwrap();

    let dir = session.scripts_dir().unwrap().expect("scripts dir from metabase");
    assert_eq!(dir, scripts);

    let info = session.web_filter().register(&home, &dir);
    assert!(info.is_success(), "status: {:?}", info.status);
    assert_eq!(metabase.load_order_value(), "Resin");
    assert!(scripts.join("isapi_srun.dll").is_file());

    session.restart_web_server().unwrap();
    assert_eq!(
        controller.actions(),
        vec!["stop W3SVC".to_string(), "start W3SVC".to_string()]
    );
}
