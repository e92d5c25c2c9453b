use std::path::PathBuf;

use resin_setup_core::config::SetupConfig;

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

#[test]
fn parse_real_setup_config_json() {
    let config_path = repo_root().join("setup-config.json");
    let config = SetupConfig::load(&config_path)
        .unwrap_or_else(|e| panic!("load {} failed: {e}", config_path.display()));

    assert_eq!(config.product.launcher, "resin.exe");
    assert!(!config.product.dir_prefix.trim().is_empty());
    assert!(
        config.product.root_markers.iter().any(|m| m.ends_with("resin.jar")),
        "root markers should include resin.jar"
    );
    assert_eq!(config.filter.name, "Resin");
    assert_eq!(config.filter.binary, "isapi_srun.dll");
    assert_eq!(config.filter.loaded_state, 4);
    assert!(config.rollback.persist);
    assert!(config.rollback.synthetic_default);
    assert!(config.control.poll_interval_ms > 0);
}

#[test]
fn missing_config_file_is_io_error() {
    let missing = repo_root().join("no-such-setup-config.json");
    let err = SetupConfig::load(&missing).unwrap_err();
    assert!(matches!(err, resin_setup_core::SetupError::Io { .. }));
}
