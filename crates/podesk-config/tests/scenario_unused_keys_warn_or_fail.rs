use podesk_config::{
    load_layered_yaml_from_strings, report_unused_keys, ConfigSurface, UnusedKeyPolicy,
};

/// Scenario: unused config keys are reported per surface.
///
/// 1) Unknown keys are listed in WARN mode without error.
/// 2) FAIL mode errors on them.
/// 3) Keys the surface reads are not flagged.
/// 4) `daemon.addr` is consumed by the daemon but unused by the CLI.

const YAML: &str = r#"
calendar:
  timezone: "Europe/Paris"
scanner:
  interval_secs: 600
daemon:
  addr: "127.0.0.1:8899"
legacy:
  spreadsheet_id: 42
"#;

#[test]
fn warn_mode_reports_unused_keys_without_error() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let report = report_unused_keys(
        ConfigSurface::Daemon,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )
    .expect("warn mode must not error");

    assert_eq!(report.unused_leaf_pointers, vec!["/legacy/spreadsheet_id".to_string()]);
    assert_eq!(report.surface, "DAEMON");
}

#[test]
fn fail_mode_errors_on_unused_keys() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let err = report_unused_keys(
        ConfigSurface::Daemon,
        &loaded.config_json,
        UnusedKeyPolicy::Fail,
    )
    .unwrap_err()
    .to_string();
    assert!(err.contains("CONFIG_UNUSED_KEYS"), "got: {err}");
}

#[test]
fn surfaces_consume_different_keys() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let report = report_unused_keys(
        ConfigSurface::Cli,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )
    .unwrap();
    assert_eq!(
        report.unused_leaf_pointers,
        vec![
            "/daemon/addr".to_string(),
            "/legacy/spreadsheet_id".to_string(),
            "/scanner/interval_secs".to_string(),
        ]
    );
}

#[test]
fn clean_config_passes_fail_mode() {
    let yaml = "calendar:\n  timezone: UTC\nallocator:\n  max_attempts: 3\n";
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let report = report_unused_keys(
        ConfigSurface::Cli,
        &loaded.config_json,
        UnusedKeyPolicy::Fail,
    )
    .unwrap();
    assert!(report.is_clean());
}
