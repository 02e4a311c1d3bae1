//! Unused-key guard.
//!
//! Invariants under test:
//! - Keys under consumed prefixes are never reported.
//! - Unknown top-level keys are reported, sorted, under Warn.
//! - Fail turns a non-empty report into CONFIG_UNUSED_KEYS.
//! - `/daemon` is consumed by the daemon but not by the CLI.

use tsync_config::{
    load_layered_yaml_from_strings, report_unused_keys, ConfigConsumer, UnusedKeyPolicy,
};

const YAML: &str = r#"
platform:
  host: "https://acme.example.com"
fetch:
  page_size: 100
daemon:
  tick_secs: 30
legacy:
  moodle_role: 5
  zz: true
"#;

#[test]
fn warn_reports_unknown_leaves() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let report =
        report_unused_keys(ConfigConsumer::Daemon, &loaded.config_json, UnusedKeyPolicy::Warn)
            .unwrap();
    assert_eq!(
        report.unused_leaf_pointers,
        vec!["/legacy/moodle_role".to_string(), "/legacy/zz".to_string()]
    );
    assert!(!report.is_clean());
}

#[test]
fn fail_policy_errors() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let err =
        report_unused_keys(ConfigConsumer::Daemon, &loaded.config_json, UnusedKeyPolicy::Fail)
            .unwrap_err();
    assert!(err.to_string().contains("CONFIG_UNUSED_KEYS"));
}

#[test]
fn cli_does_not_consume_daemon_section() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    let report =
        report_unused_keys(ConfigConsumer::Cli, &loaded.config_json, UnusedKeyPolicy::Warn)
            .unwrap();
    assert!(report
        .unused_leaf_pointers
        .contains(&"/daemon/tick_secs".to_string()));
}
