#![allow(clippy::unwrap_used, reason = "Tests use unwrap on deterministic fixtures.")]

use std::io::Write;

use flowgate_config::FlowEngineConfig;

#[test]
fn load_with_no_path_and_no_override_falls_back_to_defaults_file_error() {
    // No `flowgate.toml` exists in the test process's working directory, so
    // the default resolution path fails closed with an I/O error rather
    // than silently running with an unvalidated configuration.
    let err = FlowEngineConfig::load(None).unwrap_err();
    assert!(err.to_string().contains("config io error") || err.to_string().contains("invalid config"));
}

#[test]
fn load_from_explicit_path_round_trips_through_toml() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[store]\nshard_count = 8\n").unwrap();
    let config = FlowEngineConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.store.shard_count, 8);
    assert_eq!(config.session.default_flow_ttl_ms, 600_000);
}

#[test]
fn oversized_config_file_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let padding = "# ".repeat(flowgate_config::MAX_CONFIG_FILE_SIZE);
    writeln!(file, "{padding}").unwrap();
    let err = FlowEngineConfig::load(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("size limit"));
}
