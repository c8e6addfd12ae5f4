// crates/flowgate-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Helpers Tests
// Description: Unit tests for JSON parsing and graph-input helpers.
// Purpose: Ensure malformed CLI input is rejected before it reaches the
//          HTTP client or the compiler.
// Dependencies: flowgate-cli main helpers
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::path::PathBuf;

use super::parse_json_object;
use super::parse_json_value;
use super::read_graph_definition;

#[test]
fn parse_json_value_accepts_well_formed_json() {
    let value = parse_json_value(r#"{"a":1}"#).unwrap();
    assert_eq!(value["a"], 1);
}

#[test]
fn parse_json_value_rejects_malformed_json() {
    assert!(parse_json_value("{not json}").is_err());
}

#[test]
fn parse_json_object_rejects_non_object_json() {
    let err = parse_json_object("[1,2,3]").unwrap_err();
    assert!(err.to_string().contains("expected a JSON object"));
}

#[test]
fn parse_json_object_accepts_an_object() {
    let map = parse_json_object(r#"{"key":"value"}"#).unwrap();
    assert_eq!(map.get("key").unwrap(), "value");
}

#[test]
fn read_graph_definition_reports_a_missing_file() {
    let err = read_graph_definition(&PathBuf::from("/nonexistent/graph.json")).unwrap_err();
    assert!(err.to_string().contains("failed to read"));
}

#[test]
fn read_graph_definition_reports_malformed_json() {
    let mut path = std::env::temp_dir();
    path.push("flowgate-cli-malformed-graph-test.json");
    std::fs::write(&path, b"not json").unwrap();
    let err = read_graph_definition(&path).unwrap_err();
    assert!(err.to_string().contains("invalid graph definition"));
    let _ = std::fs::remove_file(&path);
}
