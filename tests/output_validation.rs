//! Output Validation Tests
//!
//! This module validates the JSON contracts a tool-calling host relies on:
//! - Tool names are stable and unique
//! - Every input schema is an inline JSON object schema
//! - Success and error envelopes have the documented shape
//! - Error codes are stable strings

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use switchboard::adapters::catalogue;
use switchboard::{ErrorEnvelope, Metadata, SuccessEnvelope, SwitchboardError};

// ============================================================================
// Tool Catalogue
// ============================================================================

#[test]
fn test_tool_names_are_stable() {
    let names: Vec<&str> = catalogue().iter().map(|tool| tool.name).collect();

    assert_eq!(
        names,
        vec![
            "database_query",
            "database_insert",
            "database_update",
            "database_delete",
            "database_rpc",
            "source_get_repository",
            "source_list_issues",
            "source_create_issue",
            "source_list_pull_requests",
            "source_create_pull_request",
            "source_get_file_contents",
            "source_search",
            "storage_list_buckets",
            "storage_list_objects",
            "storage_read_object",
            "storage_write_object",
            "storage_access_secret",
        ]
    );
}

#[test]
fn test_every_schema_is_an_inline_object() {
    for tool in catalogue() {
        let schema = &tool.input_schema;
        assert_eq!(schema["type"], "object", "{} schema type", tool.name);
        assert!(schema.get("$ref").is_none(), "{} schema uses $ref", tool.name);
        assert!(schema.get("definitions").is_none(), "{} schema has definitions", tool.name);
        assert!(!tool.description.is_empty(), "{} has no description", tool.name);
    }
}

#[test]
fn test_descriptor_serializes_with_input_schema_key() {
    let tools = catalogue();
    let query = tools.iter().find(|tool| tool.name == "database_query").unwrap();
    let value = serde_json::to_value(query).unwrap();

    assert!(value.get("inputSchema").is_some());
    assert!(value.get("input_schema").is_none());
    assert_eq!(value["inputSchema"]["required"], json!(["table"]));
}

#[test]
fn test_search_kind_schema_lists_targets() {
    let tools = catalogue();
    let search = tools.iter().find(|tool| tool.name == "source_search").unwrap();
    let kinds = &search.input_schema["properties"]["kind"]["enum"];

    assert_eq!(*kinds, json!(["repositories", "code", "issues"]));
}

// ============================================================================
// Envelopes
// ============================================================================

#[test]
fn test_success_envelope_structure() {
    let data = json!([{"id": 1}, {"id": 2}]);
    let envelope = SuccessEnvelope::new("database", "database_query", data.clone(), Metadata::for_value(3, &data));
    let value = serde_json::to_value(&envelope).unwrap();

    assert_eq!(value["ok"], true);
    assert_eq!(value["adapter"], "database");
    assert_eq!(value["operation"], "database_query");
    assert_eq!(value["meta"]["execution_ms"], 3);
    assert_eq!(value["meta"]["items_returned"], 2);
}

#[test]
fn test_metadata_omits_count_for_objects() {
    let value = serde_json::to_value(Metadata::for_value(1, &json!({"id": 1}))).unwrap();
    assert!(value.get("items_returned").is_none());
}

#[test]
fn test_error_envelope_structure() {
    let err = SwitchboardError::uninitialized("storage", "storage_list_buckets");
    let value: Value =
        serde_json::to_value(ErrorEnvelope::from_error("storage", "storage_list_buckets", &err)).unwrap();

    assert_eq!(value["ok"], false);
    assert_eq!(value["error"]["code"], "UNINITIALIZED");
    assert_eq!(
        value["error"]["message"],
        "storage client is not initialized (operation: storage_list_buckets)"
    );
    assert!(value.get("data").is_none());
}

#[test]
fn test_all_error_codes_are_consistent() {
    let cases = [
        (SwitchboardError::uninitialized("a", "b"), "UNINITIALIZED"),
        (SwitchboardError::operation_failed("op", "detail"), "OPERATION_FAILED"),
        (SwitchboardError::invalid_input("x"), "INVALID_INPUT"),
        (SwitchboardError::config_error("x"), "CONFIG_ERROR"),
        (SwitchboardError::credential_source("cli", "x"), "CREDENTIAL_SOURCE"),
        (SwitchboardError::command_failed("git", "x"), "COMMAND_FAILED"),
    ];

    for (err, code) in cases {
        assert_eq!(err.error_code(), code);
        assert!(!err.message().is_empty());
    }
}
