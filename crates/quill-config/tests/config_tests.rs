// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Quill configuration system.

use quill_config::diagnostic::ConfigError;
use quill_config::model::QuillConfig;
use quill_config::{load_and_validate_str, load_config_from_path, load_config_from_str};

/// Valid TOML with all known fields deserializes successfully.
#[test]
fn valid_toml_deserializes_into_quill_config() {
    let toml = r#"
[agent]
name = "quill-test"
log_level = "debug"

[storage]
database_path = "/tmp/quill-test.db"
wal_mode = false

[gateway]
host = "0.0.0.0"
port = 8088
keep_alive_secs = 5

[gateway.tokens]
"tok-alice" = "alice"

[worker]
max_concurrent = 2
max_retries = 1
retry_backoff_ms = 10
max_tool_rounds = 4
approval_timeout_secs = 60
sweep_interval_secs = 5
shutdown_grace_secs = 3
event_buffer = 32

[model]
provider = "echo"
model = "echo-1"
max_tokens = 128
system_prompt = "Be brief."

[client]
server_url = "http://localhost:8088"
token = "tok-alice"
state_path = "/tmp/quill-state.json"
poll_interval_ms = 50
max_polls = 2
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.agent.name, "quill-test");
    assert_eq!(config.agent.log_level, "debug");
    assert_eq!(config.storage.database_path, "/tmp/quill-test.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.gateway.port, 8088);
    assert_eq!(
        config.gateway.tokens.get("tok-alice").map(String::as_str),
        Some("alice")
    );
    assert_eq!(config.worker.max_concurrent, 2);
    assert_eq!(config.worker.max_tool_rounds, 4);
    assert_eq!(config.worker.event_buffer, 32);
    assert_eq!(config.model.system_prompt.as_deref(), Some("Be brief."));
    assert_eq!(config.client.token.as_deref(), Some("tok-alice"));
    assert_eq!(config.client.max_polls, 2);
}

/// Unknown field in [worker] produces an error mentioning the key.
#[test]
fn unknown_field_in_worker_produces_error() {
    let toml = r#"
[worker]
max_retires = 3
"#;

    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("max_retires"),
        "error should mention unknown field or the bad key, got: {err_str}"
    );
}

/// Unknown keys become diagnostics with a suggestion.
#[test]
fn unknown_key_diagnostic_suggests_correction() {
    let toml = r#"
[client]
sever_url = "http://localhost:1"
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject unknown field");
    let found = errors.iter().any(|e| {
        matches!(
            e,
            ConfigError::UnknownKey { key, suggestion: Some(s), .. }
                if key == "sever_url" && s == "server_url"
        )
    });
    assert!(found, "expected a server_url suggestion, got: {errors:?}");
}

/// Missing optional sections use defaults without error.
#[test]
fn missing_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");
    let defaults = QuillConfig::default();
    assert_eq!(config.agent.name, "quill");
    assert_eq!(config.gateway.port, defaults.gateway.port);
    assert_eq!(config.worker.max_retries, defaults.worker.max_retries);
    assert_eq!(config.model.provider, "echo");
    assert!(config.gateway.tokens.is_empty(), "no tokens means fail closed");
}

/// Wrong value type is reported as an invalid type.
#[test]
fn wrong_type_is_reported() {
    let toml = r#"
[gateway]
port = "eighty"
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject string port");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { key, .. } if key.contains("port"))),
        "got: {errors:?}"
    );
}

/// Semantic validation runs after a successful parse.
#[test]
fn validation_runs_after_parse() {
    let toml = r#"
[worker]
max_concurrent = 0
"#;

    let errors = load_and_validate_str(toml).expect_err("zero concurrency is invalid");
    assert!(errors.iter().any(|e| matches!(e, ConfigError::Validation { .. })));
}

/// `QUILL_*` environment variables override file values.
#[test]
fn env_overrides_file_values() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "quill.toml",
            r#"
[worker]
max_retries = 1

[model]
max_tokens = 100
"#,
        )?;
        jail.set_env("QUILL_WORKER_MAX_RETRIES", "7");
        jail.set_env("QUILL_STORAGE_DATABASE_PATH", "/tmp/env.db");

        let config = load_config_from_path(std::path::Path::new("quill.toml"))?;
        assert_eq!(config.worker.max_retries, 7);
        assert_eq!(config.storage.database_path, "/tmp/env.db");
        assert_eq!(config.model.max_tokens, 100);
        Ok(())
    });
}
