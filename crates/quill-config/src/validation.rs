// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as valid listen addresses, non-empty paths, and non-zero limits.

use crate::diagnostic::ConfigError;
use crate::model::QuillConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Model providers compiled into the binary.
pub const PROVIDERS: &[&str] = &["echo"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure rather than stopping at the first one.
pub fn validate_config(config: &QuillConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.agent.log_level.as_str()) {
        fail(format!(
            "agent.log_level `{}` must be one of: {}",
            config.agent.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    let host = config.gateway.host.trim();
    if host.is_empty() {
        fail("gateway.host must not be empty".to_string());
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-');
        if !is_valid_ip && !is_valid_hostname {
            fail(format!(
                "gateway.host `{host}` is not a valid IP address or hostname"
            ));
        }
    }

    for (token, user) in &config.gateway.tokens {
        if token.trim().is_empty() || user.trim().is_empty() {
            fail("gateway.tokens entries need a non-empty token and user".to_string());
        }
    }

    if config.worker.max_concurrent == 0 {
        fail("worker.max_concurrent must be at least 1".to_string());
    }
    if config.worker.max_tool_rounds == 0 {
        fail("worker.max_tool_rounds must be at least 1".to_string());
    }
    if config.worker.approval_timeout_secs == 0 {
        fail("worker.approval_timeout_secs must be at least 1".to_string());
    }
    if config.worker.sweep_interval_secs == 0 {
        fail("worker.sweep_interval_secs must be at least 1".to_string());
    }
    if config.worker.event_buffer == 0 {
        fail("worker.event_buffer must be at least 1".to_string());
    }

    if !PROVIDERS.contains(&config.model.provider.as_str()) {
        fail(format!(
            "model.provider `{}` must be one of: {}",
            config.model.provider,
            PROVIDERS.join(", ")
        ));
    }
    if config.model.model.trim().is_empty() {
        fail("model.model must not be empty".to_string());
    }
    if config.model.max_tokens == 0 {
        fail("model.max_tokens must be at least 1".to_string());
    }

    let url = config.client.server_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        fail(format!(
            "client.server_url `{url}` must start with http:// or https://"
        ));
    }
    if config.client.state_path.trim().is_empty() {
        fail("client.state_path must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
