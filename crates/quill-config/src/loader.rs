// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Figment providers for the configuration layers.
//!
//! A local `quill.toml` beats the user file, which beats `/etc/quill/quill.toml`.
//! `QUILL_<SECTION>_<KEY>` variables beat every file.

#![allow(clippy::result_large_err)] // figment::Error is returned as-is

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::QuillConfig;

/// Top-level sections; env keys are split on the first `_` after one of these.
const SECTIONS: &[&str] = &["agent", "storage", "gateway", "worker", "model", "client"];

/// Load from the standard search path.
///
/// Later layers win: compiled defaults, `/etc/quill/quill.toml`,
/// `$XDG_CONFIG_HOME/quill/quill.toml`, `./quill.toml`, then `QUILL_*`.
pub fn load_config() -> Result<QuillConfig, figment::Error> {
    build_figment().extract()
}

/// Defaults plus one TOML document. Files and the environment are ignored.
pub fn load_config_from_str(toml_content: &str) -> Result<QuillConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(QuillConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Defaults, one explicit file, then `QUILL_*` overrides.
pub fn load_config_from_path(path: &Path) -> Result<QuillConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(QuillConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The unextracted search-path figment.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(QuillConfig::default()))
        .merge(Toml::file("/etc/quill/quill.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|dir| dir.join("quill").join("quill.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("quill.toml"))
        .merge(env_provider())
}

/// Environment provider mapping `QUILL_WORKER_MAX_RETRIES` to `worker.max_retries`.
///
/// Uses `Env::map()` rather than `Env::split("_")` so field names that
/// contain underscores stay intact.
fn env_provider() -> Env {
    Env::prefixed("QUILL_").map(|key| map_env_key(key.as_str()).into())
}

fn map_env_key(key: &str) -> String {
    let key = key.to_ascii_lowercase();
    for section in SECTIONS {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key
}
