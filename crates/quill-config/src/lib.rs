// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Quill execution service.
//!
//! Settings are layered from compiled defaults, TOML files and `QUILL_*`
//! environment variables. Unknown keys are rejected, semantic checks collect
//! every problem at once, and failures render as miette diagnostics.
//!
//! # Usage
//!
//! ```no_run
//! use quill_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("gateway on {}:{}", config.gateway.host, config.gateway.port);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{ConfigError, ConfigSource, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::QuillConfig;

/// Validate a loaded configuration, or explain why loading failed.
fn finish(
    loaded: Result<QuillConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<ConfigSource>,
) -> Result<QuillConfig, Vec<ConfigError>> {
    match loaded {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => Err(diagnostic::from_figment(err, &sources())),
    }
}

/// Load configuration from the standard search path and validate it.
pub fn load_and_validate() -> Result<QuillConfig, Vec<ConfigError>> {
    finish(loader::load_config(), search_path_sources)
}

/// Load an explicit file (plus `QUILL_*` overrides) and validate it.
pub fn load_and_validate_path(path: &Path) -> Result<QuillConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_path(path), || {
        read_source(path).into_iter().collect()
    })
}

/// Parse and validate an in-memory TOML document.
pub fn load_and_validate_str(toml_content: &str) -> Result<QuillConfig, Vec<ConfigError>> {
    finish(loader::load_config_from_str(toml_content), || {
        vec![ConfigSource::new("<inline>", toml_content)]
    })
}

fn read_source(path: &Path) -> Option<ConfigSource> {
    let content = std::fs::read_to_string(path).ok()?;
    Some(ConfigSource::new(path.display().to_string(), content))
}

/// The TOML files the default loader may have read, for error spans.
fn search_path_sources() -> Vec<ConfigSource> {
    let local = std::env::current_dir()
        .map(|dir| dir.join("quill.toml"))
        .unwrap_or_else(|_| "quill.toml".into());
    let user = dirs::config_dir().map(|dir| dir.join("quill").join("quill.toml"));
    let system = Some(Path::new("/etc/quill/quill.toml").to_path_buf());

    [Some(local), user, system]
        .into_iter()
        .flatten()
        .filter_map(|path| read_source(&path))
        .collect()
}
