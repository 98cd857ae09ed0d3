// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns figment failures into miette diagnostics.
//!
//! Each figment error becomes one [`ConfigError`]. When the offending key can
//! be found in a loaded TOML document the diagnostic points at it, and
//! unknown keys get a Jaro-Winkler "did you mean" hint.

#![allow(unused_assignments)] // emitted by miette's Diagnostic derive

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Below this similarity no correction is offered. High enough to reject
/// unrelated keys, low enough for `max_retires` or `sever_url`.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// A TOML document that fed the configuration, kept for span lookup.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Path shown in the rendered diagnostic.
    pub name: String,
    pub content: String,
}

impl ConfigSource {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Locate `key` inside `[section]` of this document.
    fn locate(&self, section: &[String], key: &str) -> Option<(SourceSpan, NamedSource<String>)> {
        let offset = find_key_offset(&self.content, section, key)?;
        Some((
            SourceSpan::new(offset.into(), key.len()),
            NamedSource::new(&self.name, self.content.clone()),
        ))
    }
}

/// Everything that can be wrong with a configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(quill::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        /// Closest valid key, if any is similar enough.
        suggestion: Option<String>,
        /// Comma-separated keys accepted in this section.
        valid_keys: String,
        #[label("not a recognized key")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` has the wrong type: {detail}")]
    #[diagnostic(code(quill::config::invalid_type), help("use {expected}"))]
    InvalidType {
        /// Dotted path such as `gateway.port`.
        key: String,
        detail: String,
        expected: String,
        #[label("expected {expected}")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(quill::config::missing_key),
        help("set `{key}` in quill.toml or through a QUILL_* variable")
    )]
    MissingKey { key: String },

    /// Semantic check that failed after a successful parse.
    #[error("invalid configuration: {message}")]
    #[diagnostic(code(quill::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(quill::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// Convert every error carried by a figment failure.
pub fn from_figment(err: figment::Error, sources: &[ConfigSource]) -> Vec<ConfigError> {
    err.into_iter()
        .map(|error| convert(&error, sources))
        .collect()
}

fn convert(error: &figment::Error, sources: &[ConfigSource]) -> ConfigError {
    use figment::error::Kind;

    match &error.kind {
        Kind::UnknownField(key, expected) => {
            // For an unknown key the path stops at its section.
            let located = origin(error, sources).and_then(|s| s.locate(&error.path, key));
            let (span, src) = located.unzip();
            ConfigError::UnknownKey {
                key: key.clone(),
                suggestion: suggest_key(key, expected),
                valid_keys: expected.join(", "),
                span,
                src,
            }
        }
        Kind::InvalidType(actual, expected) => {
            // Here the path includes the key itself.
            let located = error.path.split_last().and_then(|(key, section)| {
                origin(error, sources).and_then(|s| s.locate(section, key))
            });
            let (span, src) = located.unzip();
            ConfigError::InvalidType {
                key: error.path.join("."),
                detail: format!("found {actual}"),
                expected: expected.clone(),
                span,
                src,
            }
        }
        Kind::MissingField(key) => ConfigError::MissingKey {
            key: qualified(&error.path, key),
        },
        Kind::InvalidValue(actual, expected) => ConfigError::Validation {
            message: format!(
                "`{}` must be {expected}, found {actual}",
                error.path.join(".")
            ),
        },
        _ => ConfigError::Other(error.to_string()),
    }
}

fn qualified(section: &[String], key: &str) -> String {
    if section.is_empty() {
        key.to_string()
    } else {
        format!("{}.{key}", section.join("."))
    }
}

/// The document an error came from.
///
/// File providers record their path. Errors from string or env providers
/// carry none, so a lone source is assumed to be the origin.
fn origin<'a>(error: &figment::Error, sources: &'a [ConfigSource]) -> Option<&'a ConfigSource> {
    let path = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|s| match s {
            figment::Source::File(path) => Some(path.display().to_string()),
            _ => None,
        });

    match path {
        Some(path) => sources.iter().find(|s| s.name == path),
        None if sources.len() == 1 => sources.first(),
        None => None,
    }
}

/// Byte offset of `key = ...` within the `[section]` table of a TOML document.
///
/// The search stops at the next table header. An empty section means the
/// top level, before any header. Nested tables use their dotted header, so
/// `["gateway", "tokens"]` matches `[gateway.tokens]`.
pub fn find_key_offset(content: &str, section: &[String], key: &str) -> Option<usize> {
    let start = if section.is_empty() {
        0
    } else {
        let header = format!("[{}]", section.join("."));
        content.find(&header)? + header.len()
    };

    let mut offset = start;
    for line in content[start..].split_inclusive('\n') {
        let trimmed = line.trim_start();
        if offset > start && trimmed.starts_with('[') {
            return None;
        }
        let assigns = trimmed
            .strip_prefix(key)
            .is_some_and(|rest| rest.trim_start_matches([' ', '\t']).starts_with('='));
        if assigns {
            return Some(offset + line.len() - trimmed.len());
        }
        offset += line.len();
    }
    None
}

/// The valid key most similar to `unknown`, if any clears the threshold.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Print diagnostics to stderr with miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut rendered = String::new();
        match handler.render_report(&mut rendered, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{rendered}"),
            Err(_) => eprintln!("error: {error}"),
        }
    }
}
