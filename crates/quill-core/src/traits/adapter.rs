// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity and health shared by every backend the runtime talks to.

use async_trait::async_trait;

use crate::error::QuillError;
use crate::types::{AdapterType, HealthStatus};

/// Common surface of the model provider and the storage backend.
///
/// The gateway's `/health` endpoint reports the storage backend's
/// [`health_check`](PluginAdapter::health_check); the name and version are
/// logged at startup.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn version(&self) -> semver::Version;

    /// Whether this backend provides models or persistence.
    fn adapter_type(&self) -> AdapterType;

    /// Cheap liveness probe. A degraded backend still serves requests.
    async fn health_check(&self) -> Result<HealthStatus, QuillError>;
}
