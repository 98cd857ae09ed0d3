// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client side of the Quill execution protocol.
//!
//! [`SessionController`] submits messages, follows their event streams,
//! survives disconnects by polling, and resumes after a restart from a
//! local state file. Transports implement [`ExecutionApi`]: [`HttpApi`]
//! talks to a gateway, [`LocalApi`] drives an in-process runtime.

pub mod api;
pub mod http;
pub mod local;
pub mod session;
pub mod state;

pub use api::ExecutionApi;
pub use http::HttpApi;
pub use local::LocalApi;
pub use session::{SessionController, SessionSettings, SessionUpdate};
pub use state::{PendingSubmission, StateStore, ThreadEntry};
