//! Shared error types and identifiers used across all `tmi-collab` crates.

pub mod error;
pub mod ids;

pub use error::{Error, FromMessage, Result};
pub use ids::{DiagramId, InvocationId, SessionId, ThreatModelId, UserId};
