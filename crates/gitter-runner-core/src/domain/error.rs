//! Domain-level error taxonomy for Gitter Runner.

use super::artifact::ArtifactRole;
use crate::host::HostError;

/// Errors produced while turning a webhook body into a `PullRequestEvent`.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("malformed pull_request payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("pull_request payload has no installation")]
    MissingInstallation,
}

/// Errors produced by `RequiredArtifacts::new`.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactSpecError {
    #[error("required artifact set must not be empty")]
    Empty,

    #[error("invalid artifact file name: {0:?}")]
    InvalidName(String),

    #[error("duplicate artifact file name: {0}")]
    Duplicate(String),

    #[error("expected exactly one {role:?} artifact, found {count}")]
    RoleCount { role: ArtifactRole, count: usize },
}

/// Errors that abort a dispatch phase.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("host error: {0}")]
    Host(#[from] HostError),
}
