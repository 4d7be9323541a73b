//! Domain types: inbound events, required artifacts, and error taxonomy.

pub mod artifact;
pub mod error;
pub mod event;

pub use artifact::{ArtifactRole, RequiredArtifact, RequiredArtifacts};
pub use error::{ArtifactSpecError, DispatchError, PayloadError};
pub use event::{Phase, PullRequestAction, PullRequestEvent, PullRequestRef, RepositoryRef};
