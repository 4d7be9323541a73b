//! Gitter Runner Core
//!
//! Pull-request verification and run state machine for a webhook-driven
//! multi-gitter agent:
//! - verifies that a pull request carries a non-empty `script.sh` and
//!   `config.yaml`, dry-running them on success
//! - runs multi-gitter for real once the pull request is merged
//! - narrates progress through a single status comment per phase
//!
//! The repository host and the multi-gitter binary are reached through the
//! `RepositoryHost`/`HostConnector` and `ToolRunner` traits; in-memory fakes
//! live in [`fakes`].

pub mod comment;
pub mod dedup;
pub mod dispatcher;
pub mod domain;
pub mod executor;
pub mod fakes;
pub mod host;
pub mod lease;
pub mod materialize;
pub mod messages;
pub mod metrics;
pub mod obs;
pub mod telemetry;
pub mod verifier;

pub use comment::StatusComment;
pub use dedup::DeliveryLedger;
pub use dispatcher::{Dispatcher, DispatcherConfig, PhaseOutcome};
pub use domain::{
    ArtifactRole, ArtifactSpecError, DispatchError, PayloadError, Phase, PullRequestAction,
    PullRequestEvent, PullRequestRef, RepositoryRef, RequiredArtifact, RequiredArtifacts,
};
pub use executor::{MultiGitter, RunInvocation, RunResult, ToolRunner};
pub use host::{
    ChangedFile, CommentId, ContentEntry, ContentKind, HostConnector, HostError, HostOperation,
    HostResult, RepoContent, RepositoryHost,
};
pub use lease::{PullRequestLease, PullRequestLeases};
pub use materialize::{materialize, MaterializeError, StagedArtifact, StagedArtifacts};
pub use metrics::METRICS;
pub use telemetry::init_tracing;
pub use verifier::{verify, FileKind, FileVerification, VerificationOutcome};

/// Gitter Runner version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
