//! Inbound pull-request events and their phase classification.

use serde::{Deserialize, Serialize};

use super::error::PayloadError;

/// Pull-request webhook action.
///
/// Actions this agent does not react to are kept verbatim in `Other` so the
/// acknowledgement can still name them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PullRequestAction {
    Opened,
    Reopened,
    Synchronize,
    Edited,
    ReadyForReview,
    Closed,
    Other(String),
}

impl PullRequestAction {
    /// Parse the `action` field of a webhook payload.
    pub fn from_name(name: &str) -> Self {
        match name {
            "opened" => Self::Opened,
            "reopened" => Self::Reopened,
            "synchronize" => Self::Synchronize,
            "edited" => Self::Edited,
            "ready_for_review" => Self::ReadyForReview,
            "closed" => Self::Closed,
            other => Self::Other(other.to_string()),
        }
    }

    /// Wire name of the action.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Opened => "opened",
            Self::Reopened => "reopened",
            Self::Synchronize => "synchronize",
            Self::Edited => "edited",
            Self::ReadyForReview => "ready_for_review",
            Self::Closed => "closed",
            Self::Other(name) => name,
        }
    }
}

impl std::fmt::Display for PullRequestAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the dispatcher does with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Verify the artifacts and dry-run them.
    Verify,
    /// The pull request was closed; run for real when `merged`.
    Close { merged: bool },
    /// Acknowledge and do nothing.
    Ignore,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Verify => "verify",
            Phase::Close { merged: true } => "run",
            Phase::Close { merged: false } => "close",
            Phase::Ignore => "ignore",
        }
    }
}

/// Owner/name pair identifying a repository on the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub owner: String,
    pub name: String,
}

impl RepositoryRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A pull request within a repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub repository: RepositoryRef,
    pub number: u64,
}

impl std::fmt::Display for PullRequestRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.repository, self.number)
    }
}

/// An inbound pull-request notification. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestEvent {
    pub action: PullRequestAction,
    pub number: u64,
    pub merged: bool,
    pub repository: RepositoryRef,
    /// Head commit SHA; artifacts are verified at this revision.
    pub head_sha: String,
    /// Head branch name.
    pub head_ref: String,
    /// Merge commit SHA reported by the host, if any.
    pub merge_commit_sha: Option<String>,
    pub installation_id: u64,
    /// Per-delivery identifier. The dispatcher never de-duplicates on it.
    pub delivery_id: String,
}

impl PullRequestEvent {
    /// Build an event from a raw `pull_request` webhook body.
    pub fn from_webhook(body: &[u8], delivery_id: impl Into<String>) -> Result<Self, PayloadError> {
        let envelope: Envelope = serde_json::from_slice(body)?;
        let installation_id = envelope
            .installation
            .map(|installation| installation.id)
            .ok_or(PayloadError::MissingInstallation)?;

        Ok(Self {
            action: PullRequestAction::from_name(&envelope.action),
            number: envelope.number,
            merged: envelope.pull_request.merged.unwrap_or(false),
            repository: RepositoryRef::new(
                envelope.repository.owner.login,
                envelope.repository.name,
            ),
            head_sha: envelope.pull_request.head.sha,
            head_ref: envelope.pull_request.head.git_ref,
            merge_commit_sha: envelope.pull_request.merge_commit_sha,
            installation_id,
            delivery_id: delivery_id.into(),
        })
    }

    pub fn pull_request(&self) -> PullRequestRef {
        PullRequestRef {
            repository: self.repository.clone(),
            number: self.number,
        }
    }

    /// Route the action to a phase.
    pub fn phase(&self) -> Phase {
        match self.action {
            PullRequestAction::Closed => Phase::Close {
                merged: self.merged,
            },
            PullRequestAction::Opened
            | PullRequestAction::Reopened
            | PullRequestAction::Synchronize
            | PullRequestAction::Edited
            | PullRequestAction::ReadyForReview => Phase::Verify,
            PullRequestAction::Other(_) => Phase::Ignore,
        }
    }

    /// Revision the merged run materializes artifacts at.
    pub fn run_revision(&self) -> &str {
        self.merge_commit_sha.as_deref().unwrap_or(&self.head_sha)
    }
}

// Only the fields this agent reads; everything else in the payload is ignored.
#[derive(Deserialize)]
struct Envelope {
    action: String,
    number: u64,
    pull_request: PullRequestPayload,
    repository: RepositoryPayload,
    installation: Option<InstallationPayload>,
}

#[derive(Deserialize)]
struct PullRequestPayload {
    #[serde(default)]
    merged: Option<bool>,
    #[serde(default)]
    merge_commit_sha: Option<String>,
    head: HeadPayload,
}

#[derive(Deserialize)]
struct HeadPayload {
    sha: String,
    #[serde(rename = "ref")]
    git_ref: String,
}

#[derive(Deserialize)]
struct RepositoryPayload {
    name: String,
    owner: OwnerPayload,
}

#[derive(Deserialize)]
struct OwnerPayload {
    login: String,
}

#[derive(Deserialize)]
struct InstallationPayload {
    id: u64,
}
