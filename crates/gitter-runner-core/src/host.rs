//! Repository host capability traits and the failure-logging call wrapper.
//!
//! The host is reached through two narrow traits:
//! - `HostConnector`: resolve an installation-scoped client
//! - `RepositoryHost`: comments, changed files, and file contents
//!
//! Every call site goes through [`call`], which tags the call with a
//! [`HostOperation`] and logs failures before handing them back unchanged.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{PullRequestRef, RepositoryRef};
use crate::obs;

/// Result type for repository host operations.
pub type HostResult<T> = std::result::Result<T, HostError>;

/// Transport or API failure from the repository host.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("authentication failed: {0}")]
    Auth(String),
}

impl HostError {
    /// HTTP status, when the host answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            HostError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Name tag attached to every host call for failure logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostOperation {
    ResolveInstallation,
    CreateComment,
    UpdateComment,
    ListFiles,
    GetContent,
}

impl HostOperation {
    /// Readable phrase used in log lines ("Failed to create comment").
    pub fn as_str(&self) -> &'static str {
        match self {
            HostOperation::ResolveInstallation => "resolve installation",
            HostOperation::CreateComment => "create comment",
            HostOperation::UpdateComment => "update comment",
            HostOperation::ListFiles => "list files",
            HostOperation::GetContent => "get content",
        }
    }
}

impl std::fmt::Display for HostOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host-assigned comment identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommentId(pub u64);

impl std::fmt::Display for CommentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A file touched by a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub filename: String,
    /// Host status: `added`, `modified`, `removed`, `renamed`, ...
    pub status: String,
}

impl ChangedFile {
    pub fn new(filename: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            status: status.into(),
        }
    }

    /// Whether the file still exists at the pull request head.
    pub fn exists_at_head(&self) -> bool {
        self.status != "removed"
    }
}

/// Type of a content entry as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentKind {
    File,
    Dir,
    Symlink,
    Submodule,
    Other(String),
}

impl ContentKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "file" => Self::File,
            "dir" => Self::Dir,
            "symlink" => Self::Symlink,
            "submodule" => Self::Submodule,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::File => "file",
            Self::Dir => "dir",
            Self::Symlink => "symlink",
            Self::Submodule => "submodule",
            Self::Other(name) => name,
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single content entry with its decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    pub kind: ContentKind,
    pub size: u64,
    pub content: Vec<u8>,
}

/// Result of fetching a path at a revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoContent {
    /// The path is a directory; holds the listed entry names.
    Directory(Vec<String>),
    Entry(ContentEntry),
}

/// Installation-scoped access to one host account.
#[async_trait]
pub trait RepositoryHost: Send + Sync {
    /// Create a comment on a pull request, returning its identifier.
    async fn create_comment(&self, pull_request: &PullRequestRef, body: &str)
        -> HostResult<CommentId>;

    /// Replace the body of an existing comment.
    async fn update_comment(
        &self,
        pull_request: &PullRequestRef,
        comment_id: CommentId,
        body: &str,
    ) -> HostResult<()>;

    /// List every file changed by a pull request.
    async fn list_files(&self, pull_request: &PullRequestRef) -> HostResult<Vec<ChangedFile>>;

    /// Fetch the content and metadata of `path` at `revision`.
    async fn get_content(
        &self,
        repository: &RepositoryRef,
        path: &str,
        revision: &str,
    ) -> HostResult<RepoContent>;
}

/// Resolves installation-scoped host clients.
#[async_trait]
pub trait HostConnector: Send + Sync {
    async fn connect(&self, installation_id: u64) -> HostResult<Arc<dyn RepositoryHost>>;
}

/// Await a host call, logging any failure under `operation` before
/// returning it unchanged.
pub async fn call<T, F>(operation: HostOperation, fut: F) -> HostResult<T>
where
    F: Future<Output = HostResult<T>>,
{
    match fut.await {
        Ok(value) => Ok(value),
        Err(err) => {
            obs::emit_host_call_failed(operation, &err);
            Err(err)
        }
    }
}
