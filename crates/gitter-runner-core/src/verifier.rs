//! Remote content verification of required artifacts.
//!
//! Each required file is checked independently and concurrently:
//! 1. absent from the pull request diff (or removed) ⇒ does not exist
//! 2. fetched at the head revision through the host call wrapper
//! 3. a directory listing, a non-file entry, or an empty payload is an error
//!
//! A failed fetch is isolated to its own file and reported as
//! "could not be verified"; it never aborts the other checks.

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::domain::{RequiredArtifact, RequiredArtifacts, RepositoryRef};
use crate::host::{self, ChangedFile, ContentKind, HostOperation, RepoContent, RepositoryHost};

/// Terminal classification of one required file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FileKind {
    File,
    Directory,
    Other(String),
    Missing,
    /// The content fetch failed.
    Unverified,
}

/// Per-file verification result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileVerification {
    pub filename: String,
    pub present: bool,
    pub kind: FileKind,
    /// Only meaningful for `FileKind::File`.
    pub empty: bool,
}

impl FileVerification {
    fn missing(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            present: false,
            kind: FileKind::Missing,
            empty: false,
        }
    }

    fn found(filename: &str, kind: FileKind, empty: bool) -> Self {
        Self {
            filename: filename.to_string(),
            present: true,
            kind,
            empty,
        }
    }

    /// User-facing error for this file, if any. At most one per file.
    pub fn error(&self) -> Option<String> {
        let name = &self.filename;
        match &self.kind {
            FileKind::Missing => Some(format!("`{name}` does not exist")),
            FileKind::Directory => Some(format!("`{name}` is a directory")),
            FileKind::Other(kind) => Some(format!("`{name}` is not a file - is a `{kind}`")),
            FileKind::Unverified => Some(format!("`{name}` could not be verified")),
            FileKind::File if self.empty => Some(format!("`{name}` is empty")),
            FileKind::File => None,
        }
    }
}

/// Aggregate of a verification pass, in required-artifact order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub files: Vec<FileVerification>,
}

impl VerificationOutcome {
    /// Human-readable errors; empty means the pass succeeded.
    pub fn errors(&self) -> Vec<String> {
        self.files.iter().filter_map(FileVerification::error).collect()
    }

    pub fn passed(&self) -> bool {
        self.files.iter().all(|file| file.error().is_none())
    }
}

/// Verify every required artifact against the pull request's changed files.
pub async fn verify(
    host: &dyn RepositoryHost,
    repository: &RepositoryRef,
    revision: &str,
    changed_files: &[ChangedFile],
    required: &RequiredArtifacts,
) -> VerificationOutcome {
    let checks = required
        .iter()
        .map(|artifact| verify_file(host, repository, revision, changed_files, artifact));

    // join_all keeps input order, so results group by file, not completion.
    VerificationOutcome {
        files: join_all(checks).await,
    }
}

async fn verify_file(
    host: &dyn RepositoryHost,
    repository: &RepositoryRef,
    revision: &str,
    changed_files: &[ChangedFile],
    artifact: &RequiredArtifact,
) -> FileVerification {
    let filename = artifact.filename.as_str();
    let present = changed_files
        .iter()
        .any(|file| file.filename == filename && file.exists_at_head());
    if !present {
        return FileVerification::missing(filename);
    }

    let fetched = host::call(
        HostOperation::GetContent,
        host.get_content(repository, filename, revision),
    )
    .await;

    match fetched {
        Err(_) => FileVerification::found(filename, FileKind::Unverified, false),
        Ok(RepoContent::Directory(_)) => {
            FileVerification::found(filename, FileKind::Directory, false)
        }
        Ok(RepoContent::Entry(entry)) => match entry.kind {
            ContentKind::File => {
                FileVerification::found(filename, FileKind::File, entry.content.is_empty())
            }
            ContentKind::Dir => FileVerification::found(filename, FileKind::Directory, false),
            other => FileVerification::found(filename, FileKind::Other(other.to_string()), false),
        },
    }
}
