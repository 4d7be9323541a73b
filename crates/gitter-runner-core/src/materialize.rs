//! Staging of required artifacts for a tool run.
//!
//! Each staging pass gets its own temporary directory under the configured
//! root. The directory and everything in it is removed when the returned
//! `StagedArtifacts` is dropped.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::domain::{ArtifactRole, RepositoryRef, RequiredArtifact, RequiredArtifacts};
use crate::host::{
    self, ChangedFile, ContentKind, HostError, HostOperation, RepoContent, RepositoryHost,
};

/// Errors produced while staging artifacts.
#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    #[error("required artifact `{0}` is not part of the pull request")]
    MissingArtifact(String),

    #[error("required artifact `{filename}` is a {kind}, not a file")]
    NotAFile { filename: String, kind: String },

    #[error("failed to stage artifacts: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Host(#[from] HostError),
}

/// A required file written to the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedArtifact {
    pub artifact: RequiredArtifact,
    pub path: PathBuf,
    pub mode: u32,
}

/// All staged artifacts of one pass, owning their directory.
#[derive(Debug)]
pub struct StagedArtifacts {
    dir: TempDir,
    files: Vec<StagedArtifact>,
}

impl StagedArtifacts {
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn files(&self) -> &[StagedArtifact] {
        &self.files
    }

    /// Path of the staged artifact with `role`.
    pub fn path_for(&self, role: ArtifactRole) -> Option<&Path> {
        self.files
            .iter()
            .find(|staged| staged.artifact.role == role)
            .map(|staged| staged.path.as_path())
    }
}

/// Fetch every required artifact at `revision` and stage it under
/// `staging_root` with its role's permission mode.
///
/// Completes for all artifacts or fails as a whole.
pub async fn materialize(
    host: &dyn RepositoryHost,
    repository: &RepositoryRef,
    revision: &str,
    changed_files: &[ChangedFile],
    required: &RequiredArtifacts,
    staging_root: &Path,
) -> Result<StagedArtifacts, MaterializeError> {
    tokio::fs::create_dir_all(staging_root).await?;
    let dir = tempfile::Builder::new()
        .prefix("gitter-run-")
        .tempdir_in(staging_root)?;

    let mut files = Vec::with_capacity(required.len());
    for artifact in required.iter() {
        let in_diff = changed_files
            .iter()
            .any(|file| file.filename == artifact.filename && file.exists_at_head());
        if !in_diff {
            return Err(MaterializeError::MissingArtifact(artifact.filename.clone()));
        }

        let content = host::call(
            HostOperation::GetContent,
            host.get_content(repository, &artifact.filename, revision),
        )
        .await?;

        let bytes = match content {
            RepoContent::Entry(entry) if entry.kind == ContentKind::File => entry.content,
            RepoContent::Entry(entry) => {
                return Err(MaterializeError::NotAFile {
                    filename: artifact.filename.clone(),
                    kind: entry.kind.to_string(),
                })
            }
            RepoContent::Directory(_) => {
                return Err(MaterializeError::NotAFile {
                    filename: artifact.filename.clone(),
                    kind: "directory".to_string(),
                })
            }
        };

        let path = dir.path().join(staged_name(&artifact.filename));
        let mode = artifact.role.mode();
        tokio::fs::write(&path, &bytes).await?;
        set_mode(&path, mode).await?;
        tracing::debug!(
            filename = %artifact.filename,
            path = %path.display(),
            mode = %format_args!("{mode:o}"),
            bytes = bytes.len(),
            "artifact staged"
        );

        files.push(StagedArtifact {
            artifact: artifact.clone(),
            path,
            mode,
        });
    }

    Ok(StagedArtifacts { dir, files })
}

/// Flat file name inside the staging directory.
fn staged_name(filename: &str) -> String {
    filename.replace('/', "__")
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::MemoryHost;

    fn repo() -> RepositoryRef {
        RepositoryRef::new("acme", "fleet")
    }

    fn changed() -> Vec<ChangedFile> {
        vec![
            ChangedFile::new("script.sh", "added"),
            ChangedFile::new("config.yaml", "added"),
            ChangedFile::new("README.md", "modified"),
        ]
    }

    #[test]
    fn test_staged_name_flattens_paths() {
        assert_eq!(staged_name("script.sh"), "script.sh");
        assert_eq!(staged_name("ops/run.sh"), "ops__run.sh");
    }

    #[tokio::test]
    async fn test_materialize_writes_required_files_only() {
        let root = tempfile::tempdir().unwrap();
        let host = MemoryHost::new()
            .with_file("script.sh", b"#!/bin/sh\necho hi\n")
            .with_file("config.yaml", b"repos: [a/b]\n")
            .with_file("README.md", b"docs");

        let staged = materialize(
            &host,
            &repo(),
            "m3rg3",
            &changed(),
            &RequiredArtifacts::default(),
            root.path(),
        )
        .await
        .unwrap();

        assert_eq!(staged.files().len(), 2);
        let script = staged.path_for(ArtifactRole::Script).unwrap();
        let config = staged.path_for(ArtifactRole::Config).unwrap();
        assert_eq!(std::fs::read(script).unwrap(), b"#!/bin/sh\necho hi\n");
        assert_eq!(std::fs::read(config).unwrap(), b"repos: [a/b]\n");
        assert!(staged.dir().starts_with(root.path()));

        let mut requested = host.content_requests();
        requested.sort();
        assert_eq!(requested, vec!["config.yaml".to_string(), "script.sh".to_string()]);
        assert_eq!(host.content_revisions(), vec!["m3rg3".to_string(); 2]);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode(script), 0o755);
            assert_eq!(mode(config), 0o644);
        }
    }

    #[tokio::test]
    async fn test_staging_dir_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let host = MemoryHost::new()
            .with_file("script.sh", b"echo\n")
            .with_file("config.yaml", b"a: b\n");

        let staged = materialize(
            &host,
            &repo(),
            "sha",
            &changed(),
            &RequiredArtifacts::default(),
            root.path(),
        )
        .await
        .unwrap();
        let dir = staged.dir().to_path_buf();
        assert!(dir.exists());

        drop(staged);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_missing_artifact_fails() {
        let root = tempfile::tempdir().unwrap();
        let host = MemoryHost::new().with_file("script.sh", b"echo\n");
        let changed = vec![ChangedFile::new("script.sh", "added")];

        let err = materialize(
            &host,
            &repo(),
            "sha",
            &changed,
            &RequiredArtifacts::default(),
            root.path(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MaterializeError::MissingArtifact(name) if name == "config.yaml"));
    }

    #[tokio::test]
    async fn test_fetch_failure_propagates() {
        let root = tempfile::tempdir().unwrap();
        let host = MemoryHost::new()
            .with_file("script.sh", b"echo\n")
            .fail_path("config.yaml", 500);

        let err = materialize(
            &host,
            &repo(),
            "sha",
            &changed(),
            &RequiredArtifacts::default(),
            root.path(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MaterializeError::Host(e) if e.status() == Some(500)));
    }
}
