//! Required run artifacts.

use serde::{Deserialize, Serialize};

use super::error::ArtifactSpecError;

/// Role a required file plays in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactRole {
    /// The script multi-gitter executes in every target repository.
    Script,
    /// The multi-gitter configuration file.
    Config,
}

impl ArtifactRole {
    /// Permission bits the staged copy receives.
    pub fn mode(&self) -> u32 {
        match self {
            ArtifactRole::Script => 0o755,
            ArtifactRole::Config => 0o644,
        }
    }
}

/// A file that must exist, be non-empty, and be a regular file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequiredArtifact {
    pub filename: String,
    pub role: ArtifactRole,
}

impl RequiredArtifact {
    pub fn new(filename: impl Into<String>, role: ArtifactRole) -> Self {
        Self {
            filename: filename.into(),
            role,
        }
    }
}

/// Ordered set of required artifacts.
///
/// Always holds exactly one script and one configuration, with unique
/// relative file names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<RequiredArtifact>")]
pub struct RequiredArtifacts(Vec<RequiredArtifact>);

impl RequiredArtifacts {
    pub fn new(artifacts: Vec<RequiredArtifact>) -> Result<Self, ArtifactSpecError> {
        if artifacts.is_empty() {
            return Err(ArtifactSpecError::Empty);
        }

        for (idx, artifact) in artifacts.iter().enumerate() {
            let name = artifact.filename.as_str();
            if name.is_empty() || name.ends_with('/') || name.starts_with('/') {
                return Err(ArtifactSpecError::InvalidName(name.to_string()));
            }
            if artifacts[..idx].iter().any(|a| a.filename == name) {
                return Err(ArtifactSpecError::Duplicate(name.to_string()));
            }
        }

        for role in [ArtifactRole::Script, ArtifactRole::Config] {
            let count = artifacts.iter().filter(|a| a.role == role).count();
            if count != 1 {
                return Err(ArtifactSpecError::RoleCount { role, count });
            }
        }

        Ok(Self(artifacts))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RequiredArtifact> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn filenames(&self) -> Vec<&str> {
        self.0.iter().map(|a| a.filename.as_str()).collect()
    }
}

impl TryFrom<Vec<RequiredArtifact>> for RequiredArtifacts {
    type Error = ArtifactSpecError;

    fn try_from(artifacts: Vec<RequiredArtifact>) -> Result<Self, Self::Error> {
        Self::new(artifacts)
    }
}

impl Default for RequiredArtifacts {
    /// `script.sh` and `config.yaml` at the repository root.
    fn default() -> Self {
        Self(vec![
            RequiredArtifact::new("script.sh", ArtifactRole::Script),
            RequiredArtifact::new("config.yaml", ArtifactRole::Config),
        ])
    }
}
