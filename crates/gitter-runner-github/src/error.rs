//! Error types for gitter-runner-github

use gitter_runner_core::HostError;
use thiserror::Error;

/// Errors raised while setting up GitHub access.
#[derive(Error, Debug)]
pub enum GithubError {
    /// The App private key is not a usable RSA PEM
    #[error("invalid GitHub App private key: {0}")]
    InvalidPrivateKey(String),

    /// Signing the App JWT failed
    #[error("failed to sign GitHub App JWT: {0}")]
    Jwt(String),

    /// The API base URL cannot be used
    #[error("invalid GitHub API URL {url:?}: {reason}")]
    InvalidApiUrl { url: String, reason: String },

    /// HTTP client construction failed
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl From<jsonwebtoken::errors::Error> for GithubError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        GithubError::Jwt(err.to_string())
    }
}

impl From<GithubError> for HostError {
    fn from(err: GithubError) -> Self {
        HostError::Auth(err.to_string())
    }
}

/// Map a reqwest failure onto the host error taxonomy.
pub(crate) fn transport(err: reqwest::Error) -> HostError {
    if err.is_decode() {
        return HostError::Decode(err.to_string());
    }
    match err.status() {
        Some(status) => HostError::Status {
            status: status.as_u16(),
            message: err.to_string(),
        },
        None => HostError::Transport(err.to_string()),
    }
}
