//! Gitter Runner GitHub host
//!
//! GitHub App authentication and the REST client behind the core
//! `HostConnector`/`RepositoryHost` traits.

pub mod auth;
pub mod client;
pub mod error;

pub use auth::{normalize_pem, AppClaims, AppCredentials, GithubApp};
pub use client::{
    http_client, parse_api_base, GithubClient, DEFAULT_API_URL, DEFAULT_REQUEST_TIMEOUT,
};
pub use error::GithubError;
