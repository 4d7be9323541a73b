//! GitHub App authentication.
//!
//! The App signs a short-lived RS256 JWT with its private key and trades it
//! for an installation access token. Tokens are cached per installation
//! until shortly before they expire.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use gitter_runner_core::{HostConnector, HostResult, RepositoryHost};

use crate::client::{endpoint, http_client, parse_api_base, request_json, GithubClient};
use crate::error::GithubError;

/// Backdate applied to `iat` to tolerate clock drift.
const JWT_BACKDATE_SECS: i64 = 60;
/// JWT lifetime after `now`; GitHub rejects anything above ten minutes.
const JWT_LIFETIME_SECS: i64 = 540;
/// Refresh cached installation tokens this long before expiry.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Claims carried by the App JWT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppClaims {
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}

/// App identifier plus its signing key.
pub struct AppCredentials {
    app_id: String,
    key: EncodingKey,
}

impl std::fmt::Debug for AppCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppCredentials")
            .field("app_id", &self.app_id)
            .finish_non_exhaustive()
    }
}

impl AppCredentials {
    /// Load credentials from an RSA private key in PEM form.
    ///
    /// Literal `\n` sequences are expanded so the key can be passed through
    /// a single-line environment variable.
    pub fn from_pem(app_id: impl Into<String>, pem: &str) -> Result<Self, GithubError> {
        let app_id = app_id.into();
        if app_id.trim().is_empty() {
            return Err(GithubError::InvalidPrivateKey(
                "App id must not be empty".to_string(),
            ));
        }
        let pem = normalize_pem(pem);
        let key = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| GithubError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self {
            app_id: app_id.trim().to_string(),
            key,
        })
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Claims for a JWT issued at `now`.
    pub fn claims_at(&self, now: DateTime<Utc>) -> AppClaims {
        let now = now.timestamp();
        AppClaims {
            iat: now - JWT_BACKDATE_SECS,
            exp: now + JWT_LIFETIME_SECS,
            iss: self.app_id.clone(),
        }
    }

    /// Sign an App JWT valid from `now`.
    pub fn jwt_at(&self, now: DateTime<Utc>) -> Result<String, GithubError> {
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::RS256),
            &self.claims_at(now),
            &self.key,
        )?;
        Ok(token)
    }

    pub fn jwt(&self) -> Result<String, GithubError> {
        self.jwt_at(Utc::now())
    }
}

/// Expand escaped newlines and trim surrounding whitespace.
pub fn normalize_pem(raw: &str) -> String {
    let mut pem = raw.trim().replace("\\n", "\n");
    if !pem.ends_with('\n') {
        pem.push('\n');
    }
    pem
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Clone)]
struct InstallationToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl InstallationToken {
    fn fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) > now
    }
}

/// Resolves installation-scoped [`GithubClient`]s for one GitHub App.
pub struct GithubApp {
    credentials: AppCredentials,
    http: reqwest::Client,
    api_base: Url,
    tokens: Mutex<HashMap<u64, InstallationToken>>,
}

impl std::fmt::Debug for GithubApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubApp")
            .field("app_id", &self.credentials.app_id)
            .field("api_base", &self.api_base.as_str())
            .finish_non_exhaustive()
    }
}

impl GithubApp {
    pub fn new(
        credentials: AppCredentials,
        api_base: &str,
        request_timeout: Duration,
    ) -> Result<Self, GithubError> {
        Ok(Self {
            credentials,
            http: http_client(request_timeout)?,
            api_base: parse_api_base(api_base)?,
            tokens: Mutex::new(HashMap::new()),
        })
    }

    pub fn credentials(&self) -> &AppCredentials {
        &self.credentials
    }

    /// Number of installations holding a cached token.
    pub fn cached_installations(&self) -> usize {
        self.lock_tokens().len()
    }

    fn lock_tokens(&self) -> std::sync::MutexGuard<'_, HashMap<u64, InstallationToken>> {
        self.tokens.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Installation access token, reusing a cached one while it is fresh.
    pub async fn installation_token(&self, installation_id: u64) -> HostResult<String> {
        let now = Utc::now();
        let cached = self
            .lock_tokens()
            .get(&installation_id)
            .filter(|t| t.fresh_at(now))
            .map(|t| t.token.clone());
        if let Some(token) = cached {
            return Ok(token);
        }

        let jwt = self.credentials.jwt_at(now)?;
        let id = installation_id.to_string();
        let url = endpoint(
            &self.api_base,
            ["app", "installations", id.as_str(), "access_tokens"],
        )?;
        let response: AccessTokenResponse =
            request_json(self.http.post(url).bearer_auth(jwt)).await?;

        tracing::debug!(
            installation_id,
            expires_at = %response.expires_at,
            "Issued installation access token"
        );
        let token = InstallationToken {
            token: response.token,
            expires_at: response.expires_at,
        };
        self.lock_tokens().insert(installation_id, token.clone());
        Ok(token.token)
    }
}

#[async_trait]
impl HostConnector for GithubApp {
    async fn connect(&self, installation_id: u64) -> HostResult<Arc<dyn RepositoryHost>> {
        let token = self.installation_token(installation_id).await?;
        Ok(Arc::new(GithubClient::with_http(
            self.http.clone(),
            self.api_base.clone(),
            token,
        )))
    }
}
