//! Installation-scoped GitHub REST client.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use gitter_runner_core::{
    ChangedFile, CommentId, ContentEntry, ContentKind, HostError, HostResult, PullRequestRef,
    RepoContent, RepositoryHost, RepositoryRef,
};

use crate::error::{transport, GithubError};

/// Public GitHub REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Per-request timeout applied to every API call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const PAGE_SIZE: usize = 100;
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw+json";
const USER_AGENT: &str = concat!("gitter-runner/", env!("CARGO_PKG_VERSION"));

/// Build the shared HTTP client carrying the GitHub default headers.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, GithubError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("application/vnd.github+json"),
    );
    headers.insert(
        "x-github-api-version",
        HeaderValue::from_static("2022-11-28"),
    );

    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|e| GithubError::Client(e.to_string()))
}

/// Parse and check an API base URL such as `https://ghe.example.com/api/v3`.
pub fn parse_api_base(raw: &str) -> Result<Url, GithubError> {
    let url = Url::parse(raw.trim()).map_err(|e| GithubError::InvalidApiUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(GithubError::InvalidApiUrl {
            url: raw.to_string(),
            reason: "not a hierarchical URL".to_string(),
        });
    }
    Ok(url)
}

/// Append path segments to the API base; each segment is percent-encoded.
pub(crate) fn endpoint<I>(base: &Url, segments: I) -> HostResult<Url>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut url = base.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| HostError::Transport(format!("cannot extend API URL {base}")))?;
        path.pop_if_empty().extend(segments);
    }
    Ok(url)
}

/// Send a request and turn non-2xx answers into `HostError::Status`.
pub(crate) async fn send(request: RequestBuilder) -> HostResult<Response> {
    let response = request.send().await.map_err(transport)?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(HostError::Status {
        status: status.as_u16(),
        message: error_message(status, &body),
    })
}

pub(crate) async fn request_json<T: DeserializeOwned>(request: RequestBuilder) -> HostResult<T> {
    send(request)
        .await?
        .json::<T>()
        .await
        .map_err(|e| HostError::Decode(e.to_string()))
}

fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    #[derive(Deserialize)]
    struct ApiError {
        message: String,
    }

    if let Ok(api) = serde_json::from_str::<ApiError>(body) {
        return api.message;
    }
    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.chars().take(200).collect();
    }
    status
        .canonical_reason()
        .unwrap_or("unknown status")
        .to_string()
}

#[derive(Deserialize)]
struct CommentResponse {
    id: u64,
}

#[derive(Deserialize)]
struct PullRequestFile {
    filename: String,
    status: String,
}

#[derive(Deserialize)]
struct DirectoryEntry {
    name: String,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ContentsPayload {
    Directory(Vec<DirectoryEntry>),
    Entry(ContentResponse),
}

/// GitHub client authenticated as one App installation.
#[derive(Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    api_base: Url,
    token: String,
}

impl std::fmt::Debug for GithubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubClient")
            .field("api_base", &self.api_base.as_str())
            .finish_non_exhaustive()
    }
}

impl GithubClient {
    /// Create a client from an API base URL and an access token.
    pub fn new(api_base: &str, token: impl Into<String>) -> Result<Self, GithubError> {
        Ok(Self::with_http(
            http_client(DEFAULT_REQUEST_TIMEOUT)?,
            parse_api_base(api_base)?,
            token,
        ))
    }

    /// Create a client sharing an existing HTTP connection pool.
    pub fn with_http(http: reqwest::Client, api_base: Url, token: impl Into<String>) -> Self {
        Self {
            http,
            api_base,
            token: token.into(),
        }
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    fn repo_endpoint(&self, repository: &RepositoryRef, rest: &[&str]) -> HostResult<Url> {
        let head = ["repos", repository.owner.as_str(), repository.name.as_str()];
        endpoint(&self.api_base, head.iter().chain(rest.iter()))
    }

    async fn fetch_raw(&self, url: Url) -> HostResult<Vec<u8>> {
        let response = send(
            self.http
                .get(url)
                .bearer_auth(&self.token)
                .header(header::ACCEPT, RAW_MEDIA_TYPE),
        )
        .await?;
        let bytes = response.bytes().await.map_err(transport)?;
        Ok(bytes.to_vec())
    }
}

/// Decode a base64 payload as GitHub sends it (wrapped at 60 columns).
fn decode_base64(content: &str) -> HostResult<Vec<u8>> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| HostError::Decode(format!("invalid base64 content: {e}")))
}

#[async_trait]
impl RepositoryHost for GithubClient {
    async fn create_comment(
        &self,
        pull_request: &PullRequestRef,
        body: &str,
    ) -> HostResult<CommentId> {
        let number = pull_request.number.to_string();
        let url = self.repo_endpoint(
            &pull_request.repository,
            &["issues", number.as_str(), "comments"],
        )?;
        let created: CommentResponse = request_json(
            self.http
                .post(url)
                .bearer_auth(&self.token)
                .json(&json!({ "body": body })),
        )
        .await?;
        Ok(CommentId(created.id))
    }

    async fn update_comment(
        &self,
        pull_request: &PullRequestRef,
        comment_id: CommentId,
        body: &str,
    ) -> HostResult<()> {
        let id = comment_id.0.to_string();
        let url = self.repo_endpoint(
            &pull_request.repository,
            &["issues", "comments", id.as_str()],
        )?;
        send(
            self.http
                .patch(url)
                .bearer_auth(&self.token)
                .json(&json!({ "body": body })),
        )
        .await?;
        Ok(())
    }

    async fn list_files(&self, pull_request: &PullRequestRef) -> HostResult<Vec<ChangedFile>> {
        let number = pull_request.number.to_string();
        let url = self.repo_endpoint(
            &pull_request.repository,
            &["pulls", number.as_str(), "files"],
        )?;

        let mut page = 1_u32;
        let mut files = Vec::new();
        loop {
            let chunk: Vec<PullRequestFile> = request_json(
                self.http
                    .get(url.clone())
                    .bearer_auth(&self.token)
                    .query(&[
                        ("per_page", PAGE_SIZE.to_string()),
                        ("page", page.to_string()),
                    ]),
            )
            .await?;
            let chunk_len = chunk.len();
            files.extend(
                chunk
                    .into_iter()
                    .map(|f| ChangedFile::new(f.filename, f.status)),
            );
            if chunk_len < PAGE_SIZE {
                break;
            }
            page = page.saturating_add(1);
        }
        tracing::debug!(
            pr = %pull_request,
            files = files.len(),
            pages = page,
            "Listed pull request files"
        );
        Ok(files)
    }

    async fn get_content(
        &self,
        repository: &RepositoryRef,
        path: &str,
        revision: &str,
    ) -> HostResult<RepoContent> {
        let mut segments = vec!["contents"];
        segments.extend(path.split('/').filter(|s| !s.is_empty()));
        let mut url = self.repo_endpoint(repository, &segments)?;
        url.query_pairs_mut().append_pair("ref", revision);

        let payload: ContentsPayload =
            request_json(self.http.get(url.clone()).bearer_auth(&self.token)).await?;

        let entry = match payload {
            ContentsPayload::Directory(entries) => {
                return Ok(RepoContent::Directory(
                    entries.into_iter().map(|e| e.name).collect(),
                ));
            }
            ContentsPayload::Entry(entry) => entry,
        };

        let kind = ContentKind::from_name(&entry.kind);
        let content = match (entry.encoding.as_deref(), entry.content.as_deref()) {
            (Some("base64"), Some(encoded)) => decode_base64(encoded)?,
            // Files above 1 MB come back without inline content.
            (Some("none"), _) if kind == ContentKind::File && entry.size > 0 => {
                self.fetch_raw(url).await?
            }
            _ => Vec::new(),
        };

        Ok(RepoContent::Entry(ContentEntry {
            kind,
            size: entry.size,
            content,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_keeps_base_path() {
        let base = parse_api_base("https://ghe.example.com/api/v3/").unwrap();
        let url = endpoint(&base, ["repos", "acme", "fleet", "pulls", "7", "files"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://ghe.example.com/api/v3/repos/acme/fleet/pulls/7/files"
        );
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let base = parse_api_base(DEFAULT_API_URL).unwrap();
        let url = endpoint(&base, ["repos", "acme", "fleet", "contents", "my file.sh"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/acme/fleet/contents/my%20file.sh"
        );
    }

    #[test]
    fn test_rejects_non_hierarchical_base() {
        assert!(parse_api_base("mailto:ops@example.com").is_err());
        assert!(parse_api_base("not a url").is_err());
    }

    #[test]
    fn test_base64_with_line_breaks() {
        assert_eq!(decode_base64("ZWNo\nbyBv\nawo=\n").unwrap(), b"echo ok\n");
        assert!(matches!(
            decode_base64("%%%"),
            Err(HostError::Decode(_))
        ));
    }

    #[test]
    fn test_error_message_prefers_api_message() {
        let status = reqwest::StatusCode::NOT_FOUND;
        assert_eq!(
            error_message(status, r#"{"message":"Not Found","documentation_url":"x"}"#),
            "Not Found"
        );
        assert_eq!(error_message(status, "  gateway down "), "gateway down");
        assert_eq!(error_message(status, ""), "Not Found");
    }
}
