//! In-memory fakes for the host and tool traits (testing only)
//!
//! Provides `MemoryHost`, `StaticConnector`, and `ScriptedRunner` that
//! satisfy the trait contracts without network access or a real
//! multi-gitter binary.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::{PullRequestRef, RepositoryRef};
use crate::executor::{RunInvocation, RunResult, ToolRunner};
use crate::host::*;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn status_error(status: u16) -> HostError {
    HostError::Status {
        status,
        message: format!("simulated HTTP {status}"),
    }
}

// ---------------------------------------------------------------------------
// MemoryHost
// ---------------------------------------------------------------------------

/// A successful call recorded by `MemoryHost`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    CreateComment {
        number: u64,
        body: String,
    },
    UpdateComment {
        number: u64,
        comment_id: CommentId,
        body: String,
    },
    ListFiles {
        number: u64,
    },
    GetContent {
        path: String,
        revision: String,
    },
}

/// In-memory repository host.
///
/// Changed files default to every path registered with `with_*`; call
/// `with_changed_files` to override. Unknown paths answer HTTP 404.
#[derive(Debug)]
pub struct MemoryHost {
    contents: Mutex<HashMap<String, RepoContent>>,
    changed: Mutex<Option<Vec<ChangedFile>>>,
    failing_operations: Mutex<HashMap<HostOperation, u16>>,
    failing_paths: Mutex<HashMap<String, u16>>,
    comments: Mutex<BTreeMap<CommentId, String>>,
    calls: Mutex<Vec<HostCall>>,
    next_comment_id: AtomicU64,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self {
            contents: Mutex::default(),
            changed: Mutex::default(),
            failing_operations: Mutex::default(),
            failing_paths: Mutex::default(),
            comments: Mutex::default(),
            calls: Mutex::default(),
            next_comment_id: AtomicU64::new(1000),
        }
    }
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a regular file.
    pub fn with_file(self, path: &str, content: &[u8]) -> Self {
        self.with_entry(path, ContentKind::File, content)
    }

    /// Register an entry of any kind.
    pub fn with_entry(self, path: &str, kind: ContentKind, content: &[u8]) -> Self {
        let entry = ContentEntry {
            kind,
            size: content.len() as u64,
            content: content.to_vec(),
        };
        lock(&self.contents).insert(path.to_string(), RepoContent::Entry(entry));
        self
    }

    /// Register a directory.
    pub fn with_directory(self, path: &str) -> Self {
        lock(&self.contents).insert(path.to_string(), RepoContent::Directory(vec![]));
        self
    }

    /// Override the pull request's changed-file list.
    pub fn with_changed_files(self, files: &[&str]) -> Self {
        let files = files
            .iter()
            .map(|name| ChangedFile::new(*name, "modified"))
            .collect();
        *lock(&self.changed) = Some(files);
        self
    }

    /// Make every call of `operation` fail with HTTP `status`.
    pub fn fail_operation(self, operation: HostOperation, status: u16) -> Self {
        lock(&self.failing_operations).insert(operation, status);
        self
    }

    /// Make content fetches of `path` fail with HTTP `status`.
    pub fn fail_path(self, path: &str, status: u16) -> Self {
        lock(&self.failing_paths).insert(path.to_string(), status);
        self
    }

    /// All successful calls in order.
    pub fn calls(&self) -> Vec<HostCall> {
        lock(&self.calls).clone()
    }

    /// Successful create/update comment calls in order.
    pub fn comment_calls(&self) -> Vec<HostCall> {
        self.calls()
            .into_iter()
            .filter(|call| {
                matches!(
                    call,
                    HostCall::CreateComment { .. } | HostCall::UpdateComment { .. }
                )
            })
            .collect()
    }

    /// Paths of successful content fetches in order.
    pub fn content_requests(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                HostCall::GetContent { path, .. } => Some(path),
                _ => None,
            })
            .collect()
    }

    /// Revisions of successful content fetches in order.
    pub fn content_revisions(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                HostCall::GetContent { revision, .. } => Some(revision),
                _ => None,
            })
            .collect()
    }

    /// Current body of a comment.
    pub fn comment_body(&self, id: CommentId) -> Option<String> {
        lock(&self.comments).get(&id).cloned()
    }

    /// Number of comments ever created.
    pub fn comment_count(&self) -> usize {
        lock(&self.comments).len()
    }

    fn check(&self, operation: HostOperation) -> HostResult<()> {
        match lock(&self.failing_operations).get(&operation) {
            Some(status) => Err(status_error(*status)),
            None => Ok(()),
        }
    }

    fn record(&self, call: HostCall) {
        lock(&self.calls).push(call);
    }
}

#[async_trait]
impl RepositoryHost for MemoryHost {
    async fn create_comment(
        &self,
        pull_request: &PullRequestRef,
        body: &str,
    ) -> HostResult<CommentId> {
        self.check(HostOperation::CreateComment)?;
        let id = CommentId(self.next_comment_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.comments).insert(id, body.to_string());
        self.record(HostCall::CreateComment {
            number: pull_request.number,
            body: body.to_string(),
        });
        Ok(id)
    }

    async fn update_comment(
        &self,
        pull_request: &PullRequestRef,
        comment_id: CommentId,
        body: &str,
    ) -> HostResult<()> {
        self.check(HostOperation::UpdateComment)?;
        let mut comments = lock(&self.comments);
        let slot = comments.get_mut(&comment_id).ok_or_else(|| status_error(404))?;
        *slot = body.to_string();
        drop(comments);
        self.record(HostCall::UpdateComment {
            number: pull_request.number,
            comment_id,
            body: body.to_string(),
        });
        Ok(())
    }

    async fn list_files(&self, pull_request: &PullRequestRef) -> HostResult<Vec<ChangedFile>> {
        self.check(HostOperation::ListFiles)?;
        let files = match lock(&self.changed).clone() {
            Some(files) => files,
            None => {
                let mut names: Vec<String> = lock(&self.contents).keys().cloned().collect();
                names.sort();
                names
                    .into_iter()
                    .map(|name| ChangedFile::new(name, "added"))
                    .collect()
            }
        };
        self.record(HostCall::ListFiles {
            number: pull_request.number,
        });
        Ok(files)
    }

    async fn get_content(
        &self,
        _repository: &RepositoryRef,
        path: &str,
        revision: &str,
    ) -> HostResult<RepoContent> {
        self.check(HostOperation::GetContent)?;
        if let Some(status) = lock(&self.failing_paths).get(path) {
            return Err(status_error(*status));
        }
        let content = lock(&self.contents)
            .get(path)
            .cloned()
            .ok_or_else(|| status_error(404))?;
        self.record(HostCall::GetContent {
            path: path.to_string(),
            revision: revision.to_string(),
        });
        Ok(content)
    }
}

// ---------------------------------------------------------------------------
// StaticConnector
// ---------------------------------------------------------------------------

/// Connector that hands out the same host for every installation.
#[derive(Debug)]
pub struct StaticConnector {
    host: Arc<MemoryHost>,
    failure: Option<u16>,
    installations: Mutex<Vec<u64>>,
}

impl StaticConnector {
    pub fn new(host: Arc<MemoryHost>) -> Self {
        Self {
            host,
            failure: None,
            installations: Mutex::default(),
        }
    }

    /// Connector whose every `connect` fails with HTTP `status`.
    pub fn failing(status: u16) -> Self {
        Self {
            host: Arc::new(MemoryHost::new()),
            failure: Some(status),
            installations: Mutex::default(),
        }
    }

    /// Installation ids passed to `connect`, in order.
    pub fn installations(&self) -> Vec<u64> {
        lock(&self.installations).clone()
    }
}

#[async_trait]
impl HostConnector for StaticConnector {
    async fn connect(&self, installation_id: u64) -> HostResult<Arc<dyn RepositoryHost>> {
        lock(&self.installations).push(installation_id);
        if let Some(status) = self.failure {
            return Err(status_error(status));
        }
        Ok(self.host.clone())
    }
}

// ---------------------------------------------------------------------------
// ScriptedRunner
// ---------------------------------------------------------------------------

/// What `ScriptedRunner` saw when invoked, captured before staging is removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedRun {
    pub dry_run: bool,
    pub script: Vec<u8>,
    pub config: Vec<u8>,
    /// Permission bits (0 on platforms without them).
    pub script_mode: u32,
    pub config_mode: u32,
}

/// Tool runner that replays queued results (default: success).
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    results: Mutex<VecDeque<RunResult>>,
    observed: Mutex<Vec<ObservedRun>>,
    seen_dirs: Mutex<HashSet<std::path::PathBuf>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner whose first run exits with `code`.
    pub fn exiting_with(code: i32) -> Self {
        let runner = Self::new();
        runner.push_result(exit_result(code));
        runner
    }

    /// Queue the result of the next run.
    pub fn push_result(&self, result: RunResult) {
        lock(&self.results).push_back(result);
    }

    pub fn observed(&self) -> Vec<ObservedRun> {
        lock(&self.observed).clone()
    }

    pub fn run_count(&self) -> usize {
        lock(&self.observed).len()
    }

    /// Staging directories seen during runs.
    pub fn staging_dirs(&self) -> Vec<std::path::PathBuf> {
        lock(&self.seen_dirs).iter().cloned().collect()
    }
}

/// A finished run with exit `code`.
pub fn exit_result(code: i32) -> RunResult {
    RunResult {
        succeeded: code == 0,
        exit_code: Some(code),
        stdout: String::new(),
        stderr: if code == 0 {
            String::new()
        } else {
            "simulated failure".to_string()
        },
        duration_ms: 1,
        timed_out: false,
    }
}

fn file_mode(path: &Path) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path)
            .map(|m| m.permissions().mode() & 0o777)
            .unwrap_or(0)
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        0
    }
}

#[async_trait]
impl ToolRunner for ScriptedRunner {
    async fn run(&self, invocation: &RunInvocation) -> RunResult {
        let observed = ObservedRun {
            dry_run: invocation.dry_run,
            script: std::fs::read(&invocation.script).unwrap_or_default(),
            config: std::fs::read(&invocation.config).unwrap_or_default(),
            script_mode: file_mode(&invocation.script),
            config_mode: file_mode(&invocation.config),
        };
        lock(&self.observed).push(observed);
        if let Some(dir) = invocation.script.parent() {
            lock(&self.seen_dirs).insert(dir.to_path_buf());
        }
        lock(&self.results)
            .pop_front()
            .unwrap_or_else(|| exit_result(0))
    }
}
