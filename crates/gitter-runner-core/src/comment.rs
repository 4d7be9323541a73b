//! Single evolving status comment per phase.
//!
//! A `StatusComment` is created once at the start of a phase and every
//! later message for that phase updates it in place. The comment id is
//! carried as a value through the phase; nothing is cached.

use crate::domain::PullRequestRef;
use crate::host::{self, CommentId, HostOperation, HostResult, RepositoryHost};

/// Handle to the status comment of one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusComment {
    pull_request: PullRequestRef,
    id: CommentId,
}

impl StatusComment {
    /// Post a new comment with `body`.
    pub async fn create(
        host: &dyn RepositoryHost,
        pull_request: &PullRequestRef,
        body: &str,
    ) -> HostResult<Self> {
        let id = host::call(
            HostOperation::CreateComment,
            host.create_comment(pull_request, body),
        )
        .await?;
        tracing::debug!(comment_id = %id, "status comment created");

        Ok(Self {
            pull_request: pull_request.clone(),
            id,
        })
    }

    /// Replace the comment body.
    pub async fn update(&self, host: &dyn RepositoryHost, body: &str) -> HostResult<()> {
        host::call(
            HostOperation::UpdateComment,
            host.update_comment(&self.pull_request, self.id, body),
        )
        .await?;
        tracing::debug!(comment_id = %self.id, "status comment updated");
        Ok(())
    }

    pub fn id(&self) -> CommentId {
        self.id
    }

    pub fn pull_request(&self) -> &PullRequestRef {
        &self.pull_request
    }
}
