//! Collaborator Contracts
//!
//! Trait-based abstractions over the three external systems the handler
//! talks to: source control, the pipeline service and the key-value store.
//! Components receive these as `Arc<dyn ...>` handles; there is no shared
//! global client.

use async_trait::async_trait;

use crate::error::UpstreamError;
use crate::pipeline::PipelineDeclaration;
use crate::review::ApprovalDecision;

#[cfg(test)]
pub mod memory;

/// Comment posted on a pull request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestComment {
    pub pull_request_id: String,
    pub repository_name: String,
    pub content: String,
    /// Commit the comment is anchored before (destination branch tip)
    pub before_commit_id: String,
    /// Commit the comment is anchored after (source branch tip)
    pub after_commit_id: String,
}

/// Source control system (pull requests, comments, approvals)
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Current revision identifier of a pull request
    async fn get_pull_request_revision(&self, pull_request_id: &str)
        -> Result<String, UpstreamError>;

    /// Post a comment on a pull request
    async fn post_comment(&self, comment: &PullRequestComment) -> Result<(), UpstreamError>;

    /// Approve or revoke approval for a pull request revision
    async fn update_approval_state(
        &self,
        pull_request_id: &str,
        revision_id: &str,
        decision: ApprovalDecision,
    ) -> Result<(), UpstreamError>;
}

/// Pipeline service (definitions and executions)
#[async_trait]
pub trait PipelineService: Send + Sync {
    /// Fetch a pipeline definition; `None` when the pipeline does not exist
    async fn get_pipeline(&self, name: &str) -> Result<Option<PipelineDeclaration>, UpstreamError>;

    /// Replace a pipeline definition
    async fn update_pipeline(&self, pipeline: &PipelineDeclaration) -> Result<(), UpstreamError>;

    /// Start a new execution and return its identifier
    async fn start_execution(&self, name: &str) -> Result<String, UpstreamError>;
}

/// Prefix-searchable key-value store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write a zero-length object at `key`
    async fn put_marker(&self, bucket: &str, key: &str) -> Result<(), UpstreamError>;

    /// List every key starting with `prefix`
    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, UpstreamError>;
}
