//! Review Decision Engine
//!
//! Translates pipeline state into a pull request approval and posts the
//! status comment when a review pipeline is kicked off.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::clients::{PullRequestComment, SourceControl};
use crate::error::UpstreamError;
use crate::event::{PipelineState, PullRequestEvent};

/// Approval verdict applied to a pull request revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApprovalDecision {
    Approve,
    Revoke,
}

impl ApprovalDecision {
    /// Decision for a pipeline state; `None` for states that do not change the verdict
    pub fn for_state(state: &PipelineState) -> Option<Self> {
        match state {
            PipelineState::Started | PipelineState::Failed => Some(Self::Revoke),
            PipelineState::Succeeded => Some(Self::Approve),
            PipelineState::Other(_) => None,
        }
    }

    /// Wire value of the approval state
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalDecision::Approve => "APPROVE",
            ApprovalDecision::Revoke => "REVOKE",
        }
    }
}

impl std::fmt::Display for ApprovalDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CodePipeline console links for a region
#[derive(Debug, Clone)]
pub struct ConsoleLinks {
    region: String,
}

impl ConsoleLinks {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
        }
    }

    fn base(&self) -> String {
        format!(
            "https://{}.console.aws.amazon.com/codesuite/codepipeline/pipelines",
            self.region
        )
    }

    /// Pipeline overview page
    pub fn pipeline_url(&self, pipeline: &str) -> String {
        format!("{}/{}/view?region={}", self.base(), pipeline, self.region)
    }

    /// Timeline of a single execution
    pub fn execution_url(&self, pipeline: &str, execution_id: &str) -> String {
        format!(
            "{}/{}/executions/{}/timeline?region={}",
            self.base(),
            pipeline,
            execution_id,
            self.region
        )
    }
}

/// Applies review decisions through the source control system
pub struct ReviewDecisionEngine {
    source_control: Arc<dyn SourceControl>,
    links: ConsoleLinks,
}

impl ReviewDecisionEngine {
    pub fn new(source_control: Arc<dyn SourceControl>, links: ConsoleLinks) -> Self {
        Self {
            source_control,
            links,
        }
    }

    /// Apply `decision` to the current revision of a pull request
    pub async fn decide(
        &self,
        pull_request_id: &str,
        decision: ApprovalDecision,
    ) -> Result<(), UpstreamError> {
        let revision_id = self
            .source_control
            .get_pull_request_revision(pull_request_id)
            .await?;

        self.source_control
            .update_approval_state(pull_request_id, &revision_id, decision)
            .await?;

        info!(
            pull_request_id = %pull_request_id,
            revision_id = %revision_id,
            decision = %decision,
            "Pull request reviewed"
        );
        Ok(())
    }

    /// Comment linking the pull request to its review pipeline execution
    pub fn trigger_comment(
        &self,
        event: &PullRequestEvent,
        pipeline: &str,
        execution_id: &str,
    ) -> PullRequestComment {
        let content = format!(
            "PR review pipeline triggered with ID: [{}]({}). You can find build details [here]({})",
            execution_id,
            self.links.execution_url(pipeline, execution_id),
            self.links.pipeline_url(pipeline)
        );

        PullRequestComment {
            pull_request_id: event.pull_request_id.clone(),
            repository_name: event.repository_name.clone(),
            content,
            before_commit_id: event.destination_commit.clone(),
            after_commit_id: event.source_commit.clone(),
        }
    }

    /// Post the trigger comment on the pull request
    pub async fn announce_execution(
        &self,
        event: &PullRequestEvent,
        pipeline: &str,
        execution_id: &str,
    ) -> Result<(), UpstreamError> {
        let comment = self.trigger_comment(event, pipeline, execution_id);
        self.source_control.post_comment(&comment).await?;

        info!(
            pull_request_id = %event.pull_request_id,
            execution_id = %execution_id,
            "Posted pipeline status comment"
        );
        Ok(())
    }
}
