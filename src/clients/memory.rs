//! In-memory collaborators for tests
//!
//! Each fake records the calls it receives and can be told to fail a
//! named operation with an upstream error.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use super::{ObjectStore, PipelineService, PullRequestComment, SourceControl};
use crate::error::UpstreamError;
use crate::pipeline::PipelineDeclaration;
use crate::review::ApprovalDecision;

fn injected(service: &'static str, operation: &'static str) -> UpstreamError {
    UpstreamError::service(
        service,
        operation,
        500,
        Some("InjectedFailure".to_string()),
        "injected failure",
    )
}

// ============================================================
// Source control
// ============================================================

#[derive(Default)]
pub struct MemorySourceControl {
    revisions: Mutex<HashMap<String, String>>,
    comments: Mutex<Vec<PullRequestComment>>,
    approvals: Mutex<Vec<(String, String, ApprovalDecision)>>,
    fail_on: Mutex<Option<&'static str>>,
}

impl MemorySourceControl {
    pub fn with_pull_request(self, pull_request_id: &str, revision_id: &str) -> Self {
        self.revisions
            .lock()
            .unwrap()
            .insert(pull_request_id.to_string(), revision_id.to_string());
        self
    }

    pub fn fail_on(&self, operation: &'static str) {
        *self.fail_on.lock().unwrap() = Some(operation);
    }

    pub fn comments(&self) -> Vec<PullRequestComment> {
        self.comments.lock().unwrap().clone()
    }

    pub fn approvals(&self) -> Vec<(String, String, ApprovalDecision)> {
        self.approvals.lock().unwrap().clone()
    }

    fn check(&self, operation: &'static str) -> Result<(), UpstreamError> {
        match *self.fail_on.lock().unwrap() {
            Some(op) if op == operation => Err(injected("codecommit", operation)),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl SourceControl for MemorySourceControl {
    async fn get_pull_request_revision(
        &self,
        pull_request_id: &str,
    ) -> Result<String, UpstreamError> {
        self.check("GetPullRequest")?;
        self.revisions
            .lock()
            .unwrap()
            .get(pull_request_id)
            .cloned()
            .ok_or_else(|| {
                UpstreamError::service(
                    "codecommit",
                    "GetPullRequest",
                    400,
                    Some("PullRequestDoesNotExistException".to_string()),
                    format!("pull request {} does not exist", pull_request_id),
                )
            })
    }

    async fn post_comment(&self, comment: &PullRequestComment) -> Result<(), UpstreamError> {
        self.check("PostCommentForPullRequest")?;
        self.comments.lock().unwrap().push(comment.clone());
        Ok(())
    }

    async fn update_approval_state(
        &self,
        pull_request_id: &str,
        revision_id: &str,
        decision: ApprovalDecision,
    ) -> Result<(), UpstreamError> {
        self.check("UpdatePullRequestApprovalState")?;
        self.approvals.lock().unwrap().push((
            pull_request_id.to_string(),
            revision_id.to_string(),
            decision,
        ));
        Ok(())
    }
}

// ============================================================
// Pipelines
// ============================================================

#[derive(Default)]
pub struct MemoryPipelines {
    pipelines: Mutex<HashMap<String, PipelineDeclaration>>,
    started: Mutex<Vec<String>>,
    updates: Mutex<usize>,
    fail_on: Mutex<Option<&'static str>>,
}

impl MemoryPipelines {
    pub fn with_pipeline(self, pipeline: PipelineDeclaration) -> Self {
        self.pipelines
            .lock()
            .unwrap()
            .insert(pipeline.name.clone(), pipeline);
        self
    }

    pub fn fail_on(&self, operation: &'static str) {
        *self.fail_on.lock().unwrap() = Some(operation);
    }

    pub fn pipeline(&self, name: &str) -> Option<PipelineDeclaration> {
        self.pipelines.lock().unwrap().get(name).cloned()
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn update_count(&self) -> usize {
        *self.updates.lock().unwrap()
    }

    fn check(&self, operation: &'static str) -> Result<(), UpstreamError> {
        match *self.fail_on.lock().unwrap() {
            Some(op) if op == operation => Err(injected("codepipeline", operation)),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl PipelineService for MemoryPipelines {
    async fn get_pipeline(&self, name: &str) -> Result<Option<PipelineDeclaration>, UpstreamError> {
        self.check("GetPipeline")?;
        Ok(self.pipelines.lock().unwrap().get(name).cloned())
    }

    async fn update_pipeline(&self, pipeline: &PipelineDeclaration) -> Result<(), UpstreamError> {
        self.check("UpdatePipeline")?;
        self.pipelines
            .lock()
            .unwrap()
            .insert(pipeline.name.clone(), pipeline.clone());
        *self.updates.lock().unwrap() += 1;
        Ok(())
    }

    async fn start_execution(&self, name: &str) -> Result<String, UpstreamError> {
        self.check("StartPipelineExecution")?;
        let mut started = self.started.lock().unwrap();
        started.push(name.to_string());
        Ok(format!("exec-{}", started.len()))
    }
}

// ============================================================
// Store
// ============================================================

#[derive(Default)]
pub struct MemoryStore {
    buckets: Mutex<BTreeMap<String, BTreeSet<String>>>,
    fail_on: Mutex<Option<&'static str>>,
}

impl MemoryStore {
    pub fn with_key(self, bucket: &str, key: &str) -> Self {
        self.buckets
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string());
        self
    }

    pub fn fail_on(&self, operation: &'static str) {
        *self.fail_on.lock().unwrap() = Some(operation);
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .lock()
            .unwrap()
            .get(bucket)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn check(&self, operation: &'static str) -> Result<(), UpstreamError> {
        match *self.fail_on.lock().unwrap() {
            Some(op) if op == operation => Err(injected("s3", operation)),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_marker(&self, bucket: &str, key: &str) -> Result<(), UpstreamError> {
        self.check("PutObject")?;
        self.buckets
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string());
        Ok(())
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, UpstreamError> {
        self.check("ListObjectsV2")?;
        Ok(self
            .keys(bucket)
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect())
    }
}
