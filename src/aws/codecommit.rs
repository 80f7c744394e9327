//! CodeCommit client: pull request revision lookup, comments and approvals.

use async_trait::async_trait;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::json_rpc::JsonRpcClient;
use super::AwsContext;
use crate::clients::{PullRequestComment, SourceControl};
use crate::error::UpstreamError;
use crate::review::ApprovalDecision;

const SERVICE: &str = "codecommit";
const TARGET_PREFIX: &str = "CodeCommit_20150413";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GetPullRequestInput<'a> {
    pull_request_id: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetPullRequestOutput {
    pull_request: PullRequestSummary,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestSummary {
    revision_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PostCommentInput<'a> {
    pull_request_id: &'a str,
    repository_name: &'a str,
    before_commit_id: &'a str,
    after_commit_id: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateApprovalStateInput<'a> {
    pull_request_id: &'a str,
    revision_id: &'a str,
    approval_state: ApprovalDecision,
}

/// CodeCommit implementation of [`SourceControl`]
pub struct CodeCommitClient {
    rpc: JsonRpcClient,
}

impl CodeCommitClient {
    pub fn new(context: Arc<AwsContext>) -> Self {
        Self {
            rpc: JsonRpcClient::new(context, SERVICE, TARGET_PREFIX),
        }
    }
}

#[async_trait]
impl SourceControl for CodeCommitClient {
    async fn get_pull_request_revision(
        &self,
        pull_request_id: &str,
    ) -> Result<String, UpstreamError> {
        let output: GetPullRequestOutput = self
            .rpc
            .call("GetPullRequest", &GetPullRequestInput { pull_request_id })
            .await?;

        debug!(
            pull_request_id = %pull_request_id,
            revision_id = %output.pull_request.revision_id,
            "Fetched pull request revision"
        );
        Ok(output.pull_request.revision_id)
    }

    async fn post_comment(&self, comment: &PullRequestComment) -> Result<(), UpstreamError> {
        let _: IgnoredAny = self
            .rpc
            .call(
                "PostCommentForPullRequest",
                &PostCommentInput {
                    pull_request_id: &comment.pull_request_id,
                    repository_name: &comment.repository_name,
                    before_commit_id: &comment.before_commit_id,
                    after_commit_id: &comment.after_commit_id,
                    content: &comment.content,
                },
            )
            .await?;
        Ok(())
    }

    async fn update_approval_state(
        &self,
        pull_request_id: &str,
        revision_id: &str,
        decision: ApprovalDecision,
    ) -> Result<(), UpstreamError> {
        let _: IgnoredAny = self
            .rpc
            .call(
                "UpdatePullRequestApprovalState",
                &UpdateApprovalStateInput {
                    pull_request_id,
                    revision_id,
                    approval_state: decision,
                },
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::stub;
    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::Mutex;

    type Calls = Arc<Mutex<Vec<(String, Value)>>>;

    async fn codecommit(
        State(calls): State<Calls>,
        headers: HeaderMap,
        body: Bytes,
    ) -> (StatusCode, Json<Value>) {
        let body: Value = serde_json::from_slice(&body).unwrap();
        let target = headers
            .get("x-amz-target")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
        calls.lock().unwrap().push((target.clone(), body.clone()));

        match target.as_str() {
            "CodeCommit_20150413.GetPullRequest" if body["pullRequestId"] == "42" => (
                StatusCode::OK,
                Json(json!({ "pullRequest": { "pullRequestId": "42", "revisionId": "rev-7" } })),
            ),
            "CodeCommit_20150413.GetPullRequest" => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "__type": "PullRequestDoesNotExistException",
                    "message": "no such pull request"
                })),
            ),
            _ => (StatusCode::OK, Json(json!({}))),
        }
    }

    async fn client() -> (CodeCommitClient, Calls) {
        let calls: Calls = Arc::default();
        let router = Router::new()
            .route("/", post(codecommit))
            .with_state(calls.clone());
        let endpoint = stub::serve(router).await;
        (CodeCommitClient::new(stub::context(&endpoint)), calls)
    }

    #[tokio::test]
    async fn test_get_pull_request_revision() {
        let (client, _) = client().await;
        assert_eq!(client.get_pull_request_revision("42").await.unwrap(), "rev-7");

        let err = client.get_pull_request_revision("43").await.unwrap_err();
        assert!(err.has_code("PullRequestDoesNotExistException"));
        assert_eq!(err.service, "codecommit");
    }

    #[tokio::test]
    async fn test_post_comment_and_approval_payloads() {
        let (client, calls) = client().await;

        client
            .post_comment(&PullRequestComment {
                pull_request_id: "42".to_string(),
                repository_name: "svc".to_string(),
                content: "hello".to_string(),
                before_commit_id: "def456".to_string(),
                after_commit_id: "abc123".to_string(),
            })
            .await
            .unwrap();
        client
            .update_approval_state("42", "rev-7", ApprovalDecision::Revoke)
            .await
            .unwrap();

        let calls = calls.lock().unwrap().clone();
        assert_eq!(calls[0].0, "CodeCommit_20150413.PostCommentForPullRequest");
        assert_eq!(
            calls[0].1,
            json!({
                "pullRequestId": "42",
                "repositoryName": "svc",
                "beforeCommitId": "def456",
                "afterCommitId": "abc123",
                "content": "hello"
            })
        );
        assert_eq!(calls[1].0, "CodeCommit_20150413.UpdatePullRequestApprovalState");
        assert_eq!(
            calls[1].1,
            json!({ "pullRequestId": "42", "revisionId": "rev-7", "approvalState": "REVOKE" })
        );
    }
}
