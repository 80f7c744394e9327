//! Inbound Events
//!
//! EventBridge envelopes and the two detail families this handler reacts
//! to: CodeCommit pull request state changes and CodePipeline execution
//! state changes.

use serde::Deserialize;
use serde_json::Value;

use crate::error::ValidatorError;

/// Detail type of CodeCommit pull request notifications
pub const PULL_REQUEST_DETAIL_TYPE: &str = "CodeCommit Pull Request State Change";
/// Detail type of CodePipeline execution notifications
pub const PIPELINE_DETAIL_TYPE: &str = "CodePipeline Pipeline Execution State Change";
/// Substring identifying pull request review pipelines
pub const REVIEW_PIPELINE_MARKER: &str = "-pr-review";

/// Name of the review pipeline for a repository
pub fn review_pipeline_name(repository: &str) -> String {
    format!("{}{}", repository, REVIEW_PIPELINE_MARKER)
}

/// Whether a pipeline follows the review pipeline naming convention
pub fn is_review_pipeline(pipeline: &str) -> bool {
    pipeline.contains(REVIEW_PIPELINE_MARKER)
}

// ============================================================
// Envelope
// ============================================================

/// EventBridge event envelope
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "detail-type")]
    pub detail_type: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub detail: Value,
}

/// Decoded inbound event
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    PullRequest(PullRequestEvent),
    PipelineState(PipelineStateEvent),
}

impl EventEnvelope {
    /// Decode an envelope from raw JSON
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ValidatorError> {
        serde_json::from_slice(bytes).map_err(|source| ValidatorError::Decode {
            what: "event envelope",
            source,
        })
    }

    /// Decode the detail payload according to the detail type
    pub fn classify(self) -> Result<InboundEvent, ValidatorError> {
        match self.detail_type.as_str() {
            PULL_REQUEST_DETAIL_TYPE => {
                let detail: PullRequestDetail = decode_detail(self.detail, "pull request detail")?;
                Ok(InboundEvent::PullRequest(detail.try_into()?))
            }
            PIPELINE_DETAIL_TYPE => {
                let detail: PipelineStateEvent = decode_detail(self.detail, "pipeline detail")?;
                Ok(InboundEvent::PipelineState(detail))
            }
            other => Err(ValidatorError::UnsupportedDetailType(other.to_string())),
        }
    }
}

/// Detail may arrive as an object or as a JSON-encoded string
fn decode_detail<T: serde::de::DeserializeOwned>(
    detail: Value,
    what: &'static str,
) -> Result<T, ValidatorError> {
    let decoded = match detail {
        Value::String(raw) => serde_json::from_str(&raw),
        other => serde_json::from_value(other),
    };
    decoded.map_err(|source| ValidatorError::Decode { what, source })
}

// ============================================================
// Pull request events
// ============================================================

/// Kind of pull request notification
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum PullRequestEventKind {
    Created,
    SourceBranchUpdated,
    /// Any other kind (status changed, merged, ...)
    Other(String),
}

impl From<String> for PullRequestEventKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "pullRequestCreated" => Self::Created,
            "pullRequestSourceBranchUpdated" => Self::SourceBranchUpdated,
            _ => Self::Other(value),
        }
    }
}

impl PullRequestEventKind {
    /// Whether this kind (re)starts the review pipeline
    pub fn triggers_review(&self) -> bool {
        matches!(self, Self::Created | Self::SourceBranchUpdated)
    }
}

impl std::fmt::Display for PullRequestEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "pullRequestCreated"),
            Self::SourceBranchUpdated => write!(f, "pullRequestSourceBranchUpdated"),
            Self::Other(kind) => write!(f, "{}", kind),
        }
    }
}

/// Raw CodeCommit detail payload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestDetail {
    event: PullRequestEventKind,
    #[serde(default)]
    repository_names: Vec<String>,
    #[serde(default)]
    repository_name: Option<String>,
    #[serde(default)]
    pull_request_id: Option<String>,
    #[serde(default)]
    source_reference: String,
    #[serde(default)]
    source_commit: String,
    #[serde(default)]
    destination_commit: String,
}

/// Pull request lifecycle event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestEvent {
    pub kind: PullRequestEventKind,
    pub repository_name: String,
    pub pull_request_id: String,
    /// Full reference of the source branch, e.g. `refs/heads/feature-x`
    pub source_reference: String,
    pub source_commit: String,
    pub destination_commit: String,
}

impl TryFrom<PullRequestDetail> for PullRequestEvent {
    type Error = ValidatorError;

    fn try_from(detail: PullRequestDetail) -> Result<Self, Self::Error> {
        let repository_name = detail
            .repository_names
            .into_iter()
            .next()
            .filter(|name| !name.is_empty())
            .or(detail.repository_name.filter(|name| !name.is_empty()));
        let pull_request_id = detail.pull_request_id.filter(|id| !id.is_empty());

        // Identifiers are only required for kinds that act on the pull request
        let (repository_name, pull_request_id) = if detail.event.triggers_review() {
            (
                repository_name.ok_or(ValidatorError::MissingField {
                    what: "pull request detail",
                    field: "repositoryNames",
                })?,
                pull_request_id.ok_or(ValidatorError::MissingField {
                    what: "pull request detail",
                    field: "pullRequestId",
                })?,
            )
        } else {
            (
                repository_name.unwrap_or_default(),
                pull_request_id.unwrap_or_default(),
            )
        };

        Ok(Self {
            kind: detail.event,
            repository_name,
            pull_request_id,
            source_reference: detail.source_reference,
            source_commit: detail.source_commit,
            destination_commit: detail.destination_commit,
        })
    }
}

// ============================================================
// Pipeline events
// ============================================================

/// Pipeline execution state
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum PipelineState {
    Started,
    Succeeded,
    Failed,
    /// CANCELED, SUPERSEDED, RESUMED, STOPPED, ...
    Other(String),
}

impl From<String> for PipelineState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "STARTED" => Self::Started,
            "SUCCEEDED" => Self::Succeeded,
            "FAILED" => Self::Failed,
            _ => Self::Other(value),
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started => write!(f, "STARTED"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Other(state) => write!(f, "{}", state),
        }
    }
}

/// Pipeline execution state change
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PipelineStateEvent {
    #[serde(rename = "pipeline")]
    pub pipeline_name: String,
    #[serde(rename = "execution-id")]
    pub execution_id: String,
    pub state: PipelineState,
}
