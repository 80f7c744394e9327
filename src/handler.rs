//! Event Handler
//!
//! Routes one inbound envelope through the correlation state machine:
//! pull request events trigger and record a review pipeline run, pipeline
//! state events are resolved back to their pull request and turned into an
//! approval decision.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clients::{ObjectStore, PipelineService, SourceControl};
use crate::configurator::{PipelineConfigurator, TriggerOutcome, TriggerRequest};
use crate::error::ValidatorError;
use crate::event::{
    is_review_pipeline, review_pipeline_name, EventEnvelope, InboundEvent, PipelineStateEvent,
    PullRequestEvent,
};
use crate::registry::{ExecutionRecord, ExecutionRegistry};
use crate::review::{ApprovalDecision, ConsoleLinks, ReviewDecisionEngine};

/// Process-wide handler settings
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    /// Bucket holding execution records
    pub bucket: String,
    /// Region used for console links
    pub region: String,
}

/// What handling an event amounted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Review pipeline retargeted, started, recorded and announced
    PipelineTriggered {
        pull_request_id: String,
        execution_id: String,
    },
    /// No review pipeline exists for the repository
    PipelineNotFound { pipeline: String },
    /// Approval decision applied to the pull request
    Reviewed {
        pull_request_id: String,
        decision: ApprovalDecision,
    },
    /// No pull request was recorded for the execution
    Unresolved { execution_id: String },
    /// Event is not one this handler acts on
    Ignored { reason: String },
}

impl HandlerOutcome {
    /// Short human readable status returned to the host
    pub fn status(&self) -> String {
        match self {
            HandlerOutcome::PipelineTriggered {
                pull_request_id,
                execution_id,
            } => format!(
                "Status: Success (pipeline execution {} triggered for pull request {})",
                execution_id, pull_request_id
            ),
            HandlerOutcome::PipelineNotFound { pipeline } => {
                format!("Status: Success (pipeline {} not found, nothing to do)", pipeline)
            }
            HandlerOutcome::Reviewed {
                pull_request_id,
                decision,
            } => format!(
                "Status: Success ({} applied to pull request {})",
                decision, pull_request_id
            ),
            HandlerOutcome::Unresolved { execution_id } => format!(
                "Status: Success (no pull request recorded for execution {})",
                execution_id
            ),
            HandlerOutcome::Ignored { reason } => format!("Status: Success (ignored: {})", reason),
        }
    }
}

impl std::fmt::Display for HandlerOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.status())
    }
}

/// Handles one event per call; holds no per-event state
pub struct EventHandler {
    configurator: PipelineConfigurator,
    registry: ExecutionRegistry,
    review: ReviewDecisionEngine,
    settings: HandlerSettings,
}

impl EventHandler {
    pub fn new(
        source_control: Arc<dyn SourceControl>,
        pipelines: Arc<dyn PipelineService>,
        store: Arc<dyn ObjectStore>,
        settings: HandlerSettings,
    ) -> Self {
        Self {
            configurator: PipelineConfigurator::new(pipelines),
            registry: ExecutionRegistry::new(store),
            review: ReviewDecisionEngine::new(source_control, ConsoleLinks::new(&settings.region)),
            settings,
        }
    }

    /// Decode, classify and act on one envelope
    pub async fn handle(&self, envelope: EventEnvelope) -> Result<HandlerOutcome, ValidatorError> {
        debug!(
            detail_type = %envelope.detail_type,
            event_id = envelope.id.as_deref().unwrap_or("-"),
            "Handling event"
        );

        let outcome = match envelope.classify()? {
            InboundEvent::PullRequest(event) => self.on_pull_request(&event).await?,
            InboundEvent::PipelineState(event) => self.on_pipeline_state(&event).await?,
        };

        info!(status = %outcome.status(), "Event handled");
        Ok(outcome)
    }

    /// Raw JSON convenience wrapper around [`EventHandler::handle`]
    pub async fn handle_slice(&self, bytes: &[u8]) -> Result<HandlerOutcome, ValidatorError> {
        self.handle(EventEnvelope::from_slice(bytes)?).await
    }

    // ============================================================
    // Pull request path
    // ============================================================

    async fn on_pull_request(
        &self,
        event: &PullRequestEvent,
    ) -> Result<HandlerOutcome, ValidatorError> {
        if !event.kind.triggers_review() {
            debug!(kind = %event.kind, "Ignoring pull request event kind");
            return Ok(HandlerOutcome::Ignored {
                reason: format!("pull request event {}", event.kind),
            });
        }

        let pipeline = review_pipeline_name(&event.repository_name);
        info!(
            kind = %event.kind,
            repository = %event.repository_name,
            pull_request_id = %event.pull_request_id,
            pipeline = %pipeline,
            "Pull request requires review"
        );

        let request = TriggerRequest {
            pipeline_name: pipeline.clone(),
            repository_name: event.repository_name.clone(),
            branch: event.source_reference.clone(),
            pull_request_id: event.pull_request_id.clone(),
        };

        let execution_id = match self.configurator.trigger(&request).await? {
            TriggerOutcome::Started { execution_id } => execution_id,
            TriggerOutcome::PipelineNotFound => {
                return Ok(HandlerOutcome::PipelineNotFound { pipeline });
            }
        };

        let record = ExecutionRecord::new(
            &self.settings.bucket,
            &execution_id,
            &event.repository_name,
            &event.pull_request_id,
        );
        self.registry.record(&record).await?;

        self.review
            .announce_execution(event, &pipeline, &execution_id)
            .await?;

        Ok(HandlerOutcome::PipelineTriggered {
            pull_request_id: event.pull_request_id.clone(),
            execution_id,
        })
    }

    // ============================================================
    // Pipeline state path
    // ============================================================

    async fn on_pipeline_state(
        &self,
        event: &PipelineStateEvent,
    ) -> Result<HandlerOutcome, ValidatorError> {
        if !is_review_pipeline(&event.pipeline_name) {
            debug!(pipeline = %event.pipeline_name, "Ignoring non-review pipeline");
            return Ok(HandlerOutcome::Ignored {
                reason: format!("pipeline {} is not a review pipeline", event.pipeline_name),
            });
        }

        let Some(decision) = ApprovalDecision::for_state(&event.state) else {
            debug!(state = %event.state, "Ignoring pipeline state");
            return Ok(HandlerOutcome::Ignored {
                reason: format!("pipeline state {}", event.state),
            });
        };

        let record = self
            .registry
            .resolve(&self.settings.bucket, &event.execution_id)
            .await?;

        if !record.is_resolved() {
            warn!(
                pipeline = %event.pipeline_name,
                execution_id = %event.execution_id,
                state = %event.state,
                "No pull request recorded for execution, skipping review decision"
            );
            return Ok(HandlerOutcome::Unresolved {
                execution_id: event.execution_id.clone(),
            });
        }

        self.review
            .decide(&record.pull_request_id, decision)
            .await?;

        Ok(HandlerOutcome::Reviewed {
            pull_request_id: record.pull_request_id,
            decision,
        })
    }
}
