//! Pipeline Configurator
//!
//! Points a review pipeline's source action at the pull request branch and
//! starts a new execution. The definition is always fetched, mutated and
//! replaced as a whole.

use std::sync::Arc;
use tracing::{info, warn};

use crate::clients::PipelineService;
use crate::error::UpstreamError;

const SOURCE_ACTION_SUFFIX: &str = "-repo";

/// Name of the source action that pulls `repository`
pub fn source_action_name(repository: &str) -> String {
    if repository.ends_with(SOURCE_ACTION_SUFFIX) {
        repository.to_string()
    } else {
        format!("{}{}", repository, SOURCE_ACTION_SUFFIX)
    }
}

/// Human branch name of a reference (`refs/heads/feature-x` → `feature-x`)
pub fn branch_name(reference: &str) -> &str {
    reference
        .rsplit_once('/')
        .map(|(_, branch)| branch)
        .unwrap_or(reference)
}

/// Request to retarget and run a review pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRequest {
    pub pipeline_name: String,
    pub repository_name: String,
    /// Source reference of the pull request
    pub branch: String,
    pub pull_request_id: String,
}

/// Result of a trigger attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Execution started
    Started { execution_id: String },
    /// Pipeline does not exist, nothing to do
    PipelineNotFound,
}

/// Rewrites and starts review pipelines
pub struct PipelineConfigurator {
    pipelines: Arc<dyn PipelineService>,
}

impl PipelineConfigurator {
    pub fn new(pipelines: Arc<dyn PipelineService>) -> Self {
        Self { pipelines }
    }

    /// Retarget the pipeline source at the request branch and start it
    pub async fn trigger(&self, request: &TriggerRequest) -> Result<TriggerOutcome, UpstreamError> {
        let Some(mut pipeline) = self.pipelines.get_pipeline(&request.pipeline_name).await? else {
            info!(
                pipeline = %request.pipeline_name,
                "Review pipeline not found, nothing to do"
            );
            return Ok(TriggerOutcome::PipelineNotFound);
        };

        let action_name = source_action_name(&request.repository_name);
        let branch = branch_name(&request.branch);

        let rewritten = pipeline.retarget_source(&action_name, &request.repository_name, branch);
        if rewritten == 0 {
            warn!(
                pipeline = %request.pipeline_name,
                action = %action_name,
                "No source action matched, pipeline source left unchanged"
            );
        }

        self.pipelines.update_pipeline(&pipeline).await?;

        info!(
            pipeline = %request.pipeline_name,
            repository = %request.repository_name,
            branch = %branch,
            pull_request_id = %request.pull_request_id,
            "Triggering review pipeline"
        );

        let execution_id = self
            .pipelines
            .start_execution(&request.pipeline_name)
            .await?;

        info!(
            pipeline = %request.pipeline_name,
            execution_id = %execution_id,
            "Review pipeline started"
        );

        Ok(TriggerOutcome::Started { execution_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::memory::MemoryPipelines;
    use crate::pipeline::{ActionDeclaration, PipelineDeclaration, StageDeclaration};

    fn review_pipeline() -> PipelineDeclaration {
        PipelineDeclaration::new("svc-pr-review")
            .stage(
                StageDeclaration::new("Source").action(
                    ActionDeclaration::new("svc-repo")
                        .config("RepositoryName", "svc")
                        .config("BranchName", "main")
                        .config("PollForSourceChanges", "false"),
                ),
            )
            .stage(StageDeclaration::new("Build").action(ActionDeclaration::new("build")))
    }

    fn request(branch: &str) -> TriggerRequest {
        TriggerRequest {
            pipeline_name: "svc-pr-review".to_string(),
            repository_name: "svc".to_string(),
            branch: branch.to_string(),
            pull_request_id: "42".to_string(),
        }
    }

    #[test]
    fn test_source_action_name() {
        assert_eq!(source_action_name("svc"), "svc-repo");
        assert_eq!(source_action_name("svc-repo"), "svc-repo");
        assert_eq!(
            source_action_name(&source_action_name("billing")),
            source_action_name("billing")
        );
        assert_eq!(source_action_name("repo"), "repo-repo");
    }

    #[test]
    fn test_branch_name() {
        assert_eq!(branch_name("refs/heads/feature-x"), "feature-x");
        assert_eq!(branch_name("refs/heads/team/feature-y"), "feature-y");
        assert_eq!(branch_name("main"), "main");
        assert_eq!(branch_name(""), "");
    }

    #[tokio::test]
    async fn test_trigger_rewrites_and_starts() {
        let pipelines = Arc::new(MemoryPipelines::default().with_pipeline(review_pipeline()));
        let configurator = PipelineConfigurator::new(pipelines.clone());

        let outcome = configurator
            .trigger(&request("refs/heads/feature-x"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            TriggerOutcome::Started {
                execution_id: "exec-1".to_string()
            }
        );
        assert_eq!(pipelines.started(), vec!["svc-pr-review".to_string()]);

        let stored = pipelines.pipeline("svc-pr-review").unwrap();
        let source = stored.action("svc-repo").unwrap();
        assert_eq!(source.configuration["BranchName"], "feature-x");
        assert_eq!(source.configuration["RepositoryName"], "svc");
        assert_eq!(source.configuration["PollForSourceChanges"], "false");
        assert_eq!(stored.stages.len(), 2);
    }

    #[tokio::test]
    async fn test_trigger_missing_pipeline() {
        let pipelines = Arc::new(MemoryPipelines::default());
        let configurator = PipelineConfigurator::new(pipelines.clone());

        let outcome = configurator.trigger(&request("refs/heads/x")).await.unwrap();

        assert_eq!(outcome, TriggerOutcome::PipelineNotFound);
        assert_eq!(pipelines.update_count(), 0);
        assert!(pipelines.started().is_empty());
    }

    #[tokio::test]
    async fn test_trigger_without_matching_action_still_starts() {
        let pipeline = PipelineDeclaration::new("svc-pr-review")
            .stage(StageDeclaration::new("Source").action(ActionDeclaration::new("other-repo")));
        let pipelines = Arc::new(MemoryPipelines::default().with_pipeline(pipeline.clone()));
        let configurator = PipelineConfigurator::new(pipelines.clone());

        let outcome = configurator.trigger(&request("refs/heads/x")).await.unwrap();

        assert!(matches!(outcome, TriggerOutcome::Started { .. }));
        assert_eq!(pipelines.pipeline("svc-pr-review").unwrap(), pipeline);
        assert_eq!(pipelines.update_count(), 1);
    }

    #[tokio::test]
    async fn test_update_failure_stops_before_start() {
        let pipelines = Arc::new(MemoryPipelines::default().with_pipeline(review_pipeline()));
        pipelines.fail_on("UpdatePipeline");
        let configurator = PipelineConfigurator::new(pipelines.clone());

        let err = configurator
            .trigger(&request("refs/heads/x"))
            .await
            .unwrap_err();

        assert_eq!(err.operation, "UpdatePipeline");
        assert!(pipelines.started().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_propagates() {
        let pipelines = Arc::new(MemoryPipelines::default().with_pipeline(review_pipeline()));
        pipelines.fail_on("GetPipeline");
        let configurator = PipelineConfigurator::new(pipelines.clone());

        let err = configurator
            .trigger(&request("refs/heads/x"))
            .await
            .unwrap_err();
        assert_eq!(err.service, "codepipeline");
        assert_eq!(err.operation, "GetPipeline");
    }
}
