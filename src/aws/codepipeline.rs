//! CodePipeline client: definition fetch/replace and execution start.

use async_trait::async_trait;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::json_rpc::JsonRpcClient;
use super::AwsContext;
use crate::clients::PipelineService;
use crate::error::UpstreamError;
use crate::pipeline::PipelineDeclaration;

const SERVICE: &str = "codepipeline";
const TARGET_PREFIX: &str = "CodePipeline_20150709";
const PIPELINE_NOT_FOUND: &str = "PipelineNotFoundException";

#[derive(Serialize)]
struct PipelineNameInput<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
struct GetPipelineOutput {
    pipeline: PipelineDeclaration,
}

#[derive(Serialize)]
struct UpdatePipelineInput<'a> {
    pipeline: &'a PipelineDeclaration,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartPipelineExecutionOutput {
    pipeline_execution_id: String,
}

/// CodePipeline implementation of [`PipelineService`]
pub struct CodePipelineClient {
    rpc: JsonRpcClient,
}

impl CodePipelineClient {
    pub fn new(context: Arc<AwsContext>) -> Self {
        Self {
            rpc: JsonRpcClient::new(context, SERVICE, TARGET_PREFIX),
        }
    }
}

#[async_trait]
impl PipelineService for CodePipelineClient {
    async fn get_pipeline(&self, name: &str) -> Result<Option<PipelineDeclaration>, UpstreamError> {
        let result: Result<GetPipelineOutput, UpstreamError> =
            self.rpc.call("GetPipeline", &PipelineNameInput { name }).await;

        match result {
            Ok(output) => {
                debug!(
                    pipeline = %name,
                    stages = output.pipeline.stages.len(),
                    "Fetched pipeline definition"
                );
                Ok(Some(output.pipeline))
            }
            Err(e) if e.has_code(PIPELINE_NOT_FOUND) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn update_pipeline(&self, pipeline: &PipelineDeclaration) -> Result<(), UpstreamError> {
        let _: IgnoredAny = self
            .rpc
            .call("UpdatePipeline", &UpdatePipelineInput { pipeline })
            .await?;
        Ok(())
    }

    async fn start_execution(&self, name: &str) -> Result<String, UpstreamError> {
        let output: StartPipelineExecutionOutput = self
            .rpc
            .call("StartPipelineExecution", &PipelineNameInput { name })
            .await?;
        Ok(output.pipeline_execution_id)
    }
}
