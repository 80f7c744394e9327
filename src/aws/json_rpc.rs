//! AWS JSON 1.1 protocol: `POST /` with an `x-amz-target` header.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{AwsContext, AwsRequest, AwsResponse};
use crate::error::UpstreamError;

const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Client for one JSON 1.1 service
pub(crate) struct JsonRpcClient {
    context: Arc<AwsContext>,
    service: &'static str,
    target_prefix: &'static str,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(rename = "__type")]
    error_type: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
}

impl JsonRpcClient {
    pub fn new(context: Arc<AwsContext>, service: &'static str, target_prefix: &'static str) -> Self {
        Self {
            context,
            service,
            target_prefix,
        }
    }

    /// Invoke `operation` with `input` and decode the output
    pub async fn call<I, O>(&self, operation: &'static str, input: &I) -> Result<O, UpstreamError>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let body = serde_json::to_vec(input).map_err(|e| {
            UpstreamError::transport(
                self.service,
                operation,
                format!("failed to encode request: {}", e),
            )
        })?;

        let response = self
            .context
            .send(AwsRequest {
                service: self.service,
                operation,
                method: Method::POST,
                endpoint: self.context.endpoint(self.service),
                path: "/".to_string(),
                query: String::new(),
                headers: vec![
                    ("content-type", CONTENT_TYPE.to_string()),
                    (
                        "x-amz-target",
                        format!("{}.{}", self.target_prefix, operation),
                    ),
                ],
                body,
            })
            .await?;

        if !response.is_success() {
            return Err(error_from_response(self.service, operation, &response));
        }

        let body: &[u8] = if response.body.is_empty() {
            b"{}"
        } else {
            &response.body
        };

        serde_json::from_slice(body).map_err(|e| {
            UpstreamError::service(
                self.service,
                operation,
                response.status,
                None,
                format!("failed to decode response: {}", e),
            )
        })
    }
}

/// Build an error from a JSON 1.1 error response
fn error_from_response(
    service: &'static str,
    operation: &'static str,
    response: &AwsResponse,
) -> UpstreamError {
    let parsed: ErrorBody = serde_json::from_slice(&response.body).unwrap_or_default();

    // `__type` may be namespaced: "com.amazonaws.codepipeline#PipelineNotFoundException"
    let code = parsed.error_type.map(|error_type| match error_type.rsplit_once('#') {
        Some((_, code)) => code.to_string(),
        None => error_type,
    });

    let message = parsed.message.unwrap_or_else(|| {
        let raw = String::from_utf8_lossy(&response.body).into_owned();
        if raw.is_empty() {
            format!("HTTP {}", response.status)
        } else {
            raw
        }
    });

    UpstreamError::service(service, operation, response.status, code, message)
}
