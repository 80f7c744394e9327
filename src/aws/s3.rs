//! S3 client for execution record markers.
//!
//! Markers are zero-length objects; listing uses ListObjectsV2 and follows
//! continuation tokens until the listing is exhausted.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use super::signing::{canonical_query, encode_path, payload_hash};
use super::{AwsContext, AwsRequest, AwsResponse};
use crate::clients::ObjectStore;
use crate::error::UpstreamError;

const SERVICE: &str = "s3";

/// ListObjectsV2 response body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default)]
    contents: Vec<ObjectSummary>,
    #[serde(default)]
    is_truncated: bool,
    #[serde(default)]
    next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ObjectSummary {
    key: String,
}

/// S3 XML error body
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct S3ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// S3 implementation of [`ObjectStore`]
pub struct S3Client {
    context: Arc<AwsContext>,
}

impl S3Client {
    pub fn new(context: Arc<AwsContext>) -> Self {
        Self { context }
    }

    /// Endpoint and encoded path of an object (`key` empty for the bucket itself).
    /// Path-style addressing is used whenever the endpoint is overridden and for
    /// dotted bucket names, which the wildcard TLS certificate does not cover.
    fn location(&self, bucket: &str, key: &str) -> (String, String) {
        if self.context.has_endpoint_override() || bucket.contains('.') {
            let path = if key.is_empty() {
                format!("/{}", bucket)
            } else {
                format!("/{}/{}", bucket, key)
            };
            (self.context.endpoint(SERVICE), encode_path(&path))
        } else {
            (
                format!("https://{}.s3.{}.amazonaws.com", bucket, self.context.region()),
                encode_path(&format!("/{}", key)),
            )
        }
    }

    async fn send(
        &self,
        operation: &'static str,
        method: Method,
        bucket: &str,
        key: &str,
        query: String,
    ) -> Result<AwsResponse, UpstreamError> {
        let (endpoint, path) = self.location(bucket, key);
        let response = self
            .context
            .send(AwsRequest {
                service: SERVICE,
                operation,
                method,
                endpoint,
                path,
                query,
                headers: vec![("x-amz-content-sha256", payload_hash(b""))],
                body: Vec::new(),
            })
            .await?;

        if !response.is_success() {
            return Err(error_from_response(operation, &response));
        }
        Ok(response)
    }
}

/// Parse one ListObjectsV2 page
fn parse_list_page(operation: &'static str, body: &[u8]) -> Result<ListBucketResult, UpstreamError> {
    let text = String::from_utf8_lossy(body);
    quick_xml::de::from_str(&text).map_err(|e| {
        UpstreamError::transport(
            SERVICE,
            operation,
            format!("failed to parse ListObjectsV2 XML response: {}", e),
        )
    })
}

fn error_from_response(operation: &'static str, response: &AwsResponse) -> UpstreamError {
    let text = String::from_utf8_lossy(&response.body);
    let parsed: S3ErrorBody = quick_xml::de::from_str(&text).unwrap_or_default();

    let message = parsed
        .message
        .unwrap_or_else(|| format!("HTTP {}", response.status));
    UpstreamError::service(SERVICE, operation, response.status, parsed.code, message)
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn put_marker(&self, bucket: &str, key: &str) -> Result<(), UpstreamError> {
        self.send("PutObject", Method::PUT, bucket, key, String::new())
            .await?;
        Ok(())
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, UpstreamError> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let query = {
                let mut params = vec![("list-type", "2"), ("prefix", prefix)];
                if let Some(token) = continuation_token.as_deref() {
                    params.push(("continuation-token", token));
                }
                canonical_query(&params)
            };

            let response = self
                .send("ListObjectsV2", Method::GET, bucket, "", query)
                .await?;
            let page = parse_list_page("ListObjectsV2", &response.body)?;

            keys.extend(page.contents.into_iter().map(|object| object.key));

            match page.next_continuation_token {
                Some(token) if page.is_truncated => continuation_token = Some(token),
                _ => break,
            }
        }

        debug!(bucket = %bucket, prefix = %prefix, count = keys.len(), "Listed keys");
        Ok(keys)
    }
}
