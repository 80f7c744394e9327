//! AWS Clients
//!
//! Thin SigV4-signed clients for the three services the handler depends
//! on. Each client implements one of the collaborator traits in
//! [`crate::clients`].

pub mod codecommit;
pub mod codepipeline;
pub mod credentials;
mod json_rpc;
pub mod s3;
pub mod signing;

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Method;
use std::time::Duration;
use tracing::debug;

use crate::error::UpstreamError;
pub use codecommit::CodeCommitClient;
pub use codepipeline::CodePipelineClient;
pub use credentials::{AwsCredentials, CredentialsProvider};
pub use s3::S3Client;

/// Shared transport state: HTTP client, credentials and endpoint selection
pub struct AwsContext {
    http_client: reqwest::Client,
    credentials: CredentialsProvider,
    region: String,
    endpoint_url: Option<String>,
}

/// One request before signing
pub(crate) struct AwsRequest {
    /// Signing name of the service, also used in error reports
    pub service: &'static str,
    pub operation: &'static str,
    pub method: Method,
    /// `scheme://host[:port]`
    pub endpoint: String,
    /// Encoded absolute path
    pub path: String,
    /// Canonical query string
    pub query: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
}

/// Raw service response
#[derive(Debug)]
pub(crate) struct AwsResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl AwsResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl AwsContext {
    /// Create a context with its own HTTP client
    pub fn new(
        credentials: CredentialsProvider,
        region: impl Into<String>,
        endpoint_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            credentials,
            region: region.into(),
            endpoint_url: endpoint_url
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty()),
        })
    }

    /// Current credentials, refreshed through the provider when close to expiry
    pub async fn credentials(&self) -> Result<AwsCredentials> {
        self.credentials.credentials(&self.http_client).await
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Whether all services share one overridden endpoint
    pub fn has_endpoint_override(&self) -> bool {
        self.endpoint_url.is_some()
    }

    /// Base URL of a service
    pub fn endpoint(&self, service: &str) -> String {
        match &self.endpoint_url {
            Some(url) => url.clone(),
            None => format!("https://{}.{}.amazonaws.com", service, self.region),
        }
    }

    /// Sign and send a request
    pub(crate) async fn send(&self, request: AwsRequest) -> Result<AwsResponse, UpstreamError> {
        let service = request.service;
        let operation = request.operation;

        let base = reqwest::Url::parse(&request.endpoint).map_err(|e| {
            UpstreamError::transport(
                service,
                operation,
                format!("invalid endpoint {}: {}", request.endpoint, e),
            )
        })?;
        let host = host_header(&base).ok_or_else(|| {
            UpstreamError::transport(
                service,
                operation,
                format!("endpoint {} has no host", request.endpoint),
            )
        })?;

        let credentials = self.credentials().await.map_err(|e| {
            UpstreamError::transport(
                service,
                operation,
                format!("failed to load credentials: {:#}", e),
            )
        })?;

        let payload_hash = signing::payload_hash(&request.body);
        let signable = signing::SignableRequest {
            method: request.method.as_str(),
            host: &host,
            path: &request.path,
            query: &request.query,
            headers: &request.headers,
            payload_hash: &payload_hash,
        };
        let signed = signing::sign(
            &signable,
            &credentials,
            &self.region,
            service,
            Utc::now(),
        );

        let mut url = format!("{}{}", request.endpoint.trim_end_matches('/'), request.path);
        if !request.query.is_empty() {
            url.push('?');
            url.push_str(&request.query);
        }

        debug!(service, operation, url = %url, "Sending AWS request");

        let mut builder = self.http_client.request(request.method, &url);
        for (name, value) in request.headers.iter().chain(signed.iter()) {
            builder = builder.header(*name, value);
        }

        let response = builder
            .body(request.body)
            .send()
            .await
            .map_err(|e| UpstreamError::transport(service, operation, e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::transport(service, operation, e.to_string()))?;

        debug!(service, operation, status, "AWS response received");

        Ok(AwsResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// Host header value for a URL, with the port only when it is not the default
fn host_header(url: &reqwest::Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}
