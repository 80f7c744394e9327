//! AWS Credentials
//!
//! Credential chain in the usual AWS order: environment variables, the
//! shared credentials file, the container credentials endpoint, then the
//! EC2 instance metadata service (IMDSv2). Temporary credentials are cached
//! with their expiration and refreshed shortly before they lapse.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::env;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Credentials are refreshed this long before they expire
const REFRESH_WINDOW_SECS: i64 = 300;
/// Host of the ECS container credentials endpoint
const CONTAINER_HOST: &str = "http://169.254.170.2";
/// Default instance metadata endpoint
const IMDS_ENDPOINT: &str = "http://169.254.169.254";
const IMDS_TOKEN_TTL_SECS: &str = "21600";

/// Access key pair plus optional session token
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    /// `None` for long-lived keys
    pub expires_at: Option<DateTime<Utc>>,
}

impl AwsCredentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
            expires_at: None,
        }
    }

    pub fn with_expiration(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the credentials lapse within `window` of `now`
    pub fn expires_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.expires_at
            .map(|expires_at| expires_at - window <= now)
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

// ============================================================
// Provider
// ============================================================

#[derive(Debug)]
enum CredentialSource {
    /// Loaded once; never refreshed
    Static { name: &'static str },
    /// ECS task role endpoint
    Container {
        url: String,
        authorization: Option<String>,
    },
    /// EC2 instance role via IMDSv2
    InstanceMetadata { endpoint: String },
}

/// Credentials as served by the container and instance metadata endpoints
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RemoteCredentials {
    access_key_id: String,
    secret_access_key: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    expiration: Option<String>,
}

impl RemoteCredentials {
    fn into_credentials(self) -> Result<AwsCredentials> {
        let credentials =
            AwsCredentials::new(self.access_key_id, self.secret_access_key, self.token);
        match self.expiration {
            Some(expiration) => {
                let expires_at = DateTime::parse_from_rfc3339(&expiration)
                    .with_context(|| format!("Invalid credential expiration: {}", expiration))?
                    .with_timezone(&Utc);
                Ok(credentials.with_expiration(expires_at))
            }
            None => Ok(credentials),
        }
    }
}

/// Resolves and caches credentials for request signing
pub struct CredentialsProvider {
    source: CredentialSource,
    cached: Mutex<Option<AwsCredentials>>,
}

impl CredentialsProvider {
    /// Provider that always hands out `credentials`
    pub fn fixed(credentials: AwsCredentials) -> Self {
        Self::loaded("static", credentials)
    }

    fn loaded(name: &'static str, credentials: AwsCredentials) -> Self {
        Self {
            source: CredentialSource::Static { name },
            cached: Mutex::new(Some(credentials)),
        }
    }

    fn remote(source: CredentialSource) -> Self {
        Self {
            source,
            cached: Mutex::new(None),
        }
    }

    /// Select a source from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok().filter(|value| !value.is_empty()))
    }

    /// Select a source using `lookup` for environment variables
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(access_key_id) = lookup("AWS_ACCESS_KEY_ID") {
            let secret_access_key = lookup("AWS_SECRET_ACCESS_KEY")
                .context("AWS_ACCESS_KEY_ID is set but AWS_SECRET_ACCESS_KEY is not")?;
            return Ok(Self::loaded(
                "environment",
                AwsCredentials::new(
                    access_key_id,
                    secret_access_key,
                    lookup("AWS_SESSION_TOKEN"),
                ),
            ));
        }

        if let Some(credentials) = load_profile(&lookup)? {
            return Ok(Self::loaded("profile", credentials));
        }

        let authorization = lookup("AWS_CONTAINER_AUTHORIZATION_TOKEN");
        if let Some(uri) = lookup("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI") {
            return Ok(Self::remote(CredentialSource::Container {
                url: format!("{}{}", CONTAINER_HOST, uri),
                authorization,
            }));
        }
        if let Some(url) = lookup("AWS_CONTAINER_CREDENTIALS_FULL_URI") {
            return Ok(Self::remote(CredentialSource::Container { url, authorization }));
        }

        if lookup("AWS_EC2_METADATA_DISABLED").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
            anyhow::bail!(
                "No AWS credentials in the environment, shared credentials file or container, \
                 and instance metadata is disabled"
            );
        }

        let endpoint = lookup("AWS_EC2_METADATA_SERVICE_ENDPOINT")
            .unwrap_or_else(|| IMDS_ENDPOINT.to_string());
        Ok(Self::remote(CredentialSource::InstanceMetadata {
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }))
    }

    /// Name of the selected source
    pub fn source_name(&self) -> &'static str {
        match &self.source {
            CredentialSource::Static { name } => name,
            CredentialSource::Container { .. } => "container",
            CredentialSource::InstanceMetadata { .. } => "instance-metadata",
        }
    }

    /// Current credentials, refreshed when they are about to expire.
    ///
    /// A failed refresh falls back to the cached credentials while they are
    /// still valid.
    pub async fn credentials(&self, http_client: &reqwest::Client) -> Result<AwsCredentials> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();

        if let Some(credentials) = cached.as_ref() {
            if !credentials.expires_within(now, Duration::seconds(REFRESH_WINDOW_SECS)) {
                return Ok(credentials.clone());
            }
        }

        match self.fetch(http_client).await {
            Ok(fresh) => {
                info!(
                    source = self.source_name(),
                    expires_at = ?fresh.expires_at,
                    "Loaded AWS credentials"
                );
                *cached = Some(fresh.clone());
                Ok(fresh)
            }
            Err(e) => match cached.as_ref() {
                Some(credentials) if !credentials.expires_within(now, Duration::zero()) => {
                    warn!(
                        source = self.source_name(),
                        "Credential refresh failed, using cached credentials: {e:#}"
                    );
                    Ok(credentials.clone())
                }
                _ => Err(e),
            },
        }
    }

    async fn fetch(&self, http_client: &reqwest::Client) -> Result<AwsCredentials> {
        match &self.source {
            CredentialSource::Static { name } => {
                anyhow::bail!("{} credentials have expired and cannot be refreshed", name)
            }
            CredentialSource::Container { url, authorization } => {
                fetch_container(http_client, url, authorization.as_deref()).await
            }
            CredentialSource::InstanceMetadata { endpoint } => {
                fetch_instance_metadata(http_client, endpoint).await
            }
        }
    }
}

async fn checked(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("{} failed with {}: {}", what, status, body);
    }
    Ok(response)
}

async fn fetch_container(
    http_client: &reqwest::Client,
    url: &str,
    authorization: Option<&str>,
) -> Result<AwsCredentials> {
    let mut request = http_client.get(url);
    if let Some(authorization) = authorization {
        request = request.header("Authorization", authorization);
    }

    let response = request
        .send()
        .await
        .context("Failed to call container credentials endpoint")?;
    let remote: RemoteCredentials = checked(response, "Container credentials request")
        .await?
        .json()
        .await
        .context("Failed to parse container credentials")?;

    remote.into_credentials()
}

async fn fetch_instance_metadata(
    http_client: &reqwest::Client,
    endpoint: &str,
) -> Result<AwsCredentials> {
    let response = http_client
        .put(format!("{}/latest/api/token", endpoint))
        .header("X-aws-ec2-metadata-token-ttl-seconds", IMDS_TOKEN_TTL_SECS)
        .send()
        .await
        .context("Failed to request instance metadata token")?;
    let token = checked(response, "Instance metadata token request")
        .await?
        .text()
        .await?;

    let roles_url = format!("{}/latest/meta-data/iam/security-credentials/", endpoint);
    let response = http_client
        .get(&roles_url)
        .header("X-aws-ec2-metadata-token", &token)
        .send()
        .await
        .context("Failed to list instance roles")?;
    let roles = checked(response, "Instance role listing")
        .await?
        .text()
        .await?;
    let role = roles
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .context("No IAM role attached to the instance")?;

    let response = http_client
        .get(format!("{}{}", roles_url, role))
        .header("X-aws-ec2-metadata-token", &token)
        .send()
        .await
        .context("Failed to fetch instance role credentials")?;
    let remote: RemoteCredentials = checked(response, "Instance role credentials request")
        .await?
        .json()
        .await
        .context("Failed to parse instance role credentials")?;

    remote.into_credentials()
}

// ============================================================
// Shared credentials file
// ============================================================

fn load_profile(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Option<AwsCredentials>> {
    let path = match lookup("AWS_SHARED_CREDENTIALS_FILE") {
        Some(path) => path,
        None => match lookup("HOME") {
            Some(home) => format!("{}/.aws/credentials", home),
            None => return Ok(None),
        },
    };

    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read credentials file {}", path))
        }
    };

    let profile = lookup("AWS_PROFILE").unwrap_or_else(|| "default".to_string());
    Ok(parse_profile(&contents, &profile))
}

/// Extract one profile from an INI-style credentials file
fn parse_profile(contents: &str, profile: &str) -> Option<AwsCredentials> {
    let mut in_profile = false;
    let mut access_key_id = None;
    let mut secret_access_key = None;
    let mut session_token = None;

    for line in contents.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_profile = section.trim() == profile;
            continue;
        }
        if !in_profile {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().to_string();
            match key.trim() {
                "aws_access_key_id" => access_key_id = Some(value),
                "aws_secret_access_key" => secret_access_key = Some(value),
                "aws_session_token" => session_token = Some(value),
                _ => {}
            }
        }
    }

    Some(AwsCredentials::new(
        access_key_id?,
        secret_access_key?,
        session_token,
    ))
}
