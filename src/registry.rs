//! Execution Registry
//!
//! Durable mapping from a pipeline execution to the pull request that caused
//! it. Each mapping is an empty object whose key is
//! `executionId/repositoryName/pullRequestId`; the key is the record.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clients::ObjectStore;
use crate::error::ValidatorError;

const KEY_DELIMITER: char = '/';

/// One execution → pull request mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRecord {
    pub bucket: String,
    pub execution_id: String,
    pub repository_name: String,
    pub pull_request_id: String,
}

impl ExecutionRecord {
    pub fn new(
        bucket: impl Into<String>,
        execution_id: impl Into<String>,
        repository_name: impl Into<String>,
        pull_request_id: impl Into<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            execution_id: execution_id.into(),
            repository_name: repository_name.into(),
            pull_request_id: pull_request_id.into(),
        }
    }

    /// Record for an execution nobody registered
    pub fn unresolved(bucket: impl Into<String>, execution_id: impl Into<String>) -> Self {
        Self::new(bucket, execution_id, String::new(), String::new())
    }

    /// Whether the record points at a pull request
    pub fn is_resolved(&self) -> bool {
        !self.pull_request_id.is_empty()
    }

    /// Composite store key
    pub fn key(&self) -> String {
        format!(
            "{}{d}{}{d}{}",
            self.execution_id,
            self.repository_name,
            self.pull_request_id,
            d = KEY_DELIMITER
        )
    }

    fn validate(&self) -> Result<(), ValidatorError> {
        for (field, value) in [
            ("execution id", &self.execution_id),
            ("repository name", &self.repository_name),
            ("pull request id", &self.pull_request_id),
        ] {
            if value.is_empty() || value.contains(KEY_DELIMITER) {
                return Err(ValidatorError::InvalidRecord(format!(
                    "{} must be non-empty and free of '{}': {:?}",
                    field, KEY_DELIMITER, value
                )));
            }
        }
        Ok(())
    }
}

/// Lookup prefix for an execution; the trailing delimiter keeps `exec-1`
/// from matching keys of `exec-10`.
fn execution_prefix(execution_id: &str) -> String {
    format!("{}{}", execution_id, KEY_DELIMITER)
}

/// Split a stored key into (repository, pull request)
fn parse_key<'a>(key: &'a str, execution_id: &str) -> Option<(&'a str, &'a str)> {
    let rest = key.strip_prefix(&execution_prefix(execution_id))?;
    let (repository, pull_request) = rest.split_once(KEY_DELIMITER)?;

    if repository.is_empty() || pull_request.is_empty() || pull_request.contains(KEY_DELIMITER)
    {
        return None;
    }

    Some((repository, pull_request))
}

/// Registry over a prefix-searchable store
pub struct ExecutionRegistry {
    store: Arc<dyn ObjectStore>,
}

impl ExecutionRegistry {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Persist the mapping as an empty marker object
    pub async fn record(&self, record: &ExecutionRecord) -> Result<(), ValidatorError> {
        record.validate()?;

        let key = record.key();
        self.store.put_marker(&record.bucket, &key).await?;

        info!(
            bucket = %record.bucket,
            key = %key,
            "Stored execution record"
        );
        Ok(())
    }

    /// Find the pull request an execution belongs to.
    ///
    /// Returns an unresolved record when nothing was registered. When several
    /// keys share the execution prefix the lexicographically greatest wins.
    pub async fn resolve(
        &self,
        bucket: &str,
        execution_id: &str,
    ) -> Result<ExecutionRecord, ValidatorError> {
        let mut keys = self
            .store
            .list_keys(bucket, &execution_prefix(execution_id))
            .await?;

        debug!(
            execution_id = %execution_id,
            matches = keys.len(),
            "Listed execution records"
        );

        keys.sort_unstable();

        let candidates: Vec<(&str, &str)> = keys
            .iter()
            .filter_map(|key| {
                let parsed = parse_key(key, execution_id);
                if parsed.is_none() {
                    warn!(key = %key, "Skipping malformed execution record key");
                }
                parsed
            })
            .collect();

        if candidates.len() > 1 {
            warn!(
                execution_id = %execution_id,
                count = candidates.len(),
                "Multiple execution records found, using the last key"
            );
        }

        let record = match candidates.last() {
            Some((repository, pull_request)) => {
                ExecutionRecord::new(bucket, execution_id, *repository, *pull_request)
            }
            None => ExecutionRecord::unresolved(bucket, execution_id),
        };

        info!(
            execution_id = %execution_id,
            repository = %record.repository_name,
            pull_request_id = %record.pull_request_id,
            "Resolved execution record"
        );

        Ok(record)
    }
}
