//! Pipeline Definition Types
//!
//! Typed view of a CodePipeline pipeline declaration. Only the fields the
//! configurator touches are modelled; everything else is carried through
//! untouched so a fetched definition can be replaced wholesale.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Configuration key holding the source repository of a source action
pub const REPOSITORY_NAME_KEY: &str = "RepositoryName";
/// Configuration key holding the source branch of a source action
pub const BRANCH_NAME_KEY: &str = "BranchName";

/// Full pipeline declaration as returned by GetPipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDeclaration {
    pub name: String,
    #[serde(default)]
    pub stages: Vec<StageDeclaration>,
    /// roleArn, artifactStore, version, ...
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One stage of a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDeclaration {
    pub name: String,
    #[serde(default)]
    pub actions: Vec<ActionDeclaration>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One action inside a stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDeclaration {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub configuration: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PipelineDeclaration {
    /// Create an empty declaration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Append a stage (builder style)
    pub fn stage(mut self, stage: StageDeclaration) -> Self {
        self.stages.push(stage);
        self
    }

    /// Point every action named `action_name` at `repository`/`branch`.
    ///
    /// Only the repository and branch keys are overwritten; other keys of the
    /// action configuration are kept. Returns the number of actions rewritten.
    pub fn retarget_source(&mut self, action_name: &str, repository: &str, branch: &str) -> usize {
        let mut rewritten = 0;

        for action in self
            .stages
            .iter_mut()
            .flat_map(|stage| stage.actions.iter_mut())
            .filter(|action| action.name == action_name)
        {
            action
                .configuration
                .insert(REPOSITORY_NAME_KEY.to_string(), repository.to_string());
            action
                .configuration
                .insert(BRANCH_NAME_KEY.to_string(), branch.to_string());
            rewritten += 1;
        }

        rewritten
    }

    /// Find an action by name in any stage
    pub fn action(&self, action_name: &str) -> Option<&ActionDeclaration> {
        self.stages
            .iter()
            .flat_map(|stage| stage.actions.iter())
            .find(|action| action.name == action_name)
    }
}

impl StageDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn action(mut self, action: ActionDeclaration) -> Self {
        self.actions.push(action);
        self
    }
}

impl ActionDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            configuration: BTreeMap::new(),
            extra: Map::new(),
        }
    }

    pub fn config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.configuration.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        serde_json::json!({
            "name": "svc-pr-review",
            "roleArn": "arn:aws:iam::123456789012:role/pipeline",
            "artifactStore": { "type": "S3", "location": "artifacts" },
            "version": 7,
            "stages": [
                {
                    "name": "Source",
                    "actions": [
                        {
                            "name": "svc-repo",
                            "actionTypeId": {
                                "category": "Source",
                                "owner": "AWS",
                                "provider": "CodeCommit",
                                "version": "1"
                            },
                            "runOrder": 1,
                            "configuration": {
                                "RepositoryName": "svc",
                                "BranchName": "main",
                                "PollForSourceChanges": "false"
                            },
                            "outputArtifacts": [{ "name": "SourceOutput" }]
                        }
                    ]
                },
                {
                    "name": "Build",
                    "blockers": [],
                    "actions": [
                        {
                            "name": "build",
                            "configuration": { "ProjectName": "svc-build" }
                        }
                    ]
                }
            ]
        })
    }

    #[test]
    fn test_retarget_preserves_unknown_fields() {
        let mut pipeline: PipelineDeclaration = serde_json::from_value(sample()).unwrap();

        let rewritten = pipeline.retarget_source("svc-repo", "svc", "feature-x");
        assert_eq!(rewritten, 1);

        let value = serde_json::to_value(&pipeline).unwrap();
        assert_eq!(value["version"], 7);
        assert_eq!(value["artifactStore"]["location"], "artifacts");
        assert_eq!(value["stages"][1]["blockers"], serde_json::json!([]));

        let source = &value["stages"][0]["actions"][0];
        assert_eq!(source["configuration"]["BranchName"], "feature-x");
        assert_eq!(source["configuration"]["RepositoryName"], "svc");
        assert_eq!(source["configuration"]["PollForSourceChanges"], "false");
        assert_eq!(source["actionTypeId"]["provider"], "CodeCommit");
        assert_eq!(source["outputArtifacts"][0]["name"], "SourceOutput");

        let build = &value["stages"][1]["actions"][0];
        assert_eq!(build["configuration"]["ProjectName"], "svc-build");
        assert!(build["configuration"].get("BranchName").is_none());
    }

    #[test]
    fn test_retarget_without_match() {
        let mut pipeline: PipelineDeclaration = serde_json::from_value(sample()).unwrap();
        let before = pipeline.clone();

        assert_eq!(pipeline.retarget_source("other-repo", "other", "dev"), 0);
        assert_eq!(pipeline, before);
    }

    #[test]
    fn test_retarget_every_matching_action() {
        let mut pipeline = PipelineDeclaration::new("p")
            .stage(StageDeclaration::new("Source").action(ActionDeclaration::new("svc-repo")))
            .stage(
                StageDeclaration::new("Again")
                    .action(ActionDeclaration::new("svc-repo").config("BranchName", "old")),
            );

        assert_eq!(pipeline.retarget_source("svc-repo", "svc", "dev"), 2);
        for stage in &pipeline.stages {
            assert_eq!(stage.actions[0].configuration[BRANCH_NAME_KEY], "dev");
        }
    }

    #[test]
    fn test_empty_configuration_not_serialized() {
        let pipeline = PipelineDeclaration::new("p")
            .stage(StageDeclaration::new("Approve").action(ActionDeclaration::new("manual")));
        let value = serde_json::to_value(&pipeline).unwrap();
        assert!(value["stages"][0]["actions"][0].get("configuration").is_none());
    }
}
