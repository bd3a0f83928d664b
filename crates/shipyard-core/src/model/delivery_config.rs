//! Delivery configs and environments

use serde::{Deserialize, Serialize};

use super::{Constraint, DeliveryArtifact, Resource, ResourceId};

/// Metadata of an ephemeral preview environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewEnvironment {
    /// Source branch the environment was created for
    pub branch: String,
    /// Source repository key
    pub repo_key: String,
    /// Environment it was derived from
    pub parent_environment: String,
}

/// A deployment target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    /// Name, unique within the delivery config
    pub name: String,
    /// Owned resources
    #[serde(default)]
    pub resources: Vec<Resource>,
    /// Declared constraints
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    /// Preview metadata, present for ephemeral environments
    #[serde(default)]
    pub preview: Option<PreviewEnvironment>,
}

impl Environment {
    /// Empty environment
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: Vec::new(),
            constraints: Vec::new(),
            preview: None,
        }
    }

    /// With a resource
    #[must_use]
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resources.push(resource);
        self
    }

    /// With a constraint
    #[must_use]
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// As a preview environment
    #[must_use]
    pub fn with_preview(mut self, preview: PreviewEnvironment) -> Self {
        self.preview = Some(preview);
        self
    }

    /// Ephemeral preview environment
    #[inline]
    #[must_use]
    pub fn is_preview(&self) -> bool {
        self.preview.is_some()
    }

    /// Some resource deploys the artifact
    #[must_use]
    pub fn uses_artifact(&self, reference: &str) -> bool {
        self.resources.iter().any(|r| r.uses_artifact(reference))
    }

    /// Ids of the resources deploying the artifact
    #[must_use]
    pub fn resource_ids_using(&self, reference: &str) -> Vec<ResourceId> {
        self.resources
            .iter()
            .filter(|r| r.uses_artifact(reference))
            .map(|r| r.id.clone())
            .collect()
    }
}

/// An application's declared environments, artifacts and constraints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryConfig {
    /// Unique name
    pub name: String,
    /// Owning application
    pub application: String,
    /// Identity actions are performed as
    #[serde(default)]
    pub service_account: String,
    /// Tracked artifacts
    #[serde(default)]
    pub artifacts: Vec<DeliveryArtifact>,
    /// Environments
    #[serde(default)]
    pub environments: Vec<Environment>,
}

impl DeliveryConfig {
    /// Empty config
    #[must_use]
    pub fn new(name: impl Into<String>, application: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            application: application.into(),
            service_account: String::new(),
            artifacts: Vec::new(),
            environments: Vec::new(),
        }
    }

    /// With an artifact
    #[must_use]
    pub fn with_artifact(mut self, artifact: DeliveryArtifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    /// With an environment
    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environments.push(environment);
        self
    }

    /// With a service account
    #[must_use]
    pub fn with_service_account(mut self, account: impl Into<String>) -> Self {
        self.service_account = account.into();
        self
    }

    /// Fill in back references (artifact config name, resource application)
    #[must_use]
    pub fn normalized(mut self) -> Self {
        for artifact in &mut self.artifacts {
            artifact.delivery_config_name.clone_from(&self.name);
        }
        for environment in &mut self.environments {
            for resource in &mut environment.resources {
                if resource.application.is_empty() {
                    resource.application.clone_from(&self.application);
                }
            }
        }
        self
    }

    /// Environment by name
    #[must_use]
    pub fn environment_named(&self, name: &str) -> Option<&Environment> {
        self.environments.iter().find(|e| e.name == name)
    }

    /// Artifact by reference
    #[must_use]
    pub fn matching_artifact_by_reference(&self, reference: &str) -> Option<&DeliveryArtifact> {
        self.artifacts.iter().find(|a| a.reference == reference)
    }

    /// Environment owning a resource
    #[must_use]
    pub fn environment_of_resource(&self, id: &ResourceId) -> Option<&Environment> {
        self.environments
            .iter()
            .find(|e| e.resources.iter().any(|r| &r.id == id))
    }

    /// Every resource in every environment
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.environments.iter().flat_map(|e| e.resources.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ArtifactType, ResourceKind};

    fn config() -> DeliveryConfig {
        let kind = ResourceKind::new("ec2", "cluster", "1");
        DeliveryConfig::new("fnord-manifest", "fnord")
            .with_artifact(DeliveryArtifact::new("fnord", ArtifactType::Docker, "fnord-image"))
            .with_environment(
                Environment::new("test").with_resource(
                    Resource::new("ec2:cluster:test:fnord", kind.clone(), "", serde_json::json!({}))
                        .with_artifact("fnord-image"),
                ),
            )
            .with_environment(Environment::new("prod").with_constraint(
                Constraint::ManualJudgement { timeout_secs: 60 },
            ))
            .normalized()
    }

    #[test]
    fn normalization_fills_back_references() {
        let config = config();
        assert_eq!(config.artifacts[0].delivery_config_name, "fnord-manifest");
        assert_eq!(config.environments[0].resources[0].application, "fnord");
    }

    #[test]
    fn lookups() {
        let config = config();
        let id = ResourceId::new("ec2:cluster:test:fnord");
        assert_eq!(config.environment_of_resource(&id).map(|e| e.name.as_str()), Some("test"));
        assert!(config.environment_named("test").unwrap().uses_artifact("fnord-image"));
        assert!(!config.environment_named("prod").unwrap().uses_artifact("fnord-image"));
        assert!(config.matching_artifact_by_reference("nope").is_none());
        assert_eq!(config.resources().count(), 1);
    }
}
