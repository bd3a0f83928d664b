//! Delivery config documents
//!
//! Loading from YAML and the structural checks behind `shipyardd validate`.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use shipyard_core::{Constraint, DeliveryConfig};

/// Read and normalize one delivery config
pub(crate) fn load(path: &Path) -> Result<DeliveryConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

pub(crate) fn parse(raw: &str) -> Result<DeliveryConfig> {
    let config: DeliveryConfig = serde_yaml::from_str(raw)?;
    Ok(config.normalized())
}

/// Every structural problem in `config`; empty when it is usable
pub(crate) fn problems(config: &DeliveryConfig) -> Vec<String> {
    let mut problems = Vec::new();
    if config.name.is_empty() {
        problems.push("delivery config has no name".to_string());
    }
    if config.application.is_empty() {
        problems.push("delivery config has no application".to_string());
    }

    let mut references = HashSet::new();
    for artifact in &config.artifacts {
        if !references.insert(artifact.reference.as_str()) {
            problems.push(format!("artifact reference {} is declared twice", artifact.reference));
        }
    }

    let mut environments = HashSet::new();
    let mut resources = HashSet::new();
    for environment in &config.environments {
        if !environments.insert(environment.name.as_str()) {
            problems.push(format!("environment {} is declared twice", environment.name));
        }
        for resource in &environment.resources {
            if !resources.insert(&resource.id) {
                problems.push(format!("resource {} is declared twice", resource.id));
            }
            if let Some(reference) = &resource.artifact_reference {
                if config.matching_artifact_by_reference(reference).is_none() {
                    problems.push(format!(
                        "resource {} deploys undeclared artifact {}",
                        resource.id, reference
                    ));
                }
            }
        }
        for constraint in &environment.constraints {
            if let Constraint::DependsOn { environment: upstream } = constraint {
                if upstream == &environment.name {
                    problems.push(format!("environment {} depends on itself", environment.name));
                } else if config.environment_named(upstream).is_none() {
                    problems.push(format!(
                        "environment {} depends on unknown environment {}",
                        environment.name, upstream
                    ));
                }
            }
        }
        if let Some(preview) = &environment.preview {
            if config.environment_named(&preview.parent_environment).is_none() {
                problems.push(format!(
                    "preview environment {} has unknown parent {}",
                    environment.name, preview.parent_environment
                ));
            }
        }
    }
    problems
}
