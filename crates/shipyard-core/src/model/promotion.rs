//! Pins, vetoes and promotion status

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DeliveryArtifact;

/// Request to pin an environment to a version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentArtifactPin {
    /// Environment name
    pub target_environment: String,
    /// Artifact reference
    pub reference: String,
    /// Pinned version
    pub version: String,
    /// Who pinned it
    #[serde(default)]
    pub pinned_by: Option<String>,
    /// Why
    #[serde(default)]
    pub comment: Option<String>,
}

/// A stored pin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinnedEnvironment {
    /// Delivery config name
    pub delivery_config_name: String,
    /// Environment name
    pub target_environment: String,
    /// Pinned artifact
    pub artifact: DeliveryArtifact,
    /// Pinned version
    pub version: String,
    /// Who pinned it
    pub pinned_by: Option<String>,
    /// When
    pub pinned_at: Option<DateTime<Utc>>,
    /// Why
    pub comment: Option<String>,
}

impl PinnedEnvironment {
    /// Pin applies to this environment and artifact
    #[must_use]
    pub fn matches(&self, environment: &str, artifact: &DeliveryArtifact) -> bool {
        self.target_environment == environment
            && self.artifact.reference == artifact.reference
            && self.artifact.artifact_type == artifact.artifact_type
    }
}

/// Request to veto a version in an environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentArtifactVeto {
    /// Environment name
    pub target_environment: String,
    /// Artifact reference
    pub reference: String,
    /// Vetoed version
    pub version: String,
    /// Who vetoed it
    pub vetoed_by: String,
    /// Why
    #[serde(default)]
    pub comment: Option<String>,
}

/// A vetoed version with audit fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VetoedVersion {
    /// Version
    pub version: String,
    /// Who vetoed it
    pub vetoed_by: Option<String>,
    /// When
    pub vetoed_at: Option<DateTime<Utc>>,
    /// Why
    pub comment: Option<String>,
}

/// All vetoed versions of one artifact in one environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentArtifactVetoes {
    /// Delivery config name
    pub delivery_config_name: String,
    /// Environment name
    pub target_environment: String,
    /// Artifact
    pub artifact: DeliveryArtifact,
    /// Vetoed versions
    pub versions: Vec<VetoedVersion>,
}

impl EnvironmentArtifactVetoes {
    /// Version strings only
    pub fn version_strings(&self) -> impl Iterator<Item = &str> {
        self.versions.iter().map(|v| v.version.as_str())
    }
}

/// Where a version stands in an environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromotionStatus {
    /// Known, not approved
    Pending,
    /// Approved, not deployed yet
    Approved,
    /// Rollout in progress
    Deploying,
    /// Currently deployed
    Current,
    /// Was current before
    Previous,
    /// Vetoed
    Vetoed,
}

impl fmt::Display for PromotionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Deploying => "DEPLOYING",
            Self::Current => "CURRENT",
            Self::Previous => "PREVIOUS",
            Self::Vetoed => "VETOED",
        };
        f.write_str(s)
    }
}
