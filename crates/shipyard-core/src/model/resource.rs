//! Managed resources

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Unique resource identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    /// Wrap an id
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as str
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Resource kind, written `group/kind@version`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceKind {
    /// API group, e.g. `ec2`
    pub group: String,
    /// Kind within the group, e.g. `cluster`
    pub kind: String,
    /// Schema version, e.g. `1`
    pub version: String,
}

/// Malformed resource kind string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid resource kind {0:?}: expected group/kind@version")]
pub struct InvalidResourceKind(pub String);

impl ResourceKind {
    /// Build a kind from parts
    #[must_use]
    pub fn new(
        group: impl Into<String>,
        kind: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
            version: version.into(),
        }
    }
}

impl FromStr for ResourceKind {
    type Err = InvalidResourceKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidResourceKind(s.to_string());
        let (group, rest) = s.split_once('/').ok_or_else(invalid)?;
        let (kind, version) = rest.split_once('@').ok_or_else(invalid)?;
        if group.is_empty() || kind.is_empty() || version.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(group, kind, version))
    }
}

impl TryFrom<String> for ResourceKind {
    type Error = InvalidResourceKind;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceKind> for String {
    fn from(kind: ResourceKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.group, self.kind, self.version)
    }
}

/// A single managed infrastructure unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Unique id
    pub id: ResourceId,
    /// Kind, selects the handler
    pub kind: ResourceKind,
    /// Owning application; filled in when the config is loaded
    #[serde(default)]
    pub application: String,
    /// Reference of the artifact this resource deploys, if any
    #[serde(default)]
    pub artifact_reference: Option<String>,
    /// Handler-specific desired state
    #[serde(default)]
    pub spec: serde_json::Value,
}

impl Resource {
    /// Create a resource without an artifact
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        kind: ResourceKind,
        application: impl Into<String>,
        spec: serde_json::Value,
    ) -> Self {
        Self {
            id: ResourceId::new(id),
            kind,
            application: application.into(),
            artifact_reference: None,
            spec,
        }
    }

    /// With deployed artifact reference
    #[inline]
    #[must_use]
    pub fn with_artifact(mut self, reference: impl Into<String>) -> Self {
        self.artifact_reference = Some(reference.into());
        self
    }

    /// Whether this resource deploys the given artifact
    #[inline]
    #[must_use]
    pub fn uses_artifact(&self, reference: &str) -> bool {
        self.artifact_reference.as_deref() == Some(reference)
    }
}
