//! Delivery artifacts and version ordering

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of artifact tracked by a delivery config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactType {
    /// Container image
    Docker,
    /// Debian package
    Debian,
    /// npm package
    Npm,
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Docker => "docker",
            Self::Debian => "deb",
            Self::Npm => "npm",
        };
        f.write_str(s)
    }
}

/// How discovered versions of an artifact are ordered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionStrategy {
    /// Dotted numeric versions with optional `v` prefix, `-prerelease` and `+build`
    #[default]
    SemverTag,
    /// Plain string comparison
    Lexical,
}

impl VersionStrategy {
    /// Compare two versions; `Greater` means `a` is newer
    #[must_use]
    pub fn compare(self, a: &str, b: &str) -> Ordering {
        match self {
            Self::Lexical => a.cmp(b),
            Self::SemverTag => compare_semver_tags(a, b),
        }
    }

    /// Sort versions newest first
    pub fn sort_newest_first(self, versions: &mut [String]) {
        versions.sort_by(|a, b| self.compare(b, a));
    }
}

fn split_tag(version: &str) -> (&str, Option<&str>) {
    let version = version.strip_prefix('v').unwrap_or(version);
    let version = version.split_once('+').map_or(version, |(core, _build)| core);
    match version.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (version, None),
    }
}

fn compare_identifiers(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

fn compare_semver_tags(a: &str, b: &str) -> Ordering {
    let (core_a, pre_a) = split_tag(a);
    let (core_b, pre_b) = split_tag(b);

    let parts_a: Vec<&str> = core_a.split('.').collect();
    let parts_b: Vec<&str> = core_b.split('.').collect();
    for i in 0..parts_a.len().max(parts_b.len()) {
        let x = parts_a.get(i).copied().unwrap_or("0");
        let y = parts_b.get(i).copied().unwrap_or("0");
        match compare_identifiers(x, y) {
            Ordering::Equal => {}
            other => return other,
        }
    }

    match (pre_a, pre_b) {
        (None, None) => Ordering::Equal,
        // a release is newer than any of its prereleases
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => {
            let ids_a: Vec<&str> = x.split('.').collect();
            let ids_b: Vec<&str> = y.split('.').collect();
            for (p, q) in ids_a.iter().zip(ids_b.iter()) {
                match compare_identifiers(p, q) {
                    Ordering::Equal => {}
                    other => return other,
                }
            }
            ids_a.len().cmp(&ids_b.len())
        }
    }
}

/// An artifact declared in a delivery config
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryArtifact {
    /// Artifact name (image repository, package name)
    pub name: String,
    /// Artifact kind
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    /// Reference, unique within the delivery config
    pub reference: String,
    /// Owning delivery config; filled in when the config is loaded
    #[serde(default)]
    pub delivery_config_name: String,
    /// Version ordering
    #[serde(default)]
    pub version_strategy: VersionStrategy,
}

impl DeliveryArtifact {
    /// Create an artifact with the default version strategy
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        artifact_type: ArtifactType,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            artifact_type,
            reference: reference.into(),
            delivery_config_name: String::new(),
            version_strategy: VersionStrategy::default(),
        }
    }

    /// With owning delivery config
    #[inline]
    #[must_use]
    pub fn with_delivery_config(mut self, name: impl Into<String>) -> Self {
        self.delivery_config_name = name.into();
        self
    }

    /// With version strategy
    #[inline]
    #[must_use]
    pub fn with_version_strategy(mut self, strategy: VersionStrategy) -> Self {
        self.version_strategy = strategy;
        self
    }

    /// Identity used to key version storage: type, name and reference
    #[must_use]
    pub fn key(&self) -> (ArtifactType, String, String) {
        (self.artifact_type, self.name.clone(), self.reference.clone())
    }
}

impl fmt::Display for DeliveryArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.artifact_type, self.name, self.reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sorted(strategy: VersionStrategy, versions: &[&str]) -> Vec<String> {
        let mut versions: Vec<String> = versions.iter().map(|v| (*v).to_string()).collect();
        strategy.sort_newest_first(&mut versions);
        versions
    }

    #[test]
    fn semver_tags_compare_numerically() {
        assert_eq!(
            sorted(VersionStrategy::SemverTag, &["1.2", "1.10", "2.0", "1.1", "1.0"]),
            ["2.0", "1.10", "1.2", "1.1", "1.0"]
        );
    }

    #[test]
    fn prereleases_sort_below_release() {
        assert_eq!(
            sorted(
                VersionStrategy::SemverTag,
                &["v1.0.0-rc.1", "v1.0.0", "v1.0.0-rc.2", "v0.9.9+build.7"]
            ),
            ["v1.0.0", "v1.0.0-rc.2", "v1.0.0-rc.1", "v0.9.9+build.7"]
        );
    }

    #[test]
    fn missing_components_count_as_zero() {
        assert_eq!(
            VersionStrategy::SemverTag.compare("1.0", "1.0.0"),
            Ordering::Equal
        );
        assert_eq!(
            VersionStrategy::SemverTag.compare("1.0.1", "1"),
            Ordering::Greater
        );
    }

    #[test]
    fn lexical_is_plain_string_order() {
        assert_eq!(
            sorted(VersionStrategy::Lexical, &["1.2", "1.10", "2.0"]),
            ["2.0", "1.2", "1.10"]
        );
    }

    #[test]
    fn artifact_deserializes_with_type_field() {
        let artifact: DeliveryArtifact = serde_json::from_str(
            r#"{"name":"fnord","type":"docker","reference":"fnord-image"}"#,
        )
        .unwrap();
        assert_eq!(artifact, DeliveryArtifact::new("fnord", ArtifactType::Docker, "fnord-image"));
    }
}
