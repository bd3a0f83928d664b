//! Engine settings
//!
//! Loaded from TOML. Every section and field has a default, so an empty
//! file is a valid configuration:
//!
//! ```toml
//! [scheduler]
//! enabled_on_start = true
//! resource_check_min_age_secs = 60
//!
//! [veto.unhappy]
//! max_diff_count = 5
//!
//! [preview]
//! cleanup_enabled = true
//! ```

use std::path::Path;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Top-level settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Check scheduler cadence and batching
    pub scheduler: SchedulerSettings,
    /// Resource actuation
    pub actuation: ActuationSettings,
    /// Artifact version discovery
    pub artifacts: ArtifactSettings,
    /// Registered vetoes
    pub veto: VetoSettings,
    /// Preview environments
    pub preview: PreviewSettings,
}

impl Settings {
    /// Create default settings
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from a TOML string
    pub fn from_toml_str(raw: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read and parse a TOML settings file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.scheduler.resource_check_batch_size == 0 {
            return Err(SettingsError::Invalid {
                field: "scheduler.resource_check_batch_size",
                reason: "must be at least 1".into(),
            });
        }
        if self.scheduler.environment_check_batch_size == 0 {
            return Err(SettingsError::Invalid {
                field: "scheduler.environment_check_batch_size",
                reason: "must be at least 1".into(),
            });
        }
        if self.scheduler.check_interval_secs == 0 {
            return Err(SettingsError::Invalid {
                field: "scheduler.check_interval_secs",
                reason: "must be positive".into(),
            });
        }
        if self.artifacts.default_max_considered_versions == 0 {
            return Err(SettingsError::Invalid {
                field: "artifacts.default_max_considered_versions",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// With scheduler settings
    #[inline]
    #[must_use]
    pub fn with_scheduler(mut self, scheduler: SchedulerSettings) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// With the unhappy veto threshold
    #[inline]
    #[must_use]
    pub fn with_max_diff_count(mut self, max_diff_count: u32) -> Self {
        self.veto.unhappy.max_diff_count = max_diff_count;
        self
    }

    /// With preview cleanup enabled or disabled
    #[inline]
    #[must_use]
    pub fn with_preview_cleanup(mut self, enabled: bool) -> Self {
        self.preview.cleanup_enabled = enabled;
        self
    }
}

/// Scheduler settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Start enabled without waiting for an "application up" signal
    pub enabled_on_start: bool,
    /// Tick period for resource and environment checks
    pub check_interval_secs: u64,
    /// A resource is due once its last check is older than this
    pub resource_check_min_age_secs: u64,
    /// Resources checked per tick
    pub resource_check_batch_size: usize,
    /// A delivery config is due once its last check is older than this
    pub environment_check_min_age_secs: u64,
    /// Delivery configs checked per tick
    pub environment_check_batch_size: usize,
    /// How long a batch waits for one check; slower checks finish unobserved
    pub check_timeout_secs: u64,
    /// Tick period for scheduled agents
    pub agent_interval_secs: u64,
}

impl SchedulerSettings {
    /// Minimum age of a resource check
    #[inline]
    #[must_use]
    pub fn resource_check_min_age(&self) -> Duration {
        secs(self.resource_check_min_age_secs)
    }

    /// Minimum age of an environment check
    #[inline]
    #[must_use]
    pub fn environment_check_min_age(&self) -> Duration {
        secs(self.environment_check_min_age_secs)
    }

    /// Batch timeout
    #[inline]
    #[must_use]
    pub fn check_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.check_timeout_secs)
    }

    /// With resource batching
    #[inline]
    #[must_use]
    pub fn with_resource_batch(mut self, min_age_secs: u64, batch_size: usize) -> Self {
        self.resource_check_min_age_secs = min_age_secs;
        self.resource_check_batch_size = batch_size;
        self
    }

    /// With environment batching
    #[inline]
    #[must_use]
    pub fn with_environment_batch(mut self, min_age_secs: u64, batch_size: usize) -> Self {
        self.environment_check_min_age_secs = min_age_secs;
        self.environment_check_batch_size = batch_size;
        self
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled_on_start: false,
            check_interval_secs: 1,
            resource_check_min_age_secs: 60,
            resource_check_batch_size: 1,
            environment_check_min_age_secs: 30,
            environment_check_batch_size: 1,
            check_timeout_secs: 120,
            agent_interval_secs: 60,
        }
    }
}

/// Resource actuation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuationSettings {
    /// Skip actuation when the delivery config's promotion check is older than this
    pub promotion_check_stale_after_secs: u64,
}

impl ActuationSettings {
    /// Staleness threshold
    #[inline]
    #[must_use]
    pub fn promotion_check_stale_after(&self) -> Duration {
        secs(self.promotion_check_stale_after_secs)
    }
}

impl Default for ActuationSettings {
    fn default() -> Self {
        Self {
            promotion_check_stale_after_secs: 300,
        }
    }
}

/// Artifact version discovery settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactSettings {
    /// How many of the newest versions a promotion check looks at
    pub default_max_considered_versions: usize,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            default_max_considered_versions: 30,
        }
    }
}

/// Veto settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VetoSettings {
    /// Unhappy resource veto
    pub unhappy: UnhappyVetoSettings,
}

/// Unhappy veto settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnhappyVetoSettings {
    /// Register the veto at all
    pub enabled: bool,
    /// Same diff seen more than this many times blocks actuation
    pub max_diff_count: u32,
}

impl Default for UnhappyVetoSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_diff_count: 5,
        }
    }
}

/// Preview environment settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewSettings {
    /// Delete empty preview environments
    pub cleanup_enabled: bool,
}

/// Seconds as a `Duration`, saturating at the largest representable span
fn secs(value: u64) -> Duration {
    let max = i64::MAX / 1000;
    Duration::seconds(i64::try_from(value).map_or(max, |v| v.min(max)))
}
