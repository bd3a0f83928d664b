//! Promotion constraints and their persisted state

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Constraint type key of [`Constraint::DependsOn`]
pub const DEPENDS_ON: &str = "depends-on";
/// Constraint type key of [`Constraint::ManualJudgement`]
pub const MANUAL_JUDGEMENT: &str = "manual-judgement";
/// Constraint type key of [`Constraint::AllowedTimes`]
pub const ALLOWED_TIMES: &str = "allowed-times";
/// Constraint type key of the implicit artifact-used evaluator
pub const ARTIFACT_USED: &str = "artifact-used";

/// Default manual judgement timeout: one week
pub const DEFAULT_JUDGEMENT_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// A rule gating promotion of a version into an environment
///
/// Declared as a map with a `type` key. Types other than the built-in ones
/// become [`Constraint::Custom`] and are evaluated by whichever registered
/// evaluator supports that key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// Version must already be deployed to another environment
    DependsOn {
        /// Upstream environment name
        environment: String,
    },
    /// A human must approve the version
    ManualJudgement {
        /// Pending judgements older than this fail
        timeout_secs: u64,
    },
    /// Promotion only inside the given windows
    AllowedTimes {
        /// Allowed windows; any match passes
        windows: Vec<TimeWindow>,
        /// Fixed offset from UTC the windows are expressed in
        tz_offset_hours: i32,
    },
    /// Constraint handled by a plugin evaluator
    Custom {
        /// Type key
        constraint_type: String,
        /// Remaining fields of the declaration
        config: Map<String, Value>,
    },
}

fn default_judgement_timeout() -> u64 {
    DEFAULT_JUDGEMENT_TIMEOUT_SECS
}

/// Wire form of the built-in constraints
#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum Builtin {
    DependsOn {
        environment: String,
    },
    ManualJudgement {
        #[serde(default = "default_judgement_timeout")]
        timeout_secs: u64,
    },
    AllowedTimes {
        windows: Vec<TimeWindow>,
        #[serde(default)]
        tz_offset_hours: i32,
    },
}

impl From<Builtin> for Constraint {
    fn from(builtin: Builtin) -> Self {
        match builtin {
            Builtin::DependsOn { environment } => Self::DependsOn { environment },
            Builtin::ManualJudgement { timeout_secs } => Self::ManualJudgement { timeout_secs },
            Builtin::AllowedTimes {
                windows,
                tz_offset_hours,
            } => Self::AllowedTimes {
                windows,
                tz_offset_hours,
            },
        }
    }
}

impl Constraint {
    /// Plugin constraint with no further fields
    #[must_use]
    pub fn custom(constraint_type: impl Into<String>) -> Self {
        Self::Custom {
            constraint_type: constraint_type.into(),
            config: Map::new(),
        }
    }

    /// Key used to look up the evaluator
    #[must_use]
    pub fn constraint_type(&self) -> &str {
        match self {
            Self::DependsOn { .. } => DEPENDS_ON,
            Self::ManualJudgement { .. } => MANUAL_JUDGEMENT,
            Self::AllowedTimes { .. } => ALLOWED_TIMES,
            Self::Custom {
                constraint_type, ..
            } => constraint_type.as_str(),
        }
    }
}

impl Serialize for Constraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let builtin = match self {
            Self::DependsOn { environment } => Builtin::DependsOn {
                environment: environment.clone(),
            },
            Self::ManualJudgement { timeout_secs } => Builtin::ManualJudgement {
                timeout_secs: *timeout_secs,
            },
            Self::AllowedTimes {
                windows,
                tz_offset_hours,
            } => Builtin::AllowedTimes {
                windows: windows.clone(),
                tz_offset_hours: *tz_offset_hours,
            },
            Self::Custom {
                constraint_type,
                config,
            } => {
                let mut map = serializer.serialize_map(Some(config.len() + 1))?;
                map.serialize_entry("type", constraint_type)?;
                for (key, value) in config.iter().filter(|(key, _)| *key != "type") {
                    map.serialize_entry(key, value)?;
                }
                return map.end();
            }
        };
        builtin.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Constraint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields = Map::<String, Value>::deserialize(deserializer)?;
        let constraint_type = match fields.get("type") {
            Some(Value::String(constraint_type)) => constraint_type.clone(),
            Some(_) => return Err(D::Error::custom("constraint type must be a string")),
            None => return Err(D::Error::missing_field("type")),
        };
        match constraint_type.as_str() {
            DEPENDS_ON | MANUAL_JUDGEMENT | ALLOWED_TIMES => {
                serde_json::from_value::<Builtin>(Value::Object(fields))
                    .map(Self::from)
                    .map_err(D::Error::custom)
            }
            _ => {
                fields.remove("type");
                Ok(Self::Custom {
                    constraint_type,
                    config: fields,
                })
            }
        }
    }
}

/// Allowed promotion window
///
/// `days` accepts names, abbreviations, ranges and aliases
/// (`Monday-Friday`, `mon,wed`, `weekdays`, `weekends`); empty means every day.
/// `hours` accepts hours and inclusive ranges (`9-17`, `10,13-15`); empty means all day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Day specification
    #[serde(default)]
    pub days: Option<String>,
    /// Hour specification
    #[serde(default)]
    pub hours: Option<String>,
}

/// Status of a stateful constraint for one version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintStatus {
    /// Never looked at
    NotEvaluated,
    /// Waiting on a decision
    Pending,
    /// Passed
    Pass,
    /// Failed
    Fail,
    /// Passed by explicit human override
    OverridePass,
    /// Failed by explicit human override
    OverrideFail,
}

impl ConstraintStatus {
    /// Passed, one way or the other
    #[inline]
    #[must_use]
    pub fn passes(self) -> bool {
        matches!(self, Self::Pass | Self::OverridePass)
    }

    /// Failed, one way or the other
    #[inline]
    #[must_use]
    pub fn failed(self) -> bool {
        matches!(self, Self::Fail | Self::OverrideFail)
    }

    /// Decided
    #[inline]
    #[must_use]
    pub fn is_final(self) -> bool {
        self.passes() || self.failed()
    }

    /// Set by a human override
    #[inline]
    #[must_use]
    pub fn is_override(self) -> bool {
        matches!(self, Self::OverridePass | Self::OverrideFail)
    }
}

/// Persisted state of a stateful constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintState {
    /// Delivery config name
    pub delivery_config_name: String,
    /// Environment name
    pub environment_name: String,
    /// Artifact reference
    pub artifact_reference: String,
    /// Artifact version
    pub artifact_version: String,
    /// Constraint type key
    pub constraint_type: String,
    /// Current status
    pub status: ConstraintStatus,
    /// First evaluation
    pub created_at: DateTime<Utc>,
    /// Who decided, if anyone
    pub judged_by: Option<String>,
    /// When it was decided
    pub judged_at: Option<DateTime<Utc>>,
    /// Free-form note
    pub comment: Option<String>,
}

impl ConstraintState {
    /// New pending state
    #[must_use]
    pub fn pending(
        delivery_config_name: impl Into<String>,
        environment_name: impl Into<String>,
        artifact_reference: impl Into<String>,
        artifact_version: impl Into<String>,
        constraint_type: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            delivery_config_name: delivery_config_name.into(),
            environment_name: environment_name.into(),
            artifact_reference: artifact_reference.into(),
            artifact_version: artifact_version.into(),
            constraint_type: constraint_type.into(),
            status: ConstraintStatus::Pending,
            created_at,
            judged_by: None,
            judged_at: None,
            comment: None,
        }
    }

    /// Record a decision
    #[must_use]
    pub fn judged(
        mut self,
        status: ConstraintStatus,
        by: impl Into<String>,
        at: DateTime<Utc>,
        comment: Option<String>,
    ) -> Self {
        self.status = status;
        self.judged_by = Some(by.into());
        self.judged_at = Some(at);
        self.comment = comment;
        self
    }
}

/// A human decision on a constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedConstraintStatus {
    /// Constraint type key
    #[serde(rename = "type")]
    pub constraint_type: String,
    /// Artifact reference
    pub artifact_reference: String,
    /// Artifact version
    pub artifact_version: String,
    /// New status
    pub status: ConstraintStatus,
    /// Free-form note
    #[serde(default)]
    pub comment: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn constraints_are_tagged_by_type() {
        let constraints: Vec<Constraint> = serde_json::from_str(
            r#"[
                {"type": "depends-on", "environment": "test"},
                {"type": "manual-judgement"},
                {"type": "allowed-times", "windows": [{"days": "weekdays", "hours": "9-17"}]}
            ]"#,
        )
        .unwrap();

        let types: Vec<&str> = constraints.iter().map(Constraint::constraint_type).collect();
        assert_eq!(types, [DEPENDS_ON, MANUAL_JUDGEMENT, ALLOWED_TIMES]);
        assert_eq!(
            constraints[1],
            Constraint::ManualJudgement {
                timeout_secs: DEFAULT_JUDGEMENT_TIMEOUT_SECS
            }
        );
    }

    #[test]
    fn unknown_types_are_kept_for_plugins() {
        let constraint: Constraint = serde_json::from_str(
            r#"{"type": "canary", "analysis": {"minutes": 30}, "regions": ["us-east-1"]}"#,
        )
        .unwrap();

        assert_eq!(constraint.constraint_type(), "canary");
        match &constraint {
            Constraint::Custom { config, .. } => {
                assert_eq!(config["analysis"]["minutes"], 30);
                assert!(!config.contains_key("type"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let written = serde_json::to_value(&constraint).unwrap();
        assert_eq!(
            written,
            serde_json::json!({"type": "canary", "analysis": {"minutes": 30}, "regions": ["us-east-1"]})
        );
    }

    #[test]
    fn malformed_builtins_are_rejected() {
        assert!(serde_json::from_str::<Constraint>(r#"{"type": "depends-on"}"#).is_err());
        assert!(serde_json::from_str::<Constraint>(r#"{"environment": "test"}"#).is_err());
        assert!(serde_json::from_str::<Constraint>(r#"{"type": 7}"#).is_err());
    }

    #[test]
    fn builtins_write_their_type() {
        let written = serde_json::to_value(Constraint::DependsOn {
            environment: "test".into(),
        })
        .unwrap();

        assert_eq!(written, serde_json::json!({"type": "depends-on", "environment": "test"}));
    }

    #[test]
    fn status_predicates() {
        assert!(ConstraintStatus::OverridePass.passes());
        assert!(ConstraintStatus::OverridePass.is_override());
        assert!(ConstraintStatus::Fail.failed());
        assert!(!ConstraintStatus::Pending.is_final());
        assert!(!ConstraintStatus::NotEvaluated.is_final());
    }

    #[test]
    fn status_serializes_screaming() {
        assert_eq!(
            serde_json::to_string(&ConstraintStatus::OverridePass).unwrap(),
            "\"OVERRIDE_PASS\""
        );
    }
}
