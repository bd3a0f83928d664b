use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Datelike, FixedOffset, Timelike, Weekday};
use shipyard_core::model::constraint::ALLOWED_TIMES;
use shipyard_core::{
    Clock, Constraint, ConstraintEvaluator, DeliveryArtifact, DeliveryConfig, Environment,
    EvaluationError, TimeWindow,
};

/// Passes while the clock is inside one of the environment's windows
pub struct AllowedTimesConstraintEvaluator {
    clock: Arc<dyn Clock>,
}

impl AllowedTimesConstraintEvaluator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait::async_trait]
impl ConstraintEvaluator for AllowedTimesConstraintEvaluator {
    fn supported_type(&self) -> &'static str {
        ALLOWED_TIMES
    }

    fn is_implicit(&self) -> bool {
        false
    }

    fn is_stateful(&self) -> bool {
        false
    }

    async fn can_promote(
        &self,
        _artifact: &DeliveryArtifact,
        _version: &str,
        _delivery_config: &DeliveryConfig,
        environment: &Environment,
    ) -> Result<bool, EvaluationError> {
        let (windows, tz_offset_hours) = environment
            .constraints
            .iter()
            .find_map(|c| match c {
                Constraint::AllowedTimes {
                    windows,
                    tz_offset_hours,
                } => Some((windows, *tz_offset_hours)),
                _ => None,
            })
            .ok_or_else(|| EvaluationError::MissingConstraint {
                constraint_type: ALLOWED_TIMES.to_string(),
                environment: environment.name.clone(),
            })?;

        let offset = FixedOffset::east_opt(tz_offset_hours * 3600).ok_or_else(|| {
            EvaluationError::Failed(format!("invalid UTC offset {tz_offset_hours}h"))
        })?;
        let now = self.clock.now().with_timezone(&offset);

        for window in windows {
            let days = parse_days(window)?;
            let hours = parse_hours(window)?;
            if days.contains(&now.weekday().num_days_from_monday()) && hours.contains(&now.hour()) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Days as `num_days_from_monday`
fn parse_days(window: &TimeWindow) -> Result<BTreeSet<u32>, EvaluationError> {
    let spec = window.days.as_deref().map(str::trim).unwrap_or_default();
    if spec.is_empty() {
        return Ok((0..7).collect());
    }

    let mut days = BTreeSet::new();
    for part in spec.split(',').map(str::trim) {
        match part.to_ascii_lowercase().as_str() {
            "weekdays" => days.extend(0..5),
            "weekends" => days.extend(5..7),
            other => {
                let range = match other.split_once('-') {
                    Some((start, end)) => (weekday(start)?, weekday(end)?),
                    None => {
                        let day = weekday(other)?;
                        (day, day)
                    }
                };
                days.extend(wrapping_range(range, 7));
            }
        }
    }
    Ok(days)
}

fn parse_hours(window: &TimeWindow) -> Result<BTreeSet<u32>, EvaluationError> {
    let spec = window.hours.as_deref().map(str::trim).unwrap_or_default();
    if spec.is_empty() {
        return Ok((0..24).collect());
    }

    let mut hours = BTreeSet::new();
    for part in spec.split(',').map(str::trim) {
        let range = match part.split_once('-') {
            Some((start, end)) => (hour(start)?, hour(end)?),
            None => {
                let h = hour(part)?;
                (h, h)
            }
        };
        hours.extend(wrapping_range(range, 24));
    }
    Ok(hours)
}

/// Inclusive range that wraps past `modulus`, so `fri-mon` and `22-2` work
fn wrapping_range((start, end): (u32, u32), modulus: u32) -> Vec<u32> {
    if start <= end {
        (start..=end).collect()
    } else {
        (start..modulus).chain(0..=end).collect()
    }
}

fn weekday(name: &str) -> Result<u32, EvaluationError> {
    let name = name.trim().to_ascii_lowercase();
    WEEK.iter()
        .find(|day| {
            let full = full_name(**day);
            name.len() >= 3 && full.starts_with(&name)
        })
        .map(|day| day.num_days_from_monday())
        .ok_or_else(|| EvaluationError::Failed(format!("invalid day {name:?}")))
}

fn full_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

fn hour(raw: &str) -> Result<u32, EvaluationError> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|h| *h < 24)
        .ok_or_else(|| EvaluationError::Failed(format!("invalid hour {raw:?}")))
}
