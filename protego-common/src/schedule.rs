//! Schedules: when a periodic job should fire next
//!
//! A schedule is either a fixed interval or a cron expression evaluated in
//! UTC. Classic five-field expressions (`minute hour day month weekday`) are
//! accepted and run at second 0.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::config::ScheduleConfig;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub enum Schedule {
    Interval(Duration),
    Cron {
        expression: String,
        schedule: Box<cron::Schedule>,
    },
}

impl Schedule {
    pub fn every(interval: Duration) -> Self {
        Schedule::Interval(interval)
    }

    /// Parse a cron expression with five, six or seven fields
    pub fn cron(expression: &str) -> Result<Self> {
        let trimmed = expression.trim();
        let fields = trimmed.split_whitespace().count();
        let normalized = match fields {
            5 => format!("0 {}", trimmed),
            6 | 7 => trimmed.to_string(),
            n => {
                return Err(Error::Config(format!(
                    "Cron expression '{}' has {} fields, expected 5 to 7",
                    trimmed, n
                )))
            }
        };

        let schedule = cron::Schedule::from_str(&normalized)
            .map_err(|e| Error::Config(format!("Invalid cron expression '{}': {}", trimmed, e)))?;

        Ok(Schedule::Cron {
            expression: trimmed.to_string(),
            schedule: Box::new(schedule),
        })
    }

    pub fn from_config(config: &ScheduleConfig) -> Result<Self> {
        match (&config.cron, config.interval_secs) {
            (Some(expression), None) => Self::cron(expression),
            (None, Some(0)) => Err(Error::Config("interval_secs must be > 0".to_string())),
            (None, Some(secs)) => Ok(Self::every(Duration::from_secs(secs))),
            (Some(_), Some(_)) => Err(Error::Config(
                "set either cron or interval_secs, not both".to_string(),
            )),
            (None, None) => Err(Error::Config(
                "schedule needs cron or interval_secs".to_string(),
            )),
        }
    }

    /// Time to wait from `now` until the next fire
    pub fn delay_from(&self, now: DateTime<Utc>) -> Duration {
        match self {
            Schedule::Interval(interval) => *interval,
            Schedule::Cron { schedule, .. } => schedule
                .after(&now)
                .next()
                .and_then(|next| (next - now).to_std().ok())
                // An exhausted expression (e.g. a past year) never fires again
                .unwrap_or(Duration::MAX),
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Interval(interval) if interval.subsec_nanos() == 0 => {
                write!(f, "every {}s", interval.as_secs())
            }
            Schedule::Interval(interval) => write!(f, "every {}ms", interval.as_millis()),
            Schedule::Cron { expression, .. } => write!(f, "cron '{}'", expression),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_five_field_cron_fires_daily_at_two() {
        let schedule = Schedule::cron("0 2 * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2025, 12, 10, 1, 30, 0).unwrap();
        assert_eq!(schedule.delay_from(now), Duration::from_secs(30 * 60));

        let after_fire = Utc.with_ymd_and_hms(2025, 12, 10, 2, 0, 0).unwrap();
        assert_eq!(schedule.delay_from(after_fire), Duration::from_secs(24 * 3600));
    }

    #[test]
    fn test_six_field_cron_is_used_verbatim() {
        let schedule = Schedule::cron("30 */5 * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2025, 12, 10, 8, 0, 0).unwrap();
        assert_eq!(schedule.delay_from(now), Duration::from_secs(30));
    }

    #[test]
    fn test_interval_delay_is_constant() {
        let schedule = Schedule::every(Duration::from_secs(300));
        assert_eq!(schedule.delay_from(Utc::now()), Duration::from_secs(300));
        assert_eq!(schedule.to_string(), "every 300s");
    }

    #[test]
    fn test_sub_second_interval_displays_millis() {
        assert_eq!(Schedule::every(Duration::from_millis(250)).to_string(), "every 250ms");
        assert_eq!(Schedule::every(Duration::from_millis(1500)).to_string(), "every 1500ms");
    }

    #[test]
    fn test_invalid_cron_rejected() {
        assert!(Schedule::cron("0 2 *").is_err());
        assert!(Schedule::cron("99 99 * * *").is_err());
    }

    #[test]
    fn test_from_config() {
        assert!(matches!(
            Schedule::from_config(&ScheduleConfig::every(60)).unwrap(),
            Schedule::Interval(d) if d == Duration::from_secs(60)
        ));
        assert!(matches!(
            Schedule::from_config(&ScheduleConfig::cron("0 2 * * *")).unwrap(),
            Schedule::Cron { .. }
        ));
        assert!(Schedule::from_config(&ScheduleConfig::every(0)).is_err());
        assert!(Schedule::from_config(&ScheduleConfig::default()).is_err());
    }
}
