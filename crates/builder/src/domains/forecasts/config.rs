use crate::clock::timezone;
use crate::{AggregateKind, ForecastLabel, SelectionError};
use pondcast_core::DEFAULT_TIMEZONE;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use time::Duration;
use time_tz::Tz;

/// Lead offsets, in hours from local midnight of the day before sampling
pub const DEFAULT_LEAD_OFFSETS: [i64; 7] = [8, 15, 21, 33, 39, -9, -33];

pub const DEFAULT_CUMULATIVE_DAYS: [u32; 2] = [3, 7];

/// Parameters of the forecast alignment. Every field is explicit, nothing is
/// read from the environment at selection time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// IANA name of the timezone local days are computed in
    pub timezone: String,
    pub lead_offsets: Vec<i64>,
    /// Window lengths of the daily cumulative aggregates
    pub cumulative_days: Vec<u32>,
    /// Local hour of each daily cumulative slot
    pub cumulative_hour: i64,
    /// Correction added to every lead and daily slot to line local anchors up
    /// with archive valid times
    pub valid_time_shift_minutes: i64,
    /// Runs issued on or after local midnight this many days before the
    /// sample date are never used
    pub issuance_lag_days: i64,
    /// Hourly sums ignore runs issued more than this many days before the
    /// previous local midnight
    pub lookback_days: i64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE.to_string(),
            lead_offsets: DEFAULT_LEAD_OFFSETS.to_vec(),
            cumulative_days: DEFAULT_CUMULATIVE_DAYS.to_vec(),
            cumulative_hour: 9,
            valid_time_shift_minutes: -6 * 60,
            issuance_lag_days: 1,
            lookback_days: 4,
        }
    }
}

impl FeatureConfig {
    pub fn tz(&self) -> Result<&'static Tz, SelectionError> {
        timezone(&self.timezone).ok_or_else(|| SelectionError::UnknownTimezone(self.timezone.clone()))
    }

    pub fn valid_time_shift(&self) -> Duration {
        Duration::minutes(self.valid_time_shift_minutes)
    }

    pub fn aggregate_kinds(&self) -> Vec<AggregateKind> {
        self.cumulative_days
            .iter()
            .map(|days| AggregateKind::CumulativeDays(*days))
            .chain([AggregateKind::SameDay, AggregateKind::PreviousDay])
            .collect()
    }

    /// Every `forecast_time` label an export produces per sample, in order
    pub fn labels(&self) -> Vec<ForecastLabel> {
        let mut labels: Vec<ForecastLabel> = self
            .lead_offsets
            .iter()
            .map(|hours| ForecastLabel::Lead(*hours))
            .chain([ForecastLabel::Sample])
            .chain(self.aggregate_kinds().into_iter().map(ForecastLabel::Aggregate))
            .collect();
        labels.sort();
        labels
    }

    pub fn validate(&self) -> Result<(), SelectionError> {
        self.tz()?;
        let invalid = |reason: String| Err(SelectionError::InvalidConfig(reason));

        let mut seen = HashSet::new();
        if let Some(dup) = self.lead_offsets.iter().find(|o| !seen.insert(**o)) {
            return invalid(format!("lead offset {} listed twice", dup));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.cumulative_days.iter().find(|d| !seen.insert(**d)) {
            return invalid(format!("cumulative window of {} days listed twice", dup));
        }
        if self.cumulative_days.contains(&0) {
            return invalid("cumulative windows must span at least one day".into());
        }
        if !(0..24).contains(&self.cumulative_hour) {
            return invalid(format!("cumulative hour {} outside 0-23", self.cumulative_hour));
        }
        if self.issuance_lag_days < 0 {
            return invalid("issuance lag cannot be negative".into());
        }
        if self.lookback_days < 0 {
            return invalid("lookback cannot be negative".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = FeatureConfig::default();
        config.validate().unwrap();
        assert_eq!(config.valid_time_shift(), Duration::hours(-6));
        // 7 leads, the sample row, 2 cumulative windows and 2 hourly sums
        assert_eq!(config.labels().len(), 12);
    }

    #[test]
    fn rejects_bad_parameters() {
        let config = FeatureConfig {
            timezone: "Mars/Olympus".into(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SelectionError::UnknownTimezone(_))
        ));

        let config = FeatureConfig {
            lead_offsets: vec![8, 8],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SelectionError::InvalidConfig(_))
        ));

        let config = FeatureConfig {
            cumulative_hour: 24,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn fills_missing_fields_with_defaults() {
        let config: FeatureConfig =
            serde_json::from_str(r#"{"timezone": "UTC", "lead_offsets": [3, -12]}"#).unwrap();
        assert_eq!(config.timezone, "UTC");
        assert_eq!(config.lead_offsets, vec![3, -12]);
        assert_eq!(config.cumulative_days, vec![3, 7]);
    }
}
