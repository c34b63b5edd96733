use std::fmt;
use std::str::FromStr;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("Unrecognised forecast label: '{0}'")]
pub struct InvalidLabel(pub String);

/// Aggregation rule behind a windowed forecast row
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AggregateKind {
    /// Sum of the daily slots over the given number of prior days
    CumulativeDays(u32),
    /// Hourly sum from local midnight up to the sample time
    SameDay,
    /// Hourly sum over the whole previous local day
    PreviousDay,
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateKind::CumulativeDays(3) => write!(f, "three_day_cum"),
            AggregateKind::CumulativeDays(7) => write!(f, "seven_day_cum"),
            AggregateKind::CumulativeDays(days) => write!(f, "{}_day_cum", days),
            AggregateKind::SameDay => write!(f, "same_day_sum"),
            AggregateKind::PreviousDay => write!(f, "prev_day_sum"),
        }
    }
}

impl FromStr for AggregateKind {
    type Err = InvalidLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "three_day_cum" => Ok(AggregateKind::CumulativeDays(3)),
            "seven_day_cum" => Ok(AggregateKind::CumulativeDays(7)),
            "same_day_sum" => Ok(AggregateKind::SameDay),
            "prev_day_sum" => Ok(AggregateKind::PreviousDay),
            other => other
                .strip_suffix("_day_cum")
                .and_then(|days| days.parse::<u32>().ok())
                .filter(|days| *days > 0)
                .map(AggregateKind::CumulativeDays)
                .ok_or_else(|| InvalidLabel(s.to_owned())),
        }
    }
}

/// The `forecast_time` tag of an exported row. Orders leads first (ascending
/// hours), then the at-sample-time row, then aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ForecastLabel {
    Lead(i64),
    Sample,
    Aggregate(AggregateKind),
}

impl fmt::Display for ForecastLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForecastLabel::Lead(hours) => write!(f, "{}", hours),
            ForecastLabel::Sample => write!(f, "sample"),
            ForecastLabel::Aggregate(kind) => write!(f, "{}", kind),
        }
    }
}

impl FromStr for ForecastLabel {
    type Err = InvalidLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(hours) = s.parse::<i64>() {
            return Ok(ForecastLabel::Lead(hours));
        }
        if s == "sample" {
            return Ok(ForecastLabel::Sample);
        }
        s.parse::<AggregateKind>().map(ForecastLabel::Aggregate)
    }
}
