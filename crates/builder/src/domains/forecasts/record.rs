use crate::GeoPoint;
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// One grid-cell output of a forecast run
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRecord {
    /// When the forecast run was produced
    pub issued_at: OffsetDateTime,
    /// The time the forecast predicts conditions for
    pub valid_at: OffsetDateTime,
    /// Grid cell centre
    pub location: GeoPoint,
    pub values: BTreeMap<String, f64>,
}

impl ForecastRecord {
    pub fn new(issued_at: OffsetDateTime, valid_at: OffsetDateTime, location: GeoPoint) -> Self {
        Self {
            issued_at,
            valid_at,
            location,
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, variable: impl Into<String>, value: f64) -> Self {
        self.values.insert(variable.into(), value);
        self
    }

    pub fn value(&self, variable: &str) -> Option<f64> {
        self.values.get(variable).copied()
    }

    /// Whole hours between issuance and validity
    pub fn forecast_hour(&self) -> i64 {
        (self.valid_at - self.issued_at).whole_hours()
    }
}
