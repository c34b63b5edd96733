use crate::clock::{local_midnight, round_hour};
use crate::{
    ArchiveError, FeatureConfig, ForecastArchive, ForecastRecord, GeoPoint, LatestQuery, Sample,
    SampleId,
};
use time::{Duration, OffsetDateTime};
use time_tz::{OffsetDateTimeExt, Tz};

#[derive(thiserror::Error, Debug)]
pub enum SelectionError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),
    #[error("Invalid feature configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid aggregation window: {0}")]
    InvalidWindow(String),
    #[error("Sample {0} falls outside the supported calendar range")]
    OutOfRange(SampleId),
}

/// Reference instants every offset and window of one sample is measured from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleAnchors {
    /// Local midnight of the sample date
    pub sample_day: OffsetDateTime,
    /// Local midnight of the previous calendar day
    pub day_prior: OffsetDateTime,
    /// Runs issued at or after this instant were not available to a forecaster
    pub issuance_cutoff: OffsetDateTime,
    /// Oldest issuance considered by hourly sums
    pub lookback_start: OffsetDateTime,
}

/// Anchors of `sample` on the local calendar of `tz`
pub fn sample_anchors(
    sample: &Sample,
    config: &FeatureConfig,
    tz: &Tz,
) -> Result<SampleAnchors, SelectionError> {
    let out_of_range = || SelectionError::OutOfRange(sample.sample_idx);
    let sample_date = sample.sample_dt.to_timezone(tz).date();
    let prior_date = sample_date.previous_day().ok_or_else(out_of_range)?;
    let cutoff_date = sample_date
        .checked_sub(Duration::days(config.issuance_lag_days))
        .ok_or_else(out_of_range)?;

    let day_prior = local_midnight(prior_date, tz);
    let lookback_start = day_prior
        .checked_sub(Duration::days(config.lookback_days))
        .ok_or_else(out_of_range)?;

    Ok(SampleAnchors {
        sample_day: local_midnight(sample_date, tz),
        day_prior,
        issuance_cutoff: local_midnight(cutoff_date, tz),
        lookback_start,
    })
}

/// The forecast chosen for one (sample, valid time) pair, if any
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSelection {
    pub valid_at: OffsetDateTime,
    pub record: Option<ForecastRecord>,
}

impl ForecastSelection {
    pub fn is_missing(&self) -> bool {
        self.record.is_none()
    }
}

/// Resolves, for a sample, the single forecast run a forecaster would have
/// relied on for a given valid time.
pub struct ForecastSelector<'a, A: ?Sized> {
    archive: &'a A,
    config: &'a FeatureConfig,
    tz: &'static Tz,
    variables: Vec<String>,
}

impl<'a, A: ForecastArchive + ?Sized> ForecastSelector<'a, A> {
    pub fn new(archive: &'a A, config: &'a FeatureConfig) -> Result<Self, SelectionError> {
        config.validate()?;
        Ok(Self {
            archive,
            config,
            tz: config.tz()?,
            variables: archive.variables(),
        })
    }

    pub fn config(&self) -> &FeatureConfig {
        self.config
    }

    /// Variable names every selection and aggregate reports, missing or not
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn anchors(&self, sample: &Sample) -> Result<SampleAnchors, SelectionError> {
        sample_anchors(sample, self.config, self.tz)
    }

    /// Valid time `offset_hours` after the previous local midnight, shifted
    /// and snapped to the nearest whole UTC hour of the archive grid. Zones
    /// with half hour offsets would otherwise never hit a run.
    pub fn target_valid_time(&self, anchors: &SampleAnchors, offset_hours: i64) -> OffsetDateTime {
        let unsnapped =
            anchors.day_prior + Duration::hours(offset_hours) + self.config.valid_time_shift();
        round_hour(unsnapped)
    }

    pub fn select_lead(
        &self,
        sample: &Sample,
        offset_hours: i64,
    ) -> Result<ForecastSelection, SelectionError> {
        let anchors = self.anchors(sample)?;
        let valid_at = self.target_valid_time(&anchors, offset_hours);
        self.resolve(sample.location, valid_at, None, anchors.issuance_cutoff)
    }

    /// Forecast for the sampling hour itself
    pub fn select_at_sample_time(&self, sample: &Sample) -> Result<ForecastSelection, SelectionError> {
        let anchors = self.anchors(sample)?;
        let valid_at = round_hour(sample.sample_dt);
        self.resolve(sample.location, valid_at, None, anchors.issuance_cutoff)
    }

    /// Latest run issued in `[issued_from, issued_before)` valid at `valid_at`
    pub fn resolve(
        &self,
        location: GeoPoint,
        valid_at: OffsetDateTime,
        issued_from: Option<OffsetDateTime>,
        issued_before: OffsetDateTime,
    ) -> Result<ForecastSelection, SelectionError> {
        let record = self.archive.latest_issued(&LatestQuery {
            location,
            valid_at,
            issued_from,
            issued_before,
        })?;
        Ok(ForecastSelection { valid_at, record })
    }
}
