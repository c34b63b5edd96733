use crate::clock::{ceil_hour, floor_hour, is_on_hour};
use crate::{AggregateKind, ForecastArchive, ForecastSelection, ForecastSelector, Sample, SelectionError};
use std::collections::BTreeMap;
use time::{Duration, OffsetDateTime};

/// Windowed total of forecast variables for one sample
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub kind: AggregateKind,
    /// `None` when no slot of the window had a forecast
    pub values: BTreeMap<String, Option<f64>>,
    pub contributing_count: u32,
    pub expected_count: u32,
}

impl Aggregate {
    pub fn empty(kind: AggregateKind, variables: &[String]) -> Self {
        sum_selections(kind, variables, &[])
    }

    pub fn is_complete(&self) -> bool {
        self.contributing_count == self.expected_count
    }
}

/// Adds up every variable over the slots that resolved to a record. Missing
/// slots count towards `expected_count` only; a variable absent from a
/// contributing record adds nothing.
pub fn sum_selections(
    kind: AggregateKind,
    variables: &[String],
    selections: &[ForecastSelection],
) -> Aggregate {
    let mut totals: BTreeMap<String, f64> = variables.iter().map(|v| (v.clone(), 0.0)).collect();
    let mut contributing_count = 0;

    for record in selections.iter().filter_map(|s| s.record.as_ref()) {
        contributing_count += 1;
        for (variable, total) in totals.iter_mut() {
            *total += record.value(variable).unwrap_or(0.0);
        }
    }

    Aggregate {
        kind,
        values: totals
            .into_iter()
            .map(|(variable, total)| (variable, (contributing_count > 0).then_some(total)))
            .collect(),
        contributing_count,
        expected_count: selections.len() as u32,
    }
}

pub struct Aggregator<'s, 'a, A: ?Sized> {
    selector: &'s ForecastSelector<'a, A>,
}

impl<'s, 'a, A: ForecastArchive + ?Sized> Aggregator<'s, 'a, A> {
    pub fn new(selector: &'s ForecastSelector<'a, A>) -> Self {
        Self { selector }
    }

    pub fn aggregate(&self, sample: &Sample, kind: AggregateKind) -> Result<Aggregate, SelectionError> {
        match kind {
            AggregateKind::CumulativeDays(days) => self.daily_cumulative(sample, days),
            AggregateKind::SameDay => self.same_day_sum(sample),
            AggregateKind::PreviousDay => self.prev_day_sum(sample),
        }
    }

    /// Sum of one slot per day at the configured local hour, for the day
    /// before sampling and the `days` days preceding it
    pub fn daily_cumulative(&self, sample: &Sample, days: u32) -> Result<Aggregate, SelectionError> {
        let config = self.selector.config();
        let anchors = self.selector.anchors(sample)?;

        let selections = (0..=i64::from(days))
            .map(|k| {
                let valid_at = self
                    .selector
                    .target_valid_time(&anchors, config.cumulative_hour - 24 * k);
                self.selector
                    .resolve(sample.location, valid_at, None, anchors.issuance_cutoff)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(sum_selections(
            AggregateKind::CumulativeDays(days),
            self.selector.variables(),
            &selections,
        ))
    }

    /// Sum of the hourly forecasts valid in `[start, end]`. Both ends must
    /// fall on whole UTC hours.
    pub fn hourly_sum(
        &self,
        sample: &Sample,
        kind: AggregateKind,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Aggregate, SelectionError> {
        if !is_on_hour(start) || !is_on_hour(end) {
            return Err(SelectionError::InvalidWindow(format!(
                "{} to {} is not aligned to whole hours",
                start, end
            )));
        }
        if end < start {
            return Err(SelectionError::InvalidWindow(format!(
                "window ends ({}) before it starts ({})",
                end, start
            )));
        }

        let anchors = self.selector.anchors(sample)?;
        let hours = (end - start).whole_hours();
        let selections = (0..=hours)
            .map(|h| {
                self.selector.resolve(
                    sample.location,
                    start + Duration::hours(h),
                    Some(anchors.lookback_start),
                    anchors.issuance_cutoff,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(sum_selections(kind, self.selector.variables(), &selections))
    }

    /// Hours from local midnight of the sample date up to the sample time
    pub fn same_day_sum(&self, sample: &Sample) -> Result<Aggregate, SelectionError> {
        let anchors = self.selector.anchors(sample)?;
        let start = ceil_hour(anchors.sample_day);
        let end = floor_hour(sample.sample_dt);
        if end < start {
            // sampled within the first partial hour of the day
            return Ok(Aggregate::empty(AggregateKind::SameDay, self.selector.variables()));
        }
        self.hourly_sum(sample, AggregateKind::SameDay, start, end)
    }

    /// Every whole hour of the previous local day: 24 slots, or 23 and 25
    /// across daylight saving changes
    pub fn prev_day_sum(&self, sample: &Sample) -> Result<Aggregate, SelectionError> {
        let anchors = self.selector.anchors(sample)?;
        let start = ceil_hour(anchors.day_prior);
        let end = ceil_hour(anchors.sample_day) - Duration::HOUR;
        self.hourly_sum(sample, AggregateKind::PreviousDay, start, end)
    }
}
