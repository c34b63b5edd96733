use crate::{
    Aggregate, Aggregator, FeatureConfig, ForecastArchive, ForecastLabel, ForecastSelection,
    ForecastSelector, LongRow, LongTable, Sample, SelectionError, StoreError,
};
use rayon::prelude::*;
use slog::{debug, info, Logger};

#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error("Failed to access export file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to read or write export csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to format time string: {0}")]
    TimeFormat(#[from] time::error::Format),
    #[error("Failed to parse time string: {0}")]
    TimeParse(#[from] time::error::Parse),
    #[error("Malformed export table: {0}")]
    Malformed(String),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Export service request failed: {0}")]
    Request(String),
}

/// Builds the long forecast table for a set of samples
pub struct Exporter<'a, A: ?Sized> {
    selector: ForecastSelector<'a, A>,
    labels: Vec<ForecastLabel>,
    logger: Logger,
}

impl<'a, A: ForecastArchive + ?Sized> Exporter<'a, A> {
    pub fn new(archive: &'a A, config: &'a FeatureConfig, logger: Logger) -> Result<Self, SelectionError> {
        Ok(Self {
            selector: ForecastSelector::new(archive, config)?,
            labels: config.labels(),
            logger,
        })
    }

    pub fn labels(&self) -> &[ForecastLabel] {
        &self.labels
    }

    /// Every label's row for one sample, in label order
    pub fn sample_rows(&self, sample: &Sample) -> Result<Vec<LongRow>, SelectionError> {
        let aggregator = Aggregator::new(&self.selector);
        self.labels
            .iter()
            .map(|label| match label {
                ForecastLabel::Lead(hours) => {
                    let selection = self.selector.select_lead(sample, *hours)?;
                    Ok(self.point_row(sample, *label, &selection))
                }
                ForecastLabel::Sample => {
                    let selection = self.selector.select_at_sample_time(sample)?;
                    Ok(self.point_row(sample, *label, &selection))
                }
                ForecastLabel::Aggregate(kind) => {
                    let aggregate = aggregator.aggregate(sample, *kind)?;
                    Ok(aggregate_row(sample, &aggregate))
                }
            })
            .collect()
    }

    /// Resolves every sample on the rayon pool. The archive is only read, so
    /// samples share nothing but the snapshot.
    pub fn build_long_table(&self, samples: &[Sample]) -> Result<LongTable, SelectionError> {
        info!(
            self.logger,
            "building long table for {} samples x {} labels",
            samples.len(),
            self.labels.len()
        );

        let per_sample: Vec<Vec<LongRow>> = samples
            .par_iter()
            .map(|sample| self.sample_rows(sample))
            .collect::<Result<_, _>>()?;

        let mut table = LongTable::new(
            self.selector.variables().to_vec(),
            per_sample.into_iter().flatten().collect(),
        );
        table.sort();

        let missing = table.rows.iter().filter(|row| row.n_forecasts == 0).count();
        debug!(self.logger, "rows without any forecast: {}", missing);
        info!(self.logger, "long table built with {} rows", table.len());
        Ok(table)
    }

    fn point_row(&self, sample: &Sample, label: ForecastLabel, selection: &ForecastSelection) -> LongRow {
        let record = selection.record.as_ref();
        LongRow {
            sample_idx: sample.sample_idx,
            forecast_time: label,
            forecast_creation_dt: record.map(|r| r.issued_at),
            forecast_hour: record.map(|r| r.forecast_hour()),
            n_forecasts: u32::from(record.is_some()),
            values: self
                .selector
                .variables()
                .iter()
                .map(|variable| (variable.clone(), record.and_then(|r| r.value(variable))))
                .collect(),
        }
    }
}

fn aggregate_row(sample: &Sample, aggregate: &Aggregate) -> LongRow {
    LongRow {
        sample_idx: sample.sample_idx,
        forecast_time: ForecastLabel::Aggregate(aggregate.kind),
        forecast_creation_dt: None,
        forecast_hour: None,
        n_forecasts: aggregate.contributing_count,
        values: aggregate.values.clone(),
    }
}
