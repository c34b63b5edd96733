use crate::{
    merge_samples, monitor_job, pivot, sample_anchors, ExportError, ExportService, Exporter,
    FeatureConfig, ForecastArchive, JobOutcome, LongTable, ObjectStore, PollSettings, Sample,
    SelectionError,
};
use anyhow::anyhow;
use pondcast_core::create_dir_all;
use slog::{debug, info, warn, Logger};
use std::path::{Path, PathBuf};
use time::{Duration, OffsetDateTime};
use tokio_util::sync::CancellationToken;

/// Longest lead a forecast run is expected to cover, in hours
pub const MAX_FORECAST_HORIZON_HOURS: i64 = 384;

/// Object key prefix exports are written under
pub const EXPORT_PREFIX: &str = "exports";

/// Object key prefix finished datasets are uploaded under
pub const DATASET_PREFIX: &str = "predict_dfs";

/// Everything one dataset run needs besides its inputs
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub features: FeatureConfig,
    pub poll: PollSettings,
    /// Where exported shards are copied before reshaping
    pub download_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Add `{parameter}_status` columns for measured water-quality values
    pub range_labels: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            features: FeatureConfig::default(),
            poll: PollSettings::default(),
            download_dir: PathBuf::from("./downloads"),
            output_dir: PathBuf::from("./output"),
            range_labels: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DatasetOutcome {
    Created { path: PathBuf, rows: usize },
    /// The export never finished, nothing was downloaded or written
    ExportFailed(JobOutcome),
}

pub fn export_key(name: &str) -> String {
    format!("{}/{}_gfs.csv", EXPORT_PREFIX, name)
}

/// Glob for the export of `name`: the single object or its numbered shards
/// (`{name}_gfs-000000000000.csv`), never another dataset's `{name}_gfs_v2.csv`
pub fn export_pattern(name: &str) -> String {
    format!("{}/{}_gfs[-.]*csv", EXPORT_PREFIX, glob::Pattern::escape(name))
}

pub fn dataset_key(name: &str) -> String {
    format!("{}/{}_predict_df.csv", DATASET_PREFIX, name)
}

/// Issuance range of the runs `samples` can possibly draw from, so the
/// archive only loads what the run needs. `None` when there are no samples.
pub fn archive_window(
    samples: &[Sample],
    config: &FeatureConfig,
) -> Result<Option<(OffsetDateTime, OffsetDateTime)>, SelectionError> {
    let tz = config.tz()?;
    let longest_window = config.cumulative_days.iter().max().copied().unwrap_or(0);
    let earliest_lead = config.lead_offsets.iter().min().copied().unwrap_or(0).min(0);
    let reach = Duration::days(i64::from(longest_window) + 1) - Duration::hours(earliest_lead)
        + Duration::minutes(config.valid_time_shift_minutes.abs())
        + Duration::hours(MAX_FORECAST_HORIZON_HOURS);

    let mut window: Option<(OffsetDateTime, OffsetDateTime)> = None;
    for sample in samples {
        let anchors = sample_anchors(sample, config, tz)?;
        let from = anchors.day_prior.min(anchors.lookback_start) - reach;
        let before = anchors.issuance_cutoff;
        window = Some(match window {
            Some((lo, hi)) => (lo.min(from), hi.max(before)),
            None => (from, before),
        });
    }
    Ok(window)
}

fn read_shards(paths: &[PathBuf]) -> Result<LongTable, ExportError> {
    let mut merged: Option<LongTable> = None;
    for path in paths {
        let shard = LongTable::load(path)?;
        match merged.as_mut() {
            None => merged = Some(shard),
            Some(table) if table.variables == shard.variables => table.rows.extend(shard.rows),
            Some(_) => {
                return Err(ExportError::Malformed(format!(
                    "{} has different variable columns than the other shards",
                    path.display()
                )))
            }
        }
    }
    let mut table = merged.ok_or_else(|| ExportError::Malformed("no exported shards".into()))?;
    table.sort();
    Ok(table)
}

/// Builds the feature table for `samples` and publishes it as `name`.
///
/// The long table goes through the export service, is read back from the
/// store, pivoted, joined onto the samples and uploaded under `predict_dfs/`.
#[allow(clippy::too_many_arguments)]
pub async fn create_dataset<A: ForecastArchive + ?Sized>(
    name: &str,
    samples: &[Sample],
    archive: &A,
    config: &PipelineConfig,
    export: &dyn ExportService,
    store: &dyn ObjectStore,
    cancel: &CancellationToken,
    logger: &Logger,
) -> Result<DatasetOutcome, anyhow::Error> {
    info!(logger, "building dataset {} from {} samples", name, samples.len());
    if samples.is_empty() {
        return Err(anyhow!("no samples to build dataset {} from", name));
    }

    let exporter = Exporter::new(archive, &config.features, logger.clone())?;
    let table = exporter.build_long_table(samples)?;

    let destination = export_key(name);
    let job = export.submit(&table, &destination).await?;
    let outcome = monitor_job(job.as_ref(), config.poll, cancel, logger).await;
    if !outcome.is_success() {
        warn!(logger, "export for {} {}, skipping download", name, outcome);
        return Ok(DatasetOutcome::ExportFailed(outcome));
    }

    let shards = store
        .download(&export_pattern(name), &config.download_dir)
        .await?;
    debug!(logger, "downloaded {} export shards", shards.len());
    let long = read_shards(&shards)?;

    let wide = pivot(&long)?;
    let mut features = merge_samples(samples, &wide)?;
    if config.range_labels {
        features = features.with_range_labels()?;
    }

    create_dir_all(&config.output_dir)?;
    let path = output_path(&config.output_dir, name);
    features.save(&path)?;
    info!(logger, "wrote {} rows to {}", features.len(), path.display());

    store.upload(&path, &dataset_key(name)).await?;
    Ok(DatasetOutcome::Created {
        path,
        rows: features.len(),
    })
}

pub fn output_path(output_dir: &Path, name: &str) -> PathBuf {
    output_dir.join(format!("{}_predict_df.csv", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GeoPoint;
    use time::macros::datetime;

    #[test]
    fn names_objects_after_the_dataset() {
        assert_eq!(export_key("2024-06-15"), "exports/2024-06-15_gfs.csv");
        assert_eq!(dataset_key("june"), "predict_dfs/june_predict_df.csv");
        assert_eq!(
            output_path(Path::new("/tmp/out"), "june"),
            PathBuf::from("/tmp/out/june_predict_df.csv")
        );
    }

    #[test]
    fn export_pattern_only_matches_own_shards() {
        let pattern = glob::Pattern::new(&export_pattern("june")).unwrap();
        assert!(pattern.matches("exports/june_gfs.csv"));
        assert!(pattern.matches("exports/june_gfs-000000000000.csv"));
        assert!(pattern.matches("exports/june_gfs-000000000001.csv"));
        assert!(!pattern.matches("exports/june_gfs_v2.csv"));
        assert!(!pattern.matches("exports/june_v2_gfs.csv"));

        let bracketed = glob::Pattern::new(&export_pattern("run[1]")).unwrap();
        assert!(bracketed.matches("exports/run[1]_gfs.csv"));
        assert!(!bracketed.matches("exports/run1_gfs.csv"));
    }

    #[test]
    fn window_spans_every_sample() {
        let config = FeatureConfig {
            timezone: "UTC".into(),
            ..Default::default()
        };
        let samples = vec![
            Sample::new(0, GeoPoint::new(16.5, 80.5), datetime!(2024-06-15 9:00 UTC)),
            Sample::new(1, GeoPoint::new(16.5, 80.5), datetime!(2024-06-20 9:00 UTC)),
        ];
        let (from, before) = archive_window(&samples, &config).unwrap().unwrap();
        assert_eq!(before, datetime!(2024-06-19 0:00 UTC));
        assert!(from < datetime!(2024-06-10 0:00 UTC) - Duration::hours(MAX_FORECAST_HORIZON_HOURS));
        assert!(archive_window(&[], &config).unwrap().is_none());
    }
}
