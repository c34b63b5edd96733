use crate::{FeatureConfig, InMemoryArchive, PipelineConfig, PollSettings};
use clap::{Parser, Subcommand};
use pondcast_core::{
    find_config_file, get_xdg_cache_dir, get_xdg_data_dir, load_config, ConfigSource,
    DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT,
};
use slog::{o, Drain, Level, Logger};
use std::{env, path::PathBuf, time::Duration};

#[derive(Parser, Clone, Debug, serde::Deserialize, Default)]
#[command(
    author,
    version,
    about = "pondcast - Builds pond water-quality feature tables from archived weather forecasts"
)]
pub struct Cli {
    /// Path to config file (TOML format)
    /// Searched in order: this flag, $PONDCAST_CONFIG, ./pondcast.toml,
    /// $XDG_CONFIG_HOME/pondcast/pondcast.toml, /etc/pondcast/pondcast.toml
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, env = "POND_LEVEL")]
    pub level: Option<String>,

    /// Directory holding the parquet forecast archive
    #[arg(short, long, env = "POND_ARCHIVE_DIR")]
    pub archive_dir: Option<String>,

    /// Root of the local object store (used when no bucket is set)
    #[arg(long, env = "POND_STORE_DIR")]
    pub store_dir: Option<String>,

    /// S3 bucket for exports and datasets (requires the s3 feature)
    #[arg(short, long, env = "POND_BUCKET")]
    pub bucket: Option<String>,

    /// Custom S3 endpoint, e.g. for MinIO
    #[arg(long, env = "POND_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// Remote export service; exports go straight to the object store when unset
    #[arg(short, long, env = "POND_EXPORT_URL")]
    pub export_url: Option<String>,

    /// Where exported tables are downloaded before reshaping
    #[arg(long, env = "POND_DOWNLOAD_DIR")]
    pub download_dir: Option<String>,

    /// Where finished datasets are written
    #[arg(short, long, env = "POND_OUTPUT_DIR")]
    pub output_dir: Option<String>,

    /// Seconds between export status checks
    #[arg(long, env = "POND_POLL_INTERVAL")]
    pub poll_interval: Option<u64>,

    /// Seconds to wait on an export before giving up
    #[arg(long, env = "POND_POLL_TIMEOUT")]
    pub poll_timeout: Option<u64>,

    /// IANA timezone the ponds are sampled in
    #[arg(short, long, env = "POND_TIMEZONE")]
    pub timezone: Option<String>,

    /// Hours from local midnight of the day before sampling, comma separated
    #[arg(long, env = "POND_LEAD_OFFSETS", value_delimiter = ',', allow_hyphen_values = true)]
    pub lead_offsets: Option<Vec<i64>>,

    /// Lengths in days of the cumulative windows, comma separated
    #[arg(long, env = "POND_CUMULATIVE_DAYS", value_delimiter = ',')]
    pub cumulative_days: Option<Vec<u32>>,

    /// Local hour of each daily cumulative slot
    #[arg(long, env = "POND_CUMULATIVE_HOUR")]
    pub cumulative_hour: Option<i64>,

    /// Minutes added to every lead and daily slot
    #[arg(long, env = "POND_VALID_TIME_SHIFT", allow_hyphen_values = true)]
    pub valid_time_shift_minutes: Option<i64>,

    /// Runs issued on or after local midnight this many days before sampling are ignored
    #[arg(long, env = "POND_ISSUANCE_LAG_DAYS")]
    pub issuance_lag_days: Option<i64>,

    /// Days of issuances the hourly sums look back over
    #[arg(long, env = "POND_LOOKBACK_DAYS")]
    pub lookback_days: Option<i64>,

    /// Spacing of the forecast grid in degrees
    #[arg(short, long, env = "POND_GRID_RESOLUTION")]
    pub grid_resolution: Option<f64>,

    /// Add below/within/above columns for measured water-quality values
    #[arg(long, env = "POND_RANGE_LABELS")]
    pub range_labels: Option<bool>,

    #[command(subcommand)]
    #[serde(skip)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Build a dataset from a samples csv
    Build {
        /// Csv with sample_idx, latitude, longitude, sample_dt and optional pond_id
        samples: PathBuf,
        /// Dataset name, defaults to the samples file name
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Build the inference dataset for every pond on one day
    Daily {
        /// Csv with pond_id, latitude, longitude and pond attributes
        ponds: PathBuf,
        /// YYYY-MM-DD, defaults to today in the configured timezone
        #[arg(short, long)]
        date: Option<String>,
        /// Local sampling times, comma separated
        #[arg(long, value_delimiter = ',', default_value = "09:00,16:00")]
        times: Vec<String>,
    },
    /// Convert wide csv forecast dumps into the parquet archive
    ImportArchive {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

impl Cli {
    /// Get the effective configuration value with defaults
    pub fn archive_dir(&self) -> PathBuf {
        self.archive_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| get_xdg_data_dir().join("archive"))
    }

    pub fn store_dir(&self) -> PathBuf {
        self.store_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| get_xdg_data_dir().join("store"))
    }

    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| get_xdg_cache_dir().join("downloads"))
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output"))
    }

    pub fn grid_resolution(&self) -> f64 {
        self.grid_resolution
            .unwrap_or(InMemoryArchive::DEFAULT_RESOLUTION)
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL)),
            timeout: Duration::from_secs(self.poll_timeout.unwrap_or(DEFAULT_POLL_TIMEOUT)),
        }
    }

    pub fn feature_config(&self) -> FeatureConfig {
        let defaults = FeatureConfig::default();
        FeatureConfig {
            timezone: self.timezone.clone().unwrap_or(defaults.timezone),
            lead_offsets: self.lead_offsets.clone().unwrap_or(defaults.lead_offsets),
            cumulative_days: self.cumulative_days.clone().unwrap_or(defaults.cumulative_days),
            cumulative_hour: self.cumulative_hour.unwrap_or(defaults.cumulative_hour),
            valid_time_shift_minutes: self
                .valid_time_shift_minutes
                .unwrap_or(defaults.valid_time_shift_minutes),
            issuance_lag_days: self.issuance_lag_days.unwrap_or(defaults.issuance_lag_days),
            lookback_days: self.lookback_days.unwrap_or(defaults.lookback_days),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            features: self.feature_config(),
            poll: self.poll_settings(),
            download_dir: self.download_dir(),
            output_dir: self.output_dir(),
            range_labels: self.range_labels.unwrap_or(true),
        }
    }

    /// CLI values win, anything unset falls back to `file`
    pub fn merge(self, file: Cli) -> Cli {
        Cli {
            config: self.config,
            level: self.level.or(file.level),
            archive_dir: self.archive_dir.or(file.archive_dir),
            store_dir: self.store_dir.or(file.store_dir),
            bucket: self.bucket.or(file.bucket),
            s3_endpoint: self.s3_endpoint.or(file.s3_endpoint),
            export_url: self.export_url.or(file.export_url),
            download_dir: self.download_dir.or(file.download_dir),
            output_dir: self.output_dir.or(file.output_dir),
            poll_interval: self.poll_interval.or(file.poll_interval),
            poll_timeout: self.poll_timeout.or(file.poll_timeout),
            timezone: self.timezone.or(file.timezone),
            lead_offsets: self.lead_offsets.or(file.lead_offsets),
            cumulative_days: self.cumulative_days.or(file.cumulative_days),
            cumulative_hour: self.cumulative_hour.or(file.cumulative_hour),
            valid_time_shift_minutes: self
                .valid_time_shift_minutes
                .or(file.valid_time_shift_minutes),
            issuance_lag_days: self.issuance_lag_days.or(file.issuance_lag_days),
            lookback_days: self.lookback_days.or(file.lookback_days),
            grid_resolution: self.grid_resolution.or(file.grid_resolution),
            range_labels: self.range_labels.or(file.range_labels),
            command: self.command,
        }
    }
}

/// Load configuration from CLI args, config file, and environment
pub fn get_config_info() -> Cli {
    let cli_args = Cli::parse();

    // Determine config file path
    let source = if let Some(ref path) = cli_args.config {
        ConfigSource::Explicit(path.into())
    } else {
        find_config_file("PONDCAST_CONFIG", "pondcast.toml")
    };

    // Load from config file
    let file_config: Cli = load_config(&source).unwrap_or_default();

    // CLI args override file config (env vars are handled by clap)
    cli_args.merge(file_config)
}

fn parse_level(raw: &str) -> Level {
    match raw.to_lowercase().as_str() {
        "trace" => Level::Trace,
        "debug" => Level::Debug,
        "info" => Level::Info,
        "warn" => Level::Warning,
        "error" => Level::Error,
        _ => Level::Info,
    }
}

pub fn setup_logger(cli: &Cli) -> Logger {
    let log_level = match cli.level.as_ref() {
        Some(level) => parse_level(level),
        None => parse_level(&env::var("RUST_LOG").unwrap_or_default()),
    };

    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::CompactFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    let drain = drain.filter_level(log_level).fuse();
    slog::Logger::root(drain, o!("version" => env!("CARGO_PKG_VERSION")))
}
