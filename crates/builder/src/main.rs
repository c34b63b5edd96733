use anyhow::anyhow;
use builder::{
    archive_window, create_dataset, daily_samples, get_config_info, import_csv_archive,
    load_archive, load_ponds, load_samples, parse_time_of_day, setup_logger, CachedArchive, Cli,
    Command, DatasetOutcome, ExportService, LocalObjectStore, ObjectStore, ObjectStoreExport,
    RemoteExportService, Sample,
};
use pondcast_core::file_stem;
use slog::{debug, info, warn, Logger};
use std::{path::PathBuf, sync::Arc};
use time::{macros::format_description, Date, OffsetDateTime};
use time_tz::OffsetDateTimeExt;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = get_config_info();
    let logger = setup_logger(&cli);

    let Some(command) = cli.command.clone() else {
        return Err(anyhow!("no command given, run with --help for usage"));
    };

    info!(logger, "pondcast starting...");
    info!(logger, "  Archive dir: {}", cli.archive_dir().display());
    info!(logger, "  Output dir: {}", cli.output_dir().display());
    info!(logger, "  Timezone: {}", cli.feature_config().timezone);

    match command {
        Command::ImportArchive { files } => import_archives(&cli, files, &logger),
        Command::Build { samples, name } => {
            let name = name
                .or_else(|| file_stem(&samples))
                .unwrap_or_else(|| "dataset".to_string());
            let samples = load_samples(&samples)?;
            build(&cli, &name, samples, &logger).await
        }
        Command::Daily { ponds, date, times } => {
            let tz = cli.feature_config().tz()?;
            let date = match date {
                Some(raw) => Date::parse(&raw, format_description!("[year]-[month]-[day]"))?,
                None => OffsetDateTime::now_utc().to_timezone(tz).date(),
            };
            let times = times
                .iter()
                .map(|raw| parse_time_of_day(raw))
                .collect::<Result<Vec<_>, _>>()?;
            let ponds = load_ponds(&ponds)?;
            let samples = daily_samples(&ponds, date, &times, tz);
            build(&cli, &date.to_string(), samples, &logger).await
        }
    }
}

fn import_archives(cli: &Cli, files: Vec<PathBuf>, logger: &Logger) -> Result<(), anyhow::Error> {
    let archive_dir = cli.archive_dir();
    for file in files {
        let written = import_csv_archive(&file, &archive_dir, logger)?;
        info!(
            logger,
            "imported {} into {} run files",
            file.display(),
            written.len()
        );
    }
    Ok(())
}

async fn build(
    cli: &Cli,
    name: &str,
    samples: Vec<Sample>,
    logger: &Logger,
) -> Result<(), anyhow::Error> {
    let config = cli.pipeline_config();
    let (issued_from, issued_before) = archive_window(&samples, &config.features)?
        .ok_or_else(|| anyhow!("no samples to build {} from", name))?;
    let archive = load_archive(
        &cli.archive_dir(),
        Some(issued_from),
        Some(issued_before),
        cli.grid_resolution(),
        logger,
    )?;
    let archive = CachedArchive::new(archive, cli.grid_resolution());

    let store = object_store(cli, logger).await?;
    let export: Box<dyn ExportService> = match cli.export_url.clone() {
        Some(url) => Box::new(RemoteExportService::new(url, logger.clone())?),
        None => Box::new(ObjectStoreExport::new(store.clone(), logger.clone())),
    };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        let logger = logger.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!(logger, "received ctrl-c, cancelling run");
                cancel.cancel();
            }
        }
    });

    let outcome = create_dataset(
        name,
        &samples,
        &archive,
        &config,
        export.as_ref(),
        store.as_ref(),
        &cancel,
        logger,
    )
    .await?;

    let (hits, misses) = archive.stats();
    debug!(logger, "archive cache: {} hits, {} misses", hits, misses);

    match outcome {
        DatasetOutcome::Created { path, rows } => {
            info!(logger, "dataset {} ready: {} rows at {}", name, rows, path.display());
            Ok(())
        }
        DatasetOutcome::ExportFailed(outcome) => Err(anyhow!("export for {} {}", name, outcome)),
    }
}

async fn object_store(cli: &Cli, logger: &Logger) -> Result<Arc<dyn ObjectStore>, anyhow::Error> {
    if let Some(store) = s3_store(cli, logger).await? {
        return Ok(store);
    }
    info!(logger, "using local object store at {}", cli.store_dir().display());
    Ok(Arc::new(LocalObjectStore::new(cli.store_dir(), logger.clone())))
}

#[cfg(feature = "s3")]
async fn s3_store(cli: &Cli, logger: &Logger) -> Result<Option<Arc<dyn ObjectStore>>, anyhow::Error> {
    let Some(bucket) = cli.bucket.clone() else {
        return Ok(None);
    };
    let store =
        builder::S3ObjectStore::new(bucket, cli.s3_endpoint.clone(), logger.clone()).await?;
    Ok(Some(Arc::new(store)))
}

#[cfg(not(feature = "s3"))]
async fn s3_store(cli: &Cli, logger: &Logger) -> Result<Option<Arc<dyn ObjectStore>>, anyhow::Error> {
    if cli.bucket.is_some() {
        warn!(logger, "bucket configured but built without the s3 feature, ignoring it");
    }
    Ok(None)
}
