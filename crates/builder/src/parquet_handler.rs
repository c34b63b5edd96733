use crate::{ForecastRecord, GeoPoint, InMemoryArchive};
use parquet::basic::LogicalType;
use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::file::writer::SerializedFileWriter;
use parquet::record::{Field, RecordWriter};
use parquet::{
    basic::{Repetition, Type as PhysicalType},
    schema::types::Type,
};
use parquet_derive::ParquetRecordWriter;
use pondcast_core::{ensure_parent_dir, file_stem, path_exists};
use slog::{debug, info, Logger};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

const FILE_PREFIX: &str = "forecasts_";

#[derive(thiserror::Error, Debug)]
pub enum ParquetArchiveError {
    #[error("Archive io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),
    #[error("Failed to format time string: {0}")]
    TimeFormat(#[from] time::error::Format),
    #[error("Failed to parse time string: {0}")]
    TimeParse(#[from] time::error::Parse),
    #[error("Failed to read archive csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("Invalid archive path pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("Failed to list archive files: {0}")]
    Glob(#[from] glob::GlobError),
    #[error("Missing required column: {0}")]
    MissingColumn(&'static str),
    #[error("Invalid archive row: {0}")]
    InvalidRow(String),
    #[error("Forecast archive not found at {0}")]
    Unavailable(PathBuf),
}

/// One variable of one grid cell of one forecast run
#[derive(ParquetRecordWriter, Debug, Clone, PartialEq)]
pub struct ArchiveRow {
    pub issued_at: String,
    pub valid_at: String,
    pub latitude: f64,
    pub longitude: f64,
    pub variable: String,
    pub value: Option<f64>,
}

pub fn create_archive_schema() -> Result<Type, ParquetError> {
    let text = |name: &str| {
        Type::primitive_type_builder(name, PhysicalType::BYTE_ARRAY)
            .with_logical_type(Some(LogicalType::String))
            .with_repetition(Repetition::REQUIRED)
            .build()
    };
    let double = |name: &str, repetition: Repetition| {
        Type::primitive_type_builder(name, PhysicalType::DOUBLE)
            .with_repetition(repetition)
            .build()
    };

    let fields = vec![
        Arc::new(text("issued_at")?),
        Arc::new(text("valid_at")?),
        Arc::new(double("latitude", Repetition::REQUIRED)?),
        Arc::new(double("longitude", Repetition::REQUIRED)?),
        Arc::new(text("variable")?),
        Arc::new(double("value", Repetition::OPTIONAL)?),
    ];

    Type::group_type_builder("forecast_archive")
        .with_fields(fields)
        .build()
}

/// `{dir}/{YYYY-MM-DD}/forecasts_{issued_at}.parquet`
pub fn run_file_path(dir: &Path, issued_at: OffsetDateTime) -> Result<PathBuf, ParquetArchiveError> {
    let issued_at = issued_at.to_offset(time::UtcOffset::UTC);
    Ok(dir
        .join(issued_at.date().to_string())
        .join(format!("{}{}.parquet", FILE_PREFIX, issued_at.format(&Rfc3339)?)))
}

/// Issuance time encoded in a run file name
pub fn run_issued_at(path: &Path) -> Option<OffsetDateTime> {
    let stem = file_stem(path)?;
    let raw = stem.strip_prefix(FILE_PREFIX)?;
    OffsetDateTime::parse(raw, &Rfc3339).ok()
}

fn to_rows(records: &[&ForecastRecord]) -> Result<Vec<ArchiveRow>, ParquetArchiveError> {
    let mut rows = Vec::new();
    for record in records {
        let issued_at = record.issued_at.format(&Rfc3339)?;
        let valid_at = record.valid_at.format(&Rfc3339)?;
        for (variable, value) in &record.values {
            rows.push(ArchiveRow {
                issued_at: issued_at.clone(),
                valid_at: valid_at.clone(),
                latitude: record.location.latitude,
                longitude: record.location.longitude,
                variable: variable.clone(),
                value: Some(*value),
            });
        }
    }
    Ok(rows)
}

/// Writes records to the archive, one parquet file per issuance time.
/// Returns the files written.
pub fn save_forecast_runs(
    records: &[ForecastRecord],
    dir: &Path,
    logger: &Logger,
) -> Result<Vec<PathBuf>, ParquetArchiveError> {
    let mut runs: BTreeMap<OffsetDateTime, Vec<&ForecastRecord>> = BTreeMap::new();
    for record in records {
        runs.entry(record.issued_at).or_default().push(record);
    }

    let mut written = Vec::with_capacity(runs.len());
    for (issued_at, run) in runs {
        let path = run_file_path(dir, issued_at)?;
        ensure_parent_dir(&path)?;

        let rows = to_rows(&run)?;
        let file = File::create(&path)?;
        let props = WriterProperties::builder().build();
        let mut writer =
            SerializedFileWriter::new(file, Arc::new(create_archive_schema()?), Arc::new(props))?;
        let mut row_group = writer.next_row_group()?;
        rows.as_slice().write_to_row_group(&mut row_group)?;
        row_group.close()?;
        writer.close()?;

        info!(logger, "wrote {} archive rows to {}", rows.len(), path.display());
        written.push(path);
    }
    Ok(written)
}

/// Run files in `dir` whose issuance falls in `[issued_from, issued_before)`,
/// oldest first
pub fn find_run_files(
    dir: &Path,
    issued_from: Option<OffsetDateTime>,
    issued_before: Option<OffsetDateTime>,
) -> Result<Vec<(OffsetDateTime, PathBuf)>, ParquetArchiveError> {
    let pattern = dir.join("*").join(format!("{}*.parquet", FILE_PREFIX));
    let mut files = Vec::new();
    for entry in glob::glob(&pattern.to_string_lossy())? {
        let path = entry?;
        let Some(issued_at) = run_issued_at(&path) else {
            continue;
        };
        let after_start = issued_from.map_or(true, |from| issued_at >= from);
        let before_end = issued_before.map_or(true, |before| issued_at < before);
        if after_start && before_end {
            files.push((issued_at, path));
        }
    }
    files.sort();
    Ok(files)
}

type CellKey = (i64, u64, u64);

fn read_run_file(path: &Path) -> Result<Vec<ForecastRecord>, ParquetArchiveError> {
    let reader = SerializedFileReader::new(File::open(path)?)?;
    let mut records: Vec<ForecastRecord> = Vec::new();
    let mut index: HashMap<CellKey, usize> = HashMap::new();

    for row in reader.get_row_iter(None)? {
        let row = row?;
        let mut issued_at = None;
        let mut valid_at = None;
        let mut latitude = None;
        let mut longitude = None;
        let mut variable = None;
        let mut value = None;
        for (name, field) in row.get_column_iter() {
            match (name.as_str(), field) {
                ("issued_at", Field::Str(s)) => issued_at = Some(OffsetDateTime::parse(s, &Rfc3339)?),
                ("valid_at", Field::Str(s)) => valid_at = Some(OffsetDateTime::parse(s, &Rfc3339)?),
                ("latitude", Field::Double(v)) => latitude = Some(*v),
                ("longitude", Field::Double(v)) => longitude = Some(*v),
                ("variable", Field::Str(s)) => variable = Some(s.clone()),
                ("value", Field::Double(v)) => value = Some(*v),
                _ => {}
            }
        }

        let (Some(issued_at), Some(valid_at), Some(latitude), Some(longitude), Some(variable)) =
            (issued_at, valid_at, latitude, longitude, variable)
        else {
            return Err(ParquetArchiveError::InvalidRow(format!(
                "{}: row is missing a required field",
                path.display()
            )));
        };
        let Some(value) = value else {
            continue;
        };

        let key = (valid_at.unix_timestamp(), latitude.to_bits(), longitude.to_bits());
        let position = *index.entry(key).or_insert_with(|| {
            records.push(ForecastRecord::new(
                issued_at,
                valid_at,
                GeoPoint::new(latitude, longitude),
            ));
            records.len() - 1
        });
        records[position].values.insert(variable, value);
    }
    Ok(records)
}

/// Loads every run issued in `[issued_from, issued_before)` into memory
pub fn load_archive(
    dir: &Path,
    issued_from: Option<OffsetDateTime>,
    issued_before: Option<OffsetDateTime>,
    resolution: f64,
    logger: &Logger,
) -> Result<InMemoryArchive, ParquetArchiveError> {
    if !path_exists(dir) {
        return Err(ParquetArchiveError::Unavailable(dir.to_path_buf()));
    }
    let files = find_run_files(dir, issued_from, issued_before)?;
    info!(logger, "loading {} forecast runs from {}", files.len(), dir.display());

    let mut archive = InMemoryArchive::new(resolution);
    for (issued_at, path) in files {
        let records = read_run_file(&path)?;
        debug!(logger, "run {} holds {} records", issued_at, records.len());
        for record in records {
            archive.push(record);
        }
    }
    info!(logger, "archive holds {} records", archive.len());
    Ok(archive)
}

/// Reads a wide csv dump (`issued_at`, `valid_at`, `latitude`, `longitude`,
/// then one column per variable) into records. Blank cells are skipped.
pub fn read_csv_dump(path: &Path) -> Result<Vec<ForecastRecord>, ParquetArchiveError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let headers = rdr.headers()?.clone();
    let column = |name: &'static str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or(ParquetArchiveError::MissingColumn(name))
    };
    let issued_col = column("issued_at")?;
    let valid_col = column("valid_at")?;
    let lat_col = column("latitude")?;
    let lon_col = column("longitude")?;
    let fixed = [issued_col, valid_col, lat_col, lon_col];

    let mut records = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        let field = |i: usize| record.get(i).unwrap_or_default().trim();
        let number = |i: usize| {
            field(i).parse::<f64>().map_err(|_| {
                ParquetArchiveError::InvalidRow(format!("line {}: '{}' is not a number", line, field(i)))
            })
        };

        let mut forecast = ForecastRecord::new(
            OffsetDateTime::parse(field(issued_col), &Rfc3339)?,
            OffsetDateTime::parse(field(valid_col), &Rfc3339)?,
            GeoPoint::new(number(lat_col)?, number(lon_col)?),
        );
        for (i, name) in headers.iter().enumerate() {
            if fixed.contains(&i) || field(i).is_empty() || field(i).eq_ignore_ascii_case("nan") {
                continue;
            }
            forecast.values.insert(name.to_owned(), number(i)?);
        }
        records.push(forecast);
    }
    Ok(records)
}

/// Converts a csv dump into the parquet archive layout under `dir`
pub fn import_csv_archive(
    csv_path: &Path,
    dir: &Path,
    logger: &Logger,
) -> Result<Vec<PathBuf>, ParquetArchiveError> {
    let records = read_csv_dump(csv_path)?;
    info!(logger, "importing {} records from {}", records.len(), csv_path.display());
    save_forecast_runs(&records, dir, logger)
}
