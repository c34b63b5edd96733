use csv::StringRecord;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

#[derive(thiserror::Error, Debug)]
pub enum SampleError {
    #[error("Failed to read samples: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse samples csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("Missing required column: {0}")]
    MissingColumn(&'static str),
    #[error("Row {row}: invalid {column} value '{value}'")]
    InvalidValue {
        row: usize,
        column: &'static str,
        value: String,
    },
    #[error("Duplicate sample_idx: {0}")]
    DuplicateId(SampleId),
    #[error("Failed to parse time string: {0}")]
    TimeParse(#[from] time::error::Parse),
}

/// Row key of a sample, unique and stable for the whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SampleId(pub u64);

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SampleId {
    type Err = std::num::ParseIntError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // exported tables sometimes carry float formatted ids ("12.0")
        let trimmed = s.trim().trim_end_matches(".0");
        trimmed.parse::<u64>().map(SampleId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Index of the grid cell containing this point for a grid of `resolution` degrees
    pub fn cell(&self, resolution: f64) -> (i64, i64) {
        (
            (self.latitude / resolution).round() as i64,
            (self.longitude / resolution).round() as i64,
        )
    }
}

/// A single cell of a tabular file: sample attributes, exported forecasts
/// and the final feature table all use it
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Number(f64),
    Text(String),
}

impl Value {
    /// Best-effort typing of a raw csv field
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
            return Value::Null;
        }
        match raw {
            "true" | "True" | "TRUE" => return Value::Bool(true),
            "false" | "False" | "FALSE" => return Value::Bool(false),
            _ => {}
        }
        if let Ok(v) = raw.parse::<i64>() {
            return Value::Integer(v);
        }
        if let Ok(v) = raw.parse::<f64>() {
            return Value::Number(v);
        }
        Value::Text(raw.to_owned())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Number(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<Option<f64>> for Value {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Value::Null, Value::Number)
    }
}

/// One field observation event: where and when the water was sampled
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub sample_idx: SampleId,
    pub pond_id: Option<String>,
    pub location: GeoPoint,
    pub sample_dt: OffsetDateTime,
    /// Remaining input columns, carried unchanged into the feature table
    pub attributes: BTreeMap<String, Value>,
}

impl Sample {
    pub fn new(sample_idx: u64, location: GeoPoint, sample_dt: OffsetDateTime) -> Self {
        Self {
            sample_idx: SampleId(sample_idx),
            pond_id: None,
            location,
            sample_dt,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_pond(mut self, pond_id: impl Into<String>) -> Self {
        self.pond_id = Some(pond_id.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }
}

const SAMPLE_COLUMNS: [&str; 5] = ["sample_idx", "pond_id", "latitude", "longitude", "sample_dt"];

pub fn load_samples(path: impl AsRef<Path>) -> Result<Vec<Sample>, SampleError> {
    read_samples(File::open(path)?)
}

/// Reads a samples csv with `sample_idx`, `latitude`, `longitude`, `sample_dt`
/// (RFC 3339) and optional `pond_id`; any other column becomes an attribute
pub fn read_samples<R: Read>(reader: R) -> Result<Vec<Sample>, SampleError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();
    let column = |name: &'static str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or(SampleError::MissingColumn(name))
    };
    let idx_col = column("sample_idx")?;
    let lat_col = column("latitude")?;
    let lon_col = column("longitude")?;
    let dt_col = column("sample_dt")?;
    let pond_col = headers.iter().position(|h| h == "pond_id");

    let mut seen = HashSet::new();
    let mut samples = Vec::new();
    for (row, record) in rdr.records().enumerate() {
        let record = record?;
        let sample_idx: SampleId = parse_field(&record, idx_col, row, "sample_idx")?;
        if !seen.insert(sample_idx) {
            return Err(SampleError::DuplicateId(sample_idx));
        }
        let latitude: f64 = parse_field(&record, lat_col, row, "latitude")?;
        let longitude: f64 = parse_field(&record, lon_col, row, "longitude")?;
        let sample_dt = OffsetDateTime::parse(record.get(dt_col).unwrap_or_default(), &Rfc3339)?;
        let pond_id = pond_col
            .and_then(|c| record.get(c))
            .filter(|p| !p.is_empty())
            .map(|p| p.to_owned());

        let attributes = headers
            .iter()
            .zip(record.iter())
            .filter(|(name, _)| !SAMPLE_COLUMNS.contains(name))
            .map(|(name, raw)| (name.to_owned(), Value::parse(raw)))
            .collect();

        samples.push(Sample {
            sample_idx,
            pond_id,
            location: GeoPoint::new(latitude, longitude),
            sample_dt,
            attributes,
        });
    }
    Ok(samples)
}

fn parse_field<T: FromStr>(
    record: &StringRecord,
    index: usize,
    row: usize,
    column: &'static str,
) -> Result<T, SampleError> {
    let raw = record.get(index).unwrap_or_default();
    raw.trim().parse::<T>().map_err(|_| SampleError::InvalidValue {
        row,
        column,
        value: raw.to_owned(),
    })
}
