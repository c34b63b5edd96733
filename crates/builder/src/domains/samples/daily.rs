use crate::clock::localize;
use crate::{GeoPoint, Sample, SampleError, SampleId, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use time::{macros::format_description, Date, PrimitiveDateTime, Time};
use time_tz::Tz;

/// Static pond metadata used to generate inference samples
#[derive(Debug, Clone, PartialEq)]
pub struct Pond {
    pub pond_id: String,
    pub location: GeoPoint,
    pub attributes: BTreeMap<String, Value>,
}

pub fn load_ponds(path: impl AsRef<Path>) -> Result<Vec<Pond>, SampleError> {
    read_ponds(File::open(path)?)
}

pub fn read_ponds<R: Read>(reader: R) -> Result<Vec<Pond>, SampleError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();
    let column = |name: &'static str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or(SampleError::MissingColumn(name))
    };
    let id_col = column("pond_id")?;
    let lat_col = column("latitude")?;
    let lon_col = column("longitude")?;

    let mut ponds = Vec::new();
    for (row, record) in rdr.records().enumerate() {
        let record = record?;
        let coordinate = |index: usize, name: &'static str| {
            let raw = record.get(index).unwrap_or_default();
            raw.trim()
                .parse::<f64>()
                .map_err(|_| SampleError::InvalidValue {
                    row,
                    column: name,
                    value: raw.to_owned(),
                })
        };
        let location = GeoPoint::new(coordinate(lat_col, "latitude")?, coordinate(lon_col, "longitude")?);
        let attributes = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| ![id_col, lat_col, lon_col].contains(i))
            .map(|(i, name)| {
                (
                    name.to_owned(),
                    Value::parse(record.get(i).unwrap_or_default()),
                )
            })
            .collect();
        ponds.push(Pond {
            pond_id: record.get(id_col).unwrap_or_default().to_owned(),
            location,
            attributes,
        });
    }
    Ok(ponds)
}

/// Parses `HH:MM[:SS]` times of day
pub fn parse_time_of_day(raw: &str) -> Result<Time, SampleError> {
    let raw = raw.trim();
    let parsed = if raw.len() <= 5 {
        Time::parse(raw, format_description!("[hour]:[minute]"))
    } else {
        Time::parse(raw, format_description!("[hour]:[minute]:[second]"))
    };
    Ok(parsed?)
}

/// One sample per pond and time of day on `date`, localised in `tz`.
///
/// Ids are assigned sequentially, pond by pond, so repeated runs over the same
/// pond list produce the same keys.
pub fn daily_samples(ponds: &[Pond], date: Date, times_of_day: &[Time], tz: &Tz) -> Vec<Sample> {
    ponds
        .iter()
        .flat_map(|pond| times_of_day.iter().map(move |time| (pond, *time)))
        .enumerate()
        .map(|(idx, (pond, time))| Sample {
            sample_idx: SampleId(idx as u64),
            pond_id: Some(pond.pond_id.clone()),
            location: pond.location,
            sample_dt: localize(PrimitiveDateTime::new(date, time), tz),
            attributes: pond.attributes.clone(),
        })
        .collect()
}
