use crate::{ExportError, ForecastLabel, SampleId};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Leading columns of an exported long table, variables follow
pub const LONG_TABLE_COLUMNS: [&str; 5] = [
    "sample_idx",
    "forecast_time",
    "forecast_creation_dt",
    "forecast_hour",
    "n_forecasts",
];

/// One (sample, forecast label) row
#[derive(Debug, Clone, PartialEq)]
pub struct LongRow {
    pub sample_idx: SampleId,
    pub forecast_time: ForecastLabel,
    /// Issuance of the selected run, point rows only
    pub forecast_creation_dt: Option<OffsetDateTime>,
    pub forecast_hour: Option<i64>,
    /// Forecasts behind the row: 1 or 0 for point rows, the number of
    /// contributing slots for aggregates. A point row whose selection found
    /// no run reports 0.
    pub n_forecasts: u32,
    pub values: BTreeMap<String, Option<f64>>,
}

impl LongRow {
    pub fn key(&self) -> (SampleId, ForecastLabel) {
        (self.sample_idx, self.forecast_time)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LongTable {
    pub variables: Vec<String>,
    pub rows: Vec<LongRow>,
}

impl LongTable {
    pub fn new(variables: Vec<String>, rows: Vec<LongRow>) -> Self {
        Self { variables, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn sort(&mut self) {
        self.rows.sort_by_key(|row| row.key());
    }

    pub fn header(&self) -> Vec<&str> {
        LONG_TABLE_COLUMNS
            .iter()
            .copied()
            .chain(self.variables.iter().map(String::as_str))
            .collect()
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), ExportError> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(self.header())?;
        for row in &self.rows {
            let mut record = vec![
                row.sample_idx.to_string(),
                row.forecast_time.to_string(),
                row.forecast_creation_dt
                    .map(|dt| dt.format(&Rfc3339))
                    .transpose()?
                    .unwrap_or_default(),
                row.forecast_hour.map(|h| h.to_string()).unwrap_or_default(),
                row.n_forecasts.to_string(),
            ];
            record.extend(self.variables.iter().map(|variable| {
                row.values
                    .get(variable)
                    .copied()
                    .flatten()
                    .map(|v| v.to_string())
                    .unwrap_or_default()
            }));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, ExportError> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer)?;
        Ok(buffer)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
        self.write_csv(File::create(path)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ExportError> {
        Self::read_csv(File::open(path)?)
    }

    pub fn read_csv<R: Read>(reader: R) -> Result<Self, ExportError> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers = rdr.headers()?.clone();
        for (position, expected) in LONG_TABLE_COLUMNS.iter().enumerate() {
            if headers.get(position) != Some(*expected) {
                return Err(ExportError::Malformed(format!(
                    "expected column '{}' at position {}",
                    expected, position
                )));
            }
        }
        let variables: Vec<String> = headers
            .iter()
            .skip(LONG_TABLE_COLUMNS.len())
            .map(|h| h.to_owned())
            .collect();

        let mut rows = Vec::new();
        for (line, record) in rdr.records().enumerate() {
            let record = record?;
            let field = |i: usize| record.get(i).unwrap_or_default().trim();
            let malformed =
                |column: &str| ExportError::Malformed(format!("row {}: bad {}", line, column));

            let sample_idx = field(0)
                .parse::<SampleId>()
                .map_err(|_| malformed("sample_idx"))?;
            let forecast_time = field(1)
                .parse::<ForecastLabel>()
                .map_err(|_| malformed("forecast_time"))?;
            let forecast_creation_dt = match field(2) {
                "" => None,
                raw => Some(OffsetDateTime::parse(raw, &Rfc3339)?),
            };
            let forecast_hour = match field(3) {
                "" => None,
                raw => Some(raw.parse::<i64>().map_err(|_| malformed("forecast_hour"))?),
            };
            let n_forecasts = field(4)
                .parse::<u32>()
                .map_err(|_| malformed("n_forecasts"))?;

            let mut values = BTreeMap::new();
            for (offset, variable) in variables.iter().enumerate() {
                let value = match field(LONG_TABLE_COLUMNS.len() + offset) {
                    "" => None,
                    raw if raw.eq_ignore_ascii_case("nan") => None,
                    raw => Some(raw.parse::<f64>().map_err(|_| malformed(variable))?),
                };
                values.insert(variable.clone(), value);
            }

            rows.push(LongRow {
                sample_idx,
                forecast_time,
                forecast_creation_dt,
                forecast_hour,
                n_forecasts,
                values,
            });
        }

        Ok(Self { variables, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AggregateKind;
    use time::macros::datetime;

    fn table() -> LongTable {
        LongTable::new(
            vec!["rain".into(), "temp".into()],
            vec![
                LongRow {
                    sample_idx: SampleId(4),
                    forecast_time: ForecastLabel::Lead(-9),
                    forecast_creation_dt: Some(datetime!(2024-06-13 18:00 UTC)),
                    forecast_hour: Some(3),
                    n_forecasts: 1,
                    values: BTreeMap::from([
                        ("rain".to_string(), Some(0.25)),
                        ("temp".to_string(), Some(301.5)),
                    ]),
                },
                LongRow {
                    sample_idx: SampleId(4),
                    forecast_time: ForecastLabel::Aggregate(AggregateKind::SameDay),
                    forecast_creation_dt: None,
                    forecast_hour: None,
                    n_forecasts: 0,
                    values: BTreeMap::from([
                        ("rain".to_string(), None),
                        ("temp".to_string(), None),
                    ]),
                },
            ],
        )
    }

    #[test]
    fn writes_header_and_blank_nulls() {
        let text = String::from_utf8(table().to_csv_bytes().unwrap()).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("sample_idx,forecast_time,forecast_creation_dt,forecast_hour,n_forecasts,rain,temp")
        );
        assert_eq!(lines.next(), Some("4,-9,2024-06-13T18:00:00Z,3,1,0.25,301.5"));
        assert_eq!(lines.next(), Some("4,same_day_sum,,,0,,"));
    }

    #[test]
    fn reads_back_what_it_writes() {
        let original = table();
        let bytes = original.to_csv_bytes().unwrap();
        assert_eq!(LongTable::read_csv(bytes.as_slice()).unwrap(), original);
    }

    #[test]
    fn rejects_foreign_layouts() {
        let csv = "id,forecast_time\n1,8\n";
        assert!(matches!(
            LongTable::read_csv(csv.as_bytes()),
            Err(ExportError::Malformed(_))
        ));
    }
}
