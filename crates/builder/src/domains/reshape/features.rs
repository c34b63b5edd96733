use crate::{
    classify, Period, RangeKind, ReshapeError, Sample, SampleId, Value, WaterQualityParameter,
    WideTable,
};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Calendar features derived from the sampling time
pub const TIME_COLUMNS: [&str; 4] = ["month", "week_of_month", "day_of_week", "morning"];

const SAMPLE_COLUMNS: [&str; 4] = ["pond_id", "latitude", "longitude", "sample_dt"];

/// Attribute naming the part of day a measurement belongs to, when recorded
const PERIOD_ATTRIBUTE: &str = "time_of_day";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeCategoricals {
    pub month: u8,
    /// ISO week number
    pub week_of_month: u8,
    /// Monday is 0
    pub day_of_week: u8,
    pub morning: bool,
}

/// Calendar fields in the sample's own UTC offset
pub fn derive_time_categoricals(sample_dt: OffsetDateTime) -> TimeCategoricals {
    TimeCategoricals {
        month: u8::from(sample_dt.month()),
        week_of_month: sample_dt.iso_week(),
        day_of_week: sample_dt.weekday().number_days_from_monday(),
        morning: sample_dt.hour() < 12,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub sample_idx: SampleId,
    pub values: Vec<Value>,
}

/// Model-ready table, one row per sample keyed by `sample_idx`
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    /// Column names after `sample_idx`
    pub columns: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn get(&self, sample_idx: SampleId, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows
            .iter()
            .find(|row| row.sample_idx == sample_idx)
            .and_then(|row| row.values.get(index))
    }

    /// Adds a `{parameter}_status` column (below/within/above the required
    /// range) for every water-quality measurement present in the table
    pub fn with_range_labels(mut self) -> Result<Self, ReshapeError> {
        let period_col = self.column_index(PERIOD_ATTRIBUTE);
        let morning_col = self.column_index("morning");

        for parameter in WaterQualityParameter::ALL {
            let Some(value_col) = self.column_index(parameter.column()) else {
                continue;
            };
            let mut statuses = Vec::with_capacity(self.rows.len());
            for row in &self.rows {
                let period = match period_col.map(|c| &row.values[c]) {
                    Some(Value::Text(text)) => Some(text.parse::<Period>()?),
                    _ => match morning_col.map(|c| &row.values[c]) {
                        Some(Value::Bool(morning)) => Some(Period::from_morning(*morning)),
                        _ => None,
                    },
                };
                let status = row.values[value_col]
                    .as_f64()
                    .and_then(|v| classify(parameter, v, period, RangeKind::Required));
                statuses.push(status.map_or(Value::Null, |s| Value::Text(s.to_string())));
            }

            self.columns.push(format!("{}_status", parameter.column()));
            for (row, status) in self.rows.iter_mut().zip(statuses) {
                row.values.push(status);
            }
        }
        Ok(self)
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), ReshapeError> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(std::iter::once("sample_idx").chain(self.columns.iter().map(String::as_str)))?;
        for row in &self.rows {
            wtr.write_record(
                std::iter::once(row.sample_idx.to_string())
                    .chain(row.values.iter().map(|v| v.to_string())),
            )?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ReshapeError> {
        self.write_csv(File::create(path)?)
    }
}

/// Left joins the pivoted forecasts onto the samples by `sample_idx` and
/// appends the time categoricals. Samples without forecasts keep empty cells.
pub fn merge_samples(samples: &[Sample], wide: &WideTable) -> Result<FeatureTable, ReshapeError> {
    let attribute_names: Vec<String> = samples
        .iter()
        .flat_map(|s| s.attributes.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let forecast_columns = wide.column_names();

    let columns: Vec<String> = SAMPLE_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(attribute_names.iter().cloned())
        .chain(forecast_columns.iter().cloned())
        .chain(TIME_COLUMNS.iter().map(|c| c.to_string()))
        .collect();

    let mut rows = Vec::with_capacity(samples.len());
    for sample in samples {
        let mut values = Vec::with_capacity(columns.len());
        values.push(sample.pond_id.clone().map_or(Value::Null, Value::Text));
        values.push(Value::Number(sample.location.latitude));
        values.push(Value::Number(sample.location.longitude));
        values.push(Value::Text(sample.sample_dt.format(&Rfc3339)?));
        values.extend(
            attribute_names
                .iter()
                .map(|name| sample.attributes.get(name).cloned().unwrap_or(Value::Null)),
        );
        match wide.row(sample.sample_idx) {
            Some(cells) => values.extend(cells.iter().cloned()),
            None => values.extend(std::iter::repeat(Value::Null).take(forecast_columns.len())),
        }

        let time = derive_time_categoricals(sample.sample_dt);
        values.push(Value::Integer(i64::from(time.month)));
        values.push(Value::Integer(i64::from(time.week_of_month)));
        values.push(Value::Integer(i64::from(time.day_of_week)));
        values.push(Value::Bool(time.morning));

        rows.push(FeatureRow {
            sample_idx: sample.sample_idx,
            values,
        });
    }

    Ok(FeatureTable { columns, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{pivot, ForecastLabel, GeoPoint, LongRow, LongTable};
    use std::collections::BTreeMap;
    use time::macros::datetime;

    fn samples() -> Vec<Sample> {
        vec![
            Sample::new(1, GeoPoint::new(16.5, 80.5), datetime!(2024-06-15 9:00 +5:30))
                .with_pond("AR01")
                .with_attribute("do_mg_per_L", Value::Number(6.2)),
            Sample::new(2, GeoPoint::new(16.6, 80.4), datetime!(2024-06-16 18:30 +5:30))
                .with_attribute("do_mg_per_L", Value::Number(9.0))
                .with_attribute("ph", Value::Number(9.1)),
        ]
    }

    fn wide() -> WideTable {
        let table = LongTable::new(
            vec!["rain".into()],
            vec![LongRow {
                sample_idx: SampleId(1),
                forecast_time: ForecastLabel::Lead(8),
                forecast_creation_dt: None,
                forecast_hour: None,
                n_forecasts: 1,
                values: BTreeMap::from([("rain".to_string(), Some(1.5))]),
            }],
        );
        pivot(&table).unwrap()
    }

    #[test]
    fn derives_calendar_fields_in_local_time() {
        // Saturday, ISO week 24
        let time = derive_time_categoricals(datetime!(2024-06-15 9:00 +5:30));
        assert_eq!(
            time,
            TimeCategoricals {
                month: 6,
                week_of_month: 24,
                day_of_week: 5,
                morning: true,
            }
        );
        // same instant, the offset carried by the value decides
        let utc = datetime!(2024-06-15 8:00 UTC);
        assert!(derive_time_categoricals(utc).morning);
        assert!(!derive_time_categoricals(utc.to_offset(time::macros::offset!(+5:30))).morning);
    }

    #[test]
    fn left_joins_forecasts_onto_samples() {
        let table = merge_samples(&samples(), &wide()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(SampleId(1), "rain_8"), Some(&Value::Number(1.5)));
        assert_eq!(table.get(SampleId(2), "rain_8"), Some(&Value::Null));
        assert_eq!(table.get(SampleId(2), "ph"), Some(&Value::Number(9.1)));
        assert_eq!(table.get(SampleId(1), "ph"), Some(&Value::Null));
        assert_eq!(table.get(SampleId(2), "morning"), Some(&Value::Bool(false)));
        assert_eq!(table.get(SampleId(1), "pond_id"), Some(&Value::Text("AR01".into())));
    }

    #[test]
    fn labels_measurements_against_required_ranges() {
        let table = merge_samples(&samples(), &wide())
            .unwrap()
            .with_range_labels()
            .unwrap();
        let status = |id: u64, column: &str| table.get(SampleId(id), column).cloned();

        assert_eq!(status(1, "do_mg_per_L_status"), Some(Value::Text("above".into())));
        assert_eq!(status(2, "do_mg_per_L_status"), Some(Value::Text("within".into())));
        assert_eq!(status(2, "ph_status"), Some(Value::Text("above".into())));
        assert_eq!(status(1, "ph_status"), Some(Value::Null));
        assert!(table.column_index("turbidity_cm_status").is_none());
    }

    #[test]
    fn recorded_period_overrides_clock() {
        let samples = vec![
            Sample::new(1, GeoPoint::new(16.5, 80.5), datetime!(2024-06-15 9:00 +5:30))
                .with_attribute("do_mg_per_L", Value::Number(9.0))
                .with_attribute(PERIOD_ATTRIBUTE, Value::Text("evening".into())),
        ];
        let table = merge_samples(&samples, &wide()).unwrap().with_range_labels().unwrap();
        assert_eq!(
            table.get(SampleId(1), "do_mg_per_L_status"),
            Some(&Value::Text("within".into()))
        );

        let bad = vec![samples[0]
            .clone()
            .with_attribute(PERIOD_ATTRIBUTE, Value::Text("midnight".into()))];
        assert!(merge_samples(&bad, &wide()).unwrap().with_range_labels().is_err());
    }

    #[test]
    fn writes_one_line_per_sample() {
        let table = merge_samples(&samples(), &wide()).unwrap();
        let mut buffer = Vec::new();
        table.write_csv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("sample_idx,pond_id,latitude,longitude,sample_dt,do_mg_per_L,ph,"));
        assert!(header.ends_with("month,week_of_month,day_of_week,morning"));
        assert_eq!(lines.count(), 2);
    }
}
