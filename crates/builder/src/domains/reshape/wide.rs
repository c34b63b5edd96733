use crate::{validate_counts, ForecastLabel, LongRow, LongTable, ReshapeError, SampleId, Value};
use std::collections::BTreeMap;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Per-row fields that are not forecast variables, in column order
pub const META_FIELDS: [&str; 3] = ["forecast_creation_dt", "forecast_hour", "n_forecasts"];

/// The long table pivoted to one row per sample. Cells are stored field
/// major: every label of the first field, then every label of the next.
#[derive(Debug, Clone, PartialEq)]
pub struct WideTable {
    pub fields: Vec<String>,
    pub labels: Vec<ForecastLabel>,
    pub rows: BTreeMap<SampleId, Vec<Value>>,
}

impl WideTable {
    pub fn column_name(field: &str, label: &ForecastLabel) -> String {
        format!("{}_{}", field, label)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.fields
            .iter()
            .flat_map(|field| {
                self.labels
                    .iter()
                    .map(move |label| WideTable::column_name(field, label))
            })
            .collect()
    }

    pub fn variables(&self) -> &[String] {
        &self.fields[META_FIELDS.len()..]
    }

    pub fn row(&self, sample_idx: SampleId) -> Option<&[Value]> {
        self.rows.get(&sample_idx).map(Vec::as_slice)
    }

    fn cell<'a>(&self, cells: &'a [Value], field: usize, label: usize) -> &'a Value {
        &cells[field * self.labels.len() + label]
    }

    /// Back to one row per (sample, label), sorted
    pub fn unpivot(&self) -> Result<LongTable, ReshapeError> {
        let mut rows = Vec::with_capacity(self.rows.len() * self.labels.len());
        for (sample_idx, cells) in &self.rows {
            let invalid = |field: &str, label: &ForecastLabel| ReshapeError::InvalidCell {
                sample_idx: *sample_idx,
                column: WideTable::column_name(field, label),
            };

            for (l, label) in self.labels.iter().enumerate() {
                let forecast_creation_dt = match self.cell(cells, 0, l) {
                    Value::Null => None,
                    Value::Text(raw) => Some(OffsetDateTime::parse(raw, &Rfc3339)?),
                    _ => return Err(invalid(META_FIELDS[0], label)),
                };
                let forecast_hour = match self.cell(cells, 1, l) {
                    Value::Null => None,
                    Value::Integer(hour) => Some(*hour),
                    _ => return Err(invalid(META_FIELDS[1], label)),
                };
                let n_forecasts = match self.cell(cells, 2, l) {
                    Value::Integer(n) => u32::try_from(*n).map_err(|_| invalid(META_FIELDS[2], label))?,
                    _ => return Err(invalid(META_FIELDS[2], label)),
                };

                let mut values = BTreeMap::new();
                for (offset, variable) in self.variables().iter().enumerate() {
                    let cell = self.cell(cells, META_FIELDS.len() + offset, l);
                    let value = match cell {
                        Value::Null => None,
                        other => Some(other.as_f64().ok_or_else(|| invalid(variable, label))?),
                    };
                    values.insert(variable.clone(), value);
                }

                rows.push(LongRow {
                    sample_idx: *sample_idx,
                    forecast_time: *label,
                    forecast_creation_dt,
                    forecast_hour,
                    n_forecasts,
                    values,
                });
            }
        }

        let mut table = LongTable::new(self.variables().to_vec(), rows);
        table.sort();
        Ok(table)
    }
}

/// Validates the long table, then pivots it to one row per sample with a
/// `{field}_{label}` column for every field and label
pub fn pivot(table: &LongTable) -> Result<WideTable, ReshapeError> {
    let labels = validate_counts(table)?;
    let fields: Vec<String> = META_FIELDS
        .iter()
        .map(|f| f.to_string())
        .chain(table.variables.iter().cloned())
        .collect();
    let label_pos: BTreeMap<ForecastLabel, usize> =
        labels.iter().enumerate().map(|(i, l)| (*l, i)).collect();

    let width = fields.len() * labels.len();
    let mut rows: BTreeMap<SampleId, Vec<Value>> = BTreeMap::new();
    for row in &table.rows {
        let cells = rows
            .entry(row.sample_idx)
            .or_insert_with(|| vec![Value::Null; width]);
        let l = label_pos[&row.forecast_time];

        cells[l] = match row.forecast_creation_dt {
            Some(dt) => Value::Text(dt.format(&Rfc3339)?),
            None => Value::Null,
        };
        cells[labels.len() + l] = row.forecast_hour.map_or(Value::Null, Value::Integer);
        cells[2 * labels.len() + l] = Value::Integer(i64::from(row.n_forecasts));
        for (offset, variable) in table.variables.iter().enumerate() {
            let value = row.values.get(variable).copied().flatten();
            cells[(META_FIELDS.len() + offset) * labels.len() + l] = Value::from(value);
        }
    }

    Ok(WideTable {
        fields,
        labels,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AggregateKind;
    use time::macros::datetime;

    fn long_table() -> LongTable {
        let labels = [
            ForecastLabel::Lead(-9),
            ForecastLabel::Lead(8),
            ForecastLabel::Sample,
            ForecastLabel::Aggregate(AggregateKind::CumulativeDays(3)),
        ];
        let mut rows = Vec::new();
        for sample in [2u64, 9] {
            for (i, label) in labels.iter().enumerate() {
                let point = !matches!(label, ForecastLabel::Aggregate(_));
                let found = !(sample == 9 && i == 1);
                rows.push(LongRow {
                    sample_idx: SampleId(sample),
                    forecast_time: *label,
                    forecast_creation_dt: (point && found).then_some(datetime!(2024-06-13 18:00 UTC)),
                    forecast_hour: (point && found).then_some(i as i64 + 2),
                    n_forecasts: if found { 1 } else { 0 },
                    values: BTreeMap::from([
                        ("rain".to_string(), found.then_some(sample as f64 / 4.0)),
                        ("temp".to_string(), found.then_some(300.0 + i as f64)),
                    ]),
                });
            }
        }
        LongTable::new(vec!["rain".into(), "temp".into()], rows)
    }

    #[test]
    fn names_columns_field_then_label() {
        let wide = pivot(&long_table()).unwrap();
        let columns = wide.column_names();
        assert_eq!(columns.len(), 5 * 4);
        assert_eq!(columns[0], "forecast_creation_dt_-9");
        assert_eq!(columns[4], "forecast_hour_-9");
        assert_eq!(columns[11], "n_forecasts_three_day_cum");
        assert_eq!(columns[14], "rain_sample");
        assert_eq!(columns[19], "temp_three_day_cum");
        assert_eq!(wide.rows.len(), 2);

        let row = wide.row(SampleId(9)).unwrap();
        assert_eq!(row[9], Value::Integer(0));
        assert_eq!(row[13], Value::Null);
        assert_eq!(row[12], Value::Number(2.25));
    }

    #[test]
    fn pivot_then_unpivot_restores_the_long_table() {
        let original = long_table();
        let restored = pivot(&original).unwrap().unpivot().unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn refuses_to_pivot_ragged_tables() {
        let mut table = long_table();
        table.rows.pop();
        assert!(matches!(
            pivot(&table),
            Err(ReshapeError::UnequalObservations { .. })
        ));
    }
}
