use crate::{ExportError, ForecastLabel, LongTable, SampleId, WaterQualityError};
use std::collections::{BTreeMap, BTreeSet};

#[derive(thiserror::Error, Debug)]
pub enum ReshapeError {
    #[error("Number of observations per sample varies: sample {sample_idx} has {found}, expected {expected}")]
    UnequalObservations {
        sample_idx: SampleId,
        expected: usize,
        found: usize,
    },
    #[error("Sample {0} has a different set of forecast labels than the others")]
    LabelMismatch(SampleId),
    #[error("Sample {0} has more than one '{1}' row")]
    DuplicateRow(SampleId, ForecastLabel),
    #[error("Column {column} of sample {sample_idx} holds an unexpected value")]
    InvalidCell { sample_idx: SampleId, column: String },
    #[error("Failed to parse time string: {0}")]
    InvalidTime(#[from] time::error::Parse),
    #[error("Failed to format time string: {0}")]
    TimeFormat(#[from] time::error::Format),
    #[error("Failed to write feature table: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to write feature table: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    WaterQuality(#[from] WaterQualityError),
}

/// Checks that every sample carries the same labels exactly once. Returns the
/// shared label set in order.
pub fn validate_counts(table: &LongTable) -> Result<Vec<ForecastLabel>, ReshapeError> {
    let mut per_sample: BTreeMap<SampleId, BTreeSet<ForecastLabel>> = BTreeMap::new();
    let mut counts: BTreeMap<SampleId, usize> = BTreeMap::new();
    for row in &table.rows {
        *counts.entry(row.sample_idx).or_default() += 1;
        per_sample
            .entry(row.sample_idx)
            .or_default()
            .insert(row.forecast_time);
    }

    let Some((first_idx, expected)) = counts.iter().next().map(|(k, v)| (*k, *v)) else {
        return Ok(Vec::new());
    };
    if let Some((sample_idx, found)) = counts.iter().find(|(_, found)| **found != expected) {
        return Err(ReshapeError::UnequalObservations {
            sample_idx: *sample_idx,
            expected,
            found: *found,
        });
    }

    let reference = &per_sample[&first_idx];
    for (sample_idx, labels) in &per_sample {
        if labels.len() != counts[sample_idx] {
            // same count but a label shows up twice
            let duplicate = duplicate_label(table, *sample_idx)
                .ok_or(ReshapeError::LabelMismatch(*sample_idx))?;
            return Err(ReshapeError::DuplicateRow(*sample_idx, duplicate));
        }
        if labels != reference {
            return Err(ReshapeError::LabelMismatch(*sample_idx));
        }
    }

    Ok(reference.iter().copied().collect())
}

fn duplicate_label(table: &LongTable, sample_idx: SampleId) -> Option<ForecastLabel> {
    let mut seen = BTreeSet::new();
    table
        .rows
        .iter()
        .filter(|row| row.sample_idx == sample_idx)
        .map(|row| row.forecast_time)
        .find(|label| !seen.insert(*label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LongRow;
    use std::collections::BTreeMap;

    fn row(sample: u64, label: ForecastLabel) -> LongRow {
        LongRow {
            sample_idx: SampleId(sample),
            forecast_time: label,
            forecast_creation_dt: None,
            forecast_hour: None,
            n_forecasts: 0,
            values: BTreeMap::new(),
        }
    }

    fn leads(sample: u64, hours: &[i64]) -> Vec<LongRow> {
        hours
            .iter()
            .map(|h| row(sample, ForecastLabel::Lead(*h)))
            .collect()
    }

    #[test]
    fn rejects_unequal_row_counts() {
        let mut rows = leads(1, &[1, 2, 3, 4, 5, 6, 7, 8]);
        rows.extend(leads(2, &[1, 2, 3, 4, 5, 6, 7]));
        let table = LongTable::new(vec![], rows);
        match validate_counts(&table) {
            Err(ReshapeError::UnequalObservations {
                sample_idx,
                expected,
                found,
            }) => {
                assert_eq!(sample_idx, SampleId(2));
                assert_eq!(expected, 8);
                assert_eq!(found, 7);
            }
            other => panic!("expected unequal observations, got {:?}", other),
        }
    }

    #[test]
    fn rejects_mismatched_and_duplicate_labels() {
        let mut rows = leads(1, &[8, 15]);
        rows.extend(leads(2, &[8, 21]));
        assert!(matches!(
            validate_counts(&LongTable::new(vec![], rows)),
            Err(ReshapeError::LabelMismatch(SampleId(2)))
        ));

        let mut rows = leads(1, &[8, 15]);
        rows.extend(leads(2, &[8, 8]));
        assert!(matches!(
            validate_counts(&LongTable::new(vec![], rows)),
            Err(ReshapeError::DuplicateRow(SampleId(2), ForecastLabel::Lead(8)))
        ));
    }

    #[test]
    fn returns_shared_labels_in_order() {
        let mut rows = leads(1, &[15, -9]);
        rows.push(row(1, ForecastLabel::Sample));
        rows.extend(leads(2, &[-9, 15]));
        rows.push(row(2, ForecastLabel::Sample));
        let labels = validate_counts(&LongTable::new(vec![], rows)).unwrap();
        assert_eq!(
            labels,
            vec![
                ForecastLabel::Lead(-9),
                ForecastLabel::Lead(15),
                ForecastLabel::Sample
            ]
        );
        assert!(validate_counts(&LongTable::default()).unwrap().is_empty());
    }
}
