//! Tabular (CSV/TSV) record readers.
//!
//! [`read_reference_records`] is lenient and feeds the baseline sample.
//! [`read_request_records`] is strict: every column and cell is passed on
//! untouched so request validation sees exactly what the file holds.
use std::fs::File;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use csv::{Reader, StringRecord};

use crate::normalize::{FieldValue, InputRecord};
use crate::schema::{FeatureSchema, FieldKind, FieldSlot};

fn open_table(path: &Path) -> Result<(Reader<File>, StringRecord)> {
    let delimiter = match path.extension().and_then(|ext| ext.to_str()) {
        Some("tsv") => b'\t',
        _ => b',',
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open table: {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header row of {}", path.display()))?
        .clone();
    Ok((reader, headers))
}

/// Read a CSV (or `.tsv`) of historical records into input records for
/// `schema`. Columns the schema does not know (labels, precomputed scores)
/// are skipped; empty cells are left out of the record.
pub fn read_reference_records<P: AsRef<Path>>(path: P, schema: &FeatureSchema) -> Result<Vec<InputRecord>> {
    let path = path.as_ref();
    let (mut reader, headers) = open_table(path)?;
    let columns = resolve_columns(&headers, schema);

    let mapped = columns.iter().filter(|c| c.is_some()).count();
    if mapped == 0 {
        return Err(anyhow!(
            "Reference data {} has no columns matching the {} schema",
            path.display(),
            schema.variant
        ));
    }
    log::debug!(
        "Reference data {}: {} of {} columns mapped to the {} schema",
        path.display(),
        mapped,
        headers.len(),
        schema.variant
    );

    let mut records = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let row = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;
        let mut record = InputRecord::new();
        for (col, slot) in columns.iter().enumerate() {
            let Some(slot) = slot else { continue };
            let raw = row.get(col).unwrap_or_default();
            if raw.is_empty() {
                continue;
            }
            let value = match slot {
                FieldSlot::Feature(idx) => match &schema.input_fields[*idx].kind {
                    FieldKind::Numeric { .. } => FieldValue::Numeric(raw.parse::<f64>().with_context(|| {
                        format!(
                            "Invalid numeric value '{}' for '{}' at row {}",
                            raw,
                            headers.get(col).unwrap_or(""),
                            row_idx + 1
                        )
                    })?),
                    FieldKind::Categorical { .. } => FieldValue::Text(raw.to_string()),
                },
                FieldSlot::Identifier(_) => FieldValue::Text(raw.to_string()),
            };
            record.insert(headers.get(col).unwrap_or_default().to_string(), value);
        }
        records.push(record);
    }

    Ok(records)
}

/// Read a request batch from a CSV (or `.tsv`) table, one record per row.
///
/// Every column is kept under its header, unknown ones included. Empty
/// cells become `Null`. Cells of numeric fields become numbers when they
/// parse and text otherwise; the rest stay text. Rejecting anything is left
/// to [`crate::normalize::normalize`], which reports the record index and
/// field.
pub fn read_request_records<P: AsRef<Path>>(path: P, schema: &FeatureSchema) -> Result<Vec<InputRecord>> {
    let path = path.as_ref();
    let (mut reader, headers) = open_table(path)?;
    let numeric: Vec<bool> = headers
        .iter()
        .map(|h| match schema.resolve_field(h) {
            Some(FieldSlot::Feature(idx)) => matches!(schema.input_fields[idx].kind, FieldKind::Numeric { .. }),
            _ => false,
        })
        .collect();

    let mut records = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let row = result.with_context(|| format!("Failed to read row {} of {}", row_idx + 1, path.display()))?;
        let mut record = InputRecord::new();
        for (col, header) in headers.iter().enumerate() {
            let raw = row.get(col).unwrap_or_default();
            let value = if raw.is_empty() {
                FieldValue::Null
            } else if numeric[col] {
                raw.parse::<f64>()
                    .map(FieldValue::Numeric)
                    .unwrap_or_else(|_| FieldValue::Text(raw.to_string()))
            } else {
                FieldValue::Text(raw.to_string())
            };
            record.insert(header.to_string(), value);
        }
        records.push(record);
    }
    Ok(records)
}

fn resolve_columns(headers: &StringRecord, schema: &FeatureSchema) -> Vec<Option<FieldSlot>> {
    headers
        .iter()
        .map(|header| {
            let slot = schema.resolve_field(header);
            if slot.is_none() {
                log::debug!("Ignoring reference column '{}'", header);
            }
            slot
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AttritionError;

    fn schema() -> FeatureSchema {
        FeatureSchema::demographic(
            &["Age".to_string()],
            &[("Overtime".to_string(), vec!["No".to_string(), "Yes".to_string()])],
        )
    }

    #[test]
    fn reads_known_columns_and_skips_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ref.csv");
        std::fs::write(
            &path,
            "Employee ID,Age,Overtime,Attrition\n7,31,Yes,1\n8,,No,0\n",
        )
        .unwrap();

        let records = read_reference_records(&path, &schema()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["Age"], FieldValue::Numeric(31.0));
        assert_eq!(records[0]["Employee ID"], FieldValue::Text("7".into()));
        assert!(!records[0].contains_key("Attrition"));
        assert!(!records[1].contains_key("Age"));
    }

    #[test]
    fn rejects_unparseable_numbers_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.tsv");
        std::fs::write(&path, "Age\tOvertime\nold\tYes\n").unwrap();
        let err = read_reference_records(&path, &schema()).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid numeric value 'old' for 'Age' at row 1"));

        let path = dir.path().join("other.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();
        assert!(read_reference_records(&path, &schema()).is_err());
    }

    #[test]
    fn request_table_keeps_every_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.csv");
        std::fs::write(&path, "Employee ID,Age,Overtime,Agee\n7,31,Yes,30\n8,five,,\n").unwrap();

        let records = read_request_records(&path, &schema()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["Age"], FieldValue::Numeric(31.0));
        assert_eq!(records[0]["Overtime"], FieldValue::Text("Yes".into()));
        assert_eq!(records[0]["Agee"], FieldValue::Text("30".into()));
        assert_eq!(records[1]["Age"], FieldValue::Text("five".into()));
        assert_eq!(records[1]["Overtime"], FieldValue::Null);
    }

    #[test]
    fn request_table_problems_surface_as_validation_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.csv");
        std::fs::write(&path, "Age,Overtime\n31,Yes\nfive,No\n").unwrap();
        let records = read_request_records(&path, &schema()).unwrap();
        let err = crate::normalize::normalize(&records, &schema()).unwrap_err();
        assert_eq!(err, AttritionError::validation(1, "Age", "expected a number"));

        std::fs::write(&path, "Age,Overtime,Agee\n31,Yes,30\n").unwrap();
        let records = read_request_records(&path, &schema()).unwrap();
        let err = crate::normalize::normalize(&records, &schema()).unwrap_err();
        assert_eq!(err, AttritionError::validation(0, "Agee", "is not a recognised field"));
    }
}
