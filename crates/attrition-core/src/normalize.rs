//! Request normalization: raw records into a schema-aligned feature table.
//!
//! Validation is all-or-nothing. The first offending record aborts the call
//! with a [`AttritionError::Validation`] naming the record index and field;
//! no partial table is ever produced.
use std::collections::BTreeMap;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{AttritionError, Result};
use crate::schema::{FeatureSchema, FieldKind, FieldSlot, UNKNOWN_ID};

/// A loosely typed value as it arrives on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Numeric(f64),
    Text(String),
    Null,
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Numeric(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

/// One input record: field name to value.
pub type InputRecord = BTreeMap<String, FieldValue>;

/// Identifier fields of one record, keyed by canonical identifier name.
pub type Identifiers = BTreeMap<String, String>;

/// A validated, typed cell of the feature table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Numeric(f64),
    Category(String),
}

impl FeatureValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Numeric(v) => Some(*v),
            FeatureValue::Category(_) => None,
        }
    }

    pub fn as_category(&self) -> Option<&str> {
        match self {
            FeatureValue::Category(c) => Some(c),
            FeatureValue::Numeric(_) => None,
        }
    }
}

/// Records aligned to a schema's input fields (rows are records).
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    pub fields: Vec<String>,
    pub values: Array2<FeatureValue>,
}

impl FeatureTable {
    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }
}

/// Output of [`normalize`]: identifiers and features, both in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBatch {
    pub identifiers: Vec<Identifiers>,
    pub table: FeatureTable,
}

/// Validate `records` against `schema` and build the feature table.
pub fn normalize(records: &[InputRecord], schema: &FeatureSchema) -> Result<NormalizedBatch> {
    let n_fields = schema.input_fields.len();
    let mut cells = Vec::with_capacity(records.len() * n_fields);
    let mut identifiers = Vec::with_capacity(records.len());

    for (idx, record) in records.iter().enumerate() {
        let (ids, row) = normalize_record(idx, record, schema)?;
        identifiers.push(ids);
        cells.extend(row);
    }

    let values = Array2::from_shape_vec((records.len(), n_fields), cells)?;
    log::debug!(
        "Normalized {} {} record(s) into a {}x{} feature table",
        records.len(),
        schema.variant,
        values.nrows(),
        values.ncols()
    );

    Ok(NormalizedBatch {
        identifiers,
        table: FeatureTable {
            fields: schema.input_fields.iter().map(|f| f.name.clone()).collect(),
            values,
        },
    })
}

fn normalize_record(
    idx: usize,
    record: &InputRecord,
    schema: &FeatureSchema,
) -> Result<(Identifiers, Vec<FeatureValue>)> {
    let mut slots: Vec<Option<FeatureValue>> = vec![None; schema.input_fields.len()];
    let mut ids: Vec<Option<String>> = vec![None; schema.id_fields.len()];

    for (key, value) in record {
        match schema.resolve_field(key) {
            Some(FieldSlot::Feature(col)) => {
                let field = &schema.input_fields[col];
                if slots[col].is_some() {
                    return Err(AttritionError::validation(
                        idx,
                        &field.name,
                        format!("is given more than once (duplicate key '{}')", key),
                    ));
                }
                slots[col] = Some(coerce(idx, &field.name, &field.kind, value)?);
            }
            Some(FieldSlot::Identifier(col)) => {
                let name = &schema.id_fields[col].name;
                if ids[col].is_some() {
                    return Err(AttritionError::validation(
                        idx,
                        name,
                        format!("is given more than once (duplicate key '{}')", key),
                    ));
                }
                ids[col] = render_identifier(value);
            }
            None => {
                return Err(AttritionError::validation(idx, key, "is not a recognised field"));
            }
        }
    }

    let mut row = Vec::with_capacity(slots.len());
    for (field, slot) in schema.input_fields.iter().zip(slots) {
        match slot {
            Some(v) => row.push(v),
            None => return Err(AttritionError::validation(idx, &field.name, "is missing")),
        }
    }

    let identifiers = schema
        .id_fields
        .iter()
        .zip(ids)
        .map(|(f, v)| (f.name.clone(), v.unwrap_or_else(|| UNKNOWN_ID.to_string())))
        .collect();

    Ok((identifiers, row))
}

fn coerce(idx: usize, field: &str, kind: &FieldKind, value: &FieldValue) -> Result<FeatureValue> {
    match (kind, value) {
        (_, FieldValue::Null) => Err(AttritionError::validation(idx, field, "is missing")),
        (FieldKind::Numeric { range }, FieldValue::Numeric(v)) => {
            if !v.is_finite() {
                return Err(AttritionError::validation(idx, field, "must be a finite number"));
            }
            if let Some((lo, hi)) = range {
                if *v < *lo || *v > *hi {
                    return Err(AttritionError::validation(
                        idx,
                        field,
                        format!("must be between {} and {}, got {}", lo, hi, v),
                    ));
                }
            }
            Ok(FeatureValue::Numeric(*v))
        }
        (FieldKind::Numeric { .. }, _) => {
            Err(AttritionError::validation(idx, field, "expected a number"))
        }
        (FieldKind::Categorical { .. }, FieldValue::Text(s)) => {
            Ok(FeatureValue::Category(s.trim().to_string()))
        }
        (FieldKind::Categorical { categories }, FieldValue::Flag(b)) => {
            let label = if *b { "Yes" } else { "No" };
            if categories.iter().any(|c| c == label) {
                Ok(FeatureValue::Category(label.to_string()))
            } else {
                Err(AttritionError::validation(idx, field, "expected a category label"))
            }
        }
        (FieldKind::Categorical { .. }, FieldValue::Numeric(_)) => {
            Err(AttritionError::validation(idx, field, "expected a category label"))
        }
    }
}

fn render_identifier(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Null => None,
        FieldValue::Text(s) => Some(s.clone()),
        FieldValue::Flag(b) => Some(b.to_string()),
        FieldValue::Numeric(v) if v.fract() == 0.0 && v.abs() < 1e15 => Some(format!("{}", *v as i64)),
        FieldValue::Numeric(v) => Some(v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FeatureSchema;

    fn schema() -> FeatureSchema {
        FeatureSchema::demographic(
            &["Age".to_string(), "Years of experience".to_string()],
            &[("Overtime".to_string(), vec!["No".to_string(), "Yes".to_string()])],
        )
    }

    fn record(pairs: &[(&str, FieldValue)]) -> InputRecord {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn valid() -> InputRecord {
        record(&[
            ("Age", 30.0.into()),
            ("Years of experience", 4.0.into()),
            ("Overtime", "Yes".into()),
        ])
    }

    #[test]
    fn builds_table_in_schema_order() {
        let batch = normalize(&[valid()], &schema()).unwrap();
        assert_eq!(batch.table.values.shape(), &[1, 3]);
        assert_eq!(batch.table.values[[0, 0]], FeatureValue::Numeric(30.0));
        assert_eq!(batch.table.values[[0, 2]], FeatureValue::Category("Yes".into()));
        assert_eq!(batch.identifiers[0]["Employee ID"], "Unknown");
        assert_eq!(batch.identifiers[0]["Full Name"], "Unknown");
    }

    #[test]
    fn identifiers_are_rendered_and_aliases_accepted() {
        let mut r = valid();
        r.insert("EmployeeID".into(), FieldValue::Numeric(1042.0));
        r.insert("Full Name".into(), "Ada Lovelace".into());
        let batch = normalize(&[r], &schema()).unwrap();
        assert_eq!(batch.identifiers[0]["Employee ID"], "1042");
        assert_eq!(batch.identifiers[0]["Full Name"], "Ada Lovelace");
    }

    #[test]
    fn flag_maps_to_yes_no_category() {
        let mut r = valid();
        r.insert("Overtime".into(), FieldValue::Flag(false));
        let batch = normalize(&[r], &schema()).unwrap();
        assert_eq!(batch.table.values[[0, 2]].as_category(), Some("No"));
    }

    #[test]
    fn missing_field_names_record_and_field() {
        let mut bad = valid();
        bad.remove("Years of experience");
        let err = normalize(&[valid(), bad], &schema()).unwrap_err();
        assert_eq!(err, AttritionError::validation(1, "Years of experience", "is missing"));
    }

    #[test]
    fn mistyped_and_unknown_fields_rejected() {
        let mut r = valid();
        r.insert("Age".into(), "thirty".into());
        let err = normalize(&[r], &schema()).unwrap_err();
        assert!(matches!(err, AttritionError::Validation { record: 0, ref field, .. } if field == "Age"));

        let mut r = valid();
        r.insert("Attrition".into(), FieldValue::Numeric(1.0));
        let err = normalize(&[r], &schema()).unwrap_err();
        assert!(matches!(err, AttritionError::Validation { ref field, .. } if field == "Attrition"));
    }

    #[test]
    fn duplicate_via_alias_rejected() {
        let mut r = valid();
        r.insert("Years_of_experience".into(), FieldValue::Numeric(4.0));
        let err = normalize(&[r], &schema()).unwrap_err();
        assert!(matches!(err, AttritionError::Validation { ref field, .. } if field == "Years of experience"));
    }

    #[test]
    fn survey_answers_must_be_likert() {
        let survey = FeatureSchema::survey();
        let mut r: InputRecord = survey
            .input_fields
            .iter()
            .map(|f| (f.name.clone(), FieldValue::Numeric(3.0)))
            .collect();
        assert!(normalize(&[r.clone()], &survey).is_ok());
        r.insert("Job Satisfaction".into(), FieldValue::Numeric(6.0));
        let err = normalize(&[r], &survey).unwrap_err();
        assert!(err.to_string().contains("must be between 1 and 5"));
    }

    #[test]
    fn null_counts_as_missing_and_empty_batch_is_empty() {
        let mut r = valid();
        r.insert("Age".into(), FieldValue::Null);
        assert!(normalize(&[r], &schema()).is_err());

        let batch = normalize(&[], &schema()).unwrap();
        assert_eq!(batch.table.nrows(), 0);
        assert_eq!(batch.table.ncols(), 3);
    }

    #[test]
    fn record_deserializes_from_loose_json() {
        let r: InputRecord = serde_json::from_str(
            r#"{"Age": 30, "Years of experience": 4.5, "Overtime": true, "Full Name": null}"#,
        )
        .unwrap();
        assert_eq!(r["Age"], FieldValue::Numeric(30.0));
        assert_eq!(r["Overtime"], FieldValue::Flag(true));
        assert_eq!(r["Full Name"], FieldValue::Null);
    }
}
