//! Preprocessing stages applied before the classifier.
//!
//! Two stages exist: a [`ColumnEncoder`] (numeric passthrough plus ordinal
//! encoding of categorical columns) for the demographic pipeline, and a
//! [`StandardScaler`] for the survey pipeline. Both turn a typed
//! [`FeatureTable`] into the dense `f64` matrix the trees were trained on.
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{AttritionError, Result};
use crate::normalize::{FeatureTable, FeatureValue};
use crate::schema::InputField;

/// Encoded value for a category the encoder never saw.
pub const UNKNOWN_CATEGORY: f64 = -1.0;

pub trait PreprocessingStage: Send + Sync + std::fmt::Debug {
    /// Raw fields the stage consumes, in column order.
    fn input_fields(&self) -> Vec<InputField>;

    /// Names of the produced feature columns.
    fn feature_names_out(&self) -> Vec<String>;

    fn transform(&self, table: &FeatureTable) -> Result<Array2<f64>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalColumn {
    pub name: String,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnEncoder {
    pub numeric: Vec<String>,
    pub categorical: Vec<CategoricalColumn>,
}

impl ColumnEncoder {
    pub fn new(numeric: Vec<String>, categorical: Vec<CategoricalColumn>) -> anyhow::Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for name in numeric.iter().chain(categorical.iter().map(|c| &c.name)) {
            if !seen.insert(name.as_str()) {
                anyhow::bail!("column '{}' is listed more than once in the encoder", name);
            }
        }
        if let Some(col) = categorical.iter().find(|c| c.categories.is_empty()) {
            anyhow::bail!("categorical column '{}' has no categories", col.name);
        }
        Ok(Self { numeric, categorical })
    }

    fn encode(&self, row: usize, col: usize, value: &FeatureValue) -> Result<f64> {
        if col < self.numeric.len() {
            return value.as_f64().ok_or_else(|| {
                AttritionError::Computation(format!(
                    "row {}: column '{}' expected a numeric value",
                    row, self.numeric[col]
                ))
            });
        }
        let column = &self.categorical[col - self.numeric.len()];
        let label = value.as_category().ok_or_else(|| {
            AttritionError::Computation(format!(
                "row {}: column '{}' expected a category label",
                row, column.name
            ))
        })?;
        Ok(column
            .categories
            .iter()
            .position(|c| c == label)
            .map(|p| p as f64)
            .unwrap_or(UNKNOWN_CATEGORY))
    }
}

impl PreprocessingStage for ColumnEncoder {
    fn input_fields(&self) -> Vec<InputField> {
        self.numeric
            .iter()
            .map(|n| InputField::numeric(n.clone(), None))
            .chain(
                self.categorical
                    .iter()
                    .map(|c| InputField::categorical(c.name.clone(), c.categories.clone())),
            )
            .collect()
    }

    fn feature_names_out(&self) -> Vec<String> {
        self.numeric
            .iter()
            .map(|n| format!("num__{}", n))
            .chain(self.categorical.iter().map(|c| format!("cat__{}", c.name)))
            .collect()
    }

    fn transform(&self, table: &FeatureTable) -> Result<Array2<f64>> {
        let ncols = self.numeric.len() + self.categorical.len();
        check_width(table, ncols)?;

        let mut out = Vec::with_capacity(table.nrows() * ncols);
        for (r, row) in table.values.rows().into_iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                out.push(self.encode(r, c, value)?);
            }
        }
        Ok(Array2::from_shape_vec((table.nrows(), ncols), out)?)
    }
}

/// Per-column standardization `(x - mean) / scale`.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    pub features: Vec<String>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
    /// Bounds attached to the consumed fields.
    pub input_range: Option<(f64, f64)>,
}

impl StandardScaler {
    pub fn new(features: Vec<String>, mean: Vec<f64>, scale: Vec<f64>) -> anyhow::Result<Self> {
        if mean.len() != features.len() || scale.len() != features.len() {
            anyhow::bail!(
                "scaler has {} features but {} means and {} scales",
                features.len(),
                mean.len(),
                scale.len()
            );
        }
        if mean.iter().chain(scale.iter()).any(|v| !v.is_finite()) {
            anyhow::bail!("scaler parameters must be finite");
        }
        // A zero scale marks a constant training column.
        let scale = scale.into_iter().map(|s| if s == 0.0 { 1.0 } else { s }).collect();
        Ok(Self {
            features,
            mean,
            scale,
            input_range: None,
        })
    }

    pub fn with_input_range(mut self, range: (f64, f64)) -> Self {
        self.input_range = Some(range);
        self
    }
}

impl PreprocessingStage for StandardScaler {
    fn input_fields(&self) -> Vec<InputField> {
        self.features
            .iter()
            .map(|f| InputField::numeric(f.clone(), self.input_range))
            .collect()
    }

    fn feature_names_out(&self) -> Vec<String> {
        self.features.clone()
    }

    fn transform(&self, table: &FeatureTable) -> Result<Array2<f64>> {
        let ncols = self.features.len();
        check_width(table, ncols)?;

        let mut out = Vec::with_capacity(table.nrows() * ncols);
        for (r, row) in table.values.rows().into_iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                let x = value.as_f64().ok_or_else(|| {
                    AttritionError::Computation(format!(
                        "row {}: column '{}' expected a numeric value",
                        r, self.features[c]
                    ))
                })?;
                out.push((x - self.mean[c]) / self.scale[c]);
            }
        }
        Ok(Array2::from_shape_vec((table.nrows(), ncols), out)?)
    }
}

fn check_width(table: &FeatureTable, expected: usize) -> Result<()> {
    if table.ncols() != expected {
        return Err(AttritionError::Computation(format!(
            "feature table has {} columns, preprocessing expects {}",
            table.ncols(),
            expected
        )));
    }
    Ok(())
}
