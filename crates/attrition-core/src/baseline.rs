//! Precomputed population attribution sample per variant.
//!
//! Built once at startup from a bounded, seeded sample of reference records
//! and read-only afterwards. The visualization side renders summary and
//! dependence charts from it without recomputing attribution.
use anyhow::{anyhow, Context};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use statrs::statistics::Statistics;

use crate::error::{AttritionError, Result};
use crate::models::classifier_trait::ModelVariant;
use crate::normalize::{normalize, InputRecord};
use crate::schema::Variant;

/// Upper bound on the number of sampled records.
pub const MAX_BASELINE_SAMPLE: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaselineSample {
    pub variant: Variant,
    pub feature_names: Vec<String>,
    pub display_names: Vec<String>,
    /// Preprocessed features, one row per sampled record.
    pub feature_matrix: Array2<f64>,
    /// Contributions aligned with `feature_matrix`.
    pub attribution_matrix: Array2<f64>,
    pub base_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub display_name: String,
    pub mean_abs_contribution: f64,
    pub std_abs_contribution: f64,
}

/// One feature's values against its contributions across the sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependenceSeries {
    pub feature: String,
    pub display_name: String,
    pub values: Vec<f64>,
    pub contributions: Vec<f64>,
}

impl BaselineSample {
    /// Sample up to `sample_size` of the valid `records` (kept in file
    /// order), run preprocessing and attribution once, and cache the
    /// matrices.
    pub fn build(
        model: &dyn ModelVariant,
        records: &[InputRecord],
        sample_size: usize,
        seed: u64,
    ) -> anyhow::Result<Self> {
        let explainer = model
            .explainer()
            .ok_or_else(|| anyhow!("{} model has no explainer", model.variant()))?;
        let usable = usable_records(model, records);
        if usable.is_empty() {
            return Err(anyhow!("reference data for {} has no usable rows", model.variant()));
        }

        let size = sample_size.clamp(1, MAX_BASELINE_SAMPLE).min(usable.len());
        let mut rng = StdRng::seed_from_u64(seed);
        let mut picked = rand::seq::index::sample(&mut rng, usable.len(), size).into_vec();
        picked.sort_unstable();
        let sample: Vec<InputRecord> = picked.iter().map(|&i| usable[i].clone()).collect();

        let batch = normalize(&sample, model.schema()).context("reference record failed validation")?;
        let feature_matrix = model
            .preprocess(&batch.table)
            .context("reference data could not be preprocessed")?;
        let attribution_matrix = explainer.shap_values(&feature_matrix);

        log::info!(
            "[{}] Baseline sample ready: {} of {} usable reference records",
            model.variant(),
            size,
            usable.len()
        );

        let schema = model.schema();
        Ok(Self {
            variant: model.variant(),
            feature_names: schema.ordered_feature_names.clone(),
            display_names: schema.display_names.clone(),
            feature_matrix,
            attribution_matrix,
            base_value: explainer.expected_value(),
        })
    }

    pub fn n_samples(&self) -> usize {
        self.feature_matrix.nrows()
    }

    /// Mean absolute contribution per feature, most important first.
    pub fn feature_importance(&self) -> Vec<FeatureImportance> {
        let mut out: Vec<FeatureImportance> = self
            .attribution_matrix
            .columns()
            .into_iter()
            .enumerate()
            .map(|(j, col)| {
                let abs: Vec<f64> = col.iter().map(|v| v.abs()).collect();
                let std = if abs.len() > 1 { abs.iter().std_dev() } else { 0.0 };
                FeatureImportance {
                    feature: self.feature_names[j].clone(),
                    display_name: self.display_names[j].clone(),
                    mean_abs_contribution: abs.iter().mean(),
                    std_abs_contribution: std,
                }
            })
            .collect();
        out.sort_by(|a, b| b.mean_abs_contribution.total_cmp(&a.mean_abs_contribution));
        out
    }

    /// Dependence series for `feature`, looked up by encoded or display name.
    pub fn dependence(&self, feature: &str) -> Result<DependenceSeries> {
        let j = self
            .feature_names
            .iter()
            .position(|n| n == feature)
            .or_else(|| self.display_names.iter().position(|n| n == feature))
            .ok_or_else(|| AttritionError::UnknownFeature {
                variant: self.variant,
                feature: feature.to_string(),
            })?;
        Ok(DependenceSeries {
            feature: self.feature_names[j].clone(),
            display_name: self.display_names[j].clone(),
            values: self.feature_matrix.column(j).to_vec(),
            contributions: self.attribution_matrix.column(j).to_vec(),
        })
    }
}

/// Reference rows that pass request validation. Rows with blank or bad cells
/// are skipped with a warning instead of costing the whole baseline.
fn usable_records<'a>(model: &dyn ModelVariant, records: &'a [InputRecord]) -> Vec<&'a InputRecord> {
    let schema = model.schema();
    records
        .iter()
        .enumerate()
        .filter_map(|(row, record)| match normalize(std::slice::from_ref(record), schema) {
            Ok(_) => Some(record),
            Err(e) => {
                log::warn!("[{}] Skipping reference row {}: {}", model.variant(), row + 1, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample() -> BaselineSample {
        BaselineSample {
            variant: Variant::Survey,
            feature_names: vec!["a".into(), "b".into()],
            display_names: vec!["A".into(), "B".into()],
            feature_matrix: array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]],
            attribution_matrix: array![[0.1, -0.6], [-0.1, 0.6], [0.1, -0.3]],
            base_value: -1.0,
        }
    }

    #[test]
    fn importance_orders_by_mean_abs_contribution() {
        let imp = sample().feature_importance();
        assert_eq!(imp[0].feature, "b");
        assert!((imp[0].mean_abs_contribution - 0.5).abs() < 1e-12);
        assert!((imp[1].mean_abs_contribution - 0.1).abs() < 1e-12);
        assert!(imp[1].std_abs_contribution.abs() < 1e-12);
    }

    #[test]
    fn dependence_by_either_name() {
        let s = sample();
        let dep = s.dependence("B").unwrap();
        assert_eq!(dep.values, vec![2.0, 4.0, 6.0]);
        assert_eq!(dep.contributions, vec![-0.6, 0.6, -0.3]);
        assert_eq!(s.dependence("a").unwrap().display_name, "A");
    }

    #[test]
    fn unknown_feature_is_reported() {
        let err = sample().dependence("Salary").unwrap_err();
        assert_eq!(
            err,
            AttritionError::UnknownFeature {
                variant: Variant::Survey,
                feature: "Salary".into()
            }
        );
    }
}
