//! Attribution engine.
//!
//! Turns a preprocessed feature matrix into per-record [`AttributionResult`]s.
//! A variant whose explainer could not be built still gets a result per
//! record, tagged [`ExplanationStatus::Unavailable`], so the prediction can be
//! served without pretending every feature contributed nothing.
pub mod contributors;
pub mod tree_shap;

use ndarray::{Array1, Array2, ArrayView1};
use serde::Serialize;

use crate::error::{AttritionError, Result};
use crate::models::classifier_trait::ModelVariant;
use crate::schema::FeatureSchema;

pub use contributors::{top_negative, top_positive, ContributionEntry, TOP_K};
pub use tree_shap::TreeExplainer;

/// Allowed gap between `sum(contributions)` and `predicted - base`.
pub const ADDITIVITY_TOLERANCE: f64 = 1e-4;

/// Contributions at or below this magnitude are left out of record detail.
pub const MIN_DETAIL_CONTRIBUTION: f64 = 0.001;

pub const DEFAULT_DETAIL_LIMIT: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationStatus {
    Available,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributionResult {
    pub status: ExplanationStatus,
    /// Full contribution vector in feature order. Empty when unavailable.
    pub contributions: Vec<f64>,
    pub positive: Vec<ContributionEntry>,
    pub negative: Vec<ContributionEntry>,
    pub base_value: f64,
    pub predicted_value: f64,
}

impl AttributionResult {
    pub fn from_contributions(
        contributions: Vec<f64>,
        base_value: f64,
        predicted_value: f64,
        schema: &FeatureSchema,
    ) -> Self {
        Self {
            status: ExplanationStatus::Available,
            positive: top_positive(&contributions, schema, TOP_K),
            negative: top_negative(&contributions, schema, TOP_K),
            contributions,
            base_value,
            predicted_value,
        }
    }

    pub fn unavailable(predicted_value: f64) -> Self {
        Self {
            status: ExplanationStatus::Unavailable,
            contributions: Vec::new(),
            positive: Vec::new(),
            negative: Vec::new(),
            base_value: 0.0,
            predicted_value,
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == ExplanationStatus::Available
    }
}

/// Attribute every row of the preprocessed matrix `x`.
///
/// `margins` are the model margins for the same rows; they become each
/// result's `predicted_value`.
pub fn explain(
    model: &dyn ModelVariant,
    x: &Array2<f64>,
    margins: &Array1<f64>,
) -> Result<Vec<AttributionResult>> {
    if margins.len() != x.nrows() {
        return Err(AttritionError::Computation(format!(
            "{} margins for {} rows",
            margins.len(),
            x.nrows()
        )));
    }

    let Some(explainer) = model.explainer() else {
        log::warn!(
            "[{}] explainer unavailable, returning {} prediction(s) without attribution",
            model.variant(),
            x.nrows()
        );
        return Ok(margins.iter().map(|m| AttributionResult::unavailable(*m)).collect());
    };

    if x.ncols() != explainer.n_features() {
        return Err(AttritionError::Computation(format!(
            "explainer expects {} features, got {}",
            explainer.n_features(),
            x.ncols()
        )));
    }

    let schema = model.schema();
    let base_value = explainer.expected_value();
    let phi = explainer.shap_values(x);

    let results = phi
        .rows()
        .into_iter()
        .zip(margins.iter())
        .enumerate()
        .map(|(i, (row, margin))| {
            let total = row.sum();
            let gap = (total - (margin - base_value)).abs();
            if gap > ADDITIVITY_TOLERANCE {
                log::warn!(
                    "[{}] row {}: contributions miss additivity by {:.6}",
                    model.variant(),
                    i,
                    gap
                );
            }
            AttributionResult::from_contributions(row.to_vec(), base_value, *margin, schema)
        })
        .collect();
    Ok(results)
}

/// One feature's contribution together with its preprocessed value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureDetail {
    pub feature: String,
    pub display_name: String,
    pub value: f64,
    pub contribution: f64,
}

/// Contributions above [`MIN_DETAIL_CONTRIBUTION`] in magnitude, largest
/// magnitude first, truncated to `limit`.
pub fn significant_contributions(
    contributions: &[f64],
    values: ArrayView1<f64>,
    schema: &FeatureSchema,
    limit: usize,
) -> Vec<FeatureDetail> {
    let mut idx: Vec<usize> = (0..contributions.len())
        .filter(|&i| contributions[i].abs() > MIN_DETAIL_CONTRIBUTION)
        .collect();
    idx.sort_by(|&a, &b| contributions[b].abs().total_cmp(&contributions[a].abs()));
    idx.into_iter()
        .take(limit)
        .map(|i| FeatureDetail {
            feature: schema.ordered_feature_names[i].clone(),
            display_name: schema.display_names[i].clone(),
            value: values[i],
            contribution: contributions[i],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_is_tagged_not_zeroed() {
        let r = AttributionResult::unavailable(1.25);
        assert!(!r.is_available());
        assert!(r.positive.is_empty() && r.negative.is_empty());
        assert_eq!(r.base_value, 0.0);
        assert_eq!(r.predicted_value, 1.25);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["status"], "unavailable");
    }

    #[test]
    fn detail_filters_tiny_values_and_sorts_by_magnitude() {
        let schema = FeatureSchema::survey();
        let mut c = vec![0.0; 19];
        c[0] = 0.0005;
        c[1] = -0.8;
        c[2] = 0.3;
        c[3] = -0.002;
        let values = ndarray::Array1::from(vec![1.0; 19]);
        let detail = significant_contributions(&c, values.view(), &schema, 2);
        let got: Vec<f64> = detail.iter().map(|d| d.contribution).collect();
        assert_eq!(got, vec![-0.8, 0.3]);

        let all = significant_contributions(&c, values.view(), &schema, DEFAULT_DETAIL_LIMIT);
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].feature, "Communication effectiveness");
    }

    #[test]
    fn available_result_selects_contributors() {
        let schema = FeatureSchema::survey();
        let mut c = vec![0.0; 19];
        c[12] = 0.48;
        c[1] = -0.8;
        let r = AttributionResult::from_contributions(c, -1.0, -1.32, &schema);
        assert!(r.is_available());
        assert_eq!(r.positive.len(), 1);
        assert_eq!(r.negative[0].display_name, "Job Satisfaction");
    }
}
