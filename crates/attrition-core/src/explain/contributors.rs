use serde::{Deserialize, Serialize};

use crate::schema::FeatureSchema;

/// Number of contributors reported on each side.
pub const TOP_K: usize = 3;

/// One signed per-feature contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionEntry {
    pub feature: String,
    pub display_name: String,
    pub contribution: f64,
}

impl ContributionEntry {
    pub fn new(schema: &FeatureSchema, idx: usize, contribution: f64) -> Self {
        Self {
            feature: schema.ordered_feature_names[idx].clone(),
            display_name: schema.display_names[idx].clone(),
            contribution,
        }
    }
}

/// Top `k` risk-raising contributions, largest first.
///
/// Only strictly positive values qualify. Ties keep feature order.
pub fn top_positive(contributions: &[f64], schema: &FeatureSchema, k: usize) -> Vec<ContributionEntry> {
    let mut idx: Vec<usize> = (0..contributions.len())
        .filter(|&i| contributions[i] > 0.0)
        .collect();
    idx.sort_by(|&a, &b| contributions[b].total_cmp(&contributions[a]));
    idx.into_iter()
        .take(k)
        .map(|i| ContributionEntry::new(schema, i, contributions[i]))
        .collect()
}

/// Top `k` risk-reducing contributions, most negative first.
pub fn top_negative(contributions: &[f64], schema: &FeatureSchema, k: usize) -> Vec<ContributionEntry> {
    let mut idx: Vec<usize> = (0..contributions.len())
        .filter(|&i| contributions[i] < 0.0)
        .collect();
    idx.sort_by(|&a, &b| contributions[a].total_cmp(&contributions[b]));
    idx.into_iter()
        .take(k)
        .map(|i| ContributionEntry::new(schema, i, contributions[i]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FeatureSchema;

    fn schema() -> FeatureSchema {
        FeatureSchema::survey()
    }

    fn padded(values: &[f64]) -> Vec<f64> {
        let mut v = values.to_vec();
        v.resize(19, 0.0);
        v
    }

    #[test]
    fn positive_sorted_descending_and_capped() {
        let c = padded(&[0.1, 0.5, -0.2, 0.3, 0.05, -0.7]);
        let top = top_positive(&c, &schema(), TOP_K);
        let got: Vec<f64> = top.iter().map(|e| e.contribution).collect();
        assert_eq!(got, vec![0.5, 0.3, 0.1]);
        assert_eq!(top[0].feature, "Job Satisfaction");
    }

    #[test]
    fn negative_sorted_ascending() {
        let c = padded(&[0.1, 0.5, -0.2, 0.3, 0.05, -0.7]);
        let got: Vec<f64> = top_negative(&c, &schema(), TOP_K)
            .iter()
            .map(|e| e.contribution)
            .collect();
        assert_eq!(got, vec![-0.7, -0.2]);
    }

    #[test]
    fn zeros_never_qualify_and_ties_keep_feature_order() {
        let c = padded(&[0.2, 0.0, 0.2, 0.2, 0.2]);
        let top = top_positive(&c, &schema(), TOP_K);
        let names: Vec<&str> = top.iter().map(|e| e.feature.as_str()).collect();
        assert_eq!(
            names,
            vec!["Work-Life Balance", "Relationship with Manager", "Communication effectiveness"]
        );
        assert!(top_negative(&padded(&[]), &schema(), TOP_K).is_empty());
    }
}
