//! Probability computation and risk bucketing.
use std::fmt;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{AttritionError, Result};
use crate::models::classifier_trait::ModelVariant;

/// Lower bound of the Medium bucket.
pub const MEDIUM_RISK_THRESHOLD: f64 = 0.4;
/// Lower bound of the High bucket.
pub const HIGH_RISK_THRESHOLD: f64 = 0.7;

pub fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Boundaries belong to the higher bucket.
    pub fn from_probability(p: f64) -> Self {
        if p >= HIGH_RISK_THRESHOLD {
            RiskLevel::High
        } else if p >= MEDIUM_RISK_THRESHOLD {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredictionResult {
    pub probability: f64,
    pub risk_level: RiskLevel,
    /// Log-odds the probability was derived from.
    pub margin: f64,
}

impl PredictionResult {
    pub fn from_margin(margin: f64) -> Self {
        let probability = sigmoid(margin).clamp(0.0, 1.0);
        Self {
            probability,
            risk_level: RiskLevel::from_probability(probability),
            margin,
        }
    }
}

/// Run the classifier over a preprocessed matrix. `x` is not modified.
pub fn predict(model: &dyn ModelVariant, x: &Array2<f64>) -> Result<(Array1<f64>, Vec<PredictionResult>)> {
    let margins = model.predict_margin(x)?;
    if let Some(i) = margins.iter().position(|m| !m.is_finite()) {
        return Err(AttritionError::Computation(format!(
            "{} classifier produced a non-finite margin for row {}",
            model.variant(),
            i
        )));
    }
    let results = margins.iter().map(|m| PredictionResult::from_margin(*m)).collect();
    Ok((margins, results))
}
