use ndarray::{Array1, Array2};

use crate::error::Result;
use crate::explain::TreeExplainer;
use crate::inference::sigmoid;
use crate::normalize::FeatureTable;
use crate::schema::{FeatureSchema, Variant};

/// One loaded model variant: a preprocessing stage in front of a
/// binary-logistic tree ensemble.
///
/// The demographic and survey bundles differ in how they preprocess
/// (encoding vs. scaling); callers only see this contract.
pub trait ModelVariant: Send + Sync {
    fn variant(&self) -> Variant;

    fn schema(&self) -> &FeatureSchema;

    /// Turn a validated feature table into the classifier's input matrix.
    fn preprocess(&self, table: &FeatureTable) -> Result<Array2<f64>>;

    /// Raw log-odds per row.
    fn predict_margin(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Probabilities (0..1) per row.
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.predict_margin(x)?.mapv(sigmoid))
    }

    /// `None` when the bundle cannot support tree attribution.
    fn explainer(&self) -> Option<&TreeExplainer>;

    /// Contribution matrix for `x`, or `None` without an explainer.
    fn explain(&self, x: &Array2<f64>) -> Option<Array2<f64>> {
        self.explainer().map(|e| e.shap_values(x))
    }

    fn name(&self) -> &str {
        "pipeline"
    }
}
