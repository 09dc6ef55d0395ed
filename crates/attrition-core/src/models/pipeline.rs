use std::sync::Arc;

use ndarray::{Array1, Array2};

use crate::error::{AttritionError, Result};
use crate::explain::TreeExplainer;
use crate::models::classifier_trait::ModelVariant;
use crate::models::tree::TreeEnsemble;
use crate::normalize::FeatureTable;
use crate::preprocessing::{ColumnEncoder, PreprocessingStage, StandardScaler};
use crate::schema::{FeatureSchema, Variant};

/// A preprocessing stage chained with a tree ensemble.
#[derive(Debug)]
pub struct Pipeline<P: PreprocessingStage> {
    variant: Variant,
    schema: FeatureSchema,
    preprocessing: P,
    ensemble: Arc<TreeEnsemble>,
    explainer: Option<TreeExplainer>,
}

pub type DemographicModel = Pipeline<ColumnEncoder>;
pub type SurveyModel = Pipeline<StandardScaler>;

impl<P: PreprocessingStage> Pipeline<P> {
    pub fn new(
        variant: Variant,
        schema: FeatureSchema,
        preprocessing: P,
        ensemble: Arc<TreeEnsemble>,
        explainer: Option<TreeExplainer>,
    ) -> Self {
        Self {
            variant,
            schema,
            preprocessing,
            ensemble,
            explainer,
        }
    }
}

impl<P: PreprocessingStage> ModelVariant for Pipeline<P> {
    fn variant(&self) -> Variant {
        self.variant
    }

    fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    fn preprocess(&self, table: &FeatureTable) -> Result<Array2<f64>> {
        self.preprocessing.transform(table)
    }

    fn predict_margin(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.ensemble.n_features {
            return Err(AttritionError::Computation(format!(
                "{} classifier expects {} features, got {}",
                self.variant,
                self.ensemble.n_features,
                x.ncols()
            )));
        }
        Ok(self.ensemble.predict_margin(x))
    }

    fn explainer(&self) -> Option<&TreeExplainer> {
        self.explainer.as_ref()
    }

    fn name(&self) -> &str {
        match self.variant {
            Variant::Demographic => "column-encoder + gradient-boosted trees",
            Variant::Survey => "standard-scaler + gradient-boosted trees",
        }
    }
}
