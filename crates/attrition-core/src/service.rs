//! Request boundary.
//!
//! [`AttritionService`] runs normalize -> preprocess -> predict -> explain ->
//! assemble for one variant, always over the whole batch at once. Every
//! failure comes back as an [`AttritionError`]; nothing here mutates the
//! shared registry.
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::baseline::{BaselineSample, DependenceSeries, FeatureImportance};
use crate::config::ServiceConfig;
use crate::error::{AttritionError, Result};
use crate::explain::{
    self, significant_contributions, AttributionResult, ContributionEntry, ExplanationStatus,
    FeatureDetail, DEFAULT_DETAIL_LIMIT,
};
use crate::inference::{self, PredictionResult, RiskLevel};
use crate::normalize::{normalize, Identifiers, InputRecord};
use crate::registry::{ModelRegistry, VariantStatus};
use crate::schema::{FeatureSchema, Variant};

/// Per-record response, identical in shape for both variants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionOutput {
    #[serde(flatten)]
    pub identifiers: Identifiers,
    pub attrition_probability: f64,
    pub risk_level: RiskLevel,
    pub top_positive_contributors: Vec<ContributionEntry>,
    pub top_negative_contributors: Vec<ContributionEntry>,
    pub explanation: ExplanationStatus,
    pub base_value: f64,
    pub predicted_value: f64,
}

impl PredictionOutput {
    fn assemble(identifiers: Identifiers, prediction: PredictionResult, attribution: AttributionResult) -> Self {
        Self {
            identifiers,
            attrition_probability: prediction.probability,
            risk_level: prediction.risk_level,
            top_positive_contributors: attribution.positive,
            top_negative_contributors: attribution.negative,
            explanation: attribution.status,
            base_value: attribution.base_value,
            predicted_value: attribution.predicted_value,
        }
    }
}

/// Force/waterfall numbers for one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordExplanation {
    #[serde(flatten)]
    pub identifiers: Identifiers,
    pub attrition_probability: f64,
    pub risk_level: RiskLevel,
    pub base_value: f64,
    pub predicted_value: f64,
    pub contributions: Vec<FeatureDetail>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceHealth {
    Healthy,
    Degraded,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: ServiceHealth,
    pub initialized_at: DateTime<Utc>,
    pub variants: BTreeMap<Variant, VariantStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureCatalogEntry {
    pub feature_names: Vec<String>,
    pub display_names: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AttritionService {
    registry: Arc<ModelRegistry>,
}

impl AttritionService {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    /// Initialise a fresh registry from `config` and wrap it.
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(Arc::new(ModelRegistry::initialize(config)))
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn single_predict(&self, variant: Variant, record: &InputRecord) -> Result<PredictionOutput> {
        self.batch_predict(variant, std::slice::from_ref(record))?
            .pop()
            .ok_or_else(|| AttritionError::Computation("prediction produced no output".to_string()))
    }

    /// Predict and explain a batch. One invalid record rejects the whole
    /// batch before any model work starts.
    pub fn batch_predict(&self, variant: Variant, records: &[InputRecord]) -> Result<Vec<PredictionOutput>> {
        let start = Instant::now();
        let model = self.registry.model(variant)?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let batch = normalize(records, model.schema())?;
        let x = model.preprocess(&batch.table)?;
        let (margins, predictions) = inference::predict(model.as_ref(), &x)?;
        let attributions = explain::explain(model.as_ref(), &x, &margins)?;

        let outputs: Vec<PredictionOutput> = batch
            .identifiers
            .into_iter()
            .zip(predictions)
            .zip(attributions)
            .map(|((ids, p), a)| PredictionOutput::assemble(ids, p, a))
            .collect();

        log::debug!(
            "[{}] Predicted {} record(s) in {:.2?}",
            variant,
            outputs.len(),
            start.elapsed()
        );
        Ok(outputs)
    }

    /// Per-record detail: every contribution above the display threshold,
    /// largest magnitude first, with the feature value it came from.
    pub fn explain_records(
        &self,
        variant: Variant,
        records: &[InputRecord],
        limit: Option<usize>,
    ) -> Result<Vec<RecordExplanation>> {
        let model = self.registry.model(variant)?;
        if model.explainer().is_none() {
            return Err(AttritionError::unavailable(variant, "explainer unavailable"));
        }
        let limit = limit.unwrap_or(DEFAULT_DETAIL_LIMIT);

        let batch = normalize(records, model.schema())?;
        let x = model.preprocess(&batch.table)?;
        let (margins, predictions) = inference::predict(model.as_ref(), &x)?;
        let attributions = explain::explain(model.as_ref(), &x, &margins)?;
        let schema = model.schema();

        Ok(batch
            .identifiers
            .into_iter()
            .zip(predictions)
            .zip(attributions)
            .enumerate()
            .map(|(i, ((identifiers, p), a))| RecordExplanation {
                identifiers,
                attrition_probability: p.probability,
                risk_level: p.risk_level,
                base_value: a.base_value,
                predicted_value: a.predicted_value,
                contributions: significant_contributions(&a.contributions, x.row(i), schema, limit),
            })
            .collect())
    }

    pub fn health(&self) -> HealthReport {
        let variants = self.registry.status();
        let loaded = variants.values().filter(|s| s.model_loaded).count();
        let all_ready = variants.values().all(|s| s.explainer_ready);
        let status = if loaded == 0 {
            ServiceHealth::Unavailable
        } else if all_ready {
            ServiceHealth::Healthy
        } else {
            ServiceHealth::Degraded
        };
        HealthReport {
            status,
            initialized_at: self.registry.initialized_at(),
            variants,
        }
    }

    pub fn schema_for(&self, variant: Variant) -> Result<&FeatureSchema> {
        Ok(self.registry.model(variant)?.schema())
    }

    /// Feature names and display names of every loaded variant.
    pub fn features(&self) -> BTreeMap<Variant, FeatureCatalogEntry> {
        Variant::ALL
            .iter()
            .filter_map(|&v| self.schema_for(v).ok().map(|s| (v, s)))
            .map(|(v, s)| {
                (
                    v,
                    FeatureCatalogEntry {
                        feature_names: s.ordered_feature_names.clone(),
                        display_names: s.display_names.clone(),
                    },
                )
            })
            .collect()
    }

    pub fn baseline_for(&self, variant: Variant) -> Result<Arc<BaselineSample>> {
        self.registry.baseline(variant)
    }

    pub fn feature_importance(&self, variant: Variant) -> Result<Vec<FeatureImportance>> {
        Ok(self.baseline_for(variant)?.feature_importance())
    }

    /// Dependence series for a feature named by encoded, display, or raw
    /// input name.
    pub fn dependence(&self, variant: Variant, feature: &str) -> Result<DependenceSeries> {
        let schema = self.schema_for(variant)?;
        let idx = schema
            .feature_index(feature)
            .ok_or_else(|| AttritionError::UnknownFeature {
                variant,
                feature: feature.to_string(),
            })?;
        self.baseline_for(variant)?
            .dependence(&schema.ordered_feature_names[idx])
    }
}
