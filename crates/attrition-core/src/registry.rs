//! Model registry and startup lifecycle.
//!
//! Both bundles are loaded exactly once. A failure in one variant leaves it
//! `Failed` and never touches the other. After [`ModelRegistry::initialize`]
//! returns, the registry is immutable and shared behind an `Arc`.
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::baseline::BaselineSample;
use crate::config::{ServiceConfig, VariantConfig};
use crate::error::{AttritionError, Result};
use crate::io::{load_artifact, read_reference_records};
use crate::models::classifier_trait::ModelVariant;
use crate::models::factory::build_variant;
use crate::schema::Variant;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum VariantState {
    Unloaded,
    Loading,
    Ready,
    /// Model serves predictions but attribution is unavailable.
    Degraded(String),
    Failed(String),
}

impl VariantState {
    pub fn model_ready(&self) -> bool {
        matches!(self, VariantState::Ready | VariantState::Degraded(_))
    }

    pub fn explainer_ready(&self) -> bool {
        matches!(self, VariantState::Ready)
    }

    pub fn label(&self) -> &'static str {
        match self {
            VariantState::Unloaded => "unloaded",
            VariantState::Loading => "loading",
            VariantState::Ready => "ready",
            VariantState::Degraded(_) => "degraded",
            VariantState::Failed(_) => "failed",
        }
    }
}

/// Everything the registry holds for one variant.
pub struct VariantSlot {
    variant: Variant,
    state: VariantState,
    model: Option<Arc<dyn ModelVariant>>,
    baseline: Option<Arc<BaselineSample>>,
    baseline_error: Option<String>,
}

impl std::fmt::Debug for VariantSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariantSlot")
            .field("variant", &self.variant)
            .field("state", &self.state)
            .field("model", &self.model.as_ref().map(|m| m.name().to_string()))
            .field("baseline_samples", &self.baseline.as_ref().map(|b| b.n_samples()))
            .field("baseline_error", &self.baseline_error)
            .finish()
    }
}

impl VariantSlot {
    fn new(variant: Variant) -> Self {
        Self {
            variant,
            state: VariantState::Unloaded,
            model: None,
            baseline: None,
            baseline_error: None,
        }
    }

    fn transition(&mut self, next: VariantState) {
        log::debug!("[{}] {} -> {}", self.variant, self.state.label(), next.label());
        self.state = next;
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn state(&self) -> &VariantState {
        &self.state
    }

    pub fn model(&self) -> Option<&Arc<dyn ModelVariant>> {
        self.model.as_ref()
    }

    pub fn baseline(&self) -> Option<&Arc<BaselineSample>> {
        self.baseline.as_ref()
    }

    pub fn baseline_error(&self) -> Option<&str> {
        self.baseline_error.as_deref()
    }

    fn status(&self) -> VariantStatus {
        let detail = match &self.state {
            VariantState::Degraded(r) | VariantState::Failed(r) => Some(r.clone()),
            _ => self.baseline_error.clone(),
        };
        VariantStatus {
            state: self.state.label().to_string(),
            model_loaded: self.state.model_ready(),
            explainer_ready: self.state.explainer_ready(),
            baseline_ready: self.baseline.is_some(),
            detail,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantStatus {
    pub state: String,
    pub model_loaded: bool,
    pub explainer_ready: bool,
    pub baseline_ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug)]
pub struct ModelRegistry {
    slots: BTreeMap<Variant, VariantSlot>,
    initialized_at: DateTime<Utc>,
}

impl ModelRegistry {
    /// Load every configured variant. Never fails as a whole.
    pub fn initialize(config: &ServiceConfig) -> Self {
        let slots = Variant::ALL
            .iter()
            .map(|&variant| (variant, load_slot(variant, config.variant(variant), config)))
            .collect();
        let registry = Self {
            slots,
            initialized_at: Utc::now(),
        };
        for (variant, status) in registry.status() {
            log::info!(
                "[{}] state={} model_loaded={} explainer_ready={} baseline_ready={}",
                variant,
                status.state,
                status.model_loaded,
                status.explainer_ready,
                status.baseline_ready
            );
        }
        registry
    }

    pub fn slot(&self, variant: Variant) -> Option<&VariantSlot> {
        self.slots.get(&variant)
    }

    /// The model for `variant`, or `ServiceUnavailable` unless it is
    /// `Ready` or `Degraded`.
    pub fn model(&self, variant: Variant) -> Result<&Arc<dyn ModelVariant>> {
        let slot = self
            .slot(variant)
            .ok_or_else(|| AttritionError::unavailable(variant, "not configured"))?;
        match (&slot.state, &slot.model) {
            (VariantState::Ready | VariantState::Degraded(_), Some(model)) => Ok(model),
            (VariantState::Failed(reason), _) => Err(AttritionError::unavailable(variant, reason.clone())),
            (state, _) => Err(AttritionError::unavailable(variant, format!("model is {}", state.label()))),
        }
    }

    pub fn baseline(&self, variant: Variant) -> Result<Arc<BaselineSample>> {
        let slot = self
            .slot(variant)
            .ok_or_else(|| AttritionError::unavailable(variant, "not configured"))?;
        slot.baseline.clone().ok_or_else(|| {
            let reason = match (&slot.state, &slot.baseline_error) {
                (VariantState::Failed(r), _) => r.clone(),
                (_, Some(e)) => format!("baseline sample unavailable: {}", e),
                _ => "baseline sample unavailable".to_string(),
            };
            AttritionError::unavailable(variant, reason)
        })
    }

    pub fn status(&self) -> BTreeMap<Variant, VariantStatus> {
        self.slots.iter().map(|(v, s)| (*v, s.status())).collect()
    }

    pub fn initialized_at(&self) -> DateTime<Utc> {
        self.initialized_at
    }
}

fn load_slot(variant: Variant, cfg: &VariantConfig, config: &ServiceConfig) -> VariantSlot {
    let mut slot = VariantSlot::new(variant);
    slot.transition(VariantState::Loading);
    log::info!("[{}] Loading bundle {}", variant, cfg.bundle_path.display());

    let built = load_artifact(&cfg.bundle_path).and_then(|artifact| {
        if artifact.variant != variant {
            return Err(anyhow!(
                "bundle at {} is a {} bundle, expected {}",
                cfg.bundle_path.display(),
                artifact.variant,
                variant
            ));
        }
        build_variant(&artifact)
    });

    let built = match built {
        Ok(b) => b,
        Err(e) => {
            log::error!("[{}] Failed to load model: {:#}", variant, e);
            slot.transition(VariantState::Failed(format!("{:#}", e)));
            return slot;
        }
    };

    let model = built.model;
    match built.explainer_error {
        None => slot.transition(VariantState::Ready),
        Some(reason) => {
            log::warn!("[{}] Explainer unavailable, serving without attribution: {}", variant, reason);
            slot.transition(VariantState::Degraded(reason));
        }
    }

    if slot.state.explainer_ready() {
        match build_baseline(model.as_ref(), cfg, config) {
            Ok(sample) => slot.baseline = Some(Arc::new(sample)),
            Err(e) => {
                log::warn!("[{}] Baseline sample unavailable: {:#}", variant, e);
                slot.baseline_error = Some(format!("{:#}", e));
            }
        }
    }

    slot.model = Some(model);
    slot
}

fn build_baseline(
    model: &dyn ModelVariant,
    cfg: &VariantConfig,
    config: &ServiceConfig,
) -> anyhow::Result<BaselineSample> {
    let path = cfg
        .reference_data
        .as_ref()
        .ok_or_else(|| anyhow!("no reference data configured"))?;
    let records = read_reference_records(path, model.schema())
        .with_context(|| format!("Failed to load reference data {}", path.display()))?;
    BaselineSample::build(
        model,
        &records,
        config.effective_sample_size(),
        config.baseline_seed,
    )
}

/// Process-wide, once-only registry initialisation.
#[derive(Debug, Default)]
pub struct Lifecycle {
    registry: OnceLock<Arc<ModelRegistry>>,
}

impl Lifecycle {
    pub const fn new() -> Self {
        Self {
            registry: OnceLock::new(),
        }
    }

    /// Build the registry on first call; later calls return the same one
    /// and ignore `config`.
    pub fn initialize(&self, config: &ServiceConfig) -> Arc<ModelRegistry> {
        self.registry
            .get_or_init(|| Arc::new(ModelRegistry::initialize(config)))
            .clone()
    }

    pub fn get(&self) -> Option<Arc<ModelRegistry>> {
        self.registry.get().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_config() -> ServiceConfig {
        ServiceConfig {
            demographic: VariantConfig::new("/nonexistent/demographic.json"),
            survey: VariantConfig::new("/nonexistent/survey.json"),
            ..ServiceConfig::default()
        }
    }

    #[test]
    fn missing_bundles_fail_softly() {
        let registry = ModelRegistry::initialize(&missing_config());
        let status = registry.status();
        assert_eq!(status.len(), 2);
        for s in status.values() {
            assert_eq!(s.state, "failed");
            assert!(!s.model_loaded);
            assert!(s.detail.as_deref().unwrap_or("").contains("/nonexistent/"));
        }
        let err = registry.model(Variant::Survey).err().unwrap();
        assert_eq!(err.status_code(), 503);
        assert!(registry.baseline(Variant::Demographic).is_err());
    }

    #[test]
    fn lifecycle_initializes_once() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.get().is_none());
        let first = lifecycle.initialize(&missing_config());
        let second = lifecycle.initialize(&ServiceConfig::default());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.initialized_at(), second.initialized_at());
    }

    #[test]
    fn state_flags() {
        assert!(VariantState::Ready.explainer_ready());
        assert!(VariantState::Degraded("x".into()).model_ready());
        assert!(!VariantState::Degraded("x".into()).explainer_ready());
        assert!(!VariantState::Failed("x".into()).model_ready());
        assert!(!VariantState::Loading.model_ready());
    }
}
