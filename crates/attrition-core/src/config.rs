use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::baseline::MAX_BASELINE_SAMPLE;
use crate::schema::Variant;

/// Where one variant's bundle and reference data live.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct VariantConfig {
    pub bundle_path: PathBuf,
    /// CSV the baseline sample is drawn from. No baseline without it.
    #[serde(default)]
    pub reference_data: Option<PathBuf>,
}

impl VariantConfig {
    pub fn new(bundle_path: impl Into<PathBuf>) -> Self {
        Self {
            bundle_path: bundle_path.into(),
            reference_data: None,
        }
    }
}

/// Service configuration, read once at startup.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub demographic: VariantConfig,
    pub survey: VariantConfig,
    pub baseline_sample_size: usize,
    pub baseline_seed: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            demographic: VariantConfig::new("models/demographic_bundle.json"),
            survey: VariantConfig::new("models/survey_bundle.json"),
            baseline_sample_size: MAX_BASELINE_SAMPLE,
            baseline_seed: 42,
        }
    }
}

impl ServiceConfig {
    pub fn variant(&self, variant: Variant) -> &VariantConfig {
        match variant {
            Variant::Demographic => &self.demographic,
            Variant::Survey => &self.survey,
        }
    }

    pub fn variant_mut(&mut self, variant: Variant) -> &mut VariantConfig {
        match variant {
            Variant::Demographic => &mut self.demographic,
            Variant::Survey => &mut self.survey,
        }
    }

    /// Sample size after clamping to [`MAX_BASELINE_SAMPLE`].
    pub fn effective_sample_size(&self) -> usize {
        self.baseline_sample_size.min(MAX_BASELINE_SAMPLE)
    }

    /// Resolve relative paths against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for variant in Variant::ALL {
            let cfg = self.variant_mut(variant);
            if cfg.bundle_path.is_relative() {
                cfg.bundle_path = base.join(&cfg.bundle_path);
            }
            if let Some(reference) = cfg.reference_data.as_mut() {
                if reference.is_relative() {
                    *reference = base.join(&*reference);
                }
            }
        }
    }
}

/// Load a service configuration from a JSON file. Relative paths inside it
/// are taken relative to the file's directory.
pub fn load_service_config<P: AsRef<Path>>(path: P) -> Result<ServiceConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let mut config: ServiceConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config: {}", path.display()))?;
    if config.baseline_sample_size > MAX_BASELINE_SAMPLE {
        log::warn!(
            "baseline_sample_size {} exceeds the maximum, using {}",
            config.baseline_sample_size,
            MAX_BASELINE_SAMPLE
        );
    }
    if let Some(dir) = path.parent() {
        config.resolve_paths(dir);
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: ServiceConfig =
            serde_json::from_str(r#"{"survey": {"bundle_path": "s.json"}}"#).unwrap();
        assert_eq!(config.survey.bundle_path, PathBuf::from("s.json"));
        assert_eq!(config.demographic, ServiceConfig::default().demographic);
        assert_eq!(config.baseline_sample_size, 50);
        assert_eq!(config.baseline_seed, 42);
    }

    #[test]
    fn relative_paths_follow_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service.json");
        std::fs::write(
            &path,
            r#"{
                "demographic": {"bundle_path": "d.json", "reference_data": "ref/d.csv"},
                "survey": {"bundle_path": "/abs/s.json"},
                "baseline_sample_size": 500
            }"#,
        )
        .unwrap();

        let config = load_service_config(&path).unwrap();
        assert_eq!(config.demographic.bundle_path, dir.path().join("d.json"));
        assert_eq!(config.demographic.reference_data, Some(dir.path().join("ref/d.csv")));
        assert_eq!(config.survey.bundle_path, PathBuf::from("/abs/s.json"));
        assert_eq!(config.effective_sample_size(), 50);
    }

    #[test]
    fn unreadable_config_names_the_file() {
        let err = load_service_config("/nonexistent/service.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/service.json"));
    }
}
