//! Model bundle reader.
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::tree::TreeDump;
use crate::preprocessing::CategoricalColumn;
use crate::schema::Variant;

pub const BINARY_LOGISTIC: &str = "binary:logistic";

/// A pretrained pipeline as exported by the training side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineArtifact {
    pub variant: Variant,
    pub preprocessing: PreprocessingDump,
    pub classifier: ClassifierDump,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PreprocessingDump {
    ColumnEncoder {
        numeric: Vec<String>,
        categorical: Vec<CategoricalColumn>,
    },
    StandardScaler {
        features: Vec<String>,
        mean: Vec<f64>,
        scale: Vec<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierDump {
    #[serde(default = "default_objective")]
    pub objective: String,
    pub base_score: f64,
    pub n_features: usize,
    pub trees: Vec<TreeDump>,
}

fn default_objective() -> String {
    BINARY_LOGISTIC.to_string()
}

/// Read a pipeline bundle from a JSON file.
pub fn load_artifact<P: AsRef<Path>>(path: P) -> Result<PipelineArtifact> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read model bundle: {}", path.display()))?;
    let artifact: PipelineArtifact = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse model bundle: {}", path.display()))?;
    log::debug!(
        "Read {} bundle from {} ({} trees)",
        artifact.variant,
        path.display(),
        artifact.classifier.trees.len()
    );
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SCALER_BUNDLE: &str = r#"{
        "variant": "survey",
        "preprocessing": {"kind": "standard_scaler", "features": ["a"], "mean": [3.0], "scale": [1.2]},
        "classifier": {
            "base_score": 0.25,
            "n_features": 1,
            "trees": [{
                "left_children": [1, -1, -1], "right_children": [2, -1, -1],
                "split_indices": [0, 0, 0], "split_conditions": [0.0, 0.4, -0.4],
                "default_left": [true, false, false], "sum_hessian": [10, 5, 5]
            }]
        }
    }"#;

    #[test]
    fn loads_bundle_with_default_objective() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.json");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(SCALER_BUNDLE.as_bytes())
            .unwrap();

        let artifact = load_artifact(&path).unwrap();
        assert_eq!(artifact.variant, Variant::Survey);
        assert_eq!(artifact.classifier.objective, BINARY_LOGISTIC);
        assert!(matches!(
            artifact.preprocessing,
            PreprocessingDump::StandardScaler { ref features, .. } if features.len() == 1
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_artifact("/nonexistent/bundle.json").unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/bundle.json"));
    }
}
