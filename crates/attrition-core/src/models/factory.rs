use std::sync::Arc;

use anyhow::{bail, ensure, Context, Result};

use crate::explain::TreeExplainer;
use crate::io::bundle::{ClassifierDump, PipelineArtifact, PreprocessingDump, BINARY_LOGISTIC};
use crate::models::classifier_trait::ModelVariant;
use crate::models::pipeline::{DemographicModel, SurveyModel};
use crate::models::tree::{RegressionTree, TreeEnsemble};
use crate::preprocessing::{ColumnEncoder, PreprocessingStage, StandardScaler};
use crate::schema::{FeatureSchema, Variant, LIKERT_RANGE, SURVEY_FEATURES};

/// A model built from a bundle, plus the reason its explainer is missing
/// when attribution could not be set up.
pub struct BuiltVariant {
    pub model: Arc<dyn ModelVariant>,
    pub explainer_error: Option<String>,
}

/// Build the model variant described by `artifact`.
///
/// Structural problems with the bundle are errors. A classifier that
/// predicts fine but cannot be attributed yields a model without an
/// explainer and `explainer_error` set.
pub fn build_variant(artifact: &PipelineArtifact) -> Result<BuiltVariant> {
    match (&artifact.variant, &artifact.preprocessing) {
        (Variant::Demographic, PreprocessingDump::ColumnEncoder { numeric, categorical }) => {
            let encoder = ColumnEncoder::new(numeric.clone(), categorical.clone())?;
            let categories: Vec<(String, Vec<String>)> = categorical
                .iter()
                .map(|c| (c.name.clone(), c.categories.clone()))
                .collect();
            let schema = FeatureSchema::demographic(numeric, &categories);
            check_stage_matches_schema(&encoder, &schema)?;

            let (ensemble, explainer, explainer_error) = build_classifier(&artifact.classifier, &schema)?;
            let model: DemographicModel =
                DemographicModel::new(Variant::Demographic, schema, encoder, ensemble, explainer);
            Ok(BuiltVariant {
                model: Arc::new(model),
                explainer_error,
            })
        }
        (Variant::Survey, PreprocessingDump::StandardScaler { features, mean, scale }) => {
            ensure!(
                features.iter().map(String::as_str).eq(SURVEY_FEATURES.iter().copied()),
                "survey scaler features do not match the survey question list"
            );
            let scaler = StandardScaler::new(features.clone(), mean.clone(), scale.clone())?
                .with_input_range(LIKERT_RANGE);
            let schema = FeatureSchema::survey();
            check_stage_matches_schema(&scaler, &schema)?;

            let (ensemble, explainer, explainer_error) = build_classifier(&artifact.classifier, &schema)?;
            let model: SurveyModel = SurveyModel::new(Variant::Survey, schema, scaler, ensemble, explainer);
            Ok(BuiltVariant {
                model: Arc::new(model),
                explainer_error,
            })
        }
        (variant, _) => bail!(
            "{} bundle carries a preprocessing stage of the wrong kind",
            variant
        ),
    }
}

fn check_stage_matches_schema(stage: &dyn PreprocessingStage, schema: &FeatureSchema) -> Result<()> {
    ensure!(
        stage.feature_names_out() == schema.ordered_feature_names,
        "preprocessing output names differ from the {} schema",
        schema.variant
    );
    ensure!(
        stage.input_fields() == schema.input_fields,
        "preprocessing input fields differ from the {} schema",
        schema.variant
    );
    Ok(())
}

type BuiltClassifier = (Arc<TreeEnsemble>, Option<TreeExplainer>, Option<String>);

fn build_classifier(dump: &ClassifierDump, schema: &FeatureSchema) -> Result<BuiltClassifier> {
    ensure!(
        dump.objective == BINARY_LOGISTIC,
        "unsupported objective '{}', expected '{}'",
        dump.objective,
        BINARY_LOGISTIC
    );
    ensure!(
        dump.n_features == schema.n_features(),
        "classifier expects {} features but preprocessing produces {}",
        dump.n_features,
        schema.n_features()
    );

    let trees = dump
        .trees
        .iter()
        .enumerate()
        .map(|(i, t)| RegressionTree::from_dump(t, dump.n_features).with_context(|| format!("invalid tree {}", i)))
        .collect::<Result<Vec<_>>>()?;
    let ensemble = Arc::new(TreeEnsemble::new(trees, dump.base_score, dump.n_features)?);

    match TreeExplainer::new(ensemble.clone()) {
        Ok(explainer) => Ok((ensemble, Some(explainer), None)),
        Err(e) => Ok((ensemble, None, Some(format!("{:#}", e)))),
    }
}
