use anyhow::Result;
use std::path::Path;

use attrition_core::service::ServiceHealth;
use attrition_core::{AttritionService, Variant};

use crate::output::write_json;

/// Print the health report. Returns whether any model is being served.
pub fn run_health(service: &AttritionService, output: Option<&Path>) -> Result<bool> {
    let report = service.health();
    write_json(&report, output)?;
    Ok(report.status != ServiceHealth::Unavailable)
}

/// Feature catalog for one variant, or for every loaded variant.
pub fn run_features(service: &AttritionService, variant: Option<Variant>, output: Option<&Path>) -> Result<()> {
    let mut catalog = service.features();
    if let Some(v) = variant {
        // Surfaces the unavailable error when the variant did not load.
        service.schema_for(v)?;
        catalog.retain(|k, _| *k == v);
    }
    write_json(&catalog, output)
}

/// Global importance from the baseline sample, or a dependence series when
/// a feature is named.
pub fn run_baseline(
    service: &AttritionService,
    variant: Variant,
    feature: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    match feature {
        Some(name) => write_json(&service.dependence(variant, name)?, output),
        None => write_json(&service.feature_importance(variant)?, output),
    }
}
