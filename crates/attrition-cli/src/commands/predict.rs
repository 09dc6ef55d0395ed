use anyhow::{bail, Result};
use std::path::Path;
use std::time::Instant;

use attrition_core::{AttritionService, Variant};

use crate::input::{read_json_records, read_records};
use crate::output::{write_json, write_predictions};

/// Predict and explain exactly one record.
pub fn run_predict(service: &AttritionService, variant: Variant, input: &Path, output: Option<&Path>) -> Result<()> {
    let mut records = read_json_records(input)?;
    if records.len() != 1 {
        bail!(
            "predict expects a single record, {:?} holds {}. Use `batch` instead.",
            input,
            records.len()
        );
    }
    let record = records.remove(0);
    let prediction = service.single_predict(variant, &record)?;
    log::info!(
        "[{}] {:.4} ({})",
        variant,
        prediction.attrition_probability,
        prediction.risk_level
    );
    write_json(&prediction, output)
}

pub fn run_batch(service: &AttritionService, variant: Variant, input: &Path, output: Option<&Path>) -> Result<()> {
    let start = Instant::now();
    let records = read_records(input, service.schema_for(variant)?)?;
    let predictions = service.batch_predict(variant, &records)?;
    log::info!(
        "[{}] Scored {} record(s) in {:.2?}",
        variant,
        predictions.len(),
        start.elapsed()
    );
    write_predictions(&predictions, output)
}

/// Per-record contribution detail, largest magnitude first.
pub fn run_explain(
    service: &AttritionService,
    variant: Variant,
    input: &Path,
    limit: Option<usize>,
    output: Option<&Path>,
) -> Result<()> {
    let records = read_records(input, service.schema_for(variant)?)?;
    let explanations = service.explain_records(variant, &records, limit)?;
    write_json(&explanations, output)
}
