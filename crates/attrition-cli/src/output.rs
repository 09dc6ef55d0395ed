use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use attrition_core::explain::{ContributionEntry, ExplanationStatus};
use attrition_core::service::PredictionOutput;

/// Pretty-print `value` as JSON to `output`, or stdout when none is given.
pub fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {:?}", path))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            serde_json::to_writer_pretty(&mut handle, value)?;
            handle.write_all(b"\n")?;
        }
    }
    Ok(())
}

/// Write predictions as CSV or TSV when the output path says so, otherwise
/// as JSON.
pub fn write_predictions(outputs: &[PredictionOutput], output: Option<&Path>) -> Result<()> {
    let delimiter = output
        .and_then(|p| p.extension())
        .and_then(|ext| ext.to_str())
        .and_then(|ext| match ext {
            "csv" => Some(b','),
            "tsv" => Some(b'\t'),
            _ => None,
        });
    match (output, delimiter) {
        (Some(path), Some(delimiter)) => write_prediction_table(outputs, path, delimiter),
        _ => write_json(&outputs, output),
    }
}

fn write_prediction_table(outputs: &[PredictionOutput], path: &Path, delimiter: u8) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create output file: {:?}", path))?;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(BufWriter::new(file));

    let id_columns: Vec<String> = outputs
        .first()
        .map(|o| o.identifiers.keys().cloned().collect())
        .unwrap_or_default();

    let mut header = id_columns.clone();
    header.extend(
        [
            "attrition_probability",
            "risk_level",
            "top_positive_contributors",
            "top_negative_contributors",
            "explanation",
            "base_value",
            "predicted_value",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    writer.write_record(&header)?;

    for out in outputs {
        let mut row: Vec<String> = id_columns
            .iter()
            .map(|c| out.identifiers.get(c).cloned().unwrap_or_default())
            .collect();
        row.push(format!("{:.6}", out.attrition_probability));
        row.push(out.risk_level.to_string());
        row.push(format_contributors(&out.top_positive_contributors));
        row.push(format_contributors(&out.top_negative_contributors));
        row.push(
            match out.explanation {
                ExplanationStatus::Available => "available",
                ExplanationStatus::Unavailable => "unavailable",
            }
            .to_string(),
        );
        row.push(format!("{:.6}", out.base_value));
        row.push(format!("{:.6}", out.predicted_value));
        writer.write_record(&row)?;
    }

    writer.flush()?;
    log::info!("Wrote {} prediction(s) to {:?}", outputs.len(), path);
    Ok(())
}

/// `Display Name:+0.8175|Other:+0.2625`
pub fn format_contributors(entries: &[ContributionEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{}:{:+.4}", e.display_name, e.contribution))
        .collect::<Vec<_>>()
        .join("|")
}
