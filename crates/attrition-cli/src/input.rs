use anyhow::{Context, Result};
use clap::ArgMatches;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use attrition_core::config::{load_service_config, ServiceConfig};
use attrition_core::io::read_request_records;
use attrition_core::normalize::InputRecord;
use attrition_core::schema::FeatureSchema;

/// Build the service configuration from an optional JSON file plus command
/// line overrides. Without a file the default model locations are used.
pub fn service_config_from_arguments(matches: &ArgMatches) -> Result<ServiceConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(config_path) => load_service_config(config_path)?,
        None => {
            log::info!("No config file provided; using default model locations.");
            ServiceConfig::default()
        }
    };

    // Apply CLI overrides
    if let Some(path) = matches.get_one::<PathBuf>("demographic_bundle") {
        config.demographic.bundle_path = path.clone();
    }
    if let Some(path) = matches.get_one::<PathBuf>("survey_bundle") {
        config.survey.bundle_path = path.clone();
    }
    if let Some(path) = matches.get_one::<PathBuf>("demographic_reference") {
        config.demographic.reference_data = Some(path.clone());
    }
    if let Some(path) = matches.get_one::<PathBuf>("survey_reference") {
        config.survey.reference_data = Some(path.clone());
    }

    Ok(config)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RecordsFile {
    Many(Vec<InputRecord>),
    One(InputRecord),
}

/// Read request records from a JSON file holding one object or an array of
/// objects.
pub fn read_json_records(path: &Path) -> Result<Vec<InputRecord>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {:?}", path))?;
    let parsed: RecordsFile = serde_json::from_str(&content)
        .with_context(|| format!("Input file {:?} is not a JSON object or array of objects", path))?;
    Ok(match parsed {
        RecordsFile::Many(records) => records,
        RecordsFile::One(record) => vec![record],
    })
}

/// Read request records from JSON, or from a `.csv`/`.tsv` table with one
/// record per row.
pub fn read_records(path: &Path, schema: &FeatureSchema) -> Result<Vec<InputRecord>> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase());
    match ext.as_deref() {
        Some("csv") | Some("tsv") => read_request_records(path, schema),
        _ => read_json_records(path),
    }
}
