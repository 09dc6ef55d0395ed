use anyhow::Result;
use clap::{Arg, ArgMatches, Command, ValueHint};
use log::LevelFilter;
use std::path::PathBuf;

use attrition_cli::commands::{predict, report};
use attrition_cli::input::service_config_from_arguments;
use attrition_core::{AttritionError, AttritionService, Variant};

fn variant_arg() -> Arg {
    Arg::new("variant")
        .help("Model variant to use")
        .required(true)
        .value_parser(["demographic", "survey"])
}

fn input_arg(help: &'static str) -> Arg {
    Arg::new("input")
        .help(help)
        .required(true)
        .value_parser(clap::value_parser!(PathBuf))
        .value_hint(ValueHint::FilePath)
}

fn output_arg(help: &'static str) -> Arg {
    Arg::new("output")
        .short('o')
        .long("output")
        .help(help)
        .value_parser(clap::value_parser!(PathBuf))
        .value_hint(ValueHint::FilePath)
}

fn path_arg(id: &'static str, long: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .long(long)
        .help(help)
        .global(true)
        .value_parser(clap::value_parser!(PathBuf))
        .value_hint(ValueHint::FilePath)
}

fn build_cli() -> Command {
    Command::new("attrition")
        .version(clap::crate_version!())
        .author("Attrition Insights Team")
        .about("Attrition-risk predictions with per-feature explanations")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Path to the service configuration file (JSON)")
                .global(true)
                .value_parser(clap::value_parser!(PathBuf))
                .value_hint(ValueHint::FilePath),
        )
        .arg(path_arg(
            "demographic_bundle",
            "demographic-bundle",
            "Demographic model bundle. Overrides the configuration file.",
        ))
        .arg(path_arg(
            "survey_bundle",
            "survey-bundle",
            "Survey model bundle. Overrides the configuration file.",
        ))
        .arg(path_arg(
            "demographic_reference",
            "demographic-reference",
            "Reference data for the demographic baseline sample (*.csv or *.tsv)",
        ))
        .arg(path_arg(
            "survey_reference",
            "survey-reference",
            "Reference data for the survey baseline sample (*.csv or *.tsv)",
        ))
        .subcommand(
            Command::new("predict")
                .about("Predict attrition risk for a single record")
                .arg(variant_arg())
                .arg(input_arg("JSON file holding one record"))
                .arg(output_arg("Write the prediction here instead of stdout")),
        )
        .subcommand(
            Command::new("batch")
                .about("Predict attrition risk for many records at once")
                .arg(variant_arg())
                .arg(input_arg("JSON array of records, or a *.csv / *.tsv table"))
                .arg(output_arg(
                    "Output file. *.csv and *.tsv are written as tables, anything else as JSON.",
                )),
        )
        .subcommand(
            Command::new("explain")
                .about("Show every significant feature contribution per record")
                .arg(variant_arg())
                .arg(input_arg("JSON record(s), or a *.csv / *.tsv table"))
                .arg(
                    Arg::new("limit")
                        .short('n')
                        .long("limit")
                        .help("Maximum contributions per record (default 15)")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(output_arg("Write the explanations here instead of stdout")),
        )
        .subcommand(
            Command::new("health")
                .about("Report the load state of each model variant")
                .arg(output_arg("Write the report here instead of stdout")),
        )
        .subcommand(
            Command::new("features")
                .about("List the feature names each variant expects")
                .arg(
                    Arg::new("variant")
                        .help("Restrict the listing to one variant")
                        .value_parser(["demographic", "survey"]),
                )
                .arg(output_arg("Write the catalog here instead of stdout")),
        )
        .subcommand(
            Command::new("baseline")
                .about("Global feature importance or a dependence series from the baseline sample")
                .arg(variant_arg())
                .arg(
                    Arg::new("feature")
                        .short('f')
                        .long("feature")
                        .help("Feature to build a dependence series for")
                        .value_parser(clap::builder::NonEmptyStringValueParser::new()),
                )
                .arg(output_arg("Write the result here instead of stdout")),
        )
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Written by {author-with-newline}Version {version}\n\n\
             {all-args}{after-help}",
        )
}

fn main() {
    env_logger::Builder::default()
        .filter_level(LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("ATTRITION_LOG", "error,attrition=info"))
        .init();

    let matches = build_cli().get_matches();

    let succeeded = match run(&matches) {
        Ok(succeeded) => succeeded,
        Err(e) => {
            match e.downcast_ref::<AttritionError>() {
                Some(err) => {
                    log::error!("{}", err);
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&err.to_response()).unwrap_or_default()
                    );
                }
                None => log::error!("{:#}", e),
            }
            false
        }
    };
    if !succeeded {
        std::process::exit(1);
    }
}

/// Run the selected subcommand. `Ok(false)` means it completed but the
/// process should still exit with a failure status.
fn run(matches: &ArgMatches) -> Result<bool> {
    let config = service_config_from_arguments(matches)?;
    let service = AttritionService::from_config(&config);

    match matches.subcommand() {
        Some(("predict", sub_m)) => {
            let (variant, input) = variant_and_input(sub_m)?;
            predict::run_predict(&service, variant, input, output_path(sub_m))?;
        }
        Some(("batch", sub_m)) => {
            let (variant, input) = variant_and_input(sub_m)?;
            predict::run_batch(&service, variant, input, output_path(sub_m))?;
        }
        Some(("explain", sub_m)) => {
            let (variant, input) = variant_and_input(sub_m)?;
            let limit = sub_m.get_one::<usize>("limit").copied();
            predict::run_explain(&service, variant, input, limit, output_path(sub_m))?;
        }
        Some(("health", sub_m)) => {
            let serving = report::run_health(&service, output_path(sub_m))?;
            if !serving {
                log::error!("No model variant could be loaded");
            }
            return Ok(serving);
        }
        Some(("features", sub_m)) => {
            let variant = sub_m
                .get_one::<String>("variant")
                .map(|v| parse_variant(v))
                .transpose()?;
            report::run_features(&service, variant, output_path(sub_m))?;
        }
        Some(("baseline", sub_m)) => {
            let variant = required_variant(sub_m)?;
            let feature = sub_m.get_one::<String>("feature").map(String::as_str);
            report::run_baseline(&service, variant, feature, output_path(sub_m))?;
        }
        _ => unreachable!("Subcommand is required by CLI configuration"),
    }
    Ok(true)
}

fn parse_variant(value: &str) -> Result<Variant> {
    value.parse::<Variant>().map_err(anyhow::Error::msg)
}

fn required_variant(matches: &ArgMatches) -> Result<Variant> {
    let value = matches
        .get_one::<String>("variant")
        .ok_or_else(|| anyhow::anyhow!("A model variant is required"))?;
    parse_variant(value)
}

fn variant_and_input(matches: &ArgMatches) -> Result<(Variant, &PathBuf)> {
    let variant = required_variant(matches)?;
    let input = matches
        .get_one::<PathBuf>("input")
        .ok_or_else(|| anyhow::anyhow!("An input file is required"))?;
    Ok((variant, input))
}

fn output_path(matches: &ArgMatches) -> Option<&std::path::Path> {
    matches.get_one::<PathBuf>("output").map(PathBuf::as_path)
}
