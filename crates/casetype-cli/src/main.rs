use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command, ValueHint};
use log::LevelFilter;
use std::path::PathBuf;

use casetype_classifiers::artifact;
use casetype_classifiers::io::JsonFileStore;
use casetype_classifiers::report::write_importance_report;
use casetype_cli::cases;
use casetype_cli::seed::run_seed;
use casetype_cli::serve::handlers::{
    read_request_body, request_from_flags, run_health, run_importances, run_predict,
};
use casetype_cli::serve::input::ServeConfig;
use casetype_cli::train::input::TrainConfig;
use casetype_cli::train::trainer;
use casetype_cli::util::print_json;

fn model_arg() -> Arg {
    Arg::new("model_path")
        .short('m')
        .long("model")
        .help("Path to the model artifact. Defaults to $CASETYPE_MODEL, then model.bin")
        .value_parser(clap::value_parser!(PathBuf))
        .value_hint(ValueHint::FilePath)
}

fn store_arg() -> Arg {
    Arg::new("store")
        .long("store")
        .help("JSON case store")
        .default_value("cases.json")
        .value_parser(clap::value_parser!(PathBuf))
        .value_hint(ValueHint::FilePath)
}

fn case_date_arg() -> Arg {
    Arg::new("case_date")
        .help("Case date (data_do_caso), e.g. 2024-05-01")
        .required(true)
        .value_parser(clap::builder::NonEmptyStringValueParser::new())
}

fn main() -> Result<()> {
    env_logger::Builder::default()
        .filter_level(LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("CASETYPE_LOG", "error,casetype=info"))
        .init();

    let matches = Command::new("casetype")
        .version(clap::crate_version!())
        .about("Case-type classification: train, inspect and query case models")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("train")
                .about("Train a model from stored case records")
                .arg(
                    Arg::new("config")
                        .help("Path to training configuration file (JSON)")
                        .required(false)
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("train_data")
                        .short('d')
                        .long("train_data")
                        .value_parser(clap::builder::NonEmptyStringValueParser::new())
                        .help(
                            "Path to case records (*.json or *.csv). Overrides the training \
                             data file specified in the configuration file.",
                        )
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("output_file")
                        .short('o')
                        .long("output_file")
                        .value_parser(clap::builder::NonEmptyStringValueParser::new())
                        .help("File path that the model artifact will be written to.")
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("report_file")
                        .short('r')
                        .long("report_file")
                        .value_parser(clap::builder::NonEmptyStringValueParser::new())
                        .help("Write an HTML feature importance report to this path.")
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("learning_rate")
                        .long("learning_rate")
                        .value_parser(clap::value_parser!(f64))
                        .help("Shrinkage applied to every boosting round."),
                )
                .arg(
                    Arg::new("max_depth")
                        .long("max_depth")
                        .value_parser(clap::value_parser!(u32))
                        .help("Maximum depth of each tree."),
                )
                .arg(
                    Arg::new("num_boost_round")
                        .long("num_boost_round")
                        .value_parser(clap::value_parser!(u32))
                        .help("Number of boosting rounds."),
                ),
        )
        .subcommand(
            Command::new("predict")
                .about("Predict the case type for one victim profile, or a batch from a file")
                .arg(model_arg())
                .arg(
                    Arg::new("input")
                        .short('i')
                        .long("input")
                        .help("JSON request file: one object, or an array of objects")
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath)
                        .conflicts_with_all(["idade", "etnia", "localizacao"]),
                )
                .arg(
                    Arg::new("idade")
                        .long("idade")
                        .help("Victim age")
                        .value_parser(clap::value_parser!(u32)),
                )
                .arg(
                    Arg::new("etnia")
                        .long("etnia")
                        .help("Victim ethnicity")
                        .value_parser(clap::builder::NonEmptyStringValueParser::new()),
                )
                .arg(
                    Arg::new("localizacao")
                        .long("localizacao")
                        .help("Case location")
                        .value_parser(clap::builder::NonEmptyStringValueParser::new()),
                ),
        )
        .subcommand(
            Command::new("importances")
                .about("Print the importance of every encoded feature")
                .arg(model_arg()),
        )
        .subcommand(
            Command::new("report")
                .about("Write an HTML feature importance report for a trained model")
                .arg(model_arg())
                .arg(
                    Arg::new("output_file")
                        .short('o')
                        .long("output_file")
                        .help("Path of the HTML report")
                        .default_value("casetype_report.html")
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                ),
        )
        .subcommand(
            Command::new("seed")
                .about("Generate synthetic case records")
                .arg(
                    Arg::new("count")
                        .short('n')
                        .long("count")
                        .help("Number of cases to generate")
                        .default_value("20")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("seed")
                        .short('s')
                        .long("seed")
                        .help("Random seed for reproducible output")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .help("JSON case store to append to. Defaults to stdout.")
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                ),
        )
        .subcommand(
            Command::new("cases")
                .about("List, look up, add or delete stored case records")
                .subcommand_required(true)
                .subcommand(Command::new("list").about("Print every stored case").arg(store_arg()))
                .subcommand(
                    Command::new("get")
                        .about("Print the first case with the given date")
                        .arg(case_date_arg())
                        .arg(store_arg()),
                )
                .subcommand(
                    Command::new("add")
                        .about("Validate and store the cases in a JSON file (object or array)")
                        .arg(
                            Arg::new("input")
                                .help("JSON file with the cases to add")
                                .required(true)
                                .value_parser(clap::value_parser!(PathBuf))
                                .value_hint(ValueHint::FilePath),
                        )
                        .arg(store_arg()),
                )
                .subcommand(
                    Command::new("delete")
                        .about("Delete the first case with the given date")
                        .arg(case_date_arg())
                        .arg(store_arg()),
                ),
        )
        .subcommand(
            Command::new("health")
                .about("Report whether the model loads and the case store is reachable")
                .arg(model_arg())
                .arg(
                    Arg::new("store")
                        .long("store")
                        .help("JSON case store to count records in")
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                ),
        )
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Version {version}\n\n\
             {all-args}{after-help}",
        )
        .get_matches();

    let outcome = match matches.subcommand() {
        Some(("train", sub_m)) => handle_train(sub_m),
        Some(("predict", sub_m)) => handle_predict(sub_m),
        Some(("importances", sub_m)) => handle_importances(sub_m),
        Some(("report", sub_m)) => handle_report(sub_m),
        Some(("seed", sub_m)) => handle_seed(sub_m),
        Some(("cases", sub_m)) => handle_cases(sub_m),
        Some(("health", sub_m)) => handle_health(sub_m),
        _ => unreachable!("Subcommand is required by CLI configuration"),
    };

    if let Err(e) = outcome {
        log::error!("{:#}", e);
        std::process::exit(1)
    }
    Ok(())
}

fn handle_train(matches: &ArgMatches) -> Result<()> {
    let config_path = matches.get_one::<PathBuf>("config");
    if config_path.is_none() && matches.get_one::<String>("train_data").is_none() {
        eprintln!("[casetype] No config file provided; printing a template configuration.");
        return print_json(&TrainConfig::default());
    }
    if let Some(path) = config_path {
        log::info!("[casetype::train] Training from config: {:?}", path);
    }

    let params = TrainConfig::from_arguments(config_path, matches)?;
    trainer::run_training(&params).context("Training failed")?;
    Ok(())
}

fn handle_predict(matches: &ArgMatches) -> Result<()> {
    let config = ServeConfig::from_arguments(matches);
    let body = match matches.get_one::<PathBuf>("input") {
        Some(path) => read_request_body(path)?,
        None => request_from_flags(matches),
    };
    let ctx = config.context();
    let response = run_predict(&ctx, &body).context("Prediction failed")?;
    print_json(&response)
}

fn handle_importances(matches: &ArgMatches) -> Result<()> {
    let ctx = ServeConfig::from_arguments(matches).context();
    let response = run_importances(&ctx).context("Feature importance report failed")?;
    print_json(&response)
}

fn handle_report(matches: &ArgMatches) -> Result<()> {
    let config = ServeConfig::from_arguments(matches);
    let output: &PathBuf = matches
        .get_one("output_file")
        .context("--output_file has a default value")?;
    let model = artifact::load_from_path(&config.model_path)
        .with_context(|| format!("Failed to load model: {}", config.model_path.display()))?;
    write_importance_report(&model, output, "Case type model")
        .with_context(|| format!("Failed to write report: {}", output.display()))
}

fn handle_seed(matches: &ArgMatches) -> Result<()> {
    let count = matches.get_one::<usize>("count").copied().unwrap_or(20);
    let seed = matches.get_one::<u64>("seed").copied();
    let output = matches.get_one::<PathBuf>("output");
    run_seed(count, seed, output.map(PathBuf::as_path))?;
    Ok(())
}

fn handle_cases(matches: &ArgMatches) -> Result<()> {
    let (name, sub_m) = matches
        .subcommand()
        .context("A cases subcommand is required")?;
    let store_path: &PathBuf = sub_m
        .get_one("store")
        .context("--store has a default value")?;
    let store = JsonFileStore::new(store_path);
    let case_date = || {
        sub_m
            .get_one::<String>("case_date")
            .map(String::as_str)
            .context("A case date is required")
    };
    match name {
        "list" => cases::run_list(&store),
        "get" => cases::run_get(&store, case_date()?),
        "delete" => cases::run_delete(&store, case_date()?),
        "add" => {
            let input: &PathBuf = sub_m.get_one("input").context("An input file is required")?;
            cases::run_add(&store, input).map(|_| ())
        }
        _ => unreachable!(),
    }
}

fn handle_health(matches: &ArgMatches) -> Result<()> {
    let ctx = ServeConfig::from_arguments(matches).context();
    print_json(&run_health(&ctx))
}
