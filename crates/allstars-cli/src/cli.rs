use std::path::PathBuf;

use clap::{Arg, ArgAction, Command, ValueHint};

/// Command-line definition of the `allstars` binary.
pub fn build_cli() -> Command {
    Command::new("allstars")
        .version(clap::crate_version!())
        .about("Automated model selection over classical estimators, with stacking")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("fit")
                .about("Search estimator families and hyperparameters on a labeled dataset")
                .arg(
                    Arg::new("train_data")
                        .help("Path to the training data (*.csv or *.tsv)")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("label")
                        .short('l')
                        .long("label")
                        .help("Name of the label column")
                        .required(true)
                        .value_parser(clap::builder::NonEmptyStringValueParser::new()),
                )
                .arg(
                    Arg::new("test_data")
                        .short('t')
                        .long("test")
                        .help("Held-out data used to score the best model")
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .help("Path to a JSON configuration file. Missing fields use defaults.")
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("n_trials")
                        .short('n')
                        .long("n-trials")
                        .help("Trials per search stage. Overrides the configuration file.")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .help("Seconds per search stage. Overrides the configuration file.")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    Arg::new("no_stacking")
                        .long("no-stacking")
                        .help("Skip the stacking search.")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("no_feature_selection")
                        .long("no-feature-selection")
                        .help("Use every feature instead of running random-forest selection.")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("report_file")
                        .short('r')
                        .long("report")
                        .help("Path of the HTML report to write")
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("output_file")
                        .short('o')
                        .long("output")
                        .help("Path of the JSON summary to write")
                        .value_parser(clap::value_parser!(PathBuf))
                        .value_hint(ValueHint::FilePath),
                ),
        )
        .subcommand(Command::new("config").about("Print the default configuration as JSON"))
}
