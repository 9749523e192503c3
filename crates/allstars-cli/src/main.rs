use anyhow::Result;
use clap::ArgMatches;
use log::LevelFilter;

use allstars::config::AllstarsConfig;
use allstars_cli::cli::build_cli;
use allstars_cli::fit::input::FitCommandConfig;
use allstars_cli::fit::runner;

fn main() -> Result<()> {
    env_logger::Builder::default()
        .filter_level(LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("ALLSTARS_LOG", "error,allstars=info"))
        .init();

    let matches = build_cli().get_matches();

    match matches.subcommand() {
        Some(("fit", sub_m)) => handle_fit(sub_m),
        Some(("config", _)) => {
            println!("{}", serde_json::to_string_pretty(&AllstarsConfig::default())?);
            Ok(())
        }
        _ => unreachable!("Subcommand is required by CLI configuration"),
    }
}

fn handle_fit(matches: &ArgMatches) -> Result<()> {
    let params = FitCommandConfig::from_arguments(matches)?;
    log::info!("[allstars] Fitting on {:?}", params.train_data);

    match runner::run_fit(&params) {
        Ok(summary) => {
            if params.output_file.is_none() {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            Ok(())
        }
        Err(e) => {
            log::error!("Model selection failed: {:#}", e);
            std::process::exit(1)
        }
    }
}
