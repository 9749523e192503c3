use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ArgMatches;

use allstars::config::AllstarsConfig;

/// Everything the `fit` subcommand needs, after CLI overrides.
#[derive(Debug, Clone)]
pub struct FitCommandConfig {
    pub train_data: PathBuf,
    pub test_data: Option<PathBuf>,
    pub label_column: String,
    pub report_file: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
    pub allstars: AllstarsConfig,
}

impl FitCommandConfig {
    pub fn from_arguments(matches: &ArgMatches) -> Result<Self> {
        let train_data: PathBuf = matches
            .get_one::<PathBuf>("train_data")
            .cloned()
            .context("Missing training data path")?;
        validate_tsv_or_csv_file(&train_data)?;

        let test_data = matches.get_one::<PathBuf>("test_data").cloned();
        if let Some(path) = &test_data {
            validate_tsv_or_csv_file(path)?;
        }

        let mut allstars = match matches.get_one::<PathBuf>("config") {
            Some(path) => load_config(path)?,
            None => AllstarsConfig::default(),
        };

        if let Some(n_trials) = matches.get_one::<usize>("n_trials") {
            allstars.fit.n_trials = *n_trials;
        }
        if let Some(timeout) = matches.get_one::<u64>("timeout") {
            allstars.fit.timeout_secs = *timeout;
        }
        if matches.get_flag("no_stacking") {
            allstars.fit.stacking.enabled = false;
        }
        if matches.get_flag("no_feature_selection") {
            allstars.fit.feature_selection = false;
        }

        Ok(Self {
            train_data,
            test_data,
            label_column: matches
                .get_one::<String>("label")
                .cloned()
                .unwrap_or_else(|| "label".to_string()),
            report_file: matches.get_one::<PathBuf>("report_file").cloned(),
            output_file: matches.get_one::<PathBuf>("output_file").cloned(),
            allstars,
        })
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AllstarsConfig> {
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
    let config: AllstarsConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config: {}", path.as_ref().display()))?;
    Ok(config)
}

pub fn validate_tsv_or_csv_file(path: &Path) -> Result<()> {
    let ext = path.extension().and_then(|s| s.to_str()).map(|s| s.to_lowercase());
    match ext.as_deref() {
        Some("tsv") | Some("csv") => {}
        _ => anyhow::bail!("File must have a .tsv or .csv extension: {}", path.display()),
    }
    if !path.exists() {
        anyhow::bail!("File does not exist: {}", path.display());
    }
    Ok(())
}
