use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;

use allstars::data_handling::{Dataset, ProblemKind};
use allstars::driver::{fit_stacking, search};
use allstars::feature_selection::{select_features, FeatureSelection};
use allstars::io::{read_dataset_csv_with_config, CsvReaderConfig};
use allstars::report::build_fit_report;
use allstars::search::FamilySummary;

use crate::fit::input::FitCommandConfig;

/// JSON document written by `allstars fit --output`.
#[derive(Debug, Clone, Serialize)]
pub struct FitSummary {
    pub problem_kind: ProblemKind,
    pub best_model: Option<String>,
    pub best_score: Option<f64>,
    pub best_scores: BTreeMap<String, f64>,
    pub families: Vec<FamilySummary>,
    pub test_score: Option<f64>,
    pub stacking_best_score: Option<f64>,
    pub stacking_model_importances: Option<BTreeMap<String, f64>>,
    pub selected_features: Vec<String>,
}

/// Read a `.csv` or `.tsv` file. With `feature_columns`, exactly those
/// columns are loaded, in that order.
pub fn load_dataset(path: &Path, label_column: &str, feature_columns: Option<&[String]>) -> Result<Dataset> {
    let delimiter = match path.extension().and_then(|s| s.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
        _ => b',',
    };
    let config = CsvReaderConfig {
        label_column: label_column.to_string(),
        delimiter,
        feature_columns: feature_columns.map(<[String]>::to_vec),
        ..CsvReaderConfig::default()
    };
    read_dataset_csv_with_config(path, &config)
}

pub fn run_fit(params: &FitCommandConfig) -> Result<FitSummary> {
    let start_time = Instant::now();
    let config = &params.allstars;
    let train = load_dataset(&params.train_data, &params.label_column, None)?;
    let test = params
        .test_data
        .as_ref()
        .map(|path| {
            load_dataset(path, &params.label_column, Some(train.feature_names.as_slice()))
                .with_context(|| format!("Test data does not match the training columns: {}", path.display()))
        })
        .transpose()?;
    log::info!(
        "Loaded {} training rows with {} features",
        train.n_samples(),
        train.n_features()
    );

    let selection: Option<FeatureSelection> = if config.fit.feature_selection {
        Some(select_features(&train, &config.search).context("Feature selection failed")?)
    } else {
        None
    };
    let selected_features = match &selection {
        Some(selection) => selection.selected_names(),
        None => train.feature_names.clone(),
    };

    let objective = search(
        train.clone(),
        None,
        selection.as_ref().map(|s| s.mask.clone()),
        config,
    )
    .context("Model search failed")?;

    let stacking = if config.fit.stacking.enabled && !objective.registry().is_empty() {
        Some(fit_stacking(&objective, config).context("Stacking search failed")?)
    } else {
        None
    };

    let test_score = match &test {
        Some(test) if objective.best_model().is_some() => Some(objective.score(&test.x, &test.y)?),
        _ => None,
    };
    let stacking_model_importances = match stacking.as_ref().and_then(|s| s.best_model()) {
        Some(model) => Some(model.model_importances()?),
        None => None,
    };

    let summary = FitSummary {
        problem_kind: objective.kind(),
        best_model: objective.best_model().map(|m| m.family().name().to_string()),
        best_score: objective.best_score(),
        best_scores: objective.best_scores(),
        families: objective.summary(),
        test_score,
        stacking_best_score: stacking.as_ref().and_then(|s| s.best_score()),
        stacking_model_importances,
        selected_features,
    };

    if let Some(path) = &params.output_file {
        let json = serde_json::to_string_pretty(&summary)?;
        fs::write(path, json).with_context(|| format!("Failed to write summary: {}", path.display()))?;
        log::info!("Summary saved to: {}", path.display());
    }

    if let Some(path) = &params.report_file {
        let report = build_fit_report(
            &objective,
            stacking.as_ref(),
            selection.as_ref(),
            test.as_ref(),
            config,
        )?;
        report
            .save_to_file(&path.to_string_lossy())
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
    }

    log::info!("Model selection completed in {:?}", start_time.elapsed());
    Ok(summary)
}
