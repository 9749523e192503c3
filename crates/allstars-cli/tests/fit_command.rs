//! Tests of `fit` argument handling and the full fit run.

use std::fs;
use std::io::Write;
use std::path::Path;

use allstars_cli::cli::build_cli;
use allstars_cli::fit::input::FitCommandConfig;
use allstars_cli::fit::runner::{load_dataset, run_fit};

fn write_dataset(path: &Path) {
    let mut file = fs::File::create(path).unwrap();
    writeln!(file, "x1,x2,outcome").unwrap();
    for r in 0..40 {
        let class = if r < 20 { 0 } else { 1 };
        writeln!(file, "{},{},{}", r as f64 + class as f64 * 10.0, (r * 7) % 11, class).unwrap();
    }
}

// ---------------------------------------------------------------------------
// Data loading
// ---------------------------------------------------------------------------

#[test]
fn test_columns_follow_the_training_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.csv");
    fs::write(&path, "b,outcome,a\n2.0,1,1.0\n4.0,0,3.0\n").unwrap();

    let order = vec!["a".to_string(), "b".to_string()];
    let test = load_dataset(&path, "outcome", Some(order.as_slice())).unwrap();
    assert_eq!(test.feature_names, order);
    assert_eq!(test.x.row(0).to_vec(), vec![1.0, 2.0]);

    let missing = vec!["a".to_string(), "c".to_string()];
    assert!(load_dataset(&path, "outcome", Some(missing.as_slice())).is_err());
}

// ---------------------------------------------------------------------------
// Argument parsing
// ---------------------------------------------------------------------------

#[test]
fn overrides_are_applied_on_top_of_the_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let train = dir.path().join("train.csv");
    write_dataset(&train);
    let config = dir.path().join("config.json");
    fs::write(&config, r#"{"fit": {"n_trials": 7, "timeout_secs": 3}}"#).unwrap();

    let matches = build_cli()
        .try_get_matches_from([
            "allstars",
            "fit",
            train.to_str().unwrap(),
            "--label",
            "outcome",
            "--config",
            config.to_str().unwrap(),
            "--timeout",
            "9",
            "--no-stacking",
        ])
        .unwrap();
    let (_, fit_matches) = matches.subcommand().unwrap();
    let params = FitCommandConfig::from_arguments(fit_matches).unwrap();

    assert_eq!(params.allstars.fit.n_trials, 7);
    assert_eq!(params.allstars.fit.timeout_secs, 9);
    assert!(!params.allstars.fit.stacking.enabled);
    assert!(params.allstars.fit.feature_selection);
    assert_eq!(params.label_column, "outcome");
}

#[test]
fn non_tabular_extensions_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let train = dir.path().join("train.json");
    fs::write(&train, "{}").unwrap();
    let matches = build_cli()
        .try_get_matches_from(["allstars", "fit", train.to_str().unwrap(), "--label", "y"])
        .unwrap();
    let (_, fit_matches) = matches.subcommand().unwrap();
    assert!(FitCommandConfig::from_arguments(fit_matches).is_err());
}

// ---------------------------------------------------------------------------
// End to end
// ---------------------------------------------------------------------------

#[test]
fn fit_writes_summary_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let train = dir.path().join("train.csv");
    write_dataset(&train);
    let config = dir.path().join("config.json");
    fs::write(
        &config,
        r#"{
            "search": {"classifier_names": ["kNN", "LDA"], "seed": 3, "split_seed": 3},
            "fit": {"n_trials": 2, "feature_selection": false, "stacking": {"n_trials": 3, "split_seed": 1}}
        }"#,
    )
    .unwrap();
    let summary_path = dir.path().join("summary.json");
    let report_path = dir.path().join("report.html");

    let matches = build_cli()
        .try_get_matches_from([
            "allstars",
            "fit",
            train.to_str().unwrap(),
            "-l",
            "outcome",
            "-c",
            config.to_str().unwrap(),
            "--test",
            train.to_str().unwrap(),
            "-o",
            summary_path.to_str().unwrap(),
            "-r",
            report_path.to_str().unwrap(),
        ])
        .unwrap();
    let (_, fit_matches) = matches.subcommand().unwrap();
    let params = FitCommandConfig::from_arguments(fit_matches).unwrap();
    let summary = run_fit(&params).unwrap();

    assert_eq!(summary.best_scores.len(), 2);
    assert!(summary.test_score.is_some());
    assert!(summary.stacking_best_score.is_some());
    assert_eq!(summary.selected_features, vec!["x1", "x2"]);

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(summary_path).unwrap()).unwrap();
    assert_eq!(json["problem_kind"], "Classification");
    assert!(fs::read_to_string(report_path).unwrap().contains("Stacking"));
}
