//! End-to-end tests of the driving loop, stacking, CSV input and reporting.

use std::io::Write;

use ndarray::{Array1, Array2};

use allstars::config::AllstarsConfig;
use allstars::data_handling::Dataset;
use allstars::driver::{fit, fit_stacking, search};
use allstars::io::read_dataset_csv;
use allstars::models::factory::Family;
use allstars::report::build_fit_report;
use allstars::search::{FixedTrial, ObjectiveFunction, StackingObjective, LOW_SCORE_SENTINEL};

fn blobs(n: usize) -> Dataset {
    let x = Array2::from_shape_fn((n, 3), |(r, c)| match c {
        0 => if r < n / 2 { r as f64 * 0.1 } else { 10.0 + r as f64 * 0.1 },
        1 => ((r * 7) % 11) as f64,
        _ => ((r * 3) % 5) as f64,
    });
    let y = Array1::from_iter((0..n).map(|r| if r < n / 2 { 0.0 } else { 1.0 }));
    Dataset::from_arrays(x, y).unwrap()
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn small_config(families: Vec<Family>) -> AllstarsConfig {
    init_logging();
    let mut config = AllstarsConfig::default();
    config.search.classifier_names = families;
    config.search.seed = Some(21);
    config.search.split_seed = Some(21);
    config.fit.n_trials = 2;
    config.fit.timeout_secs = 60;
    config.fit.feature_selection = false;
    config.fit.stacking.n_trials = 4;
    config.fit.stacking.split_seed = Some(4);
    config
}

// ---------------------------------------------------------------------------
// Driving loop
// ---------------------------------------------------------------------------

#[test]
fn driving_loop_fills_one_champion_per_family() {
    let config = small_config(vec![Family::Knn, Family::Lda, Family::Qda]);
    let objective = fit(blobs(40), None, &config).unwrap();

    let best = objective.best_scores();
    assert_eq!(best.keys().cloned().collect::<Vec<_>>(), vec!["LDA", "QDA", "kNN"]);
    let summary = objective.summary();
    assert_eq!(summary.iter().map(|s| s.n_selected).sum::<usize>(), 8);
    assert!(objective.best_model().is_some());
}

#[test]
fn stacking_is_seeded_with_all_and_above_mean() {
    let config = small_config(vec![Family::Knn, Family::Lda]);
    let objective = search(blobs(40), None, None, &config).unwrap();
    let stacking = fit_stacking(&objective, &config).unwrap();

    assert!(stacking.already_tried().contains("kNN,LDA"));
    let best = stacking.best_score().unwrap();
    assert!(best > LOW_SCORE_SENTINEL);
    let model = stacking.best_model().unwrap();
    let data = blobs(40);
    assert_eq!(model.predict(&data.x).unwrap().len(), 40);
}

#[test]
fn first_degenerate_stacking_trial_is_kept_as_best() {
    let config = small_config(vec![Family::Lda]);
    let objective = search(blobs(30), None, None, &config).unwrap();
    let mut stacking = StackingObjective::new(&objective, config.fit.stacking.clone()).unwrap();

    let score = stacking.evaluate(&mut FixedTrial::default().with("LDA", 0i64)).unwrap();
    assert_eq!(score, -530000.0);
    assert_eq!(stacking.best_score(), Some(-530000.0));
    assert!(stacking.best_model().is_none());
}

// ---------------------------------------------------------------------------
// Csv and report
// ---------------------------------------------------------------------------

#[test]
fn csv_to_report_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("train.csv");
    let mut file = std::fs::File::create(&csv_path).unwrap();
    writeln!(file, "a,b,target").unwrap();
    for r in 0..30 {
        let class = if r < 15 { 0 } else { 1 };
        writeln!(file, "{},{},{}", r as f64 + class as f64 * 5.0, (r * 7) % 11, class).unwrap();
    }
    drop(file);

    let train = read_dataset_csv(&csv_path, "target").unwrap();
    assert_eq!(train.feature_names, vec!["a", "b"]);

    let config = small_config(vec![Family::Lda]);
    let objective = fit(train.clone(), None, &config).unwrap();
    let report = build_fit_report(&objective, None, None, Some(&train), &config).unwrap();
    let path = dir.path().join("report.html");
    report.save_to_file(path.to_str().unwrap()).unwrap();
    let html = std::fs::read_to_string(path).unwrap();
    assert!(html.contains("Overview"));
    assert!(html.contains("Evaluation"));
}
