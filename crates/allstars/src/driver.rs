//! Driving loop: per-family stages, an open stage and optional stacking.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::config::AllstarsConfig;
use crate::data_handling::{Dataset, FeatureMask};
use crate::error::Result;
use crate::feature_selection::select_features;
use crate::search::objective::Objective;
use crate::search::stacking::StackingObjective;
use crate::search::study::{Direction, Study};
use crate::search::trial::ParameterValue;

/// Select features (if enabled) and run the single-level search.
pub fn fit(train: Dataset, test: Option<Dataset>, config: &AllstarsConfig) -> Result<Objective> {
    let support = if config.fit.feature_selection {
        Some(select_features(&train, &config.search)?.mask)
    } else {
        None
    };
    search(train, test, support, config)
}

/// Run one stage per active family, each seeded with trials pinned to that
/// family, then one stage open to every family.
///
/// Pinned trials left over when a stage runs out of time are consumed by the
/// next stage.
pub fn search(
    train: Dataset,
    test: Option<Dataset>,
    support: Option<FeatureMask>,
    config: &AllstarsConfig,
) -> Result<Objective> {
    let mut objective = Objective::new(train, test, support, config.search.clone())?;
    let mut study = Study::create(Direction::Maximize, config.search.seed);
    let timeout = Some(Duration::from_secs(config.fit.timeout_secs));
    let n_trials = Some(config.fit.n_trials);
    let started = Instant::now();

    for family in objective.get_model_names().to_vec() {
        log::info!("Searching {} ({} trials)", family, config.fit.n_trials);
        for _ in 0..config.fit.n_trials {
            let mut pinned = BTreeMap::new();
            pinned.insert("model_name".to_string(), ParameterValue::from(family.name()));
            study.enqueue_trial(pinned);
        }
        study.optimize(&mut objective, timeout, n_trials, config.fit.show_progress_bar)?;
        match objective.registry().get(family) {
            Some(best) => log::info!("Best {} score: {:.6}", family, best.score),
            None => log::info!("No {} trial completed", family),
        }
    }

    log::info!("Searching across all families");
    study.optimize(&mut objective, timeout, n_trials, config.fit.show_progress_bar)?;
    if let (Some(score), Some(model)) = (objective.best_score(), objective.best_model()) {
        log::info!(
            "Best model {} with score {:.6} after {} trials in {:.2?}",
            model.family(),
            score,
            study.trials().len(),
            started.elapsed()
        );
    }
    Ok(objective)
}

/// Run the stacking search over the champions of `objective`.
///
/// Two trials are queued first: one including every family and one including
/// the families whose best score is at least the mean best score.
pub fn fit_stacking(objective: &Objective, config: &AllstarsConfig) -> Result<StackingObjective> {
    let stacking_config = &config.fit.stacking;
    let mut stacking = StackingObjective::new(objective, stacking_config.clone())?;
    let scores = objective.best_scores();
    let mean = scores.values().sum::<f64>() / scores.len() as f64;

    let include_all: BTreeMap<String, ParameterValue> =
        scores.keys().map(|name| (name.clone(), ParameterValue::from(1i64))).collect();
    let include_above_mean: BTreeMap<String, ParameterValue> = scores
        .iter()
        .map(|(name, score)| (name.clone(), ParameterValue::from(i64::from(*score >= mean))))
        .collect();

    let mut study = Study::create(Direction::Maximize, config.search.seed);
    study.enqueue_trial(include_all);
    study.enqueue_trial(include_above_mean);

    log::info!(
        "Stacking {} families ({} trials)",
        stacking.families().len(),
        stacking_config.n_trials
    );
    study.optimize(
        &mut stacking,
        Some(Duration::from_secs(stacking_config.timeout_secs)),
        Some(stacking_config.n_trials),
        config.fit.show_progress_bar,
    )?;
    if let Some(score) = stacking.best_score() {
        log::info!("Best stacking score: {:.6}", score);
    }
    Ok(stacking)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::factory::Family;
    use ndarray::{Array1, Array2};

    #[test]
    fn every_family_stage_gets_its_pinned_trials() {
        let x = Array2::from_shape_fn((30, 2), |(r, c)| if c == 0 { r as f64 } else { ((r * 7) % 11) as f64 });
        let y = Array1::from_iter((0..30).map(|r| if r < 15 { 0.0 } else { 1.0 }));
        let mut config = AllstarsConfig::default();
        config.search.classifier_names = vec![Family::Knn, Family::Lda];
        config.search.seed = Some(2);
        config.fit.n_trials = 2;
        config.fit.feature_selection = false;

        let objective = fit(Dataset::from_arrays(x, y).unwrap(), None, &config).unwrap();
        let selected: usize = objective.scores().values().map(Vec::len).sum();
        assert_eq!(selected, 6);
        assert!(objective.scores()[&Family::Knn].len() >= 2);
        assert!(objective.scores()[&Family::Lda].len() >= 2);
        assert_eq!(objective.best_models().len(), 2);
    }
}
