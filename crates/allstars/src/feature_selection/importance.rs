//! Random-forest importance based feature selection.

use std::time::Duration;

use ndarray::Array1;

use crate::config::SearchConfig;
use crate::data_handling::{Dataset, FeatureMask};
use crate::error::Result;
use crate::models::factory::Family;
use crate::search::objective::Objective;
use crate::search::study::{Direction, Study};

const SELECTION_TIMEOUT: Duration = Duration::from_secs(30);
const SELECTION_TRIALS: usize = 20;

/// Outcome of [`select_features`].
#[derive(Debug, Clone)]
pub struct FeatureSelection {
    pub mask: FeatureMask,
    /// Importances of the best forest over every input column, if any trial completed
    pub importances: Option<Array1<f64>>,
    pub feature_names: Vec<String>,
}

impl FeatureSelection {
    /// Names of the retained columns.
    pub fn selected_names(&self) -> Vec<String> {
        self.mask
            .selected_indices()
            .into_iter()
            .map(|i| self.feature_names[i].clone())
            .collect()
    }
}

/// Derive a support mask from feature importances.
///
/// Columns with a non-zero importance are kept. When every column has a
/// non-zero importance the mask falls back to the columns whose importance is
/// at least the mean importance.
///
/// # Parameters
///
/// * `importances` - Normalized importance per column.
///
/// # Returns
///
/// A [`FeatureMask`] with one entry per column.
pub fn support_from_importances(importances: &Array1<f64>) -> FeatureMask {
    let non_zero: Vec<bool> = importances.iter().map(|&v| v != 0.0).collect();
    if !non_zero.iter().all(|&keep| keep) {
        return FeatureMask::new(non_zero);
    }
    let mean = importances.mean().unwrap_or(0.0);
    FeatureMask::new(importances.iter().map(|&v| v >= mean).collect())
}

/// Select informative columns with a short random-forest search.
///
/// Runs a RandomForest-only single-level search (at most 20 trials within
/// 30 seconds) on `train` and reads the importances of the best forest.
///
/// # Parameters
///
/// * `train` - Full training set. The search draws its own held-out splits.
/// * `config` - Search settings; the family lists are overridden.
///
/// # Returns
///
/// The selected mask together with the importances behind it. If no trial
/// completed, or the best forest never split, the all-true mask is returned
/// and a warning is logged.
pub fn select_features(train: &Dataset, config: &SearchConfig) -> Result<FeatureSelection> {
    let config = SearchConfig {
        classifier_names: vec![Family::RandomForest],
        regressor_names: vec![Family::RandomForest],
        ..config.clone()
    };
    let seed = config.seed;
    log::info!(
        "Selecting features from {} columns with a random forest search",
        train.n_features()
    );

    let mut objective = Objective::new(train.clone(), None, None, config)?;
    let mut study = Study::create(Direction::Maximize, seed);
    study.optimize(&mut objective, Some(SELECTION_TIMEOUT), Some(SELECTION_TRIALS), false)?;

    let best = match objective.registry().get(Family::RandomForest) {
        Some(best) => best,
        None => {
            log::warn!("No random forest trial completed; keeping every feature");
            return Ok(FeatureSelection {
                mask: FeatureMask::all(train.n_features()),
                importances: None,
                feature_names: train.feature_names.clone(),
            });
        }
    };
    let importances = best.model.feature_importances()?;
    let mut mask = support_from_importances(&importances);
    if mask.count_selected() == 0 {
        log::warn!("The best random forest assigned no importance to any feature; keeping every feature");
        mask = FeatureMask::all(train.n_features());
    }
    log::info!(
        "Selected {} of {} features (forest score {:.4})",
        mask.count_selected(),
        mask.len(),
        best.score
    );

    Ok(FeatureSelection {
        mask,
        importances: Some(importances),
        feature_names: train.feature_names.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn zero_importances_are_dropped() {
        let mask = support_from_importances(&array![0.5, 0.0, 0.5]);
        assert_eq!(mask.as_slice(), &[true, false, true]);
    }

    #[test]
    fn all_non_zero_falls_back_to_the_mean() {
        let mask = support_from_importances(&array![0.6, 0.1, 0.3]);
        assert_eq!(mask.as_slice(), &[true, false, false]);
        let mask = support_from_importances(&array![0.4, 0.1, 0.5]);
        assert_eq!(mask.as_slice(), &[true, false, true]);
    }

    #[test]
    fn informative_column_survives_selection() {
        let x = Array2::from_shape_fn((60, 3), |(r, c)| match c {
            0 => r as f64,
            _ => 1.0,
        });
        let y = Array1::from_iter((0..60).map(|r| if r < 30 { 0.0 } else { 1.0 }));
        let train = Dataset::from_arrays(x, y).unwrap();
        let config = SearchConfig {
            seed: Some(4),
            ..SearchConfig::default()
        };
        let selection = select_features(&train, &config).unwrap();
        assert_eq!(selection.mask.as_slice(), &[true, false, false]);
        assert_eq!(selection.selected_names(), vec!["x0".to_string()]);
    }

    #[test]
    fn constant_features_keep_every_column() {
        let x = Array2::from_elem((40, 3), 1.0);
        let y = Array1::from_iter((0..40).map(|r| (r % 2) as f64));
        let train = Dataset::from_arrays(x, y).unwrap();
        let config = SearchConfig {
            seed: Some(7),
            ..SearchConfig::default()
        };
        let selection = select_features(&train, &config).unwrap();
        assert_eq!(selection.mask.as_slice(), &[true, true, true]);
        assert!(Objective::new(train, None, Some(selection.mask), config).is_ok());
    }
}
