//! Scoring metrics used for trial evaluation and reports.

use ndarray::Array1;

/// Fraction of predictions equal to the truth.
pub fn accuracy(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let hits = y_true.iter().zip(y_pred.iter()).filter(|(t, p)| t == p).count();
    hits as f64 / y_true.len() as f64
}

/// Binary confusion counts for `positive`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub r#fn: usize,
}

pub fn confusion_matrix(y_true: &Array1<f64>, y_pred: &Array1<f64>, positive: f64) -> ConfusionMatrix {
    let mut cm = ConfusionMatrix::default();
    for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
        match (t == positive, p == positive) {
            (true, true) => cm.tp += 1,
            (false, true) => cm.fp += 1,
            (false, false) => cm.tn += 1,
            (true, false) => cm.r#fn += 1,
        }
    }
    cm
}

/// F1 score of the positive class. Zero when there are no true or predicted positives.
pub fn f1_score(y_true: &Array1<f64>, y_pred: &Array1<f64>, positive: f64) -> f64 {
    let cm = confusion_matrix(y_true, y_pred, positive);
    let denom = 2 * cm.tp + cm.fp + cm.r#fn;
    if denom == 0 {
        return 0.0;
    }
    2.0 * cm.tp as f64 / denom as f64
}

/// Coefficient of determination.
///
/// A constant target gives 1.0 on a perfect fit and 0.0 otherwise.
pub fn r2_score(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    let n = y_true.len();
    if n == 0 {
        return 0.0;
    }
    let mean = y_true.sum() / n as f64;
    let ss_res: f64 = y_true.iter().zip(y_pred.iter()).map(|(t, p)| (t - p).powi(2)).sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

pub fn mean_absolute_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    y_true.iter().zip(y_pred.iter()).map(|(t, p)| (t - p).abs()).sum::<f64>() / y_true.len() as f64
}

pub fn mean_squared_error(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    y_true.iter().zip(y_pred.iter()).map(|(t, p)| (t - p).powi(2)).sum::<f64>() / y_true.len() as f64
}

/// Points of a threshold sweep over descending scores.
#[derive(Debug, Clone, Default)]
pub struct Curve {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub thresholds: Vec<f64>,
}

fn sorted_by_score(y_true: &Array1<f64>, scores: &Array1<f64>, positive: f64) -> Vec<(f64, bool)> {
    let mut pairs: Vec<(f64, bool)> = scores
        .iter()
        .zip(y_true.iter())
        .map(|(&s, &t)| (s, t == positive))
        .collect();
    pairs.sort_by(|a, b| b.0.total_cmp(&a.0));
    pairs
}

/// ROC curve: `x` is the false positive rate and `y` the true positive rate.
pub fn roc_curve(y_true: &Array1<f64>, scores: &Array1<f64>, positive: f64) -> Curve {
    let pairs = sorted_by_score(y_true, scores, positive);
    let n_pos = pairs.iter().filter(|(_, p)| *p).count().max(1) as f64;
    let n_neg = pairs.iter().filter(|(_, p)| !*p).count().max(1) as f64;

    let mut curve = Curve {
        x: vec![0.0],
        y: vec![0.0],
        thresholds: vec![f64::INFINITY],
    };
    let (mut tp, mut fp) = (0.0, 0.0);
    for (i, &(score, is_pos)) in pairs.iter().enumerate() {
        if is_pos {
            tp += 1.0;
        } else {
            fp += 1.0;
        }
        let last_of_tie = pairs.get(i + 1).map_or(true, |next| next.0 != score);
        if last_of_tie {
            curve.x.push(fp / n_neg);
            curve.y.push(tp / n_pos);
            curve.thresholds.push(score);
        }
    }
    curve
}

/// Precision-recall curve: `x` is recall and `y` precision.
pub fn precision_recall_curve(y_true: &Array1<f64>, scores: &Array1<f64>, positive: f64) -> Curve {
    let pairs = sorted_by_score(y_true, scores, positive);
    let n_pos = pairs.iter().filter(|(_, p)| *p).count().max(1) as f64;

    let mut curve = Curve {
        x: vec![0.0],
        y: vec![1.0],
        thresholds: vec![f64::INFINITY],
    };
    let (mut tp, mut seen) = (0.0, 0.0);
    for (i, &(score, is_pos)) in pairs.iter().enumerate() {
        seen += 1.0;
        if is_pos {
            tp += 1.0;
        }
        let last_of_tie = pairs.get(i + 1).map_or(true, |next| next.0 != score);
        if last_of_tie {
            curve.x.push(tp / n_pos);
            curve.y.push(tp / seen);
            curve.thresholds.push(score);
        }
    }
    curve
}

/// Trapezoidal area under a curve whose `x` is monotone.
pub fn auc(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| (xs[1] - xs[0]) * (ys[0] + ys[1]) / 2.0)
        .sum::<f64>()
        .abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn f1_matches_hand_count() {
        let y_true = array![1.0, 1.0, 0.0, 0.0, 1.0];
        let y_pred = array![1.0, 0.0, 1.0, 0.0, 1.0];
        // tp=2, fp=1, fn=1
        assert!((f1_score(&y_true, &y_pred, 1.0) - 4.0 / 6.0).abs() < 1e-12);
        assert_eq!(accuracy(&y_true, &y_pred), 0.6);
    }

    #[test]
    fn f1_without_positives_is_zero() {
        let y = array![0.0, 0.0];
        assert_eq!(f1_score(&y, &y, 1.0), 0.0);
    }

    #[test]
    fn r2_of_perfect_and_mean_predictions() {
        let y = array![1.0, 2.0, 3.0];
        assert_eq!(r2_score(&y, &y), 1.0);
        assert!(r2_score(&y, &array![2.0, 2.0, 2.0]).abs() < 1e-12);
        assert_eq!(mean_absolute_error(&y, &array![2.0, 2.0, 2.0]), 2.0 / 3.0);
    }

    #[test]
    fn perfect_ranking_has_unit_roc_auc() {
        let y = array![0.0, 0.0, 1.0, 1.0];
        let s = array![0.1, 0.2, 0.8, 0.9];
        let roc = roc_curve(&y, &s, 1.0);
        assert!((auc(&roc.x, &roc.y) - 1.0).abs() < 1e-12);
        let pr = precision_recall_curve(&y, &s, 1.0);
        assert_eq!(pr.y[2], 1.0);
        assert_eq!(*pr.x.last().unwrap(), 1.0);
    }
}
