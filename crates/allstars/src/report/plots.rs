use std::collections::BTreeMap;

use ndarray::Array1;
use plotly::common::{DashType, ErrorData, ErrorType, Line, Mode, Orientation};
use plotly::layout::{Axis, GridPattern, Layout, LayoutGrid};
use plotly::{Bar, Plot, Scatter};

use crate::error::{AllstarsError, Result};
use crate::metrics::{auc, mean_absolute_error, mean_squared_error, precision_recall_curve, r2_score, roc_curve};
use crate::search::objective::FamilySummary;

fn check_lengths(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(AllstarsError::ShapeMismatch { expected, actual });
    }
    Ok(())
}

/// Bar chart of the best score reached by each family.
pub fn plot_best_scores(scores: &BTreeMap<String, f64>, title: &str) -> Plot {
    let names: Vec<String> = scores.keys().cloned().collect();
    let values: Vec<f64> = scores.values().copied().collect();

    let mut plot = Plot::new();
    plot.add_trace(Bar::new(names, values).name("Best score"));
    plot.set_layout(
        Layout::new()
            .title(title)
            .x_axis(Axis::new().title("Model"))
            .y_axis(Axis::new().title("Score")),
    );
    plot
}

/// Four panels: mean score, times selected, mean fit time and total fit time per family.
pub fn plot_training_summary(summary: &[FamilySummary]) -> Plot {
    let names: Vec<String> = summary.iter().map(|s| s.family.clone()).collect();
    let column = |f: &dyn Fn(&FamilySummary) -> f64| summary.iter().map(f).collect::<Vec<f64>>();

    let mut plot = Plot::new();
    plot.add_trace(
        Bar::new(names.clone(), column(&|s: &FamilySummary| s.mean_score))
            .name("Mean score")
            .error_y(ErrorData::new(ErrorType::Data).array(column(&|s: &FamilySummary| s.std_score))),
    );
    plot.add_trace(
        Bar::new(names.clone(), column(&|s: &FamilySummary| s.n_selected as f64))
            .name("Times selected")
            .x_axis("x2")
            .y_axis("y2"),
    );
    plot.add_trace(
        Bar::new(names.clone(), column(&|s: &FamilySummary| s.mean_time))
            .name("Mean time")
            .error_y(ErrorData::new(ErrorType::Data).array(column(&|s: &FamilySummary| s.std_time)))
            .x_axis("x3")
            .y_axis("y3"),
    );
    plot.add_trace(
        Bar::new(names, column(&|s: &FamilySummary| s.total_time))
            .name("Total time")
            .x_axis("x4")
            .y_axis("y4"),
    );

    plot.set_layout(
        Layout::new()
            .title("Training Summary")
            .grid(
                LayoutGrid::new()
                    .rows(2)
                    .columns(2)
                    .pattern(GridPattern::Independent),
            )
            .y_axis(Axis::new().title("Mean score"))
            .y_axis2(Axis::new().title("Times selected"))
            .y_axis3(Axis::new().title("Mean time (s)"))
            .y_axis4(Axis::new().title("Total time (s)")),
    );
    plot
}

/// Horizontal bars of feature importances, largest on top.
pub fn plot_feature_importances(names: &[String], importances: &Array1<f64>, title: &str) -> Result<Plot> {
    check_lengths(names.len(), importances.len())?;
    let mut pairs: Vec<(&String, f64)> = names.iter().zip(importances.iter().copied()).collect();
    pairs.sort_by(|a, b| a.1.total_cmp(&b.1));
    let (labels, values): (Vec<String>, Vec<f64>) = pairs.into_iter().map(|(n, v)| (n.clone(), v)).unzip();

    let mut plot = Plot::new();
    plot.add_trace(
        Bar::new(values, labels)
            .orientation(Orientation::Horizontal)
            .name("Importance"),
    );
    plot.set_layout(
        Layout::new()
            .title(title)
            .x_axis(Axis::new().title("Importance"))
            .y_axis(Axis::new().title("Feature")),
    );
    Ok(plot)
}

/// Meta-forest importance of every base learner in the best stack.
pub fn plot_model_importances(importances: &BTreeMap<String, f64>) -> Plot {
    let names: Vec<String> = importances.keys().cloned().collect();
    let values: Vec<f64> = importances.values().copied().collect();
    let mut plot = Plot::new();
    plot.add_trace(
        Bar::new(values, names)
            .orientation(Orientation::Horizontal)
            .name("Importance"),
    );
    plot.set_layout(
        Layout::new()
            .title("Stacking Model Importances")
            .x_axis(Axis::new().title("Importance"))
            .y_axis(Axis::new().title("Model")),
    );
    plot
}

/// Predicted vs. actual with the identity line; R², MAE and MSE in the title.
pub fn plot_regression_metrics(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<Plot> {
    check_lengths(y_true.len(), y_pred.len())?;
    let lo = y_true.iter().chain(y_pred.iter()).copied().fold(f64::INFINITY, f64::min);
    let hi = y_true.iter().chain(y_pred.iter()).copied().fold(f64::NEG_INFINITY, f64::max);
    let title = format!(
        "Predicted vs Actual (R² = {:.4}, MAE = {:.4}, MSE = {:.4})",
        r2_score(y_true, y_pred),
        mean_absolute_error(y_true, y_pred),
        mean_squared_error(y_true, y_pred)
    );

    let mut plot = Plot::new();
    plot.add_trace(
        Scatter::new(y_true.to_vec(), y_pred.to_vec())
            .mode(Mode::Markers)
            .name("Prediction"),
    );
    plot.add_trace(
        Scatter::new(vec![lo, hi], vec![lo, hi])
            .mode(Mode::Lines)
            .name("y = x")
            .line(Line::new().color("red").dash(DashType::Dash)),
    );
    plot.set_layout(
        Layout::new()
            .title(title.as_str())
            .x_axis(Axis::new().title("Actual"))
            .y_axis(Axis::new().title("Predicted")),
    );
    Ok(plot)
}

/// ROC and precision-recall curves side by side.
///
/// `scores` are positive-class probabilities or any monotone decision score.
pub fn plot_classification_metrics(y_true: &Array1<f64>, scores: &Array1<f64>, positive: f64) -> Result<Plot> {
    check_lengths(y_true.len(), scores.len())?;
    let roc = roc_curve(y_true, scores, positive);
    let pr = precision_recall_curve(y_true, scores, positive);
    let roc_auc = auc(&roc.x, &roc.y);
    let pr_auc = auc(&pr.x, &pr.y);

    let mut plot = Plot::new();
    plot.add_trace(
        Scatter::new(roc.x, roc.y)
            .mode(Mode::Lines)
            .name(format!("ROC (AUC = {:.4})", roc_auc).as_str()),
    );
    plot.add_trace(
        Scatter::new(vec![0.0, 1.0], vec![0.0, 1.0])
            .mode(Mode::Lines)
            .name("Chance")
            .line(Line::new().color("gray").dash(DashType::Dash)),
    );
    plot.add_trace(
        Scatter::new(pr.x, pr.y)
            .mode(Mode::Lines)
            .name(format!("PR (AUC = {:.4})", pr_auc).as_str())
            .x_axis("x2")
            .y_axis("y2"),
    );
    plot.set_layout(
        Layout::new()
            .title("Classification Metrics")
            .grid(
                LayoutGrid::new()
                    .rows(1)
                    .columns(2)
                    .pattern(GridPattern::Independent),
            )
            .x_axis(Axis::new().title("False positive rate"))
            .y_axis(Axis::new().title("True positive rate"))
            .x_axis2(Axis::new().title("Recall"))
            .y_axis2(Axis::new().title("Precision")),
    );
    Ok(plot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn best_scores_are_plotted_by_name() {
        let mut scores = BTreeMap::new();
        scores.insert("kNN".to_string(), 0.8);
        scores.insert("LDA".to_string(), 0.7);
        let json = plot_best_scores(&scores, "Best Scores").to_json();
        assert!(json.contains("kNN"));
        assert!(json.contains("Best Scores"));
    }

    #[test]
    fn mismatched_inputs_are_rejected() {
        let names = vec!["a".to_string()];
        assert!(plot_feature_importances(&names, &array![0.5, 0.5], "x").is_err());
        assert!(plot_regression_metrics(&array![1.0], &array![1.0, 2.0]).is_err());
    }

    #[test]
    fn classification_panels_report_auc() {
        let y = array![0.0, 0.0, 1.0, 1.0];
        let s = array![0.1, 0.4, 0.35, 0.8];
        let json = plot_classification_metrics(&y, &s, 1.0).unwrap().to_json();
        assert!(json.contains("ROC (AUC = 0.7500)"));
        assert!(json.contains("Recall"));
    }
}
