use maud::html;

use crate::config::AllstarsConfig;
use crate::data_handling::{Dataset, ProblemKind};
use crate::error::Result;
use crate::feature_selection::FeatureSelection;
use crate::report::plots::{
    plot_best_scores, plot_classification_metrics, plot_feature_importances, plot_model_importances,
    plot_regression_metrics, plot_training_summary,
};
use crate::report::{Report, ReportSection};
use crate::search::objective::Objective;
use crate::search::stacking::StackingObjective;

/// Assemble the report of a finished search.
///
/// `evaluation` adds ROC/PR (classification) or predicted-vs-actual
/// (regression) plots of the best model on held-out data.
pub fn build_fit_report(
    objective: &Objective,
    stacking: Option<&StackingObjective>,
    selection: Option<&FeatureSelection>,
    evaluation: Option<&Dataset>,
    config: &AllstarsConfig,
) -> Result<Report> {
    let mut report = Report::new(
        "allstars",
        env!("CARGO_PKG_VERSION"),
        None,
        &format!("allstars {:?} Model Selection Report", objective.kind()),
    );

    /* Overview */
    {
        let mut section = ReportSection::new("Overview");
        let best = objective.best_model().map(|m| m.family().name()).unwrap_or("none");
        section.add_content(html! {
            p {
                "Best model: " strong { (best) }
                @if let Some(score) = objective.best_score() { " with score " (format!("{:.4}", score)) }
            }
        });
        let rows: Vec<Vec<String>> = objective
            .summary()
            .iter()
            .map(|s| {
                vec![
                    s.family.clone(),
                    s.best_score.map_or_else(|| "-".to_string(), |v| format!("{:.4}", v)),
                    format!("{:.4} ± {:.4}", s.mean_score, s.std_score),
                    s.n_selected.to_string(),
                    format!("{:.2}", s.total_time),
                ]
            })
            .collect();
        section.add_table(&["Model", "Best", "Mean ± SD", "Trials", "Total time (s)"], &rows);
        section.add_plot(plot_best_scores(&objective.best_scores(), "Best Score per Model"));
        section.add_plot(plot_training_summary(&objective.summary()));
        report.add_section(section);
    }

    if let Some(selection) = selection {
        let mut section = ReportSection::new("Feature Selection");
        section.add_content(html! {
            p {
                (selection.mask.count_selected()) " of " (selection.mask.len()) " features kept: "
                (selection.selected_names().join(", "))
            }
        });
        if let Some(importances) = &selection.importances {
            section.add_plot(plot_feature_importances(
                &selection.feature_names,
                importances,
                "Random Forest Feature Importances",
            )?);
        }
        report.add_section(section);
    }

    if let (Some(data), Some(model)) = (evaluation, objective.best_model()) {
        let mut section = ReportSection::new("Evaluation");
        let score = model.score(&data.x, &data.y)?;
        section.add_content(html! {
            p { "Best model score on " (data.n_samples()) " held-out rows: " (format!("{:.4}", score)) }
        });
        match (objective.kind(), objective.labels()) {
            (ProblemKind::Classification, Some(labels)) => {
                let scores = if model.supports_probability() {
                    model.predict_proba(&data.x)?
                } else {
                    labels.encode(&model.predict(&data.x)?)
                };
                section.add_plot(plot_classification_metrics(&labels.encode(&data.y), &scores, 1.0)?);
            }
            _ => section.add_plot(plot_regression_metrics(&data.y, &model.predict(&data.x)?)?),
        }
        report.add_section(section);
    }

    if let Some(stacking) = stacking {
        let mut section = ReportSection::new("Stacking");
        section.add_content(html! {
            p {
                "Best stacking score: "
                (stacking.best_score().map_or_else(|| "-".to_string(), |v| format!("{:.4}", v)))
                " over " (stacking.already_tried().len()) " distinct stacks"
            }
        });
        if let Some(model) = stacking.best_model() {
            section.add_plot(plot_model_importances(&model.model_importances()?));
        }
        report.add_section(section);
    }

    /* Configuration */
    {
        let mut section = ReportSection::new("Configuration");
        let json = serde_json::to_string_pretty(config).unwrap_or_default();
        section.add_content(html! {
            pre { code { (json) } }
        });
        report.add_section(section);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::study::ObjectiveFunction;
    use crate::search::trial::FixedTrial;
    use ndarray::{Array1, Array2};

    #[test]
    fn report_covers_every_requested_section() {
        let x = Array2::from_shape_fn((20, 2), |(r, c)| if c == 0 { r as f64 } else { ((r * 7) % 11) as f64 });
        let y = Array1::from_iter((0..20).map(|r| if r < 10 { 0.0 } else { 1.0 }));
        let data = Dataset::from_arrays(x, y).unwrap();
        let mut config = AllstarsConfig::default();
        config.search.split_seed = Some(1);
        let mut objective = Objective::new(data.clone(), None, None, config.search.clone()).unwrap();
        let mut trial = FixedTrial::default()
            .with("model_name", "LDA")
            .with("standardize", "StandardScaler");
        objective.evaluate(&mut trial).unwrap();

        let report = build_fit_report(&objective, None, None, Some(&data), &config).unwrap();
        let titles: Vec<&str> = report.sections().iter().map(|s| s.title()).collect();
        assert_eq!(titles, vec!["Overview", "Evaluation", "Configuration"]);
        assert!(report.render().into_string().contains("LDA"));
    }
}
