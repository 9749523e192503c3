//! Self-contained HTML reports with embedded plotly figures.

use std::fs;
use std::io;

use maud::{html, Markup, PreEscaped, DOCTYPE};
use plotly::Plot;

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.12.1.min.js";

/// A titled block of HTML content and plots.
#[derive(Debug, Clone)]
pub struct ReportSection {
    title: String,
    content: Vec<Markup>,
    n_plots: usize,
}

impl ReportSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            content: Vec::new(),
            n_plots: 0,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn add_content(&mut self, content: Markup) {
        self.content.push(content);
    }

    pub fn add_plot(&mut self, plot: Plot) {
        let div_id = format!("{}-plot-{}", slug(&self.title), self.n_plots);
        self.n_plots += 1;
        self.content.push(html! {
            div class="plot" { (PreEscaped(plot.to_inline_html(Some(&div_id)))) }
        });
    }

    /// Plain table with a header row.
    pub fn add_table(&mut self, headers: &[&str], rows: &[Vec<String>]) {
        self.content.push(html! {
            table {
                thead { tr { @for h in headers { th { (h) } } } }
                tbody {
                    @for row in rows {
                        tr { @for cell in row { td { (cell) } } }
                    }
                }
            }
        });
    }

    fn render(&self) -> Markup {
        html! {
            section id=(slug(&self.title)) {
                h2 { (self.title) }
                @for block in &self.content { (block) }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Report {
    software_name: String,
    version: String,
    logo: Option<String>,
    title: String,
    sections: Vec<ReportSection>,
}

impl Report {
    pub fn new(software_name: &str, version: &str, logo: Option<&str>, title: &str) -> Self {
        Self {
            software_name: software_name.to_string(),
            version: version.to_string(),
            logo: logo.map(str::to_string),
            title: title.to_string(),
            sections: Vec::new(),
        }
    }

    pub fn add_section(&mut self, section: ReportSection) {
        self.sections.push(section);
    }

    pub fn sections(&self) -> &[ReportSection] {
        &self.sections
    }

    pub fn render(&self) -> Markup {
        let generated = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        html! {
            (DOCTYPE)
            html {
                head {
                    meta charset="utf-8";
                    title { (self.title) }
                    script src=(PLOTLY_CDN) {}
                    style {
                        "body { font-family: sans-serif; margin: 2em; }
                        table { border-collapse: collapse; margin: 1em 0; }
                        th, td { border: 1px solid #ccc; padding: 4px 10px; text-align: right; }
                        nav a { margin-right: 1em; }
                        .plot { margin: 1em 0; }"
                    }
                }
                body {
                    header {
                        @if let Some(logo) = &self.logo {
                            img src=(logo) alt=(self.software_name) height="60";
                        }
                        h1 { (self.title) }
                        p { (self.software_name) " v" (self.version) " | generated " (generated) }
                        nav {
                            @for section in &self.sections {
                                a href={ "#" (slug(section.title())) } { (section.title()) }
                            }
                        }
                    }
                    @for section in &self.sections { (section.render()) }
                }
            }
        }
    }

    pub fn save_to_file(&self, path: &str) -> io::Result<()> {
        fs::write(path, self.render().into_string())?;
        log::info!("Report saved to {}", path);
        Ok(())
    }
}

fn slug(title: &str) -> String {
    title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_and_tables_are_rendered() {
        let mut report = Report::new("allstars", "0.1.0", None, "Model Selection Report");
        let mut section = ReportSection::new("Best Scores");
        section.add_content(html! { p { "Scores per family." } });
        section.add_table(&["Model", "Score"], &[vec!["kNN".into(), "0.9".into()]]);
        section.add_plot(Plot::new());
        report.add_section(section);

        let page = report.render().into_string();
        assert!(page.contains("<h2>Best Scores</h2>"));
        assert!(page.contains("<td>kNN</td>"));
        assert!(page.contains("href=\"#best-scores\""));
        assert!(page.contains("best-scores-plot-0"));
    }

    #[test]
    fn report_is_written_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.html");
        Report::new("allstars", "0.1.0", None, "Empty")
            .save_to_file(path.to_str().unwrap())
            .unwrap();
        assert!(fs::read_to_string(path).unwrap().starts_with("<!DOCTYPE html>"));
    }
}
