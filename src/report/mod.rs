//! Report generation for single runs, run comparisons and regression analyses.

pub mod chart;
pub mod html;
pub mod svg;

use std::fs::File;
use std::path::{Path, PathBuf};

use serde_json::json;

pub use chart::{Chart, ChartKey, ChartLine, StemSet};
pub use svg::{ChartRenderer, ImageFormat, SvgRenderer};

use crate::config::ReportConfig;
use crate::error::{Error, Result};
use crate::logging::{log, obj, v_str, Domain, Level, ProfileScope};
use crate::regression::{ProblemSummary, RegressionReport};
use crate::run::{comparison_frame, RunData};

pub const DATA_CSV: &str = "data.csv";
pub const ANALYSIS_TXT: &str = "analysis.txt";
pub const ANALYSIS_YAML: &str = "analysis.yaml";
pub const ANALYSIS_JSON: &str = "analysis.json";

/// Files written by one report invocation.
#[derive(Debug, Clone, Default)]
pub struct ReportOutput {
    pub dir: PathBuf,
    pub images: Vec<PathBuf>,
    pub csv_files: Vec<PathBuf>,
    pub summaries: Vec<PathBuf>,
    pub html: Option<PathBuf>,
}

pub(crate) fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Vector unless raster was asked for and the renderer can do it.
pub fn image_format(cfg: &ReportConfig, renderer: &dyn ChartRenderer) -> ImageFormat {
    if cfg.vector_images {
        return ImageFormat::Svg;
    }
    if renderer.supports(ImageFormat::Png) {
        return ImageFormat::Png;
    }
    log(
        Level::Warn,
        Domain::Report,
        "raster_unavailable",
        obj(&[("msg", v_str("renderer has no raster output, writing svg"))]),
    );
    ImageFormat::Svg
}

fn create_file(path: &Path) -> Result<File> {
    File::create(path).map_err(|e| Error::io(path, e))
}

struct Writer<'a> {
    cfg: &'a ReportConfig,
    renderer: &'a dyn ChartRenderer,
    format: ImageFormat,
    out: ReportOutput,
}

impl<'a> Writer<'a> {
    fn new(cfg: &'a ReportConfig, renderer: &'a dyn ChartRenderer) -> Result<Self> {
        cfg.validate()?;
        let dir = cfg.output_dir.clone();
        std::fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        Ok(Self {
            cfg,
            renderer,
            format: image_format(cfg, renderer),
            out: ReportOutput {
                dir,
                ..Default::default()
            },
        })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.out.dir.join(name)
    }

    fn image(&mut self, chart: &Chart) -> Result<()> {
        if chart.is_empty() {
            return Ok(());
        }
        let path = self.path(&format!("{}.{}", chart.name, self.format.extension()));
        self.renderer
            .render(chart, self.format, self.cfg.image_width, self.cfg.image_height, &path)?;
        self.out.images.push(path);
        Ok(())
    }

    fn csv<F>(&mut self, name: &str, write: F) -> Result<()>
    where
        F: FnOnce(File) -> Result<()>,
    {
        let path = self.path(name);
        write(create_file(&path)?)?;
        self.out.csv_files.push(path);
        Ok(())
    }

    fn finish(mut self, title: &str, summary: Option<&ProblemSummary>) -> Result<ReportOutput> {
        if self.cfg.html_report {
            self.out.html = Some(html::write(&self.out.dir, title, &self.out.images, summary)?);
        }
        log(
            Level::Info,
            Domain::Report,
            "report_written",
            obj(&[
                ("path", v_str(&self.out.dir.display().to_string())),
                ("images", json!(self.out.images.len())),
                ("csv_files", json!(self.out.csv_files.len())),
            ]),
        );
        Ok(self.out)
    }
}

/// Charts and CSV exports of one or more loaded runs, overlaid on
/// time since each run's period start.
pub fn write_run_report(
    runs: &[RunData],
    cfg: &ReportConfig,
    renderer: &dyn ChartRenderer,
) -> Result<ReportOutput> {
    let _scope = ProfileScope::new("write_run_report");
    let mut w = Writer::new(cfg, renderer)?;
    let frame = comparison_frame(runs)?;
    w.csv(DATA_CSV, |f| frame.write_csv(f))?;

    let mut stems = StemSet::default();
    for (chart, data) in chart::time_charts(&frame, cfg.full_diagrams, &mut stems) {
        w.csv(&format!("{}.csv", chart.name), |f| data.write_csv(f))?;
        w.image(&chart)?;
    }

    for chart in chart::percentile_charts(runs, &mut stems) {
        w.csv(&format!("{}.csv", chart.name), |f| write_lines_csv(&chart, "percentile", f))?;
        w.image(&chart)?;
    }

    let labels: Vec<&str> = runs.iter().map(|r| r.label.as_str()).collect();
    w.finish(&labels.join(" vs "), None)
}

/// Long-format export of a chart: one row per line and point.
fn write_lines_csv(chart: &Chart, x_name: &str, file: File) -> Result<()> {
    let mut out = csv::Writer::from_writer(file);
    out.write_record(["line", x_name, "value"])?;
    for line in &chart.lines {
        for (x, y) in &line.points {
            out.write_record([line.label.clone(), x.to_string(), y.to_string()])?;
        }
    }
    out.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Problem summary in text, YAML and JSON, plus one history chart per metric.
pub fn write_regression_report(
    report: &RegressionReport,
    cfg: &ReportConfig,
    renderer: &dyn ChartRenderer,
) -> Result<ReportOutput> {
    let _scope = ProfileScope::new("write_regression_report");
    let mut w = Writer::new(cfg, renderer)?;

    let txt = w.path(ANALYSIS_TXT);
    std::fs::write(&txt, report.summary.to_text()).map_err(|e| Error::io(&txt, e))?;
    let yaml = w.path(ANALYSIS_YAML);
    serde_yaml::to_writer(create_file(&yaml)?, &report.summary)?;
    let json_path = w.path(ANALYSIS_JSON);
    serde_json::to_writer_pretty(create_file(&json_path)?, &report.summary)?;
    w.out.summaries.extend([txt, yaml, json_path]);

    let mut stems = StemSet::default();
    for history in &report.histories.metrics {
        let analysis = report.analyses.iter().find(|a| a.metric == history.metric);
        let mut chart = chart::history_chart(history, analysis);
        chart.name = stems.claim(chart.name);
        w.csv(&format!("{}.csv", chart.name), |f| {
            let mut out = csv::Writer::from_writer(f);
            for point in &history.points {
                out.serialize(point)?;
            }
            out.flush().map_err(csv::Error::from)?;
            Ok(())
        })?;
        w.image(&chart)?;
    }

    w.finish("regressions", Some(&report.summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RasterRenderer;
    impl ChartRenderer for RasterRenderer {
        fn supports(&self, _: ImageFormat) -> bool {
            true
        }
        fn render(&self, _: &Chart, _: ImageFormat, _: u32, _: u32, path: &Path) -> Result<()> {
            std::fs::write(path, b"png").map_err(|e| Error::io(path, e))
        }
    }

    #[test]
    fn test_raster_falls_back_to_svg_with_builtin_renderer() {
        let cfg = ReportConfig {
            vector_images: false,
            ..Default::default()
        };
        assert_eq!(image_format(&cfg, &SvgRenderer), ImageFormat::Svg);
        assert_eq!(image_format(&cfg, &RasterRenderer), ImageFormat::Png);
        assert_eq!(image_format(&ReportConfig::default(), &RasterRenderer), ImageFormat::Svg);
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape(r#"<a href="x">&</a>"#), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }
}
