//! Chart rendering backends.

use std::fmt::Write as _;
use std::path::Path;

use super::chart::Chart;
use super::escape;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Svg,
    Png,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Svg => "svg",
            ImageFormat::Png => "png",
        }
    }
}

pub trait ChartRenderer {
    fn supports(&self, format: ImageFormat) -> bool;
    fn render(&self, chart: &Chart, format: ImageFormat, width: u32, height: u32, path: &Path) -> Result<()>;
}

const PALETTE: [&str; 8] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
];
const MARGIN_LEFT: f64 = 90.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 70.0;
const TICKS: usize = 5;

#[derive(Debug, Default, Clone, Copy)]
pub struct SvgRenderer;

/// Value range with a little headroom; a flat range is widened to stay drawable.
fn bounds(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f64, f64)>, v| match acc {
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            None => Some((v, v)),
        })?;
    if hi - lo < f64::EPSILON {
        let pad = if lo == 0.0 { 1.0 } else { lo.abs() * 0.1 };
        return Some((lo - pad, hi + pad));
    }
    Some((lo, hi))
}

fn tick_label(v: f64) -> String {
    if v.abs() >= 1e6 || (v != 0.0 && v.abs() < 1e-2) {
        format!("{:.2e}", v)
    } else if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{:.2}", v)
    }
}

impl SvgRenderer {
    pub fn to_svg(&self, chart: &Chart, width: u32, height: u32) -> String {
        let (w, h) = (width as f64, height as f64);
        let plot_w = (w - MARGIN_LEFT - MARGIN_RIGHT).max(1.0);
        let plot_h = (h - MARGIN_TOP - MARGIN_BOTTOM).max(1.0);
        let all = || chart.lines.iter().flat_map(|l| l.points.iter());
        let (x0, x1) = bounds(all().map(|p| p.0)).unwrap_or((0.0, 1.0));
        let (y0, y1) = bounds(all().map(|p| p.1)).unwrap_or((0.0, 1.0));
        let sx = |x: f64| MARGIN_LEFT + (x - x0) / (x1 - x0) * plot_w;
        let sy = |y: f64| MARGIN_TOP + plot_h - (y - y0) / (y1 - y0) * plot_h;

        let mut svg = String::new();
        let _ = writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif" font-size="14">"#
        );
        let _ = writeln!(svg, r#"<rect width="{w}" height="{h}" fill="white"/>"#);
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="30" text-anchor="middle" font-size="18">{}</text>"#,
            w / 2.0,
            escape(&chart.title)
        );

        // axes
        let _ = writeln!(
            svg,
            r#"<path d="M{l} {t} V{b} H{r}" fill="none" stroke="black"/>"#,
            l = MARGIN_LEFT,
            t = MARGIN_TOP,
            b = MARGIN_TOP + plot_h,
            r = MARGIN_LEFT + plot_w
        );
        for i in 0..=TICKS {
            let f = i as f64 / TICKS as f64;
            let xv = x0 + f * (x1 - x0);
            let yv = y0 + f * (y1 - y0);
            let _ = writeln!(
                svg,
                r#"<text x="{}" y="{}" text-anchor="middle">{}</text>"#,
                sx(xv),
                MARGIN_TOP + plot_h + 20.0,
                tick_label(xv)
            );
            let _ = writeln!(
                svg,
                r##"<line x1="{l}" x2="{r}" y1="{y}" y2="{y}" stroke="#e0e0e0"/><text x="{tx}" y="{ty}" text-anchor="end">{label}</text>"##,
                l = MARGIN_LEFT,
                r = MARGIN_LEFT + plot_w,
                y = sy(yv),
                tx = MARGIN_LEFT - 8.0,
                ty = sy(yv) + 5.0,
                label = tick_label(yv)
            );
        }
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="middle">{}</text>"#,
            MARGIN_LEFT + plot_w / 2.0,
            h - 20.0,
            escape(&chart.x_label)
        );
        let _ = writeln!(
            svg,
            r#"<text transform="translate(20 {}) rotate(-90)" text-anchor="middle">{}</text>"#,
            MARGIN_TOP + plot_h / 2.0,
            escape(&chart.y_label)
        );

        for m in &chart.markers {
            let _ = writeln!(
                svg,
                r##"<line x1="{x}" x2="{x}" y1="{t}" y2="{b}" stroke="#d62728" stroke-dasharray="6 4"/>"##,
                x = sx(*m),
                t = MARGIN_TOP,
                b = MARGIN_TOP + plot_h
            );
        }

        for (i, line) in chart.lines.iter().enumerate() {
            let color = PALETTE[i % PALETTE.len()];
            let pts: Vec<String> = line
                .points
                .iter()
                .filter(|(x, y)| x.is_finite() && y.is_finite())
                .map(|(x, y)| format!("{:.2},{:.2}", sx(*x), sy(*y)))
                .collect();
            let _ = writeln!(
                svg,
                r#"<polyline fill="none" stroke="{}" stroke-width="2" points="{}"/>"#,
                color,
                pts.join(" ")
            );
            let ly = MARGIN_TOP + 10.0 + i as f64 * 20.0;
            let _ = writeln!(
                svg,
                r#"<rect x="{}" y="{}" width="12" height="12" fill="{}"/><text x="{}" y="{}">{}</text>"#,
                MARGIN_LEFT + 10.0,
                ly,
                color,
                MARGIN_LEFT + 28.0,
                ly + 11.0,
                escape(&line.label)
            );
        }
        svg.push_str("</svg>\n");
        svg
    }
}

impl ChartRenderer for SvgRenderer {
    fn supports(&self, format: ImageFormat) -> bool {
        format == ImageFormat::Svg
    }

    fn render(&self, chart: &Chart, format: ImageFormat, width: u32, height: u32, path: &Path) -> Result<()> {
        if !self.supports(format) {
            return Err(Error::Config(format!(
                "svg renderer cannot write {} images",
                format.extension()
            )));
        }
        std::fs::write(path, self.to_svg(chart, width, height)).map_err(|e| Error::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::chart::ChartLine;

    fn chart() -> Chart {
        Chart {
            name: "ops".into(),
            title: "Operations <put>".into(),
            x_label: "time (s)".into(),
            y_label: "put".into(),
            lines: vec![
                ChartLine {
                    label: "old".into(),
                    points: vec![(0.0, 1.0), (1.0, 3.0)],
                },
                ChartLine {
                    label: "new".into(),
                    points: vec![(0.0, 2.0), (1.0, 2.0)],
                },
            ],
            markers: vec![0.5],
        }
    }

    #[test]
    fn test_svg_has_one_polyline_per_line_and_escapes_text() {
        let svg = SvgRenderer.to_svg(&chart(), 800, 600);
        assert!(svg.starts_with("<svg"));
        assert_eq!(svg.matches("<polyline").count(), 2);
        assert!(svg.contains("Operations &lt;put&gt;"));
        assert!(svg.contains("stroke-dasharray"));
        assert!(svg.contains(r#"width="800""#));
    }

    #[test]
    fn test_flat_and_empty_charts_render() {
        let mut c = chart();
        c.lines.truncate(1);
        c.lines[0].points = vec![(5.0, 7.0)];
        assert!(SvgRenderer.to_svg(&c, 400, 300).contains("<polyline"));
        c.lines.clear();
        assert!(SvgRenderer.to_svg(&c, 400, 300).ends_with("</svg>\n"));
    }

    #[test]
    fn test_raster_not_supported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.png");
        assert!(!SvgRenderer.supports(ImageFormat::Png));
        assert!(SvgRenderer.render(&chart(), ImageFormat::Png, 10, 10, &path).is_err());
    }
}
