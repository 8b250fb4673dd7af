//! Static `report.html` index of the generated images and problem summary.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use super::escape;
use crate::error::{Error, Result};
use crate::regression::ProblemSummary;

pub const REPORT_HTML: &str = "report.html";

fn relative_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn render(title: &str, images: &[PathBuf], summary: Option<&ProblemSummary>) -> String {
    let mut html = String::new();
    let _ = writeln!(html, "<!DOCTYPE html>");
    let _ = writeln!(
        html,
        "<html><head><meta charset=\"utf-8\"><title>{0}</title></head><body><h1>{0}</h1>",
        escape(title)
    );

    if let Some(summary) = summary {
        let _ = writeln!(html, "<h2>Problems</h2>");
        if summary.is_empty() {
            let _ = writeln!(html, "<p>No anomalies or changepoints.</p>");
        } else {
            let _ = writeln!(html, "<table border=\"1\"><tr><th>commit</th><th>problems</th></tr>");
            for entry in &summary.entries {
                let items: String = entry
                    .problems
                    .iter()
                    .map(|p| format!("<li>{}</li>", escape(p)))
                    .collect();
                let _ = writeln!(
                    html,
                    "<tr><td><code>{}</code></td><td><ul>{}</ul></td></tr>",
                    escape(&entry.commit),
                    items
                );
            }
            let _ = writeln!(html, "</table>");
        }
    }

    if !images.is_empty() {
        let _ = writeln!(html, "<h2>Charts</h2>");
        for img in images {
            let name = escape(&relative_name(img));
            let _ = writeln!(
                html,
                "<div><h3>{0}</h3><img src=\"{0}\" alt=\"{0}\" style=\"max-width:100%\"></div>",
                name
            );
        }
    }
    html.push_str("</body></html>\n");
    html
}

pub fn write(dir: &Path, title: &str, images: &[PathBuf], summary: Option<&ProblemSummary>) -> Result<PathBuf> {
    let path = dir.join(REPORT_HTML);
    std::fs::write(&path, render(title, images, summary)).map_err(|e| Error::io(&path, e))?;
    Ok(path)
}
