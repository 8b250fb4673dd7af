//! Parsers for the raw artifacts of a run. Each turns one file into tagged
//! time series (or, for `.hgrm`, a percentile table).

pub mod dstat;
pub mod hgrm;
pub mod latency;
pub mod operations;

pub use dstat::parse_dstat;
pub use hgrm::{parse_hgrm, PercentileRow, PercentileTable};
pub use latency::{canonical_latency_name, parse_latency_history};
pub use operations::parse_operations;

use std::path::Path;

use crate::error::{Error, Result};
use crate::logging::{log, obj, v_str, Domain, Level};
use serde_json::json;

/// Read `path` and drop its first `skip` lines.
pub(crate) fn read_after_preamble(path: &Path, skip: usize) -> Result<String> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let mut rest = text.as_str();
    for _ in 0..skip {
        match rest.find('\n') {
            Some(i) => rest = &rest[i + 1..],
            None => {
                rest = "";
                break;
            }
        }
    }
    Ok(rest.to_string())
}

pub(crate) fn csv_reader(body: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes())
}

/// Empty cells and `nan` are absent values; anything else must be a number.
pub(crate) fn parse_cell(path: &Path, line: usize, column: &str, cell: &str) -> Result<Option<f64>> {
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    cell.parse::<f64>()
        .map(Some)
        .map_err(|e| Error::parse(path, line, format!("column {:?}: {:?}: {}", column, cell, e)))
}

/// 1-based line number of a record in the original file.
pub(crate) fn record_line(record: &csv::StringRecord, preamble: usize) -> usize {
    record.position().map(|p| p.line() as usize).unwrap_or(0) + preamble
}

pub(crate) fn log_parsed(kind: &str, path: &Path, series: usize, rows: usize) {
    log(
        Level::Debug,
        Domain::Parse,
        "parsed",
        obj(&[
            ("kind", v_str(kind)),
            ("path", v_str(&path.display().to_string())),
            ("series", json!(series)),
            ("rows", json!(rows)),
        ]),
    );
}
