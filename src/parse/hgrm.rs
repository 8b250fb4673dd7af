//! `.hgrm` percentile distributions: `value percentile total_count [1/(1-p)]`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{log_parsed, read_after_preamble};
use crate::error::{Error, Result};

pub const HGRM_PREAMBLE_LINES: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentileRow {
    pub value: f64,
    pub percentile: f64,
    pub total_count: u64,
    pub inverse_percentile: Option<f64>,
    /// Samples in this bucket: `total_count` minus the previous row's.
    pub count: u64,
}

/// A latency distribution by percentile rank; there is no time axis.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PercentileTable {
    pub rows: Vec<PercentileRow>,
}

impl PercentileTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn total_count(&self) -> u64 {
        self.rows.last().map(|r| r.total_count).unwrap_or(0)
    }

    /// Smallest recorded value at or above percentile `p` (0..=1).
    pub fn value_at(&self, p: f64) -> Option<f64> {
        self.rows.iter().find(|r| r.percentile >= p).map(|r| r.value)
    }
}

/// Everything from the first `#` line on is trailer and is not read.
pub fn parse_hgrm(path: &Path) -> Result<PercentileTable> {
    let body = read_after_preamble(path, HGRM_PREAMBLE_LINES)?;
    let mut rows: Vec<PercentileRow> = Vec::new();
    for (offset, raw) in body.lines().enumerate() {
        let line_no = HGRM_PREAMBLE_LINES + offset + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with('#') {
            break;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            return Err(Error::parse(
                path,
                line_no,
                format!("expected 3 or 4 fields, got {}", fields.len()),
            ));
        }
        let num = |s: &str| {
            s.parse::<f64>()
                .map_err(|e| Error::parse(path, line_no, format!("{:?}: {}", s, e)))
        };
        let value = num(fields[0])?;
        let percentile = num(fields[1])?;
        let total_count = num(fields[2])? as u64;
        let inverse_percentile = fields.get(3).map(|s| num(s)).transpose()?;
        let count = match rows.last() {
            Some(prev) => total_count.saturating_sub(prev.total_count),
            None => total_count,
        };
        rows.push(PercentileRow {
            value,
            percentile,
            total_count,
            inverse_percentile,
            count,
        });
    }
    log_parsed("hgrm", path, 1, rows.len());
    Ok(PercentileTable { rows })
}
