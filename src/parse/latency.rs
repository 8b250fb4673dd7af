//! Percentile-over-time CSV produced from an HDR histogram log.
//!
//! Header columns look like `StartTime,Interval_Length,Int_Count,Int_50%,...,
//! Total_Count,Total_99.9%,Total_Max`; they are renamed to
//! `interval_count`, `interval_p50(us)`, `total_p99.9(us)`, `total_max(us)`.

use std::path::Path;

use super::{csv_reader, log_parsed, parse_cell, read_after_preamble, record_line};
use crate::column::{ColumnDescriptor, ATTR_TEST, ATTR_WORKER, GROUP_LATENCY};
use crate::error::{Error, Result};
use crate::series::{round_epoch, TimeSeries};

pub const LATENCY_PREAMBLE_LINES: usize = 2;
pub const START_TIME: &str = "StartTime";
/// Marks a metric measured in microseconds (lower is better).
pub const MICROS_MARKER: &str = "(us)";

const LATENCY_STATS: [&str; 5] = ["max", "min", "mean", "stddeviation", "median"];

pub(super) fn is_unnamed(header: &str) -> bool {
    header.is_empty() || header.starts_with("Unnamed")
}

/// Canonical metric name of a latency-history column, `None` for the time
/// column and unnamed index columns.
pub fn canonical_latency_name(header: &str) -> Option<String> {
    let header = header.trim();
    if is_unnamed(header) || header == START_TIME {
        return None;
    }
    let (kind, stat) = if let Some(rest) = header.strip_prefix("Int_") {
        ("interval", rest)
    } else if let Some(rest) = header.strip_prefix("Interval_") {
        ("interval", rest)
    } else if let Some(rest) = header.strip_prefix("Total_") {
        ("total", rest)
    } else {
        return Some(header.to_ascii_lowercase());
    };
    if let Some(pct) = stat.strip_suffix('%') {
        return Some(format!("{}_p{}{}", kind, pct, MICROS_MARKER));
    }
    let stat = stat.to_ascii_lowercase();
    if LATENCY_STATS.contains(&stat.as_str()) {
        Some(format!("{}_{}{}", kind, stat, MICROS_MARKER))
    } else {
        Some(format!("{}_{}", kind, stat))
    }
}

pub fn parse_latency_history(path: &Path, worker_id: &str, test_id: &str) -> Result<Vec<TimeSeries>> {
    let body = read_after_preamble(path, LATENCY_PREAMBLE_LINES)?;
    let mut reader = csv_reader(&body);
    let headers = reader.headers()?.clone();
    let time_idx = headers.iter().position(|h| h == START_TIME).ok_or_else(|| {
        Error::parse(path, LATENCY_PREAMBLE_LINES + 1, format!("no {} column", START_TIME))
    })?;

    let mut columns: Vec<(usize, TimeSeries)> = Vec::new();
    for (idx, header) in headers.iter().enumerate() {
        let Some(name) = canonical_latency_name(header) else {
            continue;
        };
        let desc = ColumnDescriptor::new(GROUP_LATENCY, &name)?
            .with_attr(ATTR_WORKER, worker_id)?
            .with_attr(ATTR_TEST, test_id)?;
        columns.push((idx, TimeSeries::new(desc)));
    }

    let mut rows = 0;
    for record in reader.records() {
        let record = record?;
        let line = record_line(&record, LATENCY_PREAMBLE_LINES);
        let start = match parse_cell(path, line, START_TIME, record.get(time_idx).unwrap_or(""))? {
            Some(t) => round_epoch(t),
            None => continue,
        };
        for (idx, series) in columns.iter_mut() {
            let cell = record.get(*idx).unwrap_or("");
            if let Some(value) = parse_cell(path, line, &headers[*idx], cell)? {
                series.push(start, value);
            }
        }
        rows += 1;
    }
    let series: Vec<TimeSeries> = columns.into_iter().map(|(_, s)| s).collect();
    log_parsed("latency_history", path, series.len(), rows);
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_names() {
        assert_eq!(canonical_latency_name("Int_99.9%").as_deref(), Some("interval_p99.9(us)"));
        assert_eq!(canonical_latency_name("Total_50%").as_deref(), Some("total_p50(us)"));
        assert_eq!(canonical_latency_name("Int_Count").as_deref(), Some("interval_count"));
        assert_eq!(canonical_latency_name("Total_Max").as_deref(), Some("total_max(us)"));
        assert_eq!(canonical_latency_name("Interval_Length").as_deref(), Some("interval_length"));
        assert_eq!(canonical_latency_name("StartTime"), None);
        assert_eq!(canonical_latency_name(""), None);
        assert_eq!(canonical_latency_name("Unnamed: 0"), None);
    }

    #[test]
    fn test_parse_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapTest.latency-history.csv");
        std::fs::write(
            &path,
            "#[Logged with jHiccup]\n\
             #[StartTime: 1000]\n\
             ,StartTime,Int_Count,Int_99%,Total_99%\n\
             0,1000.0,50,120.5,120.5\n\
             1,1001.2,60,90,110\n",
        )
        .unwrap();
        let series = parse_latency_history(&path, "A1_W1", "mapTest").unwrap();
        let names: Vec<&str> = series.iter().map(|s| s.descriptor().metric_id()).collect();
        assert_eq!(names, vec!["interval_count", "interval_p99(us)", "total_p99(us)"]);
        assert_eq!(series[1].get(1000), Some(120.5));
        assert_eq!(series[2].get(1001), Some(110.0));
        assert_eq!(series[0].descriptor().attr(ATTR_TEST), Some("mapTest"));
    }

    #[test]
    fn test_missing_start_time_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.latency-history.csv");
        std::fs::write(&path, "a\nb\nInt_Count\n1\n").unwrap();
        assert!(matches!(
            parse_latency_history(&path, "A1_W1", "x"),
            Err(Error::Parse { .. })
        ));
    }
}
