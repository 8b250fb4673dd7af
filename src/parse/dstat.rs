//! Agent system statistics written by dstat.

use std::path::Path;

use super::latency::is_unnamed;
use super::{csv_reader, log_parsed, parse_cell, read_after_preamble, record_line};
use crate::column::{ColumnDescriptor, ATTR_AGENT, GROUP_DSTAT};
use crate::error::{Error, Result};
use crate::logging::{log_skip, Domain};
use crate::series::{round_epoch, TimeSeries};

/// Lines of dstat banner before the column header.
pub const DSTAT_PREAMBLE_LINES: usize = 5;

/// Factor applied to memory columns on ingest.
pub const MEMORY_SCALE: f64 = 1000.0;

pub fn is_memory_column(name: &str) -> bool {
    name.to_ascii_lowercase().contains("memory")
}

/// One series per resource column; the first column is epoch seconds.
pub fn parse_dstat(path: &Path, agent_id: &str) -> Result<Vec<TimeSeries>> {
    let body = read_after_preamble(path, DSTAT_PREAMBLE_LINES)?;
    let mut reader = csv_reader(&body);
    let headers = reader.headers()?.clone();
    if headers.len() < 2 {
        return Err(Error::parse(
            path,
            DSTAT_PREAMBLE_LINES + 1,
            "dstat header has no metric columns",
        ));
    }

    // (csv column, scale) for every named metric column
    let mut columns = Vec::with_capacity(headers.len() - 1);
    let mut series = Vec::with_capacity(headers.len() - 1);
    for (col, name) in headers.iter().enumerate().skip(1) {
        let name = name.trim();
        if is_unnamed(name) {
            log_skip(Domain::Parse, path, &format!("unnamed dstat column {}", col));
            continue;
        }
        let desc = ColumnDescriptor::new(GROUP_DSTAT, name)?.with_attr(ATTR_AGENT, agent_id)?;
        series.push(TimeSeries::new(desc));
        columns.push((col, if is_memory_column(name) { MEMORY_SCALE } else { 1.0 }));
    }

    let mut rows = 0;
    for record in reader.records() {
        let record = record?;
        let line = record_line(&record, DSTAT_PREAMBLE_LINES);
        let epoch = match parse_cell(path, line, "epoch", record.get(0).unwrap_or(""))? {
            Some(e) => round_epoch(e),
            None => continue,
        };
        for (s, &(col, scale)) in series.iter_mut().zip(&columns) {
            let cell = record.get(col).unwrap_or("");
            if let Some(value) = parse_cell(path, line, &headers[col], cell)? {
                s.push(epoch, value * scale);
            }
        }
        rows += 1;
    }
    log_parsed("dstat", path, series.len(), rows);
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BANNER: &str = "\"Dstat 0.7.3 CSV output\"\n\
        \"Author:\",\"Dag Wieers\"\n\
        \"Host:\",\"agent1\"\n\
        \"Cmdline:\",\"dstat --epoch -m\"\n\
        \n";

    #[test]
    fn test_memory_columns_scaled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("A1_dstat.csv");
        let body = format!(
            "{}epoch,memory usage:used,load avg:1m\n100.2,2.5,0.75\n101.0,3,0.5\n",
            BANNER
        );
        std::fs::write(&path, body).unwrap();

        let series = parse_dstat(&path, "A1").unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].descriptor().group(), GROUP_DSTAT);
        assert_eq!(series[0].descriptor().attr(ATTR_AGENT), Some("A1"));
        assert_eq!(series[0].get(100), Some(2500.0));
        assert_eq!(series[0].get(101), Some(3000.0));
        assert_eq!(series[1].get(100), Some(0.75));
    }

    #[test]
    fn test_blank_header_cells_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("A1_dstat.csv");
        let body = format!(
            "{}\"epoch\",\"memory usage\",,\"load avg\"\n100,1.5,,0.25\n101,2,,0.5\n",
            BANNER
        );
        std::fs::write(&path, body).unwrap();

        let series = parse_dstat(&path, "A1").unwrap();
        let names: Vec<&str> = series.iter().map(|s| s.descriptor().metric_id()).collect();
        assert_eq!(names, vec!["memory usage", "load avg"]);
        assert_eq!(series[0].get(101), Some(2000.0));
        assert_eq!(series[1].get(101), Some(0.5));
    }

    #[test]
    fn test_is_memory_column() {
        assert!(is_memory_column("Memory Usage:free"));
        assert!(!is_memory_column("total cpu usage:usr"));
    }
}
