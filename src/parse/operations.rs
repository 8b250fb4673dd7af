//! Worker operation counters: `epoch,timestamp,<counter>...`.

use std::path::Path;

use super::{csv_reader, log_parsed, parse_cell, read_after_preamble, record_line};
use crate::column::{ColumnDescriptor, ATTR_TEST, ATTR_WORKER, GROUP_OPERATIONS};
use crate::error::{Error, Result};
use crate::series::{round_epoch, TimeSeries};

/// Columns before the first counter: epoch seconds and a display timestamp.
const LEADING_COLUMNS: usize = 2;

/// One series per counter column. `worker_id`/`test_id` are attached when
/// given; a cluster-wide whole-run file passes neither.
pub fn parse_operations(
    path: &Path,
    worker_id: Option<&str>,
    test_id: Option<&str>,
) -> Result<Vec<TimeSeries>> {
    let body = read_after_preamble(path, 0)?;
    let mut reader = csv_reader(&body);
    let headers = reader.headers()?.clone();
    if headers.len() <= LEADING_COLUMNS {
        return Err(Error::parse(path, 1, "counter file has no counter columns"));
    }

    let mut series = Vec::with_capacity(headers.len() - LEADING_COLUMNS);
    for name in headers.iter().skip(LEADING_COLUMNS) {
        let mut desc = ColumnDescriptor::new(GROUP_OPERATIONS, name)?;
        if let Some(worker) = worker_id {
            desc = desc.with_attr(ATTR_WORKER, worker)?;
        }
        if let Some(test) = test_id {
            desc = desc.with_attr(ATTR_TEST, test)?;
        }
        series.push(TimeSeries::new(desc));
    }

    let mut rows = 0;
    for record in reader.records() {
        let record = record?;
        let line = record_line(&record, 0);
        let epoch = match parse_cell(path, line, "epoch", record.get(0).unwrap_or(""))? {
            Some(e) => round_epoch(e),
            None => continue,
        };
        for (i, s) in series.iter_mut().enumerate() {
            let column = &headers[i + LEADING_COLUMNS];
            let cell = record.get(i + LEADING_COLUMNS).unwrap_or("");
            if let Some(value) = parse_cell(path, line, column, cell)? {
                s.push(epoch, value);
            }
        }
        rows += 1;
    }
    log_parsed("operations", path, series.len(), rows);
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("operations-mapTest.csv");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_parse_tags_and_rounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "epoch,timestamp,operations,operations/second\n\
             1000.4,10:00:00,10,10.0\n\
             1001.6,10:00:01,25,15.0\n",
        );
        let series = parse_operations(&path, Some("A1_W1"), Some("mapTest")).unwrap();
        assert_eq!(series.len(), 2);
        let ops = &series[0];
        assert_eq!(ops.descriptor().metric_id(), "operations");
        assert_eq!(ops.descriptor().attr(ATTR_WORKER), Some("A1_W1"));
        assert_eq!(ops.descriptor().attr(ATTR_TEST), Some("mapTest"));
        assert_eq!(ops.get(1000), Some(10.0));
        assert_eq!(ops.get(1002), Some(25.0));
    }

    #[test]
    fn test_cluster_file_has_no_worker_tag() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "epoch,timestamp,operations\n1,t,5\n");
        let series = parse_operations(&path, None, None).unwrap();
        assert!(series[0].descriptor().attributes().is_empty());
    }

    #[test]
    fn test_duplicate_epoch_keeps_last_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "epoch,timestamp,operations\n5.1,a,1\n4.9,b,2\n");
        let series = parse_operations(&path, None, None).unwrap();
        assert_eq!(series[0].len(), 1);
        assert_eq!(series[0].get(5), Some(2.0));
    }

    #[test]
    fn test_bad_number_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "epoch,timestamp,operations\n1,a,1\n2,b,oops\n");
        match parse_operations(&path, None, None) {
            Err(Error::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected parse error, got {:?}", other),
        }
    }
}
