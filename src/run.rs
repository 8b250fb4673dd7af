//! Loading one run directory into a merged, trimmed wide table.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::json;

use crate::column::{ColumnDescriptor, ATTR_RUN, ATTR_TEST, ATTR_WORKER, GROUP_PERCENTILES};
use crate::config::ReportConfig;
use crate::error::{Error, Result};
use crate::histogram::HistogramProcessor;
use crate::layout::{self, CounterFile, CounterSource, RunLayout, COUNTER_PREFIX, CSV_EXT};
use crate::logging::{log, log_skip, obj, v_str, Domain, Level, ProfileScope};
use crate::merge::{aggregate_workers, merge};
use crate::parse::latency::MICROS_MARKER;
use crate::parse::{parse_dstat, parse_hgrm, parse_latency_history, parse_operations, PercentileTable};
use crate::period::{compute_period, Period};
use crate::series::{Timestamp, WideTable};

/// Directory inside a run that receives the summed counter files.
pub const MERGED_DIR: &str = "merged";

/// Latency distribution of one worker and test over the whole period.
#[derive(Debug, Clone, PartialEq)]
pub struct PercentileDistribution {
    pub descriptor: ColumnDescriptor,
    pub table: PercentileTable,
}

#[derive(Debug, Clone)]
pub struct RunData {
    pub label: String,
    pub root: PathBuf,
    pub period: Period,
    /// Every source of the run, outer-joined and trimmed to `period`.
    pub table: WideTable,
    pub distributions: Vec<PercentileDistribution>,
}

fn counter_key(kind: &CounterFile) -> Option<&str> {
    match kind {
        CounterFile::WholeRun => None,
        CounterFile::PerTest(t) => Some(t.as_str()),
    }
}

fn counter_table(src: &CounterSource, worker: Option<&str>) -> Result<WideTable> {
    let series = parse_operations(&src.path, worker, counter_key(&src.kind))?;
    Ok(WideTable::from_series(series))
}

fn merged_file_name(kind: &CounterFile) -> String {
    match kind {
        CounterFile::WholeRun => format!("{}{}", COUNTER_PREFIX, CSV_EXT),
        CounterFile::PerTest(t) => format!("{}-{}{}", COUNTER_PREFIX, t, CSV_EXT),
    }
}

fn write_merged(root: &Path, kind: &CounterFile, table: &WideTable) -> Result<()> {
    let dir = root.join(MERGED_DIR);
    std::fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
    let path = dir.join(merged_file_name(kind));
    let file = std::fs::File::create(&path).map_err(|e| Error::io(&path, e))?;
    table.write_csv(file)
}

/// Worker counter tables, and their per-kind cluster sums.
fn load_counters(
    layout: &RunLayout,
    cfg: &ReportConfig,
) -> Result<(Vec<WideTable>, BTreeMap<Option<String>, WideTable>)> {
    let mut per_kind: BTreeMap<Option<String>, (CounterFile, Vec<WideTable>)> = BTreeMap::new();
    let mut worker_tables = Vec::new();
    for worker in &layout.workers {
        for src in &worker.counters {
            let table = counter_table(src, Some(&worker.id))?;
            per_kind
                .entry(counter_key(&src.kind).map(str::to_string))
                .or_insert_with(|| (src.kind.clone(), Vec::new()))
                .1
                .push(table.clone());
            worker_tables.push(table);
        }
    }

    let mut cluster = BTreeMap::new();
    for (key, (kind, tables)) in per_kind {
        let sum = aggregate_workers(&tables, cfg.aggregation);
        write_merged(&layout.root, &kind, &sum)?;
        cluster.insert(key, sum);
    }
    // Cluster files shipped with the run win over the local sums.
    for src in &layout.cluster_counters {
        let table = counter_table(src, None)?;
        let key = counter_key(&src.kind).map(str::to_string);
        let combined = match cluster.remove(&key) {
            Some(sum) => merge(&[sum, table]),
            None => table,
        };
        cluster.insert(key, combined);
    }
    Ok((worker_tables, cluster))
}

/// Whole-run cluster counters if present, otherwise any cluster table.
fn representative(cluster: &BTreeMap<Option<String>, WideTable>) -> Option<&WideTable> {
    cluster
        .get(&None)
        .filter(|t| !t.is_empty())
        .or_else(|| cluster.values().find(|t| !t.is_empty()))
}

pub fn load_run(
    root: &Path,
    label: &str,
    cfg: &ReportConfig,
    processor: &dyn HistogramProcessor,
) -> Result<RunData> {
    let _scope = ProfileScope::with_context("load_run", &[("run_label", v_str(label))]);
    cfg.validate()?;
    let layout = layout::discover(root)?;
    let (worker_tables, cluster) = load_counters(&layout, cfg)?;

    let mut dstat_tables = Vec::new();
    for src in &layout.dstat {
        dstat_tables.push(WideTable::from_series(parse_dstat(&src.path, &src.agent_id)?));
    }

    let mut counters: Vec<WideTable> = cluster.values().cloned().collect();
    counters.extend(worker_tables);

    let (period, zero) = match representative(&cluster) {
        Some(t) => (
            compute_period(t, cfg.warmup_secs, cfg.cooldown_secs)?,
            t.first_ts(),
        ),
        None => {
            let all = merge(&dstat_tables);
            (compute_period(&all, cfg.warmup_secs, cfg.cooldown_secs)?, all.first_ts())
        }
    };
    let zero: Timestamp = zero.unwrap_or(period.start);

    let mut latency_tables = Vec::new();
    let mut distributions = Vec::new();
    for worker in &layout.workers {
        for hist in &worker.histograms {
            processor.process(hist, Some(period.relative_to(zero)))?;

            let history = hist.latency_history();
            if history.exists() {
                let series = parse_latency_history(&history, &worker.id, &hist.test_id)?;
                latency_tables.push(WideTable::from_series(series));
            } else {
                log_skip(Domain::Parse, &history, "latency history not found");
            }

            let hgrm = hist.hgrm();
            if hgrm.exists() {
                let descriptor = ColumnDescriptor::new(GROUP_PERCENTILES, &format!("latency{}", MICROS_MARKER))?
                    .with_attr(ATTR_WORKER, &worker.id)?
                    .with_attr(ATTR_TEST, &hist.test_id)?;
                distributions.push(PercentileDistribution {
                    descriptor,
                    table: parse_hgrm(&hgrm)?,
                });
            } else {
                log_skip(Domain::Parse, &hgrm, "hgrm not found");
            }
        }
    }

    let mut sources = counters;
    sources.extend(latency_tables);
    sources.extend(dstat_tables);
    let table = period.trim_table(&merge(&sources));

    log(
        Level::Info,
        Domain::Period,
        "run_loaded",
        obj(&[
            ("run_label", v_str(label)),
            ("path", v_str(&root.display().to_string())),
            ("start", json!(period.start)),
            ("end", json!(period.end)),
            ("rows", json!(table.len())),
            ("columns", json!(table.columns().len())),
        ]),
    );

    Ok(RunData {
        label: label.to_string(),
        root: root.to_path_buf(),
        period,
        table,
        distributions,
    })
}

/// Run label from a directory name, for callers that give none.
pub fn default_label(root: &Path) -> String {
    root.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("run")
        .to_string()
}

impl RunData {
    /// Table with time as seconds since the period start and every column
    /// tagged with this run's label.
    pub fn labelled(&self) -> Result<WideTable> {
        self.table
            .rebase(self.period.start)
            .map_columns(|c| c.clone().with_attr(ATTR_RUN, &self.label))
    }
}

/// Overlay frame of several runs, each fully loaded beforehand.
pub fn comparison_frame(runs: &[RunData]) -> Result<WideTable> {
    let tables = runs
        .iter()
        .map(RunData::labelled)
        .collect::<Result<Vec<_>>>()?;
    Ok(merge(&tables))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::PreprocessedHistograms;

    fn worker_dir(root: &Path, name: &str) -> PathBuf {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn ops(values: &[(i64, f64)]) -> String {
        let mut s = String::from("epoch,timestamp,operations\n");
        for (t, v) in values {
            s.push_str(&format!("{},t,{}\n", t, v));
        }
        s
    }

    #[test]
    fn test_two_workers_summed_and_written() {
        let dir = tempfile::tempdir().unwrap();
        let a = worker_dir(dir.path(), "A1_W1-h-member");
        let b = worker_dir(dir.path(), "A1_W2-h-member");
        std::fs::write(a.join("operations.csv"), ops(&[(0, 1.0), (1, 2.0)])).unwrap();
        std::fs::write(b.join("operations.csv"), ops(&[(0, 10.0), (1, 20.0)])).unwrap();

        let cfg = ReportConfig::default();
        let run = load_run(dir.path(), "base", &cfg, &PreprocessedHistograms).unwrap();
        let cluster = ColumnDescriptor::new("Operations", "operations").unwrap();
        assert_eq!(run.table.get(0, &cluster), Some(11.0));
        assert_eq!(run.table.get(1, &cluster), Some(22.0));
        assert!(dir.path().join(MERGED_DIR).join("operations.csv").exists());
    }

    #[test]
    fn test_missing_histogram_outputs_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let a = worker_dir(dir.path(), "A1_W1-h-member");
        std::fs::write(a.join("operations.csv"), ops(&[(0, 1.0)])).unwrap();
        std::fs::write(a.join("mapTest.hdr"), "x").unwrap();

        let run = load_run(dir.path(), "base", &ReportConfig::default(), &PreprocessedHistograms).unwrap();
        assert!(run.distributions.is_empty());
        assert_eq!(run.table.len(), 1);
    }

    #[test]
    fn test_empty_run_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_run(dir.path(), "x", &ReportConfig::default(), &PreprocessedHistograms).is_err());
    }

    #[test]
    fn test_comparison_frame_aligns_runs_on_elapsed_time() {
        let one = tempfile::tempdir().unwrap();
        let two = tempfile::tempdir().unwrap();
        let a = worker_dir(one.path(), "A1_W1-h-member");
        let b = worker_dir(two.path(), "A1_W1-h-member");
        std::fs::write(a.join("operations.csv"), ops(&[(100, 1.0), (101, 2.0)])).unwrap();
        std::fs::write(b.join("operations.csv"), ops(&[(500, 3.0), (501, 4.0)])).unwrap();

        let cfg = ReportConfig::default();
        let runs = vec![
            load_run(one.path(), "old", &cfg, &PreprocessedHistograms).unwrap(),
            load_run(two.path(), "new", &cfg, &PreprocessedHistograms).unwrap(),
        ];
        let frame = comparison_frame(&runs).unwrap();
        assert_eq!(frame.timestamps().collect::<Vec<_>>(), vec![0, 1]);
        let new_ops = ColumnDescriptor::new("Operations", "operations")
            .unwrap()
            .with_attr(ATTR_RUN, "new")
            .unwrap();
        assert_eq!(frame.get(1, &new_ops), Some(4.0));
    }
}
