//! Chart model and the projection of tables and histories onto charts.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::column::{ColumnDescriptor, ATTR_RUN, ATTR_TEST, ATTR_WORKER};
use crate::history::MetricHistory;
use crate::regression::MetricAnalysis;
use crate::run::RunData;
use crate::series::WideTable;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartLine {
    pub label: String,
    pub points: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    /// File stem shared by the image and the CSV export.
    pub name: String,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub lines: Vec<ChartLine>,
    /// Vertical markers, in x units.
    pub markers: Vec<f64>,
}

impl Chart {
    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|l| l.points.is_empty())
    }
}

/// One chart per `(group, metric, worker, test)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChartKey {
    pub group: String,
    pub metric_id: String,
    pub worker_id: Option<String>,
    pub test_id: Option<String>,
}

impl ChartKey {
    pub fn of(desc: &ColumnDescriptor) -> Self {
        Self {
            group: desc.group().to_string(),
            metric_id: desc.metric_id().to_string(),
            worker_id: desc.attr(ATTR_WORKER).map(str::to_string),
            test_id: desc.attr(ATTR_TEST).map(str::to_string),
        }
    }

    fn parts(&self) -> Vec<&str> {
        let mut parts = vec![self.group.as_str(), self.metric_id.as_str()];
        parts.extend(self.worker_id.as_deref());
        parts.extend(self.test_id.as_deref());
        parts
    }

    pub fn file_stem(&self) -> String {
        file_stem(&self.parts().join("_"))
    }

    pub fn title(&self) -> String {
        self.parts().join(" / ")
    }
}

/// Filesystem-safe version of `name`.
pub fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Stems already handed out in one output directory. Distinct names that
/// sanitize to the same stem get `_2`, `_3`, ... appended.
#[derive(Debug, Default)]
pub struct StemSet {
    taken: BTreeSet<String>,
}

impl StemSet {
    pub fn claim(&mut self, stem: String) -> String {
        if self.taken.insert(stem.clone()) {
            return stem;
        }
        let mut n = 2;
        loop {
            let candidate = format!("{}_{}", stem, n);
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Legend entry: run label first, then any attribute outside the chart key.
fn line_label(desc: &ColumnDescriptor) -> String {
    let mut parts: Vec<&str> = desc.attr(ATTR_RUN).into_iter().collect();
    for (k, v) in desc.attributes() {
        if k != ATTR_RUN && k != ATTR_WORKER && k != ATTR_TEST {
            parts.push(v);
        }
    }
    if parts.is_empty() {
        desc.metric_id().to_string()
    } else {
        parts.join(" ")
    }
}

/// Groups the columns to chart. Per-worker columns are only charted when
/// `full_diagrams` is set or no cluster total exists for them.
pub fn group_columns(table: &WideTable, full_diagrams: bool) -> BTreeMap<ChartKey, Vec<ColumnDescriptor>> {
    let mut groups: BTreeMap<ChartKey, Vec<ColumnDescriptor>> = BTreeMap::new();
    for desc in table.columns() {
        if !full_diagrams
            && desc.attr(ATTR_WORKER).is_some()
            && table.column_index(&desc.without_attr(ATTR_WORKER)).is_some()
        {
            continue;
        }
        groups.entry(ChartKey::of(desc)).or_default().push(desc.clone());
    }
    groups
}

/// Line charts over time, each with the complete-row table it was drawn from.
pub fn time_charts(frame: &WideTable, full_diagrams: bool, stems: &mut StemSet) -> Vec<(Chart, WideTable)> {
    let mut out = Vec::new();
    for (key, columns) in group_columns(frame, full_diagrams) {
        let data = frame.select(|c| columns.contains(c)).drop_incomplete();
        if data.is_empty() {
            continue;
        }
        let lines = data
            .columns()
            .iter()
            .enumerate()
            .map(|(i, desc)| ChartLine {
                label: line_label(desc),
                points: data
                    .rows()
                    .filter_map(|(ts, row)| row[i].map(|v| (ts as f64, v)))
                    .collect(),
            })
            .collect();
        out.push((
            Chart {
                name: stems.claim(key.file_stem()),
                title: key.title(),
                x_label: "time (s)".to_string(),
                y_label: key.metric_id.clone(),
                lines,
                markers: Vec::new(),
            },
            data,
        ));
    }
    out
}

/// Latency-by-percentile charts, one per worker and test, one line per run.
pub fn percentile_charts(runs: &[RunData], stems: &mut StemSet) -> Vec<Chart> {
    let mut groups: BTreeMap<ChartKey, Vec<ChartLine>> = BTreeMap::new();
    for run in runs {
        for dist in &run.distributions {
            let points = dist
                .table
                .rows
                .iter()
                .map(|r| (r.percentile * 100.0, r.value))
                .collect();
            groups.entry(ChartKey::of(&dist.descriptor)).or_default().push(ChartLine {
                label: run.label.clone(),
                points,
            });
        }
    }
    groups
        .into_iter()
        .map(|(key, lines)| Chart {
            name: stems.claim(key.file_stem()),
            title: key.title(),
            x_label: "percentile".to_string(),
            y_label: key.metric_id.clone(),
            lines,
            markers: Vec::new(),
        })
        .collect()
}

/// A metric across commits, with changepoints marked.
pub fn history_chart(history: &MetricHistory, analysis: Option<&MetricAnalysis>) -> Chart {
    Chart {
        name: file_stem(&format!("history_{}", history.metric)),
        title: history.metric.clone(),
        x_label: "commit".to_string(),
        y_label: history.metric.clone(),
        lines: vec![ChartLine {
            label: history.metric.clone(),
            points: history
                .points
                .iter()
                .enumerate()
                .map(|(i, p)| (i as f64, p.value))
                .collect(),
        }],
        markers: analysis
            .map(|a| a.changepoints.iter().map(|c| c.index as f64).collect())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::TimeSeries;

    fn ops(worker: Option<&str>, run: &str) -> ColumnDescriptor {
        let mut d = ColumnDescriptor::new("Operations", "put").unwrap();
        if let Some(w) = worker {
            d = d.with_attr(ATTR_WORKER, w).unwrap();
        }
        d.with_attr(ATTR_RUN, run).unwrap()
    }

    #[test]
    fn test_runs_share_a_chart_and_incomplete_rows_are_dropped() {
        let frame = WideTable::from_series(vec![
            TimeSeries::from_points(ops(None, "old"), vec![(0, 1.0), (1, 2.0), (2, 3.0)]),
            TimeSeries::from_points(ops(None, "new"), vec![(0, 4.0), (1, 5.0)]),
        ]);
        let charts = time_charts(&frame, false, &mut StemSet::default());
        assert_eq!(charts.len(), 1);
        let (chart, data) = &charts[0];
        assert_eq!(chart.lines.len(), 2);
        assert_eq!(data.len(), 2);
        let labels: Vec<&str> = chart.lines.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(labels, vec!["old", "new"]);
        assert_eq!(chart.name, "Operations_put");
    }

    #[test]
    fn test_colliding_stems_get_distinct_names() {
        let mem = |metric: &str| ColumnDescriptor::new("dstat", metric).unwrap();
        let frame = WideTable::from_series(vec![
            TimeSeries::from_points(mem("memory usage:used"), vec![(0, 1.0)]),
            TimeSeries::from_points(mem("memory usage used"), vec![(0, 2.0)]),
        ]);
        let mut stems = StemSet::default();
        let charts = time_charts(&frame, false, &mut stems);
        let mut names: Vec<&str> = charts.iter().map(|(c, _)| c.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["dstat_memory_usage_used", "dstat_memory_usage_used_2"]);
        assert_eq!(stems.claim("dstat_memory_usage_used".into()), "dstat_memory_usage_used_3");
    }

    #[test]
    fn test_worker_columns_hidden_behind_cluster_total() {
        let frame = WideTable::from_series(vec![
            TimeSeries::from_points(ops(None, "r"), vec![(0, 3.0)]),
            TimeSeries::from_points(ops(Some("A1_W1"), "r"), vec![(0, 1.0)]),
            TimeSeries::from_points(ops(Some("A1_W2"), "r"), vec![(0, 2.0)]),
        ]);
        assert_eq!(group_columns(&frame, false).len(), 1);
        assert_eq!(group_columns(&frame, true).len(), 3);
    }

    #[test]
    fn test_extra_attributes_distinguish_lines() {
        let cpu = |agent: &str| {
            ColumnDescriptor::new("dstat", "cpu usr")
                .unwrap()
                .with_attr("agent_id", agent)
                .unwrap()
                .with_attr(ATTR_RUN, "r")
                .unwrap()
        };
        assert_eq!(line_label(&cpu("A1")), "r A1");
        assert_eq!(file_stem("dstat_cpu usr"), "dstat_cpu_usr");
    }
}
