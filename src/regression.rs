//! Cross-commit regression analysis: anomalies and changepoints per metric,
//! folded into a commit-keyed problem summary.

use std::path::Path;

use serde::ser::{Serialize, Serializer};
use serde::Deserialize;

use crate::anomaly::{self, Anomaly};
use crate::changepoint::{self, ChangePoint, ChangepointAlgorithm};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::history::{build_histories, load_results, CommitOrder, HistorySet, MetricHistory};
use crate::logging::{log_anomaly, log_changepoint, ProfileScope};

#[derive(Debug, Clone, PartialEq, serde::Serialize, Deserialize)]
pub struct MetricAnalysis {
    pub metric: String,
    pub anomalies: Vec<Anomaly>,
    pub changepoints: Vec<ChangePoint>,
}

impl MetricAnalysis {
    pub fn is_clean(&self) -> bool {
        self.anomalies.is_empty() && self.changepoints.is_empty()
    }
}

pub fn analyze_history(
    history: &MetricHistory,
    cfg: &AnalysisConfig,
    algorithm: &dyn ChangepointAlgorithm,
) -> Result<MetricAnalysis> {
    let values = history.values();
    let anomalies = anomaly::detect(&values, cfg.min_window, cfg.max_window, cfg.threshold)?;
    let changepoints = changepoint::detect(&values, cfg.permutations, cfg.pvalue, algorithm)?;

    for a in &anomalies {
        log_anomaly(
            &history.metric,
            history.commit(a.index).unwrap_or(""),
            a.deviation,
            a.direction.as_str(),
        );
    }
    for cp in &changepoints {
        log_changepoint(&history.metric, history.commit(cp.index).unwrap_or(""), cp.index);
    }
    Ok(MetricAnalysis {
        metric: history.metric.clone(),
        anomalies,
        changepoints,
    })
}

/// Problems found at one commit, in the order they were detected.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitProblems {
    pub commit: String,
    pub problems: Vec<String>,
}

/// `commit -> [problem, ..]`, commits old to new, clean commits left out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProblemSummary {
    pub entries: Vec<CommitProblems>,
}

impl Serialize for ProblemSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|e| (&e.commit, &e.problems)))
    }
}

impl ProblemSummary {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn problems(&self, commit: &str) -> &[String] {
        self.entries
            .iter()
            .find(|e| e.commit == commit)
            .map(|e| e.problems.as_slice())
            .unwrap_or(&[])
    }

    /// Plain-text rendering: commit on its own line, problems indented below.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.commit);
            out.push('\n');
            for p in &entry.problems {
                out.push_str("  ");
                out.push_str(p);
                out.push('\n');
            }
        }
        out
    }
}

fn anomaly_problem(metric: &str, a: &Anomaly) -> String {
    format!(
        "{}: anomaly {} {:+.2} std-devs",
        metric,
        a.direction.as_str(),
        a.deviation
    )
}

fn changepoint_problem(history: &MetricHistory, cp: &ChangePoint) -> String {
    let before = cp.index.checked_sub(1).and_then(|i| history.points.get(i));
    match (before, history.points.get(cp.index)) {
        (Some(b), Some(a)) => format!(
            "{}: changepoint {} -> {} ({:+.1}%)",
            history.metric,
            b.value,
            a.value,
            percent_change(b.value, a.value)
        ),
        _ => format!("{}: changepoint", history.metric),
    }
}

fn percent_change(before: f64, after: f64) -> f64 {
    if before == 0.0 {
        0.0
    } else {
        (after - before) / before.abs() * 100.0
    }
}

pub fn summarize(histories: &HistorySet, analyses: &[MetricAnalysis]) -> ProblemSummary {
    let mut entries: Vec<CommitProblems> = histories
        .commits
        .iter()
        .map(|c| CommitProblems {
            commit: c.clone(),
            problems: Vec::new(),
        })
        .collect();

    for analysis in analyses {
        let Some(history) = histories.metric(&analysis.metric) else {
            continue;
        };
        let mut push = |index: usize, problem: String| {
            if let Some(commit) = history.commit(index) {
                if let Some(entry) = entries.iter_mut().find(|e| e.commit == commit) {
                    entry.problems.push(problem);
                }
            }
        };
        for a in &analysis.anomalies {
            push(a.index, anomaly_problem(&analysis.metric, a));
        }
        for cp in &analysis.changepoints {
            push(cp.index, changepoint_problem(history, cp));
        }
    }

    entries.retain(|e| !e.problems.is_empty());
    ProblemSummary { entries }
}

#[derive(Debug, Clone)]
pub struct RegressionReport {
    pub histories: HistorySet,
    pub analyses: Vec<MetricAnalysis>,
    pub summary: ProblemSummary,
}

pub fn analyze_results(
    root: &Path,
    order: &dyn CommitOrder,
    cfg: &AnalysisConfig,
    algorithm: &dyn ChangepointAlgorithm,
) -> Result<RegressionReport> {
    cfg.validate()?;
    let _scope = ProfileScope::new("analyze_results");
    let results = load_results(root)?;
    let histories = build_histories(&results, order)?;
    let analyses = histories
        .metrics
        .iter()
        .map(|h| analyze_history(h, cfg, algorithm))
        .collect::<Result<Vec<_>>>()?;
    let summary = summarize(&histories, &analyses);
    Ok(RegressionReport {
        histories,
        analyses,
        summary,
    })
}
