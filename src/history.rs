//! Per-metric value sequences ordered by commit ancestry.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::logging::{log, log_external_command, log_skip, obj, v_str, Domain, Level};
use crate::parse::latency::MICROS_MARKER;

pub const RESULTS_FILE: &str = "results.yaml";

/// Ancestry ordering of commits, provided by version control.
pub trait CommitOrder {
    /// `commits` sorted old to new. Commits unknown to the order are dropped.
    fn order(&self, commits: &[String]) -> Result<Vec<String>>;
    fn resolve_short(&self, commit: &str) -> Result<String>;
}

/// Order fixed up front, e.g. read from a file.
#[derive(Debug, Clone, Default)]
pub struct ListedCommitOrder {
    commits: Vec<String>,
}

impl ListedCommitOrder {
    pub fn new(commits: Vec<String>) -> Self {
        Self { commits }
    }

    /// One commit per line, oldest first; blank lines and `#` comments skipped.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let commits = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect();
        Ok(Self { commits })
    }
}

impl CommitOrder for ListedCommitOrder {
    fn order(&self, commits: &[String]) -> Result<Vec<String>> {
        Ok(self
            .commits
            .iter()
            .filter(|c| commits.iter().any(|k| k == *c))
            .cloned()
            .collect())
    }

    fn resolve_short(&self, commit: &str) -> Result<String> {
        let matches: Vec<&String> = self.commits.iter().filter(|c| c.starts_with(commit)).collect();
        match matches.as_slice() {
            [one] => Ok((*one).clone()),
            [] => Err(Error::Config(format!("unknown commit {}", commit))),
            _ => Err(Error::Config(format!("ambiguous commit {}", commit))),
        }
    }
}

/// Shells out to `git` in `repo`.
#[derive(Debug, Clone)]
pub struct GitCommitOrder {
    repo: PathBuf,
}

impl GitCommitOrder {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(&self.repo).args(args);
        let rendered = format!("{:?}", cmd);
        let started = Instant::now();
        let out = cmd.output().map_err(|e| Error::io("git", e))?;
        log_external_command(&rendered, out.status.code(), started.elapsed().as_secs_f64() * 1000.0);
        if !out.status.success() {
            return Err(Error::Process {
                command: rendered,
                code: out.status.code(),
            });
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }
}

impl CommitOrder for GitCommitOrder {
    fn order(&self, commits: &[String]) -> Result<Vec<String>> {
        let mut args = vec!["rev-list", "--topo-order", "--reverse"];
        args.extend(commits.iter().map(String::as_str));
        let listed = self.git(&args)?;
        Ok(match_listed(&listed, commits))
    }

    fn resolve_short(&self, commit: &str) -> Result<String> {
        Ok(self.git(&["rev-parse", "--short", commit])?.trim().to_string())
    }
}

/// Map `rev-list` output (full hashes, one per line) back to the names in
/// `commits`, which may be abbreviated. Each name is emitted once, at the
/// position of the first hash it abbreviates; hashes matching no name are
/// dropped.
pub fn match_listed(listed: &str, commits: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for full in listed.lines().map(str::trim).filter(|l| !l.is_empty()) {
        for name in commits {
            if !name.is_empty() && full.starts_with(name.as_str()) && !out.contains(name) {
                out.push(name.clone());
            }
        }
    }
    out
}

/// All `results.yaml` maps of one commit, one per completed run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitResults {
    pub commit: String,
    pub runs: Vec<BTreeMap<String, f64>>,
}

fn read_results(path: &Path) -> Result<BTreeMap<String, f64>> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    Ok(serde_yaml::from_str(&text)?)
}

fn sorted_dirs(path: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(path).map_err(|e| Error::io(path, e))? {
        let entry = entry.map_err(|e| Error::io(path, e))?;
        let p = entry.path();
        if p.is_dir() {
            dirs.push(p);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Reads `<root>/<commit>/<run>/results.yaml`. Runs without a readable
/// results file are skipped; commits left with no runs are omitted.
pub fn load_results(root: &Path) -> Result<Vec<CommitResults>> {
    let mut out = Vec::new();
    for commit_dir in sorted_dirs(root)? {
        let Some(commit) = commit_dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let mut runs = Vec::new();
        for run_dir in sorted_dirs(&commit_dir)? {
            let path = run_dir.join(RESULTS_FILE);
            if !path.is_file() {
                log_skip(Domain::History, &path, "no results file");
                continue;
            }
            match read_results(&path) {
                Ok(map) => runs.push(map),
                Err(e) => log_skip(Domain::History, &path, &e.to_string()),
            }
        }
        if runs.is_empty() {
            log(
                Level::Info,
                Domain::History,
                "commit_omitted",
                obj(&[("commit", v_str(commit)), ("msg", v_str("no completed runs"))]),
            );
            continue;
        }
        out.push(CommitResults {
            commit: commit.to_string(),
            runs,
        });
    }
    Ok(out)
}

/// Minimum for microsecond latencies, maximum for everything else.
pub fn pick_best_value(values: &[f64], metric: &str) -> Option<f64> {
    let finite = values.iter().copied().filter(|v| v.is_finite());
    if metric.contains(MICROS_MARKER) {
        finite.reduce(f64::min)
    } else {
        finite.reduce(f64::max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub commit: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricHistory {
    pub metric: String,
    pub points: Vec<HistoryPoint>,
}

impl MetricHistory {
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn commit(&self, index: usize) -> Option<&str> {
        self.points.get(index).map(|p| p.commit.as_str())
    }
}

/// Histories of every metric plus the commit sequence they were ordered by.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistorySet {
    /// Commits with at least one completed run, old to new.
    pub commits: Vec<String>,
    /// One history per metric, in metric-name order.
    pub metrics: Vec<MetricHistory>,
}

impl HistorySet {
    pub fn metric(&self, name: &str) -> Option<&MetricHistory> {
        self.metrics.iter().find(|h| h.metric == name)
    }
}

pub fn build_histories(results: &[CommitResults], order: &dyn CommitOrder) -> Result<HistorySet> {
    let names: Vec<String> = results.iter().map(|r| r.commit.clone()).collect();
    let ordered = order.order(&names)?;
    if ordered.len() < names.len() {
        log(
            Level::Warn,
            Domain::History,
            "commits_unordered",
            obj(&[("dropped", json!(names.len() - ordered.len()))]),
        );
    }

    let mut by_metric: BTreeMap<String, Vec<HistoryPoint>> = BTreeMap::new();
    for commit in &ordered {
        let Some(res) = results.iter().find(|r| &r.commit == commit) else {
            continue;
        };
        let mut per_metric: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for run in &res.runs {
            for (metric, value) in run {
                per_metric.entry(metric.as_str()).or_default().push(*value);
            }
        }
        for (metric, values) in per_metric {
            if let Some(value) = pick_best_value(&values, metric) {
                by_metric.entry(metric.to_string()).or_default().push(HistoryPoint {
                    commit: commit.clone(),
                    value,
                });
            }
        }
    }

    Ok(HistorySet {
        commits: ordered,
        metrics: by_metric
            .into_iter()
            .map(|(metric, points)| MetricHistory { metric, points })
            .collect(),
    })
}
