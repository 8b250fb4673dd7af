//! Naming conventions of a run directory, and discovery of its files.
//!
//! ```text
//! <run>/
//!   A1_dstat.csv                     system stats of agent A1
//!   operations.csv                   optional cluster-wide counters
//!   A1_W1-10.0.0.5-member/           worker A1_W1
//!     operations.csv                 whole-run counters of that worker
//!     operations-mapTest.csv         counters of test `mapTest`
//!     mapTest.hdr                    latency histogram log of `mapTest`
//!     mapTest.latency-history.csv    derived from the .hdr log
//!     mapTest.hgrm                   derived from the .hdr log
//! ```

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::logging::{log, obj, v_str, Domain, Level};
use serde_json::json;

pub const COUNTER_PREFIX: &str = "operations";
pub const CSV_EXT: &str = ".csv";
pub const DSTAT_SUFFIX: &str = "_dstat.csv";
pub const HDR_EXT: &str = ".hdr";
pub const LATENCY_HISTORY_EXT: &str = ".latency-history.csv";
pub const HGRM_EXT: &str = ".hgrm";

/// Worker id of a worker directory name (`A1_W1-10.0.0.5-member` → `A1_W1`).
pub fn worker_id(dir_name: &str) -> Option<&str> {
    let (id, _) = dir_name.split_once('-')?;
    let rest = id.strip_prefix('A')?;
    let (agent, worker) = rest.split_once("_W")?;
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    (digits(agent) && digits(worker)).then_some(id)
}

pub fn is_worker_dir(dir_name: &str) -> bool {
    worker_id(dir_name).is_some()
}

/// Kind of counter file, by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterFile {
    /// `operations.csv`: every test of the run together.
    WholeRun,
    /// `operations-<test>.csv` or `operations_<test>.csv`.
    PerTest(String),
}

pub fn classify_counter_file(file_name: &str) -> Option<CounterFile> {
    let middle = file_name
        .strip_prefix(COUNTER_PREFIX)?
        .strip_suffix(CSV_EXT)?;
    if middle.is_empty() {
        return Some(CounterFile::WholeRun);
    }
    let test = middle.strip_prefix(['-', '_'])?;
    (!test.is_empty()).then(|| CounterFile::PerTest(test.to_string()))
}

/// Agent id of a system-stats file (`A1_dstat.csv` → `A1`).
pub fn dstat_agent(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(DSTAT_SUFFIX)
        .filter(|agent| !agent.is_empty())
}

/// Test id of a histogram log (`mapTest.hdr` → `mapTest`).
pub fn hdr_test_id(file_name: &str) -> Option<&str> {
    file_name.strip_suffix(HDR_EXT).filter(|t| !t.is_empty())
}

#[derive(Debug, Clone, PartialEq)]
pub struct CounterSource {
    pub kind: CounterFile,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSource {
    pub test_id: String,
    pub hdr: PathBuf,
}

impl HistogramSource {
    pub fn latency_history(&self) -> PathBuf {
        self.derived(LATENCY_HISTORY_EXT)
    }

    pub fn hgrm(&self) -> PathBuf {
        self.derived(HGRM_EXT)
    }

    /// Path prefix shared by the derived files: `<dir>/<test_id>`.
    pub fn output_prefix(&self) -> PathBuf {
        self.hdr.with_file_name(&self.test_id)
    }

    fn derived(&self, ext: &str) -> PathBuf {
        self.hdr.with_file_name(format!("{}{}", self.test_id, ext))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerDir {
    pub id: String,
    pub path: PathBuf,
    pub counters: Vec<CounterSource>,
    pub histograms: Vec<HistogramSource>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DstatSource {
    pub agent_id: String,
    pub path: PathBuf,
}

/// Every recognized input file of one run directory, sorted by name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunLayout {
    pub root: PathBuf,
    pub workers: Vec<WorkerDir>,
    pub cluster_counters: Vec<CounterSource>,
    pub dstat: Vec<DstatSource>,
}

impl RunLayout {
    pub fn test_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .workers
            .iter()
            .flat_map(|w| w.counters.iter())
            .chain(self.cluster_counters.iter())
            .filter_map(|c| match &c.kind {
                CounterFile::PerTest(t) => Some(t.clone()),
                CounterFile::WholeRun => None,
            })
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

fn sorted_entries(dir: &Path) -> Result<Vec<(String, PathBuf, bool)>> {
    let read = std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
    let mut out = Vec::new();
    for entry in read {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        out.push((name, path.clone(), path.is_dir()));
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

fn scan_worker(id: &str, dir: &Path) -> Result<WorkerDir> {
    let mut worker = WorkerDir {
        id: id.to_string(),
        path: dir.to_path_buf(),
        counters: Vec::new(),
        histograms: Vec::new(),
    };
    for (name, path, is_dir) in sorted_entries(dir)? {
        if is_dir {
            continue;
        }
        if let Some(kind) = classify_counter_file(&name) {
            worker.counters.push(CounterSource { kind, path });
        } else if let Some(test_id) = hdr_test_id(&name) {
            worker.histograms.push(HistogramSource {
                test_id: test_id.to_string(),
                hdr: path,
            });
        }
    }
    Ok(worker)
}

pub fn discover(root: &Path) -> Result<RunLayout> {
    let mut layout = RunLayout {
        root: root.to_path_buf(),
        ..Default::default()
    };
    for (name, path, is_dir) in sorted_entries(root)? {
        if is_dir {
            if let Some(id) = worker_id(&name) {
                layout.workers.push(scan_worker(id, &path)?);
            }
        } else if let Some(agent) = dstat_agent(&name) {
            layout.dstat.push(DstatSource {
                agent_id: agent.to_string(),
                path,
            });
        } else if let Some(kind) = classify_counter_file(&name) {
            layout.cluster_counters.push(CounterSource { kind, path });
        }
    }
    log(
        Level::Debug,
        Domain::Parse,
        "layout",
        obj(&[
            ("path", v_str(&root.display().to_string())),
            ("workers", json!(layout.workers.len())),
            ("dstat", json!(layout.dstat.len())),
            ("cluster_counters", json!(layout.cluster_counters.len())),
        ]),
    );
    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_id_convention() {
        assert_eq!(worker_id("A1_W1-10.0.0.5-member"), Some("A1_W1"));
        assert_eq!(worker_id("A12_W305-host-client"), Some("A12_W305"));
        assert_eq!(worker_id("A1_W1"), None);
        assert_eq!(worker_id("archive-2024"), None);
        assert_eq!(worker_id("A_W1-x"), None);
        assert_eq!(worker_id("B1_W1-x"), None);
        assert!(is_worker_dir("A2_W7-192.168.1.1-member"));
    }

    #[test]
    fn test_counter_file_classification() {
        assert_eq!(classify_counter_file("operations.csv"), Some(CounterFile::WholeRun));
        assert_eq!(
            classify_counter_file("operations-mapTest.csv"),
            Some(CounterFile::PerTest("mapTest".to_string()))
        );
        assert_eq!(
            classify_counter_file("operations_queue.csv"),
            Some(CounterFile::PerTest("queue".to_string()))
        );
        assert_eq!(classify_counter_file("operations-.csv"), None);
        assert_eq!(classify_counter_file("operationsX.csv"), None);
        assert_eq!(classify_counter_file("latency.csv"), None);
    }

    #[test]
    fn test_dstat_and_hdr_names() {
        assert_eq!(dstat_agent("A1_dstat.csv"), Some("A1"));
        assert_eq!(dstat_agent("_dstat.csv"), None);
        assert_eq!(hdr_test_id("mapTest.hdr"), Some("mapTest"));
        assert_eq!(hdr_test_id("notes.txt"), None);
    }

    #[test]
    fn test_histogram_derived_paths() {
        let src = HistogramSource {
            test_id: "mapTest".to_string(),
            hdr: PathBuf::from("/run/A1_W1-x/mapTest.hdr"),
        };
        assert_eq!(src.hgrm(), PathBuf::from("/run/A1_W1-x/mapTest.hgrm"));
        assert_eq!(
            src.latency_history(),
            PathBuf::from("/run/A1_W1-x/mapTest.latency-history.csv")
        );
        assert_eq!(src.output_prefix(), PathBuf::from("/run/A1_W1-x/mapTest"));
    }

    #[test]
    fn test_discover() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let worker = root.join("A1_W1-10.0.0.1-member");
        std::fs::create_dir(&worker).unwrap();
        std::fs::create_dir(root.join("logs")).unwrap();
        std::fs::write(worker.join("operations.csv"), "").unwrap();
        std::fs::write(worker.join("operations-mapTest.csv"), "").unwrap();
        std::fs::write(worker.join("mapTest.hdr"), "").unwrap();
        std::fs::write(root.join("A1_dstat.csv"), "").unwrap();

        let layout = discover(root).unwrap();
        assert_eq!(layout.workers.len(), 1);
        assert_eq!(layout.workers[0].id, "A1_W1");
        assert_eq!(layout.workers[0].counters.len(), 2);
        assert_eq!(layout.workers[0].histograms.len(), 1);
        assert_eq!(layout.dstat[0].agent_id, "A1");
        assert_eq!(layout.test_ids(), vec!["mapTest".to_string()]);
    }
}
