//! Single-run and comparison reports built from run directories on disk.

use std::fs;
use std::path::{Path, PathBuf};

use perfscope::column::{ColumnDescriptor, ATTR_AGENT, ATTR_TEST, ATTR_WORKER, GROUP_DSTAT, GROUP_LATENCY};
use perfscope::histogram::PreprocessedHistograms;
use perfscope::merge::AggregationMode;
use perfscope::report::{write_run_report, SvgRenderer, DATA_CSV};
use perfscope::run::load_run;
use perfscope::ReportConfig;
use tempfile::TempDir;

const WORKER: &str = "A1_W1-10.0.0.5-member";

const DSTAT_BANNER: &str = "\"Dstat 0.7.3 CSV output\"\n\
    \"Author:\",\"Dag Wieers\"\n\
    \"Host:\",\"agent1\"\n\
    \"Cmdline:\",\"dstat --epoch -m --cpu\"\n\
    \n";

fn write_lines(path: &Path, header: &str, rows: impl IntoIterator<Item = String>) {
    let mut out = String::from(header);
    out.push('\n');
    for row in rows {
        out.push_str(&row);
        out.push('\n');
    }
    fs::write(path, out).unwrap();
}

/// Worker counters and agent stats at t = 0..9.
fn basic_run(root: &Path) -> PathBuf {
    let worker = root.join(WORKER);
    fs::create_dir_all(&worker).unwrap();
    write_lines(
        &worker.join("operations.csv"),
        "epoch,timestamp,put,get",
        (0..10).map(|t| format!("{},t{},{},{}", t, t, 100 + t, 200 + t)),
    );
    write_lines(
        &root.join("A1_dstat.csv"),
        &format!("{}epoch,memory used,cpu usr", DSTAT_BANNER),
        (0..10).map(|t| format!("{}.0,{},{}", t, 1.5, 10 + t)),
    );
    root.to_path_buf()
}

fn config(out: &Path) -> ReportConfig {
    ReportConfig {
        warmup_secs: 2,
        cooldown_secs: 2,
        output_dir: out.to_path_buf(),
        html_report: true,
        ..Default::default()
    }
}

#[test]
fn warmup_and_cooldown_trim_every_source() {
    let dir = TempDir::new().unwrap();
    let root = basic_run(&dir.path().join("run"));
    let cfg = config(&dir.path().join("report"));

    let run = load_run(&root, "base", &cfg, &PreprocessedHistograms).unwrap();
    assert_eq!(run.period.start, 2);
    assert_eq!(run.period.end, 7);
    assert_eq!(run.table.timestamps().collect::<Vec<_>>(), vec![2, 3, 4, 5, 6, 7]);

    let put = ColumnDescriptor::new("Operations", "put").unwrap();
    let cpu = ColumnDescriptor::new(GROUP_DSTAT, "cpu usr")
        .unwrap()
        .with_attr(ATTR_AGENT, "A1")
        .unwrap();
    let mem = ColumnDescriptor::new(GROUP_DSTAT, "memory used")
        .unwrap()
        .with_attr(ATTR_AGENT, "A1")
        .unwrap();
    assert_eq!(run.table.get(2, &put), Some(102.0));
    assert_eq!(run.table.get(7, &cpu), Some(17.0));
    assert_eq!(run.table.get(4, &mem), Some(1500.0));
    assert_eq!(run.table.get(8, &put), None);
}

#[test]
fn report_writes_combined_and_per_metric_exports() {
    let dir = TempDir::new().unwrap();
    let root = basic_run(&dir.path().join("run"));
    let cfg = config(&dir.path().join("report"));

    let run = load_run(&root, "base", &cfg, &PreprocessedHistograms).unwrap();
    let out = write_run_report(&[run], &cfg, &SvgRenderer).unwrap();

    let data = fs::read_to_string(out.dir.join(DATA_CSV)).unwrap();
    let mut lines = data.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("time,"));
    assert!(header.contains("run_label=base"));
    // six rows, rebased to the period start
    let times: Vec<&str> = lines.map(|l| l.split(',').next().unwrap()).collect();
    assert_eq!(times, vec!["0", "1", "2", "3", "4", "5"]);

    assert!(out.dir.join("Operations_put.csv").exists());
    assert!(out.dir.join("Operations_put.svg").exists());
    assert!(out.dir.join("dstat_cpu_usr.svg").exists());
    assert!(out.images.iter().all(|p| p.extension().unwrap() == "svg"));

    let html = fs::read_to_string(out.html.unwrap()).unwrap();
    assert!(html.contains("Operations_put.svg"));
}

#[test]
fn workers_are_summed_into_cluster_counters() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("run");
    for (name, offset) in [("A1_W1-a-member", 0), ("A2_W1-b-member", 1)] {
        let worker = root.join(name);
        fs::create_dir_all(&worker).unwrap();
        // second worker starts one second later
        write_lines(
            &worker.join("operations-mapTest.csv"),
            "epoch,timestamp,put",
            (offset..offset + 3).map(|t| format!("{},x,10", t)),
        );
    }

    let cluster = ColumnDescriptor::new("Operations", "put")
        .unwrap()
        .with_attr(ATTR_TEST, "mapTest")
        .unwrap();

    let cfg = config(&dir.path().join("report"));
    let cfg = ReportConfig {
        warmup_secs: 0,
        cooldown_secs: 0,
        ..cfg
    };
    let run = load_run(&root, "r", &cfg, &PreprocessedHistograms).unwrap();
    let sums: Vec<Option<f64>> = (0..4).map(|t| run.table.get(t, &cluster)).collect();
    // the period follows the cluster series, so t = 3 is kept
    assert_eq!(sums, vec![Some(10.0), Some(20.0), Some(20.0), Some(10.0)]);
    assert!(root.join("merged").join("operations-mapTest.csv").exists());

    let padded = ReportConfig {
        aggregation: AggregationMode::ZeroPadded,
        ..cfg
    };
    let run = load_run(&root, "r", &padded, &PreprocessedHistograms).unwrap();
    assert_eq!(run.table.get(0, &cluster), Some(10.0));
    assert_eq!(run.table.get(3, &cluster), Some(10.0));
}

#[test]
fn latency_outputs_become_columns_and_distributions() {
    let dir = TempDir::new().unwrap();
    let root = basic_run(&dir.path().join("run"));
    let worker = root.join(WORKER);
    fs::write(worker.join("mapTest.hdr"), "opaque").unwrap();
    write_lines(
        &worker.join("mapTest.latency-history.csv"),
        "#[Logged]\n#[StartTime: 0]\n,StartTime,Int_Count,Int_99%,Total_99%",
        (0..10).map(|t| format!("{},{}.0,50,{},{}", t, t, 100 + t, 120)),
    );
    fs::write(
        worker.join("mapTest.hgrm"),
        "h1\nh2\nh3\nh4\n100 0.5 50 2.0\n200 0.99 99 100\n300 1.0 100 inf\n#[Mean = 150]\n",
    )
    .unwrap();

    let cfg = config(&dir.path().join("report"));
    let run = load_run(&root, "base", &cfg, &PreprocessedHistograms).unwrap();
    let p99 = ColumnDescriptor::new(GROUP_LATENCY, "interval_p99(us)")
        .unwrap()
        .with_attr(ATTR_WORKER, "A1_W1")
        .unwrap()
        .with_attr(ATTR_TEST, "mapTest")
        .unwrap();
    assert_eq!(run.table.get(5, &p99), Some(105.0));
    assert_eq!(run.table.get(1, &p99), None);
    assert_eq!(run.distributions.len(), 1);
    assert_eq!(run.distributions[0].table.total_count(), 100);

    let out = write_run_report(&[run], &cfg, &SvgRenderer).unwrap();
    assert!(out
        .images
        .iter()
        .any(|p| p.file_name().unwrap().to_string_lossy().starts_with("Percentiles_")));
}

#[test]
fn two_runs_overlay_on_elapsed_time() {
    let dir = TempDir::new().unwrap();
    let old = basic_run(&dir.path().join("old"));
    let new = basic_run(&dir.path().join("new"));
    let cfg = config(&dir.path().join("report"));

    let runs = vec![
        load_run(&old, "old", &cfg, &PreprocessedHistograms).unwrap(),
        load_run(&new, "new", &cfg, &PreprocessedHistograms).unwrap(),
    ];
    let out = write_run_report(&runs, &cfg, &SvgRenderer).unwrap();
    let svg = fs::read_to_string(out.dir.join("Operations_put.svg")).unwrap();
    assert_eq!(svg.matches("<polyline").count(), 2);
    assert!(svg.contains(">old<") && svg.contains(">new<"));
}

#[test]
fn dstat_with_blank_header_cell_still_loads() {
    let dir = TempDir::new().unwrap();
    let root = basic_run(&dir.path().join("run"));
    write_lines(
        &root.join("A1_dstat.csv"),
        &format!("{}\"epoch\",\"memory usage\",,\"load avg\"", DSTAT_BANNER),
        (0..10).map(|t| format!("{},2,,0.5", t)),
    );

    let cfg = config(&dir.path().join("report"));
    let run = load_run(&root, "base", &cfg, &PreprocessedHistograms).unwrap();
    let load = ColumnDescriptor::new(GROUP_DSTAT, "load avg")
        .unwrap()
        .with_attr(ATTR_AGENT, "A1")
        .unwrap();
    assert_eq!(run.table.get(3, &load), Some(0.5));
    assert_eq!(run.table.timestamps().count(), 6);
}
