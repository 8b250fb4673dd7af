use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use perfscope::changepoint::EDivisive;
use perfscope::histogram::{CommandHistogramProcessor, HistogramProcessor, PreprocessedHistograms};
use perfscope::history::{CommitOrder, GitCommitOrder, ListedCommitOrder};
use perfscope::ledger::BuildLedger;
use perfscope::logging::{log, obj, ts_epoch_ms, v_str, Domain, Level};
use perfscope::merge::AggregationMode;
use perfscope::regression::analyze_results;
use perfscope::report::{write_regression_report, write_run_report, SvgRenderer};
use perfscope::run::{default_label, load_run};
use perfscope::{AnalysisConfig, ReportConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "Load-test artifact reports and regression analysis")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct OutputArgs {
    /// Directory receiving charts, CSV exports and summaries.
    #[arg(long, short)]
    output: Option<PathBuf>,
    /// Also write report.html.
    #[arg(long)]
    html: bool,
    /// Ask for raster images instead of SVG.
    #[arg(long)]
    raster: bool,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Chart one run, or overlay several runs on time since period start.
    Report {
        #[arg(required = true)]
        runs: Vec<PathBuf>,
        /// Run labels, in the order of the run directories.
        #[arg(long = "label")]
        labels: Vec<String>,
        #[arg(long)]
        warmup: Option<u64>,
        #[arg(long)]
        cooldown: Option<u64>,
        /// Chart every worker, not just cluster totals.
        #[arg(long)]
        full: bool,
        /// copy_through or zero_padded.
        #[arg(long)]
        aggregation: Option<String>,
        /// Program converting .hdr logs to latency-history CSV and .hgrm.
        #[arg(long)]
        hdr_command: Option<String>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Anomalies and changepoints across commits of a results tree.
    Regressions {
        results: PathBuf,
        /// Git checkout used to order commits.
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        /// File listing commits oldest first; replaces git ordering.
        #[arg(long)]
        commits: Option<PathBuf>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Known-bad commit ledger shared with build drivers.
    Ledger {
        #[arg(long, default_value = "perfscope-ledger.sqlite")]
        db: String,
        #[command(subcommand)]
        action: LedgerAction,
    },
}

#[derive(Subcommand, Debug)]
enum LedgerAction {
    /// Record a failed build or run.
    Mark { commit: String, reason: String },
    /// Exit non-zero if the commit is known bad.
    Check { commit: String },
    Clear { commit: String },
}

fn apply_output(cfg: &mut ReportConfig, args: OutputArgs) {
    if let Some(dir) = args.output {
        cfg.output_dir = dir;
    }
    if let Some(w) = args.width {
        cfg.image_width = w;
    }
    if let Some(h) = args.height {
        cfg.image_height = h;
    }
    cfg.html_report |= args.html;
    if args.raster {
        cfg.vector_images = false;
    }
}

fn report(
    runs: Vec<PathBuf>,
    labels: Vec<String>,
    mut cfg: ReportConfig,
) -> Result<()> {
    if !labels.is_empty() && labels.len() != runs.len() {
        bail!("got {} labels for {} runs", labels.len(), runs.len());
    }
    cfg.validate()?;
    let processor: Box<dyn HistogramProcessor> = match cfg.hdr_command.take() {
        Some(cmd) => Box::new(CommandHistogramProcessor::new(&cmd)?),
        None => Box::new(PreprocessedHistograms),
    };

    let mut loaded = Vec::with_capacity(runs.len());
    for (i, dir) in runs.iter().enumerate() {
        let label = labels.get(i).cloned().unwrap_or_else(|| default_label(dir));
        let run = load_run(dir, &label, &cfg, processor.as_ref())
            .with_context(|| format!("loading run {}", dir.display()))?;
        loaded.push(run);
    }
    let out = write_run_report(&loaded, &cfg, &SvgRenderer)?;
    println!("{}", out.dir.display());
    Ok(())
}

fn regressions(results: PathBuf, repo: PathBuf, commits: Option<PathBuf>, cfg: ReportConfig) -> Result<()> {
    let analysis = AnalysisConfig::from_env();
    analysis.validate()?;
    cfg.validate()?;
    let order: Box<dyn CommitOrder> = match commits {
        Some(path) => Box::new(
            ListedCommitOrder::from_file(&path)
                .with_context(|| format!("reading commit list {}", path.display()))?,
        ),
        None => Box::new(GitCommitOrder::new(repo)),
    };
    let algorithm = EDivisive::new(analysis.seed);
    let regression = analyze_results(&results, order.as_ref(), &analysis, &algorithm)
        .with_context(|| format!("analyzing {}", results.display()))?;
    let out = write_regression_report(&regression, &cfg, &SvgRenderer)?;
    print!("{}", regression.summary.to_text());
    log(
        Level::Info,
        Domain::Report,
        "regressions_done",
        obj(&[
            ("path", v_str(&out.dir.display().to_string())),
            ("commits", json!(regression.histories.commits.len())),
            ("flagged", json!(regression.summary.entries.len())),
        ]),
    );
    Ok(())
}

fn ledger(db: &str, action: LedgerAction) -> Result<()> {
    let mut ledger = BuildLedger::open(db).with_context(|| format!("opening ledger {}", db))?;
    match action {
        LedgerAction::Mark { commit, reason } => {
            ledger.record_failure(&commit, &reason, (ts_epoch_ms() / 1000) as i64)?;
        }
        LedgerAction::Check { commit } => {
            if let Some(f) = ledger.failure(&commit)? {
                println!("{} known bad after {} attempts: {}", f.commit, f.attempts, f.reason);
                std::process::exit(1);
            }
        }
        LedgerAction::Clear { commit } => ledger.clear(&commit)?,
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = ReportConfig::from_env();

    match cli.command {
        Command::Report {
            runs,
            labels,
            warmup,
            cooldown,
            full,
            aggregation,
            hdr_command,
            output,
        } => {
            apply_output(&mut cfg, output);
            if let Some(w) = warmup {
                cfg.warmup_secs = w;
            }
            if let Some(c) = cooldown {
                cfg.cooldown_secs = c;
            }
            cfg.full_diagrams |= full;
            if let Some(mode) = aggregation {
                cfg.aggregation = AggregationMode::parse(&mode)
                    .with_context(|| format!("unknown aggregation mode {:?}", mode))?;
            }
            if hdr_command.is_some() {
                cfg.hdr_command = hdr_command;
            }
            report(runs, labels, cfg)
        }
        Command::Regressions {
            results,
            repo,
            commits,
            output,
        } => {
            apply_output(&mut cfg, output);
            regressions(results, repo, commits, cfg)
        }
        Command::Ledger { db, action } => ledger(&db, action),
    }
}
