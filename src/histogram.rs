//! Hand-off of `.hdr` histogram logs to an external log processor.
//!
//! The processor is invoked as `<program> [args..] <hdr> <out_prefix> <start> <end>`
//! and must write `<out_prefix>.latency-history.csv` and `<out_prefix>.hgrm`.
//! `start`/`end` are seconds since the start of the run, not wall clock.

use std::process::Command;
use std::time::Instant;

use crate::cache;
use crate::error::{Error, Result};
use crate::layout::HistogramSource;
use crate::logging::{log, log_external_command, obj, v_str, Domain, Level};

pub trait HistogramProcessor {
    /// Produce the derived files of `source`, restricted to `bounds` when given.
    fn process(&self, source: &HistogramSource, bounds: Option<(i64, i64)>) -> Result<()>;
}

/// Leaves whatever derived files already exist in place.
#[derive(Debug, Default, Clone, Copy)]
pub struct PreprocessedHistograms;

impl HistogramProcessor for PreprocessedHistograms {
    fn process(&self, _source: &HistogramSource, _bounds: Option<(i64, i64)>) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CommandHistogramProcessor {
    program: String,
    args: Vec<String>,
}

impl CommandHistogramProcessor {
    /// `command` is split on whitespace; the first word is the program.
    pub fn new(command: &str) -> Result<Self> {
        let mut words = command.split_whitespace().map(str::to_string);
        let program = words
            .next()
            .ok_or_else(|| Error::Config("histogram command is empty".to_string()))?;
        Ok(Self {
            program,
            args: words.collect(),
        })
    }

    fn bounds_param(bounds: Option<(i64, i64)>) -> String {
        match bounds {
            Some((start, end)) => format!("{}:{}", start, end),
            None => "all".to_string(),
        }
    }
}

impl HistogramProcessor for CommandHistogramProcessor {
    fn process(&self, source: &HistogramSource, bounds: Option<(i64, i64)>) -> Result<()> {
        let key = cache::derivation_key(&source.hdr, &Self::bounds_param(bounds))?;
        if source.latency_history().exists() && source.hgrm().exists() && cache::is_fresh(&source.hdr, &key) {
            log(
                Level::Debug,
                Domain::Cache,
                "hdr_cache_hit",
                obj(&[("path", v_str(&source.hdr.display().to_string()))]),
            );
            return Ok(());
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(&source.hdr).arg(source.output_prefix());
        if let Some((start, end)) = bounds {
            cmd.arg(start.to_string()).arg(end.to_string());
        }
        let rendered = format!("{:?}", cmd);

        let started = Instant::now();
        let status = cmd.status().map_err(|e| {
            log_external_command(&rendered, None, started.elapsed().as_secs_f64() * 1000.0);
            Error::io(&self.program, e)
        })?;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        log_external_command(&rendered, status.code(), elapsed_ms);
        if !status.success() {
            return Err(Error::Process {
                command: rendered,
                code: status.code(),
            });
        }
        cache::record(&source.hdr, &key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(dir: &std::path::Path) -> HistogramSource {
        let hdr = dir.join("mapTest.hdr");
        std::fs::write(&hdr, "histogram").unwrap();
        HistogramSource {
            test_id: "mapTest".to_string(),
            hdr,
        }
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(matches!(CommandHistogramProcessor::new("  "), Err(Error::Config(_))));
    }

    #[test]
    fn test_nonzero_exit_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let proc = CommandHistogramProcessor::new("false").unwrap();
        match proc.process(&source(dir.path()), Some((2, 7))) {
            Err(Error::Process { command, code }) => {
                assert!(command.contains("false"));
                assert_eq!(code, Some(1));
            }
            other => panic!("expected process error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_program_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let proc = CommandHistogramProcessor::new("/nonexistent/hdr-tool").unwrap();
        assert!(matches!(
            proc.process(&source(dir.path()), None),
            Err(Error::Io { .. })
        ));
    }

    #[test]
    fn test_success_records_digest_and_reuses_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let src = source(dir.path());
        std::fs::write(src.latency_history(), "x").unwrap();
        std::fs::write(src.hgrm(), "x").unwrap();

        let ok = CommandHistogramProcessor::new("true").unwrap();
        ok.process(&src, Some((0, 5))).unwrap();
        assert!(cache::digest_path(&src.hdr).exists());

        // Cached: a failing program is not run again for the same input and bounds.
        let failing = CommandHistogramProcessor::new("false").unwrap();
        assert!(failing.process(&src, Some((0, 5))).is_ok());
        assert!(failing.process(&src, Some((1, 5))).is_err());
        assert_eq!(src.output_prefix(), dir.path().join("mapTest"));
    }
}
