//! Explicit configuration values handed to every pipeline entry point.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::merge::AggregationMode;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key).as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => default,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub warmup_secs: u64,
    pub cooldown_secs: u64,
    pub image_width: u32,
    pub image_height: u32,
    /// Write vector images; raster needs a caller-supplied renderer.
    pub vector_images: bool,
    /// Also chart every worker individually, not just the cluster totals.
    pub full_diagrams: bool,
    pub output_dir: PathBuf,
    pub aggregation: AggregationMode,
    pub html_report: bool,
    /// Program that turns `.hdr` logs into latency-history CSV and `.hgrm` files.
    pub hdr_command: Option<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            warmup_secs: 0,
            cooldown_secs: 0,
            image_width: 1600,
            image_height: 1200,
            vector_images: true,
            full_diagrams: false,
            output_dir: PathBuf::from("report"),
            aggregation: AggregationMode::CopyThrough,
            html_report: false,
            hdr_command: None,
        }
    }
}

impl ReportConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            warmup_secs: env_or("PERFSCOPE_WARMUP_SECS", d.warmup_secs),
            cooldown_secs: env_or("PERFSCOPE_COOLDOWN_SECS", d.cooldown_secs),
            image_width: env_or("PERFSCOPE_IMAGE_WIDTH", d.image_width),
            image_height: env_or("PERFSCOPE_IMAGE_HEIGHT", d.image_height),
            vector_images: env_flag("PERFSCOPE_VECTOR_IMAGES", d.vector_images),
            full_diagrams: env_flag("PERFSCOPE_FULL_DIAGRAMS", d.full_diagrams),
            output_dir: std::env::var("PERFSCOPE_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.output_dir),
            aggregation: std::env::var("PERFSCOPE_AGGREGATION")
                .ok()
                .and_then(|v| AggregationMode::parse(&v))
                .unwrap_or(d.aggregation),
            html_report: env_flag("PERFSCOPE_HTML_REPORT", d.html_report),
            hdr_command: std::env::var("PERFSCOPE_HDR_COMMAND").ok().filter(|s| !s.is_empty()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.image_width == 0 || self.image_height == 0 {
            return Err(Error::Config(format!(
                "image dimensions must be positive, got {}x{}",
                self.image_width, self.image_height
            )));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(Error::Config("output_dir must not be empty".to_string()));
        }
        for (name, secs) in [("warmup_secs", self.warmup_secs), ("cooldown_secs", self.cooldown_secs)] {
            if i64::try_from(secs).is_err() {
                return Err(Error::Config(format!("{} out of range: {}", name, secs)));
            }
        }
        Ok(())
    }
}

/// Parameters of the regression layer (anomaly window and changepoint test).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub min_window: usize,
    pub max_window: usize,
    /// Anomaly threshold in population standard deviations.
    pub threshold: f64,
    pub permutations: usize,
    pub pvalue: f64,
    /// Seed for the permutation test RNG so repeated reports agree.
    pub seed: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_window: 5,
            max_window: 20,
            threshold: 3.0,
            permutations: 100,
            pvalue: 0.05,
            seed: 0x5eed,
        }
    }
}

impl AnalysisConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            min_window: env_or("PERFSCOPE_MIN_WINDOW", d.min_window),
            max_window: env_or("PERFSCOPE_MAX_WINDOW", d.max_window),
            threshold: env_or("PERFSCOPE_THRESHOLD", d.threshold),
            permutations: env_or("PERFSCOPE_PERMUTATIONS", d.permutations),
            pvalue: env_or("PERFSCOPE_PVALUE", d.pvalue),
            seed: env_or("PERFSCOPE_SEED", d.seed),
        }
    }

    pub fn validate(&self) -> Result<()> {
        crate::anomaly::validate_window(self.min_window, self.max_window, self.threshold)?;
        crate::changepoint::validate_params(self.permutations, self.pvalue)
    }
}
