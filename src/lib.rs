//! perfscope: turns load-test run directories into time-aligned tables,
//! charts and cross-commit regression summaries.
//!
//! Single-run path: [`run::load_run`] then [`report::write_run_report`].
//! Regression path: [`regression::analyze_results`] then
//! [`report::write_regression_report`].

pub mod anomaly;
pub mod cache;
pub mod changepoint;
pub mod column;
pub mod config;
pub mod error;
pub mod histogram;
pub mod history;
pub mod layout;
pub mod ledger;
pub mod logging;
pub mod merge;
pub mod parse;
pub mod period;
pub mod regression;
pub mod report;
pub mod run;
pub mod series;

pub use column::ColumnDescriptor;
pub use config::{AnalysisConfig, ReportConfig};
pub use error::{Error, Result};
pub use period::Period;
pub use series::{TimeSeries, WideTable};
