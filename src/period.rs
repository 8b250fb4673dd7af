//! Warmup/cooldown windows. One `Period` per run, applied to every table of
//! that run so sources with different sampling never drift apart at the edges.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::logging::{log, obj, Domain, Level};
use crate::series::{TimeSeries, Timestamp, WideTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Period {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// Inclusive on both ends.
    pub fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.start && ts <= self.end
    }

    /// True when warmup and cooldown together consume the whole run.
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn duration_secs(&self) -> i64 {
        (self.end - self.start).max(0)
    }

    pub fn trim_series(&self, series: &TimeSeries) -> TimeSeries {
        series.between(self.start, self.end)
    }

    pub fn trim_table(&self, table: &WideTable) -> WideTable {
        table.between(self.start, self.end)
    }

    /// Bounds as seconds elapsed since `zero`, the form histogram tools expect.
    pub fn relative_to(&self, zero: Timestamp) -> (i64, i64) {
        (self.start - zero, self.end - zero)
    }
}

/// Period of a run from its representative counter table.
pub fn compute_period(table: &WideTable, warmup_secs: u64, cooldown_secs: u64) -> Result<Period> {
    let (first, last) = match (table.first_ts(), table.last_ts()) {
        (Some(f), Some(l)) => (f, l),
        _ => {
            return Err(Error::EmptySeries(
                "cannot compute a period from a table without rows".to_string(),
            ))
        }
    };
    let secs = |name: &str, v: u64| {
        i64::try_from(v).map_err(|_| Error::Config(format!("{} out of range: {}", name, v)))
    };
    let period = Period::new(
        first.saturating_add(secs("warmup_secs", warmup_secs)?),
        last.saturating_sub(secs("cooldown_secs", cooldown_secs)?),
    );
    let level = if period.is_empty() { Level::Warn } else { Level::Debug };
    log(
        level,
        Domain::Period,
        "period",
        obj(&[
            ("first", json!(first)),
            ("last", json!(last)),
            ("start", json!(period.start)),
            ("end", json!(period.end)),
            ("warmup_secs", json!(warmup_secs)),
            ("cooldown_secs", json!(cooldown_secs)),
        ]),
    );
    Ok(period)
}
