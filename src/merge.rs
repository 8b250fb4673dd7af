//! Outer joins of wide tables and cluster-wide aggregation of worker tables.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::column::{ColumnDescriptor, ATTR_WORKER};
use crate::logging::{log, obj, Domain, Level};
use crate::series::WideTable;

/// How per-worker counter tables are summed into one cluster table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    /// A row seen for the first time is copied verbatim; later rows at the
    /// same timestamp are added cell by cell. A timestamp reported by only
    /// some workers holds the sum of those workers alone, so a second in
    /// which a worker's sample is misaligned looks like a drop in cluster
    /// throughput.
    CopyThrough,
    /// Same sums as `CopyThrough`, then every absent cell of the cluster
    /// table is set to 0. Totals are unchanged; only columns with no sample
    /// at a timestamp gain an explicit 0 instead of a gap.
    ZeroPadded,
}

impl AggregationMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "copy_through" | "copy-through" | "copy" => Some(Self::CopyThrough),
            "zero_padded" | "zero-padded" | "zero" => Some(Self::ZeroPadded),
            _ => None,
        }
    }
}

/// Outer-join `tables` on time, in order. Where two tables carry the same
/// column at the same timestamp, the later table's cell wins.
pub fn merge(tables: &[WideTable]) -> WideTable {
    let mut out = WideTable::new();
    for table in tables {
        let targets: Vec<usize> = table.columns().iter().map(|c| out.ensure_column(c)).collect();
        for (ts, row) in table.rows() {
            out.ensure_row(ts);
            for (i, cell) in row.iter().enumerate() {
                if cell.is_some() {
                    out.set(ts, targets[i], *cell);
                }
            }
        }
    }
    log(
        Level::Debug,
        Domain::Merge,
        "merged",
        obj(&[
            ("inputs", json!(tables.len())),
            ("columns", json!(out.columns().len())),
            ("rows", json!(out.len())),
        ]),
    );
    out
}

/// Sum worker tables into one cluster table. `worker_id` is stripped from
/// every descriptor so that the same counter of different workers lands in
/// the same column.
pub fn aggregate_workers(tables: &[WideTable], mode: AggregationMode) -> WideTable {
    let mut out = WideTable::new();
    for table in tables {
        let targets: Vec<usize> = table
            .columns()
            .iter()
            .map(|c| out.ensure_column(&strip_worker(c)))
            .collect();
        for (ts, row) in table.rows() {
            if out.row(ts).is_none() {
                out.ensure_row(ts);
                for (i, cell) in row.iter().enumerate() {
                    if cell.is_some() {
                        out.set(ts, targets[i], *cell);
                    }
                }
                continue;
            }
            for (i, cell) in row.iter().enumerate() {
                if let Some(value) = cell {
                    let current = out.row(ts).and_then(|r| r[targets[i]]);
                    out.set(ts, targets[i], Some(current.map_or(*value, |c| c + value)));
                }
            }
        }
    }
    if mode == AggregationMode::ZeroPadded {
        out = zero_pad(out);
    }
    log(
        Level::Debug,
        Domain::Merge,
        "aggregated_workers",
        obj(&[
            ("workers", json!(tables.len())),
            ("mode", json!(mode)),
            ("rows", json!(out.len())),
        ]),
    );
    out
}

fn strip_worker(desc: &ColumnDescriptor) -> ColumnDescriptor {
    desc.without_attr(ATTR_WORKER)
}

fn zero_pad(table: WideTable) -> WideTable {
    let width = table.columns().len();
    let mut out = table.clone();
    for (ts, row) in table.rows() {
        for col in 0..width {
            if row[col].is_none() {
                out.set(ts, col, Some(0.0));
            }
        }
    }
    out
}
