//! Time series and the wide, time-indexed table built from them.
//!
//! Time is whole epoch seconds. Both types keep at most one value per
//! timestamp; inserting an existing timestamp replaces the old value.

use std::collections::BTreeMap;
use std::io::Write;

use crate::column::ColumnDescriptor;
use crate::error::Result;

pub type Timestamp = i64;

/// Round fractional epoch seconds to the nearest whole second.
pub fn round_epoch(secs: f64) -> Timestamp {
    secs.round() as Timestamp
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    descriptor: ColumnDescriptor,
    points: BTreeMap<Timestamp, f64>,
}

impl TimeSeries {
    pub fn new(descriptor: ColumnDescriptor) -> Self {
        Self {
            descriptor,
            points: BTreeMap::new(),
        }
    }

    /// Build from raw rows in encounter order; duplicate timestamps keep the last value.
    pub fn from_points<I>(descriptor: ColumnDescriptor, points: I) -> Self
    where
        I: IntoIterator<Item = (Timestamp, f64)>,
    {
        let mut series = Self::new(descriptor);
        for (ts, value) in points {
            series.push(ts, value);
        }
        series
    }

    pub fn push(&mut self, ts: Timestamp, value: f64) {
        self.points.insert(ts, value);
    }

    pub fn descriptor(&self) -> &ColumnDescriptor {
        &self.descriptor
    }

    pub fn get(&self, ts: Timestamp) -> Option<f64> {
        self.points.get(&ts).copied()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_ts(&self) -> Option<Timestamp> {
        self.points.keys().next().copied()
    }

    pub fn last_ts(&self) -> Option<Timestamp> {
        self.points.keys().next_back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, f64)> + '_ {
        self.points.iter().map(|(ts, v)| (*ts, *v))
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.values().copied().collect()
    }

    /// Points with `start <= ts <= end`.
    pub fn between(&self, start: Timestamp, end: Timestamp) -> Self {
        let points = if start > end {
            BTreeMap::new()
        } else {
            self.points
                .range(start..=end)
                .map(|(ts, v)| (*ts, *v))
                .collect()
        };
        Self {
            descriptor: self.descriptor.clone(),
            points,
        }
    }
}

/// Columns sharing one sorted, unique time index. Absent cells are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WideTable {
    columns: Vec<ColumnDescriptor>,
    rows: BTreeMap<Timestamp, Vec<Option<f64>>>,
}

impl WideTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_series<I>(series: I) -> Self
    where
        I: IntoIterator<Item = TimeSeries>,
    {
        let mut table = Self::new();
        for s in series {
            let idx = table.ensure_column(&s.descriptor);
            for (ts, value) in s.points {
                table.set(ts, idx, Some(value));
            }
        }
        table
    }

    pub(crate) fn ensure_column(&mut self, desc: &ColumnDescriptor) -> usize {
        if let Some(idx) = self.column_index(desc) {
            return idx;
        }
        self.columns.push(desc.clone());
        for row in self.rows.values_mut() {
            row.push(None);
        }
        self.columns.len() - 1
    }

    pub(crate) fn ensure_row(&mut self, ts: Timestamp) -> &mut Vec<Option<f64>> {
        let width = self.columns.len();
        self.rows.entry(ts).or_insert_with(|| vec![None; width])
    }

    pub(crate) fn set(&mut self, ts: Timestamp, col: usize, value: Option<f64>) {
        let row = self.ensure_row(ts);
        row[col] = value;
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn column_index(&self, desc: &ColumnDescriptor) -> Option<usize> {
        self.columns.iter().position(|c| c == desc)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = Timestamp> + '_ {
        self.rows.keys().copied()
    }

    pub fn first_ts(&self) -> Option<Timestamp> {
        self.rows.keys().next().copied()
    }

    pub fn last_ts(&self) -> Option<Timestamp> {
        self.rows.keys().next_back().copied()
    }

    pub fn rows(&self) -> impl Iterator<Item = (Timestamp, &[Option<f64>])> + '_ {
        self.rows.iter().map(|(ts, row)| (*ts, row.as_slice()))
    }

    pub fn row(&self, ts: Timestamp) -> Option<&[Option<f64>]> {
        self.rows.get(&ts).map(Vec::as_slice)
    }

    pub fn get(&self, ts: Timestamp, desc: &ColumnDescriptor) -> Option<f64> {
        let idx = self.column_index(desc)?;
        self.rows.get(&ts).and_then(|row| row[idx])
    }

    /// Non-null cells of one column.
    pub fn column(&self, desc: &ColumnDescriptor) -> Option<TimeSeries> {
        let idx = self.column_index(desc)?;
        let points = self
            .rows
            .iter()
            .filter_map(|(ts, row)| row[idx].map(|v| (*ts, v)));
        Some(TimeSeries::from_points(desc.clone(), points))
    }

    pub fn series(&self) -> Vec<TimeSeries> {
        self.columns
            .iter()
            .filter_map(|c| self.column(c))
            .collect()
    }

    /// Rows with `start <= ts <= end`, all columns kept.
    pub fn between(&self, start: Timestamp, end: Timestamp) -> Self {
        let rows = if start > end {
            BTreeMap::new()
        } else {
            self.rows
                .range(start..=end)
                .map(|(ts, row)| (*ts, row.clone()))
                .collect()
        };
        Self {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Columns matching `keep`; rows left without any value are dropped.
    pub fn select<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&ColumnDescriptor) -> bool,
    {
        let picked: Vec<usize> = (0..self.columns.len())
            .filter(|&i| keep(&self.columns[i]))
            .collect();
        let columns = picked.iter().map(|&i| self.columns[i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .filter_map(|(ts, row)| {
                let cells: Vec<Option<f64>> = picked.iter().map(|&i| row[i]).collect();
                cells.iter().any(Option::is_some).then_some((*ts, cells))
            })
            .collect();
        Self { columns, rows }
    }

    /// Only rows where every column has a value.
    pub fn drop_incomplete(&self) -> Self {
        let rows = self
            .rows
            .iter()
            .filter(|(_, row)| row.iter().all(Option::is_some))
            .map(|(ts, row)| (*ts, row.clone()))
            .collect();
        Self {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Rewrite every descriptor. Columns that collapse onto the same
    /// descriptor are combined, later columns winning per cell.
    pub fn map_columns<F>(&self, mut f: F) -> Result<Self>
    where
        F: FnMut(&ColumnDescriptor) -> Result<ColumnDescriptor>,
    {
        let mut out = Self::new();
        let mut targets = Vec::with_capacity(self.columns.len());
        for c in &self.columns {
            let mapped = f(c)?;
            targets.push(out.ensure_column(&mapped));
        }
        for (ts, row) in &self.rows {
            out.ensure_row(*ts);
            for (i, cell) in row.iter().enumerate() {
                if cell.is_some() {
                    out.set(*ts, targets[i], *cell);
                }
            }
        }
        Ok(out)
    }

    /// Move the time index so that `origin` becomes 0.
    pub fn rebase(&self, origin: Timestamp) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .map(|(ts, row)| (ts - origin, row.clone()))
                .collect(),
        }
    }

    /// CSV with a `time` column followed by one encoded column per descriptor.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut out = csv::Writer::from_writer(writer);
        let mut header = Vec::with_capacity(self.columns.len() + 1);
        header.push("time".to_string());
        header.extend(self.columns.iter().map(ColumnDescriptor::encode));
        out.write_record(&header)?;
        for (ts, row) in &self.rows {
            let mut record = Vec::with_capacity(row.len() + 1);
            record.push(ts.to_string());
            record.extend(row.iter().map(|cell| cell.map(|v| v.to_string()).unwrap_or_default()));
            out.write_record(&record)?;
        }
        out.flush().map_err(csv::Error::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(metric: &str) -> ColumnDescriptor {
        ColumnDescriptor::new("Operations", metric).unwrap()
    }

    #[test]
    fn test_duplicate_timestamp_keeps_last() {
        let s = TimeSeries::from_points(desc("ops"), vec![(5, 1.0), (5, 2.0)]);
        assert_eq!(s.len(), 1);
        assert_eq!(s.get(5), Some(2.0));
    }

    #[test]
    fn test_round_epoch() {
        assert_eq!(round_epoch(1_700_000_000.4), 1_700_000_000);
        assert_eq!(round_epoch(1_700_000_000.6), 1_700_000_001);
    }

    #[test]
    fn test_from_series_outer_join() {
        let a = TimeSeries::from_points(desc("a"), vec![(0, 1.0), (1, 2.0)]);
        let b = TimeSeries::from_points(desc("b"), vec![(1, 10.0), (2, 20.0)]);
        let t = WideTable::from_series(vec![a, b]);
        assert_eq!(t.len(), 3);
        assert_eq!(t.get(0, &desc("b")), None);
        assert_eq!(t.get(1, &desc("b")), Some(10.0));
        assert_eq!(t.get(2, &desc("a")), None);
    }

    #[test]
    fn test_drop_incomplete() {
        let a = TimeSeries::from_points(desc("a"), vec![(0, 1.0), (1, 2.0)]);
        let b = TimeSeries::from_points(desc("b"), vec![(1, 10.0), (2, 20.0)]);
        let t = WideTable::from_series(vec![a, b]).drop_incomplete();
        assert_eq!(t.timestamps().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_select_drops_empty_rows() {
        let a = TimeSeries::from_points(desc("a"), vec![(0, 1.0)]);
        let b = TimeSeries::from_points(desc("b"), vec![(1, 10.0)]);
        let t = WideTable::from_series(vec![a, b]).select(|c| c.metric_id() == "b");
        assert_eq!(t.columns().len(), 1);
        assert_eq!(t.timestamps().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_rebase() {
        let a = TimeSeries::from_points(desc("a"), vec![(100, 1.0), (101, 2.0)]);
        let t = WideTable::from_series(vec![a]).rebase(100);
        assert_eq!(t.first_ts(), Some(0));
        assert_eq!(t.last_ts(), Some(1));
    }

    #[test]
    fn test_write_csv_leaves_missing_cells_empty() {
        let a = TimeSeries::from_points(desc("a"), vec![(0, 1.5)]);
        let b = TimeSeries::from_points(desc("b"), vec![(1, 2.0)]);
        let t = WideTable::from_series(vec![a, b]);
        let mut buf = Vec::new();
        t.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "time,Operations|a,Operations|b");
        assert_eq!(lines[1], "0,1.5,");
        assert_eq!(lines[2], "1,,2");
    }
}
