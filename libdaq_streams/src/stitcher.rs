use std::path::{Path, PathBuf};

use super::error::{StreamError, TemporalOrderingWarning};
use super::stream_table::{Row, StreamTable, Value};

/// The single time series built from a stream's chunks
#[derive(Debug, Default)]
pub struct Stitched {
    pub table: StreamTable,
    pub warnings: Vec<TemporalOrderingWarning>,
    /// Rows dropped as exact repeats across a chunk boundary
    pub duplicates_removed: usize,
    /// Chunks rejected because their columns differ from the stream's
    pub rejected: Vec<StreamError>,
}

/// Stitcher appends per-chunk tables, in chunk order, into one table.
///
/// Rows are never reordered. Every adjacent pair of rows is checked and a row that
/// precedes its predecessor by more than the tolerance produces a
/// [TemporalOrderingWarning]. Leading rows of a chunk that exactly repeat rows already
/// stitched from the overlapping tail of the previous chunks are dropped.
#[derive(Debug)]
pub struct Stitcher {
    tolerance_nanos: i64,
    stitched: Stitched,
    has_columns: bool,
}

impl Stitcher {
    pub fn new(tolerance_nanos: i64) -> Self {
        Self {
            tolerance_nanos,
            stitched: Stitched::default(),
            has_columns: false,
        }
    }

    /// Append the table decoded from the chunk at `path`
    pub fn push(&mut self, path: &Path, chunk: StreamTable) {
        // A chunk with no rows says nothing about the stream's columns
        if chunk.is_empty() {
            return;
        }
        if !self.has_columns {
            self.stitched.table.columns = chunk.columns;
            self.has_columns = true;
        } else if chunk.columns != self.stitched.table.columns {
            log::warn!(
                "Rejecting chunk {} as its columns {:?} differ from {:?}",
                path.display(),
                chunk.columns,
                self.stitched.table.columns
            );
            self.stitched.rejected.push(StreamError::ColumnMismatch {
                path: path.to_path_buf(),
                expected: self.stitched.table.columns.clone(),
                found: chunk.columns,
            });
            return;
        }

        let skip = self.count_boundary_duplicates(&chunk.rows);
        self.stitched.duplicates_removed += skip;

        let boundary = self.stitched.table.rows.len();
        self.stitched.table.rows.extend(chunk.rows.into_iter().skip(skip));
        self.check_order(boundary);
    }

    /// Number of leading rows of `incoming` already present in the stitched tail
    fn count_boundary_duplicates(&self, incoming: &[Row]) -> usize {
        let rows = &self.stitched.table.rows;
        let first = match incoming.first() {
            Some(r) => r,
            None => return 0,
        };
        let tail_start = rows
            .iter()
            .rposition(|r| r.time < first.time)
            .map(|p| p + 1)
            .unwrap_or(0);
        let tail = &rows[tail_start..];
        if tail.is_empty() {
            return 0;
        }

        let mut used = vec![false; tail.len()];
        let mut count = 0;
        for row in incoming.iter() {
            let matched = tail
                .iter()
                .enumerate()
                .position(|(idx, candidate)| !used[idx] && is_repeat(candidate, row));
            match matched {
                Some(idx) => {
                    used[idx] = true;
                    count += 1;
                }
                None => break,
            }
        }
        count
    }

    fn check_order(&mut self, boundary: usize) {
        let rows = &self.stitched.table.rows;
        for idx in boundary.max(1)..rows.len() {
            let previous = rows[idx - 1].time;
            let current = rows[idx].time;
            if current < previous.saturating_sub(self.tolerance_nanos) {
                self.stitched.warnings.push(TemporalOrderingWarning {
                    row: idx,
                    previous,
                    current,
                    at_chunk_boundary: idx == boundary,
                });
            }
        }
    }

    pub fn finish(self) -> Stitched {
        self.stitched
    }
}

/// Stitch a sequence of chunk tables, given in chunk order
pub fn stitch(chunks: Vec<(PathBuf, StreamTable)>, tolerance_nanos: i64) -> Stitched {
    let mut stitcher = Stitcher::new(tolerance_nanos);
    for (path, table) in chunks {
        stitcher.push(&path, table);
    }
    stitcher.finish()
}

/// Rows repeat when their times and values are identical. Floats compare by bit
/// pattern, so a NaN repeats itself.
fn is_repeat(a: &Row, b: &Row) -> bool {
    a.time == b.time
        && a.values.len() == b.values.len()
        && a.values.iter().zip(b.values.iter()).all(|pair| match pair {
            (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
            (x, y) => x == y,
        })
}
