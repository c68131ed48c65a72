use super::stream_table::{Row, StreamTable, Value};
use super::timestamp::{TimeRange, Timestamp};

/// Restrict a table to the rows inside `range`, keeping their order.
///
/// Monotonic tables are cut with two binary searches. A table carrying out of order
/// rows is scanned linearly so that no in-range row is lost.
pub fn filter(mut table: StreamTable, range: &TimeRange) -> StreamTable {
    if !range.is_bounded() {
        return table;
    }
    if table.is_monotonic() {
        let rows = &mut table.rows;
        let end = rows.partition_point(|r| range.is_before_end(&r.time));
        let start = rows.partition_point(|r| !range.is_after_start(&r.time)).min(end);
        rows.truncate(end);
        rows.drain(..start);
    } else {
        log::debug!(
            "Filtering a non-monotonic table of {} rows by linear scan",
            table.len()
        );
        table.rows.retain(|r| range.contains(&r.time));
    }
    table
}

/// Index of the latest row at or before `time`; ties go to the row appearing last
pub(crate) fn latest_at_or_before(
    table: &StreamTable,
    monotonic: bool,
    time: Timestamp,
) -> Option<usize> {
    if monotonic {
        let idx = table.rows.partition_point(|r| r.time <= time);
        return idx.checked_sub(1);
    }
    let mut best: Option<usize> = None;
    for (idx, row) in table.rows.iter().enumerate() {
        if row.time > time {
            continue;
        }
        match best {
            Some(b) if table.rows[b].time > row.time => (),
            _ => best = Some(idx),
        }
    }
    best
}

/// Sample a table at the requested times.
///
/// Each output row is stamped with the requested time and carries the values of the
/// most recent row at or before it. When there is no such row, or it is older than
/// `tolerance_nanos`, the output row holds Null values.
pub fn sample_at(
    table: &StreamTable,
    times: &[Timestamp],
    tolerance_nanos: Option<i64>,
) -> StreamTable {
    let monotonic = table.is_monotonic();
    let nulls = vec![Value::Null; table.columns.len()];
    let rows = times
        .iter()
        .map(|time| {
            let matched = latest_at_or_before(table, monotonic, *time).filter(|idx| {
                tolerance_nanos
                    .is_none_or(|tol| table.rows[*idx].time >= time.saturating_sub(tol))
            });
            match matched {
                Some(idx) => Row::new(*time, table.rows[idx].values.clone()),
                None => Row::new(*time, nulls.clone()),
            }
        })
        .collect();
    StreamTable::with_rows(table.columns.clone(), rows)
}
