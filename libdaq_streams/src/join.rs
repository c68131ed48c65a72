use super::error::JoinAlignmentNotice;
use super::stream_table::{Row, StreamTable, Value};
use super::time_filter::latest_at_or_before;

/// A wide table aligned on a primary stream, plus what alignment had to drop
#[derive(Debug, Clone, PartialEq)]
pub struct Joined {
    pub table: StreamTable,
    pub notices: Vec<JoinAlignmentNotice>,
}

/// For each primary row, the secondary row matched to it
fn align(primary: &StreamTable, secondary: &StreamTable) -> (Vec<Option<usize>>, usize, usize) {
    let monotonic = primary.is_monotonic();
    let mut slots: Vec<Option<usize>> = vec![None; primary.len()];
    let mut dropped = 0;
    let mut collapsed = 0;
    for (idx, row) in secondary.rows.iter().enumerate() {
        let target = match latest_at_or_before(primary, monotonic, row.time) {
            Some(t) => t,
            None => {
                dropped += 1;
                continue;
            }
        };
        match slots[target] {
            Some(existing) => {
                collapsed += 1;
                if row.time >= secondary.rows[existing].time {
                    slots[target] = Some(idx);
                }
            }
            None => slots[target] = Some(idx),
        }
    }
    (slots, dropped, collapsed)
}

/// Join secondary streams onto a primary stream by time.
///
/// The result has one row per primary row, keyed by the primary timestamp. Each
/// secondary row is matched to the most recent primary row at or before it. When
/// several secondary rows land on one primary row the latest one wins and the others
/// are counted as collapsed; secondary rows before the first primary row are dropped
/// and counted. Columns are named `<stream>.<column>`, and primary rows without a
/// match hold Null for that stream.
pub fn asof_join(primary: (&str, &StreamTable), secondaries: &[(&str, &StreamTable)]) -> Joined {
    let (primary_name, primary_table) = primary;
    let mut columns: Vec<String> = primary_table
        .columns
        .iter()
        .map(|c| format!("{primary_name}.{c}"))
        .collect();
    let mut rows: Vec<Row> = primary_table.rows.clone();
    let mut notices = Vec::new();

    for (name, secondary) in secondaries.iter() {
        columns.extend(secondary.columns.iter().map(|c| format!("{name}.{c}")));
        let (slots, dropped, collapsed) = align(primary_table, secondary);
        let nulls = vec![Value::Null; secondary.columns.len()];
        for (row, slot) in rows.iter_mut().zip(slots) {
            match slot {
                Some(idx) => row.values.extend(secondary.rows[idx].values.iter().cloned()),
                None => row.values.extend(nulls.iter().cloned()),
            }
        }
        if dropped > 0 || collapsed > 0 {
            log::info!(
                "Joining {name} onto {primary_name} dropped {dropped} and collapsed {collapsed} rows"
            );
            notices.push(JoinAlignmentNotice {
                stream: name.to_string(),
                dropped,
                collapsed,
            });
        }
    }

    Joined {
        table: StreamTable::with_rows(columns, rows),
        notices,
    }
}
