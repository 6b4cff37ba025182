//! Allocation of advisory record numbers.

use crate::record::Record;

/// Next display number for a new record.
///
/// Works only on the snapshot handed in, so a scoped view yields the next
/// number within that view. Records without an integer `sequenceNumber`
/// count as 0.
#[must_use]
pub fn next_sequence(records: &[Record]) -> i64 {
    records
        .iter()
        .map(|r| r.sequence_number().unwrap_or(0))
        .max()
        .map_or(1, |max| max.saturating_add(1))
}
