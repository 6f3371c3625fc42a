use thiserror::Error;

use crate::record::{Pipelined, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionChange<Id> {
    pub id: Id,
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderingError {
    #[error("index {index} is outside a column of {len} items")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("no cached item with id {0}")]
    UnknownId(i64),
}

/// Ids in one status column, in position order (id breaks ties so the
/// order is stable even when positions collide).
pub fn partition<T: Pipelined>(items: &[T], status: T::Status) -> Vec<T::Id> {
    let mut column: Vec<&T> = items.iter().filter(|item| item.status() == status).collect();
    column.sort_by_key(|item| (item.position(), Into::<i64>::into(item.id())));
    column.into_iter().map(Record::id).collect()
}

/// Moves the item at index `from` of the `status` column to index `to` and
/// renumbers the whole column to `0..n`. Returns only the items whose
/// position actually changed, in column order.
pub fn reorder_partition<T: Pipelined>(
    items: &mut [T],
    status: T::Status,
    from: usize,
    to: usize,
) -> Result<Vec<PositionChange<T::Id>>, OrderingError> {
    let mut column = partition(items, status);
    let len = column.len();
    for index in [from, to] {
        if index >= len {
            return Err(OrderingError::IndexOutOfRange { index, len });
        }
    }
    let moved = column.remove(from);
    column.insert(to, moved);

    let mut changes = Vec::new();
    for (position, id) in column.into_iter().enumerate() {
        let position = position as i64;
        if let Some(item) = items.iter_mut().find(|item| item.id() == id) {
            if item.position() != position {
                item.set_position(position);
                changes.push(PositionChange { id, position });
            }
        }
    }
    Ok(changes)
}

/// Moves an item to the end of another status column. The column it left
/// keeps its gap until that column is reordered. Moving to the current
/// status is a no-op and returns `None`.
pub fn move_to_status<T: Pipelined>(
    items: &mut [T],
    id: T::Id,
    status: T::Status,
) -> Result<Option<PositionChange<T::Id>>, OrderingError> {
    // End of the column, not its length: columns may carry gaps.
    let end = items
        .iter()
        .filter(|item| item.status() == status && item.id() != id)
        .map(Pipelined::position)
        .max()
        .map_or(0, |last| last + 1);
    let item = items
        .iter_mut()
        .find(|item| item.id() == id)
        .ok_or_else(|| OrderingError::UnknownId(id.into()))?;
    if item.status() == status {
        return Ok(None);
    }
    item.set_status(status);
    item.set_position(end);
    Ok(Some(PositionChange { id, position: end }))
}

/// True when the column's positions are exactly `0..n`.
pub fn is_dense<T: Pipelined>(items: &[T], status: T::Status) -> bool {
    let mut positions: Vec<i64> = items
        .iter()
        .filter(|item| item.status() == status)
        .map(Pipelined::position)
        .collect();
    positions.sort_unstable();
    positions.iter().enumerate().all(|(i, p)| *p == i as i64)
}

#[cfg(test)]
#[path = "tests/ordering_tests.rs"]
mod tests;
