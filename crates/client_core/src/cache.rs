use shared::protocol::ChangeKind;
use tracing::debug;

use crate::{error::StoreError, record::Record, remote::ChangeEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Empty,
    Loading,
    Populated,
}

/// What a reconciliation event did to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Replaced,
    Removed,
    Ignored,
}

/// In-memory mirror of one store table. Iteration order is arrival order;
/// views sort on their own.
#[derive(Debug)]
pub struct EntityCache<T: Record> {
    items: Vec<T>,
    state: CacheState,
    state_before_fetch: CacheState,
    last_error: Option<StoreError>,
}

impl<T: Record> Default for EntityCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> EntityCache<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            state: CacheState::Empty,
            state_before_fetch: CacheState::Empty,
            last_error: None,
        }
    }

    pub fn state(&self) -> CacheState {
        self.state
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub(crate) fn items_mut(&mut self) -> &mut [T] {
        &mut self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: T::Id) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn last_error(&self) -> Option<&StoreError> {
        self.last_error.as_ref()
    }

    fn index_of(&self, id: T::Id) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    pub fn begin_fetch(&mut self) {
        // Overlapping fetches keep the state from before the first one.
        if self.state != CacheState::Loading {
            self.state_before_fetch = self.state;
        }
        self.state = CacheState::Loading;
    }

    /// Success replaces the whole collection. Failure restores the state
    /// from before the fetch, keeps the rows, and hands the error back.
    pub fn finish_fetch(&mut self, result: Result<Vec<T>, StoreError>) -> Result<usize, StoreError> {
        match result {
            Ok(rows) => {
                self.items = rows;
                self.state = CacheState::Populated;
                self.last_error = None;
                Ok(self.items.len())
            }
            Err(err) => {
                self.state = self.state_before_fetch;
                self.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    pub(crate) fn record_error(&mut self, err: &StoreError) {
        self.last_error = Some(err.clone());
    }

    /// Merges one realtime change. Duplicate inserts and updates or deletes
    /// for unknown ids are ignored.
    pub fn apply(&mut self, event: &ChangeEvent<T>) -> Applied {
        let Some(id) = event.id() else {
            debug!(table = %T::TABLE, kind = ?event.kind, "change without a row snapshot");
            return Applied::Ignored;
        };
        match (event.kind, &event.new) {
            (ChangeKind::Insert, Some(row)) => {
                if self.index_of(id).is_some() {
                    return Applied::Ignored;
                }
                self.items.push(row.clone());
                Applied::Inserted
            }
            (ChangeKind::Update, Some(row)) => match self.index_of(id) {
                Some(index) => {
                    self.items[index] = row.clone();
                    Applied::Replaced
                }
                None => Applied::Ignored,
            },
            (ChangeKind::Delete, _) => match self.index_of(id) {
                Some(index) => {
                    self.items.remove(index);
                    Applied::Removed
                }
                None => Applied::Ignored,
            },
            _ => Applied::Ignored,
        }
    }

    /// Optimistic insert-or-replace by id.
    pub fn upsert_local(&mut self, row: T) {
        match self.index_of(row.id()) {
            Some(index) => self.items[index] = row,
            None => self.items.push(row),
        }
    }

    /// Optimistic in-place edit. Returns `false` when the id is not cached.
    pub fn patch_local(&mut self, id: T::Id, edit: impl FnOnce(&mut T)) -> bool {
        match self.index_of(id) {
            Some(index) => {
                edit(&mut self.items[index]);
                true
            }
            None => false,
        }
    }

    pub fn remove_local(&mut self, id: T::Id) -> Option<T> {
        self.index_of(id).map(|index| self.items.remove(index))
    }
}

#[cfg(test)]
#[path = "tests/cache_tests.rs"]
mod tests;
