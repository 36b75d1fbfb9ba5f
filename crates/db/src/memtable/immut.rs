// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;

use crate::memtable::MemTable;

/// Memtables are identified by the number of the log file backing them.
pub(crate) type MemTableID = u64;

/// Sealed memtables waiting to be flushed, oldest first.
///
/// The list is part of a published read view and never mutated in place:
/// every change produces a new list, so readers holding the old view keep a
/// stable set.
#[derive(Debug, Clone, Default)]
pub(crate) struct ImmutableMemTables {
    tables: Vec<(MemTableID, Arc<MemTable>)>,
}

impl ImmutableMemTables {
    pub(crate) fn new() -> Self { Self::default() }

    /// Returns a copy of the list with `memtable` appended as the newest.
    pub(crate) fn with_added(&self, id: MemTableID, memtable: Arc<MemTable>) -> Self {
        let mut tables = self.tables.clone();
        tables.push((id, memtable));
        Self { tables }
    }

    /// Returns a copy of the list without the memtable `id`.
    pub(crate) fn without(&self, id: MemTableID) -> Self {
        Self {
            tables: self
                .tables
                .iter()
                .filter(|(table_id, _)| *table_id != id)
                .cloned()
                .collect(),
        }
    }

    pub(crate) fn len(&self) -> usize { self.tables.len() }

    pub(crate) fn is_empty(&self) -> bool { self.tables.is_empty() }

    /// Oldest memtable, the next one to flush.
    pub(crate) fn oldest(&self) -> Option<(MemTableID, Arc<MemTable>)> { self.tables.first().cloned() }

    /// Iterates from the newest memtable to the oldest.
    pub(crate) fn iter_newest_first(&self) -> impl Iterator<Item = &Arc<MemTable>> {
        self.tables.iter().rev().map(|(_, table)| table)
    }

    /// Total approximate size of all sealed memtables.
    pub(crate) fn approximate_size(&self) -> u64 {
        self.tables
            .iter()
            .map(|(_, table)| table.approximate_size())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::{InternalKeyComparator, default_comparator};

    fn table() -> Arc<MemTable> {
        Arc::new(MemTable::new(InternalKeyComparator::new(default_comparator())))
    }

    #[test]
    fn test_copy_on_write() {
        let empty = ImmutableMemTables::new();
        let one = empty.with_added(1, table());
        let two = one.with_added(2, table());

        assert!(empty.is_empty());
        assert_eq!(one.len(), 1);
        assert_eq!(two.len(), 2);
        assert_eq!(two.oldest().map(|(id, _)| id), Some(1));

        let flushed = two.without(1);
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed.oldest().map(|(id, _)| id), Some(2));
        assert_eq!(two.len(), 2);
    }

    #[test]
    fn test_newest_first() {
        let first = table();
        let second = table();
        let tables = ImmutableMemTables::new()
            .with_added(1, first.clone())
            .with_added(2, second.clone());
        let order: Vec<_> = tables.iter_newest_first().collect();
        assert!(Arc::ptr_eq(order[0], &second));
        assert!(Arc::ptr_eq(order[1], &first));
    }
}
