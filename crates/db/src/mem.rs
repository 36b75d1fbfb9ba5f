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

use crate::{
    err::Result,
    format::{Entry, SeqNo, UserValue},
    memtable::{
        MemTable,
        immut::{ImmutableMemTables, MemTableID},
    },
    options::ReadOptions,
    version::Version,
};

/// Everything a reader needs to see the store at one instant: the active
/// memtable, the sealed memtables waiting for a flush and the live tables.
///
/// A view is never mutated. Writers publish a new one whenever the set of
/// sources changes, and readers keep the one they started with, so files and
/// memtables a reader depends on stay alive for as long as it runs.
#[derive(Debug, Clone)]
pub(crate) struct ReadView {
    /// Number of the log backing the active memtable.
    pub mem_id:  MemTableID,
    pub mem:     Arc<MemTable>,
    pub imms:    ImmutableMemTables,
    pub version: Arc<Version>,
}

impl ReadView {
    pub(crate) fn new(
        mem_id: MemTableID,
        mem: Arc<MemTable>,
        imms: ImmutableMemTables,
        version: Arc<Version>,
    ) -> Self {
        Self {
            mem_id,
            mem,
            imms,
            version,
        }
    }

    /// Same sources, with the table set replaced.
    pub(crate) fn with_version(&self, version: Arc<Version>) -> Self {
        Self {
            version,
            ..self.clone()
        }
    }

    /// Same sources, with the sealed memtable list replaced.
    pub(crate) fn with_imms(&self, imms: ImmutableMemTables) -> Self {
        Self {
            imms,
            ..self.clone()
        }
    }

    /// Returns the newest version of `user_key` visible at `seqno`,
    /// tombstones included.
    ///
    /// Every entry in the active memtable is newer than every sealed one,
    /// and sealed memtables are newer than any table, so the first source
    /// holding the key wins.
    pub(crate) fn get_entry(
        &self,
        user_key: &[u8],
        seqno: SeqNo,
        options: ReadOptions,
    ) -> Result<Option<Entry>> {
        if let Some(entry) = self.mem.get(user_key, seqno) {
            return Ok(Some(entry));
        }
        for imm in self.imms.iter_newest_first() {
            if let Some(entry) = imm.get(user_key, seqno) {
                return Ok(Some(entry));
            }
        }
        self.version.get(user_key, seqno, options)
    }

    /// Value of `user_key` visible at `seqno`, if it is live.
    pub(crate) fn get(
        &self,
        user_key: &[u8],
        seqno: SeqNo,
        options: ReadOptions,
    ) -> Result<Option<UserValue>> {
        Ok(self
            .get_entry(user_key, seqno, options)?
            .filter(|entry| !entry.key.is_tombstone())
            .map(|entry| entry.value))
    }

    pub(crate) fn stats(&self) -> MemStats {
        MemStats {
            memtable_size:    self.mem.approximate_size(),
            memtable_entries: self.mem.len(),
            immutable_count:  self.imms.len(),
            immutable_size:   self.imms.approximate_size(),
        }
    }
}

/// Statistics about the in-memory part of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemStats {
    pub memtable_size:    u64,
    pub memtable_entries: usize,
    pub immutable_count:  usize,
    pub immutable_size:   u64,
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        comparator::{InternalKeyComparator, default_comparator},
        format::{InternalKey, MAX_SEQNO, ValueType},
        options::Compression,
        sst::{
            cache::{BlockCache, TableCache},
            table::{TableBuilder, TableOptions},
        },
        version::TableHandle,
    };

    fn icmp() -> InternalKeyComparator { InternalKeyComparator::new(default_comparator()) }

    fn entry(key: &str, seqno: SeqNo, value: Option<&str>) -> Entry {
        match value {
            Some(value) => Entry::new(
                InternalKey::new(key.as_bytes().to_vec(), seqno, ValueType::Value),
                Bytes::copy_from_slice(value.as_bytes()),
            ),
            None => Entry::new(
                InternalKey::new(key.as_bytes().to_vec(), seqno, ValueType::Tombstone),
                Bytes::new(),
            ),
        }
    }

    /// A table holding a@1 and b@2, a sealed memtable deleting a at 3, and
    /// an active memtable writing b at 4.
    fn layered_view(dir: &TempDir) -> ReadView {
        let mut builder = TableBuilder::create(dir.path(), 1, icmp(), TableOptions {
            block_size:       4096,
            restart_interval: 16,
            compression:      Compression::None,
            bloom_bits:       0,
        })
        .unwrap();
        builder.add(&entry("a", 1, Some("a1"))).unwrap();
        builder.add(&entry("b", 2, Some("b2"))).unwrap();
        let meta = builder.finish().unwrap();

        let cache = Arc::new(TableCache::new(
            dir.path(),
            icmp(),
            Arc::new(BlockCache::new(1 << 20)),
            8,
        ));
        let version = Version::new(2, icmp()).apply(
            vec![(0, Arc::new(TableHandle::new(meta, dir.path(), cache)))],
            &[],
        );

        let sealed = Arc::new(MemTable::new(icmp()));
        sealed.insert(entry("a", 3, None));
        let active = Arc::new(MemTable::new(icmp()));
        active.insert(entry("b", 4, Some("b4")));

        ReadView::new(
            3,
            active,
            ImmutableMemTables::new().with_added(2, sealed),
            Arc::new(version),
        )
    }

    #[test]
    fn test_get_across_layers() {
        let dir = TempDir::new().unwrap();
        let view = layered_view(&dir);
        let read = ReadOptions::default();

        assert!(view.get(b"a", MAX_SEQNO, read).unwrap().is_none());
        assert_eq!(view.get(b"a", 2, read).unwrap().unwrap().as_ref(), b"a1");
        assert_eq!(view.get(b"b", MAX_SEQNO, read).unwrap().unwrap().as_ref(), b"b4");
        assert_eq!(view.get(b"b", 3, read).unwrap().unwrap().as_ref(), b"b2");
        assert!(view.get(b"c", MAX_SEQNO, read).unwrap().is_none());

        let tombstone = view.get_entry(b"a", MAX_SEQNO, read).unwrap().unwrap();
        assert!(tombstone.key.is_tombstone());
    }

    #[test]
    fn test_views_are_independent() {
        let dir = TempDir::new().unwrap();
        let view = layered_view(&dir);
        let flushed = view.with_imms(ImmutableMemTables::new());

        assert_eq!(view.stats().immutable_count, 1);
        assert_eq!(flushed.stats().immutable_count, 0);
        assert_eq!(flushed.stats().memtable_entries, 1);
        // Without the sealed tombstone the table's version shows through.
        assert_eq!(
            flushed
                .get(b"a", MAX_SEQNO, ReadOptions::default())
                .unwrap()
                .unwrap()
                .as_ref(),
            b"a1"
        );
    }
}
