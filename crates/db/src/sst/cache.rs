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

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use moka::sync::Cache;
use tracing::trace;

use crate::{
    comparator::InternalKeyComparator,
    err::Result,
    format::table_file_path,
    sst::{block::Block, table::TableReader},
};

/// Decoded data blocks keyed by `(file_number, block_offset)` and weighed by
/// their in-memory size. A zero capacity disables caching.
pub(crate) struct BlockCache {
    inner: Option<Cache<(u64, u64), Arc<Block>>>,
}

impl BlockCache {
    pub(crate) fn new(capacity: u64) -> Self {
        let inner = (capacity > 0).then(|| {
            Cache::builder()
                .max_capacity(capacity)
                .weigher(|_key: &(u64, u64), block: &Arc<Block>| {
                    u32::try_from(block.charge()).unwrap_or(u32::MAX)
                })
                .build()
        });
        Self { inner }
    }

    pub(crate) fn get(&self, file_number: u64, offset: u64) -> Option<Arc<Block>> {
        self.inner.as_ref()?.get(&(file_number, offset))
    }

    pub(crate) fn insert(&self, file_number: u64, offset: u64, block: Arc<Block>) {
        if let Some(cache) = &self.inner {
            cache.insert((file_number, offset), block);
        }
    }
}

/// Open table readers keyed by file number, bounded by `max_open_files`.
pub(crate) struct TableCache {
    dir:         PathBuf,
    icmp:        InternalKeyComparator,
    block_cache: Arc<BlockCache>,
    tables:      Cache<u64, Arc<TableReader>>,
}

impl TableCache {
    pub(crate) fn new(
        dir: impl AsRef<Path>,
        icmp: InternalKeyComparator,
        block_cache: Arc<BlockCache>,
        max_open_files: usize,
    ) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            icmp,
            block_cache,
            tables: Cache::new(max_open_files.max(1) as u64),
        }
    }

    /// Returns the reader for `file_number`, opening the file on a miss.
    pub(crate) fn get(&self, file_number: u64) -> Result<Arc<TableReader>> {
        if let Some(table) = self.tables.get(&file_number) {
            return Ok(table);
        }
        trace!(file_number, "opening table");
        let table = Arc::new(TableReader::open(
            table_file_path(&self.dir, file_number),
            file_number,
            self.icmp.clone(),
            self.block_cache.clone(),
        )?);
        self.tables.insert(file_number, table.clone());
        Ok(table)
    }

    pub(crate) fn evict(&self, file_number: u64) { self.tables.invalidate(&file_number); }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        comparator::default_comparator,
        format::{Entry, InternalKey, ValueType},
        options::Compression,
        sst::{
            block::BlockBuilder,
            table::{TableBuilder, TableOptions},
        },
    };

    fn small_block() -> Arc<Block> {
        let mut builder = BlockBuilder::new(16);
        builder.add(
            &InternalKey::new(b"k".to_vec(), 1, ValueType::Value).encode_flat(),
            b"v",
        );
        Arc::new(Block::decode(&builder.finish()).unwrap())
    }

    #[test]
    fn test_disabled_block_cache() {
        let cache = BlockCache::new(0);
        cache.insert(1, 0, small_block());
        assert!(cache.get(1, 0).is_none());
    }

    #[test]
    fn test_block_cache_hit() {
        let cache = BlockCache::new(1 << 20);
        let block = small_block();
        cache.insert(1, 0, block.clone());
        assert!(Arc::ptr_eq(&cache.get(1, 0).unwrap(), &block));
        assert!(cache.get(1, 4096).is_none());
        assert!(cache.get(2, 0).is_none());
    }

    #[test]
    fn test_table_cache_reuses_readers() {
        let dir = TempDir::new().unwrap();
        let icmp = InternalKeyComparator::new(default_comparator());
        let options = TableOptions {
            block_size:       4096,
            restart_interval: 16,
            compression:      Compression::None,
            bloom_bits:       0,
        };
        let mut builder = TableBuilder::create(dir.path(), 3, icmp.clone(), options).unwrap();
        builder
            .add(&Entry::new(
                InternalKey::new(b"k".to_vec(), 1, ValueType::Value),
                Bytes::from_static(b"v"),
            ))
            .unwrap();
        builder.finish().unwrap();

        let cache = TableCache::new(dir.path(), icmp, Arc::new(BlockCache::new(0)), 10);
        let first = cache.get(3).unwrap();
        let second = cache.get(3).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        cache.evict(3);
        let reopened = cache.get(3).unwrap();
        assert!(!Arc::ptr_eq(&first, &reopened));
        assert!(cache.get(4).is_err());
    }
}
