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
    cmp::Ordering,
    fmt,
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{self, AtomicBool},
    },
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, warn};

use crate::{
    comparator::InternalKeyComparator,
    err::Result,
    format::{Codec, Entry, InternalKey, SeqNo, table_file_path},
    options::ReadOptions,
    sst::{cache::TableCache, table::TableReader},
};

/// Metadata about an SSTable file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SstableMetadata {
    /// Unique file identifier
    pub file_number:  u64,
    /// File size in bytes
    pub file_size:    u64,
    /// Smallest key in the file
    pub smallest_key: InternalKey,
    /// Largest key in the file
    pub largest_key:  InternalKey,
    /// Number of entries in the file
    pub entry_count:  u64,
}

impl SstableMetadata {
    /// Checks if the file's user key range intersects `[start, stop]`, where a
    /// missing bound is unbounded.
    pub(crate) fn overlaps_range(
        &self,
        icmp: &InternalKeyComparator,
        start: Option<&[u8]>,
        stop: Option<&[u8]>,
    ) -> bool {
        let after_start = start.is_none_or(|start| {
            icmp.compare_user(&self.largest_key.user_key, start) != Ordering::Less
        });
        let before_stop = stop.is_none_or(|stop| {
            icmp.compare_user(&self.smallest_key.user_key, stop) != Ordering::Greater
        });
        after_start && before_stop
    }

    /// Checks if a user key falls within this file's range
    pub(crate) fn contains_user_key(&self, icmp: &InternalKeyComparator, user_key: &[u8]) -> bool {
        self.overlaps_range(icmp, Some(user_key), Some(user_key))
    }
}

impl Codec for SstableMetadata {
    fn encode_into<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u64::<LittleEndian>(self.file_number)?;
        writer.write_u64::<LittleEndian>(self.file_size)?;
        writer.write_u64::<LittleEndian>(self.entry_count)?;
        self.smallest_key.encode_into(writer)?;
        self.largest_key.encode_into(writer)
    }

    fn decode_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        Ok(Self {
            file_number:  reader.read_u64::<LittleEndian>()?,
            file_size:    reader.read_u64::<LittleEndian>()?,
            entry_count:  reader.read_u64::<LittleEndian>()?,
            smallest_key: InternalKey::decode_from(reader)?,
            largest_key:  InternalKey::decode_from(reader)?,
        })
    }
}

/// A live table file shared by every read view that references it.
///
/// Once a compaction replaces the table it is marked obsolete; the file is
/// deleted when the last view holding the handle lets go of it.
pub(crate) struct TableHandle {
    pub meta:    SstableMetadata,
    path:        PathBuf,
    table_cache: Arc<TableCache>,
    obsolete:    AtomicBool,
}

impl fmt::Debug for TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableHandle")
            .field("file_number", &self.meta.file_number)
            .field("file_size", &self.meta.file_size)
            .field("obsolete", &self.obsolete.load(atomic::Ordering::Relaxed))
            .finish()
    }
}

impl TableHandle {
    pub(crate) fn new(meta: SstableMetadata, dir: &Path, table_cache: Arc<TableCache>) -> Self {
        Self {
            path: table_file_path(dir, meta.file_number),
            meta,
            table_cache,
            obsolete: AtomicBool::new(false),
        }
    }

    pub(crate) fn file_number(&self) -> u64 { self.meta.file_number }

    pub(crate) fn reader(&self) -> Result<Arc<TableReader>> {
        self.table_cache.get(self.meta.file_number)
    }

    pub(crate) fn mark_obsolete(&self) { self.obsolete.store(true, atomic::Ordering::Release); }
}

impl Drop for TableHandle {
    fn drop(&mut self) {
        if !self.obsolete.load(atomic::Ordering::Acquire) {
            return;
        }
        self.table_cache.evict(self.meta.file_number);
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(file_number = self.meta.file_number, "deleted obsolete table"),
            Err(e) => warn!(
                file_number = self.meta.file_number,
                "failed to delete obsolete table: {e}"
            ),
        }
    }
}

/// The set of live table files, organized by level.
///
/// Level 0 files may overlap and are kept in creation order; files in deeper
/// levels have disjoint user key ranges and are sorted by smallest key.
#[derive(Debug, Clone)]
pub(crate) struct Version {
    levels: Vec<Vec<Arc<TableHandle>>>,
    icmp:   InternalKeyComparator,
}

impl Version {
    pub(crate) fn new(num_levels: usize, icmp: InternalKeyComparator) -> Self {
        Self {
            levels: vec![Vec::new(); num_levels],
            icmp,
        }
    }

    pub(crate) fn num_levels(&self) -> usize { self.levels.len() }

    pub(crate) fn icmp(&self) -> &InternalKeyComparator { &self.icmp }

    pub(crate) fn files(&self, level: usize) -> &[Arc<TableHandle>] {
        self.levels.get(level).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All live files with their levels.
    pub(crate) fn all_files(&self) -> impl Iterator<Item = (usize, &Arc<TableHandle>)> {
        self.levels
            .iter()
            .enumerate()
            .flat_map(|(level, files)| files.iter().map(move |file| (level, file)))
    }

    pub(crate) fn level_size(&self, level: usize) -> u64 {
        self.files(level).iter().map(|f| f.meta.file_size).sum()
    }

    /// Returns a new version with `removed` (level, file number) pairs
    /// dropped and `added` files inserted.
    pub(crate) fn apply(
        &self,
        added: impl IntoIterator<Item = (usize, Arc<TableHandle>)>,
        removed: &[(usize, u64)],
    ) -> Version {
        let mut levels = self.levels.clone();
        for &(level, file_number) in removed {
            if let Some(files) = levels.get_mut(level) {
                files.retain(|f| f.file_number() != file_number);
            }
        }
        for (level, file) in added {
            if level >= levels.len() {
                levels.resize(level + 1, Vec::new());
            }
            levels[level].push(file);
        }

        for (level, files) in levels.iter_mut().enumerate() {
            if level == 0 {
                files.sort_by_key(|f| f.file_number());
            } else {
                files.sort_by(|a, b| self.icmp.compare(&a.meta.smallest_key, &b.meta.smallest_key));
            }
        }
        Version {
            levels,
            icmp: self.icmp.clone(),
        }
    }

    /// Files at `level` whose user key range intersects `[start, stop]`.
    pub(crate) fn overlapping_files(
        &self,
        level: usize,
        start: Option<&[u8]>,
        stop: Option<&[u8]>,
    ) -> Vec<Arc<TableHandle>> {
        self.files(level)
            .iter()
            .filter(|f| f.meta.overlaps_range(&self.icmp, start, stop))
            .cloned()
            .collect()
    }

    /// Whether a file other than those numbered in `excluded` has a range
    /// covering `user_key`.
    pub(crate) fn may_exist_outside(&self, excluded: &[u64], user_key: &[u8]) -> bool {
        self.all_files().any(|(_, f)| {
            !excluded.contains(&f.file_number()) && f.meta.contains_user_key(&self.icmp, user_key)
        })
    }

    /// Newest entry for `user_key` visible at `seqno` across all files.
    /// Tombstones are returned as is.
    pub(crate) fn get(
        &self,
        user_key: &[u8],
        seqno: SeqNo,
        options: ReadOptions,
    ) -> Result<Option<Entry>> {
        let mut best: Option<Entry> = None;
        for (_, file) in self.all_files() {
            if !file.meta.contains_user_key(&self.icmp, user_key) {
                continue;
            }
            if let Some(entry) = file.reader()?.get(user_key, seqno, options)? {
                if best.as_ref().is_none_or(|b| entry.key.seqno > b.key.seqno) {
                    best = Some(entry);
                }
            }
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::{
        comparator::default_comparator,
        format::ValueType,
        sst::cache::BlockCache,
    };

    fn icmp() -> InternalKeyComparator { InternalKeyComparator::new(default_comparator()) }

    fn metadata(file_number: u64, smallest: &str, largest: &str, file_size: u64) -> SstableMetadata {
        SstableMetadata {
            file_number,
            file_size,
            smallest_key: InternalKey::new(smallest.as_bytes().to_vec(), 1, ValueType::Value),
            largest_key: InternalKey::new(largest.as_bytes().to_vec(), 1, ValueType::Value),
            entry_count: 100,
        }
    }

    fn table_cache(dir: &Path) -> Arc<TableCache> {
        Arc::new(TableCache::new(dir, icmp(), Arc::new(BlockCache::new(0)), 16))
    }

    #[test]
    fn test_sstable_metadata_overlaps() {
        let icmp = icmp();
        let file1 = metadata(1, "a", "d", 1000);
        let file3 = metadata(3, "g", "j", 1000);

        assert!(file1.overlaps_range(&icmp, None, None));
        assert!(file1.overlaps_range(&icmp, Some(&b"d"[..]), None));
        assert!(!file1.overlaps_range(&icmp, Some(&b"e"[..]), None));
        assert!(!file3.overlaps_range(&icmp, None, Some(&b"f"[..])));
        assert!(file3.contains_user_key(&icmp, b"h"));
    }

    #[test]
    fn test_metadata_codec() {
        let meta = metadata(9, "a\0b", "zz", 4096);
        let encoded = meta.encode_into_vec().unwrap();
        let decoded = SstableMetadata::decode_from(&mut encoded.as_slice()).unwrap();
        assert_eq!(decoded, meta);
    }

    #[test]
    fn test_version_apply() {
        let dir = TempDir::new().unwrap();
        let cache = table_cache(dir.path());
        let handle = |meta| Arc::new(TableHandle::new(meta, dir.path(), cache.clone()));

        let base = Version::new(3, icmp());
        let v1 = base.apply(
            vec![
                (0, handle(metadata(5, "a", "z", 10))),
                (0, handle(metadata(2, "b", "c", 10))),
                (1, handle(metadata(3, "m", "p", 20))),
                (1, handle(metadata(4, "a", "f", 30))),
            ],
            &[],
        );
        let l0: Vec<_> = v1.files(0).iter().map(|f| f.file_number()).collect();
        let l1: Vec<_> = v1.files(1).iter().map(|f| f.file_number()).collect();
        assert_eq!(l0, vec![2, 5]);
        assert_eq!(l1, vec![4, 3]);
        assert_eq!(v1.level_size(1), 50);
        assert!(base.files(0).is_empty());

        let v2 = v1.apply(vec![], &[(0, 5), (1, 4)]);
        assert_eq!(v2.files(0).len(), 1);
        assert_eq!(v2.files(1).len(), 1);
        assert_eq!(v1.files(0).len(), 2);
    }

    #[test]
    fn test_overlapping_and_outside() {
        let dir = TempDir::new().unwrap();
        let cache = table_cache(dir.path());
        let handle = |meta| Arc::new(TableHandle::new(meta, dir.path(), cache.clone()));
        let version = Version::new(3, icmp()).apply(
            vec![
                (1, handle(metadata(1, "a", "d", 1))),
                (1, handle(metadata(2, "e", "h", 1))),
                (2, handle(metadata(3, "i", "l", 1))),
            ],
            &[],
        );

        let overlapping = version.overlapping_files(1, Some(&b"c"[..]), Some(&b"f"[..]));
        assert_eq!(overlapping.len(), 2);
        assert!(version.overlapping_files(1, Some(&b"x"[..]), None).is_empty());

        assert!(version.may_exist_outside(&[1, 2], b"j"));
        assert!(!version.may_exist_outside(&[1, 2], b"b"));
        assert!(version.may_exist_outside(&[2], b"b"));
        assert!(!version.may_exist_outside(&[3], b"j"));
    }

    #[test]
    fn test_obsolete_handle_deletes_file() {
        let dir = TempDir::new().unwrap();
        let cache = table_cache(dir.path());
        let path = table_file_path(dir.path(), 8);
        std::fs::write(&path, b"table").unwrap();

        let kept = TableHandle::new(metadata(8, "a", "b", 5), dir.path(), cache.clone());
        drop(kept);
        assert!(path.exists());

        let obsolete = Arc::new(TableHandle::new(metadata(8, "a", "b", 5), dir.path(), cache));
        let view = obsolete.clone();
        obsolete.mark_obsolete();
        drop(obsolete);
        assert!(path.exists());
        drop(view);
        assert!(!path.exists());
    }
}
