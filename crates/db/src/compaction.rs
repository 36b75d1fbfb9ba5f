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

use std::{cmp::Ordering, path::Path, sync::Arc};

use burrow_common::readable_size::ReadableSize;
use bytes::Bytes;
use snafu::ensure;
use tracing::{debug, info, warn};

use crate::{
    comparator::InternalKeyComparator,
    err::{InvalidArgumentSnafu, Result},
    format::{Entry, InternalKey, SeqNo, table_file_path},
    options::ReadOptions,
    sst::table::{TableBuilder, TableOptions},
    version::{SstableMetadata, TableHandle, Version},
};

/// Default compaction thresholds and parameters
pub(crate) const DEFAULT_L0_COMPACTION_TRIGGER: usize = 4; // Trigger when L0 has 4 files
pub(crate) const DEFAULT_MAX_BYTES_FOR_LEVEL_BASE: ReadableSize = ReadableSize::mb(10); // 10MB for L1
pub(crate) const DEFAULT_LEVEL_SIZE_MULTIPLIER: u64 = 10; // Each level is 10x larger than previous
pub(crate) const DEFAULT_MAX_COMPACTION_BYTES: ReadableSize = ReadableSize::mb(25); // Max bytes per compaction
pub(crate) const DEFAULT_TARGET_FILE_SIZE_BASE: ReadableSize = ReadableSize::mb(2); // 2MB per file
pub(crate) const DEFAULT_MAX_LEVELS: usize = 7; // L0 through L6

/// Configuration for compaction behavior
#[derive(Debug, Clone)]
pub struct CompactionOptions {
    /// Number of L0 files that trigger compaction
    pub l0_compaction_trigger:    usize,
    /// Target size for level 1 (base level)
    pub max_bytes_for_level_base: ReadableSize,
    /// Multiplier for level sizes (each level is this many times larger)
    pub level_size_multiplier:    u64,
    /// Maximum bytes of L0 input to include in a single compaction
    pub max_compaction_bytes:     ReadableSize,
    /// Target size for each SSTable file
    pub target_file_size_base:    ReadableSize,
    /// Maximum number of levels
    pub max_levels:               usize,
}

impl Default for CompactionOptions {
    fn default() -> Self {
        Self {
            l0_compaction_trigger:    DEFAULT_L0_COMPACTION_TRIGGER,
            max_bytes_for_level_base: DEFAULT_MAX_BYTES_FOR_LEVEL_BASE,
            level_size_multiplier:    DEFAULT_LEVEL_SIZE_MULTIPLIER,
            max_compaction_bytes:     DEFAULT_MAX_COMPACTION_BYTES,
            target_file_size_base:    DEFAULT_TARGET_FILE_SIZE_BASE,
            max_levels:               DEFAULT_MAX_LEVELS,
        }
    }
}

impl CompactionOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        ensure!(
            self.l0_compaction_trigger > 0,
            InvalidArgumentSnafu {
                message: "l0_compaction_trigger must be positive",
            }
        );
        ensure!(
            self.max_levels >= 2,
            InvalidArgumentSnafu {
                message: format!("max_levels must be at least 2, got {}", self.max_levels),
            }
        );
        ensure!(
            self.level_size_multiplier > 0,
            InvalidArgumentSnafu {
                message: "level_size_multiplier must be positive",
            }
        );
        ensure!(
            !self.max_bytes_for_level_base.is_zero()
                && !self.max_compaction_bytes.is_zero()
                && !self.target_file_size_base.is_zero(),
            InvalidArgumentSnafu {
                message: "compaction sizes must be positive",
            }
        );
        Ok(())
    }
}

/// Reasons why compaction was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionReason {
    /// L0 has too many files
    L0TooManyFiles,
    /// A level has exceeded its size limit
    LevelSizeExceeded { level: usize },
    /// Requested through `compact_range`
    Manual,
}

/// A set of files to merge from one level into the next.
#[derive(Debug, Clone)]
pub(crate) struct CompactionJob {
    pub job_id:         u64,
    /// Level being compacted from (source level)
    pub input_level:    usize,
    /// Level being compacted to (output level)
    pub output_level:   usize,
    /// Files from the input level
    pub input_files:    Vec<Arc<TableHandle>>,
    /// Files from the output level that overlap (need to be included)
    pub output_files:   Vec<Arc<TableHandle>>,
    pub reason:         CompactionReason,
    /// Sum of all input file sizes
    pub estimated_size: u64,
}

impl CompactionJob {
    pub(crate) fn new(
        job_id: u64,
        input_level: usize,
        output_level: usize,
        input_files: Vec<Arc<TableHandle>>,
        output_files: Vec<Arc<TableHandle>>,
        reason: CompactionReason,
    ) -> Self {
        let estimated_size = input_files
            .iter()
            .chain(output_files.iter())
            .map(|f| f.meta.file_size)
            .sum();

        Self {
            job_id,
            input_level,
            output_level,
            input_files,
            output_files,
            reason,
            estimated_size,
        }
    }

    /// Returns all input files (from both input and output levels)
    pub(crate) fn all_input_files(&self) -> impl Iterator<Item = &Arc<TableHandle>> {
        self.input_files.iter().chain(self.output_files.iter())
    }

    /// `(level, file number)` of every file the job replaces.
    pub(crate) fn deletions(&self) -> Vec<(usize, u64)> {
        self.input_files
            .iter()
            .map(|f| (self.input_level, f.file_number()))
            .chain(
                self.output_files
                    .iter()
                    .map(|f| (self.output_level, f.file_number())),
            )
            .collect()
    }
}

/// Everything a compaction needs from the store while it runs.
pub(crate) struct CompactionContext<'a> {
    pub dir:               &'a Path,
    pub icmp:              &'a InternalKeyComparator,
    pub table_options:     TableOptions,
    pub read_options:      ReadOptions,
    /// Versions older than a newer version at or below this sequence are
    /// invisible to every reader.
    pub smallest_snapshot: SeqNo,
    pub version:           &'a Version,
    pub next_file_number:  &'a mut u64,
}

/// Decides when and what to compact.
///
/// The manager only looks at the [`Version`] it is handed; installing the
/// result of a job is up to the caller.
#[derive(Debug)]
pub(crate) struct CompactionManager {
    options:          CompactionOptions,
    next_job_id:      u64,
    /// Largest key of the last file compacted out of each level, so level
    /// compactions rotate through the key space.
    compact_pointers: Vec<Option<InternalKey>>,
    completed_jobs:   u64,
}

impl CompactionManager {
    pub(crate) fn new(options: CompactionOptions) -> Self {
        Self {
            compact_pointers: vec![None; options.max_levels],
            options,
            next_job_id: 1,
            completed_jobs: 0,
        }
    }

    /// Checks if compaction is needed and returns a compaction job if so
    pub(crate) fn pick_compaction(&mut self, version: &Version) -> Option<CompactionJob> {
        // First priority: L0 compaction (special case due to overlapping files)
        if self.level_needs_compaction(version, 0) {
            if let Some(job) = self.pick_l0_compaction(version) {
                return Some(job);
            }
        }

        // Second priority: Level-based compaction for L1+
        for level in 1..version.num_levels().saturating_sub(1) {
            if self.level_needs_compaction(version, level) {
                if let Some(job) = self.pick_level_compaction(version, level) {
                    return Some(job);
                }
            }
        }

        None
    }

    /// Picks the oldest L0 files, bounded by `max_compaction_bytes`.
    ///
    /// Only a prefix of L0 in creation order is taken so that every file left
    /// behind is newer than everything moved down.
    fn pick_l0_compaction(&mut self, version: &Version) -> Option<CompactionJob> {
        let limit = self.options.max_compaction_bytes.as_bytes();
        let mut total_size = 0u64;
        let mut input_files = Vec::new();
        for file in version.files(0) {
            if !input_files.is_empty() && total_size + file.meta.file_size > limit {
                break;
            }
            total_size += file.meta.file_size;
            input_files.push(file.clone());
        }
        if input_files.is_empty() {
            return None;
        }

        let output_files = self.find_overlapping_files(version, 1, &input_files);
        Some(self.new_job(0, input_files, output_files, CompactionReason::L0TooManyFiles))
    }

    /// Picks one file of `level` to push down into `level + 1`.
    fn pick_level_compaction(&mut self, version: &Version, level: usize) -> Option<CompactionJob> {
        let files = version.files(level);
        if files.is_empty() || level + 1 >= version.num_levels() {
            return None;
        }

        let icmp = version.icmp();
        let input_file = self
            .compact_pointers
            .get(level)
            .cloned()
            .flatten()
            .and_then(|pointer| {
                files
                    .iter()
                    .find(|f| icmp.compare(&f.meta.largest_key, &pointer) == Ordering::Greater)
            })
            .unwrap_or(&files[0])
            .clone();
        let input_files = vec![input_file];

        let output_files = self.find_overlapping_files(version, level + 1, &input_files);
        Some(self.new_job(
            level,
            input_files,
            output_files,
            CompactionReason::LevelSizeExceeded { level },
        ))
    }

    /// Picks the files of `level` overlapping the user key range
    /// `[start, stop]` along with the overlapping files one level down.
    ///
    /// Level 0 is taken whole when any of its files overlaps, since its
    /// files are not disjoint.
    pub(crate) fn pick_range_compaction(
        &mut self,
        version: &Version,
        level: usize,
        start: Option<&[u8]>,
        stop: Option<&[u8]>,
    ) -> Option<CompactionJob> {
        if level + 1 >= version.num_levels() {
            return None;
        }
        let overlapping = version.overlapping_files(level, start, stop);
        if overlapping.is_empty() {
            return None;
        }
        let input_files = if level == 0 {
            version.files(0).to_vec()
        } else {
            overlapping
        };
        let output_files = self.find_overlapping_files(version, level + 1, &input_files);
        Some(self.new_job(level, input_files, output_files, CompactionReason::Manual))
    }

    fn new_job(
        &mut self,
        input_level: usize,
        input_files: Vec<Arc<TableHandle>>,
        output_files: Vec<Arc<TableHandle>>,
        reason: CompactionReason,
    ) -> CompactionJob {
        let job_id = self.next_job_id;
        self.next_job_id += 1;

        let job = CompactionJob::new(
            job_id,
            input_level,
            input_level + 1,
            input_files,
            output_files,
            reason,
        );
        info!(
            job_id,
            input_level,
            inputs = job.input_files.len(),
            overlapping = job.output_files.len(),
            bytes = job.estimated_size,
            ?reason,
            "picked compaction"
        );
        job
    }

    /// Finds files in the target level that overlap with input files
    fn find_overlapping_files(
        &self,
        version: &Version,
        target_level: usize,
        input_files: &[Arc<TableHandle>],
    ) -> Vec<Arc<TableHandle>> {
        let icmp = version.icmp();
        let mut files = input_files.iter();
        let Some(first) = files.next() else {
            return Vec::new();
        };

        // Find the overall user key range of input files
        let (min_key, max_key) = files.fold(
            (&first.meta.smallest_key.user_key, &first.meta.largest_key.user_key),
            |(min, max), file| {
                let min = if icmp.compare_user(&file.meta.smallest_key.user_key, min) == Ordering::Less {
                    &file.meta.smallest_key.user_key
                } else {
                    min
                };
                let max = if icmp.compare_user(&file.meta.largest_key.user_key, max) == Ordering::Greater {
                    &file.meta.largest_key.user_key
                } else {
                    max
                };
                (min, max)
            },
        );

        version.overlapping_files(target_level, Some(min_key.as_ref()), Some(max_key.as_ref()))
    }

    /// Checks if a level needs compaction based on file count or size
    fn level_needs_compaction(&self, version: &Version, level: usize) -> bool {
        if level == 0 {
            return version.files(0).len() >= self.options.l0_compaction_trigger;
        }
        version.level_size(level) > self.level_size_limit(level)
    }

    /// Calculates the size limit for a given level
    fn level_size_limit(&self, level: usize) -> u64 {
        if level == 0 {
            return u64::MAX; // L0 is limited by file count, not size
        }

        // Each level is multiplier times larger than the previous
        let base = self.options.max_bytes_for_level_base.as_bytes();
        self.options
            .level_size_multiplier
            .checked_pow((level - 1) as u32)
            .and_then(|m| base.checked_mul(m))
            .unwrap_or(u64::MAX)
    }

    /// Executes a compaction job, returning the metadata of the tables it
    /// wrote.
    pub(crate) fn compact(
        &mut self,
        job: &CompactionJob,
        ctx: &mut CompactionContext<'_>,
    ) -> Result<Vec<SstableMetadata>> {
        info!(
            job_id = job.job_id,
            "starting compaction L{} -> L{}", job.input_level, job.output_level
        );

        match self.execute_compaction(job, ctx) {
            Ok(outputs) => {
                if let Some(last) = job.input_files.last() {
                    if let Some(pointer) = self.compact_pointers.get_mut(job.input_level) {
                        *pointer = Some(last.meta.largest_key.clone());
                    }
                }
                self.completed_jobs += 1;
                info!(
                    job_id = job.job_id,
                    outputs = outputs.len(),
                    bytes = outputs.iter().map(|m| m.file_size).sum::<u64>(),
                    "completed compaction"
                );
                Ok(outputs)
            }
            Err(e) => {
                warn!(job_id = job.job_id, "failed compaction: {e}");
                Err(e)
            }
        }
    }

    fn execute_compaction(
        &self,
        job: &CompactionJob,
        ctx: &mut CompactionContext<'_>,
    ) -> Result<Vec<SstableMetadata>> {
        let mut all_entries = Vec::new();
        for file in job.all_input_files() {
            all_entries.extend(file.reader()?.entries(ctx.read_options)?);
        }
        all_entries.sort_by(|a, b| ctx.icmp.compare(&a.key, &b.key));

        let version = ctx.version;
        let inputs: Vec<u64> = job.all_input_files().map(|f| f.file_number()).collect();
        let merged = merge_entries(all_entries, ctx.icmp, ctx.smallest_snapshot, |user_key| {
            !version.may_exist_outside(&inputs, user_key)
        });
        debug!(
            job_id = job.job_id,
            entries = merged.len(),
            "merged compaction inputs"
        );

        self.create_output_files(&merged, ctx)
    }

    /// Splits merged entries into tables of roughly `target_file_size_base`,
    /// never splitting the versions of one user key across two tables.
    fn create_output_files(
        &self,
        entries: &[Entry],
        ctx: &mut CompactionContext<'_>,
    ) -> Result<Vec<SstableMetadata>> {
        let target_size = self.options.target_file_size_base.as_bytes();
        let mut outputs = Vec::new();
        let mut builder: Option<TableBuilder> = None;
        let mut last_user_key: Option<&Bytes> = None;

        let result = (|| -> Result<()> {
            for entry in entries {
                let new_user_key = last_user_key.is_none_or(|k| {
                    ctx.icmp.compare_user(k, &entry.key.user_key) != Ordering::Equal
                });
                if new_user_key && builder.as_ref().is_some_and(|b| b.file_size() >= target_size) {
                    if let Some(full) = builder.take() {
                        outputs.push(full.finish()?);
                    }
                }
                if builder.is_none() {
                    let file_number = *ctx.next_file_number;
                    *ctx.next_file_number += 1;
                    builder = Some(TableBuilder::create(
                        ctx.dir,
                        file_number,
                        ctx.icmp.clone(),
                        ctx.table_options,
                    )?);
                }
                if let Some(current) = builder.as_mut() {
                    current.add(entry)?;
                }
                last_user_key = Some(&entry.key.user_key);
            }
            if let Some(last) = builder.take() {
                outputs.push(last.finish()?);
            }
            Ok(())
        })();

        if let Err(e) = result {
            if let Some(partial) = builder.take() {
                let _ = partial.abandon();
            }
            for meta in &outputs {
                let _ = std::fs::remove_file(table_file_path(ctx.dir, meta.file_number));
            }
            return Err(e);
        }
        Ok(outputs)
    }

    /// Returns compaction statistics
    pub(crate) fn stats(&self, version: &Version) -> CompactionStats {
        let level_stats = (0..version.num_levels())
            .map(|level| LevelStats {
                level,
                file_count: version.files(level).len(),
                total_size: version.level_size(level),
                size_limit: self.level_size_limit(level),
                needs_compaction: self.level_needs_compaction(version, level),
            })
            .collect();

        CompactionStats {
            level_stats,
            completed_jobs: self.completed_jobs,
        }
    }
}

/// Drops versions no reader can observe from `entries`, which must be sorted
/// by internal key.
///
/// An entry goes when a newer version of its key is already at or below
/// `smallest_snapshot`. A tombstone at or below `smallest_snapshot` also goes
/// when `is_bottommost` says no file outside the compaction may hold its key.
fn merge_entries(
    entries: Vec<Entry>,
    icmp: &InternalKeyComparator,
    smallest_snapshot: SeqNo,
    is_bottommost: impl Fn(&[u8]) -> bool,
) -> Vec<Entry> {
    let mut result: Vec<Entry> = Vec::with_capacity(entries.len());
    let mut current_key: Option<Bytes> = None;
    let mut last_sequence_for_key: Option<SeqNo> = None;
    let mut last_seen: Option<InternalKey> = None;

    for entry in entries {
        if last_seen
            .as_ref()
            .is_some_and(|k| icmp.compare(k, &entry.key) == Ordering::Equal)
        {
            continue;
        }
        last_seen = Some(entry.key.clone());

        let same_key = current_key
            .as_ref()
            .is_some_and(|k| icmp.compare_user(k, &entry.key.user_key) == Ordering::Equal);
        if !same_key {
            current_key = Some(entry.key.user_key.clone());
            last_sequence_for_key = None;
        }

        let shadowed = last_sequence_for_key.is_some_and(|seq| seq <= smallest_snapshot);
        let dead_tombstone = entry.key.is_tombstone()
            && entry.key.seqno <= smallest_snapshot
            && is_bottommost(&entry.key.user_key);
        last_sequence_for_key = Some(entry.key.seqno);

        if !shadowed && !dead_tombstone {
            result.push(entry);
        }
    }

    result
}

/// Statistics about current compaction state
#[derive(Debug, Clone)]
pub struct CompactionStats {
    /// Statistics for each level
    pub level_stats:    Vec<LevelStats>,
    /// Number of compaction jobs finished since open
    pub completed_jobs: u64,
}

/// Statistics for a single level
#[derive(Debug, Clone)]
pub struct LevelStats {
    /// Level number (0 = L0, 1 = L1, etc.)
    pub level:            usize,
    /// Number of files in this level
    pub file_count:       usize,
    /// Total size of all files in bytes
    pub total_size:       u64,
    /// Size limit for this level
    pub size_limit:       u64,
    /// Whether this level needs compaction
    pub needs_compaction: bool,
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use test_case::test_case;

    use super::*;
    use crate::{
        comparator::default_comparator,
        format::ValueType,
        options::Compression,
        sst::cache::{BlockCache, TableCache},
    };

    fn icmp() -> InternalKeyComparator { InternalKeyComparator::new(default_comparator()) }

    fn create_test_entry(key: &str, value: &str, seqno: u64) -> Entry {
        Entry::new(
            InternalKey::new(key.as_bytes().to_vec(), seqno, ValueType::Value),
            Bytes::copy_from_slice(value.as_bytes()),
        )
    }

    fn create_test_tombstone(key: &str, seqno: u64) -> Entry {
        Entry::new(
            InternalKey::new(key.as_bytes().to_vec(), seqno, ValueType::Tombstone),
            Bytes::new(),
        )
    }

    fn create_test_metadata(
        file_number: u64,
        smallest_key: &str,
        largest_key: &str,
        file_size: u64,
    ) -> SstableMetadata {
        SstableMetadata {
            file_number,
            file_size,
            smallest_key: InternalKey::new(smallest_key.as_bytes().to_vec(), 1, ValueType::Value),
            largest_key: InternalKey::new(largest_key.as_bytes().to_vec(), 1, ValueType::Value),
            entry_count: 100,
        }
    }

    struct Fixture {
        dir:   TempDir,
        cache: Arc<TableCache>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let cache = Arc::new(TableCache::new(
                dir.path(),
                icmp(),
                Arc::new(BlockCache::new(0)),
                16,
            ));
            Self { dir, cache }
        }

        fn handle(&self, meta: SstableMetadata) -> Arc<TableHandle> {
            Arc::new(TableHandle::new(meta, self.dir.path(), self.cache.clone()))
        }

        fn version(&self, files: Vec<(usize, SstableMetadata)>) -> Version {
            Version::new(DEFAULT_MAX_LEVELS, icmp()).apply(
                files
                    .into_iter()
                    .map(|(level, meta)| (level, self.handle(meta))),
                &[],
            )
        }

        fn write_table(&self, file_number: u64, entries: &[Entry]) -> SstableMetadata {
            let options = TableOptions {
                block_size:       256,
                restart_interval: 4,
                compression:      Compression::None,
                bloom_bits:       0,
            };
            let mut builder =
                TableBuilder::create(self.dir.path(), file_number, icmp(), options).unwrap();
            for entry in entries {
                builder.add(entry).unwrap();
            }
            builder.finish().unwrap()
        }
    }

    fn options_with_trigger(trigger: usize) -> CompactionOptions {
        CompactionOptions {
            l0_compaction_trigger: trigger,
            ..CompactionOptions::default()
        }
    }

    #[test]
    fn test_compaction_options_default() {
        let options = CompactionOptions::default();
        assert_eq!(options.l0_compaction_trigger, DEFAULT_L0_COMPACTION_TRIGGER);
        assert_eq!(options.max_levels, DEFAULT_MAX_LEVELS);
        options.validate().unwrap();
    }

    #[test_case(CompactionOptions { max_levels: 1, ..Default::default() }; "single level")]
    #[test_case(CompactionOptions { l0_compaction_trigger: 0, ..Default::default() }; "zero trigger")]
    #[test_case(CompactionOptions { target_file_size_base: ReadableSize(0), ..Default::default() }; "zero file size")]
    fn test_compaction_options_rejected(options: CompactionOptions) {
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_stats_of_empty_version() {
        let fixture = Fixture::new();
        let manager = CompactionManager::new(CompactionOptions::default());

        let stats = manager.stats(&fixture.version(vec![]));
        assert_eq!(stats.level_stats.len(), DEFAULT_MAX_LEVELS);
        assert_eq!(stats.completed_jobs, 0);

        for (i, level_stat) in stats.level_stats.iter().enumerate() {
            assert_eq!(level_stat.level, i);
            assert_eq!(level_stat.file_count, 0);
            assert_eq!(level_stat.total_size, 0);
            assert!(!level_stat.needs_compaction);
        }
    }

    #[test]
    fn test_l0_compaction_trigger() {
        let fixture = Fixture::new();
        let mut manager = CompactionManager::new(options_with_trigger(2));

        let one = fixture.version(vec![(0, create_test_metadata(1, "a", "d", 1000))]);
        assert!(manager.pick_compaction(&one).is_none());

        let two = fixture.version(vec![
            (0, create_test_metadata(1, "a", "d", 1000)),
            (0, create_test_metadata(2, "e", "h", 1000)),
            (1, create_test_metadata(3, "c", "f", 1000)),
            (1, create_test_metadata(4, "x", "z", 1000)),
        ]);
        let job = manager.pick_compaction(&two).unwrap();
        assert_eq!(job.input_level, 0);
        assert_eq!(job.output_level, 1);
        assert_eq!(job.input_files.len(), 2);
        assert_eq!(job.output_files.len(), 1);
        assert_eq!(job.output_files[0].file_number(), 3);
        assert_eq!(job.reason, CompactionReason::L0TooManyFiles);
        assert_eq!(job.deletions(), vec![(0, 1), (0, 2), (1, 3)]);
    }

    #[test]
    fn test_l0_pick_takes_oldest_prefix() {
        let fixture = Fixture::new();
        let mut manager = CompactionManager::new(CompactionOptions {
            l0_compaction_trigger: 2,
            max_compaction_bytes: ReadableSize(2500),
            ..CompactionOptions::default()
        });
        let version = fixture.version(vec![
            (0, create_test_metadata(7, "a", "b", 1000)),
            (0, create_test_metadata(3, "a", "b", 1000)),
            (0, create_test_metadata(5, "a", "b", 1000)),
        ]);

        let job = manager.pick_compaction(&version).unwrap();
        let inputs: Vec<_> = job.input_files.iter().map(|f| f.file_number()).collect();
        assert_eq!(inputs, vec![3, 5]);
    }

    #[test]
    fn test_level_size_limits() {
        let manager = CompactionManager::new(CompactionOptions::default());

        assert_eq!(manager.level_size_limit(0), u64::MAX); // L0 unlimited by size
        assert_eq!(
            manager.level_size_limit(1),
            DEFAULT_MAX_BYTES_FOR_LEVEL_BASE.as_bytes()
        );
        assert_eq!(
            manager.level_size_limit(2),
            DEFAULT_MAX_BYTES_FOR_LEVEL_BASE.as_bytes() * DEFAULT_LEVEL_SIZE_MULTIPLIER
        );
        assert_eq!(manager.level_size_limit(60), u64::MAX);
    }

    #[test]
    fn test_level_compaction_rotates() {
        let fixture = Fixture::new();
        let mut manager = CompactionManager::new(CompactionOptions {
            max_bytes_for_level_base: ReadableSize(1500),
            ..CompactionOptions::default()
        });
        let version = fixture.version(vec![
            (1, create_test_metadata(1, "a", "d", 1000)),
            (1, create_test_metadata(2, "e", "h", 1000)),
        ]);

        let job = manager.pick_compaction(&version).unwrap();
        assert_eq!(job.reason, CompactionReason::LevelSizeExceeded { level: 1 });
        assert_eq!(job.input_files[0].file_number(), 1);

        manager.compact_pointers[1] = Some(job.input_files[0].meta.largest_key.clone());
        let next = manager.pick_compaction(&version).unwrap();
        assert_eq!(next.input_files[0].file_number(), 2);
    }

    #[test]
    fn test_find_overlapping_files() {
        let fixture = Fixture::new();
        let manager = CompactionManager::new(CompactionOptions::default());
        let version = fixture.version(vec![
            (1, create_test_metadata(1, "a", "d", 1000)),
            (1, create_test_metadata(2, "e", "h", 1000)),
            (1, create_test_metadata(3, "i", "l", 1000)),
        ]);

        let input_files = vec![fixture.handle(create_test_metadata(4, "c", "f", 1000))];
        let overlapping = manager.find_overlapping_files(&version, 1, &input_files);

        assert_eq!(overlapping.len(), 2);
        assert!(overlapping.iter().any(|f| f.file_number() == 1));
        assert!(overlapping.iter().any(|f| f.file_number() == 2));
        assert!(!overlapping.iter().any(|f| f.file_number() == 3));
    }

    #[test]
    fn test_range_compaction_takes_all_of_l0() {
        let fixture = Fixture::new();
        let mut manager = CompactionManager::new(CompactionOptions::default());
        let version = fixture.version(vec![
            (0, create_test_metadata(1, "a", "c", 10)),
            (0, create_test_metadata(2, "x", "z", 10)),
            (1, create_test_metadata(3, "y", "y", 10)),
        ]);

        let job = manager
            .pick_range_compaction(&version, 0, Some(&b"a"[..]), Some(&b"b"[..]))
            .unwrap();
        assert_eq!(job.input_files.len(), 2);
        assert_eq!(job.output_files.len(), 1);
        assert_eq!(job.reason, CompactionReason::Manual);

        assert!(
            manager
                .pick_range_compaction(&version, 1, Some(&b"a"[..]), Some(&b"b"[..]))
                .is_none()
        );
    }

    #[test]
    fn test_compaction_job_creation() {
        let fixture = Fixture::new();
        let input_files = vec![
            fixture.handle(create_test_metadata(1, "a", "d", 1000)),
            fixture.handle(create_test_metadata(2, "e", "h", 1500)),
        ];
        let output_files = vec![fixture.handle(create_test_metadata(3, "c", "f", 2000))];

        let job = CompactionJob::new(
            1,
            0,
            1,
            input_files,
            output_files,
            CompactionReason::L0TooManyFiles,
        );

        assert_eq!(job.job_id, 1);
        assert_eq!(job.estimated_size, 1000 + 1500 + 2000);
        assert_eq!(job.all_input_files().count(), 3);
    }

    #[test]
    fn test_merge_entries_deduplication() {
        let entries = vec![
            create_test_entry("key1", "new_value", 2),
            create_test_entry("key1", "old_value", 1),
            create_test_entry("key2", "value2", 1),
        ];

        let merged = merge_entries(entries, &icmp(), 10, |_| true);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].key.user_key.as_ref(), b"key1");
        assert_eq!(merged[0].value.as_ref(), b"new_value");
        assert_eq!(merged[0].key.seqno, 2);
        assert_eq!(merged[1].key.user_key.as_ref(), b"key2");
    }

    #[test]
    fn test_merge_entries_tombstones() {
        let entries = vec![
            create_test_tombstone("key1", 2),
            create_test_entry("key1", "value1", 1),
            create_test_entry("key2", "value2", 1),
        ];

        let merged = merge_entries(entries.clone(), &icmp(), 10, |_| true);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].key.user_key.as_ref(), b"key2");

        // A deeper level may still hold key1, so its tombstone must stay.
        let merged = merge_entries(entries, &icmp(), 10, |_| false);
        assert_eq!(merged.len(), 2);
        assert!(merged[0].key.is_tombstone());
    }

    #[test]
    fn test_merge_entries_keeps_snapshot_versions() {
        let entries = vec![
            create_test_entry("k", "v3", 30),
            create_test_entry("k", "v2", 20),
            create_test_entry("k", "v1", 10),
        ];

        // A snapshot at 25 still sees v2; v1 is hidden behind v2.
        let merged = merge_entries(entries, &icmp(), 25, |_| true);
        let seqnos: Vec<_> = merged.iter().map(|e| e.key.seqno).collect();
        assert_eq!(seqnos, vec![30, 20]);
    }

    #[test]
    fn test_merge_entries_drops_exact_duplicates() {
        let entries = vec![
            create_test_entry("k", "v", 5),
            create_test_entry("k", "v", 5),
        ];
        assert_eq!(merge_entries(entries, &icmp(), 0, |_| true).len(), 1);
    }

    #[test]
    fn test_compact_writes_merged_tables() {
        let fixture = Fixture::new();
        let older = fixture.write_table(1, &[
            create_test_entry("a", "1", 1),
            create_test_entry("b", "1", 2),
            create_test_entry("c", "1", 3),
        ]);
        let newer = fixture.write_table(2, &[
            create_test_entry("a", "2", 4),
            create_test_tombstone("b", 5),
        ]);
        let version = fixture.version(vec![(0, older), (0, newer)]);

        let mut manager = CompactionManager::new(options_with_trigger(2));
        let job = manager.pick_compaction(&version).unwrap();
        let mut next_file_number = 10;
        let mut ctx = CompactionContext {
            dir:               fixture.dir.path(),
            icmp:              &icmp(),
            table_options:     TableOptions {
                block_size:       4096,
                restart_interval: 16,
                compression:      Compression::None,
                bloom_bits:       0,
            },
            read_options:      ReadOptions::default(),
            smallest_snapshot: 5,
            version:           &version,
            next_file_number:  &mut next_file_number,
        };

        let outputs = manager.compact(&job, &mut ctx).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].file_number, 10);
        assert_eq!(next_file_number, 11);
        assert_eq!(manager.stats(&version).completed_jobs, 1);

        let merged = fixture.cache.get(10).unwrap().entries(ReadOptions::default()).unwrap();
        let keys: Vec<_> = merged
            .iter()
            .map(|e| (e.key.user_key.clone(), e.value.clone()))
            .collect();
        assert_eq!(
            keys,
            vec![
                (Bytes::from_static(b"a"), Bytes::from_static(b"2")),
                (Bytes::from_static(b"c"), Bytes::from_static(b"1")),
            ]
        );
    }

    #[test]
    fn test_outputs_split_on_user_key_boundaries() {
        let fixture = Fixture::new();
        let mut entries = Vec::new();
        for i in 0..200u64 {
            let key = format!("key{i:04}");
            entries.push(create_test_entry(&key, &"x".repeat(64), 1000 + i));
            entries.push(create_test_entry(&key, &"y".repeat(64), 1 + i));
        }
        let input = fixture.write_table(1, &entries);
        let version = fixture.version(vec![(1, input)]);

        let mut manager = CompactionManager::new(CompactionOptions {
            target_file_size_base: ReadableSize(1024),
            ..CompactionOptions::default()
        });
        let job = manager
            .pick_range_compaction(&version, 1, None, None)
            .unwrap();
        let mut next_file_number = 2;
        let mut ctx = CompactionContext {
            dir:               fixture.dir.path(),
            icmp:              &icmp(),
            table_options:     TableOptions {
                block_size:       256,
                restart_interval: 4,
                compression:      Compression::None,
                bloom_bits:       0,
            },
            read_options:      ReadOptions::default(),
            // Keep every version alive so each key carries two entries.
            smallest_snapshot: 0,
            version:           &version,
            next_file_number:  &mut next_file_number,
        };

        let outputs = manager.compact(&job, &mut ctx).unwrap();
        assert!(outputs.len() > 1);
        assert_eq!(outputs.iter().map(|m| m.entry_count).sum::<u64>(), 400);
        for pair in outputs.windows(2) {
            assert_ne!(pair[0].largest_key.user_key, pair[1].smallest_key.user_key);
        }
    }
}
