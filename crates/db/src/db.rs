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
    fmt, fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use snafu::{ResultExt, ensure};
use tracing::{debug, info, warn};

use crate::{
    batch::{Batch, WriteBatch},
    comparator::InternalKeyComparator,
    compaction::{CompactionContext, CompactionJob, CompactionManager, CompactionStats},
    err::{
        ClosedSnafu, ComparatorMismatchSnafu, CorruptionSnafu, Error, IOSnafu, Result,
        StoreExistsSnafu, StoreNotFoundSnafu,
    },
    format::{Codec, Entry, FileKind, SeqNo, log_file_path, parse_file_name, table_file_path},
    iterator::DBIterator,
    lock::StoreLock,
    manifest::{self, Manifest, ManifestState, VersionEdit},
    mem::{MemStats, ReadView},
    memtable::{MemTable, immut::ImmutableMemTables},
    options::{IteratorOptions, Options, ReadOptions, WriteOptions},
    snapshot::{Snapshot, SnapshotList},
    sst::{
        cache::{BlockCache, TableCache},
        table::{TableBuilder, TableOptions},
    },
    version::{SstableMetadata, TableHandle, Version},
    wal::{self, LogWriter},
};

/// Handle to an open store.
///
/// Cloning is cheap and every clone refers to the same store. Writes are
/// serialized internally; reads, snapshots and iterators never wait for
/// them beyond the instant a batch is applied.
///
/// ```no_run
/// use burrow_db::{DB, Options};
///
/// let db = DB::open("/tmp/burrow", Options::new().create_if_missing(true))?;
/// db.put(b"key", b"value")?;
/// assert_eq!(db.get(b"key")?.as_deref(), Some(&b"value"[..]));
/// # Ok::<(), burrow_db::Error>(())
/// ```
#[derive(Clone)]
pub struct DB(Arc<DBInner>);

impl fmt::Debug for DB {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DB")
            .field("path", &self.0.path)
            .field("last_sequence", &self.0.last_sequence())
            .field("closed", &self.0.is_closed())
            .finish()
    }
}

pub(crate) struct DBInner {
    path:          PathBuf,
    options:       Options,
    icmp:          InternalKeyComparator,
    table_options: TableOptions,
    table_cache:   Arc<TableCache>,
    /// Sources readers start from. Only the holder of `write` replaces it.
    view:          RwLock<Arc<ReadView>>,
    write:         Mutex<WriteState>,
    last_sequence: AtomicU64,
    snapshots:     SnapshotList,
    closed:        AtomicBool,
    /// Released by [`DB::close`] or when the last reference goes away.
    store_lock:    Mutex<Option<StoreLock>>,
}

/// State owned by the single writer.
struct WriteState {
    log:              LogWriter,
    manifest:         Manifest,
    next_file_number: u64,
    compaction:       CompactionManager,
}

impl WriteState {
    fn allocate_file_number(&mut self) -> u64 {
        let number = self.next_file_number;
        self.next_file_number += 1;
        number
    }
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    /// Active and sealed memtables
    pub mem:              MemStats,
    /// Sequence number of the last committed write
    pub last_sequence:    SeqNo,
    /// Live snapshots and iterators pinning a sequence number
    pub live_snapshots:   usize,
    pub compaction_stats: CompactionStats,
}

impl DB {
    /// Opens the store at `path`, creating it when `create_if_missing` is
    /// set.
    ///
    /// Options are validated before the filesystem is touched. Logs left by
    /// a previous process are replayed into level-0 tables.
    pub fn open(path: impl AsRef<Path>, options: Options) -> Result<Self> {
        options.validate()?;
        let comparator = options.resolve_comparator()?;
        let path = path.as_ref().to_path_buf();
        info!(path = %path.display(), "opening store");

        if !path.is_dir() {
            ensure!(options.create_if_missing, StoreNotFoundSnafu { path: path.clone() });
            fs::create_dir_all(&path).context(IOSnafu)?;
        }
        let store_lock = StoreLock::acquire(&path)?;
        let exists = manifest::exists(&path);
        if exists {
            ensure!(!options.error_if_exists, StoreExistsSnafu { path: path.clone() });
        } else {
            ensure!(options.create_if_missing, StoreNotFoundSnafu { path: path.clone() });
        }

        let icmp = InternalKeyComparator::new(comparator);
        let mut state = if exists {
            let state = ManifestState::recover(&path, options.paranoid_checks)?;
            let existing = state.comparator.clone().unwrap_or_default();
            ensure!(
                existing == icmp.name(),
                ComparatorMismatchSnafu {
                    existing,
                    requested: icmp.name(),
                }
            );
            state
        } else {
            ManifestState::new(icmp.name())
        };

        let block_cache = Arc::new(BlockCache::new(options.block_cache_size.as_bytes()));
        let table_cache = Arc::new(TableCache::new(
            &path,
            icmp.clone(),
            block_cache,
            options.max_open_files,
        ));
        let table_options = TableOptions::from_options(&options, &icmp);

        let mut files = Vec::with_capacity(state.files.len());
        for (level, meta) in state.files.values() {
            let file = table_file_path(&path, meta.file_number);
            ensure!(
                file.is_file(),
                CorruptionSnafu {
                    message: format!("missing table file {}", file.display()),
                }
            );
            files.push((
                *level,
                Arc::new(TableHandle::new(meta.clone(), &path, table_cache.clone())),
            ));
        }
        let mut version = Version::new(options.compaction.max_levels, icmp.clone()).apply(files, &[]);

        let listing = list_store_files(&path)?;
        let mut next_file_number = listing
            .iter()
            .map(|(_, number)| number + 1)
            .fold(state.next_file_number, u64::max);
        let mut last_sequence = state.last_sequence;

        let mut logs: Vec<u64> = listing
            .iter()
            .filter(|(kind, number)| *kind == FileKind::Log && *number >= state.log_number)
            .map(|(_, number)| *number)
            .collect();
        logs.sort_unstable();
        for number in logs {
            let mem = MemTable::new(icmp.clone());
            let batches = wal::replay(
                &log_file_path(&path, number),
                options.paranoid_checks,
                |batch| {
                    for entry in batch.iter() {
                        mem.insert(entry.clone());
                    }
                    last_sequence = last_sequence.max(batch.last_sequence());
                    Ok(())
                },
            )?;
            info!(log = number, batches, entries = mem.len(), "replayed log");
            if mem.is_empty() {
                continue;
            }
            let file_number = next_file_number;
            next_file_number += 1;
            let meta = write_table(&path, file_number, &icmp, table_options, mem.iter())?;
            let edit = VersionEdit::AddFile {
                level: 0,
                meta:  meta.clone(),
            };
            state.apply(&edit);
            version = version.apply(
                [(0, Arc::new(TableHandle::new(meta, &path, table_cache.clone())))],
                &[],
            );
        }

        let log_number = next_file_number;
        next_file_number += 1;
        let log = LogWriter::create(log_file_path(&path, log_number))?;
        state.apply(&VersionEdit::LogNumber(log_number));
        state.apply(&VersionEdit::NextFileNumber(next_file_number));
        state.apply(&VersionEdit::LastSequence(last_sequence));
        let manifest = Manifest::create(&path, &state)?;

        for (kind, number) in listing {
            let obsolete = match kind {
                FileKind::Log => number < log_number,
                FileKind::Table => !state.files.contains_key(&number),
                FileKind::Manifest | FileKind::ManifestTmp | FileKind::Lock => false,
            };
            if obsolete {
                remove_store_file(&path, kind, number);
            }
        }

        let view = ReadView::new(
            log_number,
            Arc::new(MemTable::new(icmp.clone())),
            ImmutableMemTables::new(),
            Arc::new(version),
        );
        let inner = DBInner {
            path,
            icmp,
            table_options,
            table_cache,
            view: RwLock::new(Arc::new(view)),
            write: Mutex::new(WriteState {
                log,
                manifest,
                next_file_number,
                compaction: CompactionManager::new(options.compaction.clone()),
            }),
            last_sequence: AtomicU64::new(last_sequence),
            snapshots: SnapshotList::new(),
            closed: AtomicBool::new(false),
            store_lock: Mutex::new(Some(store_lock)),
            options,
        };
        {
            let mut state = inner.write.lock();
            inner.maybe_compact(&mut state)?;
        }
        info!(
            path = %inner.path.display(),
            files = state.files.len(),
            last_sequence,
            "opened store"
        );
        Ok(Self(Arc::new(inner)))
    }

    pub fn path(&self) -> &Path { &self.0.path }

    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Bytes>> {
        self.get_with(key, ReadOptions::default())
    }

    /// Returns the latest committed value of `key`.
    pub fn get_with(&self, key: impl AsRef<[u8]>, options: ReadOptions) -> Result<Option<Bytes>> {
        self.0.check_open()?;
        let (view, sequence) = self.0.current();
        view.get(key.as_ref(), sequence, self.0.effective_read_options(options))
    }

    pub fn put(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        self.put_with(key, value, WriteOptions::default())
    }

    pub fn put_with(
        &self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
        options: WriteOptions,
    ) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write_with(options, &batch)
    }

    /// Deletes `key`. Deleting a missing key still records a tombstone.
    pub fn delete(&self, key: impl AsRef<[u8]>) -> Result<()> {
        self.delete_with(key, WriteOptions::default())
    }

    pub fn delete_with(&self, key: impl AsRef<[u8]>, options: WriteOptions) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write_with(options, &batch)
    }

    pub fn write(&self, batch: &WriteBatch) -> Result<()> {
        self.write_with(WriteOptions::default(), batch)
    }

    /// Applies every operation of `batch` atomically.
    pub fn write_with(&self, options: WriteOptions, batch: &WriteBatch) -> Result<()> {
        self.0.apply_batch(options, batch)
    }

    /// Returns an empty [`Batch`] bound to this store.
    pub fn write_batch(&self) -> Batch<'_> { Batch::new(self, WriteOptions::default()) }

    pub fn write_batch_with(&self, options: WriteOptions) -> Batch<'_> { Batch::new(self, options) }

    /// Runs `f` against a fresh batch and writes the batch however `f`
    /// returns. The error of `f`, if any, is returned after the write.
    pub fn batch<T, E, F>(&self, options: WriteOptions, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut WriteBatch) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let mut batch = WriteBatch::new();
        match f(&mut batch) {
            Ok(value) => {
                self.write_with(options, &batch)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(write_error) = self.write_with(options, &batch) {
                    warn!("failed to write batch after its scope failed: {write_error}");
                }
                Err(e)
            }
        }
    }

    /// Runs `f` against a fresh batch and writes the batch only if `f`
    /// succeeds.
    pub fn transaction<T, E, F>(&self, options: WriteOptions, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut WriteBatch) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let mut batch = WriteBatch::new();
        let value = f(&mut batch)?;
        self.write_with(options, &batch)?;
        Ok(value)
    }

    /// Captures the current state of the store.
    pub fn snapshot(&self) -> Result<Snapshot> {
        self.0.check_open()?;
        Ok(Snapshot::new(self.0.clone()))
    }

    /// Iterates over the whole store in key order.
    pub fn iter(&self) -> Result<DBIterator> { self.iterator(IteratorOptions::default()) }

    pub fn iterator(&self, options: IteratorOptions) -> Result<DBIterator> {
        DBIterator::new(self.0.clone(), options, None)
    }

    /// Flushes the memtable and pushes every file overlapping
    /// `[start, stop]` down to the deepest level holding such a file.
    ///
    /// The visible contents of the store, and of every live snapshot, are
    /// unchanged.
    pub fn compact_range(&self, start: Option<&[u8]>, stop: Option<&[u8]>) -> Result<()> {
        self.0.check_open()?;
        let mut state = self.0.write.lock();
        self.0.check_open()?;
        self.0.rotate(&mut state)?;

        let version = self.0.current_view().version.clone();
        let last = (1..version.num_levels())
            .rev()
            .find(|&level| !version.overlapping_files(level, start, stop).is_empty())
            .unwrap_or(1);
        debug!(last_level = last, "compacting range");
        for level in 0..last {
            let version = self.0.current_view().version.clone();
            if let Some(job) = state
                .compaction
                .pick_range_compaction(&version, level, start, stop)
            {
                self.0.run_compaction(&mut state, &version, job)?;
            }
        }
        Ok(())
    }

    /// Estimates the bytes of table data holding keys in `[start, stop)`.
    ///
    /// Data still in memtables is not counted.
    pub fn approximate_size(&self, start: Option<&[u8]>, stop: Option<&[u8]>) -> Result<u64> {
        self.0.check_open()?;
        let version = self.0.current_view().version.clone();
        let mut total = 0;
        for (_, file) in version.all_files() {
            let reader = file.reader()?;
            let begin = start.map_or(0, |key| reader.approximate_offset_of(key));
            let end = stop.map_or_else(
                || reader.data_end(),
                |key| reader.approximate_offset_of(key),
            );
            total += end.saturating_sub(begin);
        }
        Ok(total)
    }

    /// [`approximate_size`](Self::approximate_size) for each range.
    pub fn approximate_sizes(&self, ranges: &[(Option<&[u8]>, Option<&[u8]>)]) -> Result<Vec<u64>> {
        ranges
            .iter()
            .map(|(start, stop)| self.approximate_size(*start, *stop))
            .collect()
    }

    /// Returns database statistics
    pub fn stats(&self) -> Result<DatabaseStats> {
        self.0.check_open()?;
        let view = self.0.current_view();
        let compaction_stats = self.0.write.lock().compaction.stats(&view.version);
        Ok(DatabaseStats {
            mem: view.stats(),
            last_sequence: self.0.last_sequence(),
            live_snapshots: self.0.snapshots.len(),
            compaction_stats,
        })
    }

    /// Flushes the memtable to a table and closes the store.
    ///
    /// Every later operation on the store, including through snapshots and
    /// iterators, fails with [`Error::Closed`]. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        let mut state = self.0.write.lock();
        if self.0.is_closed() {
            return Ok(());
        }
        info!(path = %self.0.path.display(), "closing store");
        self.0.rotate(&mut state)?;
        state.log.sync()?;
        self.0.closed.store(true, Ordering::Release);
        self.0.store_lock.lock().take();
        Ok(())
    }

    pub fn is_closed(&self) -> bool { self.0.is_closed() }
}

impl DBInner {
    pub(crate) fn icmp(&self) -> &InternalKeyComparator { &self.icmp }

    pub(crate) fn snapshots(&self) -> &SnapshotList { &self.snapshots }

    pub(crate) fn is_closed(&self) -> bool { self.closed.load(Ordering::Acquire) }

    fn check_open(&self) -> Result<()> {
        ensure!(!self.is_closed(), ClosedSnafu);
        Ok(())
    }

    fn last_sequence(&self) -> SeqNo { self.last_sequence.load(Ordering::Acquire) }

    fn current_view(&self) -> Arc<ReadView> { self.view.read().clone() }

    fn install(&self, view: ReadView) { *self.view.write() = Arc::new(view); }

    /// The current view and the last sequence number it holds in full.
    fn current(&self) -> (Arc<ReadView>, SeqNo) {
        let view = self.view.read();
        (view.clone(), self.last_sequence())
    }

    /// Pins the last committed sequence number.
    pub(crate) fn pin_latest(&self) -> SeqNo { self.snapshots.acquire_latest(&self.last_sequence) }

    /// Returns the current view together with a pinned sequence number:
    /// `sequence` when given, otherwise the latest one.
    pub(crate) fn pin_view(&self, sequence: Option<SeqNo>) -> (Arc<ReadView>, SeqNo) {
        let view = self.view.read();
        let sequence = match sequence {
            Some(sequence) => {
                self.snapshots.acquire(sequence);
                sequence
            }
            None => self.pin_latest(),
        };
        (view.clone(), sequence)
    }

    pub(crate) fn effective_read_options(&self, options: ReadOptions) -> ReadOptions {
        ReadOptions {
            verify_checksums: options.verify_checksums || self.options.paranoid_checks,
            ..options
        }
    }

    pub(crate) fn get_at(
        &self,
        key: &[u8],
        sequence: SeqNo,
        options: ReadOptions,
    ) -> Result<Option<Bytes>> {
        self.check_open()?;
        self.current_view()
            .get(key, sequence, self.effective_read_options(options))
    }

    fn apply_batch(&self, options: WriteOptions, batch: &WriteBatch) -> Result<()> {
        self.check_open()?;
        if batch.is_empty() {
            return Ok(());
        }
        let mut state = self.write.lock();
        self.check_open()?;
        self.make_room_for_write(&mut state)?;

        let mut batch = batch.clone();
        batch.assign_sequence(self.last_sequence() + 1);
        let record = batch.encode_into_vec().context(IOSnafu)?;
        state.log.add_record(&record)?;
        if options.sync {
            state.log.sync()?;
        }

        let mem = self.current_view().mem.clone();
        for entry in batch.iter() {
            mem.insert(entry.clone());
        }
        self.last_sequence
            .store(batch.last_sequence(), Ordering::Release);
        debug!(
            sequence = batch.sequence(),
            count = batch.count(),
            sync = options.sync,
            "applied batch"
        );
        Ok(())
    }

    /// Rotates before a write when the active memtable is full or its log
    /// refused an earlier append, so the batch lands in a usable log.
    fn make_room_for_write(&self, state: &mut WriteState) -> Result<()> {
        let full = self.current_view().mem.approximate_size()
            >= self.options.write_buffer_size.as_bytes();
        if full || state.log.is_poisoned() {
            self.rotate(state)?;
        }
        Ok(())
    }

    /// Seals the active memtable behind a fresh log and flushes every
    /// sealed memtable.
    fn rotate(&self, state: &mut WriteState) -> Result<()> {
        let current = self.current_view();
        if !current.mem.is_empty() || state.log.is_poisoned() {
            let log_number = state.allocate_file_number();
            state.log = LogWriter::create(log_file_path(&self.path, log_number))?;
            debug!(
                sealed = current.mem_id,
                log = log_number,
                size = current.mem.approximate_size(),
                "rotated memtable"
            );
            self.install(ReadView::new(
                log_number,
                Arc::new(MemTable::new(self.icmp.clone())),
                current.imms.with_added(current.mem_id, current.mem.clone()),
                current.version.clone(),
            ));
        }
        self.flush_immutables(state)
    }

    /// Writes sealed memtables to level-0 tables, oldest first, then runs
    /// whatever compaction the new files call for.
    fn flush_immutables(&self, state: &mut WriteState) -> Result<()> {
        while let Some((id, imm)) = self.current_view().imms.oldest() {
            let mut edits = Vec::with_capacity(4);
            let mut added = Vec::with_capacity(1);
            if !imm.is_empty() {
                let file_number = state.allocate_file_number();
                let meta = write_table(
                    &self.path,
                    file_number,
                    &self.icmp,
                    self.table_options,
                    imm.iter(),
                )?;
                info!(
                    memtable = id,
                    file_number,
                    entries = meta.entry_count,
                    bytes = meta.file_size,
                    "flushed memtable"
                );
                edits.push(VersionEdit::AddFile {
                    level: 0,
                    meta:  meta.clone(),
                });
                added.push((0, Arc::new(self.table_handle(meta))));
            }

            let view = self.current_view();
            let imms = view.imms.without(id);
            let log_number = imms.oldest().map_or(view.mem_id, |(next, _)| next);
            edits.push(VersionEdit::LogNumber(log_number));
            edits.push(VersionEdit::NextFileNumber(state.next_file_number));
            edits.push(VersionEdit::LastSequence(self.last_sequence()));
            state.manifest.log_and_apply(&edits)?;

            let version = Arc::new(view.version.apply(added, &[]));
            self.install(view.with_imms(imms).with_version(version));
            remove_store_file(&self.path, FileKind::Log, id);
        }
        self.maybe_compact(state)
    }

    fn maybe_compact(&self, state: &mut WriteState) -> Result<()> {
        loop {
            let version = self.current_view().version.clone();
            let Some(job) = state.compaction.pick_compaction(&version) else {
                return Ok(());
            };
            self.run_compaction(state, &version, job)?;
        }
    }

    /// Runs `job` against `version`, records the result in the manifest and
    /// installs it.
    fn run_compaction(
        &self,
        state: &mut WriteState,
        version: &Version,
        job: CompactionJob,
    ) -> Result<()> {
        let WriteState {
            manifest,
            next_file_number,
            compaction,
            ..
        } = state;
        let mut ctx = CompactionContext {
            dir: &self.path,
            icmp: &self.icmp,
            table_options: self.table_options,
            read_options: ReadOptions {
                verify_checksums: self.options.paranoid_checks,
                fill_cache:       false,
            },
            smallest_snapshot: self.snapshots.smallest(&self.last_sequence),
            version,
            next_file_number,
        };
        let outputs = compaction.compact(&job, &mut ctx)?;
        let next_file_number = *ctx.next_file_number;

        let deletions = job.deletions();
        let mut edits: Vec<VersionEdit> = deletions
            .iter()
            .map(|&(level, file_number)| VersionEdit::RemoveFile { level, file_number })
            .collect();
        edits.extend(outputs.iter().map(|meta| VersionEdit::AddFile {
            level: job.output_level,
            meta:  meta.clone(),
        }));
        edits.push(VersionEdit::NextFileNumber(next_file_number));
        manifest.log_and_apply(&edits)?;

        for file in job.all_input_files() {
            file.mark_obsolete();
        }
        let added: Vec<_> = outputs
            .into_iter()
            .map(|meta| (job.output_level, Arc::new(self.table_handle(meta))))
            .collect();
        let view = self.current_view();
        self.install(view.with_version(Arc::new(view.version.apply(added, &deletions))));
        Ok(())
    }

    fn table_handle(&self, meta: SstableMetadata) -> TableHandle {
        TableHandle::new(meta, &self.path, self.table_cache.clone())
    }
}

/// Writes `entries`, which must be sorted by internal key, into table
/// `file_number` under `dir`. The file is removed again if writing fails.
pub(crate) fn write_table(
    dir: &Path,
    file_number: u64,
    icmp: &InternalKeyComparator,
    options: TableOptions,
    entries: impl IntoIterator<Item = Entry>,
) -> Result<SstableMetadata> {
    let mut builder = TableBuilder::create(dir, file_number, icmp.clone(), options)?;
    match entries
        .into_iter()
        .try_for_each(|entry| builder.add(&entry))
    {
        Ok(()) => builder.finish(),
        Err(e) => {
            if let Err(abandon_error) = builder.abandon() {
                warn!(file_number, "failed to remove partial table: {abandon_error}");
            }
            Err(e)
        }
    }
}

/// Logs, tables and manifests found in `dir`.
pub(crate) fn list_store_files(dir: &Path) -> Result<Vec<(FileKind, u64)>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).context(IOSnafu)? {
        let entry = entry.context(IOSnafu)?;
        if let Some(parsed) = entry.file_name().to_str().and_then(parse_file_name) {
            files.push(parsed);
        }
    }
    Ok(files)
}

fn remove_store_file(dir: &Path, kind: FileKind, number: u64) {
    let path = match kind {
        FileKind::Log => log_file_path(dir, number),
        FileKind::Table => table_file_path(dir, number),
        FileKind::Manifest | FileKind::ManifestTmp | FileKind::Lock => return,
    };
    match fs::remove_file(&path) {
        Ok(()) => debug!(path = %path.display(), "deleted obsolete file"),
        Err(e) => warn!(path = %path.display(), "failed to delete obsolete file: {e}"),
    }
}
