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

//! Offline maintenance of store directories.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use snafu::{ResultExt, ensure};
use tracing::{info, warn};

use crate::{
    comparator::InternalKeyComparator,
    db::{list_store_files, write_table},
    err::{CorruptionSnafu, Error, IOSnafu, Result, StoreNotFoundSnafu},
    format::{
        FileKind, LOCK_FILE, LOST_DIR, MANIFEST_FILE, MANIFEST_TMP_FILE, log_file_path,
        table_file_path,
    },
    manifest::{Manifest, ManifestState, VersionEdit},
    lock::StoreLock,
    memtable::MemTable,
    options::{Options, ReadOptions},
    sst::{
        cache::BlockCache,
        table::{TableOptions, TableReader},
    },
    version::SstableMetadata,
    wal,
};

/// Rebuilds the manifest of the store at `path` from the files it holds.
///
/// Every table that reads back cleanly is kept, in level 0. Tables that do
/// not, and every log once its readable prefix is saved into a new table,
/// are moved into the `lost` subdirectory rather than deleted.
pub fn repair(path: impl AsRef<Path>, options: &Options) -> Result<()> {
    options.validate()?;
    let icmp = InternalKeyComparator::new(options.resolve_comparator()?);
    let dir = path.as_ref();
    ensure!(dir.is_dir(), StoreNotFoundSnafu { path: dir });
    let _lock = StoreLock::acquire(dir)?;
    info!(path = %dir.display(), "repairing store");

    let previous = ManifestState::recover(dir, false)
        .inspect_err(|e| warn!("ignoring unreadable manifest: {e}"))
        .ok();
    let files = list_store_files(dir)?;
    let mut next_file_number = files
        .iter()
        .map(|(_, number)| number + 1)
        .fold(
            previous.as_ref().map_or(1, |state| state.next_file_number),
            u64::max,
        );
    let mut last_sequence = previous.as_ref().map_or(0, |state| state.last_sequence);
    let mut state = ManifestState::new(icmp.name());

    let mut tables: Vec<u64> = numbers_of(&files, FileKind::Table);
    tables.sort_unstable();
    let block_cache = Arc::new(BlockCache::new(0));
    for number in tables {
        let path = table_file_path(dir, number);
        match salvage_table(&path, number, &icmp, &block_cache) {
            Ok((meta, max_sequence)) => {
                last_sequence = last_sequence.max(max_sequence);
                state.apply(&VersionEdit::AddFile { level: 0, meta });
            }
            Err(e) => {
                warn!(file_number = number, "table is unreadable: {e}");
                move_to_lost(dir, &path)?;
            }
        }
    }

    let table_options = TableOptions::from_options(options, &icmp);
    let mut logs: Vec<u64> = numbers_of(&files, FileKind::Log);
    logs.sort_unstable();
    for number in logs {
        let path = log_file_path(dir, number);
        let mem = MemTable::new(icmp.clone());
        let replayed = wal::replay(&path, false, |batch| {
            for entry in batch.iter() {
                mem.insert(entry.clone());
            }
            last_sequence = last_sequence.max(batch.last_sequence());
            Ok(())
        });
        match replayed {
            Ok(batches) if !mem.is_empty() => {
                let file_number = next_file_number;
                next_file_number += 1;
                let meta = write_table(dir, file_number, &icmp, table_options, mem.iter())?;
                info!(log = number, batches, file_number, "converted log to table");
                state.apply(&VersionEdit::AddFile { level: 0, meta });
            }
            Ok(_) => {}
            Err(e) => warn!(log = number, "log is unreadable: {e}"),
        }
        move_to_lost(dir, &path)?;
    }

    state.apply(&VersionEdit::LogNumber(next_file_number));
    state.apply(&VersionEdit::NextFileNumber(next_file_number));
    state.apply(&VersionEdit::LastSequence(last_sequence));
    Manifest::create(dir, &state)?;
    info!(
        path = %dir.display(),
        tables = state.files.len(),
        last_sequence,
        "repaired store"
    );
    Ok(())
}

fn numbers_of(files: &[(FileKind, u64)], kind: FileKind) -> Vec<u64> {
    files
        .iter()
        .filter(|(k, _)| *k == kind)
        .map(|(_, number)| *number)
        .collect()
}

/// Reads `path` end to end with checksums verified, returning its metadata
/// and the highest sequence number it holds.
fn salvage_table(
    path: &Path,
    file_number: u64,
    icmp: &InternalKeyComparator,
    block_cache: &Arc<BlockCache>,
) -> Result<(SstableMetadata, u64)> {
    let reader = TableReader::open(path, file_number, icmp.clone(), block_cache.clone())?;
    let entries = reader.entries(ReadOptions {
        verify_checksums: true,
        fill_cache:       false,
    })?;
    let (Some(first), Some(last)) = (entries.first(), entries.last()) else {
        return CorruptionSnafu {
            message: format!("{} holds no entries", path.display()),
        }
        .fail();
    };
    let meta = SstableMetadata {
        file_number,
        file_size: fs::metadata(path).context(IOSnafu)?.len(),
        smallest_key: first.key.clone(),
        largest_key: last.key.clone(),
        entry_count: entries.len() as u64,
    };
    let max_sequence = entries.iter().map(|e| e.key.seqno).max().unwrap_or(0);
    Ok((meta, max_sequence))
}

fn move_to_lost(dir: &Path, path: &Path) -> Result<()> {
    let lost = dir.join(LOST_DIR);
    fs::create_dir_all(&lost).context(IOSnafu)?;
    let Some(name) = path.file_name() else {
        return Ok(());
    };
    fs::rename(path, lost.join(name)).context(IOSnafu)
}

/// Removes the store at `path`: its manifest, logs, tables and `lost`
/// directory, then the directory itself if nothing else is left in it.
///
/// A missing path is not an error.
pub fn destroy(path: impl AsRef<Path>) -> Result<()> {
    let dir = path.as_ref();
    let files = match list_store_files(dir) {
        Ok(files) => files,
        Err(Error::IO { source }) if source.kind() == ErrorKind::NotFound => {
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    let lock = StoreLock::acquire(dir)?;
    info!(path = %dir.display(), "destroying store");

    for (kind, number) in files {
        let path: PathBuf = match kind {
            FileKind::Log => log_file_path(dir, number),
            FileKind::Table => table_file_path(dir, number),
            FileKind::Manifest => dir.join(MANIFEST_FILE),
            FileKind::ManifestTmp => dir.join(MANIFEST_TMP_FILE),
            FileKind::Lock => continue,
        };
        fs::remove_file(&path).context(IOSnafu)?;
    }
    fs::remove_file(dir.join(LOCK_FILE)).context(IOSnafu)?;
    match fs::remove_dir_all(dir.join(LOST_DIR)) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e).context(IOSnafu),
    }
    drop(lock);
    match fs::remove_dir(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::DirectoryNotEmpty => {
            warn!(path = %dir.display(), "leaving non-empty directory in place");
            Ok(())
        }
        Err(e) => Err(e).context(IOSnafu),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::db::DB;

    fn options() -> Options { Options::new().create_if_missing(true) }

    #[test]
    fn test_repair_rebuilds_lost_manifest() {
        let dir = TempDir::new().unwrap();
        {
            let db = DB::open(dir.path(), options()).unwrap();
            db.put(b"flushed", b"1").unwrap();
            db.compact_range(None, None).unwrap();
            db.put(b"logged", b"2").unwrap();
        }
        fs::remove_file(dir.path().join(MANIFEST_FILE)).unwrap();

        repair(dir.path(), &options()).unwrap();

        let db = DB::open(dir.path(), Options::new()).unwrap();
        assert_eq!(db.get(b"flushed").unwrap().as_deref(), Some(&b"1"[..]));
        assert_eq!(db.get(b"logged").unwrap().as_deref(), Some(&b"2"[..]));
        db.put(b"after", b"3").unwrap();
        assert_eq!(db.stats().unwrap().last_sequence, 3);
    }

    #[test]
    fn test_repair_moves_corrupt_tables_to_lost() {
        let dir = TempDir::new().unwrap();
        DB::open(dir.path(), options()).unwrap().close().unwrap();
        let bogus = table_file_path(dir.path(), 77);
        fs::write(&bogus, b"definitely not a table").unwrap();

        repair(dir.path(), &options()).unwrap();

        assert!(!bogus.exists());
        assert!(dir.path().join(LOST_DIR).join("000077.sst").exists());
        DB::open(dir.path(), Options::new()).unwrap();
    }

    #[test]
    fn test_repair_missing_directory() {
        let dir = TempDir::new().unwrap();
        let err = repair(dir.path().join("missing"), &options()).unwrap_err();
        assert!(err.is_store_access());
    }

    #[test]
    fn test_destroy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store");
        {
            let db = DB::open(&path, options()).unwrap();
            db.put(b"key", b"value").unwrap();
            db.compact_range(None, None).unwrap();
        }

        destroy(&path).unwrap();
        assert!(!path.exists());
        // A second call finds nothing to remove.
        destroy(&path).unwrap();

        let db = DB::open(&path, options()).unwrap();
        assert_eq!(db.get(b"key").unwrap(), None);
    }

    #[test]
    fn test_destroy_keeps_foreign_files() {
        let dir = TempDir::new().unwrap();
        DB::open(dir.path(), options()).unwrap().close().unwrap();
        fs::write(dir.path().join("notes.txt"), b"mine").unwrap();

        destroy(dir.path()).unwrap();
        assert!(dir.path().join("notes.txt").exists());
        assert!(!dir.path().join(MANIFEST_FILE).exists());
    }
}
