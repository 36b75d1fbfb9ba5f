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

//! The manifest records which table files make up the store.
//!
//! It is a log of records, each a list of [`VersionEdit`]s, framed like the
//! write-ahead log. Every open rewrites it as a single snapshot record
//! (written to `MANIFEST.tmp` and renamed into place) and then appends one
//! record per flush or compaction.

use std::{
    collections::BTreeMap,
    fs::File,
    io::{Read, Write},
    path::Path,
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use snafu::ResultExt;
use tracing::debug;

use crate::{
    err::{CorruptionSnafu, IOSnafu, Result},
    format::{Codec, MANIFEST_FILE, MANIFEST_TMP_FILE, SeqNo},
    version::SstableMetadata,
    wal::{LogReader, LogWriter},
};

const TAG_COMPARATOR: u8 = 1;
const TAG_ADD_FILE: u8 = 2;
const TAG_REMOVE_FILE: u8 = 3;
const TAG_LOG_NUMBER: u8 = 4;
const TAG_NEXT_FILE_NUMBER: u8 = 5;
const TAG_LAST_SEQUENCE: u8 = 6;

/// A single change to the persistent state of the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum VersionEdit {
    /// Name of the comparator the store was created with.
    Comparator(String),
    AddFile {
        level: usize,
        meta:  SstableMetadata,
    },
    RemoveFile {
        level:       usize,
        file_number: u64,
    },
    /// Logs numbered below this hold nothing that is not already in a table.
    LogNumber(u64),
    NextFileNumber(u64),
    LastSequence(SeqNo),
}

impl Codec for VersionEdit {
    fn encode_into<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            VersionEdit::Comparator(name) => {
                writer.write_u8(TAG_COMPARATOR)?;
                writer.write_u32::<LittleEndian>(name.len() as u32)?;
                writer.write_all(name.as_bytes())?;
            }
            VersionEdit::AddFile { level, meta } => {
                writer.write_u8(TAG_ADD_FILE)?;
                writer.write_u32::<LittleEndian>(*level as u32)?;
                meta.encode_into(writer)?;
            }
            VersionEdit::RemoveFile { level, file_number } => {
                writer.write_u8(TAG_REMOVE_FILE)?;
                writer.write_u32::<LittleEndian>(*level as u32)?;
                writer.write_u64::<LittleEndian>(*file_number)?;
            }
            VersionEdit::LogNumber(n) => {
                writer.write_u8(TAG_LOG_NUMBER)?;
                writer.write_u64::<LittleEndian>(*n)?;
            }
            VersionEdit::NextFileNumber(n) => {
                writer.write_u8(TAG_NEXT_FILE_NUMBER)?;
                writer.write_u64::<LittleEndian>(*n)?;
            }
            VersionEdit::LastSequence(n) => {
                writer.write_u8(TAG_LAST_SEQUENCE)?;
                writer.write_u64::<LittleEndian>(*n)?;
            }
        }
        Ok(())
    }

    fn decode_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let edit = match reader.read_u8()? {
            TAG_COMPARATOR => {
                let len = reader.read_u32::<LittleEndian>()? as usize;
                let mut name = vec![0u8; len];
                reader.read_exact(&mut name)?;
                let name = String::from_utf8(name).map_err(|e| {
                    std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
                })?;
                VersionEdit::Comparator(name)
            }
            TAG_ADD_FILE => VersionEdit::AddFile {
                level: reader.read_u32::<LittleEndian>()? as usize,
                meta:  SstableMetadata::decode_from(reader)?,
            },
            TAG_REMOVE_FILE => VersionEdit::RemoveFile {
                level:       reader.read_u32::<LittleEndian>()? as usize,
                file_number: reader.read_u64::<LittleEndian>()?,
            },
            TAG_LOG_NUMBER => VersionEdit::LogNumber(reader.read_u64::<LittleEndian>()?),
            TAG_NEXT_FILE_NUMBER => VersionEdit::NextFileNumber(reader.read_u64::<LittleEndian>()?),
            TAG_LAST_SEQUENCE => VersionEdit::LastSequence(reader.read_u64::<LittleEndian>()?),
            tag => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("unknown manifest edit tag {tag}"),
                ));
            }
        };
        Ok(edit)
    }
}

fn encode_record(edits: &[VersionEdit]) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.write_u32::<LittleEndian>(edits.len() as u32)?;
    for edit in edits {
        edit.encode_into(&mut buf)?;
    }
    Ok(buf)
}

fn decode_record(mut data: &[u8]) -> std::io::Result<Vec<VersionEdit>> {
    let count = data.read_u32::<LittleEndian>()?;
    (0..count)
        .map(|_| VersionEdit::decode_from(&mut data))
        .collect()
}

/// Persistent state rebuilt by replaying manifest edits.
#[derive(Debug, Clone, Default)]
pub(crate) struct ManifestState {
    pub comparator:       Option<String>,
    pub log_number:       u64,
    pub next_file_number: u64,
    pub last_sequence:    SeqNo,
    /// Live files keyed by file number, with their level.
    pub files:            BTreeMap<u64, (usize, SstableMetadata)>,
}

impl ManifestState {
    pub(crate) fn new(comparator: impl Into<String>) -> Self {
        Self {
            comparator: Some(comparator.into()),
            next_file_number: 1,
            ..Self::default()
        }
    }

    pub(crate) fn apply(&mut self, edit: &VersionEdit) {
        match edit {
            VersionEdit::Comparator(name) => self.comparator = Some(name.clone()),
            VersionEdit::AddFile { level, meta } => {
                self.next_file_number = self.next_file_number.max(meta.file_number + 1);
                self.files.insert(meta.file_number, (*level, meta.clone()));
            }
            VersionEdit::RemoveFile { file_number, .. } => {
                self.files.remove(file_number);
            }
            VersionEdit::LogNumber(n) => self.log_number = *n,
            VersionEdit::NextFileNumber(n) => {
                self.next_file_number = self.next_file_number.max(*n);
            }
            VersionEdit::LastSequence(n) => self.last_sequence = self.last_sequence.max(*n),
        }
    }

    /// Edits that recreate this state from scratch.
    pub(crate) fn snapshot_edits(&self) -> Vec<VersionEdit> {
        let mut edits = Vec::with_capacity(self.files.len() + 4);
        if let Some(name) = &self.comparator {
            edits.push(VersionEdit::Comparator(name.clone()));
        }
        edits.push(VersionEdit::LogNumber(self.log_number));
        edits.push(VersionEdit::NextFileNumber(self.next_file_number));
        edits.push(VersionEdit::LastSequence(self.last_sequence));
        edits.extend(self.files.values().map(|(level, meta)| VersionEdit::AddFile {
            level: *level,
            meta:  meta.clone(),
        }));
        edits
    }

    /// Replays the manifest in `dir`.
    pub(crate) fn recover(dir: &Path, paranoid: bool) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let mut reader = LogReader::open(&path, paranoid)?;
        let mut state = Self::default();
        let mut records = 0;
        while let Some(record) = reader.read_record()? {
            let edits = decode_record(&record).map_err(|e| {
                CorruptionSnafu {
                    message: format!("undecodable record {records} in {}: {e}", path.display()),
                }
                .build()
            })?;
            for edit in &edits {
                state.apply(edit);
            }
            records += 1;
        }
        if state.comparator.is_none() {
            return CorruptionSnafu {
                message: format!("{} does not name a comparator", path.display()),
            }
            .fail();
        }
        debug!(
            records,
            files = state.files.len(),
            last_sequence = state.last_sequence,
            "recovered manifest"
        );
        Ok(state)
    }
}

/// Whether `dir` holds a store.
pub(crate) fn exists(dir: &Path) -> bool { dir.join(MANIFEST_FILE).is_file() }

pub(crate) struct Manifest {
    writer: LogWriter,
}

impl Manifest {
    /// Replaces the manifest in `dir` with a single snapshot of `state` and
    /// opens it for further edits.
    pub(crate) fn create(dir: &Path, state: &ManifestState) -> Result<Self> {
        let tmp_path = dir.join(MANIFEST_TMP_FILE);
        let path = dir.join(MANIFEST_FILE);
        {
            let mut writer = LogWriter::create(&tmp_path)?;
            let record = encode_record(&state.snapshot_edits()).context(IOSnafu)?;
            writer.add_record(&record)?;
            writer.sync()?;
        }
        std::fs::rename(&tmp_path, &path).context(IOSnafu)?;
        sync_dir(dir);
        Ok(Self {
            writer: LogWriter::append(&path)?,
        })
    }

    /// Durably appends one record holding `edits`.
    pub(crate) fn log_and_apply(&mut self, edits: &[VersionEdit]) -> Result<()> {
        let record = encode_record(edits).context(IOSnafu)?;
        self.writer.add_record(&record)?;
        self.writer.sync()
    }
}

/// Makes a rename in `dir` durable where the platform allows syncing
/// directories.
fn sync_dir(dir: &Path) {
    if let Ok(dir) = File::open(dir) {
        let _ = dir.sync_all();
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use test_case::test_case;

    use super::*;
    use crate::format::{InternalKey, ValueType};

    fn metadata(file_number: u64) -> SstableMetadata {
        SstableMetadata {
            file_number,
            file_size: 1024,
            smallest_key: InternalKey::new(b"a".to_vec(), 1, ValueType::Value),
            largest_key: InternalKey::new(b"z".to_vec(), 2, ValueType::Tombstone),
            entry_count: 10,
        }
    }

    #[test_case(VersionEdit::Comparator("burrow.BytewiseComparator".into()); "comparator")]
    #[test_case(VersionEdit::AddFile { level: 2, meta: metadata(7) }; "add file")]
    #[test_case(VersionEdit::RemoveFile { level: 1, file_number: 9 }; "remove file")]
    #[test_case(VersionEdit::LogNumber(12); "log number")]
    #[test_case(VersionEdit::NextFileNumber(13); "next file number")]
    #[test_case(VersionEdit::LastSequence(99); "last sequence")]
    fn test_edit_codec(edit: VersionEdit) {
        let encoded = edit.encode_into_vec().unwrap();
        assert_eq!(VersionEdit::decode_from(&mut encoded.as_slice()).unwrap(), edit);
    }

    #[test]
    fn test_unknown_tag() {
        assert!(VersionEdit::decode_from(&mut &[42u8][..]).is_err());
    }

    #[test]
    fn test_state_apply() {
        let mut state = ManifestState::new("cmp");
        state.apply(&VersionEdit::AddFile {
            level: 0,
            meta:  metadata(4),
        });
        state.apply(&VersionEdit::AddFile {
            level: 1,
            meta:  metadata(6),
        });
        state.apply(&VersionEdit::RemoveFile {
            level:       0,
            file_number: 4,
        });
        state.apply(&VersionEdit::LastSequence(40));
        state.apply(&VersionEdit::LastSequence(30));

        assert_eq!(state.files.len(), 1);
        assert_eq!(state.files[&6].0, 1);
        assert_eq!(state.next_file_number, 7);
        assert_eq!(state.last_sequence, 40);
    }

    #[test]
    fn test_create_recover_and_append() {
        let dir = TempDir::new().unwrap();
        assert!(!exists(dir.path()));

        let mut state = ManifestState::new("cmp");
        state.log_number = 3;
        state.apply(&VersionEdit::AddFile {
            level: 0,
            meta:  metadata(2),
        });

        let mut manifest = Manifest::create(dir.path(), &state).unwrap();
        assert!(exists(dir.path()));
        assert!(!dir.path().join(MANIFEST_TMP_FILE).exists());

        manifest
            .log_and_apply(&[
                VersionEdit::AddFile {
                    level: 1,
                    meta:  metadata(5),
                },
                VersionEdit::RemoveFile {
                    level:       0,
                    file_number: 2,
                },
                VersionEdit::LastSequence(17),
            ])
            .unwrap();
        drop(manifest);

        let recovered = ManifestState::recover(dir.path(), true).unwrap();
        assert_eq!(recovered.comparator.as_deref(), Some("cmp"));
        assert_eq!(recovered.log_number, 3);
        assert_eq!(recovered.last_sequence, 17);
        assert_eq!(recovered.next_file_number, 6);
        assert_eq!(recovered.files.keys().copied().collect::<Vec<_>>(), vec![5]);
    }

    #[test]
    fn test_recover_requires_comparator() {
        let dir = TempDir::new().unwrap();
        Manifest::create(dir.path(), &ManifestState::default()).unwrap();
        assert!(
            ManifestState::recover(dir.path(), false)
                .unwrap_err()
                .is_corruption()
        );
    }
}
