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

//! Append-only record log shared by the write-ahead log and the manifest.
//!
//! ```text
//! | crc32 of payload (u32) | payload length (u32) | payload |
//! ```
//!
//! A record that cannot be read back in full, or whose checksum does not
//! match, marks the end of the usable log: a crash can leave a torn record
//! at the tail. Under `paranoid_checks` such a record is an error instead.

use std::{
    fs::File,
    io::{BufRead, BufReader, ErrorKind, Read, Write},
    path::{Path, PathBuf},
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use snafu::ResultExt;
use tracing::warn;

use crate::{
    batch::WriteBatch,
    err::{CorruptionSnafu, IOSnafu, Result},
    format::Codec,
};

const RECORD_HEADER_SIZE: usize = 8;

/// Appends records to a log file.
///
/// Each record goes to the file in a single write, so nothing of a failed
/// append lingers in a buffer. After any IO error the writer refuses further
/// appends: the failed record may be torn on disk and anything written
/// behind it would be unreachable on replay.
pub(crate) struct LogWriter {
    file:     File,
    poisoned: bool,
}

impl LogWriter {
    /// Creates (or truncates) the log at `path`.
    pub(crate) fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .context(IOSnafu)?;
        Ok(Self::from_file(file))
    }

    /// Opens the log at `path` for appending, creating it if needed.
    pub(crate) fn append(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::options()
            .append(true)
            .create(true)
            .open(path)
            .context(IOSnafu)?;
        Ok(Self::from_file(file))
    }

    pub(crate) fn from_file(file: File) -> Self {
        Self {
            file,
            poisoned: false,
        }
    }

    /// Whether an earlier append or sync failed.
    pub(crate) fn is_poisoned(&self) -> bool { self.poisoned }

    /// Appends one record and hands it to the operating system.
    pub(crate) fn add_record(&mut self, payload: &[u8]) -> Result<()> {
        self.check_usable()?;
        let mut record = Vec::with_capacity(RECORD_HEADER_SIZE + payload.len());
        record
            .write_u32::<LittleEndian>(crc32fast::hash(payload))
            .context(IOSnafu)?;
        record
            .write_u32::<LittleEndian>(payload.len() as u32)
            .context(IOSnafu)?;
        record.extend_from_slice(payload);
        let result = self.file.write_all(&record);
        self.poison_on_error(result)
    }

    /// Forces appended records to stable storage.
    pub(crate) fn sync(&mut self) -> Result<()> {
        self.check_usable()?;
        let result = self.file.sync_data();
        self.poison_on_error(result)
    }

    fn check_usable(&self) -> Result<()> {
        if self.poisoned {
            return Err(std::io::Error::other("log is unusable after an earlier write error"))
                .context(IOSnafu);
        }
        Ok(())
    }

    fn poison_on_error(&mut self, result: std::io::Result<()>) -> Result<()> {
        if let Err(e) = &result {
            warn!("log write failed, refusing further appends: {e}");
            self.poisoned = true;
        }
        result.context(IOSnafu)
    }
}

pub(crate) struct LogReader {
    reader:   BufReader<File>,
    path:     PathBuf,
    paranoid: bool,
    records:  u64,
}

impl LogReader {
    pub(crate) fn open(path: impl AsRef<Path>, paranoid: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).context(IOSnafu)?;
        Ok(Self {
            reader: BufReader::new(file),
            path,
            paranoid,
            records: 0,
        })
    }

    /// Returns the next intact record, or `None` at the end of the usable
    /// log.
    pub(crate) fn read_record(&mut self) -> Result<Option<Vec<u8>>> {
        if self.reader.fill_buf().context(IOSnafu)?.is_empty() {
            return Ok(None);
        }

        let mut header = [0u8; RECORD_HEADER_SIZE];
        if let Err(e) = self.reader.read_exact(&mut header) {
            return self.torn(e);
        }
        let mut cursor = &header[..];
        let expected = cursor.read_u32::<LittleEndian>().context(IOSnafu)?;
        let len = cursor.read_u32::<LittleEndian>().context(IOSnafu)? as usize;

        let mut payload = Vec::new();
        let read = (&mut self.reader)
            .take(len as u64)
            .read_to_end(&mut payload)
            .context(IOSnafu)?;
        if read < len {
            return self.torn(std::io::Error::from(ErrorKind::UnexpectedEof));
        }

        let actual = crc32fast::hash(&payload);
        if actual != expected {
            return self.bad_record(format!(
                "checksum mismatch in record {} of {}: expected {expected:#010x}, got {actual:#010x}",
                self.records,
                self.path.display()
            ));
        }
        self.records += 1;
        Ok(Some(payload))
    }

    fn torn(&mut self, e: std::io::Error) -> Result<Option<Vec<u8>>> {
        if e.kind() != ErrorKind::UnexpectedEof {
            return Err(e).context(IOSnafu);
        }
        self.bad_record(format!(
            "truncated record {} at the end of {}",
            self.records,
            self.path.display()
        ))
    }

    fn bad_record(&mut self, message: String) -> Result<Option<Vec<u8>>> {
        if self.paranoid {
            return CorruptionSnafu { message }.fail();
        }
        warn!("{message}, ignoring the rest of the log");
        Ok(None)
    }
}

/// Replays every batch recorded in the write-ahead log at `path`.
///
/// Returns the number of batches applied.
pub(crate) fn replay(
    path: &Path,
    paranoid: bool,
    mut apply: impl FnMut(WriteBatch) -> Result<()>,
) -> Result<u64> {
    let mut reader = LogReader::open(path, paranoid)?;
    let mut applied = 0;
    while let Some(record) = reader.read_record()? {
        let batch = match WriteBatch::decode_from(&mut record.as_slice()) {
            Ok(batch) => batch,
            Err(e) => {
                let message = format!("undecodable batch in {}: {e}", path.display());
                if paranoid {
                    return CorruptionSnafu { message }.fail();
                }
                warn!("{message}, ignoring the rest of the log");
                break;
            }
        };
        apply(batch)?;
        applied += 1;
    }
    Ok(applied)
}
