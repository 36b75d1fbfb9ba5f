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
    io::{Read, Write},
    path::{Path, PathBuf},
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;

pub(crate) const MANIFEST_FILE: &str = "MANIFEST";
pub(crate) const MANIFEST_TMP_FILE: &str = "MANIFEST.tmp";
pub(crate) const LOST_DIR: &str = "lost";
pub(crate) const LOCK_FILE: &str = "LOCK";

/// Trait to serialize stuff
pub trait Codec {
    /// Serializes into writer.
    fn encode_into<W: Write>(&self, writer: &mut W) -> std::io::Result<()>;

    /// Serializes into vector.
    fn encode_into_vec(&self) -> std::io::Result<Vec<u8>> {
        let mut v = vec![];
        self.encode_into(&mut v)?;
        Ok(v)
    }

    /// Deserializes from reader.
    fn decode_from<R: Read>(reader: &mut R) -> std::io::Result<Self>
    where
        Self: Sized;
}

/// Sequence number.
pub type SeqNo = u64;

/// Largest sequence number that fits in a packed key trailer.
pub(crate) const MAX_SEQNO: SeqNo = (1 << 56) - 1;

/// Value type (regular value or tombstone)
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum ValueType {
    /// Deleted value
    Tombstone = 0,

    /// Existing value
    Value = 1,
}

impl TryFrom<u8> for ValueType {
    type Error = std::io::Error;

    fn try_from(value: u8) -> std::io::Result<Self> {
        match value {
            0 => Ok(ValueType::Tombstone),
            1 => Ok(ValueType::Value),
            _ => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid value type: {value}"),
            )),
        }
    }
}

/// A user key tagged with the sequence number of the write that produced it.
///
/// Ordering depends on the user comparator and therefore lives in
/// [`crate::comparator::InternalKeyComparator`] rather than an `Ord` impl.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct InternalKey {
    pub user_key:   Bytes,
    pub seqno:      SeqNo,
    pub value_type: ValueType,
}

impl std::fmt::Debug for InternalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?}:{}:{}",
            String::from_utf8_lossy(&self.user_key),
            self.seqno,
            match self.value_type {
                ValueType::Value => "V",
                ValueType::Tombstone => "T",
            },
        )
    }
}

impl InternalKey {
    pub fn new(user_key: impl Into<Bytes>, seqno: SeqNo, value_type: ValueType) -> Self {
        Self {
            user_key: user_key.into(),
            seqno,
            value_type,
        }
    }

    /// A probe that sorts before every stored version of `user_key` visible
    /// at `seqno`.
    pub(crate) fn lookup(user_key: &[u8], seqno: SeqNo) -> Self {
        Self::new(Bytes::copy_from_slice(user_key), seqno, ValueType::Value)
    }

    pub fn is_tombstone(&self) -> bool { self.value_type == ValueType::Tombstone }

    fn trailer(&self) -> u64 { (self.seqno << 8) | self.value_type as u64 }

    /// Flat form used inside table blocks: the user key followed by an 8 byte
    /// little-endian trailer packing the sequence number and value type.
    pub(crate) fn encode_flat(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.user_key.len() + 8);
        buf.extend_from_slice(&self.user_key);
        buf.extend_from_slice(&self.trailer().to_le_bytes());
        buf
    }

    pub(crate) fn decode_flat(buf: &[u8]) -> std::io::Result<Self> {
        if buf.len() < 8 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "internal key shorter than its trailer",
            ));
        }
        let (user_key, trailer) = buf.split_at(buf.len() - 8);
        let mut trailer_bytes = [0u8; 8];
        trailer_bytes.copy_from_slice(trailer);
        let trailer = u64::from_le_bytes(trailer_bytes);
        Ok(Self {
            user_key:   Bytes::copy_from_slice(user_key),
            seqno:      trailer >> 8,
            value_type: ValueType::try_from((trailer & 0xff) as u8)?,
        })
    }

    /// Returns the serialized size of this InternalKey in bytes.
    /// This includes:
    /// - 4 bytes for key length (u32)
    /// - N bytes for the key itself
    /// - 8 bytes for the packed trailer (u64)
    pub(crate) fn size(&self) -> u64 { 4 + self.user_key.len() as u64 + 8 }
}

impl Codec for InternalKey {
    fn encode_into<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u32::<LittleEndian>(self.user_key.len() as u32)?;
        writer.write_all(&self.user_key)?;
        writer.write_u64::<LittleEndian>(self.trailer())?;
        Ok(())
    }

    fn decode_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let key_len = reader.read_u32::<LittleEndian>()?;
        let mut key = vec![0; key_len as usize];
        reader.read_exact(&mut key)?;
        let trailer = reader.read_u64::<LittleEndian>()?;
        Ok(Self {
            user_key:   Bytes::from(key),
            seqno:      trailer >> 8,
            value_type: ValueType::try_from((trailer & 0xff) as u8)?,
        })
    }
}

/// User defined data (blob of bytes).
pub type UserValue = Bytes;

#[derive(Clone, PartialEq, Eq)]
pub struct Entry {
    /// An internal key.
    pub key:   InternalKey,
    /// User-defined value - an arbitrary byte array
    pub value: UserValue,
}

impl Entry {
    pub(crate) fn new(key: InternalKey, value: UserValue) -> Self { Self { key, value } }

    /// Returns the serialized size of this entry in bytes: the key, 4 bytes
    /// of value length and the value itself.
    pub fn size(&self) -> u64 { self.key.size() + 4 + self.value.len() as u64 }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}:{:?}", self.key, String::from_utf8_lossy(&self.value))
    }
}

impl Codec for Entry {
    fn encode_into<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        self.key.encode_into(writer)?;
        writer.write_u32::<LittleEndian>(self.value.len() as u32)?;
        writer.write_all(&self.value)?;
        Ok(())
    }

    fn decode_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let key = InternalKey::decode_from(reader)?;
        let value_len = reader.read_u32::<LittleEndian>()?;
        let mut value = vec![0; value_len as usize];
        reader.read_exact(&mut value)?;
        Ok(Self {
            key,
            value: Bytes::from(value),
        })
    }
}

/// Location of a block inside a table file.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub(crate) struct BlockHandle {
    pub offset: u64,
    pub size:   u64,
}

impl BlockHandle {
    pub(crate) fn new(offset: u64, size: u64) -> Self { Self { offset, size } }
}

impl Codec for BlockHandle {
    fn encode_into<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u64::<LittleEndian>(self.offset)?;
        writer.write_u64::<LittleEndian>(self.size)?;
        Ok(())
    }

    fn decode_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let offset = reader.read_u64::<LittleEndian>()?;
        let size = reader.read_u64::<LittleEndian>()?;
        Ok(Self { offset, size })
    }
}

/// An entry in an index block that maps the last key of a data block to the
/// block's location.
#[derive(Clone, PartialEq, Eq, Debug)]
pub(crate) struct IndexEntry {
    /// The last key in the data block this entry points to
    pub key:    InternalKey,
    pub handle: BlockHandle,
}

/// Kinds of files kept in a store directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileKind {
    Log,
    Table,
    Manifest,
    ManifestTmp,
    Lock,
}

pub(crate) fn log_file_path(dir: &Path, number: u64) -> PathBuf { dir.join(format!("{number:06}.log")) }

pub(crate) fn table_file_path(dir: &Path, number: u64) -> PathBuf {
    dir.join(format!("{number:06}.sst"))
}

/// Classifies a directory entry name, returning the file number for logs
/// and tables.
pub(crate) fn parse_file_name(name: &str) -> Option<(FileKind, u64)> {
    match name {
        MANIFEST_FILE => return Some((FileKind::Manifest, 0)),
        MANIFEST_TMP_FILE => return Some((FileKind::ManifestTmp, 0)),
        LOCK_FILE => return Some((FileKind::Lock, 0)),
        _ => {}
    }
    let (stem, ext) = name.rsplit_once('.')?;
    let number = stem.parse::<u64>().ok()?;
    match ext {
        "log" => Some((FileKind::Log, number)),
        "sst" => Some((FileKind::Table, number)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn test_flat_key_keeps_trailer() {
        let key = InternalKey::new(&b"a\x00b"[..], 42, ValueType::Tombstone);
        let flat = key.encode_flat();
        assert_eq!(flat.len(), 3 + 8);

        let decoded = InternalKey::decode_flat(&flat).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn test_flat_key_too_short() {
        assert!(InternalKey::decode_flat(b"short").is_err());
    }

    #[test]
    fn test_entry_codec_embedded_nul() {
        let entry = Entry::new(
            InternalKey::new(&b"\x00key\x00"[..], 7, ValueType::Value),
            Bytes::from_static(b"\x00value"),
        );
        let encoded = entry.encode_into_vec().unwrap();
        assert_eq!(encoded.len() as u64, entry.size());

        let decoded = Entry::decode_from(&mut encoded.as_slice()).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_invalid_value_type() {
        assert!(ValueType::try_from(7).is_err());
    }

    #[test_case("MANIFEST", Some((FileKind::Manifest, 0)); "manifest")]
    #[test_case("MANIFEST.tmp", Some((FileKind::ManifestTmp, 0)); "manifest temp")]
    #[test_case("000012.log", Some((FileKind::Log, 12)); "log file")]
    #[test_case("000345.sst", Some((FileKind::Table, 345)); "table file")]
    #[test_case("LOCK", Some((FileKind::Lock, 0)); "lock file")]
    #[test_case("notes.txt", None; "foreign file")]
    #[test_case("abc.sst", None; "non numeric stem")]
    fn test_parse_file_name(name: &str, expected: Option<(FileKind, u64)>) {
        assert_eq!(parse_file_name(name), expected);
    }
}
