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

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;

use crate::{
    db::DB,
    err::Result,
    format::{Codec, Entry, InternalKey, SeqNo, UserValue, ValueType},
    options::WriteOptions,
};

/// `WriteBatch` holds a collection of updates to apply atomically to a DB.
///
/// ```text
/// The serialized format:
///
///  +---------------------+
///  | sequence number (8) |  the sequence number of the first operation
///  +---------------------+
///  | count (4)           |  number of operations
///  +---------------------+
///  | entries...          |  variable length Entry records
///  +---------------------+
/// ```
///
/// The updates are applied in the order in which they are added to the
/// `WriteBatch`: operation `i` receives sequence number `sequence + i`, so a
/// put followed by a delete of the same key leaves the key deleted.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    /// Sequence number of the first operation, assigned on write
    sequence: SeqNo,
    values:   Vec<Entry>,
}

pub const HEADER_SIZE: usize = 12; // 8 bytes seq + 4 bytes count

impl WriteBatch {
    pub fn new() -> Self { Self::default() }

    /// Adds a Put operation to the batch
    pub fn put(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) {
        self.push(
            key.as_ref(),
            ValueType::Value,
            Bytes::copy_from_slice(value.as_ref()),
        );
    }

    /// Adds a Delete operation to the batch
    pub fn delete(&mut self, key: impl AsRef<[u8]>) {
        self.push(key.as_ref(), ValueType::Tombstone, UserValue::new());
    }

    fn push(&mut self, key: &[u8], value_type: ValueType, value: UserValue) {
        let seqno = self.sequence + self.values.len() as SeqNo;
        let key = InternalKey::new(Bytes::copy_from_slice(key), seqno, value_type);
        self.values.push(Entry::new(key, value));
    }

    /// Returns the number of operations in this batch
    pub fn count(&self) -> u32 { self.values.len() as u32 }

    pub fn len(&self) -> usize { self.values.len() }

    /// Returns true if the batch is empty
    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    /// Discards all operations without touching the store.
    pub fn clear(&mut self) {
        self.values.clear();
        self.sequence = 0;
    }

    /// Sequence number of the first operation. Zero until the batch has been
    /// written.
    pub fn sequence(&self) -> SeqNo { self.sequence }

    pub(crate) fn approximate_size(&self) -> usize {
        HEADER_SIZE
            + self
                .values
                .iter()
                .map(|value| value.size() as usize)
                .sum::<usize>()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Entry> { self.values.iter() }

    /// Stamps operations with consecutive sequence numbers starting at
    /// `base`.
    pub(crate) fn assign_sequence(&mut self, base: SeqNo) {
        self.sequence = base;
        for (i, value) in self.values.iter_mut().enumerate() {
            value.key.seqno = base + i as SeqNo;
        }
    }

    /// Sequence number of the last operation.
    pub(crate) fn last_sequence(&self) -> SeqNo {
        (self.sequence + self.values.len() as SeqNo).saturating_sub(1)
    }
}

impl Codec for WriteBatch {
    fn encode_into<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u64::<LittleEndian>(self.sequence)?;
        writer.write_u32::<LittleEndian>(self.count())?;
        for value in &self.values {
            value.encode_into(writer)?;
        }
        Ok(())
    }

    fn decode_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let sequence = reader.read_u64::<LittleEndian>()?;
        let count = reader.read_u32::<LittleEndian>()?;

        let mut values = Vec::with_capacity((count as usize).min(1024));
        for _ in 0..count {
            values.push(Entry::decode_from(reader)?);
        }
        Ok(Self { sequence, values })
    }
}

/// A [`WriteBatch`] bound to a store and a set of write options.
///
/// Obtained from [`DB::write_batch`]; [`Batch::write`] applies the pending
/// operations atomically and leaves the batch empty for reuse.
pub struct Batch<'a> {
    db:      &'a DB,
    options: WriteOptions,
    inner:   WriteBatch,
}

impl<'a> Batch<'a> {
    pub(crate) fn new(db: &'a DB, options: WriteOptions) -> Self {
        Self {
            db,
            options,
            inner: WriteBatch::new(),
        }
    }

    pub fn put(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> &mut Self {
        self.inner.put(key, value);
        self
    }

    pub fn delete(&mut self, key: impl AsRef<[u8]>) -> &mut Self {
        self.inner.delete(key);
        self
    }

    pub fn clear(&mut self) { self.inner.clear(); }

    pub fn len(&self) -> usize { self.inner.len() }

    pub fn is_empty(&self) -> bool { self.inner.is_empty() }

    /// Writes the pending operations with the options the batch was created
    /// with.
    pub fn write(&mut self) -> Result<()> {
        let options = self.options;
        self.write_with(options)
    }

    /// Writes the pending operations, overriding the batch's options.
    pub fn write_with(&mut self, options: WriteOptions) -> Result<()> {
        self.db.write_with(options, &self.inner)?;
        self.inner.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_batch_basic() {
        let mut batch = WriteBatch::new();
        batch.put(b"key1", b"value1");
        batch.put("key2", "value2");
        batch.delete(b"key3");

        assert!(!batch.is_empty());
        assert_eq!(batch.count(), 3);
        assert_eq!(batch.sequence(), 0);

        let types: Vec<_> = batch.iter().map(|e| e.key.value_type).collect();
        assert_eq!(types, vec![
            ValueType::Value,
            ValueType::Value,
            ValueType::Tombstone
        ]);
    }

    #[test]
    fn test_assign_sequence() {
        let mut batch = WriteBatch::new();
        batch.put(b"a", b"1");
        batch.delete(b"a");
        batch.put(b"b", b"2");
        batch.assign_sequence(100);

        let seqnos: Vec<_> = batch.iter().map(|e| e.key.seqno).collect();
        assert_eq!(seqnos, vec![100, 101, 102]);
        assert_eq!(batch.sequence(), 100);
        assert_eq!(batch.last_sequence(), 102);
    }

    #[test]
    fn test_clear_discards_operations() {
        let mut batch = WriteBatch::new();
        batch.put(b"a", b"1");
        batch.assign_sequence(7);
        batch.clear();
        assert!(batch.is_empty());
        assert_eq!(batch.sequence(), 0);
        assert_eq!(batch.approximate_size(), HEADER_SIZE);
    }

    #[test]
    fn test_write_batch_encode_decode() {
        let mut batch = WriteBatch::new();
        batch.put(b"hello", b"wor\0ld");
        batch.delete(b"goodbye");
        batch.assign_sequence(42);

        let encoded = batch.encode_into_vec().unwrap();
        let decoded = WriteBatch::decode_from(&mut encoded.as_slice()).unwrap();

        assert_eq!(decoded.sequence(), 42);
        let original: Vec<_> = batch.iter().cloned().collect();
        let restored: Vec<_> = decoded.iter().cloned().collect();
        assert_eq!(original, restored);
    }

    #[test]
    fn test_decode_truncated_batch() {
        let mut batch = WriteBatch::new();
        batch.put(b"k", b"v");
        let encoded = batch.encode_into_vec().unwrap();
        let truncated = &encoded[..encoded.len() - 1];
        assert!(WriteBatch::decode_from(&mut &truncated[..]).is_err());
    }
}
