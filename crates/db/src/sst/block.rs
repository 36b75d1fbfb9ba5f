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

use std::{cmp::Ordering, io::Cursor};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;

use crate::{
    comparator::InternalKeyComparator,
    format::{BlockHandle, Codec, Entry, IndexEntry, InternalKey},
};

const U32_SIZE: usize = std::mem::size_of::<u32>();

/// Builds a block of sorted key/value pairs with shared-prefix key
/// compression.
///
/// ## Block Layout
///
/// ```text
/// -------------------------------------------------------------------------------------
/// |           Data Section           |            Restart Section           |  Extra  |
/// -------------------------------------------------------------------------------------
/// | Entry #1 | Entry #2 | ... | Entry #N | Restart #1 | ... | Restart #R | num_restarts |
/// -------------------------------------------------------------------------------------
///
/// Entry:
/// | shared (u32) | unshared (u32) | value_len (u32) | key delta | value |
/// ```
///
/// Every `restart_interval` entries the full key is stored (`shared == 0`)
/// and the entry offset is recorded in the restart section.
#[derive(Debug, Clone)]
pub(crate) struct BlockBuilder {
    buffer:           Vec<u8>,
    restarts:         Vec<u32>,
    restart_interval: usize,
    /// Entries written since the last restart point.
    counter:          usize,
    num_entries:      usize,
    last_key:         Vec<u8>,
}

impl BlockBuilder {
    pub(crate) fn new(restart_interval: usize) -> Self {
        Self {
            buffer:           Vec::new(),
            restarts:         vec![0],
            restart_interval: restart_interval.max(1),
            counter:          0,
            num_entries:      0,
            last_key:         Vec::new(),
        }
    }

    /// Appends an entry. Keys must arrive in sorted order; the table builder
    /// enforces that.
    pub(crate) fn add(&mut self, key: &[u8], value: &[u8]) {
        let shared = if self.counter < self.restart_interval {
            self.last_key
                .iter()
                .zip(key)
                .take_while(|(a, b)| a == b)
                .count()
        } else {
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
            0
        };
        let unshared = key.len() - shared;

        // Writes into a Vec cannot fail.
        let _ = self.buffer.write_u32::<LittleEndian>(shared as u32);
        let _ = self.buffer.write_u32::<LittleEndian>(unshared as u32);
        let _ = self.buffer.write_u32::<LittleEndian>(value.len() as u32);
        self.buffer.extend_from_slice(&key[shared..]);
        self.buffer.extend_from_slice(value);

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.counter += 1;
        self.num_entries += 1;
    }

    /// Returns the current number of items in the block.
    pub(crate) fn len(&self) -> usize { self.num_entries }

    /// Returns true if the block is empty.
    pub(crate) fn is_empty(&self) -> bool { self.num_entries == 0 }

    /// Estimates the encoded size of the block if it were finished now.
    pub(crate) fn estimate_size(&self) -> usize {
        self.buffer.len() + self.restarts.len() * U32_SIZE + U32_SIZE
    }

    /// Appends the restart section and returns the encoded block, leaving the
    /// builder empty for reuse.
    pub(crate) fn finish(&mut self) -> Vec<u8> {
        let mut block = std::mem::take(&mut self.buffer);
        for &restart in &self.restarts {
            let _ = block.write_u32::<LittleEndian>(restart);
        }
        let _ = block.write_u32::<LittleEndian>(self.restarts.len() as u32);
        self.clear();
        block
    }

    pub(crate) fn clear(&mut self) {
        self.buffer.clear();
        self.restarts.clear();
        self.restarts.push(0);
        self.counter = 0;
        self.num_entries = 0;
        self.last_key.clear();
    }
}

fn corrupt(message: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, message.to_string())
}

/// Decodes every key/value pair of an encoded block.
fn decode_pairs(data: &[u8]) -> std::io::Result<Vec<(Vec<u8>, Bytes)>> {
    if data.len() < U32_SIZE {
        return Err(corrupt("block too short"));
    }
    let num_restarts = u32::from_le_bytes(
        data[data.len() - U32_SIZE..]
            .try_into()
            .map_err(|_| corrupt("bad restart count"))?,
    ) as usize;
    let restart_section = num_restarts
        .checked_mul(U32_SIZE)
        .and_then(|n| n.checked_add(U32_SIZE))
        .filter(|&n| n <= data.len())
        .ok_or_else(|| corrupt("restart section exceeds block"))?;
    let data_end = data.len() - restart_section;

    let mut restarts = Cursor::new(&data[data_end..data.len() - U32_SIZE]);
    for _ in 0..num_restarts {
        if restarts.read_u32::<LittleEndian>()? as usize > data_end {
            return Err(corrupt("restart point beyond data section"));
        }
    }

    let mut pairs = Vec::new();
    let mut key: Vec<u8> = Vec::new();
    let mut cursor = Cursor::new(&data[..data_end]);
    while (cursor.position() as usize) < data_end {
        let shared = cursor.read_u32::<LittleEndian>()? as usize;
        let unshared = cursor.read_u32::<LittleEndian>()? as usize;
        let value_len = cursor.read_u32::<LittleEndian>()? as usize;
        if shared > key.len() {
            return Err(corrupt("shared prefix longer than previous key"));
        }

        let start = cursor.position() as usize;
        let end = start
            .checked_add(unshared)
            .and_then(|n| n.checked_add(value_len))
            .filter(|&n| n <= data_end)
            .ok_or_else(|| corrupt("entry exceeds block"))?;

        key.truncate(shared);
        key.extend_from_slice(&data[start..start + unshared]);
        let value = Bytes::copy_from_slice(&data[start + unshared..end]);
        pairs.push((key.clone(), value));
        cursor.set_position(end as u64);
    }
    Ok(pairs)
}

/// A decoded data block, shared through the block cache.
#[derive(Debug)]
pub(crate) struct Block {
    entries: Vec<Entry>,
    charge:  usize,
}

impl Block {
    pub(crate) fn decode(data: &[u8]) -> std::io::Result<Self> {
        let entries = decode_pairs(data)?
            .into_iter()
            .map(|(key, value)| Ok(Entry::new(InternalKey::decode_flat(&key)?, value)))
            .collect::<std::io::Result<Vec<_>>>()?;
        let charge = entries.iter().map(|e| e.size() as usize).sum::<usize>()
            + std::mem::size_of::<Self>();
        Ok(Self { entries, charge })
    }

    pub(crate) fn len(&self) -> usize { self.entries.len() }

    pub(crate) fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub(crate) fn entry(&self, index: usize) -> Option<&Entry> { self.entries.get(index) }

    pub(crate) fn entries(&self) -> &[Entry] { &self.entries }

    /// Approximate memory held by the block, used as its cache weight.
    pub(crate) fn charge(&self) -> usize { self.charge }

    /// Index of the first entry not less than `target`, or `len()` when every
    /// entry sorts before it.
    pub(crate) fn seek(&self, icmp: &InternalKeyComparator, target: &InternalKey) -> usize {
        self.entries
            .partition_point(|entry| icmp.compare(&entry.key, target) == Ordering::Less)
    }
}

/// Decodes an index block into its entries.
pub(crate) fn decode_index(data: &[u8]) -> std::io::Result<Vec<IndexEntry>> {
    decode_pairs(data)?
        .into_iter()
        .map(|(key, value)| {
            Ok(IndexEntry {
                key:    InternalKey::decode_flat(&key)?,
                handle: BlockHandle::decode_from(&mut value.as_ref())?,
            })
        })
        .collect()
}
