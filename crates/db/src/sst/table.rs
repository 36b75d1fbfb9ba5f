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
    borrow::Cow,
    cmp::Ordering,
    fs::File,
    io::{BufWriter, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use crc32fast::Hasher;
use parking_lot::Mutex;
use snafu::{ResultExt, ensure};
use tracing::debug;

use crate::{
    comparator::InternalKeyComparator,
    err::{
        ChecksumMismatchSnafu, CorruptionSnafu, IOSnafu, InvalidArgumentSnafu,
        InvalidSSTFileSnafu, Result,
    },
    format::{BlockHandle, Codec, Entry, IndexEntry, InternalKey, MAX_SEQNO, table_file_path},
    options::{Compression, Options, ReadOptions},
    sst::{
        block::{Block, BlockBuilder, decode_index},
        cache::BlockCache,
        filter::{BloomFilter, FilterBuilder},
    },
    version::SstableMetadata,
};

/// Magic number to identify SSTable files
const SSTABLE_MAGIC: u64 = 0x4255_5252_4f57_5354; // "BURROWST"

/// Compression byte plus CRC32 appended to every data block.
const BLOCK_TRAILER_SIZE: usize = 1 + 4;

/// Table footer containing metadata about the SSTable
#[derive(Debug, Clone)]
pub(crate) struct TableFooter {
    /// Offset to the index block
    pub index_offset:    u64,
    /// Size of the index block in bytes
    pub index_size:      u64,
    /// Offset to the filter block, meaningless when `filter_size` is zero
    pub filter_offset:   u64,
    pub filter_size:     u64,
    /// Total number of entries in the table
    pub entry_count:     u64,
    /// The smallest key in the table
    pub first_key:       Option<InternalKey>,
    /// The largest key in the table
    pub last_key:        Option<InternalKey>,
    /// CRC32 checksum of the index block
    pub index_checksum:  u32,
    /// CRC32 checksum of the filter block
    pub filter_checksum: u32,
    /// Magic number for file format validation
    pub magic:           u64,
}

impl Codec for TableFooter {
    fn encode_into<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u64::<LittleEndian>(self.index_offset)?;
        writer.write_u64::<LittleEndian>(self.index_size)?;
        writer.write_u64::<LittleEndian>(self.filter_offset)?;
        writer.write_u64::<LittleEndian>(self.filter_size)?;
        writer.write_u64::<LittleEndian>(self.entry_count)?;

        for key in [&self.first_key, &self.last_key] {
            match key {
                Some(key) => {
                    writer.write_u8(1)?;
                    key.encode_into(writer)?;
                }
                None => writer.write_u8(0)?,
            }
        }

        writer.write_u32::<LittleEndian>(self.index_checksum)?;
        writer.write_u32::<LittleEndian>(self.filter_checksum)?;
        writer.write_u64::<LittleEndian>(self.magic)?;
        Ok(())
    }

    fn decode_from<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let index_offset = reader.read_u64::<LittleEndian>()?;
        let index_size = reader.read_u64::<LittleEndian>()?;
        let filter_offset = reader.read_u64::<LittleEndian>()?;
        let filter_size = reader.read_u64::<LittleEndian>()?;
        let entry_count = reader.read_u64::<LittleEndian>()?;

        let first_key = if reader.read_u8()? == 1 {
            Some(InternalKey::decode_from(reader)?)
        } else {
            None
        };
        let last_key = if reader.read_u8()? == 1 {
            Some(InternalKey::decode_from(reader)?)
        } else {
            None
        };

        let index_checksum = reader.read_u32::<LittleEndian>()?;
        let filter_checksum = reader.read_u32::<LittleEndian>()?;
        let magic = reader.read_u64::<LittleEndian>()?;

        Ok(Self {
            index_offset,
            index_size,
            filter_offset,
            filter_size,
            entry_count,
            first_key,
            last_key,
            index_checksum,
            filter_checksum,
            magic,
        })
    }
}

impl TableFooter {
    /// Returns the size of the footer when serialized (minimum size, excluding
    /// variable keys)
    pub fn min_footer_size() -> u64 {
        8 * 5 + // offsets, sizes and entry_count
        1 + 1 + // first_key and last_key presence flags
        4 + 4 + 8 // checksums and magic
    }

    /// End of the data section.
    fn data_end(&self) -> u64 {
        if self.filter_size > 0 {
            self.filter_offset
        } else {
            self.index_offset
        }
    }
}

/// Knobs that shape the on-disk layout of a table.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TableOptions {
    pub block_size:       usize,
    pub restart_interval: usize,
    pub compression:      Compression,
    /// Zero disables the filter block.
    pub bloom_bits:       usize,
}

impl TableOptions {
    pub(crate) fn from_options(options: &Options, icmp: &InternalKeyComparator) -> Self {
        Self {
            block_size:       options.block_size.as_bytes() as usize,
            restart_interval: options.block_restart_interval,
            compression:      options.compression,
            // Filters hash raw bytes, which only agrees with equality under
            // the bytewise comparator.
            bloom_bits:       if icmp.is_bytewise() {
                options.bloom_filter_bits
            } else {
                0
            },
        }
    }
}

/// Writes a single SSTable file.
///
/// ## File Layout
///
/// ```text
/// | data block 0 | ... | data block N | filter block | index block | footer | footer size (u32) |
///
/// data block: | payload | compression (u8) | crc32 of payload and compression (u32) |
/// ```
///
/// The index block maps the last key of every data block to its
/// [`BlockHandle`]. The filter block is only present when bloom filters are
/// enabled.
pub(crate) struct TableBuilder {
    file:        BufWriter<File>,
    path:        PathBuf,
    file_number: u64,
    icmp:        InternalKeyComparator,
    options:     TableOptions,
    data_block:  BlockBuilder,
    index_block: BlockBuilder,
    filter:      Option<FilterBuilder>,
    /// The first key added to the table
    first_key:   Option<InternalKey>,
    /// The last key that was added (for ordering validation)
    last_key:    Option<InternalKey>,
    num_entries: u64,
    /// Current file offset where the next block will be written
    file_offset: u64,
}

impl TableBuilder {
    /// Creates the table file `dir/<file_number>.sst`, truncating any file
    /// that already has that name.
    pub(crate) fn create(
        dir: &Path,
        file_number: u64,
        icmp: InternalKeyComparator,
        options: TableOptions,
    ) -> Result<Self> {
        let path = table_file_path(dir, file_number);
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .context(IOSnafu)?;
        Ok(Self {
            file: BufWriter::new(file),
            path,
            file_number,
            icmp,
            data_block: BlockBuilder::new(options.restart_interval),
            index_block: BlockBuilder::new(1),
            filter: (options.bloom_bits > 0).then(|| FilterBuilder::new(options.bloom_bits)),
            options,
            first_key: None,
            last_key: None,
            num_entries: 0,
            file_offset: 0,
        })
    }

    /// Adds an entry to the table.
    ///
    /// Entries must be added in strictly increasing internal key order. When
    /// the current data block reaches the block size it is flushed to disk.
    pub(crate) fn add(&mut self, entry: &Entry) -> Result<()> {
        if let Some(last_key) = &self.last_key {
            ensure!(
                self.icmp.compare(last_key, &entry.key) == Ordering::Less,
                InvalidArgumentSnafu {
                    message: format!(
                        "keys must be added in sorted order: {:?} after {:?}",
                        entry.key, last_key
                    ),
                }
            );
        }

        if self.first_key.is_none() {
            self.first_key = Some(entry.key.clone());
        }
        self.last_key = Some(entry.key.clone());
        self.num_entries += 1;

        if let Some(filter) = self.filter.as_mut() {
            filter.add_key(&entry.key.user_key);
        }
        self.data_block.add(&entry.key.encode_flat(), &entry.value);

        if self.data_block.estimate_size() >= self.options.block_size {
            self.flush_data_block()?;
        }
        Ok(())
    }

    /// Returns the number of entries added so far.
    pub(crate) fn len(&self) -> u64 { self.num_entries }

    pub(crate) fn is_empty(&self) -> bool { self.num_entries == 0 }

    /// Returns the current file size in bytes, not counting the block under
    /// construction.
    pub(crate) fn file_size(&self) -> u64 { self.file_offset }

    /// Flushes the current data block and records its index entry.
    fn flush_data_block(&mut self) -> Result<()> {
        if self.data_block.is_empty() {
            return Ok(());
        }
        let raw = self.data_block.finish();
        let handle = self.write_data_block(&raw)?;

        if let Some(last_key) = &self.last_key {
            let mut value = Vec::with_capacity(16);
            handle.encode_into(&mut value).context(IOSnafu)?;
            self.index_block.add(&last_key.encode_flat(), &value);
        }
        Ok(())
    }

    fn write_data_block(&mut self, raw: &[u8]) -> Result<BlockHandle> {
        let (payload, compression) = match self.options.compression {
            Compression::None => (Cow::Borrowed(raw), Compression::None),
            Compression::Zstd => {
                let compressed = zstd::encode_all(raw, 0).context(IOSnafu)?;
                if compressed.len() < raw.len() {
                    (Cow::Owned(compressed), Compression::Zstd)
                } else {
                    (Cow::Borrowed(raw), Compression::None)
                }
            }
            Compression::Snappy => {
                let compressed = snap::raw::Encoder::new()
                    .compress_vec(raw)
                    .map_err(std::io::Error::other)
                    .context(IOSnafu)?;
                if compressed.len() < raw.len() {
                    (Cow::Owned(compressed), Compression::Snappy)
                } else {
                    (Cow::Borrowed(raw), Compression::None)
                }
            }
        };

        let mut hasher = Hasher::new();
        hasher.update(&payload);
        hasher.update(&[compression.to_byte()]);
        let checksum = hasher.finalize();

        self.file.write_all(&payload).context(IOSnafu)?;
        self.file
            .write_u8(compression.to_byte())
            .context(IOSnafu)?;
        self.file
            .write_u32::<LittleEndian>(checksum)
            .context(IOSnafu)?;

        let handle = BlockHandle::new(self.file_offset, payload.len() as u64);
        self.file_offset += (payload.len() + BLOCK_TRAILER_SIZE) as u64;
        Ok(handle)
    }

    /// Writes a raw block and returns its offset, size and checksum.
    fn write_raw(&mut self, data: &[u8]) -> Result<(u64, u64, u32)> {
        let offset = self.file_offset;
        self.file.write_all(data).context(IOSnafu)?;
        self.file_offset += data.len() as u64;
        Ok((offset, data.len() as u64, crc32fast::hash(data)))
    }

    /// Finalizes the table by flushing any remaining data and writing the
    /// filter block, index block and footer, then syncs the file.
    pub(crate) fn finish(mut self) -> Result<SstableMetadata> {
        ensure!(
            self.num_entries > 0,
            InvalidArgumentSnafu {
                message: "cannot finish a table without entries",
            }
        );
        self.flush_data_block()?;

        let (filter_offset, filter_size, filter_checksum) = match self.filter.take() {
            Some(filter) => self.write_raw(&filter.finish())?,
            None => (self.file_offset, 0, 0),
        };
        let index = self.index_block.finish();
        let (index_offset, index_size, index_checksum) = self.write_raw(&index)?;

        let footer = TableFooter {
            index_offset,
            index_size,
            filter_offset,
            filter_size,
            entry_count: self.num_entries,
            first_key: self.first_key.clone(),
            last_key: self.last_key.clone(),
            index_checksum,
            filter_checksum,
            magic: SSTABLE_MAGIC,
        };
        let footer_data = footer.encode_into_vec().context(IOSnafu)?;
        self.file.write_all(&footer_data).context(IOSnafu)?;
        self.file
            .write_u32::<LittleEndian>(footer_data.len() as u32)
            .context(IOSnafu)?;
        self.file_offset += footer_data.len() as u64 + 4;

        self.file.flush().context(IOSnafu)?;
        self.file.get_ref().sync_all().context(IOSnafu)?;

        debug!(
            file_number = self.file_number,
            entries = self.num_entries,
            size = self.file_offset,
            "finished table"
        );

        match (footer.first_key, footer.last_key) {
            (Some(smallest_key), Some(largest_key)) => Ok(SstableMetadata {
                file_number: self.file_number,
                file_size: self.file_offset,
                smallest_key,
                largest_key,
                entry_count: self.num_entries,
            }),
            _ => InvalidArgumentSnafu {
                message: "table has no key range",
            }
            .fail(),
        }
    }

    /// Gives up on the table and removes its file.
    pub(crate) fn abandon(self) -> Result<()> {
        let path = self.path.clone();
        drop(self);
        std::fs::remove_file(path).context(IOSnafu)
    }
}

/// Read side of a table file.
///
/// The footer, index and filter are loaded at open; data blocks are read on
/// demand and shared through the [`BlockCache`].
pub(crate) struct TableReader {
    file_number: u64,
    path:        PathBuf,
    file:        Mutex<File>,
    footer:      TableFooter,
    index:       Vec<IndexEntry>,
    filter:      Option<BloomFilter>,
    icmp:        InternalKeyComparator,
    block_cache: Arc<BlockCache>,
}

impl std::fmt::Debug for TableReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableReader")
            .field("file_number", &self.file_number)
            .field("entries", &self.footer.entry_count)
            .field("blocks", &self.index.len())
            .finish()
    }
}

impl TableReader {
    /// Opens a table file and validates its footer, index and filter.
    pub(crate) fn open(
        path: impl AsRef<Path>,
        file_number: u64,
        icmp: InternalKeyComparator,
        block_cache: Arc<BlockCache>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let invalid = |reason: &str| {
            InvalidSSTFileSnafu {
                path:   path.display().to_string(),
                reason: reason.to_string(),
            }
            .build()
        };

        let mut file = File::open(&path).context(IOSnafu)?;
        let file_size = file.metadata().context(IOSnafu)?.len();
        if file_size < TableFooter::min_footer_size() + 4 {
            return Err(invalid("file too small to contain a footer"));
        }

        file.seek(SeekFrom::End(-4)).context(IOSnafu)?;
        let footer_size = file.read_u32::<LittleEndian>().context(IOSnafu)? as u64;
        if footer_size < TableFooter::min_footer_size() || footer_size + 4 > file_size {
            return Err(invalid("footer size out of range"));
        }
        let footer_offset = file_size - 4 - footer_size;
        let footer_data = read_at(&mut file, footer_offset, footer_size)?;
        let footer = TableFooter::decode_from(&mut footer_data.as_slice())
            .map_err(|_| invalid("undecodable footer"))?;
        if footer.magic != SSTABLE_MAGIC {
            return Err(invalid("bad magic number"));
        }
        if footer.index_offset + footer.index_size > footer_offset
            || footer.filter_offset + footer.filter_size > footer.index_offset
        {
            return Err(invalid("index or filter block out of range"));
        }

        let index_data = read_at(&mut file, footer.index_offset, footer.index_size)?;
        let actual = crc32fast::hash(&index_data);
        ensure!(
            actual == footer.index_checksum,
            ChecksumMismatchSnafu {
                what: format!("index block of {}", path.display()),
                expected: footer.index_checksum,
                actual,
            }
        );
        let index = decode_index(&index_data).map_err(|_| invalid("undecodable index block"))?;

        let filter = if footer.filter_size > 0 {
            let data = read_at(&mut file, footer.filter_offset, footer.filter_size)?;
            let actual = crc32fast::hash(&data);
            ensure!(
                actual == footer.filter_checksum,
                ChecksumMismatchSnafu {
                    what: format!("filter block of {}", path.display()),
                    expected: footer.filter_checksum,
                    actual,
                }
            );
            BloomFilter::decode(Bytes::from(data))
        } else {
            None
        };

        Ok(Self {
            file_number,
            path,
            file: Mutex::new(file),
            footer,
            index,
            filter,
            icmp,
            block_cache,
        })
    }

    pub(crate) fn first_key(&self) -> Option<&InternalKey> { self.footer.first_key.as_ref() }

    pub(crate) fn last_key(&self) -> Option<&InternalKey> { self.footer.last_key.as_ref() }

    pub(crate) fn num_blocks(&self) -> usize { self.index.len() }

    /// Position of the first data block whose last key is not less than
    /// `target`, or `num_blocks()` when `target` sorts after the whole table.
    fn block_position(&self, target: &InternalKey) -> usize {
        self.index
            .partition_point(|entry| self.icmp.compare(&entry.key, target) == Ordering::Less)
    }

    /// Reads the data block at `position` in the index, through the block
    /// cache.
    pub(crate) fn read_block(&self, position: usize, options: ReadOptions) -> Result<Arc<Block>> {
        let handle = match self.index.get(position) {
            Some(entry) => entry.handle,
            None => {
                return CorruptionSnafu {
                    message: format!("block {position} out of range in table {}", self.file_number),
                }
                .fail();
            }
        };

        if let Some(block) = self.block_cache.get(self.file_number, handle.offset) {
            return Ok(block);
        }

        let data = {
            let mut file = self.file.lock();
            read_at(
                &mut file,
                handle.offset,
                handle.size + BLOCK_TRAILER_SIZE as u64,
            )?
        };
        let (payload, trailer) = data.split_at(handle.size as usize);
        let compression_byte = trailer[0];

        if options.verify_checksums {
            let expected = u32::from_le_bytes([trailer[1], trailer[2], trailer[3], trailer[4]]);
            let mut hasher = Hasher::new();
            hasher.update(payload);
            hasher.update(&[compression_byte]);
            let actual = hasher.finalize();
            ensure!(
                actual == expected,
                ChecksumMismatchSnafu {
                    what: format!(
                        "data block at offset {} of {}",
                        handle.offset,
                        self.path.display()
                    ),
                    expected,
                    actual,
                }
            );
        }

        let raw = match Compression::from_byte(compression_byte) {
            Some(Compression::None) => Cow::Borrowed(payload),
            Some(Compression::Zstd) => Cow::Owned(zstd::decode_all(payload).map_err(|e| {
                CorruptionSnafu {
                    message: format!("undecompressable block in table {}: {e}", self.file_number),
                }
                .build()
            })?),
            Some(Compression::Snappy) => Cow::Owned(
                snap::raw::Decoder::new()
                    .decompress_vec(payload)
                    .map_err(|e| {
                        CorruptionSnafu {
                            message: format!(
                                "undecompressable block in table {}: {e}",
                                self.file_number
                            ),
                        }
                        .build()
                    })?,
            ),
            None => {
                return CorruptionSnafu {
                    message: format!(
                        "unknown compression {compression_byte} in table {}",
                        self.file_number
                    ),
                }
                .fail();
            }
        };
        let block = Arc::new(Block::decode(&raw).map_err(|e| {
            CorruptionSnafu {
                message: format!("undecodable block in table {}: {e}", self.file_number),
            }
            .build()
        })?);

        if options.fill_cache {
            self.block_cache
                .insert(self.file_number, handle.offset, block.clone());
        }
        Ok(block)
    }

    /// Returns false when the filter proves `user_key` is absent.
    pub(crate) fn may_contain(&self, user_key: &[u8]) -> bool {
        self.filter
            .as_ref()
            .is_none_or(|filter| filter.may_contain(user_key))
    }

    /// Returns the newest entry for `user_key` with a sequence number not
    /// greater than `seqno`, tombstones included.
    pub(crate) fn get(
        &self,
        user_key: &[u8],
        seqno: u64,
        options: ReadOptions,
    ) -> Result<Option<Entry>> {
        if !self.may_contain(user_key) {
            return Ok(None);
        }
        let target = InternalKey::lookup(user_key, seqno);
        let position = self.block_position(&target);
        if position == self.index.len() {
            return Ok(None);
        }
        let block = self.read_block(position, options)?;
        let found = block.entry(block.seek(&self.icmp, &target)).filter(|entry| {
            self.icmp.compare_user(&entry.key.user_key, user_key) == Ordering::Equal
        });
        Ok(found.cloned())
    }

    /// Approximate file offset at which data for `user_key` would begin.
    pub(crate) fn approximate_offset_of(&self, user_key: &[u8]) -> u64 {
        let target = InternalKey::lookup(user_key, MAX_SEQNO);
        match self.index.get(self.block_position(&target)) {
            Some(entry) => entry.handle.offset,
            None => self.footer.data_end(),
        }
    }

    pub(crate) fn data_end(&self) -> u64 { self.footer.data_end() }

    /// Reads every entry of the table in order.
    pub(crate) fn entries(&self, options: ReadOptions) -> Result<Vec<Entry>> {
        let mut entries = Vec::with_capacity(self.footer.entry_count as usize);
        for position in 0..self.index.len() {
            entries.extend_from_slice(self.read_block(position, options)?.entries());
        }
        Ok(entries)
    }
}

fn read_at(file: &mut File, offset: u64, len: u64) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len as usize];
    file.seek(SeekFrom::Start(offset)).context(IOSnafu)?;
    file.read_exact(&mut buf).context(IOSnafu)?;
    Ok(buf)
}

/// Positioned lookups over a single table that keep the most recently read
/// block at hand, so consecutive steps of a range scan stay inside one block.
pub(crate) struct TableCursor {
    table:   Arc<TableReader>,
    options: ReadOptions,
    current: Option<(usize, Arc<Block>)>,
}

impl TableCursor {
    pub(crate) fn new(table: Arc<TableReader>, options: ReadOptions) -> Self {
        Self {
            table,
            options,
            current: None,
        }
    }

    fn block(&mut self, position: usize) -> Result<Arc<Block>> {
        if let Some((cached, block)) = &self.current {
            if *cached == position {
                return Ok(block.clone());
            }
        }
        let block = self.table.read_block(position, self.options)?;
        self.current = Some((position, block.clone()));
        Ok(block)
    }

    /// First key not less than `target`.
    pub(crate) fn seek_ge(&mut self, target: &InternalKey) -> Result<Option<InternalKey>> {
        self.seek_after(target, true)
    }

    /// First key strictly greater than `target`.
    pub(crate) fn seek_gt(&mut self, target: &InternalKey) -> Result<Option<InternalKey>> {
        self.seek_after(target, false)
    }

    pub(crate) fn first_key(&mut self) -> Result<Option<InternalKey>> {
        if self.table.num_blocks() == 0 {
            return Ok(None);
        }
        Ok(self.block(0)?.entry(0).map(|entry| entry.key.clone()))
    }

    pub(crate) fn last_key(&mut self) -> Result<Option<InternalKey>> {
        let Some(position) = self.table.num_blocks().checked_sub(1) else {
            return Ok(None);
        };
        Ok(self.block(position)?.entries().last().map(|entry| entry.key.clone()))
    }

    fn seek_after(&mut self, target: &InternalKey, inclusive: bool) -> Result<Option<InternalKey>> {
        let mut position = self.table.block_position(target);
        while position < self.table.num_blocks() {
            let block = self.block(position)?;
            let icmp = &self.table.icmp;
            let skipped = block.entries().partition_point(|entry| {
                match icmp.compare(&entry.key, target) {
                    Ordering::Less => true,
                    Ordering::Equal => !inclusive,
                    Ordering::Greater => false,
                }
            });
            if let Some(entry) = block.entry(skipped) {
                return Ok(Some(entry.key.clone()));
            }
            position += 1;
        }
        Ok(None)
    }

    /// Last key not greater than `target`.
    pub(crate) fn seek_le(&mut self, target: &InternalKey) -> Result<Option<InternalKey>> {
        self.seek_before(target, true)
    }

    /// Last key strictly less than `target`.
    pub(crate) fn seek_lt(&mut self, target: &InternalKey) -> Result<Option<InternalKey>> {
        self.seek_before(target, false)
    }

    fn seek_before(&mut self, target: &InternalKey, inclusive: bool) -> Result<Option<InternalKey>> {
        let num_blocks = self.table.num_blocks();
        if num_blocks == 0 {
            return Ok(None);
        }
        let mut position = self.table.block_position(target).min(num_blocks - 1);
        loop {
            let block = self.block(position)?;
            let icmp = &self.table.icmp;
            let count = block.entries().partition_point(|entry| {
                match icmp.compare(&entry.key, target) {
                    Ordering::Less => true,
                    Ordering::Equal => inclusive,
                    Ordering::Greater => false,
                }
            });
            if count > 0 {
                return Ok(Some(block.entries()[count - 1].key.clone()));
            }
            if position == 0 {
                return Ok(None);
            }
            position -= 1;
        }
    }
}
