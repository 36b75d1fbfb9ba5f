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

//! burrow: an embedded, ordered, persistent key-value store.
//!
//! Keys and values are arbitrary byte strings ordered by a pluggable
//! [`Comparator`]. Writes go through a write-ahead log into a memtable that
//! is flushed to sorted tables and compacted in levels. Every write gets a
//! sequence number, which is what [`Snapshot`]s and [`DBIterator`]s read at.
//!
//! # Examples
//!
//! ```rust,no_run
//! use burrow_db::{DB, IteratorOptions, Options};
//!
//! let db = DB::open("/tmp/burrow-example", Options::new().create_if_missing(true))?;
//!
//! let mut batch = db.write_batch();
//! batch.put(b"fruit:apple", b"red").put(b"fruit:kiwi", b"green");
//! batch.write()?;
//!
//! let snapshot = db.snapshot()?;
//! db.delete(b"fruit:apple")?;
//! assert!(snapshot.get(b"fruit:apple")?.is_some());
//!
//! let iter = db.iterator(IteratorOptions::builder().prefix(b"fruit:".to_vec()).build())?;
//! for item in iter {
//!     let (key, value) = item?.into_key_value().unwrap_or_default();
//!     println!("{key:?} = {value:?}");
//! }
//! # Ok::<(), burrow_db::Error>(())
//! ```

mod batch;
mod compaction;
mod comparator;
mod db;
mod err;
mod format;
mod iterator;
mod lock;
mod manifest;
mod mem;
mod memtable;
mod options;
mod repair;
mod snapshot;
mod sst;
mod version;
mod wal;

pub use batch::{Batch, WriteBatch};
pub use compaction::{CompactionOptions, CompactionReason, CompactionStats, LevelStats};
pub use comparator::{
    BYTEWISE_COMPARATOR_NAME, BytewiseComparator, Comparator, ComparatorRef, FnComparator,
    default_comparator,
};
pub use db::{DB, DatabaseStats};
pub use err::{Error, Result};
pub use format::SeqNo;
pub use iterator::{DBIterator, IterItem};
pub use mem::MemStats;
pub use options::{Compression, IteratorOptions, OptionValue, Options, ReadOptions, WriteOptions};
pub use repair::{destroy, repair};
pub use snapshot::Snapshot;
