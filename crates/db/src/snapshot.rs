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
    collections::BTreeMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    db::DBInner,
    err::Result,
    format::SeqNo,
    iterator::DBIterator,
    options::{IteratorOptions, ReadOptions},
};

/// Sequence numbers pinned by live readers.
///
/// Several readers may pin the same sequence, so each is reference counted.
/// Compaction keeps every version the oldest pinned sequence can see.
#[derive(Debug, Default)]
pub(crate) struct SnapshotList {
    pinned: Mutex<BTreeMap<SeqNo, usize>>,
}

impl SnapshotList {
    pub(crate) fn new() -> Self { Self::default() }

    pub(crate) fn acquire(&self, sequence: SeqNo) {
        *self.pinned.lock().entry(sequence).or_insert(0) += 1;
    }

    /// Pins the sequence currently held in `last`. The load happens under
    /// the list's lock, so [`smallest`](Self::smallest) never returns a
    /// sequence newer than a pin taken concurrently.
    pub(crate) fn acquire_latest(&self, last: &AtomicU64) -> SeqNo {
        let mut pinned = self.pinned.lock();
        let sequence = last.load(Ordering::Acquire);
        *pinned.entry(sequence).or_insert(0) += 1;
        sequence
    }

    pub(crate) fn release(&self, sequence: SeqNo) {
        let mut pinned = self.pinned.lock();
        if let Some(count) = pinned.get_mut(&sequence) {
            *count -= 1;
            if *count == 0 {
                pinned.remove(&sequence);
            }
        }
    }

    /// Oldest sequence any current or future reader may read at.
    pub(crate) fn smallest(&self, last: &AtomicU64) -> SeqNo {
        let pinned = self.pinned.lock();
        pinned
            .keys()
            .next()
            .copied()
            .unwrap_or_else(|| last.load(Ordering::Acquire))
    }

    /// Number of live pins.
    pub(crate) fn len(&self) -> usize { self.pinned.lock().values().sum() }
}

/// A consistent, read-only view of the store as of the moment it was taken.
///
/// Writes made after the snapshot are invisible through it. The versions it
/// can see are kept alive until it is dropped.
pub struct Snapshot {
    db:       Arc<DBInner>,
    sequence: SeqNo,
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("sequence", &self.sequence)
            .finish()
    }
}

impl Snapshot {
    pub(crate) fn new(db: Arc<DBInner>) -> Self {
        let sequence = db.pin_latest();
        debug!(sequence, "acquired snapshot");
        Self { db, sequence }
    }

    /// Last sequence number visible through this snapshot.
    pub fn sequence(&self) -> SeqNo { self.sequence }

    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Bytes>> {
        self.get_with(key, ReadOptions::default())
    }

    pub fn get_with(&self, key: impl AsRef<[u8]>, options: ReadOptions) -> Result<Option<Bytes>> {
        self.db.get_at(key.as_ref(), self.sequence, options)
    }

    /// Iterates over the whole store as of the snapshot.
    pub fn iter(&self) -> Result<DBIterator> { self.iterator(IteratorOptions::default()) }

    pub fn iterator(&self, options: IteratorOptions) -> Result<DBIterator> {
        DBIterator::new(self.db.clone(), options, Some(self.sequence))
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        self.db.snapshots().release(self.sequence);
        debug!(sequence = self.sequence, "released snapshot");
    }
}
