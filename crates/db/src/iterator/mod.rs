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

//! Bidirectional, range-bounded cursors over the store.
//!
//! A [`DBIterator`] sits in a gap between two adjacent live keys of its range.
//! Stepping returns the key on one side of the gap and moves the gap past it,
//! so stepping forward and then backward returns the same entry twice. The
//! two outermost gaps, before the first key and after the last one, absorb
//! further steps outward: every such step fails with
//! [`Error::Exhausted`](crate::Error::Exhausted) and leaves the cursor where it
//! is.

pub(crate) mod view;

use std::{cmp::Ordering, fmt, sync::Arc};

use bytes::Bytes;
use snafu::ensure;
use tracing::trace;

use crate::{
    comparator::prefix_successor,
    db::DBInner,
    err::{ClosedSnafu, ExhaustedSnafu, InvalidArgumentSnafu, Result},
    format::{SeqNo, UserValue},
    iterator::view::MergedView,
    options::IteratorOptions,
};

/// What a step of a [`DBIterator`] yields, shaped by
/// `include_key`/`include_value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterItem {
    KeyValue(Bytes, Bytes),
    Key(Bytes),
    Value(Bytes),
    /// Neither the key nor the value was requested.
    Empty,
}

impl IterItem {
    pub fn key(&self) -> Option<&Bytes> {
        match self {
            IterItem::KeyValue(key, _) | IterItem::Key(key) => Some(key),
            IterItem::Value(_) | IterItem::Empty => None,
        }
    }

    pub fn value(&self) -> Option<&Bytes> {
        match self {
            IterItem::KeyValue(_, value) | IterItem::Value(value) => Some(value),
            IterItem::Key(_) | IterItem::Empty => None,
        }
    }

    pub fn into_key_value(self) -> Option<(Bytes, Bytes)> {
        match self {
            IterItem::KeyValue(key, value) => Some((key, value)),
            _ => None,
        }
    }
}

/// Gap the cursor sits in, in ascending key order.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Position {
    BeforeStart,
    AfterStop,
    /// Immediately before `key`, which need not exist.
    Before(Bytes),
    /// Immediately after `key`.
    After(Bytes),
}

/// Cursor over a fixed view of the store.
///
/// The range is `[start, stop)` under the store's comparator. A reverse
/// iterator walks it from the top: [`advance`](DBIterator::advance) moves
/// toward smaller keys and [`retreat`](DBIterator::retreat) toward larger
/// ones, while [`seek_to_start`](DBIterator::seek_to_start) and
/// [`seek_to_stop`](DBIterator::seek_to_stop) still name the low and high
/// ends.
///
/// A new iterator sits at the end it walks away from: before the lowest key
/// for a forward one and after the highest for a reverse one. It reads at
/// the sequence number current when it was created (or its snapshot's),
/// pinning it so compaction keeps what it needs.
pub struct DBIterator {
    db:            Arc<DBInner>,
    merged:        MergedView,
    sequence:      SeqNo,
    start:         Option<Bytes>,
    stop:          Option<Bytes>,
    empty:         bool,
    reverse:       bool,
    include_key:   bool,
    include_value: bool,
    position:      Position,
    /// Set once [`Iterator::next`] has surfaced an error.
    failed:        bool,
}

impl fmt::Debug for DBIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DBIterator")
            .field("sequence", &self.sequence)
            .field("start", &self.start)
            .field("stop", &self.stop)
            .field("reverse", &self.reverse)
            .field("position", &self.position)
            .finish()
    }
}

impl DBIterator {
    pub(crate) fn new(
        db: Arc<DBInner>,
        options: IteratorOptions,
        sequence: Option<SeqNo>,
    ) -> Result<Self> {
        ensure!(!db.is_closed(), ClosedSnafu);
        let read_options = db.effective_read_options(options.read_options());
        let (start, stop) = match options.prefix {
            Some(prefix) => {
                ensure!(
                    options.start.is_none() && options.stop.is_none(),
                    InvalidArgumentSnafu {
                        message: "prefix cannot be combined with start or stop",
                    }
                );
                let stop = prefix_successor(&prefix).map(Bytes::from);
                (Some(Bytes::from(prefix)), stop)
            }
            None => (
                options.start.map(Bytes::from),
                options.stop.map(Bytes::from),
            ),
        };

        let icmp = db.icmp().clone();
        let empty = match (&start, &stop) {
            (Some(start), Some(stop)) => icmp.compare_user(start, stop) != Ordering::Less,
            _ => false,
        };

        let (view, sequence) = db.pin_view(sequence);
        let merged = match MergedView::new(view, icmp, sequence, read_options) {
            Ok(merged) => merged,
            Err(e) => {
                db.snapshots().release(sequence);
                return Err(e);
            }
        };
        trace!(sequence, reverse = options.reverse, "created iterator");

        Ok(Self {
            db,
            merged,
            sequence,
            start,
            stop,
            empty,
            reverse: options.reverse,
            include_key: options.include_key,
            include_value: options.include_value,
            position: if options.reverse {
                Position::AfterStop
            } else {
                Position::BeforeStart
            },
            failed: false,
        })
    }

    /// Sequence number the iterator reads at.
    pub fn sequence(&self) -> SeqNo { self.sequence }

    /// Steps in the iteration direction.
    pub fn advance(&mut self) -> Result<IterItem> {
        if self.reverse {
            self.step_down()
        } else {
            self.step_up()
        }
    }

    /// Steps against the iteration direction.
    pub fn retreat(&mut self) -> Result<IterItem> {
        if self.reverse {
            self.step_up()
        } else {
            self.step_down()
        }
    }

    /// Moves to the gap before the lowest key of the range.
    pub fn seek_to_start(&mut self) -> Result<()> {
        self.check_open()?;
        self.position = Position::BeforeStart;
        Ok(())
    }

    /// Moves to the gap after the highest key of the range.
    pub fn seek_to_stop(&mut self) -> Result<()> {
        self.check_open()?;
        self.position = Position::AfterStop;
        Ok(())
    }

    /// Moves to the gap immediately before `target`, clamped into the range.
    ///
    /// Afterwards a forward [`advance`](Self::advance) yields the first key
    /// not less than `target`, and a reverse one the last key less than it.
    pub fn seek(&mut self, target: impl AsRef<[u8]>) -> Result<()> {
        self.check_open()?;
        let icmp = self.db.icmp();
        let mut target = Bytes::copy_from_slice(target.as_ref());
        if let Some(start) = &self.start {
            if icmp.compare_user(&target, start) == Ordering::Less {
                target = start.clone();
            }
        }
        if let Some(stop) = &self.stop {
            if icmp.compare_user(&target, stop) == Ordering::Greater {
                target = stop.clone();
            }
        }
        self.position = Position::Before(target);
        Ok(())
    }

    fn check_open(&self) -> Result<()> {
        ensure!(!self.db.is_closed(), ClosedSnafu);
        Ok(())
    }

    /// Returns the smallest in-range key above the gap.
    fn step_up(&mut self) -> Result<IterItem> {
        self.check_open()?;
        if self.empty {
            self.position = Position::AfterStop;
            return ExhaustedSnafu.fail();
        }
        let found = match &self.position {
            Position::AfterStop => return ExhaustedSnafu.fail(),
            Position::BeforeStart => self.merged.ceiling(self.start.as_deref(), true)?,
            Position::Before(key) => self.merged.ceiling(Some(key.as_ref()), true)?,
            Position::After(key) => self.merged.ceiling(Some(key.as_ref()), false)?,
        };
        let icmp = self.db.icmp();
        match found {
            Some((key, value))
                if self
                    .stop
                    .as_ref()
                    .is_none_or(|stop| icmp.compare_user(&key, stop) == Ordering::Less) =>
            {
                self.position = Position::After(key.clone());
                Ok(self.item(key, value))
            }
            _ => {
                self.position = Position::AfterStop;
                ExhaustedSnafu.fail()
            }
        }
    }

    /// Returns the largest in-range key below the gap.
    fn step_down(&mut self) -> Result<IterItem> {
        self.check_open()?;
        if self.empty {
            self.position = Position::BeforeStart;
            return ExhaustedSnafu.fail();
        }
        let found = match &self.position {
            Position::BeforeStart => return ExhaustedSnafu.fail(),
            Position::AfterStop => self.merged.floor(self.stop.as_deref(), false)?,
            Position::After(key) => self.merged.floor(Some(key.as_ref()), true)?,
            Position::Before(key) => self.merged.floor(Some(key.as_ref()), false)?,
        };
        let icmp = self.db.icmp();
        match found {
            Some((key, value))
                if self
                    .start
                    .as_ref()
                    .is_none_or(|start| icmp.compare_user(&key, start) != Ordering::Less) =>
            {
                self.position = Position::Before(key.clone());
                Ok(self.item(key, value))
            }
            _ => {
                self.position = Position::BeforeStart;
                ExhaustedSnafu.fail()
            }
        }
    }

    fn item(&self, key: Bytes, value: UserValue) -> IterItem {
        match (self.include_key, self.include_value) {
            (true, true) => IterItem::KeyValue(key, value),
            (true, false) => IterItem::Key(key),
            (false, true) => IterItem::Value(value),
            (false, false) => IterItem::Empty,
        }
    }
}

impl Iterator for DBIterator {
    type Item = Result<IterItem>;

    /// Ends after the first error it yields.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.advance() {
            Ok(item) => Some(Ok(item)),
            Err(e) if e.is_exhausted() => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

impl Drop for DBIterator {
    fn drop(&mut self) { self.db.snapshots().release(self.sequence); }
}
