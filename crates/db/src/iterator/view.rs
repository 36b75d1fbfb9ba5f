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

//! A merged, sequence-filtered view over every source of a [`ReadView`].

use std::{cmp::Ordering, iter, sync::Arc};

use bytes::Bytes;

use crate::{
    comparator::InternalKeyComparator,
    err::Result,
    format::{InternalKey, MAX_SEQNO, SeqNo, UserValue, ValueType},
    mem::ReadView,
    options::ReadOptions,
    sst::table::TableCursor,
};

/// Smallest internal key carrying `user_key`.
fn first_version(user_key: &[u8]) -> InternalKey { InternalKey::lookup(user_key, MAX_SEQNO) }

/// Largest internal key carrying `user_key`.
fn last_version(user_key: &[u8]) -> InternalKey {
    InternalKey::new(Bytes::copy_from_slice(user_key), 0, ValueType::Tombstone)
}

#[derive(Clone, Copy)]
enum Probe<'a> {
    First,
    Last,
    Ge(&'a InternalKey),
    Gt(&'a InternalKey),
    Le(&'a InternalKey),
    Lt(&'a InternalKey),
}

impl Probe<'_> {
    fn ascending(self) -> bool { matches!(self, Probe::First | Probe::Ge(_) | Probe::Gt(_)) }
}

/// Finds the live user keys nearest to a position, in comparator order, as
/// of a fixed sequence number.
///
/// Lookups probe every memtable and table of the view for the nearest
/// internal key, then resolve the newest visible version of that user key.
/// Keys whose newest visible version is a tombstone, or that have no version
/// at or below the sequence, are skipped.
pub(crate) struct MergedView {
    view:     Arc<ReadView>,
    icmp:     InternalKeyComparator,
    sequence: SeqNo,
    options:  ReadOptions,
    tables:   Vec<TableCursor>,
}

impl MergedView {
    pub(crate) fn new(
        view: Arc<ReadView>,
        icmp: InternalKeyComparator,
        sequence: SeqNo,
        options: ReadOptions,
    ) -> Result<Self> {
        let tables = view
            .version
            .all_files()
            .map(|(_, file)| Ok(TableCursor::new(file.reader()?, options)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            view,
            icmp,
            sequence,
            options,
            tables,
        })
    }

    /// Nearest internal key across all sources in the probe's direction.
    fn probe(&mut self, probe: Probe<'_>) -> Result<Option<InternalKey>> {
        let wanted = if probe.ascending() {
            Ordering::Less
        } else {
            Ordering::Greater
        };
        let icmp = &self.icmp;
        let mut best: Option<InternalKey> = None;
        let mut consider = |found: Option<InternalKey>| {
            if let Some(found) = found {
                if best
                    .as_ref()
                    .is_none_or(|best| icmp.compare(&found, best) == wanted)
                {
                    best = Some(found);
                }
            }
        };

        for mem in iter::once(&self.view.mem).chain(self.view.imms.iter_newest_first()) {
            consider(match probe {
                Probe::First => mem.first_key(),
                Probe::Last => mem.last_key(),
                Probe::Ge(target) => mem.seek_ge(target),
                Probe::Gt(target) => mem.seek_gt(target),
                Probe::Le(target) => mem.seek_le(target),
                Probe::Lt(target) => mem.seek_lt(target),
            });
        }
        for table in &mut self.tables {
            consider(match probe {
                Probe::First => table.first_key()?,
                Probe::Last => table.last_key()?,
                Probe::Ge(target) => table.seek_ge(target)?,
                Probe::Gt(target) => table.seek_gt(target)?,
                Probe::Le(target) => table.seek_le(target)?,
                Probe::Lt(target) => table.seek_lt(target)?,
            });
        }
        Ok(best)
    }

    fn resolve(&self, user_key: &[u8]) -> Result<Option<(Bytes, UserValue)>> {
        Ok(self
            .view
            .get_entry(user_key, self.sequence, self.options)?
            .filter(|entry| !entry.key.is_tombstone())
            .map(|entry| (entry.key.user_key, entry.value)))
    }

    /// Smallest live key after `key` (at or after it when `inclusive`), or
    /// the smallest live key overall when `key` is `None`.
    pub(crate) fn ceiling(
        &mut self,
        key: Option<&[u8]>,
        inclusive: bool,
    ) -> Result<Option<(Bytes, UserValue)>> {
        let mut candidate = match key {
            None => self.probe(Probe::First)?,
            Some(key) if inclusive => self.probe(Probe::Ge(&first_version(key)))?,
            Some(key) => self.probe(Probe::Gt(&last_version(key)))?,
        };
        while let Some(found) = candidate {
            if let Some(live) = self.resolve(&found.user_key)? {
                return Ok(Some(live));
            }
            candidate = self.probe(Probe::Gt(&last_version(&found.user_key)))?;
        }
        Ok(None)
    }

    /// Largest live key before `key` (at or before it when `inclusive`), or
    /// the largest live key overall when `key` is `None`.
    pub(crate) fn floor(
        &mut self,
        key: Option<&[u8]>,
        inclusive: bool,
    ) -> Result<Option<(Bytes, UserValue)>> {
        let mut candidate = match key {
            None => self.probe(Probe::Last)?,
            Some(key) if inclusive => self.probe(Probe::Le(&last_version(key)))?,
            Some(key) => self.probe(Probe::Lt(&first_version(key)))?,
        };
        while let Some(found) = candidate {
            if let Some(live) = self.resolve(&found.user_key)? {
                return Ok(Some(live));
            }
            candidate = self.probe(Probe::Lt(&first_version(&found.user_key)))?;
        }
        Ok(None)
    }
}
