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

pub(crate) mod immut;

use std::{
    cmp::Ordering,
    ops::Bound,
    sync::atomic::{self, AtomicU64},
};

use bon::Builder;
use crossbeam_skiplist::SkipMap;

use crate::{
    comparator::InternalKeyComparator,
    format::{Entry, InternalKey, SeqNo, UserValue},
};

/// Skiplist key ordered by the store's internal key comparator.
#[derive(Clone)]
pub(crate) struct MemKey {
    key:  InternalKey,
    icmp: InternalKeyComparator,
}

impl MemKey {
    fn new(key: InternalKey, icmp: &InternalKeyComparator) -> Self {
        Self {
            key,
            icmp: icmp.clone(),
        }
    }
}

impl Ord for MemKey {
    fn cmp(&self, other: &Self) -> Ordering { self.icmp.compare(&self.key, &other.key) }
}

impl PartialOrd for MemKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl PartialEq for MemKey {
    fn eq(&self, other: &Self) -> bool { self.cmp(other) == Ordering::Equal }
}

impl Eq for MemKey {}

#[derive(Builder)]
pub(crate) struct MemTable {
    icmp:             InternalKeyComparator,
    #[builder(default = SkipMap::new())]
    items:            SkipMap<MemKey, UserValue>,
    // The approximate size of memtable in bytes.
    #[builder(default = AtomicU64::new(0))]
    approximate_size: AtomicU64,
    #[builder(default = AtomicU64::new(0))]
    highest_seqno:    AtomicU64,
}

impl std::fmt::Debug for MemTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemTable")
            .field("entries", &self.items.len())
            .field("approximate_size", &self.approximate_size())
            .field("highest_seqno", &self.highest_seqno())
            .finish()
    }
}

impl MemTable {
    pub(crate) fn new(icmp: InternalKeyComparator) -> Self { Self::builder().icmp(icmp).build() }

    /// Inserts an entry.
    ///
    /// Returns the new size of the memtable.
    pub(crate) fn insert(&self, entry: Entry) -> u64 {
        let entry_size = entry.size();
        let size_before = self
            .approximate_size
            .fetch_add(entry_size, atomic::Ordering::AcqRel);
        self.highest_seqno
            .fetch_max(entry.key.seqno, atomic::Ordering::AcqRel);
        self.items
            .insert(MemKey::new(entry.key, &self.icmp), entry.value);
        size_before + entry_size
    }

    pub(crate) fn approximate_size(&self) -> u64 {
        self.approximate_size.load(atomic::Ordering::Acquire)
    }

    pub(crate) fn highest_seqno(&self) -> SeqNo { self.highest_seqno.load(atomic::Ordering::Acquire) }

    pub(crate) fn len(&self) -> usize { self.items.len() }

    pub(crate) fn is_empty(&self) -> bool { self.items.is_empty() }

    /// Iterates over all entries in internal key order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = Entry> + '_ {
        self.items
            .iter()
            .map(|item| Entry::new(item.key().key.clone(), item.value().clone()))
    }

    /// Returns the newest entry for `user_key` whose sequence number does not
    /// exceed `seqno`. Tombstones are returned as is.
    pub(crate) fn get(&self, user_key: &[u8], seqno: SeqNo) -> Option<Entry> {
        let probe = MemKey::new(InternalKey::lookup(user_key, seqno), &self.icmp);
        let item = self.items.lower_bound(Bound::Included(&probe))?;
        let found = &item.key().key;
        (self.icmp.compare_user(&found.user_key, user_key) == Ordering::Equal)
            .then(|| Entry::new(found.clone(), item.value().clone()))
    }

    /// First key not less than `target`.
    pub(crate) fn seek_ge(&self, target: &InternalKey) -> Option<InternalKey> {
        let probe = MemKey::new(target.clone(), &self.icmp);
        self.items
            .lower_bound(Bound::Included(&probe))
            .map(|item| item.key().key.clone())
    }

    /// First key strictly greater than `target`.
    pub(crate) fn seek_gt(&self, target: &InternalKey) -> Option<InternalKey> {
        let probe = MemKey::new(target.clone(), &self.icmp);
        self.items
            .lower_bound(Bound::Excluded(&probe))
            .map(|item| item.key().key.clone())
    }

    pub(crate) fn first_key(&self) -> Option<InternalKey> {
        self.items.front().map(|item| item.key().key.clone())
    }

    pub(crate) fn last_key(&self) -> Option<InternalKey> {
        self.items.back().map(|item| item.key().key.clone())
    }

    /// Last key not greater than `target`.
    pub(crate) fn seek_le(&self, target: &InternalKey) -> Option<InternalKey> {
        let probe = MemKey::new(target.clone(), &self.icmp);
        self.items
            .upper_bound(Bound::Included(&probe))
            .map(|item| item.key().key.clone())
    }

    /// Last key strictly less than `target`.
    pub(crate) fn seek_lt(&self, target: &InternalKey) -> Option<InternalKey> {
        let probe = MemKey::new(target.clone(), &self.icmp);
        self.items
            .upper_bound(Bound::Excluded(&probe))
            .map(|item| item.key().key.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use test_case::test_case;

    use super::*;
    use crate::{
        comparator::{FnComparator, default_comparator},
        format::{MAX_SEQNO, ValueType},
    };

    fn memtable() -> MemTable { MemTable::new(InternalKeyComparator::new(default_comparator())) }

    fn put(mem: &MemTable, key: &str, seqno: SeqNo, value: &str) {
        mem.insert(Entry::new(
            InternalKey::new(key.as_bytes().to_vec(), seqno, ValueType::Value),
            Bytes::copy_from_slice(value.as_bytes()),
        ));
    }

    fn delete(mem: &MemTable, key: &str, seqno: SeqNo) {
        mem.insert(Entry::new(
            InternalKey::new(key.as_bytes().to_vec(), seqno, ValueType::Tombstone),
            Bytes::new(),
        ));
    }

    /// Versions of `sensor` at seqnos 1, 2 and 4, with a delete at 3.
    fn setup_memtable_with_versions() -> MemTable {
        let mem = memtable();
        put(&mem, "sensor", 1, "v1");
        put(&mem, "sensor", 2, "v2");
        delete(&mem, "sensor", 3);
        put(&mem, "sensor", 4, "v4");
        put(&mem, "other", 5, "o5");
        mem
    }

    #[test_case(MAX_SEQNO, Some((4, Some("v4"))); "latest version")]
    #[test_case(4, Some((4, Some("v4"))); "exact seqno")]
    #[test_case(3, Some((3, None)); "tombstone visible at its seqno")]
    #[test_case(2, Some((2, Some("v2"))); "older version")]
    #[test_case(1, Some((1, Some("v1"))); "oldest version")]
    #[test_case(0, None; "before first write")]
    fn test_get_respects_seqno(seqno: SeqNo, expected: Option<(SeqNo, Option<&str>)>) {
        let mem = setup_memtable_with_versions();
        let found = mem.get(b"sensor", seqno).map(|entry| {
            let value = (!entry.key.is_tombstone())
                .then(|| String::from_utf8(entry.value.to_vec()).unwrap());
            (entry.key.seqno, value)
        });
        let expected = expected.map(|(seq, value)| (seq, value.map(str::to_string)));
        assert_eq!(found, expected);
    }

    #[test]
    fn test_get_missing_key() {
        let mem = setup_memtable_with_versions();
        assert!(mem.get(b"absent", MAX_SEQNO).is_none());
        assert!(mem.get(b"sensor0", MAX_SEQNO).is_none());
    }

    #[test]
    fn test_size_and_seqno_tracking() {
        let mem = memtable();
        assert!(mem.is_empty());
        put(&mem, "a", 7, "value");
        put(&mem, "b", 3, "value");
        assert_eq!(mem.len(), 2);
        assert_eq!(mem.highest_seqno(), 7);
        assert!(mem.approximate_size() > 0);
    }

    #[test]
    fn test_iteration_order() {
        let mem = setup_memtable_with_versions();
        let keys: Vec<(Vec<u8>, SeqNo)> = mem
            .iter()
            .map(|entry| (entry.key.user_key.to_vec(), entry.key.seqno))
            .collect();
        assert_eq!(keys, vec![
            (b"other".to_vec(), 5),
            (b"sensor".to_vec(), 4),
            (b"sensor".to_vec(), 3),
            (b"sensor".to_vec(), 2),
            (b"sensor".to_vec(), 1),
        ]);
    }

    #[test]
    fn test_seeks() {
        let mem = memtable();
        put(&mem, "b", 1, "b");
        put(&mem, "d", 2, "d");

        let newest = |key: &str| InternalKey::lookup(key.as_bytes(), MAX_SEQNO);
        let oldest = |key: &str| InternalKey::new(key.as_bytes().to_vec(), 0, ValueType::Tombstone);

        assert_eq!(mem.seek_ge(&newest("a")).unwrap().user_key.as_ref(), b"b");
        assert_eq!(mem.seek_ge(&newest("c")).unwrap().user_key.as_ref(), b"d");
        assert!(mem.seek_ge(&oldest("d")).is_none());

        assert_eq!(mem.seek_le(&oldest("b")).unwrap().user_key.as_ref(), b"b");
        assert!(mem.seek_lt(&newest("b")).is_none());
        assert_eq!(mem.seek_lt(&newest("d")).unwrap().user_key.as_ref(), b"b");

        assert_eq!(mem.seek_gt(&oldest("b")).unwrap().user_key.as_ref(), b"d");
        assert!(mem.seek_gt(&oldest("d")).is_none());
        assert_eq!(mem.first_key().unwrap().user_key.as_ref(), b"b");
        assert_eq!(mem.last_key().unwrap().user_key.as_ref(), b"d");
    }

    #[test]
    fn test_custom_comparator_order() {
        let reverse = Arc::new(FnComparator::new("reverse", |a: &[u8], b: &[u8]| b.cmp(a)));
        let mem = MemTable::new(InternalKeyComparator::new(reverse));
        for (i, key) in ["a", "c", "b"].iter().enumerate() {
            put(&mem, key, i as SeqNo + 1, key);
        }
        let keys: Vec<_> = mem.iter().map(|entry| entry.key.user_key.to_vec()).collect();
        assert_eq!(keys, vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);
    }
}
