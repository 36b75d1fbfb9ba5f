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

use std::{cmp::Ordering, fmt, sync::Arc};

use crate::format::InternalKey;

/// Name recorded for the default byte-lexicographic ordering.
pub const BYTEWISE_COMPARATOR_NAME: &str = "burrow.BytewiseComparator";

/// A total order over user keys.
///
/// The name identifies the ordering on disk: it is persisted when a store is
/// created and checked every time the store is reopened, so two comparators
/// that order keys differently must never share a name.
pub trait Comparator: Send + Sync {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    fn name(&self) -> &str;
}

pub type ComparatorRef = Arc<dyn Comparator>;

impl fmt::Debug for dyn Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Comparator").field(&self.name()).finish()
    }
}

/// Plain byte-lexicographic order, the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytewiseComparator;

impl Comparator for BytewiseComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering { a.cmp(b) }

    fn name(&self) -> &str { BYTEWISE_COMPARATOR_NAME }
}

/// A comparator backed by a closure and an explicit name.
pub struct FnComparator<F> {
    name: String,
    f:    F,
}

impl<F> FnComparator<F>
where
    F: Fn(&[u8], &[u8]) -> Ordering + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Comparator for FnComparator<F>
where
    F: Fn(&[u8], &[u8]) -> Ordering + Send + Sync,
{
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering { (self.f)(a, b) }

    fn name(&self) -> &str { &self.name }
}

pub fn default_comparator() -> ComparatorRef { Arc::new(BytewiseComparator) }

/// Orders internal keys by user key under the user comparator, then by
/// sequence number descending so the newest version of a key sorts first.
#[derive(Debug, Clone)]
pub(crate) struct InternalKeyComparator {
    user: ComparatorRef,
}

impl InternalKeyComparator {
    pub(crate) fn new(user: ComparatorRef) -> Self { Self { user } }

    pub(crate) fn name(&self) -> &str { self.user.name() }

    pub(crate) fn is_bytewise(&self) -> bool { self.user.name() == BYTEWISE_COMPARATOR_NAME }

    pub(crate) fn compare_user(&self, a: &[u8], b: &[u8]) -> Ordering { self.user.compare(a, b) }

    pub(crate) fn compare(&self, a: &InternalKey, b: &InternalKey) -> Ordering {
        self.user
            .compare(&a.user_key, &b.user_key)
            .then_with(|| b.seqno.cmp(&a.seqno))
            .then_with(|| (b.value_type as u8).cmp(&(a.value_type as u8)))
    }
}

/// Returns the shortest byte string greater than every key starting with
/// `prefix`, or `None` when no such bound exists (the prefix is empty or all
/// `0xff`).
pub(crate) fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}
