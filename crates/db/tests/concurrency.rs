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

mod common;

use std::{sync::Arc, thread};

use burrow_common::readable_size::ReadableSize;
use burrow_db::{IteratorOptions, Options};
use common::{keys, open};
use tempfile::TempDir;

const THREADS: usize = 10;
const KEYS_PER_THREAD: usize = 1000;

fn key(thread: usize, i: usize) -> String { format!("t{thread:02}-{i:04}") }

#[test]
fn test_concurrent_writers() {
    let dir = TempDir::new().unwrap();
    let db = open(
        dir.path(),
        Options::new().write_buffer_size(ReadableSize::kb(64)),
    );

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let db = db.clone();
            thread::spawn(move || {
                for i in 0..KEYS_PER_THREAD {
                    db.put(key(t, i), format!("{t}:{i}")).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = db.stats().unwrap();
    assert_eq!(stats.last_sequence, (THREADS * KEYS_PER_THREAD) as u64);
    for t in 0..THREADS {
        for i in 0..KEYS_PER_THREAD {
            let value = db.get(key(t, i)).unwrap().unwrap();
            assert_eq!(&value[..], format!("{t}:{i}").as_bytes());
        }
    }

    let found = keys(db.iter().unwrap());
    assert_eq!(found.len(), THREADS * KEYS_PER_THREAD);
    assert!(found.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_readers_see_monotonic_state() {
    let dir = TempDir::new().unwrap();
    let db = open(
        dir.path(),
        Options::new().write_buffer_size(ReadableSize::kb(16)),
    );
    let done = Arc::new(std::sync::atomic::AtomicBool::new(false));

    let writer = {
        let db = db.clone();
        let done = done.clone();
        thread::spawn(move || {
            for i in 0..2000 {
                db.put(format!("k{i:05}"), b"v").unwrap();
            }
            done.store(true, std::sync::atomic::Ordering::Release);
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let db = db.clone();
            let done = done.clone();
            thread::spawn(move || {
                let mut last_seen = 0;
                while !done.load(std::sync::atomic::Ordering::Acquire) {
                    let snapshot = db.snapshot().unwrap();
                    let seen = snapshot.iter().unwrap().count();
                    // Keys are written in order, so a snapshot holds a prefix
                    assert_eq!(seen as u64, snapshot.sequence());
                    assert!(seen >= last_seen);
                    last_seen = seen;
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    let reverse = IteratorOptions::builder().reverse(true).build();
    assert_eq!(db.iterator(reverse).unwrap().count(), 2000);
}
