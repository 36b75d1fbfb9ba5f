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

#![allow(dead_code)]

use std::path::Path;

use burrow_db::{DB, DBIterator, IterItem, IteratorOptions, Options, Result};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Routes engine logs to the test harness; `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn open(dir: &Path, options: Options) -> DB {
    init_tracing();
    DB::open(dir, options.create_if_missing(true)).unwrap()
}

/// A fresh store in its own temporary directory.
pub fn temp_db() -> (TempDir, DB) {
    let dir = TempDir::new().unwrap();
    let db = open(dir.path(), Options::new());
    (dir, db)
}

pub fn put_all(db: &DB, keys: &[&str]) {
    for key in keys {
        db.put(key, format!("value-{key}")).unwrap();
    }
}

pub fn key_of(item: Result<IterItem>) -> String {
    let item = item.unwrap();
    String::from_utf8(item.key().unwrap().to_vec()).unwrap()
}

/// Drains `iter` through [`Iterator`], returning the keys as strings.
pub fn keys(iter: DBIterator) -> Vec<String> { iter.map(key_of).collect() }

pub fn range(start: &str, stop: &str) -> IteratorOptions {
    IteratorOptions::builder()
        .start(start.as_bytes())
        .stop(stop.as_bytes())
        .build()
}
