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

//! Exclusive ownership of a store directory.

use std::{
    collections::BTreeSet,
    fs::{File, OpenOptions},
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use parking_lot::{Mutex, const_mutex};
use snafu::ResultExt;
use tracing::debug;

use crate::{
    err::{IOSnafu, Result},
    format::LOCK_FILE,
};

/// Canonical paths of the stores held by this process.
static LOCKED_STORES: Mutex<BTreeSet<PathBuf>> = const_mutex(BTreeSet::new());

/// Held while a handle, `repair` or `destroy` owns a store directory.
///
/// Creating the `LOCK` file doubles as a writability check, so a directory
/// the process cannot write to fails here with an IO error.
#[derive(Debug)]
pub(crate) struct StoreLock {
    path:  PathBuf,
    _file: File,
}

impl StoreLock {
    pub(crate) fn acquire(dir: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join(LOCK_FILE))
            .context(IOSnafu)?;
        let path = dir.canonicalize().context(IOSnafu)?;
        if !LOCKED_STORES.lock().insert(path.clone()) {
            return Err(io::Error::new(
                ErrorKind::WouldBlock,
                format!("lock on {} already held by this process", path.display()),
            ))
            .context(IOSnafu);
        }
        debug!(path = %path.display(), "acquired store lock");
        Ok(Self { path, _file: file })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        LOCKED_STORES.lock().remove(&self.path);
        debug!(path = %self.path.display(), "released store lock");
    }
}
