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

use std::path::PathBuf;

use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the storage engine.
///
/// Variants fall into a handful of classes which callers usually care about
/// more than the exact variant: configuration problems
/// ([`Error::is_configuration`]), store access failures at open time
/// ([`Error::is_store_access`]), iterator exhaustion
/// ([`Error::is_exhausted`]) and data corruption ([`Error::is_corruption`]).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// Options are missing, contradictory or unknown.
    #[snafu(display("Invalid configuration: {message}"))]
    Configuration { message: String },

    /// A loosely typed option received a value of the wrong type.
    #[snafu(display("Option `{option}` expects {expected}, got {actual}"))]
    TypeMismatch {
        option:   String,
        expected: &'static str,
        actual:   &'static str,
    },

    /// The value has the right type but is not acceptable.
    #[snafu(display("Invalid argument: {message}"))]
    InvalidArgument { message: String },

    #[snafu(display("Store does not exist at {} (create_if_missing is false)", path.display()))]
    StoreNotFound { path: PathBuf },

    #[snafu(display("Store already exists at {} (error_if_exists is true)", path.display()))]
    StoreExists { path: PathBuf },

    #[snafu(display("Comparator `{requested}` does not match `{existing}` used to create the store"))]
    ComparatorMismatch { existing: String, requested: String },

    #[snafu(display("IO error: {source}"))]
    IO { source: std::io::Error },

    /// An iterator was stepped past either end of its range.
    #[snafu(display("Iterator exhausted"))]
    Exhausted,

    #[snafu(display("Corruption: {message}"))]
    Corruption { message: String },

    #[snafu(display("Checksum mismatch in {what}: expected {expected:#010x}, got {actual:#010x}"))]
    ChecksumMismatch {
        what:     String,
        expected: u32,
        actual:   u32,
    },

    #[snafu(display("Invalid SSTable file {path}: {reason}"))]
    InvalidSSTFile { path: String, reason: String },

    #[snafu(display("Store is closed"))]
    Closed,
}

impl Error {
    pub fn is_exhausted(&self) -> bool { matches!(self, Error::Exhausted) }

    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::Corruption { .. } | Error::ChecksumMismatch { .. } | Error::InvalidSSTFile { .. }
        )
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Configuration { .. } | Error::ComparatorMismatch { .. }
        )
    }

    pub fn is_store_access(&self) -> bool {
        matches!(
            self,
            Error::StoreNotFound { .. } | Error::StoreExists { .. } | Error::IO { .. }
        )
    }
}
