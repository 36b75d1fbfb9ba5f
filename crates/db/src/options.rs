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

use std::{cmp::Ordering, str::FromStr, sync::Arc};

use burrow_common::readable_size::ReadableSize;
use snafu::ensure;
use strum_macros::{AsRefStr, Display, EnumString};

use crate::{
    comparator::{ComparatorRef, FnComparator, default_comparator},
    compaction::CompactionOptions,
    err::{ConfigurationSnafu, InvalidArgumentSnafu, Result, TypeMismatchSnafu},
};

pub(crate) const DEFAULT_WRITE_BUFFER_SIZE: ReadableSize = ReadableSize::mb(4);
pub(crate) const DEFAULT_MAX_OPEN_FILES: usize = 1000;
pub(crate) const DEFAULT_BLOCK_CACHE_SIZE: ReadableSize = ReadableSize::mb(8);
pub(crate) const DEFAULT_BLOCK_SIZE: ReadableSize = ReadableSize::kb(4);
pub(crate) const DEFAULT_BLOCK_RESTART_INTERVAL: usize = 16;

/// Per-block compression codec for table files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Compression {
    #[default]
    None,
    Snappy,
    Zstd,
}

impl Compression {
    /// Parses a codec identifier, rejecting anything this build cannot
    /// encode.
    pub fn parse(name: &str) -> Result<Self> {
        Compression::from_str(name).map_err(|_| {
            InvalidArgumentSnafu {
                message: format!("unsupported compression type: {name:?}"),
            }
            .build()
        })
    }

    pub(crate) fn to_byte(self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Zstd => 1,
            Compression::Snappy => 2,
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Compression::None),
            1 => Some(Compression::Zstd),
            2 => Some(Compression::Snappy),
            _ => None,
        }
    }
}

type CompareFn = Arc<dyn Fn(&[u8], &[u8]) -> Ordering + Send + Sync>;

/// Options for opening a store.
///
/// Built with chained setters and checked by [`Options::validate`], which
/// [`crate::DB::open`] runs before touching the filesystem.
///
/// ```no_run
/// use burrow_common::readable_size::ReadableSize;
/// use burrow_db::{Compression, DB, Options};
///
/// let options = Options::new()
///     .create_if_missing(true)
///     .write_buffer_size(ReadableSize::mb(8))
///     .compression(Compression::Zstd);
/// let db = DB::open("/tmp/burrow", options)?;
/// # Ok::<(), burrow_db::Error>(())
/// ```
#[derive(Clone)]
pub struct Options {
    pub(crate) create_if_missing:      bool,
    pub(crate) error_if_exists:        bool,
    pub(crate) paranoid_checks:        bool,
    pub(crate) write_buffer_size:      ReadableSize,
    pub(crate) max_open_files:         usize,
    pub(crate) block_cache_size:       ReadableSize,
    pub(crate) block_size:             ReadableSize,
    pub(crate) block_restart_interval: usize,
    pub(crate) compression:            Compression,
    pub(crate) bloom_filter_bits:      usize,
    comparator:                        Option<ComparatorRef>,
    comparator_fn:                     Option<CompareFn>,
    comparator_name:                   Option<String>,
    pub(crate) compaction:             CompactionOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            create_if_missing:      false,
            error_if_exists:        false,
            paranoid_checks:        false,
            write_buffer_size:      DEFAULT_WRITE_BUFFER_SIZE,
            max_open_files:         DEFAULT_MAX_OPEN_FILES,
            block_cache_size:       DEFAULT_BLOCK_CACHE_SIZE,
            block_size:             DEFAULT_BLOCK_SIZE,
            block_restart_interval: DEFAULT_BLOCK_RESTART_INTERVAL,
            compression:            Compression::None,
            bloom_filter_bits:      0,
            comparator:             None,
            comparator_fn:          None,
            comparator_name:        None,
            compaction:             CompactionOptions::default(),
        }
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("create_if_missing", &self.create_if_missing)
            .field("error_if_exists", &self.error_if_exists)
            .field("paranoid_checks", &self.paranoid_checks)
            .field("write_buffer_size", &self.write_buffer_size)
            .field("max_open_files", &self.max_open_files)
            .field("block_cache_size", &self.block_cache_size)
            .field("block_size", &self.block_size)
            .field("block_restart_interval", &self.block_restart_interval)
            .field("compression", &self.compression)
            .field("bloom_filter_bits", &self.bloom_filter_bits)
            .field("comparator", &self.comparator_display_name())
            .field("compaction", &self.compaction)
            .finish()
    }
}

impl Options {
    pub fn new() -> Self { Self::default() }

    pub fn create_if_missing(mut self, yes: bool) -> Self {
        self.create_if_missing = yes;
        self
    }

    pub fn error_if_exists(mut self, yes: bool) -> Self {
        self.error_if_exists = yes;
        self
    }

    /// Verifies every checksum on read and fails recovery on any damaged log
    /// record instead of skipping it.
    pub fn paranoid_checks(mut self, yes: bool) -> Self {
        self.paranoid_checks = yes;
        self
    }

    /// Memtable size at which it is frozen and flushed to a level-0 table.
    pub fn write_buffer_size(mut self, size: impl Into<ReadableSize>) -> Self {
        self.write_buffer_size = size.into();
        self
    }

    /// Upper bound on table files kept open at once.
    pub fn max_open_files(mut self, count: usize) -> Self {
        self.max_open_files = count;
        self
    }

    /// Capacity of the decoded block cache. Zero disables the cache.
    pub fn block_cache_size(mut self, size: impl Into<ReadableSize>) -> Self {
        self.block_cache_size = size.into();
        self
    }

    pub fn block_size(mut self, size: impl Into<ReadableSize>) -> Self {
        self.block_size = size.into();
        self
    }

    pub fn block_restart_interval(mut self, interval: usize) -> Self {
        self.block_restart_interval = interval;
        self
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Bits per key for table bloom filters. Zero disables them.
    pub fn bloom_filter_bits(mut self, bits: usize) -> Self {
        self.bloom_filter_bits = bits;
        self
    }

    /// Sets both the ordering and its persisted name from one comparator.
    pub fn comparator(mut self, comparator: ComparatorRef) -> Self {
        self.comparator = Some(comparator);
        self.comparator_fn = None;
        self.comparator_name = None;
        self
    }

    /// Sets a closure ordering. It must be paired with
    /// [`Options::comparator_name`].
    pub fn comparator_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&[u8], &[u8]) -> Ordering + Send + Sync + 'static,
    {
        self.comparator = None;
        self.comparator_fn = Some(Arc::new(f));
        self
    }

    pub fn comparator_name(mut self, name: impl Into<String>) -> Self {
        self.comparator = None;
        self.comparator_name = Some(name.into());
        self
    }

    pub fn compaction_options(mut self, options: CompactionOptions) -> Self {
        self.compaction = options;
        self
    }

    /// Builds options from loosely typed `(name, value)` pairs, failing on
    /// the first bad pair.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, OptionValue)>,
    {
        let mut options = Options::default();
        for (name, value) in pairs {
            options.set(name, value)?;
        }
        options.validate()?;
        Ok(options)
    }

    /// Applies one loosely typed option by name.
    ///
    /// A `Null` value leaves the option at its current setting, except for
    /// `block_cache_size` where it disables the cache.
    pub fn set(&mut self, name: &str, value: OptionValue) -> Result<()> {
        match name {
            "create_if_missing" => {
                if let Some(v) = value.into_bool(name)? {
                    self.create_if_missing = v;
                }
            }
            "error_if_exists" => {
                if let Some(v) = value.into_bool(name)? {
                    self.error_if_exists = v;
                }
            }
            "paranoid_checks" => {
                if let Some(v) = value.into_bool(name)? {
                    self.paranoid_checks = v;
                }
            }
            "write_buffer_size" => {
                if let Some(v) = value.into_positive(name)? {
                    self.write_buffer_size = ReadableSize(v);
                }
            }
            "max_open_files" => {
                if let Some(v) = value.into_positive(name)? {
                    self.max_open_files = v as usize;
                }
            }
            "block_cache_size" | "lru_cache_size" => {
                self.block_cache_size = ReadableSize(value.into_non_negative(name)?.unwrap_or(0));
            }
            "block_size" => {
                if let Some(v) = value.into_positive(name)? {
                    self.block_size = ReadableSize(v);
                }
            }
            "block_restart_interval" => {
                if let Some(v) = value.into_positive(name)? {
                    self.block_restart_interval = v as usize;
                }
            }
            "bloom_filter_bits" => {
                if let Some(v) = value.into_non_negative(name)? {
                    self.bloom_filter_bits = v as usize;
                }
            }
            "compression" => match value {
                OptionValue::Null => self.compression = Compression::None,
                OptionValue::Str(s) => self.compression = Compression::parse(&s)?,
                OptionValue::Bytes(b) => {
                    self.compression = Compression::parse(&String::from_utf8_lossy(&b))?
                }
                other => {
                    return TypeMismatchSnafu {
                        option:   name,
                        expected: "a string",
                        actual:   other.type_name(),
                    }
                    .fail();
                }
            },
            "comparator_name" => match value {
                OptionValue::Null => self.comparator_name = None,
                OptionValue::Str(s) => self.comparator_name = Some(s),
                OptionValue::Bytes(b) => {
                    let name = String::from_utf8(b).map_err(|_| {
                        InvalidArgumentSnafu {
                            message: "comparator_name must be valid UTF-8",
                        }
                        .build()
                    })?;
                    self.comparator_name = Some(name);
                }
                other => {
                    return TypeMismatchSnafu {
                        option:   name,
                        expected: "a byte string",
                        actual:   other.type_name(),
                    }
                    .fail();
                }
            },
            "comparator" => match value {
                OptionValue::Null => self.comparator_fn = None,
                other => {
                    return TypeMismatchSnafu {
                        option:   name,
                        expected: "a callable",
                        actual:   other.type_name(),
                    }
                    .fail();
                }
            },
            _ => {
                return ConfigurationSnafu {
                    message: format!("unknown option `{name}`"),
                }
                .fail();
            }
        }
        Ok(())
    }

    /// Checks that the options are complete and consistent.
    pub fn validate(&self) -> Result<()> {
        match (&self.comparator_fn, &self.comparator_name) {
            (Some(_), None) => {
                return ConfigurationSnafu {
                    message: "a comparator requires a comparator_name",
                }
                .fail();
            }
            (None, Some(_)) if self.comparator.is_none() => {
                return ConfigurationSnafu {
                    message: "a comparator_name requires a comparator",
                }
                .fail();
            }
            _ => {}
        }
        let name = self.comparator_display_name();
        ensure!(
            !name.is_empty(),
            ConfigurationSnafu {
                message: "comparator name must not be empty",
            }
        );

        ensure!(
            !self.write_buffer_size.is_zero(),
            InvalidArgumentSnafu {
                message: "write_buffer_size must be positive",
            }
        );
        ensure!(
            !self.block_size.is_zero(),
            InvalidArgumentSnafu {
                message: "block_size must be positive",
            }
        );
        ensure!(
            self.block_restart_interval > 0,
            InvalidArgumentSnafu {
                message: "block_restart_interval must be positive",
            }
        );
        ensure!(
            self.max_open_files > 0,
            InvalidArgumentSnafu {
                message: "max_open_files must be positive",
            }
        );
        self.compaction.validate()
    }

    /// Resolves the configured ordering, defaulting to bytewise.
    pub(crate) fn resolve_comparator(&self) -> Result<ComparatorRef> {
        if let Some(comparator) = &self.comparator {
            return Ok(comparator.clone());
        }
        match (&self.comparator_fn, &self.comparator_name) {
            (Some(f), Some(name)) => {
                let f = f.clone();
                Ok(Arc::new(FnComparator::new(name.clone(), move |a: &[u8], b: &[u8]| f(a, b))))
            }
            (None, None) => Ok(default_comparator()),
            _ => ConfigurationSnafu {
                message: "comparator and comparator_name must be given together",
            }
            .fail(),
        }
    }

    fn comparator_display_name(&self) -> String {
        match (&self.comparator, &self.comparator_name) {
            (Some(c), _) => c.name().to_string(),
            (None, Some(name)) => name.clone(),
            (None, None) => default_comparator().name().to_string(),
        }
    }
}

/// A loosely typed option value, used when options arrive as name/value
/// pairs rather than through the typed setters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Null,
    Bool(bool),
    Int(i64),
    Bytes(Vec<u8>),
    Str(String),
}

impl OptionValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            OptionValue::Null => "null",
            OptionValue::Bool(_) => "a boolean",
            OptionValue::Int(_) => "an integer",
            OptionValue::Bytes(_) => "a byte string",
            OptionValue::Str(_) => "a string",
        }
    }

    fn into_bool(self, option: &str) -> Result<Option<bool>> {
        match self {
            OptionValue::Null => Ok(None),
            OptionValue::Bool(v) => Ok(Some(v)),
            other => TypeMismatchSnafu {
                option,
                expected: "a boolean",
                actual: other.type_name(),
            }
            .fail(),
        }
    }

    fn into_int(self, option: &str) -> Result<Option<i64>> {
        match self {
            OptionValue::Null => Ok(None),
            OptionValue::Int(v) => Ok(Some(v)),
            other => TypeMismatchSnafu {
                option,
                expected: "an integer",
                actual: other.type_name(),
            }
            .fail(),
        }
    }

    fn into_positive(self, option: &str) -> Result<Option<u64>> {
        match self.into_int(option)? {
            None => Ok(None),
            Some(v) if v > 0 => Ok(Some(v as u64)),
            Some(v) => InvalidArgumentSnafu {
                message: format!("{option} must be positive, got {v}"),
            }
            .fail(),
        }
    }

    fn into_non_negative(self, option: &str) -> Result<Option<u64>> {
        match self.into_int(option)? {
            None => Ok(None),
            Some(v) if v >= 0 => Ok(Some(v as u64)),
            Some(v) => InvalidArgumentSnafu {
                message: format!("{option} must not be negative, got {v}"),
            }
            .fail(),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self { OptionValue::Bool(v) }
}

impl From<i64> for OptionValue {
    fn from(v: i64) -> Self { OptionValue::Int(v) }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self { OptionValue::Str(v.to_string()) }
}

impl From<String> for OptionValue {
    fn from(v: String) -> Self { OptionValue::Str(v) }
}

impl From<&[u8]> for OptionValue {
    fn from(v: &[u8]) -> Self { OptionValue::Bytes(v.to_vec()) }
}

impl From<Vec<u8>> for OptionValue {
    fn from(v: Vec<u8>) -> Self { OptionValue::Bytes(v) }
}

impl<T: Into<OptionValue>> From<Option<T>> for OptionValue {
    fn from(v: Option<T>) -> Self { v.map_or(OptionValue::Null, Into::into) }
}

/// Options for point reads.
#[derive(Debug, Clone, Copy, bon::Builder)]
pub struct ReadOptions {
    /// Verify block checksums on every read.
    #[builder(default)]
    pub verify_checksums: bool,
    /// Insert blocks read for this operation into the block cache.
    #[builder(default = true)]
    pub fill_cache:       bool,
}

impl Default for ReadOptions {
    fn default() -> Self { Self::builder().build() }
}

#[derive(Debug, Clone, Copy, Default, bon::Builder)]
pub struct WriteOptions {
    /// Fsync the write-ahead log before acknowledging the write.
    #[builder(default)]
    pub sync: bool,
}

/// Options for range iteration.
///
/// `start` is inclusive and `stop` exclusive for both directions. `prefix`
/// is shorthand for the range covering every key with that prefix and
/// cannot be combined with `start` or `stop`.
#[derive(Debug, Clone, bon::Builder)]
pub struct IteratorOptions {
    #[builder(into)]
    pub start:            Option<Vec<u8>>,
    #[builder(into)]
    pub stop:             Option<Vec<u8>>,
    #[builder(into)]
    pub prefix:           Option<Vec<u8>>,
    #[builder(default)]
    pub reverse:          bool,
    #[builder(default = true)]
    pub include_key:      bool,
    #[builder(default = true)]
    pub include_value:    bool,
    #[builder(default)]
    pub verify_checksums: bool,
    #[builder(default = true)]
    pub fill_cache:       bool,
}

impl Default for IteratorOptions {
    fn default() -> Self { Self::builder().build() }
}

impl IteratorOptions {
    pub(crate) fn read_options(&self) -> ReadOptions {
        ReadOptions {
            verify_checksums: self.verify_checksums,
            fill_cache:       self.fill_cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn test_defaults() {
        let options = Options::default();
        assert!(!options.create_if_missing);
        assert!(!options.error_if_exists);
        assert_eq!(options.write_buffer_size, DEFAULT_WRITE_BUFFER_SIZE);
        assert_eq!(options.compression, Compression::None);
        assert_eq!(options.bloom_filter_bits, 0);
        options.validate().unwrap();

        let read = ReadOptions::default();
        assert!(!read.verify_checksums);
        assert!(read.fill_cache);
        assert!(!WriteOptions::default().sync);

        let iter = IteratorOptions::default();
        assert!(iter.include_key && iter.include_value && !iter.reverse);
    }

    #[test_case("none", Compression::None; "none")]
    #[test_case("zstd", Compression::Zstd; "zstd")]
    #[test_case("ZSTD", Compression::Zstd; "case insensitive")]
    #[test_case("snappy", Compression::Snappy; "snappy")]
    fn test_compression_parse(name: &str, expected: Compression) {
        assert_eq!(Compression::parse(name).unwrap(), expected);
    }

    #[test_case("lz4"; "unsupported codec")]
    #[test_case("foo"; "unknown identifier")]
    fn test_compression_parse_rejects(name: &str) {
        let err = Compression::parse(name).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidArgument { .. }), "{err}");
    }

    #[test]
    fn test_comparator_without_name() {
        let options = Options::new().comparator_fn(|a, b| a.cmp(b));
        assert!(options.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn test_name_without_comparator() {
        let options = Options::new().comparator_name("reverse");
        assert!(options.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn test_paired_comparator_resolves() {
        let options = Options::new()
            .comparator_fn(|a, b| b.cmp(a))
            .comparator_name("reverse");
        options.validate().unwrap();
        let comparator = options.resolve_comparator().unwrap();
        assert_eq!(comparator.name(), "reverse");
        assert_eq!(comparator.compare(b"a", b"b"), Ordering::Greater);
    }

    #[test_case("write_buffer_size", OptionValue::from("1024"); "string for integer")]
    #[test_case("create_if_missing", OptionValue::from(1_i64); "integer for boolean")]
    #[test_case("comparator_name", OptionValue::from(3_i64); "integer for name")]
    #[test_case("comparator", OptionValue::from("not callable"); "string for comparator")]
    #[test_case("compression", OptionValue::from(true); "boolean for compression")]
    fn test_set_type_mismatch(name: &str, value: OptionValue) {
        let mut options = Options::default();
        let err = options.set(name, value).unwrap_err();
        assert!(matches!(err, crate::Error::TypeMismatch { .. }), "{err}");
    }

    #[test_case("write_buffer_size", OptionValue::from(0_i64); "zero write buffer")]
    #[test_case("block_cache_size", OptionValue::from(-1_i64); "negative cache")]
    #[test_case("compression", OptionValue::from("foo"); "unknown compression")]
    fn test_set_invalid_argument(name: &str, value: OptionValue) {
        let mut options = Options::default();
        let err = options.set(name, value).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidArgument { .. }), "{err}");
    }

    #[test]
    fn test_set_unknown_option() {
        let mut options = Options::default();
        assert!(
            options
                .set("no_such_option", OptionValue::from(true))
                .unwrap_err()
                .is_configuration()
        );
    }

    #[test]
    fn test_from_pairs() {
        let options = Options::from_pairs([
            ("create_if_missing", OptionValue::from(true)),
            ("write_buffer_size", OptionValue::from(64_i64 * 1024)),
            ("block_cache_size", OptionValue::Null),
            ("bloom_filter_bits", OptionValue::from(10_i64)),
            ("compression", OptionValue::from(b"zstd".as_slice())),
        ])
        .unwrap();
        assert!(options.create_if_missing);
        assert_eq!(options.write_buffer_size, ReadableSize::kb(64));
        assert!(options.block_cache_size.is_zero());
        assert_eq!(options.bloom_filter_bits, 10);
        assert_eq!(options.compression, Compression::Zstd);
    }

    #[test]
    fn test_iterator_options_builder() {
        let options = IteratorOptions::builder()
            .start(b"a")
            .stop("z")
            .reverse(true)
            .include_value(false)
            .build();
        assert_eq!(options.start.as_deref(), Some(&b"a"[..]));
        assert_eq!(options.stop.as_deref(), Some(&b"z"[..]));
        assert!(options.reverse);
        assert!(options.include_key);
        assert!(!options.include_value);
    }
}
