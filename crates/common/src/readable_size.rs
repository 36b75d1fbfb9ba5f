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
    fmt::{self, Display, Formatter},
    ops::{Add, Div, Mul},
    str::FromStr,
};

use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, Visitor},
};
use snafu::{Snafu, ensure};

const UNIT: u64 = 1;
const KIB: u64 = UNIT * 1024;
const MIB: u64 = KIB * 1024;
const GIB: u64 = MIB * 1024;
const TIB: u64 = GIB * 1024;

#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub))]
pub enum ParseSizeError {
    #[snafu(display("Size string is empty"))]
    Empty,

    #[snafu(display("Invalid size number `{number}` in `{input}`"))]
    InvalidNumber { input: String, number: String },

    #[snafu(display("Unknown size unit `{unit}` in `{input}`"))]
    UnknownUnit { input: String, unit: String },

    #[snafu(display("Size `{input}` overflows u64"))]
    Overflow { input: String },
}

/// A byte size that prints and parses in a human readable form, e.g.
/// `4MiB`, `64KiB` or `512B`.
///
/// Binary multiples are used for every unit, so `1KB` and `1KiB` both mean
/// 1024 bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReadableSize(pub u64);

impl ReadableSize {
    pub const fn b(count: u64) -> ReadableSize { ReadableSize(count) }

    pub const fn kb(count: u64) -> ReadableSize { ReadableSize(count * KIB) }

    pub const fn mb(count: u64) -> ReadableSize { ReadableSize(count * MIB) }

    pub const fn gb(count: u64) -> ReadableSize { ReadableSize(count * GIB) }

    pub const fn as_bytes(self) -> u64 { self.0 }

    pub const fn as_kb(self) -> u64 { self.0 / KIB }

    pub const fn as_mb(self) -> u64 { self.0 / MIB }

    pub const fn is_zero(self) -> bool { self.0 == 0 }
}

impl From<u64> for ReadableSize {
    fn from(bytes: u64) -> Self { ReadableSize(bytes) }
}

impl From<ReadableSize> for u64 {
    fn from(size: ReadableSize) -> Self { size.0 }
}

impl Add for ReadableSize {
    type Output = ReadableSize;

    fn add(self, rhs: ReadableSize) -> ReadableSize { ReadableSize(self.0 + rhs.0) }
}

impl Mul<u64> for ReadableSize {
    type Output = ReadableSize;

    fn mul(self, rhs: u64) -> ReadableSize { ReadableSize(self.0 * rhs) }
}

impl Div<u64> for ReadableSize {
    type Output = ReadableSize;

    fn div(self, rhs: u64) -> ReadableSize { ReadableSize(self.0 / rhs) }
}

impl Display for ReadableSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let size = self.0;
        if size == 0 {
            write!(f, "0B")
        } else if size % TIB == 0 {
            write!(f, "{}TiB", size / TIB)
        } else if size % GIB == 0 {
            write!(f, "{}GiB", size / GIB)
        } else if size % MIB == 0 {
            write!(f, "{}MiB", size / MIB)
        } else if size % KIB == 0 {
            write!(f, "{}KiB", size / KIB)
        } else {
            write!(f, "{size}B")
        }
    }
}

impl FromStr for ReadableSize {
    type Err = ParseSizeError;

    fn from_str(s: &str) -> Result<ReadableSize, ParseSizeError> {
        let input = s.trim();
        ensure!(!input.is_empty(), EmptySnafu);

        let split = input
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(input.len());
        let (number, unit) = input.split_at(split);

        let count: u64 = number.parse().map_err(|_| ParseSizeError::InvalidNumber {
            input:  input.to_string(),
            number: number.to_string(),
        })?;

        let multiplier = match unit.trim().to_ascii_uppercase().as_str() {
            "" | "B" => UNIT,
            "K" | "KB" | "KIB" => KIB,
            "M" | "MB" | "MIB" => MIB,
            "G" | "GB" | "GIB" => GIB,
            "T" | "TB" | "TIB" => TIB,
            _ => {
                return UnknownUnitSnafu {
                    input,
                    unit: unit.trim(),
                }
                .fail();
            }
        };

        count
            .checked_mul(multiplier)
            .map(ReadableSize)
            .ok_or_else(|| ParseSizeError::Overflow {
                input: input.to_string(),
            })
    }
}

impl Serialize for ReadableSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ReadableSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SizeVisitor;

        impl Visitor<'_> for SizeVisitor {
            type Value = ReadableSize;

            fn expecting(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
                formatter.write_str("a byte count or a size string such as \"4MiB\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<ReadableSize, E> {
                Ok(ReadableSize(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<ReadableSize, E> {
                u64::try_from(v)
                    .map(ReadableSize)
                    .map_err(|_| E::custom(format!("negative size: {v}")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ReadableSize, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(SizeVisitor)
    }
}
