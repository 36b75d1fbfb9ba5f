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

//! Whole-table bloom filters over user keys.
//!
//! ```text
//! +-----------------------+-----------------+
//! | bit array (N bytes)   | num_probes (1)  |
//! +-----------------------+-----------------+
//! ```

use bytes::{BufMut, Bytes, BytesMut};

/// Accumulates key hashes while a table is written and emits the filter block
/// once the table is finished.
#[derive(Debug)]
pub(crate) struct FilterBuilder {
    bits_per_key: usize,
    hashes:       Vec<u64>,
}

impl FilterBuilder {
    pub(crate) fn new(bits_per_key: usize) -> Self {
        Self {
            bits_per_key,
            hashes: Vec::new(),
        }
    }

    pub(crate) fn add_key(&mut self, user_key: &[u8]) {
        let hash = fnv1a(user_key);
        // Versions of one key arrive back to back.
        if self.hashes.last() != Some(&hash) {
            self.hashes.push(hash);
        }
    }

    pub(crate) fn finish(&self) -> Bytes {
        // k = bits_per_key * ln(2), clamped to a sane range
        let num_probes = ((self.bits_per_key as f64) * 0.69).round().clamp(1.0, 30.0) as u8;
        let num_bits = (self.hashes.len() * self.bits_per_key).max(64);
        let num_bytes = num_bits.div_ceil(8);
        let num_bits = num_bytes * 8;

        let mut bits = vec![0u8; num_bytes];
        for &hash in &self.hashes {
            for probe in probe_positions(hash, num_probes, num_bits) {
                bits[probe / 8] |= 1 << (probe % 8);
            }
        }

        let mut buf = BytesMut::with_capacity(num_bytes + 1);
        buf.put_slice(&bits);
        buf.put_u8(num_probes);
        buf.freeze()
    }
}

/// A decoded filter block.
#[derive(Debug, Clone)]
pub(crate) struct BloomFilter {
    bits:       Bytes,
    num_probes: u8,
}

impl BloomFilter {
    /// Returns `None` for a block too short to be a filter.
    pub(crate) fn decode(data: Bytes) -> Option<Self> {
        if data.len() < 2 {
            return None;
        }
        let num_probes = data[data.len() - 1];
        if num_probes == 0 {
            return None;
        }
        Some(Self {
            bits: data.slice(..data.len() - 1),
            num_probes,
        })
    }

    /// False means the key is definitely absent from the table.
    pub(crate) fn may_contain(&self, user_key: &[u8]) -> bool {
        let num_bits = self.bits.len() * 8;
        probe_positions(fnv1a(user_key), self.num_probes, num_bits)
            .all(|probe| self.bits[probe / 8] & (1 << (probe % 8)) != 0)
    }
}

fn fnv1a(key: &[u8]) -> u64 {
    key.iter().fold(0xcbf2_9ce4_8422_2325_u64, |hash, &byte| {
        (hash ^ byte as u64).wrapping_mul(0x0100_0000_01b3)
    })
}

/// Double hashing: probe i lands on h1 + i * h2.
fn probe_positions(hash: u64, num_probes: u8, num_bits: usize) -> impl Iterator<Item = usize> {
    let h1 = hash;
    let h2 = hash.rotate_right(32) | 1;
    (0..num_probes as u64).map(move |i| (h1.wrapping_add(i.wrapping_mul(h2)) % num_bits as u64) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(keys: &[&[u8]], bits_per_key: usize) -> BloomFilter {
        let mut builder = FilterBuilder::new(bits_per_key);
        for key in keys {
            builder.add_key(key);
        }
        BloomFilter::decode(builder.finish()).unwrap()
    }

    #[test]
    fn test_no_false_negatives() {
        let keys: Vec<Vec<u8>> = (0..2000).map(|i| format!("key-{i}").into_bytes()).collect();
        let refs: Vec<&[u8]> = keys.iter().map(|k| k.as_slice()).collect();
        let filter = build(&refs, 10);
        for key in &refs {
            assert!(filter.may_contain(key));
        }
    }

    #[test]
    fn test_false_positive_rate() {
        let keys: Vec<Vec<u8>> = (0..1000).map(|i| format!("key-{i}").into_bytes()).collect();
        let refs: Vec<&[u8]> = keys.iter().map(|k| k.as_slice()).collect();
        let filter = build(&refs, 10);

        let false_positives = (0..10_000)
            .filter(|i| filter.may_contain(format!("missing-{i}").as_bytes()))
            .count();
        // ~1% expected at 10 bits per key
        assert!(false_positives < 500, "false positives: {false_positives}");
    }

    #[test]
    fn test_empty_filter() {
        let filter = build(&[], 10);
        assert!(!filter.may_contain(b"anything"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(BloomFilter::decode(Bytes::from_static(b"x")).is_none());
        assert!(BloomFilter::decode(Bytes::from_static(b"\xff\x00")).is_none());
    }
}
