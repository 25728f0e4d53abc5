//! # Bitstring Status List
//!
//! A compressed bitstring implementation of [`Allocator`], following the
//! token status list encoding: one bit per index, index 0 in the least
//! significant bit of the first byte, ZLIB compressed.

use std::io::{Read, Write};

use anyhow::{anyhow, bail};
use base64ct::{Base64UrlUnpadded, Encoding};
use bitvec::order::Lsb0;
use bitvec::vec::BitVec;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::allocator::{Allocator, Take};
use crate::config::{Allocation, ListConfig};

type Bits = BitVec<u8, Lsb0>;

/// A status list backed by two bit vectors: the published status bits and
/// the record of which slots have been issued.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitstringList {
    allocation: Allocation,
    seed: u64,
    next: usize,
    status: Bits,
    issued: Bits,
}

#[derive(Deserialize, Serialize)]
struct Dump {
    bits: u8,
    size: usize,
    #[serde(default)]
    allocation: Allocation,
    #[serde(default)]
    seed: u64,
    next: usize,
    lst: String,
    issued: String,
}

impl BitstringList {
    /// Number of slots issued so far.
    #[must_use]
    pub const fn issued(&self) -> usize {
        self.next
    }

    // Pseudo-random starting point for the next take. Derived from the
    // seed and the allocation count so a reloaded list continues the same
    // sequence.
    fn start(&self) -> usize {
        match self.allocation {
            Allocation::Sequential => self.next,
            Allocation::Random => {
                let mut rng = StdRng::seed_from_u64(self.seed ^ self.next as u64);
                rng.gen_range(0..self.capacity())
            }
        }
    }
}

impl Allocator for BitstringList {
    fn new(config: &ListConfig) -> Self {
        Self {
            allocation: config.allocation,
            seed: rand::random(),
            next: 0,
            status: Bits::repeat(false, config.capacity),
            issued: Bits::repeat(false, config.capacity),
        }
    }

    fn take(&mut self) -> Take {
        if self.next >= self.capacity() {
            return Take::Exhausted;
        }

        let start = self.start();
        let free = self.issued[start..]
            .first_zero()
            .map(|i| start + i)
            .or_else(|| self.issued[..start].first_zero());
        let Some(index) = free else {
            return Take::Exhausted;
        };

        self.issued.set(index, true);
        self.next += 1;
        Take::Index(index)
    }

    fn set(&mut self, index: usize, value: bool) -> anyhow::Result<()> {
        if index >= self.capacity() {
            bail!("status index {index} out of range");
        }
        self.status.set(index, value);
        Ok(())
    }

    fn get(&self, index: usize) -> anyhow::Result<bool> {
        self.status
            .get(index)
            .map(|bit| *bit)
            .ok_or_else(|| anyhow!("status index {index} out of range"))
    }

    fn capacity(&self) -> usize {
        self.status.len()
    }

    fn compressed(&self) -> anyhow::Result<Vec<u8>> {
        compress(&self.status)
    }

    fn dump(&self) -> anyhow::Result<Value> {
        let dump = Dump {
            bits: 1,
            size: self.capacity(),
            allocation: self.allocation,
            seed: self.seed,
            next: self.next,
            lst: Base64UrlUnpadded::encode_string(&compress(&self.status)?),
            issued: Base64UrlUnpadded::encode_string(&compress(&self.issued)?),
        };
        Ok(serde_json::to_value(dump)?)
    }

    fn load(value: &Value) -> anyhow::Result<Self> {
        let dump: Dump = serde_json::from_value(value.clone())?;
        if dump.bits != 1 {
            bail!("unsupported bits per status: {}", dump.bits);
        }

        let status = decompress(&dump.lst, dump.size)?;
        let issued = decompress(&dump.issued, dump.size)?;
        if dump.next > dump.size || issued.count_ones() != dump.next {
            bail!("issued count does not match the issued bits");
        }

        Ok(Self {
            allocation: dump.allocation,
            seed: dump.seed,
            next: dump.next,
            status,
            issued,
        })
    }
}

fn compress(bits: &Bits) -> anyhow::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(bits.as_raw_slice())?;
    Ok(encoder.finish()?)
}

fn decompress(encoded: &str, size: usize) -> anyhow::Result<Bits> {
    let compressed =
        Base64UrlUnpadded::decode_vec(encoded).map_err(|e| anyhow!("issue decoding list: {e}"))?;
    let mut bytes = Vec::new();
    ZlibDecoder::new(compressed.as_slice()).read_to_end(&mut bytes)?;

    let mut bits = Bits::from_vec(bytes);
    if bits.len() < size {
        bail!("list holds {} bits, expected {size}", bits.len());
    }
    bits.truncate(size);
    Ok(bits)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rstest::rstest;

    use super::*;

    fn config(capacity: usize, allocation: Allocation) -> ListConfig {
        ListConfig {
            capacity,
            allocation,
        }
    }

    fn inflate(compressed: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        ZlibDecoder::new(compressed).read_to_end(&mut bytes).expect("should inflate");
        bytes
    }

    #[test]
    fn sequential_order() {
        let mut list = BitstringList::new(&config(4, Allocation::Sequential));
        let taken: Vec<Take> = (0..5).map(|_| list.take()).collect();
        assert_eq!(
            taken,
            vec![Take::Index(0), Take::Index(1), Take::Index(2), Take::Index(3), Take::Exhausted]
        );
    }

    #[rstest]
    #[case::random(Allocation::Random)]
    #[case::sequential(Allocation::Sequential)]
    fn distinct_until_exhausted(#[case] allocation: Allocation) {
        let mut list = BitstringList::new(&config(100, allocation));
        let mut seen = HashSet::new();
        while let Take::Index(i) = list.take() {
            assert!(i < 100);
            assert!(seen.insert(i), "index {i} issued twice");
        }
        assert_eq!(seen.len(), 100);
        assert_eq!(list.take(), Take::Exhausted);
    }

    #[test]
    fn zero_capacity() {
        let mut list = BitstringList::new(&config(0, Allocation::Random));
        assert_eq!(list.take(), Take::Exhausted);
    }

    #[test]
    fn lsb_first() {
        let mut list = BitstringList::new(&config(16, Allocation::Sequential));
        list.set(0, true).expect("should set");
        list.set(9, true).expect("should set");

        let compressed = list.compressed().expect("should compress");
        assert_eq!(inflate(&compressed), vec![0x01, 0x02]);
    }

    #[test]
    fn out_of_range() {
        let mut list = BitstringList::new(&config(8, Allocation::Sequential));
        assert!(list.set(8, true).is_err());
        assert!(list.get(8).is_err());
    }

    #[test]
    fn load_continues_sequence() {
        let mut list = BitstringList::new(&config(64, Allocation::Random));
        for _ in 0..10 {
            list.take();
        }
        list.set(3, true).expect("should set");

        let dump = list.dump().expect("should dump");
        assert_eq!(dump["bits"], 1);
        assert_eq!(dump["size"], 64);
        assert_eq!(dump["next"], 10);

        let mut loaded = BitstringList::load(&dump).expect("should load");
        assert_eq!(loaded, list);
        assert!(loaded.get(3).expect("should get"));

        let expected: Vec<Take> = (0..20).map(|_| list.take()).collect();
        let actual: Vec<Take> = (0..20).map(|_| loaded.take()).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn load_rejects_truncated() {
        let list = BitstringList::new(&config(64, Allocation::Random));
        let mut dump = list.dump().expect("should dump");
        dump["size"] = 128.into();
        assert!(BitstringList::load(&dump).is_err());
    }
}
