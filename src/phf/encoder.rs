/*
 *
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Compressed storage of per-bucket pilots.
//!
//! The pilot sequence is behind the [`PilotEncoder`] trait, a generic
//! parameter of the artifacts: the correctness of the construction does not
//! depend on the concrete encoding, only on `access` returning exactly the
//! encoded values. [`CompactPilots`], the shipped default, stores pilots at
//! the minimal fixed width; dictionary or Elias–Fano encodings can be
//! plugged in by implementing the trait.

use crate::bits::BitFieldVec;
use epserde::*;
use mem_dbg::*;

/// A compressed sequence of per-bucket pilots.
pub trait PilotEncoder {
    /// Encodes the given pilot values.
    fn encode(&mut self, pilots: &[u64]);

    /// Returns the pilot of given index.
    ///
    /// Must run in constant time.
    fn access(&self, index: u64) -> u64;

    /// Returns the number of encoded pilots.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of bits of the underlying storage.
    fn num_bits(&self) -> u64;
}

/// Pilots stored at the minimal fixed bit width.
#[derive(Epserde, Debug, Clone, Hash, MemDbg, MemSize)]
pub struct CompactPilots {
    pilots: BitFieldVec,
}

impl Default for CompactPilots {
    fn default() -> Self {
        Self {
            pilots: BitFieldVec::new(0, 0),
        }
    }
}

impl PilotEncoder for CompactPilots {
    fn encode(&mut self, pilots: &[u64]) {
        let max = pilots.iter().copied().max().unwrap_or(0);
        let bit_width = (64 - max.leading_zeros() as usize).max(1);
        let mut data = BitFieldVec::new(bit_width, pilots.len());
        for (index, &pilot) in pilots.iter().enumerate() {
            data.set(index, pilot);
        }
        self.pilots = data;
    }

    #[inline(always)]
    fn access(&self, index: u64) -> u64 {
        self.pilots.get(index as usize)
    }

    #[inline(always)]
    fn len(&self) -> u64 {
        self.pilots.len() as u64
    }

    fn num_bits(&self) -> u64 {
        self.pilots.num_bits()
    }
}
