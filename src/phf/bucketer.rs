/*
 *
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Bucketers map 64-bit hashes to bucket indices.
//!
//! [`SkewBucketer`] is deliberately non-uniform: 60% of the hash range is
//! concentrated into the first 30% of the buckets, so that the buckets
//! searched first (in decreasing size order) are large and the expensive
//! tail of the search works on small buckets. [`UniformBucketer`] is the
//! uniform mapping used to partition keys.
//!
//! Both must return the same index for the same hash at construction and
//! query time.

use crate::utils::{compute_m_u64, fastmod_u64};
use epserde::*;
use mem_dbg::*;

/// `⌊0.6·2⁶⁴⌋`: hashes below this threshold go to the dense buckets.
const DENSE_THRESHOLD: u64 = 11068046444225730969;

pub trait Bucketer {
    /// Returns the bucket of the given hash.
    fn bucket(&self, hash: u64) -> u64;
    /// Returns the overall number of buckets.
    fn num_buckets(&self) -> u64;
    /// Returns the number of bits used by this structure.
    fn num_bits(&self) -> u64;
}

/// The skewed bucketer of single functions: 60% of the hash range maps to
/// 30% of the buckets.
#[derive(Epserde, Debug, Clone, Copy, Default, Hash, MemDbg, MemSize)]
pub struct SkewBucketer {
    num_dense_buckets: u64,
    num_sparse_buckets: u64,
    m_num_dense_buckets: u128,
    m_num_sparse_buckets: u128,
}

impl SkewBucketer {
    /// Creates a bucketer over `num_buckets` buckets.
    ///
    /// `num_buckets` must be nonzero.
    pub fn new(num_buckets: u64) -> Self {
        debug_assert!(num_buckets != 0);
        let num_dense_buckets = ((0.3 * num_buckets as f64) as u64).clamp(1, num_buckets);
        let num_sparse_buckets = num_buckets - num_dense_buckets;
        Self {
            num_dense_buckets,
            num_sparse_buckets,
            m_num_dense_buckets: compute_m_u64(num_dense_buckets),
            m_num_sparse_buckets: if num_sparse_buckets == 0 {
                0
            } else {
                compute_m_u64(num_sparse_buckets)
            },
        }
    }
}

impl Bucketer for SkewBucketer {
    #[inline(always)]
    fn bucket(&self, hash: u64) -> u64 {
        if hash < DENSE_THRESHOLD || self.num_sparse_buckets == 0 {
            fastmod_u64(hash, self.m_num_dense_buckets, self.num_dense_buckets)
        } else {
            self.num_dense_buckets
                + fastmod_u64(hash, self.m_num_sparse_buckets, self.num_sparse_buckets)
        }
    }

    #[inline(always)]
    fn num_buckets(&self) -> u64 {
        self.num_dense_buckets + self.num_sparse_buckets
    }

    fn num_bits(&self) -> u64 {
        8 * (2 * core::mem::size_of::<u64>() + 2 * core::mem::size_of::<u128>()) as u64
    }
}

/// The uniform bucketer used to partition keys.
#[derive(Epserde, Debug, Clone, Copy, Default, Hash, MemDbg, MemSize)]
pub struct UniformBucketer {
    num_buckets: u64,
    m_num_buckets: u128,
}

impl UniformBucketer {
    /// Creates a bucketer over `num_buckets` buckets.
    ///
    /// `num_buckets` must be nonzero.
    pub fn new(num_buckets: u64) -> Self {
        debug_assert!(num_buckets != 0);
        Self {
            num_buckets,
            m_num_buckets: compute_m_u64(num_buckets),
        }
    }
}

impl Bucketer for UniformBucketer {
    #[inline(always)]
    fn bucket(&self, hash: u64) -> u64 {
        fastmod_u64(hash, self.m_num_buckets, self.num_buckets)
    }

    #[inline(always)]
    fn num_buckets(&self) -> u64 {
        self.num_buckets
    }

    fn num_bits(&self) -> u64 {
        8 * (core::mem::size_of::<u64>() + core::mem::size_of::<u128>()) as u64
    }
}
