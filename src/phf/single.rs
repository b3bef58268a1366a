/*
 *
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Sequential construction and evaluation of a single perfect hash
//! function.
//!
//! [`SinglePhfBuilder`] distributes 128-bit signatures to the buckets of a
//! [`SkewBucketer`], orders buckets by decreasing size, and searches for
//! each bucket the smallest *pilot* whose hash, XORed with the second half
//! of every signature in the bucket, displaces all of them onto distinct
//! free slots of a table of size *m*. [`SinglePhf`] retraces the same steps
//! at query time; in minimal mode, positions at least *n* are remapped onto
//! the slots below *n* left free by the search, stored as an
//! [Elias–Fano sequence](crate::dict::elias_fano).
//!
//! Construction is a deterministic function of the signatures, the seed,
//! and the configuration.

use super::{BuildConfig, BuildError, BuildTimings, SeedError};
use crate::bits::BitVec;
use crate::dict::elias_fano::{EliasFano, EliasFanoBuilder};
use crate::hash::{hash_pilot, Hash128, ToHash128, HASH_BITS};
use crate::phf::bucketer::{Bucketer, SkewBucketer};
use crate::phf::encoder::{CompactPilots, PilotEncoder};
use crate::utils::{compute_m_u64, fastmod_u64};
use dsi_progress_logger::ProgressLog;
use epserde::*;
use mem_dbg::*;
use std::cmp::Reverse;
use std::time::Instant;

/// The internal-memory builder of a [`SinglePhf`].
///
/// The builder holds the uncompressed outputs of the search (pilots and
/// free slots); the artifact encodes them. Partitioned construction runs
/// one builder per partition.
#[derive(Debug, Clone, Default)]
pub struct SinglePhfBuilder {
    seed: u64,
    num_keys: u64,
    table_size: u64,
    bucketer: SkewBucketer,
    pilots: Vec<u64>,
    free_slots: Vec<u64>,
}

impl SinglePhfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds from an iterator of signatures hashed with `seed`.
    ///
    /// On [`SeedError`] the caller may retry the whole build with a
    /// different seed.
    pub fn build_from_hashes(
        &mut self,
        hashes: impl ExactSizeIterator<Item = Hash128>,
        config: &BuildConfig,
        seed: u64,
        pl: &mut impl ProgressLog,
    ) -> Result<BuildTimings, SeedError> {
        let num_keys = hashes.len() as u64;
        let table_size = super::table_size(num_keys, config.alpha);
        let m = compute_m_u64(table_size);
        let num_buckets = config
            .num_buckets
            .unwrap_or_else(|| super::num_buckets(num_keys, config.c));
        let bucketer = SkewBucketer::new(num_buckets);

        let mut timings = BuildTimings::default();
        let start = Instant::now();

        // Map: (bucket, payload) pairs.
        pl.item_name("key");
        pl.expected_updates(Some(num_keys as usize));
        pl.start("Mapping keys to buckets...");
        let mut pairs = Vec::with_capacity(num_keys as usize);
        for hash in hashes {
            pairs.push((bucketer.bucket(hash.first()), hash.second()));
            pl.light_update();
        }
        pl.done();

        // Group: sorting by (bucket, payload) makes intra-bucket payload
        // collisions adjacent.
        pairs.sort_unstable();
        for window in pairs.windows(2) {
            if window[0] == window[1] {
                return Err(SeedError::BucketCollision);
            }
        }

        // Order: nonempty buckets by decreasing size; the sort is stable,
        // so ties break by increasing bucket index.
        let mut buckets = Vec::new();
        let mut begin = 0;
        for i in 1..=pairs.len() {
            if i == pairs.len() || pairs[i].0 != pairs[begin].0 {
                buckets.push((pairs[begin].0, begin..i));
                begin = i;
            }
        }
        buckets.sort_by_key(|(_, range)| Reverse(range.len()));
        timings.mapping_ordering_seconds = start.elapsed().as_secs_f64();

        pl.info(format_args!(
            "Table size: {} Buckets: {} Max bucket size: {}",
            table_size,
            num_buckets,
            buckets.first().map_or(0, |(_, range)| range.len())
        ));

        // Search.
        let start = Instant::now();
        let mut taken = BitVec::new(table_size as usize);
        let mut pilots = vec![0; num_buckets as usize];
        let mut positions = Vec::with_capacity(buckets.first().map_or(0, |(_, range)| range.len()));
        pl.item_name("bucket");
        pl.expected_updates(Some(buckets.len()));
        pl.start("Searching pilots...");
        for (bucket, range) in &buckets {
            let payloads = &pairs[range.clone()];
            let mut pilot = 0;
            'search: loop {
                if pilot >= config.pilot_limit {
                    return Err(SeedError::PilotSearchExhausted);
                }
                let hashed_pilot = hash_pilot(pilot, seed);
                positions.clear();
                for &(_, payload) in payloads {
                    let position = fastmod_u64(payload ^ hashed_pilot, m, table_size);
                    if taken.get(position as usize) || positions.contains(&position) {
                        pilot += 1;
                        continue 'search;
                    }
                    positions.push(position);
                }
                break;
            }
            for &position in &positions {
                taken.set(position as usize, true);
            }
            pilots[*bucket as usize] = pilot;
            pl.light_update();
        }
        pl.done();
        timings.searching_seconds = start.elapsed().as_secs_f64();

        self.seed = seed;
        self.num_keys = num_keys;
        self.table_size = table_size;
        self.bucketer = bucketer;
        self.pilots = pilots;
        self.free_slots.clear();
        if config.minimal && num_keys < table_size {
            fill_free_slots(&taken, num_keys, &mut self.free_slots);
        }
        Ok(timings)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn num_keys(&self) -> u64 {
        self.num_keys
    }

    pub fn table_size(&self) -> u64 {
        self.table_size
    }

    pub fn bucketer(&self) -> &SkewBucketer {
        &self.bucketer
    }

    pub fn pilots(&self) -> &[u64] {
        &self.pilots
    }

    pub fn free_slots(&self) -> &[u64] {
        &self.free_slots
    }
}

/// Pairs, in increasing order, each position in [n..m) with the free slot
/// below n it remaps to.
///
/// Untaken positions in [n..m) are never reached by a key: they repeat the
/// previous value so that the sequence stays monotone and Elias–Fano
/// encodable.
fn fill_free_slots(taken: &BitVec, num_keys: u64, free_slots: &mut Vec<u64>) {
    let mut next_free_slot = 0;
    let mut last_free_slot = 0;
    for slot in num_keys as usize..taken.len() {
        if taken.get(slot) {
            while taken.get(next_free_slot as usize) {
                next_free_slot += 1;
            }
            free_slots.push(next_free_slot);
            last_free_slot = next_free_slot;
            next_free_slot += 1;
        } else {
            free_slots.push(last_free_slot);
        }
    }
}

/// A single perfect hash function.
///
/// Immutable after construction; queries need no synchronization. The
/// pilot storage is a generic parameter defaulting to [`CompactPilots`].
///
/// # Examples
///
/// ```rust
/// # fn main() -> Result<(), pthash::phf::BuildError> {
/// use pthash::phf::{BuildConfig, SinglePhf};
/// use dsi_progress_logger::no_logging;
///
/// let keys: Vec<u64> = (0..1000).collect();
/// let config = BuildConfig {
///     seed: Some(42),
///     minimal: true,
///     ..BuildConfig::default()
/// };
/// let mut phf: SinglePhf = SinglePhf::default();
/// phf.build_in_internal_memory(&keys, &config, no_logging![])?;
///
/// let mut seen = vec![false; 1000];
/// for key in &keys {
///     seen[phf.get(key) as usize] = true;
/// }
/// assert!(seen.iter().all(|&taken| taken));
/// #     Ok(())
/// # }
/// ```
#[derive(Epserde, Debug, Clone, MemDbg, MemSize)]
pub struct SinglePhf<E = CompactPilots> {
    seed: u64,
    num_keys: u64,
    table_size: u64,
    m: u128,
    bucketer: SkewBucketer,
    pilots: E,
    free_slots: EliasFano,
    minimal: bool,
}

impl<E: PilotEncoder + Default> Default for SinglePhf<E> {
    fn default() -> Self {
        Self {
            seed: 0,
            num_keys: 0,
            table_size: 0,
            m: 0,
            bucketer: SkewBucketer::default(),
            pilots: E::default(),
            free_slots: EliasFano::empty(),
            minimal: false,
        }
    }
}

impl<E: PilotEncoder> SinglePhf<E> {
    /// Builds this function over `keys`.
    ///
    /// A [`SeedError`] is transient: retry with a different seed. All other
    /// errors are fatal.
    pub fn build_in_internal_memory<K: ToHash128>(
        &mut self,
        keys: &[K],
        config: &BuildConfig,
        pl: &mut impl ProgressLog,
    ) -> Result<BuildTimings, BuildError> {
        config.validate()?;
        if keys.is_empty() {
            return Err(BuildError::InvalidArgument("at least one key is required"));
        }
        super::check_hash_collision_probability(keys.len() as u64, HASH_BITS)?;
        let seed = config.seed.unwrap_or_else(rand::random);

        let mut builder = SinglePhfBuilder::new();
        let mut timings = builder.build_from_hashes(
            keys.iter().map(|key| K::to_hash128(key, seed)),
            config,
            seed,
            pl,
        )?;

        let start = Instant::now();
        self.encode(&builder, config.minimal);
        timings.encoding_seconds = start.elapsed().as_secs_f64();
        Ok(timings)
    }

    /// Encodes the outputs of a builder into this artifact.
    pub(crate) fn encode(&mut self, builder: &SinglePhfBuilder, minimal: bool) {
        self.seed = builder.seed;
        self.num_keys = builder.num_keys;
        self.table_size = builder.table_size;
        self.m = compute_m_u64(self.table_size);
        self.bucketer = builder.bucketer;
        self.pilots.encode(&builder.pilots);
        self.free_slots = if minimal && self.num_keys < self.table_size {
            let mut efb =
                EliasFanoBuilder::new(builder.free_slots.len(), self.num_keys);
            for &slot in &builder.free_slots {
                efb.push(slot);
            }
            efb.build()
        } else {
            EliasFano::empty()
        };
        self.minimal = minimal;
    }

    /// Returns the output of this function on `key`.
    #[inline]
    pub fn get<K: ToHash128 + ?Sized>(&self, key: &K) -> u64 {
        self.position(K::to_hash128(key, self.seed))
    }

    /// Returns the output of this function on a precomputed signature.
    #[inline]
    pub fn position(&self, hash: Hash128) -> u64 {
        let bucket = self.bucketer.bucket(hash.first());
        let pilot = self.pilots.access(bucket);
        let position = fastmod_u64(
            hash.second() ^ hash_pilot(pilot, self.seed),
            self.m,
            self.table_size,
        );
        if self.minimal && position >= self.num_keys {
            return self.free_slots.get((position - self.num_keys) as usize);
        }
        position
    }

    /// Returns the number of keys of this function.
    #[inline(always)]
    pub fn num_keys(&self) -> u64 {
        self.num_keys
    }

    /// Returns the size of the table the keys are mapped into. Outputs are
    /// smaller than this value, or smaller than [`num_keys`](Self::num_keys)
    /// for minimal functions.
    #[inline(always)]
    pub fn table_size(&self) -> u64 {
        self.table_size
    }

    #[inline(always)]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns whether this function is a bijection onto [0..n).
    #[inline(always)]
    pub fn minimal(&self) -> bool {
        self.minimal
    }

    /// Returns the number of bits used by seed, sizes, bucketer, and
    /// pilots.
    pub fn num_bits_for_pilots(&self) -> u64 {
        8 * (core::mem::size_of::<u64>() * 3 + core::mem::size_of::<u128>()) as u64
            + self.bucketer.num_bits()
            + self.pilots.num_bits()
    }

    /// Returns the number of bits used by the free-slots mapper.
    pub fn num_bits_for_mapper(&self) -> u64 {
        self.free_slots.num_bits()
    }

    /// Returns the total number of bits used by this structure.
    pub fn num_bits(&self) -> u64 {
        self.num_bits_for_pilots() + self.num_bits_for_mapper()
    }
}
