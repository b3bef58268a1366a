/*
 *
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Partitioned construction and evaluation.
//!
//! Keys are distributed to partitions by a [`UniformBucketer`] over the
//! [mixed signature](crate::hash::Hash128::mix); each partition is an
//! independent [`SinglePhf`] built sequentially on its own slice of the
//! signatures, so partitions can be processed by parallel workers and peak
//! construction memory is bounded by the partition size. The outputs of
//! partition *i* are shifted by the cumulative output range of the
//! partitions before it.
//!
//! The built function is a deterministic function of the key sequence, the
//! seed, and the configuration; the number of worker threads does not
//! affect it.

use super::{BuildConfig, BuildError, BuildTimings, SeedError, MIN_PARTITION_SIZE};
use crate::hash::{Hash128, ToHash128, HASH_BITS};
use crate::phf::bucketer::{Bucketer, UniformBucketer};
use crate::phf::encoder::{CompactPilots, PilotEncoder};
use crate::phf::single::{SinglePhf, SinglePhfBuilder};
use dsi_progress_logger::{no_logging, ProgressLog};
use epserde::*;
use mem_dbg::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// The internal-memory builder of a [`PartitionedPhf`].
#[derive(Debug, Clone, Default)]
pub struct PartitionedPhfBuilder {
    seed: u64,
    num_keys: u64,
    table_size: u64,
    bucketer: UniformBucketer,
    offsets: Vec<u64>,
    builders: Vec<SinglePhfBuilder>,
}

impl PartitionedPhfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hashes `keys` and builds one sub-builder per partition.
    pub fn build_from_keys<K: ToHash128>(
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
        self.build_from_hashes(
            keys.iter().map(|key| K::to_hash128(key, seed)),
            config,
            seed,
            pl,
        )
    }

    /// Builds from an iterator of signatures hashed with `seed`.
    pub fn build_from_hashes(
        &mut self,
        hashes: impl ExactSizeIterator<Item = Hash128>,
        config: &BuildConfig,
        seed: u64,
        pl: &mut impl ProgressLog,
    ) -> Result<BuildTimings, BuildError> {
        let num_keys = hashes.len() as u64;
        let mut timings = BuildTimings::default();
        let start = Instant::now();

        let mut num_partitions = config.num_partitions.min(num_keys.max(1));
        if (num_keys as f64 / num_partitions as f64) < MIN_PARTITION_SIZE as f64
            && num_partitions > 1
        {
            num_partitions = 1;
        }
        pl.info(format_args!("Number of partitions: {}", num_partitions));

        self.seed = seed;
        self.num_keys = num_keys;
        self.bucketer = UniformBucketer::new(num_partitions);

        let average_partition_size = num_keys as f64 / num_partitions as f64;
        let mut partitions: Vec<Vec<Hash128>> = (0..num_partitions)
            .map(|_| Vec::with_capacity((1.5 * average_partition_size) as usize))
            .collect();

        pl.item_name("key");
        pl.expected_updates(Some(num_keys as usize));
        pl.start("Partitioning keys...");
        for hash in hashes {
            partitions[self.bucketer.bucket(hash.mix()) as usize].push(hash);
            pl.light_update();
        }
        pl.done();

        self.table_size = 0;
        self.offsets = Vec::with_capacity(num_partitions as usize);
        let mut cumulative_size = 0;
        for partition in &partitions {
            let table_size = super::table_size(partition.len() as u64, config.alpha);
            self.table_size += table_size;
            self.offsets.push(cumulative_size);
            cumulative_size += if config.minimal {
                partition.len() as u64
            } else {
                table_size
            };
        }

        // Sub-builds are sequential and silent; the bucket budget of a
        // single function over the whole key set is split evenly.
        let partition_config = BuildConfig {
            seed: Some(seed),
            num_partitions,
            num_buckets: Some((super::num_buckets(num_keys, config.c) / num_partitions).max(1)),
            num_threads: 1,
            ..config.clone()
        };

        timings.partitioning_seconds = start.elapsed().as_secs_f64();

        self.builders = vec![SinglePhfBuilder::new(); num_partitions as usize];
        let t = build_partitions(
            &partitions,
            &mut self.builders,
            &partition_config,
            seed,
            config.num_threads,
        )?;
        timings.mapping_ordering_seconds = t.mapping_ordering_seconds;
        timings.searching_seconds = t.searching_seconds;
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

    pub fn num_partitions(&self) -> u64 {
        self.builders.len() as u64
    }

    pub fn bucketer(&self) -> &UniformBucketer {
        &self.bucketer
    }

    /// The starting position of each partition in the output space.
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    pub fn builders(&self) -> &[SinglePhfBuilder] {
        &self.builders
    }
}

/// Runs the sub-builders, in parallel if `num_threads > 1`.
///
/// Workers own contiguous ranges of partitions. The first failure raises a
/// flag that makes the other workers stop at the next partition boundary;
/// in-flight partitions finish first.
fn build_partitions(
    partitions: &[Vec<Hash128>],
    builders: &mut [SinglePhfBuilder],
    config: &BuildConfig,
    seed: u64,
    num_threads: usize,
) -> Result<BuildTimings, BuildError> {
    let mut timings = BuildTimings::default();
    let num_partitions = partitions.len();

    if num_threads > 1 {
        let chunk_size = num_partitions.div_ceil(num_threads);
        let num_chunks = num_partitions.div_ceil(chunk_size);
        let mut outcomes: Vec<Result<BuildTimings, SeedError>> =
            (0..num_chunks).map(|_| Ok(BuildTimings::default())).collect();
        let failed = AtomicBool::new(false);

        std::thread::scope(|s| {
            for ((partition_chunk, builder_chunk), outcome) in partitions
                .chunks(chunk_size)
                .zip(builders.chunks_mut(chunk_size))
                .zip(outcomes.iter_mut())
            {
                let failed = &failed;
                s.spawn(move || {
                    let mut chunk_timings = BuildTimings::default();
                    for (partition, builder) in
                        partition_chunk.iter().zip(builder_chunk.iter_mut())
                    {
                        if failed.load(Ordering::Relaxed) {
                            return;
                        }
                        match builder.build_from_hashes(
                            partition.iter().copied(),
                            config,
                            seed,
                            no_logging![],
                        ) {
                            Ok(t) => {
                                chunk_timings.mapping_ordering_seconds +=
                                    t.mapping_ordering_seconds;
                                chunk_timings.searching_seconds += t.searching_seconds;
                            }
                            Err(error) => {
                                failed.store(true, Ordering::Relaxed);
                                *outcome = Err(error);
                                return;
                            }
                        }
                    }
                    *outcome = Ok(chunk_timings);
                });
            }
        });

        let mut first_error = None;
        for outcome in outcomes {
            match outcome {
                Ok(t) => {
                    // Concurrent phases report the slowest worker.
                    timings.mapping_ordering_seconds = timings
                        .mapping_ordering_seconds
                        .max(t.mapping_ordering_seconds);
                    timings.searching_seconds =
                        timings.searching_seconds.max(t.searching_seconds);
                }
                Err(error) => {
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
            }
        }
        if let Some(error) = first_error {
            return Err(error.into());
        }
    } else {
        for (partition, builder) in partitions.iter().zip(builders.iter_mut()) {
            let t =
                builder.build_from_hashes(partition.iter().copied(), config, seed, no_logging![])?;
            timings.mapping_ordering_seconds += t.mapping_ordering_seconds;
            timings.searching_seconds += t.searching_seconds;
        }
    }
    Ok(timings)
}

/// A partition of a [`PartitionedPhf`]: a single function plus its starting
/// position in the output space.
#[derive(Epserde, Debug, Clone, MemDbg, MemSize)]
pub struct Partition<E = CompactPilots> {
    offset: u64,
    phf: SinglePhf<E>,
}

/// A perfect hash function built over independent partitions.
///
/// The query surface is the same as [`SinglePhf`]'s; construction
/// parallelizes over partitions and bounds peak memory by the partition
/// size.
///
/// # Examples
///
/// ```rust
/// # fn main() -> Result<(), pthash::phf::BuildError> {
/// use pthash::phf::{BuildConfig, PartitionedPhf};
/// use dsi_progress_logger::no_logging;
///
/// let keys: Vec<u64> = (0..100_000).collect();
/// let config = BuildConfig {
///     seed: Some(1),
///     minimal: true,
///     num_partitions: 4,
///     num_threads: 2,
///     ..BuildConfig::default()
/// };
/// let mut phf: PartitionedPhf = PartitionedPhf::default();
/// phf.build_in_internal_memory(&keys, &config, no_logging![])?;
///
/// let mut seen = vec![false; 100_000];
/// for key in &keys {
///     seen[phf.get(key) as usize] = true;
/// }
/// assert!(seen.iter().all(|&taken| taken));
/// #     Ok(())
/// # }
/// ```
#[derive(Epserde, Debug, Clone, MemDbg, MemSize)]
pub struct PartitionedPhf<E = CompactPilots> {
    seed: u64,
    num_keys: u64,
    table_size: u64,
    bucketer: UniformBucketer,
    partitions: Vec<Partition<E>>,
    minimal: bool,
}

impl<E: PilotEncoder + Default> Default for PartitionedPhf<E> {
    fn default() -> Self {
        Self {
            seed: 0,
            num_keys: 0,
            table_size: 0,
            bucketer: UniformBucketer::default(),
            partitions: Vec::new(),
            minimal: false,
        }
    }
}

impl<E: PilotEncoder + Default> PartitionedPhf<E> {
    /// Builds this function over `keys`.
    ///
    /// A [`SeedError`](super::SeedError) is transient: retry with a
    /// different seed. All other errors are fatal.
    pub fn build_in_internal_memory<K: ToHash128>(
        &mut self,
        keys: &[K],
        config: &BuildConfig,
        pl: &mut impl ProgressLog,
    ) -> Result<BuildTimings, BuildError> {
        let mut builder = PartitionedPhfBuilder::new();
        let mut timings = builder.build_from_keys(keys, config, pl)?;

        let start = Instant::now();
        self.seed = builder.seed;
        self.num_keys = builder.num_keys;
        self.table_size = builder.table_size;
        self.bucketer = builder.bucketer;
        self.partitions = builder
            .offsets
            .iter()
            .zip(&builder.builders)
            .map(|(&offset, sub_builder)| {
                let mut phf = SinglePhf::default();
                phf.encode(sub_builder, config.minimal);
                Partition { offset, phf }
            })
            .collect();
        self.minimal = config.minimal;
        timings.encoding_seconds = start.elapsed().as_secs_f64();
        Ok(timings)
    }
}

impl<E: PilotEncoder> PartitionedPhf<E> {
    /// Returns the output of this function on `key`.
    #[inline]
    pub fn get<K: ToHash128 + ?Sized>(&self, key: &K) -> u64 {
        self.position(K::to_hash128(key, self.seed))
    }

    /// Returns the output of this function on a precomputed signature.
    ///
    /// Partitioning uses the mixed signature; the sub-function uses the two
    /// halves.
    #[inline]
    pub fn position(&self, hash: Hash128) -> u64 {
        let partition = &self.partitions[self.bucketer.bucket(hash.mix()) as usize];
        partition.offset + partition.phf.position(hash)
    }

    /// Returns the number of keys of this function.
    #[inline(always)]
    pub fn num_keys(&self) -> u64 {
        self.num_keys
    }

    /// Returns the sum of the table sizes of the partitions.
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

    #[inline(always)]
    pub fn num_partitions(&self) -> u64 {
        self.partitions.len() as u64
    }

    /// Returns the number of bits used by seeds, sizes, bucketers, and
    /// pilots.
    pub fn num_bits_for_pilots(&self) -> u64 {
        let mut bits =
            8 * (4 * core::mem::size_of::<u64>()) as u64 + self.bucketer.num_bits();
        for partition in &self.partitions {
            bits += 8 * core::mem::size_of::<u64>() as u64
                + partition.phf.num_bits_for_pilots();
        }
        bits
    }

    /// Returns the number of bits used by the free-slots mappers.
    pub fn num_bits_for_mapper(&self) -> u64 {
        self.partitions
            .iter()
            .map(|partition| partition.phf.num_bits_for_mapper())
            .sum()
    }

    /// Returns the total number of bits used by this structure.
    pub fn num_bits(&self) -> u64 {
        self.num_bits_for_pilots() + self.num_bits_for_mapper()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn decimal_keys(n: u64) -> Vec<String> {
        (0..n).map(|i| i.to_string()).collect()
    }

    fn build(
        keys: &[String],
        config: &BuildConfig,
    ) -> Result<PartitionedPhf, BuildError> {
        let mut phf: PartitionedPhf = PartitionedPhf::default();
        phf.build_in_internal_memory(keys, config, no_logging![])?;
        Ok(phf)
    }

    fn assert_bijection(phf: &PartitionedPhf, keys: &[String]) {
        let mut seen = vec![false; keys.len()];
        for key in keys {
            let position = phf.get(key.as_str());
            assert!(position < keys.len() as u64);
            assert!(!seen[position as usize], "duplicate position {}", position);
            seen[position as usize] = true;
        }
    }

    #[test]
    fn test_partitioned_minimal() -> Result<()> {
        // 100000 keys over 16 requested partitions: the average partition
        // would be smaller than MIN_PARTITION_SIZE, so the build collapses
        // to one partition and still yields a bijection.
        let keys = decimal_keys(100_000);
        let config = BuildConfig {
            seed: Some(1),
            minimal: true,
            num_partitions: 16,
            ..BuildConfig::default()
        };
        let phf = build(&keys, &config)?;
        assert_eq!(phf.num_keys(), 100_000);
        assert_eq!(phf.num_partitions(), 1);
        assert_bijection(&phf, &keys);
        Ok(())
    }

    #[test]
    fn test_multiple_partitions_survive() -> Result<()> {
        // 200000 keys over 4 partitions: exactly at MIN_PARTITION_SIZE,
        // the partitioning is kept.
        let keys = decimal_keys(200_000);
        let config = BuildConfig {
            seed: Some(1),
            minimal: true,
            num_partitions: 4,
            ..BuildConfig::default()
        };
        let phf = build(&keys, &config)?;
        assert_eq!(phf.num_partitions(), 4);
        assert_eq!(phf.seed(), 1);
        assert_bijection(&phf, &keys);
        Ok(())
    }

    #[test]
    fn test_offsets_invariant() -> Result<()> {
        for minimal in [false, true] {
            let keys = decimal_keys(200_000);
            let config = BuildConfig {
                seed: Some(3),
                minimal,
                num_partitions: 4,
                ..BuildConfig::default()
            };
            let mut builder = PartitionedPhfBuilder::new();
            builder.build_from_keys(&keys, &config, no_logging![])?;
            let offsets = builder.offsets();
            assert_eq!(offsets[0], 0);
            for (i, window) in offsets.windows(2).enumerate() {
                let sub = &builder.builders()[i];
                let step = if minimal {
                    sub.num_keys()
                } else {
                    sub.table_size()
                };
                assert_eq!(window[1] - window[0], step);
            }
            let total: u64 = builder
                .builders()
                .iter()
                .map(|sub| if minimal { sub.num_keys() } else { sub.table_size() })
                .sum();
            assert_eq!(
                offsets[offsets.len() - 1]
                    + if minimal {
                        builder.builders()[offsets.len() - 1].num_keys()
                    } else {
                        builder.builders()[offsets.len() - 1].table_size()
                    },
                total
            );
            let num_keys: u64 = builder.builders().iter().map(|sub| sub.num_keys()).sum();
            assert_eq!(num_keys, 200_000);
        }
        Ok(())
    }

    #[test]
    fn test_thread_independence() -> Result<()> {
        use epserde::prelude::*;

        let keys = decimal_keys(200_000);
        let mut phfs = Vec::new();
        for num_threads in [1, 8] {
            let config = BuildConfig {
                seed: Some(1),
                minimal: true,
                num_partitions: 4,
                num_threads,
                ..BuildConfig::default()
            };
            phfs.push(build(&keys, &config)?);
        }
        for key in &keys {
            assert_eq!(phfs[0].get(key.as_str()), phfs[1].get(key.as_str()));
        }
        let mut cursors = Vec::new();
        for phf in &phfs {
            let mut cursor = <AlignedCursor<maligned::A16>>::new();
            phf.serialize(&mut cursor)?;
            cursors.push(cursor);
        }
        let (a, b) = cursors.split_at_mut(1);
        assert_eq!(a[0].as_bytes(), b[0].as_bytes());
        Ok(())
    }

    #[test]
    fn test_partition_count_equivalence() -> Result<()> {
        // Different partition counts give different (but each valid)
        // bijections over the same keys.
        let keys = decimal_keys(200_000);
        for num_partitions in [1, 2, 4] {
            let config = BuildConfig {
                seed: Some(7),
                minimal: true,
                num_partitions,
                ..BuildConfig::default()
            };
            let phf = build(&keys, &config)?;
            assert_bijection(&phf, &keys);
        }
        Ok(())
    }

    #[test]
    fn test_non_minimal_partitioned() -> Result<()> {
        let keys = decimal_keys(200_000);
        let config = BuildConfig {
            seed: Some(11),
            num_partitions: 4,
            ..BuildConfig::default()
        };
        let phf = build(&keys, &config)?;
        assert!(!phf.minimal());
        let mut outputs: Vec<u64> = keys.iter().map(|key| phf.get(key.as_str())).collect();
        outputs.sort_unstable();
        outputs.dedup();
        assert_eq!(outputs.len(), keys.len());
        assert!(outputs.iter().all(|&position| position < phf.table_size()));
        Ok(())
    }

    #[test]
    fn test_round_trip() -> Result<()> {
        use epserde::prelude::*;

        let keys = decimal_keys(200_000);
        let config = BuildConfig {
            seed: Some(1),
            minimal: true,
            num_partitions: 4,
            ..BuildConfig::default()
        };
        let phf = build(&keys, &config)?;
        let mut cursor = <AlignedCursor<maligned::A16>>::new();
        phf.serialize(&mut cursor)?;
        cursor.set_position(0);
        let deserialized = PartitionedPhf::<CompactPilots>::deserialize_full(&mut cursor)?;
        for key in keys.iter().step_by(97) {
            assert_eq!(phf.get(key.as_str()), deserialized.get(key.as_str()));
        }
        Ok(())
    }

    #[test]
    fn test_invalid_partitions() {
        let keys = decimal_keys(10);
        let config = BuildConfig {
            num_partitions: 0,
            ..BuildConfig::default()
        };
        assert!(matches!(
            build(&keys, &config),
            Err(BuildError::InvalidArgument(_))
        ));
    }
}
