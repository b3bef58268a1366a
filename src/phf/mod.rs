/*
 *
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

/*!

Perfect hash functions of the PTHash family.

A perfect hash function (PHF) over a static set of *n* distinct keys maps
each key to a distinct integer in [0..*m*), with *m* ≥ *n*; when *m* = *n*
the function is *minimal* (an MPHF, that is, a bijection onto [0..*n*)).
Construction hashes each key to a 128-bit signature, distributes signatures
to buckets, and searches for each bucket a small *pilot* value whose mixing
displaces all the bucket's keys onto free slots of a table of size *m*;
queries retrace the same steps with a couple of memory accesses.

Two compositional layers are provided: [`SinglePhf`], the sequential builder
and evaluator, and [`PartitionedPhf`], which shards keys across independent
single functions to parallelize construction and bound peak memory.

The algorithm was introduced by Giulio Ermanno Pibiri and Roberto Trani in
“[PTHash: Revisiting FCH Minimal Perfect
Hashing](https://doi.org/10.1145/3404835.3462849)”, *Proc. of the 44th ACM
SIGIR Conference*, pages 1339–1348, 2021, and extended to partitioned
construction in “[Parallel and External-Memory Construction of Minimal
Perfect Hash Functions with PTHash](https://doi.org/10.1109/TKDE.2023.3303341)”,
*IEEE Trans. Knowl. Data Eng.*, 36(3):1249–1259, 2024.

# Examples

```rust
# fn main() -> Result<(), pthash::phf::BuildError> {
use pthash::phf::{BuildConfig, SinglePhf};
use dsi_progress_logger::no_logging;

let keys = ["alpha", "beta", "gamma", "delta", "epsilon"];
let config = BuildConfig {
    seed: Some(42),
    minimal: true,
    ..BuildConfig::default()
};
let mut phf: SinglePhf = SinglePhf::default();
phf.build_in_internal_memory(&keys, &config, no_logging![])?;

let mut positions = keys.iter().map(|key| phf.get(key)).collect::<Vec<_>>();
positions.sort_unstable();
assert_eq!(positions, vec![0, 1, 2, 3, 4]);
#     Ok(())
# }
```

*/

use thiserror::Error;

pub mod bucketer;
pub mod encoder;
pub mod partitioned;
pub mod single;

pub use bucketer::{Bucketer, SkewBucketer, UniformBucketer};
pub use encoder::{CompactPilots, PilotEncoder};
pub use partitioned::{PartitionedPhf, PartitionedPhfBuilder};
pub use single::{SinglePhf, SinglePhfBuilder};

/// Partitioned builds with fewer keys per partition than this collapse to a
/// single partition.
pub const MIN_PARTITION_SIZE: u64 = 50_000;

/// Default bound on the pilot values tried for a single bucket before the
/// build gives up with [`SeedError::PilotSearchExhausted`].
pub const DEFAULT_PILOT_LIMIT: u64 = 1 << 32;

/// Construction parameters.
///
/// The [`Default`] values are the recommended ones: load factor 0.94, bucket
/// constant 7.0, one partition, one thread, non-minimal output.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// The seed of all hashing. `None` draws a random seed, which is then
    /// recorded in the artifact.
    pub seed: Option<u64>,
    /// The load factor n/m, in (0, 1].
    pub alpha: f64,
    /// The bucket-count tuning constant: about c·n/log₂ n buckets are used.
    pub c: f64,
    /// Whether the output must be a bijection onto [0..n).
    pub minimal: bool,
    /// The number of partitions of a [`PartitionedPhf`] build.
    pub num_partitions: u64,
    /// Overrides the derived number of buckets; used by the partitioned
    /// builder to size its sub-builds.
    pub num_buckets: Option<u64>,
    /// The number of worker threads of a [`PartitionedPhf`] build.
    pub num_threads: usize,
    /// The per-bucket pilot search bound.
    pub pilot_limit: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            seed: None,
            alpha: 0.94,
            c: 7.0,
            minimal: false,
            num_partitions: 1,
            num_buckets: None,
            num_threads: 1,
            pilot_limit: DEFAULT_PILOT_LIMIT,
        }
    }
}

impl BuildConfig {
    pub(crate) fn validate(&self) -> Result<(), BuildError> {
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(BuildError::InvalidArgument("alpha must be in (0, 1]"));
        }
        if self.c <= 0.0 {
            return Err(BuildError::InvalidArgument("c must be positive"));
        }
        if self.num_partitions == 0 {
            return Err(BuildError::InvalidArgument(
                "number of partitions must be > 0",
            ));
        }
        if self.num_threads == 0 {
            return Err(BuildError::InvalidArgument("number of threads must be > 0"));
        }
        Ok(())
    }
}

/// Times of the construction phases, in seconds.
///
/// In a multithreaded partitioned build the mapping and searching entries
/// report the maximum across workers (a wall-clock proxy), not the sum.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildTimings {
    pub partitioning_seconds: f64,
    pub mapping_ordering_seconds: f64,
    pub searching_seconds: f64,
    pub encoding_seconds: f64,
}

/// Transient build errors: trying again with a different seed may succeed.
#[derive(Error, Debug)]
pub enum SeedError {
    /// Two keys of the same bucket share the second half of their signature.
    #[error("duplicate second half of a signature within a bucket")]
    BucketCollision,
    /// The pilot search for some bucket exceeded
    /// [`BuildConfig::pilot_limit`].
    #[error("pilot search exhausted the configured limit")]
    PilotSearchExhausted,
}

/// Fatal and transient build errors.
#[derive(Error, Debug)]
pub enum BuildError {
    /// Malformed configuration. Fatal; do not retry.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The collision probability of the hash over this many keys is too
    /// high. Fatal; a wider hash is needed.
    #[error("hash collision probability too high for this number of keys: use a wider hash")]
    HashCollisionRisk,
    /// A transient failure; retry the build with a different seed.
    #[error(transparent)]
    Seed(#[from] SeedError),
}

/// Returns the table size ⌈n/α⌉, bumped by one if it lands on a power of
/// two (degenerate modular alignment with the fastmod constant).
pub(crate) fn table_size(num_keys: u64, alpha: f64) -> u64 {
    let mut table_size = (num_keys as f64 / alpha).ceil() as u64;
    if table_size & table_size.wrapping_sub(1) == 0 {
        table_size += 1;
    }
    table_size
}

/// Returns ⌈c·n/log₂ n⌉, with log₂ n replaced by 1 for n ≤ 1.
pub(crate) fn num_buckets(num_keys: u64, c: f64) -> u64 {
    let log2_n = if num_keys > 1 {
        (num_keys as f64).log2()
    } else {
        1.0
    };
    (((c * num_keys as f64) / log2_n).ceil() as u64).max(1)
}

/// Pre-flight check: with 64-bit signatures and more than 2³⁰ keys the
/// probability of a signature collision is no longer negligible.
pub(crate) fn check_hash_collision_probability(
    num_keys: u64,
    hash_bits: u32,
) -> Result<(), BuildError> {
    if hash_bits == 64 && num_keys > 1 << 30 {
        return Err(BuildError::HashCollisionRisk);
    }
    Ok(())
}
