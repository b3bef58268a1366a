/*
 *
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

#![deny(unconditional_recursion)]

/*!

Perfect hash functions of the PTHash family over static key sets.

A [`SinglePhf`](phf::SinglePhf) maps *n* distinct keys injectively into
[0..*m*) with *m* ≥ *n*; in minimal mode it is a bijection onto [0..*n*).
A [`PartitionedPhf`](phf::PartitionedPhf) shards the keys across
independent single functions to parallelize construction and bound peak
memory. Queries cost a few memory accesses; the representation is a few
bits per key.

Artifacts are immutable after construction, can be queried concurrently
without synchronization, and are serialized with
[ε-serde](https://crates.io/crates/epserde).

# Examples

```rust
# fn main() -> Result<(), pthash::phf::BuildError> {
use pthash::phf::{BuildConfig, SinglePhf};
use dsi_progress_logger::no_logging;

let keys: Vec<String> = (0..10_000).map(|i| i.to_string()).collect();
let config = BuildConfig {
    seed: Some(42),
    minimal: true,
    ..BuildConfig::default()
};
let mut phf: SinglePhf = SinglePhf::default();
phf.build_in_internal_memory(&keys, &config, no_logging![])?;

// A bijection onto [0..10000)
let mut seen = vec![false; 10_000];
for key in &keys {
    seen[phf.get(key) as usize] = true;
}
assert!(seen.iter().all(|&taken| taken));
#     Ok(())
# }
```

*/

pub mod bits;
pub mod dict;
pub mod hash;
pub mod phf;
pub mod utils;

pub mod prelude {
    pub use crate::bits::*;
    pub use crate::dict::elias_fano::*;
    pub use crate::hash::*;
    pub use crate::phf::bucketer::*;
    pub use crate::phf::encoder::*;
    pub use crate::phf::*;
}
