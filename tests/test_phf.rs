/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use anyhow::Result;
use dsi_progress_logger::no_logging;
use epserde::prelude::*;
use pthash::phf::{BuildConfig, BuildError, CompactPilots, PartitionedPhf, SinglePhf};

#[test]
fn test_single_phf_sizes() -> Result<()> {
    for n in [1_u64, 10, 1000, 100_000] {
        let keys: Vec<String> = (0..n).map(|i| i.to_string()).collect();
        for minimal in [false, true] {
            let config = BuildConfig {
                seed: Some(0xbadf00d),
                minimal,
                ..BuildConfig::default()
            };
            let mut phf: SinglePhf = SinglePhf::default();
            let timings = phf.build_in_internal_memory(&keys, &config, no_logging![])?;
            assert!(timings.mapping_ordering_seconds >= 0.0);
            assert!(timings.searching_seconds >= 0.0);
            assert!(timings.encoding_seconds >= 0.0);

            assert_eq!(phf.num_keys(), n);
            assert_eq!(phf.minimal(), minimal);
            let bound = if minimal { n } else { phf.table_size() };
            let mut outputs: Vec<u64> = keys.iter().map(|key| phf.get(key)).collect();
            assert!(outputs.iter().all(|&position| position < bound));
            outputs.sort_unstable();
            outputs.dedup();
            assert_eq!(outputs.len() as u64, n, "n = {}, minimal = {}", n, minimal);
            assert!(phf.num_bits() > 0);
        }
    }
    Ok(())
}

#[test]
fn test_query_by_equivalent_key_types() -> Result<()> {
    // Owned and borrowed strings hash identically.
    let keys: Vec<String> = (0..1000).map(|i| format!("key-{}", i)).collect();
    let config = BuildConfig {
        seed: Some(99),
        minimal: true,
        ..BuildConfig::default()
    };
    let mut phf: SinglePhf = SinglePhf::default();
    phf.build_in_internal_memory(&keys, &config, no_logging![])?;
    for key in &keys {
        assert_eq!(phf.get(key), phf.get(key.as_str()));
    }
    Ok(())
}

#[test]
fn test_partitioned_phf_end_to_end() -> Result<()> {
    let keys: Vec<String> = (0..200_000_u64).map(|i| i.to_string()).collect();
    let config = BuildConfig {
        seed: Some(1),
        minimal: true,
        num_partitions: 4,
        num_threads: 4,
        ..BuildConfig::default()
    };
    let mut phf: PartitionedPhf = PartitionedPhf::default();
    let timings = phf.build_in_internal_memory(&keys, &config, no_logging![])?;
    assert!(timings.partitioning_seconds >= 0.0);

    assert_eq!(phf.num_partitions(), 4);
    assert_eq!(phf.num_keys(), 200_000);
    let mut seen = vec![false; 200_000];
    for key in &keys {
        let position = phf.get(key.as_str());
        assert!(position < 200_000);
        assert!(!seen[position as usize]);
        seen[position as usize] = true;
    }

    // Serialization round-trip preserves every output.
    let mut cursor = <AlignedCursor<maligned::A16>>::new();
    phf.serialize(&mut cursor)?;
    cursor.set_position(0);
    let deserialized = PartitionedPhf::<CompactPilots>::deserialize_full(&mut cursor)?;
    assert_eq!(deserialized.num_keys(), phf.num_keys());
    assert_eq!(deserialized.seed(), phf.seed());
    for key in keys.iter().step_by(101) {
        assert_eq!(phf.get(key.as_str()), deserialized.get(key.as_str()));
    }
    Ok(())
}

#[test]
fn test_partitioned_rejects_zero_threads() {
    let keys: Vec<String> = (0..10).map(|i| i.to_string()).collect();
    let config = BuildConfig {
        num_threads: 0,
        ..BuildConfig::default()
    };
    let mut phf: PartitionedPhf = PartitionedPhf::default();
    assert!(matches!(
        phf.build_in_internal_memory(&keys, &config, no_logging![]),
        Err(BuildError::InvalidArgument(_))
    ));
}
