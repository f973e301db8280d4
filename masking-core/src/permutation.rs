//! Seeded, reproducible shuffling used to randomize presentation order and to
//! realign results afterwards.
//!
//! Draws come from a counter-based generator: the fraction for a seed is the
//! SplitMix64 output mixer applied to `seed + 0x9E3779B97F4A7C15`, with the top
//! 53 bits scaled into `[0, 1)`. The shuffle consumes one seed per draw and
//! increments it, so any SplitMix64 implementation reproduces the same order.

use serde::{Deserialize, Serialize};
use thiserror::Error;

const GOLDEN_GAMMA: u64 = 0x9e37_79b9_7f4a_7c15;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PermutationError {
    #[error("index map has {map} entries but the sequence has {items}")]
    LengthMismatch { items: usize, map: usize },
    #[error("index {index} is out of range for a sequence of {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("index {0} appears more than once in the index map")]
    DuplicateIndex(usize),
}

/// Pseudo-random fraction in `[0, 1)` derived from `seed` alone.
#[inline]
pub fn seeded_fraction(seed: u64) -> f64 {
    let mut z = seed.wrapping_add(GOLDEN_GAMMA);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^= z >> 31;
    (z >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
}

/// A shuffled sequence plus, for each position, the original index it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shuffled<T> {
    pub items: Vec<T>,
    pub index_map: Vec<usize>,
}

impl<T: Clone> Shuffled<T> {
    pub fn restore(&self) -> Result<Vec<T>, PermutationError> {
        unshuffle(&self.items, &self.index_map)
    }
}

/// Backward Fisher-Yates driven by `seeded_fraction`, one seed per draw.
pub fn shuffle<T: Clone>(items: &[T], mut seed: u64) -> Shuffled<T> {
    let mut shuffled = items.to_vec();
    let mut index_map: Vec<usize> = (0..items.len()).collect();

    for i in (1..shuffled.len()).rev() {
        let j = (seeded_fraction(seed) * (i + 1) as f64) as usize;
        seed = seed.wrapping_add(1);
        shuffled.swap(i, j);
        index_map.swap(i, j);
    }

    Shuffled {
        items: shuffled,
        index_map,
    }
}

/// Inverse scatter: `original[index_map[i]] = shuffled[i]`.
pub fn unshuffle<T: Clone>(shuffled: &[T], index_map: &[usize]) -> Result<Vec<T>, PermutationError> {
    if shuffled.len() != index_map.len() {
        return Err(PermutationError::LengthMismatch {
            items: shuffled.len(),
            map: index_map.len(),
        });
    }

    let mut slots: Vec<Option<T>> = vec![None; shuffled.len()];
    for (item, &target) in shuffled.iter().zip(index_map) {
        let slot = slots
            .get_mut(target)
            .ok_or(PermutationError::IndexOutOfRange {
                index: target,
                len: shuffled.len(),
            })?;
        if slot.is_some() {
            return Err(PermutationError::DuplicateIndex(target));
        }
        *slot = Some(item.clone());
    }

    // Every slot is filled: n distinct in-range targets for n slots.
    Ok(slots.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_is_in_unit_interval() {
        for seed in (0..10_000u64).chain([u64::MAX - 1, u64::MAX]) {
            let f = seeded_fraction(seed);
            assert!((0.0..1.0).contains(&f), "seed {seed} gave {f}");
        }
    }

    #[test]
    fn fraction_matches_splitmix64_reference() {
        // First output of SplitMix64 seeded with 0.
        let expected = 0xe220_a839_7b1d_cdafu64;
        let f = seeded_fraction(0);
        assert_eq!(f, (expected >> 11) as f64 / (1u64 << 53) as f64);
    }

    #[test]
    fn shuffle_then_unshuffle_restores_letters() {
        let letters = ['A', 'B', 'C', 'D'];
        let s = shuffle(&letters, 51);
        assert_eq!(unshuffle(&s.items, &s.index_map).unwrap(), letters.to_vec());
        assert_eq!(s.restore().unwrap(), letters.to_vec());
    }

    #[test]
    fn index_map_points_at_original_positions() {
        let items: Vec<u32> = (10..20).collect();
        let s = shuffle(&items, 7);
        for (pos, &orig) in s.index_map.iter().enumerate() {
            assert_eq!(s.items[pos], items[orig]);
        }
    }

    #[test]
    fn same_seed_same_permutation() {
        let items: Vec<usize> = (0..32).collect();
        assert_eq!(shuffle(&items, 51), shuffle(&items, 51));
    }

    #[test]
    fn different_seeds_usually_differ() {
        let items: Vec<usize> = (0..32).collect();
        assert_ne!(shuffle(&items, 1).items, shuffle(&items, 2).items);
    }

    #[test]
    fn short_sequences_are_untouched() {
        let empty: Vec<u8> = Vec::new();
        let s = shuffle(&empty, 3);
        assert!(s.items.is_empty() && s.index_map.is_empty());
        assert_eq!(shuffle(&[9], 3).items, vec![9]);
    }

    #[test]
    fn unshuffle_rejects_bad_maps() {
        assert_eq!(
            unshuffle(&[1, 2], &[0]),
            Err(PermutationError::LengthMismatch { items: 2, map: 1 })
        );
        assert_eq!(
            unshuffle(&[1, 2], &[0, 2]),
            Err(PermutationError::IndexOutOfRange { index: 2, len: 2 })
        );
        assert_eq!(
            unshuffle(&[1, 2], &[1, 1]),
            Err(PermutationError::DuplicateIndex(1))
        );
    }
}
