use crate::stimulus::DomainKind;
use serde::{Deserialize, Serialize};

/// Positions `center + (i - size / 2) * step` for `i in 0..size`.
///
/// For even sizes the center itself is not a grid point: the integer offset
/// puts one more position left of center than right of it.
pub fn grid(size: usize, step: f64, center: f64) -> Vec<f64> {
    let half = (size / 2) as f64;
    (0..size)
        .map(|i| center + (i as f64 - half) * step)
        .collect()
}

/// First and last position `grid` would produce, without building it.
pub fn extent(size: usize, step: f64, center: f64) -> Option<(f64, f64)> {
    let last = size.checked_sub(1)?;
    let half = (size / 2) as f64;
    Some((center - half * step, center + (last as f64 - half) * step))
}

/// Ordered stimulus positions, tagged with the domain their unit belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StimulusGrid {
    domain: DomainKind,
    positions: Vec<f64>,
}

impl StimulusGrid {
    pub fn build(domain: DomainKind, size: usize, step: f64, center: f64) -> Self {
        Self {
            domain,
            positions: grid(size, step, center),
        }
    }

    pub fn domain(&self) -> DomainKind {
        self.domain
    }

    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.positions.get(index).copied()
    }

    pub fn into_positions(self) -> Vec<f64> {
        self.positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: &[f64], b: &[f64]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-9, "{a:?} != {b:?}");
        }
    }

    #[test]
    fn time_grid_of_ten_around_half_second() {
        let g = grid(10, 0.02, 0.5);
        let expected: Vec<f64> = (0..10).map(|i| 0.4 + i as f64 * 0.02).collect();
        assert_close(&g, &expected);
        assert!((g[0] - 0.4).abs() < 1e-12);
        assert!((g[9] - 0.58).abs() < 1e-12);
    }

    #[test]
    fn odd_grid_is_centered() {
        assert_close(&grid(3, 100.0, 1000.0), &[900.0, 1000.0, 1100.0]);
    }

    #[test]
    fn even_grid_leans_left() {
        assert_close(&grid(4, 1.0, 0.0), &[-2.0, -1.0, 0.0, 1.0]);
    }

    #[test]
    fn empty_and_single() {
        assert!(grid(0, 1.0, 5.0).is_empty());
        assert_close(&grid(1, 1.0, 5.0), &[5.0]);
    }

    #[test]
    fn extent_matches_built_grid() {
        for size in [1, 2, 3, 10, 11] {
            let g = grid(size, 0.02, 0.5);
            let (first, last) = extent(size, 0.02, 0.5).unwrap();
            assert!((first - g[0]).abs() < 1e-12);
            assert!((last - g[size - 1]).abs() < 1e-12);
        }
        assert_eq!(extent(0, 1.0, 5.0), None);
    }

    #[test]
    fn stimulus_grid_keeps_domain() {
        let g = StimulusGrid::build(DomainKind::Frequency, 5, 100.0, 1000.0);
        assert_eq!(g.domain(), DomainKind::Frequency);
        assert_eq!(g.len(), 5);
        assert_eq!(g.get(2), Some(1000.0));
        assert_eq!(g.get(5), None);
    }
}
