//! Toroidal L×L grid of strategies and its neighborhood resolver.

use rand::Rng;
use sha2::{Digest, Sha256};

use crate::config::StrategyDistribution;
use crate::strategy::{Strategy, StrategyCounts};

/// Site coordinate, both components in `[0, size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coord {
    pub x: usize,
    pub y: usize,
}

impl Coord {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// Von Neumann neighbors of `c` on a torus of side `size`, in the fixed
/// order right, left, down, up.
///
/// For `size == 2` right and left coincide (as do down and up); both entries
/// are kept so group composition counts them twice.
pub fn neighbors(c: Coord, size: usize) -> [Coord; 4] {
    debug_assert!(size >= 1);
    [
        Coord::new((c.x + 1) % size, c.y),
        Coord::new((c.x + size - 1) % size, c.y),
        Coord::new(c.x, (c.y + 1) % size),
        Coord::new(c.x, (c.y + size - 1) % size),
    ]
}

/// The five members of the group centered at `center`: the center first,
/// then its neighbors in resolver order.
pub fn group(center: Coord, size: usize) -> [Coord; 5] {
    let [r, l, d, u] = neighbors(center, size);
    [center, r, l, d, u]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lattice {
    size: usize,
    cells: Vec<Strategy>,
}

impl Lattice {
    pub fn filled(size: usize, strategy: Strategy) -> Self {
        Self {
            size,
            cells: vec![strategy; size * size],
        }
    }

    pub fn from_fn(size: usize, mut f: impl FnMut(Coord) -> Strategy) -> Self {
        let mut cells = Vec::with_capacity(size * size);
        for y in 0..size {
            for x in 0..size {
                cells.push(f(Coord::new(x, y)));
            }
        }
        Self { size, cells }
    }

    /// Row-major cells; `None` when the length is not `size * size`.
    pub fn from_cells(size: usize, cells: Vec<Strategy>) -> Option<Self> {
        if cells.len() != size * size {
            return None;
        }
        Some(Self { size, cells })
    }

    /// Each site independently drawn from `dist`.
    pub fn random<R: Rng + ?Sized>(size: usize, dist: &StrategyDistribution, rng: &mut R) -> Self {
        Self::from_fn(size, |_| dist.sample(rng))
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub(crate) fn index(&self, c: Coord) -> usize {
        assert!(
            c.x < self.size && c.y < self.size,
            "coordinate ({}, {}) outside {}x{} lattice",
            c.x,
            c.y,
            self.size,
            self.size
        );
        c.y * self.size + c.x
    }

    pub fn get(&self, c: Coord) -> Strategy {
        self.cells[self.index(c)]
    }

    pub fn set(&mut self, c: Coord, s: Strategy) {
        let i = self.index(c);
        self.cells[i] = s;
    }

    pub fn neighbors(&self, c: Coord) -> [Coord; 4] {
        neighbors(c, self.size)
    }

    pub fn cells(&self) -> &[Strategy] {
        &self.cells
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Strategy]> {
        self.cells.chunks(self.size.max(1))
    }

    pub fn counts(&self) -> StrategyCounts {
        let mut counts = StrategyCounts::default();
        for s in &self.cells {
            counts.add(*s);
        }
        counts
    }

    pub fn cooperator_fraction(&self) -> f64 {
        self.counts().cooperator_fraction()
    }

    /// SHA-256 over the side length and row-major strategy codes, hex encoded.
    pub fn state_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update((self.size as u64).to_le_bytes());
        let codes: Vec<u8> = self.cells.iter().map(|s| s.code()).collect();
        hasher.update(&codes);
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_neighbor_order_and_wrap() {
        let n = neighbors(Coord::new(0, 0), 5);
        assert_eq!(n[0], Coord::new(1, 0)); // right
        assert_eq!(n[1], Coord::new(4, 0)); // left wraps
        assert_eq!(n[2], Coord::new(0, 1)); // down
        assert_eq!(n[3], Coord::new(0, 4)); // up wraps

        let n = neighbors(Coord::new(4, 4), 5);
        assert_eq!(n[0], Coord::new(0, 4));
        assert_eq!(n[2], Coord::new(4, 0));
    }

    #[test]
    fn test_neighbors_distinct_for_l_at_least_3() {
        for size in 3..8 {
            for y in 0..size {
                for x in 0..size {
                    let c = Coord::new(x, y);
                    let n = neighbors(c, size);
                    let set: HashSet<Coord> = n.iter().copied().collect();
                    assert_eq!(set.len(), 4, "size={} c={:?}", size, c);
                    assert!(!set.contains(&c));
                    for m in n {
                        assert!(m.x < size && m.y < size);
                    }
                }
            }
        }
    }

    #[test]
    fn test_neighbors_degenerate_l2() {
        for y in 0..2 {
            for x in 0..2 {
                let c = Coord::new(x, y);
                let n = neighbors(c, 2);
                assert_eq!(n[0], n[1]);
                assert_eq!(n[2], n[3]);
                assert_ne!(n[0], n[2]);
                assert!(n.iter().all(|m| *m != c));
            }
        }
    }

    #[test]
    fn test_group_center_first() {
        let g = group(Coord::new(2, 2), 4);
        assert_eq!(g[0], Coord::new(2, 2));
        assert_eq!(&g[1..], &neighbors(Coord::new(2, 2), 4));
    }

    #[test]
    fn test_get_set_and_counts() {
        let mut lat = Lattice::filled(3, Strategy::Defector);
        lat.set(Coord::new(1, 2), Strategy::Cooperator);
        assert_eq!(lat.get(Coord::new(1, 2)), Strategy::Cooperator);
        assert_eq!(lat.cells()[2 * 3 + 1], Strategy::Cooperator);
        let counts = lat.counts();
        assert_eq!(counts.cooperator, 1);
        assert_eq!(counts.defector, 8);
        assert!((lat.cooperator_fraction() - 1.0 / 9.0).abs() < 1e-12);
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn test_out_of_range_panics() {
        let lat = Lattice::filled(3, Strategy::Cooperator);
        lat.get(Coord::new(3, 0));
    }

    #[test]
    fn test_from_cells_rejects_wrong_len() {
        assert!(Lattice::from_cells(2, vec![Strategy::Cooperator; 3]).is_none());
        assert!(Lattice::from_cells(2, vec![Strategy::Cooperator; 4]).is_some());
    }

    #[test]
    fn test_state_hash_tracks_content() {
        let a = Lattice::filled(4, Strategy::Cooperator);
        let mut b = a.clone();
        assert_eq!(a.state_hash(), b.state_hash());
        b.set(Coord::new(0, 0), Strategy::Defector);
        assert_ne!(a.state_hash(), b.state_hash());
        assert_eq!(a.state_hash().len(), 64);
    }
}
