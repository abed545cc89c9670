//! Per-generation ostracism state and the exclusion phase of a group game.

use crate::lattice::{group, Coord, Lattice};
use crate::strategy::Strategy;

/// Which sites are barred from games for the rest of the current generation.
///
/// Owned by the generation driver and reset once per generation; marks only
/// ever go from `false` to `true` in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionState {
    size: usize,
    flags: Vec<bool>,
}

impl ExclusionState {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            flags: vec![false; size * size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn reset(&mut self) {
        self.flags.fill(false);
    }

    fn index(&self, c: Coord) -> usize {
        assert!(
            c.x < self.size && c.y < self.size,
            "coordinate ({}, {}) outside {}x{} exclusion grid",
            c.x,
            c.y,
            self.size,
            self.size
        );
        c.y * self.size + c.x
    }

    pub fn is_excluded(&self, c: Coord) -> bool {
        self.flags[self.index(c)]
    }

    pub fn mark(&mut self, c: Coord) {
        let i = self.index(c);
        self.flags[i] = true;
    }

    pub fn excluded_count(&self) -> usize {
        self.flags.iter().filter(|f| **f).count()
    }

    pub fn is_clear(&self) -> bool {
        !self.flags.iter().any(|f| *f)
    }
}

/// Exclusion phase for the game centered at `center`.
///
/// Any excluder among the five participants bars every defector; two or more
/// excluding defectors bar each other. Counts are over the participant list,
/// so on a 2×2 torus a duplicated neighbor counts twice.
pub fn evaluate_exclusion(center: Coord, lattice: &Lattice, exclusion: &mut ExclusionState) {
    let members = group(center, lattice.size());
    let strategies = members.map(|c| lattice.get(c));

    let any_excluder = strategies.iter().any(|s| s.is_excluder());
    let excluding_defectors = strategies
        .iter()
        .filter(|s| **s == Strategy::ExcludingDefector)
        .count();

    if any_excluder {
        for (c, s) in members.iter().zip(strategies.iter()) {
            if *s == Strategy::Defector {
                exclusion.mark(*c);
            }
        }
    }
    if excluding_defectors >= 2 {
        for (c, s) in members.iter().zip(strategies.iter()) {
            if *s == Strategy::ExcludingDefector {
                exclusion.mark(*c);
            }
        }
    }
}
