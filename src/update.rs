//! Fermi imitation: a focal site copies one random neighbor's strategy with a
//! probability set by the payoff gap and the noise `K`.

use rand::Rng;

use crate::config::GameVariant;
use crate::exclusion::ExclusionState;
use crate::lattice::{Coord, Lattice};
use crate::payoff::{site_payoff, GameParams};

/// Everything the update rule needs besides the state it mutates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dynamics {
    pub variant: GameVariant,
    pub game: GameParams,
    /// Selection noise `K`, strictly positive.
    pub noise: f64,
}

/// `1 / (1 + exp((payoff_focal - payoff_neighbor) / noise))`, evaluated
/// without overflow and clamped to `[0, 1]`.
pub fn imitation_probability(payoff_focal: f64, payoff_neighbor: f64, noise: f64) -> f64 {
    let z = (payoff_focal - payoff_neighbor) / noise;
    if z.is_nan() {
        return 0.0;
    }
    let p = if z >= 0.0 {
        let e = (-z).exp();
        e / (1.0 + e)
    } else {
        1.0 / (1.0 + z.exp())
    };
    p.clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateOutcome {
    pub focal: Coord,
    pub neighbor: Coord,
    pub payoff_focal: f64,
    pub payoff_neighbor: f64,
    pub probability: f64,
    pub imitated: bool,
}

/// One update attempt for `focal`.
///
/// Random draws happen in a fixed order: neighbor index (after the focal
/// payoff has been aggregated), then the imitation coin.
pub fn update_site<R: Rng + ?Sized>(
    focal: Coord,
    lattice: &mut Lattice,
    exclusion: &mut ExclusionState,
    dynamics: &Dynamics,
    rng: &mut R,
) -> UpdateOutcome {
    let payoff_focal = site_payoff(dynamics.variant, focal, lattice, exclusion, &dynamics.game);
    let neighbor = lattice.neighbors(focal)[rng.gen_range(0..4usize)];
    let payoff_neighbor =
        site_payoff(dynamics.variant, neighbor, lattice, exclusion, &dynamics.game);

    let probability = imitation_probability(payoff_focal, payoff_neighbor, dynamics.noise);
    let coin: f64 = rng.gen();
    let imitated = coin < probability;
    if imitated {
        let s = lattice.get(neighbor);
        lattice.set(focal, s);
    }

    UpdateOutcome {
        focal,
        neighbor,
        payoff_focal,
        payoff_neighbor,
        probability,
        imitated,
    }
}
