//! Public-goods payoffs: one game instance and the five-game aggregate.

use crate::config::{ExcludedCharge, GameVariant};
use crate::exclusion::{evaluate_exclusion, ExclusionState};
use crate::lattice::{group, Coord, Lattice};
use crate::strategy::Strategy;

/// Contribution each cooperative participant pays into the pot.
pub const CONTRIBUTION: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameParams {
    /// Synergy factor `r` multiplying the pooled contributions.
    pub synergy: f64,
    pub exclusion_cost: f64,
    pub excluded_charge: ExcludedCharge,
}

impl GameParams {
    pub fn new(synergy: f64, exclusion_cost: f64) -> Self {
        Self {
            synergy,
            exclusion_cost,
            excluded_charge: ExcludedCharge::default(),
        }
    }

    fn charged_when_excluded(&self, s: Strategy) -> bool {
        match self.excluded_charge {
            ExcludedCharge::ExcludingCooperator => s == Strategy::ExcludingCooperator,
            ExcludedCharge::ExcludingDefector => s == Strategy::ExcludingDefector,
        }
    }
}

/// Payoff to `target` from the game centered at `center`, under the current
/// exclusion marks. `target` must be a member of that group.
pub fn play_game(
    center: Coord,
    target: Coord,
    lattice: &Lattice,
    exclusion: &ExclusionState,
    params: &GameParams,
) -> f64 {
    let own = lattice.get(target);
    if exclusion.is_excluded(target) {
        return if params.charged_when_excluded(own) {
            -params.exclusion_cost
        } else {
            0.0
        };
    }

    let mut participants = 0usize;
    let mut cooperators = 0usize;
    for member in group(center, lattice.size()) {
        if exclusion.is_excluded(member) {
            continue;
        }
        participants += 1;
        if lattice.get(member).is_cooperative() {
            cooperators += 1;
        }
    }
    debug_assert!(participants >= 1, "target must sit in the group it plays");

    let base = params.synergy * cooperators as f64 / participants as f64;
    match own {
        Strategy::Cooperator | Strategy::ExcludingCooperator => base - CONTRIBUTION,
        Strategy::Defector => base,
        Strategy::ExcludingDefector => base - params.exclusion_cost,
    }
}

/// Sum of `focal`'s payoffs over the game it centers and the four games its
/// neighbors center. Each group's exclusion phase runs right before its game,
/// so this advances `exclusion`.
pub fn total_payoff(
    focal: Coord,
    lattice: &Lattice,
    exclusion: &mut ExclusionState,
    params: &GameParams,
) -> f64 {
    let mut total = 0.0;
    for center in group(focal, lattice.size()) {
        evaluate_exclusion(center, lattice, exclusion);
        total += play_game(center, focal, lattice, exclusion, params);
    }
    total
}

/// Two-strategy game without ostracism: fixed five-member groups.
pub fn classic_game(center: Coord, target: Coord, lattice: &Lattice, synergy: f64) -> f64 {
    let members = group(center, lattice.size());
    let cooperators = members
        .iter()
        .filter(|c| lattice.get(**c).is_cooperative())
        .count();
    let base = synergy * cooperators as f64 / members.len() as f64;
    if lattice.get(target).is_cooperative() {
        base - CONTRIBUTION
    } else {
        base
    }
}

pub fn classic_total_payoff(focal: Coord, lattice: &Lattice, synergy: f64) -> f64 {
    group(focal, lattice.size())
        .iter()
        .map(|center| classic_game(*center, focal, lattice, synergy))
        .sum()
}

/// Dispatches the aggregate payoff for the configured game variant.
pub fn site_payoff(
    variant: GameVariant,
    focal: Coord,
    lattice: &Lattice,
    exclusion: &mut ExclusionState,
    params: &GameParams,
) -> f64 {
    match variant {
        GameVariant::Exclusion => total_payoff(focal, lattice, exclusion, params),
        GameVariant::Classic => classic_total_payoff(focal, lattice, params.synergy),
    }
}
