//! Invariants of the exclusion buffer and the update rule across whole
//! generations.

use rand::{rngs::StdRng, Rng, SeedableRng};
use spatialpgg::config::GameVariant;
use spatialpgg::exclusion::{evaluate_exclusion, ExclusionState};
use spatialpgg::lattice::{neighbors, Coord, Lattice};
use spatialpgg::payoff::{total_payoff, GameParams};
use spatialpgg::strategy::Strategy;
use spatialpgg::update::{imitation_probability, update_site, Dynamics};

fn random_lattice(size: usize, rng: &mut StdRng) -> Lattice {
    Lattice::from_fn(size, |_| Strategy::ALL[rng.gen_range(0..4)])
}

#[test]
fn exclusion_marks_never_disappear_within_a_generation() {
    let mut rng = StdRng::seed_from_u64(8);
    let size = 8;
    let mut lat = random_lattice(size, &mut rng);
    let mut ex = ExclusionState::new(size);
    let dynamics = Dynamics {
        variant: GameVariant::Exclusion,
        game: GameParams::new(4.0, 0.3),
        noise: 0.2,
    };
    let mut previous = ex.clone();
    for _ in 0..size * size {
        let c = Coord::new(rng.gen_range(0..size), rng.gen_range(0..size));
        update_site(c, &mut lat, &mut ex, &dynamics, &mut rng);
        for y in 0..size {
            for x in 0..size {
                let p = Coord::new(x, y);
                if previous.is_excluded(p) {
                    assert!(ex.is_excluded(p), "{:?} lost its mark", p);
                }
            }
        }
        previous = ex.clone();
    }
    ex.reset();
    assert!(ex.is_clear());
}

#[test]
fn only_defecting_strategies_are_ever_excluded() {
    let mut rng = StdRng::seed_from_u64(21);
    let size = 6;
    let lat = random_lattice(size, &mut rng);
    let mut ex = ExclusionState::new(size);
    for y in 0..size {
        for x in 0..size {
            evaluate_exclusion(Coord::new(x, y), &lat, &mut ex);
        }
    }
    for y in 0..size {
        for x in 0..size {
            let c = Coord::new(x, y);
            if ex.is_excluded(c) {
                assert!(!lat.get(c).is_cooperative(), "{:?} is {:?}", c, lat.get(c));
            }
        }
    }
}

#[test]
fn aggregation_is_not_idempotent_when_marks_change() {
    // Focal defector whose own group has no excluder but whose right
    // neighbor's group does: the first aggregation plays the own game before
    // the mark appears, the second sees the focal excluded throughout.
    let size = 6;
    let focal = Coord::new(2, 2);
    let mut lat = Lattice::filled(size, Strategy::Cooperator);
    lat.set(focal, Strategy::Defector);
    lat.set(Coord::new(4, 2), Strategy::ExcludingCooperator);
    let params = GameParams::new(4.0, 0.0);
    let mut ex = ExclusionState::new(size);
    let first = total_payoff(focal, &lat, &mut ex, &params);
    let second = total_payoff(focal, &lat, &mut ex, &params);
    assert!(first > 0.0);
    assert_eq!(second, 0.0);
}

#[test]
fn neighbors_stay_on_the_torus() {
    for size in 2..10 {
        for y in 0..size {
            for x in 0..size {
                for n in neighbors(Coord::new(x, y), size) {
                    assert!(n.x < size && n.y < size);
                }
            }
        }
    }
}

#[test]
fn imitation_probability_bounds_over_random_gaps() {
    let mut rng = StdRng::seed_from_u64(5);
    for _ in 0..10_000 {
        let a: f64 = rng.gen_range(-50.0..50.0);
        let b: f64 = rng.gen_range(-50.0..50.0);
        let k: f64 = rng.gen_range(0.5..5.0);
        let p = imitation_probability(a, b, k);
        assert!((0.0..=1.0).contains(&p), "a={} b={} k={} p={}", a, b, k, p);
        let q = imitation_probability(b, a, k);
        assert!((p + q - 1.0).abs() < 1e-9);
    }
}
