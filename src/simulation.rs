//! Generation driver: owns the lattice, the exclusion buffer and the RNG
//! stream, and runs asynchronous random-site updates.

use std::time::Instant;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, GameVariant, SimConfig};
use crate::exclusion::ExclusionState;
use crate::lattice::{Coord, Lattice};
use crate::strategy::{Strategy, StrategyCounts};
use crate::update::{update_site, Dynamics};

/// Aggregate state after one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    /// 1-based index of the generation just completed.
    pub generation: u64,
    pub cooperator_fraction: f64,
    pub counts: StrategyCounts,
    /// Sites still marked excluded when the generation ended.
    pub excluded_sites: usize,
    /// Update attempts made, `L²` per generation.
    pub attempts: u64,
    /// Attempts in this generation that changed hands.
    pub imitations: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub seed: u64,
    pub generations_run: u64,
    pub final_fraction: f64,
    pub final_counts: StrategyCounts,
    pub absorbed_by: Option<Strategy>,
    pub stopped_early: bool,
    pub total_imitations: u64,
    pub state_hash: String,
    pub elapsed_ms: f64,
}

/// Receives progress from [`Simulation::run`].
pub trait RunObserver {
    fn on_report(&mut self, sim: &Simulation, report: &GenerationReport) -> Result<()>;

    fn on_finish(&mut self, _sim: &Simulation, _summary: &RunSummary) -> Result<()> {
        Ok(())
    }
}

/// Keeps every delivered report in memory.
#[derive(Debug, Default, Clone)]
pub struct SeriesRecorder {
    pub reports: Vec<GenerationReport>,
}

impl SeriesRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fractions(&self) -> Vec<(u64, f64)> {
        self.reports
            .iter()
            .map(|r| (r.generation, r.cooperator_fraction))
            .collect()
    }
}

impl RunObserver for SeriesRecorder {
    fn on_report(&mut self, _sim: &Simulation, report: &GenerationReport) -> Result<()> {
        self.reports.push(report.clone());
        Ok(())
    }
}

pub struct Simulation {
    config: SimConfig,
    dynamics: Dynamics,
    lattice: Lattice,
    exclusion: ExclusionState,
    rng: StdRng,
    seed: u64,
    generation: u64,
    total_imitations: u64,
}

impl Simulation {
    /// Validates `config`, resolves the seed and draws the initial lattice.
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
        let mut rng = StdRng::seed_from_u64(seed);
        let lattice = Lattice::random(config.size, &config.initial, &mut rng);
        Ok(Self::assemble(config, lattice, rng, seed))
    }

    /// Starts from a caller-supplied lattice; the initial distribution in
    /// `config` is still validated but not sampled. The classic variant
    /// rejects lattices holding excluders.
    pub fn with_lattice(config: SimConfig, lattice: Lattice) -> Result<Self, ConfigError> {
        config.validate()?;
        if lattice.size() != config.size {
            return Err(ConfigError::SizeMismatch {
                expected: config.size,
                actual: lattice.size(),
            });
        }
        if config.variant == GameVariant::Classic {
            let counts = lattice.counts();
            if counts.excluding_cooperator > 0 || counts.excluding_defector > 0 {
                return Err(ConfigError::ExcludersInClassic);
            }
        }
        let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
        let rng = StdRng::seed_from_u64(seed);
        Ok(Self::assemble(config, lattice, rng, seed))
    }

    fn assemble(config: SimConfig, lattice: Lattice, rng: StdRng, seed: u64) -> Self {
        let exclusion = ExclusionState::new(config.size);
        Self {
            dynamics: config.dynamics(),
            config,
            lattice,
            exclusion,
            rng,
            seed,
            generation: 0,
            total_imitations: 0,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn exclusion(&self) -> &ExclusionState {
        &self.exclusion
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generations completed so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// One generation: clear exclusion marks, then `L²` update attempts at
    /// uniformly drawn sites (with replacement).
    pub fn step_generation(&mut self) -> GenerationReport {
        self.exclusion.reset();
        let size = self.lattice.size();
        let attempts = size * size;
        let mut imitations = 0u64;
        for _ in 0..attempts {
            let x = self.rng.gen_range(0..size);
            let y = self.rng.gen_range(0..size);
            let outcome = update_site(
                Coord::new(x, y),
                &mut self.lattice,
                &mut self.exclusion,
                &self.dynamics,
                &mut self.rng,
            );
            if outcome.imitated {
                imitations += 1;
            }
        }
        self.generation += 1;
        self.total_imitations += imitations;
        self.report(attempts as u64, imitations)
    }

    fn report(&self, attempts: u64, imitations: u64) -> GenerationReport {
        let counts = self.lattice.counts();
        GenerationReport {
            generation: self.generation,
            cooperator_fraction: counts.cooperator_fraction(),
            counts,
            excluded_sites: self.exclusion.excluded_count(),
            attempts,
            imitations,
        }
    }

    /// Runs the configured number of generations, reporting every
    /// `report_interval` generations and after the last one.
    pub fn run(&mut self, observers: &mut [&mut dyn RunObserver]) -> Result<RunSummary> {
        let started = Instant::now();
        let target = self.config.generations;
        let mut stopped_early = false;

        while self.generation < target {
            let report = self.step_generation();
            let absorbed = report.counts.sole_strategy().is_some();
            let due = report.generation % self.config.report_interval == 0;
            let last = report.generation == target;
            let stopping = self.config.stop_when_absorbed && absorbed;
            if due || last || stopping {
                for obs in observers.iter_mut() {
                    obs.on_report(self, &report)?;
                }
            }
            if stopping && !last {
                stopped_early = true;
                break;
            }
        }

        let counts = self.lattice.counts();
        let summary = RunSummary {
            seed: self.seed,
            generations_run: self.generation,
            final_fraction: counts.cooperator_fraction(),
            final_counts: counts,
            absorbed_by: counts.sole_strategy(),
            stopped_early,
            total_imitations: self.total_imitations,
            state_hash: self.lattice.state_hash(),
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
        };
        for obs in observers.iter_mut() {
            obs.on_finish(self, &summary)?;
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyDistribution;
    use crate::strategy::Strategy;

    fn small_config() -> SimConfig {
        SimConfig {
            size: 8,
            generations: 20,
            noise: 0.5,
            exclusion_cost: 0.2,
            synergy: 3.8,
            initial: StrategyDistribution {
                cooperator: 0.3,
                excluding_cooperator: 0.2,
                excluding_defector: 0.1,
                defector: 0.4,
            },
            report_interval: 5,
            seed: Some(42),
            variant: GameVariant::Exclusion,
            ..SimConfig::default()
        }
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let cfg = SimConfig {
            noise: 0.0,
            ..small_config()
        };
        assert!(matches!(Simulation::new(cfg), Err(ConfigError::NonPositiveNoise(_))));
    }

    #[test]
    fn test_step_counts_generations_and_reports_consistently() {
        let mut sim = Simulation::new(small_config()).unwrap();
        let report = sim.step_generation();
        assert_eq!(report.generation, 1);
        assert_eq!(sim.generation(), 1);
        assert_eq!(report.counts.total(), 64);
        assert_eq!(report.counts, sim.lattice().counts());
        assert!((report.cooperator_fraction - sim.lattice().cooperator_fraction()).abs() < 1e-12);
        assert_eq!(report.attempts, 64);
        assert!(report.imitations <= report.attempts);
    }

    #[test]
    fn test_generation_starts_with_clear_marks() {
        let lat = Lattice::filled(8, Strategy::Cooperator);
        let mut sim = Simulation::with_lattice(small_config(), lat).unwrap();
        sim.exclusion.mark(Coord::new(3, 4));
        sim.exclusion.mark(Coord::new(0, 0));
        assert_eq!(sim.exclusion().excluded_count(), 2);

        let report = sim.step_generation();
        assert_eq!(report.excluded_sites, 0);
        assert!(sim.exclusion().is_clear());
    }

    #[test]
    fn test_marks_do_not_carry_into_next_generation() {
        // Lone excluding cooperator among defectors: its first generation
        // marks defectors around it.
        let mut lat = Lattice::filled(6, Strategy::Defector);
        lat.set(Coord::new(2, 2), Strategy::ExcludingCooperator);
        let cfg = SimConfig {
            size: 6,
            noise: 100.0,
            ..small_config()
        };
        let mut sim = Simulation::with_lattice(cfg, lat).unwrap();
        let first = sim.step_generation();
        assert!(first.excluded_sites > 0);

        // No excluders left, so nothing can be marked this generation.
        sim.lattice = Lattice::filled(6, Strategy::Defector);
        let second = sim.step_generation();
        assert_eq!(second.excluded_sites, 0);
        assert!(sim.exclusion().is_clear());
    }

    #[test]
    fn test_generation_draws_follow_fixed_order() {
        // Uniform lattice: no imitation changes anything, so every attempt
        // consumes exactly focal x, focal y, neighbor index, coin.
        let size = 5;
        let cfg = SimConfig {
            size,
            seed: Some(99),
            ..small_config()
        };
        let lat = Lattice::filled(size, Strategy::Defector);
        let mut sim = Simulation::with_lattice(cfg, lat).unwrap();
        let report = sim.step_generation();
        assert_eq!(report.attempts, (size * size) as u64);

        let mut reference = StdRng::seed_from_u64(99);
        for _ in 0..size * size {
            let _x = reference.gen_range(0..size);
            let _y = reference.gen_range(0..size);
            let _k = reference.gen_range(0..4usize);
            let _coin: f64 = reference.gen();
        }
        assert_eq!(sim.rng.gen::<u64>(), reference.gen::<u64>());
    }

    #[test]
    fn test_same_seed_same_trajectory() {
        let mut a = Simulation::new(small_config()).unwrap();
        let mut b = Simulation::new(small_config()).unwrap();
        let mut ra = SeriesRecorder::new();
        let mut rb = SeriesRecorder::new();
        let sa = a.run(&mut [&mut ra]).unwrap();
        let sb = b.run(&mut [&mut rb]).unwrap();
        assert_eq!(ra.reports, rb.reports);
        assert_eq!(sa.state_hash, sb.state_hash);
        assert_eq!(sa.seed, 42);
    }

    #[test]
    fn test_report_schedule() {
        let cfg = SimConfig {
            generations: 12,
            report_interval: 5,
            ..small_config()
        };
        let mut sim = Simulation::new(cfg).unwrap();
        let mut rec = SeriesRecorder::new();
        let summary = sim.run(&mut [&mut rec]).unwrap();
        let gens: Vec<u64> = rec.reports.iter().map(|r| r.generation).collect();
        assert_eq!(gens, vec![5, 10, 12]);
        assert_eq!(summary.generations_run, 12);
        assert!(!summary.stopped_early);
    }

    #[test]
    fn test_stop_when_absorbed() {
        let cfg = SimConfig {
            size: 4,
            generations: 1000,
            report_interval: 100,
            initial: StrategyDistribution::only(Strategy::Defector),
            stop_when_absorbed: true,
            ..small_config()
        };
        let mut sim = Simulation::new(cfg).unwrap();
        let mut rec = SeriesRecorder::new();
        let summary = sim.run(&mut [&mut rec]).unwrap();
        assert!(summary.stopped_early);
        assert_eq!(summary.generations_run, 1);
        assert_eq!(summary.absorbed_by, Some(Strategy::Defector));
        assert_eq!(rec.reports.len(), 1);
    }

    #[test]
    fn test_with_lattice_keeps_given_state() {
        let lat = Lattice::filled(8, Strategy::Cooperator);
        let sim = Simulation::with_lattice(small_config(), lat.clone()).unwrap();
        assert_eq!(sim.lattice(), &lat);
        assert!(sim.exclusion().is_clear());

        let mut mixed = Lattice::filled(8, Strategy::Cooperator);
        mixed.set(Coord::new(1, 1), Strategy::ExcludingDefector);
        let classic = SimConfig {
            variant: GameVariant::Classic,
            initial: StrategyDistribution {
                cooperator: 0.5,
                excluding_cooperator: 0.0,
                excluding_defector: 0.0,
                defector: 0.5,
            },
            ..small_config()
        };
        assert_eq!(
            Simulation::with_lattice(classic.clone(), mixed).err(),
            Some(ConfigError::ExcludersInClassic)
        );
        assert!(Simulation::with_lattice(classic, Lattice::filled(8, Strategy::Defector)).is_ok());

        let wrong = Lattice::filled(5, Strategy::Cooperator);
        assert!(matches!(
            Simulation::with_lattice(small_config(), wrong),
            Err(ConfigError::SizeMismatch { expected: 8, actual: 5 })
        ));
    }
}
