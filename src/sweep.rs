//! Parameter sweeps: independent simulations over a grid of `(r, K, c_e)`
//! spread across worker threads. Each run owns its lattice and RNG; only the
//! work index and progress counter are shared.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::SimConfig;
use crate::simulation::{RunSummary, SeriesRecorder, Simulation};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub synergy: f64,
    pub noise: f64,
    pub exclusion_cost: f64,
}

impl SweepPoint {
    pub fn label(&self) -> String {
        format!("r={}_K={}_ce={}", self.synergy, self.noise, self.exclusion_cost)
    }

    pub fn apply(&self, base: &SimConfig, seed: u64) -> SimConfig {
        SimConfig {
            synergy: self.synergy,
            noise: self.noise,
            exclusion_cost: self.exclusion_cost,
            seed: Some(seed),
            ..base.clone()
        }
    }
}

/// Cartesian product in `r`-major order.
pub fn grid(synergies: &[f64], noises: &[f64], costs: &[f64]) -> Vec<SweepPoint> {
    let mut out = Vec::with_capacity(synergies.len() * noises.len() * costs.len());
    for &synergy in synergies {
        for &noise in noises {
            for &exclusion_cost in costs {
                out.push(SweepPoint {
                    synergy,
                    noise,
                    exclusion_cost,
                });
            }
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepResult {
    pub point: SweepPoint,
    pub summary: RunSummary,
    /// Mean cooperator fraction over the reports in the second half of the run.
    pub late_mean_fraction: f64,
}

fn late_mean(rec: &SeriesRecorder, generations: u64) -> f64 {
    let half = generations / 2;
    let late: Vec<f64> = rec
        .reports
        .iter()
        .filter(|r| r.generation > half)
        .map(|r| r.cooperator_fraction)
        .collect();
    if late.is_empty() {
        rec.reports.last().map(|r| r.cooperator_fraction).unwrap_or(0.0)
    } else {
        late.iter().sum::<f64>() / late.len() as f64
    }
}

fn run_point(cfg: SimConfig, point: SweepPoint) -> Result<SweepResult> {
    let generations = cfg.generations;
    let mut sim = Simulation::new(cfg)?;
    let mut rec = SeriesRecorder::new();
    let summary = sim.run(&mut [&mut rec])?;
    Ok(SweepResult {
        point,
        late_mean_fraction: late_mean(&rec, generations),
        summary,
    })
}

/// Runs every point on up to `threads` workers; results come back in `points`
/// order. Point `i` uses seed `base.seed + i` (or a fresh seed per point when
/// the base has none). `on_done` sees each result as it finishes.
pub fn run_sweep(
    base: &SimConfig,
    points: &[SweepPoint],
    threads: usize,
    on_done: impl Fn(usize, &SweepResult) + Send + Sync + 'static,
) -> Result<Vec<SweepResult>> {
    let mut rng = rand::thread_rng();
    let jobs: Vec<SimConfig> = points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let seed = match base.seed {
                Some(s) => s.wrapping_add(i as u64),
                None => rng.gen(),
            };
            p.apply(base, seed)
        })
        .collect();
    for job in &jobs {
        job.validate()?;
    }

    let jobs = Arc::new(jobs);
    let points = Arc::new(points.to_vec());
    let next = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicUsize::new(0));
    let on_done = Arc::new(on_done);
    let n_threads = threads.max(1).min(points.len().max(1));

    let mut handles = Vec::with_capacity(n_threads);
    for _ in 0..n_threads {
        let jobs = Arc::clone(&jobs);
        let points = Arc::clone(&points);
        let next = Arc::clone(&next);
        let done = Arc::clone(&done);
        let on_done = Arc::clone(&on_done);
        handles.push(thread::spawn(move || -> Result<Vec<(usize, SweepResult)>> {
            let mut out = Vec::new();
            loop {
                let i = next.fetch_add(1, Ordering::Relaxed);
                if i >= jobs.len() {
                    break;
                }
                let result = run_point(jobs[i].clone(), points[i])?;
                done.fetch_add(1, Ordering::Relaxed);
                (*on_done)(i, &result);
                out.push((i, result));
            }
            Ok(out)
        }));
    }

    let mut slots: Vec<Option<SweepResult>> = vec![None; points.len()];
    for h in handles {
        let part = h.join().map_err(|_| anyhow!("sweep worker panicked"))??;
        for (i, r) in part {
            slots[i] = Some(r);
        }
    }
    debug_assert_eq!(done.load(Ordering::Relaxed), points.len());
    slots
        .into_iter()
        .enumerate()
        .map(|(i, r)| r.ok_or_else(|| anyhow!("sweep point {} produced no result", i)))
        .collect()
}

/// Default worker count: all cores, capped at 8.
pub fn default_threads() -> usize {
    num_cpus::get().min(8)
}
