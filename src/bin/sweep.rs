//! Parameter sweep over synergy, noise and exclusion cost.
//!
//! Usage: SWEEP_R=3,4,5 SWEEP_K=0.1 SWEEP_CE=0,0.5,1 cargo run --release --bin sweep
//!
//! Remaining parameters come from the usual environment (or CONFIG_PATH).
//! With SWEEP_OUT set, one JSON line per point is written there.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::Instant;

use anyhow::{Context, Result};
use serde_json::json;
use spatialpgg::config::SimConfig;
use spatialpgg::logging::{self, log, obj, v_num, v_str, Domain, Level, ProfileScope};
use spatialpgg::sweep::{default_threads, grid, run_sweep, SweepResult};

fn env_list(key: &str, default: f64) -> Result<Vec<f64>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<f64>()
                    .with_context(|| format!("bad value {:?} in {}", p, key))
            })
            .collect(),
        Err(_) => Ok(vec![default]),
    }
}

fn main() -> Result<()> {
    let base = SimConfig::load()?;
    let synergies = env_list("SWEEP_R", base.synergy)?;
    let noises = env_list("SWEEP_K", base.noise)?;
    let costs = env_list("SWEEP_CE", base.exclusion_cost)?;
    let points = grid(&synergies, &noises, &costs);
    let threads = std::env::var("SWEEP_THREADS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(default_threads);

    println!("=== Parameter Sweep ===");
    println!(
        "Points: {}  Threads: {}  L={}  generations={}",
        points.len(),
        threads,
        base.size,
        base.generations
    );
    println!();

    log(
        Level::Info,
        Domain::Sweep,
        "sweep_start",
        obj(&[
            ("points", json!(points.len())),
            ("threads", json!(threads)),
            ("size", json!(base.size)),
            ("generations", json!(base.generations)),
        ]),
    );

    let total = points.len();
    let start = Instant::now();
    let scope = ProfileScope::with_context(
        "sweep",
        &[("points", json!(total)), ("threads", json!(threads))],
    );
    let results = run_sweep(&base, &points, threads, move |i, r: &SweepResult| {
        log(
            Level::Info,
            Domain::Sweep,
            "metrics.sweep_point",
            obj(&[
                ("label", v_str(&r.point.label())),
                ("seed", json!(r.summary.seed)),
                ("index", json!(i)),
                ("of", json!(total)),
                ("final_fraction", v_num(r.summary.final_fraction)),
                ("late_mean_fraction", v_num(r.late_mean_fraction)),
            ]),
        );
    })?;
    drop(scope);

    println!(
        "{:>8} {:>8} {:>8} {:>10} {:>10} {:>12}",
        "r", "K", "ce", "final", "late_mean", "absorbed"
    );
    println!("{}", "-".repeat(62));
    for r in &results {
        println!(
            "{:>8.3} {:>8.3} {:>8.3} {:>10.4} {:>10.4} {:>12}",
            r.point.synergy,
            r.point.noise,
            r.point.exclusion_cost,
            r.summary.final_fraction,
            r.late_mean_fraction,
            r.summary.absorbed_by.map(|s| s.as_str()).unwrap_or("-"),
        );
    }

    if let Ok(path) = std::env::var("SWEEP_OUT") {
        let file = File::create(&path).with_context(|| format!("creating {}", path))?;
        let mut w = BufWriter::new(file);
        for r in &results {
            writeln!(w, "{}", serde_json::to_string(r)?)?;
        }
        w.flush()?;
        println!("\nWrote {} rows to {}", results.len(), path);
    }

    println!();
    println!("=== Summary ===");
    println!("Total time: {:.2?}", start.elapsed());
    if let Some(best) = results
        .iter()
        .max_by(|a, b| a.late_mean_fraction.total_cmp(&b.late_mean_fraction))
    {
        println!("Most cooperative: {} ({:.4})", best.point.label(), best.late_mean_fraction);
    }
    let full = results.iter().filter(|r| r.summary.final_fraction >= 1.0).count();
    let none = results.iter().filter(|r| r.summary.final_fraction <= 0.0).count();
    println!("Full cooperation: {}/{}  Extinct cooperation: {}/{}", full, total, none, total);

    logging::flush();
    Ok(())
}
