use std::path::Path;

use anyhow::Result;
use spatialpgg::config::SimConfig;
use spatialpgg::logging::{
    self, log_config_error, log_initial_lattice, log_run_start, log_snapshot, log_store_error,
    LogObserver, ProfileScope,
};
use spatialpgg::simulation::{RunObserver, Simulation};
use spatialpgg::snapshot::{render_ascii, LatticeSnapshot};
use spatialpgg::storage::{RunStore, StoreObserver};

/// Largest lattice echoed to the terminal as a glyph map.
const MAX_ASCII_SIZE: usize = 64;

/// Logs a fatal configuration failure and flushes the sinks before exiting.
fn config_failure(err: anyhow::Error) -> anyhow::Error {
    log_config_error(&err);
    logging::flush();
    err
}

fn main() -> Result<()> {
    let cfg = SimConfig::load().map_err(config_failure)?;
    let label = std::env::var("RUN_LABEL").unwrap_or_else(|_| {
        format!("r={}_K={}_ce={}", cfg.synergy, cfg.noise, cfg.exclusion_cost)
    });

    let mut sim = Simulation::new(cfg).map_err(|err| config_failure(err.into()))?;
    let run_id = logging::run_id();
    log_run_start(&label, sim.config(), sim.seed());
    log_initial_lattice(
        &label,
        sim.lattice().size(),
        sim.lattice().cooperator_fraction(),
        &sim.lattice().state_hash(),
    );

    let mut store = match std::env::var("SQLITE_PATH") {
        Ok(path) => {
            let mut store = RunStore::new(&path)?;
            store.init()?;
            let params = serde_json::to_string(sim.config())?;
            store.begin_run(&run_id, &label, sim.seed(), &params, &logging::ts_now())?;
            Some(store)
        }
        Err(_) => None,
    };

    let summary = {
        let _scope = ProfileScope::new("run");
        let mut log_obs = LogObserver::new(&label);
        let mut store_obs = store.as_mut().map(|s| StoreObserver::new(s, &run_id));
        let mut observers: Vec<&mut dyn RunObserver> = Vec::with_capacity(2);
        observers.push(&mut log_obs);
        if let Some(obs) = store_obs.as_mut() {
            observers.push(obs);
        }
        match sim.run(&mut observers) {
            Ok(summary) => summary,
            Err(err) => {
                log_store_error("run", &err);
                logging::flush();
                return Err(err);
            }
        }
    };

    if let Ok(path) = std::env::var("SNAPSHOT_PATH") {
        let snap = LatticeSnapshot::capture(sim.lattice(), sim.generation());
        snap.write_json(Path::new(&path))?;
        log_snapshot(&path, snap.generation, &snap.state_hash);
    }

    if sim.lattice().size() <= MAX_ASCII_SIZE {
        eprintln!(
            "final lattice (C=cooperator E=excluding cooperator x=excluding defector D=defector):"
        );
        eprint!("{}", render_ascii(sim.lattice()));
    }
    eprintln!(
        "generations={} cooperator_fraction={:.4} seed={} hash={}",
        summary.generations_run, summary.final_fraction, summary.seed, summary.state_hash
    );

    logging::flush();
    Ok(())
}
