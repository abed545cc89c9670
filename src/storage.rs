use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use crate::lattice::Lattice;
use crate::simulation::{GenerationReport, RunObserver, RunSummary, Simulation};
use crate::snapshot::LatticeSnapshot;

/// SQLite store for run parameters, cooperation time series and lattice
/// snapshots.
pub struct RunStore {
    conn: Connection,
}

impl RunStore {
    pub fn new(path: &str) -> Result<Self> {
        Ok(Self { conn: Connection::open(path)? })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn init(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS runs (
                run_id TEXT PRIMARY KEY,
                label TEXT NOT NULL,
                seed INTEGER NOT NULL,
                params TEXT NOT NULL,
                started_ts TEXT NOT NULL,
                finished_ts TEXT,
                generations INTEGER,
                final_fraction REAL,
                state_hash TEXT
            );
            CREATE TABLE IF NOT EXISTS generations (
                run_id TEXT NOT NULL,
                generation INTEGER NOT NULL,
                cooperator_fraction REAL NOT NULL,
                c INTEGER NOT NULL,
                ec INTEGER NOT NULL,
                ed INTEGER NOT NULL,
                d INTEGER NOT NULL,
                excluded INTEGER NOT NULL,
                imitations INTEGER NOT NULL,
                PRIMARY KEY (run_id, generation)
            );
            CREATE TABLE IF NOT EXISTS snapshots (
                run_id TEXT NOT NULL,
                generation INTEGER NOT NULL,
                size INTEGER NOT NULL,
                cells TEXT NOT NULL,
                state_hash TEXT NOT NULL,
                PRIMARY KEY (run_id, generation)
            );
            COMMIT;",
        )?;
        Ok(())
    }

    pub fn begin_run(
        &mut self,
        run_id: &str,
        label: &str,
        seed: u64,
        params_json: &str,
        ts: &str,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO runs (run_id, label, seed, params, started_ts)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![run_id, label, seed as i64, params_json, ts],
        )?;
        Ok(())
    }

    pub fn record_generation(&mut self, run_id: &str, report: &GenerationReport) -> Result<()> {
        let c = &report.counts;
        self.conn.execute(
            "INSERT OR REPLACE INTO generations
             (run_id, generation, cooperator_fraction, c, ec, ed, d, excluded, imitations)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                run_id,
                report.generation as i64,
                report.cooperator_fraction,
                c.cooperator as i64,
                c.excluding_cooperator as i64,
                c.excluding_defector as i64,
                c.defector as i64,
                report.excluded_sites as i64,
                report.imitations as i64
            ],
        )?;
        Ok(())
    }

    pub fn persist_snapshot(&mut self, run_id: &str, snapshot: &LatticeSnapshot) -> Result<()> {
        let cells = serde_json::to_string(&snapshot.rows)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO snapshots (run_id, generation, size, cells, state_hash)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run_id,
                snapshot.generation as i64,
                snapshot.size as i64,
                cells,
                snapshot.state_hash
            ],
        )?;
        Ok(())
    }

    pub fn finish_run(&mut self, run_id: &str, summary: &RunSummary, ts: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE runs
             SET finished_ts = ?2, generations = ?3, final_fraction = ?4, state_hash = ?5
             WHERE run_id = ?1",
            params![
                run_id,
                ts,
                summary.generations_run as i64,
                summary.final_fraction,
                summary.state_hash
            ],
        )?;
        Ok(())
    }

    /// `(generation, cooperator_fraction)` in generation order.
    pub fn load_series(&self, run_id: &str) -> Result<Vec<(u64, f64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT generation, cooperator_fraction FROM generations
             WHERE run_id = ?1 ORDER BY generation",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((row.get::<_, i64>(0)? as u64, row.get::<_, f64>(1)?))
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Latest stored lattice of a run, verified against its hash.
    pub fn load_latest_lattice(&self, run_id: &str) -> Result<Option<Lattice>> {
        let row = self
            .conn
            .query_row(
                "SELECT generation, size, cells, state_hash FROM snapshots
                 WHERE run_id = ?1 ORDER BY generation DESC LIMIT 1",
                params![run_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        let Some((generation, size, cells, state_hash)) = row else {
            return Ok(None);
        };
        let size = size as usize;
        let rows: Vec<Vec<u8>> = serde_json::from_str(&cells)?;
        let snap = LatticeSnapshot {
            size,
            generation: generation as u64,
            rows,
            counts: Default::default(),
            cooperator_fraction: 0.0,
            state_hash,
            legend: Vec::new(),
        };
        Ok(Some(snap.to_lattice()?))
    }
}

/// Persists every report and the final lattice of one run.
pub struct StoreObserver<'a> {
    store: &'a mut RunStore,
    run_id: String,
}

impl<'a> StoreObserver<'a> {
    pub fn new(store: &'a mut RunStore, run_id: &str) -> Self {
        Self {
            store,
            run_id: run_id.to_string(),
        }
    }
}

impl RunObserver for StoreObserver<'_> {
    fn on_report(&mut self, _sim: &Simulation, report: &GenerationReport) -> Result<()> {
        self.store.record_generation(&self.run_id, report)
    }

    fn on_finish(&mut self, sim: &Simulation, summary: &RunSummary) -> Result<()> {
        let snap = LatticeSnapshot::capture(sim.lattice(), sim.generation());
        self.store.persist_snapshot(&self.run_id, &snap)?;
        self.store
            .finish_run(&self.run_id, summary, &crate::logging::ts_now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SimConfig, StrategyDistribution};
    use crate::strategy::Strategy;

    fn tiny_config() -> SimConfig {
        SimConfig {
            size: 6,
            generations: 9,
            report_interval: 3,
            noise: 0.4,
            exclusion_cost: 0.3,
            synergy: 4.2,
            initial: StrategyDistribution {
                cooperator: 0.25,
                excluding_cooperator: 0.25,
                excluding_defector: 0.25,
                defector: 0.25,
            },
            seed: Some(5),
            ..SimConfig::default()
        }
    }

    #[test]
    fn test_store_series_and_final_lattice() {
        let mut store = RunStore::in_memory().unwrap();
        store.init().unwrap();
        store
            .begin_run("run-a", "test", 5, "{}", "2026-01-01T00:00:00Z")
            .unwrap();

        let mut sim = Simulation::new(tiny_config()).unwrap();
        let summary = {
            let mut obs = StoreObserver::new(&mut store, "run-a");
            sim.run(&mut [&mut obs]).unwrap()
        };

        let series = store.load_series("run-a").unwrap();
        let gens: Vec<u64> = series.iter().map(|(g, _)| *g).collect();
        assert_eq!(gens, vec![3, 6, 9]);
        assert!((series[2].1 - summary.final_fraction).abs() < 1e-12);

        let lat = store.load_latest_lattice("run-a").unwrap().unwrap();
        assert_eq!(&lat, sim.lattice());
        assert_eq!(lat.state_hash(), summary.state_hash);
    }

    #[test]
    fn test_file_backed_store_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runs.sqlite");
        let path = path.to_str().unwrap();
        {
            let mut store = RunStore::new(path).unwrap();
            store.init().unwrap();
            let snap = LatticeSnapshot::capture(&Lattice::filled(3, Strategy::Defector), 4);
            store.persist_snapshot("r", &snap).unwrap();
        }
        let mut store = RunStore::new(path).unwrap();
        store.init().unwrap();
        let lat = store.load_latest_lattice("r").unwrap().unwrap();
        assert_eq!(lat, Lattice::filled(3, Strategy::Defector));
        assert!(store.load_latest_lattice("missing").unwrap().is_none());
    }
}
