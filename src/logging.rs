//! Structured JSON-lines logging for simulation runs.
//!
//! Every record carries a run id, a monotonically increasing sequence number
//! and a domain so long sweeps can be filtered and summarized after the fact.
//! Records are echoed to stdout and appended to
//! `$LOG_DIR/<run_id>/{events,trace,metrics}.jsonl`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use anyhow::Result;

use crate::config::{ConfigError, SimConfig};
use crate::simulation::{GenerationReport, RunObserver, RunSummary, Simulation};

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "fatal" => Some(Level::Fatal),
            _ => None,
        }
    }

    pub fn from_env() -> Self {
        std::env::var("LOG_LEVEL")
            .ok()
            .and_then(|v| Self::parse(&v))
            .unwrap_or(Level::Info)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Lattice, // Initial state, snapshots
    Sim,     // Generation progress
    Store,   // SQLite persistence
    Sweep,   // Parameter sweeps
    System,  // Startup, config, shutdown
    Profile, // Timing
    Audit,   // State hashes for replay checks
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Lattice => "lattice",
            Domain::Sim => "sim",
            Domain::Store => "store",
            Domain::Sweep => "sweep",
            Domain::System => "system",
            Domain::Profile => "profile",
            Domain::Audit => "audit",
        }
    }

    pub fn is_enabled(&self) -> bool {
        // LOG_DOMAINS: comma-separated list or "all"
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static MIN_LEVEL: OnceLock<Level> = OnceLock::new();
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

fn min_level() -> Level {
    *MIN_LEVEL.get_or_init(Level::from_env)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    events: Option<Mutex<BufWriter<File>>>,
    trace: Option<Mutex<BufWriter<File>>>,
    metrics: Option<Mutex<BufWriter<File>>>,
}

fn open_sink(path: PathBuf) -> Option<Mutex<BufWriter<File>>> {
    match File::create(&path) {
        Ok(f) => Some(Mutex::new(BufWriter::new(f))),
        Err(err) => {
            eprintln!("[log] failed to create {}: {}", path.display(), err);
            None
        }
    }
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let base = std::env::var("LOG_DIR").unwrap_or_else(|_| "out/runs".to_string());
        let mut run_dir = PathBuf::from(base);
        run_dir.push(&run_id);
        if let Err(err) = create_dir_all(&run_dir) {
            eprintln!("[log] failed to create run dir: {}", err);
        }

        let _ = std::fs::write(
            run_dir.join("manifest.json"),
            json!({
                "run_id": run_id,
                "ts": ts_now(),
                "pid": process::id(),
                "log_dir": run_dir.to_string_lossy(),
            })
            .to_string(),
        );

        RunContext {
            events: open_sink(run_dir.join("events.jsonl")),
            trace: open_sink(run_dir.join("trace.jsonl")),
            metrics: open_sink(run_dir.join("metrics.jsonl")),
            run_id,
        }
    })
}

/// Id shared by every record of this process.
pub fn run_id() -> String {
    ensure_run_context().run_id.clone()
}

fn split_fields(mut fields: Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut top = Map::new();
    for key in ["label", "generation", "seed", "msg"] {
        if let Some(value) = fields.remove(key) {
            top.insert(key.to_string(), value);
        }
    }
    (top, fields)
}

fn write_line(writer: &Option<Mutex<BufWriter<File>>>, line: &str) {
    if let Some(writer) = writer {
        if let Ok(mut w) = writer.lock() {
            let _ = writeln!(w, "{}", line);
        }
    }
}

/// Flush file sinks; call before process exit.
pub fn flush() {
    if let Some(ctx) = RUN_CONTEXT.get() {
        for sink in [&ctx.events, &ctx.trace, &ctx.metrics].into_iter().flatten() {
            if let Ok(mut w) = sink.lock() {
                let _ = w.flush();
            }
        }
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    if level < min_level() || !domain.is_enabled() {
        return;
    }
    emit_record(level, domain, event, fields);
}

fn emit_record(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let ctx = ensure_run_context();
    let (mut top, data) = split_fields(fields);

    let msg = top.remove("msg").unwrap_or(Value::String(String::new()));
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_now()));
    entry.insert("run_id".to_string(), json!(ctx.run_id.clone()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("component".to_string(), json!(domain.as_str()));
    entry.insert("event".to_string(), json!(event));
    entry.insert("msg".to_string(), msg);
    for (k, v) in top {
        entry.insert(k, v);
    }
    entry.insert("data".to_string(), Value::Object(data));

    let line = Value::Object(entry).to_string();
    if event.starts_with("metrics.") {
        write_line(&ctx.metrics, &line);
    }
    match level {
        Level::Trace | Level::Debug => write_line(&ctx.trace, &line),
        _ => write_line(&ctx.events, &line),
    }
    println!("{}", line);
}

// =============================================================================
// Simulation logs
// =============================================================================

pub fn log_run_start(label: &str, cfg: &SimConfig, seed: u64) {
    let params = serde_json::to_value(cfg).unwrap_or(Value::Null);
    log(
        Level::Info,
        Domain::System,
        "run_start",
        obj(&[
            ("label", v_str(label)),
            ("seed", json!(seed)),
            ("params_hash", v_str(&params_hash(&params.to_string()))),
            ("params", params),
        ]),
    );
}

/// Fields of a fatal config record. The full error chain goes into `msg` and
/// the validation variant, when there is one, into `kind`.
fn config_error_fields(err: &anyhow::Error) -> Map<String, Value> {
    let kind = err
        .downcast_ref::<ConfigError>()
        .map(|e| v_str(e.kind()))
        .unwrap_or(Value::Null);
    obj(&[("msg", v_str(&format!("{:#}", err))), ("kind", kind)])
}

pub fn log_config_error(err: &anyhow::Error) {
    log(Level::Fatal, Domain::System, "config_error", config_error_fields(err));
}

pub fn log_initial_lattice(label: &str, size: usize, fraction: f64, state_hash: &str) {
    log(
        Level::Info,
        Domain::Lattice,
        "initial",
        obj(&[
            ("label", v_str(label)),
            ("size", json!(size)),
            ("cooperator_fraction", v_num(fraction)),
            ("state_hash", v_str(state_hash)),
        ]),
    );
}

pub fn log_generation(label: &str, report: &GenerationReport) {
    log(
        Level::Info,
        Domain::Sim,
        "metrics.generation",
        obj(&[
            ("label", v_str(label)),
            ("generation", json!(report.generation)),
            ("cooperator_fraction", v_num(report.cooperator_fraction)),
            ("c", json!(report.counts.cooperator)),
            ("ec", json!(report.counts.excluding_cooperator)),
            ("ed", json!(report.counts.excluding_defector)),
            ("d", json!(report.counts.defector)),
            ("excluded", json!(report.excluded_sites)),
            ("attempts", json!(report.attempts)),
            ("imitations", json!(report.imitations)),
        ]),
    );
}

pub fn log_run_summary(label: &str, summary: &RunSummary) {
    log(
        Level::Info,
        Domain::System,
        "run_summary",
        obj(&[
            ("label", v_str(label)),
            ("seed", json!(summary.seed)),
            ("generations", json!(summary.generations_run)),
            ("final_fraction", v_num(summary.final_fraction)),
            (
                "absorbed_by",
                summary
                    .absorbed_by
                    .map(|s| v_str(s.as_str()))
                    .unwrap_or(Value::Null),
            ),
            ("stopped_early", json!(summary.stopped_early)),
            ("imitations", json!(summary.total_imitations)),
            ("elapsed_ms", v_num(summary.elapsed_ms)),
        ]),
    );
    log(
        Level::Info,
        Domain::Audit,
        "final_state",
        obj(&[
            ("label", v_str(label)),
            ("seed", json!(summary.seed)),
            ("state_hash", v_str(&summary.state_hash)),
        ]),
    );
}

pub fn log_snapshot(path: &str, generation: u64, state_hash: &str) {
    log(
        Level::Info,
        Domain::Lattice,
        "snapshot_written",
        obj(&[
            ("path", v_str(path)),
            ("generation", json!(generation)),
            ("state_hash", v_str(state_hash)),
        ]),
    );
}

pub fn log_store_error(op: &str, err: &anyhow::Error) {
    log(
        Level::Error,
        Domain::Store,
        "store_error",
        obj(&[("op", v_str(op)), ("msg", v_str(&format!("{:#}", err)))]),
    );
}

/// Forwards run progress to the structured log.
pub struct LogObserver {
    label: String,
}

impl LogObserver {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
        }
    }
}

impl RunObserver for LogObserver {
    fn on_report(&mut self, _sim: &Simulation, report: &GenerationReport) -> Result<()> {
        log_generation(&self.label, report);
        Ok(())
    }

    fn on_finish(&mut self, _sim: &Simulation, summary: &RunSummary) -> Result<()> {
        log_run_summary(&self.label, summary);
        Ok(())
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

pub fn params_hash(input: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut h = std::collections::hash_map::DefaultHasher::new();
    input.hash(&mut h);
    format!("{:x}", h.finish())
}

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Profiling Scope
// =============================================================================

/// Emits elapsed time at trace level when dropped.
pub struct ProfileScope {
    label: &'static str,
    context: Option<Map<String, Value>>,
    started: Instant,
}

impl ProfileScope {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            context: None,
            started: Instant::now(),
        }
    }

    pub fn with_context(label: &'static str, fields: &[(&str, Value)]) -> Self {
        Self {
            label,
            context: Some(obj(fields)),
            started: Instant::now(),
        }
    }
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let mut fields = self.context.take().unwrap_or_default();
        fields.insert("label".to_string(), v_str(self.label));
        fields.insert("elapsed_ms".to_string(), v_num(elapsed_ms));
        log(Level::Trace, Domain::Profile, "profile", fields);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Fatal);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(Level::parse("warn"), Some(Level::Warn));
        assert_eq!(Level::parse("loud"), None);
    }

    #[test]
    fn test_params_hash_deterministic() {
        assert_eq!(params_hash("size=10"), params_hash("size=10"));
        assert_ne!(params_hash("size=10"), params_hash("size=11"));
    }

    #[test]
    fn test_split_fields_lifts_run_keys() {
        let (top, data) = split_fields(obj(&[
            ("label", v_str("r=4")),
            ("generation", json!(3)),
            ("cooperator_fraction", v_num(0.5)),
        ]));
        assert_eq!(top.get("label").unwrap(), "r=4");
        assert_eq!(top.get("generation").unwrap(), 3);
        assert!(data.contains_key("cooperator_fraction"));
        assert!(!data.contains_key("label"));
    }

    #[test]
    fn test_obj_helper() {
        let m = obj(&[("key", v_str("value")), ("num", v_num(42.0))]);
        assert_eq!(m.get("key").unwrap(), "value");
        assert_eq!(m.get("num").unwrap(), 42.0);
    }

    #[test]
    fn test_config_error_fields_keep_chain_and_kind() {
        let err = anyhow::Error::new(ConfigError::NonPositiveNoise(0.0));
        let fields = config_error_fields(&err);
        assert_eq!(fields.get("kind").unwrap(), "non_positive_noise");
        assert!(fields.get("msg").unwrap().as_str().unwrap().contains("noise"));

        let err = anyhow::Error::new(ConfigError::ZeroReportInterval).context("loading cfg.json");
        let fields = config_error_fields(&err);
        let msg = fields.get("msg").unwrap().as_str().unwrap();
        assert!(msg.starts_with("loading cfg.json: "));
        assert!(msg.contains("report interval"));
        assert_eq!(fields.get("kind").unwrap(), "zero_report_interval");

        let err = anyhow::anyhow!("expected value at line 1 column 1");
        assert_eq!(config_error_fields(&err).get("kind").unwrap(), &Value::Null);
    }

    #[test]
    fn test_domain_names() {
        assert_eq!(Domain::Sim.as_str(), "sim");
        assert_eq!(Domain::Sweep.as_str(), "sweep");
    }

    #[test]
    fn test_seq_increments() {
        let s1 = next_seq();
        let s2 = next_seq();
        assert!(s2 > s1);
    }
}
