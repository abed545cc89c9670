use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::payoff::GameParams;
use crate::strategy::Strategy;
use crate::update::Dynamics;

/// Tolerance on the initial distribution summing to one.
pub const DIST_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameVariant {
    /// Four strategies with the ostracism phase.
    #[default]
    Exclusion,
    /// Cooperators and defectors only, fixed five-member groups.
    Classic,
}

impl GameVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameVariant::Exclusion => "exclusion",
            GameVariant::Classic => "classic",
        }
    }
}

/// Which strategy still pays the exclusion cost after being excluded itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExcludedCharge {
    #[default]
    ExcludingCooperator,
    ExcludingDefector,
}

impl ExcludedCharge {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExcludedCharge::ExcludingCooperator => "ec",
            ExcludedCharge::ExcludingDefector => "ed",
        }
    }
}

/// Initial occupation probability of each strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyDistribution {
    pub cooperator: f64,
    pub excluding_cooperator: f64,
    pub excluding_defector: f64,
    pub defector: f64,
}

impl Default for StrategyDistribution {
    fn default() -> Self {
        Self {
            cooperator: 0.4,
            excluding_cooperator: 0.1,
            excluding_defector: 0.0,
            defector: 0.5,
        }
    }
}

impl StrategyDistribution {
    pub fn only(s: Strategy) -> Self {
        let mut d = Self {
            cooperator: 0.0,
            excluding_cooperator: 0.0,
            excluding_defector: 0.0,
            defector: 0.0,
        };
        match s {
            Strategy::Cooperator => d.cooperator = 1.0,
            Strategy::ExcludingCooperator => d.excluding_cooperator = 1.0,
            Strategy::ExcludingDefector => d.excluding_defector = 1.0,
            Strategy::Defector => d.defector = 1.0,
        }
        d
    }

    pub fn probability(&self, s: Strategy) -> f64 {
        match s {
            Strategy::Cooperator => self.cooperator,
            Strategy::ExcludingCooperator => self.excluding_cooperator,
            Strategy::ExcludingDefector => self.excluding_defector,
            Strategy::Defector => self.defector,
        }
    }

    /// Parses `"c,ec,ed,d"`, e.g. `"0.4,0.1,0,0.5"`.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let parts: Vec<&str> = raw.split(',').map(|p| p.trim()).collect();
        if parts.len() != 4 {
            return Err(ConfigError::InvalidDistribution(format!(
                "expected 4 comma-separated probabilities, got {}",
                parts.len()
            )));
        }
        let mut vals = [0.0f64; 4];
        for (slot, part) in vals.iter_mut().zip(parts.iter()) {
            *slot = part.parse().map_err(|_| ConfigError::Parse {
                key: "INIT_DIST".to_string(),
                value: raw.to_string(),
            })?;
        }
        Ok(Self {
            cooperator: vals[0],
            excluding_cooperator: vals[1],
            excluding_defector: vals[2],
            defector: vals[3],
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut sum = 0.0;
        for s in Strategy::ALL {
            let p = self.probability(s);
            if !p.is_finite() || p < 0.0 {
                return Err(ConfigError::InvalidDistribution(format!(
                    "{} probability must be finite and non-negative, got {}",
                    s, p
                )));
            }
            sum += p;
        }
        if (sum - 1.0).abs() > DIST_SUM_TOLERANCE {
            return Err(ConfigError::InvalidDistribution(format!(
                "probabilities sum to {}, expected 1",
                sum
            )));
        }
        Ok(())
    }

    /// Inverse-CDF draw over the strategies in code order.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Strategy {
        let u: f64 = rng.gen();
        let mut acc = 0.0;
        let mut last_possible = Strategy::Defector;
        for s in Strategy::ALL {
            let p = self.probability(s);
            if p <= 0.0 {
                continue;
            }
            last_possible = s;
            acc += p;
            if u < acc {
                return s;
            }
        }
        // Rounding left the cumulative sum just under one.
        last_possible
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    NonPositiveNoise(f64),
    LatticeTooSmall(usize),
    NonFinite { field: &'static str, value: f64 },
    NegativeExclusionCost(f64),
    InvalidDistribution(String),
    ZeroReportInterval,
    ExcludersInClassic,
    SizeMismatch { expected: usize, actual: usize },
    Parse { key: String, value: String },
}

impl ConfigError {
    /// Stable snake_case name of the variant, for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigError::NonPositiveNoise(_) => "non_positive_noise",
            ConfigError::LatticeTooSmall(_) => "lattice_too_small",
            ConfigError::NonFinite { .. } => "non_finite",
            ConfigError::NegativeExclusionCost(_) => "negative_exclusion_cost",
            ConfigError::InvalidDistribution(_) => "invalid_distribution",
            ConfigError::ZeroReportInterval => "zero_report_interval",
            ConfigError::ExcludersInClassic => "excluders_in_classic",
            ConfigError::SizeMismatch { .. } => "size_mismatch",
            ConfigError::Parse { .. } => "parse",
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NonPositiveNoise(k) => write!(f, "noise K must be > 0, got {}", k),
            ConfigError::LatticeTooSmall(l) => {
                write!(f, "lattice size must be at least 2, got {}", l)
            }
            ConfigError::NonFinite { field, value } => {
                write!(f, "{} must be finite, got {}", field, value)
            }
            ConfigError::NegativeExclusionCost(c) => {
                write!(f, "exclusion cost must be >= 0, got {}", c)
            }
            ConfigError::InvalidDistribution(msg) => write!(f, "initial distribution: {}", msg),
            ConfigError::ZeroReportInterval => write!(f, "report interval must be >= 1"),
            ConfigError::ExcludersInClassic => write!(
                f,
                "classic variant only admits cooperators and defectors in the initial distribution"
            ),
            ConfigError::SizeMismatch { expected, actual } => write!(
                f,
                "initial lattice is {}x{}, config expects {}x{}",
                actual, actual, expected, expected
            ),
            ConfigError::Parse { key, value } => write!(f, "cannot parse {}={:?}", key, value),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Lattice side length `L`.
    pub size: usize,
    pub generations: u64,
    /// Fermi noise `K`.
    pub noise: f64,
    pub exclusion_cost: f64,
    /// Synergy factor `r`.
    pub synergy: f64,
    pub initial: StrategyDistribution,
    pub report_interval: u64,
    pub seed: Option<u64>,
    pub variant: GameVariant,
    pub excluded_charge: ExcludedCharge,
    /// Stop once one strategy holds every site.
    pub stop_when_absorbed: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            size: 100,
            generations: 100_000,
            noise: 0.1,
            exclusion_cost: 10.0,
            synergy: 4.0,
            initial: StrategyDistribution::default(),
            report_interval: 100,
            seed: None,
            variant: GameVariant::Exclusion,
            excluded_charge: ExcludedCharge::ExcludingCooperator,
            stop_when_absorbed: false,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Parse {
            key: key.to_string(),
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

impl SimConfig {
    /// Reads `LATTICE_SIZE`, `GENERATIONS`, `NOISE_K`, `EXCLUSION_COST`,
    /// `SYNERGY_R`, `INIT_DIST`, `REPORT_EVERY`, `SEED`, `VARIANT`,
    /// `EXCLUDED_CHARGE` and `STOP_WHEN_ABSORBED`, defaulting anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let d = Self::default();
        let initial = match std::env::var("INIT_DIST") {
            Ok(raw) => StrategyDistribution::parse(&raw)?,
            Err(_) => d.initial,
        };
        let seed = match std::env::var("SEED") {
            Ok(raw) => Some(raw.trim().parse().map_err(|_| ConfigError::Parse {
                key: "SEED".to_string(),
                value: raw,
            })?),
            Err(_) => None,
        };
        let variant = match std::env::var("VARIANT").as_deref() {
            Ok("classic") => GameVariant::Classic,
            Ok("exclusion") | Err(_) => GameVariant::Exclusion,
            Ok(other) => {
                return Err(ConfigError::Parse {
                    key: "VARIANT".to_string(),
                    value: other.to_string(),
                })
            }
        };
        let excluded_charge = match std::env::var("EXCLUDED_CHARGE").as_deref() {
            Ok("ec") | Err(_) => ExcludedCharge::ExcludingCooperator,
            Ok("ed") => ExcludedCharge::ExcludingDefector,
            Ok(other) => {
                return Err(ConfigError::Parse {
                    key: "EXCLUDED_CHARGE".to_string(),
                    value: other.to_string(),
                })
            }
        };
        Ok(Self {
            size: env_parse("LATTICE_SIZE", d.size)?,
            generations: env_parse("GENERATIONS", d.generations)?,
            noise: env_parse("NOISE_K", d.noise)?,
            exclusion_cost: env_parse("EXCLUSION_COST", d.exclusion_cost)?,
            synergy: env_parse("SYNERGY_R", d.synergy)?,
            initial,
            report_interval: env_parse("REPORT_EVERY", d.report_interval)?,
            seed,
            variant,
            excluded_charge,
            stop_when_absorbed: env_flag("STOP_WHEN_ABSORBED", d.stop_when_absorbed),
        })
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let cfg = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg)
    }

    /// `CONFIG_PATH` when set, the environment otherwise.
    pub fn load() -> Result<Self> {
        match std::env::var("CONFIG_PATH") {
            Ok(path) => Self::from_json_file(Path::new(&path)),
            Err(_) => Ok(Self::from_env()?),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.size <= 1 {
            return Err(ConfigError::LatticeTooSmall(self.size));
        }
        if !self.noise.is_finite() {
            return Err(ConfigError::NonFinite {
                field: "noise",
                value: self.noise,
            });
        }
        if self.noise <= 0.0 {
            return Err(ConfigError::NonPositiveNoise(self.noise));
        }
        if !self.synergy.is_finite() {
            return Err(ConfigError::NonFinite {
                field: "synergy",
                value: self.synergy,
            });
        }
        if !self.exclusion_cost.is_finite() {
            return Err(ConfigError::NonFinite {
                field: "exclusion_cost",
                value: self.exclusion_cost,
            });
        }
        if self.exclusion_cost < 0.0 {
            return Err(ConfigError::NegativeExclusionCost(self.exclusion_cost));
        }
        if self.report_interval == 0 {
            return Err(ConfigError::ZeroReportInterval);
        }
        self.initial.validate()?;
        if self.variant == GameVariant::Classic
            && (self.initial.excluding_cooperator > 0.0 || self.initial.excluding_defector > 0.0)
        {
            return Err(ConfigError::ExcludersInClassic);
        }
        Ok(())
    }

    pub fn game_params(&self) -> GameParams {
        GameParams {
            synergy: self.synergy,
            exclusion_cost: self.exclusion_cost,
            excluded_charge: self.excluded_charge,
        }
    }

    pub fn dynamics(&self) -> Dynamics {
        Dynamics {
            variant: self.variant,
            game: self.game_params(),
            noise: self.noise,
        }
    }
}
