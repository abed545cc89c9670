use std::fmt;

use serde::{Deserialize, Serialize};

/// Behavioral strategy held by one lattice site.
///
/// Numeric codes (used in snapshots and the database) follow declaration
/// order: 0 cooperator, 1 excluding cooperator, 2 excluding defector,
/// 3 defector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Cooperator,
    ExcludingCooperator,
    ExcludingDefector,
    Defector,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Cooperator,
        Strategy::ExcludingCooperator,
        Strategy::ExcludingDefector,
        Strategy::Defector,
    ];

    /// Contributes to the pot (and pays the unit contribution cost).
    pub fn is_cooperative(self) -> bool {
        matches!(self, Strategy::Cooperator | Strategy::ExcludingCooperator)
    }

    /// Takes part in ostracism.
    pub fn is_excluder(self) -> bool {
        matches!(self, Strategy::ExcludingCooperator | Strategy::ExcludingDefector)
    }

    pub fn code(self) -> u8 {
        match self {
            Strategy::Cooperator => 0,
            Strategy::ExcludingCooperator => 1,
            Strategy::ExcludingDefector => 2,
            Strategy::Defector => 3,
        }
    }

    pub fn from_code(code: u8) -> Result<Self, StrategyCodeError> {
        match code {
            0 => Ok(Strategy::Cooperator),
            1 => Ok(Strategy::ExcludingCooperator),
            2 => Ok(Strategy::ExcludingDefector),
            3 => Ok(Strategy::Defector),
            other => Err(StrategyCodeError { code: other }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Cooperator => "cooperator",
            Strategy::ExcludingCooperator => "excluding_cooperator",
            Strategy::ExcludingDefector => "excluding_defector",
            Strategy::Defector => "defector",
        }
    }

    /// Single-character glyph for terminal maps.
    pub fn glyph(self) -> char {
        match self {
            Strategy::Cooperator => 'C',
            Strategy::ExcludingCooperator => 'E',
            Strategy::ExcludingDefector => 'x',
            Strategy::Defector => 'D',
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyCodeError {
    pub code: u8,
}

impl fmt::Display for StrategyCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid strategy code {} (expected 0..=3)", self.code)
    }
}

impl std::error::Error for StrategyCodeError {}

/// Per-strategy head counts over a lattice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyCounts {
    pub cooperator: usize,
    pub excluding_cooperator: usize,
    pub excluding_defector: usize,
    pub defector: usize,
}

impl StrategyCounts {
    pub fn add(&mut self, s: Strategy) {
        match s {
            Strategy::Cooperator => self.cooperator += 1,
            Strategy::ExcludingCooperator => self.excluding_cooperator += 1,
            Strategy::ExcludingDefector => self.excluding_defector += 1,
            Strategy::Defector => self.defector += 1,
        }
    }

    pub fn get(&self, s: Strategy) -> usize {
        match s {
            Strategy::Cooperator => self.cooperator,
            Strategy::ExcludingCooperator => self.excluding_cooperator,
            Strategy::ExcludingDefector => self.excluding_defector,
            Strategy::Defector => self.defector,
        }
    }

    pub fn total(&self) -> usize {
        self.cooperator + self.excluding_cooperator + self.excluding_defector + self.defector
    }

    pub fn cooperative(&self) -> usize {
        self.cooperator + self.excluding_cooperator
    }

    /// Fraction of sites in the cooperative set; 0 for an empty tally.
    pub fn cooperator_fraction(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.cooperative() as f64 / total as f64
        }
    }

    /// The strategy occupying every site, if any.
    pub fn sole_strategy(&self) -> Option<Strategy> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        Strategy::ALL.into_iter().find(|s| self.get(*s) == total)
    }
}
