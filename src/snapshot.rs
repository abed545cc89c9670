//! Final-state export for plotting: row-major strategy codes plus a legend.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::lattice::Lattice;
use crate::strategy::{Strategy, StrategyCounts};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegendEntry {
    pub code: u8,
    pub name: String,
    pub glyph: char,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatticeSnapshot {
    pub size: usize,
    pub generation: u64,
    /// `rows[y][x]` is the strategy code at `(x, y)`.
    pub rows: Vec<Vec<u8>>,
    pub counts: StrategyCounts,
    pub cooperator_fraction: f64,
    pub state_hash: String,
    pub legend: Vec<LegendEntry>,
}

impl LatticeSnapshot {
    pub fn capture(lattice: &Lattice, generation: u64) -> Self {
        let counts = lattice.counts();
        Self {
            size: lattice.size(),
            generation,
            rows: lattice
                .rows()
                .map(|row| row.iter().map(|s| s.code()).collect())
                .collect(),
            counts,
            cooperator_fraction: counts.cooperator_fraction(),
            state_hash: lattice.state_hash(),
            legend: Strategy::ALL
                .iter()
                .map(|s| LegendEntry {
                    code: s.code(),
                    name: s.as_str().to_string(),
                    glyph: s.glyph(),
                })
                .collect(),
        }
    }

    /// Rebuilds the lattice, checking shape, codes and the stored hash.
    pub fn to_lattice(&self) -> Result<Lattice> {
        if self.rows.len() != self.size || self.rows.iter().any(|r| r.len() != self.size) {
            return Err(anyhow!("snapshot rows are not {}x{}", self.size, self.size));
        }
        let mut cells = Vec::with_capacity(self.size * self.size);
        for row in &self.rows {
            for code in row {
                cells.push(Strategy::from_code(*code)?);
            }
        }
        let lattice = Lattice::from_cells(self.size, cells)
            .ok_or_else(|| anyhow!("snapshot cell count mismatch"))?;
        if lattice.state_hash() != self.state_hash {
            return Err(anyhow!("snapshot hash mismatch"));
        }
        Ok(lattice)
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut w = BufWriter::new(file);
        serde_json::to_writer(&mut w, self)?;
        w.flush()?;
        Ok(())
    }

    pub fn read_json(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

/// Categorical map, one glyph per site, one line per row.
pub fn render_ascii(lattice: &Lattice) -> String {
    let mut out = String::with_capacity(lattice.len() + lattice.size());
    for row in lattice.rows() {
        out.extend(row.iter().map(|s| s.glyph()));
        out.push('\n');
    }
    out
}
