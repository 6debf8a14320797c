// Structure Reader
// Extracts CA coordinates from PDB files and derives contact maps

use crate::error::{PipelineError, PipelineResult};

use std::fs;
use std::path::Path;

/// CA trace of the first chain of the first model in a PDB file
#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    residues: Vec<[f64; 3]>,
}

impl Structure {
    /// Parse PDB text, keeping one CA atom per residue in file order
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut residues = Vec::new();
        let mut chain: Option<char> = None;
        let mut last_residue: Option<(String, char)> = None;

        for (line_index, line) in text.lines().enumerate() {
            let line_no = line_index + 1;

            if line.starts_with("ENDMDL") {
                break;
            }
            if line.starts_with("TER") && !residues.is_empty() {
                break;
            }
            if !line.starts_with("ATOM") {
                continue;
            }
            if line.len() < 54 {
                return Err(format!("line {}: truncated ATOM record", line_no));
            }

            let atom_name = field(line, 12, 16)?.trim();
            if atom_name != "CA" {
                continue;
            }

            let alt_loc = column_char(line, 16);
            if alt_loc != ' ' && alt_loc != 'A' {
                continue;
            }

            let chain_id = column_char(line, 21);
            match chain {
                None => chain = Some(chain_id),
                Some(current) if current != chain_id => break,
                Some(_) => {}
            }

            // Residue number plus insertion code identifies a residue
            let residue_key = (
                field(line, 22, 26)?.trim().to_string(),
                column_char(line, 26),
            );
            if last_residue.as_ref() == Some(&residue_key) {
                continue;
            }
            last_residue = Some(residue_key);

            let coord = |start: usize, end: usize| -> Result<f64, String> {
                let raw = field(line, start, end)?.trim();
                raw.parse::<f64>()
                    .map_err(|_| format!("line {}: invalid coordinate '{}'", line_no, raw))
            };
            residues.push([coord(30, 38)?, coord(38, 46)?, coord(46, 54)?]);
        }

        if residues.is_empty() {
            return Err("structure contains no CA atoms".to_string());
        }

        Ok(Self { residues })
    }

    /// Read and parse the structure of `family` from `path`
    pub fn read(family: &str, path: &Path) -> PipelineResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            PipelineError::structure(family, format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&text).map_err(|message| PipelineError::structure(family, message))
    }

    pub fn len(&self) -> usize {
        self.residues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residues.is_empty()
    }

    /// Residue pairs `(i, j)`, `i < j < limit`, whose CA atoms are closer than `cutoff`
    pub fn contacts(&self, cutoff: f64, limit: usize) -> ContactMap {
        let n = self.residues.len().min(limit);
        let cutoff_sq = cutoff * cutoff;
        let mut pairs = Vec::new();

        for i in 0..n {
            for j in (i + 1)..n {
                let [xi, yi, zi] = self.residues[i];
                let [xj, yj, zj] = self.residues[j];
                let d_sq = (xi - xj).powi(2) + (yi - yj).powi(2) + (zi - zj).powi(2);
                if d_sq < cutoff_sq {
                    pairs.push((i, j));
                }
            }
        }

        ContactMap { pairs }
    }
}

fn column_char(line: &str, index: usize) -> char {
    line.get(index..index + 1)
        .and_then(|s| s.chars().next())
        .unwrap_or(' ')
}

fn field(line: &str, start: usize, end: usize) -> Result<&str, String> {
    line.get(start..end)
        .ok_or_else(|| format!("record too short for columns {}-{}", start + 1, end))
}

/// Site pairs considered in spatial contact
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactMap {
    pairs: Vec<(usize, usize)>,
}

impl ContactMap {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
