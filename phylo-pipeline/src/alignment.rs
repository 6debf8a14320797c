// Alignment Reader
// Parses a3m alignments and applies deterministic truncation

use crate::error::{PipelineError, PipelineResult};

use bio::io::fasta;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

/// Residue characters accepted in aligned (match) columns
const ALIGNED_ALPHABET: &[u8] = b"ACDEFGHIKLMNPQRSTVWYX-";

/// A parsed multiple sequence alignment with insertions removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alignment {
    names: Vec<String>,
    rows: Vec<Vec<u8>>,
}

impl Alignment {
    /// Parse a3m text.
    ///
    /// `#` lines and blank lines are dropped before the records are read as
    /// FASTA. Lowercase letters and `.` are insertion states and are removed;
    /// every remaining row must have the same length and use only the aligned
    /// alphabet. Errors are plain messages so callers can attach the family.
    pub fn parse(text: &str) -> Result<Self, String> {
        let body: String = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .flat_map(|line| [line, "\n"])
            .collect();

        let mut names: Vec<String> = Vec::new();
        let mut rows: Vec<Vec<u8>> = Vec::new();
        let mut seen = HashSet::new();

        for record in fasta::Reader::new(body.as_bytes()).records() {
            let record = record.map_err(|e| e.to_string())?;
            let name = record.id().to_string();
            if name.is_empty() {
                return Err(format!("record {}: header without a sequence name", rows.len() + 1));
            }
            if !seen.insert(name.clone()) {
                return Err(format!("duplicate sequence name '{}'", name));
            }

            let mut row = Vec::with_capacity(record.seq().len());
            for &byte in record.seq() {
                if byte.is_ascii_lowercase() || byte == b'.' {
                    continue;
                }
                if !ALIGNED_ALPHABET.contains(&byte) {
                    return Err(format!(
                        "invalid residue '{}' in sequence '{}'",
                        byte.escape_ascii(),
                        name
                    ));
                }
                row.push(byte);
            }
            if row.is_empty() {
                return Err(format!("sequence '{}' has no residues", name));
            }

            names.push(name);
            rows.push(row);
        }

        if rows.is_empty() {
            return Err("alignment contains no sequences".to_string());
        }

        let width = rows[0].len();
        for (name, row) in names.iter().zip(&rows) {
            if row.len() != width {
                return Err(format!(
                    "sequence '{}' has {} aligned columns, expected {}",
                    name,
                    row.len(),
                    width
                ));
            }
        }

        Ok(Self { names, rows })
    }

    /// Read and parse the alignment of `family` from `path`
    pub fn read(family: &str, path: &Path) -> PipelineResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            PipelineError::msa(family, format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&text).map_err(|message| PipelineError::msa(family, message))
    }

    pub fn num_seqs(&self) -> usize {
        self.rows.len()
    }

    pub fn num_sites(&self) -> usize {
        self.rows.first().map(Vec::len).unwrap_or(0)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn rows(&self) -> &[Vec<u8>] {
        &self.rows
    }

    /// Keep the first `max_seqs` sequences and first `max_sites` columns.
    ///
    /// Selection is by original order so the result does not depend on
    /// hashing, seeds, or which worker performs it.
    pub fn truncate(&self, max_seqs: usize, max_sites: usize) -> Self {
        let names = self.names.iter().take(max_seqs).cloned().collect();
        let rows = self
            .rows
            .iter()
            .take(max_seqs)
            .map(|row| row.iter().take(max_sites).copied().collect())
            .collect();
        Self { names, rows }
    }

    /// Write as FASTA, one line per sequence
    pub fn write_fasta<W: io::Write>(&self, out: W) -> io::Result<()> {
        let mut writer = fasta::Writer::new(out);
        for (name, row) in self.names.iter().zip(&self.rows) {
            writer.write_record(&fasta::Record::with_attrs(name, None, row))?;
        }
        writer.flush()
    }
}
