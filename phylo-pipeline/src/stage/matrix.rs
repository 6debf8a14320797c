// Pair Matrices
// 20x20 amino acid pair counts shared by the matrix-producing stages

use std::fmt::Write as _;

/// Amino acids indexing the rows and columns of count matrices
pub const AMINO_ACIDS: &[u8; 20] = b"ACDEFGHIKLMNPQRSTVWY";

/// Square labelled matrix written as a stage artifact
#[derive(Debug, Clone, PartialEq)]
pub struct PairMatrix {
    pub labels: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl PairMatrix {
    /// Tab separated rendering with a header row and a label column
    pub fn to_tsv(&self) -> String {
        let mut out = String::new();
        for label in &self.labels {
            out.push('\t');
            out.push_str(label);
        }
        out.push('\n');

        for (label, row) in self.labels.iter().zip(&self.values) {
            out.push_str(label);
            for value in row {
                let _ = write!(out, "\t{}", value);
            }
            out.push('\n');
        }
        out
    }

    /// Value at the residue pair `(a, b)`, if both are amino acids
    pub fn get(&self, a: u8, b: u8) -> Option<f64> {
        let a = AMINO_ACIDS.iter().position(|&x| x == a)?;
        let b = AMINO_ACIDS.iter().position(|&x| x == b)?;
        Some(self.values[a][b])
    }
}

/// Symmetric accumulator over amino acid pairs.
///
/// Each observation counts in both orientations; gaps, `X`, and anything
/// else outside [`AMINO_ACIDS`] are ignored.
#[derive(Debug, Clone)]
pub struct PairCounts {
    index: [Option<usize>; 256],
    counts: Vec<Vec<u64>>,
}

impl PairCounts {
    pub fn new() -> Self {
        let mut index = [None; 256];
        for (i, &aa) in AMINO_ACIDS.iter().enumerate() {
            index[aa as usize] = Some(i);
        }
        let n = AMINO_ACIDS.len();
        Self {
            index,
            counts: vec![vec![0; n]; n],
        }
    }

    pub fn add(&mut self, a: u8, b: u8) {
        if let (Some(a), Some(b)) = (self.index[a as usize], self.index[b as usize]) {
            self.counts[a][b] += 1;
            self.counts[b][a] += 1;
        }
    }

    pub fn into_matrix(self) -> PairMatrix {
        PairMatrix {
            labels: AMINO_ACIDS.iter().map(|&aa| (aa as char).to_string()).collect(),
            values: self
                .counts
                .into_iter()
                .map(|row| row.into_iter().map(|c| c as f64).collect())
                .collect(),
        }
    }
}

impl Default for PairCounts {
    fn default() -> Self {
        Self::new()
    }
}
