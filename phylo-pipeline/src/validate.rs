// Work Item Validation
// Eager checks of inputs and referenced resources before any stage runs

use crate::alignment::Alignment;
use crate::config::RateMatrix;
use crate::error::{PipelineError, PipelineResult};
use crate::family::Family;
use crate::structure::Structure;

/// What validation learned about a family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilySummary {
    pub name: String,
    pub num_seqs: usize,
    pub num_sites: usize,
    /// Residue count of the structure, when the family has one
    pub structure_residues: Option<usize>,
}

/// Check that a custom rate matrix exists; the sentinel always passes
pub fn validate_rate_matrix(rate_matrix: &RateMatrix) -> PipelineResult<()> {
    match rate_matrix.path() {
        None => Ok(()),
        Some(path) if path.is_file() => Ok(()),
        Some(path) => Err(PipelineError::configuration(format!(
            "rate matrix file does not exist: {}",
            path.display()
        ))),
    }
}

/// Parse the family's alignment and structure, failing on malformed data
pub fn validate_family(family: &Family) -> PipelineResult<FamilySummary> {
    let alignment = Alignment::read(&family.name, &family.alignment_path)?;

    let structure_residues = match &family.structure_path {
        Some(path) => Some(Structure::read(&family.name, path)?.len()),
        None => None,
    };

    Ok(FamilySummary {
        name: family.name.clone(),
        num_seqs: alignment.num_seqs(),
        num_sites: alignment.num_sites(),
        structure_residues,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    use std::fs;

    #[test]
    fn test_rate_matrix_sentinel_passes() {
        assert!(validate_rate_matrix(&RateMatrix::parse("None").unwrap()).is_ok());
    }

    #[test]
    fn test_missing_rate_matrix_is_configuration_error() {
        let err = validate_rate_matrix(&RateMatrix::parse("I-do-not-exist").unwrap()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("I-do-not-exist"));
    }

    #[test]
    fn test_existing_rate_matrix_passes() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("Q.txt");
        fs::write(&path, "A R\n").unwrap();
        assert!(validate_rate_matrix(&RateMatrix::File(path)).is_ok());

        // A directory is not a rate matrix
        let err = validate_rate_matrix(&RateMatrix::File(temp.path().to_path_buf())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_validate_family_summary() {
        let temp = tempfile::tempdir().unwrap();
        let a3m = temp.path().join("fam.a3m");
        let pdb = temp.path().join("fam.pdb");
        fs::write(&a3m, ">q\nMKVL\n>h\nMKaVL\n").unwrap();
        fs::write(&pdb, crate::structure::tests::linear_pdb(4)).unwrap();

        let family = Family::new("fam", &a3m).with_structure(&pdb);
        let summary = validate_family(&family).unwrap();

        assert_eq!(summary.num_seqs, 2);
        assert_eq!(summary.num_sites, 4);
        assert_eq!(summary.structure_residues, Some(4));
    }

    #[test]
    fn test_validate_family_malformed() {
        let temp = tempfile::tempdir().unwrap();
        let a3m = temp.path().join("bad.a3m");
        fs::write(&a3m, ">q\nMKVL\n>h\nMK\n").unwrap();

        let err = validate_family(&Family::new("bad", &a3m)).unwrap_err();
        assert!(matches!(err, PipelineError::Msa { .. }));
        assert_eq!(err.family(), Some("bad"));

        let good = temp.path().join("good.a3m");
        let pdb = temp.path().join("good.pdb");
        fs::write(&good, ">q\nMKVL\n").unwrap();
        fs::write(&pdb, "not a structure\n").unwrap();
        let err = validate_family(&Family::new("good", &good).with_structure(&pdb)).unwrap_err();
        assert!(matches!(err, PipelineError::Structure { .. }));
        assert_eq!(err.kind(), ErrorKind::Input);
    }
}
