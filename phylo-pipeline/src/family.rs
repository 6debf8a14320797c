// Family Discovery
// Scans the alignment directory and pairs alignments with structures

use crate::error::{PipelineError, PipelineResult};

use std::fs;
use std::path::{Path, PathBuf};

/// File extension of alignment inputs
pub const ALIGNMENT_EXTENSION: &str = "a3m";

/// File extension of structure inputs
pub const STRUCTURE_EXTENSION: &str = "pdb";

/// One independent unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Family {
    /// Identity, taken from the alignment file stem
    pub name: String,
    /// Alignment file
    pub alignment_path: PathBuf,
    /// Paired structure file, if one exists
    pub structure_path: Option<PathBuf>,
}

impl Family {
    pub fn new(name: impl Into<String>, alignment_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            alignment_path: alignment_path.into(),
            structure_path: None,
        }
    }

    pub fn with_structure(mut self, structure_path: impl Into<PathBuf>) -> Self {
        self.structure_path = Some(structure_path.into());
        self
    }
}

/// Discover families in `alignment_dir`, sorted by name.
///
/// Only `*.a3m` files count as families. When `structure_dir` is given, a
/// `<name>.pdb` file there is attached to the family of the same name.
pub fn discover_families(
    alignment_dir: &Path,
    structure_dir: Option<&Path>,
) -> PipelineResult<Vec<Family>> {
    if !alignment_dir.is_dir() {
        return Err(PipelineError::configuration(format!(
            "alignment directory does not exist: {}",
            alignment_dir.display()
        )));
    }
    if let Some(dir) = structure_dir {
        if !dir.is_dir() {
            return Err(PipelineError::configuration(format!(
                "structure directory does not exist: {}",
                dir.display()
            )));
        }
    }

    let entries = fs::read_dir(alignment_dir).map_err(|e| PipelineError::io(alignment_dir, e))?;

    let mut families = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::io(alignment_dir, e))?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(ALIGNMENT_EXTENSION) {
            tracing::debug!(path = %path.display(), "ignoring non-alignment file");
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            tracing::debug!(path = %path.display(), "ignoring alignment with non UTF-8 name");
            continue;
        };

        let mut family = Family::new(name, &path);
        if let Some(dir) = structure_dir {
            let structure = dir.join(format!("{}.{}", name, STRUCTURE_EXTENSION));
            if structure.is_file() {
                family = family.with_structure(structure);
            }
        }
        families.push(family);
    }

    families.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(families)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_sorted_and_filtered() {
        let temp = tempfile::tempdir().unwrap();
        let a3m = temp.path().join("a3m");
        let pdb = temp.path().join("pdb");
        fs::create_dir_all(&a3m).unwrap();
        fs::create_dir_all(&pdb).unwrap();

        for name in ["2xyz", "1abc", "3def"] {
            fs::write(a3m.join(format!("{}.a3m", name)), ">a\nMK\n").unwrap();
        }
        fs::write(a3m.join("README.txt"), "notes").unwrap();
        fs::create_dir(a3m.join("nested.a3m")).unwrap();
        fs::write(pdb.join("1abc.pdb"), "").unwrap();

        let families = discover_families(&a3m, Some(&pdb)).unwrap();

        let names: Vec<_> = families.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["1abc", "2xyz", "3def"]);
        assert_eq!(families[0].structure_path, Some(pdb.join("1abc.pdb")));
        assert!(families[1].structure_path.is_none());
        assert_eq!(families[2].alignment_path, a3m.join("3def.a3m"));
    }

    #[test]
    fn test_discover_missing_directory() {
        let temp = tempfile::tempdir().unwrap();
        let err = discover_families(&temp.path().join("missing"), None).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);

        let err = discover_families(temp.path(), Some(&temp.path().join("nope"))).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }
}
