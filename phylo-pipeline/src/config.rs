// Pipeline Configuration
// Run parameters, rate matrix references, and YAML loading

use crate::error::{PipelineError, PipelineResult};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Sentinel accepted in place of a rate matrix path
pub const RATE_MATRIX_SENTINEL: &str = "none";

/// Rate matrix handed to the tree inference tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(try_from = "String", into = "String")]
pub enum RateMatrix {
    /// Use the tool's built-in model
    #[default]
    Builtin,
    /// Custom rate matrix file
    File(PathBuf),
}

impl RateMatrix {
    /// Parse a reference; `none` (any case) selects the built-in model and
    /// anything else is a path. Blank references are rejected.
    pub fn parse(reference: &str) -> PipelineResult<Self> {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(PipelineError::configuration(format!(
                "rate_matrix must be '{}' or a path, got an empty string",
                RATE_MATRIX_SENTINEL
            )));
        }
        if trimmed.eq_ignore_ascii_case(RATE_MATRIX_SENTINEL) {
            Ok(RateMatrix::Builtin)
        } else {
            Ok(RateMatrix::File(PathBuf::from(trimmed)))
        }
    }

    /// Path of the custom matrix, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            RateMatrix::Builtin => None,
            RateMatrix::File(path) => Some(path),
        }
    }

    /// Short tag embedded in output directory names (`None` for the built-in model)
    pub fn tag(&self) -> Option<String> {
        let path = self.path()?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "rate_matrix".to_string());
        Some(sanitize_tag(&stem))
    }

    /// Identity recorded in stage manifests: the sentinel or the canonical path
    pub fn identity(&self) -> String {
        match self {
            RateMatrix::Builtin => RATE_MATRIX_SENTINEL.to_string(),
            RateMatrix::File(path) => path
                .canonicalize()
                .unwrap_or_else(|_| path.clone())
                .to_string_lossy()
                .to_string(),
        }
    }
}

/// Keep characters that are safe in a directory name
fn sanitize_tag(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Directory name tag for extra tool arguments (`None` without any)
pub fn args_tag(args: &[String]) -> Option<String> {
    if args.is_empty() {
        return None;
    }
    let parts: Vec<String> = args
        .iter()
        .map(|arg| sanitize_tag(arg.trim().trim_start_matches('-')))
        .collect();
    Some(format!("args_{}", parts.join("_")))
}

impl TryFrom<String> for RateMatrix {
    type Error = PipelineError;

    fn try_from(value: String) -> PipelineResult<Self> {
        RateMatrix::parse(&value)
    }
}

impl From<RateMatrix> for String {
    fn from(value: RateMatrix) -> Self {
        value.to_string()
    }
}

impl fmt::Display for RateMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateMatrix::Builtin => write!(f, "{}", RATE_MATRIX_SENTINEL),
            RateMatrix::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Settings for the external tree inference tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Executable name or path (names are resolved on PATH)
    pub program: String,
    /// Extra arguments placed before the generated ones
    pub args: Vec<String>,
    /// Additional attempts after a failed invocation
    pub retries: u32,
    /// Per-invocation timeout in seconds (None = wait indefinitely)
    pub timeout_secs: Option<u64>,
}

impl ToolConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Executable name without its directory
    pub fn tool_name(&self) -> String {
        Path::new(self.program.trim())
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.trim().to_string())
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            program: "FastTree".to_string(),
            args: Vec::new(),
            retries: 0,
            timeout_secs: None,
        }
    }
}

fn default_workers() -> usize {
    1
}

fn default_use_cached() -> bool {
    true
}

fn default_armstrong_cutoff() -> f64 {
    8.0
}

/// Parameters for one pipeline invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory of `<family>.a3m` alignments
    pub alignment_dir: PathBuf,

    /// Directory of `<family>.pdb` structures
    #[serde(default)]
    pub structure_dir: Option<PathBuf>,

    /// Output root; one subdirectory per stage is created below it
    pub outdir: PathBuf,

    /// Worker pool size (1 = strictly sequential)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Number of alignments that must be present in `alignment_dir`
    pub expected_families: usize,

    /// Process only the first N families (sorted by name)
    #[serde(default)]
    pub max_families: Option<usize>,

    /// Keep at most this many sequences per alignment
    pub max_seqs: usize,

    /// Keep at most this many aligned columns per alignment
    pub max_sites: usize,

    /// Contact distance cutoff in Armstrong
    #[serde(default = "default_armstrong_cutoff")]
    pub armstrong_cutoff: f64,

    /// Rate matrix reference (`none` or a path)
    #[serde(default)]
    pub rate_matrix: RateMatrix,

    /// Trust existing outputs instead of recomputing them
    #[serde(default = "default_use_cached")]
    pub use_cached: bool,

    /// External tree inference tool
    #[serde(default)]
    pub tree_builder: ToolConfig,
}

impl PipelineConfig {
    /// Create a configuration with default limits for the given directories
    pub fn new(
        alignment_dir: impl Into<PathBuf>,
        outdir: impl Into<PathBuf>,
        expected_families: usize,
    ) -> Self {
        Self {
            alignment_dir: alignment_dir.into(),
            structure_dir: None,
            outdir: outdir.into(),
            workers: default_workers(),
            expected_families,
            max_families: None,
            max_seqs: 1024,
            max_sites: 1024,
            armstrong_cutoff: default_armstrong_cutoff(),
            rate_matrix: RateMatrix::Builtin,
            use_cached: default_use_cached(),
            tree_builder: ToolConfig::default(),
        }
    }

    /// Load a configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        Self::from_yaml(&content, path)
    }

    /// Parse a configuration from YAML; `origin` is used in error messages
    /// and as the base for relative paths
    pub fn from_yaml(content: &str, origin: &Path) -> PipelineResult<Self> {
        let mut config: PipelineConfig =
            serde_yaml::from_str(content).map_err(|source| PipelineError::ConfigFile {
                path: origin.to_path_buf(),
                source,
            })?;

        if let Some(base) = origin.parent().filter(|p| !p.as_os_str().is_empty()) {
            config.resolve_relative_to(base);
        }

        Ok(config)
    }

    /// Rebase relative paths onto `base` (the directory holding the config file)
    fn resolve_relative_to(&mut self, base: &Path) {
        let rebase = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };

        rebase(&mut self.alignment_dir);
        rebase(&mut self.outdir);
        if let Some(dir) = self.structure_dir.as_mut() {
            rebase(dir);
        }
        if let RateMatrix::File(path) = &mut self.rate_matrix {
            rebase(path);
        }
    }

    /// Check parameter ranges; file references are checked by the validator
    pub fn validate(&self) -> PipelineResult<()> {
        if self.workers == 0 {
            return Err(PipelineError::configuration(
                "workers must be at least 1",
            ));
        }
        if self.max_seqs == 0 {
            return Err(PipelineError::configuration(
                "max_seqs must be at least 1",
            ));
        }
        if self.max_sites == 0 {
            return Err(PipelineError::configuration(
                "max_sites must be at least 1",
            ));
        }
        if self.max_families == Some(0) {
            return Err(PipelineError::configuration(
                "max_families must be at least 1 when set",
            ));
        }
        if !self.armstrong_cutoff.is_finite() || self.armstrong_cutoff <= 0.0 {
            return Err(PipelineError::configuration(format!(
                "armstrong_cutoff must be a positive number, got {}",
                self.armstrong_cutoff
            )));
        }
        if self.tree_builder.program.trim().is_empty() {
            return Err(PipelineError::configuration(
                "tree_builder.program must not be empty",
            ));
        }
        Ok(())
    }

    /// Number of families a run will process given `discovered` alignments
    pub fn selected_count(&self, discovered: usize) -> usize {
        match self.max_families {
            Some(limit) => discovered.min(limit),
            None => discovered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_matrix_sentinel() {
        assert_eq!(RateMatrix::parse("none").unwrap(), RateMatrix::Builtin);
        assert_eq!(RateMatrix::parse("None").unwrap(), RateMatrix::Builtin);
        assert_eq!(RateMatrix::parse("  NONE ").unwrap(), RateMatrix::Builtin);
        assert_eq!(
            RateMatrix::parse("matrices/Q1.txt").unwrap(),
            RateMatrix::File(PathBuf::from("matrices/Q1.txt"))
        );
    }

    #[test]
    fn test_blank_rate_matrix_is_rejected() {
        for blank in ["", "   "] {
            let err = RateMatrix::parse(blank).unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
        }

        let yaml = "alignment_dir: a3m\noutdir: out\nexpected_families: 1\nmax_seqs: 8\nmax_sites: 16\nrate_matrix: \"\"\n";
        let err = PipelineConfig::from_yaml(yaml, Path::new("config.yaml")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
        assert!(err.to_string().contains("rate_matrix"));
    }

    #[test]
    fn test_tool_identity() {
        let mut tool = ToolConfig {
            program: "/opt/fasttree/bin/FastTree".to_string(),
            ..ToolConfig::default()
        };
        assert_eq!(tool.tool_name(), "FastTree");
        assert_eq!(args_tag(&tool.args), None);

        tool.args = vec!["-wag".to_string(), "-gamma".to_string()];
        assert_eq!(args_tag(&tool.args), Some("args_wag_gamma".to_string()));
    }

    #[test]
    fn test_rate_matrix_tag() {
        assert_eq!(RateMatrix::Builtin.tag(), None);
        assert_eq!(
            RateMatrix::parse("input/Q1_uniform_FastTree.txt").unwrap().tag(),
            Some("Q1_uniform_FastTree".to_string())
        );
        assert_eq!(
            RateMatrix::parse("input/my matrix+v2.txt").unwrap().tag(),
            Some("my_matrix_v2".to_string())
        );
    }

    #[test]
    fn test_parse_yaml_config() {
        let yaml = r#"
alignment_dir: a3m
structure_dir: pdb
outdir: out
workers: 3
expected_families: 3
max_families: 3
max_seqs: 8
max_sites: 16
armstrong_cutoff: 8.0
rate_matrix: None
use_cached: false
tree_builder:
  program: /opt/bin/FastTree
  retries: 2
"#;

        let config = PipelineConfig::from_yaml(yaml, Path::new("runs/config.yaml")).unwrap();

        assert_eq!(config.alignment_dir, PathBuf::from("runs/a3m"));
        assert_eq!(config.structure_dir, Some(PathBuf::from("runs/pdb")));
        assert_eq!(config.outdir, PathBuf::from("runs/out"));
        assert_eq!(config.workers, 3);
        assert_eq!(config.max_families, Some(3));
        assert_eq!(config.rate_matrix, RateMatrix::Builtin);
        assert!(!config.use_cached);
        assert_eq!(config.tree_builder.program, "/opt/bin/FastTree");
        assert_eq!(config.tree_builder.retries, 2);
        assert!(config.tree_builder.args.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_defaults() {
        let yaml = r#"
alignment_dir: /data/a3m
outdir: /data/out
expected_families: 10
max_seqs: 128
max_sites: 512
"#;

        let config = PipelineConfig::from_yaml(yaml, Path::new("config.yaml")).unwrap();

        assert_eq!(config.workers, 1);
        assert!(config.use_cached);
        assert_eq!(config.armstrong_cutoff, 8.0);
        assert_eq!(config.rate_matrix, RateMatrix::Builtin);
        assert_eq!(config.tree_builder, ToolConfig::default());
        assert_eq!(config.alignment_dir, PathBuf::from("/data/a3m"));
    }

    #[test]
    fn test_invalid_yaml_is_config_file_error() {
        let err = PipelineConfig::from_yaml("max_seqs: [", Path::new("bad.yaml")).unwrap_err();
        assert!(matches!(err, PipelineError::ConfigFile { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base = PipelineConfig::new("a3m", "out", 1);
        assert!(base.validate().is_ok());

        let config = PipelineConfig { workers: 0, ..base.clone() };
        assert!(config.validate().is_err());

        let config = PipelineConfig { max_seqs: 0, ..base.clone() };
        assert!(config.validate().is_err());

        let config = PipelineConfig { armstrong_cutoff: f64::NAN, ..base.clone() };
        assert!(config.validate().is_err());

        let config = PipelineConfig { armstrong_cutoff: -1.0, ..base.clone() };
        assert!(config.validate().is_err());

        let config = PipelineConfig { max_families: Some(0), ..base };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_selected_count() {
        let mut config = PipelineConfig::new("a3m", "out", 5);
        assert_eq!(config.selected_count(5), 5);
        config.max_families = Some(3);
        assert_eq!(config.selected_count(5), 3);
        assert_eq!(config.selected_count(2), 2);
    }

    #[test]
    fn test_rate_matrix_serde_round_trip() {
        let yaml = serde_yaml::to_string(&RateMatrix::parse("q/Q1.txt").unwrap()).unwrap();
        assert_eq!(yaml.trim(), "q/Q1.txt");
        let yaml = serde_yaml::to_string(&RateMatrix::Builtin).unwrap();
        assert_eq!(yaml.trim(), "none");
    }
}
