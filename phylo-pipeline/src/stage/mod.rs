// Stages Module
// Stage identities, cache-keying configurations, and the runner trait

pub mod coevolution;
pub mod matrix;
pub mod phylogeny;
pub mod transitions;

// Re-export key types
pub use coevolution::{CoevolutionInput, CoevolutionKernel, CoevolutionRunner, ContactPairCounts};
pub use matrix::{PairCounts, PairMatrix, AMINO_ACIDS};
pub use phylogeny::PhylogenyRunner;
pub use transitions::TransitionRunner;

use crate::cache::StageCache;
use crate::config::{args_tag, PipelineConfig, RateMatrix};
use crate::error::{PipelineError, PipelineResult};
use crate::family::Family;

use serde_json::json;
use std::fmt;
use std::path::PathBuf;

/// Pipeline stages in dependency order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StageKind {
    /// Tree inference per family
    Phylogeny,
    /// Transition counts between sibling leaves (consumes the trees)
    Transitions,
    /// Co-evolution matrix per family (consumes the trees)
    Coevolution,
}

impl StageKind {
    /// Every stage, in execution order
    pub const ALL: [StageKind; 3] = [
        StageKind::Phylogeny,
        StageKind::Transitions,
        StageKind::Coevolution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Phylogeny => "phylogeny",
            StageKind::Transitions => "transitions",
            StageKind::Coevolution => "coevolution",
        }
    }

    /// Extension of the per-family artifact
    pub fn extension(&self) -> &'static str {
        match self {
            StageKind::Phylogeny => "newick",
            StageKind::Transitions | StageKind::Coevolution => "txt",
        }
    }

    /// Stage whose output this stage reads
    pub fn upstream(&self) -> Option<StageKind> {
        match self {
            StageKind::Phylogeny => None,
            StageKind::Transitions | StageKind::Coevolution => Some(StageKind::Phylogeny),
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters that determine a stage's output content.
///
/// The directory name and manifest both derive from these values, so two
/// configurations that could produce different bytes never share a directory.
pub trait StageConfig: Send + Sync {
    fn kind(&self) -> StageKind;

    /// Deterministic output directory name
    fn dir_name(&self) -> String;

    /// Values recorded in the stage manifest
    fn manifest(&self) -> serde_json::Value;
}

/// Render a cutoff with a mandatory decimal point (`8` becomes `8.0`)
fn format_cutoff(cutoff: f64) -> String {
    format!("{:?}", cutoff)
}

/// Parameters that shape the inferred trees, shared by every stage reading them
#[derive(Debug, Clone, PartialEq)]
pub struct TreeParams {
    pub max_seqs: usize,
    pub max_sites: usize,
    pub rate_matrix: RateMatrix,
    /// Tool executable name
    pub tool: String,
    /// Extra tool arguments
    pub tool_args: Vec<String>,
}

impl TreeParams {
    /// `{prefix}_{max_seqs}_seqs_{max_sites}_sites{extra}` plus the rate
    /// matrix and argument tags when present
    fn dir_name(&self, prefix: &str, extra: &str) -> String {
        let mut name = format!(
            "{}_{}_seqs_{}_sites{}",
            prefix, self.max_seqs, self.max_sites, extra
        );
        if let Some(tag) = self.rate_matrix.tag() {
            name.push('_');
            name.push_str(&tag);
        }
        if let Some(tag) = args_tag(&self.tool_args) {
            name.push('_');
            name.push_str(&tag);
        }
        name
    }

    fn manifest(&self) -> serde_json::Value {
        json!({
            "max_seqs": self.max_seqs,
            "max_sites": self.max_sites,
            "rate_matrix": self.rate_matrix.identity(),
            "tree_builder": {
                "tool": self.tool,
                "args": self.tool_args,
            },
        })
    }
}

impl From<&PipelineConfig> for TreeParams {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_seqs: config.max_seqs,
            max_sites: config.max_sites,
            rate_matrix: config.rate_matrix.clone(),
            tool: config.tree_builder.tool_name(),
            tool_args: config.tree_builder.args.clone(),
        }
    }
}

/// Phylogeny stage parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PhylogenyConfig {
    pub trees: TreeParams,
}

impl From<&PipelineConfig> for PhylogenyConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            trees: TreeParams::from(config),
        }
    }
}

impl StageConfig for PhylogenyConfig {
    fn kind(&self) -> StageKind {
        StageKind::Phylogeny
    }

    fn dir_name(&self) -> String {
        self.trees.dir_name("trees", "")
    }

    fn manifest(&self) -> serde_json::Value {
        self.trees.manifest()
    }
}

/// Transition stage parameters
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionConfig {
    /// Parameters of the upstream trees
    pub trees: TreeParams,
}

impl From<&PipelineConfig> for TransitionConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            trees: TreeParams::from(config),
        }
    }
}

impl StageConfig for TransitionConfig {
    fn kind(&self) -> StageKind {
        StageKind::Transitions
    }

    fn dir_name(&self) -> String {
        self.trees.dir_name("matrices", "")
    }

    fn manifest(&self) -> serde_json::Value {
        self.trees.manifest()
    }
}

/// Co-evolution stage parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CoevolutionConfig {
    /// Parameters of the upstream trees
    pub trees: TreeParams,
    pub armstrong_cutoff: f64,
}

impl From<&PipelineConfig> for CoevolutionConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            trees: TreeParams::from(config),
            armstrong_cutoff: config.armstrong_cutoff,
        }
    }
}

impl StageConfig for CoevolutionConfig {
    fn kind(&self) -> StageKind {
        StageKind::Coevolution
    }

    fn dir_name(&self) -> String {
        self.trees.dir_name(
            "co_matrices",
            &format!("_{}", format_cutoff(self.armstrong_cutoff)),
        )
    }

    fn manifest(&self) -> serde_json::Value {
        let mut manifest = self.trees.manifest();
        manifest["armstrong_cutoff"] = json!(self.armstrong_cutoff);
        manifest
    }
}

/// Whether a family's artifact was produced in this run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStatus {
    Computed,
    Cached,
}

/// Result of running one stage for one family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub family: String,
    pub path: PathBuf,
    pub status: OutputStatus,
}

/// Produces one stage artifact per family
#[async_trait::async_trait]
pub trait StageRunner: Send + Sync {
    fn kind(&self) -> StageKind;

    /// Cache layer owning this stage's output directory
    fn cache(&self) -> &StageCache;

    /// Compute the artifact bytes for `family`
    async fn produce(&self, family: &Family) -> PipelineResult<Vec<u8>>;

    /// Consult the cache, produce if needed, and persist the artifact
    async fn run(&self, family: &Family) -> PipelineResult<StageOutcome> {
        let cache = self.cache();
        let path = cache.output_path(&family.name);

        if cache.should_skip(&family.name) {
            tracing::debug!(stage = %self.kind(), family = %family.name, "using cached output");
            return Ok(StageOutcome {
                family: family.name.clone(),
                path,
                status: OutputStatus::Cached,
            });
        }

        let content = self.produce(family).await?;
        let path = cache.write_atomic(&family.name, &content)?;
        tracing::debug!(stage = %self.kind(), family = %family.name, path = %path.display(), "wrote output");

        Ok(StageOutcome {
            family: family.name.clone(),
            path,
            status: OutputStatus::Computed,
        })
    }
}

/// Path of the tree `stage` reads for `family`; it must already exist
pub(crate) fn upstream_tree(
    stage: StageKind,
    trees: &StageCache,
    family: &Family,
) -> PipelineResult<PathBuf> {
    let path = trees.output_path(&family.name);
    if !path.is_file() {
        return Err(PipelineError::MissingInput {
            stage: stage.to_string(),
            family: family.name.clone(),
            path,
        });
    }
    Ok(path)
}

/// Run CPU-bound or blocking work off the async workers
pub(crate) async fn run_blocking<T, F>(stage: StageKind, family: &str, work: F) -> PipelineResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> PipelineResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| PipelineError::WorkerPanicked {
            label: format!("{}/{}", stage, family),
            message: e.to_string(),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline_config() -> PipelineConfig {
        PipelineConfig {
            max_seqs: 8,
            max_sites: 16,
            armstrong_cutoff: 8.0,
            ..PipelineConfig::new("a3m", "out", 3)
        }
    }

    #[test]
    fn test_directory_names() {
        let config = pipeline_config();
        assert_eq!(PhylogenyConfig::from(&config).dir_name(), "trees_8_seqs_16_sites");
        assert_eq!(TransitionConfig::from(&config).dir_name(), "matrices_8_seqs_16_sites");
        assert_eq!(
            CoevolutionConfig::from(&config).dir_name(),
            "co_matrices_8_seqs_16_sites_8.0"
        );
    }

    #[test]
    fn test_cutoff_only_difference_changes_directory() {
        let a = CoevolutionConfig::from(&pipeline_config());
        let b = CoevolutionConfig {
            armstrong_cutoff: 4.5,
            ..a.clone()
        };
        assert_eq!(b.dir_name(), "co_matrices_8_seqs_16_sites_4.5");
        assert_ne!(a.dir_name(), b.dir_name());
        assert_ne!(a.manifest(), b.manifest());
    }

    #[test]
    fn test_rate_matrix_is_part_of_the_key() {
        let mut config = pipeline_config();
        let builtin = PhylogenyConfig::from(&config);
        config.rate_matrix = RateMatrix::parse("matrices/Q1_uniform_FastTree.txt").unwrap();
        let custom = PhylogenyConfig::from(&config);

        assert_eq!(
            custom.dir_name(),
            "trees_8_seqs_16_sites_Q1_uniform_FastTree"
        );
        assert_ne!(builtin.manifest(), custom.manifest());
    }

    #[test]
    fn test_tool_arguments_are_part_of_every_key() {
        let plain = pipeline_config();
        let mut gamma = pipeline_config();
        gamma.tree_builder.args = vec!["-gamma".to_string()];

        assert_eq!(
            PhylogenyConfig::from(&gamma).dir_name(),
            "trees_8_seqs_16_sites_args_gamma"
        );
        assert_eq!(
            TransitionConfig::from(&gamma).dir_name(),
            "matrices_8_seqs_16_sites_args_gamma"
        );
        assert_eq!(
            CoevolutionConfig::from(&gamma).dir_name(),
            "co_matrices_8_seqs_16_sites_8.0_args_gamma"
        );

        let (a, b) = (PhylogenyConfig::from(&plain), PhylogenyConfig::from(&gamma));
        assert_ne!(a.manifest(), b.manifest());
        assert_eq!(b.manifest()["tree_builder"]["args"], json!(["-gamma"]));
    }

    #[test]
    fn test_tool_identity_ignores_install_location() {
        let mut a = pipeline_config();
        a.tree_builder.program = "FastTree".to_string();
        let mut b = pipeline_config();
        b.tree_builder.program = "/usr/local/bin/FastTree".to_string();
        let mut c = pipeline_config();
        c.tree_builder.program = "/usr/local/bin/FastTreeMP".to_string();

        let key = |config: &PipelineConfig| PhylogenyConfig::from(config).manifest();
        assert_eq!(key(&a), key(&b));
        assert_ne!(key(&a), key(&c));
    }

    #[test]
    fn test_stage_order() {
        assert!(StageKind::Phylogeny < StageKind::Transitions);
        assert!(StageKind::Transitions < StageKind::Coevolution);
        assert_eq!(StageKind::ALL.to_vec(), {
            let mut all = StageKind::ALL.to_vec();
            all.sort();
            all
        });
        assert_eq!(StageKind::Coevolution.upstream(), Some(StageKind::Phylogeny));
        assert_eq!(StageKind::Transitions.upstream(), Some(StageKind::Phylogeny));
        assert_eq!(StageKind::Phylogeny.upstream(), None);
        assert_eq!(StageKind::Coevolution.to_string(), "coevolution");
    }
}
