// Runners Module
// External phylogenetic inference tools

pub mod fasttree;

// Re-export key types
pub use fasttree::FastTree;

use crate::error::ToolError;

use std::path::Path;

/// Trait for tree inference tools
#[async_trait::async_trait]
pub trait TreeBuilder: Send + Sync {
    /// Name used in logs and error messages
    fn name(&self) -> &str;

    /// Infer a tree from a FASTA alignment and return the Newick bytes
    async fn build_tree(
        &self,
        fasta: &Path,
        rate_matrix: Option<&Path>,
    ) -> Result<Vec<u8>, ToolError>;
}
