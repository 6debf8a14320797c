// Phylogeny Stage
// Truncates each alignment and infers a tree with the configured tool

use crate::alignment::Alignment;
use crate::cache::StageCache;
use crate::error::{PipelineError, PipelineResult};
use crate::family::Family;
use crate::runners::TreeBuilder;
use crate::stage::{run_blocking, PhylogenyConfig, StageKind, StageRunner};

use std::sync::Arc;
use tempfile::TempPath;

pub struct PhylogenyRunner {
    config: PhylogenyConfig,
    cache: StageCache,
    tree_builder: Arc<dyn TreeBuilder>,
}

impl PhylogenyRunner {
    pub fn new(config: PhylogenyConfig, cache: StageCache, tree_builder: Arc<dyn TreeBuilder>) -> Self {
        Self {
            config,
            cache,
            tree_builder,
        }
    }
}

/// Write the truncated alignment to a private FASTA file removed on drop
fn write_truncated_fasta(family: &Family, max_seqs: usize, max_sites: usize) -> PipelineResult<TempPath> {
    let alignment = Alignment::read(&family.name, &family.alignment_path)?
        .truncate(max_seqs, max_sites);

    let mut file = tempfile::Builder::new()
        .prefix(&format!("{}-", family.name))
        .suffix(".fasta")
        .tempfile()
        .map_err(|e| PipelineError::io(std::env::temp_dir(), e))?;
    alignment
        .write_fasta(&mut file)
        .map_err(|e| PipelineError::io(file.path(), e))?;

    Ok(file.into_temp_path())
}

#[async_trait::async_trait]
impl StageRunner for PhylogenyRunner {
    fn kind(&self) -> StageKind {
        StageKind::Phylogeny
    }

    fn cache(&self) -> &StageCache {
        &self.cache
    }

    async fn produce(&self, family: &Family) -> PipelineResult<Vec<u8>> {
        let (max_seqs, max_sites) = (self.config.trees.max_seqs, self.config.trees.max_sites);
        let item = family.clone();
        let fasta = run_blocking(self.kind(), &family.name, move || {
            write_truncated_fasta(&item, max_seqs, max_sites)
        })
        .await?;

        tracing::debug!(
            family = %family.name,
            tool = self.tree_builder.name(),
            "inferring tree"
        );
        self.tree_builder
            .build_tree(&fasta, self.config.trees.rate_matrix.path())
            .await
            .map_err(|source| PipelineError::Execution {
                stage: self.kind().to_string(),
                family: family.name.clone(),
                source,
            })
    }
}
