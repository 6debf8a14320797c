// Transition Stage
// Counts amino acid transitions between sibling leaves of each family tree

use crate::alignment::Alignment;
use crate::cache::StageCache;
use crate::error::{PipelineError, PipelineResult};
use crate::family::Family;
use crate::newick::Tree;
use crate::stage::{
    run_blocking, upstream_tree, PairCounts, PairMatrix, StageKind, StageRunner, TransitionConfig,
};

use std::collections::HashMap;

/// Count residue pairs at every aligned column of every cherry.
///
/// Each leaf must name a sequence of the truncated alignment.
pub fn count_transitions(
    family: &str,
    tree: &Tree,
    alignment: &Alignment,
) -> PipelineResult<PairMatrix> {
    let rows: HashMap<&str, &[u8]> = alignment
        .names()
        .iter()
        .map(String::as_str)
        .zip(alignment.rows().iter().map(Vec::as_slice))
        .collect();
    let row = |leaf: &str| {
        rows.get(leaf).copied().ok_or_else(|| {
            PipelineError::tree(family, format!("leaf '{}' is not in the alignment", leaf))
        })
    };

    let mut counts = PairCounts::new();
    for (x, y) in tree.cherries() {
        let (x, y) = (row(x)?, row(y)?);
        for (&a, &b) in x.iter().zip(y) {
            counts.add(a, b);
        }
    }
    Ok(counts.into_matrix())
}

pub struct TransitionRunner {
    config: TransitionConfig,
    cache: StageCache,
    /// Cache of the phylogeny stage holding the input trees
    trees: StageCache,
}

impl TransitionRunner {
    pub fn new(config: TransitionConfig, cache: StageCache, trees: StageCache) -> Self {
        Self { config, cache, trees }
    }
}

#[async_trait::async_trait]
impl StageRunner for TransitionRunner {
    fn kind(&self) -> StageKind {
        StageKind::Transitions
    }

    fn cache(&self) -> &StageCache {
        &self.cache
    }

    async fn produce(&self, family: &Family) -> PipelineResult<Vec<u8>> {
        let tree_path = upstream_tree(self.kind(), &self.trees, family)?;
        let (max_seqs, max_sites) = (self.config.trees.max_seqs, self.config.trees.max_sites);
        let item = family.clone();

        let matrix = run_blocking(self.kind(), &family.name, move || {
            let tree = Tree::read(&item.name, &tree_path)?;
            let alignment = Alignment::read(&item.name, &item.alignment_path)?
                .truncate(max_seqs, max_sites);
            tracing::debug!(
                family = %item.name,
                cherries = tree.cherries().len(),
                "counting transitions"
            );
            count_transitions(&item.name, &tree, &alignment)
        })
        .await?;
        Ok(matrix.to_tsv().into_bytes())
    }
}
