// Co-evolution Stage
// Builds a residue-pair matrix over structurally contacting alignment columns

use crate::alignment::Alignment;
use crate::cache::StageCache;
use crate::error::{PipelineError, PipelineResult};
use crate::execution::events::{EventSender, PipelineEvent, ProgressSender};
use crate::family::Family;
use crate::stage::{
    run_blocking, upstream_tree, CoevolutionConfig, PairCounts, PairMatrix, StageKind, StageRunner,
};
use crate::structure::{ContactMap, Structure};

use std::fs;
use std::sync::Arc;

/// Everything a kernel may use for one family
#[derive(Debug)]
pub struct CoevolutionInput<'a> {
    pub family: &'a str,
    /// Truncated alignment
    pub alignment: &'a Alignment,
    /// Contacting column pairs, `i < j`
    pub contacts: &'a ContactMap,
    /// Newick tree from the phylogeny stage
    pub tree: &'a [u8],
}

/// Computes a co-evolution matrix for one family. Must be deterministic.
pub trait CoevolutionKernel: Send + Sync {
    fn compute(&self, input: &CoevolutionInput<'_>) -> PairMatrix;
}

/// Counts amino acid pairs observed at contacting columns.
///
/// Every sequence contributes one observation per contact, in both
/// orientations, so the matrix is symmetric. Gaps and `X` are skipped. The
/// tree is not used.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContactPairCounts;

impl CoevolutionKernel for ContactPairCounts {
    fn compute(&self, input: &CoevolutionInput<'_>) -> PairMatrix {
        let mut counts = PairCounts::new();
        for row in input.alignment.rows() {
            for &(i, j) in input.contacts.pairs() {
                if let (Some(&a), Some(&b)) = (row.get(i), row.get(j)) {
                    counts.add(a, b);
                }
            }
        }
        counts.into_matrix()
    }
}

pub struct CoevolutionRunner {
    config: CoevolutionConfig,
    cache: StageCache,
    /// Cache of the phylogeny stage holding the input trees
    trees: StageCache,
    kernel: Arc<dyn CoevolutionKernel>,
    event_tx: Option<ProgressSender>,
}

impl CoevolutionRunner {
    pub fn new(
        config: CoevolutionConfig,
        cache: StageCache,
        trees: StageCache,
        kernel: Arc<dyn CoevolutionKernel>,
    ) -> Self {
        Self {
            config,
            cache,
            trees,
            kernel,
            event_tx: None,
        }
    }

    /// Report warnings on the progress channel
    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.event_tx = Some(sender);
        self
    }
}

#[async_trait::async_trait]
impl StageRunner for CoevolutionRunner {
    fn kind(&self) -> StageKind {
        StageKind::Coevolution
    }

    fn cache(&self) -> &StageCache {
        &self.cache
    }

    async fn produce(&self, family: &Family) -> PipelineResult<Vec<u8>> {
        let tree_path = upstream_tree(self.kind(), &self.trees, family)?;

        if family.structure_path.is_none() {
            let message = "no structure file; writing an all-zero matrix";
            tracing::warn!(family = %family.name, "{}", message);
            self.event_tx.send_event(PipelineEvent::warning(
                message,
                Some(StageKind::Coevolution),
                Some(family.name.clone()),
            ));
        }

        let (max_seqs, max_sites) = (self.config.trees.max_seqs, self.config.trees.max_sites);
        let cutoff = self.config.armstrong_cutoff;
        let kernel = self.kernel.clone();
        let item = family.clone();

        let matrix = run_blocking(self.kind(), &family.name, move || {
            let tree = fs::read(&tree_path).map_err(|e| PipelineError::io(&tree_path, e))?;
            let alignment = Alignment::read(&item.name, &item.alignment_path)?
                .truncate(max_seqs, max_sites);
            let contacts = match &item.structure_path {
                Some(path) => Structure::read(&item.name, path)?
                    .contacts(cutoff, alignment.num_sites()),
                None => ContactMap::empty(),
            };

            tracing::debug!(
                family = %item.name,
                contacts = contacts.len(),
                "computing co-evolution matrix"
            );
            Ok(kernel.compute(&CoevolutionInput {
                family: &item.name,
                alignment: &alignment,
                contacts: &contacts,
                tree: &tree,
            }))
        })
        .await?;
        Ok(matrix.to_tsv().into_bytes())
    }
}
