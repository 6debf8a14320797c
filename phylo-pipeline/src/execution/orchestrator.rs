// Pipeline Orchestrator
// Drives discovery, validation, and the stages in dependency order

use crate::cache::StageCache;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::execution::dispatcher::Dispatcher;
use crate::execution::events::{EventSender, PipelineEvent, ProgressSender};
use crate::family::{discover_families, Family};
use crate::runners::{FastTree, TreeBuilder};
use crate::stage::{
    CoevolutionConfig, CoevolutionKernel, CoevolutionRunner, ContactPairCounts, OutputStatus,
    PhylogenyConfig, PhylogenyRunner, StageConfig, StageKind, StageOutcome, StageRunner,
    TransitionConfig, TransitionRunner,
};
use crate::validate::{validate_family, validate_rate_matrix, FamilySummary};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    Validate,
    RunStage(StageKind),
    Done,
    Failed,
}

/// Outcome of one stage over the selected families
#[derive(Debug, Clone)]
pub struct StageReport {
    pub stage: StageKind,
    pub output_dir: PathBuf,
    pub computed: usize,
    pub cached: usize,
    /// One entry per family, in family order
    pub outcomes: Vec<StageOutcome>,
    pub duration: Duration,
}

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Selected families, in processing order
    pub families: Vec<String>,
    pub stages: Vec<StageReport>,
    pub duration: Duration,
}

impl RunReport {
    pub fn stage(&self, kind: StageKind) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == kind)
    }
}

/// Families known after INIT
struct Discovery {
    discovered: Vec<Family>,
    selected: Vec<Family>,
}

/// A single pipeline invocation
pub struct PipelineRun {
    config: PipelineConfig,
    stages: Vec<StageKind>,
    tree_builder: Arc<dyn TreeBuilder>,
    kernel: Arc<dyn CoevolutionKernel>,
    event_tx: Option<ProgressSender>,
    state: PipelineState,
}

impl PipelineRun {
    /// Run every stage with FastTree and the contact-pair kernel
    pub fn new(config: PipelineConfig) -> Self {
        let tree_builder = Arc::new(FastTree::new(config.tree_builder.clone()));
        Self {
            config,
            stages: StageKind::ALL.to_vec(),
            tree_builder,
            kernel: Arc::new(ContactPairCounts),
            event_tx: None,
            state: PipelineState::Init,
        }
    }

    /// Set a progress sender for run updates
    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.event_tx = Some(sender);
        self
    }

    pub fn with_tree_builder(mut self, tree_builder: Arc<dyn TreeBuilder>) -> Self {
        self.tree_builder = tree_builder;
        self
    }

    pub fn with_kernel(mut self, kernel: Arc<dyn CoevolutionKernel>) -> Self {
        self.kernel = kernel;
        self
    }

    /// Restrict the run to `stages`; they always execute in dependency order
    pub fn with_stages(mut self, stages: &[StageKind]) -> Self {
        let mut stages = stages.to_vec();
        stages.sort();
        stages.dedup();
        self.stages = stages;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Output directory of `kind` under the configured output root
    pub fn stage_dir(&self, kind: StageKind) -> PathBuf {
        self.config.outdir.join(self.stage_config(kind).dir_name())
    }

    fn stage_config(&self, kind: StageKind) -> Box<dyn StageConfig> {
        match kind {
            StageKind::Phylogeny => Box::new(PhylogenyConfig::from(&self.config)),
            StageKind::Transitions => Box::new(TransitionConfig::from(&self.config)),
            StageKind::Coevolution => Box::new(CoevolutionConfig::from(&self.config)),
        }
    }

    fn stage_cache(&self, kind: StageKind) -> StageCache {
        StageCache::new(
            &self.config.outdir,
            self.stage_config(kind).as_ref(),
            self.config.use_cached,
        )
    }

    /// Check configuration and inputs without running any stage
    pub async fn validate(&mut self) -> PipelineResult<Vec<FamilySummary>> {
        let result = self.check_inputs().await;
        self.finish(&result);
        result
    }

    async fn check_inputs(&mut self) -> PipelineResult<Vec<FamilySummary>> {
        let discovery = self.init()?;
        self.validate_families(&discovery.discovered).await
    }

    /// Execute the full run
    pub async fn run(&mut self) -> PipelineResult<RunReport> {
        let start = Instant::now();
        let result = self.execute(start).await;

        self.finish(&result);
        self.event_tx.send_event(PipelineEvent::PipelineCompleted {
            success: result.is_ok(),
            duration: start.elapsed(),
        });
        result
    }

    fn finish<T>(&mut self, result: &PipelineResult<T>) {
        match result {
            Ok(_) => self.state = PipelineState::Done,
            Err(e) => {
                tracing::error!(state = ?self.state, error = %e, "pipeline failed");
                self.event_tx
                    .send_event(PipelineEvent::error(e.to_string(), self.current_stage(), None));
                self.state = PipelineState::Failed;
            }
        }
    }

    fn current_stage(&self) -> Option<StageKind> {
        match self.state {
            PipelineState::RunStage(kind) => Some(kind),
            _ => None,
        }
    }

    async fn execute(&mut self, start: Instant) -> PipelineResult<RunReport> {
        let discovery = self.init()?;
        self.validate_families(&discovery.discovered).await?;

        let mut caches = Vec::with_capacity(self.stages.len());
        for &kind in &self.stages {
            let cache = self.stage_cache(kind);
            cache.prepare()?;
            caches.push(cache);
        }

        let expected = discovery.selected.len();
        let mut reports = Vec::with_capacity(self.stages.len());
        for cache in caches {
            let runner = self.stage_runner(cache);
            reports.push(self.run_stage(runner, &discovery.selected, expected).await?);
        }

        Ok(RunReport {
            families: discovery.selected.iter().map(|f| f.name.clone()).collect(),
            stages: reports,
            duration: start.elapsed(),
        })
    }

    /// INIT: configuration, rate matrix, discovery, and the expected count
    fn init(&mut self) -> PipelineResult<Discovery> {
        self.state = PipelineState::Init;
        self.config.validate()?;

        if self.stages.is_empty() {
            return Err(PipelineError::configuration("no stages selected"));
        }
        for kind in &self.stages {
            if let Some(upstream) = kind.upstream() {
                if !self.stages.contains(&upstream) {
                    return Err(PipelineError::configuration(format!(
                        "stage '{}' requires stage '{}'",
                        kind, upstream
                    )));
                }
            }
        }

        validate_rate_matrix(&self.config.rate_matrix)?;

        let discovered = discover_families(
            &self.config.alignment_dir,
            self.config.structure_dir.as_deref(),
        )?;
        if discovered.len() != self.config.expected_families {
            return Err(PipelineError::count_mismatch(
                self.config.expected_families,
                discovered.len(),
                format!("found in {}", self.config.alignment_dir.display()),
            ));
        }

        let selected: Vec<Family> = discovered
            .iter()
            .take(self.config.selected_count(discovered.len()))
            .cloned()
            .collect();

        tracing::info!(
            discovered = discovered.len(),
            selected = selected.len(),
            "discovered families"
        );
        self.event_tx.send_event(PipelineEvent::PipelineStarted {
            stages: self.stages.clone(),
            discovered: discovered.len(),
            selected: selected.len(),
        });

        Ok(Discovery {
            discovered,
            selected,
        })
    }

    /// VALIDATE: parse every discovered family before any output is written
    async fn validate_families(&mut self, families: &[Family]) -> PipelineResult<Vec<FamilySummary>> {
        self.state = PipelineState::Validate;
        let start = Instant::now();

        let summaries = Dispatcher::new(self.config.workers)
            .dispatch(
                "validate",
                families.to_vec(),
                self.config.expected_families,
                |family| async move {
                    let label = format!("validate/{}", family.name);
                    match tokio::task::spawn_blocking(move || validate_family(&family)).await {
                        Ok(result) => result,
                        Err(e) => Err(PipelineError::WorkerPanicked {
                            label,
                            message: e.to_string(),
                        }),
                    }
                },
            )
            .await?;

        tracing::info!(families = summaries.len(), "validated families");
        self.event_tx.send_event(PipelineEvent::ValidationCompleted {
            families: summaries.len(),
            duration: start.elapsed(),
        });
        Ok(summaries)
    }

    fn stage_runner(&self, cache: StageCache) -> Arc<dyn StageRunner> {
        match cache.kind() {
            StageKind::Phylogeny => Arc::new(PhylogenyRunner::new(
                PhylogenyConfig::from(&self.config),
                cache,
                self.tree_builder.clone(),
            )),
            StageKind::Transitions => Arc::new(TransitionRunner::new(
                TransitionConfig::from(&self.config),
                cache,
                self.stage_cache(StageKind::Phylogeny),
            )),
            StageKind::Coevolution => {
                let runner = CoevolutionRunner::new(
                    CoevolutionConfig::from(&self.config),
                    cache,
                    self.stage_cache(StageKind::Phylogeny),
                    self.kernel.clone(),
                );
                match &self.event_tx {
                    Some(tx) => Arc::new(runner.with_progress(tx.clone())),
                    None => Arc::new(runner),
                }
            }
        }
    }

    /// RUN_STAGE: dispatch one stage over the selected families
    async fn run_stage(
        &mut self,
        runner: Arc<dyn StageRunner>,
        families: &[Family],
        expected: usize,
    ) -> PipelineResult<StageReport> {
        let kind = runner.kind();
        let output_dir = runner.cache().dir().to_path_buf();
        self.state = PipelineState::RunStage(kind);
        let start = Instant::now();

        tracing::info!(stage = %kind, dir = %output_dir.display(), families = families.len(), "starting stage");
        self.event_tx.send_event(PipelineEvent::StageStarted {
            stage: kind,
            output_dir: output_dir.clone(),
            families: families.len(),
        });

        let tx = self.event_tx.clone();
        let outcomes = Dispatcher::new(self.config.workers)
            .dispatch(kind.as_str(), families.to_vec(), expected, |family| {
                let runner = runner.clone();
                let tx = tx.clone();
                async move {
                    let started = Instant::now();
                    match runner.run(&family).await {
                        Ok(outcome) => {
                            tx.send_event(PipelineEvent::family_completed(
                                kind,
                                &family.name,
                                outcome.status,
                                started.elapsed(),
                            ));
                            Ok(outcome)
                        }
                        Err(e) => {
                            tx.send_event(PipelineEvent::family_failed(
                                kind,
                                &family.name,
                                e.to_string(),
                            ));
                            Err(e)
                        }
                    }
                }
            })
            .await?;

        let cached = outcomes
            .iter()
            .filter(|o| o.status == OutputStatus::Cached)
            .count();
        let computed = outcomes.len() - cached;
        let duration = start.elapsed();

        tracing::info!(stage = %kind, computed, cached, "stage completed");
        self.event_tx.send_event(PipelineEvent::StageCompleted {
            stage: kind,
            computed,
            cached,
            duration,
        });

        Ok(StageReport {
            stage: kind,
            output_dir,
            computed,
            cached,
            outcomes,
            duration,
        })
    }
}
