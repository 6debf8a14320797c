// Stage Cache
// Deterministic output directories with a parameter manifest and atomic writes

use crate::error::{PipelineError, PipelineResult};
use crate::stage::{StageConfig, StageKind};

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Sidecar file recording the parameters a stage directory was built with
pub const MANIFEST_FILE: &str = "stage_config.json";

/// Version of the manifest layout
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

/// Contents of [`MANIFEST_FILE`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageManifest {
    pub format_version: u32,
    pub stage: String,
    pub config: serde_json::Value,
}

/// Output cache of one stage.
///
/// A family's artifact exists at exactly one path, derived from the stage
/// configuration and the family name. Its presence is the cache entry.
#[derive(Debug, Clone)]
pub struct StageCache {
    kind: StageKind,
    dir: PathBuf,
    use_cached: bool,
    manifest: StageManifest,
}

impl StageCache {
    pub fn new(outdir: impl AsRef<Path>, config: &dyn StageConfig, use_cached: bool) -> Self {
        let kind = config.kind();
        Self {
            kind,
            dir: outdir.as_ref().join(config.dir_name()),
            use_cached,
            manifest: StageManifest {
                format_version: MANIFEST_FORMAT_VERSION,
                stage: kind.as_str().to_string(),
                config: config.manifest(),
            },
        }
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// Stage output directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest(&self) -> &StageManifest {
        &self.manifest
    }

    /// Deterministic artifact path of `family`
    pub fn output_path(&self, family: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", family, self.kind.extension()))
    }

    /// Whether an artifact exists for `family`
    pub fn contains(&self, family: &str) -> bool {
        self.output_path(family).is_file()
    }

    /// Whether computing `family` can be skipped
    pub fn should_skip(&self, family: &str) -> bool {
        self.use_cached && self.contains(family)
    }

    /// Create the directory and reconcile the manifest.
    ///
    /// A fresh directory gets the manifest written. An existing manifest must
    /// match this configuration exactly; otherwise the directory was produced
    /// by different parameters and reusing it would mix results.
    pub fn prepare(&self) -> PipelineResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| PipelineError::io(&self.dir, e))?;

        let manifest_path = self.dir.join(MANIFEST_FILE);
        if manifest_path.is_file() {
            let content =
                fs::read_to_string(&manifest_path).map_err(|e| PipelineError::io(&manifest_path, e))?;
            let existing: StageManifest = serde_json::from_str(&content).map_err(|e| {
                PipelineError::configuration(format!(
                    "unreadable stage manifest {}: {}",
                    manifest_path.display(),
                    e
                ))
            })?;

            if existing != self.manifest {
                return Err(PipelineError::configuration(format!(
                    "{} was built with different parameters (found {}, expected {})",
                    self.dir.display(),
                    existing.config,
                    self.manifest.config
                )));
            }

            tracing::debug!(stage = %self.kind, dir = %self.dir.display(), "stage manifest matches");
            return Ok(());
        }

        let content = serde_json::to_vec_pretty(&self.manifest).map_err(|e| {
            PipelineError::configuration(format!("cannot serialize stage manifest: {}", e))
        })?;
        self.write_file(&manifest_path, &content)?;
        tracing::debug!(stage = %self.kind, dir = %self.dir.display(), "wrote stage manifest");
        Ok(())
    }

    /// Write the artifact of `family` so that readers never observe a partial file
    pub fn write_atomic(&self, family: &str, content: &[u8]) -> PipelineResult<PathBuf> {
        let path = self.output_path(family);
        self.write_file(&path, content)?;
        Ok(path)
    }

    fn write_file(&self, path: &Path, content: &[u8]) -> PipelineResult<()> {
        let mut temp = tempfile::Builder::new()
            .prefix(".partial-")
            .tempfile_in(&self.dir)
            .map_err(|e| PipelineError::io(&self.dir, e))?;

        temp.write_all(content)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| PipelineError::io(temp.path(), e))?;

        temp.persist(path)
            .map_err(|e| PipelineError::io(path, e.error))?;
        Ok(())
    }
}
