// CLI subcommands

pub mod run;
pub mod validate;

use clap::Args;
use color_eyre::Result;
use phylo_pipeline::{ErrorKind, PipelineConfig, PipelineError};

use std::path::PathBuf;

/// Options shared by every subcommand that loads a configuration
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Path to the pipeline configuration YAML file
    pub config: PathBuf,

    /// Override the worker pool size
    #[arg(long, short = 'w', value_name = "N")]
    pub workers: Option<usize>,

    /// Override the output root
    #[arg(long, value_name = "DIR")]
    pub outdir: Option<PathBuf>,
}

impl ConfigArgs {
    /// Load the configuration file and apply command line overrides
    pub fn load(&self) -> Result<PipelineConfig> {
        if !self.config.exists() {
            color_eyre::eyre::bail!("Configuration file not found: {}", self.config.display());
        }

        let mut config = PipelineConfig::from_file(&self.config)?;
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(outdir) = &self.outdir {
            config.outdir = outdir.clone();
        }
        tracing::debug!(?config, "loaded configuration");
        Ok(config)
    }
}

/// Short label for the category of a pipeline failure
pub fn kind_label(error: &PipelineError) -> &'static str {
    match error.kind() {
        ErrorKind::Input => "input error",
        ErrorKind::Configuration => "configuration error",
        ErrorKind::CountMismatch => "count mismatch",
        ErrorKind::Execution => "execution error",
        ErrorKind::Io => "i/o error",
    }
}
