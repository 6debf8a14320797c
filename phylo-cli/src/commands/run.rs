use crate::commands::{kind_label, ConfigArgs};
use crate::output;

use clap::Args;
use color_eyre::Result;

use phylo_pipeline::{
    progress_channel, LogLevel, OutputStatus, PipelineEvent, PipelineRun, StageKind,
};

/// Run pipeline stages for every selected family
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Recompute outputs even when they already exist
    #[arg(long)]
    pub no_cache: bool,
}

pub async fn execute(args: RunArgs, stages: &[StageKind]) -> Result<()> {
    output::status("Loading", &format!("{}", args.config.config.display()));
    let mut config = args.config.load()?;
    if args.no_cache {
        config.use_cached = false;
    }

    output::info(&format!(
        "{} workers, {} seqs x {} sites, rate matrix {}",
        config.workers, config.max_seqs, config.max_sites, config.rate_matrix
    ));

    let (tx, mut rx) = progress_channel();
    let mut run = PipelineRun::new(config)
        .with_stages(stages)
        .with_progress(tx);

    // Spawn the run in background
    let run_handle = tokio::spawn(async move { run.run().await });

    // Process events in the foreground
    while let Some(event) = rx.recv().await {
        match &event {
            PipelineEvent::PipelineStarted {
                stages,
                discovered,
                selected,
            } => {
                let names: Vec<&str> = stages.iter().map(StageKind::as_str).collect();
                println!();
                output::header(&format!(
                    "{} of {} families through {}",
                    selected,
                    discovered,
                    names.join(" -> ")
                ));
            }

            PipelineEvent::ValidationCompleted { families, duration } => {
                output::check(&format!(
                    "Validated {} families ({:.2}s)",
                    families,
                    duration.as_secs_f64()
                ));
            }

            PipelineEvent::StageStarted {
                stage,
                output_dir,
                families,
            } => {
                output::stage_header(
                    stage.as_str(),
                    *families,
                    &output_dir.display().to_string(),
                );
            }

            PipelineEvent::FamilyCompleted {
                family,
                status,
                duration,
                ..
            } => match status {
                OutputStatus::Computed => output::dim_success(&format!(
                    "    {} OK ({:.2}s)",
                    family,
                    duration.as_secs_f64()
                )),
                OutputStatus::Cached => output::dim(&format!("    {} cached", family)),
            },

            PipelineEvent::FamilyFailed {
                family, message, ..
            } => {
                output::dim_failure(&format!("    {} FAIL: {}", family, message));
            }

            PipelineEvent::StageCompleted {
                stage,
                computed,
                cached,
                duration,
            } => {
                output::dim_success(&format!(
                    "  Stage '{}' OK: {} computed, {} cached ({:.2}s)",
                    stage,
                    computed,
                    cached,
                    duration.as_secs_f64()
                ));
            }

            PipelineEvent::PipelineCompleted { success, duration } => {
                println!();
                if *success {
                    output::success(&format!(
                        "Pipeline completed successfully in {:.2}s",
                        duration.as_secs_f64()
                    ));
                } else {
                    output::failure(&format!(
                        "Pipeline failed after {:.2}s",
                        duration.as_secs_f64()
                    ));
                }
            }

            PipelineEvent::Log {
                level,
                message,
                family,
                ..
            } => {
                let message = match family {
                    Some(family) => format!("{}: {}", family, message),
                    None => message.clone(),
                };
                match level {
                    // Reported with its kind once the run returns
                    LogLevel::Error => {}
                    LogLevel::Warning => output::warning(&message),
                }
            }
        }
    }

    // Wait for the run to finish
    match run_handle.await? {
        Ok(report) => {
            for stage in &report.stages {
                output::dim(&format!("  {}: {}", stage.stage, stage.output_dir.display()));
            }
            Ok(())
        }
        Err(e) => {
            output::error(&format!("{}: {}", kind_label(&e), e));
            std::process::exit(1);
        }
    }
}
