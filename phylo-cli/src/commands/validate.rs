use crate::commands::{kind_label, ConfigArgs};
use crate::output;

use clap::Args;
use color_eyre::Result;

use phylo_pipeline::PipelineRun;

/// Check a configuration and its inputs
#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

pub async fn execute(args: ValidateArgs) -> Result<()> {
    output::status("Validating", &format!("{}", args.config.config.display()));
    let config = args.config.load()?;
    output::check("Configuration parsed");

    let mut run = PipelineRun::new(config);
    let summaries = match run.validate().await {
        Ok(summaries) => summaries,
        Err(e) => {
            output::error(&format!("{}: {}", kind_label(&e), e));
            std::process::exit(1);
        }
    };

    for summary in &summaries {
        let structure = match summary.structure_residues {
            Some(residues) => format!("{} residues", residues),
            None => "no structure".to_string(),
        };
        output::dim(&format!(
            "    {}: {} sequences, {} sites, {}",
            summary.name, summary.num_seqs, summary.num_sites, structure
        ));
    }

    let config = run.config();
    output::check(&format!(
        "{} families valid ({} selected)",
        summaries.len(),
        config.selected_count(summaries.len())
    ));

    println!();
    output::success("Inputs are valid");

    Ok(())
}
