// Phylo CLI
// Runs the family pipeline from a YAML configuration file

mod commands;
mod output;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use phylo_pipeline::StageKind;

/// Cached, parallel tree and co-evolution matrix generation
#[derive(Parser, Debug)]
#[command(name = "phylo", version, about)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every stage
    Run(commands::run::RunArgs),

    /// Run the phylogeny stage only
    Trees(commands::run::RunArgs),

    /// Check configuration and inputs without writing outputs
    Validate(commands::validate::ValidateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run(args) => commands::run::execute(args, &StageKind::ALL).await,
        Command::Trees(args) => commands::run::execute(args, &[StageKind::Phylogeny]).await,
        Command::Validate(args) => commands::validate::execute(args).await,
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let base_level = if verbose { "debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(base_level));

    fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}
