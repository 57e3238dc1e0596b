use clap::{Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "jangada")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative deployment CLI for serverless apps", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deploy the application to a stage
    Deploy(DeployArgs),

    /// Show the reconciliation plan without applying it
    Plan(StageArgs),

    /// Tear down everything deployed for a stage
    Delete(DeleteArgs),

    /// Show what is currently deployed for a stage
    Status(StageArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(clap::Args)]
pub struct DeployArgs {
    /// Deployment stage
    #[arg(long)]
    pub stage: Option<String>,

    /// Skip confirmation prompts
    #[arg(long)]
    pub yes: bool,

    /// Show the plan and stop before executing
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(clap::Args)]
pub struct StageArgs {
    /// Deployment stage
    #[arg(long)]
    pub stage: Option<String>,
}

#[derive(clap::Args)]
pub struct DeleteArgs {
    /// Deployment stage
    #[arg(long)]
    pub stage: Option<String>,

    /// Skip confirmation prompts
    #[arg(long)]
    pub yes: bool,
}
