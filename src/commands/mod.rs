//! Command implementations dispatched from main.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

use crate::cli::{DeleteArgs, DeployArgs, StageArgs};
use crate::config::{CONFIG_FILE, ProjectConfig, UserConfig, deployed_state_path};
use crate::engine::{DeployOptions, deployer};
use crate::report;
use reconcile::DeployedState;

fn project_dir() -> Result<PathBuf> {
    env::current_dir().context("Could not determine the current directory")
}

fn load_config(project_dir: &PathBuf) -> Result<ProjectConfig> {
    ProjectConfig::load(&project_dir.join(CONFIG_FILE))
}

/// The stage to act on: flag, then user default, then "dev".
fn resolve_stage(requested: Option<&str>) -> String {
    requested
        .map(str::to_string)
        .or_else(|| UserConfig::load().default_stage)
        .unwrap_or_else(|| "dev".to_string())
}

pub fn deploy(args: &DeployArgs) -> Result<()> {
    let dir = project_dir()?;
    let config = load_config(&dir)?;
    let client = awskit::default_backend()?;
    let opts = DeployOptions {
        stage: resolve_stage(args.stage.as_deref()),
        yes: args.yes,
        dry_run: args.dry_run,
    };
    deployer::deploy(&config, &dir, &client, &opts)
}

pub fn plan(args: &StageArgs) -> Result<()> {
    let dir = project_dir()?;
    let config = load_config(&dir)?;
    let stage = resolve_stage(args.stage.as_deref());
    deployer::plan_only(&config, &dir, &stage)
}

pub fn delete(args: &DeleteArgs) -> Result<()> {
    let dir = project_dir()?;
    let config = load_config(&dir)?;
    let client = awskit::default_backend()?;
    let opts = DeployOptions {
        stage: resolve_stage(args.stage.as_deref()),
        yes: args.yes,
        dry_run: false,
    };
    deployer::destroy(&config, &dir, &client, &opts)
}

pub fn status(args: &StageArgs) -> Result<()> {
    let dir = project_dir()?;
    let stage = resolve_stage(args.stage.as_deref());
    let state = DeployedState::load(&deployed_state_path(&dir, &stage))?;
    if state.is_empty() {
        println!("Nothing deployed for stage {stage}");
        return Ok(());
    }
    report::show(&state);
    Ok(())
}
