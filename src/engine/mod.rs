//! Deployment engine for jangada
//!
//! The engine orchestrates:
//! 1. Building - Resource graph from config plus the packaged artifact
//! 2. Planning - Diff against the deployed ledger, sweep orphans
//! 3. Executing - Run the plan sequentially with progress and confirmation

pub mod deployer;
pub mod display;

pub use deployer::{DeployOptions, deploy, destroy, plan_only};
