//! Deploy orchestration: build, plan, sweep, confirm, execute, persist.

use anyhow::{Context as AnyhowContext, Result, bail};
use awskit::CloudClient;
use indicatif::{ProgressBar, ProgressStyle};
use reconcile::{
    DeployedState, Executor, Plan, PlanStage, ProgressCallback, RecordedResource, Sweeper,
    dependency_order,
};
use std::path::Path;

use crate::builder;
use crate::config::{ProjectConfig, deployed_state_path};
use crate::package::PackageArtifact;
use crate::report;

use super::display;

/// Options for a deploy run.
#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub stage: String,
    /// Skip confirmation prompts
    pub yes: bool,
    /// Show the plan and stop before executing
    pub dry_run: bool,
}

/// Build the full reconciliation plan for a stage.
fn build_plan(
    config: &ProjectConfig,
    project_dir: &Path,
    stage: &str,
) -> Result<(Plan, DeployedState)> {
    let artifact = PackageArtifact::resolve(&project_dir.join(&config.app.artifact))?;
    let app = builder::build(config, stage, &artifact)?;
    let order = dependency_order(&app);

    let deployed = DeployedState::load(&deployed_state_path(project_dir, stage))?;
    let mut plan = PlanStage::new(&deployed)
        .execute(&app.arena, &order)
        .context("Failed to generate the deployment plan")?;
    Sweeper::new().execute(&mut plan, &deployed);

    Ok((plan, deployed))
}

/// Show the plan for a stage without executing anything.
pub fn plan_only(config: &ProjectConfig, project_dir: &Path, stage: &str) -> Result<()> {
    let (plan, deployed) = build_plan(config, project_dir, stage)?;
    display::show_plan(&plan, &deployed);
    display::show_policy_diffs(&plan, &deployed);
    Ok(())
}

/// Deploy a stage: reconcile the cloud with the declared application.
pub fn deploy(
    config: &ProjectConfig,
    project_dir: &Path,
    client: &impl CloudClient,
    opts: &DeployOptions,
) -> Result<()> {
    let (plan, deployed) = build_plan(config, project_dir, &opts.stage)?;
    display::show_plan(&plan, &deployed);

    if opts.dry_run {
        display::dry_run_notice();
        return Ok(());
    }
    if !opts.yes && !display::confirm_proceed()? {
        display::aborted_notice();
        return Ok(());
    }

    let state_path = deployed_state_path(project_dir, &opts.stage);
    let new_state = run_plan(&plan, &deployed, client, &state_path)?;
    report::show(&new_state);
    Ok(())
}

/// Tear down everything the stage ledger records.
pub fn destroy(
    config: &ProjectConfig,
    project_dir: &Path,
    client: &impl CloudClient,
    opts: &DeployOptions,
) -> Result<()> {
    let state_path = deployed_state_path(project_dir, &opts.stage);
    let deployed = DeployedState::load(&state_path)?;
    if deployed.is_empty() {
        bail!("Nothing deployed for stage {}", opts.stage);
    }

    // An empty plan marks nothing, so the sweeper schedules every
    // recorded resource for teardown.
    let mut plan = Plan::new();
    Sweeper::new().execute(&mut plan, &deployed);
    display::show_plan(&plan, &deployed);

    if opts.dry_run {
        display::dry_run_notice();
        return Ok(());
    }
    if !opts.yes && !display::confirm_proceed()? {
        display::aborted_notice();
        return Ok(());
    }

    let mut executor = Executor::new(client);
    let mut progress = BarProgress::start(plan.len());
    let result = executor.execute_with(&plan, &mut progress);
    progress.finish();
    result.with_context(|| format!("Failed to delete stage {}", opts.stage))?;

    DeployedState::from_records(Vec::new())
        .save(&state_path)
        .context("Failed to clear the deployed state ledger")?;
    display::destroyed_notice(&opts.stage);
    Ok(())
}

/// Execute the plan and persist the resulting ledger.
///
/// On failure the partial records are merged over the previous ledger
/// before the error propagates: resources touched before the abort keep
/// their fresh values, untouched ones keep their old records, and the
/// next deploy converges from exactly what is persisted.
fn run_plan(
    plan: &Plan,
    deployed: &DeployedState,
    client: &impl CloudClient,
    state_path: &Path,
) -> Result<DeployedState> {
    let mut executor = Executor::new(client);
    let mut progress = BarProgress::start(plan.len());
    let result = executor.execute_with(plan, &mut progress);
    progress.finish();

    match result {
        Ok(()) => {
            let new_state = DeployedState::from_records(executor.into_records());
            new_state
                .save(state_path)
                .context("Failed to write the deployed state ledger")?;
            Ok(new_state)
        }
        Err(e) => {
            let partial = merge_records(&deployed.resources, executor.into_records());
            if let Err(save_error) = DeployedState::from_records(partial).save(state_path) {
                log::error!("Could not persist partial progress: {save_error:#}");
            }
            Err(e).context("Deployment failed")
        }
    }
}

/// Overlay partial-run records on the previous ledger.
fn merge_records(
    previous: &[RecordedResource],
    partial: Vec<RecordedResource>,
) -> Vec<RecordedResource> {
    let mut merged: Vec<RecordedResource> = previous.to_vec();
    for record in partial {
        match merged.iter_mut().find(|r| r.name == record.name) {
            Some(existing) => {
                existing.resource_type = record.resource_type;
                existing.values.extend(record.values);
            }
            None => merged.push(record),
        }
    }
    merged
}

/// Progress bar wired into the executor callback.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn start(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::with_template("  {bar:30.cyan/dim} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for BarProgress {
    fn on_instruction(&mut self, _index: usize, _total: usize, message: Option<&str>) {
        if let Some(message) = message {
            self.bar.set_message(message.to_string());
        }
        self.bar.inc(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use awskit::{ApiOp, FakeCloud};
    use serde_json::json;
    use std::fs;

    fn record(name: &str, values: &[(&str, &str)]) -> RecordedResource {
        let mut r = RecordedResource::new(name, "lambda_function");
        for (k, v) in values {
            r.values.insert((*k).to_string(), json!(v));
        }
        r
    }

    #[test]
    fn merge_keeps_untouched_records_and_overlays_touched_ones() {
        let previous = vec![
            record("worker", &[("lambda_arn", "old-arn")]),
            record("other", &[("lambda_arn", "other-arn")]),
        ];
        let partial = vec![record("worker", &[("lambda_arn", "new-arn")])];

        let merged = merge_records(&previous, partial);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].value("lambda_arn"), Some("new-arn"));
        assert_eq!(merged[1].value("lambda_arn"), Some("other-arn"));
    }

    #[test]
    fn merge_appends_resources_new_in_this_run() {
        let previous = vec![record("worker", &[("lambda_arn", "arn")])];
        let partial = vec![record("fresh", &[("lambda_arn", "fresh-arn")])];

        let merged = merge_records(&previous, partial);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].name, "fresh");
    }

    fn project_with(config_body: &str) -> (tempfile::TempDir, ProjectConfig) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".jangada")).unwrap();
        fs::write(dir.path().join(".jangada").join("deployment.zip"), b"zip").unwrap();
        let config: ProjectConfig = toml::from_str(config_body).unwrap();
        (dir, config)
    }

    #[test]
    fn deploy_then_redeploy_converges_through_the_ledger() {
        let (dir, config) = project_with(
            r#"
            [app]
            name = "appname"

            [[route]]
            path = "/"
            "#,
        );
        let state_path = deployed_state_path(dir.path(), "dev");

        // First deploy: everything is new.
        let (plan, deployed) = build_plan(&config, dir.path(), "dev").unwrap();
        let cloud = FakeCloud::new();
        let state = run_plan(&plan, &deployed, &cloud, &state_path).unwrap();
        assert!(cloud.ops().contains(&ApiOp::CreateFunction));
        assert!(cloud.ops().contains(&ApiOp::ImportRestApi));
        assert!(state.contains("api_handler"));
        assert!(state.contains("rest_api"));
        assert!(state_path.exists());

        // Second deploy: the persisted ledger turns creates into updates.
        let (plan, deployed) = build_plan(&config, dir.path(), "dev").unwrap();
        let cloud = FakeCloud::new();
        run_plan(&plan, &deployed, &cloud, &state_path).unwrap();
        assert!(cloud.ops().contains(&ApiOp::UpdateFunction));
        assert!(cloud.ops().contains(&ApiOp::UpdateRestApi));
        assert!(!cloud.ops().contains(&ApiOp::CreateFunction));
    }

    #[test]
    fn dropping_the_api_sweeps_handler_and_gateway() {
        let (dir, config) = project_with(
            r#"
            [app]
            name = "appname"

            [[route]]
            path = "/"
            "#,
        );
        let state_path = deployed_state_path(dir.path(), "dev");

        let (plan, deployed) = build_plan(&config, dir.path(), "dev").unwrap();
        let cloud = FakeCloud::new();
        run_plan(&plan, &deployed, &cloud, &state_path).unwrap();

        // Same app with the route removed: only the shared role survives.
        let (_, reduced) = project_with(
            r#"
            [app]
            name = "appname"
            "#,
        );
        let (plan, deployed) = build_plan(&reduced, dir.path(), "dev").unwrap();
        let cloud = FakeCloud::new();
        let state = run_plan(&plan, &deployed, &cloud, &state_path).unwrap();

        let deletes: Vec<ApiOp> = cloud.ops().into_iter().filter(ApiOp::is_teardown).collect();
        assert!(deletes.contains(&ApiOp::DeleteRestApi));
        assert!(deletes.contains(&ApiOp::DeleteFunction));
        assert!(deletes.contains(&ApiOp::DeleteRole));
        assert!(!state.contains("rest_api"));
        assert!(!state.contains("api_handler"));
    }

    #[test]
    fn failed_deploy_persists_partial_progress() {
        let (dir, config) = project_with(
            r#"
            [app]
            name = "appname"

            [[function]]
            name = "worker"
            handler = "app.worker"
            "#,
        );
        let state_path = deployed_state_path(dir.path(), "dev");

        let (plan, deployed) = build_plan(&config, dir.path(), "dev").unwrap();
        let cloud = FakeCloud::new();
        cloud.fail_next(
            ApiOp::CreateFunction,
            awskit::AwsError::AccessDenied {
                message: "denied".to_string(),
            },
        );
        assert!(run_plan(&plan, &deployed, &cloud, &state_path).is_err());

        // The role made it; the next deploy plans an update for it and a
        // create for the function.
        let persisted = DeployedState::load(&state_path).unwrap();
        assert!(persisted.contains("default-role"));
        assert!(!persisted.contains("worker"));
    }
}
