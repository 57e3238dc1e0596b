//! Plan rendering - jangada-specific UI

use awskit::ApiOp;
use colored::Colorize;
use reconcile::{DeployedState, Instruction, Plan};
use similar::TextDiff;

/// What a plan step does to the cloud, for display purposes.
enum StepKind {
    Create,
    Update,
    Delete,
    Auxiliary,
}

fn classify(op: ApiOp, message: &str) -> StepKind {
    if op.is_teardown() {
        return StepKind::Delete;
    }
    match op {
        ApiOp::CreateFunction
        | ApiOp::CreateRole
        | ApiOp::PublishLayerVersion
        | ApiOp::ImportRestApi
        | ApiOp::CreateWebsocketApi
        | ApiOp::CreateDomainName
        | ApiOp::CreateApiMapping
        | ApiOp::SubscribeFunctionToTopic
        | ApiOp::CreateSqsEventSource
        | ApiOp::CreateKinesisEventSource
        | ApiOp::CreateDynamodbEventSource => StepKind::Create,
        ApiOp::UpdateFunction
        | ApiOp::PutRolePolicy
        | ApiOp::UpdateRestApi
        | ApiOp::UpdateDomainName
        | ApiOp::ConnectS3BucketToFunction
        | ApiOp::UpdateSqsEventSource
        | ApiOp::UpdateKinesisEventSource
        | ApiOp::UpdateDynamodbEventSource => StepKind::Update,
        // A put_rule is an upsert; the planner's message carries the verb.
        ApiOp::PutRule if message.starts_with("Creating") => StepKind::Create,
        ApiOp::PutRule => StepKind::Update,
        _ => StepKind::Auxiliary,
    }
}

/// Display the plan's visible steps in a user-friendly format.
pub fn show_plan(plan: &Plan, _deployed: &DeployedState) {
    let mut creates = 0usize;
    let mut updates = 0usize;
    let mut deletes = 0usize;

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Deployment Plan".bold()
    );
    println!("│");

    for (index, instruction) in plan.instructions.iter().enumerate() {
        let Instruction::ApiCall { op, .. } = instruction else {
            continue;
        };
        let Some(message) = plan.message_for(index) else {
            continue;
        };
        let symbol = match classify(*op, message) {
            StepKind::Create => {
                creates += 1;
                "+".green()
            }
            StepKind::Update => {
                updates += 1;
                "~".yellow()
            }
            StepKind::Delete => {
                deletes += 1;
                "-".red()
            }
            StepKind::Auxiliary => "·".dimmed(),
        };
        println!("│   {symbol} {message}");
    }

    if creates + updates + deletes == 0 {
        println!("│   {} No changes needed", "✓".green());
    }

    println!("│");
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} to create, {} to update, {} to delete",
        creates.to_string().green(),
        updates.to_string().yellow(),
        deletes.to_string().red()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

/// Show unified diffs between deployed and planned role policies.
pub fn show_policy_diffs(plan: &Plan, deployed: &DeployedState) {
    for (name, values) in plan.recorded_values() {
        let Some(new_policy) = values.get("policy_document") else {
            continue;
        };
        let Some(old_policy) = deployed
            .resource_values(&name)
            .and_then(|v| v.get("policy_document"))
        else {
            continue;
        };
        if old_policy == new_policy {
            continue;
        }

        let old_text = serde_json::to_string_pretty(old_policy).unwrap_or_default();
        let new_text = serde_json::to_string_pretty(new_policy).unwrap_or_default();

        println!();
        println!("  {} policy change for {}", "~".yellow(), name.bold());
        let diff = TextDiff::from_lines(&old_text, &new_text);
        for change in diff.iter_all_changes() {
            match change.tag() {
                similar::ChangeTag::Delete => print!("    {}", format!("-{change}").red()),
                similar::ChangeTag::Insert => print!("    {}", format!("+{change}").green()),
                similar::ChangeTag::Equal => print!("     {change}"),
            }
        }
    }
}

/// Confirm with user
pub fn confirm_proceed() -> anyhow::Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}

pub fn dry_run_notice() {
    println!();
    println!("  {} Dry run - no changes made", "ℹ".blue());
}

pub fn aborted_notice() {
    println!();
    println!("  {} Aborted", "✗".red());
}

pub fn destroyed_notice(stage: &str) {
    println!();
    println!("  {} Stage {} deleted", "✓".green(), stage.bold());
}
