//! Human-readable deployment report.
//!
//! Renders the final resource ledger as a short summary grouped by
//! resource type. Purely presentational; nothing consumes this output.

use colored::Colorize;
use console::Term;
use reconcile::{DeployedState, RecordedResource};

/// The value worth showing for a record, by type.
fn display_value(record: &RecordedResource) -> Option<&str> {
    match record.resource_type.as_str() {
        "lambda_function" => record.value("lambda_arn"),
        "iam_role" => record.value("role_arn"),
        "lambda_layer" => record.value("layer_version_arn"),
        "rest_api" => record.value("rest_api_url"),
        "websocket_api" => record.value("websocket_api_url"),
        "domain_name" => record.value("domain_name"),
        "scheduled_event" => record.value("rule_name"),
        "s3_event" => record.value("bucket"),
        "sns_event" => record.value("topic"),
        "sqs_event" => record.value("queue"),
        "kinesis_event" => record.value("stream"),
        "dynamodb_event" => record.value("stream_arn"),
        _ => None,
    }
}

fn type_heading(resource_type: &str) -> &'static str {
    match resource_type {
        "lambda_function" => "Lambda functions",
        "iam_role" => "IAM roles",
        "lambda_layer" => "Layers",
        "rest_api" => "Rest APIs",
        "websocket_api" => "Websocket APIs",
        "domain_name" => "Custom domains",
        "api_mapping" => "API mappings",
        "scheduled_event" => "Schedules",
        "s3_event" => "S3 event sources",
        "sns_event" => "SNS subscriptions",
        "sqs_event" => "SQS event sources",
        "kinesis_event" => "Kinesis event sources",
        "dynamodb_event" => "DynamoDB event sources",
        _ => "Other resources",
    }
}

/// Print the deployed resources grouped by type.
pub fn show(state: &DeployedState) {
    let term = Term::stdout();
    let width = term.size().1 as usize;

    println!();
    println!(
        "  {} {}",
        "Resources deployed:".bold(),
        format!(
            "(as of {})",
            state
                .last_updated
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M")
        )
        .dimmed()
    );

    // Ledger order within each group; groups in first-seen order.
    let mut seen_types: Vec<&str> = Vec::new();
    for record in &state.resources {
        if !seen_types.contains(&record.resource_type.as_str()) {
            seen_types.push(&record.resource_type);
        }
    }

    for resource_type in seen_types {
        println!();
        println!("  {}", type_heading(resource_type).cyan());
        for record in state
            .resources
            .iter()
            .filter(|r| r.resource_type == resource_type)
        {
            match display_value(record) {
                Some(value) => {
                    let line = format!("    • {}: {}", record.name, value);
                    if line.len() > width && width > 8 {
                        println!("    • {}:", record.name);
                        println!("        {value}");
                    } else {
                        println!("{line}");
                    }
                }
                None => println!("    • {}", record.name),
            }
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn picks_the_interesting_value_per_type() {
        let mut api = RecordedResource::new("rest_api", "rest_api");
        api.values.insert("rest_api_id".to_string(), json!("abcd"));
        api.values.insert(
            "rest_api_url".to_string(),
            json!("https://abcd.execute-api.us-west-2.amazonaws.com/api/"),
        );
        assert_eq!(
            display_value(&api),
            Some("https://abcd.execute-api.us-west-2.amazonaws.com/api/")
        );

        let mut func = RecordedResource::new("worker", "lambda_function");
        func.values
            .insert("lambda_arn".to_string(), json!("arn:aws:lambda:::fn"));
        assert_eq!(display_value(&func), Some("arn:aws:lambda:::fn"));
    }

    #[test]
    fn unknown_types_have_a_heading() {
        assert_eq!(type_heading("mystery"), "Other resources");
    }
}
