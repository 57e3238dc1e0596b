//! IAM policy documents for managed roles.

use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::fs;

/// The trust policy allowing Lambda to assume a managed role.
pub fn lambda_trust_policy() -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Principal": {"Service": "lambda.amazonaws.com"},
                "Action": "sts:AssumeRole"
            }
        ]
    })
}

/// The base auto-generated policy: enough to write function logs.
pub fn autogen_policy_document() -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Sid": "Logs",
                "Effect": "Allow",
                "Action": [
                    "logs:CreateLogGroup",
                    "logs:CreateLogStream",
                    "logs:PutLogEvents"
                ],
                "Resource": "arn:aws:logs:*:*:*"
            }
        ]
    })
}

/// The statement a VPC-attached function needs to manage its network
/// interfaces.
fn vpc_statement() -> Value {
    json!({
        "Sid": "VpcAccess",
        "Effect": "Allow",
        "Action": [
            "ec2:CreateNetworkInterface",
            "ec2:DescribeNetworkInterfaces",
            "ec2:DeleteNetworkInterface"
        ],
        "Resource": "*"
    })
}

/// Append the VPC trait to an auto-generated policy document, once.
pub fn inject_vpc_trait(document: &mut Value) {
    let Some(statements) = document
        .get_mut("Statement")
        .and_then(Value::as_array_mut)
    else {
        return;
    };
    let already_present = statements
        .iter()
        .any(|s| s.get("Sid").and_then(Value::as_str) == Some("VpcAccess"));
    if !already_present {
        statements.push(vpc_statement());
    }
}

/// Load a user-supplied policy document, expanding `~` in the path.
pub fn load_policy_file(path: &str) -> Result<Value> {
    let expanded = shellexpand::tilde(path);
    let content = fs::read_to_string(expanded.as_ref())
        .with_context(|| format!("Could not read policy file {path}"))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid policy document {path}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vpc_trait_is_injected_once() {
        let mut doc = autogen_policy_document();
        inject_vpc_trait(&mut doc);
        inject_vpc_trait(&mut doc);

        let statements = doc["Statement"].as_array().unwrap();
        let vpc_count = statements
            .iter()
            .filter(|s| s["Sid"] == "VpcAccess")
            .count();
        assert_eq!(vpc_count, 1);
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn base_policy_has_log_permissions() {
        let doc = autogen_policy_document();
        let actions = doc["Statement"][0]["Action"].as_array().unwrap();
        assert!(actions.contains(&serde_json::json!("logs:PutLogEvents")));
    }

    #[test]
    fn load_policy_file_parses_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        fs::write(&path, r#"{"Version": "2012-10-17", "Statement": []}"#).unwrap();

        let doc = load_policy_file(path.to_str().unwrap()).unwrap();
        assert_eq!(doc["Version"], "2012-10-17");
    }

    #[test]
    fn load_policy_file_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        fs::write(&path, "not json").unwrap();
        assert!(load_policy_file(path.to_str().unwrap()).is_err());
    }
}
