//! Orphan detection and teardown planning.
//!
//! The sweeper compares what the current plan intends to keep against the
//! previously deployed ledger and appends teardown instructions for
//! everything left behind. Orphans are processed in reverse ledger order,
//! which approximates reverse dependency order, so dependents go before
//! their dependencies.

use crate::plan::{Instruction, Param, ParamMap, Plan};
use crate::state::{DeployedState, RecordedResource};
use awskit::ApiOp;
use serde_json::Value;

/// Attributes that pin a resource to an underlying cloud object.
///
/// A resource whose name is still marked by the new plan must nonetheless
/// be torn down when one of these attributes changed, because the name now
/// maps to a different cloud object (a different bucket, topic, queue or
/// stream). Kinds without identity attributes reconcile by name alone.
fn identity_keys(resource_type: &str) -> &'static [&'static str] {
    match resource_type {
        "s3_event" => &["bucket"],
        "sns_event" => &["topic"],
        "sqs_event" => &["queue"],
        "kinesis_event" => &["stream"],
        "dynamodb_event" => &["stream_arn"],
        _ => &[],
    }
}

/// Appends teardown instructions for deployed resources the current plan
/// no longer references.
#[derive(Debug, Default)]
pub struct Sweeper;

impl Sweeper {
    pub fn new() -> Self {
        Self
    }

    /// Mutates `plan` in place, appending one teardown sequence per
    /// orphaned resource.
    pub fn execute(&self, plan: &mut Plan, deployed: &DeployedState) {
        let marked = plan.marked_names();
        let planned_values = plan.recorded_values();

        // Reverse of recorded order: dependents were recorded after their
        // dependencies, so they are deleted first.
        let orphans: Vec<RecordedResource> = deployed
            .resources
            .iter()
            .rev()
            .filter(|record| {
                if !marked.contains(&record.name) {
                    return true;
                }
                identity_keys(&record.resource_type).iter().any(|key| {
                    let old = record.values.get(*key);
                    let new = planned_values
                        .get(&record.name)
                        .and_then(|values| values.get(*key));
                    old != new
                })
            })
            .cloned()
            .collect();

        for record in orphans {
            self.teardown(plan, &record);
        }
    }

    fn teardown(&self, plan: &mut Plan, record: &RecordedResource) {
        match record.resource_type.as_str() {
            "lambda_function" => self.delete_function(plan, record),
            "iam_role" => self.delete_role(plan, record),
            "lambda_layer" => self.delete_layer(plan, record),
            "scheduled_event" => self.delete_rule(plan, record),
            "rest_api" => self.delete_rest_api(plan, record),
            "websocket_api" => self.delete_websocket_api(plan, record),
            "domain_name" => self.delete_domain_name(plan, record),
            "api_mapping" => self.delete_api_mapping(plan, record),
            "s3_event" => self.delete_s3_event(plan, record),
            "sns_event" => self.delete_sns_subscription(plan, record),
            "sqs_event" | "kinesis_event" | "dynamodb_event" => {
                self.delete_event_source(plan, record)
            }
            "deployment_package" => {}
            other => {
                log::warn!(
                    "Not sweeping {}: unknown resource type {other}",
                    record.name
                );
            }
        }
    }

    fn call(
        &self,
        plan: &mut Plan,
        op: ApiOp,
        record: &RecordedResource,
        params: ParamMap,
        message: Option<String>,
    ) {
        let instruction = Instruction::ApiCall {
            op,
            params,
            output_var: None,
            resource_name: record.name.clone(),
        };
        match message {
            Some(message) => plan.push_with_message(instruction, message),
            None => plan.push(instruction),
        }
    }

    fn literal(record: &RecordedResource, key: &str) -> Param {
        Param::Literal(
            record
                .values
                .get(key)
                .cloned()
                .unwrap_or(Value::Null),
        )
    }

    fn delete_function(&self, plan: &mut Plan, record: &RecordedResource) {
        let mut params = ParamMap::new();
        params.insert("function_name".to_string(), Self::literal(record, "function_name"));
        let name = record.value("function_name").unwrap_or(&record.name);
        let message = format!("Deleting lambda function: {name}");
        self.call(plan, ApiOp::DeleteFunction, record, params, Some(message));
    }

    fn delete_role(&self, plan: &mut Plan, record: &RecordedResource) {
        // Managed roles carry their inline policy under the role's own
        // name; pre-created roles have no role_name recorded and are never
        // deleted, the user owns them.
        let Some(role_name) = record.value("role_name").map(str::to_string) else {
            log::debug!("Not sweeping pre-created role {}", record.name);
            return;
        };

        let mut params = ParamMap::new();
        params.insert("role_name".to_string(), Param::str(&role_name));
        params.insert("policy_name".to_string(), Param::str(&role_name));
        self.call(plan, ApiOp::DeleteRolePolicy, record, params, None);

        let mut params = ParamMap::new();
        params.insert("role_name".to_string(), Param::str(&role_name));
        let message = format!("Deleting IAM role: {role_name}");
        self.call(plan, ApiOp::DeleteRole, record, params, Some(message));
    }

    fn delete_layer(&self, plan: &mut Plan, record: &RecordedResource) {
        let mut params = ParamMap::new();
        params.insert(
            "layer_version_arn".to_string(),
            Self::literal(record, "layer_version_arn"),
        );
        let message = format!("Deleting layer: {}", record.name);
        self.call(plan, ApiOp::DeleteLayerVersion, record, params, Some(message));
    }

    fn delete_rule(&self, plan: &mut Plan, record: &RecordedResource) {
        let mut params = ParamMap::new();
        params.insert("rule_name".to_string(), Self::literal(record, "rule_name"));
        let name = record.value("rule_name").unwrap_or(&record.name);
        let message = format!("Deleting schedule rule: {name}");
        self.call(plan, ApiOp::DeleteRule, record, params, Some(message));
    }

    fn delete_rest_api(&self, plan: &mut Plan, record: &RecordedResource) {
        let mut params = ParamMap::new();
        params.insert("rest_api_id".to_string(), Self::literal(record, "rest_api_id"));
        self.call(
            plan,
            ApiOp::DeleteRestApi,
            record,
            params,
            Some("Deleting Rest API".to_string()),
        );
    }

    fn delete_websocket_api(&self, plan: &mut Plan, record: &RecordedResource) {
        let mut params = ParamMap::new();
        params.insert(
            "api_id".to_string(),
            Self::literal(record, "websocket_api_id"),
        );
        self.call(
            plan,
            ApiOp::DeleteWebsocketApi,
            record,
            params,
            Some("Deleting websocket API".to_string()),
        );
    }

    fn delete_domain_name(&self, plan: &mut Plan, record: &RecordedResource) {
        let mut params = ParamMap::new();
        params.insert("domain_name".to_string(), Self::literal(record, "domain_name"));
        let name = record.value("domain_name").unwrap_or(&record.name);
        let message = format!("Deleting custom domain: {name}");
        self.call(plan, ApiOp::DeleteDomainName, record, params, Some(message));
    }

    fn delete_api_mapping(&self, plan: &mut Plan, record: &RecordedResource) {
        let mut params = ParamMap::new();
        params.insert("domain_name".to_string(), Self::literal(record, "domain_name"));
        params.insert(
            "api_mapping_id".to_string(),
            Self::literal(record, "api_mapping_id"),
        );
        self.call(plan, ApiOp::DeleteApiMapping, record, params, None);
    }

    /// An S3 event source needs both the bucket notification unhooked and
    /// the corresponding resource policy statement removed.
    fn delete_s3_event(&self, plan: &mut Plan, record: &RecordedResource) {
        let mut params = ParamMap::new();
        params.insert("bucket".to_string(), Self::literal(record, "bucket"));
        params.insert("function_arn".to_string(), Self::literal(record, "lambda_arn"));
        let bucket = record.value("bucket").unwrap_or(&record.name);
        let message = format!("Disconnecting S3 events from bucket: {bucket}");
        self.call(
            plan,
            ApiOp::DisconnectS3BucketFromFunction,
            record,
            params,
            Some(message),
        );

        let mut params = ParamMap::new();
        params.insert("bucket".to_string(), Self::literal(record, "bucket"));
        params.insert("function_arn".to_string(), Self::literal(record, "lambda_arn"));
        self.call(plan, ApiOp::RemovePermissionForS3Event, record, params, None);
    }

    /// An SNS subscription needs both the unsubscribe and the permission
    /// removal.
    fn delete_sns_subscription(&self, plan: &mut Plan, record: &RecordedResource) {
        let mut params = ParamMap::new();
        params.insert(
            "subscription_arn".to_string(),
            Self::literal(record, "subscription_arn"),
        );
        let topic = record.value("topic").unwrap_or(&record.name);
        let message = format!("Unsubscribing from SNS topic: {topic}");
        self.call(plan, ApiOp::UnsubscribeFromTopic, record, params, Some(message));

        let mut params = ParamMap::new();
        params.insert("topic_arn".to_string(), Self::literal(record, "topic_arn"));
        params.insert("function_arn".to_string(), Self::literal(record, "lambda_arn"));
        self.call(plan, ApiOp::RemovePermissionForSnsTopic, record, params, None);
    }

    fn delete_event_source(&self, plan: &mut Plan, record: &RecordedResource) {
        let op = match record.resource_type.as_str() {
            "sqs_event" => ApiOp::RemoveSqsEventSource,
            "kinesis_event" => ApiOp::RemoveKinesisEventSource,
            _ => ApiOp::RemoveDynamodbEventSource,
        };
        let mut params = ParamMap::new();
        params.insert("event_uuid".to_string(), Self::literal(record, "event_uuid"));
        let message = format!("Removing event source: {}", record.name);
        self.call(plan, op, record, params, Some(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DeployedState;
    use serde_json::json;

    fn record(name: &str, resource_type: &str, values: &[(&str, Value)]) -> RecordedResource {
        let mut r = RecordedResource::new(name, resource_type);
        for (k, v) in values {
            r.values.insert((*k).to_string(), v.clone());
        }
        r
    }

    fn mark(plan: &mut Plan, resource_type: &str, name: &str, key: &str, value: Value) {
        plan.push(Instruction::RecordResourceValue {
            resource_type: resource_type.to_string(),
            resource_name: name.to_string(),
            name: key.to_string(),
            value,
        });
    }

    fn teardown_ops(plan: &Plan, from: usize) -> Vec<ApiOp> {
        plan.instructions[from..]
            .iter()
            .filter_map(|i| match i {
                Instruction::ApiCall { op, .. } => Some(*op),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn orphaned_resources_get_exactly_one_teardown_sequence() {
        let deployed = DeployedState::from_records(vec![
            record(
                "worker",
                "lambda_function",
                &[("function_name", json!("app-dev-worker"))],
            ),
            record("rest_api", "rest_api", &[("rest_api_id", json!("abcd"))]),
        ]);

        let mut plan = Plan::new();
        Sweeper::new().execute(&mut plan, &deployed);

        // Reverse ledger order: the api goes before the function.
        assert_eq!(
            teardown_ops(&plan, 0),
            vec![ApiOp::DeleteRestApi, ApiOp::DeleteFunction]
        );
    }

    #[test]
    fn marked_resources_are_left_alone() {
        let deployed = DeployedState::from_records(vec![record(
            "worker",
            "lambda_function",
            &[("function_name", json!("app-dev-worker"))],
        )]);

        let mut plan = Plan::new();
        mark(
            &mut plan,
            "lambda_function",
            "worker",
            "function_name",
            json!("app-dev-worker"),
        );
        let before = plan.len();
        Sweeper::new().execute(&mut plan, &deployed);

        assert_eq!(plan.len(), before);
    }

    #[test]
    fn changed_bucket_forces_teardown_of_marked_s3_event() {
        let deployed = DeployedState::from_records(vec![record(
            "upload-s3event",
            "s3_event",
            &[
                ("bucket", json!("bucket-a")),
                ("lambda_arn", json!("arn:aws:lambda:::fn")),
            ],
        )]);

        let mut plan = Plan::new();
        mark(
            &mut plan,
            "s3_event",
            "upload-s3event",
            "bucket",
            json!("bucket-b"),
        );
        let before = plan.len();
        Sweeper::new().execute(&mut plan, &deployed);

        let ops = teardown_ops(&plan, before);
        assert_eq!(
            ops,
            vec![
                ApiOp::DisconnectS3BucketFromFunction,
                ApiOp::RemovePermissionForS3Event,
            ]
        );
        // The teardown targets the old bucket, not the new one.
        let disconnect = plan.instructions[before..]
            .iter()
            .find_map(|i| match i {
                Instruction::ApiCall {
                    op: ApiOp::DisconnectS3BucketFromFunction,
                    params,
                    ..
                } => Some(params),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            disconnect.get("bucket"),
            Some(&Param::Literal(json!("bucket-a")))
        );
    }

    #[test]
    fn unchanged_bucket_is_not_torn_down() {
        let deployed = DeployedState::from_records(vec![record(
            "upload-s3event",
            "s3_event",
            &[("bucket", json!("bucket-a"))],
        )]);

        let mut plan = Plan::new();
        mark(
            &mut plan,
            "s3_event",
            "upload-s3event",
            "bucket",
            json!("bucket-a"),
        );
        let before = plan.len();
        Sweeper::new().execute(&mut plan, &deployed);
        assert_eq!(plan.len(), before);
    }

    #[test]
    fn sns_teardown_unsubscribes_and_removes_permission() {
        let deployed = DeployedState::from_records(vec![record(
            "notify-sns-subscription",
            "sns_event",
            &[
                ("topic", json!("mytopic")),
                ("topic_arn", json!("arn:aws:sns:us-west-2:123456789012:mytopic")),
                (
                    "subscription_arn",
                    json!("arn:aws:sns:us-west-2:123456789012:mytopic:0001"),
                ),
                ("lambda_arn", json!("arn:aws:lambda:::fn")),
            ],
        )]);

        let mut plan = Plan::new();
        Sweeper::new().execute(&mut plan, &deployed);

        assert_eq!(
            teardown_ops(&plan, 0),
            vec![ApiOp::UnsubscribeFromTopic, ApiOp::RemovePermissionForSnsTopic]
        );
    }

    #[test]
    fn managed_role_teardown_deletes_policy_then_role() {
        let deployed = DeployedState::from_records(vec![record(
            "default-role",
            "iam_role",
            &[("role_name", json!("app-dev"))],
        )]);

        let mut plan = Plan::new();
        Sweeper::new().execute(&mut plan, &deployed);
        assert_eq!(
            teardown_ops(&plan, 0),
            vec![ApiOp::DeleteRolePolicy, ApiOp::DeleteRole]
        );
    }

    #[test]
    fn precreated_role_is_never_deleted() {
        let deployed = DeployedState::from_records(vec![record(
            "precreated-role-admin",
            "iam_role",
            &[("role_arn", json!("arn:aws:iam::123456789012:role/admin"))],
        )]);

        let mut plan = Plan::new();
        Sweeper::new().execute(&mut plan, &deployed);
        assert!(plan.is_empty());
    }

    #[test]
    fn sqs_event_source_is_removed_by_uuid() {
        let deployed = DeployedState::from_records(vec![record(
            "drain-sqs-event-source",
            "sqs_event",
            &[("queue", json!("jobs")), ("event_uuid", json!("uuid-1"))],
        )]);

        let mut plan = Plan::new();
        Sweeper::new().execute(&mut plan, &deployed);
        assert_eq!(teardown_ops(&plan, 0), vec![ApiOp::RemoveSqsEventSource]);
    }
}
