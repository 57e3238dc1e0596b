//! Core types for the cloud client boundary.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Zipped deployment package size limit enforced by Lambda.
pub const LAMBDA_PACKAGE_LIMIT_BYTES: u64 = 50 * 1024 * 1024;

/// The vocabulary of operations the deployment engine issues against the
/// cloud provider.
///
/// Each variant corresponds to one typed method on the underlying client
/// wrapper. The wrapper hides raw request/response shapes; an operation
/// takes a JSON parameter mapping and returns the interesting value
/// directly (an ARN, an id, a UUID) or null when there is nothing useful
/// to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiOp {
    // Lambda
    CreateFunction,
    UpdateFunction,
    DeleteFunction,
    AddPermission,
    RemovePermission,
    PublishLayerVersion,
    DeleteLayerVersion,

    // IAM
    CreateRole,
    PutRolePolicy,
    DeleteRolePolicy,
    DeleteRole,

    // CloudWatch Events
    PutRule,
    ConnectRuleToFunction,
    DeleteRule,

    // API Gateway (REST)
    ImportRestApi,
    UpdateRestApi,
    DeployRestApi,
    DeleteRestApi,

    // API Gateway (websockets)
    CreateWebsocketApi,
    ConfigureWebsocketIntegrations,
    DeployWebsocketApi,
    DeleteWebsocketApi,

    // Custom domains
    CreateDomainName,
    UpdateDomainName,
    DeleteDomainName,
    CreateApiMapping,
    DeleteApiMapping,

    // S3 notifications
    AddPermissionForS3Event,
    RemovePermissionForS3Event,
    ConnectS3BucketToFunction,
    DisconnectS3BucketFromFunction,

    // SNS
    AddPermissionForSnsTopic,
    RemovePermissionForSnsTopic,
    SubscribeFunctionToTopic,
    UnsubscribeFromTopic,

    // Event source mappings (SQS / Kinesis / DynamoDB streams)
    CreateSqsEventSource,
    UpdateSqsEventSource,
    RemoveSqsEventSource,
    CreateKinesisEventSource,
    UpdateKinesisEventSource,
    RemoveKinesisEventSource,
    CreateDynamodbEventSource,
    UpdateDynamodbEventSource,
    RemoveDynamodbEventSource,
}

impl ApiOp {
    /// The wire-level method name for this operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiOp::CreateFunction => "create_function",
            ApiOp::UpdateFunction => "update_function",
            ApiOp::DeleteFunction => "delete_function",
            ApiOp::AddPermission => "add_permission",
            ApiOp::RemovePermission => "remove_permission",
            ApiOp::PublishLayerVersion => "publish_layer_version",
            ApiOp::DeleteLayerVersion => "delete_layer_version",
            ApiOp::CreateRole => "create_role",
            ApiOp::PutRolePolicy => "put_role_policy",
            ApiOp::DeleteRolePolicy => "delete_role_policy",
            ApiOp::DeleteRole => "delete_role",
            ApiOp::PutRule => "put_rule",
            ApiOp::ConnectRuleToFunction => "connect_rule_to_function",
            ApiOp::DeleteRule => "delete_rule",
            ApiOp::ImportRestApi => "import_rest_api",
            ApiOp::UpdateRestApi => "update_rest_api",
            ApiOp::DeployRestApi => "deploy_rest_api",
            ApiOp::DeleteRestApi => "delete_rest_api",
            ApiOp::CreateWebsocketApi => "create_websocket_api",
            ApiOp::ConfigureWebsocketIntegrations => "configure_websocket_integrations",
            ApiOp::DeployWebsocketApi => "deploy_websocket_api",
            ApiOp::DeleteWebsocketApi => "delete_websocket_api",
            ApiOp::CreateDomainName => "create_domain_name",
            ApiOp::UpdateDomainName => "update_domain_name",
            ApiOp::DeleteDomainName => "delete_domain_name",
            ApiOp::CreateApiMapping => "create_api_mapping",
            ApiOp::DeleteApiMapping => "delete_api_mapping",
            ApiOp::AddPermissionForS3Event => "add_permission_for_s3_event",
            ApiOp::RemovePermissionForS3Event => "remove_permission_for_s3_event",
            ApiOp::ConnectS3BucketToFunction => "connect_s3_bucket_to_function",
            ApiOp::DisconnectS3BucketFromFunction => "disconnect_s3_bucket_from_function",
            ApiOp::AddPermissionForSnsTopic => "add_permission_for_sns_topic",
            ApiOp::RemovePermissionForSnsTopic => "remove_permission_for_sns_topic",
            ApiOp::SubscribeFunctionToTopic => "subscribe_function_to_topic",
            ApiOp::UnsubscribeFromTopic => "unsubscribe_from_topic",
            ApiOp::CreateSqsEventSource => "create_sqs_event_source",
            ApiOp::UpdateSqsEventSource => "update_sqs_event_source",
            ApiOp::RemoveSqsEventSource => "remove_sqs_event_source",
            ApiOp::CreateKinesisEventSource => "create_kinesis_event_source",
            ApiOp::UpdateKinesisEventSource => "update_kinesis_event_source",
            ApiOp::RemoveKinesisEventSource => "remove_kinesis_event_source",
            ApiOp::CreateDynamodbEventSource => "create_dynamodb_event_source",
            ApiOp::UpdateDynamodbEventSource => "update_dynamodb_event_source",
            ApiOp::RemoveDynamodbEventSource => "remove_dynamodb_event_source",
        }
    }

    /// Whether this operation tears a resource down.
    ///
    /// Teardown operations tolerate a missing target: deleting something
    /// that is already gone counts as success.
    pub fn is_teardown(&self) -> bool {
        matches!(
            self,
            ApiOp::DeleteFunction
                | ApiOp::RemovePermission
                | ApiOp::DeleteLayerVersion
                | ApiOp::DeleteRolePolicy
                | ApiOp::DeleteRole
                | ApiOp::DeleteRule
                | ApiOp::DeleteRestApi
                | ApiOp::DeleteWebsocketApi
                | ApiOp::DeleteDomainName
                | ApiOp::DeleteApiMapping
                | ApiOp::RemovePermissionForS3Event
                | ApiOp::DisconnectS3BucketFromFunction
                | ApiOp::RemovePermissionForSnsTopic
                | ApiOp::UnsubscribeFromTopic
                | ApiOp::RemoveSqsEventSource
                | ApiOp::RemoveKinesisEventSource
                | ApiOp::RemoveDynamodbEventSource
        )
    }
}

impl std::fmt::Display for ApiOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration for retry behavior on transient errors.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier applied to the delay after each attempt
    pub backoff_factor: f64,
    /// Upper bound on the delay between attempts
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// A config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Compute the delay before the retry following `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.powi(attempt as i32);
        let delay = self.base_delay.mul_f64(factor);
        delay.min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_names_round_trip_through_serde() {
        let json = serde_json::to_string(&ApiOp::CreateFunction).unwrap();
        assert_eq!(json, "\"create_function\"");
        let op: ApiOp = serde_json::from_str(&json).unwrap();
        assert_eq!(op, ApiOp::CreateFunction);
    }

    #[test]
    fn test_teardown_classification() {
        assert!(ApiOp::DeleteFunction.is_teardown());
        assert!(ApiOp::UnsubscribeFromTopic.is_teardown());
        assert!(!ApiOp::CreateFunction.is_teardown());
        assert!(!ApiOp::PutRule.is_teardown());
    }

    #[test]
    fn test_delay_for_attempt_backs_off_and_caps() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(10),
        };
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(8));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(10));
    }
}
