//! The resource model: typed descriptions of cloud resources forming a
//! dependency graph.
//!
//! Resources live in a [`ResourceArena`] and reference each other through
//! [`Handle`] indices. A resource can only reference handles allocated
//! before it, so the graph is acyclic by construction and "the same
//! resource" is a question of handle equality, never of structural
//! comparison.

use serde_json::Value;
use std::collections::BTreeMap;

/// A value that is not known until a build step or the executor fills it in.
///
/// Attributes like a generated swagger document or the deployment package
/// path start out `Pending` and must be `Ready` before planning; values
/// that only exist after an API call (ARNs, ids) never appear here at all,
/// they flow through plan variables instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder<T> {
    /// Not filled in yet
    Pending,
    /// Filled in by a build step
    Ready(T),
}

impl<T> Placeholder<T> {
    /// The filled-in value, if any.
    pub fn ready(&self) -> Option<&T> {
        match self {
            Placeholder::Pending => None,
            Placeholder::Ready(value) => Some(value),
        }
    }

    /// Whether the value has been filled in.
    pub fn is_ready(&self) -> bool {
        matches!(self, Placeholder::Ready(_))
    }
}

/// Index of a resource inside a [`ResourceArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(usize);

impl Handle {
    /// The raw arena index.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// The artifact every plain Lambda function in a stage ships in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentPackage {
    pub resource_name: String,
    /// Path to the zipped artifact
    pub filename: Placeholder<String>,
    /// Content hash of the artifact, used for change detection
    pub content_hash: Placeholder<String>,
}

/// An IAM role whose policy this tool owns.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedIamRole {
    pub resource_name: String,
    pub role_name: String,
    pub trust_policy: Value,
    pub policy_document: Value,
}

/// An IAM role the user created externally, referenced by ARN only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreCreatedIamRole {
    pub resource_name: String,
    pub role_arn: String,
}

/// A Lambda function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LambdaFunction {
    pub resource_name: String,
    pub function_name: String,
    pub deployment_package: Handle,
    pub role: Handle,
    pub runtime: String,
    pub handler: String,
    pub memory_size: u32,
    pub timeout: u32,
    pub environment_variables: BTreeMap<String, String>,
    pub security_group_ids: Vec<String>,
    pub subnet_ids: Vec<String>,
    /// Extra layer ARNs configured by the user
    pub layers: Vec<String>,
    /// The shared managed layer, when the automatic layer feature is on
    pub managed_layer: Option<Handle>,
}

/// A Lambda layer holding shared dependencies, built at most once per stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LambdaLayer {
    pub resource_name: String,
    pub layer_name: String,
    pub runtime: String,
    pub deployment_package: Handle,
}

/// A CloudWatch Events rule firing a function on a schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledEvent {
    pub resource_name: String,
    pub rule_name: String,
    pub schedule_expression: String,
    pub lambda_function: Handle,
}

/// The REST API fronting the routed handler function.
#[derive(Debug, Clone, PartialEq)]
pub struct RestApi {
    pub resource_name: String,
    pub swagger_doc: Placeholder<Value>,
    pub endpoint_type: String,
    pub minimum_compression: Option<u32>,
    pub api_gateway_stage: String,
    pub lambda_function: Handle,
    pub authorizers: Vec<Handle>,
}

/// The websocket API wired to its connect/message/disconnect handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebsocketApi {
    pub resource_name: String,
    pub name: String,
    pub api_gateway_stage: String,
    pub routes: Vec<String>,
    pub connect: Option<Handle>,
    pub message: Option<Handle>,
    pub disconnect: Option<Handle>,
}

/// Which protocol a custom domain fronts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiProtocol {
    Http,
    Websocket,
}

impl ApiProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiProtocol::Http => "HTTP",
            ApiProtocol::Websocket => "WEBSOCKET",
        }
    }
}

/// A custom domain name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainName {
    pub resource_name: String,
    pub protocol: ApiProtocol,
    pub domain_name: String,
    pub certificate_arn: String,
    pub tls_version: Option<String>,
}

/// The mapping mounting an API under a custom domain path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiMapping {
    pub resource_name: String,
    pub mount_path: String,
    pub domain: Handle,
    pub api: Handle,
}

/// An S3 bucket notification invoking a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3BucketNotification {
    pub resource_name: String,
    pub bucket: String,
    pub events: Vec<String>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub lambda_function: Handle,
}

/// An SNS topic subscription invoking a function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnsSubscription {
    pub resource_name: String,
    /// Topic name or full topic ARN
    pub topic: String,
    pub lambda_function: Handle,
}

/// An SQS queue event source mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqsEventSource {
    pub resource_name: String,
    /// Queue name or full queue ARN
    pub queue: String,
    pub batch_size: u32,
    pub maximum_batching_window: u32,
    pub lambda_function: Handle,
}

/// A Kinesis stream event source mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KinesisEventSource {
    pub resource_name: String,
    pub stream: String,
    pub batch_size: u32,
    pub starting_position: String,
    pub lambda_function: Handle,
}

/// A DynamoDB stream event source mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamoDbEventSource {
    pub resource_name: String,
    pub stream_arn: String,
    pub batch_size: u32,
    pub starting_position: String,
    pub lambda_function: Handle,
}

/// Every kind of cloud resource the deployer manages.
///
/// One enum rather than a trait so the planner and sweeper dispatch with
/// an exhaustive match: adding a kind forces every stage to handle it.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceKind {
    DeploymentPackage(DeploymentPackage),
    ManagedIamRole(ManagedIamRole),
    PreCreatedIamRole(PreCreatedIamRole),
    LambdaFunction(LambdaFunction),
    LambdaLayer(LambdaLayer),
    ScheduledEvent(ScheduledEvent),
    RestApi(RestApi),
    WebsocketApi(WebsocketApi),
    DomainName(DomainName),
    ApiMapping(ApiMapping),
    S3BucketNotification(S3BucketNotification),
    SnsSubscription(SnsSubscription),
    SqsEventSource(SqsEventSource),
    KinesisEventSource(KinesisEventSource),
    DynamoDbEventSource(DynamoDbEventSource),
}

impl ResourceKind {
    /// The reconciliation key, unique within one stage.
    pub fn resource_name(&self) -> &str {
        match self {
            ResourceKind::DeploymentPackage(r) => &r.resource_name,
            ResourceKind::ManagedIamRole(r) => &r.resource_name,
            ResourceKind::PreCreatedIamRole(r) => &r.resource_name,
            ResourceKind::LambdaFunction(r) => &r.resource_name,
            ResourceKind::LambdaLayer(r) => &r.resource_name,
            ResourceKind::ScheduledEvent(r) => &r.resource_name,
            ResourceKind::RestApi(r) => &r.resource_name,
            ResourceKind::WebsocketApi(r) => &r.resource_name,
            ResourceKind::DomainName(r) => &r.resource_name,
            ResourceKind::ApiMapping(r) => &r.resource_name,
            ResourceKind::S3BucketNotification(r) => &r.resource_name,
            ResourceKind::SnsSubscription(r) => &r.resource_name,
            ResourceKind::SqsEventSource(r) => &r.resource_name,
            ResourceKind::KinesisEventSource(r) => &r.resource_name,
            ResourceKind::DynamoDbEventSource(r) => &r.resource_name,
        }
    }

    /// Resource type tag used in the deployed-state ledger.
    pub fn resource_type(&self) -> &'static str {
        match self {
            ResourceKind::DeploymentPackage(_) => "deployment_package",
            ResourceKind::ManagedIamRole(_) | ResourceKind::PreCreatedIamRole(_) => "iam_role",
            ResourceKind::LambdaFunction(_) => "lambda_function",
            ResourceKind::LambdaLayer(_) => "lambda_layer",
            ResourceKind::ScheduledEvent(_) => "scheduled_event",
            ResourceKind::RestApi(_) => "rest_api",
            ResourceKind::WebsocketApi(_) => "websocket_api",
            ResourceKind::DomainName(_) => "domain_name",
            ResourceKind::ApiMapping(_) => "api_mapping",
            ResourceKind::S3BucketNotification(_) => "s3_event",
            ResourceKind::SnsSubscription(_) => "sns_event",
            ResourceKind::SqsEventSource(_) => "sqs_event",
            ResourceKind::KinesisEventSource(_) => "kinesis_event",
            ResourceKind::DynamoDbEventSource(_) => "dynamodb_event",
        }
    }

    /// The resources this one directly references.
    pub fn dependencies(&self) -> Vec<Handle> {
        match self {
            ResourceKind::DeploymentPackage(_)
            | ResourceKind::ManagedIamRole(_)
            | ResourceKind::PreCreatedIamRole(_)
            | ResourceKind::DomainName(_) => Vec::new(),
            ResourceKind::LambdaFunction(r) => {
                let mut deps = vec![r.deployment_package, r.role];
                if let Some(layer) = r.managed_layer {
                    deps.push(layer);
                }
                deps
            }
            ResourceKind::LambdaLayer(r) => vec![r.deployment_package],
            ResourceKind::ScheduledEvent(r) => vec![r.lambda_function],
            ResourceKind::RestApi(r) => {
                let mut deps = vec![r.lambda_function];
                deps.extend(&r.authorizers);
                deps
            }
            ResourceKind::WebsocketApi(r) => [r.connect, r.message, r.disconnect]
                .into_iter()
                .flatten()
                .collect(),
            ResourceKind::ApiMapping(r) => vec![r.api, r.domain],
            ResourceKind::S3BucketNotification(r) => vec![r.lambda_function],
            ResourceKind::SnsSubscription(r) => vec![r.lambda_function],
            ResourceKind::SqsEventSource(r) => vec![r.lambda_function],
            ResourceKind::KinesisEventSource(r) => vec![r.lambda_function],
            ResourceKind::DynamoDbEventSource(r) => vec![r.lambda_function],
        }
    }
}

/// Owns every resource of one application graph.
///
/// Sharing a resource between parents means sharing its [`Handle`]; the
/// dependency builder deduplicates on handles, so whoever constructs the
/// graph decides what is shared by reusing handles, never by structural
/// equality.
#[derive(Debug, Default)]
pub struct ResourceArena {
    resources: Vec<ResourceKind>,
}

impl ResourceArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource and return its handle.
    ///
    /// The resource may only reference handles that already exist, which
    /// keeps the graph acyclic.
    pub fn add(&mut self, resource: ResourceKind) -> Handle {
        let next = self.resources.len();
        debug_assert!(
            resource.dependencies().iter().all(|d| d.index() < next),
            "resource {} references a handle that does not exist yet",
            resource.resource_name()
        );
        self.resources.push(resource);
        Handle(next)
    }

    /// Look up a resource by handle.
    pub fn get(&self, handle: Handle) -> &ResourceKind {
        &self.resources[handle.0]
    }

    /// Mutable lookup, used when a shared resource gains configuration
    /// from a later sibling (e.g. a VPC policy trait on a shared role).
    pub fn get_mut(&mut self, handle: Handle) -> &mut ResourceKind {
        &mut self.resources[handle.0]
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// All handles in allocation order.
    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        (0..self.resources.len()).map(Handle)
    }
}

/// One deployable application graph: a stage name plus the root resources
/// (everything else is reachable through dependencies).
#[derive(Debug)]
pub struct Application {
    pub stage: String,
    pub resources: Vec<Handle>,
    pub arena: ResourceArena,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn package(arena: &mut ResourceArena) -> Handle {
        arena.add(ResourceKind::DeploymentPackage(DeploymentPackage {
            resource_name: "deployment_package".to_string(),
            filename: Placeholder::Ready("app.zip".to_string()),
            content_hash: Placeholder::Ready("abc123".to_string()),
        }))
    }

    fn role(arena: &mut ResourceArena, name: &str) -> Handle {
        arena.add(ResourceKind::ManagedIamRole(ManagedIamRole {
            resource_name: name.to_string(),
            role_name: format!("app-dev-{name}"),
            trust_policy: json!({}),
            policy_document: json!({"Statement": []}),
        }))
    }

    fn function(arena: &mut ResourceArena, name: &str, pkg: Handle, role: Handle) -> Handle {
        arena.add(ResourceKind::LambdaFunction(LambdaFunction {
            resource_name: name.to_string(),
            function_name: format!("app-dev-{name}"),
            deployment_package: pkg,
            role,
            runtime: "python3.12".to_string(),
            handler: format!("app.{name}"),
            memory_size: 128,
            timeout: 60,
            environment_variables: BTreeMap::new(),
            security_group_ids: Vec::new(),
            subnet_ids: Vec::new(),
            layers: Vec::new(),
            managed_layer: None,
        }))
    }

    #[test]
    fn function_depends_on_package_and_role() {
        let mut arena = ResourceArena::new();
        let pkg = package(&mut arena);
        let role = role(&mut arena, "default-role");
        let func = function(&mut arena, "worker", pkg, role);

        let deps = arena.get(func).dependencies();
        assert_eq!(deps, vec![pkg, role]);
    }

    #[test]
    fn placeholder_ready() {
        let pending: Placeholder<String> = Placeholder::Pending;
        assert!(pending.ready().is_none());
        assert!(!pending.is_ready());

        let ready = Placeholder::Ready(42);
        assert_eq!(ready.ready(), Some(&42));
    }

    #[test]
    fn shared_role_is_the_same_handle() {
        let mut arena = ResourceArena::new();
        let pkg = package(&mut arena);
        let shared = role(&mut arena, "default-role");
        let a = function(&mut arena, "a", pkg, shared);
        let b = function(&mut arena, "b", pkg, shared);

        let deps_a = arena.get(a).dependencies();
        let deps_b = arena.get(b).dependencies();
        assert_eq!(deps_a[1], deps_b[1]);
    }
}
