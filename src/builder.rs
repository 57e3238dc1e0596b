//! The application graph builder: translates the declarative project
//! config into the typed resource graph the engine plans from.
//!
//! Construction is side-effect free; nothing here talks to the network.
//! Sharing decisions (one deployment package, one autogenerated role, one
//! managed layer per stage) are made here by reusing handles, which is
//! what the dependency builder's handle-based dedup relies on.

use crate::config::{FunctionSettings, ProjectConfig, RouteDecl, SettingsOverride};
use crate::package::PackageArtifact;
use crate::policy::{autogen_policy_document, inject_vpc_trait, lambda_trust_policy, load_policy_file};
use reconcile::{
    ApiMapping, ApiProtocol, Application, DeploymentPackage, DomainName, DynamoDbEventSource,
    Handle, KinesisEventSource, LambdaFunction, LambdaLayer, ManagedIamRole, Placeholder,
    PreCreatedIamRole, ResourceArena, ResourceKind, RestApi, S3BucketNotification, ScheduledEvent,
    SnsSubscription, SqsEventSource, WebsocketApi,
};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

/// Build-time configuration errors: always fatal, raised before any
/// network call.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(
        "function {function}: security_group_ids and subnet_ids must both be given, or neither"
    )]
    InvalidVpcConfig { function: String },

    #[error("duplicate resource name: {name}")]
    DuplicateName { name: String },

    #[error("function {function}: policy file {path} is unusable: {reason}")]
    InvalidPolicyFile {
        function: String,
        path: String,
        reason: String,
    },

    #[error("custom domain {domain} configured but no matching API is declared")]
    DomainWithoutApi { domain: String },
}

/// How a function's role is identified for sharing purposes.
///
/// Functions whose role configuration resolves to the same identifier
/// share one role resource; the cache below maps identifier to handle for
/// the duration of one build.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RoleIdentifier {
    PreCreated(String),
    Autogen,
    PolicyFile(String),
}

/// Build the application graph for one stage.
pub fn build(
    config: &ProjectConfig,
    stage: &str,
    artifact: &PackageArtifact,
) -> Result<Application, BuildError> {
    AppBuilder::new(config, stage, artifact).build()
}

struct AppBuilder<'a> {
    config: &'a ProjectConfig,
    stage: &'a str,
    arena: ResourceArena,
    roots: Vec<Handle>,
    role_cache: HashMap<RoleIdentifier, Handle>,
    names: HashSet<String>,
    package: Handle,
    managed_layer: Option<Handle>,
}

impl<'a> AppBuilder<'a> {
    fn new(config: &'a ProjectConfig, stage: &'a str, artifact: &PackageArtifact) -> Self {
        let mut arena = ResourceArena::new();
        let package = arena.add(ResourceKind::DeploymentPackage(DeploymentPackage {
            resource_name: "deployment_package".to_string(),
            filename: Placeholder::Ready(artifact.filename.clone()),
            content_hash: Placeholder::Ready(artifact.content_hash.clone()),
        }));
        Self {
            config,
            stage,
            arena,
            roots: Vec::new(),
            role_cache: HashMap::new(),
            names: HashSet::new(),
            package,
            managed_layer: None,
        }
    }

    fn build(mut self) -> Result<Application, BuildError> {
        self.claim_name("deployment_package")?;

        if self.config.automatic_layer(self.stage) {
            self.claim_name("managed-layer")?;
            let layer = self.arena.add(ResourceKind::LambdaLayer(LambdaLayer {
                resource_name: "managed-layer".to_string(),
                layer_name: format!("{}-{}-managed-layer", self.config.app.name, self.stage),
                runtime: self.config.defaults.runtime.clone(),
                deployment_package: self.package,
            }));
            self.managed_layer = Some(layer);
        }

        self.build_plain_functions()?;
        let rest_api = self.build_rest_api()?;
        let websocket_api = self.build_websocket_api()?;
        self.build_scheduled_events()?;
        self.build_s3_events()?;
        self.build_sns_subscriptions()?;
        self.build_sqs_events()?;
        self.build_kinesis_events()?;
        self.build_dynamodb_events()?;
        self.build_domains(rest_api, websocket_api)?;

        Ok(Application {
            stage: self.stage.to_string(),
            resources: self.roots,
            arena: self.arena,
        })
    }

    fn claim_name(&mut self, name: &str) -> Result<(), BuildError> {
        if !self.names.insert(name.to_string()) {
            return Err(BuildError::DuplicateName {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn function_name(&self, name: &str) -> String {
        format!("{}-{}-{}", self.config.app.name, self.stage, name)
    }

    /// Resolve the role for one function, sharing where configuration is
    /// identical.
    fn resolve_role(
        &mut self,
        function: &str,
        settings: &FunctionSettings,
    ) -> Result<Handle, BuildError> {
        let has_vpc = !settings.security_group_ids.is_empty();

        if let Some(arn) = &settings.iam_role_arn {
            let key = RoleIdentifier::PreCreated(arn.clone());
            if let Some(&handle) = self.role_cache.get(&key) {
                return Ok(handle);
            }
            let short = arn.rsplit('/').next().unwrap_or("role");
            let resource_name = format!("precreated-role-{short}");
            self.claim_name(&resource_name)?;
            let handle = self.arena.add(ResourceKind::PreCreatedIamRole(PreCreatedIamRole {
                resource_name,
                role_arn: arn.clone(),
            }));
            self.role_cache.insert(key, handle);
            return Ok(handle);
        }

        if let Some(file) = &settings.policy_file {
            let key = RoleIdentifier::PolicyFile(file.clone());
            if let Some(&handle) = self.role_cache.get(&key) {
                return Ok(handle);
            }
            let document =
                load_policy_file(file).map_err(|e| BuildError::InvalidPolicyFile {
                    function: function.to_string(),
                    path: file.clone(),
                    reason: format!("{e:#}"),
                })?;
            let stem = Path::new(file)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| function.to_string());
            let resource_name = format!("managed-role-{stem}");
            self.claim_name(&resource_name)?;
            let handle = self.arena.add(ResourceKind::ManagedIamRole(ManagedIamRole {
                resource_name,
                role_name: format!("{}-{}-{stem}", self.config.app.name, self.stage),
                trust_policy: lambda_trust_policy(),
                policy_document: document,
            }));
            self.role_cache.insert(key, handle);
            return Ok(handle);
        }

        // Shared autogenerated role. A later function with VPC config must
        // widen the shared policy, so a cache hit still injects the trait.
        let key = RoleIdentifier::Autogen;
        if let Some(&handle) = self.role_cache.get(&key) {
            if has_vpc
                && let ResourceKind::ManagedIamRole(role) = self.arena.get_mut(handle)
            {
                inject_vpc_trait(&mut role.policy_document);
            }
            return Ok(handle);
        }

        let mut document = autogen_policy_document();
        if has_vpc {
            inject_vpc_trait(&mut document);
        }
        self.claim_name("default-role")?;
        let handle = self.arena.add(ResourceKind::ManagedIamRole(ManagedIamRole {
            resource_name: "default-role".to_string(),
            role_name: format!("{}-{}", self.config.app.name, self.stage),
            trust_policy: lambda_trust_policy(),
            policy_document: document,
        }));
        self.role_cache.insert(key, handle);
        Ok(handle)
    }

    fn add_function(
        &mut self,
        resource_name: &str,
        function_name: String,
        handler: &str,
        settings: FunctionSettings,
    ) -> Result<Handle, BuildError> {
        self.claim_name(resource_name)?;

        if settings.security_group_ids.is_empty() != settings.subnet_ids.is_empty() {
            return Err(BuildError::InvalidVpcConfig {
                function: resource_name.to_string(),
            });
        }

        let role = self.resolve_role(resource_name, &settings)?;

        Ok(self.arena.add(ResourceKind::LambdaFunction(LambdaFunction {
            resource_name: resource_name.to_string(),
            function_name,
            deployment_package: self.package,
            role,
            runtime: settings.runtime,
            handler: handler.to_string(),
            memory_size: settings.memory_size,
            timeout: settings.timeout,
            environment_variables: settings.environment_variables,
            security_group_ids: settings.security_group_ids,
            subnet_ids: settings.subnet_ids,
            layers: settings.layers,
            managed_layer: self.managed_layer,
        })))
    }

    fn build_plain_functions(&mut self) -> Result<(), BuildError> {
        for decl in &self.config.functions {
            let settings = self
                .config
                .resolve_function(self.stage, &decl.name, &decl.settings);
            let function_name = self.function_name(&decl.name);
            let handle = self.add_function(&decl.name, function_name, &decl.handler, settings)?;
            self.roots.push(handle);
        }
        Ok(())
    }

    fn build_rest_api(&mut self) -> Result<Option<Handle>, BuildError> {
        if self.config.routes.is_empty() {
            return Ok(None);
        }

        // All routes dispatch through one handler function, named after
        // the app itself.
        let settings =
            self.config
                .resolve_function(self.stage, "api_handler", &SettingsOverride::default());
        let handler_name = format!("{}-{}", self.config.app.name, self.stage);
        let handler = self.add_function("api_handler", handler_name, "app.app", settings)?;

        let mut authorizers = Vec::new();
        for decl in &self.config.authorizers {
            let settings = self
                .config
                .resolve_function(self.stage, &decl.name, &decl.settings);
            let function_name = self.function_name(&decl.name);
            let handle = self.add_function(&decl.name, function_name, &decl.handler, settings)?;
            authorizers.push(handle);
        }

        self.claim_name("rest_api")?;
        let api = self.arena.add(ResourceKind::RestApi(RestApi {
            resource_name: "rest_api".to_string(),
            swagger_doc: Placeholder::Ready(generate_swagger(
                &self.config.app.name,
                &self.config.routes,
            )),
            endpoint_type: self.config.api.endpoint_type.clone(),
            minimum_compression: self.config.api.minimum_compression,
            api_gateway_stage: self.config.api.stage_name.clone(),
            lambda_function: handler,
            authorizers,
        }));
        self.roots.push(api);
        Ok(Some(api))
    }

    fn build_websocket_api(&mut self) -> Result<Option<Handle>, BuildError> {
        let Some(decl) = &self.config.websocket else {
            return Ok(None);
        };

        let handlers = [
            ("websocket_connect", "$connect", decl.connect.as_ref()),
            ("websocket_message", "$default", decl.message.as_ref()),
            ("websocket_disconnect", "$disconnect", decl.disconnect.as_ref()),
        ];

        let mut routes = Vec::new();
        let mut handles = [None, None, None];
        for (slot, (name, route, handler)) in handlers.into_iter().enumerate() {
            if let Some(handler) = handler {
                let settings = self
                    .config
                    .resolve_function(self.stage, name, &decl.settings);
                let function_name = self.function_name(name);
                handles[slot] = Some(self.add_function(name, function_name, handler, settings)?);
                routes.push(route.to_string());
            }
        }

        self.claim_name("websocket_api")?;
        let api = self.arena.add(ResourceKind::WebsocketApi(WebsocketApi {
            resource_name: "websocket_api".to_string(),
            name: format!("{}-{}-websocket-api", self.config.app.name, self.stage),
            api_gateway_stage: self.config.api.stage_name.clone(),
            routes,
            connect: handles[0],
            message: handles[1],
            disconnect: handles[2],
        }));
        self.roots.push(api);
        Ok(Some(api))
    }

    fn build_scheduled_events(&mut self) -> Result<(), BuildError> {
        for decl in &self.config.scheduled {
            let settings = self
                .config
                .resolve_function(self.stage, &decl.name, &decl.settings);
            let function_name = self.function_name(&decl.name);
            let function = self.add_function(&decl.name, function_name, &decl.handler, settings)?;

            let resource_name = format!("{}-schedule", decl.name);
            self.claim_name(&resource_name)?;
            let event = self.arena.add(ResourceKind::ScheduledEvent(ScheduledEvent {
                resource_name,
                rule_name: format!("{}-{}-{}", self.config.app.name, self.stage, decl.name),
                schedule_expression: decl.schedule.clone(),
                lambda_function: function,
            }));
            self.roots.push(event);
        }
        Ok(())
    }

    fn build_s3_events(&mut self) -> Result<(), BuildError> {
        for decl in &self.config.s3_events {
            let settings = self
                .config
                .resolve_function(self.stage, &decl.name, &decl.settings);
            let function_name = self.function_name(&decl.name);
            let function = self.add_function(&decl.name, function_name, &decl.handler, settings)?;

            let resource_name = format!("{}-s3event", decl.name);
            self.claim_name(&resource_name)?;
            let event = self
                .arena
                .add(ResourceKind::S3BucketNotification(S3BucketNotification {
                    resource_name,
                    bucket: decl.bucket.clone(),
                    events: decl.events.clone(),
                    prefix: decl.prefix.clone(),
                    suffix: decl.suffix.clone(),
                    lambda_function: function,
                }));
            self.roots.push(event);
        }
        Ok(())
    }

    fn build_sns_subscriptions(&mut self) -> Result<(), BuildError> {
        for decl in &self.config.sns_subscriptions {
            let settings = self
                .config
                .resolve_function(self.stage, &decl.name, &decl.settings);
            let function_name = self.function_name(&decl.name);
            let function = self.add_function(&decl.name, function_name, &decl.handler, settings)?;

            let resource_name = format!("{}-sns-subscription", decl.name);
            self.claim_name(&resource_name)?;
            let event = self.arena.add(ResourceKind::SnsSubscription(SnsSubscription {
                resource_name,
                topic: decl.topic.clone(),
                lambda_function: function,
            }));
            self.roots.push(event);
        }
        Ok(())
    }

    fn build_sqs_events(&mut self) -> Result<(), BuildError> {
        for decl in &self.config.sqs_events {
            let settings = self
                .config
                .resolve_function(self.stage, &decl.name, &decl.settings);
            let function_name = self.function_name(&decl.name);
            let function = self.add_function(&decl.name, function_name, &decl.handler, settings)?;

            let resource_name = format!("{}-sqs-event-source", decl.name);
            self.claim_name(&resource_name)?;
            let event = self.arena.add(ResourceKind::SqsEventSource(SqsEventSource {
                resource_name,
                queue: decl.queue.clone(),
                batch_size: decl.batch_size,
                maximum_batching_window: decl.maximum_batching_window,
                lambda_function: function,
            }));
            self.roots.push(event);
        }
        Ok(())
    }

    fn build_kinesis_events(&mut self) -> Result<(), BuildError> {
        for decl in &self.config.kinesis_events {
            let settings = self
                .config
                .resolve_function(self.stage, &decl.name, &decl.settings);
            let function_name = self.function_name(&decl.name);
            let function = self.add_function(&decl.name, function_name, &decl.handler, settings)?;

            let resource_name = format!("{}-kinesis-event-source", decl.name);
            self.claim_name(&resource_name)?;
            let event = self.arena.add(ResourceKind::KinesisEventSource(KinesisEventSource {
                resource_name,
                stream: decl.stream.clone(),
                batch_size: decl.batch_size,
                starting_position: decl.starting_position.clone(),
                lambda_function: function,
            }));
            self.roots.push(event);
        }
        Ok(())
    }

    fn build_dynamodb_events(&mut self) -> Result<(), BuildError> {
        for decl in &self.config.dynamodb_events {
            let settings = self
                .config
                .resolve_function(self.stage, &decl.name, &decl.settings);
            let function_name = self.function_name(&decl.name);
            let function = self.add_function(&decl.name, function_name, &decl.handler, settings)?;

            let resource_name = format!("{}-ddb-event-source", decl.name);
            self.claim_name(&resource_name)?;
            let event = self.arena.add(ResourceKind::DynamoDbEventSource(DynamoDbEventSource {
                resource_name,
                stream_arn: decl.stream_arn.clone(),
                batch_size: decl.batch_size,
                starting_position: decl.starting_position.clone(),
                lambda_function: function,
            }));
            self.roots.push(event);
        }
        Ok(())
    }

    fn build_domains(
        &mut self,
        rest_api: Option<Handle>,
        websocket_api: Option<Handle>,
    ) -> Result<(), BuildError> {
        let declared = [
            (
                &self.config.api_domain,
                rest_api,
                ApiProtocol::Http,
                "api_domain",
                "api_mapping",
            ),
            (
                &self.config.websocket_domain,
                websocket_api,
                ApiProtocol::Websocket,
                "websocket_domain",
                "websocket_api_mapping",
            ),
        ];

        for (decl, api, protocol, domain_name, mapping_name) in declared {
            let Some(decl) = decl else { continue };
            let Some(api) = api else {
                return Err(BuildError::DomainWithoutApi {
                    domain: decl.domain_name.clone(),
                });
            };

            self.claim_name(domain_name)?;
            let domain = self.arena.add(ResourceKind::DomainName(DomainName {
                resource_name: domain_name.to_string(),
                protocol,
                domain_name: decl.domain_name.clone(),
                certificate_arn: decl.certificate_arn.clone(),
                tls_version: decl.tls_version.clone(),
            }));

            self.claim_name(mapping_name)?;
            let mapping = self.arena.add(ResourceKind::ApiMapping(ApiMapping {
                resource_name: mapping_name.to_string(),
                mount_path: decl.mount_path.clone(),
                domain,
                api,
            }));
            self.roots.push(mapping);
        }
        Ok(())
    }
}

/// Generate the API document describing the routed handler.
///
/// Every route proxies to the single handler function; the integration
/// URI is patched in by the provider-side import using the handler ARN,
/// so the document itself stays free of deploy-time values.
fn generate_swagger(app_name: &str, routes: &[RouteDecl]) -> Value {
    let mut paths = serde_json::Map::new();
    for route in routes {
        let mut methods = serde_json::Map::new();
        for method in &route.methods {
            methods.insert(
                method.to_lowercase(),
                json!({
                    "responses": {"200": {"description": "Success"}},
                    "x-amazon-apigateway-integration": {
                        "type": "aws_proxy",
                        "httpMethod": "POST"
                    }
                }),
            );
        }
        paths.insert(route.path.clone(), Value::Object(methods));
    }

    json!({
        "openapi": "3.0.1",
        "info": {"title": app_name, "version": "1.0"},
        "paths": paths
    })
}
