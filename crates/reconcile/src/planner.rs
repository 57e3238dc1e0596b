//! Plan generation: walk the dependency-ordered resource list and emit
//! the instruction sequence that reconciles each resource.
//!
//! Whether a resource gets a create or an update sequence is decided by
//! the previously deployed ledger, never by a live API probe: re-deploys
//! after a partial failure converge because the ledger reflects only the
//! steps that completed.

use crate::plan::{Builtin, Instruction, Param, ParamMap, Plan};
use crate::resource::{
    ApiMapping, DomainName, DynamoDbEventSource, Handle, KinesisEventSource, LambdaFunction,
    LambdaLayer, ManagedIamRole, PreCreatedIamRole, ResourceArena, ResourceKind, RestApi,
    S3BucketNotification, ScheduledEvent, SnsSubscription, SqsEventSource, WebsocketApi,
};
use crate::state::DeployedState;
use awskit::{ApiOp, Arn};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while turning resources into instructions.
#[derive(Debug, Error)]
pub enum PlanError {
    /// A build-stage value was still pending when the planner needed it
    #[error("resource {resource} has no value for {field} at plan time")]
    UnresolvedPlaceholder { resource: String, field: String },

    /// A handle pointed at a different kind than the referrer expected
    #[error("resource {resource} references a {found} where a {expected} was expected")]
    InvalidReference {
        resource: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Variable naming scheme tying steps together.
///
/// Every producer stores under `{resource_name}_{suffix}` and every
/// consumer derives the same name from the referenced resource's handle,
/// so cross-resource references never read attribute fields directly.
fn var_name(resource_name: &str, suffix: &str) -> String {
    format!("{resource_name}_{suffix}")
}

/// Turns a dependency-ordered resource list into a [`Plan`].
pub struct PlanStage<'a> {
    deployed: &'a DeployedState,
    plan: Plan,
    account_id_emitted: bool,
    region_emitted: bool,
}

impl<'a> PlanStage<'a> {
    pub fn new(deployed: &'a DeployedState) -> Self {
        Self {
            deployed,
            plan: Plan::new(),
            account_id_emitted: false,
            region_emitted: false,
        }
    }

    /// Emit instructions for every resource, in the given order.
    ///
    /// The input must already be dependency-ordered; each resource's
    /// instructions only reference variables produced by earlier entries.
    pub fn execute(
        mut self,
        arena: &ResourceArena,
        order: &[Handle],
    ) -> Result<Plan, PlanError> {
        for &handle in order {
            match arena.get(handle) {
                ResourceKind::DeploymentPackage(_) => {}
                ResourceKind::ManagedIamRole(r) => self.plan_managed_role(r),
                ResourceKind::PreCreatedIamRole(r) => self.plan_precreated_role(r),
                ResourceKind::LambdaFunction(r) => self.plan_function(arena, r)?,
                ResourceKind::LambdaLayer(r) => self.plan_layer(arena, r)?,
                ResourceKind::ScheduledEvent(r) => self.plan_scheduled_event(arena, r),
                ResourceKind::RestApi(r) => self.plan_rest_api(arena, r)?,
                ResourceKind::WebsocketApi(r) => self.plan_websocket_api(arena, r),
                ResourceKind::DomainName(r) => self.plan_domain_name(r),
                ResourceKind::ApiMapping(r) => self.plan_api_mapping(arena, r)?,
                ResourceKind::S3BucketNotification(r) => self.plan_s3_event(arena, r),
                ResourceKind::SnsSubscription(r) => self.plan_sns_subscription(arena, r),
                ResourceKind::SqsEventSource(r) => self.plan_sqs_event_source(arena, r),
                ResourceKind::KinesisEventSource(r) => self.plan_kinesis_event_source(arena, r),
                ResourceKind::DynamoDbEventSource(r) => self.plan_dynamodb_event_source(arena, r),
            }
        }
        Ok(self.plan)
    }

    fn deployed_value(&self, name: &str, key: &str) -> Option<String> {
        self.deployed
            .resource_value(name, key)
            .map(str::to_string)
    }

    /// Emit the account-id builtin once per plan.
    fn ensure_account_id(&mut self) {
        if !self.account_id_emitted {
            self.plan.push(Instruction::BuiltinFunction {
                function: Builtin::AccountId,
                output_var: "account_id".to_string(),
            });
            self.account_id_emitted = true;
        }
    }

    /// Emit the region builtin once per plan.
    fn ensure_region(&mut self) {
        if !self.region_emitted {
            self.plan.push(Instruction::BuiltinFunction {
                function: Builtin::Region,
                output_var: "region".to_string(),
            });
            self.region_emitted = true;
        }
    }

    fn record_value(&mut self, resource_type: &str, name: &str, key: &str, value: Value) {
        self.plan.push(Instruction::RecordResourceValue {
            resource_type: resource_type.to_string(),
            resource_name: name.to_string(),
            name: key.to_string(),
            value,
        });
    }

    fn record_variable(&mut self, resource_type: &str, name: &str, key: &str, variable: String) {
        self.plan.push(Instruction::RecordResourceVariable {
            resource_type: resource_type.to_string(),
            resource_name: name.to_string(),
            name: key.to_string(),
            variable_name: variable,
        });
    }

    fn plan_managed_role(&mut self, role: &ManagedIamRole) {
        let arn_var = var_name(&role.resource_name, "role_arn");

        if self.deployed.contains(&role.resource_name) {
            self.ensure_account_id();
            let mut params = ParamMap::new();
            params.insert("role_name".to_string(), Param::str(&role.role_name));
            params.insert("policy_name".to_string(), Param::str(&role.role_name));
            params.insert(
                "policy_document".to_string(),
                Param::Literal(role.policy_document.clone()),
            );
            self.plan.push_with_message(
                Instruction::ApiCall {
                    op: ApiOp::PutRolePolicy,
                    params,
                    output_var: None,
                    resource_name: role.resource_name.clone(),
                },
                format!("Updating policy for IAM role: {}", role.role_name),
            );
            self.plan.push(Instruction::StoreValue {
                name: arn_var.clone(),
                value: Param::Format {
                    template: format!("arn:aws:iam::{{account_id}}:role/{}", role.role_name),
                    vars: vec!["account_id".to_string()],
                },
            });
        } else {
            let mut params = ParamMap::new();
            params.insert("role_name".to_string(), Param::str(&role.role_name));
            params.insert(
                "trust_policy".to_string(),
                Param::Literal(role.trust_policy.clone()),
            );
            params.insert(
                "policy_document".to_string(),
                Param::Literal(role.policy_document.clone()),
            );
            self.plan.push_with_message(
                Instruction::ApiCall {
                    op: ApiOp::CreateRole,
                    params,
                    output_var: Some(arn_var.clone()),
                    resource_name: role.resource_name.clone(),
                },
                format!("Creating IAM role: {}", role.role_name),
            );
        }

        self.record_variable("iam_role", &role.resource_name, "role_arn", arn_var);
        self.record_value(
            "iam_role",
            &role.resource_name,
            "role_name",
            Value::String(role.role_name.clone()),
        );
        self.record_value(
            "iam_role",
            &role.resource_name,
            "policy_document",
            role.policy_document.clone(),
        );
    }

    fn plan_precreated_role(&mut self, role: &PreCreatedIamRole) {
        self.plan.push(Instruction::StoreValue {
            name: var_name(&role.resource_name, "role_arn"),
            value: Param::str(&role.role_arn),
        });
        self.record_value(
            "iam_role",
            &role.resource_name,
            "role_arn",
            Value::String(role.role_arn.clone()),
        );
    }

    fn plan_function(
        &mut self,
        arena: &ResourceArena,
        function: &LambdaFunction,
    ) -> Result<(), PlanError> {
        let package = match arena.get(function.deployment_package) {
            ResourceKind::DeploymentPackage(p) => p,
            other => {
                return Err(PlanError::InvalidReference {
                    resource: function.resource_name.clone(),
                    expected: "deployment_package",
                    found: other.resource_type(),
                });
            }
        };
        let filename = package.filename.ready().cloned().ok_or_else(|| {
            PlanError::UnresolvedPlaceholder {
                resource: function.resource_name.clone(),
                field: "filename".to_string(),
            }
        })?;
        let content_hash = package.content_hash.ready().cloned().ok_or_else(|| {
            PlanError::UnresolvedPlaceholder {
                resource: function.resource_name.clone(),
                field: "content_hash".to_string(),
            }
        })?;

        let role_var = var_name(arena.get(function.role).resource_name(), "role_arn");

        let mut layers: Vec<Param> = function.layers.iter().map(Param::str).collect();
        if let Some(layer) = function.managed_layer {
            layers.push(Param::var(var_name(
                arena.get(layer).resource_name(),
                "layer_version_arn",
            )));
        }

        let environment = Value::Object(
            function
                .environment_variables
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        );

        let mut params = ParamMap::new();
        params.insert(
            "function_name".to_string(),
            Param::str(&function.function_name),
        );
        params.insert("role_arn".to_string(), Param::var(role_var));
        params.insert("code_path".to_string(), Param::str(filename));
        params.insert("code_hash".to_string(), Param::str(content_hash));
        params.insert("runtime".to_string(), Param::str(&function.runtime));
        params.insert("handler".to_string(), Param::str(&function.handler));
        params.insert(
            "memory_size".to_string(),
            Param::int(u64::from(function.memory_size)),
        );
        params.insert(
            "timeout".to_string(),
            Param::int(u64::from(function.timeout)),
        );
        params.insert(
            "environment_variables".to_string(),
            Param::Literal(environment),
        );
        params.insert(
            "security_group_ids".to_string(),
            Param::List(function.security_group_ids.iter().map(Param::str).collect()),
        );
        params.insert(
            "subnet_ids".to_string(),
            Param::List(function.subnet_ids.iter().map(Param::str).collect()),
        );
        params.insert("layers".to_string(), Param::List(layers));

        let arn_var = var_name(&function.resource_name, "lambda_arn");
        let (op, verb) = if self.deployed.contains(&function.resource_name) {
            (ApiOp::UpdateFunction, "Updating")
        } else {
            (ApiOp::CreateFunction, "Creating")
        };
        self.plan.push_with_message(
            Instruction::ApiCall {
                op,
                params,
                output_var: Some(arn_var.clone()),
                resource_name: function.resource_name.clone(),
            },
            format!("{verb} lambda function: {}", function.function_name),
        );

        self.record_variable(
            "lambda_function",
            &function.resource_name,
            "lambda_arn",
            arn_var,
        );
        self.record_value(
            "lambda_function",
            &function.resource_name,
            "function_name",
            Value::String(function.function_name.clone()),
        );
        Ok(())
    }

    fn plan_layer(&mut self, arena: &ResourceArena, layer: &LambdaLayer) -> Result<(), PlanError> {
        let package = match arena.get(layer.deployment_package) {
            ResourceKind::DeploymentPackage(p) => p,
            other => {
                return Err(PlanError::InvalidReference {
                    resource: layer.resource_name.clone(),
                    expected: "deployment_package",
                    found: other.resource_type(),
                });
            }
        };
        let filename = package.filename.ready().cloned().ok_or_else(|| {
            PlanError::UnresolvedPlaceholder {
                resource: layer.resource_name.clone(),
                field: "filename".to_string(),
            }
        })?;
        let content_hash = package.content_hash.ready().cloned().ok_or_else(|| {
            PlanError::UnresolvedPlaceholder {
                resource: layer.resource_name.clone(),
                field: "content_hash".to_string(),
            }
        })?;

        let mut params = ParamMap::new();
        params.insert("layer_name".to_string(), Param::str(&layer.layer_name));
        params.insert("runtime".to_string(), Param::str(&layer.runtime));
        params.insert("code_path".to_string(), Param::str(filename));
        params.insert("code_hash".to_string(), Param::str(content_hash));

        let arn_var = var_name(&layer.resource_name, "layer_version_arn");
        self.plan.push_with_message(
            Instruction::ApiCall {
                op: ApiOp::PublishLayerVersion,
                params,
                output_var: Some(arn_var.clone()),
                resource_name: layer.resource_name.clone(),
            },
            format!("Publishing layer: {}", layer.layer_name),
        );
        self.record_variable(
            "lambda_layer",
            &layer.resource_name,
            "layer_version_arn",
            arn_var,
        );
        Ok(())
    }

    fn plan_scheduled_event(&mut self, arena: &ResourceArena, event: &ScheduledEvent) {
        let function_var = var_name(arena.get(event.lambda_function).resource_name(), "lambda_arn");
        let rule_var = var_name(&event.resource_name, "rule_arn");

        let verb = if self.deployed.contains(&event.resource_name) {
            "Updating"
        } else {
            "Creating"
        };

        let mut params = ParamMap::new();
        params.insert("rule_name".to_string(), Param::str(&event.rule_name));
        params.insert(
            "schedule_expression".to_string(),
            Param::str(&event.schedule_expression),
        );
        self.plan.push_with_message(
            Instruction::ApiCall {
                op: ApiOp::PutRule,
                params,
                output_var: Some(rule_var.clone()),
                resource_name: event.resource_name.clone(),
            },
            format!("{verb} schedule rule: {}", event.rule_name),
        );

        let mut params = ParamMap::new();
        params.insert("rule_name".to_string(), Param::str(&event.rule_name));
        params.insert("rule_arn".to_string(), Param::var(rule_var));
        params.insert("function_arn".to_string(), Param::var(function_var));
        self.plan.push(Instruction::ApiCall {
            op: ApiOp::ConnectRuleToFunction,
            params,
            output_var: None,
            resource_name: event.resource_name.clone(),
        });

        self.record_value(
            "scheduled_event",
            &event.resource_name,
            "rule_name",
            Value::String(event.rule_name.clone()),
        );
    }

    fn plan_rest_api(&mut self, arena: &ResourceArena, api: &RestApi) -> Result<(), PlanError> {
        let swagger = api.swagger_doc.ready().cloned().ok_or_else(|| {
            PlanError::UnresolvedPlaceholder {
                resource: api.resource_name.clone(),
                field: "swagger_doc".to_string(),
            }
        })?;

        self.ensure_region();
        self.ensure_account_id();

        let id_var = var_name(&api.resource_name, "rest_api_id");

        match self.deployed_value(&api.resource_name, "rest_api_id") {
            Some(existing_id) => {
                self.plan.push(Instruction::StoreValue {
                    name: id_var.clone(),
                    value: Param::str(existing_id),
                });
                let mut params = ParamMap::new();
                params.insert("rest_api_id".to_string(), Param::var(id_var.clone()));
                params.insert("swagger_doc".to_string(), Param::Literal(swagger));
                params.insert("endpoint_type".to_string(), Param::str(&api.endpoint_type));
                if let Some(compression) = api.minimum_compression {
                    params.insert(
                        "minimum_compression".to_string(),
                        Param::int(u64::from(compression)),
                    );
                }
                self.plan.push_with_message(
                    Instruction::ApiCall {
                        op: ApiOp::UpdateRestApi,
                        params,
                        output_var: None,
                        resource_name: api.resource_name.clone(),
                    },
                    "Updating Rest API",
                );
            }
            None => {
                let mut params = ParamMap::new();
                params.insert("swagger_doc".to_string(), Param::Literal(swagger));
                params.insert("endpoint_type".to_string(), Param::str(&api.endpoint_type));
                if let Some(compression) = api.minimum_compression {
                    params.insert(
                        "minimum_compression".to_string(),
                        Param::int(u64::from(compression)),
                    );
                }
                self.plan.push_with_message(
                    Instruction::ApiCall {
                        op: ApiOp::ImportRestApi,
                        params,
                        output_var: Some(id_var.clone()),
                        resource_name: api.resource_name.clone(),
                    },
                    "Creating Rest API",
                );
            }
        }

        // The gateway needs invoke permission on the handler and on every
        // authorizer it calls.
        let mut targets = vec![api.lambda_function];
        targets.extend(&api.authorizers);
        for target in targets {
            let function_var = var_name(arena.get(target).resource_name(), "lambda_arn");
            let mut params = ParamMap::new();
            params.insert("action".to_string(), Param::str("lambda:InvokeFunction"));
            params.insert(
                "principal".to_string(),
                Param::str("apigateway.amazonaws.com"),
            );
            params.insert("function_arn".to_string(), Param::var(function_var));
            params.insert(
                "source_arn".to_string(),
                Param::Format {
                    template: format!(
                        "arn:aws:execute-api:{{region}}:{{account_id}}:{{{id_var}}}/*"
                    ),
                    vars: vec![
                        "region".to_string(),
                        "account_id".to_string(),
                        id_var.clone(),
                    ],
                },
            );
            self.plan.push(Instruction::ApiCall {
                op: ApiOp::AddPermission,
                params,
                output_var: None,
                resource_name: api.resource_name.clone(),
            });
        }

        let mut params = ParamMap::new();
        params.insert("rest_api_id".to_string(), Param::var(id_var.clone()));
        params.insert(
            "api_gateway_stage".to_string(),
            Param::str(&api.api_gateway_stage),
        );
        self.plan.push_with_message(
            Instruction::ApiCall {
                op: ApiOp::DeployRestApi,
                params,
                output_var: None,
                resource_name: api.resource_name.clone(),
            },
            "Deploying Rest API",
        );

        let url_var = var_name(&api.resource_name, "rest_api_url");
        self.plan.push(Instruction::StoreValue {
            name: url_var.clone(),
            value: Param::Format {
                template: format!(
                    "https://{{{id_var}}}.execute-api.{{region}}.amazonaws.com/{}/",
                    api.api_gateway_stage
                ),
                vars: vec![id_var.clone(), "region".to_string()],
            },
        });

        self.record_variable("rest_api", &api.resource_name, "rest_api_id", id_var);
        self.record_variable("rest_api", &api.resource_name, "rest_api_url", url_var);
        Ok(())
    }

    fn plan_websocket_api(&mut self, arena: &ResourceArena, api: &WebsocketApi) {
        self.ensure_region();
        self.ensure_account_id();

        let id_var = var_name(&api.resource_name, "websocket_api_id");

        match self.deployed_value(&api.resource_name, "websocket_api_id") {
            Some(existing_id) => {
                self.plan.push(Instruction::StoreValue {
                    name: id_var.clone(),
                    value: Param::str(existing_id),
                });
            }
            None => {
                let mut params = ParamMap::new();
                params.insert("name".to_string(), Param::str(&api.name));
                self.plan.push_with_message(
                    Instruction::ApiCall {
                        op: ApiOp::CreateWebsocketApi,
                        params,
                        output_var: Some(id_var.clone()),
                        resource_name: api.resource_name.clone(),
                    },
                    format!("Creating websocket API: {}", api.name),
                );
            }
        }

        let handlers = [
            ("connect_arn", api.connect),
            ("message_arn", api.message),
            ("disconnect_arn", api.disconnect),
        ];

        let mut params = ParamMap::new();
        params.insert("api_id".to_string(), Param::var(id_var.clone()));
        params.insert(
            "routes".to_string(),
            Param::List(api.routes.iter().map(Param::str).collect()),
        );
        for (key, handle) in handlers {
            if let Some(handle) = handle {
                let function_var = var_name(arena.get(handle).resource_name(), "lambda_arn");
                params.insert(key.to_string(), Param::var(function_var));
            }
        }
        self.plan.push_with_message(
            Instruction::ApiCall {
                op: ApiOp::ConfigureWebsocketIntegrations,
                params,
                output_var: None,
                resource_name: api.resource_name.clone(),
            },
            "Configuring websocket routes",
        );

        for (_, handle) in handlers {
            if let Some(handle) = handle {
                let function_var = var_name(arena.get(handle).resource_name(), "lambda_arn");
                let mut params = ParamMap::new();
                params.insert("action".to_string(), Param::str("lambda:InvokeFunction"));
                params.insert(
                    "principal".to_string(),
                    Param::str("apigateway.amazonaws.com"),
                );
                params.insert("function_arn".to_string(), Param::var(function_var));
                params.insert(
                    "source_arn".to_string(),
                    Param::Format {
                        template: format!(
                            "arn:aws:execute-api:{{region}}:{{account_id}}:{{{id_var}}}/*"
                        ),
                        vars: vec![
                            "region".to_string(),
                            "account_id".to_string(),
                            id_var.clone(),
                        ],
                    },
                );
                self.plan.push(Instruction::ApiCall {
                    op: ApiOp::AddPermission,
                    params,
                    output_var: None,
                    resource_name: api.resource_name.clone(),
                });
            }
        }

        let mut params = ParamMap::new();
        params.insert("api_id".to_string(), Param::var(id_var.clone()));
        params.insert(
            "api_gateway_stage".to_string(),
            Param::str(&api.api_gateway_stage),
        );
        self.plan.push_with_message(
            Instruction::ApiCall {
                op: ApiOp::DeployWebsocketApi,
                params,
                output_var: None,
                resource_name: api.resource_name.clone(),
            },
            "Deploying websocket API",
        );

        let url_var = var_name(&api.resource_name, "websocket_api_url");
        self.plan.push(Instruction::StoreValue {
            name: url_var.clone(),
            value: Param::Format {
                template: format!(
                    "wss://{{{id_var}}}.execute-api.{{region}}.amazonaws.com/{}",
                    api.api_gateway_stage
                ),
                vars: vec![id_var.clone(), "region".to_string()],
            },
        });

        self.record_variable(
            "websocket_api",
            &api.resource_name,
            "websocket_api_id",
            id_var,
        );
        self.record_variable(
            "websocket_api",
            &api.resource_name,
            "websocket_api_url",
            url_var,
        );
    }

    fn plan_domain_name(&mut self, domain: &DomainName) {
        let mut params = ParamMap::new();
        params.insert("protocol".to_string(), Param::str(domain.protocol.as_str()));
        params.insert("domain_name".to_string(), Param::str(&domain.domain_name));
        params.insert(
            "certificate_arn".to_string(),
            Param::str(&domain.certificate_arn),
        );
        if let Some(tls) = &domain.tls_version {
            params.insert("tls_version".to_string(), Param::str(tls));
        }

        let (op, verb) = if self.deployed.contains(&domain.resource_name) {
            (ApiOp::UpdateDomainName, "Updating")
        } else {
            (ApiOp::CreateDomainName, "Creating")
        };
        self.plan.push_with_message(
            Instruction::ApiCall {
                op,
                params,
                output_var: None,
                resource_name: domain.resource_name.clone(),
            },
            format!("{verb} custom domain: {}", domain.domain_name),
        );

        self.record_value(
            "domain_name",
            &domain.resource_name,
            "domain_name",
            Value::String(domain.domain_name.clone()),
        );
    }

    fn plan_api_mapping(
        &mut self,
        arena: &ResourceArena,
        mapping: &ApiMapping,
    ) -> Result<(), PlanError> {
        let domain = match arena.get(mapping.domain) {
            ResourceKind::DomainName(d) => d,
            other => {
                return Err(PlanError::InvalidReference {
                    resource: mapping.resource_name.clone(),
                    expected: "domain_name",
                    found: other.resource_type(),
                });
            }
        };
        let (api_id_var, stage) = match arena.get(mapping.api) {
            ResourceKind::RestApi(api) => (
                var_name(&api.resource_name, "rest_api_id"),
                api.api_gateway_stage.clone(),
            ),
            ResourceKind::WebsocketApi(api) => (
                var_name(&api.resource_name, "websocket_api_id"),
                api.api_gateway_stage.clone(),
            ),
            other => {
                return Err(PlanError::InvalidReference {
                    resource: mapping.resource_name.clone(),
                    expected: "rest_api",
                    found: other.resource_type(),
                });
            }
        };

        let id_var = var_name(&mapping.resource_name, "api_mapping_id");
        match self.deployed_value(&mapping.resource_name, "api_mapping_id") {
            Some(existing_id) => {
                self.plan.push(Instruction::StoreValue {
                    name: id_var.clone(),
                    value: Param::str(existing_id),
                });
            }
            None => {
                let mut params = ParamMap::new();
                params.insert("domain_name".to_string(), Param::str(&domain.domain_name));
                params.insert("path_key".to_string(), Param::str(&mapping.mount_path));
                params.insert("api_id".to_string(), Param::var(api_id_var));
                params.insert("stage".to_string(), Param::str(stage));
                self.plan.push_with_message(
                    Instruction::ApiCall {
                        op: ApiOp::CreateApiMapping,
                        params,
                        output_var: Some(id_var.clone()),
                        resource_name: mapping.resource_name.clone(),
                    },
                    format!(
                        "Mounting API under {}/{}",
                        domain.domain_name, mapping.mount_path
                    ),
                );
            }
        }

        self.record_variable(
            "api_mapping",
            &mapping.resource_name,
            "api_mapping_id",
            id_var,
        );
        self.record_value(
            "api_mapping",
            &mapping.resource_name,
            "domain_name",
            Value::String(domain.domain_name.clone()),
        );
        Ok(())
    }

    fn plan_s3_event(&mut self, arena: &ResourceArena, event: &S3BucketNotification) {
        self.ensure_account_id();
        let function_var = var_name(arena.get(event.lambda_function).resource_name(), "lambda_arn");

        let mut params = ParamMap::new();
        params.insert("bucket".to_string(), Param::str(&event.bucket));
        params.insert("function_arn".to_string(), Param::var(function_var.clone()));
        params.insert("account_id".to_string(), Param::var("account_id"));
        self.plan.push(Instruction::ApiCall {
            op: ApiOp::AddPermissionForS3Event,
            params,
            output_var: None,
            resource_name: event.resource_name.clone(),
        });

        let mut params = ParamMap::new();
        params.insert("bucket".to_string(), Param::str(&event.bucket));
        params.insert("function_arn".to_string(), Param::var(function_var.clone()));
        params.insert(
            "events".to_string(),
            Param::List(event.events.iter().map(Param::str).collect()),
        );
        if let Some(prefix) = &event.prefix {
            params.insert("prefix".to_string(), Param::str(prefix));
        }
        if let Some(suffix) = &event.suffix {
            params.insert("suffix".to_string(), Param::str(suffix));
        }
        self.plan.push_with_message(
            Instruction::ApiCall {
                op: ApiOp::ConnectS3BucketToFunction,
                params,
                output_var: None,
                resource_name: event.resource_name.clone(),
            },
            format!("Configuring S3 events in bucket: {}", event.bucket),
        );

        self.record_value(
            "s3_event",
            &event.resource_name,
            "bucket",
            Value::String(event.bucket.clone()),
        );
        self.record_variable("s3_event", &event.resource_name, "lambda_arn", function_var);
    }

    fn plan_sns_subscription(&mut self, arena: &ResourceArena, event: &SnsSubscription) {
        let function_var = var_name(arena.get(event.lambda_function).resource_name(), "lambda_arn");
        let topic_arn_var = var_name(&event.resource_name, "topic_arn");

        let topic_param = if Arn::is_arn(&event.topic) {
            Param::str(&event.topic)
        } else {
            self.ensure_region();
            self.ensure_account_id();
            Param::Format {
                template: format!("arn:aws:sns:{{region}}:{{account_id}}:{}", event.topic),
                vars: vec!["region".to_string(), "account_id".to_string()],
            }
        };
        self.plan.push(Instruction::StoreValue {
            name: topic_arn_var.clone(),
            value: topic_param,
        });

        let mut params = ParamMap::new();
        params.insert("topic_arn".to_string(), Param::var(topic_arn_var.clone()));
        params.insert("function_arn".to_string(), Param::var(function_var.clone()));
        self.plan.push(Instruction::ApiCall {
            op: ApiOp::AddPermissionForSnsTopic,
            params,
            output_var: None,
            resource_name: event.resource_name.clone(),
        });

        let subscription_var = var_name(&event.resource_name, "subscription_arn");
        let mut params = ParamMap::new();
        params.insert("topic_arn".to_string(), Param::var(topic_arn_var.clone()));
        params.insert("function_arn".to_string(), Param::var(function_var.clone()));
        self.plan.push_with_message(
            Instruction::ApiCall {
                op: ApiOp::SubscribeFunctionToTopic,
                params,
                output_var: Some(subscription_var.clone()),
                resource_name: event.resource_name.clone(),
            },
            format!("Subscribing to SNS topic: {}", event.topic),
        );

        self.record_value(
            "sns_event",
            &event.resource_name,
            "topic",
            Value::String(event.topic.clone()),
        );
        self.record_variable(
            "sns_event",
            &event.resource_name,
            "topic_arn",
            topic_arn_var,
        );
        self.record_variable(
            "sns_event",
            &event.resource_name,
            "subscription_arn",
            subscription_var,
        );
        self.record_variable("sns_event", &event.resource_name, "lambda_arn", function_var);
    }

    fn plan_sqs_event_source(&mut self, arena: &ResourceArena, event: &SqsEventSource) {
        let function_var = var_name(arena.get(event.lambda_function).resource_name(), "lambda_arn");

        let queue_arn = if Arn::is_arn(&event.queue) {
            Param::str(&event.queue)
        } else {
            self.ensure_region();
            self.ensure_account_id();
            Param::Format {
                template: format!("arn:aws:sqs:{{region}}:{{account_id}}:{}", event.queue),
                vars: vec!["region".to_string(), "account_id".to_string()],
            }
        };

        let uuid_var = var_name(&event.resource_name, "event_uuid");
        match self.deployed_value(&event.resource_name, "event_uuid") {
            Some(existing_uuid) => {
                self.plan.push(Instruction::StoreValue {
                    name: uuid_var.clone(),
                    value: Param::str(existing_uuid.clone()),
                });
                let mut params = ParamMap::new();
                params.insert("event_uuid".to_string(), Param::str(existing_uuid));
                params.insert(
                    "batch_size".to_string(),
                    Param::int(u64::from(event.batch_size)),
                );
                params.insert(
                    "maximum_batching_window".to_string(),
                    Param::int(u64::from(event.maximum_batching_window)),
                );
                self.plan.push_with_message(
                    Instruction::ApiCall {
                        op: ApiOp::UpdateSqsEventSource,
                        params,
                        output_var: None,
                        resource_name: event.resource_name.clone(),
                    },
                    format!("Updating SQS event source: {}", event.queue),
                );
            }
            None => {
                let mut params = ParamMap::new();
                params.insert("queue_arn".to_string(), queue_arn);
                params.insert("function_arn".to_string(), Param::var(function_var.clone()));
                params.insert(
                    "batch_size".to_string(),
                    Param::int(u64::from(event.batch_size)),
                );
                params.insert(
                    "maximum_batching_window".to_string(),
                    Param::int(u64::from(event.maximum_batching_window)),
                );
                self.plan.push_with_message(
                    Instruction::ApiCall {
                        op: ApiOp::CreateSqsEventSource,
                        params,
                        output_var: Some(uuid_var.clone()),
                        resource_name: event.resource_name.clone(),
                    },
                    format!("Creating SQS event source: {}", event.queue),
                );
            }
        }

        self.record_value(
            "sqs_event",
            &event.resource_name,
            "queue",
            Value::String(event.queue.clone()),
        );
        self.record_variable("sqs_event", &event.resource_name, "event_uuid", uuid_var);
        self.record_variable("sqs_event", &event.resource_name, "lambda_arn", function_var);
    }

    fn plan_kinesis_event_source(&mut self, arena: &ResourceArena, event: &KinesisEventSource) {
        let function_var = var_name(arena.get(event.lambda_function).resource_name(), "lambda_arn");

        let stream_arn = if Arn::is_arn(&event.stream) {
            Param::str(&event.stream)
        } else {
            self.ensure_region();
            self.ensure_account_id();
            Param::Format {
                template: format!(
                    "arn:aws:kinesis:{{region}}:{{account_id}}:stream/{}",
                    event.stream
                ),
                vars: vec!["region".to_string(), "account_id".to_string()],
            }
        };

        let uuid_var = var_name(&event.resource_name, "event_uuid");
        match self.deployed_value(&event.resource_name, "event_uuid") {
            Some(existing_uuid) => {
                self.plan.push(Instruction::StoreValue {
                    name: uuid_var.clone(),
                    value: Param::str(existing_uuid.clone()),
                });
                let mut params = ParamMap::new();
                params.insert("event_uuid".to_string(), Param::str(existing_uuid));
                params.insert(
                    "batch_size".to_string(),
                    Param::int(u64::from(event.batch_size)),
                );
                params.insert(
                    "starting_position".to_string(),
                    Param::str(&event.starting_position),
                );
                self.plan.push_with_message(
                    Instruction::ApiCall {
                        op: ApiOp::UpdateKinesisEventSource,
                        params,
                        output_var: None,
                        resource_name: event.resource_name.clone(),
                    },
                    format!("Updating Kinesis event source: {}", event.stream),
                );
            }
            None => {
                let mut params = ParamMap::new();
                params.insert("stream_arn".to_string(), stream_arn);
                params.insert("function_arn".to_string(), Param::var(function_var.clone()));
                params.insert(
                    "batch_size".to_string(),
                    Param::int(u64::from(event.batch_size)),
                );
                params.insert(
                    "starting_position".to_string(),
                    Param::str(&event.starting_position),
                );
                self.plan.push_with_message(
                    Instruction::ApiCall {
                        op: ApiOp::CreateKinesisEventSource,
                        params,
                        output_var: Some(uuid_var.clone()),
                        resource_name: event.resource_name.clone(),
                    },
                    format!("Creating Kinesis event source: {}", event.stream),
                );
            }
        }

        self.record_value(
            "kinesis_event",
            &event.resource_name,
            "stream",
            Value::String(event.stream.clone()),
        );
        self.record_variable("kinesis_event", &event.resource_name, "event_uuid", uuid_var);
        self.record_variable(
            "kinesis_event",
            &event.resource_name,
            "lambda_arn",
            function_var,
        );
    }

    fn plan_dynamodb_event_source(&mut self, arena: &ResourceArena, event: &DynamoDbEventSource) {
        let function_var = var_name(arena.get(event.lambda_function).resource_name(), "lambda_arn");

        let uuid_var = var_name(&event.resource_name, "event_uuid");
        match self.deployed_value(&event.resource_name, "event_uuid") {
            Some(existing_uuid) => {
                self.plan.push(Instruction::StoreValue {
                    name: uuid_var.clone(),
                    value: Param::str(existing_uuid.clone()),
                });
                let mut params = ParamMap::new();
                params.insert("event_uuid".to_string(), Param::str(existing_uuid));
                params.insert(
                    "batch_size".to_string(),
                    Param::int(u64::from(event.batch_size)),
                );
                params.insert(
                    "starting_position".to_string(),
                    Param::str(&event.starting_position),
                );
                self.plan.push_with_message(
                    Instruction::ApiCall {
                        op: ApiOp::UpdateDynamodbEventSource,
                        params,
                        output_var: None,
                        resource_name: event.resource_name.clone(),
                    },
                    format!("Updating DynamoDB event source: {}", event.stream_arn),
                );
            }
            None => {
                let mut params = ParamMap::new();
                params.insert("stream_arn".to_string(), Param::str(&event.stream_arn));
                params.insert("function_arn".to_string(), Param::var(function_var.clone()));
                params.insert(
                    "batch_size".to_string(),
                    Param::int(u64::from(event.batch_size)),
                );
                params.insert(
                    "starting_position".to_string(),
                    Param::str(&event.starting_position),
                );
                self.plan.push_with_message(
                    Instruction::ApiCall {
                        op: ApiOp::CreateDynamodbEventSource,
                        params,
                        output_var: Some(uuid_var.clone()),
                        resource_name: event.resource_name.clone(),
                    },
                    format!("Creating DynamoDB event source: {}", event.stream_arn),
                );
            }
        }

        self.record_value(
            "dynamodb_event",
            &event.resource_name,
            "stream_arn",
            Value::String(event.stream_arn.clone()),
        );
        self.record_variable("dynamodb_event", &event.resource_name, "event_uuid", uuid_var);
        self.record_variable(
            "dynamodb_event",
            &event.resource_name,
            "lambda_arn",
            function_var,
        );
    }
}
