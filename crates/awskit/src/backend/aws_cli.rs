//! Cloud backend that shells out to the `aws` command line tool.
//!
//! Each engine operation maps onto one or two CLI invocations with JSON
//! output. The CLI owns credentials, signing, and request shapes; this
//! module only translates parameters and classifies failures.

use crate::client::{CloudClient, Params};
use crate::error::{AwsError, Result};
use crate::types::ApiOp;
use serde_json::{Value, json};
use std::process::Command;

/// Backend that executes real `aws` commands.
pub struct AwsCliBackend {
    /// Path to the aws executable
    aws_path: String,
    region: String,
}

impl AwsCliBackend {
    /// Create a new backend.
    ///
    /// Fails if the `aws` tool is not on PATH or no region is configured
    /// in the environment.
    pub fn new() -> Result<Self> {
        let aws_path = "aws".to_string();
        let probe = Command::new(&aws_path).arg("--version").output();
        if !probe.map(|o| o.status.success()).unwrap_or(false) {
            return Err(AwsError::Other(
                "aws CLI not found. Install it from https://aws.amazon.com/cli/".to_string(),
            ));
        }

        let region = std::env::var("AWS_REGION")
            .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
            .map_err(|_| AwsError::InvalidRequest {
                message: "no region configured (set AWS_REGION)".to_string(),
            })?;

        Ok(Self { aws_path, region })
    }

    /// Run an aws command and parse its JSON output.
    fn run(&self, args: &[String]) -> Result<Value> {
        log::trace!("aws {}", args.join(" "));
        let output = Command::new(&self.aws_path)
            .args(args)
            .args(["--output", "json", "--region", &self.region])
            .output()
            .map_err(|e| AwsError::Other(format!("failed to execute aws: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_cli_error(&stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(stdout.trim())?)
    }

    /// Run a command whose target may legitimately already be configured.
    fn run_tolerating_conflict(&self, args: &[String]) -> Result<Value> {
        match self.run(args) {
            Err(AwsError::Other(message)) if message.contains("ResourceConflictException") => {
                log::debug!("already configured, continuing: {message}");
                Ok(Value::Null)
            }
            other => other,
        }
    }
}

/// Classify an aws CLI failure line like
/// `An error occurred (ThrottlingException) when calling ...`.
fn classify_cli_error(stderr: &str) -> AwsError {
    let code = stderr
        .split_once("An error occurred (")
        .and_then(|(_, rest)| rest.split_once(')'))
        .map(|(code, _)| code);
    match code {
        Some(code) => AwsError::from_service_code(code, stderr.trim()),
        None => AwsError::Other(stderr.trim().to_string()),
    }
}

fn s(params: &Params, key: &str) -> String {
    params
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn n(params: &Params, key: &str) -> String {
    params
        .get(key)
        .and_then(Value::as_u64)
        .unwrap_or_default()
        .to_string()
}

fn j(params: &Params, key: &str) -> String {
    params.get(key).cloned().unwrap_or(Value::Null).to_string()
}

fn strings(params: &Params, key: &str) -> Vec<String> {
    params
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

impl AwsCliBackend {
    fn create_or_update_function(&self, op: ApiOp, params: &Params) -> Result<Value> {
        let function_name = s(params, "function_name");
        let zip = format!("fileb://{}", s(params, "code_path"));
        let environment = json!({"Variables": params.get("environment_variables")}).to_string();

        let mut config_args = args(&[
            "lambda",
            if op == ApiOp::CreateFunction {
                "create-function"
            } else {
                "update-function-configuration"
            },
            "--function-name",
            &function_name,
            "--runtime",
            &s(params, "runtime"),
            "--handler",
            &s(params, "handler"),
            "--role",
            &s(params, "role_arn"),
            "--timeout",
            &n(params, "timeout"),
            "--memory-size",
            &n(params, "memory_size"),
            "--environment",
            &environment,
        ]);
        let subnets = strings(params, "subnet_ids");
        if !subnets.is_empty() {
            let vpc = format!(
                "SubnetIds={},SecurityGroupIds={}",
                subnets.join(","),
                strings(params, "security_group_ids").join(",")
            );
            config_args.push("--vpc-config".to_string());
            config_args.push(vpc);
        }
        let layers = strings(params, "layers");
        if !layers.is_empty() {
            config_args.push("--layers".to_string());
            config_args.extend(layers);
        }

        if op == ApiOp::CreateFunction {
            config_args.push("--zip-file".to_string());
            config_args.push(zip);
            let response = self.run(&config_args)?;
            return Ok(response["FunctionArn"].clone());
        }

        self.run(&args(&[
            "lambda",
            "update-function-code",
            "--function-name",
            &function_name,
            "--zip-file",
            &zip,
        ]))?;
        let response = self.run(&config_args)?;
        Ok(response["FunctionArn"].clone())
    }

    fn add_permission(
        &self,
        params: &Params,
        principal: &str,
        statement_id: &str,
        source_key: Option<&str>,
    ) -> Result<Value> {
        let mut call = args(&[
            "lambda",
            "add-permission",
            "--function-name",
            &s(params, "function_arn"),
            "--action",
            "lambda:InvokeFunction",
            "--principal",
            principal,
            "--statement-id",
            statement_id,
        ]);
        match source_key {
            Some("source_account") => {
                call.push("--source-account".to_string());
                call.push(s(params, "account_id"));
            }
            Some(key) => {
                call.push("--source-arn".to_string());
                call.push(s(params, key));
            }
            None => {}
        }
        self.run_tolerating_conflict(&call)?;
        Ok(Value::Null)
    }

    fn remove_permission(&self, params: &Params, statement_id: &str) -> Result<Value> {
        self.run(&args(&[
            "lambda",
            "remove-permission",
            "--function-name",
            &s(params, "function_arn"),
            "--statement-id",
            statement_id,
        ]))
    }

    fn configure_websocket_integrations(&self, params: &Params) -> Result<Value> {
        let api_id = s(params, "api_id");
        let handlers = [
            ("connect_arn", "$connect"),
            ("message_arn", "$default"),
            ("disconnect_arn", "$disconnect"),
        ];
        for (key, route_key) in handlers {
            let Some(arn) = params.get(key).and_then(Value::as_str) else {
                continue;
            };
            let response = self.run(&args(&[
                "apigatewayv2",
                "create-integration",
                "--api-id",
                &api_id,
                "--integration-type",
                "AWS_PROXY",
                "--integration-uri",
                arn,
            ]))?;
            let integration_id = response["IntegrationId"].as_str().unwrap_or_default();
            self.run_tolerating_conflict(&args(&[
                "apigatewayv2",
                "create-route",
                "--api-id",
                &api_id,
                "--route-key",
                route_key,
                "--target",
                &format!("integrations/{integration_id}"),
            ]))?;
        }
        Ok(Value::Null)
    }

    fn event_source_mapping(&self, op: ApiOp, params: &Params) -> Result<Value> {
        match op {
            ApiOp::CreateSqsEventSource
            | ApiOp::CreateKinesisEventSource
            | ApiOp::CreateDynamodbEventSource => {
                let source_arn_key = if op == ApiOp::CreateSqsEventSource {
                    "queue_arn"
                } else {
                    "stream_arn"
                };
                let mut call = args(&[
                    "lambda",
                    "create-event-source-mapping",
                    "--event-source-arn",
                    &s(params, source_arn_key),
                    "--function-name",
                    &s(params, "function_arn"),
                    "--batch-size",
                    &n(params, "batch_size"),
                ]);
                if params.contains_key("starting_position") {
                    call.push("--starting-position".to_string());
                    call.push(s(params, "starting_position"));
                }
                if params.contains_key("maximum_batching_window") {
                    call.push("--maximum-batching-window-in-seconds".to_string());
                    call.push(n(params, "maximum_batching_window"));
                }
                let response = self.run(&call)?;
                Ok(response["UUID"].clone())
            }
            ApiOp::UpdateSqsEventSource
            | ApiOp::UpdateKinesisEventSource
            | ApiOp::UpdateDynamodbEventSource => self.run(&args(&[
                "lambda",
                "update-event-source-mapping",
                "--uuid",
                &s(params, "event_uuid"),
                "--batch-size",
                &n(params, "batch_size"),
            ])),
            _ => self.run(&args(&[
                "lambda",
                "delete-event-source-mapping",
                "--uuid",
                &s(params, "event_uuid"),
            ])),
        }
    }
}

impl CloudClient for AwsCliBackend {
    fn call(&self, op: ApiOp, params: &Params) -> Result<Value> {
        match op {
            ApiOp::CreateFunction | ApiOp::UpdateFunction => {
                self.create_or_update_function(op, params)
            }
            ApiOp::DeleteFunction => self.run(&args(&[
                "lambda",
                "delete-function",
                "--function-name",
                &s(params, "function_name"),
            ])),
            ApiOp::AddPermission => {
                self.add_permission(params, "apigateway.amazonaws.com", "jangada-api", Some("source_arn"))
            }
            ApiOp::RemovePermission => self.remove_permission(params, "jangada-api"),
            ApiOp::PublishLayerVersion => {
                let response = self.run(&args(&[
                    "lambda",
                    "publish-layer-version",
                    "--layer-name",
                    &s(params, "layer_name"),
                    "--zip-file",
                    &format!("fileb://{}", s(params, "code_path")),
                    "--compatible-runtimes",
                    &s(params, "runtime"),
                ]))?;
                Ok(response["LayerVersionArn"].clone())
            }
            ApiOp::DeleteLayerVersion => {
                // arn:aws:lambda:region:account:layer:<name>:<version>
                let arn = s(params, "layer_version_arn");
                let mut parts = arn.rsplit(':');
                let version = parts.next().unwrap_or("1").to_string();
                let name = parts.next().unwrap_or_default().to_string();
                self.run(&args(&[
                    "lambda",
                    "delete-layer-version",
                    "--layer-name",
                    &name,
                    "--version-number",
                    &version,
                ]))
            }
            ApiOp::CreateRole => {
                let role_name = s(params, "role_name");
                let response = self.run(&args(&[
                    "iam",
                    "create-role",
                    "--role-name",
                    &role_name,
                    "--assume-role-policy-document",
                    &j(params, "trust_policy"),
                ]))?;
                self.run(&args(&[
                    "iam",
                    "put-role-policy",
                    "--role-name",
                    &role_name,
                    "--policy-name",
                    &role_name,
                    "--policy-document",
                    &j(params, "policy_document"),
                ]))?;
                Ok(response["Role"]["Arn"].clone())
            }
            ApiOp::PutRolePolicy => self.run(&args(&[
                "iam",
                "put-role-policy",
                "--role-name",
                &s(params, "role_name"),
                "--policy-name",
                &s(params, "policy_name"),
                "--policy-document",
                &j(params, "policy_document"),
            ])),
            ApiOp::DeleteRolePolicy => self.run(&args(&[
                "iam",
                "delete-role-policy",
                "--role-name",
                &s(params, "role_name"),
                "--policy-name",
                &s(params, "policy_name"),
            ])),
            ApiOp::DeleteRole => self.run(&args(&[
                "iam",
                "delete-role",
                "--role-name",
                &s(params, "role_name"),
            ])),
            ApiOp::PutRule => {
                let response = self.run(&args(&[
                    "events",
                    "put-rule",
                    "--name",
                    &s(params, "rule_name"),
                    "--schedule-expression",
                    &s(params, "schedule_expression"),
                ]))?;
                Ok(response["RuleArn"].clone())
            }
            ApiOp::ConnectRuleToFunction => {
                let target = format!("Id=jangada,Arn={}", s(params, "function_arn"));
                self.run(&args(&[
                    "events",
                    "put-targets",
                    "--rule",
                    &s(params, "rule_name"),
                    "--targets",
                    &target,
                ]))?;
                self.add_permission(params, "events.amazonaws.com", "jangada-events", Some("rule_arn"))
            }
            ApiOp::DeleteRule => {
                let rule = s(params, "rule_name");
                let _ = self.run(&args(&[
                    "events",
                    "remove-targets",
                    "--rule",
                    &rule,
                    "--ids",
                    "jangada",
                ]));
                self.run(&args(&["events", "delete-rule", "--name", &rule]))
            }
            ApiOp::ImportRestApi => {
                let response = self.run(&args(&[
                    "apigateway",
                    "import-rest-api",
                    "--body",
                    &j(params, "swagger_doc"),
                ]))?;
                Ok(response["id"].clone())
            }
            ApiOp::UpdateRestApi => self.run(&args(&[
                "apigateway",
                "put-rest-api",
                "--rest-api-id",
                &s(params, "rest_api_id"),
                "--mode",
                "overwrite",
                "--body",
                &j(params, "swagger_doc"),
            ])),
            ApiOp::DeployRestApi => self.run(&args(&[
                "apigateway",
                "create-deployment",
                "--rest-api-id",
                &s(params, "rest_api_id"),
                "--stage-name",
                &s(params, "api_gateway_stage"),
            ])),
            ApiOp::DeleteRestApi => self.run(&args(&[
                "apigateway",
                "delete-rest-api",
                "--rest-api-id",
                &s(params, "rest_api_id"),
            ])),
            ApiOp::CreateWebsocketApi => {
                let response = self.run(&args(&[
                    "apigatewayv2",
                    "create-api",
                    "--name",
                    &s(params, "name"),
                    "--protocol-type",
                    "WEBSOCKET",
                    "--route-selection-expression",
                    "$request.body.action",
                ]))?;
                Ok(response["ApiId"].clone())
            }
            ApiOp::ConfigureWebsocketIntegrations => self.configure_websocket_integrations(params),
            ApiOp::DeployWebsocketApi => {
                let api_id = s(params, "api_id");
                let stage = s(params, "api_gateway_stage");
                self.run_tolerating_conflict(&args(&[
                    "apigatewayv2",
                    "create-stage",
                    "--api-id",
                    &api_id,
                    "--stage-name",
                    &stage,
                ]))?;
                self.run(&args(&[
                    "apigatewayv2",
                    "create-deployment",
                    "--api-id",
                    &api_id,
                    "--stage-name",
                    &stage,
                ]))
            }
            ApiOp::DeleteWebsocketApi => self.run(&args(&[
                "apigatewayv2",
                "delete-api",
                "--api-id",
                &s(params, "api_id"),
            ])),
            ApiOp::CreateDomainName | ApiOp::UpdateDomainName => {
                let configuration = format!(
                    "CertificateArn={},EndpointType=REGIONAL",
                    s(params, "certificate_arn")
                );
                let verb = if op == ApiOp::CreateDomainName {
                    "create-domain-name"
                } else {
                    "update-domain-name"
                };
                let response = self.run(&args(&[
                    "apigatewayv2",
                    verb,
                    "--domain-name",
                    &s(params, "domain_name"),
                    "--domain-name-configurations",
                    &configuration,
                ]))?;
                Ok(response["DomainName"].clone())
            }
            ApiOp::DeleteDomainName => self.run(&args(&[
                "apigatewayv2",
                "delete-domain-name",
                "--domain-name",
                &s(params, "domain_name"),
            ])),
            ApiOp::CreateApiMapping => {
                let response = self.run(&args(&[
                    "apigatewayv2",
                    "create-api-mapping",
                    "--domain-name",
                    &s(params, "domain_name"),
                    "--api-id",
                    &s(params, "api_id"),
                    "--stage",
                    &s(params, "stage"),
                    "--api-mapping-key",
                    &s(params, "path_key"),
                ]))?;
                Ok(response["ApiMappingId"].clone())
            }
            ApiOp::DeleteApiMapping => self.run(&args(&[
                "apigatewayv2",
                "delete-api-mapping",
                "--api-mapping-id",
                &s(params, "api_mapping_id"),
                "--domain-name",
                &s(params, "domain_name"),
            ])),
            ApiOp::AddPermissionForS3Event => {
                self.add_permission(params, "s3.amazonaws.com", "jangada-s3", Some("source_account"))
            }
            ApiOp::RemovePermissionForS3Event => self.remove_permission(params, "jangada-s3"),
            ApiOp::ConnectS3BucketToFunction => {
                let mut configuration = json!({
                    "LambdaFunctionArn": s(params, "function_arn"),
                    "Events": params.get("events").cloned().unwrap_or(json!([])),
                });
                let mut rules = Vec::new();
                if params.contains_key("prefix") {
                    rules.push(json!({"Name": "prefix", "Value": s(params, "prefix")}));
                }
                if params.contains_key("suffix") {
                    rules.push(json!({"Name": "suffix", "Value": s(params, "suffix")}));
                }
                if !rules.is_empty() {
                    configuration["Filter"] = json!({"Key": {"FilterRules": rules}});
                }
                let notification =
                    json!({"LambdaFunctionConfigurations": [configuration]}).to_string();
                self.run(&args(&[
                    "s3api",
                    "put-bucket-notification-configuration",
                    "--bucket",
                    &s(params, "bucket"),
                    "--notification-configuration",
                    &notification,
                ]))
            }
            ApiOp::DisconnectS3BucketFromFunction => self.run(&args(&[
                "s3api",
                "put-bucket-notification-configuration",
                "--bucket",
                &s(params, "bucket"),
                "--notification-configuration",
                "{}",
            ])),
            ApiOp::AddPermissionForSnsTopic => {
                self.add_permission(params, "sns.amazonaws.com", "jangada-sns", Some("topic_arn"))
            }
            ApiOp::RemovePermissionForSnsTopic => self.remove_permission(params, "jangada-sns"),
            ApiOp::SubscribeFunctionToTopic => {
                let response = self.run(&args(&[
                    "sns",
                    "subscribe",
                    "--topic-arn",
                    &s(params, "topic_arn"),
                    "--protocol",
                    "lambda",
                    "--notification-endpoint",
                    &s(params, "function_arn"),
                ]))?;
                Ok(response["SubscriptionArn"].clone())
            }
            ApiOp::UnsubscribeFromTopic => self.run(&args(&[
                "sns",
                "unsubscribe",
                "--subscription-arn",
                &s(params, "subscription_arn"),
            ])),
            ApiOp::CreateSqsEventSource
            | ApiOp::UpdateSqsEventSource
            | ApiOp::RemoveSqsEventSource
            | ApiOp::CreateKinesisEventSource
            | ApiOp::UpdateKinesisEventSource
            | ApiOp::RemoveKinesisEventSource
            | ApiOp::CreateDynamodbEventSource
            | ApiOp::UpdateDynamodbEventSource
            | ApiOp::RemoveDynamodbEventSource => self.event_source_mapping(op, params),
        }
    }

    fn account_id(&self) -> Result<String> {
        let response = self.run(&args(&["sts", "get-caller-identity"]))?;
        response["Account"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AwsError::Other("no account in caller identity".to_string()))
    }

    fn region(&self) -> Result<String> {
        Ok(self.region.clone())
    }
}
