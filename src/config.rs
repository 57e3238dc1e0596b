//! Project configuration: `jangada.toml` parsing and stage scoping.
//!
//! The file declares the application (routes, event handlers, functions)
//! and per-stage overrides. Settings resolve field by field, most specific
//! first: per-function stage override, then the function declaration, then
//! stage defaults, then app defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Default project config file name.
pub const CONFIG_FILE: &str = "jangada.toml";

/// Path to the deployed-state ledger for a stage.
pub fn deployed_state_path(project_dir: &Path, stage: &str) -> PathBuf {
    project_dir
        .join(".jangada")
        .join("deployed")
        .join(format!("{stage}.json"))
}

// ============================================================================
// Declarations
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ProjectConfig {
    pub app: AppSection,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default, rename = "function")]
    pub functions: Vec<FunctionDecl>,
    #[serde(default, rename = "route")]
    pub routes: Vec<RouteDecl>,
    #[serde(default, rename = "authorizer")]
    pub authorizers: Vec<AuthorizerDecl>,
    #[serde(default, rename = "scheduled")]
    pub scheduled: Vec<ScheduledDecl>,
    #[serde(default, rename = "s3_event")]
    pub s3_events: Vec<S3EventDecl>,
    #[serde(default, rename = "sns_subscription")]
    pub sns_subscriptions: Vec<SnsDecl>,
    #[serde(default, rename = "sqs_event")]
    pub sqs_events: Vec<SqsDecl>,
    #[serde(default, rename = "kinesis_event")]
    pub kinesis_events: Vec<KinesisDecl>,
    #[serde(default, rename = "dynamodb_event")]
    pub dynamodb_events: Vec<DynamoDbDecl>,
    pub websocket: Option<WebsocketDecl>,
    #[serde(default)]
    pub api: ApiSection,
    pub api_domain: Option<DomainDecl>,
    pub websocket_domain: Option<DomainDecl>,
    #[serde(default)]
    pub stages: BTreeMap<String, StageOverrides>,
}

#[derive(Debug, Deserialize)]
pub struct AppSection {
    pub name: String,
    /// Path to the zipped deployment artifact
    #[serde(default = "default_artifact")]
    pub artifact: String,
}

fn default_artifact() -> String {
    ".jangada/deployment.zip".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_runtime")]
    pub runtime: String,
    #[serde(default = "default_memory_size")]
    pub memory_size: u32,
    #[serde(default = "default_timeout")]
    pub timeout: u32,
    #[serde(default = "default_true")]
    pub autogen_policy: bool,
    #[serde(default)]
    pub environment_variables: BTreeMap<String, String>,
    /// Ship shared dependencies as one managed layer per stage
    #[serde(default)]
    pub automatic_layer: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            runtime: default_runtime(),
            memory_size: default_memory_size(),
            timeout: default_timeout(),
            autogen_policy: true,
            environment_variables: BTreeMap::new(),
            automatic_layer: false,
        }
    }
}

fn default_runtime() -> String {
    "python3.12".to_string()
}

fn default_memory_size() -> u32 {
    128
}

fn default_timeout() -> u32 {
    60
}

fn default_true() -> bool {
    true
}

/// Per-function or per-stage partial settings; unset fields fall through
/// to the next layer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsOverride {
    pub runtime: Option<String>,
    pub memory_size: Option<u32>,
    pub timeout: Option<u32>,
    pub autogen_policy: Option<bool>,
    pub iam_role_arn: Option<String>,
    pub policy_file: Option<String>,
    #[serde(default)]
    pub environment_variables: BTreeMap<String, String>,
    pub security_group_ids: Option<Vec<String>>,
    pub subnet_ids: Option<Vec<String>>,
    #[serde(default)]
    pub layers: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub handler: String,
    #[serde(flatten)]
    pub settings: SettingsOverride,
}

#[derive(Debug, Deserialize)]
pub struct RouteDecl {
    pub path: String,
    #[serde(default = "default_methods")]
    pub methods: Vec<String>,
}

fn default_methods() -> Vec<String> {
    vec!["GET".to_string()]
}

#[derive(Debug, Deserialize)]
pub struct AuthorizerDecl {
    pub name: String,
    pub handler: String,
    #[serde(flatten)]
    pub settings: SettingsOverride,
}

#[derive(Debug, Deserialize)]
pub struct ScheduledDecl {
    pub name: String,
    pub schedule: String,
    pub handler: String,
    #[serde(flatten)]
    pub settings: SettingsOverride,
}

#[derive(Debug, Deserialize)]
pub struct S3EventDecl {
    pub name: String,
    pub bucket: String,
    #[serde(default = "default_s3_events")]
    pub events: Vec<String>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub handler: String,
    #[serde(flatten)]
    pub settings: SettingsOverride,
}

fn default_s3_events() -> Vec<String> {
    vec!["s3:ObjectCreated:*".to_string()]
}

#[derive(Debug, Deserialize)]
pub struct SnsDecl {
    pub name: String,
    /// Topic name or full topic ARN
    pub topic: String,
    pub handler: String,
    #[serde(flatten)]
    pub settings: SettingsOverride,
}

#[derive(Debug, Deserialize)]
pub struct SqsDecl {
    pub name: String,
    /// Queue name or full queue ARN
    pub queue: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default)]
    pub maximum_batching_window: u32,
    pub handler: String,
    #[serde(flatten)]
    pub settings: SettingsOverride,
}

fn default_batch_size() -> u32 {
    10
}

#[derive(Debug, Deserialize)]
pub struct KinesisDecl {
    pub name: String,
    pub stream: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_starting_position")]
    pub starting_position: String,
    pub handler: String,
    #[serde(flatten)]
    pub settings: SettingsOverride,
}

fn default_starting_position() -> String {
    "LATEST".to_string()
}

#[derive(Debug, Deserialize)]
pub struct DynamoDbDecl {
    pub name: String,
    pub stream_arn: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_starting_position")]
    pub starting_position: String,
    pub handler: String,
    #[serde(flatten)]
    pub settings: SettingsOverride,
}

#[derive(Debug, Deserialize)]
pub struct WebsocketDecl {
    pub connect: Option<String>,
    pub message: Option<String>,
    pub disconnect: Option<String>,
    #[serde(flatten)]
    pub settings: SettingsOverride,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSection {
    #[serde(default = "default_api_stage")]
    pub stage_name: String,
    #[serde(default = "default_endpoint_type")]
    pub endpoint_type: String,
    pub minimum_compression: Option<u32>,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            stage_name: default_api_stage(),
            endpoint_type: default_endpoint_type(),
            minimum_compression: None,
        }
    }
}

fn default_api_stage() -> String {
    "api".to_string()
}

fn default_endpoint_type() -> String {
    "EDGE".to_string()
}

#[derive(Debug, Deserialize)]
pub struct DomainDecl {
    pub domain_name: String,
    pub certificate_arn: String,
    pub tls_version: Option<String>,
    #[serde(default)]
    pub mount_path: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct StageOverrides {
    #[serde(flatten)]
    pub settings: SettingsOverride,
    pub automatic_layer: Option<bool>,
    #[serde(default)]
    pub functions: BTreeMap<String, SettingsOverride>,
}

// ============================================================================
// Resolution
// ============================================================================

/// Fully resolved settings for one function in one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSettings {
    pub runtime: String,
    pub memory_size: u32,
    pub timeout: u32,
    pub autogen_policy: bool,
    pub iam_role_arn: Option<String>,
    pub policy_file: Option<String>,
    pub environment_variables: BTreeMap<String, String>,
    pub security_group_ids: Vec<String>,
    pub subnet_ids: Vec<String>,
    pub layers: Vec<String>,
}

impl ProjectConfig {
    /// Load and parse the project config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config: ProjectConfig = toml::from_str(&content)
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        Ok(config)
    }

    /// Resolve settings for one function, most specific layer first.
    pub fn resolve_function(
        &self,
        stage: &str,
        function_name: &str,
        decl: &SettingsOverride,
    ) -> FunctionSettings {
        let stage_over = self.stages.get(stage);
        let stage_settings = stage_over.map(|s| &s.settings);
        let func_over = stage_over.and_then(|s| s.functions.get(function_name));

        let pick_string = |get: &dyn Fn(&SettingsOverride) -> Option<String>| {
            func_over
                .and_then(|o| get(o))
                .or_else(|| get(decl))
                .or_else(|| stage_settings.and_then(|o| get(o)))
        };
        let pick_u32 = |get: &dyn Fn(&SettingsOverride) -> Option<u32>| {
            func_over
                .and_then(|o| get(o))
                .or_else(|| get(decl))
                .or_else(|| stage_settings.and_then(|o| get(o)))
        };

        // Environment variables merge by union, most specific wins.
        let mut environment_variables = self.defaults.environment_variables.clone();
        if let Some(stage_settings) = stage_settings {
            environment_variables.extend(stage_settings.environment_variables.clone());
        }
        environment_variables.extend(decl.environment_variables.clone());
        if let Some(func_over) = func_over {
            environment_variables.extend(func_over.environment_variables.clone());
        }

        let mut layers = decl.layers.clone();
        if let Some(func_over) = func_over {
            layers.extend(func_over.layers.clone());
        }

        FunctionSettings {
            runtime: pick_string(&|o| o.runtime.clone())
                .unwrap_or_else(|| self.defaults.runtime.clone()),
            memory_size: pick_u32(&|o| o.memory_size).unwrap_or(self.defaults.memory_size),
            timeout: pick_u32(&|o| o.timeout).unwrap_or(self.defaults.timeout),
            autogen_policy: func_over
                .and_then(|o| o.autogen_policy)
                .or(decl.autogen_policy)
                .or_else(|| stage_settings.and_then(|o| o.autogen_policy))
                .unwrap_or(self.defaults.autogen_policy),
            iam_role_arn: pick_string(&|o| o.iam_role_arn.clone()),
            policy_file: pick_string(&|o| o.policy_file.clone()),
            environment_variables,
            security_group_ids: func_over
                .and_then(|o| o.security_group_ids.clone())
                .or_else(|| decl.security_group_ids.clone())
                .or_else(|| stage_settings.and_then(|o| o.security_group_ids.clone()))
                .unwrap_or_default(),
            subnet_ids: func_over
                .and_then(|o| o.subnet_ids.clone())
                .or_else(|| decl.subnet_ids.clone())
                .or_else(|| stage_settings.and_then(|o| o.subnet_ids.clone()))
                .unwrap_or_default(),
            layers,
        }
    }

    /// Whether the shared managed layer is enabled for a stage.
    pub fn automatic_layer(&self, stage: &str) -> bool {
        self.stages
            .get(stage)
            .and_then(|s| s.automatic_layer)
            .unwrap_or(self.defaults.automatic_layer)
    }
}

// ============================================================================
// User-level defaults
// ============================================================================

/// Optional per-user defaults at `~/.config/jangada/config.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct UserConfig {
    pub default_stage: Option<String>,
}

impl UserConfig {
    /// Load the user config, or defaults if the file does not exist.
    pub fn load() -> Self {
        let Some(home) = dirs::home_dir() else {
            return Self::default();
        };
        let path = home.join(".config").join("jangada").join("config.toml");
        let Ok(content) = fs::read_to_string(&path) else {
            return Self::default();
        };
        match toml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Ignoring invalid user config {}: {e}", path.display());
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> ProjectConfig {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config = parse(
            r#"
            [app]
            name = "appname"
            "#,
        );
        assert_eq!(config.app.name, "appname");
        assert_eq!(config.defaults.memory_size, 128);
        assert!(config.defaults.autogen_policy);
        assert_eq!(config.api.stage_name, "api");
    }

    #[test]
    fn function_decl_overrides_defaults() {
        let config = parse(
            r#"
            [app]
            name = "appname"

            [defaults]
            memory_size = 256

            [[function]]
            name = "worker"
            handler = "app.worker"
            memory_size = 512
            timeout = 120
            "#,
        );
        let decl = &config.functions[0];
        let settings = config.resolve_function("dev", "worker", &decl.settings);
        assert_eq!(settings.memory_size, 512);
        assert_eq!(settings.timeout, 120);
        assert_eq!(settings.runtime, "python3.12");
    }

    #[test]
    fn stage_override_beats_defaults_but_not_function() {
        let config = parse(
            r#"
            [app]
            name = "appname"

            [[function]]
            name = "worker"
            handler = "app.worker"
            timeout = 120

            [stages.prod]
            memory_size = 1024
            timeout = 30

            [stages.prod.functions.worker]
            memory_size = 2048
            "#,
        );
        let decl = &config.functions[0];
        let settings = config.resolve_function("prod", "worker", &decl.settings);
        // Per-function stage override wins
        assert_eq!(settings.memory_size, 2048);
        // Function declaration beats stage defaults
        assert_eq!(settings.timeout, 120);
    }

    #[test]
    fn environment_variables_merge_by_union() {
        let config = parse(
            r#"
            [app]
            name = "appname"

            [defaults.environment_variables]
            SHARED = "base"
            LEVEL = "app"

            [[function]]
            name = "worker"
            handler = "app.worker"

            [function.environment_variables]
            LEVEL = "function"

            [stages.dev]
            [stages.dev.environment_variables]
            STAGE = "dev"
            "#,
        );
        let decl = &config.functions[0];
        let settings = config.resolve_function("dev", "worker", &decl.settings);
        assert_eq!(settings.environment_variables["SHARED"], "base");
        assert_eq!(settings.environment_variables["STAGE"], "dev");
        assert_eq!(settings.environment_variables["LEVEL"], "function");
    }

    #[test]
    fn event_declarations_parse() {
        let config = parse(
            r#"
            [app]
            name = "appname"

            [[route]]
            path = "/"

            [[s3_event]]
            name = "upload"
            bucket = "bucket-a"
            handler = "app.on_upload"

            [[sqs_event]]
            name = "drain"
            queue = "jobs"
            handler = "app.on_job"
            batch_size = 5
            "#,
        );
        assert_eq!(config.routes.len(), 1);
        assert_eq!(config.routes[0].methods, vec!["GET"]);
        assert_eq!(config.s3_events[0].events, vec!["s3:ObjectCreated:*"]);
        assert_eq!(config.sqs_events[0].batch_size, 5);
        assert_eq!(config.sqs_events[0].maximum_batching_window, 0);
    }

    #[test]
    fn automatic_layer_is_stage_scoped() {
        let config = parse(
            r#"
            [app]
            name = "appname"

            [defaults]
            automatic_layer = true

            [stages.prod]
            automatic_layer = false
            "#,
        );
        assert!(config.automatic_layer("dev"));
        assert!(!config.automatic_layer("prod"));
    }
}
