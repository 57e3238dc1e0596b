//! The deployed-state ledger.
//!
//! A JSON document recording what the last successful deploy left in the
//! cloud: one flat record per resource, in deploy order. Read at the start
//! of a deploy to diff against, rewritten wholesale at the end.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Current ledger schema version.
pub const SCHEMA_VERSION: &str = "2.0";

/// One deployed resource: its reconciliation key, its type tag, and the
/// identifying values the executor recorded for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedResource {
    pub name: String,
    pub resource_type: String,
    #[serde(flatten)]
    pub values: BTreeMap<String, Value>,
}

impl RecordedResource {
    pub fn new(name: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_type: resource_type.into(),
            values: BTreeMap::new(),
        }
    }

    /// A recorded value as a string, if present.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }
}

/// The persisted reconciliation ledger for one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployedState {
    pub schema_version: String,
    #[serde(default)]
    pub resources: Vec<RecordedResource>,
    /// Last time the ledger was written
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
}

impl Default for DeployedState {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            resources: Vec::new(),
            last_updated: Utc::now(),
        }
    }
}

impl DeployedState {
    /// A ledger holding the given records.
    pub fn from_records(resources: Vec<RecordedResource>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            resources,
            last_updated: Utc::now(),
        }
    }

    /// Load the ledger from disk, or return an empty ledger if the file
    /// does not exist yet.
    ///
    /// A legacy `1.0` document (a single flat map of backend values) is
    /// upgraded in memory; it is never written back in the old format.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No deployed state at {}, starting empty", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read deployed state: {}", path.display()))?;

        let raw: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse deployed state: {}", path.display()))?;

        let schema = raw
            .get("schema_version")
            .and_then(Value::as_str)
            .unwrap_or("1.0");

        if schema.starts_with("1.") {
            log::info!("Upgrading deployed state from schema {schema}");
            return Ok(Self::upgrade_v1(&raw));
        }

        let state: DeployedState = serde_json::from_value(raw)
            .with_context(|| format!("Invalid deployed state: {}", path.display()))?;
        Ok(state)
    }

    /// Save the ledger to disk, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create state directory: {}", parent.display())
            })?;
        }

        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize deployed state")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write deployed state: {}", path.display()))?;

        log::debug!("Saved deployed state to {}", path.display());
        Ok(())
    }

    /// Upgrade a legacy flat-map document to the record-list schema.
    ///
    /// The old format kept a handful of well-known keys for the single
    /// api-handler deployment shape; anything else it held has no modern
    /// counterpart and is dropped.
    fn upgrade_v1(raw: &Value) -> Self {
        let mut resources = Vec::new();

        if let Some(arn) = raw.get("api_handler_arn").and_then(Value::as_str) {
            let mut record = RecordedResource::new("api_handler", "lambda_function");
            record
                .values
                .insert("lambda_arn".to_string(), Value::String(arn.to_string()));
            if let Some(name) = raw.get("api_handler_name").and_then(Value::as_str) {
                record
                    .values
                    .insert("function_name".to_string(), Value::String(name.to_string()));
            }
            resources.push(record);
        }

        if let Some(id) = raw.get("rest_api_id").and_then(Value::as_str) {
            let mut record = RecordedResource::new("rest_api", "rest_api");
            record
                .values
                .insert("rest_api_id".to_string(), Value::String(id.to_string()));
            resources.push(record);
        }

        Self::from_records(resources)
    }

    /// Whether a resource name is present in the ledger.
    pub fn contains(&self, name: &str) -> bool {
        self.resources.iter().any(|r| r.name == name)
    }

    /// Look up a record by resource name.
    pub fn get(&self, name: &str) -> Option<&RecordedResource> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// A recorded value for a resource, as a string.
    pub fn resource_value(&self, name: &str, key: &str) -> Option<&str> {
        self.get(name).and_then(|r| r.value(key))
    }

    /// All recorded values for a resource name.
    pub fn resource_values(&self, name: &str) -> Option<&BTreeMap<String, Value>> {
        self.get(name).map(|r| &r.values)
    }

    /// Resource names in their recorded (deploy) order.
    pub fn resource_names(&self) -> impl Iterator<Item = &str> {
        self.resources.iter().map(|r| r.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
