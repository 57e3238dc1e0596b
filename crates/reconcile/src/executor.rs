//! Plan execution against the cloud client.
//!
//! Strictly sequential: each instruction's parameters are resolved against
//! the values earlier steps produced, the operation is dispatched, and the
//! result is stored. The first unrecoverable error aborts the rest of the
//! plan; whatever completed stays applied and stays recorded, which is what
//! makes a re-deploy converge instead of starting over.

use crate::plan::{Builtin, Instruction, Param, Plan};
use crate::state::RecordedResource;
use awskit::{ApiOp, AwsError, CloudClient, Params};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// A deployment failure, carrying the operation and resource that failed.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("{op} failed for resource {resource}: {source}")]
    ApiCallFailed {
        op: ApiOp,
        resource: String,
        #[source]
        source: AwsError,
    },

    #[error(
        "deployment package for {resource} is too large: {size} bytes exceeds the \
         {limit} byte limit. Consider trimming dependencies or moving them into a layer"
    )]
    PackageTooLarge {
        resource: String,
        size: u64,
        limit: u64,
    },

    #[error("variable {name} referenced before any step produced it")]
    UnresolvedVariable { name: String },

    #[error("failed to resolve {function:?}: {source}")]
    BuiltinFailed {
        function: Builtin,
        #[source]
        source: AwsError,
    },
}

/// Progress notifications during execution.
pub trait ProgressCallback {
    /// Called before each instruction runs. `message` is the plan's
    /// display message for the step, absent for bookkeeping instructions.
    fn on_instruction(&mut self, index: usize, total: usize, message: Option<&str>);
}

/// No-op progress callback.
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_instruction(&mut self, _index: usize, _total: usize, _message: Option<&str>) {}
}

/// Executes plans and accumulates the resulting resource records.
pub struct Executor<'a, C: CloudClient> {
    client: &'a C,
    variables: HashMap<String, Value>,
    records: Vec<RecordedResource>,
    record_index: HashMap<String, usize>,
    account_id: Option<String>,
    region: Option<String>,
}

impl<'a, C: CloudClient> Executor<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            variables: HashMap::new(),
            records: Vec::new(),
            record_index: HashMap::new(),
            account_id: None,
            region: None,
        }
    }

    /// Run every instruction in order, aborting on the first failure.
    pub fn execute(&mut self, plan: &Plan) -> Result<(), DeployError> {
        self.execute_with(plan, &mut NoProgress)
    }

    /// Run the plan, reporting each step to `progress`.
    pub fn execute_with(
        &mut self,
        plan: &Plan,
        progress: &mut impl ProgressCallback,
    ) -> Result<(), DeployError> {
        let total = plan.len();
        for (index, instruction) in plan.instructions.iter().enumerate() {
            progress.on_instruction(index, total, plan.message_for(index));
            self.execute_instruction(instruction)?;
        }
        Ok(())
    }

    /// The resource records accumulated so far, in first-recorded order.
    ///
    /// After a successful run this is the new deployed-state ledger; after
    /// a failed run it reflects the partial progress that actually made it
    /// to the cloud.
    pub fn into_records(self) -> Vec<RecordedResource> {
        self.records
    }

    /// A resolved variable, mostly useful in tests and reporting.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    fn execute_instruction(&mut self, instruction: &Instruction) -> Result<(), DeployError> {
        match instruction {
            Instruction::ApiCall {
                op,
                params,
                output_var,
                resource_name,
            } => {
                let resolved = self.resolve_params(params)?;
                log::debug!("{op} {resource_name}");
                let result =
                    self.client
                        .call(*op, &resolved)
                        .map_err(|e| Self::wrap_call_error(*op, resource_name, e))?;
                if let Some(var) = output_var {
                    self.variables.insert(var.clone(), result);
                }
                Ok(())
            }
            Instruction::StoreValue { name, value } => {
                let resolved = self.resolve(value)?;
                self.variables.insert(name.clone(), resolved);
                Ok(())
            }
            Instruction::BuiltinFunction {
                function,
                output_var,
            } => {
                let value = self.builtin(*function)?;
                self.variables.insert(output_var.clone(), Value::String(value));
                Ok(())
            }
            Instruction::RecordResourceValue {
                resource_type,
                resource_name,
                name,
                value,
            } => {
                self.record(resource_type, resource_name, name, value.clone());
                Ok(())
            }
            Instruction::RecordResourceVariable {
                resource_type,
                resource_name,
                name,
                variable_name,
            } => {
                let value = self
                    .variables
                    .get(variable_name)
                    .cloned()
                    .ok_or_else(|| DeployError::UnresolvedVariable {
                        name: variable_name.clone(),
                    })?;
                self.record(resource_type, resource_name, name, value);
                Ok(())
            }
        }
    }

    fn wrap_call_error(op: ApiOp, resource: &str, error: AwsError) -> DeployError {
        match error {
            AwsError::TooLarge { size, limit } => DeployError::PackageTooLarge {
                resource: resource.to_string(),
                size,
                limit,
            },
            other => DeployError::ApiCallFailed {
                op,
                resource: resource.to_string(),
                source: other,
            },
        }
    }

    /// Account id and region resolve lazily on first use and are cached
    /// for the rest of the run.
    fn builtin(&mut self, function: Builtin) -> Result<String, DeployError> {
        let cached = match function {
            Builtin::AccountId => &mut self.account_id,
            Builtin::Region => &mut self.region,
        };
        if let Some(value) = cached {
            return Ok(value.clone());
        }

        let value = match function {
            Builtin::AccountId => self.client.account_id(),
            Builtin::Region => self.client.region(),
        }
        .map_err(|e| DeployError::BuiltinFailed {
            function,
            source: e,
        })?;

        match function {
            Builtin::AccountId => self.account_id = Some(value.clone()),
            Builtin::Region => self.region = Some(value.clone()),
        }
        Ok(value)
    }

    fn record(&mut self, resource_type: &str, resource_name: &str, key: &str, value: Value) {
        let index = match self.record_index.get(resource_name) {
            Some(&index) => index,
            None => {
                self.records
                    .push(RecordedResource::new(resource_name, resource_type));
                let index = self.records.len() - 1;
                self.record_index.insert(resource_name.to_string(), index);
                index
            }
        };
        self.records[index]
            .values
            .insert(key.to_string(), value);
    }

    fn resolve_params(&self, params: &crate::plan::ParamMap) -> Result<Params, DeployError> {
        let mut resolved = Params::new();
        for (key, param) in params {
            resolved.insert(key.clone(), self.resolve(param)?);
        }
        Ok(resolved)
    }

    fn resolve(&self, param: &Param) -> Result<Value, DeployError> {
        match param {
            Param::Literal(value) => Ok(value.clone()),
            Param::Variable(name) => self
                .variables
                .get(name)
                .cloned()
                .ok_or_else(|| DeployError::UnresolvedVariable { name: name.clone() }),
            Param::Format { template, vars } => {
                let mut rendered = template.clone();
                for var in vars {
                    let value = self.variables.get(var).ok_or_else(|| {
                        DeployError::UnresolvedVariable { name: var.clone() }
                    })?;
                    let text = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    rendered = rendered.replace(&format!("{{{var}}}"), &text);
                }
                Ok(Value::String(rendered))
            }
            Param::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.resolve(item)?);
                }
                Ok(Value::Array(out))
            }
            Param::Map(entries) => {
                let mut out = serde_json::Map::new();
                for (key, value) in entries {
                    out.insert(key.clone(), self.resolve(value)?);
                }
                Ok(Value::Object(out))
            }
        }
    }
}
