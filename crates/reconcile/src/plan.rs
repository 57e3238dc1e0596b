//! Plan and instruction types.
//!
//! A plan is an ordered list of idempotent instructions. API call
//! parameters form a tree of [`Param`] values in which anything not known
//! until execute time is a named variable, resolved by the executor from
//! the outputs of earlier steps. The planner never reads an ARN out of a
//! resource object; it wires steps together through variables only.

use awskit::ApiOp;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// A parameter value, possibly deferred to execute time.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// A value known at plan time
    Literal(Value),
    /// The output of an earlier step, by variable name
    Variable(String),
    /// A string with `{var}` placeholders substituted at execute time
    Format { template: String, vars: Vec<String> },
    /// A list of parameters
    List(Vec<Param>),
    /// A nested parameter mapping
    Map(BTreeMap<String, Param>),
}

impl Param {
    /// A literal string parameter.
    pub fn str(value: impl Into<String>) -> Self {
        Param::Literal(Value::String(value.into()))
    }

    /// A literal integer parameter.
    pub fn int(value: u64) -> Self {
        Param::Literal(Value::from(value))
    }

    /// A variable reference.
    pub fn var(name: impl Into<String>) -> Self {
        Param::Variable(name.into())
    }
}

/// Parameter mapping for one API call.
pub type ParamMap = BTreeMap<String, Param>;

/// Values the executor computes itself instead of calling the provider's
/// mutation surface. Resolved lazily on first use and cached for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// The account id of the active credentials
    AccountId,
    /// The region the client is configured against
    Region,
}

/// One step of a deployment plan.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Issue a provider operation, optionally storing its result
    ApiCall {
        op: ApiOp,
        params: ParamMap,
        output_var: Option<String>,
        /// The logical resource this call belongs to, for error reporting
        resource_name: String,
    },
    /// Store a value under a variable name
    StoreValue { name: String, value: Param },
    /// Compute a builtin value and store it under a variable name
    BuiltinFunction { function: Builtin, output_var: String },
    /// Remember a literal value for the deployed-state ledger
    RecordResourceValue {
        resource_type: String,
        resource_name: String,
        name: String,
        value: Value,
    },
    /// Remember a variable's resolved value for the deployed-state ledger
    RecordResourceVariable {
        resource_type: String,
        resource_name: String,
        name: String,
        variable_name: String,
    },
}

impl Instruction {
    /// The resource name this instruction marks as kept, if it is a
    /// record instruction.
    pub fn recorded_name(&self) -> Option<&str> {
        match self {
            Instruction::RecordResourceValue { resource_name, .. }
            | Instruction::RecordResourceVariable { resource_name, .. } => Some(resource_name),
            _ => None,
        }
    }
}

/// An ordered instruction list plus display messages.
///
/// Messages are keyed by instruction index and surface in progress output
/// and plan previews; instructions without one are bookkeeping.
#[derive(Debug, Default)]
pub struct Plan {
    pub instructions: Vec<Instruction>,
    pub messages: BTreeMap<usize, String>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instruction without a display message.
    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Append an instruction with a display message.
    pub fn push_with_message(&mut self, instruction: Instruction, message: impl Into<String>) {
        self.messages
            .insert(self.instructions.len(), message.into());
        self.instructions.push(instruction);
    }

    /// The message attached to an instruction, if any.
    pub fn message_for(&self, index: usize) -> Option<&str> {
        self.messages.get(&index).map(String::as_str)
    }

    /// Resource names the plan intends to keep, i.e. every name touched
    /// by a record instruction.
    pub fn marked_names(&self) -> BTreeSet<String> {
        self.instructions
            .iter()
            .filter_map(|i| i.recorded_name().map(str::to_string))
            .collect()
    }

    /// Literal values recorded per resource name.
    ///
    /// Only [`Instruction::RecordResourceValue`] entries appear here;
    /// variable records are not comparable until execute time. Identity
    /// attributes (bucket names, topic names, queue names) are always
    /// recorded as literals for exactly this reason.
    pub fn recorded_values(&self) -> BTreeMap<String, BTreeMap<String, Value>> {
        let mut out: BTreeMap<String, BTreeMap<String, Value>> = BTreeMap::new();
        for instruction in &self.instructions {
            if let Instruction::RecordResourceValue {
                resource_name,
                name,
                value,
                ..
            } = instruction
            {
                out.entry(resource_name.clone())
                    .or_default()
                    .insert(name.clone(), value.clone());
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn marked_names_cover_value_and_variable_records() {
        let mut plan = Plan::new();
        plan.push(Instruction::RecordResourceValue {
            resource_type: "s3_event".to_string(),
            resource_name: "upload-s3event".to_string(),
            name: "bucket".to_string(),
            value: json!("bucket-a"),
        });
        plan.push(Instruction::RecordResourceVariable {
            resource_type: "lambda_function".to_string(),
            resource_name: "worker".to_string(),
            name: "lambda_arn".to_string(),
            variable_name: "worker_lambda_arn".to_string(),
        });
        plan.push(Instruction::StoreValue {
            name: "unrelated".to_string(),
            value: Param::str("x"),
        });

        let marked = plan.marked_names();
        assert!(marked.contains("upload-s3event"));
        assert!(marked.contains("worker"));
        assert_eq!(marked.len(), 2);
    }

    #[test]
    fn recorded_values_only_include_literals() {
        let mut plan = Plan::new();
        plan.push(Instruction::RecordResourceValue {
            resource_type: "s3_event".to_string(),
            resource_name: "upload-s3event".to_string(),
            name: "bucket".to_string(),
            value: json!("bucket-a"),
        });
        plan.push(Instruction::RecordResourceVariable {
            resource_type: "s3_event".to_string(),
            resource_name: "upload-s3event".to_string(),
            name: "lambda_arn".to_string(),
            variable_name: "worker_lambda_arn".to_string(),
        });

        let values = plan.recorded_values();
        let record = values.get("upload-s3event").unwrap();
        assert_eq!(record.get("bucket"), Some(&json!("bucket-a")));
        assert!(!record.contains_key("lambda_arn"));
    }

    #[test]
    fn messages_follow_instruction_indices() {
        let mut plan = Plan::new();
        plan.push(Instruction::StoreValue {
            name: "a".to_string(),
            value: Param::str("1"),
        });
        plan.push_with_message(
            Instruction::StoreValue {
                name: "b".to_string(),
                value: Param::str("2"),
            },
            "storing b",
        );

        assert_eq!(plan.message_for(0), None);
        assert_eq!(plan.message_for(1), Some("storing b"));
    }
}
