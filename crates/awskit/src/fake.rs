//! An in-memory cloud for tests.
//!
//! [`FakeCloud`] implements [`CloudClient`] without any network access:
//! every call is recorded, create operations return deterministic
//! identifiers derived from the parameters, and failures can be queued
//! per operation to exercise retry and abort paths.

use crate::client::{CloudClient, Params};
use crate::error::{AwsError, Result};
use crate::types::ApiOp;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;

/// In-memory [`CloudClient`] implementation.
pub struct FakeCloud {
    account: String,
    region: String,
    calls: RefCell<Vec<(ApiOp, Params)>>,
    queued_failures: RefCell<HashMap<ApiOp, Vec<AwsError>>>,
    next_id: RefCell<u32>,
}

impl Default for FakeCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCloud {
    /// A fake cloud in `us-west-2` under a fixed test account.
    pub fn new() -> Self {
        Self {
            account: "123456789012".to_string(),
            region: "us-west-2".to_string(),
            calls: RefCell::new(Vec::new()),
            queued_failures: RefCell::new(HashMap::new()),
            next_id: RefCell::new(0),
        }
    }

    /// Queue an error for the next invocation of `op`.
    ///
    /// Queued errors are consumed in order; once drained, the operation
    /// succeeds again. Queue several to simulate sustained throttling.
    pub fn fail_next(&self, op: ApiOp, error: AwsError) {
        self.queued_failures
            .borrow_mut()
            .entry(op)
            .or_default()
            .push(error);
    }

    /// All recorded calls in issue order.
    pub fn calls(&self) -> Vec<(ApiOp, Params)> {
        self.calls.borrow().clone()
    }

    /// The operations issued, in order.
    pub fn ops(&self) -> Vec<ApiOp> {
        self.calls.borrow().iter().map(|(op, _)| *op).collect()
    }

    /// Parameter mappings recorded for one operation.
    pub fn params_for(&self, op: ApiOp) -> Vec<Params> {
        self.calls
            .borrow()
            .iter()
            .filter(|(o, _)| *o == op)
            .map(|(_, p)| p.clone())
            .collect()
    }

    fn fresh_id(&self) -> u32 {
        let mut next = self.next_id.borrow_mut();
        *next += 1;
        *next
    }

    fn str_param(params: &Params, key: &str) -> String {
        params
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string()
    }

    fn canned_response(&self, op: ApiOp, params: &Params) -> Value {
        match op {
            ApiOp::CreateFunction | ApiOp::UpdateFunction => Value::String(format!(
                "arn:aws:lambda:{}:{}:function:{}",
                self.region,
                self.account,
                Self::str_param(params, "function_name")
            )),
            ApiOp::PublishLayerVersion => Value::String(format!(
                "arn:aws:lambda:{}:{}:layer:{}:{}",
                self.region,
                self.account,
                Self::str_param(params, "layer_name"),
                self.fresh_id()
            )),
            ApiOp::CreateRole => Value::String(format!(
                "arn:aws:iam::{}:role/{}",
                self.account,
                Self::str_param(params, "role_name")
            )),
            ApiOp::PutRule => Value::String(format!(
                "arn:aws:events:{}:{}:rule/{}",
                self.region,
                self.account,
                Self::str_param(params, "rule_name")
            )),
            ApiOp::ImportRestApi => Value::String(format!("restapi{:04}", self.fresh_id())),
            ApiOp::CreateWebsocketApi => Value::String(format!("wsapi{:04}", self.fresh_id())),
            ApiOp::CreateApiMapping => Value::String(format!("mapping{:04}", self.fresh_id())),
            ApiOp::CreateSqsEventSource
            | ApiOp::CreateKinesisEventSource
            | ApiOp::CreateDynamodbEventSource => {
                Value::String(format!("event-uuid-{:04}", self.fresh_id()))
            }
            ApiOp::SubscribeFunctionToTopic => Value::String(format!(
                "{}:{:04}",
                Self::str_param(params, "topic_arn"),
                self.fresh_id()
            )),
            ApiOp::CreateDomainName | ApiOp::UpdateDomainName => {
                Value::String(Self::str_param(params, "domain_name"))
            }
            _ => Value::Null,
        }
    }
}

impl CloudClient for FakeCloud {
    fn call(&self, op: ApiOp, params: &Params) -> Result<Value> {
        self.calls.borrow_mut().push((op, params.clone()));

        if let Some(queue) = self.queued_failures.borrow_mut().get_mut(&op)
            && !queue.is_empty()
        {
            return Err(queue.remove(0));
        }

        Ok(self.canned_response(op, params))
    }

    fn account_id(&self) -> Result<String> {
        Ok(self.account.clone())
    }

    fn region(&self) -> Result<String> {
        Ok(self.region.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn create_function_returns_an_arn_built_from_params() {
        let cloud = FakeCloud::new();
        let result = cloud
            .call(
                ApiOp::CreateFunction,
                &params(&[("function_name", json!("app-dev"))]),
            )
            .unwrap();
        assert_eq!(
            result,
            json!("arn:aws:lambda:us-west-2:123456789012:function:app-dev")
        );
    }

    #[test]
    fn queued_failures_are_consumed_in_order() {
        let cloud = FakeCloud::new();
        cloud.fail_next(
            ApiOp::CreateRole,
            AwsError::Throttled {
                message: "rate exceeded".to_string(),
            },
        );

        assert!(cloud.call(ApiOp::CreateRole, &Params::new()).is_err());
        assert!(cloud.call(ApiOp::CreateRole, &Params::new()).is_ok());
    }

    #[test]
    fn records_every_call_in_order() {
        let cloud = FakeCloud::new();
        cloud.call(ApiOp::CreateRole, &Params::new()).unwrap();
        cloud.call(ApiOp::CreateFunction, &Params::new()).unwrap();
        assert_eq!(cloud.ops(), vec![ApiOp::CreateRole, ApiOp::CreateFunction]);
    }
}
