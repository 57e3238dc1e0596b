//! The client boundary between the deployment engine and the cloud provider.
//!
//! The engine never touches wire formats. It issues [`ApiOp`] operations
//! with a JSON parameter mapping and receives the interesting value of the
//! response (an ARN, an id) directly. Concrete backends implement
//! [`CloudClient`]; the [`RetryingClient`] wrapper adds bounded retry for
//! the transient error categories.

use crate::error::Result;
use crate::retry::{LogCallback, with_retry};
use crate::types::{ApiOp, RetryConfig};
use serde_json::{Map, Value};

/// Parameter mapping passed to a client operation.
pub type Params = Map<String, Value>;

/// Typed boundary to the cloud provider control plane.
///
/// One implementation owns one handle per service, constructed once at
/// process start and passed by reference into the executor. Implementations
/// provide their own connect/read timeouts; callers only see the bounded
/// retry policy layered on top.
pub trait CloudClient {
    /// Dispatch a named operation with its parameter mapping.
    ///
    /// Returns the extracted value of interest for the operation (for
    /// example `create_function` returns the function ARN as a JSON
    /// string) or `Value::Null` when there is nothing useful to return.
    fn call(&self, op: ApiOp, params: &Params) -> Result<Value>;

    /// The account id of the active credentials.
    fn account_id(&self) -> Result<String>;

    /// The region the client is configured against.
    fn region(&self) -> Result<String>;
}

/// Wraps any [`CloudClient`] with bounded retry for retryable errors.
///
/// Teardown operations additionally treat a missing target as success,
/// so double-deletes converge instead of failing.
pub struct RetryingClient<C> {
    inner: C,
    config: RetryConfig,
}

impl<C: CloudClient> RetryingClient<C> {
    /// Wrap `inner` with the default retry policy.
    pub fn new(inner: C) -> Self {
        Self::with_config(inner, RetryConfig::default())
    }

    /// Wrap `inner` with an explicit retry policy.
    pub fn with_config(inner: C, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Access the wrapped client.
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: CloudClient> CloudClient for RetryingClient<C> {
    fn call(&self, op: ApiOp, params: &Params) -> Result<Value> {
        let result = with_retry(&self.config, Some(&LogCallback), || {
            self.inner.call(op, params)
        });

        match result {
            Err(e) if op.is_teardown() && e.is_ignorable_on_delete() => {
                log::debug!("{op}: target already gone, treating as success");
                Ok(Value::Null)
            }
            other => other,
        }
    }

    fn account_id(&self) -> Result<String> {
        with_retry(&self.config, Some(&LogCallback), || self.inner.account_id())
    }

    fn region(&self) -> Result<String> {
        self.inner.region()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AwsError;
    use std::cell::Cell;
    use std::time::Duration;

    struct FlakyClient {
        failures_before_success: Cell<u32>,
        not_found_on_delete: bool,
    }

    impl CloudClient for FlakyClient {
        fn call(&self, op: ApiOp, _params: &Params) -> Result<Value> {
            if op.is_teardown() && self.not_found_on_delete {
                return Err(AwsError::NotFound {
                    name: "gone".to_string(),
                });
            }
            let remaining = self.failures_before_success.get();
            if remaining > 0 {
                self.failures_before_success.set(remaining - 1);
                return Err(AwsError::Throttled {
                    message: "rate exceeded".to_string(),
                });
            }
            Ok(Value::String("ok".to_string()))
        }

        fn account_id(&self) -> Result<String> {
            Ok("123456789012".to_string())
        }

        fn region(&self) -> Result<String> {
            Ok("us-west-2".to_string())
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            backoff_factor: 1.0,
            max_delay: Duration::from_millis(5),
        }
    }

    #[test]
    fn retries_transient_errors_until_success() {
        let client = RetryingClient::with_config(
            FlakyClient {
                failures_before_success: Cell::new(2),
                not_found_on_delete: false,
            },
            fast_retry(),
        );
        let result = client.call(ApiOp::CreateFunction, &Params::new()).unwrap();
        assert_eq!(result, Value::String("ok".to_string()));
    }

    #[test]
    fn exhausted_retries_surface_the_error() {
        let client = RetryingClient::with_config(
            FlakyClient {
                failures_before_success: Cell::new(10),
                not_found_on_delete: false,
            },
            fast_retry(),
        );
        let result = client.call(ApiOp::CreateFunction, &Params::new());
        assert!(matches!(result, Err(AwsError::Throttled { .. })));
    }

    #[test]
    fn delete_of_missing_resource_is_success() {
        let client = RetryingClient::with_config(
            FlakyClient {
                failures_before_success: Cell::new(0),
                not_found_on_delete: true,
            },
            fast_retry(),
        );
        let result = client.call(ApiOp::DeleteFunction, &Params::new()).unwrap();
        assert_eq!(result, Value::Null);
    }

    #[test]
    fn create_of_missing_dependency_is_not_ignored() {
        struct NotFoundClient;
        impl CloudClient for NotFoundClient {
            fn call(&self, _op: ApiOp, _params: &Params) -> Result<Value> {
                Err(AwsError::NotFound {
                    name: "missing".to_string(),
                })
            }
            fn account_id(&self) -> Result<String> {
                Ok(String::new())
            }
            fn region(&self) -> Result<String> {
                Ok(String::new())
            }
        }

        let client = RetryingClient::with_config(NotFoundClient, fast_retry());
        let result = client.call(ApiOp::CreateFunction, &Params::new());
        assert!(result.is_err());
    }
}
