//! Error types for cloud provider operations.
//!
//! Errors are categorized to enable smart retry logic and appropriate
//! user feedback. The categories mirror the failure modes of the AWS
//! control plane: throttling and IAM propagation lag are transient,
//! everything else fails fast.

use thiserror::Error;

/// Categories of provider errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Request throttled by the service (transient, retryable)
    Throttled,
    /// Resource created but not yet visible to a dependent service,
    /// e.g. a freshly created role that Lambda cannot assume yet
    NotPropagated,
    /// Resource does not exist
    NotFound,
    /// Caller lacks permission for the operation
    AccessDenied,
    /// Request payload exceeds a service limit
    TooLarge,
    /// Malformed request rejected by the service
    InvalidRequest,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled | Self::NotPropagated)
    }

    /// Whether this error can be safely ignored during teardown
    /// (deleting something that is already gone).
    pub fn is_ignorable_on_delete(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Throttled => "Request throttled by the service",
            Self::NotPropagated => "Resource not yet propagated",
            Self::NotFound => "Resource not found",
            Self::AccessDenied => "Permission denied",
            Self::TooLarge => "Request exceeds a service limit",
            Self::InvalidRequest => "Malformed request",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Throttled => "Wait a moment and deploy again",
            Self::NotPropagated => "Wait for the resource to propagate and deploy again",
            Self::NotFound => "Verify the resource exists or deploy from scratch",
            Self::AccessDenied => "Check the credentials and IAM permissions of the caller",
            Self::TooLarge => "Reduce the size of the deployment package",
            Self::InvalidRequest => "Check the request parameters in the deployment plan",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors returned by the cloud client boundary.
#[derive(Debug, Error)]
pub enum AwsError {
    /// The service rejected the request with a throttling code
    #[error("throttled: {message}")]
    Throttled {
        /// Error message from the service
        message: String,
    },

    /// A dependent resource has not propagated yet, e.g. a new IAM role
    /// that cannot be assumed by Lambda for a few seconds after creation
    #[error("resource not yet propagated: {message}")]
    NotPropagated {
        /// Error message from the service
        message: String,
    },

    /// Resource does not exist
    #[error("resource not found: {name}")]
    NotFound {
        /// Identifier of the missing resource
        name: String,
    },

    /// Caller lacks permission
    #[error("access denied: {message}")]
    AccessDenied {
        /// Details about the denied operation
        message: String,
    },

    /// Request payload exceeds a service limit
    #[error("request too large: {size} bytes exceeds the {limit} byte limit")]
    TooLarge {
        /// Measured payload size in bytes
        size: u64,
        /// Service limit in bytes
        limit: u64,
    },

    /// Malformed request rejected by the service
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Description of what was rejected
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl AwsError {
    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            AwsError::Throttled { .. } => ErrorCategory::Throttled,
            AwsError::NotPropagated { .. } => ErrorCategory::NotPropagated,
            AwsError::NotFound { .. } => ErrorCategory::NotFound,
            AwsError::AccessDenied { .. } => ErrorCategory::AccessDenied,
            AwsError::TooLarge { .. } => ErrorCategory::TooLarge,
            AwsError::InvalidRequest { .. } => ErrorCategory::InvalidRequest,
            _ => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Whether this error can be safely ignored during teardown.
    pub fn is_ignorable_on_delete(&self) -> bool {
        self.category().is_ignorable_on_delete()
    }

    /// Create an error from a service error code and message.
    ///
    /// Maps the well-known control plane error codes onto categories.
    pub fn from_service_code(code: &str, message: &str) -> Self {
        match code {
            "ThrottlingException" | "TooManyRequestsException" | "Throttling" => {
                AwsError::Throttled {
                    message: message.to_string(),
                }
            }
            // Lambda reports a role it cannot assume yet as a validation
            // error with this wording.
            "InvalidParameterValueException"
                if message.contains("cannot be assumed") || message.contains("role defined") =>
            {
                AwsError::NotPropagated {
                    message: message.to_string(),
                }
            }
            "ResourceNotFoundException" | "NoSuchEntity" | "NotFoundException" => {
                AwsError::NotFound {
                    name: message.to_string(),
                }
            }
            "AccessDeniedException" | "AccessDenied" | "UnauthorizedOperation" => {
                AwsError::AccessDenied {
                    message: message.to_string(),
                }
            }
            "RequestEntityTooLargeException" => AwsError::TooLarge {
                size: 0,
                limit: crate::LAMBDA_PACKAGE_LIMIT_BYTES,
            },
            "ValidationException" | "InvalidParameterValueException" | "BadRequestException" => {
                AwsError::InvalidRequest {
                    message: message.to_string(),
                }
            }
            _ => AwsError::Other(format!("{code}: {message}")),
        }
    }
}

/// Result type for cloud client operations.
pub type Result<T> = std::result::Result<T, AwsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_retryable() {
        assert!(ErrorCategory::Throttled.is_retryable());
        assert!(ErrorCategory::NotPropagated.is_retryable());
        assert!(!ErrorCategory::NotFound.is_retryable());
        assert!(!ErrorCategory::AccessDenied.is_retryable());
    }

    #[test]
    fn test_category_ignorable_on_delete() {
        assert!(ErrorCategory::NotFound.is_ignorable_on_delete());
        assert!(!ErrorCategory::Throttled.is_ignorable_on_delete());
    }

    #[test]
    fn test_from_service_code_throttled() {
        let err = AwsError::from_service_code("ThrottlingException", "slow down");
        assert_eq!(err.category(), ErrorCategory::Throttled);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_from_service_code_role_not_assumable() {
        let err = AwsError::from_service_code(
            "InvalidParameterValueException",
            "The role defined for the function cannot be assumed by Lambda.",
        );
        assert_eq!(err.category(), ErrorCategory::NotPropagated);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_from_service_code_invalid_request() {
        let err = AwsError::from_service_code("ValidationException", "bad memory size");
        assert_eq!(err.category(), ErrorCategory::InvalidRequest);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_from_service_code_not_found() {
        let err = AwsError::from_service_code("ResourceNotFoundException", "no such function");
        assert!(err.is_ignorable_on_delete());
    }
}
