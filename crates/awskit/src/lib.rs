//! # awskit
//!
//! The cloud client boundary for jangada.
//!
//! This crate defines the vocabulary of operations the deployment engine
//! issues ([`ApiOp`]), the error taxonomy with retry categories
//! ([`AwsError`]), bounded retry with backoff ([`with_retry`],
//! [`RetryingClient`]), ARN parsing ([`Arn`]), and an in-memory fake
//! cloud ([`FakeCloud`]) that tests run against.
//!
//! The engine only ever talks to [`CloudClient`]: a named operation plus a
//! JSON parameter mapping in, the interesting value of the response out.
//! Wire formats, signing, and per-service SDK details belong to concrete
//! backends behind that trait.

pub mod arn;
pub mod backend;
pub mod client;
pub mod error;
pub mod fake;
pub mod retry;
pub mod types;

// Re-export main types at crate root
pub use arn::Arn;
pub use backend::{aws_cli::AwsCliBackend, default_backend};
pub use client::{CloudClient, Params, RetryingClient};
pub use error::{AwsError, ErrorCategory, Result};
pub use fake::FakeCloud;
pub use retry::{LogCallback, NoCallback, RetryCallback, with_retry};
pub use types::{ApiOp, LAMBDA_PACKAGE_LIMIT_BYTES, RetryConfig};
