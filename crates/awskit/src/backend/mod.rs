//! Backend implementations of [`CloudClient`](crate::CloudClient).
//!
//! The engine only sees the trait; concrete backends decide how an
//! operation reaches the provider. The CLI backend shells out to the
//! `aws` command line tool, which keeps credentials, signing, and wire
//! formats entirely out of this codebase.

pub mod aws_cli;

use crate::client::RetryingClient;
use crate::error::Result;

/// Get the default backend (the `aws` CLI) wrapped in bounded retry.
pub fn default_backend() -> Result<RetryingClient<aws_cli::AwsCliBackend>> {
    Ok(RetryingClient::new(aws_cli::AwsCliBackend::new()?))
}
