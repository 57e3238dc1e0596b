//! ARN parsing and formatting.

use crate::error::{AwsError, Result};
use regex::Regex;
use std::sync::OnceLock;

/// A parsed Amazon Resource Name.
///
/// The resource portion is kept verbatim, including any `:` or `/`
/// separators, since its shape varies per service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arn {
    pub partition: String,
    pub service: String,
    pub region: String,
    pub account_id: String,
    pub resource: String,
}

fn arn_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^arn:(?P<partition>[^:]+):(?P<service>[^:]+):(?P<region>[^:]*):(?P<account>[^:]*):(?P<resource>.+)$")
            .expect("ARN regex is valid")
    })
}

impl Arn {
    /// Parse an ARN string.
    pub fn parse(arn: &str) -> Result<Self> {
        let caps = arn_regex()
            .captures(arn)
            .ok_or_else(|| AwsError::InvalidRequest {
                message: format!("not a valid ARN: {arn}"),
            })?;

        Ok(Self {
            partition: caps["partition"].to_string(),
            service: caps["service"].to_string(),
            region: caps["region"].to_string(),
            account_id: caps["account"].to_string(),
            resource: caps["resource"].to_string(),
        })
    }

    /// Whether a string looks like an ARN at all.
    pub fn is_arn(value: &str) -> bool {
        arn_regex().is_match(value)
    }
}

impl std::fmt::Display for Arn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "arn:{}:{}:{}:{}:{}",
            self.partition, self.service, self.region, self.account_id, self.resource
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lambda_arn() {
        let arn = Arn::parse("arn:aws:lambda:us-west-2:123456789012:function:app-dev").unwrap();
        assert_eq!(arn.service, "lambda");
        assert_eq!(arn.region, "us-west-2");
        assert_eq!(arn.account_id, "123456789012");
        assert_eq!(arn.resource, "function:app-dev");
    }

    #[test]
    fn test_parse_iam_arn_has_empty_region() {
        let arn = Arn::parse("arn:aws:iam::123456789012:role/app-dev").unwrap();
        assert_eq!(arn.service, "iam");
        assert_eq!(arn.region, "");
        assert_eq!(arn.resource, "role/app-dev");
    }

    #[test]
    fn test_round_trip() {
        let text = "arn:aws:sns:us-east-1:123456789012:mytopic";
        assert_eq!(Arn::parse(text).unwrap().to_string(), text);
    }

    #[test]
    fn test_is_arn() {
        assert!(Arn::is_arn("arn:aws:sqs:us-east-1:123456789012:myqueue"));
        assert!(!Arn::is_arn("myqueue"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Arn::parse("not-an-arn").is_err());
    }
}
