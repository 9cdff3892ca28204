//! AWS SDK configuration for the harness

use aws_config::sts::AssumeRoleProvider;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use tracing::debug;

/// Session name shown in CloudTrail for assumed-role calls
pub const SESSION_NAME: &str = "pmm-integration-tests";

/// Load SDK configuration for `region`, assuming `role_arn` when given.
pub async fn load_sdk_config(region: &str, role_arn: Option<&str>) -> SdkConfig {
    let region = Region::new(region.to_string());
    let base = aws_config::defaults(BehaviorVersion::latest())
        .region(region.clone())
        .load()
        .await;

    let Some(role_arn) = role_arn else {
        return base;
    };

    debug!(role_arn, "Assuming role for AWS SDK clients");
    let provider = AssumeRoleProvider::builder(role_arn)
        .session_name(SESSION_NAME)
        .region(region.clone())
        .configure(&base)
        .build()
        .await;

    aws_config::defaults(BehaviorVersion::latest())
        .region(region)
        .credentials_provider(provider)
        .load()
        .await
}

/// Account id and partition from an ARN such as `arn:aws:iam::123456789012:role/name`
pub fn parse_account(arn: &str) -> Option<(&str, &str)> {
    let mut parts = arn.split(':');
    if parts.next()? != "arn" {
        return None;
    }
    let partition = parts.next().filter(|p| !p.is_empty())?;
    let _service = parts.next()?;
    let _region = parts.next()?;
    let account = parts.next().filter(|a| !a.is_empty())?;
    parts.next()?;
    Some((partition, account))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_account() {
        assert_eq!(
            parse_account("arn:aws:iam::123456789012:role/pmm-backup"),
            Some(("aws", "123456789012"))
        );
        assert_eq!(
            parse_account("arn:aws-us-gov:iam::210987654321:role/backup"),
            Some(("aws-us-gov", "210987654321"))
        );
        assert_eq!(parse_account("arn:aws:s3:::bucket-name"), None);
        assert_eq!(parse_account("not-an-arn"), None);
    }
}
