// AWS SDK configuration

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_sqs::config::Credentials;
use tracing::info;

const CREDENTIALS_PROVIDER_NAME: &str = "sqspoller";

/// Region and static credentials; unset values fall back to the default provider chain
#[derive(Debug, Clone, Default)]
pub struct AwsSettings {
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl AwsSettings {
    fn static_credentials(&self) -> Option<Credentials> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => Some(
                Credentials::new(id, secret, None, None, CREDENTIALS_PROVIDER_NAME),
            ),
            _ => None,
        }
    }
}

/// Resolve the shared SDK configuration used by the SQS and SNS clients
pub async fn load_sdk_config(settings: &AwsSettings) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());

    if let Some(region) = &settings.region {
        loader = loader.region(Region::new(region.clone()));
    }
    let static_credentials = settings.static_credentials();
    let uses_static_credentials = static_credentials.is_some();
    if let Some(credentials) = static_credentials {
        loader = loader.credentials_provider(credentials);
    }

    let config = loader.load().await;
    info!(
        region = config.region().map(|r| r.as_ref()).unwrap_or("<unset>"),
        static_credentials = uses_static_credentials,
        "AWS configuration loaded"
    );
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_credentials_need_both_keys() {
        let mut settings = AwsSettings {
            access_key_id: Some("AKIDEXAMPLE".into()),
            ..Default::default()
        };
        assert!(settings.static_credentials().is_none());

        settings.secret_access_key = Some("secret".into());
        let credentials = settings.static_credentials().unwrap();
        assert_eq!(credentials.access_key_id(), "AKIDEXAMPLE");

        settings.secret_access_key = Some(String::new());
        assert!(settings.static_credentials().is_none());
    }

    #[tokio::test]
    async fn test_explicit_region_is_used() {
        let settings = AwsSettings {
            region: Some("eu-west-1".into()),
            access_key_id: Some("AKIDEXAMPLE".into()),
            secret_access_key: Some("secret".into()),
        };
        let config = load_sdk_config(&settings).await;
        assert_eq!(config.region().map(|r| r.as_ref()), Some("eu-west-1"));
    }
}
