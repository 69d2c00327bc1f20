//! Operator configuration.

use std::path::Path;
use std::time::Duration;

use keel_core::{Error, Result};
use keel_reconciler::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Settings shared by every pipeline the operator assembles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Operator name, used for the managed-by label and descriptor names.
    #[serde(default = "default_project_name")]
    pub project_name: String,

    /// Provider tag, e.g. "aws", "azure" or "kvm".
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Cluster DNS service IP handed to tenant clusters.
    #[serde(default = "default_dns_ip")]
    pub dns_ip: String,

    /// Registry the tenant addons pull images from.
    #[serde(default = "default_registry_domain")]
    pub registry_domain: String,

    #[serde(default = "default_cluster_ip_range")]
    pub cluster_ip_range: String,

    #[serde(default)]
    pub calico_address: String,

    #[serde(default)]
    pub calico_prefix_length: String,

    /// Base domain the tenant API endpoints live under.
    #[serde(default)]
    pub base_domain: String,

    #[serde(default)]
    pub retry: RetrySettings,
}

/// Retry settings for resource side effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            project_name: default_project_name(),
            provider: default_provider(),
            dns_ip: default_dns_ip(),
            registry_domain: default_registry_domain(),
            cluster_ip_range: default_cluster_ip_range(),
            calico_address: String::new(),
            calico_prefix_length: String::new(),
            base_domain: String::new(),
            retry: RetrySettings::default(),
        }
    }
}

impl OperatorConfig {
    /// Set the provider tag.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Set the base domain.
    #[must_use]
    pub fn base_domain(mut self, domain: impl Into<String>) -> Self {
        self.base_domain = domain.into();
        self
    }

    /// Set the retry settings.
    #[must_use]
    pub const fn retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::parse_failed("toml", format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::file_read_failed(path, e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Overlay `KEEL_*` environment variables onto this config.
    #[must_use]
    pub fn with_env(mut self) -> Self {
        let overlay = |target: &mut String, var: &str| {
            if let Ok(value) = std::env::var(var) {
                *target = value;
            }
        };

        overlay(&mut self.project_name, "KEEL_PROJECT_NAME");
        overlay(&mut self.provider, "KEEL_PROVIDER");
        overlay(&mut self.dns_ip, "KEEL_DNS_IP");
        overlay(&mut self.registry_domain, "KEEL_REGISTRY_DOMAIN");
        overlay(&mut self.cluster_ip_range, "KEEL_CLUSTER_IP_RANGE");
        overlay(&mut self.calico_address, "KEEL_CALICO_ADDRESS");
        overlay(&mut self.calico_prefix_length, "KEEL_CALICO_PREFIX_LENGTH");
        overlay(&mut self.base_domain, "KEEL_BASE_DOMAIN");

        if let Ok(attempts) = std::env::var("KEEL_RETRY_MAX_ATTEMPTS") {
            if let Ok(parsed) = attempts.parse() {
                self.retry.max_attempts = parsed;
            }
        }

        self
    }

    /// Defaults overlaid with `KEEL_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Reject configs missing a required field.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("project_name", &self.project_name),
            ("provider", &self.provider),
            ("dns_ip", &self.dns_ip),
            ("registry_domain", &self.registry_domain),
            ("cluster_ip_range", &self.cluster_ip_range),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(Error::invalid_config(format!("{field} must not be empty")));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::invalid_config(
                "retry.backoff_multiplier must be at least 1.0",
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(self.retry.max_attempts)
            .with_initial_delay(Duration::from_millis(self.retry.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.retry.max_delay_ms))
            .with_backoff_multiplier(self.retry.backoff_multiplier)
            .with_jitter(self.retry.jitter)
    }
}

fn default_project_name() -> String {
    "cluster-operator".to_string()
}

fn default_provider() -> String {
    "aws".to_string()
}

fn default_dns_ip() -> String {
    "172.31.0.10".to_string()
}

fn default_registry_domain() -> String {
    "quay.io".to_string()
}

fn default_cluster_ip_range() -> String {
    "172.31.0.0/16".to_string()
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_delay_ms() -> u64 {
    1_000
}

const fn default_max_delay_ms() -> u64 {
    10_000
}

const fn default_backoff_multiplier() -> f64 {
    2.0
}

const fn default_jitter() -> bool {
    true
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_empty_document_takes_defaults() {
        let config = OperatorConfig::from_toml_str("").unwrap();
        assert_eq!(config, OperatorConfig::default());
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_parse_partial_document() {
        let config = OperatorConfig::from_toml_str(
            r#"
provider = "kvm"
base_domain = "k8s.example.com"

[retry]
max_attempts = 5
initial_delay_ms = 10
"#,
        )
        .unwrap();

        assert_eq!(config.provider, "kvm");
        assert_eq!(config.base_domain, "k8s.example.com");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.max_delay_ms, 10_000);

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_delay, Duration::from_millis(10));
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        let err = OperatorConfig::from_toml_str("provider = ").unwrap_err();
        assert!(matches!(err, Error::ParseFailed { .. }));
    }

    #[test]
    fn test_empty_required_field_is_rejected() {
        let err = OperatorConfig::from_toml_str("dns_ip = \"\"").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
        assert!(err.to_string().contains("dns_ip"));
    }

    #[test]
    fn test_backoff_multiplier_below_one_is_rejected() {
        let config = OperatorConfig::default().retry(RetrySettings {
            backoff_multiplier: 0.5,
            ..RetrySettings::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = OperatorConfig::from_path(Path::new("/nonexistent/keel.toml")).unwrap_err();
        assert!(matches!(err, Error::FileReadFailed { .. }));
    }
}
