//! Pipeline configuration.
//!
//! Configuration comes from defaults, a YAML file, or `NEUROADAPT_*`
//! environment variables, and is validated before a pipeline is built.
//! Durations are expressed in milliseconds on the wire.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::CacheConfig;
use crate::llm::{ProviderConfig, ProviderId};
use crate::orchestrator::{BackoffError, BackoffPolicy, RetryPolicy};

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// A setting has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// The backoff policy is unusable.
    #[error("Configuration validation failed: {0}")]
    Backoff(#[from] BackoffError),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed YAML configuration.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Configuration for the adaptation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // Provider selection
    /// Providers to try, in order, when a request names none.
    pub provider_preference_order: Vec<ProviderId>,
    /// Providers to build at startup.
    pub providers: Vec<ProviderConfig>,

    // Retry settings
    /// Transport attempts per provider before falling back.
    pub max_attempts_per_provider: u32,
    /// Re-asks after invalid output, per provider.
    pub repair_attempt_budget: u32,
    /// Backoff between retries of the same provider.
    pub backoff: BackoffPolicy,

    // Deadlines
    /// Bound on one provider call, in milliseconds.
    pub per_attempt_timeout_ms: u64,
    /// Bound on one whole adaptation, in milliseconds.
    pub overall_timeout_ms: u64,

    // Cache settings
    /// Lifetime of cached results, in milliseconds.
    pub cache_ttl_ms: u64,
    /// Maximum number of cached results. Zero disables caching.
    pub cache_max_entries: usize,

    // Concurrency
    /// Provider calls allowed at once, across all requests.
    pub max_concurrent_in_flight: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            provider_preference_order: Vec::new(),
            providers: Vec::new(),

            max_attempts_per_provider: 3,
            repair_attempt_budget: 1,
            backoff: BackoffPolicy::default(),

            per_attempt_timeout_ms: 30_000,  // 30 seconds
            overall_timeout_ms: 120_000,     // 2 minutes

            cache_ttl_ms: 600_000, // 10 minutes
            cache_max_entries: 512,

            max_concurrent_in_flight: 4,
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `NEUROADAPT_PROVIDER_ORDER`: Comma-separated provider ids
    /// - `NEUROADAPT_MAX_ATTEMPTS`: Transport attempts per provider (default: 3)
    /// - `NEUROADAPT_REPAIR_BUDGET`: Repair attempts per provider (default: 1)
    /// - `NEUROADAPT_BACKOFF_BASE_MS`: First backoff delay (default: 500)
    /// - `NEUROADAPT_BACKOFF_MULTIPLIER`: Backoff growth factor (default: 2.0)
    /// - `NEUROADAPT_BACKOFF_CAP_MS`: Maximum backoff delay (default: 8000)
    /// - `NEUROADAPT_BACKOFF_JITTER`: Jitter fraction (default: 0.2)
    /// - `NEUROADAPT_ATTEMPT_TIMEOUT_MS`: Per-attempt timeout (default: 30000)
    /// - `NEUROADAPT_OVERALL_TIMEOUT_MS`: Overall timeout (default: 120000)
    /// - `NEUROADAPT_CACHE_TTL_MS`: Cache entry lifetime (default: 600000)
    /// - `NEUROADAPT_CACHE_MAX_ENTRIES`: Cache capacity (default: 512)
    /// - `NEUROADAPT_CACHE_ENABLED`: Set to false to disable caching
    /// - `NEUROADAPT_MAX_IN_FLIGHT`: Concurrent provider calls (default: 4)
    ///
    /// Providers themselves are only configured through YAML.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value or the result
    /// fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed, or if the
    /// result fails validation.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Override settings from `NEUROADAPT_*` environment variables.
    ///
    /// Used by the CLI to layer the environment over a YAML file.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var("NEUROADAPT_PROVIDER_ORDER") {
            self.provider_preference_order = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ProviderId::from)
                .collect();
        }

        // Retry settings
        if let Ok(val) = std::env::var("NEUROADAPT_MAX_ATTEMPTS") {
            self.max_attempts_per_provider = parse_env_value(&val, "NEUROADAPT_MAX_ATTEMPTS")?;
        }

        if let Ok(val) = std::env::var("NEUROADAPT_REPAIR_BUDGET") {
            self.repair_attempt_budget = parse_env_value(&val, "NEUROADAPT_REPAIR_BUDGET")?;
        }

        if let Ok(val) = std::env::var("NEUROADAPT_BACKOFF_BASE_MS") {
            self.backoff.base_ms = parse_env_value(&val, "NEUROADAPT_BACKOFF_BASE_MS")?;
        }

        if let Ok(val) = std::env::var("NEUROADAPT_BACKOFF_MULTIPLIER") {
            self.backoff.multiplier = parse_env_value(&val, "NEUROADAPT_BACKOFF_MULTIPLIER")?;
        }

        if let Ok(val) = std::env::var("NEUROADAPT_BACKOFF_CAP_MS") {
            self.backoff.cap_ms = parse_env_value(&val, "NEUROADAPT_BACKOFF_CAP_MS")?;
        }

        if let Ok(val) = std::env::var("NEUROADAPT_BACKOFF_JITTER") {
            self.backoff.jitter = parse_env_value(&val, "NEUROADAPT_BACKOFF_JITTER")?;
        }

        // Deadlines
        if let Ok(val) = std::env::var("NEUROADAPT_ATTEMPT_TIMEOUT_MS") {
            self.per_attempt_timeout_ms = parse_env_value(&val, "NEUROADAPT_ATTEMPT_TIMEOUT_MS")?;
        }

        if let Ok(val) = std::env::var("NEUROADAPT_OVERALL_TIMEOUT_MS") {
            self.overall_timeout_ms = parse_env_value(&val, "NEUROADAPT_OVERALL_TIMEOUT_MS")?;
        }

        // Cache settings
        if let Ok(val) = std::env::var("NEUROADAPT_CACHE_TTL_MS") {
            self.cache_ttl_ms = parse_env_value(&val, "NEUROADAPT_CACHE_TTL_MS")?;
        }

        if let Ok(val) = std::env::var("NEUROADAPT_CACHE_MAX_ENTRIES") {
            self.cache_max_entries = parse_env_value(&val, "NEUROADAPT_CACHE_MAX_ENTRIES")?;
        }

        if let Ok(val) = std::env::var("NEUROADAPT_CACHE_ENABLED") {
            if !parse_env_bool(&val, "NEUROADAPT_CACHE_ENABLED")? {
                self.cache_max_entries = 0;
            }
        }

        if let Ok(val) = std::env::var("NEUROADAPT_MAX_IN_FLIGHT") {
            self.max_concurrent_in_flight = parse_env_value(&val, "NEUROADAPT_MAX_IN_FLIGHT")?;
        }

        Ok(())
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts_per_provider == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_attempts_per_provider must be greater than 0".to_string(),
            ));
        }

        self.backoff.validate()?;

        if self.per_attempt_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "per_attempt_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.overall_timeout_ms < self.per_attempt_timeout_ms {
            return Err(ConfigError::ValidationFailed(
                "overall_timeout_ms cannot be shorter than per_attempt_timeout_ms".to_string(),
            ));
        }

        if self.max_concurrent_in_flight == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_concurrent_in_flight must be greater than 0".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            if provider.id.as_str().trim().is_empty() {
                return Err(ConfigError::ValidationFailed(
                    "provider ids cannot be empty".to_string(),
                ));
            }
            if !seen.insert(&provider.id) {
                return Err(ConfigError::ValidationFailed(format!(
                    "duplicate provider id '{}'",
                    provider.id
                )));
            }
        }

        if !self.providers.is_empty() {
            if let Some(unknown) = self
                .provider_preference_order
                .iter()
                .find(|id| !seen.contains(id))
            {
                return Err(ConfigError::ValidationFailed(format!(
                    "provider_preference_order names unconfigured provider '{}'",
                    unknown
                )));
            }
        }

        Ok(())
    }

    /// Builder method to set the provider preference order.
    pub fn with_provider_order<I, P>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ProviderId>,
    {
        self.provider_preference_order = order.into_iter().map(Into::into).collect();
        self
    }

    /// Builder method to add a provider.
    pub fn with_provider(mut self, provider: ProviderConfig) -> Self {
        self.providers.push(provider);
        self
    }

    /// Builder method to set the transport attempts per provider.
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts_per_provider = max;
        self
    }

    /// Builder method to set the repair budget.
    pub fn with_repair_budget(mut self, budget: u32) -> Self {
        self.repair_attempt_budget = budget;
        self
    }

    /// Builder method to set the backoff policy.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Builder method to set the per-attempt timeout.
    pub fn with_per_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.per_attempt_timeout_ms = duration_ms(timeout);
        self
    }

    /// Builder method to set the overall timeout.
    pub fn with_overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout_ms = duration_ms(timeout);
        self
    }

    /// Builder method to set the cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_ms = duration_ms(ttl);
        self
    }

    /// Builder method to set the cache capacity.
    pub fn with_cache_max_entries(mut self, max: usize) -> Self {
        self.cache_max_entries = max;
        self
    }

    /// Builder method to set the concurrency cap.
    pub fn with_max_concurrent_in_flight(mut self, max: usize) -> Self {
        self.max_concurrent_in_flight = max;
        self
    }

    pub fn per_attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.per_attempt_timeout_ms)
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_millis(self.overall_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// Budgets and deadlines for the orchestrator.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts_per_provider: self.max_attempts_per_provider,
            repair_attempt_budget: self.repair_attempt_budget,
            backoff: self.backoff.clone(),
            per_attempt_timeout: self.per_attempt_timeout(),
            overall_timeout: self.overall_timeout(),
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new(self.cache_max_entries).with_ttl(self.cache_ttl())
    }
}

fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderKind;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_attempts_per_provider, 3);
        assert_eq!(config.repair_attempt_budget, 1);
        assert_eq!(config.per_attempt_timeout(), Duration::from_secs(30));
        assert_eq!(config.overall_timeout(), Duration::from_secs(120));
        assert_eq!(config.cache_ttl(), Duration::from_secs(600));
        assert_eq!(config.cache_max_entries, 512);
        assert_eq!(config.max_concurrent_in_flight, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::new()
            .with_provider_order(["b", "a"])
            .with_max_attempts(5)
            .with_repair_budget(2)
            .with_backoff(BackoffPolicy::fixed(10, 1.5, 100))
            .with_per_attempt_timeout(Duration::from_secs(2))
            .with_overall_timeout(Duration::from_secs(10))
            .with_cache_ttl(Duration::from_secs(1))
            .with_cache_max_entries(8)
            .with_max_concurrent_in_flight(2);

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts_per_provider, 5);
        assert_eq!(policy.repair_attempt_budget, 2);
        assert_eq!(policy.per_attempt_timeout, Duration::from_secs(2));
        assert_eq!(policy.overall_timeout, Duration::from_secs(10));
        assert_eq!(policy.backoff.base_ms, 10);

        let cache = config.cache_config();
        assert_eq!(cache.max_entries, 8);
        assert_eq!(cache.ttl, Duration::from_secs(1));
        assert_eq!(
            config.provider_preference_order,
            vec![ProviderId::from("b"), ProviderId::from("a")]
        );
    }

    #[test]
    fn test_validation_invalid_attempts() {
        let result = PipelineConfig::default().with_max_attempts(0).validate();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("max_attempts_per_provider"));
    }

    #[test]
    fn test_validation_timeouts() {
        let result = PipelineConfig::default()
            .with_per_attempt_timeout(Duration::from_secs(60))
            .with_overall_timeout(Duration::from_secs(30))
            .validate();
        assert!(result.unwrap_err().to_string().contains("overall_timeout_ms"));

        let result = PipelineConfig::default()
            .with_per_attempt_timeout(Duration::ZERO)
            .validate();
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_backoff() {
        let result = PipelineConfig::default()
            .with_backoff(BackoffPolicy::fixed(100, 0.5, 1_000))
            .validate();
        assert!(matches!(result, Err(ConfigError::Backoff(BackoffError::Multiplier(_)))));
    }

    #[test]
    fn test_validation_unknown_provider_in_order() {
        let result = PipelineConfig::default()
            .with_provider(ProviderConfig::new("a", ProviderKind::Anthropic))
            .with_provider_order(["a", "ghost"])
            .validate();
        assert!(result.unwrap_err().to_string().contains("ghost"));
    }

    #[test]
    fn test_validation_duplicate_provider() {
        let result = PipelineConfig::default()
            .with_provider(ProviderConfig::new("a", ProviderKind::Anthropic))
            .with_provider(ProviderConfig::new("a", ProviderKind::OpenAiCompatible))
            .validate();
        assert!(result.unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn test_from_yaml_str_partial() {
        let yaml = r#"
provider_preference_order: [openrouter, anthropic]
max_attempts_per_provider: 2
backoff:
  base_ms: 250
providers:
  - id: openrouter
    kind: openrouter
    model: moonshotai/kimi-k2.5
  - id: anthropic
    kind: anthropic
"#;
        let config = PipelineConfig::from_yaml_str(yaml).expect("valid yaml");
        assert_eq!(config.max_attempts_per_provider, 2);
        assert_eq!(config.backoff.base_ms, 250);
        assert_eq!(config.backoff.cap_ms, 8_000);
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].kind, ProviderKind::OpenAiCompatible);
        assert_eq!(config.providers[0].model.as_deref(), Some("moonshotai/kimi-k2.5"));
        assert_eq!(config.overall_timeout_ms, 120_000);
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "cache_max_entries: 0\nmax_concurrent_in_flight: 1").expect("write");

        let config = PipelineConfig::from_yaml_file(file.path()).expect("loads");
        assert_eq!(config.cache_max_entries, 0);
        assert_eq!(config.max_concurrent_in_flight, 1);
    }

    #[test]
    fn test_from_yaml_file_missing() {
        let result = PipelineConfig::from_yaml_file("/nonexistent/neuroadapt.yaml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_from_yaml_rejects_invalid_values() {
        let result = PipelineConfig::from_yaml_str("max_concurrent_in_flight: 0");
        assert!(matches!(result, Err(ConfigError::ValidationFailed(_))));

        let result = PipelineConfig::from_yaml_str("max_attempts_per_provider: many");
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_parse_env_value() {
        let val: u32 = parse_env_value("42", "TEST").expect("parses");
        assert_eq!(val, 42);
        let val: f64 = parse_env_value(" 1.5 ", "TEST").expect("parses");
        assert!((val - 1.5).abs() < f64::EPSILON);

        let result: Result<u32, _> = parse_env_value("abc", "TEST_KEY");
        assert!(matches!(result, Err(ConfigError::InvalidValue { key, .. }) if key == "TEST_KEY"));
    }

    #[test]
    fn test_parse_env_bool() {
        assert!(parse_env_bool("true", "TEST").expect("parses"));
        assert!(parse_env_bool("ON", "TEST").expect("parses"));
        assert!(!parse_env_bool("0", "TEST").expect("parses"));
        assert!(parse_env_bool("maybe", "TEST").is_err());
    }
}
