//! Engine configuration
//!
//! Loaded from TOML (camelCase keys, every key optional) or built in code
//! with the `with_*` methods.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Operations per call accepted by the remote batch endpoint
pub const SERVER_OPERATION_CAP: usize = 100;

/// Default chunk size
pub const DEFAULT_MAX_OPERATIONS_PER_CHUNK: usize = SERVER_OPERATION_CAP;

/// Retry policy for chunk commits that fail at the transport level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Whether retries happen at all
    pub enabled: bool,
    /// Extra attempts after the first
    pub max_retries: u32,
    /// Pause between attempts in milliseconds
    pub retry_delay_ms: u64,
    /// Error messages containing any of these (case-insensitive) are retryable
    pub retryable_error_substrings: Vec<String>,
}

impl RetryPolicy {
    /// Enabled policy with default limits
    #[inline]
    #[must_use]
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// With max retries
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// With delay between attempts
    #[inline]
    #[must_use]
    pub fn with_retry_delay_ms(mut self, retry_delay_ms: u64) -> Self {
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    /// With retryable substrings
    #[must_use]
    pub fn with_retryable_substrings<I, S>(mut self, substrings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retryable_error_substrings = substrings.into_iter().map(Into::into).collect();
        self
    }

    /// Delay between attempts
    #[inline]
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Whether an error message is classified as retryable
    ///
    /// Classification only; callers still check `enabled` and the attempt count.
    #[must_use]
    pub fn should_retry(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.retryable_error_substrings
            .iter()
            .any(|needle| message.contains(&needle.to_lowercase()))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retries: 3,
            retry_delay_ms: 1000,
            retryable_error_substrings: vec![
                "429".to_string(),
                "503".to_string(),
                "throttl".to_string(),
                "timeout".to_string(),
                "timed out".to_string(),
                "network".to_string(),
            ],
        }
    }
}

/// Batch engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Upper bound on operations per network call
    pub max_operations_per_chunk: usize,
    /// Dispatch all chunks at once instead of one after another
    pub concurrent_chunks: bool,
    /// Retry policy for transport failures
    pub retry_policy: Option<RetryPolicy>,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With chunk size
    #[inline]
    #[must_use]
    pub fn with_max_operations_per_chunk(mut self, max: usize) -> Self {
        self.max_operations_per_chunk = max;
        self
    }

    /// With concurrency mode
    #[inline]
    #[must_use]
    pub fn with_concurrent_chunks(mut self, concurrent: bool) -> Self {
        self.concurrent_chunks = concurrent;
        self
    }

    /// With retry policy
    #[inline]
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Retry policy, if one is configured and enabled
    #[must_use]
    pub fn active_retry_policy(&self) -> Option<&RetryPolicy> {
        self.retry_policy.as_ref().filter(|policy| policy.enabled)
    }

    /// Check the configuration before execution
    ///
    /// # Errors
    /// - `ConfigError::ZeroChunkSize` if `max_operations_per_chunk` is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_operations_per_chunk == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.max_operations_per_chunk > SERVER_OPERATION_CAP {
            tracing::warn!(
                max_operations_per_chunk = self.max_operations_per_chunk,
                server_cap = SERVER_OPERATION_CAP,
                "chunk size exceeds the usual server operation cap"
            );
        }
        Ok(())
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// - `ConfigError::Parse` if the text is not valid TOML for this shape
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    /// - `ConfigError::Io` if the file cannot be read
    /// - `ConfigError::Parse` if its contents do not parse
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&read_config(path.as_ref())?)
    }

    /// Layer a TOML document over this configuration
    ///
    /// Keys present in `text` replace the current values, nested tables key
    /// by key; omitted keys keep the values already set.
    ///
    /// # Errors
    /// - `ConfigError::Parse` if the text is not valid TOML
    /// - `ConfigError::Value` if the merged keys do not fit this shape
    pub fn overlay_toml_str(&self, text: &str) -> Result<Self, ConfigError> {
        let overlay: toml::Table = toml::from_str(text)?;
        let mut merged = serde_json::to_value(self)?;
        merge_values(&mut merged, serde_json::to_value(overlay)?);
        Ok(serde_json::from_value(merged)?)
    }

    /// Layer a TOML file over this configuration
    ///
    /// # Errors
    /// - `ConfigError::Io` if the file cannot be read
    /// - otherwise as `overlay_toml_str`
    pub fn overlay_file(&self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        self.overlay_toml_str(&read_config(path.as_ref())?)
    }
}

fn read_config(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn merge_values(base: &mut serde_json::Value, overlay: serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overlay)) => {
            for (key, value) in overlay {
                merge_values(base.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (slot, value) => *slot = value,
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_operations_per_chunk: DEFAULT_MAX_OPERATIONS_PER_CHUNK,
            concurrent_chunks: false,
            retry_policy: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_operations_per_chunk, 100);
        assert!(!config.concurrent_chunks);
        assert!(config.retry_policy.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let config = EngineConfig::new().with_max_operations_per_chunk(0);
        assert!(matches!(config.validate(), Err(ConfigError::ZeroChunkSize)));
    }

    #[test]
    fn toml_with_omitted_keys_uses_defaults() {
        let config = EngineConfig::from_toml_str("concurrentChunks = true").unwrap();
        assert!(config.concurrent_chunks);
        assert_eq!(config.max_operations_per_chunk, 100);
    }

    #[test]
    fn toml_retry_policy_section() {
        let text = r#"
            maxOperationsPerChunk = 20

            [retryPolicy]
            enabled = true
            maxRetries = 2
            retryableErrorSubstrings = ["reset"]
        "#;
        let config = EngineConfig::from_toml_str(text).unwrap();
        let policy = config.active_retry_policy().unwrap();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.retry_delay_ms, 1000);
        assert!(policy.should_retry("Connection RESET by peer"));
        assert!(!policy.should_retry("404 not found"));
    }

    #[test]
    fn disabled_policy_is_not_active() {
        let config = EngineConfig::new().with_retry_policy(RetryPolicy::default());
        assert!(config.active_retry_policy().is_none());
    }

    #[test]
    fn default_substrings_cover_throttling() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry("HTTP 429 Too Many Requests"));
        assert!(policy.should_retry("request was Throttled"));
        assert!(!policy.should_retry("The request ETag value does not match"));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = EngineConfig::from_toml_str("maxOperationsPerChunk = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"concurrentChunks = true\n").unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();

        assert!(config.concurrent_chunks);
        assert_eq!(config.max_operations_per_chunk, DEFAULT_MAX_OPERATIONS_PER_CHUNK);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = EngineConfig::from_file("/nonexistent/engine.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn overlay_keeps_keys_the_file_omits() {
        let base = EngineConfig::new()
            .with_max_operations_per_chunk(4)
            .with_concurrent_chunks(true);

        let merged = base.overlay_toml_str("maxOperationsPerChunk = 10").unwrap();

        assert_eq!(merged.max_operations_per_chunk, 10);
        assert!(merged.concurrent_chunks);
    }

    #[test]
    fn overlay_merges_retry_policy_fields() {
        let base = EngineConfig::new()
            .with_retry_policy(RetryPolicy::enabled().with_retry_delay_ms(250));

        let merged = base
            .overlay_toml_str("[retryPolicy]\nmaxRetries = 7\n")
            .unwrap();

        let policy = merged.active_retry_policy().unwrap();
        assert_eq!(policy.max_retries, 7);
        assert_eq!(policy.retry_delay_ms, 250);
    }

    #[test]
    fn overlay_rejects_mistyped_value() {
        let err = EngineConfig::new()
            .overlay_toml_str("concurrentChunks = \"yes\"")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Value(_)));
    }
}
