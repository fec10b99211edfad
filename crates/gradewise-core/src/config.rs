use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Tunables for the rewrite engine. Every field has a default, so partial
/// JSON documents are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache_capacity: usize,
    pub cache_ttl_ms: u64,
    pub max_requests_per_minute: usize,
    pub max_iterations: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub max_retries: u32,
    pub debounce_delay_ms: u64,
    pub retry_poll_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 50,
            cache_ttl_ms: 30 * 60 * 1000,
            max_requests_per_minute: 10,
            max_iterations: 3,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 300_000,
            max_retries: 3,
            debounce_delay_ms: 1_500,
            retry_poll_interval_ms: 1_000,
        }
    }
}

fn env_override<T>(name: &str, slot: &mut T) -> anyhow::Result<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Ok(raw) = std::env::var(name) {
        *slot = raw.trim().parse().with_context(|| format!("invalid value for {}: {:?}", name, raw))?;
    }
    Ok(())
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let cfg: EngineConfig = serde_json::from_str(json)?;
        cfg.validated()
    }

    /// Defaults overridden by any `GRADEWISE_*` variables that are set.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> anyhow::Result<Self> {
        env_override("GRADEWISE_CACHE_CAPACITY", &mut self.cache_capacity)?;
        env_override("GRADEWISE_CACHE_TTL_MS", &mut self.cache_ttl_ms)?;
        env_override("GRADEWISE_MAX_REQUESTS_PER_MINUTE", &mut self.max_requests_per_minute)?;
        env_override("GRADEWISE_MAX_ITERATIONS", &mut self.max_iterations)?;
        env_override("GRADEWISE_RETRY_BASE_DELAY_MS", &mut self.retry_base_delay_ms)?;
        env_override("GRADEWISE_RETRY_MAX_DELAY_MS", &mut self.retry_max_delay_ms)?;
        env_override("GRADEWISE_MAX_RETRIES", &mut self.max_retries)?;
        env_override("GRADEWISE_DEBOUNCE_DELAY_MS", &mut self.debounce_delay_ms)?;
        env_override("GRADEWISE_RETRY_POLL_INTERVAL_MS", &mut self.retry_poll_interval_ms)?;
        self.validated()
    }

    fn validated(self) -> anyhow::Result<Self> {
        if self.max_iterations == 0 {
            anyhow::bail!("max_iterations must be at least 1");
        }
        if self.cache_capacity == 0 {
            anyhow::bail!("cache_capacity must be at least 1");
        }
        Ok(self)
    }

    pub fn cache_ttl(&self) -> Duration { Duration::from_millis(self.cache_ttl_ms) }
    pub fn debounce_delay(&self) -> Duration { Duration::from_millis(self.debounce_delay_ms) }
    pub fn retry_poll_interval(&self) -> Duration { Duration::from_millis(self.retry_poll_interval_ms.max(1)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_constants() {
        let c = EngineConfig::default();
        assert_eq!(c.cache_capacity, 50);
        assert_eq!(c.cache_ttl(), Duration::from_secs(1800));
        assert_eq!(c.max_requests_per_minute, 10);
        assert_eq!(c.max_iterations, 3);
        assert_eq!(c.debounce_delay(), Duration::from_millis(1500));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c = EngineConfig::from_json_str(r#"{"cache_capacity": 5}"#).unwrap();
        assert_eq!(c.cache_capacity, 5);
        assert_eq!(c.max_retries, 3);
    }

    #[test]
    fn zero_iterations_rejected() {
        assert!(EngineConfig::from_json_str(r#"{"max_iterations": 0}"#).is_err());
    }

    #[test]
    fn env_overrides_apply_and_validate() {
        std::env::set_var("GRADEWISE_MAX_REQUESTS_PER_MINUTE", "25");
        let c = EngineConfig::from_env().unwrap();
        assert_eq!(c.max_requests_per_minute, 25);
        std::env::set_var("GRADEWISE_MAX_REQUESTS_PER_MINUTE", "lots");
        assert!(EngineConfig::from_env().is_err());
        std::env::remove_var("GRADEWISE_MAX_REQUESTS_PER_MINUTE");
    }
}
