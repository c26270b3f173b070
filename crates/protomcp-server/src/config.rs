//! Server and sampling-controller configuration (spec §4.7).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use protomcp_protocol::capabilities::ServerImplementationFlags;

/// Top-level server configuration: which optional features are implemented,
/// plus the sampling controller's admission/retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Which optional server features to advertise during `initialize`.
    #[serde(default)]
    pub implementation: ServerImplementationFlags,
    /// Sampling controller admission, timeout, and retry policy.
    #[serde(default)]
    pub sampling: SamplingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            implementation: ServerImplementationFlags::default(),
            sampling: SamplingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Default configuration, equivalent to `Default::default()`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a builder, for embedders that want to override a handful of
    /// fields without naming every struct field.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone, Default)]
pub struct ServerConfigBuilder {
    implementation: Option<ServerImplementationFlags>,
    sampling: Option<SamplingConfig>,
}

impl ServerConfigBuilder {
    /// Set which optional features the server implements.
    pub fn implementation(mut self, flags: ServerImplementationFlags) -> Self {
        self.implementation = Some(flags);
        self
    }

    /// Set the sampling controller's configuration.
    pub fn sampling(mut self, config: SamplingConfig) -> Self {
        self.sampling = Some(config);
        self
    }

    /// Build, filling unset fields with their defaults.
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            implementation: self.implementation.unwrap_or_default(),
            sampling: self.sampling.unwrap_or_default(),
        }
    }
}

/// Serde helper: `serde(with = "duration_millis")` stores a [`Duration`] as
/// whole milliseconds, since `Duration` has no native human-friendly wire form.
mod duration_millis {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Sampling controller configuration (spec §4.7 "Configuration keys").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Per-session requests-per-minute cap.
    pub max_requests_per_minute: u32,
    /// Global concurrent in-flight sampling request cap.
    pub max_concurrent_requests: u32,
    /// Largest `maxTokens` a request may ask for, independent of the
    /// per-protocol-version profile cap.
    pub max_tokens_per_request: u32,
    /// Whether the rate limit is applied per-session (`true`) or only
    /// globally (`false`).
    pub per_client_rate_limit: bool,
    /// Timeout applied to a request with no explicit override.
    #[serde(with = "duration_millis")]
    pub default_timeout: Duration,
    /// Upper bound on the effective timeout after priority scaling.
    #[serde(with = "duration_millis")]
    pub max_timeout: Duration,
    /// Retry attempts before giving up (or degrading gracefully).
    pub default_max_retries: u32,
    /// Delay added between retries, and added to the timeout on each retry.
    #[serde(with = "duration_millis")]
    pub default_retry_interval: Duration,
    /// Whether `priority` scales the effective timeout.
    pub enable_prioritization: bool,
    /// Priority used when the caller does not specify one (0-10 scale).
    pub default_priority: u8,
    /// Whether retry exhaustion returns a canned response instead of an error.
    pub graceful_degradation: bool,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: 120,
            max_concurrent_requests: 10,
            max_tokens_per_request: 8_192,
            per_client_rate_limit: true,
            default_timeout: Duration::from_secs(30),
            max_timeout: Duration::from_secs(120),
            default_max_retries: 2,
            default_retry_interval: Duration::from_secs(1),
            enable_prioritization: true,
            default_priority: 5,
            graceful_degradation: true,
        }
    }
}

impl SamplingConfig {
    /// Effective timeout for `priority` (0-10 scale) on this request, per
    /// spec §4.7: `base * (0.5 + priority/10)`, capped by `max_timeout`.
    pub fn effective_timeout(&self, priority: u8) -> Duration {
        if !self.enable_prioritization {
            return self.default_timeout;
        }
        let scale = 0.5 + (priority as f64 / 10.0);
        let scaled = self.default_timeout.mul_f64(scale);
        scaled.min(self.max_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_values() {
        let cfg = SamplingConfig::default();
        assert_eq!(cfg.max_requests_per_minute, 120);
        assert_eq!(cfg.max_concurrent_requests, 10);
        assert_eq!(cfg.max_tokens_per_request, 8_192);
        assert_eq!(cfg.default_timeout, Duration::from_secs(30));
        assert_eq!(cfg.max_timeout, Duration::from_secs(120));
        assert_eq!(cfg.default_max_retries, 2);
        assert_eq!(cfg.default_retry_interval, Duration::from_secs(1));
        assert_eq!(cfg.default_priority, 5);
        assert!(cfg.enable_prioritization);
        assert!(cfg.graceful_degradation);
        assert!(cfg.per_client_rate_limit);
    }

    #[test]
    fn priority_five_is_roughly_unscaled() {
        let cfg = SamplingConfig::default();
        // 0.5 + 5/10 = 1.0
        assert_eq!(cfg.effective_timeout(5), Duration::from_secs(30));
    }

    #[test]
    fn priority_zero_halves_the_timeout() {
        let cfg = SamplingConfig::default();
        assert_eq!(cfg.effective_timeout(0), Duration::from_secs(15));
    }

    #[test]
    fn priority_ten_is_capped_by_max_timeout() {
        let mut cfg = SamplingConfig::default();
        cfg.default_timeout = Duration::from_secs(100);
        cfg.max_timeout = Duration::from_secs(120);
        // 100 * (0.5 + 10/10) = 150, capped to 120.
        assert_eq!(cfg.effective_timeout(10), Duration::from_secs(120));
    }

    #[test]
    fn prioritization_disabled_always_uses_default_timeout() {
        let mut cfg = SamplingConfig::default();
        cfg.enable_prioritization = false;
        assert_eq!(cfg.effective_timeout(0), cfg.default_timeout);
        assert_eq!(cfg.effective_timeout(10), cfg.default_timeout);
    }
}
