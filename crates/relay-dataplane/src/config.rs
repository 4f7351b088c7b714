//! Engine configuration

use relay_common::{RelayError, RelayResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::router::RoutingPolicy;

/// Modifier configuration consumed by the filter stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModifierConfig {
    /// Allowed HTTP methods, matched byte-for-byte. Empty allows everything.
    pub methods: Vec<String>,
}

impl ModifierConfig {
    /// Whitelist of the given methods
    pub fn with_methods<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            methods: methods.into_iter().map(Into::into).collect(),
        }
    }
}

/// Routing switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Send each record to one output instead of all of them
    pub split_output: bool,
    /// With `split_output`, keep every record of a session on one output
    pub recognize_tcp_sessions: bool,
}

impl RoutingConfig {
    /// Resolve the switches to a routing policy
    pub fn policy(&self) -> RelayResult<RoutingPolicy> {
        match (self.split_output, self.recognize_tcp_sessions) {
            (false, false) => Ok(RoutingPolicy::Broadcast),
            (true, false) => Ok(RoutingPolicy::RoundRobin),
            (true, true) => Ok(RoutingPolicy::SessionAffinity),
            (false, true) => Err(RelayError::Config(
                "recognize_tcp_sessions requires split_output".into(),
            )),
        }
    }
}

/// Verdict cache timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerdictCacheConfig {
    /// How long a request verdict waits for its response (milliseconds)
    pub ttl_ms: u64,
    /// Minimum gap between opportunistic sweeps (milliseconds)
    pub sweep_interval_ms: u64,
}

impl VerdictCacheConfig {
    /// TTL as a duration
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Sweep interval as a duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for VerdictCacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 2_000,
            sweep_interval_ms: 1_000,
        }
    }
}

/// Emitter configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterConfig {
    /// Filter settings
    pub modifier: ModifierConfig,
    /// Routing settings
    pub routing: RoutingConfig,
    /// Verdict cache settings
    pub verdict_cache: VerdictCacheConfig,
}

impl EmitterConfig {
    /// Check cross-field constraints
    pub fn validate(&self) -> RelayResult<()> {
        self.routing.policy()?;
        if self.verdict_cache.ttl_ms == 0 {
            return Err(RelayError::Config("verdict_cache.ttl_ms must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_resolution() {
        let cfg = RoutingConfig::default();
        assert_eq!(cfg.policy().unwrap(), RoutingPolicy::Broadcast);

        let cfg = RoutingConfig { split_output: true, recognize_tcp_sessions: false };
        assert_eq!(cfg.policy().unwrap(), RoutingPolicy::RoundRobin);

        let cfg = RoutingConfig { split_output: true, recognize_tcp_sessions: true };
        assert_eq!(cfg.policy().unwrap(), RoutingPolicy::SessionAffinity);

        let cfg = RoutingConfig { split_output: false, recognize_tcp_sessions: true };
        assert!(matches!(cfg.policy(), Err(RelayError::Config(_))));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: EmitterConfig =
            serde_json::from_str(r#"{"modifier":{"methods":["GET"]},"routing":{"split_output":true}}"#)
                .unwrap();

        assert_eq!(cfg.modifier.methods, vec!["GET".to_string()]);
        assert!(cfg.routing.split_output);
        assert!(!cfg.routing.recognize_tcp_sessions);
        assert_eq!(cfg.verdict_cache, VerdictCacheConfig::default());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let mut cfg = EmitterConfig::default();
        cfg.verdict_cache.ttl_ms = 0;
        assert!(cfg.validate().is_err());
    }
}
