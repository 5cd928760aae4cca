//! # Pool and Router Configuration
//!
//! Purpose: Plain, serde-friendly configuration structs. Every pool limit is
//! independently optional; `None` means unbounded.
//!
//! ## Field Names
//! The serialized names (`max_idle`, `max_active`, `idle_timeout_ms`,
//! `max_conn_life_time_ms`) are the option names operators already use, so a
//! JSON/TOML section deserializes directly into `PoolOptions`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::DEFAULT_TIMEOUT;

/// Capacity and aging limits for one connection pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolOptions {
    /// Cap on connections kept idle; extra returns evict the LRU entry.
    pub max_idle: Option<usize>,
    /// Cap on live connections (idle + in use).
    pub max_active: Option<usize>,
    /// Idle connections older than this are evicted on the next `get`.
    pub idle_timeout_ms: Option<u64>,
    /// Connections older than this are retired instead of reused.
    pub max_conn_life_time_ms: Option<u64>,
}

impl PoolOptions {
    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = Some(max_idle);
        self
    }

    pub fn with_max_active(mut self, max_active: usize) -> Self {
        self.max_active = Some(max_active);
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_ms = Some(duration_to_ms(timeout));
        self
    }

    pub fn with_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_conn_life_time_ms = Some(duration_to_ms(lifetime));
        self
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        self.max_conn_life_time_ms.map(Duration::from_millis)
    }
}

/// Router configuration: one master list, an optional replica list and the
/// session parameters shared by every pool the router creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Comma-separated `host:port` list; must yield exactly one entry.
    pub master: String,
    /// Comma-separated `host:port` list; may be empty.
    pub replicas: String,
    /// Password sent with `AUTH` when non-empty.
    pub credential: Option<String>,
    /// Connect/read/write timeout in milliseconds.
    pub timeout_ms: u64,
    /// Limits applied to every per-partition pool.
    pub pool: PoolOptions,
    /// Open (and park) one master connection on partition 0 during configure.
    pub warm_up: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            master: String::new(),
            replicas: String::new(),
            credential: None,
            timeout_ms: duration_to_ms(DEFAULT_TIMEOUT),
            pool: PoolOptions::default(),
            warm_up: false,
        }
    }
}

impl RouterConfig {
    /// Creates a master-only configuration with default limits.
    pub fn master(addr: impl Into<String>) -> Self {
        RouterConfig {
            master: addr.into(),
            ..RouterConfig::default()
        }
    }

    pub fn with_replicas(mut self, replicas: impl Into<String>) -> Self {
        self.replicas = replicas.into();
        self
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = duration_to_ms(timeout);
        self
    }

    pub fn with_pool(mut self, pool: PoolOptions) -> Self {
        self.pool = pool;
        self
    }

    pub fn with_warm_up(mut self, warm_up: bool) -> Self {
        self.warm_up = warm_up;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Returns the credential only when it is set and non-empty.
    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref().filter(|value| !value.is_empty())
    }
}

fn duration_to_ms(value: Duration) -> u64 {
    u64::try_from(value.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_default_to_unbounded() {
        let options = PoolOptions::default();
        assert_eq!(options.max_idle, None);
        assert_eq!(options.max_active, None);
        assert_eq!(options.idle_timeout(), None);
        assert_eq!(options.max_lifetime(), None);
    }

    #[test]
    fn options_deserialize_from_operator_names() {
        let options: PoolOptions =
            serde_json::from_str(r#"{"max_active": 4, "idle_timeout_ms": 2000}"#).unwrap();
        assert_eq!(options.max_active, Some(4));
        assert_eq!(options.max_idle, None);
        assert_eq!(options.idle_timeout(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn router_config_fills_defaults() {
        let config: RouterConfig = serde_json::from_str(
            r#"{"master": "127.0.0.1:6379", "credential": "", "pool": {"max_idle": 3}}"#,
        )
        .unwrap();
        assert_eq!(config.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(config.credential(), None);
        assert_eq!(config.pool.max_idle, Some(3));
        assert!(!config.warm_up);
    }

    #[test]
    fn builders_set_fields() {
        let config = RouterConfig::master("m:1")
            .with_replicas("r:2,r:3")
            .with_credential("secret")
            .with_timeout(Duration::from_secs(1))
            .with_pool(PoolOptions::default().with_max_lifetime(Duration::from_secs(3)));
        assert_eq!(config.credential(), Some("secret"));
        assert_eq!(config.timeout_ms, 1000);
        assert_eq!(config.pool.max_conn_life_time_ms, Some(3000));
    }
}
