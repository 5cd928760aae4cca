//! # Address Lists
//!
//! Purpose: Parse the comma-separated `host:port` lists handed to the router.
//!
//! ## Rules
//! - Entries are split on `,` and trimmed.
//! - An entry needs exactly one `:`; the port must be a decimal in 1..=65535.
//! - Invalid entries are dropped silently (a `warn!` is still emitted) so one
//!   typo in a replica list does not take the whole router down.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// One resolved `host:port` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceAddress {
    pub host: String,
    pub port: u16,
}

impl ServiceAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ServiceAddress {
            host: host.into(),
            port,
        }
    }

    /// Parses a single `host:port` entry, returning `None` when invalid.
    pub fn parse(entry: &str) -> Option<Self> {
        let mut parts = entry.trim().split(':');
        let host = parts.next()?.trim();
        let port = parts.next()?.trim();
        if parts.next().is_some() || host.is_empty() {
            return None;
        }
        // u16 parsing takes an optional leading `+` and rejects `-`, garbage
        // and anything above 65535.
        let port: u16 = port.parse().ok()?;
        if port == 0 {
            return None;
        }
        Some(ServiceAddress::new(host, port))
    }
}

impl fmt::Display for ServiceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parses a comma-separated address list, dropping invalid entries.
pub fn parse_address_list(list: &str) -> Vec<ServiceAddress> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let parsed = ServiceAddress::parse(entry);
            if parsed.is_none() {
                warn!(entry, "dropping invalid host:port entry");
            }
            parsed
        })
        .collect()
}
