//! # Routing Types
//!
//! Roles and partition bounds shared by the router and its tests.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Number of logical partitions (database slots 0-15).
pub const MAX_PARTITIONS: usize = 16;

/// Partition used when the caller does not pick one.
pub const DEFAULT_PARTITION: usize = 0;

/// Default cap on configured replicas.
pub const MAX_REPLICAS: usize = 16;

/// Default connect/read/write timeout for new sessions.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(200);

/// Server role a pool talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Read/write primary.
    Master,
    /// Read-only secondary.
    Replica,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Master => f.write_str("master"),
            Role::Replica => f.write_str("replica"),
        }
    }
}
