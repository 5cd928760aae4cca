//! # Transport Boundary
//!
//! The pool never talks to sockets directly. It holds values implementing
//! `Transport` and builds new ones through a `Connect` strategy, which lets
//! tests swap in in-memory fakes.

use std::time::Duration;

use hkv_common::{HkvResult, ServiceAddress, DEFAULT_PARTITION, DEFAULT_TIMEOUT};

use crate::command::Command;
use crate::reply::Reply;

/// One authenticated session to the backing store.
pub trait Transport: Send + 'static {
    /// Performs one request/response exchange.
    ///
    /// `Err` means the exchange failed on the wire; an error reply from the
    /// server is `Ok(Reply::Error(..))`.
    fn execute(&mut self, command: &Command) -> HkvResult<Reply>;

    /// Reflects the outcome of the most recent exchange.
    fn is_healthy(&self) -> bool;
}

/// Everything the handshake needs to open one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub endpoint: ServiceAddress,
    pub credential: Option<String>,
    pub timeout: Duration,
    pub partition: usize,
}

impl Target {
    /// Target on the default partition with no credential.
    pub fn new(endpoint: ServiceAddress) -> Self {
        Target {
            endpoint,
            credential: None,
            timeout: DEFAULT_TIMEOUT,
            partition: DEFAULT_PARTITION,
        }
    }

    pub fn with_credential(mut self, credential: Option<String>) -> Self {
        self.credential = credential.filter(|value| !value.is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_partition(mut self, partition: usize) -> Self {
        self.partition = partition;
        self
    }
}

/// Strategy that runs the handshake (connect, auth, select) for a target.
pub trait Connect: Send + Sync + 'static {
    type Conn: Transport;

    fn connect(&self, target: &Target) -> HkvResult<Self::Conn>;
}
