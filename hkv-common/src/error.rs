//! # Error Taxonomy
//!
//! Purpose: One error type shared by the transport, the pool engine and the
//! router so failures can cross crate boundaries without re-wrapping.
//!
//! ## Design Principles
//! 1. **Typed Failures**: Every failure mode the pool can report is a variant.
//! 2. **Coarse Classification**: `ErrorKind` groups variants for callers that
//!    only need to decide between retry, back off, or give up.
//! 3. **Source Chains**: Handshake failures keep the transport error as source.

use thiserror::Error;

/// Result type used across the HybridKV workspace.
pub type HkvResult<T> = Result<T, HkvError>;

/// Errors surfaced by the transport, pool and router.
#[derive(Debug, Error)]
pub enum HkvError {
    /// `configure` was called on a manager that is still live.
    #[error("manager is already configured")]
    AlreadyConfigured,
    /// `get` was called before `configure` (or after `flush`).
    #[error("manager is not configured")]
    NotConfigured,
    /// The master list did not contain exactly one valid `host:port`.
    #[error("bad master address: expected exactly one host:port entry, found {found}")]
    InvalidMaster { found: usize },
    /// More replicas were supplied than the manager accepts.
    #[error("too many replicas: {count} exceeds limit {limit}")]
    TooManyReplicas { count: usize, limit: usize },
    /// Partition index outside the supported range.
    #[error("partition {partition} out of range (0..{limit})")]
    InvalidPartition { partition: usize, limit: usize },
    /// Pool was closed by a flush and no longer hands out connections.
    #[error("pool {pool} is closed")]
    PoolClosed { pool: String },
    /// Pool already owns `limit` live connections.
    #[error("pool {pool} overloaded: {limit} connections active")]
    Overload { pool: String, limit: usize },
    /// Arena could not grow to hold another connection.
    #[error("connection arena allocation failed")]
    Allocation,
    /// Connect/auth/select failed while building a new connection.
    #[error("handshake with {target} failed: {source}")]
    Handshake {
        target: String,
        #[source]
        source: Box<HkvError>,
    },
    /// Address could not be resolved into a socket address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    /// Network or IO failure while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// RESP2 framing or parse error.
    #[error("protocol error: {0}")]
    Protocol(&'static str),
    /// Server returned an error reply for an issued command.
    #[error("server error: {0}")]
    Command(String),
}

/// Coarse classification of [`HkvError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Overload,
    Allocation,
    Handshake,
    Transport,
    Command,
}

impl HkvError {
    /// Returns the class this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HkvError::AlreadyConfigured
            | HkvError::NotConfigured
            | HkvError::InvalidMaster { .. }
            | HkvError::TooManyReplicas { .. }
            | HkvError::InvalidPartition { .. }
            | HkvError::PoolClosed { .. } => ErrorKind::Configuration,
            HkvError::Overload { .. } => ErrorKind::Overload,
            HkvError::Allocation => ErrorKind::Allocation,
            HkvError::Handshake { .. } => ErrorKind::Handshake,
            HkvError::InvalidAddress(_) | HkvError::Io(_) | HkvError::Protocol(_) => {
                ErrorKind::Transport
            }
            HkvError::Command(_) => ErrorKind::Command,
        }
    }

    /// Returns true when the failure means the session itself is unusable.
    ///
    /// Command errors leave the session intact; everything on the wire does not.
    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_variants() {
        assert_eq!(HkvError::AlreadyConfigured.kind(), ErrorKind::Configuration);
        assert_eq!(
            HkvError::Overload { pool: "master/db2".into(), limit: 4 }.kind(),
            ErrorKind::Overload
        );
        assert_eq!(HkvError::Protocol("bad frame").kind(), ErrorKind::Transport);
        assert_eq!(HkvError::Command("ERR".into()).kind(), ErrorKind::Command);
        assert!(!HkvError::Command("ERR".into()).is_transport());
    }

    #[test]
    fn handshake_keeps_source() {
        let err = HkvError::Handshake {
            target: "127.0.0.1:6379".into(),
            source: Box::new(HkvError::Command("WRONGPASS".into())),
        };
        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "server error: WRONGPASS");
        assert_eq!(
            err.to_string(),
            "handshake with 127.0.0.1:6379 failed: server error: WRONGPASS"
        );
    }
}
