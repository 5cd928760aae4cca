// hkv-common - Shared types for the HybridKV connection pool
//
// This crate defines the error taxonomy, pool/router configuration and the
// address syntax used by the client and pool crates.

pub mod address;
pub mod config;
pub mod error;
pub mod types;

// Re-export for convenience
pub use address::*;
pub use config::*;
pub use error::*;
pub use types::*;
