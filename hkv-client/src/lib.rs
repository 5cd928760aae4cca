//! # HybridKV Transport
//!
//! Purpose: Provide the single-session transport the pool builds on: a
//! blocking RESP2 connection with connect/auth/select handshake, a structured
//! command builder and an owning reply value.
//!
//! ## Design Principles
//! 1. **Strategy Pattern**: `Transport` and `Connect` are the seams the pool
//!    is generic over; `TcpConnection` is the production strategy.
//! 2. **Typed Commands**: Arguments are typed values, never format strings.
//! 3. **Minimal Allocation**: Reuse buffers for RESP framing and parsing.
//! 4. **Health Tracking**: Transport failures poison the session, server
//!    error replies do not.

mod command;
mod connection;
mod reply;
mod resp;
mod transport;

pub use command::{Command, ToArg};
pub use connection::{TcpConnection, TcpConnector};
pub use reply::{Reply, ReplyView};
pub use resp::{encode_command, read_reply, MAX_BULK_LEN, MAX_DEPTH, MAX_LINE_LEN};
pub use transport::{Connect, Target, Transport};
