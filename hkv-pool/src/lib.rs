//! # HybridKV Connection Pool
//!
//! Purpose: Hand out ready-to-use sessions to a Redis-compatible store in
//! bounded time, reuse them across requests and reclaim them safely under
//! concurrent access, with one pool per (partition, role, replica).
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: `ConnectionPool` keeps recency-ordered idle
//!    sessions in an index-linked list over a recycling slot arena.
//! 2. **RAII Leases**: `PooledConnection` releases exactly once on drop.
//! 3. **Explicit Ownership**: `PoolManager` is a plain value owned by the
//!    caller; there is no process-wide instance.
//! 4. **Fail Fast**: Overload and handshake failures return immediately;
//!    backoff belongs to the caller.
//!
//! ## Structure Overview
//!
//! ```text
//! PoolManager<C: Connect>
//!   └── routing: RwLock<Option<Arc<Routing>>>
//!         └── pools: HashMap<PoolKey, ConnectionPool>
//!               └── ConnectionPool
//!                     ├── idle: Mutex<IdleList>        recency order
//!                     ├── arena: MemoryArena           slot recycling
//!                     └── active / idle_count          atomics
//! ```

mod arena;
mod idle;
mod lease;
mod manager;
mod pool;

pub use arena::{MemoryArena, SlotId};
pub use idle::{IdleEntry, IdleList};
pub use lease::PooledConnection;
pub use manager::{PoolKey, PoolManager};
pub use pool::{ConnectionPool, InitHandler, PoolStats};

pub use hkv_client::{Command, Connect, Reply, ReplyView, Target, TcpConnection, TcpConnector, Transport};
pub use hkv_common::{
    parse_address_list, ErrorKind, HkvError, HkvResult, PoolOptions, Role, RouterConfig,
    ServiceAddress, MAX_PARTITIONS, MAX_REPLICAS,
};
