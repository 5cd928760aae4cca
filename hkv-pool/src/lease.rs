//! # Leased Connections
//!
//! RAII wrapper returning a connection to its pool on drop. The lease is
//! move-only: rebinding a variable to a new lease drops (and so releases)
//! the old one first, and every exit path releases exactly once.

use std::fmt;
use std::ops::Deref;
use std::time::Instant;

use hkv_client::{Command, Reply, Transport};
use hkv_common::HkvResult;

use crate::arena::SlotId;
use crate::pool::ConnectionPool;

/// A connection checked out of its pool, plus its bookkeeping header.
pub(crate) struct Leased<T> {
    pub(crate) slot: SlotId,
    pub(crate) id: u64,
    pub(crate) created_at: Instant,
    pub(crate) conn: T,
}

/// Exclusive handle on a pooled connection.
pub struct PooledConnection<T: Transport> {
    pool: ConnectionPool<T>,
    leased: Option<Leased<T>>,
    operations: u64,
    discard: bool,
}

impl<T: Transport> PooledConnection<T> {
    pub(crate) fn new(pool: ConnectionPool<T>, leased: Leased<T>) -> Self {
        PooledConnection {
            pool,
            leased: Some(leased),
            operations: 0,
            discard: false,
        }
    }

    fn leased(&self) -> &Leased<T> {
        self.leased.as_ref().expect("lease holds a connection until drop")
    }

    /// Executes one command on the leased connection.
    pub fn execute(&mut self, command: &Command) -> HkvResult<Reply> {
        self.operations += 1;
        let leased = self.leased.as_mut().expect("lease holds a connection until drop");
        leased.conn.execute(command)
    }

    /// Pool-unique id of the underlying connection.
    ///
    /// Two leases with the same id were served by the same session.
    pub fn id(&self) -> u64 {
        self.leased().id
    }

    /// Commands issued through this lease.
    pub fn operation_count(&self) -> u64 {
        self.operations
    }

    /// When the underlying connection completed its handshake.
    pub fn created_at(&self) -> Instant {
        self.leased().created_at
    }

    pub fn pool_name(&self) -> &str {
        self.pool.name()
    }

    /// Destroys the connection on release instead of returning it to the idle
    /// list, e.g. after a caller-side protocol desync.
    pub fn discard(&mut self) {
        self.discard = true;
    }

    /// Returns the connection to its pool now.
    pub fn release(self) {
        drop(self);
    }

    /// Releases whatever `holder` leases, then stores a fresh lease in it.
    ///
    /// Plain assignment acquires the new lease before dropping the old one,
    /// so on a pool at `max_active` it fails with `Overload`.
    pub fn reassign<F>(holder: &mut Option<Self>, acquire: F) -> HkvResult<&mut Self>
    where
        F: FnOnce() -> HkvResult<Self>,
    {
        drop(holder.take());
        Ok(holder.insert(acquire()?))
    }
}

impl<T: Transport> Deref for PooledConnection<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.leased().conn
    }
}

impl<T: Transport> fmt::Debug for PooledConnection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("PooledConnection");
        out.field("pool", &self.pool.name());
        if let Some(leased) = self.leased.as_ref() {
            out.field("id", &leased.id).field("slot", &leased.slot);
        }
        out.field("operations", &self.operations)
            .field("discard", &self.discard)
            .finish()
    }
}

impl<T: Transport> Drop for PooledConnection<T> {
    fn drop(&mut self) {
        if let Some(leased) = self.leased.take() {
            self.pool.put(leased, self.discard);
        }
    }
}
