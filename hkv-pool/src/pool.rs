//! # Connection Pool
//!
//! Purpose: Reuse sessions for one (partition, role, endpoint) so callers pay
//! the connect/auth/select handshake once per connection, not per request.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Keep a bounded, recency-ordered set of idle
//!    sessions; reuse the most recent, evict the least recent.
//! 2. **Minimal Locking**: Two independent locks (idle list, arena), never
//!    held together and never held across I/O.
//! 3. **Fail Fast**: Exceeding `max_active` returns an error immediately.
//! 4. **Lock-Free Stats**: Live and idle counts are atomics.
//!
//! ## Get Path
//!
//! ```text
//! get()
//!   ├── idle lock: evict expired tail entries (idle_timeout)
//!   ├── idle lock: pop front, retiring entries past max_lifetime
//!   ├── destroy retired entries (no lock held)
//!   └── nothing reusable:
//!         reserve active slot (CAS against max_active)
//!         arena.acquire() → init handler (no lock held) → lease
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use hkv_client::Transport;
use hkv_common::{HkvError, HkvResult, PoolOptions};

use crate::arena::{MemoryArena, SlotId};
use crate::idle::{IdleEntry, IdleList};
use crate::lease::{Leased, PooledConnection};

/// Arena blocks reserved when a pool is created.
const PREALLOC_BLOCKS: usize = 64;

/// Handshake run for every newly constructed connection.
pub type InitHandler<T> = Box<dyn Fn() -> HkvResult<T> + Send + Sync>;

/// Point-in-time counters of one pool, or a sum across pools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Live connections owned by the pool (idle + in use).
    pub active: usize,
    /// Connections parked on the idle list.
    pub idle: usize,
    /// Connections leased out (or mid-handshake).
    pub in_use: usize,
}

impl std::ops::Add for PoolStats {
    type Output = PoolStats;

    fn add(self, other: PoolStats) -> PoolStats {
        PoolStats {
            active: self.active + other.active,
            idle: self.idle + other.idle,
            in_use: self.in_use + other.in_use,
        }
    }
}

impl std::iter::Sum for PoolStats {
    fn sum<I: Iterator<Item = PoolStats>>(iter: I) -> PoolStats {
        iter.fold(PoolStats::default(), |acc, stats| acc + stats)
    }
}

/// A parked connection and its pool-unique id.
struct Parked<T> {
    id: u64,
    conn: T,
}

struct PoolShared<T> {
    name: String,
    options: PoolOptions,
    init: InitHandler<T>,
    idle: Mutex<IdleList>,
    arena: MemoryArena<Parked<T>>,
    active: AtomicUsize,
    idle_count: AtomicUsize,
    failures: AtomicU64,
    next_id: AtomicU64,
    closed: AtomicBool,
}

/// Connection pool handle.
///
/// Cloning is cheap and every clone refers to the same pool.
pub struct ConnectionPool<T: Transport> {
    inner: Arc<PoolShared<T>>,
}

impl<T: Transport> Clone for ConnectionPool<T> {
    fn clone(&self) -> Self {
        ConnectionPool {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> ConnectionPool<T> {
    /// Creates an empty pool; `init` runs the handshake for new connections.
    pub fn new<F>(name: impl Into<String>, options: PoolOptions, init: F) -> Self
    where
        F: Fn() -> HkvResult<T> + Send + Sync + 'static,
    {
        // Limits may be huge; only a small head start is allocated up front.
        let hint = options
            .max_active
            .or(options.max_idle)
            .unwrap_or(0)
            .min(PREALLOC_BLOCKS);
        Self::with_arena(name, options, init, MemoryArena::with_capacity(hint))
    }

    fn with_arena<F>(
        name: impl Into<String>,
        options: PoolOptions,
        init: F,
        arena: MemoryArena<Parked<T>>,
    ) -> Self
    where
        F: Fn() -> HkvResult<T> + Send + Sync + 'static,
    {
        ConnectionPool {
            inner: Arc::new(PoolShared {
                name: name.into(),
                options,
                init: Box::new(init),
                idle: Mutex::new(IdleList::new()),
                arena,
                active: AtomicUsize::new(0),
                idle_count: AtomicUsize::new(0),
                failures: AtomicU64::new(0),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn options(&self) -> &PoolOptions {
        &self.inner.options
    }

    /// Live connections (idle + in use).
    pub fn active_count(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    pub fn idle_count(&self) -> usize {
        self.inner.idle_count.load(Ordering::Acquire)
    }

    /// Allocation and handshake failures seen by `get`.
    pub fn failure_count(&self) -> u64 {
        self.inner.failures.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> PoolStats {
        let active = self.active_count();
        let idle = self.idle_count();
        PoolStats {
            active,
            idle,
            in_use: active.saturating_sub(idle),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Leases a connection: the most recently idle one that is still within
    /// its limits, or a freshly constructed one.
    pub fn get(&self) -> HkvResult<PooledConnection<T>> {
        if self.is_closed() {
            return Err(HkvError::PoolClosed {
                pool: self.inner.name.clone(),
            });
        }

        let (reuse, retired) = self.scan_idle(Instant::now());
        self.destroy_all(retired);

        if let Some(entry) = reuse {
            match self.inner.arena.take(entry.slot) {
                Some(parked) => {
                    trace!(pool = %self.inner.name, id = parked.id, "reusing idle connection");
                    return Ok(PooledConnection::new(
                        self.clone(),
                        Leased {
                            slot: entry.slot,
                            id: parked.id,
                            created_at: entry.created_at,
                            conn: parked.conn,
                        },
                    ));
                }
                None => {
                    warn!(pool = %self.inner.name, slot = entry.slot, "idle entry without parked connection");
                    self.destroy(entry.slot, None);
                }
            }
        }

        self.get_new_instance()
    }

    /// Closes the pool: idle connections are destroyed now, leased ones when
    /// they come back, and further `get` calls fail.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let drained: Vec<SlotId> = {
            let mut idle = self.inner.idle.lock();
            let drained: Vec<SlotId> = std::iter::from_fn(|| idle.pop_front())
                .map(|entry| entry.slot)
                .collect();
            self.inner.idle_count.fetch_sub(drained.len(), Ordering::AcqRel);
            drained
        };
        debug!(pool = %self.inner.name, drained = drained.len(), "pool closed");
        self.destroy_all(drained);
    }

    /// Pops the reusable entry (if any) and collects entries to retire.
    fn scan_idle(&self, now: Instant) -> (Option<IdleEntry>, Vec<SlotId>) {
        let options = &self.inner.options;
        let mut retired = Vec::new();
        let mut idle = self.inner.idle.lock();

        if let Some(timeout) = options.idle_timeout() {
            while let Some(entry) = idle.peek_back() {
                if !expired(now, entry.idle_since, timeout) {
                    break;
                }
                idle.pop_back();
                retired.push(entry.slot);
            }
        }

        let mut reuse = None;
        while let Some(entry) = idle.pop_front() {
            if let Some(lifetime) = options.max_lifetime() {
                if expired(now, entry.created_at, lifetime) {
                    retired.push(entry.slot);
                    continue;
                }
            }
            reuse = Some(entry);
            break;
        }

        let popped = retired.len() + usize::from(reuse.is_some());
        self.inner.idle_count.fetch_sub(popped, Ordering::AcqRel);
        (reuse, retired)
    }

    /// Builds a new connection outside every pool lock.
    fn get_new_instance(&self) -> HkvResult<PooledConnection<T>> {
        self.reserve_active()?;

        let slot = match self.inner.arena.acquire() {
            Ok(slot) => slot,
            Err(err) => {
                self.inner.active.fetch_sub(1, Ordering::AcqRel);
                self.inner.failures.fetch_add(1, Ordering::Relaxed);
                warn!(pool = %self.inner.name, "arena allocation failed");
                return Err(err);
            }
        };

        match (self.inner.init)() {
            Ok(conn) => {
                let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                debug!(pool = %self.inner.name, id, slot, "connection established");
                Ok(PooledConnection::new(
                    self.clone(),
                    Leased {
                        slot,
                        id,
                        created_at: Instant::now(),
                        conn,
                    },
                ))
            }
            Err(err) => {
                self.inner.arena.release(slot);
                self.inner.active.fetch_sub(1, Ordering::AcqRel);
                self.inner.failures.fetch_add(1, Ordering::Relaxed);
                warn!(pool = %self.inner.name, error = %err, "handshake failed");
                Err(HkvError::Handshake {
                    target: self.inner.name.clone(),
                    source: Box::new(err),
                })
            }
        }
    }

    /// Claims one unit of `max_active` capacity.
    fn reserve_active(&self) -> HkvResult<()> {
        let active = &self.inner.active;
        match self.inner.options.max_active {
            None => {
                active.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
            Some(limit) => active
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                    (current < limit).then_some(current + 1)
                })
                .map(|_| ())
                .map_err(|_| {
                    debug!(pool = %self.inner.name, limit, "pool overloaded");
                    HkvError::Overload {
                        pool: self.inner.name.clone(),
                        limit,
                    }
                }),
        }
    }

    /// Takes a connection back from a lease.
    ///
    /// Only healthy connections from an open pool re-enter the idle list.
    pub(crate) fn put(&self, leased: Leased<T>, discard: bool) {
        let Leased {
            slot,
            id,
            created_at,
            conn,
        } = leased;

        if discard || !conn.is_healthy() || self.is_closed() || self.inner.options.max_idle == Some(0) {
            trace!(pool = %self.inner.name, id, healthy = conn.is_healthy(), "retiring returned connection");
            self.destroy(slot, Some(conn));
            return;
        }

        if let Err(parked) = self.inner.arena.park(slot, Parked { id, conn }) {
            warn!(pool = %self.inner.name, slot, "returned connection lost its arena slot");
            self.inner.active.fetch_sub(1, Ordering::AcqRel);
            drop(parked);
            return;
        }

        let (admitted, evicted) = {
            let mut idle = self.inner.idle.lock();
            // Checked under the idle lock so a concurrent close() cannot miss it.
            if self.is_closed() {
                (false, None)
            } else {
                idle.push_front(IdleEntry {
                    slot,
                    created_at,
                    idle_since: Instant::now(),
                });
                self.inner.idle_count.fetch_add(1, Ordering::AcqRel);
                let evicted = match self.inner.options.max_idle {
                    Some(max_idle) if idle.len() > max_idle => idle.pop_back(),
                    _ => None,
                };
                if evicted.is_some() {
                    self.inner.idle_count.fetch_sub(1, Ordering::AcqRel);
                }
                (true, evicted)
            }
        };

        if !admitted {
            self.destroy(slot, None);
        }
        if let Some(entry) = evicted {
            trace!(pool = %self.inner.name, slot = entry.slot, "evicting least recently used idle connection");
            self.destroy(entry.slot, None);
        }
    }

    fn destroy_all(&self, slots: Vec<SlotId>) {
        for slot in slots {
            self.destroy(slot, None);
        }
    }

    /// Tears a connection down and gives its block back to the arena.
    fn destroy(&self, slot: SlotId, conn: Option<T>) {
        let parked = self.inner.arena.release(slot);
        self.inner.active.fetch_sub(1, Ordering::AcqRel);
        // Teardown (socket close) happens here, after the arena lock is gone.
        drop(parked);
        drop(conn);
    }
}

fn expired(now: Instant, since: Instant, limit: Duration) -> bool {
    now.saturating_duration_since(since) > limit
}
