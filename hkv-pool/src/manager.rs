//! # Pool Manager
//!
//! Purpose: Route connection requests to the pool for a (partition, role,
//! replica) triple, creating pools lazily, and report aggregate counters.
//!
//! ## Routing
//! - `Role::Master`, or no replicas configured: the partition's master pool.
//! - `Role::Replica`: the requested replica index when in range, otherwise a
//!   uniformly random replica.
//!
//! ## Lifecycle
//! `configure` installs a routing table, `flush` closes every pool and
//! removes it. A live manager rejects `configure` with `AlreadyConfigured`;
//! after `flush` it can be configured again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ahash::RandomState;
use hashbrown::HashMap;
use parking_lot::RwLock;
use rand::Rng;
use tracing::debug;

use hkv_client::{Connect, TcpConnector, Target};
use hkv_common::{
    parse_address_list, HkvError, HkvResult, PoolOptions, Role, RouterConfig, ServiceAddress,
    DEFAULT_PARTITION, MAX_PARTITIONS, MAX_REPLICAS,
};

use crate::lease::PooledConnection;
use crate::pool::{ConnectionPool, PoolStats};

/// Identifies one pool inside the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub partition: usize,
    pub role: Role,
    /// Replica index; always 0 for the master.
    pub replica: usize,
}

impl PoolKey {
    pub fn master(partition: usize) -> Self {
        PoolKey {
            partition,
            role: Role::Master,
            replica: 0,
        }
    }

    pub fn replica(partition: usize, replica: usize) -> Self {
        PoolKey {
            partition,
            role: Role::Replica,
            replica,
        }
    }
}

/// Installed routing table: endpoints, session parameters and the pools.
struct Routing<C: Connect> {
    connector: Arc<C>,
    master: ServiceAddress,
    replicas: Vec<ServiceAddress>,
    credential: Option<String>,
    timeout: Duration,
    options: PoolOptions,
    pools: RwLock<HashMap<PoolKey, ConnectionPool<C::Conn>, RandomState>>,
    /// Set by `close_all` under the pools write lock.
    closed: AtomicBool,
}

impl<C: Connect> Routing<C> {
    fn endpoint(&self, key: &PoolKey) -> &ServiceAddress {
        match key.role {
            Role::Master => &self.master,
            Role::Replica => &self.replicas[key.replica],
        }
    }

    /// Returns the pool for `key`, creating it on first use.
    ///
    /// A table that was flushed while a caller still held it creates nothing.
    fn pool(&self, key: PoolKey) -> HkvResult<ConnectionPool<C::Conn>> {
        {
            let pools = self.pools.read();
            if self.closed.load(Ordering::Acquire) {
                return Err(HkvError::NotConfigured);
            }
            if let Some(pool) = pools.get(&key) {
                return Ok(pool.clone());
            }
        }

        let mut pools = self.pools.write();
        if self.closed.load(Ordering::Acquire) {
            return Err(HkvError::NotConfigured);
        }
        Ok(pools
            .entry(key)
            .or_insert_with(|| self.build_pool(key))
            .clone())
    }

    fn build_pool(&self, key: PoolKey) -> ConnectionPool<C::Conn> {
        let endpoint = self.endpoint(&key).clone();
        let name = format!("{}/{}/db{}", key.role, endpoint, key.partition);
        debug!(pool = %name, "creating pool");

        let target = Target::new(endpoint)
            .with_credential(self.credential.clone())
            .with_timeout(self.timeout)
            .with_partition(key.partition);
        let connector = Arc::clone(&self.connector);
        ConnectionPool::new(name, self.options.clone(), move || connector.connect(&target))
    }

    fn stats(&self, role: Role) -> PoolStats {
        self.pools
            .read()
            .iter()
            .filter(|(key, _)| key.role == role)
            .map(|(_, pool)| pool.stats())
            .sum()
    }

    fn close_all(&self) {
        let pools: Vec<_> = {
            let mut table = self.pools.write();
            self.closed.store(true, Ordering::Release);
            table.drain().map(|(_, pool)| pool).collect()
        };
        for pool in pools {
            pool.close();
        }
    }
}

/// Routes requests to per-partition, per-role pools.
pub struct PoolManager<C: Connect = TcpConnector> {
    connector: Arc<C>,
    max_replicas: usize,
    routing: RwLock<Option<Arc<Routing<C>>>>,
}

impl PoolManager<TcpConnector> {
    /// Manager that opens real TCP sessions.
    pub fn tcp() -> Self {
        PoolManager::new(TcpConnector)
    }
}

impl Default for PoolManager<TcpConnector> {
    fn default() -> Self {
        PoolManager::tcp()
    }
}

impl<C: Connect> PoolManager<C> {
    /// Creates an unconfigured manager using `connector` for handshakes.
    pub fn new(connector: C) -> Self {
        PoolManager {
            connector: Arc::new(connector),
            max_replicas: MAX_REPLICAS,
            routing: RwLock::new(None),
        }
    }

    /// Caps how many replicas `configure` accepts.
    pub fn with_max_replicas(mut self, max_replicas: usize) -> Self {
        self.max_replicas = max_replicas;
        self
    }

    /// Installs a routing table.
    ///
    /// With `warm_up` set, one master session on the default partition is
    /// opened and parked first; if that fails nothing is installed.
    pub fn configure(&self, config: RouterConfig) -> HkvResult<()> {
        if self.is_configured() {
            return Err(HkvError::AlreadyConfigured);
        }

        let masters = parse_address_list(&config.master);
        if masters.len() != 1 {
            return Err(HkvError::InvalidMaster {
                found: masters.len(),
            });
        }
        let replicas = parse_address_list(&config.replicas);
        if replicas.len() > self.max_replicas {
            return Err(HkvError::TooManyReplicas {
                count: replicas.len(),
                limit: self.max_replicas,
            });
        }

        let routing = Arc::new(Routing {
            connector: Arc::clone(&self.connector),
            master: masters.into_iter().next().ok_or(HkvError::InvalidMaster { found: 0 })?,
            replicas,
            credential: config.credential().map(str::to_owned),
            timeout: config.timeout(),
            options: config.pool.clone(),
            pools: RwLock::new(HashMap::with_hasher(RandomState::new())),
            closed: AtomicBool::new(false),
        });

        if config.warm_up {
            // Handshake without holding the routing lock; the lease parks
            // itself in the new table's pool when dropped.
            routing.pool(PoolKey::master(DEFAULT_PARTITION))?.get()?;
        }

        let mut slot = self.routing.write();
        if slot.is_some() {
            routing.close_all();
            return Err(HkvError::AlreadyConfigured);
        }
        debug!(
            master = %routing.master,
            replicas = routing.replicas.len(),
            "pool manager configured"
        );
        *slot = Some(routing);
        Ok(())
    }

    /// Shorthand for a master-only configuration.
    pub fn configure_master(
        &self,
        master: &str,
        credential: Option<&str>,
        timeout: Duration,
        options: PoolOptions,
    ) -> HkvResult<()> {
        let mut config = RouterConfig::master(master)
            .with_timeout(timeout)
            .with_pool(options);
        config.credential = credential.map(str::to_owned);
        self.configure(config)
    }

    pub fn is_configured(&self) -> bool {
        self.routing.read().is_some()
    }

    /// Number of configured replicas; zero when unconfigured.
    pub fn replica_count(&self) -> usize {
        self.routing
            .read()
            .as_ref()
            .map(|routing| routing.replicas.len())
            .unwrap_or(0)
    }

    /// Number of pools created so far.
    pub fn pool_count(&self) -> usize {
        self.routing
            .read()
            .as_ref()
            .map(|routing| routing.pools.read().len())
            .unwrap_or(0)
    }

    /// Leases a connection for `partition` and `role`.
    ///
    /// `replica` picks a replica by index; `None` or an out-of-range index
    /// selects one at random.
    pub fn get(
        &self,
        partition: usize,
        role: Role,
        replica: Option<usize>,
    ) -> HkvResult<PooledConnection<C::Conn>> {
        if partition >= MAX_PARTITIONS {
            return Err(HkvError::InvalidPartition {
                partition,
                limit: MAX_PARTITIONS,
            });
        }
        let routing = self.routing()?;
        let key = resolve_key(&routing, partition, role, replica);
        routing.pool(key)?.get()
    }

    /// Leases a master connection for `partition`.
    pub fn master(&self, partition: usize) -> HkvResult<PooledConnection<C::Conn>> {
        self.get(partition, Role::Master, None)
    }

    /// Counters summed over every pool serving `role`.
    pub fn stats(&self, role: Role) -> PoolStats {
        self.routing
            .read()
            .as_ref()
            .map(|routing| routing.stats(role))
            .unwrap_or_default()
    }

    /// Live connections (idle + in use) for `role`.
    pub fn active_count(&self, role: Role) -> usize {
        self.stats(role).active
    }

    /// Pooled (idle) connections for `role`.
    pub fn idle_count(&self, role: Role) -> usize {
        self.stats(role).idle
    }

    /// Leased connections for `role`.
    pub fn in_use_count(&self, role: Role) -> usize {
        self.stats(role).in_use
    }

    /// Closes every pool and drops the routing table.
    ///
    /// Outstanding leases stay valid; their connections are destroyed when
    /// released.
    pub fn flush(&self) {
        let routing = self.routing.write().take();
        if let Some(routing) = routing {
            routing.close_all();
            debug!("pool manager flushed");
        }
    }

    fn routing(&self) -> HkvResult<Arc<Routing<C>>> {
        self.routing.read().clone().ok_or(HkvError::NotConfigured)
    }
}

impl<C: Connect> Drop for PoolManager<C> {
    fn drop(&mut self) {
        self.flush();
    }
}

fn resolve_key<C: Connect>(
    routing: &Routing<C>,
    partition: usize,
    role: Role,
    replica: Option<usize>,
) -> PoolKey {
    let count = routing.replicas.len();
    if role == Role::Master || count == 0 {
        return PoolKey::master(partition);
    }
    let index = match replica {
        Some(index) if index < count => index,
        _ => rand::thread_rng().gen_range(0..count),
    };
    PoolKey::replica(partition, index)
}
