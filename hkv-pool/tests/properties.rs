//! Property tests for pool bookkeeping under arbitrary lease sequences.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use proptest::prelude::*;

use hkv_pool::{
    Command, ConnectionPool, HkvError, HkvResult, IdleEntry, IdleList, MemoryArena, PoolOptions,
    PooledConnection, Reply, Transport,
};

struct Session {
    healthy: bool,
}

impl Transport for Session {
    fn execute(&mut self, command: &Command) -> HkvResult<Reply> {
        if command.name() == b"BREAK" {
            self.healthy = false;
            return Err(HkvError::Protocol("connection reset"));
        }
        Ok(Reply::Status(b"OK".to_vec()))
    }

    fn is_healthy(&self) -> bool {
        self.healthy
    }
}

#[derive(Debug, Clone)]
enum Op {
    Get,
    Release(usize),
    Break(usize),
    Discard(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Get),
        2 => any::<usize>().prop_map(Op::Release),
        1 => any::<usize>().prop_map(Op::Break),
        1 => any::<usize>().prop_map(Op::Discard),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn pool_counters_stay_consistent(
        max_active in 1usize..6,
        max_idle in 0usize..6,
        ops in proptest::collection::vec(op(), 1..60),
    ) {
        let built = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&built);
        let options = PoolOptions::default()
            .with_max_active(max_active)
            .with_max_idle(max_idle);
        let pool = ConnectionPool::new("prop", options, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Session { healthy: true })
        });

        let mut held: Vec<PooledConnection<Session>> = Vec::new();
        for op in ops {
            match op {
                Op::Get => match pool.get() {
                    Ok(conn) => held.push(conn),
                    Err(HkvError::Overload { .. }) => prop_assert_eq!(held.len(), max_active),
                    Err(err) => prop_assert!(false, "unexpected error {err}"),
                },
                Op::Release(i) if !held.is_empty() => {
                    let index = i % held.len();
                    held.swap_remove(index).release();
                }
                Op::Break(i) if !held.is_empty() => {
                    let index = i % held.len();
                    let mut conn = held.swap_remove(index);
                    prop_assert!(conn.execute(&Command::new("BREAK")).is_err());
                }
                Op::Discard(i) if !held.is_empty() => {
                    let index = i % held.len();
                    let mut conn = held.swap_remove(index);
                    conn.discard();
                }
                _ => {}
            }

            let stats = pool.stats();
            prop_assert!(held.len() <= max_active);
            prop_assert!(stats.idle <= max_idle);
            prop_assert_eq!(stats.active, stats.idle + held.len());
            prop_assert_eq!(stats.in_use, held.len());
        }

        // Every live id is distinct.
        let mut ids: Vec<u64> = held.iter().map(|conn| conn.id()).collect();
        ids.sort_unstable();
        ids.dedup();
        prop_assert_eq!(ids.len(), held.len());

        drop(held);
        prop_assert!(pool.idle_count() <= max_idle);
        prop_assert_eq!(pool.active_count(), pool.idle_count());
        prop_assert!(built.load(Ordering::SeqCst) as usize >= pool.active_count());
    }

    #[test]
    fn idle_list_matches_recency_model(
        ops in proptest::collection::vec((0usize..8, any::<bool>()), 1..80),
    ) {
        let arena: MemoryArena<()> = MemoryArena::new();
        let slots: Vec<_> = (0..8).map(|_| arena.acquire().unwrap()).collect();
        let mut list = IdleList::new();
        let mut model: Vec<usize> = Vec::new();
        let now = std::time::Instant::now();

        for (pick, push) in ops {
            if push {
                let slot = slots[pick];
                list.push_front(IdleEntry {
                    slot,
                    created_at: now,
                    idle_since: now,
                });
                model.retain(|&s| s != slot);
                model.insert(0, slot);
            } else {
                let popped = list.pop_back().map(|entry| entry.slot);
                prop_assert_eq!(popped, model.pop());
            }
            prop_assert_eq!(list.len(), model.len());
        }

        while let Some(entry) = list.pop_front() {
            prop_assert_eq!(Some(entry.slot), model.first().copied());
            model.remove(0);
        }
        prop_assert!(model.is_empty());
    }
}
