//! # Memory Arena
//!
//! Recycles the storage blocks that hold pooled connections. A block is a
//! slot in a growable array; released slots go onto a free-index stack and
//! are handed out again before the array grows.
//!
//! ## Usage
//!
//! - `acquire` reserves a slot (construct-in-place happens later via `park`).
//! - `park` / `take` move a connection into and out of its reserved slot.
//! - `release` vacates the slot and returns whatever was parked there; the
//!   caller drops it after the arena lock is gone.
//!
//! ## Structure Overview
//!
//! ```text
//! MemoryArena
//!   └── inner: Mutex<ArenaInner>
//!         ├── blocks: Vec<Block<T>>   Vacant | Reserved | Parked(T)
//!         └── free: Vec<SlotId>       recycled indices, LIFO
//! ```
//!
//! The block array only ever grows while the arena is alive; its memory goes
//! back to the allocator when the arena drops.

use parking_lot::Mutex;

use hkv_common::{HkvError, HkvResult};

/// Index of a block inside the arena.
pub type SlotId = usize;

#[derive(Debug)]
enum Block<T> {
    Vacant,
    Reserved,
    Parked(T),
}

#[derive(Debug)]
struct ArenaInner<T> {
    blocks: Vec<Block<T>>,
    free: Vec<SlotId>,
    in_use: usize,
    /// Most blocks the array may ever hold.
    limit: usize,
}

/// Lock-protected slot allocator.
#[derive(Debug)]
pub struct MemoryArena<T> {
    inner: Mutex<ArenaInner<T>>,
}

impl<T> Default for MemoryArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MemoryArena<T> {
    pub fn new() -> Self {
        Self::bounded(usize::MAX)
    }

    /// Arena that never holds more than `limit` blocks; `acquire` fails with
    /// `Allocation` once every block is taken.
    pub fn bounded(limit: usize) -> Self {
        MemoryArena {
            inner: Mutex::new(ArenaInner {
                blocks: Vec::new(),
                free: Vec::new(),
                in_use: 0,
                limit,
            }),
        }
    }

    /// Pre-sizes the block array when memory allows.
    ///
    /// `capacity` is a hint: if the reservation fails the arena starts empty
    /// and grows on demand.
    pub fn with_capacity(capacity: usize) -> Self {
        let arena = Self::new();
        {
            let mut inner = arena.inner.lock();
            if inner.blocks.try_reserve(capacity).is_err()
                || inner.free.try_reserve(capacity).is_err()
            {
                inner.blocks = Vec::new();
                inner.free = Vec::new();
            }
        }
        arena
    }

    /// Reserves a block, reusing a released one when possible.
    ///
    /// Fails with `Allocation` when the block array cannot grow.
    pub fn acquire(&self) -> HkvResult<SlotId> {
        let mut inner = self.inner.lock();
        let slot = match inner.free.pop() {
            Some(slot) => slot,
            None => {
                if inner.blocks.len() >= inner.limit {
                    return Err(HkvError::Allocation);
                }
                inner
                    .blocks
                    .try_reserve(1)
                    .map_err(|_| HkvError::Allocation)?;
                inner
                    .free
                    .try_reserve(1)
                    .map_err(|_| HkvError::Allocation)?;
                inner.blocks.push(Block::Vacant);
                inner.blocks.len() - 1
            }
        };
        inner.blocks[slot] = Block::Reserved;
        inner.in_use += 1;
        Ok(slot)
    }

    /// Stores `value` in a reserved block.
    ///
    /// A slot that is not reserved hands the value back.
    pub fn park(&self, slot: SlotId, value: T) -> Result<(), T> {
        let mut inner = self.inner.lock();
        match inner.blocks.get_mut(slot) {
            Some(block) if matches!(block, Block::Reserved) => {
                *block = Block::Parked(value);
                Ok(())
            }
            _ => Err(value),
        }
    }

    /// Moves the parked value out, leaving the block reserved.
    pub fn take(&self, slot: SlotId) -> Option<T> {
        let mut inner = self.inner.lock();
        let block = inner.blocks.get_mut(slot)?;
        match std::mem::replace(block, Block::Reserved) {
            Block::Parked(value) => Some(value),
            other => {
                *block = other;
                None
            }
        }
    }

    /// Vacates a block and pushes it onto the free stack.
    ///
    /// Returns the parked value, if any, so it is dropped outside the lock.
    /// Releasing a vacant block is a no-op.
    pub fn release(&self, slot: SlotId) -> Option<T> {
        let mut inner = self.inner.lock();
        let block = inner.blocks.get_mut(slot)?;
        match std::mem::replace(block, Block::Vacant) {
            Block::Vacant => None,
            Block::Reserved => {
                inner.free.push(slot);
                inner.in_use -= 1;
                None
            }
            Block::Parked(value) => {
                inner.free.push(slot);
                inner.in_use -= 1;
                Some(value)
            }
        }
    }

    /// Blocks currently reserved or parked.
    pub fn len(&self) -> usize {
        self.inner.lock().in_use
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blocks ever allocated (in use + free).
    pub fn capacity(&self) -> usize {
        self.inner.lock().blocks.len()
    }
}
