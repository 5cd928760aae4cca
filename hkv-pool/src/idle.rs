//! # Idle List
//!
//! Recency-ordered list of idle connections, linked by arena slot index.
//! The front holds the most recently returned connection, the back the least
//! recently used one. Every operation is O(1).
//!
//! The list does no locking of its own; the owning pool guards it.

use std::time::Instant;

use crate::arena::SlotId;

/// Bookkeeping for one idle connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleEntry {
    pub slot: SlotId,
    /// When the connection was built; drives the lifetime limit.
    pub created_at: Instant,
    /// When the connection was last returned; drives the idle timeout.
    pub idle_since: Instant,
}

/// Intrusive node, addressed by slot id.
#[derive(Debug)]
struct Node {
    created_at: Instant,
    idle_since: Instant,
    prev: Option<SlotId>,
    next: Option<SlotId>,
}

/// Index-linked doubly linked list of idle entries.
#[derive(Debug, Default)]
pub struct IdleList {
    nodes: Vec<Option<Node>>,
    head: Option<SlotId>,
    tail: Option<SlotId>,
    len: usize,
}

impl IdleList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, slot: SlotId) -> bool {
        matches!(self.nodes.get(slot), Some(Some(_)))
    }

    /// Links `entry` as the most recently idle item.
    ///
    /// A slot already on the list is moved to the front instead of linked twice.
    pub fn push_front(&mut self, entry: IdleEntry) {
        if self.contains(entry.slot) {
            self.unlink(entry.slot);
        }
        if self.nodes.len() <= entry.slot {
            self.nodes.resize_with(entry.slot + 1, || None);
        }

        let head = self.head;
        self.nodes[entry.slot] = Some(Node {
            created_at: entry.created_at,
            idle_since: entry.idle_since,
            prev: None,
            next: head,
        });

        if let Some(head_idx) = head {
            if let Some(head_node) = self.nodes[head_idx].as_mut() {
                head_node.prev = Some(entry.slot);
            }
        } else {
            self.tail = Some(entry.slot);
        }

        self.head = Some(entry.slot);
        self.len += 1;
    }

    /// Removes the most recently idle entry.
    pub fn pop_front(&mut self) -> Option<IdleEntry> {
        let slot = self.head?;
        self.unlink(slot)
    }

    /// Removes the least recently idle entry.
    pub fn pop_back(&mut self) -> Option<IdleEntry> {
        let slot = self.tail?;
        self.unlink(slot)
    }

    /// Returns the least recently idle entry without removing it.
    pub fn peek_back(&self) -> Option<IdleEntry> {
        let slot = self.tail?;
        let node = self.nodes[slot].as_ref()?;
        Some(IdleEntry {
            slot,
            created_at: node.created_at,
            idle_since: node.idle_since,
        })
    }

    /// Detaches `slot` and returns its entry.
    fn unlink(&mut self, slot: SlotId) -> Option<IdleEntry> {
        let node = self.nodes.get_mut(slot)?.take()?;

        if let Some(prev_idx) = node.prev {
            if let Some(prev_node) = self.nodes[prev_idx].as_mut() {
                prev_node.next = node.next;
            }
        } else {
            self.head = node.next;
        }

        if let Some(next_idx) = node.next {
            if let Some(next_node) = self.nodes[next_idx].as_mut() {
                next_node.prev = node.prev;
            }
        } else {
            self.tail = node.prev;
        }

        self.len -= 1;
        Some(IdleEntry {
            slot,
            created_at: node.created_at,
            idle_since: node.idle_since,
        })
    }
}
