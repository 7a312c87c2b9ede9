//! # Participant Holdings
//!
//! Slot-based resource storage for a trading participant.
//!
//! The engine treats holdings as the authoritative record of what a
//! participant carries. Trade commits mutate holdings under a
//! snapshot/restore discipline: take a snapshot, apply every sub-update,
//! and restore the snapshot if any sub-update fails. That is what makes
//! the participant side of a commit all-or-nothing.

use serde::{Deserialize, Serialize};

use tradepost_shared::ResourceId;

use crate::error::{TradeError, TradeResult};

/// Default number of slots for a participant.
pub const DEFAULT_SLOTS: usize = 36;

/// One slot: a resource kind and how much of it is stacked there.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Slot {
    /// The resource kind, or 0 for an empty slot.
    resource: ResourceId,
    /// Amount in this slot.
    count: u64,
}

impl Slot {
    const EMPTY: Self = Self {
        resource: 0,
        count: 0,
    };

    #[inline]
    const fn is_empty(&self) -> bool {
        self.count == 0 || self.resource == 0
    }
}

/// Slot-based holdings for one participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holdings {
    slots: Vec<Slot>,
}

impl Holdings {
    /// Creates empty holdings with the default slot count.
    #[must_use]
    pub fn new() -> Self {
        Self::with_slots(DEFAULT_SLOTS)
    }

    /// Creates empty holdings with a specific slot count.
    #[must_use]
    pub fn with_slots(slots: usize) -> Self {
        Self {
            slots: vec![Slot::EMPTY; slots],
        }
    }

    /// Returns the slot capacity.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Counts the total amount of a resource across all slots.
    #[must_use]
    pub fn count(&self, resource: ResourceId) -> u64 {
        self.slots
            .iter()
            .filter(|s| s.resource == resource)
            .map(|s| s.count)
            .sum()
    }

    /// Adds an amount of a resource, stacking onto existing slots first.
    ///
    /// # Errors
    ///
    /// Returns `HoldingsFull` if the remainder does not fit; holdings are
    /// left unchanged in that case.
    pub fn add(&mut self, resource: ResourceId, amount: u64, max_stack: u32) -> TradeResult<()> {
        if !self.can_accept(resource, amount, max_stack) {
            return Err(TradeError::HoldingsFull {
                capacity: u32::try_from(self.slots.len()).unwrap_or(u32::MAX),
                amount,
            });
        }

        let max_stack = u64::from(max_stack);
        let mut remaining = amount;

        // First, top up existing stacks.
        for slot in &mut self.slots {
            if remaining == 0 {
                break;
            }
            if slot.resource == resource && slot.count < max_stack {
                let can_add = (max_stack - slot.count).min(remaining);
                slot.count += can_add;
                remaining -= can_add;
            }
        }

        // Then, fill empty slots.
        for slot in &mut self.slots {
            if remaining == 0 {
                break;
            }
            if slot.is_empty() {
                let add = remaining.min(max_stack);
                *slot = Slot {
                    resource,
                    count: add,
                };
                remaining -= add;
            }
        }

        debug_assert_eq!(remaining, 0, "can_accept admitted an amount that did not fit");
        Ok(())
    }

    /// Removes an amount of a resource.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientFunds` if not enough is held; holdings are left
    /// unchanged in that case.
    pub fn remove(&mut self, resource: ResourceId, amount: u64) -> TradeResult<()> {
        let available = self.count(resource);
        if available < amount {
            return Err(TradeError::InsufficientFunds {
                resource,
                required: amount,
                available,
            });
        }

        let mut remaining = amount;
        for slot in &mut self.slots {
            if remaining == 0 {
                break;
            }
            if slot.resource == resource {
                let take = slot.count.min(remaining);
                slot.count -= take;
                remaining -= take;
                if slot.count == 0 {
                    *slot = Slot::EMPTY;
                }
            }
        }

        Ok(())
    }

    /// Checks whether an amount would fit without mutating anything.
    #[must_use]
    pub fn can_accept(&self, resource: ResourceId, amount: u64, max_stack: u32) -> bool {
        let max_stack = u64::from(max_stack);
        let mut room = 0u64;
        for slot in &self.slots {
            if slot.is_empty() {
                room = room.saturating_add(max_stack);
            } else if slot.resource == resource && slot.count < max_stack {
                room = room.saturating_add(max_stack - slot.count);
            }
            if room >= amount {
                return true;
            }
        }
        room >= amount
    }

    /// Creates a snapshot for rollback.
    #[must_use]
    pub fn snapshot(&self) -> HoldingsSnapshot {
        HoldingsSnapshot {
            slots: self.slots.clone(),
        }
    }

    /// Restores holdings from a snapshot (rollback).
    pub fn restore(&mut self, snapshot: HoldingsSnapshot) {
        self.slots = snapshot.slots;
    }
}

impl Default for Holdings {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of holdings state for transactional rollback.
#[derive(Clone, Debug)]
pub struct HoldingsSnapshot {
    slots: Vec<Slot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_count() {
        let mut h = Holdings::new();
        h.add(1, 10, 64).unwrap();
        assert_eq!(h.count(1), 10);
    }

    #[test]
    fn test_add_stacks_before_empty_slots() {
        let mut h = Holdings::with_slots(2);
        h.add(1, 64, 64).unwrap();
        h.add(1, 10, 64).unwrap();
        assert_eq!(h.count(1), 74);
        // Both slots used, nothing else fits.
        assert!(h.add(2, 1, 64).is_err());
    }

    #[test]
    fn test_remove_insufficient_leaves_state() {
        let mut h = Holdings::new();
        h.add(1, 10, 64).unwrap();
        let result = h.remove(1, 20);
        assert!(matches!(result, Err(TradeError::InsufficientFunds { .. })));
        assert_eq!(h.count(1), 10);
    }

    #[test]
    fn test_full_rejected_without_partial_add() {
        let mut h = Holdings::with_slots(1);
        h.add(1, 60, 64).unwrap();
        // 10 more would need a second slot.
        let result = h.add(1, 10, 64);
        assert!(matches!(result, Err(TradeError::HoldingsFull { .. })));
        assert_eq!(h.count(1), 60);
    }

    #[test]
    fn test_snapshot_restore() {
        let mut h = Holdings::new();
        h.add(1, 50, 64).unwrap();

        let snapshot = h.snapshot();
        h.add(2, 30, 64).unwrap();
        h.remove(1, 20).unwrap();

        h.restore(snapshot);
        assert_eq!(h.count(1), 50);
        assert_eq!(h.count(2), 0);
    }
}
