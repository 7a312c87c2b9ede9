//! # Trade Log
//!
//! Bounded in-memory history of committed trades.
//!
//! Every committed trade appends one record; the log is a ring that drops
//! the oldest records once full. Owners query it to see what sold while
//! they were away.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use tradepost_shared::{OfferId, ParticipantId, ShopId, Tick};

use crate::resource::ResourceStack;

/// Default ring capacity.
pub const DEFAULT_LOG_CAPACITY: usize = 4096;

/// One committed trade.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// World tick at commit time.
    pub tick: Tick,
    /// Shop the trade ran against.
    pub shop_id: ShopId,
    /// The trading participant.
    pub participant: ParticipantId,
    /// The executed offer.
    pub offer_id: OfferId,
    /// What the participant paid.
    pub costs: Vec<ResourceStack>,
    /// What the participant received.
    pub rewards: Vec<ResourceStack>,
}

/// Ring buffer of recent committed trades.
#[derive(Debug)]
pub struct TradeLog {
    records: VecDeque<TradeRecord>,
    capacity: usize,
}

impl TradeLog {
    /// Creates a log with the given capacity (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Appends a record, evicting the oldest if the ring is full.
    pub fn record(&mut self, record: TradeRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Number of retained records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All retained records, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &TradeRecord> {
        self.records.iter()
    }

    /// Retained records for one shop, oldest first.
    pub fn by_shop(&self, shop_id: ShopId) -> impl Iterator<Item = &TradeRecord> {
        self.records.iter().filter(move |r| r.shop_id == shop_id)
    }

    /// Retained records for one participant, oldest first.
    pub fn by_participant(&self, participant: ParticipantId) -> impl Iterator<Item = &TradeRecord> {
        self.records
            .iter()
            .filter(move |r| r.participant == participant)
    }
}

impl Default for TradeLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tick: Tick, shop_id: ShopId, participant: ParticipantId) -> TradeRecord {
        TradeRecord {
            tick,
            shop_id,
            participant,
            offer_id: 1,
            costs: vec![ResourceStack::new(1, 3)],
            rewards: vec![ResourceStack::new(2, 1)],
        }
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let mut log = TradeLog::new(2);
        log.record(record(1, 1, 1));
        log.record(record(2, 1, 1));
        log.record(record(3, 1, 1));

        assert_eq!(log.len(), 2);
        let ticks: Vec<_> = log.iter().map(|r| r.tick).collect();
        assert_eq!(ticks, vec![2, 3]);
    }

    #[test]
    fn test_query_by_shop_and_participant() {
        let mut log = TradeLog::default();
        log.record(record(1, 1, 10));
        log.record(record(2, 2, 10));
        log.record(record(3, 1, 20));

        assert_eq!(log.by_shop(1).count(), 2);
        assert_eq!(log.by_participant(10).count(), 2);
        assert_eq!(log.by_participant(99).count(), 0);
    }
}
