//! # Stock Ledger
//!
//! **Reserve / Release / Finalize**
//!
//! Tracks the remaining finite stock of each stocked offer, independent of
//! any backing inventory representation. The reserve step is what makes a
//! trade atomic despite multiple independently-failing sub-resources:
//!
//! 1. `reserve` atomically checks and decrements the count, handing back a
//!    [`Reservation`] token
//! 2. if any later step of the trade fails, `release` restores the count
//! 3. on commit, `finalize` consumes the token; the decrement is already
//!    applied, so finalization is a ledger no-op
//!
//! Counts are never negative. Unlimited offers have no entry at all;
//! reserving one yields a token that releases to nothing.
//!
//! All calls happen on the world mutation thread, so reserve is atomic
//! relative to the total order of mutations without any locking.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use tradepost_shared::OfferId;

use crate::error::{TradeError, TradeResult};

/// A provisional hold on reserved stock.
///
/// Must be either released (restoring the count) or finalized (keeping the
/// decrement). Dropping a token without doing either loses stock, so the
/// type is `#[must_use]` and offers no other way out.
#[derive(Debug)]
#[must_use = "a reservation must be released or finalized"]
pub struct Reservation {
    offer_id: OfferId,
    qty: u32,
    /// Unlimited offers reserve nothing; release is then a no-op too.
    counted: bool,
}

impl Reservation {
    /// The offer this reservation holds stock of.
    #[inline]
    #[must_use]
    pub const fn offer_id(&self) -> OfferId {
        self.offer_id
    }

    /// The reserved quantity.
    #[inline]
    #[must_use]
    pub const fn qty(&self) -> u32 {
        self.qty
    }
}

/// Remaining-stock bookkeeping for one shop.
///
/// Serialized as a list of `{ offer, count }` entries; TOML map keys must
/// be strings, so the map form does not survive the record format.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLedger {
    #[serde(with = "count_entries")]
    counts: HashMap<OfferId, u32>,
}

mod count_entries {
    use super::{HashMap, OfferId};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Entry {
        offer: OfferId,
        count: u32,
    }

    pub fn serialize<S: Serializer>(
        counts: &HashMap<OfferId, u32>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut entries: Vec<Entry> = counts
            .iter()
            .map(|(&offer, &count)| Entry { offer, count })
            .collect();
        // Stable output keeps record diffs and checksums deterministic.
        entries.sort_by_key(|e| e.offer);
        entries.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<HashMap<OfferId, u32>, D::Error> {
        let entries = Vec::<Entry>::deserialize(deserializer)?;
        Ok(entries.into_iter().map(|e| (e.offer, e.count)).collect())
    }
}

impl StockLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the count for a finite-stock offer.
    pub fn set_stock(&mut self, offer_id: OfferId, count: u32) {
        self.counts.insert(offer_id, count);
    }

    /// Removes the entry for an offer (the offer became unlimited or was
    /// deleted).
    pub fn clear_stock(&mut self, offer_id: OfferId) {
        self.counts.remove(&offer_id);
    }

    /// Returns the remaining count, or `None` for unlimited offers.
    #[must_use]
    pub fn available(&self, offer_id: OfferId) -> Option<u32> {
        self.counts.get(&offer_id).copied()
    }

    /// Atomically checks and decrements available stock.
    ///
    /// # Errors
    ///
    /// Returns `OutOfStock` if fewer than `qty` units remain. The ledger is
    /// unchanged on error.
    pub fn reserve(&mut self, offer_id: OfferId, qty: u32) -> TradeResult<Reservation> {
        match self.counts.get_mut(&offer_id) {
            None => Ok(Reservation {
                offer_id,
                qty,
                counted: false,
            }),
            Some(count) => {
                if *count < qty {
                    return Err(TradeError::OutOfStock(offer_id));
                }
                *count -= qty;
                Ok(Reservation {
                    offer_id,
                    qty,
                    counted: true,
                })
            }
        }
    }

    /// Releases a reservation, restoring the decremented amount.
    pub fn release(&mut self, reservation: Reservation) {
        if reservation.counted {
            if let Some(count) = self.counts.get_mut(&reservation.offer_id) {
                *count += reservation.qty;
            }
        }
    }

    /// Finalizes a reservation after a committed trade.
    ///
    /// The decrement was already applied by `reserve`; this only consumes
    /// the token.
    pub fn finalize(&mut self, reservation: Reservation) {
        // Consume the token; nothing to do on the counts.
        let _ = reservation;
    }

    /// Owner restocking: adds units to a finite-stock offer.
    ///
    /// Offers without an entry are unlimited and ignore restocks.
    pub fn restock(&mut self, offer_id: OfferId, qty: u32) {
        if let Some(count) = self.counts.get_mut(&offer_id) {
            *count = count.saturating_add(qty);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_decrements() {
        let mut ledger = StockLedger::new();
        ledger.set_stock(1, 2);

        let r = ledger.reserve(1, 1).unwrap();
        assert_eq!(ledger.available(1), Some(1));
        ledger.finalize(r);
        assert_eq!(ledger.available(1), Some(1));
    }

    #[test]
    fn test_release_round_trips() {
        let mut ledger = StockLedger::new();
        ledger.set_stock(1, 5);

        let r = ledger.reserve(1, 3).unwrap();
        assert_eq!(ledger.available(1), Some(2));
        ledger.release(r);
        assert_eq!(ledger.available(1), Some(5));
    }

    #[test]
    fn test_out_of_stock() {
        let mut ledger = StockLedger::new();
        ledger.set_stock(1, 1);

        let r = ledger.reserve(1, 1).unwrap();
        let second = ledger.reserve(1, 1);
        assert!(matches!(second, Err(TradeError::OutOfStock(1))));
        ledger.release(r);
        assert_eq!(ledger.available(1), Some(1));
    }

    #[test]
    fn test_unlimited_offer_has_no_entry() {
        let mut ledger = StockLedger::new();
        assert_eq!(ledger.available(7), None);

        let r = ledger.reserve(7, 1).unwrap();
        ledger.release(r);
        assert_eq!(ledger.available(7), None);
    }

    #[test]
    fn test_restock() {
        let mut ledger = StockLedger::new();
        ledger.set_stock(1, 0);
        ledger.restock(1, 10);
        assert_eq!(ledger.available(1), Some(10));

        // Unlimited offers ignore restocks.
        ledger.restock(2, 10);
        assert_eq!(ledger.available(2), None);
    }

    #[test]
    fn test_never_negative() {
        let mut ledger = StockLedger::new();
        ledger.set_stock(1, 1);
        assert!(ledger.reserve(1, 2).is_err());
        assert_eq!(ledger.available(1), Some(1));
    }
}
