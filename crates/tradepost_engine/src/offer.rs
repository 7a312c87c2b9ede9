//! # Offer Store
//!
//! Validated exchange offers, ordered the way the owner arranged them.
//!
//! An offer is a cost -> reward exchange rule: the cost side is what the
//! trading participant pays, the reward side is what they receive. Both
//! sides are validated at authoring time so trade execution never meets a
//! malformed offer. Display order matters to participants, so the book
//! preserves insertion order.

use serde::{Deserialize, Serialize};

use tradepost_shared::OfferId;

use crate::error::{TradeError, TradeResult};
use crate::resource::{ResourceCatalog, ResourceFlags, ResourceStack};

/// A single exchange offer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    /// Identifier, unique within the owning shop.
    pub id: OfferId,
    /// Resources required from the trading participant. Never empty.
    pub costs: Vec<ResourceStack>,
    /// Resources given to the trading participant. Never empty.
    pub rewards: Vec<ResourceStack>,
    /// Initial finite stock, `None` for unlimited.
    ///
    /// The live remaining count is tracked by the shop's stock ledger;
    /// this field only seeds the ledger when the offer is added.
    pub stock_limit: Option<u32>,
    /// Disabled offers are not selectable.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

const fn default_enabled() -> bool {
    true
}

impl Offer {
    /// Creates an enabled, unlimited offer.
    #[must_use]
    pub fn new(id: OfferId, costs: Vec<ResourceStack>, rewards: Vec<ResourceStack>) -> Self {
        Self {
            id,
            costs,
            rewards,
            stock_limit: None,
            enabled: true,
        }
    }

    /// Sets a finite stock limit.
    #[must_use]
    pub fn with_stock(mut self, stock: u32) -> Self {
        self.stock_limit = Some(stock);
        self
    }

    /// Validates the offer against the resource catalog.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOffer` if either side is empty, any amount is zero,
    /// or any resource kind is unrecognized or soulbound.
    pub fn validate(&self, catalog: &ResourceCatalog) -> TradeResult<()> {
        if self.costs.is_empty() {
            return Err(TradeError::InvalidOffer {
                reason: "offer has no cost side".to_string(),
            });
        }
        if self.rewards.is_empty() {
            return Err(TradeError::InvalidOffer {
                reason: "offer has no reward side".to_string(),
            });
        }
        for stack in self.costs.iter().chain(self.rewards.iter()) {
            if stack.amount == 0 {
                return Err(TradeError::InvalidOffer {
                    reason: format!("resource {} has zero quantity", stack.resource),
                });
            }
            let Some(kind) = catalog.get(stack.resource) else {
                return Err(TradeError::InvalidOffer {
                    reason: format!("unrecognized resource kind {}", stack.resource),
                });
            };
            if kind.flags.has(ResourceFlags::SOULBOUND) {
                return Err(TradeError::InvalidOffer {
                    reason: format!("resource {} cannot change hands", stack.resource),
                });
            }
        }
        Ok(())
    }
}

/// The ordered offer book of one shop.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferBook {
    offers: Vec<Offer>,
    next_id: OfferId,
}

impl OfferBook {
    /// Creates an empty offer book.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            offers: Vec::new(),
            next_id: 1,
        }
    }

    /// Validates and appends an offer, assigning it the next free id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOffer` if validation fails; the book is unchanged.
    pub fn add(&mut self, mut offer: Offer, catalog: &ResourceCatalog) -> TradeResult<OfferId> {
        offer.validate(catalog)?;
        offer.id = self.next_id;
        self.next_id += 1;
        self.offers.push(offer);
        Ok(self.next_id - 1)
    }

    /// Removes an offer. Idempotent: absent ids are a no-op, not an error.
    pub fn remove(&mut self, offer_id: OfferId) {
        self.offers.retain(|o| o.id != offer_id);
    }

    /// Looks up an offer by id.
    #[must_use]
    pub fn get(&self, offer_id: OfferId) -> Option<&Offer> {
        self.offers.iter().find(|o| o.id == offer_id)
    }

    /// Looks up an offer mutably.
    pub fn get_mut(&mut self, offer_id: OfferId) -> Option<&mut Offer> {
        self.offers.iter_mut().find(|o| o.id == offer_id)
    }

    /// Enables or disables an offer.
    ///
    /// # Errors
    ///
    /// Returns `OfferNotFound` if the id is absent.
    pub fn set_enabled(&mut self, offer_id: OfferId, enabled: bool) -> TradeResult<()> {
        match self.get_mut(offer_id) {
            Some(offer) => {
                offer.enabled = enabled;
                Ok(())
            }
            None => Err(TradeError::OfferNotFound(offer_id)),
        }
    }

    /// Iterates offers in insertion (display) order.
    pub fn iter(&self) -> impl Iterator<Item = &Offer> {
        self.offers.iter()
    }

    /// Number of offers in the book.
    #[must_use]
    pub fn len(&self) -> usize {
        self.offers.len()
    }

    /// Returns true if the book has no offers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceKind;

    fn test_catalog() -> ResourceCatalog {
        let mut catalog = ResourceCatalog::new();
        for (id, name) in [(1, "ore"), (2, "ingot"), (3, "gem")] {
            catalog
                .register(ResourceKind {
                    id,
                    name: name.to_string(),
                    max_stack: 64,
                    flags: ResourceFlags::TRADEABLE,
                })
                .unwrap();
        }
        catalog
    }

    #[test]
    fn test_add_assigns_sequential_ids() {
        let catalog = test_catalog();
        let mut book = OfferBook::new();

        let a = book
            .add(
                Offer::new(0, vec![ResourceStack::new(1, 3)], vec![ResourceStack::new(2, 1)]),
                &catalog,
            )
            .unwrap();
        let b = book
            .add(
                Offer::new(0, vec![ResourceStack::new(2, 2)], vec![ResourceStack::new(3, 1)]),
                &catalog,
            )
            .unwrap();

        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[test]
    fn test_insertion_order_preserved() {
        let catalog = test_catalog();
        let mut book = OfferBook::new();
        for resource in [3, 1, 2] {
            book.add(
                Offer::new(
                    0,
                    vec![ResourceStack::new(resource, 1)],
                    vec![ResourceStack::new(1, 1)],
                ),
                &catalog,
            )
            .unwrap();
        }
        let order: Vec<_> = book.iter().map(|o| o.costs[0].resource).collect();
        assert_eq!(order, vec![3, 1, 2]);
    }

    #[test]
    fn test_reject_empty_cost() {
        let catalog = test_catalog();
        let mut book = OfferBook::new();
        let result = book.add(Offer::new(0, vec![], vec![ResourceStack::new(1, 1)]), &catalog);
        assert!(matches!(result, Err(TradeError::InvalidOffer { .. })));
        assert!(book.is_empty());
    }

    #[test]
    fn test_reject_zero_quantity() {
        let catalog = test_catalog();
        let mut book = OfferBook::new();
        let result = book.add(
            Offer::new(0, vec![ResourceStack::new(1, 0)], vec![ResourceStack::new(2, 1)]),
            &catalog,
        );
        assert!(matches!(result, Err(TradeError::InvalidOffer { .. })));
    }

    #[test]
    fn test_reject_unknown_resource() {
        let catalog = test_catalog();
        let mut book = OfferBook::new();
        let result = book.add(
            Offer::new(0, vec![ResourceStack::new(99, 1)], vec![ResourceStack::new(2, 1)]),
            &catalog,
        );
        assert!(matches!(result, Err(TradeError::InvalidOffer { .. })));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let catalog = test_catalog();
        let mut book = OfferBook::new();
        let id = book
            .add(
                Offer::new(0, vec![ResourceStack::new(1, 1)], vec![ResourceStack::new(2, 1)]),
                &catalog,
            )
            .unwrap();

        book.remove(id);
        assert!(book.is_empty());
        // Second removal of the same id is a no-op.
        book.remove(id);
        assert!(book.is_empty());
    }
}
