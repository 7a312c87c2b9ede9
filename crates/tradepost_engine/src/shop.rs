//! # Shop Model
//!
//! A shop is a located, owned-or-unowned entity exposing tradeable offers.
//! Its offers and stock are owned exclusively by the registry; everything
//! here is plain data plus invariant-preserving accessors.

use serde::{Deserialize, Serialize};

use tradepost_shared::{BlockPos, OfferId, OwnerId, RegionPos, ShopId};

use crate::error::TradeResult;
use crate::offer::{Offer, OfferBook};
use crate::resource::ResourceCatalog;
use crate::stock::StockLedger;

/// The kind of exchange a shop performs.
///
/// `Selling`, `Buying` and `Bartering` are presentation labels for the
/// host (signage, offer editors, filtering); the engine executes all
/// three through the same offer machinery, and an offer's cost/reward
/// sides alone determine which way goods and coins move. Only
/// `AdminUnlimited` changes engine behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShopKind {
    /// Owner sells goods for currency.
    Selling,
    /// Owner buys goods for currency.
    Buying,
    /// Goods for goods, no currency involved.
    Bartering,
    /// Administrative shop: no owner, unlimited stock, no proceeds.
    AdminUnlimited,
}

/// One trading post.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shop {
    /// Stable unique identifier, persisted across restarts.
    pub id: ShopId,
    /// Owner identity; `None` for unowned/admin shops.
    pub owner: Option<OwnerId>,
    /// Display name shown to participants.
    pub name: String,
    /// Anchor position in the world.
    pub location: BlockPos,
    /// Exchange kind.
    pub kind: ShopKind,
    /// Whether the shop's region is currently loaded.
    #[serde(skip, default)]
    pub active: bool,
    /// The ordered offer book.
    pub offers: OfferBook,
    /// Remaining stock per finite-stock offer.
    pub stock: StockLedger,
}

impl Shop {
    /// Creates an inactive shop with an empty offer book.
    #[must_use]
    pub fn new(
        id: ShopId,
        owner: Option<OwnerId>,
        name: String,
        location: BlockPos,
        kind: ShopKind,
    ) -> Self {
        Self {
            id,
            owner,
            name,
            location,
            kind,
            active: false,
            offers: OfferBook::new(),
            stock: StockLedger::new(),
        }
    }

    /// The region this shop activates/deactivates with.
    #[inline]
    #[must_use]
    pub const fn region(&self) -> RegionPos {
        self.location.region()
    }

    /// Returns true if the shop never runs out of stock.
    #[inline]
    #[must_use]
    pub const fn is_unlimited(&self) -> bool {
        matches!(self.kind, ShopKind::AdminUnlimited)
    }

    /// Validates and adds an offer, seeding the stock ledger from its
    /// stock limit.
    ///
    /// Admin-unlimited shops ignore stock limits; their offers never get a
    /// ledger entry.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOffer` if validation fails.
    pub fn add_offer(&mut self, offer: Offer, catalog: &ResourceCatalog) -> TradeResult<OfferId> {
        let stock_limit = offer.stock_limit;
        let id = self.offers.add(offer, catalog)?;
        if !self.is_unlimited() {
            if let Some(limit) = stock_limit {
                self.stock.set_stock(id, limit);
            }
        }
        Ok(id)
    }

    /// Removes an offer and its stock entry. Idempotent.
    pub fn remove_offer(&mut self, offer_id: OfferId) {
        self.offers.remove(offer_id);
        self.stock.clear_stock(offer_id);
    }
}
