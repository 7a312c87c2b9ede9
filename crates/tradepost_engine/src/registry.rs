//! # Shop Registry
//!
//! Exclusive owner of all live shop instances.
//!
//! Two secondary indexes are maintained transactionally alongside the shop
//! collection: a location index (at most one active shop per block) and an
//! owner index. A third, region index drives activation as the host loads
//! and unloads spatial regions. All three are rebuilt from the shop
//! collection on startup, never persisted.
//!
//! ## Concurrency rule
//!
//! The registry is NOT internally locked. Every mutation must run on the
//! single logical world-mutation thread; callers are responsible for
//! serializing onto it. That total order is what makes `reserve` in the
//! stock ledger atomic.
//!
//! ## Dirty set
//!
//! `mutate` is the single sanctioned path for changing a shop; it marks
//! the shop dirty as a side effect. The persistence pipeline drains the
//! dirty set via [`ShopRegistry::take_dirty`].

use std::collections::{HashMap, HashSet};

use tracing::debug;

use tradepost_shared::{BlockPos, OwnerId, RegionPos, ShopId};

use crate::error::{TradeError, TradeResult};
use crate::shop::Shop;

/// Registry of all shops, live and dormant.
#[derive(Debug, Default)]
pub struct ShopRegistry {
    shops: HashMap<ShopId, Shop>,
    by_location: HashMap<BlockPos, ShopId>,
    by_owner: HashMap<OwnerId, HashSet<ShopId>>,
    by_region: HashMap<RegionPos, Vec<ShopId>>,
    dirty: HashSet<ShopId>,
    next_id: ShopId,
}

impl ShopRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    /// Number of shops (active and inactive).
    #[must_use]
    pub fn len(&self) -> usize {
        self.shops.len()
    }

    /// Returns true if the registry holds no shops.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shops.is_empty()
    }

    /// Registers a new shop at a location, assigning it a fresh id.
    ///
    /// The shop starts inactive; it activates when its region loads (or
    /// immediately via [`ShopRegistry::spawn`] if the region is already
    /// loaded).
    ///
    /// # Errors
    ///
    /// Returns `LocationOccupied` if another shop is anchored there.
    pub fn create(&mut self, mut shop: Shop) -> TradeResult<ShopId> {
        if let Some(&existing) = self.by_location.get(&shop.location) {
            return Err(TradeError::LocationOccupied(existing));
        }
        let id = self.next_id;
        self.next_id += 1;
        shop.id = id;
        shop.active = false;
        self.index(&shop);
        self.shops.insert(id, shop);
        self.dirty.insert(id);
        debug!(shop_id = id, "shop created");
        Ok(id)
    }

    /// Re-inserts a shop loaded from persistence, keeping its stored id.
    ///
    /// # Errors
    ///
    /// Returns `LocationOccupied` if a previously loaded record already
    /// claimed the location (duplicate records are treated as corruption
    /// by the caller).
    pub fn adopt(&mut self, mut shop: Shop) -> TradeResult<ShopId> {
        if let Some(&existing) = self.by_location.get(&shop.location) {
            return Err(TradeError::LocationOccupied(existing));
        }
        shop.active = false;
        let id = shop.id;
        self.next_id = self.next_id.max(id + 1);
        self.index(&shop);
        self.shops.insert(id, shop);
        Ok(id)
    }

    fn index(&mut self, shop: &Shop) {
        self.by_location.insert(shop.location, shop.id);
        if let Some(owner) = shop.owner {
            self.by_owner.entry(owner).or_default().insert(shop.id);
        }
        self.by_region.entry(shop.region()).or_default().push(shop.id);
    }

    fn unindex(&mut self, shop: &Shop) {
        self.by_location.remove(&shop.location);
        if let Some(owner) = shop.owner {
            if let Some(set) = self.by_owner.get_mut(&owner) {
                set.remove(&shop.id);
                if set.is_empty() {
                    self.by_owner.remove(&owner);
                }
            }
        }
        if let Some(ids) = self.by_region.get_mut(&shop.region()) {
            ids.retain(|&id| id != shop.id);
            if ids.is_empty() {
                self.by_region.remove(&shop.region());
            }
        }
    }

    /// Explicit teardown: removes the shop and all its index entries.
    ///
    /// The persisted record is tombstoned by the caller through the
    /// persistence pipeline; despawning alone never deletes data.
    ///
    /// # Errors
    ///
    /// Returns `ShopNotFound` if the id is absent.
    pub fn remove(&mut self, shop_id: ShopId) -> TradeResult<Shop> {
        let shop = self
            .shops
            .remove(&shop_id)
            .ok_or(TradeError::ShopNotFound(shop_id))?;
        self.unindex(&shop);
        self.dirty.remove(&shop_id);
        debug!(shop_id, "shop removed");
        Ok(shop)
    }

    /// Activates a shop (its region loaded).
    ///
    /// # Errors
    ///
    /// Returns `ShopNotFound` if the id is absent.
    pub fn spawn(&mut self, shop_id: ShopId) -> TradeResult<()> {
        let shop = self
            .shops
            .get_mut(&shop_id)
            .ok_or(TradeError::ShopNotFound(shop_id))?;
        shop.active = true;
        Ok(())
    }

    /// Deactivates a shop (its region unloaded). Never deletes state.
    ///
    /// # Errors
    ///
    /// Returns `ShopNotFound` if the id is absent.
    pub fn despawn(&mut self, shop_id: ShopId) -> TradeResult<()> {
        let shop = self
            .shops
            .get_mut(&shop_id)
            .ok_or(TradeError::ShopNotFound(shop_id))?;
        shop.active = false;
        Ok(())
    }

    /// Activates every shop in a region. Returns the activated ids.
    pub fn on_region_load(&mut self, region: RegionPos) -> Vec<ShopId> {
        let ids = self.by_region.get(&region).cloned().unwrap_or_default();
        for &id in &ids {
            if let Some(shop) = self.shops.get_mut(&id) {
                shop.active = true;
            }
        }
        if !ids.is_empty() {
            debug!(?region, shops = ids.len(), "region activated");
        }
        ids
    }

    /// Deactivates every shop in a region. Returns the deactivated ids.
    pub fn on_region_unload(&mut self, region: RegionPos) -> Vec<ShopId> {
        let ids = self.by_region.get(&region).cloned().unwrap_or_default();
        for &id in &ids {
            if let Some(shop) = self.shops.get_mut(&id) {
                shop.active = false;
            }
        }
        ids
    }

    /// O(1) lookup of the shop anchored at a location.
    #[must_use]
    pub fn find_at(&self, location: BlockPos) -> Option<ShopId> {
        self.by_location.get(&location).copied()
    }

    /// All shops belonging to an owner.
    #[must_use]
    pub fn find_by_owner(&self, owner: OwnerId) -> HashSet<ShopId> {
        self.by_owner.get(&owner).cloned().unwrap_or_default()
    }

    /// Read access to a shop.
    #[must_use]
    pub fn get(&self, shop_id: ShopId) -> Option<&Shop> {
        self.shops.get(&shop_id)
    }

    /// The single sanctioned mutation path. Marks the shop dirty.
    ///
    /// # Errors
    ///
    /// Returns `ShopNotFound` if the id is absent, or whatever the mutation
    /// closure returns. The shop is marked dirty even when the closure
    /// fails partway, since it may already have changed state.
    pub fn mutate<T>(
        &mut self,
        shop_id: ShopId,
        f: impl FnOnce(&mut Shop) -> TradeResult<T>,
    ) -> TradeResult<T> {
        let shop = self
            .shops
            .get_mut(&shop_id)
            .ok_or(TradeError::ShopNotFound(shop_id))?;
        self.dirty.insert(shop_id);
        f(shop)
    }

    /// Changes a shop's owner, keeping the owner index consistent.
    ///
    /// # Errors
    ///
    /// Returns `ShopNotFound` if the id is absent.
    pub fn transfer_owner(&mut self, shop_id: ShopId, new_owner: Option<OwnerId>) -> TradeResult<()> {
        let shop = self
            .shops
            .get_mut(&shop_id)
            .ok_or(TradeError::ShopNotFound(shop_id))?;

        if let Some(old) = shop.owner {
            if let Some(set) = self.by_owner.get_mut(&old) {
                set.remove(&shop_id);
                if set.is_empty() {
                    self.by_owner.remove(&old);
                }
            }
        }
        // Re-borrow after index maintenance.
        let shop = self
            .shops
            .get_mut(&shop_id)
            .ok_or(TradeError::ShopNotFound(shop_id))?;
        shop.owner = new_owner;
        if let Some(owner) = new_owner {
            self.by_owner.entry(owner).or_default().insert(shop_id);
        }
        self.dirty.insert(shop_id);
        Ok(())
    }

    /// Number of shops pending persistence.
    #[must_use]
    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    /// Drains the dirty set, returning the ids that need persisting.
    ///
    /// A shop mutated again after this call re-enters the dirty set and is
    /// picked up by the next cycle.
    pub fn take_dirty(&mut self) -> Vec<ShopId> {
        self.dirty.drain().collect()
    }

    /// Re-marks shops dirty (a persistence write for them failed).
    pub fn mark_dirty(&mut self, ids: impl IntoIterator<Item = ShopId>) {
        self.dirty.extend(ids);
    }
}
