//! # Trade Engine Facade
//!
//! Single entry point the host calls into. Owns the registry, sessions,
//! economy gateway, permission gate, holdings and the persistence
//! pipeline; everything below it is wiring.
//!
//! All methods run on the world mutation thread. The engine never blocks
//! that thread on I/O: record writes happen on the pipeline's writer
//! thread, and the only synchronous disk work is the initial load in
//! [`TradeEngine::open`] and an explicit [`TradeEngine::flush`].
//!
//! ## Commit discipline
//!
//! `on_trade_confirmed` is the one place state actually changes hands.
//! Stock is reserved first; every later sub-update (holdings out, currency
//! out, currency in, holdings in) is individually reversible, and any
//! failure unwinds the ones already applied, releases the reservation and
//! aborts the session. The participant observes either the whole exchange
//! or none of it.

use std::collections::HashMap;

use tracing::{error, info, warn};

use tradepost_shared::{
    AbortKind, BlockPos, OfferId, OwnerId, ParticipantId, RegionPos, ShopId, Tick, TradeEvent,
};

use crate::config::EngineConfig;
use crate::economy::{EconomyGateway, EconomyProvider};
use crate::error::{TradeError, TradeResult};
use crate::holdings::Holdings;
use crate::money::Coins;
use crate::offer::Offer;
use crate::permission::{Action, Decision, PermissionGate, ProtectionProvider};
use crate::persist::ShopStore;
use crate::pipeline::{PersistConfig, PersistStats, PersistencePipeline};
use crate::registry::ShopRegistry;
use crate::resource::{ResourceCatalog, ResourceKind, ResourceStack};
use crate::session::{SessionManager, TradePhase, TradeSession};
use crate::shop::{Shop, ShopKind};
use crate::stock::Reservation;
use crate::tradelog::{TradeLog, TradeRecord};

/// Proof of a committed trade, returned to the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TradeReceipt {
    /// Shop the trade executed against.
    pub shop_id: ShopId,
    /// The executed offer.
    pub offer_id: OfferId,
    /// The trading participant.
    pub participant: ParticipantId,
    /// Currency charged to the participant.
    pub currency_paid: Coins,
    /// Currency granted to the participant.
    pub currency_received: Coins,
    /// World tick at commit time.
    pub tick: Tick,
}

/// Cost/reward side split into its currency and physical parts.
struct SplitStacks {
    coins: Coins,
    items: Vec<ResourceStack>,
}

/// The engine.
pub struct TradeEngine {
    catalog: ResourceCatalog,
    registry: ShopRegistry,
    sessions: SessionManager,
    gateway: EconomyGateway,
    gate: PermissionGate,
    holdings: HashMap<ParticipantId, Holdings>,
    pipeline: PersistencePipeline,
    log: TradeLog,
    events: Vec<TradeEvent>,
    tick: Tick,
    ticks_since_persist: u64,
    persist: PersistConfig,
}

impl TradeEngine {
    /// Opens the engine: loads every shop record from the data directory
    /// and starts the persistence writer thread.
    ///
    /// Corrupt records are skipped (and left on disk for inspection); the
    /// rest of the world loads normally.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceFailure` if the data directory is unusable, or
    /// `CorruptRecord`-free load errors bubbled from the store.
    pub fn open(config: EngineConfig) -> TradeResult<Self> {
        let store = ShopStore::open(&config.data_dir)?;
        let report = store.load_all()?;

        let mut registry = ShopRegistry::new();
        for shop in report.shops {
            if let Err(err) = registry.adopt(shop) {
                warn!(%err, "skipping shop record that collides with an already loaded one");
            }
        }
        info!(shops = registry.len(), "trade engine opened");

        let persist = config.persist.clone();
        let pipeline = PersistencePipeline::start(store, persist.clone())?;

        Ok(Self {
            catalog: ResourceCatalog::new(),
            registry,
            sessions: SessionManager::new(config.session_timeout_ticks),
            gateway: EconomyGateway::with_attempt_cap(config.credit_retry_attempts),
            gate: PermissionGate::new(),
            holdings: HashMap::new(),
            pipeline,
            log: TradeLog::new(config.trade_log_capacity),
            events: Vec::new(),
            tick: 0,
            ticks_since_persist: 0,
            persist,
        })
    }

    // --- wiring -----------------------------------------------------------

    /// Registers a resource kind.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` on duplicate/reserved ids.
    pub fn register_resource(&mut self, kind: ResourceKind) -> TradeResult<()> {
        self.catalog.register(kind)
    }

    /// Registers the currency backend.
    pub fn register_economy_provider(&mut self, provider: Box<dyn EconomyProvider>) {
        self.gateway.register(provider);
    }

    /// Registers a protection provider.
    pub fn register_protection_provider(&mut self, provider: Box<dyn ProtectionProvider>) {
        self.gate.register(provider);
    }

    /// The resource catalog.
    #[must_use]
    pub fn catalog(&self) -> &ResourceCatalog {
        &self.catalog
    }

    /// The shop registry (read access).
    #[must_use]
    pub fn registry(&self) -> &ShopRegistry {
        &self.registry
    }

    /// The committed-trade history.
    #[must_use]
    pub fn trade_log(&self) -> &TradeLog {
        &self.log
    }

    /// The economy gateway (read access, e.g. deferred-credit depth).
    #[must_use]
    pub fn gateway(&self) -> &EconomyGateway {
        &self.gateway
    }

    /// Writer-thread counters.
    #[must_use]
    pub fn persist_stats(&self) -> PersistStats {
        self.pipeline.stats()
    }

    /// Current world tick as the engine has observed it.
    #[must_use]
    pub const fn current_tick(&self) -> Tick {
        self.tick
    }

    /// A participant's holdings, created empty on first touch.
    pub fn holdings_mut(&mut self, participant: ParticipantId) -> &mut Holdings {
        self.holdings.entry(participant).or_default()
    }

    /// A participant's holdings, if they have any.
    #[must_use]
    pub fn holdings(&self, participant: ParticipantId) -> Option<&Holdings> {
        self.holdings.get(&participant)
    }

    /// Drains the events accumulated since the last call.
    #[must_use]
    pub fn take_events(&mut self) -> Vec<TradeEvent> {
        std::mem::take(&mut self.events)
    }

    // --- shop management --------------------------------------------------

    /// Creates a shop where the creator stands. The shop activates
    /// immediately (the creator's region is necessarily loaded).
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` if a protection provider vetoes the
    /// location, or `LocationOccupied` if a shop is already anchored there.
    pub fn create_shop(
        &mut self,
        creator: ParticipantId,
        owner: Option<OwnerId>,
        name: String,
        location: BlockPos,
        kind: ShopKind,
    ) -> TradeResult<ShopId> {
        if let Decision::Deny { reason } = self.gate.check(creator, &Action::CreateShop { location })
        {
            return Err(TradeError::PermissionDenied { reason });
        }
        let shop_id = self
            .registry
            .create(Shop::new(0, owner, name, location, kind))?;
        self.registry.spawn(shop_id)?;
        self.events.push(TradeEvent::ShopSpawned { shop_id });
        Ok(shop_id)
    }

    /// Tears a shop down: aborts its open sessions, removes it from the
    /// registry and queues its record for deletion.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` on veto or `ShopNotFound` if absent.
    pub fn remove_shop(&mut self, remover: ParticipantId, shop_id: ShopId) -> TradeResult<()> {
        if let Decision::Deny { reason } = self.gate.check(remover, &Action::RemoveShop { shop_id })
        {
            return Err(TradeError::PermissionDenied { reason });
        }
        self.abort_sessions_for_shop(shop_id, AbortKind::ShopClosed);
        self.registry.remove(shop_id)?;
        if let Err(err) = self.pipeline.enqueue_delete(shop_id) {
            // Registry state is already gone; the stale record will be
            // superseded if the id is ever reused, so log and move on.
            error!(shop_id, %err, "failed to queue record deletion");
        }
        self.events.push(TradeEvent::ShopDespawned { shop_id });
        Ok(())
    }

    /// Adds a validated offer to a shop.
    ///
    /// # Errors
    ///
    /// Returns `ShopNotFound` or `InvalidOffer`.
    pub fn add_offer(&mut self, shop_id: ShopId, offer: Offer) -> TradeResult<OfferId> {
        let catalog = &self.catalog;
        self.registry.mutate(shop_id, |shop| shop.add_offer(offer, catalog))
    }

    /// Removes an offer from a shop. Idempotent on the offer id.
    ///
    /// # Errors
    ///
    /// Returns `ShopNotFound` if the shop is absent.
    pub fn remove_offer(&mut self, shop_id: ShopId, offer_id: OfferId) -> TradeResult<()> {
        self.registry.mutate(shop_id, |shop| {
            shop.remove_offer(offer_id);
            Ok(())
        })
    }

    /// Enables or disables an offer.
    ///
    /// # Errors
    ///
    /// Returns `ShopNotFound` or `OfferNotFound`.
    pub fn set_offer_enabled(
        &mut self,
        shop_id: ShopId,
        offer_id: OfferId,
        enabled: bool,
    ) -> TradeResult<()> {
        self.registry
            .mutate(shop_id, |shop| shop.offers.set_enabled(offer_id, enabled))
    }

    /// Owner restocking of a finite-stock offer.
    ///
    /// # Errors
    ///
    /// Returns `ShopNotFound` if the shop is absent.
    pub fn restock(&mut self, shop_id: ShopId, offer_id: OfferId, qty: u32) -> TradeResult<()> {
        let remaining = self.registry.mutate(shop_id, |shop| {
            shop.stock.restock(offer_id, qty);
            Ok(shop.stock.available(offer_id))
        })?;
        self.events.push(TradeEvent::StockChanged {
            shop_id,
            offer_id,
            remaining,
        });
        Ok(())
    }

    /// Transfers a shop to a new owner (or to unowned).
    ///
    /// # Errors
    ///
    /// Returns `ShopNotFound` if the shop is absent.
    pub fn transfer_shop(&mut self, shop_id: ShopId, new_owner: Option<OwnerId>) -> TradeResult<()> {
        self.registry.transfer_owner(shop_id, new_owner)
    }

    /// Renames a shop.
    ///
    /// # Errors
    ///
    /// Returns `ShopNotFound` if the shop is absent.
    pub fn rename_shop(&mut self, shop_id: ShopId, name: String) -> TradeResult<()> {
        self.registry.mutate(shop_id, |shop| {
            shop.name = name;
            Ok(())
        })
    }

    // --- region lifecycle ---------------------------------------------------

    /// Host signal: a region finished loading. Activates its shops.
    pub fn on_region_load(&mut self, region: RegionPos) {
        let ids = self.registry.on_region_load(region);
        let shops = ids.len();
        for shop_id in ids {
            self.events.push(TradeEvent::ShopSpawned { shop_id });
        }
        if shops > 0 {
            self.events.push(TradeEvent::RegionActivated { region, shops });
        }
    }

    /// Host signal: a region is unloading. Deactivates its shops and
    /// aborts any sessions against them, releasing reservations. Shop
    /// state is preserved; nothing is deleted.
    pub fn on_region_unload(&mut self, region: RegionPos) {
        let ids = self.registry.on_region_unload(region);
        for shop_id in ids {
            self.abort_sessions_for_shop(shop_id, AbortKind::ShopClosed);
            self.events.push(TradeEvent::ShopDespawned { shop_id });
        }
    }

    // --- trade session flow -------------------------------------------------

    /// A participant opened a shop's trade view. Starts a session.
    ///
    /// An existing session for the participant (against any shop) is
    /// replaced; its reservation, if any, is released.
    ///
    /// # Errors
    ///
    /// Returns `ShopNotFound` if the shop is absent or not active.
    pub fn on_shop_opened(
        &mut self,
        participant: ParticipantId,
        shop_id: ShopId,
    ) -> TradeResult<()> {
        let active = self
            .registry
            .get(shop_id)
            .ok_or(TradeError::ShopNotFound(shop_id))?
            .active;
        if !active {
            return Err(TradeError::ShopNotFound(shop_id));
        }
        if let Some(mut displaced) = self.sessions.open(participant, shop_id, self.tick) {
            self.unwind_session(&mut displaced);
        }
        Ok(())
    }

    /// A participant selected an offer in their open session.
    ///
    /// Stock is NOT checked here; exhaustion is detected at reservation
    /// time in `on_trade_confirmed`, where it aborts the session.
    ///
    /// # Errors
    ///
    /// Returns `NoSession`, `OfferNotFound` (also for disabled offers), or
    /// `WrongPhase` if stock is already reserved.
    pub fn on_offer_selected(
        &mut self,
        participant: ParticipantId,
        offer_id: OfferId,
    ) -> TradeResult<()> {
        let session = self.sessions.get_mut(participant)?;
        let shop_id = session.shop_id();

        let shop = self
            .registry
            .get(shop_id)
            .ok_or(TradeError::ShopNotFound(shop_id))?;
        let offer = shop
            .offers
            .get(offer_id)
            .ok_or(TradeError::OfferNotFound(offer_id))?;
        if !offer.enabled {
            return Err(TradeError::OfferNotFound(offer_id));
        }

        self.sessions
            .get_mut(participant)?
            .select_offer(offer_id, self.tick)
    }

    /// A participant confirmed the selected offer. Runs the full
    /// reserve-validate-commit sequence.
    ///
    /// # Errors
    ///
    /// Any validation or sub-update failure aborts the session (emitting
    /// `TradeAborted` with the mapped reason) and returns the underlying
    /// error. On success the session is consumed and a receipt returned.
    pub fn on_trade_confirmed(&mut self, participant: ParticipantId) -> TradeResult<TradeReceipt> {
        let session = self.sessions.get_mut(participant)?;
        let shop_id = session.shop_id();
        let Some(offer_id) = session.offer_id() else {
            return Err(TradeError::WrongPhase {
                found: session.phase().name(),
                expected: TradePhase::Validating.name(),
            });
        };

        // Gather everything needed from the shop before mutating anything.
        let shop = self
            .registry
            .get(shop_id)
            .ok_or(TradeError::ShopNotFound(shop_id))?;
        if !shop.active {
            return self.fail_trade(participant, shop_id, TradeError::ShopNotFound(shop_id));
        }
        let owner = shop.owner;
        let location = shop.location;
        let unlimited = shop.is_unlimited();
        let Some(offer) = shop.offers.get(offer_id) else {
            return self.fail_trade(participant, shop_id, TradeError::OfferNotFound(offer_id));
        };
        if !offer.enabled {
            return self.fail_trade(participant, shop_id, TradeError::OfferNotFound(offer_id));
        }
        let costs = offer.costs.clone();
        let rewards = offer.rewards.clone();

        // Permission gate runs before any state is touched, reservation
        // included.
        if let Decision::Deny { reason } =
            self.gate.check(participant, &Action::Trade { shop_id, location })
        {
            return self.fail_trade(
                participant,
                shop_id,
                TradeError::PermissionDenied { reason },
            );
        }

        let cost_split = match self.split_currency(&costs) {
            Ok(split) => split,
            Err(err) => return self.fail_trade(participant, shop_id, err),
        };
        let reward_split = match self.split_currency(&rewards) {
            Ok(split) => split,
            Err(err) => return self.fail_trade(participant, shop_id, err),
        };

        // Point of reservation: stock is held from here on, and every
        // failure path below must release it.
        let reservation = match self
            .registry
            .mutate(shop_id, |shop| shop.stock.reserve(offer_id, 1))
        {
            Ok(reservation) => reservation,
            Err(err) => return self.fail_trade(participant, shop_id, err),
        };

        let now = self.tick;
        let session = self.sessions.get_mut(participant)?;
        session.hold(reservation, now)?;
        let reservation = session.begin_commit(now)?;

        match self.apply_exchange(participant, owner, &cost_split, &reward_split) {
            Ok(()) => {}
            Err(err) => {
                self.release_reservation(shop_id, reservation);
                return self.fail_trade(participant, shop_id, err);
            }
        }

        // Point of no return: every sub-update applied. Finalize and
        // settle the owner's proceeds.
        self.registry
            .mutate(shop_id, |shop| {
                shop.stock.finalize(reservation);
                Ok(())
            })?;

        if let Some(owner) = owner {
            if !unlimited && !cost_split.coins.is_zero() {
                let delivered = self
                    .gateway
                    .credit_owner(shop_id, owner, cost_split.coins)?;
                if !delivered {
                    self.events.push(TradeEvent::OwnerCreditDeferred {
                        shop_id,
                        owner,
                        amount_minor: cost_split.coins.minor(),
                    });
                }
            }
        }

        let mut session = self
            .sessions
            .close(participant)
            .ok_or(TradeError::NoSession(participant))?;
        session.complete()?;

        self.log.record(TradeRecord {
            tick: now,
            shop_id,
            participant,
            offer_id,
            costs: costs.clone(),
            rewards: rewards.clone(),
        });
        self.events.push(TradeEvent::TradeCompleted {
            shop_id,
            participant,
            offer_id,
            costs: costs.iter().map(|s| (s.resource, s.amount)).collect(),
            rewards: rewards.iter().map(|s| (s.resource, s.amount)).collect(),
        });
        let remaining = self
            .registry
            .get(shop_id)
            .and_then(|shop| shop.stock.available(offer_id));
        self.events.push(TradeEvent::StockChanged {
            shop_id,
            offer_id,
            remaining,
        });

        Ok(TradeReceipt {
            shop_id,
            offer_id,
            participant,
            currency_paid: cost_split.coins,
            currency_received: reward_split.coins,
            tick: now,
        })
    }

    /// A participant closed the trade view without confirming. Silently
    /// discards the session, releasing any reservation.
    pub fn on_session_cancelled(&mut self, participant: ParticipantId) {
        if let Some(mut session) = self.sessions.close(participant) {
            self.unwind_session(&mut session);
        }
    }

    // --- tick ---------------------------------------------------------------

    /// Advances the engine by one world tick: expires idle sessions,
    /// retries deferred owner credits, and runs the persistence cadence.
    pub fn tick(&mut self) {
        self.tick += 1;

        for mut session in self.sessions.sweep_expired(self.tick) {
            let participant = session.participant();
            let shop_id = session.shop_id();
            self.unwind_session(&mut session);
            self.events.push(TradeEvent::TradeAborted {
                shop_id,
                participant,
                reason: AbortKind::SessionExpired,
            });
        }

        let retries = self.gateway.retry_deferred();
        for credit in retries.abandoned {
            self.events.push(TradeEvent::OwnerCreditAbandoned {
                shop_id: credit.shop_id,
                owner: credit.owner,
                amount_minor: credit.amount.minor(),
                attempts: credit.attempts,
            });
        }

        self.ticks_since_persist += 1;
        let due = self.ticks_since_persist >= self.persist.interval_ticks;
        let pressured = self.registry.dirty_len() >= self.persist.dirty_flush_threshold;
        if due || pressured {
            self.snapshot_dirty();
            self.ticks_since_persist = 0;
        }

        for abandoned in self.pipeline.take_abandoned() {
            // The in-memory state stays authoritative; re-mark so the next
            // cycle tries again.
            self.registry.mark_dirty([abandoned.shop_id]);
            self.events.push(TradeEvent::PersistFailed {
                shop_id: abandoned.shop_id,
                attempts: abandoned.attempts,
            });
        }
    }

    /// Snapshots every dirty shop and blocks until all records are on
    /// disk. For orderly shutdown.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceFailure` if the flush barrier cannot be queued.
    pub fn flush(&mut self) -> TradeResult<()> {
        self.snapshot_dirty();
        self.pipeline.flush()
    }

    // --- internals ------------------------------------------------------------

    fn snapshot_dirty(&mut self) {
        for shop_id in self.registry.take_dirty() {
            let Some(shop) = self.registry.get(shop_id) else {
                continue; // removed since it was marked
            };
            let snapshot = shop.clone();
            if let Err(err) = self.pipeline.enqueue_save(snapshot) {
                warn!(shop_id, %err, "persist queue full, shop stays dirty");
                self.registry.mark_dirty([shop_id]);
            }
        }
    }

    /// Splits a cost/reward side into currency and physical stacks.
    ///
    /// Currency stack amounts denominate whole coins.
    fn split_currency(&self, stacks: &[ResourceStack]) -> TradeResult<SplitStacks> {
        let currency = self.catalog.currency();
        let mut coins = Coins::ZERO;
        let mut items = Vec::new();
        for stack in stacks {
            if Some(stack.resource) == currency {
                coins = coins.checked_add(Coins::from_whole(stack.amount)?)?;
            } else {
                items.push(*stack);
            }
        }
        if !coins.is_zero() && !self.gateway.has_provider() {
            return Err(TradeError::EconomyFailure(
                "offer requires currency but no economy provider is registered".to_string(),
            ));
        }
        Ok(SplitStacks { coins, items })
    }

    /// Applies the four reversible exchange sub-updates, unwinding on the
    /// first failure. Stock reservation and owner crediting happen in the
    /// caller.
    fn apply_exchange(
        &mut self,
        participant: ParticipantId,
        owner: Option<OwnerId>,
        cost: &SplitStacks,
        reward: &SplitStacks,
    ) -> TradeResult<()> {
        let catalog = &self.catalog;
        let holdings = self.holdings.entry(participant).or_default();
        let snapshot = holdings.snapshot();

        // 1. Physical costs leave the participant.
        for stack in &cost.items {
            if let Err(err) = holdings.remove(stack.resource, stack.amount) {
                holdings.restore(snapshot);
                return Err(err);
            }
        }

        // 2. Physical rewards enter the participant. Done before any
        // currency movement so a full-holdings failure needs no refunds.
        for stack in &reward.items {
            let max_stack = catalog.max_stack(stack.resource);
            if let Err(err) = holdings.add(stack.resource, stack.amount, max_stack) {
                holdings.restore(snapshot);
                return Err(err);
            }
        }

        // 3. Currency cost leaves the participant.
        if let Err(err) = self.gateway.charge(participant, cost.coins) {
            self.holdings
                .entry(participant)
                .or_default()
                .restore(snapshot);
            return Err(err);
        }

        // 4. Currency reward: withdrawn from the owner (unowned shops
        // mint) and deposited to the participant.
        if !reward.coins.is_zero() {
            if let Some(owner) = owner {
                if let Err(err) = self.gateway.charge(owner, reward.coins) {
                    // The shortfall is the owner's, not the participant's.
                    let err = match err {
                        TradeError::InsufficientFunds {
                            required, available, ..
                        } => TradeError::OwnerInsufficientFunds { required, available },
                        other => other,
                    };
                    self.compensate_charge(participant, cost.coins);
                    self.holdings
                        .entry(participant)
                        .or_default()
                        .restore(snapshot);
                    return Err(err);
                }
            }
            if let Err(err) = self.gateway.refund(participant, reward.coins) {
                if let Some(owner) = owner {
                    self.compensate_charge(owner, reward.coins);
                }
                self.compensate_charge(participant, cost.coins);
                self.holdings
                    .entry(participant)
                    .or_default()
                    .restore(snapshot);
                return Err(err);
            }
        }

        Ok(())
    }

    /// Best-effort return of an already-applied charge during unwind.
    fn compensate_charge(&mut self, account: ParticipantId, amount: Coins) {
        if amount.is_zero() {
            return;
        }
        if let Err(err) = self.gateway.refund(account, amount) {
            error!(account, %amount, %err, "compensation refund failed during trade unwind");
        }
    }

    /// Aborts the participant's session with the reason mapped from the
    /// error, emits `TradeAborted`, and returns the error.
    fn fail_trade(
        &mut self,
        participant: ParticipantId,
        shop_id: ShopId,
        err: TradeError,
    ) -> TradeResult<TradeReceipt> {
        if let Some(mut session) = self.sessions.close(participant) {
            self.unwind_session(&mut session);
        }
        self.events.push(TradeEvent::TradeAborted {
            shop_id,
            participant,
            reason: abort_kind(&err),
        });
        Err(err)
    }

    /// Aborts a detached session and releases its reservation.
    fn unwind_session(&mut self, session: &mut TradeSession) {
        let shop_id = session.shop_id();
        match session.abort() {
            Ok(Some(reservation)) => self.release_reservation(shop_id, reservation),
            Ok(None) => {}
            Err(_) => {} // already terminal
        }
    }

    fn release_reservation(&mut self, shop_id: ShopId, reservation: Reservation) {
        let result = self.registry.mutate(shop_id, |shop| {
            shop.stock.release(reservation);
            Ok(())
        });
        if let Err(err) = result {
            // Shop removed mid-session; its ledger went with it.
            warn!(shop_id, %err, "reservation released against a removed shop");
        }
    }

    fn abort_sessions_for_shop(&mut self, shop_id: ShopId, reason: AbortKind) {
        for mut session in self.sessions.close_for_shop(shop_id) {
            let participant = session.participant();
            self.unwind_session(&mut session);
            self.events.push(TradeEvent::TradeAborted {
                shop_id,
                participant,
                reason,
            });
        }
    }
}

/// Maps an error to the abort reason surfaced to the host.
fn abort_kind(err: &TradeError) -> AbortKind {
    match err {
        TradeError::PermissionDenied { .. } => AbortKind::PermissionDenied,
        TradeError::OutOfStock(_) => AbortKind::OutOfStock,
        TradeError::InsufficientFunds { .. }
        | TradeError::HoldingsFull { .. }
        | TradeError::ArithmeticOverflow => AbortKind::InsufficientFunds,
        TradeError::OwnerInsufficientFunds { .. } => AbortKind::OwnerInsufficientFunds,
        TradeError::EconomyFailure(_) => AbortKind::EconomyFailure,
        _ => AbortKind::ShopClosed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::economy::MemoryVault;
    use crate::resource::ResourceFlags;
    use std::path::{Path, PathBuf};

    const ORE: u32 = 1;
    const INGOT: u32 = 2;
    const COIN: u32 = 9;

    fn test_dir(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("tradepost_engine_{tag}_{nanos}"))
    }

    fn test_engine(dir: &Path) -> TradeEngine {
        let config = EngineConfig {
            data_dir: dir.to_path_buf(),
            ..EngineConfig::default()
        };
        let mut engine = TradeEngine::open(config).unwrap();
        for (id, name, flags) in [
            (ORE, "ore", ResourceFlags::TRADEABLE),
            (INGOT, "ingot", ResourceFlags::TRADEABLE),
            (COIN, "coin", ResourceFlags::TRADEABLE.with(ResourceFlags::CURRENCY)),
        ] {
            engine
                .register_resource(ResourceKind {
                    id,
                    name: name.to_string(),
                    max_stack: 64,
                    flags,
                })
                .unwrap();
        }
        let mut vault = MemoryVault::new();
        vault.fund(100, Coins::from_whole(1_000).unwrap());
        vault.fund(200, Coins::from_whole(1_000).unwrap());
        engine.register_economy_provider(Box::new(vault));
        engine
    }

    fn selling_shop(engine: &mut TradeEngine) -> (ShopId, OfferId) {
        let shop_id = engine
            .create_shop(
                200,
                Some(200),
                "Ore Exchange".to_string(),
                BlockPos::new(0, 5, 64, 5),
                ShopKind::Selling,
            )
            .unwrap();
        // 3 ore -> 1 ingot, stock 2.
        let offer_id = engine
            .add_offer(
                shop_id,
                Offer::new(0, vec![ResourceStack::new(ORE, 3)], vec![ResourceStack::new(INGOT, 1)])
                    .with_stock(2),
            )
            .unwrap();
        (shop_id, offer_id)
    }

    fn run_trade(engine: &mut TradeEngine, shop_id: ShopId, offer_id: OfferId) -> TradeResult<TradeReceipt> {
        engine.on_shop_opened(100, shop_id)?;
        engine.on_offer_selected(100, offer_id)?;
        engine.on_trade_confirmed(100)
    }

    #[test]
    fn test_barter_trade_conserves_resources() {
        let dir = test_dir("conserve");
        let mut engine = test_engine(&dir);
        let (shop_id, offer_id) = selling_shop(&mut engine);

        engine.holdings_mut(100).add(ORE, 10, 64).unwrap();
        let receipt = run_trade(&mut engine, shop_id, offer_id).unwrap();

        assert_eq!(receipt.shop_id, shop_id);
        let h = engine.holdings(100).unwrap();
        assert_eq!(h.count(ORE), 7);
        assert_eq!(h.count(INGOT), 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_stock_exhaustion_sequence() {
        let dir = test_dir("exhaust");
        let mut engine = test_engine(&dir);
        let (shop_id, offer_id) = selling_shop(&mut engine);

        engine.holdings_mut(100).add(ORE, 9, 64).unwrap();

        // Stock 2: two trades succeed, the third aborts OutOfStock.
        run_trade(&mut engine, shop_id, offer_id).unwrap();
        run_trade(&mut engine, shop_id, offer_id).unwrap();
        let third = run_trade(&mut engine, shop_id, offer_id);
        assert!(matches!(third, Err(TradeError::OutOfStock(_))));

        // Exactly the two committed trades consumed ore.
        assert_eq!(engine.holdings(100).unwrap().count(ORE), 3);
        assert_eq!(engine.holdings(100).unwrap().count(INGOT), 2);

        let aborted = engine
            .take_events()
            .into_iter()
            .filter(|e| matches!(e, TradeEvent::TradeAborted { reason: AbortKind::OutOfStock, .. }))
            .count();
        assert_eq!(aborted, 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_insufficient_costs_abort_releases_stock() {
        let dir = test_dir("release");
        let mut engine = test_engine(&dir);
        let (shop_id, offer_id) = selling_shop(&mut engine);

        // Participant has only 1 ore; needs 3.
        engine.holdings_mut(100).add(ORE, 1, 64).unwrap();
        let result = run_trade(&mut engine, shop_id, offer_id);
        assert!(matches!(result, Err(TradeError::InsufficientFunds { .. })));

        // Reservation was released: stock back to 2, holdings untouched.
        let shop = engine.registry().get(shop_id).unwrap();
        assert_eq!(shop.stock.available(offer_id), Some(2));
        assert_eq!(engine.holdings(100).unwrap().count(ORE), 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_currency_trade_pays_owner() {
        let dir = test_dir("currency");
        let mut engine = test_engine(&dir);
        let shop_id = engine
            .create_shop(
                200,
                Some(200),
                "Ingot Seller".to_string(),
                BlockPos::new(0, 5, 64, 5),
                ShopKind::Selling,
            )
            .unwrap();
        // 10 coins -> 1 ingot.
        let offer_id = engine
            .add_offer(
                shop_id,
                Offer::new(0, vec![ResourceStack::new(COIN, 10)], vec![ResourceStack::new(INGOT, 1)]),
            )
            .unwrap();

        let receipt = run_trade(&mut engine, shop_id, offer_id).unwrap();
        assert_eq!(receipt.currency_paid, Coins::from_whole(10).unwrap());

        assert_eq!(
            engine.gateway().balance(100).unwrap(),
            Coins::from_whole(990).unwrap()
        );
        assert_eq!(
            engine.gateway().balance(200).unwrap(),
            Coins::from_whole(1_010).unwrap()
        );
        assert_eq!(engine.holdings(100).unwrap().count(INGOT), 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_permission_denied_before_reservation() {
        struct DenyTrades;
        impl ProtectionProvider for DenyTrades {
            fn name(&self) -> &str {
                "deny_trades"
            }
            fn check(&self, _p: ParticipantId, action: &Action) -> Decision {
                match action {
                    Action::Trade { .. } => Decision::Deny {
                        reason: "claimed region".to_string(),
                    },
                    _ => Decision::Allow,
                }
            }
        }

        let dir = test_dir("deny");
        let mut engine = test_engine(&dir);
        let (shop_id, offer_id) = selling_shop(&mut engine);
        engine.register_protection_provider(Box::new(DenyTrades));
        engine.holdings_mut(100).add(ORE, 10, 64).unwrap();

        let result = run_trade(&mut engine, shop_id, offer_id);
        assert!(matches!(result, Err(TradeError::PermissionDenied { .. })));

        // Denied before reservation: stock untouched.
        let shop = engine.registry().get(shop_id).unwrap();
        assert_eq!(shop.stock.available(offer_id), Some(2));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_location_scoped_denial() {
        struct ClaimedPlot(BlockPos);
        impl ProtectionProvider for ClaimedPlot {
            fn name(&self) -> &str {
                "claimed_plot"
            }
            fn check(&self, _p: ParticipantId, action: &Action) -> Decision {
                match action {
                    Action::Trade { location, .. } if *location == self.0 => Decision::Deny {
                        reason: "inside a claim".to_string(),
                    },
                    _ => Decision::Allow,
                }
            }
        }

        let dir = test_dir("claim");
        let mut engine = test_engine(&dir);
        let (claimed_shop, claimed_offer) = selling_shop(&mut engine);
        let free_shop = engine
            .create_shop(
                200,
                Some(200),
                "Free Post".to_string(),
                BlockPos::new(0, 40, 64, 40),
                ShopKind::Selling,
            )
            .unwrap();
        let free_offer = engine
            .add_offer(
                free_shop,
                Offer::new(0, vec![ResourceStack::new(ORE, 3)], vec![ResourceStack::new(INGOT, 1)])
                    .with_stock(2),
            )
            .unwrap();
        engine.register_protection_provider(Box::new(ClaimedPlot(BlockPos::new(0, 5, 64, 5))));
        engine.holdings_mut(100).add(ORE, 10, 64).unwrap();

        // The provider judges by location, so the claimed shop is denied...
        let denied = run_trade(&mut engine, claimed_shop, claimed_offer);
        assert!(matches!(denied, Err(TradeError::PermissionDenied { .. })));
        let shop = engine.registry().get(claimed_shop).unwrap();
        assert_eq!(shop.stock.available(claimed_offer), Some(2));

        // ...while the same provider allows the shop outside the claim.
        run_trade(&mut engine, free_shop, free_offer).unwrap();

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_session_timeout_aborts() {
        let dir = test_dir("timeout");
        let config = EngineConfig {
            data_dir: dir.clone(),
            session_timeout_ticks: 5,
            ..EngineConfig::default()
        };
        let mut engine = TradeEngine::open(config).unwrap();
        for (id, name) in [(ORE, "ore"), (INGOT, "ingot")] {
            engine
                .register_resource(ResourceKind {
                    id,
                    name: name.to_string(),
                    max_stack: 64,
                    flags: ResourceFlags::TRADEABLE,
                })
                .unwrap();
        }
        let (shop_id, offer_id) = selling_shop(&mut engine);

        engine.on_shop_opened(100, shop_id).unwrap();
        engine.on_offer_selected(100, offer_id).unwrap();

        for _ in 0..6 {
            engine.tick();
        }

        let expired = engine
            .take_events()
            .into_iter()
            .any(|e| matches!(e, TradeEvent::TradeAborted { reason: AbortKind::SessionExpired, .. }));
        assert!(expired);
        assert!(engine.on_trade_confirmed(100).is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_despawn_preserves_state_and_aborts_sessions() {
        let dir = test_dir("despawn");
        let mut engine = test_engine(&dir);
        let (shop_id, offer_id) = selling_shop(&mut engine);
        let region = BlockPos::new(0, 5, 64, 5).region();

        engine.on_shop_opened(100, shop_id).unwrap();
        engine.on_offer_selected(100, offer_id).unwrap();

        engine.on_region_unload(region);
        let shop = engine.registry().get(shop_id).unwrap();
        assert!(!shop.active);
        assert_eq!(shop.stock.available(offer_id), Some(2));
        assert_eq!(shop.offers.len(), 1);

        // Session gone; the shop cannot even be opened while dormant.
        assert!(engine.on_trade_confirmed(100).is_err());
        assert!(engine.on_shop_opened(100, shop_id).is_err());

        engine.on_region_load(region);
        assert!(engine.registry().get(shop_id).unwrap().active);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_flush_then_reopen_restores_shops() {
        let dir = test_dir("reopen");
        let (shop_id, offer_id) = {
            let mut engine = test_engine(&dir);
            let (shop_id, offer_id) = selling_shop(&mut engine);
            engine.flush().unwrap();
            (shop_id, offer_id)
        };

        let engine = test_engine(&dir);
        let shop = engine.registry().get(shop_id).unwrap();
        assert_eq!(shop.name, "Ore Exchange");
        assert_eq!(shop.stock.available(offer_id), Some(2));
        assert!(!shop.active, "loaded shops start dormant");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_owner_credit_deferred_event() {
        let dir = test_dir("deferred");
        let mut engine = test_engine(&dir);
        let (shop_id, _) = selling_shop(&mut engine);
        // Replace the offer with a currency one and break deposits.
        let offer_id = engine
            .add_offer(
                shop_id,
                Offer::new(0, vec![ResourceStack::new(COIN, 10)], vec![ResourceStack::new(INGOT, 1)]),
            )
            .unwrap();
        let mut vault = MemoryVault::new();
        vault.fund(100, Coins::from_whole(100).unwrap());
        vault.set_fail_deposits(true);
        engine.register_economy_provider(Box::new(vault));

        run_trade(&mut engine, shop_id, offer_id).unwrap();

        let deferred = engine
            .take_events()
            .into_iter()
            .any(|e| matches!(e, TradeEvent::OwnerCreditDeferred { .. }));
        assert!(deferred);
        assert_eq!(engine.gateway().deferred_len(), 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_abandoned_owner_credit_alerts() {
        let dir = test_dir("abandon");
        let config = EngineConfig {
            data_dir: dir.clone(),
            credit_retry_attempts: 2,
            ..EngineConfig::default()
        };
        let mut engine = TradeEngine::open(config).unwrap();
        for (id, name, flags) in [
            (INGOT, "ingot", ResourceFlags::TRADEABLE),
            (COIN, "coin", ResourceFlags::TRADEABLE.with(ResourceFlags::CURRENCY)),
        ] {
            engine
                .register_resource(ResourceKind {
                    id,
                    name: name.to_string(),
                    max_stack: 64,
                    flags,
                })
                .unwrap();
        }
        let mut vault = MemoryVault::new();
        vault.fund(100, Coins::from_whole(100).unwrap());
        vault.set_fail_deposits(true);
        engine.register_economy_provider(Box::new(vault));

        let shop_id = engine
            .create_shop(
                200,
                Some(200),
                "Outage Post".to_string(),
                BlockPos::new(0, 5, 64, 5),
                ShopKind::Selling,
            )
            .unwrap();
        let offer_id = engine
            .add_offer(
                shop_id,
                Offer::new(0, vec![ResourceStack::new(COIN, 10)], vec![ResourceStack::new(INGOT, 1)]),
            )
            .unwrap();

        run_trade(&mut engine, shop_id, offer_id).unwrap();
        assert_eq!(engine.gateway().deferred_len(), 1);

        // One tick retries (attempt 2) and hits the cap: the credit is
        // dropped and the operator alert fires.
        engine.tick();
        assert_eq!(engine.gateway().deferred_len(), 0);
        let abandoned = engine.take_events().into_iter().any(|e| {
            matches!(
                e,
                TradeEvent::OwnerCreditAbandoned {
                    owner: 200,
                    attempts: 2,
                    ..
                }
            )
        });
        assert!(abandoned);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_owner_short_on_payout_maps_distinctly() {
        let dir = test_dir("owner_short");
        let mut engine = test_engine(&dir);
        // Buying-style shop: owner 300 pays coins for ore, but account 300
        // was never funded.
        let shop_id = engine
            .create_shop(
                300,
                Some(300),
                "Ore Buyer".to_string(),
                BlockPos::new(0, 6, 64, 6),
                ShopKind::Buying,
            )
            .unwrap();
        let offer_id = engine
            .add_offer(
                shop_id,
                Offer::new(0, vec![ResourceStack::new(ORE, 3)], vec![ResourceStack::new(COIN, 5)]),
            )
            .unwrap();
        engine.holdings_mut(100).add(ORE, 3, 64).unwrap();

        let result = run_trade(&mut engine, shop_id, offer_id);
        assert!(matches!(result, Err(TradeError::OwnerInsufficientFunds { .. })));

        // The participant was made whole and the abort names the owner as
        // the short party, not the participant.
        assert_eq!(engine.holdings(100).unwrap().count(ORE), 3);
        let aborted = engine.take_events().into_iter().any(|e| {
            matches!(
                e,
                TradeEvent::TradeAborted {
                    reason: AbortKind::OwnerInsufficientFunds,
                    ..
                }
            )
        });
        assert!(aborted);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
