//! Notification events emitted by the trade engine.
//!
//! The HOST consumes these for chat messages, owner notifications and
//! operator alerts. The ENGINE only ever produces them; it never reads
//! them back.

use serde::{Deserialize, Serialize};

use crate::ids::{OfferId, OwnerId, ParticipantId, ResourceId, ShopId};
use crate::location::RegionPos;

/// Why a trade session ended in `Aborted`.
///
/// Participant-caused reasons (`OutOfStock`, `InsufficientFunds`) and
/// engine-internal reasons (`EconomyFailure`) are distinct variants so the
/// host can render an appropriate message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortKind {
    /// A protection provider denied the trade at the shop's location.
    PermissionDenied,
    /// The selected offer had no remaining stock.
    OutOfStock,
    /// The participant lacked the offer's cost resources or currency.
    InsufficientFunds,
    /// The shop owner's account could not cover the offer's coin payout.
    OwnerInsufficientFunds,
    /// The currency provider was unreachable or returned an error.
    EconomyFailure,
    /// The session idled past the configured timeout and was swept.
    SessionExpired,
    /// The shop despawned or was removed mid-session.
    ShopClosed,
}

/// Events that flow from the engine to the host.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum TradeEvent {
    /// A trade committed. Emitted exactly once per successful commit.
    TradeCompleted {
        /// Shop the trade executed against.
        shop_id: ShopId,
        /// Participant that executed the trade.
        participant: ParticipantId,
        /// Offer that was executed.
        offer_id: OfferId,
        /// Resources taken from the participant (resource, amount).
        costs: Vec<(ResourceId, u64)>,
        /// Resources granted to the participant (resource, amount).
        rewards: Vec<(ResourceId, u64)>,
    },

    /// A trade session ended without committing.
    TradeAborted {
        /// Shop the session targeted.
        shop_id: ShopId,
        /// Participant whose session aborted.
        participant: ParticipantId,
        /// Why the session aborted.
        reason: AbortKind,
    },

    /// Remaining stock of an offer changed (trade or restock).
    StockChanged {
        /// Shop owning the offer.
        shop_id: ShopId,
        /// The offer whose stock changed.
        offer_id: OfferId,
        /// New remaining count, `None` for unlimited offers.
        remaining: Option<u32>,
    },

    /// A shop became active (its region loaded).
    ShopSpawned {
        /// The shop that activated.
        shop_id: ShopId,
    },

    /// A shop became inactive (its region unloaded).
    ShopDespawned {
        /// The shop that deactivated.
        shop_id: ShopId,
    },

    /// A region finished loading and its shops were activated.
    RegionActivated {
        /// The region that loaded.
        region: RegionPos,
        /// Number of shops activated.
        shops: usize,
    },

    /// An owner credit failed after the participant side committed.
    ///
    /// The credit is queued for retry; this event exists so operators can
    /// reconcile if retries keep failing.
    OwnerCreditDeferred {
        /// Shop whose owner is owed proceeds.
        shop_id: ShopId,
        /// Owner identity owed the credit.
        owner: OwnerId,
        /// Amount owed, in minor currency units.
        amount_minor: u64,
    },

    /// A deferred owner credit exhausted its retry budget and was dropped.
    ///
    /// The engine no longer tracks the amount after this; operators must
    /// reconcile it against the trade log by hand.
    OwnerCreditAbandoned {
        /// Shop whose owner was owed the proceeds.
        shop_id: ShopId,
        /// Owner identity the credit was addressed to.
        owner: OwnerId,
        /// Amount dropped, in minor currency units.
        amount_minor: u64,
        /// Delivery attempts made before giving up.
        attempts: u32,
    },

    /// A persistence write failed past its retry budget.
    ///
    /// In-memory state remains authoritative; trading continues.
    PersistFailed {
        /// Shop whose record failed to write.
        shop_id: ShopId,
        /// Number of attempts made.
        attempts: u32,
    },
}
