//! # Trade Engine Error Types
//!
//! All errors that can occur in the trade engine.

use thiserror::Error;

use tradepost_shared::{OfferId, ResourceId, ShopId};

/// Errors that can occur in the trade engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TradeError {
    /// Offer definition rejected at authoring time.
    #[error("invalid offer: {reason}")]
    InvalidOffer {
        /// What the validation found wrong.
        reason: String,
    },

    /// Shop not found in the registry.
    #[error("shop not found: {0}")]
    ShopNotFound(ShopId),

    /// Offer not found in the shop's offer book.
    #[error("offer not found: {0}")]
    OfferNotFound(OfferId),

    /// Another active shop already occupies the target location.
    #[error("location already occupied by shop {0}")]
    LocationOccupied(ShopId),

    /// A protection provider denied the action.
    #[error("permission denied: {reason}")]
    PermissionDenied {
        /// Human-readable denial reason from the provider.
        reason: String,
    },

    /// The offer has no remaining stock.
    #[error("offer {0} is out of stock")]
    OutOfStock(OfferId),

    /// Participant lacks the required resources or currency.
    #[error("insufficient funds: need {required} of resource {resource}, have {available}")]
    InsufficientFunds {
        /// The resource that was short.
        resource: ResourceId,
        /// The amount required.
        required: u64,
        /// The amount available.
        available: u64,
    },

    /// The shop owner's account cannot cover the offer's coin payout.
    #[error("shop owner short on payout: need {required}, have {available}")]
    OwnerInsufficientFunds {
        /// Minor currency units required.
        required: u64,
        /// Minor currency units available.
        available: u64,
    },

    /// Participant holdings cannot fit the reward resources.
    #[error("holdings full: capacity {capacity}, tried to add {amount}")]
    HoldingsFull {
        /// Slot capacity of the holdings.
        capacity: u32,
        /// Amount that did not fit.
        amount: u64,
    },

    /// The currency provider was unreachable or returned an error.
    #[error("economy provider failure: {0}")]
    EconomyFailure(String),

    /// A persisted record failed to write.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// A persisted record failed structural validation on load.
    #[error("corrupt shop record {path}: {reason}")]
    CorruptRecord {
        /// Path of the offending record file.
        path: String,
        /// What the validation found wrong.
        reason: String,
    },

    /// No trade session is open for the participant.
    #[error("no open trade session for participant {0}")]
    NoSession(u64),

    /// The session is not in the phase the operation requires.
    #[error("session in phase {found}, expected {expected}")]
    WrongPhase {
        /// Phase the session was actually in.
        found: &'static str,
        /// Phase the operation requires.
        expected: &'static str,
    },

    /// Arithmetic overflow in a currency calculation.
    #[error("arithmetic overflow in currency calculation")]
    ArithmeticOverflow,

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for trade engine operations.
pub type TradeResult<T> = Result<T, TradeError>;
