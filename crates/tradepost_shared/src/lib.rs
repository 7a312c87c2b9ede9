//! # TRADEPOST Shared
//!
//! Common types used by the trade engine and the host integration layer.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER depend on:
//! - the engine crate
//! - any I/O or threading crate
//!
//! If you need behaviour, put it in `tradepost_engine`.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod events;
pub mod ids;
pub mod location;

pub use constants::{
    DEFAULT_CREDIT_RETRY_ATTEMPTS, DEFAULT_DIRTY_FLUSH_THRESHOLD, DEFAULT_PERSIST_INTERVAL_TICKS,
    DEFAULT_SESSION_TIMEOUT_TICKS, REGION_SIZE, TICK_RATE,
};
pub use events::{AbortKind, TradeEvent};
pub use ids::{OfferId, OwnerId, ParticipantId, ResourceId, ShopId, Tick, WorldId};
pub use location::{BlockPos, RegionPos};
