//! Identifier aliases used across the workspace.
//!
//! Plain integer aliases, matching the host's entity numbering. Zero is
//! never a valid id; it is reserved as the "empty" marker in slot storage.

/// Unique identifier for a shop. Stable across restarts (persisted).
pub type ShopId = u64;

/// Unique identifier for a shop owner (a player identity).
pub type OwnerId = u64;

/// Unique identifier for a trading participant (a player identity).
pub type ParticipantId = u64;

/// Unique identifier for a resource kind (item type, currency, ...).
pub type ResourceId = u32;

/// Identifier of an offer within its shop. Unique per shop, not globally.
pub type OfferId = u32;

/// Identifier of a world (dimension) in the host simulation.
pub type WorldId = u16;

/// A discrete simulation time-step.
pub type Tick = u64;
