//! # Resource Kinds
//!
//! The catalog of tradeable resource kinds, loaded once at startup.
//!
//! Offers reference resources by id; the catalog is the authority on which
//! ids exist, how they stack in holdings, and which id denominates the
//! world currency. Offer validation rejects unknown ids at authoring time
//! so trade execution never sees them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use tradepost_shared::ResourceId;

use crate::error::{TradeError, TradeResult};

/// Flags for resource properties.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceFlags(u32);

impl ResourceFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Resource can appear in offers.
    pub const TRADEABLE: Self = Self(1 << 0);
    /// Resource is the world currency denomination.
    ///
    /// Currency costs/rewards settle through the economy gateway, not
    /// through participant holdings.
    pub const CURRENCY: Self = Self(1 << 1);
    /// Resource is bound to its holder and cannot change hands.
    pub const SOULBOUND: Self = Self(1 << 2);

    /// Creates flags from raw value.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Checks if a specific flag is set.
    #[inline]
    #[must_use]
    pub const fn has(self, flag: Self) -> bool {
        (self.0 & flag.0) != 0
    }

    /// Combines two flag sets.
    #[inline]
    #[must_use]
    pub const fn with(self, flag: Self) -> Self {
        Self(self.0 | flag.0)
    }
}

/// A resource kind definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceKind {
    /// Unique identifier. Zero is reserved.
    pub id: ResourceId,
    /// Human-readable name, for logs and host messages.
    pub name: String,
    /// Maximum amount per holdings slot.
    pub max_stack: u32,
    /// Property flags.
    #[serde(default)]
    pub flags: ResourceFlags,
}

/// A quantity of one resource kind.
///
/// The cost and reward sides of an offer are lists of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStack {
    /// The resource kind.
    pub resource: ResourceId,
    /// Strictly positive amount.
    pub amount: u64,
}

impl ResourceStack {
    /// Creates a new resource stack.
    #[inline]
    #[must_use]
    pub const fn new(resource: ResourceId, amount: u64) -> Self {
        Self { resource, amount }
    }
}

/// The catalog of recognized resource kinds.
#[derive(Clone, Debug, Default)]
pub struct ResourceCatalog {
    kinds: HashMap<ResourceId, ResourceKind>,
    currency: Option<ResourceId>,
}

impl ResourceCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resource kind.
    ///
    /// The first kind flagged `CURRENCY` becomes the world currency
    /// denomination.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the id is zero, already registered, or a
    /// second currency kind is registered.
    pub fn register(&mut self, kind: ResourceKind) -> TradeResult<()> {
        if kind.id == 0 {
            return Err(TradeError::InvalidConfig(
                "resource id 0 is reserved".to_string(),
            ));
        }
        if self.kinds.contains_key(&kind.id) {
            return Err(TradeError::InvalidConfig(format!(
                "resource id {} already registered",
                kind.id
            )));
        }
        if kind.flags.has(ResourceFlags::CURRENCY) {
            if self.currency.is_some() {
                return Err(TradeError::InvalidConfig(
                    "a currency resource is already registered".to_string(),
                ));
            }
            self.currency = Some(kind.id);
        }
        self.kinds.insert(kind.id, kind);
        Ok(())
    }

    /// Looks up a resource kind.
    #[must_use]
    pub fn get(&self, id: ResourceId) -> Option<&ResourceKind> {
        self.kinds.get(&id)
    }

    /// Returns true if the id is a recognized resource kind.
    #[must_use]
    pub fn contains(&self, id: ResourceId) -> bool {
        self.kinds.contains_key(&id)
    }

    /// Returns the currency denomination, if one is registered.
    #[inline]
    #[must_use]
    pub const fn currency(&self) -> Option<ResourceId> {
        self.currency
    }

    /// Returns the max stack size for a resource, defaulting to 64.
    #[must_use]
    pub fn max_stack(&self, id: ResourceId) -> u32 {
        self.kinds.get(&id).map_or(64, |k| k.max_stack)
    }

    /// Number of registered kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Returns true if no kinds are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
