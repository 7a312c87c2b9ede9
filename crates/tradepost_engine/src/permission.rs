//! # Permission Gate
//!
//! Pluggable protection hook consulted before shop creation and trade
//! execution.
//!
//! The gate is **fail-open**: with no provider registered every action is
//! allowed, and a provider that panics or answers nonsense cannot brick
//! trading. Denials carry a reason string that surfaces to the
//! participant unchanged.

use tracing::warn;

use tradepost_shared::{BlockPos, ParticipantId, ShopId};

/// An action a provider may veto.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Placing a new shop at a location.
    CreateShop {
        /// Where the shop would be anchored.
        location: BlockPos,
    },
    /// Executing a trade against an existing shop.
    Trade {
        /// The shop being traded with.
        shop_id: ShopId,
        /// The shop's anchor location, so land-protection providers can
        /// judge the trade by where it happens.
        location: BlockPos,
    },
    /// Removing an existing shop.
    RemoveShop {
        /// The shop being removed.
        shop_id: ShopId,
    },
}

/// A provider's verdict on an action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// The action may proceed.
    Allow,
    /// The action is vetoed.
    Deny {
        /// Reason surfaced to the participant verbatim.
        reason: String,
    },
}

/// External protection/claims system hook.
///
/// Providers must answer quickly; the gate runs on the world mutation
/// thread.
pub trait ProtectionProvider: Send {
    /// Name used in log lines when this provider misbehaves.
    fn name(&self) -> &str;

    /// Judges an action by a participant.
    fn check(&self, participant: ParticipantId, action: &Action) -> Decision;
}

/// Consults registered providers, failing open.
#[derive(Default)]
pub struct PermissionGate {
    providers: Vec<Box<dyn ProtectionProvider>>,
}

impl PermissionGate {
    /// Creates a gate with no providers (everything allowed).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider. Providers are consulted in registration
    /// order; the first denial wins.
    pub fn register(&mut self, provider: Box<dyn ProtectionProvider>) {
        self.providers.push(provider);
    }

    /// Number of registered providers.
    #[must_use]
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Checks an action against every provider.
    ///
    /// A provider that panics is caught, logged, and treated as Allow so a
    /// broken third-party hook cannot take trading down with it.
    #[must_use]
    pub fn check(&self, participant: ParticipantId, action: &Action) -> Decision {
        for provider in &self.providers {
            let verdict = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                provider.check(participant, action)
            }));
            match verdict {
                Ok(Decision::Allow) => {}
                Ok(deny @ Decision::Deny { .. }) => return deny,
                Err(_) => {
                    warn!(
                        provider = provider.name(),
                        "protection provider panicked, treating as allow"
                    );
                }
            }
        }
        Decision::Allow
    }
}
