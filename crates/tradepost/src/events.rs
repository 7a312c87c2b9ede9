//! # Host Event Channels
//!
//! Bounded channels between the host's edge (network handlers, command
//! parsers) and the world loop.
//!
//! ```text
//! ┌─────────────┐      ┌──────────────┐      ┌─────────────┐
//! │  Host Edge  │─────>│  Input Bus   │─────>│ World Loop  │
//! │ (handlers)  │      │ (HostEvent)  │      │  (engine)   │
//! └─────────────┘      └──────────────┘      └──────┬──────┘
//!        ▲                                          │
//!        │             ┌──────────────┐             │
//!        └─────────────│  Notice Bus  │<────────────┘
//!                      │ (TradeEvent) │
//!                      └──────────────┘
//! ```
//!
//! Producers never block the world loop: sends are try-sends, and a full
//! channel drops the event with a warning rather than stalling a tick.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::warn;

use tradepost_shared::{OfferId, ParticipantId, RegionPos, ShopId};

/// Default channel capacity for a typical world loop.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Inputs flowing from the host edge to the world loop.
///
/// Each variant maps onto one engine entry point; the world loop applies
/// them in arrival order on the mutation thread.
#[derive(Clone, Debug)]
pub enum HostEvent {
    /// A spatial region finished loading.
    RegionLoaded {
        /// The loaded region.
        region: RegionPos,
    },
    /// A spatial region is unloading.
    RegionUnloaded {
        /// The unloading region.
        region: RegionPos,
    },
    /// A participant opened a shop's trade view.
    ShopOpened {
        /// The participant.
        participant: ParticipantId,
        /// The shop.
        shop_id: ShopId,
    },
    /// A participant selected an offer in their open session.
    OfferSelected {
        /// The participant.
        participant: ParticipantId,
        /// The selected offer.
        offer_id: OfferId,
    },
    /// A participant confirmed the selected offer.
    TradeConfirmed {
        /// The participant.
        participant: ParticipantId,
    },
    /// A participant closed the trade view without confirming.
    SessionCancelled {
        /// The participant.
        participant: ParticipantId,
    },
    /// An owner restocked an offer.
    Restocked {
        /// The shop.
        shop_id: ShopId,
        /// The offer restocked.
        offer_id: OfferId,
        /// Units added.
        qty: u32,
    },
}

/// Bounded single-channel event bus.
pub struct EventBus<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
}

impl<T> EventBus<T> {
    /// Creates a bus with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self { sender, receiver }
    }

    /// A sender handle (clone for multiple producers).
    #[must_use]
    pub fn sender(&self) -> EventSender<T> {
        EventSender {
            sender: self.sender.clone(),
        }
    }

    /// A receiver handle (clone for multiple consumers).
    #[must_use]
    pub fn receiver(&self) -> EventReceiver<T> {
        EventReceiver {
            receiver: self.receiver.clone(),
        }
    }

    /// Convenience: a fresh sender/receiver pair.
    #[must_use]
    pub fn create_pair(capacity: usize) -> (EventSender<T>, EventReceiver<T>) {
        let bus = Self::new(capacity);
        (bus.sender(), bus.receiver())
    }
}

/// Handle for sending events.
pub struct EventSender<T> {
    sender: Sender<T>,
}

impl<T> Clone for EventSender<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T> EventSender<T> {
    /// Sends an event without blocking.
    ///
    /// Returns `false` if the channel is full or disconnected; the event
    /// is dropped in that case.
    #[inline]
    pub fn send(&self, event: T) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("event channel full, dropping event");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Handle for receiving events.
pub struct EventReceiver<T> {
    receiver: Receiver<T>,
}

impl<T> Clone for EventReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.clone(),
        }
    }
}

impl<T> EventReceiver<T> {
    /// Drains all pending events without blocking.
    #[inline]
    pub fn drain(&self) -> Vec<T> {
        let mut events = Vec::with_capacity(64);
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Receives one event without blocking.
    #[inline]
    pub fn try_recv(&self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Number of pending events.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Returns true if events are pending.
    #[inline]
    #[must_use]
    pub fn has_events(&self) -> bool {
        !self.receiver.is_empty()
    }
}
