//! # Trade Sessions
//!
//! Per-participant trade state machine.
//!
//! ```text
//!   Selecting ──> Validating ──> Reserved ──> Committing ──> Committed
//!       │             │             │             │
//!       └─────────────┴─────────────┴─────────────┴────────> Aborted
//! ```
//!
//! A session exists from the moment a participant opens a shop until the
//! trade commits, aborts, or times out. At most one session per
//! participant. The state machine enforces ordering at the type level:
//! every transition method checks the current phase and a held stock
//! reservation can only leave the session through `begin_commit` (to be
//! finalized) or `abort` (to be released), never silently.
//!
//! Sessions are swept for expiry on the world tick; an expired session is
//! handed back whole so the caller can release its reservation.

use std::collections::HashMap;

use tradepost_shared::{OfferId, ParticipantId, ShopId, Tick};

use crate::error::{TradeError, TradeResult};
use crate::stock::Reservation;

/// Phase of a trade session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TradePhase {
    /// Shop is open, no offer chosen yet.
    Selecting,
    /// An offer is chosen; preconditions are being checked.
    Validating,
    /// Stock is reserved; awaiting confirmation.
    Reserved,
    /// Exchange sub-updates are being applied.
    Committing,
    /// Terminal: the exchange happened exactly once.
    Committed,
    /// Terminal: nothing happened.
    Aborted,
}

impl TradePhase {
    /// Static name for error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Selecting => "selecting",
            Self::Validating => "validating",
            Self::Reserved => "reserved",
            Self::Committing => "committing",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
        }
    }

    /// Returns true for `Committed` and `Aborted`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }
}

/// One participant's open trade against one shop.
#[derive(Debug)]
pub struct TradeSession {
    participant: ParticipantId,
    shop_id: ShopId,
    offer_id: Option<OfferId>,
    phase: TradePhase,
    last_activity: Tick,
    reservation: Option<Reservation>,
}

impl TradeSession {
    fn new(participant: ParticipantId, shop_id: ShopId, now: Tick) -> Self {
        Self {
            participant,
            shop_id,
            offer_id: None,
            phase: TradePhase::Selecting,
            last_activity: now,
            reservation: None,
        }
    }

    /// The participant this session belongs to.
    #[inline]
    #[must_use]
    pub const fn participant(&self) -> ParticipantId {
        self.participant
    }

    /// The shop being traded with.
    #[inline]
    #[must_use]
    pub const fn shop_id(&self) -> ShopId {
        self.shop_id
    }

    /// The currently selected offer, if any.
    #[inline]
    #[must_use]
    pub const fn offer_id(&self) -> Option<OfferId> {
        self.offer_id
    }

    /// Current phase.
    #[inline]
    #[must_use]
    pub const fn phase(&self) -> TradePhase {
        self.phase
    }

    /// Tick of the last participant action.
    #[inline]
    #[must_use]
    pub const fn last_activity(&self) -> Tick {
        self.last_activity
    }

    fn require(&self, expected: TradePhase) -> TradeResult<()> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(TradeError::WrongPhase {
                found: self.phase.name(),
                expected: expected.name(),
            })
        }
    }

    /// Chooses (or re-chooses) an offer.
    ///
    /// Allowed in `Selecting` and `Validating`; a participant can change
    /// their mind any time before stock is reserved.
    ///
    /// # Errors
    ///
    /// Returns `WrongPhase` once a reservation is held or the session is
    /// terminal.
    pub fn select_offer(&mut self, offer_id: OfferId, now: Tick) -> TradeResult<()> {
        match self.phase {
            TradePhase::Selecting | TradePhase::Validating => {
                self.offer_id = Some(offer_id);
                self.phase = TradePhase::Validating;
                self.last_activity = now;
                Ok(())
            }
            other => Err(TradeError::WrongPhase {
                found: other.name(),
                expected: TradePhase::Selecting.name(),
            }),
        }
    }

    /// Stores the stock reservation obtained during validation.
    ///
    /// # Errors
    ///
    /// Returns `WrongPhase` unless the session is in `Validating`.
    pub fn hold(&mut self, reservation: Reservation, now: Tick) -> TradeResult<()> {
        self.require(TradePhase::Validating)?;
        self.reservation = Some(reservation);
        self.phase = TradePhase::Reserved;
        self.last_activity = now;
        Ok(())
    }

    /// Enters the commit phase, surrendering the reservation for
    /// finalization.
    ///
    /// # Errors
    ///
    /// Returns `WrongPhase` unless the session is in `Reserved`.
    pub fn begin_commit(&mut self, now: Tick) -> TradeResult<Reservation> {
        self.require(TradePhase::Reserved)?;
        let Some(reservation) = self.reservation.take() else {
            // Reserved phase always carries a token; `hold` is the only
            // entry into it.
            return Err(TradeError::WrongPhase {
                found: self.phase.name(),
                expected: TradePhase::Reserved.name(),
            });
        };
        self.phase = TradePhase::Committing;
        self.last_activity = now;
        Ok(reservation)
    }

    /// Marks the exchange as fully applied.
    ///
    /// # Errors
    ///
    /// Returns `WrongPhase` unless the session is in `Committing`.
    pub fn complete(&mut self) -> TradeResult<()> {
        self.require(TradePhase::Committing)?;
        self.phase = TradePhase::Committed;
        Ok(())
    }

    /// Aborts the session from any non-terminal phase, surrendering any
    /// held reservation so the caller can release it.
    ///
    /// # Errors
    ///
    /// Returns `WrongPhase` if the session is already terminal.
    pub fn abort(&mut self) -> TradeResult<Option<Reservation>> {
        if self.phase.is_terminal() {
            return Err(TradeError::WrongPhase {
                found: self.phase.name(),
                expected: "any non-terminal",
            });
        }
        self.phase = TradePhase::Aborted;
        Ok(self.reservation.take())
    }
}

/// Owns all open sessions and their expiry.
#[derive(Debug)]
pub struct SessionManager {
    sessions: HashMap<ParticipantId, TradeSession>,
    timeout_ticks: u64,
}

impl SessionManager {
    /// Creates a manager with the given idle timeout.
    #[must_use]
    pub fn new(timeout_ticks: u64) -> Self {
        Self {
            sessions: HashMap::new(),
            timeout_ticks,
        }
    }

    /// Number of open sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if no sessions are open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Opens a session for a participant, replacing any existing one.
    ///
    /// The displaced session (if any) is returned so its reservation can
    /// be released by the caller.
    pub fn open(
        &mut self,
        participant: ParticipantId,
        shop_id: ShopId,
        now: Tick,
    ) -> Option<TradeSession> {
        self.sessions
            .insert(participant, TradeSession::new(participant, shop_id, now))
    }

    /// The participant's open session.
    ///
    /// # Errors
    ///
    /// Returns `NoSession` if none is open.
    pub fn get_mut(&mut self, participant: ParticipantId) -> TradeResult<&mut TradeSession> {
        self.sessions
            .get_mut(&participant)
            .ok_or(TradeError::NoSession(participant))
    }

    /// Read access to the participant's session, if open.
    #[must_use]
    pub fn get(&self, participant: ParticipantId) -> Option<&TradeSession> {
        self.sessions.get(&participant)
    }

    /// Removes and returns the participant's session.
    pub fn close(&mut self, participant: ParticipantId) -> Option<TradeSession> {
        self.sessions.remove(&participant)
    }

    /// Removes every session idle longer than the timeout.
    ///
    /// Returned sessions are whole, reservations included; the caller
    /// releases them. Sessions mid-commit are never expired.
    pub fn sweep_expired(&mut self, now: Tick) -> Vec<TradeSession> {
        let timeout = self.timeout_ticks;
        let expired: Vec<ParticipantId> = self
            .sessions
            .iter()
            .filter(|(_, s)| {
                s.phase != TradePhase::Committing
                    && now.saturating_sub(s.last_activity) >= timeout
            })
            .map(|(&p, _)| p)
            .collect();
        expired
            .into_iter()
            .filter_map(|p| self.sessions.remove(&p))
            .collect()
    }

    /// Removes every session against the given shop (shop despawned or
    /// removed). Returned whole for reservation release.
    pub fn close_for_shop(&mut self, shop_id: ShopId) -> Vec<TradeSession> {
        let affected: Vec<ParticipantId> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.shop_id == shop_id)
            .map(|(&p, _)| p)
            .collect();
        affected
            .into_iter()
            .filter_map(|p| self.sessions.remove(&p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stock::StockLedger;

    fn reserved_session(mgr: &mut SessionManager, ledger: &mut StockLedger) -> ParticipantId {
        ledger.set_stock(1, 5);
        mgr.open(7, 1, 0);
        let session = mgr.get_mut(7).unwrap();
        session.select_offer(1, 1).unwrap();
        let r = ledger.reserve(1, 1).unwrap();
        session.hold(r, 2).unwrap();
        7
    }

    #[test]
    fn test_happy_path_phases() {
        let mut mgr = SessionManager::new(600);
        let mut ledger = StockLedger::new();
        let p = reserved_session(&mut mgr, &mut ledger);

        let session = mgr.get_mut(p).unwrap();
        assert_eq!(session.phase(), TradePhase::Reserved);

        let r = session.begin_commit(3).unwrap();
        assert_eq!(session.phase(), TradePhase::Committing);
        ledger.finalize(r);

        session.complete().unwrap();
        assert_eq!(session.phase(), TradePhase::Committed);
    }

    #[test]
    fn test_confirm_without_selection_is_rejected() {
        let mut mgr = SessionManager::new(600);
        mgr.open(7, 1, 0);
        let session = mgr.get_mut(7).unwrap();
        let result = session.begin_commit(1);
        assert!(matches!(result, Err(TradeError::WrongPhase { .. })));
    }

    #[test]
    fn test_reselect_before_reservation() {
        let mut mgr = SessionManager::new(600);
        mgr.open(7, 1, 0);
        let session = mgr.get_mut(7).unwrap();
        session.select_offer(1, 1).unwrap();
        session.select_offer(2, 2).unwrap();
        assert_eq!(session.offer_id(), Some(2));
    }

    #[test]
    fn test_reselect_after_reservation_is_rejected() {
        let mut mgr = SessionManager::new(600);
        let mut ledger = StockLedger::new();
        let p = reserved_session(&mut mgr, &mut ledger);
        let session = mgr.get_mut(p).unwrap();
        assert!(session.select_offer(2, 3).is_err());
    }

    #[test]
    fn test_abort_surrenders_reservation() {
        let mut mgr = SessionManager::new(600);
        let mut ledger = StockLedger::new();
        let p = reserved_session(&mut mgr, &mut ledger);
        assert_eq!(ledger.available(1), Some(4));

        let session = mgr.get_mut(p).unwrap();
        let reservation = session.abort().unwrap();
        ledger.release(reservation.unwrap());
        assert_eq!(ledger.available(1), Some(5));
    }

    #[test]
    fn test_sweep_expires_idle_sessions() {
        let mut mgr = SessionManager::new(100);
        mgr.open(1, 1, 0);
        mgr.open(2, 1, 50);

        let expired = mgr.sweep_expired(100);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].participant(), 1);
        assert_eq!(mgr.len(), 1);
    }

    #[test]
    fn test_close_for_shop() {
        let mut mgr = SessionManager::new(600);
        mgr.open(1, 9, 0);
        mgr.open(2, 9, 0);
        mgr.open(3, 5, 0);

        let closed = mgr.close_for_shop(9);
        assert_eq!(closed.len(), 2);
        assert_eq!(mgr.len(), 1);
    }

    #[test]
    fn test_open_replaces_existing() {
        let mut mgr = SessionManager::new(600);
        mgr.open(1, 9, 0);
        let displaced = mgr.open(1, 5, 10);
        assert_eq!(displaced.unwrap().shop_id(), 9);
        assert_eq!(mgr.get(1).unwrap().shop_id(), 5);
    }
}
