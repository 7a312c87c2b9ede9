//! # Economy Gateway
//!
//! Boundary to the host's currency system.
//!
//! The engine never stores balances itself; it charges and credits through
//! an [`EconomyProvider`] the host registers. The gateway's job is to make
//! the provider's failure modes survivable:
//!
//! - a **charge** failure before commit aborts the trade cleanly
//! - a **credit** failure after the participant was already charged must
//!   not lose the owner's proceeds, so failed owner credits are parked in
//!   a retry queue and re-attempted each tick, up to an attempt cap; a
//!   credit that exhausts the cap is dropped and reported for manual
//!   reconciliation instead of growing the queue forever
//!
//! [`MemoryVault`] is the in-process provider used by tests and the demo
//! binary.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, error, warn};

use tradepost_shared::{OwnerId, ParticipantId, ShopId, DEFAULT_CREDIT_RETRY_ATTEMPTS};

use crate::error::{TradeError, TradeResult};
use crate::money::Coins;

/// Host-side currency backend.
pub trait EconomyProvider: Send {
    /// Name used in log lines.
    fn name(&self) -> &str;

    /// Current balance of an account.
    ///
    /// # Errors
    ///
    /// Returns `EconomyFailure` if the backend is unreachable.
    fn balance(&self, account: ParticipantId) -> TradeResult<Coins>;

    /// Withdraws an amount. Must be atomic: either the full amount leaves
    /// the account or nothing does.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientFunds` on a short balance or `EconomyFailure`
    /// if the backend is unreachable.
    fn withdraw(&mut self, account: ParticipantId, amount: Coins) -> TradeResult<()>;

    /// Deposits an amount.
    ///
    /// # Errors
    ///
    /// Returns `EconomyFailure` if the backend is unreachable.
    fn deposit(&mut self, account: ParticipantId, amount: Coins) -> TradeResult<()>;
}

/// A credit that could not be delivered and is awaiting retry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeferredCredit {
    /// Shop the proceeds belong to.
    pub shop_id: ShopId,
    /// Account to credit.
    pub owner: OwnerId,
    /// Amount still owed.
    pub amount: Coins,
    /// Delivery attempts so far.
    pub attempts: u32,
}

/// Outcome of one deferred-credit retry pass.
#[derive(Debug, Default)]
pub struct RetryReport {
    /// Credits delivered this pass.
    pub delivered: Vec<DeferredCredit>,
    /// Credits dropped after exhausting the attempt cap.
    pub abandoned: Vec<DeferredCredit>,
}

/// Wraps the registered provider and owns the deferred-credit queue.
pub struct EconomyGateway {
    provider: Option<Box<dyn EconomyProvider>>,
    deferred: VecDeque<DeferredCredit>,
    max_attempts: u32,
}

impl Default for EconomyGateway {
    fn default() -> Self {
        Self::with_attempt_cap(DEFAULT_CREDIT_RETRY_ATTEMPTS)
    }
}

impl EconomyGateway {
    /// Creates a gateway with no provider. Currency trades are rejected
    /// until one is registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a gateway that drops a deferred credit after `max_attempts`
    /// failed deliveries.
    #[must_use]
    pub fn with_attempt_cap(max_attempts: u32) -> Self {
        Self {
            provider: None,
            deferred: VecDeque::new(),
            max_attempts,
        }
    }

    /// Registers the currency backend, replacing any previous one.
    pub fn register(&mut self, provider: Box<dyn EconomyProvider>) {
        debug!(provider = provider.name(), "economy provider registered");
        self.provider = Some(provider);
    }

    /// Returns true if a provider is registered.
    #[must_use]
    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Number of credits awaiting redelivery.
    #[must_use]
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    fn provider_mut(&mut self) -> TradeResult<&mut Box<dyn EconomyProvider>> {
        self.provider
            .as_mut()
            .ok_or_else(|| TradeError::EconomyFailure("no economy provider registered".to_string()))
    }

    /// Balance of an account.
    ///
    /// # Errors
    ///
    /// Returns `EconomyFailure` with no provider or an unreachable backend.
    pub fn balance(&self, account: ParticipantId) -> TradeResult<Coins> {
        self.provider
            .as_ref()
            .ok_or_else(|| TradeError::EconomyFailure("no economy provider registered".to_string()))?
            .balance(account)
    }

    /// Charges a participant. Failure here aborts the trade before any
    /// state changed, so it needs no compensation.
    ///
    /// # Errors
    ///
    /// Propagates the provider's `InsufficientFunds` or `EconomyFailure`.
    pub fn charge(&mut self, account: ParticipantId, amount: Coins) -> TradeResult<()> {
        if amount.is_zero() {
            return Ok(());
        }
        self.provider_mut()?.withdraw(account, amount)
    }

    /// Refunds a participant after a post-charge abort.
    ///
    /// # Errors
    ///
    /// Propagates `EconomyFailure` so the caller can escalate; refunds are
    /// not deferred because the participant is present and the trade is
    /// being unwound right now.
    pub fn refund(&mut self, account: ParticipantId, amount: Coins) -> TradeResult<()> {
        if amount.is_zero() {
            return Ok(());
        }
        self.provider_mut()?.deposit(account, amount)
    }

    /// Credits a shop owner's proceeds. On failure the credit is parked
    /// for retry instead of being dropped, and `Ok(false)` is returned so
    /// the caller can emit a deferral event. `Ok(true)` means delivered.
    ///
    /// # Errors
    ///
    /// Returns `EconomyFailure` only when no provider is registered at
    /// all, which the trade validation should have caught earlier.
    pub fn credit_owner(
        &mut self,
        shop_id: ShopId,
        owner: OwnerId,
        amount: Coins,
    ) -> TradeResult<bool> {
        if amount.is_zero() {
            return Ok(true);
        }
        match self.provider_mut()?.deposit(owner, amount) {
            Ok(()) => Ok(true),
            Err(err) => {
                warn!(shop_id, owner, %amount, %err, "owner credit deferred");
                self.deferred.push_back(DeferredCredit {
                    shop_id,
                    owner,
                    amount,
                    attempts: 1,
                });
                Ok(false)
            }
        }
    }

    /// Retries every deferred credit once. Called each tick.
    ///
    /// Still-failing credits stay queued with their attempt count bumped;
    /// a credit that exhausts the attempt cap is dropped and reported in
    /// the returned [`RetryReport`] so the caller can alert operators.
    pub fn retry_deferred(&mut self) -> RetryReport {
        let mut report = RetryReport::default();
        let pending = std::mem::take(&mut self.deferred);
        for mut credit in pending {
            let outcome = match self.provider.as_mut() {
                Some(provider) => provider.deposit(credit.owner, credit.amount),
                None => Err(TradeError::EconomyFailure("no provider".to_string())),
            };
            match outcome {
                Ok(()) => {
                    debug!(
                        owner = credit.owner,
                        amount = %credit.amount,
                        attempts = credit.attempts,
                        "deferred credit delivered"
                    );
                    report.delivered.push(credit);
                }
                Err(_) => {
                    credit.attempts += 1;
                    if credit.attempts >= self.max_attempts {
                        error!(
                            shop_id = credit.shop_id,
                            owner = credit.owner,
                            amount = %credit.amount,
                            attempts = credit.attempts,
                            "deferred credit exhausted its retry budget, dropping"
                        );
                        report.abandoned.push(credit);
                    } else {
                        self.deferred.push_back(credit);
                    }
                }
            }
        }
        report
    }
}

/// In-process economy backend for tests and demos.
///
/// Accounts spring into existence at zero balance on first touch. The
/// `fail_deposits` switch simulates an unreachable backend for
/// deferred-credit testing.
#[derive(Debug, Default)]
pub struct MemoryVault {
    balances: HashMap<ParticipantId, Coins>,
    fail_deposits: bool,
}

impl MemoryVault {
    /// Creates an empty vault.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an account balance.
    pub fn fund(&mut self, account: ParticipantId, amount: Coins) {
        self.balances.insert(account, amount);
    }

    /// Makes every subsequent deposit fail (simulated outage).
    pub fn set_fail_deposits(&mut self, fail: bool) {
        self.fail_deposits = fail;
    }
}

impl EconomyProvider for MemoryVault {
    fn name(&self) -> &str {
        "memory_vault"
    }

    fn balance(&self, account: ParticipantId) -> TradeResult<Coins> {
        Ok(self.balances.get(&account).copied().unwrap_or_default())
    }

    fn withdraw(&mut self, account: ParticipantId, amount: Coins) -> TradeResult<()> {
        let balance = self.balances.entry(account).or_default();
        *balance = balance.checked_sub(amount).map_err(|_| {
            TradeError::InsufficientFunds {
                resource: 0,
                required: amount.minor(),
                available: balance.minor(),
            }
        })?;
        Ok(())
    }

    fn deposit(&mut self, account: ParticipantId, amount: Coins) -> TradeResult<()> {
        if self.fail_deposits {
            return Err(TradeError::EconomyFailure(
                "simulated backend outage".to_string(),
            ));
        }
        let balance = self.balances.entry(account).or_default();
        *balance = balance
            .checked_add(amount)
            .map_err(|_| TradeError::ArithmeticOverflow)?;
        Ok(())
    }
}
