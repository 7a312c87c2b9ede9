//! Engine-wide tuning constants.
//!
//! Defaults only; the live values come from `EngineConfig` in the engine
//! crate, loaded from TOML at startup.

pub use crate::location::REGION_BLOCKS as REGION_SIZE;

/// Simulation ticks per second in the host world.
pub const TICK_RATE: u32 = 20;

/// Ticks of participant inactivity before a trade session is swept.
///
/// 600 ticks at 20 TPS = 30 seconds.
pub const DEFAULT_SESSION_TIMEOUT_TICKS: u64 = 600;

/// Ticks between persistence cycles.
///
/// 100 ticks at 20 TPS = 5 seconds. This is the bounded-loss window for
/// shop bookkeeping after a crash; see the pipeline module in the engine.
pub const DEFAULT_PERSIST_INTERVAL_TICKS: u64 = 100;

/// Dirty-set size that triggers an early persistence cycle.
pub const DEFAULT_DIRTY_FLUSH_THRESHOLD: usize = 64;

/// Delivery attempts before a deferred owner credit is dropped.
///
/// Retried once per tick, so 600 attempts at 20 TPS ride out a 30 second
/// backend outage before the credit is abandoned and reported.
pub const DEFAULT_CREDIT_RETRY_ATTEMPTS: u32 = 600;
