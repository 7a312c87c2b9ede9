//! # World Loop
//!
//! Fixed-rate tick orchestration around the trade engine:
//!
//! ```text
//! Tick N:
//! ┌──────────────────────────────────────────────────────────────┐
//! │ 1. DRAIN INPUT                                               │
//! │    └─ Apply every pending HostEvent to the engine, in order  │
//! │                                                              │
//! │ 2. ENGINE TICK                                               │
//! │    ├─ Expire idle sessions                                   │
//! │    ├─ Retry deferred owner credits                           │
//! │    └─ Snapshot dirty shops to the persistence pipeline       │
//! │                                                              │
//! │ 3. PUBLISH NOTICES                                           │
//! │    └─ Forward the engine's TradeEvents to the notice bus     │
//! │                                                              │
//! │ 4. SLEEP                                                     │
//! │    └─ Hold the tick rate (default 20 TPS)                    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Engine errors during input application are not loop errors: a denied
//! or aborted trade already produced its `TradeAborted` notice, so the
//! loop just logs at debug level and moves on.

use std::time::{Duration, Instant};

use tracing::debug;

use tradepost_engine::TradeEngine;
use tradepost_shared::{TradeEvent, TICK_RATE};

use crate::events::{EventBus, EventReceiver, EventSender, HostEvent, DEFAULT_EVENT_CAPACITY};

/// Configuration for the world loop.
#[derive(Clone, Debug)]
pub struct WorldLoopConfig {
    /// Target ticks per second.
    pub ticks_per_second: u32,
    /// Capacity of the input and notice channels.
    pub event_capacity: usize,
    /// Log ticks that blow their time budget.
    pub enable_timing_logs: bool,
}

impl Default for WorldLoopConfig {
    fn default() -> Self {
        Self {
            ticks_per_second: TICK_RATE,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            enable_timing_logs: false,
        }
    }
}

/// Timing record for one tick.
#[derive(Clone, Copy, Debug, Default)]
pub struct TickStats {
    /// Total tick time in microseconds (input + engine + publish).
    pub total_us: u64,
    /// Host events applied this tick.
    pub inputs_applied: u32,
    /// Notices published this tick.
    pub notices_published: u32,
    /// Tick number.
    pub tick: u64,
}

/// Accumulated tick statistics.
#[derive(Clone, Debug)]
pub struct TickStatsAccumulator {
    /// Ticks recorded.
    pub ticks_recorded: u64,
    /// Sum of tick times in microseconds.
    pub total_us_sum: u64,
    /// Fastest tick.
    pub min_tick_us: u64,
    /// Slowest tick.
    pub max_tick_us: u64,
    /// Ticks that exceeded the per-tick budget.
    pub ticks_over_budget: u64,
    /// The budget, in microseconds.
    budget_us: u64,
}

impl TickStatsAccumulator {
    /// Creates an accumulator for the given tick rate.
    #[must_use]
    pub fn new(ticks_per_second: u32) -> Self {
        Self {
            ticks_recorded: 0,
            total_us_sum: 0,
            min_tick_us: u64::MAX,
            max_tick_us: 0,
            ticks_over_budget: 0,
            budget_us: 1_000_000 / u64::from(ticks_per_second.max(1)),
        }
    }

    /// Records one tick.
    pub fn record(&mut self, stats: TickStats) {
        self.ticks_recorded += 1;
        self.total_us_sum += stats.total_us;
        self.min_tick_us = self.min_tick_us.min(stats.total_us);
        self.max_tick_us = self.max_tick_us.max(stats.total_us);
        if stats.total_us > self.budget_us {
            self.ticks_over_budget += 1;
        }
    }

    /// Average tick time in milliseconds.
    #[must_use]
    pub fn avg_tick_ms(&self) -> f64 {
        if self.ticks_recorded == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let avg = self.total_us_sum as f64 / self.ticks_recorded as f64;
        avg / 1000.0
    }

    /// Fraction of ticks that exceeded the budget.
    #[must_use]
    pub fn over_budget_ratio(&self) -> f64 {
        if self.ticks_recorded == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.ticks_over_budget as f64 / self.ticks_recorded as f64;
        ratio
    }
}

/// Owns the engine and drives it at a fixed tick rate.
pub struct WorldLoop {
    engine: TradeEngine,
    config: WorldLoopConfig,
    input_sender: EventSender<HostEvent>,
    input: EventReceiver<HostEvent>,
    notices: EventSender<TradeEvent>,
    notice_receiver: EventReceiver<TradeEvent>,
    stats: TickStatsAccumulator,
}

impl WorldLoop {
    /// Wraps an engine in a world loop with fresh event channels.
    #[must_use]
    pub fn new(engine: TradeEngine, config: WorldLoopConfig) -> Self {
        let input_bus = EventBus::new(config.event_capacity);
        let notice_bus = EventBus::new(config.event_capacity);
        let stats = TickStatsAccumulator::new(config.ticks_per_second);
        Self {
            engine,
            input_sender: input_bus.sender(),
            input: input_bus.receiver(),
            notices: notice_bus.sender(),
            notice_receiver: notice_bus.receiver(),
            config,
            stats,
        }
    }

    /// A sender the host edge uses to feed the loop.
    #[must_use]
    pub fn input_sender(&self) -> EventSender<HostEvent> {
        self.input_sender.clone()
    }

    /// A receiver for the engine's notices.
    #[must_use]
    pub fn notice_receiver(&self) -> EventReceiver<TradeEvent> {
        self.notice_receiver.clone()
    }

    /// Direct engine access, for setup and assertions. Must only be used
    /// from the thread driving the loop.
    pub fn engine_mut(&mut self) -> &mut TradeEngine {
        &mut self.engine
    }

    /// Read access to the engine.
    #[must_use]
    pub fn engine(&self) -> &TradeEngine {
        &self.engine
    }

    /// Accumulated tick statistics.
    #[must_use]
    pub fn stats(&self) -> &TickStatsAccumulator {
        &self.stats
    }

    /// Runs exactly one tick: drain inputs, advance the engine, publish
    /// notices. Does not sleep.
    pub fn step(&mut self) -> TickStats {
        let start = Instant::now();
        let mut inputs_applied = 0u32;

        for event in self.input.drain() {
            self.apply(event);
            inputs_applied += 1;
        }

        self.engine.tick();

        let mut notices_published = 0u32;
        for notice in self.engine.take_events() {
            if self.notices.send(notice) {
                notices_published += 1;
            }
        }

        let stats = TickStats {
            total_us: u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX),
            inputs_applied,
            notices_published,
            tick: self.engine.current_tick(),
        };
        self.stats.record(stats);
        stats
    }

    /// Runs `ticks` ticks at the configured rate, sleeping between them.
    pub fn run_ticks(&mut self, ticks: u64) {
        let tick_duration =
            Duration::from_micros(1_000_000 / u64::from(self.config.ticks_per_second.max(1)));
        for _ in 0..ticks {
            let start = Instant::now();
            let stats = self.step();

            if self.config.enable_timing_logs && stats.total_us > 0 {
                debug!(
                    tick = stats.tick,
                    total_us = stats.total_us,
                    inputs = stats.inputs_applied,
                    "tick complete"
                );
            }

            let elapsed = start.elapsed();
            if elapsed < tick_duration {
                std::thread::sleep(tick_duration - elapsed);
            }
        }
    }

    fn apply(&mut self, event: HostEvent) {
        let outcome = match event {
            HostEvent::RegionLoaded { region } => {
                self.engine.on_region_load(region);
                Ok(())
            }
            HostEvent::RegionUnloaded { region } => {
                self.engine.on_region_unload(region);
                Ok(())
            }
            HostEvent::ShopOpened {
                participant,
                shop_id,
            } => self.engine.on_shop_opened(participant, shop_id),
            HostEvent::OfferSelected {
                participant,
                offer_id,
            } => self.engine.on_offer_selected(participant, offer_id),
            HostEvent::TradeConfirmed { participant } => {
                self.engine.on_trade_confirmed(participant).map(|_| ())
            }
            HostEvent::SessionCancelled { participant } => {
                self.engine.on_session_cancelled(participant);
                Ok(())
            }
            HostEvent::Restocked {
                shop_id,
                offer_id,
                qty,
            } => self.engine.restock(shop_id, offer_id, qty),
        };

        if let Err(err) = outcome {
            // Trade failures already produced their abort notice.
            debug!(%err, "host event rejected by engine");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradepost_engine::{
        Coins, EngineConfig, MemoryVault, Offer, ResourceFlags, ResourceKind, ResourceStack,
        ShopKind,
    };
    use tradepost_shared::BlockPos;

    fn test_loop() -> (WorldLoop, std::path::PathBuf) {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let data_dir = std::env::temp_dir().join(format!("test_world_loop_{nanos}"));
        let config = EngineConfig {
            data_dir: data_dir.clone(),
            ..EngineConfig::default()
        };
        let mut engine = TradeEngine::open(config).unwrap();
        for (id, name) in [(1, "ore"), (2, "ingot")] {
            engine
                .register_resource(ResourceKind {
                    id,
                    name: name.to_string(),
                    max_stack: 64,
                    flags: ResourceFlags::TRADEABLE,
                })
                .unwrap();
        }
        let mut vault = MemoryVault::new();
        vault.fund(100, Coins::from_whole(1_000).unwrap());
        engine.register_economy_provider(Box::new(vault));
        (WorldLoop::new(engine, WorldLoopConfig::default()), data_dir)
    }

    #[test]
    fn test_trade_through_the_loop() {
        let (mut world, data_dir) = test_loop();
        let engine = world.engine_mut();
        let shop_id = engine
            .create_shop(
                200,
                Some(200),
                "Loop Post".to_string(),
                BlockPos::new(0, 1, 64, 1),
                ShopKind::Selling,
            )
            .unwrap();
        let offer_id = engine
            .add_offer(
                shop_id,
                Offer::new(0, vec![ResourceStack::new(1, 3)], vec![ResourceStack::new(2, 1)])
                    .with_stock(2),
            )
            .unwrap();
        engine.holdings_mut(100).add(1, 9, 64).unwrap();
        // Setup emitted a ShopSpawned; clear it out of the way.
        let _ = engine.take_events();

        let input = world.input_sender();
        let notices = world.notice_receiver();

        input.send(HostEvent::ShopOpened {
            participant: 100,
            shop_id,
        });
        input.send(HostEvent::OfferSelected {
            participant: 100,
            offer_id,
        });
        input.send(HostEvent::TradeConfirmed { participant: 100 });

        let stats = world.step();
        assert_eq!(stats.inputs_applied, 3);

        let published = notices.drain();
        assert!(published
            .iter()
            .any(|e| matches!(e, TradeEvent::TradeCompleted { .. })));
        assert_eq!(world.engine().holdings(100).unwrap().count(2), 1);

        std::fs::remove_dir_all(&data_dir).ok();
    }

    #[test]
    fn test_inputs_apply_in_order() {
        let (mut world, data_dir) = test_loop();
        let engine = world.engine_mut();
        let shop_id = engine
            .create_shop(
                200,
                Some(200),
                "Order Post".to_string(),
                BlockPos::new(0, 1, 64, 1),
                ShopKind::Selling,
            )
            .unwrap();
        let offer_id = engine
            .add_offer(
                shop_id,
                Offer::new(0, vec![ResourceStack::new(1, 1)], vec![ResourceStack::new(2, 1)])
                    .with_stock(1),
            )
            .unwrap();
        engine.holdings_mut(100).add(1, 5, 64).unwrap();
        let _ = engine.take_events();

        let input = world.input_sender();
        // Cancel arrives after confirm; by then the session is gone, and
        // the cancel must be a harmless no-op.
        input.send(HostEvent::ShopOpened {
            participant: 100,
            shop_id,
        });
        input.send(HostEvent::OfferSelected {
            participant: 100,
            offer_id,
        });
        input.send(HostEvent::TradeConfirmed { participant: 100 });
        input.send(HostEvent::SessionCancelled { participant: 100 });

        world.step();
        assert_eq!(world.engine().holdings(100).unwrap().count(2), 1);

        std::fs::remove_dir_all(&data_dir).ok();
    }
}
