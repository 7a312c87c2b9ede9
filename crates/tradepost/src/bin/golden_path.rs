//! # Golden Path Demo
//!
//! Open shop → select offer → confirm → exactly-once exchange →
//! notice published → record on disk.
//!
//! Runs the full flow through the world loop, end to end, and prints
//! per-stage timings plus the tick statistics.

use std::time::Instant;

use tradepost::{HostEvent, WorldLoop, WorldLoopConfig};
use tradepost_engine::{
    Coins, EngineConfig, MemoryVault, Offer, ResourceFlags, ResourceKind, ResourceStack,
    ShopKind, TradeEngine,
};
use tradepost_shared::{BlockPos, TradeEvent};

const ORE: u32 = 1;
const INGOT: u32 = 2;
const COIN: u32 = 9;

const ALICE: u64 = 100;
const BOB: u64 = 200;

fn main() {
    let data_dir = std::env::temp_dir().join(format!(
        "tradepost_golden_path_{}",
        std::process::id()
    ));

    println!("=== TRADEPOST Golden Path ===");
    println!("data dir: {}", data_dir.display());
    println!();

    // -- engine setup --------------------------------------------------
    let setup_start = Instant::now();
    let config = EngineConfig {
        data_dir: data_dir.clone(),
        ..EngineConfig::default()
    };
    let mut engine = TradeEngine::open(config).expect("engine open");

    for (id, name, flags) in [
        (ORE, "ore", ResourceFlags::TRADEABLE),
        (INGOT, "ingot", ResourceFlags::TRADEABLE),
        (COIN, "coin", ResourceFlags::TRADEABLE.with(ResourceFlags::CURRENCY)),
    ] {
        engine
            .register_resource(ResourceKind {
                id,
                name: name.to_string(),
                max_stack: 64,
                flags,
            })
            .expect("register resource");
    }

    let mut vault = MemoryVault::new();
    vault.fund(ALICE, Coins::from_whole(500).expect("coins"));
    vault.fund(BOB, Coins::from_whole(500).expect("coins"));
    engine.register_economy_provider(Box::new(vault));

    // Bob's shop: 3 ore -> 1 ingot (stock 2), plus 10 coins -> 1 ingot.
    let shop_id = engine
        .create_shop(
            BOB,
            Some(BOB),
            "Bob's Smeltery".to_string(),
            BlockPos::new(0, 10, 64, 10),
            ShopKind::Selling,
        )
        .expect("create shop");
    let barter_offer = engine
        .add_offer(
            shop_id,
            Offer::new(0, vec![ResourceStack::new(ORE, 3)], vec![ResourceStack::new(INGOT, 1)])
                .with_stock(2),
        )
        .expect("add barter offer");
    let coin_offer = engine
        .add_offer(
            shop_id,
            Offer::new(0, vec![ResourceStack::new(COIN, 10)], vec![ResourceStack::new(INGOT, 1)])
                .with_stock(5),
        )
        .expect("add coin offer");

    // Alice carries 9 ore: enough for three trades, but stock caps at two.
    engine.holdings_mut(ALICE).add(ORE, 9, 64).expect("seed holdings");
    let setup_us = setup_start.elapsed().as_micros();

    // -- run the scenario through the loop ------------------------------
    let mut world = WorldLoop::new(engine, WorldLoopConfig::default());
    let input = world.input_sender();
    let notices = world.notice_receiver();

    let trade_start = Instant::now();
    for attempt in 1..=3u32 {
        input.send(HostEvent::ShopOpened {
            participant: ALICE,
            shop_id,
        });
        input.send(HostEvent::OfferSelected {
            participant: ALICE,
            offer_id: barter_offer,
        });
        input.send(HostEvent::TradeConfirmed { participant: ALICE });
        let stats = world.step();
        println!(
            "tick {:>3}: barter attempt {attempt} applied {} inputs in {} us",
            stats.tick, stats.inputs_applied, stats.total_us
        );
    }

    // One coin purchase: 10 coins move from Alice to Bob.
    input.send(HostEvent::ShopOpened {
        participant: ALICE,
        shop_id,
    });
    input.send(HostEvent::OfferSelected {
        participant: ALICE,
        offer_id: coin_offer,
    });
    input.send(HostEvent::TradeConfirmed { participant: ALICE });
    let stats = world.step();
    println!(
        "tick {:>3}: coin purchase applied {} inputs in {} us",
        stats.tick, stats.inputs_applied, stats.total_us
    );
    let trade_us = trade_start.elapsed().as_micros();

    // -- inspect the notices --------------------------------------------
    println!();
    let mut completed = 0u32;
    let mut aborted = 0u32;
    for notice in notices.drain() {
        match notice {
            TradeEvent::TradeCompleted { offer_id, .. } => {
                completed += 1;
                println!("notice: trade completed (offer {offer_id})");
            }
            TradeEvent::TradeAborted { reason, .. } => {
                aborted += 1;
                println!("notice: trade aborted ({reason:?})");
            }
            TradeEvent::StockChanged { remaining, .. } => {
                println!("notice: stock changed (remaining {remaining:?})");
            }
            other => println!("notice: {other:?}"),
        }
    }

    // -- flush and verify the records -----------------------------------
    let flush_start = Instant::now();
    world.engine_mut().flush().expect("flush");
    let flush_us = flush_start.elapsed().as_micros();

    let holdings = world.engine().holdings(ALICE).expect("holdings");
    let alice_coins = world.engine().gateway().balance(ALICE).expect("balance");
    let bob_coins = world.engine().gateway().balance(BOB).expect("balance");
    println!();
    println!("alice: {} ore, {} ingots", holdings.count(ORE), holdings.count(INGOT));
    println!("alice balance: {alice_coins}, bob balance: {bob_coins}");
    println!("trades completed: {completed}, aborted: {aborted}");
    println!();
    println!("setup: {setup_us} us");
    println!("four attempts: {trade_us} us");
    println!("flush: {flush_us} us");
    println!("avg tick: {:.3} ms", world.stats().avg_tick_ms());

    assert_eq!(completed, 3, "two barters plus one coin purchase");
    assert_eq!(aborted, 1, "third barter must abort out-of-stock");
    assert_eq!(holdings.count(ORE), 3);
    assert_eq!(holdings.count(INGOT), 3);
    assert_eq!(alice_coins, Coins::from_whole(490).expect("coins"));
    assert_eq!(bob_coins, Coins::from_whole(510).expect("coins"));

    std::fs::remove_dir_all(&data_dir).ok();
    println!();
    println!("golden path OK");
}
