//! # Trade Flow Verification Tests
//!
//! End-to-end scenarios driven through the world loop:
//!
//! 1. **Stock exhaustion**: a stock-2 offer completes exactly twice
//! 2. **Cancellation**: a cancelled session leaves stock untouched
//! 3. **Region lifecycle**: despawn preserves state, respawn restores it
//! 4. **Restart**: flushed records survive an engine restart
//! 5. **Deferred credit**: owner proceeds survive a backend outage
//!
//! Run with: cargo test --test trade_verification -- --nocapture

use std::path::{Path, PathBuf};

use tradepost::{HostEvent, WorldLoop, WorldLoopConfig};
use tradepost_engine::{
    Coins, EngineConfig, MemoryVault, Offer, ResourceFlags, ResourceKind, ResourceStack,
    ShopKind, TradeEngine,
};
use tradepost_shared::{AbortKind, BlockPos, TradeEvent};

const ORE: u32 = 1;
const INGOT: u32 = 2;
const COIN: u32 = 9;

const ALICE: u64 = 100;
const BOB: u64 = 200;

const SHOP_POS: BlockPos = BlockPos::new(0, 8, 64, 8);

fn temp_data_dir(tag: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("tradepost_verify_{tag}_{nanos}"))
}

fn open_engine(data_dir: &Path, vault: MemoryVault) -> TradeEngine {
    let config = EngineConfig {
        data_dir: data_dir.to_path_buf(),
        ..EngineConfig::default()
    };
    let mut engine = TradeEngine::open(config).unwrap();
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
            .unwrap();
    }
    engine.register_economy_provider(Box::new(vault));
    engine
}

/// Bob's shop with a 3-ore -> 1-ingot offer at the given stock, and Alice
/// carrying enough ore for three attempts.
fn barter_world(tag: &str, stock: u32) -> (WorldLoop, u64, u32, PathBuf) {
    let data_dir = temp_data_dir(tag);
    let mut engine = open_engine(&data_dir, MemoryVault::new());
    let shop_id = engine
        .create_shop(
            BOB,
            Some(BOB),
            "Verify Post".to_string(),
            SHOP_POS,
            ShopKind::Selling,
        )
        .unwrap();
    let offer_id = engine
        .add_offer(
            shop_id,
            Offer::new(0, vec![ResourceStack::new(ORE, 3)], vec![ResourceStack::new(INGOT, 1)])
                .with_stock(stock),
        )
        .unwrap();
    engine.holdings_mut(ALICE).add(ORE, 9, 64).unwrap();
    let _ = engine.take_events();
    (
        WorldLoop::new(engine, WorldLoopConfig::default()),
        shop_id,
        offer_id,
        data_dir,
    )
}

fn send_trade(world: &WorldLoop, shop_id: u64, offer_id: u32) {
    let input = world.input_sender();
    input.send(HostEvent::ShopOpened {
        participant: ALICE,
        shop_id,
    });
    input.send(HostEvent::OfferSelected {
        participant: ALICE,
        offer_id,
    });
    input.send(HostEvent::TradeConfirmed { participant: ALICE });
}

#[test]
fn verify_stock_exhaustion_sequence() {
    let (mut world, shop_id, offer_id, data_dir) = barter_world("exhaust", 2);
    let notices = world.notice_receiver();

    for _ in 0..3 {
        send_trade(&world, shop_id, offer_id);
        world.step();
    }

    let published = notices.drain();
    let completed = published
        .iter()
        .filter(|e| matches!(e, TradeEvent::TradeCompleted { .. }))
        .count();
    let aborted: Vec<_> = published
        .iter()
        .filter_map(|e| match e {
            TradeEvent::TradeAborted { reason, .. } => Some(*reason),
            _ => None,
        })
        .collect();

    assert_eq!(completed, 2);
    assert_eq!(aborted, vec![AbortKind::OutOfStock]);

    // Exactly two exchanges happened: 9 - 2*3 ore, 2 ingots.
    let holdings = world.engine().holdings(ALICE).unwrap();
    assert_eq!(holdings.count(ORE), 3);
    assert_eq!(holdings.count(INGOT), 2);
    let shop = world.engine().registry().get(shop_id).unwrap();
    assert_eq!(shop.stock.available(offer_id), Some(0));

    std::fs::remove_dir_all(&data_dir).ok();
}

#[test]
fn verify_cancelled_session_leaves_stock_untouched() {
    let (mut world, shop_id, offer_id, data_dir) = barter_world("cancel", 1);
    let input = world.input_sender();
    let notices = world.notice_receiver();

    // Select, then walk away.
    input.send(HostEvent::ShopOpened {
        participant: ALICE,
        shop_id,
    });
    input.send(HostEvent::OfferSelected {
        participant: ALICE,
        offer_id,
    });
    input.send(HostEvent::SessionCancelled { participant: ALICE });
    world.step();

    assert!(!notices
        .drain()
        .iter()
        .any(|e| matches!(e, TradeEvent::TradeCompleted { .. } | TradeEvent::TradeAborted { .. })));
    let shop = world.engine().registry().get(shop_id).unwrap();
    assert_eq!(shop.stock.available(offer_id), Some(1));

    // The single unit is still tradeable.
    send_trade(&world, shop_id, offer_id);
    world.step();
    assert_eq!(world.engine().holdings(ALICE).unwrap().count(INGOT), 1);

    std::fs::remove_dir_all(&data_dir).ok();
}

#[test]
fn verify_region_lifecycle_preserves_state() {
    let (mut world, shop_id, offer_id, data_dir) = barter_world("region", 2);
    let input = world.input_sender();
    let notices = world.notice_receiver();
    let region = SHOP_POS.region();

    // One trade, then the region unloads.
    send_trade(&world, shop_id, offer_id);
    world.step();
    input.send(HostEvent::RegionUnloaded { region });
    world.step();

    let published = notices.drain();
    assert!(published
        .iter()
        .any(|e| matches!(e, TradeEvent::ShopDespawned { .. })));

    // A dormant shop cannot be opened; nothing completes, nothing aborts.
    send_trade(&world, shop_id, offer_id);
    world.step();
    assert!(notices.drain().is_empty());

    // Reload: the shop reactivates with its remaining stock intact.
    input.send(HostEvent::RegionLoaded { region });
    world.step();
    let published = notices.drain();
    assert!(published
        .iter()
        .any(|e| matches!(e, TradeEvent::ShopSpawned { .. })));
    assert!(published
        .iter()
        .any(|e| matches!(e, TradeEvent::RegionActivated { shops: 1, .. })));

    send_trade(&world, shop_id, offer_id);
    world.step();
    let holdings = world.engine().holdings(ALICE).unwrap();
    assert_eq!(holdings.count(INGOT), 2);
    let shop = world.engine().registry().get(shop_id).unwrap();
    assert_eq!(shop.stock.available(offer_id), Some(0));

    std::fs::remove_dir_all(&data_dir).ok();
}

#[test]
fn verify_restart_recovers_flushed_records() {
    let (mut world, shop_id, offer_id, data_dir) = barter_world("restart", 2);

    send_trade(&world, shop_id, offer_id);
    world.step();
    world.engine_mut().flush().unwrap();
    drop(world);

    // Second process lifetime over the same data directory.
    let engine = open_engine(&data_dir, MemoryVault::new());
    let shop = engine.registry().get(shop_id).unwrap();
    assert_eq!(shop.name, "Verify Post");
    assert_eq!(shop.stock.available(offer_id), Some(1));
    assert!(!shop.active, "recovered shops start dormant");

    // After its region loads, the survivor trades again.
    let mut world = WorldLoop::new(engine, WorldLoopConfig::default());
    world.engine_mut().holdings_mut(ALICE).add(ORE, 3, 64).unwrap();
    world
        .input_sender()
        .send(HostEvent::RegionLoaded {
            region: SHOP_POS.region(),
        });
    world.step();
    send_trade(&world, shop_id, offer_id);
    world.step();

    let shop = world.engine().registry().get(shop_id).unwrap();
    assert_eq!(shop.stock.available(offer_id), Some(0));

    std::fs::remove_dir_all(&data_dir).ok();
}

#[test]
fn verify_deferred_owner_credit_recovers() {
    let data_dir = temp_data_dir("deferred");
    let mut vault = MemoryVault::new();
    vault.fund(ALICE, Coins::from_whole(100).unwrap());
    vault.set_fail_deposits(true);
    let mut engine = open_engine(&data_dir, vault);

    let shop_id = engine
        .create_shop(
            BOB,
            Some(BOB),
            "Outage Post".to_string(),
            SHOP_POS,
            ShopKind::Selling,
        )
        .unwrap();
    let offer_id = engine
        .add_offer(
            shop_id,
            Offer::new(0, vec![ResourceStack::new(COIN, 10)], vec![ResourceStack::new(INGOT, 1)])
                .with_stock(5),
        )
        .unwrap();
    let _ = engine.take_events();

    let mut world = WorldLoop::new(engine, WorldLoopConfig::default());
    let notices = world.notice_receiver();

    // The trade commits: Alice pays and gets her ingot, but the owner's
    // proceeds bounce off the failing backend and are parked for retry.
    send_trade(&world, shop_id, offer_id);
    world.step();

    let published = notices.drain();
    assert!(published
        .iter()
        .any(|e| matches!(e, TradeEvent::TradeCompleted { .. })));
    assert!(published.iter().any(|e| matches!(
        e,
        TradeEvent::OwnerCreditDeferred {
            owner: BOB,
            amount_minor: 100_000,
            ..
        }
    )));
    assert_eq!(world.engine().holdings(ALICE).unwrap().count(INGOT), 1);
    assert_eq!(world.engine().gateway().deferred_len(), 1);

    // Backend recovers; the next ticks deliver the parked credit.
    let mut recovered = MemoryVault::new();
    recovered.fund(BOB, Coins::from_whole(0).unwrap());
    world.engine_mut().register_economy_provider(Box::new(recovered));
    world.step();

    assert_eq!(world.engine().gateway().deferred_len(), 0);
    assert_eq!(
        world.engine().gateway().balance(BOB).unwrap(),
        Coins::from_whole(10).unwrap()
    );

    std::fs::remove_dir_all(&data_dir).ok();
}
