//! # TRADEPOST Trade Engine
//!
//! Shop registry and trade execution for a tick-driven shared world.
//!
//! ## Design Principles
//!
//! 1. **Exactly-once exchange** - stock is pessimistically reserved before
//!    currency or holdings are touched; a failure after reservation only
//!    ever releases the reservation, never reconstructs a partial update
//! 2. **The tick is sacred** - nothing in this crate blocks the world
//!    mutation thread; disk writes happen on a dedicated writer thread
//!    that only ever sees immutable snapshots
//! 3. **Fixed-point money** - no floating point in financial calculations
//! 4. **External configuration** - tuning data lives in TOML files
//!
//! ## Thread Safety
//!
//! All shop/offer/stock mutation is confined to the single logical world
//! mutation thread. The persistence writer is the only background thread,
//! and it communicates exclusively through snapshot hand-off.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tradepost_engine::{EngineConfig, TradeEngine};
//!
//! let config = EngineConfig::from_toml_file("data/tradepost.toml")?;
//! let mut engine = TradeEngine::open(config)?;
//!
//! // Host event handlers, all on the mutation thread:
//! engine.on_shop_opened(participant, shop_id)?;
//! engine.on_offer_selected(participant, offer_id)?;
//! let receipt = engine.on_trade_confirmed(participant)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod economy;
pub mod engine;
pub mod error;
pub mod holdings;
pub mod money;
pub mod offer;
pub mod permission;
pub mod persist;
pub mod pipeline;
pub mod registry;
pub mod resource;
pub mod session;
pub mod shop;
pub mod stock;
pub mod tradelog;

pub use config::EngineConfig;
pub use economy::{DeferredCredit, EconomyGateway, EconomyProvider, MemoryVault, RetryReport};
pub use engine::{TradeEngine, TradeReceipt};
pub use error::{TradeError, TradeResult};
pub use holdings::{Holdings, HoldingsSnapshot};
pub use money::Coins;
pub use offer::{Offer, OfferBook};
pub use permission::{Action, Decision, PermissionGate, ProtectionProvider};
pub use persist::{LoadReport, ShopRecord, ShopStore};
pub use pipeline::{AbandonedWrite, PersistConfig, PersistStats, PersistencePipeline};
pub use registry::ShopRegistry;
pub use resource::{ResourceCatalog, ResourceFlags, ResourceKind, ResourceStack};
pub use session::{SessionManager, TradePhase, TradeSession};
pub use shop::{Shop, ShopKind};
pub use stock::{Reservation, StockLedger};
pub use tradelog::{TradeLog, TradeRecord};
