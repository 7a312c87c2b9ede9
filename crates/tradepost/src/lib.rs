//! # TRADEPOST
//!
//! Host crate wiring the trade engine into a tick-driven world.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            TRADEPOST                             │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  ┌───────────────┐      ┌───────────────┐     ┌───────────────┐  │
//! │  │  Host Edge    │─────>│  World Loop   │────>│  Notice Bus   │  │
//! │  │  (handlers)   │ Host │  (20 TPS)     │Trade│  (messages,   │  │
//! │  │               │Event │               │Event│   alerts)     │  │
//! │  └───────────────┘      └───────┬───────┘     └───────────────┘  │
//! │                                 │                                │
//! │                         ┌───────┴───────┐                        │
//! │                         │ Trade Engine  │                        │
//! │                         │ • registry    │                        │
//! │                         │ • sessions    │                        │
//! │                         │ • economy     │                        │
//! │                         │ • persistence │                        │
//! │                         └───────────────┘                        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `events`: bounded input/notice channels
//! - `world_loop`: fixed-rate tick orchestration

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod events;
pub mod world_loop;

// Re-export the engine and shared types for host code.
pub use tradepost_engine as engine;
pub use tradepost_shared as shared;

// Commonly used types.
pub use events::{EventBus, EventReceiver, EventSender, HostEvent};
pub use world_loop::{TickStats, TickStatsAccumulator, WorldLoop, WorldLoopConfig};
