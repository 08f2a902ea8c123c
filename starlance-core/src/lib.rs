//! # Starlance Core
//!
//! Deterministic turn-resolution engine for an asynchronous 4X strategy
//! game played across hex-grid star maps.
//!
//! This crate implements the core pipeline: snapshot → packets → snapshot′.
//! It is designed for lockstep asynchronous play and replay determinism.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────┐     ┌──────────────┐
//! │  Players /   │────▶│ CommandPacket │────▶│ resolve_turn │
//! │  substitutes │     │  (per house)  │     │  (pure fn)   │
//! └──────────────┘     └───────────────┘     └──────┬───────┘
//!                                                   │
//!                      ┌───────────────┐     ┌──────▼───────┐
//!                      │ PlayerStates  │◀────│  GameState′  │
//!                      │ (fog-filtered)│     │ + Events     │
//!                      └───────────────┘     └──────────────┘
//! ```
//!
//! ## Key Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`GameState`] | Complete world snapshot (houses, colonies, fleets) |
//! | [`CommandPacket`] | One house's orders for one turn |
//! | [`resolve_turn`] | Pure function: `(state, packets) -> outcome` |
//! | [`GameConfig`] | Frozen rules data the engine only reads |
//! | [`PlayerState`] | Per-house fog-of-war view of the result |
//!
//! ## Phases
//!
//! Resolution runs four phases in strict order: Conflict (simultaneous,
//! via snapshot + staging), Income (sequential per house), Command
//! (sequential), Maintenance (sequential). Iteration over entities is
//! always sorted by ID, ties break by ascending ID, and the RNG reseeds
//! from `(turn, game_seed)`, so a turn replays bit-identically.

pub mod batch;
pub mod bounded;
pub mod codec;
pub mod config;
pub mod entities;
pub mod events;
pub mod fixed;
pub mod ids;
pub mod input;
pub mod map;
pub mod report;
pub mod state;
pub mod step;
pub mod systems;
pub mod testing;

pub use bounded::{new_roe, new_tax_rate, BoundedInt, RulesOfEngagement};
pub use codec::{decode_packet, decode_snapshot, encode_packet, encode_snapshot, CodecError};
pub use config::{EspionageOp, GameConfig, CONFIG_SCHEMA_VERSION};
pub use events::{Event, EventLog, EventPayload};
pub use fixed::Fixed;
pub use input::{validate_packet, CommandPacket, FleetCommand, PacketRejection};
pub use map::{HexCoord, LaneClass, PlanetClass, ResourceRating, StarMap, StarSystem};
pub use report::{CombatReport, PlayerState, VisibilityLevel};
pub use state::{GameState, StateError};
pub use step::{resolve_turn, TurnError, TurnOutcome};
pub use systems::{analyze_house_capacity, process_shortfall, ShortfallCascade};
