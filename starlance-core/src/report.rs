//! Post-resolution artifacts: combat reports and per-house filtered views.
//!
//! The engine returns these alongside the new snapshot; the surrounding
//! daemon persists and distributes them. A `PlayerState` must never mention
//! an entity the fog-of-war rules hide from its house.

use crate::config::{GameConfig, CONFIG_SCHEMA_VERSION};
use crate::entities::{ShipClass, TechLevels};
use crate::events::Event;
use crate::ids::*;
use crate::map::PlanetClass;
use serde::{Deserialize, Serialize};

/// Outcome of one resolved battle. Always produced, even for degenerate
/// engagements; a stalemate reports `victor: None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatReport {
    pub turn: u32,
    pub system: SystemId,
    pub participants: Vec<HouseId>,
    pub losses: Vec<SideLosses>,
    pub victor: Option<HouseId>,
    pub was_stalemate: bool,
    pub total_rounds: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideLosses {
    pub house: HouseId,
    pub ships_destroyed: u32,
    pub ships_crippled: u32,
    pub fighters_destroyed: u32,
}

impl CombatReport {
    pub fn involves(&self, house: HouseId) -> bool {
        self.participants.contains(&house)
    }
}

/// How much of a system a viewer house can see.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum VisibilityLevel {
    None,
    /// Neighbor of an owned/occupied system: existence and coordinates only.
    Adjacent,
    /// Active scout mission or fresh intel: composition, no cargo/ROE.
    Scouted,
    /// Viewer has a fleet in-system.
    Occupied,
    /// Viewer owns the colony: full detail.
    Owned,
}

/// A colony as seen through fog. Fields absent below the revealing level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColonyView {
    pub colony: ColonyId,
    pub owner: HouseId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub population: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blockaded: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starbase_count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemView {
    pub system: SystemId,
    pub visibility: VisibilityLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planet_class: Option<PlanetClass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colony: Option<ColonyView>,
}

/// A fleet as seen through fog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetView {
    pub fleet: FleetId,
    pub owner: HouseId,
    pub location: SystemId,
    /// Hull composition; present at Scouted and above.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ship_classes: Option<Vec<ShipClass>>,
    /// Own fleets only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roe: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cargo_units: Option<i64>,
}

/// The complete filtered view handed to one house after a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub house_id: HouseId,
    pub turn: u32,
    /// Guard pair: a delta only applies over a base with the same config.
    pub config_schema_version: u32,
    pub config_hash: u64,
    pub treasury: i64,
    pub prestige: i64,
    pub tech: TechLevels,
    pub systems: Vec<SystemView>,
    pub fleets: Vec<FleetView>,
    pub events: Vec<Event>,
    pub combat_reports: Vec<CombatReport>,
}

impl PlayerState {
    pub fn stamp(config: &GameConfig) -> (u32, u64) {
        (CONFIG_SCHEMA_VERSION, config.content_hash())
    }

    pub fn visibility_of(&self, system: SystemId) -> VisibilityLevel {
        self.systems
            .iter()
            .find(|v| v.system == system)
            .map(|v| v.visibility)
            .unwrap_or(VisibilityLevel::None)
    }
}
