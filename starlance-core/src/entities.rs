//! Domain entities: houses, colonies, facilities, fleets, squadrons, ships,
//! ground units, and the project records that move between turns.
//!
//! Cross-references are always typed IDs, never pointers: the up-reference
//! (`Ship → SquadronId`, `Squadron → FleetId`, project → `ColonyId`) is a
//! single ID, the down-reference is an ID list, and joining them goes
//! through the `GameState` accessors.

use crate::bounded::{new_roe, new_tax_rate, BoundedInt, RulesOfEngagement};
use crate::ids::*;
use crate::input::{FleetCommand, StandingOrder};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

// ============================================================================
// Houses
// ============================================================================

/// Player lifecycle. `Eliminated` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HouseStatus {
    Active,
    /// Three or more consecutive missed submissions; the orchestrator
    /// substitutes minimal maintenance packets.
    Autopilot,
    /// Three consecutive turns at negative prestige; defensive orders only.
    DefensiveCollapse,
    Eliminated,
}

/// Research fields. `El` and `Sl` are the two umbrella levels; the rest are
/// per-field specializations.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum TechField {
    /// Economic Level: +5%/level industrial output.
    El,
    /// Science Level: umbrella gate for field caps.
    Sl,
    /// Construction: gates ship classes, +10%/level industrial output.
    Cst,
    /// Weapons: +10%/level AS/DS, compound.
    Wep,
    /// Terraforming.
    Ter,
    /// Electronic Intelligence.
    Eli,
    /// Cloaking.
    Clk,
    /// Shields.
    Sld,
    /// Counter-Intelligence Capability.
    Cic,
    /// Fighter Doctrine.
    Fd,
    /// Advanced Carrier Operations.
    Aco,
}

impl TechField {
    /// All fields in a fixed order (used for deterministic iteration).
    pub const ALL: [TechField; 11] = [
        TechField::El,
        TechField::Sl,
        TechField::Cst,
        TechField::Wep,
        TechField::Ter,
        TechField::Eli,
        TechField::Clk,
        TechField::Sld,
        TechField::Cic,
        TechField::Fd,
        TechField::Aco,
    ];
}

/// Current level per field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechLevels {
    pub el: u8,
    pub sl: u8,
    pub cst: u8,
    pub wep: u8,
    pub ter: u8,
    pub eli: u8,
    pub clk: u8,
    pub sld: u8,
    pub cic: u8,
    pub fd: u8,
    pub aco: u8,
}

impl Default for TechLevels {
    fn default() -> Self {
        Self {
            el: 1,
            sl: 1,
            cst: 1,
            wep: 1,
            ter: 1,
            eli: 1,
            clk: 1,
            sld: 1,
            cic: 1,
            fd: 1,
            aco: 1,
        }
    }
}

impl TechLevels {
    pub fn level(&self, field: TechField) -> u8 {
        match field {
            TechField::El => self.el,
            TechField::Sl => self.sl,
            TechField::Cst => self.cst,
            TechField::Wep => self.wep,
            TechField::Ter => self.ter,
            TechField::Eli => self.eli,
            TechField::Clk => self.clk,
            TechField::Sld => self.sld,
            TechField::Cic => self.cic,
            TechField::Fd => self.fd,
            TechField::Aco => self.aco,
        }
    }

    pub fn level_mut(&mut self, field: TechField) -> &mut u8 {
        match field {
            TechField::El => &mut self.el,
            TechField::Sl => &mut self.sl,
            TechField::Cst => &mut self.cst,
            TechField::Wep => &mut self.wep,
            TechField::Ter => &mut self.ter,
            TechField::Eli => &mut self.eli,
            TechField::Clk => &mut self.clk,
            TechField::Sld => &mut self.sld,
            TechField::Cic => &mut self.cic,
            TechField::Fd => &mut self.fd,
            TechField::Aco => &mut self.aco,
        }
    }
}

/// Accumulated research points per field, banked across turns until a level
/// purchase completes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchBank {
    pub points: Vec<(TechField, i64)>,
}

impl ResearchBank {
    pub fn get(&self, field: TechField) -> i64 {
        self.points
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, p)| *p)
            .unwrap_or(0)
    }

    pub fn add(&mut self, field: TechField, delta: i64) {
        if let Some(entry) = self.points.iter_mut().find(|(f, _)| *f == field) {
            entry.1 += delta;
        } else {
            self.points.push((field, delta));
            self.points.sort_by_key(|(f, _)| *f);
        }
    }

    pub fn set(&mut self, field: TechField, value: i64) {
        if let Some(entry) = self.points.iter_mut().find(|(f, _)| *f == field) {
            entry.1 = value;
        } else {
            self.points.push((field, value));
            self.points.sort_by_key(|(f, _)| *f);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct House {
    pub id: HouseId,
    pub name: String,
    /// Production Points. Signed: a house can be driven negative mid-turn
    /// before the shortfall cascade runs.
    pub treasury: i64,
    pub prestige: i64,
    pub tech: TechLevels,
    pub research: ResearchBank,
    /// Espionage Budget Points (offensive pool).
    pub ebp: i64,
    /// Counter-Intelligence Points (defensive pool).
    pub cip: i64,
    /// House-wide tax policy applied to colonies without a local override.
    pub tax_policy: BoundedInt,
    pub status: HouseStatus,
    pub consecutive_shortfalls: u8,
    pub negative_prestige_turns: u8,
    pub missed_submissions: u8,
    pub research_allocation: crate::input::ResearchAllocation,
    /// Ceasefire offers waiting for the counterparty's next packet.
    pub pending_proposals: Vec<DiplomaticProposal>,
}

impl House {
    pub fn new(id: HouseId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            treasury: 0,
            prestige: 0,
            tech: TechLevels::default(),
            research: ResearchBank::default(),
            ebp: 0,
            cip: 0,
            tax_policy: new_tax_rate(50),
            status: HouseStatus::Active,
            consecutive_shortfalls: 0,
            negative_prestige_turns: 0,
            missed_submissions: 0,
            research_allocation: Default::default(),
            pending_proposals: Vec::new(),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.status != HouseStatus::Eliminated
    }
}

// ============================================================================
// Diplomacy
// ============================================================================

/// Three-valued stance per ordered pair of houses.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum DiplomaticStance {
    #[default]
    Neutral,
    Hostile,
    Enemy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub turn: u32,
}

/// Relation record for one ordered `(actor, toward)` pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiplomaticRelation {
    pub stance: DiplomaticStance,
    /// Non-Aggression Pact in force.
    pub pact: bool,
    /// Turn the pact was signed (reinstatement cooldown anchor).
    pub pact_since: u32,
    /// Dishonored marker expires at end of this turn (exclusive).
    pub dishonored_until: u32,
    /// Cannot form new pacts until this turn (exclusive).
    pub isolated_until: u32,
    /// Last turn a hostile act occurred on this pair (decay anchor).
    pub last_incident_turn: u32,
    /// Pact violation history, oldest first.
    pub violations: Vec<ViolationRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiplomaticProposal {
    Ceasefire { from: HouseId },
    Pact { from: HouseId },
}

// ============================================================================
// Colonies and facilities
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColonyAutomation {
    pub auto_load_fighters: bool,
    pub auto_repair: bool,
    pub auto_build_iu: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Colony {
    pub id: ColonyId,
    pub owner: HouseId,
    pub system: SystemId,
    /// Population Units.
    pub population: i64,
    /// Industrial Units.
    pub industry: i64,
    pub neorias: Vec<NeoriaId>,
    pub kastras: Vec<KastraId>,
    /// Fighter hangar: fighters based here, not embarked on a carrier.
    pub fighters: Vec<ShipId>,
    pub blockaded: bool,
    pub blockading_houses: Vec<HouseId>,
    /// Local tax override; `None` uses the house policy.
    pub tax_rate: Option<BoundedInt>,
    pub construction_queue: Vec<ConstructionProjectId>,
    pub repair_queue: Vec<RepairProjectId>,
    pub automation: ColonyAutomation,
    /// Commission staging: squadrons waiting for fleet assignment. Must be
    /// drained by end of turn.
    pub unassigned_squadrons: Vec<SquadronId>,
    /// Fighter-cap grace window: `Some(n)` = violating with `n` turns left.
    pub fighter_grace: Option<u8>,
}

impl Colony {
    pub fn new(id: ColonyId, owner: HouseId, system: SystemId, population: i64) -> Self {
        Self {
            id,
            owner,
            system,
            population,
            industry: 0,
            neorias: Vec::new(),
            kastras: Vec::new(),
            fighters: Vec::new(),
            blockaded: false,
            blockading_houses: Vec::new(),
            tax_rate: None,
            construction_queue: Vec::new(),
            repair_queue: Vec::new(),
            automation: ColonyAutomation::default(),
            unassigned_squadrons: Vec::new(),
            fighter_grace: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NeoriaClass {
    Spaceport,
    Shipyard,
    Drydock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FacilityState {
    #[default]
    Undamaged,
    Crippled,
}

/// Production facility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neoria {
    pub id: NeoriaId,
    pub colony: ColonyId,
    pub class: NeoriaClass,
    pub state: FacilityState,
}

/// Orbital defense facility (Starbase).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kastra {
    pub id: KastraId,
    pub colony: ColonyId,
    pub state: FacilityState,
}

// ============================================================================
// Fleets, squadrons, ships
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FleetStatus {
    #[default]
    Active,
    /// Half upkeep, never reinforced, must reactivate before moving.
    Reserve,
    /// Token upkeep, never reinforced.
    Mothballed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MissionState {
    #[default]
    Idle,
    Traveling,
    Executing,
    /// Committed to a covert scouting mission; rejects new commands.
    ScoutLocked,
}

/// In-flight movement along a lane path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TravelState {
    /// Systems left to visit; front is the next hop.
    pub path: VecDeque<SystemId>,
    pub destination: SystemId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fleet {
    pub id: FleetId,
    pub owner: HouseId,
    pub location: SystemId,
    pub status: FleetStatus,
    pub mission: MissionState,
    pub roe: RulesOfEngagement,
    pub squadrons: Vec<SquadronId>,
    pub command: Option<FleetCommand>,
    pub standing_order: Option<StandingOrder>,
    pub travel: Option<TravelState>,
}

impl Fleet {
    pub fn new(id: FleetId, owner: HouseId, location: SystemId) -> Self {
        Self {
            id,
            owner,
            location,
            status: FleetStatus::Active,
            mission: MissionState::Idle,
            roe: new_roe(5),
            squadrons: Vec::new(),
            command: None,
            standing_order: None,
            travel: None,
        }
    }

    pub fn is_stationary(&self) -> bool {
        self.travel.is_none() && self.mission != MissionState::Traveling
    }
}

/// Squadron type, derived from the flagship's hull role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SquadronKind {
    Combat,
    Intel,
    Expansion,
    Auxiliary,
    Fighter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Squadron {
    pub id: SquadronId,
    pub owner: HouseId,
    pub fleet: FleetId,
    pub flagship: ShipId,
    /// Member ships excluding the flagship.
    pub ships: Vec<ShipId>,
    /// Fighters embarked on this squadron's carrier hulls.
    pub embarked_fighters: Vec<ShipId>,
    pub kind: SquadronKind,
}

impl Squadron {
    /// Flagship first, then members in stored order.
    pub fn all_ships(&self) -> impl Iterator<Item = ShipId> + '_ {
        std::iter::once(self.flagship).chain(self.ships.iter().copied())
    }
}

/// Hull classes, coarsest to most specialized.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ShipClass {
    Fighter,
    Corvette,
    Frigate,
    Destroyer,
    LightCruiser,
    HeavyCruiser,
    Battlecruiser,
    Battleship,
    Dreadnought,
    Carrier,
    Supercarrier,
    Raider,
    Monitor,
    Scout,
    /// Expansion transport; required for colonization.
    Etac,
    TroopTransport,
    CargoLifter,
}

impl ShipClass {
    pub const ALL: [ShipClass; 17] = [
        ShipClass::Fighter,
        ShipClass::Corvette,
        ShipClass::Frigate,
        ShipClass::Destroyer,
        ShipClass::LightCruiser,
        ShipClass::HeavyCruiser,
        ShipClass::Battlecruiser,
        ShipClass::Battleship,
        ShipClass::Dreadnought,
        ShipClass::Carrier,
        ShipClass::Supercarrier,
        ShipClass::Raider,
        ShipClass::Monitor,
        ShipClass::Scout,
        ShipClass::Etac,
        ShipClass::TroopTransport,
        ShipClass::CargoLifter,
    ];

    pub const fn role(self) -> ShipRole {
        match self {
            ShipClass::Fighter => ShipRole::Fighter,
            ShipClass::Scout => ShipRole::Intel,
            ShipClass::Etac => ShipRole::Expansion,
            ShipClass::TroopTransport | ShipClass::CargoLifter => ShipRole::Auxiliary,
            _ => ShipRole::Combat,
        }
    }

    /// Spacelift hulls are destroyed outright when their escorts are lost.
    pub const fn is_spacelift(self) -> bool {
        matches!(
            self,
            ShipClass::Etac | ShipClass::TroopTransport | ShipClass::CargoLifter
        )
    }

    /// Capital hulls count against the capital-squadron cap when leading a
    /// squadron.
    pub const fn is_capital(self) -> bool {
        matches!(
            self,
            ShipClass::HeavyCruiser
                | ShipClass::Battlecruiser
                | ShipClass::Battleship
                | ShipClass::Dreadnought
                | ShipClass::Carrier
                | ShipClass::Supercarrier
                | ShipClass::Monitor
        )
    }

    pub const fn is_carrier(self) -> bool {
        matches!(self, ShipClass::Carrier | ShipClass::Supercarrier)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShipRole {
    Combat,
    Intel,
    Expansion,
    Auxiliary,
    Fighter,
}

impl From<ShipRole> for SquadronKind {
    fn from(role: ShipRole) -> SquadronKind {
        match role {
            ShipRole::Combat => SquadronKind::Combat,
            ShipRole::Intel => SquadronKind::Intel,
            ShipRole::Expansion => SquadronKind::Expansion,
            ShipRole::Auxiliary => SquadronKind::Auxiliary,
            ShipRole::Fighter => SquadronKind::Fighter,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CargoKind {
    Marines,
    Colonists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cargo {
    pub kind: CargoKind,
    pub units: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ship {
    pub id: ShipId,
    pub owner: HouseId,
    pub class: ShipClass,
    /// `SquadronId::NULL` while in a hangar or commission staging.
    pub squadron: SquadronId,
    /// Attack strength and maintenance halve while crippled.
    pub crippled: bool,
    pub cargo: Option<Cargo>,
}

impl Ship {
    pub fn new(id: ShipId, owner: HouseId, class: ShipClass) -> Self {
        Self {
            id,
            owner,
            class,
            squadron: SquadronId::NULL,
            crippled: false,
            cargo: None,
        }
    }
}

// ============================================================================
// Ground forces
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GroundUnitKind {
    Army,
    Marine,
    GroundBattery,
    PlanetaryShield,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroundUnitSite {
    Colony(ColonyId),
    /// Embarked on a troop transport hull.
    Transport(ShipId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundUnit {
    pub id: GroundUnitId,
    pub owner: HouseId,
    pub kind: GroundUnitKind,
    pub site: GroundUnitSite,
}

// ============================================================================
// Pipeline records
// ============================================================================

/// What a construction project produces when it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildTarget {
    Ship(ShipClass),
    Neoria(NeoriaClass),
    Kastra,
    IndustrialUnits(i64),
    GroundUnit(GroundUnitKind),
    Terraform,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstructionProject {
    pub id: ConstructionProjectId,
    pub colony: ColonyId,
    /// Producing dock; `None` for ground-side work (IU, ground units,
    /// terraforming).
    pub facility: Option<NeoriaId>,
    pub target: BuildTarget,
    pub cost_total: i64,
    pub cost_paid: i64,
    pub turns_remaining: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepairSubject {
    Ship(ShipId),
    Kastra(KastraId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairProject {
    pub id: RepairProjectId,
    pub colony: ColonyId,
    pub facility: NeoriaId,
    pub subject: RepairSubject,
    pub cost_total: i64,
    pub turns_remaining: u32,
}

/// Space Guild population movement, in flight across turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationTransfer {
    pub id: PopulationTransferId,
    pub house: HouseId,
    pub from: ColonyId,
    pub to: ColonyId,
    pub units: i64,
    pub turns_remaining: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn squadron_kind_follows_flagship_role() {
        assert_eq!(SquadronKind::from(ShipClass::Scout.role()), SquadronKind::Intel);
        assert_eq!(
            SquadronKind::from(ShipClass::Dreadnought.role()),
            SquadronKind::Combat
        );
        assert_eq!(
            SquadronKind::from(ShipClass::Etac.role()),
            SquadronKind::Expansion
        );
    }

    #[test]
    fn spacelift_and_capital_classification() {
        assert!(ShipClass::Etac.is_spacelift());
        assert!(ShipClass::TroopTransport.is_spacelift());
        assert!(!ShipClass::Destroyer.is_spacelift());
        assert!(ShipClass::Dreadnought.is_capital());
        assert!(!ShipClass::Corvette.is_capital());
    }

    #[test]
    fn research_bank_accumulates_sorted() {
        let mut bank = ResearchBank::default();
        bank.add(TechField::Wep, 10);
        bank.add(TechField::El, 5);
        bank.add(TechField::Wep, 3);
        assert_eq!(bank.get(TechField::Wep), 13);
        assert_eq!(bank.get(TechField::El), 5);
        assert_eq!(bank.points[0].0, TechField::El);
    }

    #[test]
    fn tech_levels_field_access() {
        let mut tech = TechLevels::default();
        *tech.level_mut(TechField::Cst) = 4;
        assert_eq!(tech.level(TechField::Cst), 4);
        for field in TechField::ALL {
            assert!(tech.level(field) >= 1);
        }
    }
}
