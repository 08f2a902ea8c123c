//! Frozen game configuration.
//!
//! The engine only reads this record; authoring and file parsing happen in
//! the surrounding host. `GameConfig::default()` supplies the baseline
//! tables the test scenarios assume. A real deployment ingests its own
//! config bytes, and fog-of-war snapshots pair `(schema_version, hash)` so
//! mismatched views are refused at the codec boundary.

use crate::entities::{GroundUnitKind, NeoriaClass, ShipClass, ShipRole, TechField};
use crate::fixed::Fixed;
use crate::map::ResourceRating;
use serde::{Deserialize, Serialize};

/// Bumped whenever the config layout changes shape.
pub const CONFIG_SCHEMA_VERSION: u32 = 3;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameConfig {
    pub economy: EconomyConfig,
    pub construction: ConstructionConfig,
    pub ships: ShipTable,
    pub facilities: FacilityConfig,
    pub ground_units: GroundUnitConfig,
    pub combat: CombatConfig,
    pub tech: TechConfig,
    pub prestige: PrestigeConfig,
    pub diplomacy: DiplomacyConfig,
    pub espionage: EspionageConfig,
    pub military: MilitaryConfig,
    pub gameplay: GameplayConfig,
}

impl GameConfig {
    /// Stable content hash over the serialized config (FNV-1a over the JSON
    /// bytes). Paired with the schema version in fog-of-war snapshots.
    pub fn content_hash(&self) -> u64 {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const FNV_PRIME: u64 = 0x1000_0000_01b3;
        let mut hash = FNV_OFFSET;
        for b in bytes {
            hash ^= b as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        hash
    }
}

// ============================================================================
// Economy
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomyConfig {
    /// Logistic growth rate `r` in `ΔP = r·P·(1 − P/K)`.
    pub growth_rate: Fixed,
    /// RAW index per resource rating, indexed by `ResourceRating`.
    pub raw_index: Vec<(ResourceRating, Fixed)>,
    /// Fraction of GCO lost while blockaded (0.6 = GCO × 0.4 survives).
    pub blockade_penalty: Fixed,
    /// Per-EL-level industrial output bonus (EL_MOD = 1 + step·(EL−1)).
    pub el_mod_step: Fixed,
    /// Per-CST-level industrial output bonus (CST_MOD = 1 + step·(CST−1)).
    pub cst_mod_step: Fixed,
    /// Flat production growth term in the GCO formula.
    pub prod_growth: Fixed,
    /// Concurrent Space Guild transfers per house.
    pub max_concurrent_transfers: usize,
    /// PP per jump for a population transfer, before the class multiplier.
    pub transfer_cost_per_jump: i64,
    /// Prestige penalty per consecutive shortfall turn (index 0 = first).
    pub shortfall_prestige: Vec<i64>,
    /// Salvage fraction recovered from disbanded fleets.
    pub fleet_salvage_fraction: Fixed,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            growth_rate: Fixed::percent(8),
            raw_index: vec![
                (ResourceRating::VeryPoor, Fixed::percent(60)),
                (ResourceRating::Poor, Fixed::percent(80)),
                (ResourceRating::Average, Fixed::ONE),
                (ResourceRating::Rich, Fixed::percent(120)),
                (ResourceRating::VeryRich, Fixed::percent(140)),
            ],
            blockade_penalty: Fixed::percent(60),
            el_mod_step: Fixed::percent(5),
            cst_mod_step: Fixed::percent(10),
            prod_growth: Fixed::ZERO,
            max_concurrent_transfers: 5,
            transfer_cost_per_jump: 2,
            shortfall_prestige: vec![-8, -11, -14, -17],
            fleet_salvage_fraction: Fixed::percent(25),
        }
    }
}

impl EconomyConfig {
    pub fn raw_index_for(&self, rating: ResourceRating) -> Fixed {
        self.raw_index
            .iter()
            .find(|(r, _)| *r == rating)
            .map(|(_, v)| *v)
            .unwrap_or(Fixed::ONE)
    }

    pub fn shortfall_prestige_for(&self, consecutive: u8) -> i64 {
        let idx = (consecutive.max(1) as usize - 1).min(self.shortfall_prestige.len() - 1);
        self.shortfall_prestige[idx]
    }
}

// ============================================================================
// Construction
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstructionConfig {
    /// A starbase order requires a functioning shipyard at the colony.
    pub shipyard_required_for_starbase: bool,
    /// Cost multiplier for non-fighter ships built at a spaceport.
    pub spaceport_penalty: Fixed,
    /// Extra dock capacity per CST level above 1.
    pub dock_cst_bonus: Fixed,
    /// Build cost of one industrial unit, in PP.
    pub iu_cost: i64,
    /// Turns for ground-side projects (IU, ground units).
    pub ground_build_turns: u32,
    /// Turns to terraform one planet-class step.
    pub terraform_turns: u32,
    /// PP cost to terraform one step, before TER discounts.
    pub terraform_cost: i64,
    /// Minimum TER level to issue terraform orders.
    pub terraform_min_ter: u8,
}

impl Default for ConstructionConfig {
    fn default() -> Self {
        Self {
            shipyard_required_for_starbase: true,
            spaceport_penalty: Fixed::from_int(2),
            dock_cst_bonus: Fixed::percent(10),
            iu_cost: 1,
            ground_build_turns: 1,
            terraform_turns: 6,
            terraform_cost: 400,
            terraform_min_ter: 2,
        }
    }
}

// ============================================================================
// Ships
// ============================================================================

/// Per-hull stat block. AS/DS are base values before WEP compounding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ShipSpec {
    pub attack: i64,
    pub defense: i64,
    pub hull: i64,
    /// Scan rating (detection contests).
    pub scan: u8,
    /// Move rating (reserved for lane-speed variants).
    pub move_rating: u8,
    /// Minimum SL to unlock.
    pub tech_level: u8,
    /// Standoff rating (ambush initiative).
    pub standoff: u8,
    /// Command cost when serving in a squadron.
    pub command_cost: i64,
    /// Command rating when serving as flagship.
    pub command_rating: i64,
    pub min_cst: u8,
    pub build_cost: i64,
    pub maintenance: i64,
    /// Cargo or hangar capacity (colonists/marines/fighters by role).
    pub carry_limit: i64,
    pub build_turns: u32,
    pub role: ShipRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipTable {
    entries: Vec<(ShipClass, ShipSpec)>,
}

impl ShipTable {
    pub fn get(&self, class: ShipClass) -> &ShipSpec {
        self.entries
            .iter()
            .find(|(c, _)| *c == class)
            .map(|(_, s)| s)
            .expect("ship table covers every class")
    }
}

impl Default for ShipTable {
    fn default() -> Self {
        use ShipClass::*;
        let spec = |attack,
                    defense,
                    hull,
                    command_cost,
                    command_rating,
                    min_cst,
                    build_cost,
                    maintenance,
                    carry_limit,
                    build_turns,
                    role| ShipSpec {
            attack,
            defense,
            hull,
            scan: 1,
            move_rating: 1,
            tech_level: 1,
            standoff: 1,
            command_cost,
            command_rating,
            min_cst,
            build_cost,
            maintenance,
            carry_limit,
            build_turns,
            role,
        };
        let entries = vec![
            (Fighter, spec(2, 1, 1, 0, 0, 1, 5, 0, 0, 1, ShipRole::Fighter)),
            (Corvette, spec(2, 2, 2, 1, 2, 1, 16, 1, 0, 1, ShipRole::Combat)),
            (Frigate, spec(3, 3, 3, 1, 3, 1, 24, 1, 0, 1, ShipRole::Combat)),
            (Destroyer, spec(4, 4, 4, 2, 4, 2, 32, 2, 0, 2, ShipRole::Combat)),
            (
                LightCruiser,
                spec(6, 6, 6, 3, 6, 2, 48, 4, 0, 2, ShipRole::Combat),
            ),
            (
                HeavyCruiser,
                spec(9, 9, 8, 4, 8, 3, 72, 5, 0, 3, ShipRole::Combat),
            ),
            (
                Battlecruiser,
                spec(12, 10, 10, 5, 10, 4, 96, 6, 0, 3, ShipRole::Combat),
            ),
            (
                Battleship,
                spec(16, 14, 14, 6, 12, 5, 140, 8, 0, 4, ShipRole::Combat),
            ),
            (
                Dreadnought,
                spec(22, 20, 18, 8, 16, 6, 200, 10, 0, 5, ShipRole::Combat),
            ),
            (
                Carrier,
                spec(4, 10, 10, 5, 10, 4, 120, 6, 6, 3, ShipRole::Combat),
            ),
            (
                Supercarrier,
                spec(6, 14, 14, 7, 14, 6, 180, 9, 12, 4, ShipRole::Combat),
            ),
            (Raider, spec(5, 3, 3, 2, 4, 2, 40, 3, 0, 2, ShipRole::Combat)),
            (
                Monitor,
                spec(14, 18, 16, 5, 8, 3, 120, 5, 0, 3, ShipRole::Combat),
            ),
            (Scout, spec(1, 2, 2, 1, 3, 1, 20, 1, 0, 1, ShipRole::Intel)),
            (
                Etac,
                spec(0, 2, 3, 2, 4, 1, 50, 2, 50, 2, ShipRole::Expansion),
            ),
            (
                TroopTransport,
                spec(0, 2, 3, 2, 4, 1, 40, 2, 10, 2, ShipRole::Auxiliary),
            ),
            (
                CargoLifter,
                spec(0, 1, 2, 2, 4, 1, 30, 1, 100, 1, ShipRole::Auxiliary),
            ),
        ];
        Self { entries }
    }
}

// ============================================================================
// Facilities
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FacilitySpec {
    pub attack: i64,
    pub defense: i64,
    pub cost: i64,
    pub upkeep: i64,
    pub docks: i64,
    pub min_cst: u8,
    pub build_turns: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilityConfig {
    pub spaceport: FacilitySpec,
    pub shipyard: FacilitySpec,
    pub drydock: FacilitySpec,
    pub starbase: FacilitySpec,
}

impl FacilityConfig {
    pub fn neoria(&self, class: NeoriaClass) -> &FacilitySpec {
        match class {
            NeoriaClass::Spaceport => &self.spaceport,
            NeoriaClass::Shipyard => &self.shipyard,
            NeoriaClass::Drydock => &self.drydock,
        }
    }
}

impl Default for FacilityConfig {
    fn default() -> Self {
        Self {
            spaceport: FacilitySpec {
                attack: 0,
                defense: 4,
                cost: 125,
                upkeep: 2,
                docks: 1,
                min_cst: 1,
                build_turns: 2,
            },
            shipyard: FacilitySpec {
                attack: 0,
                defense: 6,
                cost: 250,
                upkeep: 5,
                docks: 2,
                min_cst: 2,
                build_turns: 3,
            },
            drydock: FacilitySpec {
                attack: 0,
                defense: 6,
                cost: 200,
                upkeep: 3,
                docks: 2,
                min_cst: 2,
                build_turns: 3,
            },
            starbase: FacilitySpec {
                attack: 12,
                defense: 20,
                cost: 300,
                upkeep: 4,
                docks: 0,
                min_cst: 3,
                build_turns: 4,
            },
        }
    }
}

// ============================================================================
// Ground units
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GroundUnitSpec {
    pub build_cost: i64,
    pub upkeep: i64,
    /// Combat weight in planetary resolution.
    pub strength: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundUnitConfig {
    pub army: GroundUnitSpec,
    pub marine: GroundUnitSpec,
    pub ground_battery: GroundUnitSpec,
    pub planetary_shield: GroundUnitSpec,
}

impl GroundUnitConfig {
    pub fn get(&self, kind: GroundUnitKind) -> &GroundUnitSpec {
        match kind {
            GroundUnitKind::Army => &self.army,
            GroundUnitKind::Marine => &self.marine,
            GroundUnitKind::GroundBattery => &self.ground_battery,
            GroundUnitKind::PlanetaryShield => &self.planetary_shield,
        }
    }
}

impl Default for GroundUnitConfig {
    fn default() -> Self {
        Self {
            army: GroundUnitSpec {
                build_cost: 4,
                upkeep: 1,
                strength: 2,
            },
            marine: GroundUnitSpec {
                build_cost: 6,
                upkeep: 1,
                strength: 3,
            },
            ground_battery: GroundUnitSpec {
                build_cost: 25,
                upkeep: 1,
                strength: 4,
            },
            planetary_shield: GroundUnitSpec {
                build_cost: 25,
                upkeep: 1,
                strength: 0,
            },
        }
    }
}

// ============================================================================
// Combat
// ============================================================================

/// What a maximum natural roll does, beyond its band multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CriticalEffect {
    /// Roll again and keep the better band.
    Reroll,
    /// Add a flat bonus to the damage multiplier.
    BonusMultiplier(Fixed),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TargetingWeights {
    pub raider: u32,
    pub capital: u32,
    pub escort: u32,
    pub fighter: u32,
    pub starbase: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatConfig {
    /// CER bands as `(minimum modified roll, damage multiplier)`, ascending.
    /// A roll below the first band deals no damage.
    pub cer_bands: Vec<(i32, Fixed)>,
    /// Natural roll that counts as a critical hit (2d6 → 12).
    pub critical_natural: i32,
    pub critical_effect: CriticalEffect,
    /// Consecutive no-change rounds before a desperation round.
    pub desperation_trigger: u32,
    /// CER bonus applied to all attackers in a desperation round.
    pub desperation_bonus: i32,
    /// Absolute round ceiling; reaching it forces a stalemate.
    pub max_rounds: u32,
    /// ROE-weighted threat ratio above which a fleet retreats (from round 2).
    pub retreat_threshold: Fixed,
    /// Fraction of incoming damage blocked per SLD level (index 0 = SLD 1).
    pub shield_block: Vec<Fixed>,
    pub targeting: TargetingWeights,
    /// CER modifier from scouts attached to the engagement.
    pub scout_bonus: i32,
    /// CER modifier for the ambushing side in the Ambush sub-phase.
    pub ambush_bonus: i32,
    /// CER modifier for attacking an unaware defender on round 1.
    pub surprise_bonus: i32,
    /// Policy: do embarked fighters absorb carrier hits, or only deploy
    /// before the Fighter sub-phase?
    pub embarked_fighters_absorb_hits: bool,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            cer_bands: vec![
                (5, Fixed::percent(25)),
                (7, Fixed::percent(50)),
                (9, Fixed::percent(75)),
                (11, Fixed::ONE),
            ],
            critical_natural: 12,
            critical_effect: CriticalEffect::BonusMultiplier(Fixed::percent(25)),
            desperation_trigger: 5,
            desperation_bonus: 2,
            max_rounds: 20,
            retreat_threshold: Fixed::from_int(2),
            shield_block: vec![
                Fixed::ZERO,
                Fixed::percent(5),
                Fixed::percent(10),
                Fixed::percent(15),
                Fixed::percent(20),
            ],
            targeting: TargetingWeights {
                raider: 15,
                capital: 30,
                escort: 25,
                fighter: 20,
                starbase: 10,
            },
            scout_bonus: 1,
            ambush_bonus: 2,
            surprise_bonus: 1,
            embarked_fighters_absorb_hits: false,
        }
    }
}

impl CombatConfig {
    /// Damage multiplier for a modified roll (0 below the lowest band).
    pub fn multiplier_for(&self, roll: i32) -> Fixed {
        let mut mult = Fixed::ZERO;
        for &(min, m) in &self.cer_bands {
            if roll >= min {
                mult = m;
            }
        }
        mult
    }

    pub fn shield_block_for(&self, sld_level: u8) -> Fixed {
        let idx = (sld_level.max(1) as usize - 1).min(self.shield_block.len().saturating_sub(1));
        self.shield_block.get(idx).copied().unwrap_or(Fixed::ZERO)
    }
}

// ============================================================================
// Tech
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechConfig {
    /// Research points to advance from level L to L+1: `base·L`.
    pub base_cost: Vec<(TechField, i64)>,
    /// Hard level cap per field.
    pub max_level: u8,
}

impl Default for TechConfig {
    fn default() -> Self {
        Self {
            base_cost: TechField::ALL.iter().map(|&f| (f, 50)).collect(),
            max_level: 10,
        }
    }
}

impl TechConfig {
    pub fn cost_to_advance(&self, field: TechField, current_level: u8) -> i64 {
        let base = self
            .base_cost
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, c)| *c)
            .unwrap_or(50);
        base * current_level as i64
    }
}

// ============================================================================
// Prestige
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrestigeConfig {
    pub combat_victory: i64,
    pub combat_defeat: i64,
    pub colony_founded: i64,
    pub colony_lost: i64,
    pub blockaded_colony_per_turn: i64,
    pub pact_violation: i64,
    pub pact_violation_per_repeat: i64,
    pub espionage_detected: i64,
    pub espionage_success: i64,
    pub house_eliminated_bonus: i64,
}

impl Default for PrestigeConfig {
    fn default() -> Self {
        Self {
            combat_victory: 5,
            combat_defeat: -3,
            colony_founded: 4,
            colony_lost: -6,
            blockaded_colony_per_turn: -2,
            pact_violation: -10,
            pact_violation_per_repeat: -5,
            espionage_detected: -4,
            espionage_success: 2,
            house_eliminated_bonus: 15,
        }
    }
}

// ============================================================================
// Diplomacy
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiplomacyConfig {
    /// Turns a pact violator carries the Dishonored marker.
    pub dishonored_turns: u32,
    /// Turns a violator cannot form new pacts.
    pub isolation_turns: u32,
    /// Cooldown before a broken pact can be re-signed.
    pub pact_reinstatement_turns: u32,
    /// Lookback window for repeat-violation escalation.
    pub violation_window_turns: u32,
    /// Hostile relations with no incident for this long decay to Neutral.
    pub hostility_decay_turns: u32,
}

impl Default for DiplomacyConfig {
    fn default() -> Self {
        Self {
            dishonored_turns: 3,
            isolation_turns: 5,
            pact_reinstatement_turns: 5,
            violation_window_turns: 10,
            hostility_decay_turns: 8,
        }
    }
}

// ============================================================================
// Espionage
// ============================================================================

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum EspionageOp {
    TechTheft,
    SabotageLow,
    SabotageHigh,
    Assassination,
    CyberAttack,
    EconomicManipulation,
    Psyops,
    CounterIntelSweep,
    IntelligenceTheft,
    PlantDisinformation,
}

impl EspionageOp {
    pub const ALL: [EspionageOp; 10] = [
        EspionageOp::TechTheft,
        EspionageOp::SabotageLow,
        EspionageOp::SabotageHigh,
        EspionageOp::Assassination,
        EspionageOp::CyberAttack,
        EspionageOp::EconomicManipulation,
        EspionageOp::Psyops,
        EspionageOp::CounterIntelSweep,
        EspionageOp::IntelligenceTheft,
        EspionageOp::PlantDisinformation,
    ];
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EspionageOpSpec {
    pub ebp_cost: i64,
    /// Added to the defender's detection threshold (harder ops are louder).
    pub detection_modifier: i32,
    /// Generic effect size; interpretation is per-op (IU destroyed, SRP
    /// stolen, turns of corruption...).
    pub magnitude: i64,
    pub attacker_prestige_on_success: i64,
    pub target_prestige_on_success: i64,
    pub attacker_prestige_on_detection: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EspionageConfig {
    pub ops: Vec<(EspionageOp, EspionageOpSpec)>,
    /// Base d100 detection threshold per CIC level (index 0 = CIC 1).
    pub detection_base: Vec<i32>,
    /// Detection bonus per CIP point invested, in d100 points per 10 CIP.
    pub cip_detection_per_ten: i32,
    /// Attacker roll bonus per mesh-network scout above the first (capped).
    pub mesh_bonus_per_scout: i32,
    pub mesh_bonus_cap: i32,
    /// Max operations resolved against one target house per turn.
    pub max_ops_per_target: usize,
    /// Disinformation corruption magnitude range.
    pub disinfo_magnitude_min: i64,
    pub disinfo_magnitude_max: i64,
}

impl Default for EspionageConfig {
    fn default() -> Self {
        use EspionageOp::*;
        let op = |ebp_cost, detection_modifier, magnitude| EspionageOpSpec {
            ebp_cost,
            detection_modifier,
            magnitude,
            attacker_prestige_on_success: 2,
            target_prestige_on_success: -1,
            attacker_prestige_on_detection: -4,
        };
        Self {
            ops: vec![
                (TechTheft, op(40, 10, 25)),
                (SabotageLow, op(20, 0, 5)),
                (SabotageHigh, op(60, 20, 20)),
                (Assassination, op(80, 25, 1)),
                (CyberAttack, op(50, 15, 10)),
                (EconomicManipulation, op(45, 10, 30)),
                (Psyops, op(30, 5, 3)),
                (CounterIntelSweep, op(25, 0, 0)),
                (IntelligenceTheft, op(35, 10, 0)),
                (PlantDisinformation, op(30, 5, 4)),
            ],
            detection_base: vec![30, 40, 50, 60, 70, 80],
            cip_detection_per_ten: 2,
            mesh_bonus_per_scout: 3,
            mesh_bonus_cap: 9,
            max_ops_per_target: 3,
            disinfo_magnitude_min: 2,
            disinfo_magnitude_max: 6,
        }
    }
}

impl EspionageConfig {
    pub fn spec(&self, op: EspionageOp) -> &EspionageOpSpec {
        self.ops
            .iter()
            .find(|(o, _)| *o == op)
            .map(|(_, s)| s)
            .expect("espionage table covers every operation")
    }

    pub fn detection_base_for(&self, cic_level: u8) -> i32 {
        let idx = (cic_level.max(1) as usize - 1).min(self.detection_base.len() - 1);
        self.detection_base[idx]
    }
}

// ============================================================================
// Military limits
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MilitaryConfig {
    /// Capital squadrons: `max(capital_min, ⌊IU/capital_divisor⌋ × map_multiplier)`.
    pub capital_divisor: i64,
    pub capital_min: i64,
    /// Total squadrons: `max(total_min, ⌊IU/total_divisor⌋ × map_multiplier)`.
    pub total_divisor: i64,
    pub total_min: i64,
    pub map_multiplier: Fixed,
    /// Fighters per colony: `⌊IU/fighter_divisor⌋ + fd_bonus_per_level·(FD−1)`.
    pub fighter_divisor: i64,
    pub fighter_min: i64,
    pub fd_bonus_per_level: i64,
    /// Turns of grace before a capacity violation turns critical.
    pub grace_turns: u8,
    /// Upkeep fraction for fleets in Reserve.
    pub reserve_upkeep_fraction: Fixed,
    /// Upkeep fraction for mothballed fleets.
    pub mothball_upkeep_fraction: Fixed,
}

impl Default for MilitaryConfig {
    fn default() -> Self {
        Self {
            capital_divisor: 100,
            capital_min: 10,
            total_divisor: 50,
            total_min: 20,
            map_multiplier: Fixed::ONE,
            fighter_divisor: 20,
            fighter_min: 6,
            fd_bonus_per_level: 2,
            grace_turns: 2,
            reserve_upkeep_fraction: Fixed::HALF,
            mothball_upkeep_fraction: Fixed::percent(25),
        }
    }
}

// ============================================================================
// Gameplay thresholds
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameplayConfig {
    /// Consecutive negative-prestige turns before Defensive Collapse.
    pub defensive_collapse_threshold: u8,
    /// Consecutive missed submissions before Autopilot.
    pub autopilot_threshold: u8,
}

impl Default for GameplayConfig {
    fn default() -> Self {
        Self {
            defensive_collapse_threshold: 3,
            autopilot_threshold: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tables_cover_all_classes() {
        let config = GameConfig::default();
        for class in ShipClass::ALL {
            let spec = config.ships.get(class);
            assert!(spec.build_cost > 0, "{class:?} has no build cost");
        }
        for op in EspionageOp::ALL {
            assert!(config.espionage.spec(op).ebp_cost > 0 || op == EspionageOp::CounterIntelSweep);
        }
    }

    #[test]
    fn scenario_upkeep_values() {
        // The boundary scenarios assume these exact maintenance numbers.
        let config = GameConfig::default();
        assert_eq!(config.ships.get(ShipClass::Destroyer).maintenance, 2);
        assert_eq!(config.ships.get(ShipClass::Corvette).maintenance, 1);
        assert_eq!(config.ships.get(ShipClass::LightCruiser).maintenance, 4);
        assert_eq!(config.facilities.shipyard.upkeep, 5);
    }

    #[test]
    fn cer_band_lookup() {
        let combat = CombatConfig::default();
        assert_eq!(combat.multiplier_for(3), Fixed::ZERO);
        assert_eq!(combat.multiplier_for(5), Fixed::percent(25));
        assert_eq!(combat.multiplier_for(8), Fixed::percent(50));
        assert_eq!(combat.multiplier_for(9), Fixed::percent(75));
        assert_eq!(combat.multiplier_for(12), Fixed::ONE);
    }

    #[test]
    fn shortfall_prestige_saturates() {
        let econ = EconomyConfig::default();
        assert_eq!(econ.shortfall_prestige_for(1), -8);
        assert_eq!(econ.shortfall_prestige_for(2), -11);
        assert_eq!(econ.shortfall_prestige_for(4), -17);
        assert_eq!(econ.shortfall_prestige_for(9), -17);
    }

    #[test]
    fn content_hash_is_stable_and_sensitive() {
        let a = GameConfig::default();
        let b = GameConfig::default();
        assert_eq!(a.content_hash(), b.content_hash());

        let mut c = GameConfig::default();
        c.military.capital_min = 11;
        assert_ne!(a.content_hash(), c.content_hash());
    }
}
