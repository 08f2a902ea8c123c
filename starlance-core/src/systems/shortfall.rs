//! Maintenance-shortfall cascade.
//!
//! When a house cannot cover upkeep the engine liquidates assets in a
//! prescribed order until the gap closes or nothing liquidatable remains.
//! The algorithm is a pure plan (`process_shortfall`) plus an explicit
//! commit (`apply_shortfall_cascade`): the plan describes every intended
//! liquidation without touching state, the apply mutates and emits one
//! event per disbanded fleet or stripped asset.

use crate::config::GameConfig;
use crate::entities::{GroundUnitKind, NeoriaClass, SquadronKind};
use crate::events::{EventLog, EventPayload, StrippedAsset};
use crate::fixed::Fixed;
use crate::ids::*;
use crate::state::GameState;
use serde::{Deserialize, Serialize};

/// Disband priority tiers; lower disbands first.
const PRIORITY_SCOUT: u32 = 100;
const PRIORITY_COMBAT: u32 = 500;
const PRIORITY_EXPANSION: u32 = 900;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedStrip {
    pub colony: ColonyId,
    pub asset: StrippedAsset,
    /// PP recovered by the strip.
    pub value: i64,
    /// Entity being removed, when the asset is an entity.
    pub neoria: Option<NeoriaId>,
    pub kastra: Option<KastraId>,
    pub ground_unit: Option<GroundUnitId>,
}

/// The full liquidation plan for one house, one turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortfallCascade {
    pub house: HouseId,
    /// Whether the house actually entered cascade (insolvent at entry).
    pub entered: bool,
    pub upkeep_due: i64,
    /// Treasury consumed by step 1 (never negative).
    pub treasury_consumed: i64,
    pub cancelled_projects: Vec<ConstructionProjectId>,
    pub cancelled_repairs: Vec<RepairProjectId>,
    pub disbanded_fleets: Vec<(FleetId, i64)>,
    pub stripped: Vec<PlannedStrip>,
    pub prestige_penalty: i64,
    /// Gap left after exhausting every liquidatable category.
    pub remaining_gap: i64,
}

fn fleet_priority(state: &GameState, fleet: FleetId) -> u32 {
    let squadrons = state.squadrons_of(fleet);
    if squadrons.is_empty() {
        return PRIORITY_COMBAT;
    }
    let kinds: Vec<SquadronKind> = squadrons
        .iter()
        .filter_map(|&s| state.squadron(s))
        .map(|s| s.kind)
        .collect();
    if kinds.iter().all(|&k| k == SquadronKind::Intel) {
        PRIORITY_SCOUT
    } else if kinds
        .iter()
        .any(|&k| matches!(k, SquadronKind::Expansion | SquadronKind::Auxiliary))
    {
        PRIORITY_EXPANSION
    } else {
        PRIORITY_COMBAT
    }
}

fn fleet_build_cost(state: &GameState, fleet: FleetId, config: &GameConfig) -> i64 {
    state
        .squadrons_of(fleet)
        .iter()
        .filter_map(|&s| state.squadron(s))
        .flat_map(|s| {
            s.all_ships()
                .chain(s.embarked_fighters.iter().copied())
                .collect::<Vec<_>>()
        })
        .filter_map(|ship| state.ship(ship))
        .map(|ship| config.ships.get(ship.class).build_cost)
        .sum()
}

/// Build the liquidation plan. Pure: reads state, mutates nothing.
///
/// `upkeep_due` is the maintenance bill the house faces this turn.
pub fn process_shortfall(
    state: &GameState,
    house: HouseId,
    upkeep_due: i64,
    config: &GameConfig,
) -> ShortfallCascade {
    let treasury = state.house(house).map(|h| h.treasury).unwrap_or(0);
    let consecutive = state
        .house(house)
        .map(|h| h.consecutive_shortfalls)
        .unwrap_or(0);

    let mut cascade = ShortfallCascade {
        house,
        entered: treasury < upkeep_due,
        upkeep_due,
        treasury_consumed: treasury.max(0),
        cancelled_projects: Vec::new(),
        cancelled_repairs: Vec::new(),
        disbanded_fleets: Vec::new(),
        stripped: Vec::new(),
        prestige_penalty: 0,
        remaining_gap: 0,
    };
    if !cascade.entered {
        cascade.treasury_consumed = 0;
        return cascade;
    }

    // Step 1: the treasury empties into the bill
    let mut remaining = upkeep_due - treasury.max(0);

    // Step 2: every project dies, no refund (spent PP stays spent)
    for colony in state.colonies_owned(house) {
        cascade.cancelled_projects.extend(state.projects_at(colony));
        if let Some(col) = state.colony(colony) {
            cascade.cancelled_repairs.extend(col.repair_queue.iter().copied());
        }
    }
    cascade.cancelled_projects.sort();
    cascade.cancelled_repairs.sort();

    // Step 3: fleets by priority tier, ascending ID within a tier
    let mut fleets: Vec<(u32, FleetId)> = state
        .fleets_owned(house)
        .into_iter()
        .map(|f| (fleet_priority(state, f), f))
        .collect();
    fleets.sort();
    for (_, fleet) in fleets {
        if remaining <= 0 {
            break;
        }
        let build_cost = fleet_build_cost(state, fleet, config);
        let salvage = (Fixed::from_int(build_cost) * config.economy.fleet_salvage_fraction).to_int();
        cascade.disbanded_fleets.push((fleet, salvage));
        remaining -= salvage;
    }

    // Step 4: infrastructure, category by category
    if remaining > 0 {
        plan_strips(state, house, config, &mut remaining, &mut cascade);
    }

    // Step 5: prestige penalty scales with the consecutive count including
    // this turn
    cascade.prestige_penalty = config.economy.shortfall_prestige_for(consecutive + 1);
    cascade.remaining_gap = remaining.max(0);
    cascade
}

fn plan_strips(
    state: &GameState,
    house: HouseId,
    config: &GameConfig,
    remaining: &mut i64,
    cascade: &mut ShortfallCascade,
) {
    let colonies = state.colonies_owned(house);

    // IU first, one PP apiece
    for &colony in &colonies {
        let Some(col) = state.colony(colony) else {
            continue;
        };
        let mut industry = col.industry;
        while *remaining > 0 && industry > 0 {
            industry -= 1;
            *remaining -= config.construction.iu_cost;
            cascade.stripped.push(PlannedStrip {
                colony,
                asset: StrippedAsset::IndustrialUnit,
                value: config.construction.iu_cost,
                neoria: None,
                kastra: None,
                ground_unit: None,
            });
        }
        if *remaining <= 0 {
            return;
        }
    }

    // Facilities by category
    for (class, asset) in [
        (NeoriaClass::Spaceport, StrippedAsset::Spaceport),
        (NeoriaClass::Shipyard, StrippedAsset::Shipyard),
    ] {
        for &colony in &colonies {
            for neoria_id in state.neorias_at(colony) {
                if *remaining <= 0 {
                    return;
                }
                let Some(neoria) = state.neoria(neoria_id) else {
                    continue;
                };
                if neoria.class != class {
                    continue;
                }
                let value = config.facilities.neoria(class).cost;
                *remaining -= value;
                cascade.stripped.push(PlannedStrip {
                    colony,
                    asset,
                    value,
                    neoria: Some(neoria_id),
                    kastra: None,
                    ground_unit: None,
                });
            }
        }
    }

    // Starbases
    for &colony in &colonies {
        for kastra_id in state.kastras_at(colony) {
            if *remaining <= 0 {
                return;
            }
            let value = config.facilities.starbase.cost;
            *remaining -= value;
            cascade.stripped.push(PlannedStrip {
                colony,
                asset: StrippedAsset::Starbase,
                value,
                neoria: None,
                kastra: Some(kastra_id),
                ground_unit: None,
            });
        }
    }

    // Ground forces, cheapest defensive value last
    for kind in [
        GroundUnitKind::GroundBattery,
        GroundUnitKind::Army,
        GroundUnitKind::Marine,
        GroundUnitKind::PlanetaryShield,
    ] {
        for &colony in &colonies {
            for unit_id in state.ground_units_at(colony) {
                if *remaining <= 0 {
                    return;
                }
                let Some(unit) = state.ground_unit(unit_id) else {
                    continue;
                };
                if unit.kind != kind {
                    continue;
                }
                let value = config.ground_units.get(kind).build_cost;
                *remaining -= value;
                cascade.stripped.push(PlannedStrip {
                    colony,
                    asset: StrippedAsset::GroundUnit(kind),
                    value,
                    neoria: None,
                    kastra: None,
                    ground_unit: Some(unit_id),
                });
            }
        }
    }
}

/// Commit a plan: zero the treasury, cancel projects, disband fleets,
/// strip assets, apply the prestige penalty. The treasury ends holding
/// exactly the salvage and strip recoveries.
pub fn apply_shortfall_cascade(
    state: &mut GameState,
    cascade: &ShortfallCascade,
    events: &mut EventLog,
) {
    if !cascade.entered {
        return;
    }
    let turn = state.turn;
    let house = cascade.house;

    if let Some(h) = state.house_mut(house) {
        h.treasury = 0;
    }

    for &project in &cascade.cancelled_projects {
        let colony = state.construction_project(project).map(|p| p.colony);
        if state.del_construction_project(project).is_ok() {
            events.emit(
                turn,
                Some(house),
                None,
                None,
                format!("{project} cancelled by maintenance shortfall"),
                EventPayload::ConstructionCancelled {
                    colony_id: colony.unwrap_or(ColonyId::NULL),
                    project_id: project,
                },
            );
        }
    }
    for &repair in &cascade.cancelled_repairs {
        let _ = state.del_repair_project(repair);
    }

    let mut recovered = 0i64;

    for &(fleet, salvage) in &cascade.disbanded_fleets {
        for squadron in state.squadrons_of(fleet) {
            let _ = state.del_squadron(squadron);
        }
        if state.del_fleet(fleet).is_ok() {
            recovered += salvage;
            events.emit(
                turn,
                Some(house),
                None,
                Some(fleet),
                format!("{fleet} disbanded for {salvage} PP salvage"),
                EventPayload::FleetDisbanded { salvage },
            );
        }
    }

    for strip in &cascade.stripped {
        let committed = match strip.asset {
            StrippedAsset::IndustrialUnit => {
                if let Some(col) = state.colony_mut(strip.colony) {
                    if col.industry > 0 {
                        col.industry -= 1;
                        true
                    } else {
                        false
                    }
                } else {
                    false
                }
            }
            StrippedAsset::Spaceport | StrippedAsset::Shipyard | StrippedAsset::Drydock => strip
                .neoria
                .is_some_and(|n| state.del_neoria(n).is_ok()),
            StrippedAsset::Starbase => strip.kastra.is_some_and(|k| state.del_kastra(k).is_ok()),
            StrippedAsset::GroundUnit(_) => strip
                .ground_unit
                .is_some_and(|g| state.del_ground_unit(g).is_ok()),
        };
        if committed {
            recovered += strip.value;
            events.emit(
                turn,
                Some(house),
                None,
                None,
                format!("{:?} stripped at {} for {} PP", strip.asset, strip.colony, strip.value),
                EventPayload::AssetStripped {
                    colony_id: strip.colony,
                    asset: strip.asset,
                    recovered: strip.value,
                },
            );
        }
    }

    if let Some(h) = state.house_mut(house) {
        h.treasury = recovered;
        h.prestige += cascade.prestige_penalty;
        h.consecutive_shortfalls += 1;
    }

    events.emit(
        turn,
        Some(house),
        None,
        None,
        format!(
            "maintenance shortfall: {} PP unpaid, {} PP recovered",
            cascade.remaining_gap, recovered
        ),
        EventPayload::ResourceWarning {
            shortfall: cascade.remaining_gap,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ShipClass;
    use crate::ids::SystemId;
    use crate::systems::economy::total_upkeep;
    use crate::testing::{test_config, GameStateBuilder};

    /// Insolvent house: treasury 0, one shipyard (upkeep 5), a Destroyer (2)
    /// and a Light Cruiser (4), one shortfall already on the books.
    fn insolvent_house() -> (GameState, ColonyId, FleetId) {
        let mut builder = GameStateBuilder::new().with_house("Atreides").with_line_map(2);
        let colony = builder.add_colony(HouseId(1), SystemId(1), 100);
        builder.add_neoria(colony, NeoriaClass::Shipyard);
        let fleet = builder.add_fleet(HouseId(1), SystemId(1));
        builder.add_squadron(fleet, ShipClass::LightCruiser, &[ShipClass::Destroyer]);
        let state = builder.state_mut();
        let house = state.house_mut(HouseId(1)).unwrap();
        house.treasury = 0;
        house.consecutive_shortfalls = 1;
        (builder.build(), colony, fleet)
    }

    #[test]
    fn cascade_plan_liquidates_the_combat_fleet_first() {
        let config = test_config();
        let (state, _, fleet) = insolvent_house();
        let upkeep = total_upkeep(&state, HouseId(1), &config);
        assert_eq!(upkeep, 11); // 5 shipyard + 2 destroyer + 4 light cruiser

        let cascade = process_shortfall(&state, HouseId(1), upkeep, &config);
        assert!(cascade.entered);
        // The combat fleet goes first: salvage 25% of (48 + 32) = 20
        assert_eq!(cascade.disbanded_fleets, vec![(fleet, 20)]);
        // 20 PP salvage covers the 11 PP bill; nothing gets stripped
        assert!(cascade.stripped.is_empty());
        assert_eq!(cascade.remaining_gap, 0);
        // Second consecutive shortfall penalty
        assert_eq!(cascade.prestige_penalty, -11);
    }

    #[test]
    fn apply_leaves_salvage_as_treasury() {
        let config = test_config();
        let (mut state, _, fleet) = insolvent_house();
        let upkeep = total_upkeep(&state, HouseId(1), &config);
        let cascade = process_shortfall(&state, HouseId(1), upkeep, &config);
        let mut events = EventLog::default();
        apply_shortfall_cascade(&mut state, &cascade, &mut events);

        let house = state.house(HouseId(1)).unwrap();
        assert_eq!(house.treasury, 20);
        assert_eq!(house.prestige, -11);
        assert_eq!(house.consecutive_shortfalls, 2);
        assert!(state.fleet(fleet).is_none());
        state.validate_invariants(&config).unwrap();
    }

    #[test]
    fn scout_fleets_disband_before_combat_before_expansion() {
        let config = test_config();
        let mut builder = GameStateBuilder::new().with_house("Atreides").with_line_map(2);
        builder.add_colony(HouseId(1), SystemId(1), 50);
        let combat = builder.add_fleet(HouseId(1), SystemId(1));
        builder.add_squadron(combat, ShipClass::Destroyer, &[]);
        let scouts = builder.add_fleet(HouseId(1), SystemId(1));
        builder.add_squadron(scouts, ShipClass::Scout, &[]);
        let expansion = builder.add_fleet(HouseId(1), SystemId(1));
        builder.add_squadron(expansion, ShipClass::Etac, &[]);
        builder.state_mut().house_mut(HouseId(1)).unwrap().treasury = 0;
        let state = builder.build();

        // A bill no single fleet's salvage covers forces full liquidation order
        let cascade = process_shortfall(&state, HouseId(1), 40, &config);
        let order: Vec<FleetId> = cascade.disbanded_fleets.iter().map(|&(f, _)| f).collect();
        assert_eq!(order, vec![scouts, combat, expansion]);
    }

    #[test]
    fn strip_order_follows_prescribed_sequence() {
        let config = test_config();
        let mut builder = GameStateBuilder::new().with_house("Atreides").with_line_map(2);
        let colony = builder.add_colony(HouseId(1), SystemId(1), 50);
        builder.state_mut().colony_mut(colony).unwrap().industry = 2;
        builder.add_neoria(colony, NeoriaClass::Spaceport);
        builder.add_neoria(colony, NeoriaClass::Shipyard);
        builder.add_kastra(colony);
        builder.add_ground_unit(HouseId(1), colony, GroundUnitKind::Army);
        builder.add_ground_unit(HouseId(1), colony, GroundUnitKind::GroundBattery);
        builder.state_mut().house_mut(HouseId(1)).unwrap().treasury = 0;
        let state = builder.build();

        // Enormous bill: everything must be planned, in order
        let cascade = process_shortfall(&state, HouseId(1), 10_000, &config);
        let assets: Vec<StrippedAsset> = cascade.stripped.iter().map(|s| s.asset).collect();
        assert_eq!(
            assets,
            vec![
                StrippedAsset::IndustrialUnit,
                StrippedAsset::IndustrialUnit,
                StrippedAsset::Spaceport,
                StrippedAsset::Shipyard,
                StrippedAsset::Starbase,
                StrippedAsset::GroundUnit(GroundUnitKind::GroundBattery),
                StrippedAsset::GroundUnit(GroundUnitKind::Army),
            ]
        );
        assert!(cascade.remaining_gap > 0);
    }

    #[test]
    fn solvent_house_never_enters_cascade() {
        let config = test_config();
        let (mut state, _, _) = insolvent_house();
        state.house_mut(HouseId(1)).unwrap().treasury = 50;
        let cascade = process_shortfall(&state, HouseId(1), 11, &config);
        assert!(!cascade.entered);
        assert!(cascade.disbanded_fleets.is_empty());

        // Applying a non-entered cascade is a no-op
        let hash_before = state.state_hash();
        let mut events = EventLog::default();
        apply_shortfall_cascade(&mut state, &cascade, &mut events);
        assert_eq!(state.state_hash(), hash_before);
    }

    #[test]
    fn cascade_terminates_even_when_unpayable() {
        let config = test_config();
        let mut builder = GameStateBuilder::new().with_house("Atreides").with_line_map(2);
        builder.add_colony(HouseId(1), SystemId(1), 10);
        builder.state_mut().house_mut(HouseId(1)).unwrap().treasury = 0;
        let state = builder.build();

        let cascade = process_shortfall(&state, HouseId(1), 1_000, &config);
        assert!(cascade.entered);
        assert_eq!(cascade.remaining_gap, 1_000);
    }
}
