//! Construction, repair, and the cross-turn commissioning pipeline.
//!
//! Orders validate and debit at submission (Command phase); queues advance
//! one turn during Maintenance, with dock capacity bounding how many ship
//! projects progress concurrently per colony; completed ships land in
//! `pending_commissions` and are drained by Unified Commissioning at the
//! start of the next turn's Command phase, before any automation or new
//! build order.

use crate::config::GameConfig;
use crate::entities::{
    BuildTarget, FacilityState, FleetStatus, GroundUnitSite, NeoriaClass, RepairSubject, ShipClass,
};
use crate::events::{EventLog, EventPayload};
use crate::fixed::Fixed;
use crate::ids::*;
use crate::input::{BuildOrder, FleetCommand, RepairOrder, ScrapOrder};
use crate::state::{GameState, PendingCommission};

// ============================================================================
// Dock capacity
// ============================================================================

/// Concurrent ship-project slots: `Σ facility docks × (1 + CST bonus)`.
/// Crippled docks contribute nothing.
pub fn dock_capacity(state: &GameState, colony: ColonyId, config: &GameConfig) -> i64 {
    let Some(col) = state.colony(colony) else {
        return 0;
    };
    let cst = state.house(col.owner).map(|h| h.tech.cst).unwrap_or(1);
    let bonus = Fixed::ONE + config.construction.dock_cst_bonus * Fixed::from_int(cst.max(1) as i64 - 1);
    let docks: i64 = col
        .neorias
        .iter()
        .filter_map(|&n| state.neoria(n))
        .filter(|n| n.state == FacilityState::Undamaged)
        .map(|n| config.facilities.neoria(n.class).docks)
        .sum();
    (Fixed::from_int(docks) * bonus).to_int()
}

/// Dock choice for a ship order: shipyards build at list price, spaceports
/// at the configured penalty; fighters cost list anywhere.
fn pick_dock(
    state: &GameState,
    colony: ColonyId,
    class: ShipClass,
    preferred: Option<NeoriaId>,
    config: &GameConfig,
) -> Result<(NeoriaId, i64), String> {
    let base_cost = config.ships.get(class).build_cost;
    let price_at = |neoria_class: NeoriaClass| -> Option<i64> {
        match neoria_class {
            NeoriaClass::Shipyard => Some(base_cost),
            NeoriaClass::Spaceport => {
                if class == ShipClass::Fighter {
                    Some(base_cost)
                } else {
                    Some((Fixed::from_int(base_cost) * config.construction.spaceport_penalty).to_int())
                }
            }
            NeoriaClass::Drydock => None, // Repair only
        }
    };

    if let Some(id) = preferred {
        let neoria = state
            .neoria(id)
            .filter(|n| n.colony == colony && n.state == FacilityState::Undamaged)
            .ok_or_else(|| format!("{id} is not a functioning dock at this colony"))?;
        return price_at(neoria.class)
            .map(|cost| (id, cost))
            .ok_or_else(|| "drydocks cannot lay new hulls".to_string());
    }

    // Cheapest legal dock, ties to lowest ID
    state
        .neorias_at(colony)
        .into_iter()
        .filter_map(|id| {
            let neoria = state.neoria(id)?;
            if neoria.state != FacilityState::Undamaged {
                return None;
            }
            price_at(neoria.class).map(|cost| (cost, id))
        })
        .min()
        .map(|(cost, id)| (id, cost))
        .ok_or_else(|| "no functioning production dock at colony".to_string())
}

// ============================================================================
// Order validation and start
// ============================================================================

/// Validate a build order and return `(cost, facility, turns)`.
pub fn validate_build(
    state: &GameState,
    house: HouseId,
    order: &BuildOrder,
    config: &GameConfig,
) -> Result<(i64, Option<NeoriaId>, u32), String> {
    let colony = state
        .colony(order.colony)
        .ok_or_else(|| format!("colony {} does not exist", order.colony))?;
    if colony.owner != house {
        return Err("colony is not yours".into());
    }
    let tech = state
        .house(house)
        .map(|h| h.tech)
        .ok_or_else(|| "house missing".to_string())?;
    let treasury = state.house(house).map(|h| h.treasury).unwrap_or(0);

    let (cost, facility, turns) = match order.target {
        BuildTarget::Ship(class) => {
            let spec = config.ships.get(class);
            if tech.cst < spec.min_cst {
                return Err(format!(
                    "{class:?} requires CST {}, have {}",
                    spec.min_cst, tech.cst
                ));
            }
            if tech.sl < spec.tech_level {
                return Err(format!(
                    "{class:?} requires SL {}, have {}",
                    spec.tech_level, tech.sl
                ));
            }
            let (dock, cost) = pick_dock(state, order.colony, class, order.facility, config)?;
            (cost, Some(dock), spec.build_turns)
        }
        BuildTarget::Neoria(class) => {
            let spec = config.facilities.neoria(class);
            if tech.cst < spec.min_cst {
                return Err(format!("{class:?} requires CST {}", spec.min_cst));
            }
            (spec.cost, None, spec.build_turns)
        }
        BuildTarget::Kastra => {
            let spec = &config.facilities.starbase;
            if tech.cst < spec.min_cst {
                return Err(format!("starbase requires CST {}", spec.min_cst));
            }
            if config.construction.shipyard_required_for_starbase {
                let has_yard = colony
                    .neorias
                    .iter()
                    .filter_map(|&n| state.neoria(n))
                    .any(|n| n.class == NeoriaClass::Shipyard && n.state == FacilityState::Undamaged);
                if !has_yard {
                    return Err("starbase requires a functioning shipyard".into());
                }
            }
            (spec.cost, None, spec.build_turns)
        }
        BuildTarget::IndustrialUnits(count) => {
            if count <= 0 {
                return Err("IU order must be positive".into());
            }
            (
                count * config.construction.iu_cost,
                None,
                config.construction.ground_build_turns,
            )
        }
        BuildTarget::GroundUnit(kind) => (
            config.ground_units.get(kind).build_cost,
            None,
            config.construction.ground_build_turns,
        ),
        BuildTarget::Terraform => {
            if tech.ter < config.construction.terraform_min_ter {
                return Err(format!(
                    "terraforming requires TER {}",
                    config.construction.terraform_min_ter
                ));
            }
            let system = state
                .map
                .system(colony.system)
                .ok_or_else(|| "colony system missing".to_string())?;
            if system.planet_class.improved().is_none() {
                return Err("planet class cannot improve further".into());
            }
            (
                config.construction.terraform_cost,
                None,
                config.construction.terraform_turns,
            )
        }
    };

    if treasury < cost {
        return Err(format!("costs {cost} PP, treasury has {treasury}"));
    }
    Ok((cost, facility, turns))
}

/// Debit and enqueue a validated order.
pub fn start_build(
    state: &mut GameState,
    house: HouseId,
    order: &BuildOrder,
    cost: i64,
    facility: Option<NeoriaId>,
    turns: u32,
    events: &mut EventLog,
) -> ConstructionProjectId {
    if let Some(h) = state.house_mut(house) {
        h.treasury -= cost;
    }
    let project = state.add_construction_project(order.colony, facility, order.target, cost, turns);
    let turn = state.turn;
    events.emit(
        turn,
        Some(house),
        None,
        None,
        format!("construction of {:?} started at {}", order.target, order.colony),
        EventPayload::ConstructionStarted {
            colony_id: order.colony,
            project_id: project,
            target: order.target,
            cost,
        },
    );
    project
}

pub fn validate_repair(
    state: &GameState,
    house: HouseId,
    order: &RepairOrder,
    config: &GameConfig,
) -> Result<(i64, NeoriaId), String> {
    let colony = state
        .colony(order.colony)
        .ok_or_else(|| format!("colony {} does not exist", order.colony))?;
    if colony.owner != house {
        return Err("colony is not yours".into());
    }
    let dock = colony
        .neorias
        .iter()
        .copied()
        .filter(|&n| {
            state.neoria(n).is_some_and(|neoria| {
                neoria.state == FacilityState::Undamaged
                    && matches!(neoria.class, NeoriaClass::Drydock | NeoriaClass::Shipyard)
            })
        })
        .min()
        .ok_or_else(|| "repairs need a functioning drydock or shipyard".to_string())?;

    let cost = match order.subject {
        RepairSubject::Ship(ship_id) => {
            let ship = state
                .ship(ship_id)
                .ok_or_else(|| format!("{ship_id} does not exist"))?;
            if ship.owner != house {
                return Err("ship is not yours".into());
            }
            if !ship.crippled {
                return Err("ship is not crippled".into());
            }
            config.ships.get(ship.class).build_cost / 4
        }
        RepairSubject::Kastra(kastra_id) => {
            let kastra = state
                .kastra(kastra_id)
                .ok_or_else(|| format!("{kastra_id} does not exist"))?;
            if kastra.colony != order.colony {
                return Err("starbase is not at this colony".into());
            }
            if kastra.state != FacilityState::Crippled {
                return Err("starbase is not crippled".into());
            }
            config.facilities.starbase.cost / 4
        }
    };
    let treasury = state.house(house).map(|h| h.treasury).unwrap_or(0);
    if treasury < cost {
        return Err(format!("repair costs {cost} PP, treasury has {treasury}"));
    }
    Ok((cost, dock))
}

pub fn start_repair(
    state: &mut GameState,
    house: HouseId,
    order: &RepairOrder,
    cost: i64,
    dock: NeoriaId,
) -> RepairProjectId {
    if let Some(h) = state.house_mut(house) {
        h.treasury -= cost;
    }
    state.add_repair_project(order.colony, dock, order.subject, cost, 1)
}

/// Voluntary scrapping at an owned colony; recovers the salvage fraction.
pub fn execute_scrap(
    state: &mut GameState,
    house: HouseId,
    order: &ScrapOrder,
    config: &GameConfig,
    events: &mut EventLog,
) -> Result<(), String> {
    let fraction = config.economy.fleet_salvage_fraction;
    let turn = state.turn;
    match *order {
        ScrapOrder::Ship(ship_id) => {
            let ship = state
                .ship(ship_id)
                .ok_or_else(|| format!("{ship_id} does not exist"))?;
            if ship.owner != house {
                return Err("ship is not yours".into());
            }
            let squadron = ship.squadron;
            let value = (Fixed::from_int(config.ships.get(ship.class).build_cost) * fraction).to_int();
            // The flagship cannot be scrapped out from under its squadron
            if !squadron.is_null()
                && state.squadron(squadron).is_some_and(|s| s.flagship == ship_id)
            {
                return Err("scrap the squadron to retire its flagship".into());
            }
            state.del_ship(ship_id).map_err(|e| e.to_string())?;
            if let Some(h) = state.house_mut(house) {
                h.treasury += value;
            }
            Ok(())
        }
        ScrapOrder::Squadron(squadron_id) => {
            let squadron = state
                .squadron(squadron_id)
                .ok_or_else(|| format!("{squadron_id} does not exist"))?;
            if squadron.owner != house {
                return Err("squadron is not yours".into());
            }
            let fleet = squadron.fleet;
            let value: i64 = squadron
                .all_ships()
                .filter_map(|s| state.ship(s))
                .map(|s| (Fixed::from_int(config.ships.get(s.class).build_cost) * fraction).to_int())
                .sum();
            state.del_squadron(squadron_id).map_err(|e| e.to_string())?;
            if state.squadrons_of(fleet).is_empty() && state.fleet(fleet).is_some() {
                let _ = state.del_fleet(fleet);
            }
            if let Some(h) = state.house_mut(house) {
                h.treasury += value;
            }
            events.emit(
                turn,
                Some(house),
                None,
                None,
                format!("{squadron_id} scrapped for {value} PP"),
                EventPayload::SquadronScrapped {
                    squadron_id,
                    salvage: value,
                },
            );
            Ok(())
        }
        ScrapOrder::Fleet(fleet_id) => {
            let fleet = state
                .fleet(fleet_id)
                .ok_or_else(|| format!("{fleet_id} does not exist"))?;
            if fleet.owner != house {
                return Err("fleet is not yours".into());
            }
            let mut value = 0i64;
            for squadron in state.squadrons_of(fleet_id) {
                if let Some(s) = state.squadron(squadron) {
                    value += s
                        .all_ships()
                        .filter_map(|ship| state.ship(ship))
                        .map(|ship| {
                            (Fixed::from_int(config.ships.get(ship.class).build_cost) * fraction)
                                .to_int()
                        })
                        .sum::<i64>();
                }
                let _ = state.del_squadron(squadron);
            }
            state.del_fleet(fleet_id).map_err(|e| e.to_string())?;
            if let Some(h) = state.house_mut(house) {
                h.treasury += value;
            }
            events.emit(
                turn,
                Some(house),
                None,
                Some(fleet_id),
                format!("{fleet_id} scrapped for {value} PP"),
                EventPayload::FleetDisbanded { salvage: value },
            );
            Ok(())
        }
    }
}

// ============================================================================
// Queue advancement (Maintenance)
// ============================================================================

/// Advance every colony's queues one turn. Ship projects advance only
/// while they hold one of the colony's dock slots (queue order); ground
/// projects always advance. Completed ships move to `pending_commissions`.
pub fn advance_queues(state: &mut GameState, config: &GameConfig, events: &mut EventLog) {
    for colony_id in state.colonies.ids_sorted() {
        let Some(colony) = state.colony(colony_id) else {
            continue;
        };
        let owner = colony.owner;
        let slots = dock_capacity(state, colony_id, config);
        let queue = colony.construction_queue.clone();

        let mut dock_slots_used = 0i64;
        let mut completed: Vec<ConstructionProjectId> = Vec::new();
        for project_id in queue {
            let Some(project) = state.construction_project(project_id) else {
                continue;
            };
            let uses_dock = project.facility.is_some();
            if uses_dock {
                if dock_slots_used >= slots {
                    continue; // Stalled behind the dock limit; stays queued
                }
                dock_slots_used += 1;
            }
            if let Some(p) = state.construction_project_mut(project_id) {
                p.turns_remaining = p.turns_remaining.saturating_sub(1);
                if p.turns_remaining == 0 {
                    completed.push(project_id);
                }
            }
        }

        for project_id in completed {
            complete_project(state, owner, colony_id, project_id, events);
        }

        // Repairs: one turn each, bounded only by existence of the dock
        let repairs = state
            .colony(colony_id)
            .map(|c| c.repair_queue.clone())
            .unwrap_or_default();
        for repair_id in repairs {
            let done = {
                let Some(r) = state.repair_projects.get_mut(repair_id) else {
                    continue;
                };
                r.turns_remaining = r.turns_remaining.saturating_sub(1);
                r.turns_remaining == 0
            };
            if done {
                let subject = state.repair_project(repair_id).map(|r| r.subject);
                match subject {
                    Some(RepairSubject::Ship(ship)) => {
                        if let Some(s) = state.ship_mut(ship) {
                            s.crippled = false;
                        }
                    }
                    Some(RepairSubject::Kastra(kastra)) => {
                        if let Some(k) = state.kastra_mut(kastra) {
                            k.state = FacilityState::Undamaged;
                        }
                    }
                    None => {}
                }
                let _ = state.del_repair_project(repair_id);
            }
        }
    }
}

fn complete_project(
    state: &mut GameState,
    owner: HouseId,
    colony: ColonyId,
    project_id: ConstructionProjectId,
    events: &mut EventLog,
) {
    let Some(project) = state.construction_project(project_id).cloned() else {
        return;
    };
    let turn = state.turn;
    match project.target {
        BuildTarget::Ship(class) => {
            let ship = state.add_ship(owner, class);
            state.pending_commissions.push(PendingCommission { colony, ship });
        }
        BuildTarget::Neoria(class) => {
            state.add_neoria(colony, class);
        }
        BuildTarget::Kastra => {
            state.add_kastra(colony);
        }
        BuildTarget::IndustrialUnits(count) => {
            if let Some(c) = state.colony_mut(colony) {
                c.industry += count;
            }
        }
        BuildTarget::GroundUnit(kind) => {
            state.add_ground_unit(owner, kind, GroundUnitSite::Colony(colony));
        }
        BuildTarget::Terraform => {
            let system = state.colony(colony).map(|c| c.system);
            if let Some(sys) = system {
                if let Some(improved) = state
                    .map
                    .system(sys)
                    .and_then(|s| s.planet_class.improved())
                {
                    state.map.set_planet_class(sys, improved);
                }
            }
            events.emit(
                turn,
                Some(owner),
                system,
                None,
                format!("terraforming of {colony} complete"),
                EventPayload::TerraformComplete { colony_id: colony },
            );
        }
    }
    let _ = state.del_construction_project(project_id);
}

// ============================================================================
// Unified commissioning (Command phase, before automation and new builds)
// ============================================================================

/// A fleet accepts reinforcements while stationary under no orders, Hold,
/// a Guard command, or a Patrol of its own system. Reserve and Mothballed
/// fleets never do.
fn accepts_reinforcements(fleet: &crate::entities::Fleet) -> bool {
    if fleet.status != FleetStatus::Active || !fleet.is_stationary() {
        return false;
    }
    match fleet.command {
        None | Some(FleetCommand::Hold)
        | Some(FleetCommand::GuardColony)
        | Some(FleetCommand::GuardStarbase) => true,
        Some(FleetCommand::Patrol { system }) => system == fleet.location,
        _ => false,
    }
}

/// Drain `pending_commissions` in (colony, ship) order. Non-fighter hulls
/// join or form squadrons in stationary fleets at the build system;
/// fighters land in the hangar, or aboard a carrier when the colony's
/// `auto_load_fighters` is set.
pub fn commission_pending(state: &mut GameState, config: &GameConfig, events: &mut EventLog) {
    let mut pending = std::mem::take(&mut state.pending_commissions);
    pending.sort_by_key(|p| (p.colony, p.ship));
    let turn = state.turn;

    for commission in pending {
        let Some(colony) = state.colony(commission.colony) else {
            // Colony fell before commissioning: the hull is lost
            let _ = state.del_ship(commission.ship);
            continue;
        };
        let owner = colony.owner;
        let system = colony.system;
        let auto_load = colony.automation.auto_load_fighters;
        let Some(ship) = state.ship(commission.ship) else {
            continue;
        };
        let class = ship.class;
        // A hull on the slipway falls with the colony: it belongs to
        // whoever owns the yard at commissioning time
        if ship.owner != owner {
            if let Some(s) = state.ship_mut(commission.ship) {
                s.owner = owner;
            }
        }

        if class == ShipClass::Fighter {
            let loaded =
                auto_load && load_fighter_on_carrier(state, owner, system, commission.ship, config);
            if !loaded {
                if let Some(c) = state.colony_mut(commission.colony) {
                    c.fighters.push(commission.ship);
                    c.fighters.sort();
                }
            }
        } else {
            assign_ship_to_fleet(state, owner, system, commission.ship, class, config);
        }

        events.emit(
            turn,
            Some(owner),
            Some(system),
            None,
            format!("{class:?} commissioned at {}", commission.colony),
            EventPayload::CommissionCompleted {
                colony_id: commission.colony,
                ship_id: commission.ship,
            },
        );
    }
}

fn load_fighter_on_carrier(
    state: &mut GameState,
    owner: HouseId,
    system: SystemId,
    fighter: ShipId,
    config: &GameConfig,
) -> bool {
    let carriers: Vec<SquadronId> = state
        .fleets_at(system)
        .into_iter()
        .filter(|&f| state.fleet(f).is_some_and(|fl| fl.owner == owner))
        .flat_map(|f| state.squadrons_of(f))
        .collect();
    for squadron_id in carriers {
        let Some(squadron) = state.squadron(squadron_id) else {
            continue;
        };
        let capacity: i64 = squadron
            .all_ships()
            .filter_map(|s| state.ship(s))
            .filter(|s| s.class.is_carrier())
            .map(|s| config.ships.get(s.class).carry_limit)
            .sum();
        if (squadron.embarked_fighters.len() as i64) < capacity
            && state.embark_fighter(fighter, squadron_id).is_ok()
        {
            return true;
        }
    }
    false
}

fn assign_ship_to_fleet(
    state: &mut GameState,
    owner: HouseId,
    system: SystemId,
    ship: ShipId,
    class: ShipClass,
    config: &GameConfig,
) {
    let ship_cc = config.ships.get(class).command_cost;

    // Existing squadron with spare command rating, in stationary fleets
    let eligible_fleets: Vec<FleetId> = state
        .fleets_at(system)
        .into_iter()
        .filter(|&f| {
            state
                .fleet(f)
                .is_some_and(|fl| fl.owner == owner && accepts_reinforcements(fl))
        })
        .collect();

    for &fleet_id in &eligible_fleets {
        for squadron_id in state.squadrons_of(fleet_id) {
            let Some(squadron) = state.squadron(squadron_id) else {
                continue;
            };
            let Some(flagship) = state.ship(squadron.flagship) else {
                continue;
            };
            let rating = config.ships.get(flagship.class).command_rating;
            let used: i64 = squadron
                .all_ships()
                .filter_map(|s| state.ship(s))
                .map(|s| config.ships.get(s.class).command_cost)
                .sum();
            if used + ship_cc <= rating && state.add_ship_to_squadron(ship, squadron_id).is_ok() {
                return;
            }
        }
    }

    // New squadron, in the first eligible fleet or a brand-new one
    let fleet_id = eligible_fleets
        .first()
        .copied()
        .unwrap_or_else(|| state.add_fleet(owner, system));
    let _ = state.add_squadron(owner, fleet_id, ship, Vec::new(), class.role().into());
}

// ============================================================================
// Colony automation (after commissioning, before new builds)
// ============================================================================

/// Run each colony's automation toggles: queue repairs for crippled ships
/// in-system and build IU with idle treasury.
pub fn run_colony_automation(state: &mut GameState, config: &GameConfig, events: &mut EventLog) {
    let turn = state.turn;
    for colony_id in state.colonies.ids_sorted() {
        let Some(colony) = state.colony(colony_id) else {
            continue;
        };
        let owner = colony.owner;
        let automation = colony.automation;

        if automation.auto_repair {
            // Crippled ships of the owner sitting at this system
            let system = colony.system;
            let crippled: Vec<ShipId> = state
                .fleets_at(system)
                .into_iter()
                .filter(|&f| state.fleet(f).is_some_and(|fl| fl.owner == owner))
                .flat_map(|f| state.squadrons_of(f))
                .filter_map(|s| state.squadron(s))
                .flat_map(|s| s.all_ships().collect::<Vec<_>>())
                .filter(|&s| state.ship(s).is_some_and(|ship| ship.crippled))
                .collect();
            for ship in crippled {
                let already_queued = state
                    .colony(colony_id)
                    .map(|c| {
                        c.repair_queue.iter().any(|&r| {
                            state
                                .repair_project(r)
                                .is_some_and(|p| p.subject == RepairSubject::Ship(ship))
                        })
                    })
                    .unwrap_or(false);
                if already_queued {
                    continue;
                }
                let order = RepairOrder {
                    colony: colony_id,
                    subject: RepairSubject::Ship(ship),
                };
                if let Ok((cost, dock)) = validate_repair(state, owner, &order, config) {
                    start_repair(state, owner, &order, cost, dock);
                }
            }
        }

        if automation.auto_build_iu {
            let order = BuildOrder {
                colony: colony_id,
                target: BuildTarget::IndustrialUnits(1),
                facility: None,
            };
            if let Ok((cost, facility, turns)) = validate_build(state, owner, &order, config) {
                start_build(state, owner, &order, cost, facility, turns, events);
            }
        }

        if automation.auto_repair || automation.auto_build_iu {
            events.emit(
                turn,
                Some(owner),
                None,
                None,
                format!("automation pass completed at {colony_id}"),
                EventPayload::AutomationCompleted { colony_id },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, GameStateBuilder};

    fn yard_colony() -> (GameState, ColonyId) {
        let mut builder = GameStateBuilder::new().with_house("Atreides").with_line_map(2);
        let colony = builder.add_colony(HouseId(1), SystemId(1), 100);
        builder.add_neoria(colony, NeoriaClass::Shipyard);
        builder.state_mut().house_mut(HouseId(1)).unwrap().treasury = 1000;
        (builder.build(), colony)
    }

    #[test]
    fn dock_capacity_scales_with_cst() {
        let config = test_config();
        let (mut state, colony) = yard_colony();
        assert_eq!(dock_capacity(&state, colony, &config), 2);
        state.house_mut(HouseId(1)).unwrap().tech.cst = 6;
        // 2 docks × 1.5 = 3
        assert_eq!(dock_capacity(&state, colony, &config), 3);
    }

    #[test]
    fn spaceport_builds_cost_double_except_fighters() {
        let config = test_config();
        let mut builder = GameStateBuilder::new().with_house("Atreides").with_line_map(2);
        let colony = builder.add_colony(HouseId(1), SystemId(1), 100);
        builder.add_neoria(colony, NeoriaClass::Spaceport);
        builder.state_mut().house_mut(HouseId(1)).unwrap().treasury = 1000;
        let state = builder.build();

        let destroyer = BuildOrder {
            colony,
            target: BuildTarget::Ship(ShipClass::Destroyer),
            facility: None,
        };
        let (cost, _, _) = validate_build(&state, HouseId(1), &destroyer, &config).unwrap();
        assert_eq!(cost, 64); // 32 × 200%

        let fighter = BuildOrder {
            colony,
            target: BuildTarget::Ship(ShipClass::Fighter),
            facility: None,
        };
        let (cost, _, _) = validate_build(&state, HouseId(1), &fighter, &config).unwrap();
        assert_eq!(cost, 5); // list price regardless of dock
    }

    #[test]
    fn tech_gates_reject_locked_hulls() {
        let config = test_config();
        let (state, colony) = yard_colony();
        let order = BuildOrder {
            colony,
            target: BuildTarget::Ship(ShipClass::Dreadnought),
            facility: None,
        };
        // Default CST 1 < required 6
        assert!(validate_build(&state, HouseId(1), &order, &config).is_err());
    }

    #[test]
    fn starbase_requires_shipyard() {
        let config = test_config();
        let mut builder = GameStateBuilder::new().with_house("Atreides").with_line_map(2);
        let colony = builder.add_colony(HouseId(1), SystemId(1), 100);
        let state = builder.state_mut();
        state.house_mut(HouseId(1)).unwrap().treasury = 1000;
        state.house_mut(HouseId(1)).unwrap().tech.cst = 3;
        let state = builder.build();

        let order = BuildOrder {
            colony,
            target: BuildTarget::Kastra,
            facility: None,
        };
        let err = validate_build(&state, HouseId(1), &order, &config).unwrap_err();
        assert!(err.contains("shipyard"));
    }

    #[test]
    fn build_completes_into_pending_then_commissions() {
        let config = test_config();
        let (mut state, colony) = yard_colony();
        let mut events = EventLog::default();

        let order = BuildOrder {
            colony,
            target: BuildTarget::Ship(ShipClass::Corvette),
            facility: None,
        };
        let (cost, facility, turns) = validate_build(&state, HouseId(1), &order, &config).unwrap();
        assert_eq!((cost, turns), (16, 1));
        start_build(&mut state, HouseId(1), &order, cost, facility, turns, &mut events);
        assert_eq!(state.house(HouseId(1)).unwrap().treasury, 984);

        // Maintenance completes the hull into pending
        advance_queues(&mut state, &config, &mut events);
        assert_eq!(state.pending_commissions.len(), 1);
        assert!(state.projects_at(colony).is_empty());

        // Next turn's Command phase drains it into a fleet
        commission_pending(&mut state, &config, &mut events);
        assert!(state.pending_commissions.is_empty());
        let fleets = state.fleets_at(SystemId(1));
        assert_eq!(fleets.len(), 1);
        let squadrons = state.squadrons_of(fleets[0]);
        assert_eq!(squadrons.len(), 1);
        state.validate_invariants(&config).unwrap();
    }

    #[test]
    fn commissioned_ship_joins_stationary_fleet_with_spare_rating() {
        let config = test_config();
        let (mut state, colony) = yard_colony();
        let mut events = EventLog::default();

        // A holding fleet with a roomy flagship
        let fleet = state.add_fleet(HouseId(1), SystemId(1));
        let flagship = state.add_ship(HouseId(1), ShipClass::Battleship);
        let squadron = state
            .add_squadron(HouseId(1), fleet, flagship, vec![], ShipClass::Battleship.role().into())
            .unwrap();

        let hull = state.add_ship(HouseId(1), ShipClass::Corvette);
        state.pending_commissions.push(PendingCommission { colony, ship: hull });
        commission_pending(&mut state, &config, &mut events);

        assert_eq!(state.ship(hull).unwrap().squadron, squadron);
        assert_eq!(state.fleets_at(SystemId(1)).len(), 1);
        state.validate_invariants(&config).unwrap();
    }

    #[test]
    fn reserve_fleets_never_receive_reinforcements() {
        let config = test_config();
        let (mut state, colony) = yard_colony();
        let mut events = EventLog::default();

        let fleet = state.add_fleet(HouseId(1), SystemId(1));
        let flagship = state.add_ship(HouseId(1), ShipClass::Battleship);
        state
            .add_squadron(HouseId(1), fleet, flagship, vec![], ShipClass::Battleship.role().into())
            .unwrap();
        state.fleet_mut(fleet).unwrap().status = FleetStatus::Reserve;

        let hull = state.add_ship(HouseId(1), ShipClass::Corvette);
        state.pending_commissions.push(PendingCommission { colony, ship: hull });
        commission_pending(&mut state, &config, &mut events);

        // A new fleet was created instead
        assert_eq!(state.fleets_at(SystemId(1)).len(), 2);
        assert_ne!(state.ship(hull).unwrap().squadron, SquadronId::NULL);
    }

    #[test]
    fn fighters_land_in_hangar_without_auto_load()
    {
        let config = test_config();
        let (mut state, colony) = yard_colony();
        let mut events = EventLog::default();

        let fighter = state.add_ship(HouseId(1), ShipClass::Fighter);
        state
            .pending_commissions
            .push(PendingCommission { colony, ship: fighter });
        commission_pending(&mut state, &config, &mut events);

        assert_eq!(state.colony(colony).unwrap().fighters, vec![fighter]);
    }

    #[test]
    fn dock_limit_stalls_excess_ship_projects() {
        let config = test_config();
        let (mut state, colony) = yard_colony();
        let mut events = EventLog::default();

        // Three corvette orders against 2 dock slots
        for _ in 0..3 {
            let order = BuildOrder {
                colony,
                target: BuildTarget::Ship(ShipClass::Corvette),
                facility: None,
            };
            let (cost, facility, turns) =
                validate_build(&state, HouseId(1), &order, &config).unwrap();
            start_build(&mut state, HouseId(1), &order, cost, facility, turns, &mut events);
        }
        advance_queues(&mut state, &config, &mut events);
        // Two finished, one stalled in the queue
        assert_eq!(state.pending_commissions.len(), 2);
        assert_eq!(state.projects_at(colony).len(), 1);

        advance_queues(&mut state, &config, &mut events);
        assert_eq!(state.pending_commissions.len(), 3);
    }

    #[test]
    fn scrap_squadron_returns_salvage() {
        let config = test_config();
        let mut builder = GameStateBuilder::new().with_house("Atreides").with_line_map(2);
        let fleet = builder.add_fleet(HouseId(1), SystemId(1));
        let squadron = builder.add_squadron(fleet, ShipClass::Destroyer, &[]);
        let mut state = builder.build();
        let before = state.house(HouseId(1)).unwrap().treasury;
        let mut events = EventLog::default();

        execute_scrap(
            &mut state,
            HouseId(1),
            &ScrapOrder::Squadron(squadron),
            &config,
            &mut events,
        )
        .unwrap();
        // 25% of the destroyer's 32 PP
        assert_eq!(state.house(HouseId(1)).unwrap().treasury, before + 8);
        assert!(state.fleet(fleet).is_none());
    }
}
