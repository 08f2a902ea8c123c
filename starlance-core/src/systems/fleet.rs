//! Fleet commands: acceptance, travel, standing orders, and the
//! command-driven sub-phases of Conflict (blockade classification,
//! planetary attacks, scout missions).
//!
//! Acceptance happens in the Command phase and validates ownership,
//! mission locks, reachability over the lane graph, and composition
//! requirements. Movement executes during Maintenance at the lane-class
//! rate. Aggressive commands resolve in the next Conflict phase, where an
//! attack on a house still at peace becomes a pact violation.

use crate::config::GameConfig;
use crate::entities::{
    CargoKind, FleetStatus, MissionState, ShipClass, SquadronKind, TravelState,
};
use crate::events::{EventLog, EventPayload};
use crate::ids::*;
use crate::input::{FleetCommand, FleetOrder, StandingTrigger, ZeroTurnCommand};
use crate::map::{TravelContext, POINTS_PER_TURN};
use crate::state::GameState;
use crate::systems::{diplomacy, ground, intel};
use std::collections::VecDeque;

// ============================================================================
// Travel context
// ============================================================================

fn travel_context(state: &GameState, fleet: FleetId) -> TravelContext {
    let Some(f) = state.fleet(fleet) else {
        return TravelContext::uniform();
    };
    let owned_systems: Vec<SystemId> = state
        .colonies_owned(f.owner)
        .into_iter()
        .filter_map(|c| state.colony(c).map(|col| col.system))
        .collect();
    let mut has_crippled = false;
    let mut has_transport = false;
    for squadron in state.squadrons_of(fleet) {
        if let Some(s) = state.squadron(squadron) {
            for ship in s.all_ships() {
                if let Some(record) = state.ship(ship) {
                    has_crippled |= record.crippled;
                    has_transport |= record.class.is_spacelift();
                }
            }
        }
    }
    TravelContext {
        traveler: f.owner,
        owned_systems,
        has_crippled_ships: has_crippled,
        has_transport_ships: has_transport,
        uniform_jumps: false,
    }
}

fn is_pure_scout_fleet(state: &GameState, fleet: FleetId) -> bool {
    let squadrons = state.squadrons_of(fleet);
    !squadrons.is_empty()
        && squadrons
            .iter()
            .filter_map(|&s| state.squadron(s))
            .all(|s| s.kind == SquadronKind::Intel)
}

fn has_loaded_etac(state: &GameState, fleet: FleetId) -> bool {
    state
        .squadrons_of(fleet)
        .iter()
        .filter_map(|&s| state.squadron(s))
        .flat_map(|s| s.all_ships().collect::<Vec<_>>())
        .filter_map(|ship| state.ship(ship))
        .any(|ship| {
            ship.class == ShipClass::Etac
                && !ship.crippled
                && ship
                    .cargo
                    .is_some_and(|c| c.kind == CargoKind::Colonists && c.units > 0)
        })
}

fn nearest_owned_system(state: &GameState, house: HouseId, from: SystemId) -> Option<SystemId> {
    state
        .colonies_owned(house)
        .into_iter()
        .filter_map(|c| state.colony(c).map(|col| col.system))
        .filter_map(|sys| state.map.jump_distance(from, sys).map(|d| (d, sys)))
        .min()
        .map(|(_, sys)| sys)
}

// ============================================================================
// Order acceptance (Command phase)
// ============================================================================

/// Validate and install one fleet order. `Err` carries the rejection
/// reason; the caller turns it into an `OrderRejected` event.
pub fn accept_fleet_order(
    state: &mut GameState,
    house: HouseId,
    order: &FleetOrder,
    events: &mut EventLog,
) -> Result<(), String> {
    let turn = state.turn;
    let fleet_id = order.fleet;
    // SeekHome resolves to a concrete Move at acceptance
    let mut order = *order;
    if order.command == FleetCommand::SeekHome {
        let location = state
            .fleet(fleet_id)
            .map(|f| f.location)
            .ok_or_else(|| format!("{fleet_id} does not exist"))?;
        let home = nearest_owned_system(state, house, location)
            .ok_or_else(|| "no owned colony to seek".to_string())?;
        if home != location {
            order.command = FleetCommand::Move { to: home };
        } else {
            order.command = FleetCommand::Hold;
        }
    }
    let order = &order;
    let fleet = state
        .fleet(fleet_id)
        .ok_or_else(|| format!("{fleet_id} does not exist"))?;
    if fleet.owner != house {
        return Err("fleet is not yours".into());
    }
    if fleet.mission == MissionState::ScoutLocked {
        return Err("fleet is committed to a covert mission".into());
    }
    match fleet.status {
        FleetStatus::Active => {}
        FleetStatus::Reserve | FleetStatus::Mothballed => {
            if order.command != FleetCommand::Reactivate {
                return Err("inactive fleets accept only Reactivate".into());
            }
        }
    }

    // Composition requirements
    match order.command {
        FleetCommand::Colonize { .. } => {
            if !has_loaded_etac(state, fleet_id) {
                return Err("colonization requires a functional loaded ETAC".into());
            }
        }
        FleetCommand::ScoutColony { .. }
        | FleetCommand::ScoutSystem { .. }
        | FleetCommand::HackStarbase { .. } => {
            if !is_pure_scout_fleet(state, fleet_id) {
                return Err("covert missions require a pure-scout fleet".into());
            }
        }
        _ => {}
    }

    // Reachability
    let location = fleet.location;
    let path = match order.command.target_system() {
        Some(target) if target != location => {
            let ctx = travel_context(state, fleet_id);
            let (path, _) = state
                .map
                .travel_path(location, target, &ctx)
                .ok_or_else(|| format!("no lane route to {target}"))?;
            Some(path)
        }
        _ => None,
    };

    // Status commands take effect immediately
    match order.command {
        FleetCommand::Reserve => {
            let f = state.fleet_mut(fleet_id).expect("fleet checked above");
            f.status = FleetStatus::Reserve;
            f.command = None;
            f.travel = None;
            f.mission = MissionState::Idle;
            return Ok(());
        }
        FleetCommand::Mothball => {
            let f = state.fleet_mut(fleet_id).expect("fleet checked above");
            f.status = FleetStatus::Mothballed;
            f.command = None;
            f.travel = None;
            f.mission = MissionState::Idle;
            return Ok(());
        }
        FleetCommand::Reactivate => {
            let f = state.fleet_mut(fleet_id).expect("fleet checked above");
            f.status = FleetStatus::Active;
            f.mission = MissionState::Idle;
            return Ok(());
        }
        _ => {}
    }

    let f = state.fleet_mut(fleet_id).expect("fleet checked above");
    f.command = Some(order.command);
    if let Some(roe) = order.roe {
        f.roe.set(roe);
    }
    match path {
        Some(path) => {
            let destination = *path.last().expect("path has endpoints");
            f.travel = Some(TravelState {
                // Skip the starting system
                path: path.into_iter().skip(1).collect::<VecDeque<_>>(),
                destination,
            });
            f.mission = MissionState::Traveling;
        }
        None => {
            f.travel = None;
            f.mission = MissionState::Executing;
        }
    }
    if order.command.is_scout_mission() {
        if let Some(f) = state.fleet_mut(fleet_id) {
            f.mission = MissionState::ScoutLocked;
        }
        let scouts = intel::scout_count(state, fleet_id);
        let target = order.command.target_system().unwrap_or(location);
        let kind = match order.command {
            FleetCommand::ScoutColony { .. } => intel::ScoutMissionKind::Colony,
            FleetCommand::HackStarbase { .. } => intel::ScoutMissionKind::Hack,
            _ => intel::ScoutMissionKind::System,
        };
        state
            .intel
            .entry(house)
            .or_default()
            .missions
            .push(intel::ScoutMission {
                fleet: fleet_id,
                target,
                kind,
                scouts,
                started_turn: turn,
            });
    }

    events.emit(
        turn,
        Some(house),
        order.command.target_system(),
        Some(fleet_id),
        format!("{fleet_id} ordered: {:?}", order.command),
        EventPayload::OrderIssued,
    );
    Ok(())
}

// ============================================================================
// Zero-turn commands
// ============================================================================

pub fn execute_zero_turn(
    state: &mut GameState,
    house: HouseId,
    command: &ZeroTurnCommand,
    config: &GameConfig,
    events: &mut EventLog,
) -> Result<(), String> {
    let turn = state.turn;
    match command {
        ZeroTurnCommand::MergeFleets { from, into } => {
            let (from, into) = (*from, *into);
            let from_fleet = state.fleet(from).ok_or_else(|| format!("{from} missing"))?;
            let into_fleet = state.fleet(into).ok_or_else(|| format!("{into} missing"))?;
            if from_fleet.owner != house || into_fleet.owner != house {
                return Err("both fleets must be yours".into());
            }
            if from_fleet.location != into_fleet.location {
                return Err("fleets must share a system to merge".into());
            }
            for squadron in state.squadrons_of(from) {
                state.move_squadron(squadron, into).map_err(|e| e.to_string())?;
            }
            state.del_fleet(from).map_err(|e| e.to_string())?;
            events.emit(
                turn,
                Some(house),
                None,
                Some(from),
                format!("{from} merged into {into}"),
                EventPayload::FleetMerged { into_fleet: into },
            );
            Ok(())
        }
        ZeroTurnCommand::DetachSquadrons { fleet, squadrons } => {
            let fleet = *fleet;
            let source = state.fleet(fleet).ok_or_else(|| format!("{fleet} missing"))?;
            if source.owner != house {
                return Err("fleet is not yours".into());
            }
            let location = source.location;
            for &squadron in squadrons {
                let owned = state
                    .squadron(squadron)
                    .is_some_and(|s| s.fleet == fleet && s.owner == house);
                if !owned {
                    return Err(format!("{squadron} is not in that fleet"));
                }
            }
            let new_fleet = state.add_fleet(house, location);
            for &squadron in squadrons {
                state
                    .move_squadron(squadron, new_fleet)
                    .map_err(|e| e.to_string())?;
            }
            if state.squadrons_of(fleet).is_empty() {
                let _ = state.del_fleet(fleet);
            }
            events.emit(
                turn,
                Some(house),
                Some(location),
                Some(fleet),
                format!("detachment formed {new_fleet}"),
                EventPayload::FleetDetachment { new_fleet },
            );
            Ok(())
        }
        ZeroTurnCommand::TransferSquadron { squadron, to_fleet } => {
            let (squadron, to_fleet) = (*squadron, *to_fleet);
            let record = state
                .squadron(squadron)
                .ok_or_else(|| format!("{squadron} missing"))?;
            if record.owner != house {
                return Err("squadron is not yours".into());
            }
            let from_fleet = record.fleet;
            let same_system = state
                .fleet(from_fleet)
                .zip(state.fleet(to_fleet))
                .is_some_and(|(a, b)| a.location == b.location && b.owner == house);
            if !same_system {
                return Err("target fleet must be yours, in the same system".into());
            }
            state
                .move_squadron(squadron, to_fleet)
                .map_err(|e| e.to_string())?;
            if state.squadrons_of(from_fleet).is_empty() {
                let _ = state.del_fleet(from_fleet);
            }
            events.emit(
                turn,
                Some(house),
                None,
                Some(to_fleet),
                format!("{squadron} transferred to {to_fleet}"),
                EventPayload::FleetTransfer {
                    squadron_id: squadron,
                    to_fleet,
                },
            );
            Ok(())
        }
        ZeroTurnCommand::LoadCargo { ship, colony } => {
            let (ship, colony) = (*ship, *colony);
            let record = state.ship(ship).ok_or_else(|| format!("{ship} missing"))?;
            if record.owner != house {
                return Err("ship is not yours".into());
            }
            let spec_carry = config.ships.get(record.class).carry_limit;
            let kind = match record.class {
                ShipClass::Etac => CargoKind::Colonists,
                ShipClass::TroopTransport => CargoKind::Marines,
                _ => return Err("only spacelift hulls carry cargo".into()),
            };
            let col = state
                .colony(colony)
                .ok_or_else(|| format!("{colony} missing"))?;
            if col.owner != house {
                return Err("colony is not yours".into());
            }
            // The ship must be in-system
            let in_system = state
                .squadron(record.squadron)
                .and_then(|s| state.fleet(s.fleet))
                .is_some_and(|f| f.location == col.system);
            if !in_system {
                return Err("ship is not at that colony".into());
            }
            match kind {
                CargoKind::Colonists => {
                    let units = spec_carry.min(col.population - 1);
                    if units <= 0 {
                        return Err("colony cannot spare colonists".into());
                    }
                    if let Some(c) = state.colony_mut(colony) {
                        c.population -= units;
                    }
                    if let Some(s) = state.ship_mut(ship) {
                        s.cargo = Some(crate::entities::Cargo { kind, units });
                    }
                    events.emit(
                        turn,
                        Some(house),
                        None,
                        None,
                        format!("{units} colonists boarded {ship}"),
                        EventPayload::CargoLoaded { ship_id: ship, units },
                    );
                }
                CargoKind::Marines => {
                    // Marines embark as ground units riding the transport
                    let mut marines: Vec<GroundUnitId> = state
                        .ground_units_at(colony)
                        .into_iter()
                        .filter(|&u| {
                            state.ground_unit(u).is_some_and(|g| {
                                g.kind == crate::entities::GroundUnitKind::Marine
                                    && g.owner == house
                            })
                        })
                        .collect();
                    marines.sort();
                    marines.truncate(spec_carry as usize);
                    if marines.is_empty() {
                        return Err("no marines available at colony".into());
                    }
                    let units = marines.len() as i64;
                    for marine in marines {
                        state
                            .move_ground_unit(
                                marine,
                                crate::entities::GroundUnitSite::Transport(ship),
                            )
                            .map_err(|e| e.to_string())?;
                    }
                    events.emit(
                        turn,
                        Some(house),
                        None,
                        None,
                        format!("{units} marines boarded {ship}"),
                        EventPayload::CargoLoaded { ship_id: ship, units },
                    );
                }
            }
            Ok(())
        }
        ZeroTurnCommand::UnloadCargo { ship } => {
            let ship = *ship;
            let record = state.ship(ship).ok_or_else(|| format!("{ship} missing"))?;
            if record.owner != house {
                return Err("ship is not yours".into());
            }
            let location = state
                .squadron(record.squadron)
                .and_then(|s| state.fleet(s.fleet))
                .map(|f| f.location)
                .ok_or_else(|| "ship is not deployed".to_string())?;
            let colony = state
                .colony_at(location)
                .filter(|&c| state.colony(c).is_some_and(|col| col.owner == house))
                .ok_or_else(|| "no friendly colony here".to_string())?;

            if let Some(cargo) = record.cargo {
                if cargo.kind == CargoKind::Colonists {
                    if let Some(c) = state.colony_mut(colony) {
                        c.population += cargo.units;
                    }
                }
                if let Some(s) = state.ship_mut(ship) {
                    s.cargo = None;
                }
            }
            for marine in state.ground_units_aboard(ship) {
                state
                    .move_ground_unit(marine, crate::entities::GroundUnitSite::Colony(colony))
                    .map_err(|e| e.to_string())?;
            }
            events.emit(
                turn,
                Some(house),
                Some(location),
                None,
                format!("{ship} unloaded at {colony}"),
                EventPayload::CargoUnloaded { ship_id: ship },
            );
            Ok(())
        }
        ZeroTurnCommand::SetRoe { fleet, roe } => {
            let fleet = *fleet;
            let record = state.fleet(fleet).ok_or_else(|| format!("{fleet} missing"))?;
            if record.owner != house {
                return Err("fleet is not yours".into());
            }
            if let Some(f) = state.fleet_mut(fleet) {
                f.roe.set(*roe);
            }
            Ok(())
        }
        ZeroTurnCommand::SetStandingOrder { fleet, order } => {
            let fleet = *fleet;
            let record = state.fleet(fleet).ok_or_else(|| format!("{fleet} missing"))?;
            if record.owner != house {
                return Err("fleet is not yours".into());
            }
            if let Some(f) = state.fleet_mut(fleet) {
                f.standing_order = Some(*order);
            }
            events.emit(
                turn,
                Some(house),
                None,
                Some(fleet),
                format!("standing order set on {fleet}"),
                EventPayload::StandingOrderSet,
            );
            Ok(())
        }
        ZeroTurnCommand::ClearStandingOrder { fleet } => {
            let fleet = *fleet;
            let record = state.fleet(fleet).ok_or_else(|| format!("{fleet} missing"))?;
            if record.owner != house {
                return Err("fleet is not yours".into());
            }
            if let Some(f) = state.fleet_mut(fleet) {
                f.standing_order = None;
            }
            events.emit(
                turn,
                Some(house),
                None,
                Some(fleet),
                format!("standing order cleared on {fleet}"),
                EventPayload::StandingOrderSuspended,
            );
            Ok(())
        }
    }
}

// ============================================================================
// Standing orders (start of Command phase)
// ============================================================================

/// Fire standing orders whose triggers match. The activation installs a
/// regular command for this turn.
pub fn activate_standing_orders(state: &mut GameState, events: &mut EventLog) {
    let turn = state.turn;
    for fleet_id in state.fleets.ids_sorted() {
        let Some(fleet) = state.fleet(fleet_id) else {
            continue;
        };
        let Some(standing) = fleet.standing_order else {
            continue;
        };
        if standing.suspended || fleet.command.is_some() || fleet.status != FleetStatus::Active {
            continue;
        }
        let owner = fleet.owner;
        let location = fleet.location;
        let triggered = match standing.trigger {
            StandingTrigger::EnemyDetected => state
                .fleets_at(location)
                .iter()
                .filter_map(|&f| state.fleet(f))
                .any(|other| {
                    other.owner != owner && state.diplomacy.are_hostile(owner, other.owner)
                }),
            StandingTrigger::ColonyEstablished => events.events().iter().any(|e| {
                e.house_id == Some(owner)
                    && matches!(e.payload, EventPayload::ColonyFounded { .. })
            }),
            StandingTrigger::TurnElapsed { every } => every > 0 && turn % every == 0,
        };
        if !triggered {
            continue;
        }
        let order = FleetOrder {
            fleet: fleet_id,
            command: standing.command,
            priority: 0,
            roe: None,
        };
        if accept_fleet_order(state, owner, &order, events).is_ok() {
            events.emit(
                turn,
                Some(owner),
                None,
                Some(fleet_id),
                format!("standing order activated on {fleet_id}"),
                EventPayload::StandingOrderActivated,
            );
        }
    }
}

// ============================================================================
// Conflict-phase command execution
// ============================================================================

/// Classify blockades: a colony is blockaded while a hostile fleet with a
/// Blockade command for its system sits in-system. Initiating a blockade
/// against a house still at peace is a pact violation.
pub fn run_blockade_classification(
    state: &mut GameState,
    config: &GameConfig,
    events: &mut EventLog,
) {
    let turn = state.turn;
    for colony_id in state.colonies.ids_sorted() {
        let Some(colony) = state.colony(colony_id) else {
            continue;
        };
        let system = colony.system;
        let owner = colony.owner;
        let was_blockaded = colony.blockaded;

        let mut blockaders: Vec<HouseId> = Vec::new();
        for fleet_id in state.fleets_at(system) {
            let Some(fleet) = state.fleet(fleet_id) else {
                continue;
            };
            if fleet.owner == owner || fleet.status != FleetStatus::Active {
                continue;
            }
            let blockading = matches!(
                fleet.command,
                Some(FleetCommand::Blockade { system: target }) if target == system
            ) && fleet.location == system;
            if blockading {
                blockaders.push(fleet.owner);
            }
        }
        blockaders.sort();
        blockaders.dedup();

        // A fresh blockade is a hostile act
        for &blockader in &blockaders {
            if !state.diplomacy.are_enemies(blockader, owner) {
                diplomacy::record_attack(state, blockader, owner, config, events);
            }
        }

        let now_blockaded = !blockaders.is_empty();
        if let Some(c) = state.colony_mut(colony_id) {
            c.blockaded = now_blockaded;
            c.blockading_houses = blockaders;
        }
        if now_blockaded && !was_blockaded {
            events.emit(
                turn,
                Some(owner),
                Some(system),
                None,
                format!("{colony_id} is under blockade"),
                EventPayload::BlockadeEstablished { colony_id },
            );
        }
    }
}

/// Execute Bombard/Invade/Blitz for fleets that reached their target.
pub fn run_planetary_commands(state: &mut GameState, config: &GameConfig, events: &mut EventLog) {
    for fleet_id in state.fleets.ids_sorted() {
        let Some(fleet) = state.fleet(fleet_id) else {
            continue;
        };
        if fleet.travel.is_some() {
            continue; // Still in transit
        }
        let owner = fleet.owner;
        let location = fleet.location;
        let command = fleet.command;

        let (target, invade, blitz) = match command {
            Some(FleetCommand::Bombard { system }) => (system, false, false),
            Some(FleetCommand::Invade { system }) => (system, true, false),
            Some(FleetCommand::Blitz { system }) => (system, true, true),
            _ => continue,
        };
        if target != location {
            continue;
        }
        let Some(colony_id) = state.colony_at(target) else {
            abort_command(state, fleet_id, "target colony no longer exists", events);
            continue;
        };
        let defender = state.colony(colony_id).map(|c| c.owner);
        let Some(defender) = defender else {
            continue;
        };
        if defender == owner {
            abort_command(state, fleet_id, "target colony changed hands", events);
            continue;
        }

        // Striking a house still at peace violates the pact
        if !state.diplomacy.are_enemies(owner, defender) {
            diplomacy::record_attack(state, owner, defender, config, events);
        }

        if invade {
            if !blitz {
                ground::run_bombardment(state, config, fleet_id, colony_id, events);
            }
            let captured = ground::run_invasion(state, config, fleet_id, colony_id, blitz, events);
            if captured {
                complete_command(state, fleet_id, events);
            }
        } else {
            ground::run_bombardment(state, config, fleet_id, colony_id, events);
        }
    }
}

/// Resolve HackStarbase attempts for scout fleets on station; plain scout
/// missions keep watching until recalled.
pub fn run_scout_commands(state: &mut GameState, config: &GameConfig, events: &mut EventLog) {
    let turn = state.turn;
    for fleet_id in state.fleets.ids_sorted() {
        let Some(fleet) = state.fleet(fleet_id) else {
            continue;
        };
        if fleet.mission != MissionState::ScoutLocked || fleet.travel.is_some() {
            continue;
        }
        let owner = fleet.owner;
        let Some(FleetCommand::HackStarbase { system }) = fleet.command else {
            continue;
        };
        if system != fleet.location {
            continue;
        }
        let Some(colony_id) = state.colony_at(system) else {
            abort_command(state, fleet_id, "no colony to hack", events);
            continue;
        };
        let defender = state.colony(colony_id).map(|c| c.owner).unwrap_or(HouseId::NULL);
        let kastra = state.kastras_at(colony_id).first().copied();
        let Some(kastra) = kastra else {
            abort_command(state, fleet_id, "no starbase present", events);
            continue;
        };

        let cic = state.house(defender).map(|h| h.tech.cic).unwrap_or(1);
        let scouts = state
            .intel
            .get(&owner)
            .and_then(|db| db.mission_for(fleet_id))
            .map(|m| m.scouts)
            .unwrap_or(1);
        let threshold = config.espionage.detection_base_for(cic);
        let roll = state.roll_d100() + intel::mesh_bonus(scouts, config);
        if roll > threshold {
            if let Some(k) = state.kastra_mut(kastra) {
                k.state = crate::entities::FacilityState::Crippled;
            }
            events.emit(
                turn,
                Some(owner),
                Some(system),
                Some(fleet_id),
                format!("starbase systems at {system} hacked"),
                EventPayload::OrderCompleted,
            );
        } else {
            events.emit(
                turn,
                Some(defender),
                Some(system),
                None,
                format!("intrusion attempt traced at {system}"),
                EventPayload::ThreatDetected { hostile_house: owner },
            );
        }
        // One attempt per mission, then the scouts go dark
        if let Some(db) = state.intel.get_mut(&owner) {
            db.missions.retain(|m| m.fleet != fleet_id);
        }
        if let Some(f) = state.fleet_mut(fleet_id) {
            f.mission = MissionState::Idle;
            f.command = None;
        }
    }
}

// ============================================================================
// Command-phase execution of arrived, non-violent commands
// ============================================================================

fn abort_command(state: &mut GameState, fleet: FleetId, reason: &str, events: &mut EventLog) {
    let turn = state.turn;
    let owner = state.fleet(fleet).map(|f| f.owner);
    if let Some(f) = state.fleet_mut(fleet) {
        f.command = None;
        f.travel = None;
        f.mission = MissionState::Idle;
    }
    events.emit(
        turn,
        owner,
        None,
        Some(fleet),
        format!("{fleet} order aborted: {reason}"),
        EventPayload::OrderAborted {
            reason: reason.to_string(),
        },
    );
}

fn complete_command(state: &mut GameState, fleet: FleetId, events: &mut EventLog) {
    let turn = state.turn;
    let owner = state.fleet(fleet).map(|f| f.owner);
    if let Some(f) = state.fleet_mut(fleet) {
        f.command = None;
        f.mission = MissionState::Idle;
    }
    events.emit(
        turn,
        owner,
        None,
        Some(fleet),
        format!("{fleet} order completed"),
        EventPayload::OrderCompleted,
    );
}

/// Execute Colonize / Salvage / JoinFleet / Rendezvous / View for fleets
/// that have arrived. Runs in the Command phase after commissioning.
pub fn run_arrived_commands(state: &mut GameState, config: &GameConfig, events: &mut EventLog) {
    let turn = state.turn;
    for fleet_id in state.fleets.ids_sorted() {
        let Some(fleet) = state.fleet(fleet_id) else {
            continue;
        };
        if fleet.travel.is_some() {
            continue;
        }
        let owner = fleet.owner;
        let location = fleet.location;

        match fleet.command {
            Some(FleetCommand::Colonize { system }) if system == location => {
                if state.colony_at(system).is_some() {
                    abort_command(state, fleet_id, "system already colonized", events);
                    continue;
                }
                // Land the colonists from the first loaded ETAC
                let etac = state
                    .squadrons_of(fleet_id)
                    .iter()
                    .filter_map(|&s| state.squadron(s))
                    .flat_map(|s| s.all_ships().collect::<Vec<_>>())
                    .find(|&ship| {
                        state.ship(ship).is_some_and(|s| {
                            s.class == ShipClass::Etac
                                && !s.crippled
                                && s.cargo
                                    .is_some_and(|c| c.kind == CargoKind::Colonists && c.units > 0)
                        })
                    });
                let Some(etac) = etac else {
                    abort_command(state, fleet_id, "no colonists left aboard", events);
                    continue;
                };
                let units = state
                    .ship(etac)
                    .and_then(|s| s.cargo)
                    .map(|c| c.units)
                    .unwrap_or(0);
                if let Some(s) = state.ship_mut(etac) {
                    s.cargo = None;
                }
                let colony = state.add_colony(owner, system, units);
                if let Some(h) = state.house_mut(owner) {
                    h.prestige += config.prestige.colony_founded;
                }
                events.emit(
                    turn,
                    Some(owner),
                    Some(system),
                    Some(fleet_id),
                    format!("colony founded at {system} with {units} PU"),
                    EventPayload::ColonyFounded { colony_id: colony },
                );
                complete_command(state, fleet_id, events);
            }
            Some(FleetCommand::Salvage) => {
                let at_own_colony = state
                    .colony_at(location)
                    .and_then(|c| state.colony(c))
                    .is_some_and(|c| c.owner == owner);
                if !at_own_colony {
                    abort_command(state, fleet_id, "salvage requires an owned colony", events);
                    continue;
                }
                let _ = crate::systems::construction::execute_scrap(
                    state,
                    owner,
                    &crate::input::ScrapOrder::Fleet(fleet_id),
                    config,
                    events,
                );
            }
            Some(FleetCommand::JoinFleet { fleet: target }) => {
                let co_located = state
                    .fleet(target)
                    .is_some_and(|t| t.owner == owner && t.location == location);
                if co_located {
                    for squadron in state.squadrons_of(fleet_id) {
                        let _ = state.move_squadron(squadron, target);
                    }
                    let _ = state.del_fleet(fleet_id);
                    events.emit(
                        turn,
                        Some(owner),
                        Some(location),
                        Some(fleet_id),
                        format!("{fleet_id} merged into {target}"),
                        EventPayload::FleetMerged { into_fleet: target },
                    );
                } else if state.fleet(target).is_none() {
                    abort_command(state, fleet_id, "join target no longer exists", events);
                }
            }
            Some(FleetCommand::Rendezvous { fleet: target, system }) if system == location => {
                let partner_arrived = state
                    .fleet(target)
                    .is_some_and(|t| t.owner == owner && t.location == system);
                if partner_arrived {
                    for squadron in state.squadrons_of(fleet_id) {
                        let _ = state.move_squadron(squadron, target);
                    }
                    let _ = state.del_fleet(fleet_id);
                    events.emit(
                        turn,
                        Some(owner),
                        Some(system),
                        Some(fleet_id),
                        format!("{fleet_id} rendezvoused with {target}"),
                        EventPayload::FleetMerged { into_fleet: target },
                    );
                } else if state.fleet(target).is_none() {
                    abort_command(state, fleet_id, "rendezvous partner lost", events);
                }
            }
            Some(FleetCommand::View { system }) => {
                let adjacent = state
                    .map
                    .lanes_from(location)
                    .iter()
                    .any(|l| l.to == system);
                if adjacent || system == location {
                    let colony = state.colony_at(system).and_then(|c| state.colony(c));
                    let intel_record = intel::SystemIntel {
                        turn_observed: turn,
                        owner: colony.map(|c| c.owner),
                        population: colony.map(|c| c.population).unwrap_or(0),
                        industry: colony.map(|c| c.industry).unwrap_or(0),
                        fleet_count: state.fleets_at(system).len() as u32,
                        corrupted: false,
                    };
                    state
                        .intel
                        .entry(owner)
                        .or_default()
                        .systems
                        .insert(system, intel_record);
                    complete_command(state, fleet_id, events);
                } else {
                    abort_command(state, fleet_id, "view target not adjacent", events);
                }
            }
            _ => {}
        }
    }
}

// ============================================================================
// Movement (Maintenance phase)
// ============================================================================

/// Advance every traveling fleet by its per-turn movement allowance,
/// hop by hop along its stored path.
pub fn run_fleet_movement(state: &mut GameState, events: &mut EventLog) {
    let turn = state.turn;
    for fleet_id in state.fleets.ids_sorted() {
        let Some(fleet) = state.fleet(fleet_id) else {
            continue;
        };
        let Some(travel) = fleet.travel.clone() else {
            continue;
        };
        let owner = fleet.owner;
        let mut budget = POINTS_PER_TURN;
        let mut path = travel.path;
        let mut location = fleet.location;

        while let Some(&next) = path.front() {
            let ctx = travel_context(state, fleet_id);
            let Some(cost) = state.map.lane_between(location, next).and_then(|_| {
                use lane_pathfinding::Graph;
                state.map.cost(location, next, &ctx)
            }) else {
                // Lane became impassable (cripples picked up en route)
                abort_command(state, fleet_id, "route became impassable", events);
                path.clear();
                break;
            };
            if cost > budget {
                break;
            }
            budget -= cost;
            path.pop_front();
            if state.move_fleet(fleet_id, next).is_err() {
                break;
            }
            location = next;
        }

        let Some(fleet) = state.fleet_mut(fleet_id) else {
            continue;
        };
        if fleet.travel.is_none() {
            continue; // Aborted above
        }
        if path.is_empty() {
            fleet.travel = None;
            if fleet.mission == MissionState::Traveling {
                fleet.mission = MissionState::Executing;
            }
            events.emit(
                turn,
                Some(owner),
                Some(location),
                Some(fleet_id),
                format!("{fleet_id} arrived at {location}"),
                EventPayload::FleetArrived,
            );
            // Plain moves are complete on arrival
            if matches!(
                state.fleet(fleet_id).and_then(|f| f.command),
                Some(FleetCommand::Move { .. }) | Some(FleetCommand::SeekHome)
            ) {
                complete_command(state, fleet_id, events);
            }
        } else {
            if let Some(f) = state.fleet_mut(fleet_id) {
                f.travel = Some(TravelState {
                    path,
                    destination: travel.destination,
                });
            }
        }
    }

    // Fleet encounters: mutually hostile fleets now sharing a system
    let mut encounters: Vec<(SystemId, HouseId, FleetId, HouseId)> = Vec::new();
    for system in state
        .map
        .systems()
        .map(|s| s.id)
        .collect::<Vec<_>>()
    {
        let fleets = state.fleets_at(system);
        for (i, &a) in fleets.iter().enumerate() {
            for &b in &fleets[i + 1..] {
                let (Some(fa), Some(fb)) = (state.fleet(a), state.fleet(b)) else {
                    continue;
                };
                if fa.owner != fb.owner && state.diplomacy.are_hostile(fa.owner, fb.owner) {
                    encounters.push((system, fa.owner, a, fb.owner));
                }
            }
        }
    }
    encounters.sort();
    for (system, house, fleet, other) in encounters {
        events.emit(
            turn,
            Some(house),
            Some(system),
            Some(fleet),
            format!("hostile contact at {system}"),
            EventPayload::FleetEncounter { other_house: other },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, GameStateBuilder};

    #[test]
    fn move_order_travels_at_lane_rate() {
        let mut builder = GameStateBuilder::new().with_house("Atreides").with_line_map(4);
        let fleet = builder.add_fleet(HouseId(1), SystemId(1));
        builder.add_squadron(fleet, ShipClass::Destroyer, &[]);
        let mut state = builder.build();
        let mut events = EventLog::default();

        let order = FleetOrder {
            fleet,
            command: FleetCommand::Move { to: SystemId(4) },
            priority: 0,
            roe: None,
        };
        accept_fleet_order(&mut state, HouseId(1), &order, &mut events).unwrap();
        assert_eq!(state.fleet(fleet).unwrap().mission, MissionState::Traveling);

        // Minor lanes: one jump per turn
        run_fleet_movement(&mut state, &mut events);
        assert_eq!(state.fleet(fleet).unwrap().location, SystemId(2));
        run_fleet_movement(&mut state, &mut events);
        assert_eq!(state.fleet(fleet).unwrap().location, SystemId(3));
        run_fleet_movement(&mut state, &mut events);
        let f = state.fleet(fleet).unwrap();
        assert_eq!(f.location, SystemId(4));
        assert!(f.travel.is_none());
        assert_eq!(f.command, None); // Move completes on arrival
    }

    #[test]
    fn scout_locked_fleet_rejects_new_commands() {
        let mut builder = GameStateBuilder::new()
            .with_house("Atreides")
            .with_house("Harkonnen")
            .with_line_map(3);
        builder.add_colony(HouseId(2), SystemId(3), 100);
        let fleet = builder.add_fleet(HouseId(1), SystemId(1));
        builder.add_squadron(fleet, ShipClass::Scout, &[]);
        let mut state = builder.build();
        let mut events = EventLog::default();

        let spy = FleetOrder {
            fleet,
            command: FleetCommand::ScoutColony { system: SystemId(3) },
            priority: 0,
            roe: None,
        };
        accept_fleet_order(&mut state, HouseId(1), &spy, &mut events).unwrap();
        assert_eq!(state.fleet(fleet).unwrap().mission, MissionState::ScoutLocked);

        let countermand = FleetOrder {
            fleet,
            command: FleetCommand::Hold,
            priority: 0,
            roe: None,
        };
        let err = accept_fleet_order(&mut state, HouseId(1), &countermand, &mut events).unwrap_err();
        assert!(err.contains("covert"));
    }

    #[test]
    fn scout_missions_require_pure_scout_fleets() {
        let mut builder = GameStateBuilder::new()
            .with_house("Atreides")
            .with_house("Harkonnen")
            .with_line_map(3);
        builder.add_colony(HouseId(2), SystemId(3), 100);
        let fleet = builder.add_fleet(HouseId(1), SystemId(1));
        builder.add_squadron(fleet, ShipClass::Destroyer, &[]);
        let mut state = builder.build();
        let mut events = EventLog::default();

        let spy = FleetOrder {
            fleet,
            command: FleetCommand::ScoutSystem { system: SystemId(3) },
            priority: 0,
            roe: None,
        };
        assert!(accept_fleet_order(&mut state, HouseId(1), &spy, &mut events).is_err());
    }

    #[test]
    fn colonize_requires_loaded_etac_and_lands_colonists() {
        let config = test_config();
        let mut builder = GameStateBuilder::new().with_house("Atreides").with_line_map(3);
        let fleet = builder.add_fleet(HouseId(1), SystemId(2));
        let squadron = builder.add_squadron(fleet, ShipClass::LightCruiser, &[ShipClass::Etac]);
        let mut state = builder.build();
        let mut events = EventLog::default();

        // Empty ETAC: rejected
        let order = FleetOrder {
            fleet,
            command: FleetCommand::Colonize { system: SystemId(2) },
            priority: 0,
            roe: None,
        };
        assert!(accept_fleet_order(&mut state, HouseId(1), &order, &mut events).is_err());

        // Load colonists and go; the fleet is already on site
        let etac = state
            .squadron(squadron)
            .unwrap()
            .ships
            .iter()
            .copied()
            .find(|&s| state.ship(s).unwrap().class == ShipClass::Etac)
            .unwrap();
        state.ship_mut(etac).unwrap().cargo = Some(crate::entities::Cargo {
            kind: CargoKind::Colonists,
            units: 50,
        });
        accept_fleet_order(&mut state, HouseId(1), &order, &mut events).unwrap();
        run_arrived_commands(&mut state, &config, &mut events);

        let colony = state.colony_at(SystemId(2)).expect("colony founded");
        let record = state.colony(colony).unwrap();
        assert_eq!(record.owner, HouseId(1));
        assert_eq!(record.population, 50);
        assert_eq!(state.colonies_owned(HouseId(1)), vec![colony]);
        assert_eq!(state.ship(etac).unwrap().cargo, None);
        state.validate_invariants(&config).unwrap();
    }

    #[test]
    fn blockade_classifies_and_escalates() {
        let config = test_config();
        let mut builder = GameStateBuilder::new()
            .with_house("Atreides")
            .with_house("Harkonnen")
            .with_line_map(2);
        let colony = builder.add_colony(HouseId(2), SystemId(1), 200);
        let fleet = builder.add_fleet(HouseId(1), SystemId(1));
        builder.add_squadron(fleet, ShipClass::Destroyer, &[]);
        let mut state = builder.build();
        let mut events = EventLog::default();

        let order = FleetOrder {
            fleet,
            command: FleetCommand::Blockade { system: SystemId(1) },
            priority: 0,
            roe: None,
        };
        accept_fleet_order(&mut state, HouseId(1), &order, &mut events).unwrap();
        run_blockade_classification(&mut state, &config, &mut events);

        let col = state.colony(colony).unwrap();
        assert!(col.blockaded);
        assert_eq!(col.blockading_houses, vec![HouseId(1)]);
        // Blockading a neutral is a pact violation: Enemy + dishonored
        assert!(state.diplomacy.are_enemies(HouseId(1), HouseId(2)));
        assert!(diplomacy::is_dishonored(&state, HouseId(1)));

        // Blockader leaves: classification clears
        state.fleet_mut(fleet).unwrap().command = None;
        run_blockade_classification(&mut state, &config, &mut events);
        assert!(!state.colony(colony).unwrap().blockaded);
    }

    #[test]
    fn merge_fleets_requires_same_system() {
        let mut builder = GameStateBuilder::new().with_house("Atreides").with_line_map(3);
        let a = builder.add_fleet(HouseId(1), SystemId(1));
        let b = builder.add_fleet(HouseId(1), SystemId(3));
        builder.add_squadron(a, ShipClass::Destroyer, &[]);
        builder.add_squadron(b, ShipClass::Corvette, &[]);
        let mut state = builder.build();
        let mut events = EventLog::default();

        let config = test_config();
        let err = execute_zero_turn(
            &mut state,
            HouseId(1),
            &ZeroTurnCommand::MergeFleets { from: a, into: b },
            &config,
            &mut events,
        )
        .unwrap_err();
        assert!(err.contains("share a system"));

        state.move_fleet(a, SystemId(3)).unwrap();
        execute_zero_turn(
            &mut state,
            HouseId(1),
            &ZeroTurnCommand::MergeFleets { from: a, into: b },
            &config,
            &mut events,
        )
        .unwrap();
        assert!(state.fleet(a).is_none());
        assert_eq!(state.squadrons_of(b).len(), 2);
    }

    #[test]
    fn standing_order_fires_on_enemy_contact() {
        let mut builder = GameStateBuilder::new()
            .with_house("Atreides")
            .with_house("Harkonnen")
            .with_line_map(3);
        builder.add_colony(HouseId(1), SystemId(3), 100);
        let guard = builder.add_fleet(HouseId(1), SystemId(1));
        builder.add_squadron(guard, ShipClass::Destroyer, &[]);
        let intruder = builder.add_fleet(HouseId(2), SystemId(1));
        builder.add_squadron(intruder, ShipClass::Corvette, &[]);
        {
            let state = builder.state_mut();
            state.diplomacy.relation_mut(HouseId(1), HouseId(2)).stance =
                crate::entities::DiplomaticStance::Enemy;
        }
        let mut state = builder.build();
        let mut events = EventLog::default();

        execute_zero_turn(
            &mut state,
            HouseId(1),
            &ZeroTurnCommand::SetStandingOrder {
                fleet: guard,
                order: crate::input::StandingOrder {
                    trigger: StandingTrigger::EnemyDetected,
                    command: FleetCommand::SeekHome,
                    suspended: false,
                },
            },
            &test_config(),
            &mut events,
        )
        .unwrap();

        activate_standing_orders(&mut state, &mut events);
        assert!(state.fleet(guard).unwrap().command.is_some());
        assert!(events
            .events()
            .iter()
            .any(|e| matches!(e.payload, EventPayload::StandingOrderActivated)));
    }

    #[test]
    fn reserve_fleet_accepts_only_reactivate() {
        let mut builder = GameStateBuilder::new().with_house("Atreides").with_line_map(2);
        let fleet = builder.add_fleet(HouseId(1), SystemId(1));
        builder.add_squadron(fleet, ShipClass::Destroyer, &[]);
        let mut state = builder.build();
        let mut events = EventLog::default();

        accept_fleet_order(
            &mut state,
            HouseId(1),
            &FleetOrder {
                fleet,
                command: FleetCommand::Reserve,
                priority: 0,
                roe: None,
            },
            &mut events,
        )
        .unwrap();
        assert_eq!(state.fleet(fleet).unwrap().status, FleetStatus::Reserve);

        let err = accept_fleet_order(
            &mut state,
            HouseId(1),
            &FleetOrder {
                fleet,
                command: FleetCommand::Move { to: SystemId(2) },
                priority: 0,
                roe: None,
            },
            &mut events,
        )
        .unwrap_err();
        assert!(err.contains("Reactivate"));

        accept_fleet_order(
            &mut state,
            HouseId(1),
            &FleetOrder {
                fleet,
                command: FleetCommand::Reactivate,
                priority: 0,
                roe: None,
            },
            &mut events,
        )
        .unwrap();
        assert_eq!(state.fleet(fleet).unwrap().status, FleetStatus::Active);
    }
}
