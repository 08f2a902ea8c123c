//! The turn orchestrator: `(state, packets, seed) → (state′, events, reports)`.
//!
//! Four phases in strict order — Conflict, Income, Command, Maintenance —
//! with houses processed in ascending ID inside the sequential phases and
//! Conflict-phase simultaneity handled by the combat engine's staging
//! layer. The RNG reseeds from `(turn, game_seed)` at entry, so identical
//! inputs replay bit-identically.
//!
//! Houses that did not submit (or whose status bars them from free action)
//! get a substituted packet before Conflict: Defensive Collapse houses are
//! restricted to defensive fleet orders, Autopilot houses to bare
//! maintenance. Only invariant violations abort a turn; every other
//! failure is an event and the turn completes.

use crate::config::GameConfig;
use crate::entities::{FleetStatus, HouseStatus, MissionState};
use crate::events::{Event, EventLog, EventPayload};
use crate::ids::{HouseId, ShipId};
use crate::input::{
    validate_packet, CommandPacket, DiplomaticCommand, FleetCommand, FleetOrder,
};
use crate::report::{CombatReport, PlayerState};
use crate::state::{GameState, StateError};
use crate::systems::{
    capacity, construction, diplomacy, economy, espionage, fleet, intel, shortfall,
};
use std::collections::BTreeMap;
use thiserror::Error;

/// Only invariant violations abort a turn. The caller keeps the pre-turn
/// snapshot it passed in; the diagnostic names the drift.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("turn aborted, pre-turn state preserved: {0}")]
    Fatal(#[from] StateError),
}

/// Everything a resolved turn hands back to the surrounding daemon.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub state: GameState,
    pub events: Vec<Event>,
    pub combat_reports: Vec<CombatReport>,
    pub player_states: BTreeMap<HouseId, PlayerState>,
}

/// Resolve one turn. Pure with respect to its inputs: the pre-state is
/// never mutated, and identical `(state, packets)` produce bit-identical
/// outcomes (the seed lives inside the state).
#[tracing::instrument(skip_all, name = "resolve_turn", fields(turn = pre_state.turn))]
pub fn resolve_turn(
    pre_state: &GameState,
    packets: &BTreeMap<HouseId, CommandPacket>,
    config: &GameConfig,
) -> Result<TurnOutcome, TurnError> {
    let mut state = pre_state.clone();
    state.rebuild_indices();
    state.seed_rng(state.turn);
    let mut events = EventLog::default();

    // Entries still pending from last turn must be drained by this turn's
    // Command phase
    let carryover_commissions: Vec<ShipId> =
        state.pending_commissions.iter().map(|p| p.ship).collect();

    let effective_packets = intake_packets(&mut state, packets, config, &mut events);

    // ------------------------------------------------------------------
    // Phase 1: Conflict (simultaneous)
    // ------------------------------------------------------------------
    intel::run_scout_detection(&mut state, config, &mut events);
    let combat_reports = crate::systems::combat::run_space_combat(&mut state, config, &mut events);
    fleet::run_blockade_classification(&mut state, config, &mut events);
    fleet::run_planetary_commands(&mut state, config, &mut events);
    let queues: Vec<espionage::EspionageQueue> = effective_packets
        .iter()
        .map(|(&house, packet)| espionage::EspionageQueue {
            attacker: house,
            actions: packet.espionage_actions.clone(),
        })
        .collect();
    espionage::run_espionage(&mut state, &queues, config, &mut events);
    fleet::run_scout_commands(&mut state, config, &mut events);
    intel::record_observations(&mut state);

    // ------------------------------------------------------------------
    // Phase 2: Income (sequential, ascending house ID)
    // ------------------------------------------------------------------
    for house in state.houses.ids_sorted() {
        if !state.house(house).is_some_and(|h| h.is_playing()) {
            continue;
        }
        let (_gco, tax, upkeep) =
            economy::run_income_phase_for_house(&mut state, house, config, &mut events);
        let treasury = state.house(house).map(|h| h.treasury).unwrap_or(0);

        if treasury >= upkeep {
            if let Some(h) = state.house_mut(house) {
                h.treasury -= upkeep;
                h.consecutive_shortfalls = 0;
            }
            // Research banks only on a solvent turn, bounded by what is
            // actually left after the bill
            let after = state.house(house).map(|h| h.treasury).unwrap_or(0);
            economy::bank_research(&mut state, house, tax.min(after));
        } else {
            let cascade = shortfall::process_shortfall(&state, house, upkeep, config);
            shortfall::apply_shortfall_cascade(&mut state, &cascade, &mut events);
        }

        capacity::enforce_house_capacity(&mut state, house, config, &mut events);
        for colony in state.colonies_owned(house) {
            capacity::enforce_colony_fighters(&mut state, colony, config, &mut events);
        }
    }
    intel::record_observations(&mut state);

    // ------------------------------------------------------------------
    // Phase 3: Command (sequential)
    // ------------------------------------------------------------------
    construction::commission_pending(&mut state, config, &mut events);
    construction::run_colony_automation(&mut state, config, &mut events);
    fleet::activate_standing_orders(&mut state, &mut events);

    for (&house, packet) in &effective_packets {
        if !state.house(house).is_some_and(|h| h.is_playing()) {
            continue;
        }
        run_command_phase_for_house(&mut state, house, packet, config, &mut events);
    }
    fleet::run_arrived_commands(&mut state, config, &mut events);
    intel::record_observations(&mut state);

    // ------------------------------------------------------------------
    // Phase 4: Maintenance (sequential)
    // ------------------------------------------------------------------
    construction::advance_queues(&mut state, config, &mut events);
    economy::advance_transfers(&mut state, &mut events);
    diplomacy::process_diplomatic_decay(&mut state, config, &mut events);
    for house in state.houses.ids_sorted() {
        economy::award_research(&mut state, house, config, &mut events);
    }
    update_house_statuses(&mut state, config, &mut events);
    fleet::run_fleet_movement(&mut state, &mut events);
    intel::record_observations(&mut state);

    // ------------------------------------------------------------------
    // End-of-turn validation
    // ------------------------------------------------------------------
    for colony_id in state.colonies.ids_sorted() {
        if let Some(colony) = state.colony(colony_id) {
            if !colony.unassigned_squadrons.is_empty() {
                return Err(StateError::InvalidTransition {
                    detail: format!("{colony_id} ended the turn with unassigned squadrons"),
                }
                .into());
            }
        }
    }
    for &ship in &carryover_commissions {
        if state.pending_commissions.iter().any(|p| p.ship == ship) {
            return Err(StateError::InvalidTransition {
                detail: format!("commission of {ship} was left, not moved"),
            }
            .into());
        }
    }
    state.validate_invariants(config)?;

    state.turn += 1;

    // Per-house filtered views are derived last, from the committed state
    let mut player_states = BTreeMap::new();
    for house in state.houses.ids_sorted() {
        player_states.insert(
            house,
            intel::build_player_state(&state, config, house, &events, &combat_reports),
        );
    }

    Ok(TurnOutcome {
        state,
        events: events.into_events(),
        combat_reports,
        player_states,
    })
}

// ============================================================================
// Packet intake and AI-mode substitution
// ============================================================================

fn intake_packets(
    state: &mut GameState,
    packets: &BTreeMap<HouseId, CommandPacket>,
    config: &GameConfig,
    events: &mut EventLog,
) -> BTreeMap<HouseId, CommandPacket> {
    let turn = state.turn;
    let mut effective = BTreeMap::new();

    for house in state.houses.ids_sorted() {
        let Some(record) = state.house(house) else {
            continue;
        };
        if record.status == HouseStatus::Eliminated {
            continue;
        }

        let submitted = packets
            .get(&house)
            .filter(|p| match validate_packet(state, p) {
                Ok(()) => true,
                Err(rejection) => {
                    log::warn!("{rejection}");
                    events.emit(
                        turn,
                        Some(house),
                        None,
                        None,
                        rejection.to_string(),
                        EventPayload::OrderRejected {
                            reason: rejection.reason.clone(),
                        },
                    );
                    false
                }
            });

        match submitted {
            Some(packet) => {
                let restored = {
                    let h = state.house_mut(house).expect("house exists");
                    h.missed_submissions = 0;
                    // A fresh submission returns an autopiloted house to
                    // its player
                    if h.status == HouseStatus::Autopilot {
                        h.status = HouseStatus::Active;
                        true
                    } else {
                        false
                    }
                };
                if restored {
                    events.emit(
                        turn,
                        Some(house),
                        None,
                        None,
                        format!("{house} resumed player control"),
                        EventPayload::HouseStatusChanged {
                            status: HouseStatus::Active,
                        },
                    );
                }
                // Non-Active statuses override the player's packet
                let status = state.house(house).map(|h| h.status);
                match status {
                    Some(HouseStatus::Active) => {
                        effective.insert(house, packet.clone());
                    }
                    Some(HouseStatus::DefensiveCollapse) => {
                        effective.insert(house, defensive_packet(state, house, turn));
                    }
                    _ => {
                        effective.insert(house, CommandPacket::empty(house, turn));
                    }
                }
            }
            None => {
                let status = {
                    let h = state.house_mut(house).expect("house exists");
                    h.missed_submissions = h.missed_submissions.saturating_add(1);
                    if h.status == HouseStatus::Active
                        && h.missed_submissions >= config.gameplay.autopilot_threshold
                    {
                        h.status = HouseStatus::Autopilot;
                        events.emit(
                            turn,
                            Some(house),
                            None,
                            None,
                            format!("{house} placed on autopilot"),
                            EventPayload::HouseStatusChanged {
                                status: HouseStatus::Autopilot,
                            },
                        );
                    }
                    h.status
                };
                let packet = match status {
                    HouseStatus::DefensiveCollapse => defensive_packet(state, house, turn),
                    // Autopilot and still-active no-shows both get bare
                    // maintenance: no builds, no diplomacy
                    _ => CommandPacket::empty(house, turn),
                };
                effective.insert(house, packet);
            }
        }
    }
    effective
}

/// Defensive Collapse: every fleet guards home or runs for it.
fn defensive_packet(state: &GameState, house: HouseId, turn: u32) -> CommandPacket {
    let mut packet = CommandPacket::empty(house, turn);
    for fleet_id in state.fleets_owned(house) {
        let Some(record) = state.fleet(fleet_id) else {
            continue;
        };
        if record.status != FleetStatus::Active || record.mission == MissionState::ScoutLocked {
            continue;
        }
        let at_own_colony = state
            .colony_at(record.location)
            .and_then(|c| state.colony(c))
            .is_some_and(|c| c.owner == house);
        let command = if at_own_colony {
            FleetCommand::GuardColony
        } else {
            FleetCommand::SeekHome
        };
        packet.fleet_commands.push(FleetOrder {
            fleet: fleet_id,
            command,
            priority: 0,
            roe: None,
        });
    }
    packet
}

// ============================================================================
// Per-house Command phase
// ============================================================================

fn run_command_phase_for_house(
    state: &mut GameState,
    house: HouseId,
    packet: &CommandPacket,
    config: &GameConfig,
    events: &mut EventLog,
) {
    let turn = state.turn;

    // Espionage pool investments come out of the treasury first
    let treasury = state.house(house).map(|h| h.treasury).unwrap_or(0);
    let ebp = packet.ebp_investment.clamp(0, treasury);
    let cip = packet.cip_investment.clamp(0, (treasury - ebp).max(0));
    if ebp > 0 || cip > 0 {
        if let Some(h) = state.house_mut(house) {
            h.treasury -= ebp + cip;
            h.ebp += ebp;
            h.cip += cip;
        }
    }

    if let Some(h) = state.house_mut(house) {
        h.research_allocation = packet.research_allocation.clone();
    }

    for command in &packet.zero_turn_commands {
        if let Err(reason) = fleet::execute_zero_turn(state, house, command, config, events) {
            reject(events, turn, house, &reason);
        }
    }

    for command in &packet.diplomatic_commands {
        let result = match *command {
            DiplomaticCommand::DeclareHostile { target } => {
                diplomacy::declare_hostile(state, house, target, events);
                Ok(())
            }
            DiplomaticCommand::DeclareEnemy { target } => {
                diplomacy::declare_enemy(state, house, target, events);
                Ok(())
            }
            DiplomaticCommand::ProposePact { target } => {
                match diplomacy::pact_obstacle(state, house, target, config) {
                    Some(reason) => Err(reason),
                    None => {
                        diplomacy::propose_pact(state, house, target);
                        Ok(())
                    }
                }
            }
            DiplomaticCommand::AcceptPact { target } => {
                diplomacy::accept_pact(state, house, target, config, events)
            }
            DiplomaticCommand::BreakPact { target } => {
                diplomacy::break_pact(state, house, target);
                Ok(())
            }
            DiplomaticCommand::ProposeCeasefire { target } => {
                diplomacy::propose_ceasefire(state, house, target, events);
                Ok(())
            }
            DiplomaticCommand::AcceptCeasefire { target } => {
                diplomacy::accept_ceasefire(state, house, target, events)
            }
        };
        if let Err(reason) = result {
            reject(events, turn, house, &reason);
        }
    }

    // Fleet orders: priority first, then packet order
    let mut orders: Vec<(usize, &FleetOrder)> = packet.fleet_commands.iter().enumerate().collect();
    orders.sort_by_key(|(i, o)| (o.priority, *i));
    for (_, order) in orders {
        if let Err(reason) = fleet::accept_fleet_order(state, house, order, events) {
            reject(events, turn, house, &reason);
        }
    }

    for order in &packet.build_commands {
        match construction::validate_build(state, house, order, config) {
            Ok((cost, facility, turns)) => {
                construction::start_build(state, house, order, cost, facility, turns, events);
            }
            Err(reason) => reject(events, turn, house, &reason),
        }
    }
    for order in &packet.repair_commands {
        match construction::validate_repair(state, house, order, config) {
            Ok((cost, dock)) => {
                construction::start_repair(state, house, order, cost, dock);
            }
            Err(reason) => reject(events, turn, house, &reason),
        }
    }
    for order in &packet.scrap_commands {
        if let Err(reason) = construction::execute_scrap(state, house, order, config, events) {
            reject(events, turn, house, &reason);
        }
    }

    for order in &packet.population_transfers {
        match economy::validate_transfer(state, house, order.from, order.to, order.units, config) {
            Ok(cost) => {
                economy::start_transfer(state, house, order.from, order.to, order.units, cost);
            }
            Err(reason) => reject(events, turn, house, &reason),
        }
    }

    for order in &packet.terraform_commands {
        let build = crate::input::BuildOrder {
            colony: order.colony,
            target: crate::entities::BuildTarget::Terraform,
            facility: None,
        };
        match construction::validate_build(state, house, &build, config) {
            Ok((cost, facility, turns)) => {
                construction::start_build(state, house, &build, cost, facility, turns, events);
            }
            Err(reason) => reject(events, turn, house, &reason),
        }
    }

    for order in &packet.colony_management {
        let owned = state
            .colony(order.colony)
            .is_some_and(|c| c.owner == house);
        if !owned {
            reject(events, turn, house, "colony is not yours");
            continue;
        }
        if let Some(c) = state.colony_mut(order.colony) {
            if let Some(rate) = order.tax_rate {
                c.tax_rate = Some(crate::bounded::new_tax_rate(rate));
            }
            if let Some(automation) = order.automation {
                c.automation = automation;
            }
        }
    }
}

fn reject(events: &mut EventLog, turn: u32, house: HouseId, reason: &str) {
    events.emit(
        turn,
        Some(house),
        None,
        None,
        format!("order rejected: {reason}"),
        EventPayload::OrderRejected {
            reason: reason.to_string(),
        },
    );
}

// ============================================================================
// House status transitions (Maintenance)
// ============================================================================

fn update_house_statuses(state: &mut GameState, config: &GameConfig, events: &mut EventLog) {
    let turn = state.turn;
    for house in state.houses.ids_sorted() {
        let Some(record) = state.house(house) else {
            continue;
        };
        if record.status == HouseStatus::Eliminated {
            continue;
        }

        // Prestige collapse counter
        let (prestige, mut negative_turns) = (record.prestige, record.negative_prestige_turns);
        if prestige < 0 {
            negative_turns = negative_turns.saturating_add(1);
        } else {
            negative_turns = 0;
        }
        let collapse = negative_turns >= config.gameplay.defensive_collapse_threshold
            && record.status == HouseStatus::Active;
        // Collapse lifts once prestige climbs back above water
        let recover = record.status == HouseStatus::DefensiveCollapse && prestige >= 0;
        {
            let h = state.house_mut(house).expect("house exists");
            h.negative_prestige_turns = negative_turns;
            if collapse {
                h.status = HouseStatus::DefensiveCollapse;
            } else if recover {
                h.status = HouseStatus::Active;
            }
        }
        if collapse || recover {
            let status = if collapse {
                HouseStatus::DefensiveCollapse
            } else {
                HouseStatus::Active
            };
            events.emit(
                turn,
                Some(house),
                None,
                None,
                format!("{house} status changed to {status:?}"),
                EventPayload::HouseStatusChanged { status },
            );
        }

        // Elimination: no colonies and no fleets. Terminal.
        let eliminated = state.colonies_owned(house).is_empty()
            && state.fleets_owned(house).is_empty();
        if eliminated {
            if let Some(h) = state.house_mut(house) {
                h.status = HouseStatus::Eliminated;
            }
            events.emit(
                turn,
                Some(house),
                None,
                None,
                format!("{house} has been eliminated"),
                EventPayload::HouseEliminated,
            );
        }
    }
}

#[cfg(test)]
#[path = "step_tests.rs"]
mod tests;
