//! Planetary combat: orbital bombardment and ground invasion.
//!
//! Resolved during the Conflict phase after space and orbital combat, one
//! colony at a time. Bombardment grinds industry and ground forces from
//! orbit unless a planetary shield holds; invasion lands marines against
//! the garrison, and a blitz trades bombardment preparation for speed at
//! the cost of a tougher defense.

use crate::config::GameConfig;
use crate::entities::{GroundUnitKind, GroundUnitSite, ShipClass};
use crate::events::{EventLog, EventPayload};
use crate::fixed::Fixed;
use crate::ids::{ColonyId, FleetId, GroundUnitId, HouseId};
use crate::state::GameState;
use crate::systems::combat::effective_attack;

fn colony_has_shield(state: &GameState, colony: ColonyId) -> bool {
    state
        .ground_units_at(colony)
        .iter()
        .filter_map(|&u| state.ground_unit(u))
        .any(|u| u.kind == GroundUnitKind::PlanetaryShield)
}

fn garrison_strength(state: &GameState, colony: ColonyId, config: &GameConfig) -> i64 {
    state
        .ground_units_at(colony)
        .iter()
        .filter_map(|&u| state.ground_unit(u))
        .filter(|u| u.kind != GroundUnitKind::PlanetaryShield)
        .map(|u| config.ground_units.get(u.kind).strength)
        .sum()
}

fn fleet_orbital_attack(state: &GameState, fleet: FleetId, config: &GameConfig) -> Fixed {
    let Some(f) = state.fleet(fleet) else {
        return Fixed::ZERO;
    };
    let wep = state.house(f.owner).map(|h| h.tech.wep).unwrap_or(1);
    state
        .squadrons_of(fleet)
        .iter()
        .filter_map(|&s| state.squadron(s))
        .flat_map(|s| s.all_ships().collect::<Vec<_>>())
        .filter_map(|ship| state.ship(ship))
        .map(|ship| effective_attack(config.ships.get(ship.class).attack, wep, ship.crippled))
        .fold(Fixed::ZERO, |a, b| a + b)
}

/// Marines embarked on the fleet's transports.
pub fn marines_aboard(state: &GameState, fleet: FleetId) -> Vec<GroundUnitId> {
    state
        .squadrons_of(fleet)
        .iter()
        .filter_map(|&s| state.squadron(s))
        .flat_map(|s| s.all_ships().collect::<Vec<_>>())
        .filter_map(|ship| state.ship(ship))
        .filter(|ship| ship.class == ShipClass::TroopTransport)
        .flat_map(|ship| state.ground_units_aboard(ship.id))
        .filter(|&u| {
            state
                .ground_unit(u)
                .is_some_and(|g| g.kind == GroundUnitKind::Marine)
        })
        .collect()
}

/// Orbital bombardment of one colony. A planetary shield blocks all
/// structural damage; otherwise industry burns and exposed ground units
/// die, ground batteries first claiming their return fire.
pub fn run_bombardment(
    state: &mut GameState,
    config: &GameConfig,
    fleet: FleetId,
    colony: ColonyId,
    events: &mut EventLog,
) {
    let turn = state.turn;
    let Some(attacker) = state.fleet(fleet).map(|f| f.owner) else {
        return;
    };
    let system = state.colony(colony).map(|c| c.system);

    if colony_has_shield(state, colony) {
        events.emit(
            turn,
            Some(attacker),
            system,
            Some(fleet),
            format!("bombardment of {colony} stopped by planetary shield"),
            EventPayload::BombardmentResolved {
                colony_id: colony,
                industry_destroyed: 0,
            },
        );
        return;
    }

    let attack = fleet_orbital_attack(state, fleet, config);
    let multiplier = {
        let roll = state.roll_2d6();
        config.combat.multiplier_for(roll)
    };
    // One IU burns per 5 points of delivered bombardment
    let destroyed = (attack * multiplier / Fixed::from_int(5)).to_int();
    let actually_destroyed = {
        let Some(c) = state.colony_mut(colony) else {
            return;
        };
        let burn = destroyed.min(c.industry);
        c.industry -= burn;
        burn
    };

    // Heavy bombardment also catches exposed ground units, batteries last
    if destroyed > actually_destroyed {
        let mut exposed: Vec<GroundUnitId> = state
            .ground_units_at(colony)
            .into_iter()
            .filter(|&u| {
                state.ground_unit(u).is_some_and(|g| {
                    matches!(g.kind, GroundUnitKind::Army | GroundUnitKind::Marine)
                })
            })
            .collect();
        exposed.sort();
        for unit in exposed.into_iter().take((destroyed - actually_destroyed) as usize) {
            let _ = state.del_ground_unit(unit);
        }
    }

    events.emit(
        turn,
        Some(attacker),
        system,
        Some(fleet),
        format!("bombardment of {colony} destroyed {actually_destroyed} IU"),
        EventPayload::BombardmentResolved {
            colony_id: colony,
            industry_destroyed: actually_destroyed,
        },
    );
}

/// Ground invasion. Returns whether the colony fell.
///
/// Strength contest between landed marines and the garrison, each side
/// scaled by a roll; a blitz skips preparatory suppression, stiffening the
/// garrison by half. The loser's ground forces are annihilated; the winner
/// keeps a roll-proportional remainder.
pub fn run_invasion(
    state: &mut GameState,
    config: &GameConfig,
    fleet: FleetId,
    colony: ColonyId,
    blitz: bool,
    events: &mut EventLog,
) -> bool {
    let turn = state.turn;
    let Some(attacker) = state.fleet(fleet).map(|f| f.owner) else {
        return false;
    };
    let Some(defender) = state.colony(colony).map(|c| c.owner) else {
        return false;
    };
    let system = state.colony(colony).map(|c| c.system);

    let marines = marines_aboard(state, fleet);
    if marines.is_empty() {
        events.emit(
            turn,
            Some(attacker),
            system,
            Some(fleet),
            format!("invasion of {colony} aborted: no marines aboard"),
            EventPayload::OrderAborted {
                reason: "no marines embarked".into(),
            },
        );
        return false;
    }

    let marine_strength = config.ground_units.marine.strength * marines.len() as i64;
    let mut garrison = garrison_strength(state, colony, config);
    if blitz {
        garrison += garrison / 2;
    }

    let attack_roll = state.roll_2d6();
    let defense_roll = state.roll_2d6();
    let attack_power = Fixed::from_int(marine_strength) * Fixed::from_int(attack_roll as i64);
    let defense_power = Fixed::from_int(garrison) * Fixed::from_int(defense_roll as i64);

    let captured = attack_power > defense_power;
    if captured {
        // Garrison annihilated; survivors among the marines land
        for unit in state.ground_units_at(colony) {
            let _ = state.del_ground_unit(unit);
        }
        let survivors = if attack_power > Fixed::ZERO {
            let loss_ratio = defense_power / attack_power;
            let lost = (Fixed::from_int(marines.len() as i64) * loss_ratio).to_int();
            marines.len() as i64 - lost
        } else {
            0
        }
        .max(1) as usize;

        for (i, &marine) in marines.iter().enumerate() {
            if i < survivors {
                let _ = state.move_ground_unit(marine, GroundUnitSite::Colony(colony));
            } else {
                let _ = state.del_ground_unit(marine);
            }
        }

        // Conquest wipes the pipeline and the previous owner's automation
        for project in state.projects_at(colony) {
            let _ = state.del_construction_project(project);
        }
        let repairs = state
            .colony(colony)
            .map(|c| c.repair_queue.clone())
            .unwrap_or_default();
        for repair in repairs {
            let _ = state.del_repair_project(repair);
        }
        let _ = state.transfer_colony(colony, attacker);
        if let Some(c) = state.colony_mut(colony) {
            c.blockaded = false;
            c.blockading_houses.clear();
        }

        // Taking a rival's last colony carries its own weight
        let defender_broken = state.colonies_owned(defender).is_empty();
        if let Some(h) = state.house_mut(attacker) {
            h.prestige += config.prestige.combat_victory;
            if defender_broken {
                h.prestige += config.prestige.house_eliminated_bonus;
            }
        }
        if let Some(h) = state.house_mut(defender) {
            h.prestige += config.prestige.colony_lost;
        }
        events.emit(
            turn,
            Some(defender),
            system,
            None,
            format!("{colony} fell to {attacker}"),
            EventPayload::ColonyLost {
                colony_id: colony,
                to_house: Some(attacker),
            },
        );
    } else {
        // Repulsed: the landing force is lost, defenders take casualties
        for &marine in &marines {
            let _ = state.del_ground_unit(marine);
        }
        let mut defenders: Vec<GroundUnitId> = state
            .ground_units_at(colony)
            .into_iter()
            .filter(|&u| {
                state.ground_unit(u).is_some_and(|g| {
                    matches!(g.kind, GroundUnitKind::Army | GroundUnitKind::Marine)
                })
            })
            .collect();
        defenders.sort();
        let casualties = if defense_power > Fixed::ZERO {
            (Fixed::from_int(defenders.len() as i64) * (attack_power / defense_power)
                * Fixed::HALF)
                .to_int() as usize
        } else {
            0
        };
        for unit in defenders.into_iter().take(casualties) {
            let _ = state.del_ground_unit(unit);
        }
    }

    events.emit(
        turn,
        Some(attacker),
        system,
        Some(fleet),
        if captured {
            format!("invasion captured {colony}")
        } else {
            format!("invasion of {colony} repulsed")
        },
        EventPayload::InvasionResolved {
            colony_id: colony,
            captured,
        },
    );
    captured
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SystemId;
    use crate::testing::{test_config, GameStateBuilder};

    /// Attacker fleet with marines aboard a transport, defender colony.
    fn invasion_setup(
        garrison_armies: usize,
        marines: usize,
    ) -> (GameState, FleetId, ColonyId) {
        let mut builder = GameStateBuilder::new()
            .with_house("Atreides")
            .with_house("Harkonnen")
            .with_line_map(2);
        let colony = builder.add_colony(HouseId(2), SystemId(1), 200);
        for _ in 0..garrison_armies {
            builder.add_ground_unit(HouseId(2), colony, GroundUnitKind::Army);
        }
        let fleet = builder.add_fleet(HouseId(1), SystemId(1));
        let squadron = builder.add_squadron(
            fleet,
            ShipClass::LightCruiser,
            &[ShipClass::TroopTransport],
        );
        let state = builder.state_mut();
        let transport = state
            .squadron(squadron)
            .unwrap()
            .ships
            .iter()
            .copied()
            .find(|&s| state.ship(s).unwrap().class == ShipClass::TroopTransport)
            .unwrap();
        for _ in 0..marines {
            state.add_ground_unit(
                HouseId(1),
                GroundUnitKind::Marine,
                GroundUnitSite::Transport(transport),
            );
        }
        (builder.build(), fleet, colony)
    }

    #[test]
    fn marines_aboard_finds_embarked_units() {
        let (state, fleet, _) = invasion_setup(1, 4);
        assert_eq!(marines_aboard(&state, fleet).len(), 4);
    }

    #[test]
    fn invasion_without_marines_aborts() {
        let config = test_config();
        let (mut state, fleet, colony) = invasion_setup(1, 0);
        let mut events = EventLog::default();
        let captured = run_invasion(&mut state, &config, fleet, colony, false, &mut events);
        assert!(!captured);
        assert_eq!(state.colony(colony).unwrap().owner, HouseId(2));
    }

    #[test]
    fn overwhelming_invasion_captures_and_lands_marines() {
        let config = test_config();
        // 12 marines (36 strength) against one army (2 strength): even the
        // worst roll split (2 vs 12) leaves 72 > 24
        let (mut state, fleet, colony) = invasion_setup(1, 12);
        let mut events = EventLog::default();
        let captured = run_invasion(&mut state, &config, fleet, colony, false, &mut events);
        assert!(captured);
        let col = state.colony(colony).unwrap();
        assert_eq!(col.owner, HouseId(1));
        assert_eq!(state.colonies_owned(HouseId(1)), vec![colony]);
        assert!(state.colonies_owned(HouseId(2)).is_empty());
        // At least one marine garrisons the conquest
        assert!(!state.ground_units_at(colony).is_empty());
        state.validate_invariants(&config).unwrap();
    }

    #[test]
    fn hopeless_invasion_is_repulsed() {
        let config = test_config();
        // One marine (3) against twelve armies (24): worst split 36 vs 48
        let (mut state, fleet, colony) = invasion_setup(12, 1);
        let mut events = EventLog::default();
        let captured = run_invasion(&mut state, &config, fleet, colony, false, &mut events);
        assert!(!captured);
        assert_eq!(state.colony(colony).unwrap().owner, HouseId(2));
        // The landing force is gone
        assert!(marines_aboard(&state, fleet).is_empty());
    }

    #[test]
    fn shield_blocks_bombardment() {
        let config = test_config();
        let (mut state, fleet, colony) = invasion_setup(0, 0);
        state.colony_mut(colony).unwrap().industry = 40;
        state.add_ground_unit(
            HouseId(2),
            GroundUnitKind::PlanetaryShield,
            GroundUnitSite::Colony(colony),
        );
        let mut events = EventLog::default();
        run_bombardment(&mut state, &config, fleet, colony, &mut events);
        assert_eq!(state.colony(colony).unwrap().industry, 40);
    }

    #[test]
    fn bombardment_burns_industry() {
        let config = test_config();
        let (mut state, fleet, colony) = invasion_setup(0, 0);
        state.colony_mut(colony).unwrap().industry = 40;
        let mut events = EventLog::default();
        run_bombardment(&mut state, &config, fleet, colony, &mut events);
        // LightCruiser AS 6: at worst multiplier 0 nothing burns, at best
        // 1.25 → one IU; either way industry never grows
        assert!(state.colony(colony).unwrap().industry <= 40);
    }
}
