//! Whole-turn integration tests: the boundary scenarios, the determinism
//! contract, and the cross-phase pipeline properties.

use super::*;
use crate::bounded::new_tax_rate;
use crate::config::CONFIG_SCHEMA_VERSION;
use crate::entities::{BuildTarget, Cargo, CargoKind, DiplomaticStance, ShipClass};
use crate::ids::SystemId;
use crate::input::BuildOrder;
use crate::report::VisibilityLevel;
use crate::testing::{test_config, GameStateBuilder};

fn empty_packets(state: &GameState) -> BTreeMap<HouseId, CommandPacket> {
    state
        .houses
        .ids_sorted()
        .into_iter()
        .map(|h| (h, CommandPacket::empty(h, state.turn)))
        .collect()
}

/// Smallest playable game: two houses, two systems, one colony and one
/// small fleet each, no orders.
fn minimal_game() -> GameState {
    let mut builder = GameStateBuilder::new()
        .with_house("Atreides")
        .with_house("Harkonnen")
        .with_line_map(2);
    builder.add_colony(HouseId(1), SystemId(1), 100);
    builder.add_colony(HouseId(2), SystemId(2), 100);
    let a = builder.add_fleet(HouseId(1), SystemId(1));
    builder.add_squadron(a, ShipClass::Destroyer, &[]);
    let b = builder.add_fleet(HouseId(2), SystemId(2));
    builder.add_squadron(b, ShipClass::Corvette, &[]);
    builder.build()
}

#[test]
fn minimal_turn_advances_quietly() {
    let config = test_config();
    let state = minimal_game();
    let packets = empty_packets(&state);

    let outcome = resolve_turn(&state, &packets, &config).unwrap();
    let next = &outcome.state;

    assert_eq!(next.turn, 2);
    assert!(outcome.combat_reports.is_empty());

    // GCO 100 → tax 50 at the default 50% policy; upkeep 2 and 1
    assert_eq!(next.house(HouseId(1)).unwrap().treasury, 100 + 50 - 2);
    assert_eq!(next.house(HouseId(2)).unwrap().treasury, 100 + 50 - 1);
    assert_eq!(next.house(HouseId(1)).unwrap().consecutive_shortfalls, 0);

    // Logistic growth: 0.08 × 100 × (1 − 100/1500) ≈ 7
    for house in [HouseId(1), HouseId(2)] {
        let colony = next.colonies_owned(house)[0];
        assert_eq!(next.colony(colony).unwrap().population, 107);
    }

    // Nothing but resource ticks in the log
    assert!(outcome
        .events
        .iter()
        .all(|e| matches!(e.payload, EventPayload::IncomeCollected { .. })));
}

/// An insolvent house runs the cascade inside a full turn.
#[test]
fn shortfall_cascade_through_turn() {
    let config = test_config();
    let mut builder = GameStateBuilder::new().with_house("Atreides").with_line_map(2);
    let colony = builder.add_colony(HouseId(1), SystemId(1), 10);
    builder.add_neoria(colony, crate::entities::NeoriaClass::Shipyard);
    let fleet = builder.add_fleet(HouseId(1), SystemId(1));
    builder.add_squadron(fleet, ShipClass::LightCruiser, &[ShipClass::Destroyer]);
    {
        let state = builder.state_mut();
        let house = state.house_mut(HouseId(1)).unwrap();
        house.treasury = 0;
        house.consecutive_shortfalls = 1;
        house.tax_policy = new_tax_rate(0);
    }
    let state = builder.build();
    let packets = empty_packets(&state);

    let outcome = resolve_turn(&state, &packets, &config).unwrap();
    let next = &outcome.state;
    let house = next.house(HouseId(1)).unwrap();

    // Upkeep 11 (5 + 2 + 4) against an empty treasury: the combat fleet is
    // liquidated for 25% of (48 + 32) = 20 PP, which covers the bill
    assert!(next.fleet(fleet).is_none());
    assert_eq!(house.treasury, 20);
    assert_eq!(house.prestige, -11); // second consecutive shortfall
    assert_eq!(house.consecutive_shortfalls, 2);
    // The shipyard survived: salvage closed the gap before stripping
    assert_eq!(next.colony(colony).unwrap().neorias.len(), 1);
    assert!(outcome
        .events
        .iter()
        .any(|e| matches!(e.payload, EventPayload::FleetDisbanded { salvage: 20 })));
}

/// The two-turn blockade flow: the order is accepted
/// in turn 1's Command phase, classified in turn 2's Conflict phase, and
/// the blockade both crushes GCO and constitutes a pact violation.
#[test]
fn blockade_crushes_gco_and_violates_peace() {
    let config = test_config();
    let mut builder = GameStateBuilder::new()
        .with_house("Atreides")
        .with_house("Harkonnen")
        .with_line_map(2);
    let colony = builder.add_colony(HouseId(2), SystemId(2), 500);
    let fleet = builder.add_fleet(HouseId(1), SystemId(2));
    builder.add_squadron(fleet, ShipClass::Destroyer, &[]);
    {
        let state = builder.state_mut();
        state.colony_mut(colony).unwrap().industry = 100;
        let house = state.house_mut(HouseId(2)).unwrap();
        house.tech.el = 2;
        house.tech.cst = 2;
        // Harkonnen taxes at zero so the GCO number reads off the event
        house.tax_policy = new_tax_rate(0);
    }
    let state = builder.build();

    // Turn 1: submit the blockade order
    let mut packets = empty_packets(&state);
    packets.get_mut(&HouseId(1)).unwrap().fleet_commands.push(
        crate::input::FleetOrder {
            fleet,
            command: FleetCommand::Blockade { system: SystemId(2) },
            priority: 0,
            roe: None,
        },
    );
    let outcome = resolve_turn(&state, &packets, &config).unwrap();
    assert!(!outcome.state.colony(colony).unwrap().blockaded);

    // Turn 2: Conflict classifies the blockade
    let state = outcome.state;
    let packets = empty_packets(&state);
    let outcome = resolve_turn(&state, &packets, &config).unwrap();
    let next = &outcome.state;

    let col = next.colony(colony).unwrap();
    assert!(col.blockaded);
    assert_eq!(col.blockading_houses, vec![HouseId(1)]);

    // Blockaded GCO: (500 + 100×1.05×1.10) × 0.4 = 246
    let gco = outcome
        .events
        .iter()
        .find_map(|e| match e.payload {
            EventPayload::IncomeCollected { gco, .. } if e.house_id == Some(HouseId(2)) => {
                Some(gco)
            }
            _ => None,
        })
        .expect("income event for the blockaded house");
    assert_eq!(gco, 246);

    // Blockading a neutral is a pact violation: Enemy both ways, the
    // violator dishonored and bleeding prestige
    assert_eq!(
        next.diplomacy.stance(HouseId(1), HouseId(2)),
        DiplomaticStance::Enemy
    );
    assert_eq!(
        next.diplomacy.stance(HouseId(2), HouseId(1)),
        DiplomaticStance::Enemy
    );
    assert!(crate::systems::diplomacy::is_dishonored(next, HouseId(1)));
    assert!(next.house(HouseId(1)).unwrap().prestige <= config.prestige.pact_violation);
    // And the victim bleeds the per-colony blockade prestige
    assert!(next.house(HouseId(2)).unwrap().prestige <= config.prestige.blockaded_colony_per_turn);
}

/// Colonize executes within the turn when the fleet is already on site.
#[test]
fn colonize_founds_colony() {
    let config = test_config();
    let mut builder = GameStateBuilder::new().with_house("Atreides").with_line_map(3);
    builder.add_colony(HouseId(1), SystemId(1), 200);
    let fleet = builder.add_fleet(HouseId(1), SystemId(2));
    let squadron = builder.add_squadron(fleet, ShipClass::LightCruiser, &[ShipClass::Etac]);
    let etac = {
        let state = builder.state_mut();
        let etac = state
            .squadron(squadron)
            .unwrap()
            .ships
            .iter()
            .copied()
            .find(|&s| state.ship(s).unwrap().class == ShipClass::Etac)
            .unwrap();
        state.ship_mut(etac).unwrap().cargo = Some(Cargo {
            kind: CargoKind::Colonists,
            units: 50,
        });
        etac
    };
    let state = builder.build();

    let mut packets = empty_packets(&state);
    packets.get_mut(&HouseId(1)).unwrap().fleet_commands.push(
        crate::input::FleetOrder {
            fleet,
            command: FleetCommand::Colonize { system: SystemId(2) },
            priority: 0,
            roe: None,
        },
    );
    let outcome = resolve_turn(&state, &packets, &config).unwrap();
    let next = &outcome.state;

    let colony = next.colony_at(SystemId(2)).expect("colony founded");
    let record = next.colony(colony).unwrap();
    assert_eq!(record.owner, HouseId(1));
    // 50 colonists landed, then one growth tick ran in the same turn's
    // Income phase? No: Income precedes Command, so the founding
    // population is untouched this turn.
    assert_eq!(record.population, 50);
    assert!(next.colonies_owned(HouseId(1)).contains(&colony));
    assert_eq!(next.ship(etac).unwrap().cargo, None);
    assert!(outcome
        .events
        .iter()
        .any(|e| matches!(e.payload, EventPayload::ColonyFounded { .. })));
}

/// Two runs of the same inputs are bit-identical, including
/// through combat randomness.
#[test]
fn determinism_across_eventful_turns() {
    let config = test_config();
    let build = || {
        let mut builder = GameStateBuilder::new()
            .with_house("Atreides")
            .with_house("Harkonnen")
            .with_line_map(3);
        builder.add_colony(HouseId(1), SystemId(1), 300);
        builder.add_colony(HouseId(2), SystemId(3), 300);
        let a = builder.add_fleet(HouseId(1), SystemId(2));
        builder.add_squadron(a, ShipClass::Battleship, &[ShipClass::Destroyer]);
        let b = builder.add_fleet(HouseId(2), SystemId(2));
        builder.add_squadron(b, ShipClass::Battlecruiser, &[ShipClass::Frigate]);
        {
            let state = builder.state_mut();
            state.diplomacy.relation_mut(HouseId(1), HouseId(2)).stance = DiplomaticStance::Enemy;
            state.diplomacy.relation_mut(HouseId(2), HouseId(1)).stance = DiplomaticStance::Enemy;
        }
        builder.build()
    };

    let mut runs = Vec::new();
    for _ in 0..2 {
        let mut state = build();
        let mut all_events = Vec::new();
        for _ in 0..3 {
            let packets = empty_packets(&state);
            let outcome = resolve_turn(&state, &packets, &config).unwrap();
            state = outcome.state;
            all_events.extend(outcome.events);
        }
        runs.push((state.state_hash(), all_events));
    }
    assert_eq!(runs[0].0, runs[1].0);
    assert_eq!(runs[0].1, runs[1].1);
}

/// A zero-command packet changes nothing except the
/// turn counter and time-driven advancement.
#[test]
fn empty_packet_changes_only_time_driven_state() {
    let config = test_config();
    let state = minimal_game();
    let packets = empty_packets(&state);
    let outcome = resolve_turn(&state, &packets, &config).unwrap();
    let next = &outcome.state;

    assert_eq!(next.turn, state.turn + 1);
    // Structure untouched: same colonies, fleets, squadrons, diplomacy
    assert_eq!(
        next.colonies_owned(HouseId(1)),
        state.colonies_owned(HouseId(1))
    );
    assert_eq!(next.fleets_owned(HouseId(1)), state.fleets_owned(HouseId(1)));
    assert_eq!(next.squadrons.len(), state.squadrons.len());
    assert_eq!(
        next.diplomacy.stance(HouseId(1), HouseId(2)),
        DiplomaticStance::Neutral
    );
}

/// The commissioning pipeline drains; nothing pending at a
/// turn's start survives that turn.
#[test]
fn commission_pipeline_drains_across_turns() {
    let config = test_config();
    let mut builder = GameStateBuilder::new().with_house("Atreides").with_line_map(2);
    let colony = builder.add_colony(HouseId(1), SystemId(1), 300);
    builder.add_neoria(colony, crate::entities::NeoriaClass::Shipyard);
    builder.state_mut().house_mut(HouseId(1)).unwrap().treasury = 500;
    let state = builder.build();

    // Turn 1: order a corvette (1 build turn)
    let mut packets = empty_packets(&state);
    packets.get_mut(&HouseId(1)).unwrap().build_commands.push(BuildOrder {
        colony,
        target: BuildTarget::Ship(ShipClass::Corvette),
        facility: None,
    });
    let outcome = resolve_turn(&state, &packets, &config).unwrap();
    // Completed during Maintenance: waiting for next turn's commissioning
    assert_eq!(outcome.state.pending_commissions.len(), 1);

    // Turn 2: Unified Commissioning assigns it before anything else
    let state = outcome.state;
    let packets = empty_packets(&state);
    let outcome = resolve_turn(&state, &packets, &config).unwrap();
    assert!(outcome.state.pending_commissions.is_empty());
    let fleets = outcome.state.fleets_at(SystemId(1));
    assert_eq!(fleets.len(), 1);
    assert!(outcome
        .events
        .iter()
        .any(|e| matches!(e.payload, EventPayload::CommissionCompleted { .. })));
}

/// Three missed submissions put a house on autopilot; a fresh packet
/// returns control.
#[test]
fn autopilot_after_three_missed_submissions() {
    let config = test_config();
    let mut state = minimal_game();

    for _ in 0..3 {
        // Only house 1 submits
        let mut packets = BTreeMap::new();
        packets.insert(HouseId(1), CommandPacket::empty(HouseId(1), state.turn));
        state = resolve_turn(&state, &packets, &config).unwrap().state;
    }
    assert_eq!(
        state.house(HouseId(2)).unwrap().status,
        crate::entities::HouseStatus::Autopilot
    );

    // One submission restores the player
    let packets = empty_packets(&state);
    let state = resolve_turn(&state, &packets, &config).unwrap().state;
    assert_eq!(
        state.house(HouseId(2)).unwrap().status,
        crate::entities::HouseStatus::Active
    );
}

/// Stale packets are rejected whole and treated as missing.
#[test]
fn stale_packet_is_rejected_and_substituted() {
    let config = test_config();
    let state = minimal_game();
    let mut packets = empty_packets(&state);
    packets.get_mut(&HouseId(2)).unwrap().turn = state.turn + 7;

    let outcome = resolve_turn(&state, &packets, &config).unwrap();
    assert!(outcome
        .events
        .iter()
        .any(|e| e.house_id == Some(HouseId(2))
            && matches!(e.payload, EventPayload::OrderRejected { .. })));
    assert_eq!(outcome.state.house(HouseId(2)).unwrap().missed_submissions, 1);
}

/// Fog-of-war containment: no view mentions a hidden system.
#[test]
fn player_states_respect_fog() {
    let config = test_config();
    let mut builder = GameStateBuilder::new()
        .with_house("Atreides")
        .with_house("Harkonnen")
        .with_line_map(5);
    builder.add_colony(HouseId(1), SystemId(1), 200);
    builder.add_colony(HouseId(2), SystemId(5), 200);
    let state = builder.build();

    let packets = empty_packets(&state);
    let outcome = resolve_turn(&state, &packets, &config).unwrap();

    let view = &outcome.player_states[&HouseId(1)];
    assert_eq!(view.visibility_of(SystemId(5)), VisibilityLevel::None);
    assert!(view.systems.iter().all(|s| s.system != SystemId(5)));
    assert!(view.fleets.iter().all(|f| f.owner == HouseId(1)));

    // Both views carry the config stamp for delta validation
    assert_eq!(view.config_schema_version, CONFIG_SCHEMA_VERSION);
    assert_eq!(view.config_hash, config.content_hash());
}

/// A house that loses everything is eliminated, terminally.
#[test]
fn house_with_nothing_is_eliminated() {
    let config = test_config();
    let mut builder = GameStateBuilder::new()
        .with_house("Atreides")
        .with_house("Harkonnen")
        .with_line_map(2);
    builder.add_colony(HouseId(1), SystemId(1), 200);
    // Harkonnen has no colonies and no fleets at all
    let state = builder.build();

    let packets = empty_packets(&state);
    let outcome = resolve_turn(&state, &packets, &config).unwrap();
    assert_eq!(
        outcome.state.house(HouseId(2)).unwrap().status,
        crate::entities::HouseStatus::Eliminated
    );
    assert!(outcome
        .events
        .iter()
        .any(|e| matches!(e.payload, EventPayload::HouseEliminated)));
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        /// Determinism holds for arbitrary seeds, not just the canonical
        /// 2001.
        #[test]
        fn determinism_for_any_seed(seed in any::<u64>()) {
            let config = test_config();
            let build = |seed| {
                let mut builder = GameStateBuilder::new()
                    .with_house("Atreides")
                    .with_house("Harkonnen")
                    .with_line_map(3)
                    .with_seed(seed);
                builder.add_colony(HouseId(1), SystemId(1), 200);
                builder.add_colony(HouseId(2), SystemId(3), 200);
                let a = builder.add_fleet(HouseId(1), SystemId(2));
                builder.add_squadron(a, ShipClass::Destroyer, &[]);
                let b = builder.add_fleet(HouseId(2), SystemId(2));
                builder.add_squadron(b, ShipClass::Frigate, &[]);
                {
                    let state = builder.state_mut();
                    state.diplomacy.relation_mut(HouseId(1), HouseId(2)).stance =
                        DiplomaticStance::Enemy;
                    state.diplomacy.relation_mut(HouseId(2), HouseId(1)).stance =
                        DiplomaticStance::Enemy;
                }
                builder.build()
            };

            let state_a = build(seed);
            let state_b = build(seed);
            let packets = empty_packets(&state_a);
            let outcome_a = resolve_turn(&state_a, &packets, &config).unwrap();
            let outcome_b = resolve_turn(&state_b, &packets, &config).unwrap();
            prop_assert_eq!(outcome_a.state.state_hash(), outcome_b.state.state_hash());
            prop_assert_eq!(outcome_a.events, outcome_b.events);
        }

        /// ID monotonicity survives arbitrary colonize/build
        /// activity.
        #[test]
        fn ids_stay_monotonic(extra_colonies in 1usize..4) {
            let config = test_config();
            let mut builder = GameStateBuilder::new()
                .with_house("Atreides")
                .with_line_map(6);
            builder.add_colony(HouseId(1), SystemId(1), 500);
            builder.state_mut().house_mut(HouseId(1)).unwrap().treasury = 10_000;
            let mut state = builder.build();

            let mut last_colony = state.colony_mint.high_water();
            for i in 0..extra_colonies {
                let id = state.add_colony(HouseId(1), SystemId(2 + i as u32), 50);
                prop_assert!(id.0 > last_colony);
                last_colony = id.0;
            }
            let packets = empty_packets(&state);
            let outcome = resolve_turn(&state, &packets, &config).unwrap();
            prop_assert!(outcome.state.colony_mint.high_water() >= last_colony);
        }
    }
}
