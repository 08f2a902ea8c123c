//! Income-phase economics: gross colony output, taxation, research
//! banking, logistic population growth, and Space Guild transfers.
//!
//! Houses are processed sequentially in ascending ID by the orchestrator;
//! everything here touches only the house it is given.

use crate::config::GameConfig;
use crate::entities::{FleetStatus, TechField};
use crate::events::{EventLog, EventPayload};
use crate::fixed::Fixed;
use crate::ids::{ColonyId, HouseId, PopulationTransferId};
use crate::state::GameState;

/// Gross Colony Output:
/// `PU × RAW + IU × EL_MOD × CST_MOD × (1 + PROD_GROWTH)`,
/// reduced by the blockade penalty when interdicted.
pub fn colony_gco(state: &GameState, colony: ColonyId, config: &GameConfig) -> Fixed {
    let Some(col) = state.colony(colony) else {
        return Fixed::ZERO;
    };
    let Some(system) = state.map.system(col.system) else {
        return Fixed::ZERO;
    };
    let Some(house) = state.house(col.owner) else {
        return Fixed::ZERO;
    };

    let raw = config.economy.raw_index_for(system.resources);
    let el_mod =
        Fixed::ONE + config.economy.el_mod_step * Fixed::from_int(house.tech.el.max(1) as i64 - 1);
    let cst_mod =
        Fixed::ONE + config.economy.cst_mod_step * Fixed::from_int(house.tech.cst.max(1) as i64 - 1);

    let pop_output = Fixed::from_int(col.population) * raw;
    let industrial = Fixed::from_int(col.industry)
        * el_mod
        * cst_mod
        * (Fixed::ONE + config.economy.prod_growth);
    let gco = pop_output + industrial;

    if col.blockaded {
        gco * (Fixed::ONE - config.economy.blockade_penalty)
    } else {
        gco
    }
}

pub fn house_gco(state: &GameState, house: HouseId, config: &GameConfig) -> Fixed {
    state
        .colonies_owned(house)
        .iter()
        .map(|&c| colony_gco(state, c, config))
        .fold(Fixed::ZERO, |acc, g| acc + g)
}

fn tax_rate_of(state: &GameState, colony: ColonyId) -> Fixed {
    let Some(col) = state.colony(colony) else {
        return Fixed::ZERO;
    };
    match col.tax_rate {
        Some(rate) => rate.ratio(),
        None => state
            .house(col.owner)
            .map(|h| h.tax_policy.ratio())
            .unwrap_or(Fixed::ZERO),
    }
}

/// Tax income in whole PP: per-colony GCO × rate, summed, truncated once.
pub fn tax_income(state: &GameState, house: HouseId, config: &GameConfig) -> i64 {
    state
        .colonies_owned(house)
        .iter()
        .map(|&c| colony_gco(state, c, config) * tax_rate_of(state, c))
        .fold(Fixed::ZERO, |acc, t| acc + t)
        .to_int()
}

/// Total upkeep in PP: ships (halved when crippled, scaled by fleet
/// status), fighters in hangars, facilities, ground units.
pub fn total_upkeep(state: &GameState, house: HouseId, config: &GameConfig) -> i64 {
    let mut upkeep = Fixed::ZERO;

    for fleet_id in state.fleets_owned(house) {
        let Some(fleet) = state.fleet(fleet_id) else {
            continue;
        };
        let status_fraction = match fleet.status {
            FleetStatus::Active => Fixed::ONE,
            FleetStatus::Reserve => config.military.reserve_upkeep_fraction,
            FleetStatus::Mothballed => config.military.mothball_upkeep_fraction,
        };
        for squadron_id in state.squadrons_of(fleet_id) {
            let Some(squadron) = state.squadron(squadron_id) else {
                continue;
            };
            for ship_id in squadron
                .all_ships()
                .chain(squadron.embarked_fighters.iter().copied())
            {
                let Some(ship) = state.ship(ship_id) else {
                    continue;
                };
                let mut cost = Fixed::from_int(config.ships.get(ship.class).maintenance);
                if ship.crippled {
                    cost = cost * Fixed::HALF;
                }
                upkeep += cost * status_fraction;
            }
        }
    }

    for colony_id in state.colonies_owned(house) {
        let Some(colony) = state.colony(colony_id) else {
            continue;
        };
        for &fighter in &colony.fighters {
            if let Some(ship) = state.ship(fighter) {
                upkeep += Fixed::from_int(config.ships.get(ship.class).maintenance);
            }
        }
        for &neoria_id in &colony.neorias {
            if let Some(neoria) = state.neoria(neoria_id) {
                upkeep += Fixed::from_int(config.facilities.neoria(neoria.class).upkeep);
            }
        }
        for &kastra_id in &colony.kastras {
            if state.kastra(kastra_id).is_some() {
                upkeep += Fixed::from_int(config.facilities.starbase.upkeep);
            }
        }
        for unit_id in state.ground_units_at(colony_id) {
            if let Some(unit) = state.ground_unit(unit_id) {
                upkeep += Fixed::from_int(config.ground_units.get(unit.kind).upkeep);
            }
        }
    }

    upkeep.to_int()
}

/// Logistic step: `ΔP = r·P·(1 − P/K)`. Negative above capacity.
pub fn population_delta(population: i64, capacity: i64, growth_rate: Fixed) -> i64 {
    if population <= 0 || capacity <= 0 {
        return 0;
    }
    let p = Fixed::from_int(population);
    let k = Fixed::from_int(capacity);
    let delta = growth_rate * p * (Fixed::ONE - p / k);
    delta.round_to_int()
}

fn grow_populations(state: &mut GameState, house: HouseId, config: &GameConfig) {
    for colony_id in state.colonies_owned(house) {
        let Some(colony) = state.colony(colony_id) else {
            continue;
        };
        let Some(system) = state.map.system(colony.system) else {
            continue;
        };
        let capacity = system.planet_class.capacity();
        let delta = population_delta(colony.population, capacity, config.economy.growth_rate);
        if delta != 0 {
            if let Some(c) = state.colony_mut(colony_id) {
                c.population = (c.population + delta).max(1);
            }
        }
    }
}

/// Bank research points from this turn's allocation. Points convert from
/// treasury PP one-to-one; the actual level award happens in Maintenance.
pub fn bank_research(state: &mut GameState, house: HouseId, budget: i64) -> i64 {
    let Some(h) = state.house(house) else {
        return 0;
    };
    let allocation = h.research_allocation.clone();
    let mut spent = 0;
    for &(field, share) in &allocation.shares {
        let points = budget * share as i64 / 100;
        if points > 0 {
            spent += points;
            if let Some(h) = state.house_mut(house) {
                h.research.add(field, points);
            }
        }
    }
    if let Some(h) = state.house_mut(house) {
        h.treasury -= spent;
    }
    spent
}

/// Maintenance-phase research award: fields level up while their banks
/// cover the next step, in fixed field order.
pub fn award_research(
    state: &mut GameState,
    house: HouseId,
    config: &GameConfig,
    events: &mut EventLog,
) {
    let turn = state.turn;
    for field in TechField::ALL {
        loop {
            let Some(h) = state.house(house) else {
                return;
            };
            let level = h.tech.level(field);
            if level >= config.tech.max_level {
                break;
            }
            let cost = config.tech.cost_to_advance(field, level);
            if h.research.get(field) < cost {
                break;
            }
            let new_level = level + 1;
            if let Some(h) = state.house_mut(house) {
                let banked = h.research.get(field);
                h.research.set(field, banked - cost);
                *h.tech.level_mut(field) = new_level;
            }
            events.emit(
                turn,
                Some(house),
                None,
                None,
                format!("{field:?} research advanced to level {new_level}"),
                EventPayload::ResearchAdvanced { field, new_level },
            );
        }
    }
}

/// The Income phase for one house, excluding the upkeep/shortfall step and
/// research banking, which the orchestrator interleaves around the
/// solvency decision (a cascade turn forfeits the allocation entirely).
///
/// Returns `(gco, tax_income, upkeep_due)` for treasury accounting.
pub fn run_income_phase_for_house(
    state: &mut GameState,
    house: HouseId,
    config: &GameConfig,
    events: &mut EventLog,
) -> (i64, i64, i64) {
    let gco = house_gco(state, house, config).to_int();
    let tax = tax_income(state, house, config);

    if let Some(h) = state.house_mut(house) {
        h.treasury += tax;
    }

    // Blockade prestige bleed
    let blockaded: Vec<ColonyId> = state
        .colonies_owned(house)
        .into_iter()
        .filter(|&c| state.colony(c).is_some_and(|col| col.blockaded))
        .collect();
    if !blockaded.is_empty() {
        let penalty = config.prestige.blockaded_colony_per_turn * blockaded.len() as i64;
        if let Some(h) = state.house_mut(house) {
            h.prestige += penalty;
        }
    }

    grow_populations(state, house, config);

    let upkeep = total_upkeep(state, house, config);
    events.emit(
        state.turn,
        Some(house),
        None,
        None,
        format!("income: GCO {gco}, tax {tax}, upkeep due {upkeep}"),
        EventPayload::IncomeCollected {
            gco,
            tax_income: tax,
            upkeep,
        },
    );

    (gco, tax, upkeep)
}

// ============================================================================
// Population transfers
// ============================================================================

/// Why a transfer order was refused.
pub fn validate_transfer(
    state: &GameState,
    house: HouseId,
    from: ColonyId,
    to: ColonyId,
    units: i64,
    config: &GameConfig,
) -> Result<i64, String> {
    let source = state
        .colony(from)
        .ok_or_else(|| format!("source colony {from} does not exist"))?;
    let dest = state
        .colony(to)
        .ok_or_else(|| format!("destination colony {to} does not exist"))?;
    if source.owner != house || dest.owner != house {
        return Err("both colonies must be owned by the ordering house".into());
    }
    if units <= 0 || units >= source.population {
        return Err(format!(
            "cannot move {units} PU from a colony of {}",
            source.population
        ));
    }
    let dest_capacity = state
        .map
        .system(dest.system)
        .map(|s| s.planet_class.capacity())
        .unwrap_or(0);
    if dest.population + units > dest_capacity {
        return Err(format!(
            "destination capacity {dest_capacity} would be exceeded"
        ));
    }
    if state.transfers_of(house).len() >= config.economy.max_concurrent_transfers {
        return Err(format!(
            "house already has {} transfers in flight",
            config.economy.max_concurrent_transfers
        ));
    }
    let jumps = state
        .map
        .jump_distance(source.system, dest.system)
        .ok_or_else(|| "no lane route between colonies".to_string())?;
    let class_mult = state
        .map
        .system(dest.system)
        .map(|s| s.planet_class.transfer_multiplier())
        .unwrap_or(1);
    let cost = jumps as i64 * config.economy.transfer_cost_per_jump * class_mult;

    let treasury = state.house(house).map(|h| h.treasury).unwrap_or(0);
    if treasury < cost {
        return Err(format!("transfer costs {cost} PP, treasury has {treasury}"));
    }
    Ok(cost)
}

/// Debits the fee, removes PU from the source, and puts the transfer in
/// flight (one turn per jump).
pub fn start_transfer(
    state: &mut GameState,
    house: HouseId,
    from: ColonyId,
    to: ColonyId,
    units: i64,
    cost: i64,
) -> PopulationTransferId {
    if let Some(h) = state.house_mut(house) {
        h.treasury -= cost;
    }
    if let Some(c) = state.colony_mut(from) {
        c.population -= units;
    }
    let jumps = {
        let from_sys = state.colony(from).map(|c| c.system);
        let to_sys = state.colony(to).map(|c| c.system);
        match (from_sys, to_sys) {
            (Some(a), Some(b)) => state.map.jump_distance(a, b).unwrap_or(1).max(1),
            _ => 1,
        }
    };
    state.add_transfer(house, from, to, units, jumps)
}

/// Maintenance-phase tick: advance each transfer one jump; arrivals land
/// their PU (or return it if the destination died mid-flight).
pub fn advance_transfers(state: &mut GameState, events: &mut EventLog) {
    let turn = state.turn;
    let mut arrived: Vec<PopulationTransferId> = Vec::new();
    for transfer in state.transfers.iter_mut() {
        transfer.turns_remaining = transfer.turns_remaining.saturating_sub(1);
        if transfer.turns_remaining == 0 {
            arrived.push(transfer.id);
        }
    }
    arrived.sort();

    for id in arrived {
        let Some(transfer) = state.transfers.get(id).cloned() else {
            continue;
        };
        let landing = if state.colony(transfer.to).is_some() {
            transfer.to
        } else {
            // Destination fell mid-flight; the Guild turns the convoy around
            transfer.from
        };
        if let Some(c) = state.colony_mut(landing) {
            c.population += transfer.units;
        }
        events.emit(
            turn,
            Some(transfer.house),
            None,
            None,
            format!(
                "{} PU arrived at {} by Space Guild transfer",
                transfer.units, landing
            ),
            EventPayload::PopulationTransfer {
                from_colony: transfer.from,
                to_colony: landing,
                units: transfer.units,
            },
        );
        let _ = state.del_transfer(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SystemId;
    use crate::map::PlanetClass;
    use crate::testing::{test_config, GameStateBuilder};

    /// Developed colony: PU=500, IU=100, EL=2, CST=2 at an Average system.
    fn developed_colony(blockaded: bool) -> (GameState, ColonyId) {
        let mut builder = GameStateBuilder::new().with_house("Atreides").with_line_map(3);
        let colony = builder.add_colony(HouseId(1), SystemId(1), 500);
        let state = builder.state_mut();
        state.colony_mut(colony).unwrap().industry = 100;
        state.colony_mut(colony).unwrap().blockaded = blockaded;
        let house = state.house_mut(HouseId(1)).unwrap();
        house.tech.el = 2;
        house.tech.cst = 2;
        (builder.build(), colony)
    }

    #[test]
    fn gco_matches_formula() {
        let (state, colony) = developed_colony(false);
        let gco = colony_gco(&state, colony, &test_config());
        // 500×1.0 + 100×1.05×1.10 = 615.5
        assert_eq!(gco, Fixed::from_raw(6_155_000));
    }

    #[test]
    fn blockade_cuts_gco_to_forty_percent() {
        let (state, colony) = developed_colony(true);
        let open = {
            let (open_state, open_colony) = developed_colony(false);
            colony_gco(&open_state, open_colony, &test_config())
        };
        let blockaded = colony_gco(&state, colony, &test_config());
        assert_eq!(blockaded, open * Fixed::percent(40));
    }

    #[test]
    fn logistic_growth_slows_near_capacity() {
        let r = test_config().economy.growth_rate;
        let low = population_delta(100, 1500, r);
        let high = population_delta(1400, 1500, r);
        assert!(low > high);
        assert!(low > 0);
        // Above capacity the curve declines
        assert!(population_delta(1600, 1500, r) < 0);
    }

    #[test]
    fn upkeep_halves_for_crippled_ships() {
        let config = test_config();
        let mut builder = GameStateBuilder::new().with_house("Atreides").with_line_map(2);
        let fleet = builder.add_fleet(HouseId(1), SystemId(1));
        let squadron = builder.add_squadron(fleet, crate::entities::ShipClass::Destroyer, &[]);
        let mut state = builder.build();

        assert_eq!(total_upkeep(&state, HouseId(1), &config), 2);

        let flagship = state.squadron(squadron).unwrap().flagship;
        state.ship_mut(flagship).unwrap().crippled = true;
        assert_eq!(total_upkeep(&state, HouseId(1), &config), 1);
    }

    #[test]
    fn research_banks_and_awards() {
        let config = test_config();
        let mut builder = GameStateBuilder::new().with_house("Atreides").with_line_map(2);
        builder.state_mut().house_mut(HouseId(1)).unwrap().research_allocation =
            crate::input::ResearchAllocation {
                shares: vec![(TechField::Wep, 100)],
            };
        let mut state = builder.build();
        let mut events = EventLog::default();

        // 50 PP banked covers WEP 1→2 exactly (base 50 × level 1)
        let spent = bank_research(&mut state, HouseId(1), 50);
        assert_eq!(spent, 50);
        award_research(&mut state, HouseId(1), &config, &mut events);
        assert_eq!(state.house(HouseId(1)).unwrap().tech.wep, 2);
        assert_eq!(
            state.house(HouseId(1)).unwrap().research.get(TechField::Wep),
            0
        );
    }

    #[test]
    fn transfer_validation_enforces_capacity_and_cap() {
        let config = test_config();
        let mut builder = GameStateBuilder::new()
            .with_house("Atreides")
            .with_line_map(3)
            .set_planet_class(SystemId(3), PlanetClass::Extreme);
        let from = builder.add_colony(HouseId(1), SystemId(1), 500);
        let to = builder.add_colony(HouseId(1), SystemId(3), 10);
        builder.state_mut().house_mut(HouseId(1)).unwrap().treasury = 1000;
        let state = builder.build();

        // Extreme capacity is 20; 10 + 15 overflows
        assert!(validate_transfer(&state, HouseId(1), from, to, 15, &config).is_err());
        // 5 fits: 2 jumps × 2 PP × 5 (Extreme multiplier) = 20 PP
        let cost = validate_transfer(&state, HouseId(1), from, to, 5, &config).unwrap();
        assert_eq!(cost, 20);
    }

    #[test]
    fn transfers_land_after_jump_count_turns() {
        let config = test_config();
        let mut builder = GameStateBuilder::new().with_house("Atreides").with_line_map(3);
        let from = builder.add_colony(HouseId(1), SystemId(1), 500);
        let to = builder.add_colony(HouseId(1), SystemId(3), 100);
        builder.state_mut().house_mut(HouseId(1)).unwrap().treasury = 100;
        let mut state = builder.build();
        let mut events = EventLog::default();

        let cost = validate_transfer(&state, HouseId(1), from, to, 50, &config).unwrap();
        start_transfer(&mut state, HouseId(1), from, to, 50, cost);
        assert_eq!(state.colony(from).unwrap().population, 450);
        assert_eq!(state.colony(to).unwrap().population, 100);

        advance_transfers(&mut state, &mut events); // jump 1 of 2
        assert_eq!(state.colony(to).unwrap().population, 100);
        advance_transfers(&mut state, &mut events); // arrival
        assert_eq!(state.colony(to).unwrap().population, 150);
        assert!(state.transfers_of(HouseId(1)).is_empty());
    }
}
