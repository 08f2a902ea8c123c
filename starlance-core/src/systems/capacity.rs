//! Capacity limit analysis and enforcement.
//!
//! Three independent limits, each computed as a pure function over the
//! current state:
//! - capital squadrons per house: `max(min, ⌊IU/divisor⌋ × map_multiplier)`
//! - total squadrons per house: same shape, different coefficients
//! - fighters per colony: from IU and Fighter Doctrine level
//!
//! A first violation opens a 2-turn grace period. When grace expires the
//! violation turns Critical and enforcement auto-disbands the excess:
//! escorts before capitals, crippled before healthy, lowest attack first.
//! Grace clears the moment the violation clears.

use crate::config::GameConfig;
use crate::events::{CapacityLimitKind, EventLog, EventPayload};
use crate::fixed::Fixed;
use crate::ids::{ColonyId, HouseId, SquadronId};
use crate::state::GameState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CapacitySeverity {
    None,
    Warning,
    Critical,
}

/// Result of analyzing one limit. Pure data; applying consequences is the
/// enforcement pass's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityViolation {
    pub kind: CapacityLimitKind,
    pub current: i64,
    pub max: i64,
    pub excess: i64,
    pub severity: CapacitySeverity,
    pub grace_turns_remaining: u8,
}

/// Per-house grace tracking. `Some(n)` = in violation with `n` grace turns
/// left; `None` = not currently violating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HouseCapacityGrace {
    pub capital: Option<u8>,
    pub total: Option<u8>,
}

/// Total IU across a house's colonies.
fn house_industry(state: &GameState, house: HouseId) -> i64 {
    state
        .colonies_owned(house)
        .iter()
        .filter_map(|&c| state.colony(c))
        .map(|c| c.industry)
        .sum()
}

pub fn capital_squadron_limit(industry: i64, config: &GameConfig) -> i64 {
    let m = &config.military;
    let scaled = Fixed::from_int(industry / m.capital_divisor) * m.map_multiplier;
    scaled.to_int().max(m.capital_min)
}

pub fn total_squadron_limit(industry: i64, config: &GameConfig) -> i64 {
    let m = &config.military;
    let scaled = Fixed::from_int(industry / m.total_divisor) * m.map_multiplier;
    scaled.to_int().max(m.total_min)
}

pub fn fighter_limit(colony_industry: i64, fd_level: u8, config: &GameConfig) -> i64 {
    let m = &config.military;
    (colony_industry / m.fighter_divisor + m.fd_bonus_per_level * (fd_level.max(1) as i64 - 1))
        .max(m.fighter_min)
}

/// Severity from excess and the stored grace marker. A fresh violation
/// (no marker yet) is a Warning with the full grace window ahead of it.
fn classify(excess: i64, grace: Option<u8>, config: &GameConfig) -> (CapacitySeverity, u8) {
    if excess <= 0 {
        return (CapacitySeverity::None, 0);
    }
    match grace {
        None => (CapacitySeverity::Warning, config.military.grace_turns),
        Some(0) => (CapacitySeverity::Critical, 0),
        Some(n) => (CapacitySeverity::Warning, n),
    }
}

/// Analyze both per-house squadron limits. Pure; reads grace markers but
/// mutates nothing.
pub fn analyze_house_capacity(
    state: &GameState,
    house: HouseId,
    config: &GameConfig,
) -> (CapacityViolation, CapacityViolation) {
    let industry = house_industry(state, house);
    let grace = state.capacity_grace.get(&house).copied().unwrap_or_default();

    let squadrons = state.squadrons_owned(house);
    let capitals = squadrons
        .iter()
        .filter_map(|&s| state.squadron(s))
        .filter(|s| {
            state
                .ship(s.flagship)
                .is_some_and(|f| f.class.is_capital())
        })
        .count() as i64;
    let total = squadrons.len() as i64;

    let capital_max = capital_squadron_limit(industry, config);
    let total_max = total_squadron_limit(industry, config);

    let (cap_sev, cap_grace) = classify(capitals - capital_max, grace.capital, config);
    let (tot_sev, tot_grace) = classify(total - total_max, grace.total, config);

    (
        CapacityViolation {
            kind: CapacityLimitKind::CapitalSquadrons,
            current: capitals,
            max: capital_max,
            excess: (capitals - capital_max).max(0),
            severity: cap_sev,
            grace_turns_remaining: cap_grace,
        },
        CapacityViolation {
            kind: CapacityLimitKind::TotalSquadrons,
            current: total,
            max: total_max,
            excess: (total - total_max).max(0),
            severity: tot_sev,
            grace_turns_remaining: tot_grace,
        },
    )
}

pub fn analyze_colony_fighters(
    state: &GameState,
    colony: ColonyId,
    config: &GameConfig,
) -> Option<CapacityViolation> {
    let col = state.colony(colony)?;
    let fd = state.house(col.owner).map(|h| h.tech.fd).unwrap_or(1);
    let max = fighter_limit(col.industry, fd, config);
    let current = col.fighters.len() as i64;
    let (severity, grace) = classify(current - max, col.fighter_grace, config);
    Some(CapacityViolation {
        kind: CapacityLimitKind::FightersPerColony,
        current,
        max,
        excess: (current - max).max(0),
        severity,
        grace_turns_remaining: grace,
    })
}

/// Disband preference: escorts before capitals, crippled before healthy,
/// lowest summed attack first, ties by ascending squadron ID.
fn disband_order(state: &GameState, squadrons: &[SquadronId], config: &GameConfig) -> Vec<SquadronId> {
    let mut keyed: Vec<(bool, bool, i64, SquadronId)> = squadrons
        .iter()
        .filter_map(|&id| {
            let squadron = state.squadron(id)?;
            let flagship = state.ship(squadron.flagship)?;
            let attack: i64 = squadron
                .all_ships()
                .filter_map(|s| state.ship(s))
                .map(|s| config.ships.get(s.class).attack)
                .sum();
            let crippled = squadron
                .all_ships()
                .filter_map(|s| state.ship(s))
                .any(|s| s.crippled);
            Some((flagship.class.is_capital(), !crippled, attack, id))
        })
        .collect();
    keyed.sort();
    keyed.into_iter().map(|(_, _, _, id)| id).collect()
}

/// Per-house capacity pass, run during Income. Opens or ticks grace
/// windows, emits warnings, and auto-disbands once a window expires.
pub fn enforce_house_capacity(
    state: &mut GameState,
    house: HouseId,
    config: &GameConfig,
    events: &mut EventLog,
) {
    let (capital, total) = analyze_house_capacity(state, house, config);
    let turn = state.turn;

    for violation in [capital, total] {
        let is_capital_limit = violation.kind == CapacityLimitKind::CapitalSquadrons;
        let stored = {
            let grace = state.capacity_grace.entry(house).or_default();
            if is_capital_limit {
                grace.capital
            } else {
                grace.total
            }
        };

        let new_marker = if violation.excess == 0 {
            None
        } else {
            match stored {
                // Fresh violation: open the window
                None => {
                    let remaining = config.military.grace_turns;
                    events.emit(
                        turn,
                        Some(house),
                        None,
                        None,
                        format!(
                            "{:?} over limit: {}/{} ({remaining} turns of grace)",
                            violation.kind, violation.current, violation.max
                        ),
                        EventPayload::CapacityWarning {
                            limit: violation.kind,
                            current: violation.current,
                            max: violation.max,
                            grace_turns_remaining: remaining,
                        },
                    );
                    Some(remaining)
                }
                // Window expired: enforce and clear
                Some(0) => {
                    disband_excess_squadrons(state, house, violation, config, events);
                    None
                }
                // Window ticking down
                Some(n) => {
                    let remaining = n - 1;
                    events.emit(
                        turn,
                        Some(house),
                        None,
                        None,
                        format!(
                            "{:?} still over limit: {}/{} ({remaining} turns of grace left)",
                            violation.kind, violation.current, violation.max
                        ),
                        EventPayload::CapacityWarning {
                            limit: violation.kind,
                            current: violation.current,
                            max: violation.max,
                            grace_turns_remaining: remaining,
                        },
                    );
                    Some(remaining)
                }
            }
        };

        let grace = state.capacity_grace.entry(house).or_default();
        if is_capital_limit {
            grace.capital = new_marker;
        } else {
            grace.total = new_marker;
        }
    }
}

fn disband_excess_squadrons(
    state: &mut GameState,
    house: HouseId,
    violation: CapacityViolation,
    config: &GameConfig,
    events: &mut EventLog,
) {
    let candidates: Vec<SquadronId> = match violation.kind {
        CapacityLimitKind::CapitalSquadrons => state
            .squadrons_owned(house)
            .into_iter()
            .filter(|&s| {
                state
                    .squadron(s)
                    .and_then(|sq| state.ship(sq.flagship))
                    .is_some_and(|f| f.class.is_capital())
            })
            .collect(),
        _ => state.squadrons_owned(house),
    };

    let ordered = disband_order(state, &candidates, config);
    let turn = state.turn;
    let mut disbanded = 0;
    for squadron_id in ordered {
        if disbanded >= violation.excess {
            break;
        }
        let Some(squadron) = state.squadron(squadron_id) else {
            continue;
        };
        let fleet = squadron.fleet;
        // Capitals recover cascade-rate salvage; escorts none
        let is_capital = state
            .ship(squadron.flagship)
            .is_some_and(|f| f.class.is_capital());
        let build_cost: i64 = squadron
            .all_ships()
            .filter_map(|s| state.ship(s))
            .map(|s| config.ships.get(s.class).build_cost)
            .sum();
        let salvage = if is_capital {
            (Fixed::from_int(build_cost) * config.economy.fleet_salvage_fraction).to_int()
        } else {
            0
        };

        if state.del_squadron(squadron_id).is_ok() {
            disbanded += 1;
            if let Some(h) = state.house_mut(house) {
                h.treasury += salvage;
            }
            events.emit(
                turn,
                Some(house),
                None,
                Some(fleet),
                format!("{squadron_id} disbanded by capacity enforcement"),
                EventPayload::SquadronDisbanded { squadron_id },
            );
            // Fleets emptied by enforcement dissolve
            if state.squadrons_of(fleet).is_empty() && state.fleet(fleet).is_some() {
                let _ = state.del_fleet(fleet);
                events.emit(
                    turn,
                    Some(house),
                    None,
                    Some(fleet),
                    format!("{fleet} dissolved (no squadrons remain)"),
                    EventPayload::FleetDisbanded { salvage },
                );
            }
        }
    }
    log::info!(
        "capacity enforcement disbanded {disbanded} squadrons of {house} ({:?})",
        violation.kind
    );
}

/// Fighter-cap pass for one colony: warn during grace, scrap past it.
pub fn enforce_colony_fighters(
    state: &mut GameState,
    colony: ColonyId,
    config: &GameConfig,
    events: &mut EventLog,
) {
    let Some(violation) = analyze_colony_fighters(state, colony, config) else {
        return;
    };
    let turn = state.turn;
    let owner = state.colony(colony).map(|c| c.owner);
    let stored = state.colony(colony).and_then(|c| c.fighter_grace);

    let new_marker = if violation.excess == 0 {
        None
    } else {
        match stored {
            None => Some(config.military.grace_turns),
            Some(0) => {
                // Scrap the newest fighters first (highest IDs)
                let mut hangar = state
                    .colony(colony)
                    .map(|c| c.fighters.clone())
                    .unwrap_or_default();
                hangar.sort();
                let scrapped: Vec<_> = hangar
                    .iter()
                    .rev()
                    .take(violation.excess as usize)
                    .copied()
                    .collect();
                for fighter in scrapped {
                    if let Some(c) = state.colony_mut(colony) {
                        c.fighters.retain(|&f| f != fighter);
                    }
                    let _ = state.del_ship(fighter);
                }
                events.emit(
                    turn,
                    owner,
                    None,
                    None,
                    format!("{} excess fighters scrapped at {colony}", violation.excess),
                    EventPayload::SquadronScrapped {
                        squadron_id: SquadronId::NULL,
                        salvage: 0,
                    },
                );
                None
            }
            Some(n) => Some(n - 1),
        }
    };

    if let Some(remaining) = new_marker {
        events.emit(
            turn,
            owner,
            None,
            None,
            format!(
                "fighter hangar over limit at {colony}: {}/{}",
                violation.current, violation.max
            ),
            EventPayload::CapacityWarning {
                limit: CapacityLimitKind::FightersPerColony,
                current: violation.current,
                max: violation.max,
                grace_turns_remaining: remaining,
            },
        );
    }
    if let Some(c) = state.colony_mut(colony) {
        c.fighter_grace = new_marker;
    }
}
