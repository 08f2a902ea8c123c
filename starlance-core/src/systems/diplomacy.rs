//! Diplomatic state machine and pact-violation tracking.
//!
//! Stances form a three-valued lattice per ordered pair:
//! `Neutral → Hostile` by declaration or detected hostile act;
//! `Hostile → Enemy` by declaration, combat, or pact violation;
//! `Enemy → Neutral` only through a ceasefire accepted by both sides.
//!
//! Violating a Non-Aggression Pact marks the violator Dishonored and
//! diplomatically isolated, costs prestige scaling with repeat offenses in
//! the lookback window, and forces the pair to Enemy.

use crate::config::GameConfig;
use crate::entities::{DiplomaticProposal, DiplomaticStance, ViolationRecord};
use crate::events::{EventLog, EventPayload};
use crate::ids::HouseId;
use crate::state::GameState;

fn set_stance(
    state: &mut GameState,
    actor: HouseId,
    toward: HouseId,
    stance: DiplomaticStance,
    events: &mut EventLog,
) {
    let turn = state.turn;
    let relation = state.diplomacy.relation_mut(actor, toward);
    if relation.stance == stance {
        return;
    }
    relation.stance = stance;
    events.emit(
        turn,
        Some(actor),
        None,
        None,
        format!("stance toward {toward} is now {stance:?}"),
        EventPayload::DiplomaticStateChanged { toward, stance },
    );
}

/// Count of violations by `actor` against `victim` inside the lookback
/// window, excluding the current turn's.
pub fn recent_violations(
    state: &GameState,
    actor: HouseId,
    victim: HouseId,
    config: &GameConfig,
) -> u32 {
    let window_start = state
        .turn
        .saturating_sub(config.diplomacy.violation_window_turns);
    state
        .diplomacy
        .relation(actor, victim)
        .violations
        .iter()
        .filter(|v| v.turn >= window_start && v.turn < state.turn)
        .count() as u32
}

/// An accepted attack while the pair was at peace. Records the violation,
/// applies Dishonored/Isolation, charges prestige, and forces Enemy.
pub fn record_pact_violation(
    state: &mut GameState,
    violator: HouseId,
    victim: HouseId,
    config: &GameConfig,
    events: &mut EventLog,
) {
    let turn = state.turn;
    let repeats = recent_violations(state, violator, victim, config);

    {
        let relation = state.diplomacy.relation_mut(violator, victim);
        relation.violations.push(ViolationRecord { turn });
        relation.pact = false;
        relation.dishonored_until = turn + config.diplomacy.dishonored_turns;
        relation.isolated_until = turn + config.diplomacy.isolation_turns;
        relation.last_incident_turn = turn;
    }
    state.diplomacy.relation_mut(victim, violator).pact = false;

    let penalty =
        config.prestige.pact_violation + config.prestige.pact_violation_per_repeat * repeats as i64;
    if let Some(h) = state.house_mut(violator) {
        h.prestige += penalty;
    }

    events.emit(
        turn,
        Some(violator),
        None,
        None,
        format!("pact with {victim} violated ({repeats} prior in window, {penalty} prestige)"),
        EventPayload::PactViolated {
            victim,
            repeat_count: repeats,
        },
    );

    set_stance(state, violator, victim, DiplomaticStance::Enemy, events);
    set_stance(state, victim, violator, DiplomaticStance::Enemy, events);
}

/// Combat between two houses. Escalates the pair to Enemy; if the attacker
/// was bound by pact or still Neutral toward the victim, it is a violation.
pub fn record_attack(
    state: &mut GameState,
    attacker: HouseId,
    victim: HouseId,
    config: &GameConfig,
    events: &mut EventLog,
) {
    let turn = state.turn;
    let at_peace = state.diplomacy.has_pact(attacker, victim)
        || state.diplomacy.stance(attacker, victim) == DiplomaticStance::Neutral;

    if at_peace {
        record_pact_violation(state, attacker, victim, config, events);
    } else {
        state
            .diplomacy
            .relation_mut(attacker, victim)
            .last_incident_turn = turn;
        state
            .diplomacy
            .relation_mut(victim, attacker)
            .last_incident_turn = turn;
        set_stance(state, attacker, victim, DiplomaticStance::Enemy, events);
        set_stance(state, victim, attacker, DiplomaticStance::Enemy, events);
    }
}

pub fn declare_hostile(
    state: &mut GameState,
    actor: HouseId,
    target: HouseId,
    events: &mut EventLog,
) {
    let current = state.diplomacy.stance(actor, target);
    if current == DiplomaticStance::Neutral {
        set_stance(state, actor, target, DiplomaticStance::Hostile, events);
        state.diplomacy.relation_mut(actor, target).last_incident_turn = state.turn;
    }
}

pub fn declare_enemy(
    state: &mut GameState,
    actor: HouseId,
    target: HouseId,
    events: &mut EventLog,
) {
    // Enemy by declaration steps through Hostile implicitly
    set_stance(state, actor, target, DiplomaticStance::Enemy, events);
    state.diplomacy.relation_mut(actor, target).last_incident_turn = state.turn;
}

/// Why a pact or ceasefire command was refused.
pub fn pact_obstacle(
    state: &GameState,
    actor: HouseId,
    target: HouseId,
    config: &GameConfig,
) -> Option<String> {
    let turn = state.turn;
    let relation = state.diplomacy.relation(actor, target);
    if relation.isolated_until > turn {
        return Some(format!(
            "diplomatically isolated until turn {}",
            relation.isolated_until
        ));
    }
    let reverse = state.diplomacy.relation(target, actor);
    if reverse.isolated_until > turn {
        return Some(format!("{target} is diplomatically isolated"));
    }
    if state.diplomacy.stance(actor, target) == DiplomaticStance::Enemy
        || state.diplomacy.stance(target, actor) == DiplomaticStance::Enemy
    {
        return Some("cannot form a pact while at Enemy".into());
    }
    if state.diplomacy.has_pact(actor, target) {
        return Some("pact already in force".into());
    }
    // Reinstatement cooldown after the last violation on this pair
    let last_violation = relation
        .violations
        .iter()
        .chain(reverse.violations.iter())
        .map(|v| v.turn)
        .max();
    if let Some(last) = last_violation {
        if last + config.diplomacy.pact_reinstatement_turns > turn {
            return Some(format!(
                "pact cannot be re-signed until turn {}",
                last + config.diplomacy.pact_reinstatement_turns
            ));
        }
    }
    None
}

pub fn propose_pact(state: &mut GameState, actor: HouseId, target: HouseId) {
    if let Some(h) = state.house_mut(target) {
        let proposal = DiplomaticProposal::Pact { from: actor };
        if !h.pending_proposals.contains(&proposal) {
            h.pending_proposals.push(proposal);
        }
    }
}

/// Accepting requires a live proposal from the counterparty.
pub fn accept_pact(
    state: &mut GameState,
    actor: HouseId,
    target: HouseId,
    config: &GameConfig,
    events: &mut EventLog,
) -> Result<(), String> {
    let proposal = DiplomaticProposal::Pact { from: target };
    let has_proposal = state
        .house(actor)
        .is_some_and(|h| h.pending_proposals.contains(&proposal));
    if !has_proposal {
        return Err(format!("no pact proposal from {target} pending"));
    }
    if let Some(reason) = pact_obstacle(state, actor, target, config) {
        return Err(reason);
    }
    if let Some(h) = state.house_mut(actor) {
        h.pending_proposals.retain(|p| *p != proposal);
    }
    let turn = state.turn;
    for (a, b) in [(actor, target), (target, actor)] {
        let relation = state.diplomacy.relation_mut(a, b);
        relation.pact = true;
        relation.pact_since = turn;
    }
    events.emit(
        turn,
        Some(actor),
        None,
        None,
        format!("non-aggression pact signed with {target}"),
        EventPayload::PactSigned { with: target },
    );
    Ok(())
}

/// Peaceful withdrawal: the pact lapses, stances are untouched.
pub fn break_pact(state: &mut GameState, actor: HouseId, target: HouseId) {
    state.diplomacy.relation_mut(actor, target).pact = false;
    state.diplomacy.relation_mut(target, actor).pact = false;
}

pub fn propose_ceasefire(
    state: &mut GameState,
    actor: HouseId,
    target: HouseId,
    events: &mut EventLog,
) {
    let turn = state.turn;
    if let Some(h) = state.house_mut(target) {
        let proposal = DiplomaticProposal::Ceasefire { from: actor };
        if !h.pending_proposals.contains(&proposal) {
            h.pending_proposals.push(proposal);
        }
    }
    events.emit(
        turn,
        Some(actor),
        None,
        None,
        format!("ceasefire proposed to {target}"),
        EventPayload::CeasefireProposed { to: target },
    );
}

/// The only road out of Enemy: both sides return to Neutral.
pub fn accept_ceasefire(
    state: &mut GameState,
    actor: HouseId,
    target: HouseId,
    events: &mut EventLog,
) -> Result<(), String> {
    let proposal = DiplomaticProposal::Ceasefire { from: target };
    let has_proposal = state
        .house(actor)
        .is_some_and(|h| h.pending_proposals.contains(&proposal));
    if !has_proposal {
        return Err(format!("no ceasefire proposal from {target} pending"));
    }
    if let Some(h) = state.house_mut(actor) {
        h.pending_proposals.retain(|p| *p != proposal);
    }
    set_stance(state, actor, target, DiplomaticStance::Neutral, events);
    set_stance(state, target, actor, DiplomaticStance::Neutral, events);
    let turn = state.turn;
    events.emit(
        turn,
        Some(actor),
        None,
        None,
        format!("ceasefire with {target} in force"),
        EventPayload::CeasefireAccepted { with: target },
    );
    Ok(())
}

/// Maintenance-phase decay: Hostile pairs with no incident inside the decay
/// window relax to Neutral. Enemy never decays.
pub fn process_diplomatic_decay(state: &mut GameState, config: &GameConfig, events: &mut EventLog) {
    let turn = state.turn;
    let decayed: Vec<(HouseId, HouseId)> = state
        .diplomacy
        .relations
        .iter()
        .filter(|((_, _), r)| {
            r.stance == DiplomaticStance::Hostile
                && r.last_incident_turn + config.diplomacy.hostility_decay_turns <= turn
        })
        .map(|(&pair, _)| pair)
        .collect();
    for (actor, toward) in decayed {
        set_stance(state, actor, toward, DiplomaticStance::Neutral, events);
    }
}

/// Active Dishonored marker toward anyone?
pub fn is_dishonored(state: &GameState, house: HouseId) -> bool {
    state
        .diplomacy
        .relations
        .iter()
        .any(|((actor, _), r)| *actor == house && r.dishonored_until > state.turn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_config, two_house_line};

    fn signed_pact(state: &mut GameState, a: HouseId, b: HouseId) {
        for (x, y) in [(a, b), (b, a)] {
            let relation = state.diplomacy.relation_mut(x, y);
            relation.pact = true;
            relation.pact_since = 0;
        }
    }

    /// An attack under a pact marks the violator and forces Enemy.
    #[test]
    fn pact_violation_full_consequences() {
        let config = test_config();
        let (mut state, a, b) = two_house_line();
        state.turn = 10;
        signed_pact(&mut state, a, b);
        let mut events = EventLog::default();

        record_attack(&mut state, a, b, &config, &mut events);

        assert_eq!(state.diplomacy.stance(a, b), DiplomaticStance::Enemy);
        assert_eq!(state.diplomacy.stance(b, a), DiplomaticStance::Enemy);
        assert!(!state.diplomacy.has_pact(a, b));
        let relation = state.diplomacy.relation(a, b);
        assert_eq!(relation.dishonored_until, 13);
        assert_eq!(relation.isolated_until, 15);
        assert!(is_dishonored(&state, a));
        assert_eq!(state.house(a).unwrap().prestige, -10);
    }

    #[test]
    fn repeat_violations_escalate_prestige() {
        let config = test_config();
        let (mut state, a, b) = two_house_line();
        let mut events = EventLog::default();

        state.turn = 5;
        signed_pact(&mut state, a, b);
        record_attack(&mut state, a, b, &config, &mut events);
        assert_eq!(state.house(a).unwrap().prestige, -10);

        // Second violation inside the 10-turn window: −10 − 5×1
        state.turn = 8;
        signed_pact(&mut state, a, b);
        record_attack(&mut state, a, b, &config, &mut events);
        assert_eq!(state.house(a).unwrap().prestige, -25);
    }

    #[test]
    fn attack_while_hostile_is_not_a_violation() {
        let config = test_config();
        let (mut state, a, b) = two_house_line();
        let mut events = EventLog::default();

        declare_hostile(&mut state, a, b, &mut events);
        record_attack(&mut state, a, b, &config, &mut events);

        assert_eq!(state.diplomacy.stance(a, b), DiplomaticStance::Enemy);
        assert!(state.diplomacy.relation(a, b).violations.is_empty());
        assert_eq!(state.house(a).unwrap().prestige, 0);
    }

    #[test]
    fn isolation_blocks_new_pacts() {
        let config = test_config();
        let (mut state, a, b) = two_house_line();
        state.turn = 10;
        signed_pact(&mut state, a, b);
        let mut events = EventLog::default();
        record_attack(&mut state, a, b, &config, &mut events);

        // Ceasefire first, then try to re-sign during isolation
        propose_ceasefire(&mut state, b, a, &mut events);
        accept_ceasefire(&mut state, a, b, &mut events).unwrap();
        state.turn = 12;
        propose_pact(&mut state, b, a);
        let err = accept_pact(&mut state, a, b, &config, &mut events).unwrap_err();
        assert!(err.contains("isolated"));
    }

    #[test]
    fn enemy_exits_only_via_ceasefire() {
        let config = test_config();
        let (mut state, a, b) = two_house_line();
        let mut events = EventLog::default();
        declare_enemy(&mut state, a, b, &mut events);
        declare_enemy(&mut state, b, a, &mut events);

        // Decay never touches Enemy
        state.turn = 100;
        process_diplomatic_decay(&mut state, &config, &mut events);
        assert_eq!(state.diplomacy.stance(a, b), DiplomaticStance::Enemy);

        propose_ceasefire(&mut state, a, b, &mut events);
        accept_ceasefire(&mut state, b, a, &mut events).unwrap();
        assert_eq!(state.diplomacy.stance(a, b), DiplomaticStance::Neutral);
        assert_eq!(state.diplomacy.stance(b, a), DiplomaticStance::Neutral);
    }

    #[test]
    fn hostility_decays_after_quiet_window() {
        let config = test_config();
        let (mut state, a, b) = two_house_line();
        let mut events = EventLog::default();
        state.turn = 3;
        declare_hostile(&mut state, a, b, &mut events);

        state.turn = 10;
        process_diplomatic_decay(&mut state, &config, &mut events);
        assert_eq!(state.diplomacy.stance(a, b), DiplomaticStance::Hostile);

        state.turn = 11;
        process_diplomatic_decay(&mut state, &config, &mut events);
        assert_eq!(state.diplomacy.stance(a, b), DiplomaticStance::Neutral);
    }

    #[test]
    fn accept_pact_requires_proposal() {
        let config = test_config();
        let (mut state, a, b) = two_house_line();
        let mut events = EventLog::default();
        assert!(accept_pact(&mut state, a, b, &config, &mut events).is_err());

        propose_pact(&mut state, b, a);
        accept_pact(&mut state, a, b, &config, &mut events).unwrap();
        assert!(state.diplomacy.has_pact(a, b));
    }
}
