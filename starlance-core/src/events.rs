//! Typed domain events emitted during turn resolution.
//!
//! Events serialize as tagged JSON (`{"type":"fleet_arrived",...}`) so the
//! surrounding daemon can stream them as JSONL. Within one phase, events
//! are emitted in a fixed total order — ascending house ID, then ascending
//! primary entity ID, then emission sequence — so the log itself is part of
//! the determinism contract and never needs a post-sort.

use crate::config::EspionageOp;
use crate::entities::{BuildTarget, GroundUnitKind, TechField};
use crate::ids::*;
use serde::{Deserialize, Serialize};

/// Common envelope every event carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub turn: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub house_id: Option<HouseId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_id: Option<SystemId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fleet_id: Option<FleetId>,
    pub description: String,
    #[serde(flatten)]
    pub payload: EventPayload,
}

/// Per-variant payloads, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    // Construction & colony
    ConstructionStarted {
        colony_id: ColonyId,
        project_id: ConstructionProjectId,
        target: BuildTarget,
        cost: i64,
    },
    ConstructionCancelled {
        colony_id: ColonyId,
        project_id: ConstructionProjectId,
    },
    CommissionCompleted {
        colony_id: ColonyId,
        ship_id: ShipId,
    },
    PopulationTransfer {
        from_colony: ColonyId,
        to_colony: ColonyId,
        units: i64,
    },
    TerraformComplete {
        colony_id: ColonyId,
    },
    ColonyFounded {
        colony_id: ColonyId,
    },
    ColonyLost {
        colony_id: ColonyId,
        to_house: Option<HouseId>,
    },
    AutomationCompleted {
        colony_id: ColonyId,
    },

    // Orders
    OrderIssued,
    OrderCompleted,
    OrderRejected {
        reason: String,
    },
    OrderFailed {
        reason: String,
    },
    OrderAborted {
        reason: String,
    },
    StandingOrderSet,
    StandingOrderActivated,
    StandingOrderSuspended,

    // Fleet lifecycle
    FleetArrived,
    FleetEncounter {
        other_house: HouseId,
    },
    FleetMerged {
        into_fleet: FleetId,
    },
    FleetDetachment {
        new_fleet: FleetId,
    },
    FleetTransfer {
        squadron_id: SquadronId,
        to_fleet: FleetId,
    },
    CargoLoaded {
        ship_id: ShipId,
        units: i64,
    },
    CargoUnloaded {
        ship_id: ShipId,
    },
    FleetDisbanded {
        salvage: i64,
    },
    SquadronDisbanded {
        squadron_id: SquadronId,
    },
    SquadronScrapped {
        squadron_id: SquadronId,
        salvage: i64,
    },

    // Economy
    IncomeCollected {
        gco: i64,
        tax_income: i64,
        upkeep: i64,
    },
    ResourceWarning {
        shortfall: i64,
    },
    AssetStripped {
        colony_id: ColonyId,
        asset: StrippedAsset,
        recovered: i64,
    },
    ResearchAdvanced {
        field: TechField,
        new_level: u8,
    },

    // Capacity
    CapacityWarning {
        limit: CapacityLimitKind,
        current: i64,
        max: i64,
        grace_turns_remaining: u8,
    },

    // Combat & threats
    ThreatDetected {
        hostile_house: HouseId,
    },
    CombatResolved {
        victor: Option<HouseId>,
        rounds: u32,
        stalemate: bool,
    },
    BlockadeEstablished {
        colony_id: ColonyId,
    },
    BombardmentResolved {
        colony_id: ColonyId,
        industry_destroyed: i64,
    },
    InvasionResolved {
        colony_id: ColonyId,
        captured: bool,
    },

    // Diplomacy
    DiplomaticStateChanged {
        toward: HouseId,
        stance: crate::entities::DiplomaticStance,
    },
    PactSigned {
        with: HouseId,
    },
    PactViolated {
        victim: HouseId,
        repeat_count: u32,
    },
    CeasefireProposed {
        to: HouseId,
    },
    CeasefireAccepted {
        with: HouseId,
    },

    // Espionage
    EspionageResolved {
        op: EspionageOp,
        target_house: HouseId,
        detected: bool,
        succeeded: bool,
    },

    // House lifecycle
    HouseStatusChanged {
        status: crate::entities::HouseStatus,
    },
    HouseEliminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrippedAsset {
    IndustrialUnit,
    Spaceport,
    Shipyard,
    Drydock,
    Starbase,
    GroundUnit(GroundUnitKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityLimitKind {
    CapitalSquadrons,
    TotalSquadrons,
    FightersPerColony,
}

/// Per-turn event accumulator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn push(&mut self, event: Event) {
        log::debug!("event: {}", event.description);
        self.events.push(event);
    }

    pub fn emit(
        &mut self,
        turn: u32,
        house_id: Option<HouseId>,
        system_id: Option<SystemId>,
        fleet_id: Option<FleetId>,
        description: impl Into<String>,
        payload: EventPayload,
    ) {
        self.push(Event {
            turn,
            house_id,
            system_id,
            fleet_id,
            description: description.into(),
            payload,
        });
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    /// Events visible to one house: its own plus those with no house scope.
    pub fn events_for(&self, house: HouseId) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.house_id.is_none() || e.house_id == Some(house))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = Event {
            turn: 3,
            house_id: Some(HouseId(1)),
            system_id: Some(SystemId(17)),
            fleet_id: None,
            description: "Fleet arrived at system 17".into(),
            payload: EventPayload::FleetArrived,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"fleet_arrived\""));
        assert!(json.contains("\"turn\":3"));

        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn events_for_filters_by_house_scope() {
        let mut log = EventLog::default();
        log.emit(
            1,
            Some(HouseId(1)),
            None,
            None,
            "private to house 1",
            EventPayload::OrderIssued,
        );
        log.emit(
            1,
            Some(HouseId(2)),
            None,
            None,
            "private to house 2",
            EventPayload::OrderIssued,
        );
        log.emit(
            1,
            None,
            Some(SystemId(4)),
            None,
            "global",
            EventPayload::CombatResolved {
                victor: None,
                rounds: 7,
                stalemate: true,
            },
        );

        let visible = log.events_for(HouseId(1));
        assert_eq!(visible.len(), 2);
    }
}
