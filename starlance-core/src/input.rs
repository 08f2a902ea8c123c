//! Player command packets.
//!
//! One packet per house per turn. Validation is all-or-nothing: any
//! structural error rejects the whole packet with a line-referenced
//! diagnostic (the line is the index of the offending order within its
//! section). Semantic failures on individual commands (bad target, not
//! enough funds) are discovered during resolution and produce
//! `OrderRejected` events instead; they never reject the packet.

use crate::entities::{BuildTarget, ColonyAutomation, RepairSubject, TechField};
use crate::ids::*;
use crate::state::GameState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fleet command vocabulary.
///
/// Commands carrying a destination validate reachability against the lane
/// graph; composition requirements (an ETAC for `Colonize`, pure scouts for
/// the `Scout*` pair) are checked at acceptance time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FleetCommand {
    /// Hold position; stationary fleets accept commissioned reinforcements.
    Hold,
    Move { to: SystemId },
    /// Route home to the nearest owned colony and hold there.
    SeekHome,
    Patrol { system: SystemId },
    GuardColony,
    GuardStarbase,
    /// Interdict a system; classified against hostile colonies during the
    /// Conflict phase.
    Blockade { system: SystemId },
    Bombard { system: SystemId },
    Invade { system: SystemId },
    /// Invasion without preliminary bombardment; faster, bloodier.
    Blitz { system: SystemId },
    Colonize { system: SystemId },
    ScoutColony { system: SystemId },
    ScoutSystem { system: SystemId },
    HackStarbase { system: SystemId },
    JoinFleet { fleet: FleetId },
    Rendezvous { fleet: FleetId, system: SystemId },
    /// Break the fleet up for salvage value at an owned colony.
    Salvage,
    Reserve,
    Mothball,
    Reactivate,
    /// Passive observation of an adjacent system.
    View { system: SystemId },
}

impl FleetCommand {
    pub fn target_system(&self) -> Option<SystemId> {
        match *self {
            FleetCommand::Move { to } => Some(to),
            FleetCommand::Patrol { system }
            | FleetCommand::Blockade { system }
            | FleetCommand::Bombard { system }
            | FleetCommand::Invade { system }
            | FleetCommand::Blitz { system }
            | FleetCommand::Colonize { system }
            | FleetCommand::ScoutColony { system }
            | FleetCommand::ScoutSystem { system }
            | FleetCommand::HackStarbase { system }
            | FleetCommand::Rendezvous { system, .. }
            | FleetCommand::View { system } => Some(system),
            _ => None,
        }
    }

    pub fn target_fleet(&self) -> Option<FleetId> {
        match *self {
            FleetCommand::JoinFleet { fleet } | FleetCommand::Rendezvous { fleet, .. } => {
                Some(fleet)
            }
            _ => None,
        }
    }

    /// Scout missions require a pure-Scout fleet and lock it once underway.
    pub fn is_scout_mission(&self) -> bool {
        matches!(
            self,
            FleetCommand::ScoutColony { .. }
                | FleetCommand::ScoutSystem { .. }
                | FleetCommand::HackStarbase { .. }
        )
    }
}

/// One fleet order line in a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetOrder {
    pub fleet: FleetId,
    pub command: FleetCommand,
    /// Lower executes first within the same house.
    pub priority: u8,
    /// Optional ROE override applied with the command.
    pub roe: Option<i32>,
}

/// Instantaneous fleet administration; resolved before travel commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZeroTurnCommand {
    MergeFleets { from: FleetId, into: FleetId },
    /// Split the listed squadrons into a newly created fleet.
    DetachSquadrons { fleet: FleetId, squadrons: Vec<SquadronId> },
    TransferSquadron { squadron: SquadronId, to_fleet: FleetId },
    LoadCargo { ship: ShipId, colony: ColonyId },
    UnloadCargo { ship: ShipId },
    SetRoe { fleet: FleetId, roe: i32 },
    SetStandingOrder { fleet: FleetId, order: StandingOrder },
    ClearStandingOrder { fleet: FleetId },
}

/// Persistent template that re-activates as a regular fleet command when its
/// trigger matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingOrder {
    pub trigger: StandingTrigger,
    pub command: FleetCommand,
    pub suspended: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StandingTrigger {
    /// A hostile or enemy fleet is detected at the fleet's system.
    EnemyDetected,
    /// The owner establishes a new colony anywhere.
    ColonyEstablished,
    /// Every `n` turns.
    TurnElapsed { every: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOrder {
    pub colony: ColonyId,
    pub target: BuildTarget,
    /// Producing dock; `None` lets the engine pick the cheapest legal one.
    pub facility: Option<NeoriaId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairOrder {
    pub colony: ColonyId,
    pub subject: RepairSubject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScrapOrder {
    Ship(ShipId),
    Squadron(SquadronId),
    Fleet(FleetId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiplomaticCommand {
    DeclareHostile { target: HouseId },
    DeclareEnemy { target: HouseId },
    ProposePact { target: HouseId },
    AcceptPact { target: HouseId },
    BreakPact { target: HouseId },
    ProposeCeasefire { target: HouseId },
    AcceptCeasefire { target: HouseId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EspionageAction {
    pub op: crate::config::EspionageOp,
    pub target_house: HouseId,
    /// Colony-scoped effects (sabotage, cyber attack) name their site.
    pub target_colony: Option<ColonyId>,
    /// Field-scoped effects (tech theft) name their field.
    pub target_field: Option<TechField>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationTransferOrder {
    pub from: ColonyId,
    pub to: ColonyId,
    pub units: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerraformOrder {
    pub colony: ColonyId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColonyManagementOrder {
    pub colony: ColonyId,
    /// New local tax rate (percent); `None` leaves it untouched.
    pub tax_rate: Option<i32>,
    pub automation: Option<ColonyAutomation>,
}

/// How banked research PP split across fields, in whole percentages.
/// Unallocated remainder stays in the treasury.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchAllocation {
    pub shares: Vec<(TechField, u8)>,
}

impl ResearchAllocation {
    pub fn total_percent(&self) -> u32 {
        self.shares.iter().map(|(_, p)| *p as u32).sum()
    }

    pub fn share_for(&self, field: TechField) -> u8 {
        self.shares
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, p)| *p)
            .unwrap_or(0)
    }
}

/// Everything one house submits for one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandPacket {
    pub house_id: HouseId,
    pub turn: u32,
    /// Treasury the client believed it had; recorded for desync diagnosis,
    /// never trusted.
    pub treasury_at_submission: i64,
    pub fleet_commands: Vec<FleetOrder>,
    pub zero_turn_commands: Vec<ZeroTurnCommand>,
    pub build_commands: Vec<BuildOrder>,
    pub repair_commands: Vec<RepairOrder>,
    pub scrap_commands: Vec<ScrapOrder>,
    pub research_allocation: ResearchAllocation,
    pub diplomatic_commands: Vec<DiplomaticCommand>,
    pub espionage_actions: Vec<EspionageAction>,
    pub ebp_investment: i64,
    pub cip_investment: i64,
    pub population_transfers: Vec<PopulationTransferOrder>,
    pub terraform_commands: Vec<TerraformOrder>,
    pub colony_management: Vec<ColonyManagementOrder>,
}

impl CommandPacket {
    pub fn empty(house_id: HouseId, turn: u32) -> Self {
        Self {
            house_id,
            turn,
            ..Default::default()
        }
    }
}

/// Whole-packet rejection with the offending section and line.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("packet from {house} rejected at {section}[{line}]: {reason}")]
pub struct PacketRejection {
    pub house: HouseId,
    pub section: &'static str,
    pub line: usize,
    pub reason: String,
}

impl PacketRejection {
    fn new(house: HouseId, section: &'static str, line: usize, reason: impl Into<String>) -> Self {
        Self {
            house,
            section,
            line,
            reason: reason.into(),
        }
    }
}

/// Structural validation of a packet against the current state.
///
/// All-or-nothing: the first failure rejects the packet. Checks shape and
/// referential plausibility only; per-command semantics are judged during
/// resolution.
pub fn validate_packet(state: &GameState, packet: &CommandPacket) -> Result<(), PacketRejection> {
    let house = packet.house_id;

    if state.house(house).is_none() {
        return Err(PacketRejection::new(house, "header", 0, "unknown house"));
    }
    if packet.turn != state.turn {
        return Err(PacketRejection::new(
            house,
            "header",
            0,
            format!("packet turn {} != current turn {}", packet.turn, state.turn),
        ));
    }
    if packet.ebp_investment < 0 || packet.cip_investment < 0 {
        return Err(PacketRejection::new(
            house,
            "header",
            0,
            "negative espionage investment",
        ));
    }
    if packet.research_allocation.total_percent() > 100 {
        return Err(PacketRejection::new(
            house,
            "research_allocation",
            0,
            "allocation exceeds 100%",
        ));
    }

    for (line, order) in packet.fleet_commands.iter().enumerate() {
        let Some(fleet) = state.fleet(order.fleet) else {
            return Err(PacketRejection::new(
                house,
                "fleet_commands",
                line,
                format!("unknown fleet {}", order.fleet),
            ));
        };
        if fleet.owner != house {
            return Err(PacketRejection::new(
                house,
                "fleet_commands",
                line,
                format!("fleet {} is not owned by {}", order.fleet, house),
            ));
        }
        if let Some(target) = order.command.target_system() {
            if !state.map.contains(target) {
                return Err(PacketRejection::new(
                    house,
                    "fleet_commands",
                    line,
                    format!("unknown system {target}"),
                ));
            }
        }
        if let Some(roe) = order.roe {
            if !(0..=10).contains(&roe) {
                return Err(PacketRejection::new(
                    house,
                    "fleet_commands",
                    line,
                    format!("ROE {roe} outside 0..=10"),
                ));
            }
        }
    }

    for (line, order) in packet.build_commands.iter().enumerate() {
        match state.colony(order.colony) {
            None => {
                return Err(PacketRejection::new(
                    house,
                    "build_commands",
                    line,
                    format!("unknown colony {}", order.colony),
                ));
            }
            Some(colony) if colony.owner != house => {
                return Err(PacketRejection::new(
                    house,
                    "build_commands",
                    line,
                    format!("colony {} is not owned by {}", order.colony, house),
                ));
            }
            _ => {}
        }
    }

    for (line, order) in packet.population_transfers.iter().enumerate() {
        if order.units <= 0 {
            return Err(PacketRejection::new(
                house,
                "population_transfers",
                line,
                "transfer of zero or negative units",
            ));
        }
    }

    for (line, action) in packet.espionage_actions.iter().enumerate() {
        if action.target_house == house {
            return Err(PacketRejection::new(
                house,
                "espionage_actions",
                line,
                "cannot target own house",
            ));
        }
        if state.house(action.target_house).is_none() {
            return Err(PacketRejection::new(
                house,
                "espionage_actions",
                line,
                format!("unknown target house {}", action.target_house),
            ));
        }
    }

    for (line, cmd) in packet.diplomatic_commands.iter().enumerate() {
        let target = match *cmd {
            DiplomaticCommand::DeclareHostile { target }
            | DiplomaticCommand::DeclareEnemy { target }
            | DiplomaticCommand::ProposePact { target }
            | DiplomaticCommand::AcceptPact { target }
            | DiplomaticCommand::BreakPact { target }
            | DiplomaticCommand::ProposeCeasefire { target }
            | DiplomaticCommand::AcceptCeasefire { target } => target,
        };
        if target == house {
            return Err(PacketRejection::new(
                house,
                "diplomatic_commands",
                line,
                "cannot target own house",
            ));
        }
        if state.house(target).is_none() {
            return Err(PacketRejection::new(
                house,
                "diplomatic_commands",
                line,
                format!("unknown target house {target}"),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::GameStateBuilder;

    #[test]
    fn empty_packet_for_current_turn_is_valid() {
        let state = GameStateBuilder::new().with_house("Atreides").build();
        let packet = CommandPacket::empty(HouseId(1), state.turn);
        assert!(validate_packet(&state, &packet).is_ok());
    }

    #[test]
    fn stale_turn_is_rejected() {
        let state = GameStateBuilder::new().with_house("Atreides").build();
        let packet = CommandPacket::empty(HouseId(1), state.turn + 1);
        let err = validate_packet(&state, &packet).unwrap_err();
        assert_eq!(err.section, "header");
    }

    #[test]
    fn foreign_fleet_order_is_rejected_with_line() {
        let mut builder = GameStateBuilder::new()
            .with_house("Atreides")
            .with_house("Harkonnen")
            .with_line_map(3);
        let enemy_fleet = builder.add_fleet(HouseId(2), SystemId(1));
        let state = builder.build();

        let mut packet = CommandPacket::empty(HouseId(1), state.turn);
        packet.fleet_commands.push(FleetOrder {
            fleet: enemy_fleet,
            command: FleetCommand::Hold,
            priority: 0,
            roe: None,
        });
        let err = validate_packet(&state, &packet).unwrap_err();
        assert_eq!(err.section, "fleet_commands");
        assert_eq!(err.line, 0);
    }

    #[test]
    fn overcommitted_research_is_rejected() {
        let state = GameStateBuilder::new().with_house("Atreides").build();
        let mut packet = CommandPacket::empty(HouseId(1), state.turn);
        packet.research_allocation = ResearchAllocation {
            shares: vec![(TechField::Wep, 60), (TechField::El, 60)],
        };
        let err = validate_packet(&state, &packet).unwrap_err();
        assert_eq!(err.section, "research_allocation");
    }

    #[test]
    fn packet_roundtrips_through_serde() {
        let mut packet = CommandPacket::empty(HouseId(3), 7);
        packet.fleet_commands.push(FleetOrder {
            fleet: FleetId(9),
            command: FleetCommand::Rendezvous {
                fleet: FleetId(4),
                system: SystemId(2),
            },
            priority: 1,
            roe: Some(8),
        });
        packet.scrap_commands.push(ScrapOrder::Squadron(SquadronId(5)));
        let bytes = serde_json::to_vec(&packet).unwrap();
        let back: CommandPacket = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(packet, back);
    }
}
