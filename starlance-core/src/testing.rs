//! Test fixtures: a builder that assembles coherent game states through the
//! state-core API, so every fixture starts with valid indices.

use crate::config::GameConfig;
use crate::entities::*;
use crate::ids::*;
use crate::map::{HexCoord, Lane, LaneClass, PlanetClass, ResourceRating, StarMap, StarSystem};
use crate::state::GameState;
use std::collections::BTreeMap;

pub struct GameStateBuilder {
    state: GameState,
}

impl GameStateBuilder {
    pub fn new() -> Self {
        let mut state = GameState::new(StarMap::default(), 2001);
        state.seed_rng(state.turn);
        Self { state }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.state.game_seed = seed;
        self.state.seed_rng(self.state.turn);
        self
    }

    /// Adds a house with a comfortable default treasury.
    pub fn with_house(mut self, name: &str) -> Self {
        let id = self.state.add_house(name);
        if let Some(house) = self.state.house_mut(id) {
            house.treasury = 100;
        }
        self
    }

    /// Line map: systems 1..=n joined by Minor lanes, all Benign/Average.
    pub fn with_line_map(mut self, n: u32) -> Self {
        let systems = (1..=n)
            .map(|i| StarSystem {
                id: SystemId(i),
                coord: HexCoord::new(i as i32, 0),
                ring: i,
                planet_class: PlanetClass::Benign,
                resources: ResourceRating::Average,
            })
            .collect();
        let mut lanes: BTreeMap<SystemId, Vec<Lane>> = BTreeMap::new();
        for i in 1..n {
            lanes.entry(SystemId(i)).or_default().push(Lane {
                to: SystemId(i + 1),
                class: LaneClass::Minor,
            });
            lanes.entry(SystemId(i + 1)).or_default().push(Lane {
                to: SystemId(i),
                class: LaneClass::Minor,
            });
        }
        self.state.map = StarMap::new(systems, lanes);
        self
    }

    pub fn set_planet_class(mut self, system: SystemId, class: PlanetClass) -> Self {
        self.state.map.set_planet_class(system, class);
        self
    }

    pub fn add_colony(&mut self, owner: HouseId, system: SystemId, population: i64) -> ColonyId {
        self.state.add_colony(owner, system, population)
    }

    pub fn add_fleet(&mut self, owner: HouseId, location: SystemId) -> FleetId {
        self.state.add_fleet(owner, location)
    }

    /// Mints the flagship and members, then forms the squadron. Kind follows
    /// the flagship's hull role.
    pub fn add_squadron(
        &mut self,
        fleet: FleetId,
        flagship: ShipClass,
        members: &[ShipClass],
    ) -> SquadronId {
        let owner = self.state.fleet(fleet).expect("fleet exists").owner;
        let flagship_id = self.state.add_ship(owner, flagship);
        let member_ids: Vec<ShipId> = members
            .iter()
            .map(|&class| self.state.add_ship(owner, class))
            .collect();
        self.state
            .add_squadron(owner, fleet, flagship_id, member_ids, flagship.role().into())
            .expect("squadron forms")
    }

    pub fn add_neoria(&mut self, colony: ColonyId, class: NeoriaClass) -> NeoriaId {
        self.state.add_neoria(colony, class)
    }

    pub fn add_kastra(&mut self, colony: ColonyId) -> KastraId {
        self.state.add_kastra(colony)
    }

    pub fn add_ground_unit(
        &mut self,
        owner: HouseId,
        colony: ColonyId,
        kind: GroundUnitKind,
    ) -> GroundUnitId {
        self.state
            .add_ground_unit(owner, kind, GroundUnitSite::Colony(colony))
    }

    pub fn load_cargo(&mut self, ship: ShipId, kind: CargoKind, units: i64) {
        if let Some(s) = self.state.ship_mut(ship) {
            s.cargo = Some(Cargo { kind, units });
        }
    }

    pub fn state_mut(&mut self) -> &mut GameState {
        &mut self.state
    }

    pub fn build(self) -> GameState {
        self.state
    }
}

impl Default for GameStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Two houses on a 3-system line, each with a homeworld colony at an end.
/// The common scenario skeleton.
pub fn two_house_line() -> (GameState, HouseId, HouseId) {
    let mut builder = GameStateBuilder::new()
        .with_house("Atreides")
        .with_house("Harkonnen")
        .with_line_map(3);
    builder.add_colony(HouseId(1), SystemId(1), 200);
    builder.add_colony(HouseId(2), SystemId(3), 200);
    (builder.build(), HouseId(1), HouseId(2))
}

/// Default config used across the test suite.
pub fn test_config() -> GameConfig {
    GameConfig::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_produces_coherent_state() {
        let (state, a, b) = two_house_line();
        assert_eq!(state.colonies_owned(a).len(), 1);
        assert_eq!(state.colonies_owned(b).len(), 1);
        state.validate_invariants(&test_config()).unwrap();
    }

    #[test]
    fn line_map_connects_ends() {
        let state = GameStateBuilder::new().with_line_map(5).build();
        assert_eq!(state.map.jump_distance(SystemId(1), SystemId(5)), Some(4));
    }
}
