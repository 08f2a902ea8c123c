//! The immutable star map: systems on a hex grid, joined by jump lanes.
//!
//! The map is generated outside the engine and consumed here as a frozen
//! structure. Resolution logic only ever reads it; colonies, fleets and
//! everything else that changes lives in `GameState`.

use crate::ids::{HouseId, SystemId};
use lane_pathfinding::Graph;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Axial hex coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct HexCoord {
    pub q: i32,
    pub r: i32,
}

impl HexCoord {
    pub const fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    /// Hex distance between two axial coordinates.
    pub fn distance(self, other: HexCoord) -> u32 {
        let dq = (self.q - other.q).abs();
        let dr = (self.r - other.r).abs();
        let ds = (self.q + self.r - other.q - other.r).abs();
        ((dq + dr + ds) / 2) as u32
    }

    /// Ring index around the origin (0 = center).
    pub fn ring(self) -> u32 {
        self.distance(HexCoord::new(0, 0))
    }
}

/// Habitability ladder. Determines the population capacity K used by the
/// logistic growth curve; terraforming moves a system one step up.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum PlanetClass {
    Extreme,
    Hostile,
    Harsh,
    Benign,
    Terran,
    Eden,
}

impl PlanetClass {
    /// Population capacity in PU.
    pub const fn capacity(self) -> i64 {
        match self {
            PlanetClass::Extreme => 20,
            PlanetClass::Hostile => 100,
            PlanetClass::Harsh => 500,
            PlanetClass::Benign => 1500,
            PlanetClass::Terran => 3000,
            PlanetClass::Eden => 5000,
        }
    }

    /// Next step up the ladder, if any.
    pub const fn improved(self) -> Option<PlanetClass> {
        match self {
            PlanetClass::Extreme => Some(PlanetClass::Hostile),
            PlanetClass::Hostile => Some(PlanetClass::Harsh),
            PlanetClass::Harsh => Some(PlanetClass::Benign),
            PlanetClass::Benign => Some(PlanetClass::Terran),
            PlanetClass::Terran => Some(PlanetClass::Eden),
            PlanetClass::Eden => None,
        }
    }

    /// Cost multiplier for Space Guild population transfers to this class.
    pub const fn transfer_multiplier(self) -> i64 {
        match self {
            PlanetClass::Extreme => 5,
            PlanetClass::Hostile => 4,
            PlanetClass::Harsh => 3,
            PlanetClass::Benign => 2,
            PlanetClass::Terran => 1,
            PlanetClass::Eden => 1,
        }
    }
}

/// Per-system production multiplier bucket (the RAW index is configured per
/// rating in `GameConfig::economy`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ResourceRating {
    VeryPoor,
    Poor,
    Average,
    Rich,
    VeryRich,
}

/// Jump lane classification.
///
/// Major lanes allow 2 jumps per turn when the traveler owns both ends;
/// Minor lanes 1; Restricted lanes 1 and refuse crippled or transport hulls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LaneClass {
    Major,
    Minor,
    Restricted,
}

/// One directed half of a jump lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lane {
    pub to: SystemId,
    pub class: LaneClass,
}

/// A star system node. Mutable colony state lives in `GameState`; this is
/// only the geography.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StarSystem {
    pub id: SystemId,
    pub coord: HexCoord,
    pub ring: u32,
    pub planet_class: PlanetClass,
    pub resources: ResourceRating,
}

/// Context for lane traversal cost decisions.
///
/// `owned_systems` holds the traveler's colonized systems so Major lanes can
/// grant the double-jump rate; the hull flags gate Restricted lanes.
#[derive(Debug, Clone)]
pub struct TravelContext {
    pub traveler: HouseId,
    pub owned_systems: Vec<SystemId>,
    pub has_crippled_ships: bool,
    pub has_transport_ships: bool,
    /// When true every lane costs one jump regardless of class or ownership.
    /// Used for distances (transfer pricing, scout ranges), not movement.
    pub uniform_jumps: bool,
}

impl TravelContext {
    pub fn uniform() -> Self {
        Self {
            traveler: HouseId::NULL,
            owned_systems: Vec::new(),
            has_crippled_ships: false,
            has_transport_ships: false,
            uniform_jumps: true,
        }
    }
}

/// Movement-point scale: a fleet spends `POINTS_PER_TURN` per turn, an owned
/// Major lane costs half of it, everything else a full turn.
pub const POINTS_PER_TURN: u32 = 2;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StarMap {
    systems: Vec<StarSystem>,
    #[serde(skip)]
    index: FxHashMap<SystemId, usize>,
    /// Adjacency, ID-ordered so serialization is byte-stable; neighbor
    /// lists sorted by destination ID.
    lanes: BTreeMap<SystemId, Vec<Lane>>,
}

impl StarMap {
    pub fn new(systems: Vec<StarSystem>, mut lanes: BTreeMap<SystemId, Vec<Lane>>) -> Self {
        let index = systems
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id, i))
            .collect();
        for neighbors in lanes.values_mut() {
            neighbors.sort_by_key(|l| l.to);
        }
        Self {
            systems,
            index,
            lanes,
        }
    }

    /// Rebuild the id → slot index after deserialization.
    pub fn rebuild_index(&mut self) {
        self.index = self
            .systems
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id, i))
            .collect();
    }

    pub fn system(&self, id: SystemId) -> Option<&StarSystem> {
        self.index.get(&id).map(|&i| &self.systems[i])
    }

    pub fn contains(&self, id: SystemId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn systems(&self) -> impl Iterator<Item = &StarSystem> {
        self.systems.iter()
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Neighbor lanes of a system, sorted by destination ID.
    pub fn lanes_from(&self, id: SystemId) -> &[Lane] {
        self.lanes.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn lane_between(&self, from: SystemId, to: SystemId) -> Option<Lane> {
        self.lanes_from(from).iter().copied().find(|l| l.to == to)
    }

    /// Distance in jumps treating every lane as one jump. `None` when
    /// disconnected.
    pub fn jump_distance(&self, from: SystemId, to: SystemId) -> Option<u32> {
        let ctx = TravelContext::uniform();
        lane_pathfinding::find_path(self, from, to, &ctx).map(|(_, cost)| cost)
    }

    /// Shortest travel path for a fleet, as (systems, movement points).
    pub fn travel_path(
        &self,
        from: SystemId,
        to: SystemId,
        ctx: &TravelContext,
    ) -> Option<(Vec<SystemId>, u32)> {
        lane_pathfinding::find_path(self, from, to, ctx)
    }

    /// Reclassify a system's planet (used when a terraform project
    /// completes).
    pub fn set_planet_class(&mut self, id: SystemId, class: PlanetClass) {
        if let Some(&i) = self.index.get(&id) {
            self.systems[i].planet_class = class;
        }
    }
}

impl Graph<SystemId, TravelContext> for StarMap {
    fn neighbors(&self, node: SystemId, _ctx: &TravelContext) -> Vec<SystemId> {
        self.lanes_from(node).iter().map(|l| l.to).collect()
    }

    fn cost(&self, from: SystemId, to: SystemId, ctx: &TravelContext) -> Option<u32> {
        let lane = self.lane_between(from, to)?;
        if ctx.uniform_jumps {
            return Some(1);
        }
        match lane.class {
            LaneClass::Major => {
                let owns_both =
                    ctx.owned_systems.contains(&from) && ctx.owned_systems.contains(&to);
                if owns_both {
                    Some(POINTS_PER_TURN / 2)
                } else {
                    Some(POINTS_PER_TURN)
                }
            }
            LaneClass::Minor => Some(POINTS_PER_TURN),
            LaneClass::Restricted => {
                if ctx.has_crippled_ships || ctx.has_transport_ships {
                    None
                } else {
                    Some(POINTS_PER_TURN)
                }
            }
        }
    }

    fn heuristic(&self, from: SystemId, target: SystemId, ctx: &TravelContext) -> u32 {
        // Uniform jump counting gets no estimate: lanes may shortcut hex
        // distance, so only zero is admissible there
        if ctx.uniform_jumps {
            return 0;
        }
        match (self.system(from), self.system(target)) {
            (Some(a), Some(b)) => a.coord.distance(b.coord) * (POINTS_PER_TURN / 2),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sys(id: u32, q: i32, r: i32) -> StarSystem {
        StarSystem {
            id: SystemId(id),
            coord: HexCoord::new(q, r),
            ring: HexCoord::new(q, r).ring(),
            planet_class: PlanetClass::Benign,
            resources: ResourceRating::Average,
        }
    }

    fn link(
        lanes: &mut BTreeMap<SystemId, Vec<Lane>>,
        a: u32,
        b: u32,
        class: LaneClass,
    ) {
        lanes.entry(SystemId(a)).or_default().push(Lane {
            to: SystemId(b),
            class,
        });
        lanes.entry(SystemId(b)).or_default().push(Lane {
            to: SystemId(a),
            class,
        });
    }

    /// 1 -M- 2 -M- 3, 1 -m- 4 -m- 3, 1 -R- 3
    fn test_map() -> StarMap {
        let systems = vec![
            sys(1, 0, 0),
            sys(2, 1, 0),
            sys(3, 2, 0),
            sys(4, 0, 1),
        ];
        let mut lanes = BTreeMap::new();
        link(&mut lanes, 1, 2, LaneClass::Major);
        link(&mut lanes, 2, 3, LaneClass::Major);
        link(&mut lanes, 1, 4, LaneClass::Minor);
        link(&mut lanes, 4, 3, LaneClass::Minor);
        link(&mut lanes, 1, 3, LaneClass::Restricted);
        StarMap::new(systems, lanes)
    }

    #[test]
    fn hex_distance() {
        assert_eq!(HexCoord::new(0, 0).distance(HexCoord::new(2, 0)), 2);
        assert_eq!(HexCoord::new(0, 0).distance(HexCoord::new(1, -1)), 1);
        assert_eq!(HexCoord::new(3, -1).ring(), 3);
    }

    #[test]
    fn jump_distance_is_uniform() {
        let map = test_map();
        // Restricted direct lane counts as one jump for distances
        assert_eq!(map.jump_distance(SystemId(1), SystemId(3)), Some(1));
        assert_eq!(map.jump_distance(SystemId(2), SystemId(4)), Some(2));
    }

    #[test]
    fn restricted_lane_blocks_transports() {
        let map = test_map();
        let ctx = TravelContext {
            traveler: HouseId(1),
            owned_systems: vec![],
            has_crippled_ships: false,
            has_transport_ships: true,
            uniform_jumps: false,
        };
        let (path, _) = map.travel_path(SystemId(1), SystemId(3), &ctx).unwrap();
        // Must detour around the restricted shortcut
        assert!(!path.windows(2).any(|w| w == [SystemId(1), SystemId(3)]));
    }

    #[test]
    fn owned_major_lanes_are_faster() {
        let map = test_map();
        let owned = TravelContext {
            traveler: HouseId(1),
            owned_systems: vec![SystemId(1), SystemId(2), SystemId(3)],
            has_crippled_ships: false,
            has_transport_ships: false,
            uniform_jumps: false,
        };
        let unowned = TravelContext {
            owned_systems: vec![],
            ..owned.clone()
        };
        let (_, fast) = map.travel_path(SystemId(1), SystemId(3), &owned).unwrap();
        let (_, slow) = map
            .travel_path(SystemId(1), SystemId(3), &unowned)
            .unwrap();
        // Owned majors: two half-cost jumps = one turn. Unowned: restricted
        // direct lane at full cost wins.
        assert_eq!(fast, POINTS_PER_TURN);
        assert_eq!(slow, POINTS_PER_TURN);
    }

    #[test]
    fn planet_class_ladder() {
        assert_eq!(PlanetClass::Extreme.capacity(), 20);
        assert_eq!(PlanetClass::Eden.capacity(), 5000);
        assert_eq!(PlanetClass::Terran.improved(), Some(PlanetClass::Eden));
        assert_eq!(PlanetClass::Eden.improved(), None);
    }
}
