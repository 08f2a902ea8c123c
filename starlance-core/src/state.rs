//! The world snapshot and its index-maintaining mutation API.
//!
//! Every entity collection shares one storage shape: a contiguous vector of
//! records plus an ID → slot map, with swap-remove deletion. Secondary
//! indices giving O(1) relational queries are part of the data model; all
//! mutations go through the methods here so the indices never drift. Direct
//! structural mutation that bypasses this API is forbidden — detected drift
//! is fatal to the turn, never patched over.

use crate::config::GameConfig;
use crate::entities::*;
use crate::ids::*;
use crate::map::StarMap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Fatal state-core failures. Any of these aborts the turn; the caller
/// keeps the pre-turn snapshot.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("{kind} {id} does not exist")]
    MissingEntity { kind: &'static str, id: u32 },
    #[error("null ID dereferenced for {kind}")]
    NullId { kind: &'static str },
    #[error("index drift: {detail}")]
    IndexDrift { detail: String },
    #[error("impossible transition: {detail}")]
    InvalidTransition { detail: String },
}

// ============================================================================
// Arena storage
// ============================================================================

/// Contiguous record storage with an ID → slot map.
///
/// Iteration order is insertion order disturbed only by swap-remove, which
/// is itself deterministic; anything order-sensitive still sorts by ID
/// before consuming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arena<I, T> {
    records: Vec<T>,
    #[serde(skip)]
    slots: FxHashMap<I, usize>,
    #[serde(skip)]
    _marker: std::marker::PhantomData<I>,
}

impl<I, T> Default for Arena<I, T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            slots: FxHashMap::default(),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<I, T> Arena<I, T>
where
    I: Copy + Eq + std::hash::Hash + Ord,
{
    pub fn insert(&mut self, id: I, record: T) {
        debug_assert!(!self.slots.contains_key(&id), "duplicate arena insert");
        self.slots.insert(id, self.records.len());
        self.records.push(record);
    }

    pub fn get(&self, id: I) -> Option<&T> {
        self.slots.get(&id).map(|&slot| &self.records[slot])
    }

    pub fn get_mut(&mut self, id: I) -> Option<&mut T> {
        self.slots.get(&id).map(|&slot| &mut self.records[slot])
    }

    pub fn contains(&self, id: I) -> bool {
        self.slots.contains_key(&id)
    }

    /// Swap-remove. The displaced record's slot entry is patched by the
    /// caller-provided key extractor.
    pub fn remove(&mut self, id: I, key_of: impl Fn(&T) -> I) -> Option<T> {
        let slot = self.slots.remove(&id)?;
        let record = self.records.swap_remove(slot);
        if slot < self.records.len() {
            let moved_id = key_of(&self.records[slot]);
            self.slots.insert(moved_id, slot);
        }
        Some(record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.records.iter_mut()
    }

    /// All IDs in ascending order. The entry point for any
    /// order-sensitive walk.
    pub fn ids_sorted(&self) -> Vec<I> {
        let mut ids: Vec<I> = self.slots.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Rebuild the slot map from records (after deserialization).
    pub fn rebuild_slots(&mut self, key_of: impl Fn(&T) -> I) {
        self.slots = self
            .records
            .iter()
            .enumerate()
            .map(|(slot, r)| (key_of(r), slot))
            .collect();
    }
}

// ============================================================================
// Diplomacy matrix
// ============================================================================

/// Relation records per ordered `(actor, toward)` pair. BTreeMap so walks
/// over the matrix are naturally ID-ordered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiplomacyMatrix {
    pub relations: BTreeMap<(HouseId, HouseId), DiplomaticRelation>,
}

impl DiplomacyMatrix {
    pub fn relation(&self, actor: HouseId, toward: HouseId) -> DiplomaticRelation {
        self.relations
            .get(&(actor, toward))
            .cloned()
            .unwrap_or_default()
    }

    pub fn relation_mut(&mut self, actor: HouseId, toward: HouseId) -> &mut DiplomaticRelation {
        self.relations.entry((actor, toward)).or_default()
    }

    pub fn stance(&self, actor: HouseId, toward: HouseId) -> DiplomaticStance {
        self.relation(actor, toward).stance
    }

    /// Hostile in either direction means shooting is legal in both.
    pub fn are_hostile(&self, a: HouseId, b: HouseId) -> bool {
        self.stance(a, b) >= DiplomaticStance::Hostile
            || self.stance(b, a) >= DiplomaticStance::Hostile
    }

    pub fn are_enemies(&self, a: HouseId, b: HouseId) -> bool {
        self.stance(a, b) == DiplomaticStance::Enemy || self.stance(b, a) == DiplomaticStance::Enemy
    }

    pub fn has_pact(&self, a: HouseId, b: HouseId) -> bool {
        self.relation(a, b).pact || self.relation(b, a).pact
    }
}

// ============================================================================
// Secondary indices
// ============================================================================

/// Rebuilt from the forward collections on load; never serialized.
#[derive(Debug, Clone, Default)]
pub struct Indices {
    pub colonies_by_owner: FxHashMap<HouseId, Vec<ColonyId>>,
    pub colony_by_system: FxHashMap<SystemId, ColonyId>,
    pub fleets_by_location: FxHashMap<SystemId, Vec<FleetId>>,
    pub ships_by_squadron: FxHashMap<SquadronId, Vec<ShipId>>,
    pub squadrons_by_fleet: FxHashMap<FleetId, Vec<SquadronId>>,
    pub squadrons_by_house: FxHashMap<HouseId, Vec<SquadronId>>,
    pub neorias_by_colony: FxHashMap<ColonyId, Vec<NeoriaId>>,
    pub kastras_by_colony: FxHashMap<ColonyId, Vec<KastraId>>,
    pub ground_units_by_colony: FxHashMap<ColonyId, Vec<GroundUnitId>>,
    pub ground_units_by_transport: FxHashMap<ShipId, Vec<GroundUnitId>>,
    pub projects_by_colony: FxHashMap<ColonyId, Vec<ConstructionProjectId>>,
    pub projects_by_facility: FxHashMap<NeoriaId, Vec<ConstructionProjectId>>,
}

fn push_index<K: Copy + Eq + std::hash::Hash, V: Ord>(
    index: &mut FxHashMap<K, Vec<V>>,
    key: K,
    value: V,
) {
    let list = index.entry(key).or_default();
    list.push(value);
    list.sort();
}

fn pull_index<K: Copy + Eq + std::hash::Hash, V: PartialEq>(
    index: &mut FxHashMap<K, Vec<V>>,
    key: K,
    value: &V,
) {
    if let Some(list) = index.get_mut(&key) {
        list.retain(|v| v != value);
        if list.is_empty() {
            index.remove(&key);
        }
    }
}

// ============================================================================
// Pending commissions
// ============================================================================

/// A ship completed last Maintenance, waiting for Unified Commissioning.
/// Must be fully drained before the turn that drains it ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCommission {
    pub colony: ColonyId,
    pub ship: ShipId,
}

// ============================================================================
// Game state
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameState {
    pub turn: u32,
    pub game_seed: u64,
    /// xorshift64 state; reseeded from `(turn, game_seed)` at turn start.
    pub rng_state: u64,
    pub map: StarMap,

    pub houses: Arena<HouseId, House>,
    pub colonies: Arena<ColonyId, Colony>,
    pub neorias: Arena<NeoriaId, Neoria>,
    pub kastras: Arena<KastraId, Kastra>,
    pub fleets: Arena<FleetId, Fleet>,
    pub squadrons: Arena<SquadronId, Squadron>,
    pub ships: Arena<ShipId, Ship>,
    pub ground_units: Arena<GroundUnitId, GroundUnit>,
    pub construction_projects: Arena<ConstructionProjectId, ConstructionProject>,
    pub repair_projects: Arena<RepairProjectId, RepairProject>,
    pub transfers: Arena<PopulationTransferId, PopulationTransfer>,

    pub house_mint: IdMint<HouseId>,
    pub colony_mint: IdMint<ColonyId>,
    pub neoria_mint: IdMint<NeoriaId>,
    pub kastra_mint: IdMint<KastraId>,
    pub fleet_mint: IdMint<FleetId>,
    pub squadron_mint: IdMint<SquadronId>,
    pub ship_mint: IdMint<ShipId>,
    pub ground_unit_mint: IdMint<GroundUnitId>,
    pub construction_mint: IdMint<ConstructionProjectId>,
    pub repair_mint: IdMint<RepairProjectId>,
    pub transfer_mint: IdMint<PopulationTransferId>,

    pub diplomacy: DiplomacyMatrix,
    pub pending_commissions: Vec<PendingCommission>,
    /// Per-house fog-of-war databases, ID-ordered.
    pub intel: BTreeMap<HouseId, crate::systems::intel::IntelDatabase>,
    /// Per-house squadron-cap grace windows, ID-ordered.
    pub capacity_grace: BTreeMap<HouseId, crate::systems::capacity::HouseCapacityGrace>,

    #[serde(skip)]
    pub indices: Indices,
}

impl GameState {
    pub fn new(map: StarMap, game_seed: u64) -> Self {
        Self {
            turn: 1,
            game_seed,
            rng_state: 0,
            map,
            ..Default::default()
        }
    }

    // ------------------------------------------------------------------
    // RNG (xorshift64, state stored inline for replay)
    // ------------------------------------------------------------------

    /// Reseed for a turn. Same `(turn, game_seed)` always yields the same
    /// roll sequence.
    pub fn seed_rng(&mut self, turn: u32) {
        // splitmix-style seed scramble so adjacent turns diverge fully
        let mut z = self
            .game_seed
            .wrapping_add((turn as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15));
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        self.rng_state = (z ^ (z >> 31)) | 1;
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.rng_state;
        if x == 0 {
            x = 1;
        }
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_state = x;
        x
    }

    /// Uniform roll in `1..=sides`.
    pub fn roll(&mut self, sides: u32) -> i32 {
        ((self.next_u64() >> 32) % sides as u64) as i32 + 1
    }

    pub fn roll_2d6(&mut self) -> i32 {
        self.roll(6) + self.roll(6)
    }

    pub fn roll_d100(&mut self) -> i32 {
        self.roll(100)
    }

    // ------------------------------------------------------------------
    // Houses
    // ------------------------------------------------------------------

    pub fn add_house(&mut self, name: impl Into<String>) -> HouseId {
        let id = self.house_mint.mint();
        self.houses.insert(id, House::new(id, name));
        id
    }

    pub fn house(&self, id: HouseId) -> Option<&House> {
        self.houses.get(id)
    }

    pub fn house_mut(&mut self, id: HouseId) -> Option<&mut House> {
        self.houses.get_mut(id)
    }

    // ------------------------------------------------------------------
    // Colonies
    // ------------------------------------------------------------------

    pub fn add_colony(&mut self, owner: HouseId, system: SystemId, population: i64) -> ColonyId {
        let id = self.colony_mint.mint();
        self.colonies
            .insert(id, Colony::new(id, owner, system, population));
        push_index(&mut self.indices.colonies_by_owner, owner, id);
        self.indices.colony_by_system.insert(system, id);
        id
    }

    pub fn colony(&self, id: ColonyId) -> Option<&Colony> {
        self.colonies.get(id)
    }

    pub fn colony_mut(&mut self, id: ColonyId) -> Option<&mut Colony> {
        self.colonies.get_mut(id)
    }

    pub fn colony_at(&self, system: SystemId) -> Option<ColonyId> {
        self.indices.colony_by_system.get(&system).copied()
    }

    /// Invasion/liquidation path; strips facilities, ground units and
    /// projects before the record goes away.
    pub fn del_colony(&mut self, id: ColonyId) -> Result<(), StateError> {
        let colony = self
            .colonies
            .get(id)
            .ok_or(StateError::MissingEntity {
                kind: "Colony",
                id: id.0,
            })?
            .clone();

        for neoria in colony.neorias {
            let _ = self.del_neoria(neoria);
        }
        for kastra in colony.kastras {
            let _ = self.del_kastra(kastra);
        }
        for fighter in colony.fighters {
            let _ = self.del_ship(fighter);
        }
        for unit in self.ground_units_at(id) {
            let _ = self.del_ground_unit(unit);
        }
        for project in self.projects_at(id) {
            let _ = self.del_construction_project(project);
        }
        for project in colony.repair_queue {
            let _ = self.repair_projects.remove(project, |p| p.id);
        }

        pull_index(&mut self.indices.colonies_by_owner, colony.owner, &id);
        self.indices.colony_by_system.remove(&colony.system);
        self.indices.ground_units_by_colony.remove(&id);
        self.indices.projects_by_colony.remove(&id);
        self.colonies.remove(id, |c| c.id);
        Ok(())
    }

    pub fn transfer_colony(&mut self, id: ColonyId, new_owner: HouseId) -> Result<(), StateError> {
        let old_owner = {
            let colony = self.colonies.get_mut(id).ok_or(StateError::MissingEntity {
                kind: "Colony",
                id: id.0,
            })?;
            let old = colony.owner;
            colony.owner = new_owner;
            old
        };
        pull_index(&mut self.indices.colonies_by_owner, old_owner, &id);
        push_index(&mut self.indices.colonies_by_owner, new_owner, id);
        Ok(())
    }

    /// Colony IDs owned by a house, ascending.
    pub fn colonies_owned(&self, house: HouseId) -> Vec<ColonyId> {
        self.indices
            .colonies_by_owner
            .get(&house)
            .cloned()
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Facilities
    // ------------------------------------------------------------------

    pub fn add_neoria(&mut self, colony: ColonyId, class: NeoriaClass) -> NeoriaId {
        let id = self.neoria_mint.mint();
        self.neorias.insert(
            id,
            Neoria {
                id,
                colony,
                class,
                state: FacilityState::Undamaged,
            },
        );
        push_index(&mut self.indices.neorias_by_colony, colony, id);
        if let Some(c) = self.colonies.get_mut(colony) {
            c.neorias.push(id);
            c.neorias.sort();
        }
        id
    }

    pub fn neoria(&self, id: NeoriaId) -> Option<&Neoria> {
        self.neorias.get(id)
    }

    pub fn neoria_mut(&mut self, id: NeoriaId) -> Option<&mut Neoria> {
        self.neorias.get_mut(id)
    }

    pub fn del_neoria(&mut self, id: NeoriaId) -> Result<(), StateError> {
        let neoria = self.neorias.remove(id, |n| n.id).ok_or(StateError::MissingEntity {
            kind: "Neoria",
            id: id.0,
        })?;
        pull_index(&mut self.indices.neorias_by_colony, neoria.colony, &id);
        if let Some(c) = self.colonies.get_mut(neoria.colony) {
            c.neorias.retain(|&n| n != id);
        }
        // Projects queued on this dock die with it
        for project in self
            .indices
            .projects_by_facility
            .get(&id)
            .cloned()
            .unwrap_or_default()
        {
            let _ = self.del_construction_project(project);
        }
        Ok(())
    }

    pub fn add_kastra(&mut self, colony: ColonyId) -> KastraId {
        let id = self.kastra_mint.mint();
        self.kastras.insert(
            id,
            Kastra {
                id,
                colony,
                state: FacilityState::Undamaged,
            },
        );
        push_index(&mut self.indices.kastras_by_colony, colony, id);
        if let Some(c) = self.colonies.get_mut(colony) {
            c.kastras.push(id);
            c.kastras.sort();
        }
        id
    }

    pub fn kastra(&self, id: KastraId) -> Option<&Kastra> {
        self.kastras.get(id)
    }

    pub fn kastra_mut(&mut self, id: KastraId) -> Option<&mut Kastra> {
        self.kastras.get_mut(id)
    }

    pub fn del_kastra(&mut self, id: KastraId) -> Result<(), StateError> {
        let kastra = self.kastras.remove(id, |k| k.id).ok_or(StateError::MissingEntity {
            kind: "Kastra",
            id: id.0,
        })?;
        pull_index(&mut self.indices.kastras_by_colony, kastra.colony, &id);
        if let Some(c) = self.colonies.get_mut(kastra.colony) {
            c.kastras.retain(|&k| k != id);
        }
        Ok(())
    }

    pub fn neorias_at(&self, colony: ColonyId) -> Vec<NeoriaId> {
        self.indices
            .neorias_by_colony
            .get(&colony)
            .cloned()
            .unwrap_or_default()
    }

    pub fn kastras_at(&self, colony: ColonyId) -> Vec<KastraId> {
        self.indices
            .kastras_by_colony
            .get(&colony)
            .cloned()
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Fleets
    // ------------------------------------------------------------------

    pub fn add_fleet(&mut self, owner: HouseId, location: SystemId) -> FleetId {
        let id = self.fleet_mint.mint();
        self.fleets.insert(id, Fleet::new(id, owner, location));
        push_index(&mut self.indices.fleets_by_location, location, id);
        id
    }

    pub fn fleet(&self, id: FleetId) -> Option<&Fleet> {
        self.fleets.get(id)
    }

    pub fn fleet_mut(&mut self, id: FleetId) -> Option<&mut Fleet> {
        self.fleets.get_mut(id)
    }

    pub fn move_fleet(&mut self, id: FleetId, to: SystemId) -> Result<(), StateError> {
        let from = {
            let fleet = self.fleets.get_mut(id).ok_or(StateError::MissingEntity {
                kind: "Fleet",
                id: id.0,
            })?;
            let from = fleet.location;
            fleet.location = to;
            from
        };
        pull_index(&mut self.indices.fleets_by_location, from, &id);
        push_index(&mut self.indices.fleets_by_location, to, id);
        Ok(())
    }

    /// Removes the fleet record and its location index entry. Squadrons and
    /// ships must have been reassigned or deleted first.
    pub fn del_fleet(&mut self, id: FleetId) -> Result<(), StateError> {
        if self
            .indices
            .squadrons_by_fleet
            .get(&id)
            .is_some_and(|v| !v.is_empty())
        {
            return Err(StateError::InvalidTransition {
                detail: format!("deleting fleet {id} that still has squadrons"),
            });
        }
        let fleet = self.fleets.remove(id, |f| f.id).ok_or(StateError::MissingEntity {
            kind: "Fleet",
            id: id.0,
        })?;
        pull_index(&mut self.indices.fleets_by_location, fleet.location, &id);
        self.indices.squadrons_by_fleet.remove(&id);
        Ok(())
    }

    /// Fleet IDs at a system, ascending.
    pub fn fleets_at(&self, system: SystemId) -> Vec<FleetId> {
        self.indices
            .fleets_by_location
            .get(&system)
            .cloned()
            .unwrap_or_default()
    }

    /// All fleets of a house, ascending (derived; fleets have no
    /// per-house index because the squadron one covers the hot path).
    pub fn fleets_owned(&self, house: HouseId) -> Vec<FleetId> {
        let mut out: Vec<FleetId> = self
            .fleets
            .iter()
            .filter(|f| f.owner == house)
            .map(|f| f.id)
            .collect();
        out.sort();
        out
    }

    // ------------------------------------------------------------------
    // Squadrons
    // ------------------------------------------------------------------

    /// Creates a squadron around a flagship and wires every membership
    /// index. The flagship and members must already exist and be
    /// unassigned.
    pub fn add_squadron(
        &mut self,
        owner: HouseId,
        fleet: FleetId,
        flagship: ShipId,
        members: Vec<ShipId>,
        kind: SquadronKind,
    ) -> Result<SquadronId, StateError> {
        let id = self.squadron_mint.mint();
        for &ship_id in std::iter::once(&flagship).chain(members.iter()) {
            let ship = self.ships.get_mut(ship_id).ok_or(StateError::MissingEntity {
                kind: "Ship",
                id: ship_id.0,
            })?;
            ship.squadron = id;
            push_index(&mut self.indices.ships_by_squadron, id, ship_id);
        }
        self.squadrons.insert(
            id,
            Squadron {
                id,
                owner,
                fleet,
                flagship,
                ships: members,
                embarked_fighters: Vec::new(),
                kind,
            },
        );
        push_index(&mut self.indices.squadrons_by_fleet, fleet, id);
        push_index(&mut self.indices.squadrons_by_house, owner, id);
        if let Some(f) = self.fleets.get_mut(fleet) {
            f.squadrons.push(id);
            f.squadrons.sort();
        }
        Ok(id)
    }

    pub fn squadron(&self, id: SquadronId) -> Option<&Squadron> {
        self.squadrons.get(id)
    }

    pub fn squadron_mut(&mut self, id: SquadronId) -> Option<&mut Squadron> {
        self.squadrons.get_mut(id)
    }

    pub fn move_squadron(&mut self, id: SquadronId, to_fleet: FleetId) -> Result<(), StateError> {
        let from_fleet = {
            let sq = self.squadrons.get_mut(id).ok_or(StateError::MissingEntity {
                kind: "Squadron",
                id: id.0,
            })?;
            let from = sq.fleet;
            sq.fleet = to_fleet;
            from
        };
        pull_index(&mut self.indices.squadrons_by_fleet, from_fleet, &id);
        push_index(&mut self.indices.squadrons_by_fleet, to_fleet, id);
        if let Some(f) = self.fleets.get_mut(from_fleet) {
            f.squadrons.retain(|&s| s != id);
        }
        if let Some(f) = self.fleets.get_mut(to_fleet) {
            f.squadrons.push(id);
            f.squadrons.sort();
        }
        Ok(())
    }

    /// Deletes the squadron and every member ship (combat destruction,
    /// scrapping, cascade disbanding).
    pub fn del_squadron(&mut self, id: SquadronId) -> Result<(), StateError> {
        let squadron = self
            .squadrons
            .get(id)
            .ok_or(StateError::MissingEntity {
                kind: "Squadron",
                id: id.0,
            })?
            .clone();

        for ship in squadron.all_ships().collect::<Vec<_>>() {
            let _ = self.del_ship(ship);
        }
        for fighter in squadron.embarked_fighters {
            let _ = self.del_ship(fighter);
        }

        pull_index(&mut self.indices.squadrons_by_fleet, squadron.fleet, &id);
        pull_index(&mut self.indices.squadrons_by_house, squadron.owner, &id);
        self.indices.ships_by_squadron.remove(&id);
        if let Some(f) = self.fleets.get_mut(squadron.fleet) {
            f.squadrons.retain(|&s| s != id);
        }
        self.squadrons.remove(id, |s| s.id);
        Ok(())
    }

    /// Attach an unassigned ship to a squadron as a member.
    pub fn add_ship_to_squadron(
        &mut self,
        ship: ShipId,
        squadron: SquadronId,
    ) -> Result<(), StateError> {
        if !self.squadrons.contains(squadron) {
            return Err(StateError::MissingEntity {
                kind: "Squadron",
                id: squadron.0,
            });
        }
        {
            let s = self.ships.get_mut(ship).ok_or(StateError::MissingEntity {
                kind: "Ship",
                id: ship.0,
            })?;
            if !s.squadron.is_null() {
                return Err(StateError::InvalidTransition {
                    detail: format!("{ship} already serves in {}", s.squadron),
                });
            }
            s.squadron = squadron;
        }
        if let Some(sq) = self.squadrons.get_mut(squadron) {
            sq.ships.push(ship);
            sq.ships.sort();
        }
        push_index(&mut self.indices.ships_by_squadron, squadron, ship);
        Ok(())
    }

    /// Embark an unassigned fighter on a squadron's carrier hulls.
    pub fn embark_fighter(
        &mut self,
        fighter: ShipId,
        squadron: SquadronId,
    ) -> Result<(), StateError> {
        if !self.squadrons.contains(squadron) {
            return Err(StateError::MissingEntity {
                kind: "Squadron",
                id: squadron.0,
            });
        }
        {
            let s = self.ships.get_mut(fighter).ok_or(StateError::MissingEntity {
                kind: "Ship",
                id: fighter.0,
            })?;
            if !s.squadron.is_null() {
                return Err(StateError::InvalidTransition {
                    detail: format!("{fighter} already serves in {}", s.squadron),
                });
            }
            s.squadron = squadron;
        }
        if let Some(sq) = self.squadrons.get_mut(squadron) {
            sq.embarked_fighters.push(fighter);
            sq.embarked_fighters.sort();
        }
        push_index(&mut self.indices.ships_by_squadron, squadron, fighter);
        Ok(())
    }

    pub fn squadrons_of(&self, fleet: FleetId) -> Vec<SquadronId> {
        self.indices
            .squadrons_by_fleet
            .get(&fleet)
            .cloned()
            .unwrap_or_default()
    }

    pub fn squadrons_owned(&self, house: HouseId) -> Vec<SquadronId> {
        self.indices
            .squadrons_by_house
            .get(&house)
            .cloned()
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Ships
    // ------------------------------------------------------------------

    /// Mints an unassigned ship (commissioning staging, hangar fighters).
    pub fn add_ship(&mut self, owner: HouseId, class: ShipClass) -> ShipId {
        let id = self.ship_mint.mint();
        self.ships.insert(id, Ship::new(id, owner, class));
        id
    }

    pub fn ship(&self, id: ShipId) -> Option<&Ship> {
        self.ships.get(id)
    }

    pub fn ship_mut(&mut self, id: ShipId) -> Option<&mut Ship> {
        self.ships.get_mut(id)
    }

    /// Removes a ship from its squadron membership lists and indices, then
    /// deletes the record. Embarked ground units die with the hull.
    pub fn del_ship(&mut self, id: ShipId) -> Result<(), StateError> {
        let ship = self.ships.get(id).ok_or(StateError::MissingEntity {
            kind: "Ship",
            id: id.0,
        })?;
        let squadron = ship.squadron;

        if !squadron.is_null() {
            pull_index(&mut self.indices.ships_by_squadron, squadron, &id);
            if let Some(sq) = self.squadrons.get_mut(squadron) {
                sq.ships.retain(|&s| s != id);
                sq.embarked_fighters.retain(|&s| s != id);
            }
        }
        for unit in self
            .indices
            .ground_units_by_transport
            .get(&id)
            .cloned()
            .unwrap_or_default()
        {
            let _ = self.del_ground_unit(unit);
        }
        self.indices.ground_units_by_transport.remove(&id);
        self.ships.remove(id, |s| s.id);
        Ok(())
    }

    pub fn ships_of(&self, squadron: SquadronId) -> Vec<ShipId> {
        self.indices
            .ships_by_squadron
            .get(&squadron)
            .cloned()
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Ground units
    // ------------------------------------------------------------------

    pub fn add_ground_unit(
        &mut self,
        owner: HouseId,
        kind: GroundUnitKind,
        site: GroundUnitSite,
    ) -> GroundUnitId {
        let id = self.ground_unit_mint.mint();
        self.ground_units.insert(
            id,
            GroundUnit {
                id,
                owner,
                kind,
                site,
            },
        );
        match site {
            GroundUnitSite::Colony(c) => push_index(&mut self.indices.ground_units_by_colony, c, id),
            GroundUnitSite::Transport(s) => {
                push_index(&mut self.indices.ground_units_by_transport, s, id)
            }
        }
        id
    }

    pub fn ground_unit(&self, id: GroundUnitId) -> Option<&GroundUnit> {
        self.ground_units.get(id)
    }

    pub fn move_ground_unit(&mut self, id: GroundUnitId, site: GroundUnitSite) -> Result<(), StateError> {
        let old_site = {
            let unit = self
                .ground_units
                .get_mut(id)
                .ok_or(StateError::MissingEntity {
                    kind: "GroundUnit",
                    id: id.0,
                })?;
            let old = unit.site;
            unit.site = site;
            old
        };
        match old_site {
            GroundUnitSite::Colony(c) => pull_index(&mut self.indices.ground_units_by_colony, c, &id),
            GroundUnitSite::Transport(s) => {
                pull_index(&mut self.indices.ground_units_by_transport, s, &id)
            }
        }
        match site {
            GroundUnitSite::Colony(c) => push_index(&mut self.indices.ground_units_by_colony, c, id),
            GroundUnitSite::Transport(s) => {
                push_index(&mut self.indices.ground_units_by_transport, s, id)
            }
        }
        Ok(())
    }

    pub fn del_ground_unit(&mut self, id: GroundUnitId) -> Result<(), StateError> {
        let unit = self
            .ground_units
            .remove(id, |u| u.id)
            .ok_or(StateError::MissingEntity {
                kind: "GroundUnit",
                id: id.0,
            })?;
        match unit.site {
            GroundUnitSite::Colony(c) => pull_index(&mut self.indices.ground_units_by_colony, c, &id),
            GroundUnitSite::Transport(s) => {
                pull_index(&mut self.indices.ground_units_by_transport, s, &id)
            }
        }
        Ok(())
    }

    pub fn ground_units_at(&self, colony: ColonyId) -> Vec<GroundUnitId> {
        self.indices
            .ground_units_by_colony
            .get(&colony)
            .cloned()
            .unwrap_or_default()
    }

    pub fn ground_units_aboard(&self, ship: ShipId) -> Vec<GroundUnitId> {
        self.indices
            .ground_units_by_transport
            .get(&ship)
            .cloned()
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------

    pub fn add_construction_project(
        &mut self,
        colony: ColonyId,
        facility: Option<NeoriaId>,
        target: BuildTarget,
        cost_total: i64,
        turns: u32,
    ) -> ConstructionProjectId {
        let id = self.construction_mint.mint();
        self.construction_projects.insert(
            id,
            ConstructionProject {
                id,
                colony,
                facility,
                target,
                cost_total,
                cost_paid: cost_total,
                turns_remaining: turns,
            },
        );
        push_index(&mut self.indices.projects_by_colony, colony, id);
        if let Some(f) = facility {
            push_index(&mut self.indices.projects_by_facility, f, id);
        }
        if let Some(c) = self.colonies.get_mut(colony) {
            c.construction_queue.push(id);
        }
        id
    }

    pub fn construction_project(&self, id: ConstructionProjectId) -> Option<&ConstructionProject> {
        self.construction_projects.get(id)
    }

    pub fn construction_project_mut(
        &mut self,
        id: ConstructionProjectId,
    ) -> Option<&mut ConstructionProject> {
        self.construction_projects.get_mut(id)
    }

    pub fn del_construction_project(&mut self, id: ConstructionProjectId) -> Result<(), StateError> {
        let project = self
            .construction_projects
            .remove(id, |p| p.id)
            .ok_or(StateError::MissingEntity {
                kind: "ConstructionProject",
                id: id.0,
            })?;
        pull_index(&mut self.indices.projects_by_colony, project.colony, &id);
        if let Some(f) = project.facility {
            pull_index(&mut self.indices.projects_by_facility, f, &id);
        }
        if let Some(c) = self.colonies.get_mut(project.colony) {
            c.construction_queue.retain(|&p| p != id);
        }
        Ok(())
    }

    pub fn projects_at(&self, colony: ColonyId) -> Vec<ConstructionProjectId> {
        self.indices
            .projects_by_colony
            .get(&colony)
            .cloned()
            .unwrap_or_default()
    }

    pub fn projects_on_dock(&self, facility: NeoriaId) -> Vec<ConstructionProjectId> {
        self.indices
            .projects_by_facility
            .get(&facility)
            .cloned()
            .unwrap_or_default()
    }

    pub fn add_repair_project(
        &mut self,
        colony: ColonyId,
        facility: NeoriaId,
        subject: RepairSubject,
        cost_total: i64,
        turns: u32,
    ) -> RepairProjectId {
        let id = self.repair_mint.mint();
        self.repair_projects.insert(
            id,
            RepairProject {
                id,
                colony,
                facility,
                subject,
                cost_total,
                turns_remaining: turns,
            },
        );
        if let Some(c) = self.colonies.get_mut(colony) {
            c.repair_queue.push(id);
        }
        id
    }

    pub fn repair_project(&self, id: RepairProjectId) -> Option<&RepairProject> {
        self.repair_projects.get(id)
    }

    pub fn del_repair_project(&mut self, id: RepairProjectId) -> Result<(), StateError> {
        let project = self
            .repair_projects
            .remove(id, |p| p.id)
            .ok_or(StateError::MissingEntity {
                kind: "RepairProject",
                id: id.0,
            })?;
        if let Some(c) = self.colonies.get_mut(project.colony) {
            c.repair_queue.retain(|&p| p != id);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Population transfers
    // ------------------------------------------------------------------

    pub fn add_transfer(
        &mut self,
        house: HouseId,
        from: ColonyId,
        to: ColonyId,
        units: i64,
        turns: u32,
    ) -> PopulationTransferId {
        let id = self.transfer_mint.mint();
        self.transfers.insert(
            id,
            PopulationTransfer {
                id,
                house,
                from,
                to,
                units,
                turns_remaining: turns,
            },
        );
        id
    }

    pub fn transfers_of(&self, house: HouseId) -> Vec<PopulationTransferId> {
        let mut out: Vec<_> = self
            .transfers
            .iter()
            .filter(|t| t.house == house)
            .map(|t| t.id)
            .collect();
        out.sort();
        out
    }

    pub fn del_transfer(&mut self, id: PopulationTransferId) -> Result<(), StateError> {
        self.transfers
            .remove(id, |t| t.id)
            .map(|_| ())
            .ok_or(StateError::MissingEntity {
                kind: "PopulationTransfer",
                id: id.0,
            })
    }

    // ------------------------------------------------------------------
    // Index rebuild and validation
    // ------------------------------------------------------------------

    /// Rebuild every slot map and secondary index from the forward
    /// collections. Called after deserialization.
    pub fn rebuild_indices(&mut self) {
        self.houses.rebuild_slots(|h| h.id);
        self.colonies.rebuild_slots(|c| c.id);
        self.neorias.rebuild_slots(|n| n.id);
        self.kastras.rebuild_slots(|k| k.id);
        self.fleets.rebuild_slots(|f| f.id);
        self.squadrons.rebuild_slots(|s| s.id);
        self.ships.rebuild_slots(|s| s.id);
        self.ground_units.rebuild_slots(|g| g.id);
        self.construction_projects.rebuild_slots(|p| p.id);
        self.repair_projects.rebuild_slots(|p| p.id);
        self.transfers.rebuild_slots(|t| t.id);
        self.map.rebuild_index();

        let mut indices = Indices::default();
        for colony in self.colonies.iter() {
            push_index(&mut indices.colonies_by_owner, colony.owner, colony.id);
            indices.colony_by_system.insert(colony.system, colony.id);
        }
        for fleet in self.fleets.iter() {
            push_index(&mut indices.fleets_by_location, fleet.location, fleet.id);
        }
        for squadron in self.squadrons.iter() {
            push_index(&mut indices.squadrons_by_fleet, squadron.fleet, squadron.id);
            push_index(&mut indices.squadrons_by_house, squadron.owner, squadron.id);
            for ship in squadron
                .all_ships()
                .chain(squadron.embarked_fighters.iter().copied())
            {
                push_index(&mut indices.ships_by_squadron, squadron.id, ship);
            }
        }
        for neoria in self.neorias.iter() {
            push_index(&mut indices.neorias_by_colony, neoria.colony, neoria.id);
        }
        for kastra in self.kastras.iter() {
            push_index(&mut indices.kastras_by_colony, kastra.colony, kastra.id);
        }
        for unit in self.ground_units.iter() {
            match unit.site {
                GroundUnitSite::Colony(c) => {
                    push_index(&mut indices.ground_units_by_colony, c, unit.id)
                }
                GroundUnitSite::Transport(s) => {
                    push_index(&mut indices.ground_units_by_transport, s, unit.id)
                }
            }
        }
        for project in self.construction_projects.iter() {
            push_index(&mut indices.projects_by_colony, project.colony, project.id);
            if let Some(f) = project.facility {
                push_index(&mut indices.projects_by_facility, f, project.id);
            }
        }
        self.indices = indices;
    }

    /// Full invariant sweep. Run after phases in debug and at turn
    /// boundaries in release; any error is fatal to the turn.
    pub fn validate_invariants(&self, config: &GameConfig) -> Result<(), StateError> {
        // Secondary indices point at live records, and vice versa
        for (&owner, colonies) in &self.indices.colonies_by_owner {
            for &id in colonies {
                let colony = self.colonies.get(id).ok_or_else(|| StateError::IndexDrift {
                    detail: format!("colonies_by_owner[{owner}] holds dead {id}"),
                })?;
                if colony.owner != owner {
                    return Err(StateError::IndexDrift {
                        detail: format!("{id} owner {} but indexed under {owner}", colony.owner),
                    });
                }
            }
        }
        for colony in self.colonies.iter() {
            let listed = self
                .indices
                .colonies_by_owner
                .get(&colony.owner)
                .is_some_and(|v| v.contains(&colony.id));
            if !listed {
                return Err(StateError::IndexDrift {
                    detail: format!("{} missing from colonies_by_owner", colony.id),
                });
            }
            match self.indices.colony_by_system.get(&colony.system) {
                Some(&id) if id == colony.id => {}
                other => {
                    return Err(StateError::IndexDrift {
                        detail: format!(
                            "colony_by_system[{}] = {:?}, expected {}",
                            colony.system, other, colony.id
                        ),
                    });
                }
            }
            if !self.map.contains(colony.system) {
                return Err(StateError::IndexDrift {
                    detail: format!("{} sited at unknown {}", colony.id, colony.system),
                });
            }
            // Owners must be live, non-eliminated houses
            match self.houses.get(colony.owner) {
                Some(house) if house.status != HouseStatus::Eliminated => {}
                _ => {
                    return Err(StateError::InvalidTransition {
                        detail: format!("{} owned by dead house {}", colony.id, colony.owner),
                    });
                }
            }
        }

        for fleet in self.fleets.iter() {
            if !self.map.contains(fleet.location) {
                return Err(StateError::IndexDrift {
                    detail: format!("{} at unknown {}", fleet.id, fleet.location),
                });
            }
            let listed = self
                .indices
                .fleets_by_location
                .get(&fleet.location)
                .is_some_and(|v| v.contains(&fleet.id));
            if !listed {
                return Err(StateError::IndexDrift {
                    detail: format!("{} missing from fleets_by_location", fleet.id),
                });
            }
        }

        for squadron in self.squadrons.iter() {
            if !self.fleets.contains(squadron.fleet) {
                return Err(StateError::IndexDrift {
                    detail: format!("{} in dead fleet {}", squadron.id, squadron.fleet),
                });
            }
            // Command rating bound: Σ member CC ≤ flagship CR
            let flagship = self.ships.get(squadron.flagship).ok_or_else(|| {
                StateError::IndexDrift {
                    detail: format!("{} flagship missing", squadron.id),
                }
            })?;
            let rating = config.ships.get(flagship.class).command_rating;
            let mut cost = 0;
            for ship_id in squadron.all_ships() {
                let ship = self.ships.get(ship_id).ok_or_else(|| StateError::IndexDrift {
                    detail: format!("{} member {} missing", squadron.id, ship_id),
                })?;
                if ship.squadron != squadron.id {
                    return Err(StateError::IndexDrift {
                        detail: format!("{ship_id} squadron back-reference broken"),
                    });
                }
                cost += config.ships.get(ship.class).command_cost;
            }
            if cost > rating {
                return Err(StateError::InvalidTransition {
                    detail: format!(
                        "{} command cost {cost} exceeds flagship rating {rating}",
                        squadron.id
                    ),
                });
            }
        }

        for ship in self.ships.iter() {
            if !ship.squadron.is_null() && !self.squadrons.contains(ship.squadron) {
                return Err(StateError::IndexDrift {
                    detail: format!("{} points at dead {}", ship.id, ship.squadron),
                });
            }
        }

        Ok(())
    }

    /// Order-independent content hash of the snapshot (FNV-1a over the
    /// msgpack encoding). Used by determinism tests and the batch runner's
    /// divergence check.
    pub fn state_hash(&self) -> u64 {
        let bytes = rmp_serde::to_vec(self).unwrap_or_default();
        const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const FNV_PRIME: u64 = 0x1000_0000_01b3;
        let mut hash = FNV_OFFSET;
        for b in bytes {
            hash ^= b as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::GameStateBuilder;

    #[test]
    fn arena_swap_remove_patches_slots() {
        let mut arena: Arena<ShipId, Ship> = Arena::default();
        arena.insert(ShipId(1), Ship::new(ShipId(1), HouseId(1), ShipClass::Corvette));
        arena.insert(ShipId(2), Ship::new(ShipId(2), HouseId(1), ShipClass::Frigate));
        arena.insert(ShipId(3), Ship::new(ShipId(3), HouseId(1), ShipClass::Scout));

        arena.remove(ShipId(1), |s| s.id);
        // ShipId(3) was swapped into slot 0 and must still resolve
        assert_eq!(arena.get(ShipId(3)).unwrap().class, ShipClass::Scout);
        assert_eq!(arena.get(ShipId(2)).unwrap().class, ShipClass::Frigate);
        assert!(arena.get(ShipId(1)).is_none());
        assert_eq!(arena.ids_sorted(), vec![ShipId(2), ShipId(3)]);
    }

    #[test]
    fn colony_indices_track_add_transfer_delete() {
        let mut builder = GameStateBuilder::new()
            .with_house("Atreides")
            .with_house("Harkonnen")
            .with_line_map(4);
        let colony = builder.add_colony(HouseId(1), SystemId(2), 100);
        let mut state = builder.build();

        assert_eq!(state.colonies_owned(HouseId(1)), vec![colony]);
        assert_eq!(state.colony_at(SystemId(2)), Some(colony));

        state.transfer_colony(colony, HouseId(2)).unwrap();
        assert!(state.colonies_owned(HouseId(1)).is_empty());
        assert_eq!(state.colonies_owned(HouseId(2)), vec![colony]);

        state.del_colony(colony).unwrap();
        assert!(state.colonies_owned(HouseId(2)).is_empty());
        assert_eq!(state.colony_at(SystemId(2)), None);
    }

    #[test]
    fn squadron_lifecycle_keeps_ship_indices() {
        let mut builder = GameStateBuilder::new().with_house("Atreides").with_line_map(2);
        let fleet = builder.add_fleet(HouseId(1), SystemId(1));
        let squadron = builder.add_squadron(fleet, ShipClass::Destroyer, &[ShipClass::Corvette]);
        let state_fleet = fleet;
        let mut state = builder.build();

        let ships = state.ships_of(squadron);
        assert_eq!(ships.len(), 2);
        for &ship in &ships {
            assert_eq!(state.ship(ship).unwrap().squadron, squadron);
        }

        state.del_squadron(squadron).unwrap();
        assert!(state.ships_of(squadron).is_empty());
        for ship in ships {
            assert!(state.ship(ship).is_none());
        }
        assert!(state.squadrons_of(state_fleet).is_empty());
        // Now the fleet is empty and can be deleted
        state.del_fleet(state_fleet).unwrap();
    }

    #[test]
    fn del_fleet_with_squadrons_is_refused() {
        let mut builder = GameStateBuilder::new().with_house("Atreides").with_line_map(2);
        let fleet = builder.add_fleet(HouseId(1), SystemId(1));
        builder.add_squadron(fleet, ShipClass::Destroyer, &[]);
        let mut state = builder.build();

        assert!(matches!(
            state.del_fleet(fleet),
            Err(StateError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn invariants_pass_on_builder_state() {
        let mut builder = GameStateBuilder::new()
            .with_house("Atreides")
            .with_line_map(3);
        builder.add_colony(HouseId(1), SystemId(1), 50);
        let fleet = builder.add_fleet(HouseId(1), SystemId(1));
        builder.add_squadron(fleet, ShipClass::LightCruiser, &[ShipClass::Corvette]);
        let state = builder.build();

        state.validate_invariants(&GameConfig::default()).unwrap();
    }

    #[test]
    fn overloaded_squadron_fails_invariants() {
        let mut builder = GameStateBuilder::new().with_house("Atreides").with_line_map(2);
        let fleet = builder.add_fleet(HouseId(1), SystemId(1));
        // Corvette flagship (rating 2) cannot command three destroyers (CC 2 each)
        builder.add_squadron(
            fleet,
            ShipClass::Corvette,
            &[ShipClass::Destroyer, ShipClass::Destroyer, ShipClass::Destroyer],
        );
        let state = builder.build();

        assert!(matches!(
            state.validate_invariants(&GameConfig::default()),
            Err(StateError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn rng_is_reproducible_per_turn_seed() {
        let mut a = GameState::new(StarMap::default(), 2001);
        let mut b = GameState::new(StarMap::default(), 2001);
        a.seed_rng(5);
        b.seed_rng(5);
        let rolls_a: Vec<i32> = (0..32).map(|_| a.roll_2d6()).collect();
        let rolls_b: Vec<i32> = (0..32).map(|_| b.roll_2d6()).collect();
        assert_eq!(rolls_a, rolls_b);

        b.seed_rng(6);
        let rolls_c: Vec<i32> = (0..32).map(|_| b.roll_2d6()).collect();
        assert_ne!(rolls_a, rolls_c);
    }

    #[test]
    fn rebuild_indices_matches_incremental() {
        let mut builder = GameStateBuilder::new()
            .with_house("Atreides")
            .with_house("Harkonnen")
            .with_line_map(5);
        builder.add_colony(HouseId(1), SystemId(1), 100);
        builder.add_colony(HouseId(2), SystemId(4), 80);
        let fleet = builder.add_fleet(HouseId(1), SystemId(2));
        builder.add_squadron(fleet, ShipClass::Destroyer, &[ShipClass::Corvette]);
        let mut state = builder.build();

        let owned_before = state.colonies_owned(HouseId(1));
        let at_before = state.fleets_at(SystemId(2));
        state.rebuild_indices();
        assert_eq!(state.colonies_owned(HouseId(1)), owned_before);
        assert_eq!(state.fleets_at(SystemId(2)), at_before);
        state.validate_invariants(&GameConfig::default()).unwrap();
    }
}
