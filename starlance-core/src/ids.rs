//! Typed entity identifiers.
//!
//! Every domain entity carries a dense, monotonically-increasing 32-bit ID
//! minted from a per-type counter inside `GameState`. `0` is the reserved
//! null sentinel; IDs are never reused within a game. The newtypes keep a
//! `FleetId` from ever being handed to a colony lookup.

use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize,
            Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Reserved null sentinel. Never refers to a live entity.
            pub const NULL: $name = $name(0);

            #[inline]
            pub const fn is_null(self) -> bool {
                self.0 == 0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!(stringify!($name), "#{}"), self.0)
            }
        }

        impl From<$name> for u32 {
            fn from(id: $name) -> u32 {
                id.0
            }
        }
    };
}

entity_id!(HouseId);
entity_id!(SystemId);
entity_id!(ColonyId);
entity_id!(
    /// Production facility: Spaceport, Shipyard or Drydock.
    NeoriaId
);
entity_id!(
    /// Defensive facility: Starbase.
    KastraId
);
entity_id!(FleetId);
entity_id!(SquadronId);
entity_id!(ShipId);
entity_id!(GroundUnitId);
entity_id!(ConstructionProjectId);
entity_id!(RepairProjectId);
entity_id!(PopulationTransferId);

/// Monotonic ID mint for one entity type.
///
/// Starts at 1 so `0` stays the null sentinel. Serialized with the state so
/// a reloaded game never re-mints an old ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdMint<T> {
    next: u32,
    #[serde(skip)]
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for IdMint<T> {
    fn default() -> Self {
        Self {
            next: 1,
            _marker: PhantomData,
        }
    }
}

impl<T: From<u32>> IdMint<T> {
    pub fn mint(&mut self) -> T {
        let id = self.next;
        self.next += 1;
        T::from(id)
    }

    /// Highest ID minted so far (0 if none).
    pub fn high_water(&self) -> u32 {
        self.next - 1
    }
}

macro_rules! id_from_u32 {
    ($($name:ident),*) => {
        $(
            impl From<u32> for $name {
                fn from(raw: u32) -> $name {
                    $name(raw)
                }
            }
        )*
    };
}

id_from_u32!(
    HouseId,
    SystemId,
    ColonyId,
    NeoriaId,
    KastraId,
    FleetId,
    SquadronId,
    ShipId,
    GroundUnitId,
    ConstructionProjectId,
    RepairProjectId,
    PopulationTransferId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_starts_past_null() {
        let mut mint: IdMint<FleetId> = IdMint::default();
        let first = mint.mint();
        assert_eq!(first, FleetId(1));
        assert!(!first.is_null());
    }

    #[test]
    fn mint_is_monotonic() {
        let mut mint: IdMint<ShipId> = IdMint::default();
        let a = mint.mint();
        let b = mint.mint();
        let c = mint.mint();
        assert!(a < b && b < c);
        assert_eq!(mint.high_water(), 3);
    }

    #[test]
    fn null_sentinel() {
        assert!(HouseId::NULL.is_null());
        assert_eq!(format!("{}", ColonyId(7)), "ColonyId#7");
    }
}
