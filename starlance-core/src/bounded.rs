//! Clamped integer values for discrete policy settings.

use crate::fixed::Fixed;
use serde::{Deserialize, Serialize};

/// A value clamped to an integer range.
/// Used for: rules of engagement (0 to 10), colony tax rate (0 to 100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundedInt {
    value: i32,
    min: i32,
    max: i32,
}

impl BoundedInt {
    pub const fn new(value: i32, min: i32, max: i32) -> Self {
        let value = if value < min {
            min
        } else if value > max {
            max
        } else {
            value
        };
        Self { value, min, max }
    }

    pub fn get(&self) -> i32 {
        self.value
    }

    pub fn min(&self) -> i32 {
        self.min
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    pub fn add(&mut self, delta: i32) {
        self.value = (self.value + delta).clamp(self.min, self.max);
    }

    pub fn set(&mut self, value: i32) {
        self.value = value.clamp(self.min, self.max);
    }

    /// Ratio from 0.0 to 1.0 as Fixed.
    /// Returns 0 if max == min.
    pub fn ratio(&self) -> Fixed {
        let range = self.max - self.min;
        if range == 0 {
            return Fixed::ZERO;
        }
        Fixed::from_int((self.value - self.min) as i64) / Fixed::from_int(range as i64)
    }
}

/// Rules of engagement: 0 = never engage, 10 = fight to the last hull.
pub type RulesOfEngagement = BoundedInt;

pub const fn new_roe(value: i32) -> RulesOfEngagement {
    BoundedInt::new(value, 0, 10)
}

/// Colony tax rate as a whole-number percentage.
pub const fn new_tax_rate(value: i32) -> BoundedInt {
    BoundedInt::new(value, 0, 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_int_clamps() {
        let mut b = new_roe(5);

        b.add(3);
        assert_eq!(b.get(), 8);

        b.add(10);
        assert_eq!(b.get(), 10);

        b.add(-20);
        assert_eq!(b.get(), 0);
    }

    #[test]
    fn test_constructor_clamps() {
        assert_eq!(new_roe(99).get(), 10);
        assert_eq!(new_tax_rate(-5).get(), 0);
    }

    #[test]
    fn test_ratio_calculation() {
        let b = new_roe(5);
        assert_eq!(b.ratio(), Fixed::HALF);

        let t = new_tax_rate(25);
        assert_eq!(t.ratio(), Fixed::from_f32(0.25));
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_updates_stay_within_bounds(
            initial in -100..100i32,
            updates in proptest::collection::vec(-100..100i32, 1..20)
        ) {
            let mut b = new_roe(initial);
            for update in updates {
                b.add(update);
                assert!(b.get() >= b.min());
                assert!(b.get() <= b.max());
            }
        }
    }
}
