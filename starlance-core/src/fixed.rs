//! Fixed-point arithmetic for deterministic simulation.
//!
//! All simulation values use this type to ensure identical results across
//! platforms. Floats (f32/f64) are banned in resolution logic due to
//! x87/SSE/FMA differences; a turn must replay bit-identically from
//! `(state, packets, seed)` on any host.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

/// Fixed-point value with scale 10000.
///
/// Represents decimal values as integers: 0.25 → 2500, 1.0 → 10000.
/// All arithmetic stays in integer domain for determinism.
/// Uses i64 to prevent overflow with large aggregates (e.g. house-wide GCO).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Fixed(pub i64);

impl Fixed {
    /// Scale factor: 10000 = 1.0
    pub const SCALE: i64 = 10000;

    pub const ZERO: Fixed = Fixed(0);
    pub const ONE: Fixed = Fixed(10000);
    pub const HALF: Fixed = Fixed(5000);

    /// Create from raw scaled value
    #[inline]
    pub const fn from_raw(raw: i64) -> Self {
        Fixed(raw)
    }

    /// Create from integer (e.g., 5 → 50_000)
    #[inline]
    pub const fn from_int(v: i64) -> Self {
        Fixed(v * Self::SCALE)
    }

    /// Create from a whole-number percentage (e.g., 60 → 0.60).
    #[inline]
    pub const fn percent(v: i64) -> Self {
        Fixed(v * Self::SCALE / 100)
    }

    /// Convert from f32 (config-load layer only, not in resolution logic).
    ///
    /// Uses `.round()` for cross-platform determinism. Guards against NaN/Inf/overflow.
    #[inline]
    pub fn from_f32(v: f32) -> Self {
        if !v.is_finite() {
            return Fixed::ZERO;
        }

        let scaled = v * Self::SCALE as f32;

        // i64 max is ~9e18; clamp anything the f32 domain can push past it.
        if scaled > i64::MAX as f32 {
            return Fixed(i64::MAX);
        }
        if scaled < i64::MIN as f32 {
            return Fixed(i64::MIN);
        }

        Fixed(scaled.round() as i64)
    }

    /// Convert to f32 (display only, not in resolution logic)
    #[inline]
    pub fn to_f32(self) -> f32 {
        self.0 as f32 / Self::SCALE as f32
    }

    /// Convert to f64 (display only, higher precision)
    #[inline]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    /// Raw integer value
    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Truncate to integer (rounds toward zero)
    ///
    /// Safe for resolution logic (deterministic integer division).
    #[inline]
    pub const fn to_int(self) -> i64 {
        self.0 / Self::SCALE
    }

    /// Round half-up to the nearest integer.
    #[inline]
    pub const fn round_to_int(self) -> i64 {
        if self.0 >= 0 {
            (self.0 + Self::SCALE / 2) / Self::SCALE
        } else {
            (self.0 - Self::SCALE / 2) / Self::SCALE
        }
    }

    /// Returns the smaller of two Fixed values (deterministic)
    #[inline]
    pub fn min(self, other: Fixed) -> Fixed {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    /// Returns the larger of two Fixed values (deterministic)
    #[inline]
    pub fn max(self, other: Fixed) -> Fixed {
        if self.0 >= other.0 {
            self
        } else {
            other
        }
    }

    /// Clamp into `[lo, hi]`.
    #[inline]
    pub fn clamp(self, lo: Fixed, hi: Fixed) -> Fixed {
        self.max(lo).min(hi)
    }

    /// Absolute value (saturates at i64::MAX).
    #[inline]
    pub const fn abs(self) -> Fixed {
        Fixed(self.0.saturating_abs())
    }

    /// Saturating add (clamps at i64::MAX/MIN)
    #[inline]
    pub fn saturating_add(self, other: Fixed) -> Fixed {
        Fixed(self.0.saturating_add(other.0))
    }

    /// Saturating subtract
    #[inline]
    pub fn saturating_sub(self, other: Fixed) -> Fixed {
        Fixed(self.0.saturating_sub(other.0))
    }
}

impl Add for Fixed {
    type Output = Fixed;
    #[inline]
    fn add(self, other: Fixed) -> Fixed {
        Fixed(self.0 + other.0)
    }
}

impl AddAssign for Fixed {
    #[inline]
    fn add_assign(&mut self, other: Fixed) {
        self.0 += other.0;
    }
}

impl Sub for Fixed {
    type Output = Fixed;
    #[inline]
    fn sub(self, other: Fixed) -> Fixed {
        Fixed(self.0 - other.0)
    }
}

impl SubAssign for Fixed {
    #[inline]
    fn sub_assign(&mut self, other: Fixed) {
        self.0 -= other.0;
    }
}

impl Mul for Fixed {
    type Output = Fixed;
    #[inline]
    fn mul(self, other: Fixed) -> Fixed {
        Fixed((self.0 as i128 * other.0 as i128 / Fixed::SCALE as i128) as i64)
    }
}

impl MulAssign for Fixed {
    #[inline]
    fn mul_assign(&mut self, other: Fixed) {
        *self = *self * other;
    }
}

impl Div for Fixed {
    type Output = Fixed;
    #[inline]
    fn div(self, other: Fixed) -> Fixed {
        if other.0 == 0 {
            return Fixed::ZERO; // Safe default for division by zero
        }
        Fixed((self.0 as i128 * Fixed::SCALE as i128 / other.0 as i128) as i64)
    }
}

impl DivAssign for Fixed {
    #[inline]
    fn div_assign(&mut self, other: Fixed) {
        *self = *self / other;
    }
}

impl Neg for Fixed {
    type Output = Fixed;
    #[inline]
    fn neg(self) -> Fixed {
        Fixed(-self.0)
    }
}

impl std::fmt::Debug for Fixed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Fixed({} = {})", self.0, self.to_f32())
    }
}

impl std::fmt::Display for Fixed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}", self.to_f32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(Fixed::ZERO.0, 0);
        assert_eq!(Fixed::ONE.0, 10000);
        assert_eq!(Fixed::HALF.0, 5000);
        assert_eq!(Fixed::percent(60).0, 6000);
    }

    #[test]
    fn test_from_f32() {
        assert_eq!(Fixed::from_f32(0.25), Fixed(2500));
        assert_eq!(Fixed::from_f32(1.0), Fixed::ONE);
        assert_eq!(Fixed::from_f32(f32::NAN), Fixed::ZERO);
        assert_eq!(Fixed::from_f32(f32::INFINITY), Fixed::ZERO);
        assert_eq!(Fixed::from_f32(1e20), Fixed(i64::MAX));
    }

    #[test]
    fn test_multiply() {
        assert_eq!(Fixed::from_int(2) * Fixed::from_int(3), Fixed::from_int(6));
        assert_eq!(Fixed::HALF * Fixed::HALF, Fixed(2500));
    }

    #[test]
    fn test_divide() {
        assert_eq!(Fixed::from_int(6) / Fixed::from_int(2), Fixed::from_int(3));
        assert_eq!(Fixed::from_int(6) / Fixed::ZERO, Fixed::ZERO);
    }

    #[test]
    fn test_round_to_int() {
        assert_eq!(Fixed::from_f32(2.4).round_to_int(), 2);
        assert_eq!(Fixed::from_f32(2.5).round_to_int(), 3);
        assert_eq!(Fixed::from_f32(-2.5).round_to_int(), -3);
    }

    #[test]
    fn test_determinism() {
        let calc = || {
            let output = Fixed::from_int(500);
            let raw_index = Fixed::percent(120);
            let blockade = Fixed::percent(40);
            output * raw_index * blockade
        };
        assert_eq!(calc(), calc());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn game_value() -> impl Strategy<Value = i64> {
            -1_000_000..=1_000_000i64
        }

        proptest! {
            /// Multiplication never overflows (i128 intermediate).
            #[test]
            fn mul_never_panics(a in game_value(), b in game_value()) {
                let _ = Fixed::from_int(a) * Fixed::from_int(b);
            }

            #[test]
            fn mul_is_commutative(a in game_value(), b in game_value()) {
                let x = Fixed::from_int(a);
                let y = Fixed::from_int(b);
                prop_assert_eq!(x * y, y * x);
            }

            #[test]
            fn mul_one_is_identity(a in game_value()) {
                let x = Fixed::from_int(a);
                prop_assert_eq!(x * Fixed::ONE, x);
            }

            #[test]
            fn div_never_panics(a in game_value(), b in game_value()) {
                let _ = Fixed::from_int(a) / Fixed::from_int(b);
            }

            #[test]
            fn saturating_ops_never_panic(a in game_value(), b in game_value()) {
                let x = Fixed::from_int(a);
                let y = Fixed::from_int(b);
                let _ = x.saturating_add(y);
                let _ = x.saturating_sub(y);
            }
        }
    }
}
