//! Fixed-point money type.
//!
//! All monetary amounts (proforma totals, payments, derived ledger fields)
//! use a 1e-6 (micros) fixed-point representation stored as `i64`.
//!
//! `Micros` wraps the raw `i64` so the type system keeps money apart from
//! quantities, sequence numbers and versions:
//! - No `From<i64>` impl; construction is explicit via [`Micros::new`].
//! - Arithmetic is closed over `Micros`.
//!
//! 1 currency unit = `Micros(1_000_000)`.

use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// Scale factor: 1 currency unit = 1_000_000 micros.
pub const MICROS_PER_UNIT: i64 = 1_000_000;

/// A fixed-point monetary amount at 1e-6 scale.
///
/// Serialized as the raw integer so persisted JSON never carries floats.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Micros(i64);

impl Micros {
    pub const ZERO: Micros = Micros(0);

    #[inline]
    pub const fn new(raw: i64) -> Self {
        Micros(raw)
    }

    /// Whole currency units, e.g. `Micros::from_units(1500)` == 1500.00.
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Micros(units * MICROS_PER_UNIT)
    }

    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    #[inline]
    pub fn checked_add(self, rhs: Micros) -> Option<Micros> {
        self.0.checked_add(rhs.0).map(Micros)
    }

    #[inline]
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl Add for Micros {
    type Output = Micros;
    #[inline]
    fn add(self, rhs: Micros) -> Micros {
        Micros(self.0 + rhs.0)
    }
}

impl Sub for Micros {
    type Output = Micros;
    #[inline]
    fn sub(self, rhs: Micros) -> Micros {
        Micros(self.0 - rhs.0)
    }
}

impl Neg for Micros {
    type Output = Micros;
    #[inline]
    fn neg(self) -> Micros {
        Micros(-self.0)
    }
}

impl AddAssign for Micros {
    #[inline]
    fn add_assign(&mut self, rhs: Micros) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Micros {
    #[inline]
    fn sub_assign(&mut self, rhs: Micros) {
        self.0 -= rhs.0;
    }
}

impl<'a> Sum<&'a Micros> for Micros {
    fn sum<I: Iterator<Item = &'a Micros>>(iter: I) -> Micros {
        iter.fold(Micros::ZERO, |acc, m| acc + *m)
    }
}

impl Sum for Micros {
    fn sum<I: Iterator<Item = Micros>>(iter: I) -> Micros {
        iter.fold(Micros::ZERO, |acc, m| acc + m)
    }
}

/// Renders with two decimals (cents), truncating sub-cent micros.
impl std::fmt::Display for Micros {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let units = self.0 / MICROS_PER_UNIT;
        let cents = ((self.0 % MICROS_PER_UNIT) / 10_000).abs();
        // -0.50 truncates `units` to 0 and would lose the sign.
        if self.0 < 0 && units == 0 {
            write!(f, "-0.{cents:02}")
        } else {
            write!(f, "{units}.{cents:02}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_keeps_sign_below_one_unit() {
        assert_eq!(Micros::new(-500_000).to_string(), "-0.50");
        assert_eq!(Micros::from_units(1500).to_string(), "1500.00");
        assert_eq!(Micros::new(1_234_560_000).to_string(), "1234.56");
    }

    #[test]
    fn sum_over_refs() {
        let v = [Micros::from_units(1), Micros::from_units(2)];
        let total: Micros = v.iter().sum();
        assert_eq!(total, Micros::from_units(3));
    }

    #[test]
    fn serializes_as_raw_integer() {
        let s = serde_json::to_string(&Micros::from_units(2)).unwrap();
        assert_eq!(s, "2000000");
    }
}
