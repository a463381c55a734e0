// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Fixed-scale decimal amounts.
//!
//! Every money and quantity value in the core is an [`Amount`]: a
//! [`Decimal`] pinned to four fractional digits. Products and quotients are
//! evaluated on the raw [`Decimal`] at [`Amount::INTERNAL_SCALE`] and rounded
//! once when they become an [`Amount`] again. Binary floating point never
//! enters the picture.
//!
//! # Example
//!
//! ```
//! use erp_ledger::{Amount, Rounding};
//!
//! let price: Amount = "10.00".parse().unwrap();
//! let qty: Amount = "3".parse().unwrap();
//! assert_eq!(price.checked_mul(qty).unwrap().to_string(), "30.0000");
//!
//! let third = Amount::from(1).checked_div(qty, Rounding::HalfEven).unwrap();
//! assert_eq!(third.to_string(), "0.3333");
//! ```

use crate::error::{LedgerError, LedgerResult};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

/// Rounding applied when a value is brought back to a target scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rounding {
    /// Banker's rounding (round half to even).
    #[default]
    HalfEven,
    /// Round half away from zero.
    HalfUp,
    /// Truncate toward zero.
    Down,
}

impl From<Rounding> for RoundingStrategy {
    fn from(rounding: Rounding) -> Self {
        match rounding {
            Rounding::HalfEven => RoundingStrategy::MidpointNearestEven,
            Rounding::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            Rounding::Down => RoundingStrategy::ToZero,
        }
    }
}

/// Exact decimal with a fixed scale of four.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    /// Stored scale for money and quantities.
    pub const SCALE: u32 = 4;

    /// Scale used for intermediate products and quotients.
    pub const INTERNAL_SCALE: u32 = 8;

    pub const ZERO: Amount = Amount(Decimal::from_parts(0, 0, 0, false, Self::SCALE));

    /// Brings `value` to the stored scale with banker's rounding.
    pub fn new(value: Decimal) -> Self {
        Self::with_rounding(value, Rounding::HalfEven)
    }

    pub fn with_rounding(value: Decimal, rounding: Rounding) -> Self {
        let mut rounded = value.round_dp_with_strategy(Self::SCALE, rounding.into());
        rounded.rescale(Self::SCALE);
        Self(rounded)
    }

    /// Like [`new`](Self::new), but fails when the value is too large to
    /// carry four fractional digits.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Overflow`] past roughly 7.9e24.
    pub fn try_new(value: Decimal) -> LedgerResult<Self> {
        let amount = Self::new(value);
        if amount.0.scale() == Self::SCALE {
            Ok(amount)
        } else {
            Err(LedgerError::Overflow)
        }
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Strictly greater than zero.
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Three-way sign: -1, 0 or 1.
    pub fn signum(&self) -> i8 {
        match self.0.cmp(&Decimal::ZERO) {
            Ordering::Less => -1,
            Ordering::Equal => 0,
            Ordering::Greater => 1,
        }
    }

    pub fn compare(&self, other: &Amount) -> Ordering {
        self.0.cmp(&other.0)
    }

    /// # Errors
    ///
    /// [`LedgerError::Overflow`] if the sum leaves the representable range.
    pub fn checked_add(self, rhs: Amount) -> LedgerResult<Amount> {
        Self::try_new(self.0.checked_add(rhs.0).ok_or(LedgerError::Overflow)?)
    }

    /// # Errors
    ///
    /// [`LedgerError::Overflow`] if the difference leaves the representable
    /// range.
    pub fn checked_sub(self, rhs: Amount) -> LedgerResult<Amount> {
        Self::try_new(self.0.checked_sub(rhs.0).ok_or(LedgerError::Overflow)?)
    }

    /// Sums `amounts`, failing instead of panicking on overflow.
    pub fn checked_sum<I>(amounts: I) -> LedgerResult<Amount>
    where
        I: IntoIterator<Item = Amount>,
    {
        amounts
            .into_iter()
            .try_fold(Amount::ZERO, |total, amount| total.checked_add(amount))
    }

    /// Multiplies with banker's rounding back to the stored scale.
    pub fn checked_mul(self, rhs: Amount) -> LedgerResult<Amount> {
        self.checked_mul_with(rhs, Rounding::HalfEven)
    }

    pub fn checked_mul_with(self, rhs: Amount, rounding: Rounding) -> LedgerResult<Amount> {
        let product = self.0.checked_mul(rhs.0).ok_or(LedgerError::Overflow)?;
        let amount = Self::with_rounding(product, rounding);
        if amount.0.scale() != Self::SCALE {
            return Err(LedgerError::Overflow);
        }
        Ok(amount)
    }

    /// Divides and rounds to the stored scale.
    ///
    /// # Errors
    ///
    /// [`LedgerError::DivisionByZero`] when `rhs` is zero.
    pub fn checked_div(self, rhs: Amount, rounding: Rounding) -> LedgerResult<Amount> {
        let quotient = div_internal(self.0, rhs.0)?;
        Ok(Self::with_rounding(quotient, rounding))
    }
}

/// Divides two raw decimals at [`Amount::INTERNAL_SCALE`].
///
/// # Errors
///
/// [`LedgerError::DivisionByZero`] when `den` is zero.
pub fn div_internal(num: Decimal, den: Decimal) -> LedgerResult<Decimal> {
    if den.is_zero() {
        return Err(LedgerError::DivisionByZero);
    }
    let quotient = num.checked_div(den).ok_or(LedgerError::Overflow)?;
    Ok(quotient.round_dp_with_strategy(Amount::INTERNAL_SCALE, RoundingStrategy::MidpointNearestEven))
}

/// Multiplies two raw decimals at [`Amount::INTERNAL_SCALE`].
pub fn mul_internal(lhs: Decimal, rhs: Decimal) -> LedgerResult<Decimal> {
    let product = lhs.checked_mul(rhs).ok_or(LedgerError::Overflow)?;
    Ok(product.round_dp_with_strategy(Amount::INTERNAL_SCALE, RoundingStrategy::MidpointNearestEven))
}

impl Default for Amount {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Self::new(Decimal::from(value))
    }
}

impl FromStr for Amount {
    type Err = LedgerError;

    /// Parses an exact decimal string; extra fractional digits are rounded
    /// half-to-even. Values too large for four places are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Decimal::from_str_exact(trimmed)
            .ok()
            .and_then(|value| Self::try_new(value).ok())
            .ok_or_else(|| LedgerError::InvalidDecimal(trimmed.to_string()))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unchecked; panics past the `Decimal` range. Ledger writes go through
/// [`Amount::checked_add`].
impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        self.0 += rhs.0;
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

impl SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Amount) {
        self.0 -= rhs.0;
    }
}

impl Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        Amount(-self.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, x| acc + x)
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, x| acc + *x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn values_are_pinned_to_four_places() {
        assert_eq!(Amount::from(1000).to_string(), "1000.0000");
        assert_eq!(Amount::ZERO.to_string(), "0.0000");
        assert_eq!(Amount::new(dec!(1.5)).to_string(), "1.5000");
    }

    #[test]
    fn new_uses_bankers_rounding() {
        assert_eq!(Amount::new(dec!(0.00015)).to_string(), "0.0002");
        assert_eq!(Amount::new(dec!(0.00005)).to_string(), "0.0000");
        assert_eq!(Amount::new(dec!(123.456789)).to_string(), "123.4568");
    }

    #[test]
    fn explicit_rounding_modes() {
        assert_eq!(
            Amount::with_rounding(dec!(2.00005), Rounding::HalfUp).to_string(),
            "2.0001"
        );
        assert_eq!(
            Amount::with_rounding(dec!(2.00009), Rounding::Down).to_string(),
            "2.0000"
        );
    }

    #[test]
    fn add_and_subtract_are_exact() {
        let a: Amount = "0.1".parse().unwrap();
        let b: Amount = "0.2".parse().unwrap();
        assert_eq!(a + b, "0.3".parse().unwrap());
        assert_eq!((a - b).to_string(), "-0.1000");
    }

    #[test]
    fn divide_by_zero_is_an_error() {
        let result = Amount::from(10).checked_div(Amount::ZERO, Rounding::HalfEven);
        assert_eq!(result, Err(LedgerError::DivisionByZero));
        assert_eq!(div_internal(dec!(1), dec!(0)), Err(LedgerError::DivisionByZero));
    }

    #[test]
    fn internal_division_keeps_eight_places() {
        assert_eq!(div_internal(dec!(1), dec!(3)).unwrap(), dec!(0.33333333));
    }

    #[test]
    fn sign_and_compare() {
        assert_eq!(Amount::from(-3).signum(), -1);
        assert_eq!(Amount::ZERO.signum(), 0);
        assert_eq!(Amount::from(3).signum(), 1);
        assert!(!Amount::ZERO.is_positive());
        assert_eq!(
            Amount::from(2).compare(&Amount::from(3)),
            Ordering::Less
        );
        // Scale does not affect equality.
        assert_eq!(Amount::from(1), Amount::new(dec!(1.0)));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(
            "12,5".parse::<Amount>(),
            Err(LedgerError::InvalidDecimal("12,5".to_string()))
        );
        assert!("".parse::<Amount>().is_err());
    }

    #[test]
    fn checked_arithmetic_reports_overflow() {
        let big: Amount = "5000000000000000000000000".parse().unwrap();
        assert_eq!(big.checked_add(big), Err(LedgerError::Overflow));
        assert_eq!((-big).checked_sub(big), Err(LedgerError::Overflow));
        assert_eq!(
            Amount::checked_sum([big, Amount::from(1), big]),
            Err(LedgerError::Overflow)
        );

        let near_max = Amount::new(Decimal::MAX);
        assert_eq!(near_max.checked_add(near_max), Err(LedgerError::Overflow));
        assert_eq!(big.checked_mul(big), Err(LedgerError::Overflow));

        assert_eq!(big.checked_sub(big), Ok(Amount::ZERO));
        assert_eq!(
            Amount::checked_sum([Amount::from(2), Amount::from(3)]),
            Ok(Amount::from(5))
        );
    }

    #[test]
    fn parse_rejects_values_without_room_for_four_places() {
        let raw = "50000000000000000000000000000";
        assert_eq!(
            raw.parse::<Amount>(),
            Err(LedgerError::InvalidDecimal(raw.to_string()))
        );
        assert_eq!(Amount::try_new(Decimal::MAX), Err(LedgerError::Overflow));
        assert_eq!(Amount::try_new(dec!(12.5)), Ok(Amount::new(dec!(12.5))));
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&Amount::from(1000)).unwrap();
        assert_eq!(json, "\"1000.0000\"");
        let back: Amount = serde_json::from_str("\"12.34567\"").unwrap();
        assert_eq!(back.to_string(), "12.3457");
    }

    #[test]
    fn sums() {
        let values = [Amount::from(1), Amount::from(2), Amount::from(3)];
        let total: Amount = values.iter().sum();
        assert_eq!(total, Amount::from(6));
        assert_eq!(total.to_string(), "6.0000");
    }
}
