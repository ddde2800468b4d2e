use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

//--------------------------------------     MoneyMinor       --------------------------------------------------------
/// A monetary amount in integer minor units (cents for USD and friends).
///
/// All ledger arithmetic happens in minor units so that amounts reported by the commerce platform can be compared
/// exactly, without floating point drift.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct MoneyMinor(i64);

op!(binary MoneyMinor, Add, add);
op!(binary MoneyMinor, Sub, sub);
op!(inplace MoneyMinor, SubAssign, sub_assign);
op!(unary MoneyMinor, Neg, neg);

impl Mul<i64> for MoneyMinor {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for MoneyMinor {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in minor units: {0}")]
pub struct MoneyMinorConversionError(String);

impl From<i64> for MoneyMinor {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for MoneyMinor {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for MoneyMinor {}

impl TryFrom<u64> for MoneyMinor {
    type Error = MoneyMinorConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MoneyMinorConversionError(format!("Value {} is too large to convert to MoneyMinor", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for MoneyMinor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let units = self.0 as f64 / 100.0;
        write!(f, "{units:0.2}")
    }
}

impl MoneyMinor {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_whole_units(units: i64) -> Self {
        Self(units * 100)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }
}

/// The commerce platform expresses amounts as decimal strings ("398.00"). Parse into exact minor units.
impl FromStr for MoneyMinor {
    type Err = MoneyMinorConversionError;

    fn from_str(price: &str) -> Result<Self, Self::Err> {
        let negative = price.starts_with('-');
        let price = price.trim_start_matches('-');
        let mut parts = price.split('.');
        let whole_units = parts
            .next()
            .ok_or_else(|| MoneyMinorConversionError(price.to_string()))?
            .parse::<i64>()
            .map_err(|e| MoneyMinorConversionError(format!("Invalid amount: {price}. {e}.")))?;
        let cents = match parts.next() {
            None | Some("") => 0,
            Some(c) if c.len() > 2 => {
                return Err(MoneyMinorConversionError(format!("Invalid amount: {price}. Sub-cent precision.")))
            },
            Some(c) => {
                let scale = if c.len() == 1 { 10 } else { 1 };
                c.parse::<i64>().map_err(|e| MoneyMinorConversionError(format!("Invalid amount: {price}. {e}.")))? *
                    scale
            },
        };
        let value = 100 * whole_units + cents;
        Ok(Self(if negative { -value } else { value }))
    }
}
