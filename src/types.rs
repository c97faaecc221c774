//! Core data types shared by the engine, the exchange adapters and the strategy layer

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ExchangeError;

/// Trading pair symbol using Arc<str> for cheap cloning
///
/// Symbols are cloned into every order, position record and journal entry.
/// Using Arc<str> instead of String keeps those clones allocation-free.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

/// Custom serde for Arc<str>
mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref().trim().to_uppercase().as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for buys, -1 for sells
    pub fn sign(self) -> Money {
        match self {
            Side::Buy => Money::ONE,
            Side::Sell => -Money::ONE,
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(ExchangeError::InvalidOrder(format!("unknown side '{}'", other))),
        }
    }
}

// ============================================================================
// Money Type - Precise Decimal Arithmetic for Monetary Values
// ============================================================================

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

/// Money type for precise decimal arithmetic in monetary calculations.
///
/// Wraps `rust_decimal::Decimal` so that balances, prices, quantities, fees and
/// PnL never drift the way `f64` does over thousands of fills. The ledger
/// invariant `balance = initial - commission + realized` is checked with exact
/// equality in the tests, which only holds with decimal arithmetic.
///
/// # Example
/// ```
/// use futures_paper_trader::Money;
/// let price: Money = "100.50".parse().unwrap();
/// let qty: Money = "2".parse().unwrap();
/// assert_eq!((price * qty).to_string(), "201.00");
/// ```
#[derive(Debug, Clone, Copy, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(#[serde(with = "rust_decimal::serde::str")] Decimal);

/// Positions smaller than this are treated as closed and reset to exactly zero
pub const POSITION_EPSILON: Money = Money(dec!(0.00000001));

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub const ONE: Money = Money(Decimal::ONE);

    pub const fn from_decimal(value: Decimal) -> Self {
        Money(value)
    }

    pub fn from_i64(value: i64) -> Self {
        Money(Decimal::from(value))
    }

    /// Lossy conversion for display-only math (percentages in summaries)
    pub fn to_f64(self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        self.0.to_f64().unwrap_or(0.0)
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn max(self, other: Self) -> Self {
        Money(self.0.max(other.0))
    }

    pub fn min(self, other: Self) -> Self {
        Money(self.0.min(other.0))
    }

    pub fn round_dp(self, dp: u32) -> Self {
        Money(self.0.round_dp(dp))
    }

    /// Truncate toward zero, used for exchange quantity precision
    pub fn floor_dp(self, dp: u32) -> Self {
        Money(self.0.round_dp_with_strategy(dp, RoundingStrategy::ToZero))
    }

    /// Largest multiple of `step` not above `self`; unchanged for a non-positive step
    pub fn floor_to_step(self, step: Money) -> Self {
        if !step.is_positive() {
            return self;
        }
        Money((self.0 / step.0).floor() * step.0)
    }

    /// Smallest multiple of `step` not below `self`; unchanged for a non-positive step
    pub fn ceil_to_step(self, step: Money) -> Self {
        if !step.is_positive() {
            return self;
        }
        Money((self.0 / step.0).ceil() * step.0)
    }

    /// Strip trailing zeros (50000.00 -> 50000)
    pub fn normalize(self) -> Self {
        Money(self.0.normalize())
    }

    pub fn inner(self) -> Decimal {
        self.0
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::from_str(s.trim()).map(Money)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Money {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl std::hash::Hash for Money {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Mul for Money {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self::Output {
        Money(self.0 * rhs.0)
    }
}

impl Div for Money {
    type Output = Self;
    fn div(self, rhs: Self) -> Self::Output {
        if rhs.0.is_zero() {
            Money::ZERO
        } else {
            Money(self.0 / rhs.0)
        }
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Money(-self.0)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Money(value)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Money::from_i64(value)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, x| acc + x)
    }
}

impl<'a> std::iter::Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, x| acc + *x)
    }
}

#[cfg(test)]
mod money_tests {
    use super::*;

    fn m(s: &str) -> Money {
        s.parse().unwrap()
    }

    #[test]
    fn test_money_precision() {
        // 0.1 + 0.2 != 0.3 in f64
        assert_eq!(m("0.1") + m("0.2"), m("0.3"));
    }

    #[test]
    fn test_fee_arithmetic_is_exact() {
        let commission = m("51000") * m("1") * m("0.0002");
        assert_eq!(commission, m("10.2"));
    }

    #[test]
    fn test_money_div_by_zero() {
        assert_eq!(m("100") / Money::ZERO, Money::ZERO);
    }

    #[test]
    fn test_negative_zero_is_not_negative() {
        let z = m("1") - m("1");
        assert!(!z.is_negative());
        assert!(!z.is_positive());
        assert!(z.is_zero());
    }

    #[test]
    fn test_floor_dp_truncates() {
        assert_eq!(m("0.0129").floor_dp(3), m("0.012"));
        assert_eq!(m("-0.0129").floor_dp(3), m("-0.012"));
    }

    #[test]
    fn test_step_rounding() {
        assert_eq!(m("62337.705").floor_to_step(m("0.1")), m("62337.7"));
        assert_eq!(m("60794.6925").ceil_to_step(m("0.1")), m("60794.7"));
        assert_eq!(m("0.123456").floor_to_step(m("0.00001")), m("0.12345"));
        assert_eq!(m("5.5").ceil_to_step(m("0.5")), m("5.5"));
        assert_eq!(m("1.23").floor_to_step(Money::ZERO), m("1.23"));
    }

    #[test]
    fn test_money_serde_as_string() {
        let money = m("123.456");
        let json = serde_json::to_string(&money).unwrap();
        assert_eq!(json, "\"123.456\"");
        let parsed: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(money, parsed);
    }

    #[test]
    fn test_side_parse_and_sign() {
        assert_eq!("buy".parse::<Side>().unwrap(), Side::Buy);
        assert_eq!("SELL".parse::<Side>().unwrap(), Side::Sell);
        assert!("HOLD".parse::<Side>().is_err());
        assert_eq!(Side::Sell.sign(), -Money::ONE);
        assert_eq!(Side::Buy.opposite(), Side::Sell);
    }

    #[test]
    fn test_symbol_is_normalized() {
        assert_eq!(Symbol::new(" btcusdt "), Symbol::new("BTCUSDT"));
    }
}
