//! Value Objects for the storefront

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};

/// Amount in Korean won. The currency has no minor unit, so this is a plain integer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Won(i64);

impl Won {
    pub const ZERO: Won = Won(0);

    pub const fn new(amount: i64) -> Self { Self(amount) }
    pub fn value(self) -> i64 { self.0 }
    pub fn is_zero(self) -> bool { self.0 == 0 }

    /// `floor(self * rate)`, e.g. `rate = 0.2` for a 20% coupon.
    pub fn floor_mul(self, rate: Decimal) -> Won {
        let product = (Decimal::from(self.0) * rate).floor();
        Won(product.to_i64().unwrap_or(0))
    }

    /// Price after a whole-number percentage discount; the discount part is floored.
    pub fn discounted(self, percent: u8) -> Won {
        let rate = Decimal::new(i64::from(percent.min(100)), 2);
        self - self.floor_mul(rate)
    }
}

impl Add for Won {
    type Output = Won;
    fn add(self, rhs: Won) -> Won { Won(self.0.saturating_add(rhs.0)) }
}

impl Sub for Won {
    type Output = Won;
    fn sub(self, rhs: Won) -> Won { Won(self.0.saturating_sub(rhs.0)) }
}

impl Sum for Won {
    fn sum<I: Iterator<Item = Won>>(iter: I) -> Won { iter.fold(Won::ZERO, Add::add) }
}

impl fmt::Display for Won {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}원", self.0) }
}

/// Korean mobile number, normalised to digits only (`01012345678`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(raw: &str) -> Result<Self, PhoneError> {
        let trimmed = raw.trim();
        // Kakao hands out "+82 10-1234-5678"
        let local = match trimmed.strip_prefix("+82") {
            Some(rest) => format!("0{}", rest.trim_start()),
            None => trimmed.to_string(),
        };
        let digits: String = local.chars().filter(|c| !matches!(c, '-' | ' ')).collect();
        if digits.is_empty() { return Err(PhoneError::Empty); }
        if !digits.chars().all(|c| c.is_ascii_digit()) { return Err(PhoneError::Malformed); }
        if !digits.starts_with("01") || !(10..=11).contains(&digits.len()) { return Err(PhoneError::Malformed); }
        Ok(Self(digits))
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for PhoneNumber {
    type Error = PhoneError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::parse(&value) }
}

impl From<PhoneNumber> for String {
    fn from(value: PhoneNumber) -> Self { value.0 }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum PhoneError { Empty, Malformed }
impl std::error::Error for PhoneError {}
impl fmt::Display for PhoneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Empty => write!(f, "phone number is required"), Self::Malformed => write!(f, "phone number is not a valid mobile number") }
    }
}
