//! Checkout pricing: flat shipping below a threshold, plus a couple of fixed coupons.

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::domain::value_objects::Won;

pub const SHIPPING_FEE: Won = Won::new(3_500);
pub const FREE_SHIPPING_THRESHOLD: Won = Won::new(50_000);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CouponEffect {
    /// Shipping is free whatever the subtotal; nothing is taken off the goods.
    FreeShipping,
    /// Percentage off the subtotal, floored to whole won.
    PercentOff(u8),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Coupon {
    pub code: &'static str,
    pub effect: CouponEffect,
}

const COUPONS: &[Coupon] = &[
    Coupon { code: "BETA25MAY", effect: CouponEffect::FreeShipping },
    Coupon { code: "BETA20DISCOUNT", effect: CouponEffect::PercentOff(20) },
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("coupon '{0}' is not valid")]
    UnknownCoupon(String),
}

impl Coupon {
    /// Blank input means "no coupon"; anything else must be a known code.
    pub fn lookup(raw: Option<&str>) -> Result<Option<Coupon>, PricingError> {
        let code = match raw.map(|c| c.trim().to_uppercase()) {
            Some(code) if !code.is_empty() => code,
            _ => return Ok(None),
        };
        COUPONS
            .iter()
            .find(|c| c.code == code)
            .copied()
            .map(Some)
            .ok_or(PricingError::UnknownCoupon(code))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub subtotal: Won,
    pub shipping_fee: Won,
    pub discount: Won,
    pub total: Won,
    pub coupon_code: Option<String>,
}

pub fn quote(subtotal: Won, coupon: Option<Coupon>) -> Quote {
    let threshold_fee = if subtotal < FREE_SHIPPING_THRESHOLD { SHIPPING_FEE } else { Won::ZERO };
    let (shipping_fee, discount) = match coupon.map(|c| c.effect) {
        Some(CouponEffect::FreeShipping) => (Won::ZERO, Won::ZERO),
        Some(CouponEffect::PercentOff(pct)) => (threshold_fee, subtotal.floor_mul(Decimal::new(i64::from(pct), 2))),
        None => (threshold_fee, Won::ZERO),
    };
    Quote {
        subtotal,
        shipping_fee,
        discount,
        total: subtotal + shipping_fee - discount,
        coupon_code: coupon.map(|c| c.code.to_string()),
    }
}
