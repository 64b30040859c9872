//! View → cart → order → pay conversion.

use serde::Serialize;
use std::collections::HashSet;

use super::{CartLog, IpExclusion, OrderFact, PageView};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FunnelReport {
    pub viewers: usize,
    pub cart_users: usize,
    pub orders: usize,
    pub paid_orders: usize,
    pub view_to_cart: f64,
    pub cart_to_order: f64,
    pub order_to_pay: f64,
    pub view_to_pay: f64,
}

/// `numerator / denominator`, or 0 when nothing reached the earlier stage.
pub fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 { 0.0 } else { numerator as f64 / denominator as f64 }
}

pub fn funnel_report(views: &[PageView], carts: &[CartLog], orders: &[OrderFact], exclusion: &IpExclusion) -> FunnelReport {
    let viewers: HashSet<&str> = views.iter().map(|v| v.ip.as_str()).filter(|ip| !exclusion.is_excluded(ip)).collect();
    let cart_users: HashSet<&str> = carts.iter().map(|c| c.ip.as_str()).filter(|ip| !exclusion.is_excluded(ip)).collect();
    let order_count = orders.len();
    let paid = orders.iter().filter(|o| o.status.is_settled()).count();

    FunnelReport {
        viewers: viewers.len(),
        cart_users: cart_users.len(),
        orders: order_count,
        paid_orders: paid,
        view_to_cart: ratio(cart_users.len(), viewers.len()),
        cart_to_order: ratio(order_count, cart_users.len()),
        order_to_pay: ratio(paid, order_count),
        view_to_pay: ratio(paid, viewers.len()),
    }
}
