//! Order Aggregate
//!
//! Lifecycle: `temp → 결제대기 → 결제완료`, then `환불요청 ⇄ 결제완료` per product and
//! `환불요청 → 환불완료` by an operator.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::product::UnknownStatus;
use crate::domain::aggregates::user::BuyerIdentity;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::pricing::Quote;
use crate::domain::value_objects::Won;

pub const REFUND_WINDOW_DAYS: i64 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    #[serde(rename = "temp")] Temp,
    #[serde(rename = "결제대기")] PaymentPending,
    #[serde(rename = "결제완료")] Paid,
    #[serde(rename = "환불요청")] RefundRequested,
    #[serde(rename = "환불완료")] Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Temp => "temp",
            Self::PaymentPending => "결제대기",
            Self::Paid => "결제완료",
            Self::RefundRequested => "환불요청",
            Self::Refunded => "환불완료",
        }
    }

    /// Money has changed hands at some point.
    pub fn is_settled(&self) -> bool { matches!(self, Self::Paid | Self::RefundRequested | Self::Refunded) }
}

impl FromStr for OrderStatus {
    type Err = UnknownStatus;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "temp" => Ok(Self::Temp),
            "결제대기" => Ok(Self::PaymentPending),
            "결제완료" => Ok(Self::Paid),
            "환불요청" => Ok(Self::RefundRequested),
            "환불완료" => Ok(Self::Refunded),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Shipping progress. The tracking number is data, not part of the label.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    #[default]
    Preparing,
    InTransit { tracking_number: Option<String> },
    Delivered,
}

const LABEL_PREPARING: &str = "배송 준비 중";
const LABEL_IN_TRANSIT: &str = "배송 진행 중";
const LABEL_DELIVERED: &str = "배송 완료";

impl DeliveryStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Preparing => LABEL_PREPARING,
            Self::InTransit { .. } => LABEL_IN_TRANSIT,
            Self::Delivered => LABEL_DELIVERED,
        }
    }

    pub fn tracking_number(&self) -> Option<&str> {
        match self { Self::InTransit { tracking_number } => tracking_number.as_deref(), _ => None }
    }

    /// Decode the stored label/tracking pair. Older rows carry the tracking number
    /// inside the label, as `배송 진행 중(운송장번호: 123)`.
    pub fn from_columns(label: Option<&str>, tracking: Option<&str>) -> Result<Self, UnknownStatus> {
        let label = label.map(str::trim).unwrap_or_default();
        let (head, embedded) = match label.split_once('(') {
            Some((head, rest)) => {
                let inner = rest.trim_end_matches(')');
                let number = inner.split_once(':').map(|(_, n)| n.trim()).filter(|n| !n.is_empty());
                (head.trim(), number.map(String::from))
            }
            None => (label, None),
        };
        let compact: String = head.chars().filter(|c| !c.is_whitespace()).collect();
        let tracking = tracking.map(str::trim).filter(|t| !t.is_empty()).map(String::from).or(embedded);
        match compact.as_str() {
            "" | "배송준비중" | "상품준비중" => Ok(Self::Preparing),
            "배송진행중" | "배송중" => Ok(Self::InTransit { tracking_number: tracking }),
            "배송완료" => Ok(Self::Delivered),
            _ => Err(UnknownStatus(label.to_string())),
        }
    }

    pub fn to_columns(&self) -> (&'static str, Option<String>) {
        (self.label(), self.tracking_number().map(String::from))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: i64,
    pub order_name: String,
    pub amount: Won,
}

#[derive(Debug, Error)]
#[error("stored order lines are malformed: {0}")]
pub struct LinesError(#[from] serde_json::Error);

/// The `products` column was written both as a JSON array and as a string holding
/// that array. Both shapes decode here, once.
pub fn decode_lines(value: serde_json::Value) -> Result<Vec<OrderLine>, LinesError> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Stored {
        Lines(Vec<OrderLine>),
        Encoded(String),
    }
    if value.is_null() { return Ok(Vec::new()); }
    match serde_json::from_value::<Stored>(value)? {
        Stored::Lines(lines) => Ok(lines),
        Stored::Encoded(raw) => Ok(serde_json::from_str(&raw)?),
    }
}

pub fn encode_lines(lines: &[OrderLine]) -> serde_json::Value {
    serde_json::to_value(lines).unwrap_or_else(|_| serde_json::Value::Array(Vec::new()))
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub name: String,
    pub phone: String,
    pub postal_code: String,
    pub address: String,
    pub address_detail: Option<String>,
    pub memo: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub kakao_id: Option<String>,
    pub phone: Option<String>,
    pub recipient: Option<Recipient>,
    pub lines: Vec<OrderLine>,
    pub subtotal_amount: Won,
    pub shipping_fee: Won,
    pub discount_amount: Won,
    pub total_amount: Won,
    pub coupon_code: Option<String>,
    pub status: OrderStatus,
    pub delivery: DeliveryStatus,
    pub delivery_complete_date: Option<DateTime<Utc>>,
    pub refund_product_ids: Vec<i64>,
    pub payment_key: Option<String>,
    /// Bumped on every write; guards conditional updates.
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("order has no items")]
    NoItems,
    #[error("order is {0} and cannot move on from there")]
    InvalidTransition(OrderStatus),
    #[error("order was already paid with a different payment")]
    PaidWithOtherPayment,
    #[error("product {0} is not part of this order")]
    UnknownProduct(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefundError {
    #[error("order is {0}; refunds apply to paid orders only")]
    NotPaid(OrderStatus),
    #[error("product {0} is not part of this order")]
    UnknownProduct(i64),
    #[error("the order has not been delivered yet")]
    NotDelivered,
    #[error("refunds close 10 days after delivery")]
    WindowClosed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundToggle {
    Requested,
    Cancelled,
}

impl Order {
    pub fn new_temp(lines: Vec<OrderLine>, now: DateTime<Utc>) -> Result<Self, OrderError> {
        if lines.is_empty() { return Err(OrderError::NoItems); }
        let subtotal: Won = lines.iter().map(|l| l.amount).sum();
        let mut order = Self {
            id: Uuid::new_v4(), kakao_id: None, phone: None, recipient: None, lines,
            subtotal_amount: subtotal, shipping_fee: Won::ZERO, discount_amount: Won::ZERO, total_amount: subtotal,
            coupon_code: None, status: OrderStatus::Temp, delivery: DeliveryStatus::Preparing,
            delivery_complete_date: None, refund_product_ids: vec![], payment_key: None, version: 0,
            created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Created { order_id: order.id, subtotal }));
        Ok(order)
    }

    pub fn subtotal(&self) -> Won { self.lines.iter().map(|l| l.amount).sum() }

    /// Name shown on the payment sheet: first item, plus how many more.
    pub fn order_name(&self) -> String {
        match self.lines.as_slice() {
            [] => String::new(),
            [only] => only.order_name.clone(),
            [first, rest @ ..] => format!("{} 외 {}건", first.order_name, rest.len()),
        }
    }

    pub fn contains_product(&self, product_id: i64) -> bool { self.lines.iter().any(|l| l.product_id == product_id) }
    pub fn product_ids(&self) -> Vec<i64> { self.lines.iter().map(|l| l.product_id).collect() }

    pub fn has_buyer(&self) -> bool { self.kakao_id.is_some() || self.phone.is_some() }

    pub fn is_owned_by(&self, buyer: &BuyerIdentity) -> bool {
        match buyer {
            BuyerIdentity::Kakao { kakao_id } => self.kakao_id.as_deref() == Some(kakao_id.as_str()),
            // Kakao orders also carry the recipient's phone; that does not make them phone-owned.
            BuyerIdentity::Phone { phone } => self.kakao_id.is_none() && self.phone.as_deref() == Some(phone.as_str()),
        }
    }

    /// Order form submitted: attach buyer and recipient, freeze the amounts.
    pub fn submit(&mut self, buyer: &BuyerIdentity, recipient: Recipient, quote: &Quote, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !matches!(self.status, OrderStatus::Temp | OrderStatus::PaymentPending) {
            return Err(OrderError::InvalidTransition(self.status));
        }
        match buyer {
            BuyerIdentity::Kakao { kakao_id } => { self.kakao_id = Some(kakao_id.clone()); self.phone = Some(recipient.phone.clone()); }
            BuyerIdentity::Phone { phone } => { self.phone = Some(phone.as_str().to_string()); }
        }
        self.recipient = Some(recipient);
        self.subtotal_amount = quote.subtotal;
        self.shipping_fee = quote.shipping_fee;
        self.discount_amount = quote.discount;
        self.total_amount = quote.total;
        self.coupon_code = quote.coupon_code.clone();
        self.status = OrderStatus::PaymentPending;
        self.touch(now);
        self.raise_event(DomainEvent::Order(OrderEvent::Submitted { order_id: self.id, total: quote.total }));
        Ok(())
    }

    /// Returns `false` when the same payment was already recorded.
    pub fn mark_paid(&mut self, payment_key: &str, now: DateTime<Utc>) -> Result<bool, OrderError> {
        match self.status {
            OrderStatus::PaymentPending => {
                self.status = OrderStatus::Paid;
                self.payment_key = Some(payment_key.to_string());
                self.touch(now);
                self.raise_event(DomainEvent::Order(OrderEvent::Paid { order_id: self.id, payment_key: payment_key.to_string(), total: self.total_amount }));
                Ok(true)
            }
            status if status.is_settled() => match self.payment_key.as_deref() {
                Some(key) if key == payment_key => Ok(false),
                None => { self.payment_key = Some(payment_key.to_string()); self.touch(now); Ok(false) }
                Some(_) => Err(OrderError::PaidWithOtherPayment),
            },
            status => Err(OrderError::InvalidTransition(status)),
        }
    }

    /// Flip the refund flag of one product. Leaving refund state is always allowed;
    /// entering it needs a delivery no more than [`REFUND_WINDOW_DAYS`] ago.
    pub fn toggle_refund(&mut self, product_id: i64, now: DateTime<Utc>) -> Result<RefundToggle, RefundError> {
        if !matches!(self.status, OrderStatus::Paid | OrderStatus::RefundRequested) {
            return Err(RefundError::NotPaid(self.status));
        }
        if !self.contains_product(product_id) { return Err(RefundError::UnknownProduct(product_id)); }

        if self.refund_product_ids.contains(&product_id) {
            self.refund_product_ids.retain(|id| *id != product_id);
            if self.refund_product_ids.is_empty() { self.status = OrderStatus::Paid; }
            self.touch(now);
            self.raise_event(DomainEvent::Order(OrderEvent::RefundCancelled { order_id: self.id, product_id }));
            return Ok(RefundToggle::Cancelled);
        }

        let delivered_at = self.delivery_complete_date.ok_or(RefundError::NotDelivered)?;
        if now - delivered_at > Duration::days(REFUND_WINDOW_DAYS) { return Err(RefundError::WindowClosed); }
        self.refund_product_ids.push(product_id);
        self.status = OrderStatus::RefundRequested;
        self.touch(now);
        self.raise_event(DomainEvent::Order(OrderEvent::RefundRequested { order_id: self.id, product_id }));
        Ok(RefundToggle::Requested)
    }

    pub fn set_delivery(&mut self, delivery: DeliveryStatus, now: DateTime<Utc>) {
        if delivery == self.delivery { return; }
        match &delivery {
            DeliveryStatus::InTransit { tracking_number } => self.raise_event(DomainEvent::Order(OrderEvent::Shipped { order_id: self.id, tracking_number: tracking_number.clone() })),
            DeliveryStatus::Delivered => {
                if self.delivery_complete_date.is_none() { self.delivery_complete_date = Some(now); }
                self.raise_event(DomainEvent::Order(OrderEvent::Delivered { order_id: self.id }));
            }
            DeliveryStatus::Preparing => {}
        }
        self.delivery = delivery;
        self.touch(now);
    }

    /// Operator override; no transition rules apply.
    pub fn force_status(&mut self, status: OrderStatus, now: DateTime<Utc>) {
        if status == self.status { return; }
        self.status = status;
        self.touch(now);
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id, status }));
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self, now: DateTime<Utc>) { self.updated_at = now; }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pricing::{quote, Coupon};
    use crate::domain::value_objects::PhoneNumber;

    fn lines() -> Vec<OrderLine> {
        vec![
            OrderLine { product_id: 1, order_name: "Petit Bateau 바디수트".into(), amount: Won::new(25_000) },
            OrderLine { product_id: 2, order_name: "Jacadi 가디건".into(), amount: Won::new(20_000) },
        ]
    }

    fn buyer() -> BuyerIdentity { BuyerIdentity::Phone { phone: PhoneNumber::parse("01012345678").unwrap() } }

    fn recipient() -> Recipient {
        Recipient { name: "김하나".into(), phone: "01012345678".into(), postal_code: "06236".into(), address: "서울 강남구 테헤란로 1".into(), address_detail: Some("101호".into()), memo: None }
    }

    fn paid_order(now: DateTime<Utc>) -> Order {
        let mut order = Order::new_temp(lines(), now).unwrap();
        order.submit(&buyer(), recipient(), &quote(order.subtotal(), None), now).unwrap();
        order.mark_paid("pay_1", now).unwrap();
        order
    }

    #[test]
    fn test_order_workflow() {
        let now = Utc::now();
        let mut order = Order::new_temp(lines(), now).unwrap();
        assert_eq!(order.status, OrderStatus::Temp);
        assert_eq!(order.order_name(), "Petit Bateau 바디수트 외 1건");

        let q = quote(order.subtotal(), Coupon::lookup(None).unwrap());
        order.submit(&buyer(), recipient(), &q, now).unwrap();
        assert_eq!(order.status, OrderStatus::PaymentPending);
        assert_eq!(order.total_amount, Won::new(48_500));
        assert!(order.is_owned_by(&buyer()));

        assert_eq!(order.mark_paid("pay_1", now), Ok(true));
        assert_eq!(order.mark_paid("pay_1", now), Ok(false));
        assert_eq!(order.mark_paid("pay_2", now), Err(OrderError::PaidWithOtherPayment));
        assert_eq!(order.status, OrderStatus::Paid);

        let subjects: Vec<_> = order.take_events().iter().map(|e| e.subject()).collect();
        assert_eq!(subjects, ["orders.created", "orders.submitted", "orders.paid"]);
    }

    #[test]
    fn test_empty_order_rejected() {
        assert_eq!(Order::new_temp(vec![], Utc::now()).unwrap_err(), OrderError::NoItems);
    }

    #[test]
    fn test_temp_order_cannot_be_paid() {
        let mut order = Order::new_temp(lines(), Utc::now()).unwrap();
        assert_eq!(order.mark_paid("pay", Utc::now()), Err(OrderError::InvalidTransition(OrderStatus::Temp)));
    }

    #[test]
    fn test_refund_toggle_round_trip() {
        let delivered = Utc::now();
        let mut order = paid_order(delivered);
        order.set_delivery(DeliveryStatus::Delivered, delivered);
        assert_eq!(order.delivery_complete_date, Some(delivered));

        let now = delivered + Duration::days(3);
        assert_eq!(order.toggle_refund(1, now), Ok(RefundToggle::Requested));
        assert_eq!(order.toggle_refund(2, now), Ok(RefundToggle::Requested));
        assert_eq!(order.status, OrderStatus::RefundRequested);
        assert_eq!(order.refund_product_ids, vec![1, 2]);

        assert_eq!(order.toggle_refund(1, now), Ok(RefundToggle::Cancelled));
        assert_eq!(order.status, OrderStatus::RefundRequested);
        assert_eq!(order.toggle_refund(2, now), Ok(RefundToggle::Cancelled));
        assert_eq!(order.status, OrderStatus::Paid);
        assert!(order.refund_product_ids.is_empty());
    }

    #[test]
    fn test_refund_window() {
        let delivered = Utc::now();
        let mut order = paid_order(delivered);
        order.set_delivery(DeliveryStatus::Delivered, delivered);

        let late = delivered + Duration::days(10) + Duration::seconds(1);
        assert_eq!(order.toggle_refund(1, late), Err(RefundError::WindowClosed));
        assert_eq!(order.status, OrderStatus::Paid);
        assert!(order.refund_product_ids.is_empty());

        assert_eq!(order.toggle_refund(1, delivered + Duration::days(10)), Ok(RefundToggle::Requested));
        // cancelling stays possible after the window
        assert_eq!(order.toggle_refund(1, late), Ok(RefundToggle::Cancelled));
    }

    #[test]
    fn test_refund_requires_delivery_and_membership() {
        let now = Utc::now();
        let mut order = paid_order(now);
        assert_eq!(order.toggle_refund(1, now), Err(RefundError::NotDelivered));
        assert_eq!(order.toggle_refund(99, now), Err(RefundError::UnknownProduct(99)));
        let mut temp = Order::new_temp(lines(), now).unwrap();
        assert_eq!(temp.toggle_refund(1, now), Err(RefundError::NotPaid(OrderStatus::Temp)));
    }

    #[test]
    fn test_lines_decode_from_string_or_array() {
        let original = lines();
        let as_array = encode_lines(&original);
        let as_string = serde_json::Value::String(serde_json::to_string(&original).unwrap());
        assert_eq!(decode_lines(as_array).unwrap(), original);
        assert_eq!(decode_lines(as_string).unwrap(), original);
        assert!(decode_lines(serde_json::Value::Null).unwrap().is_empty());
        assert!(decode_lines(serde_json::json!("not json")).is_err());
        assert!(decode_lines(serde_json::json!([{ "product_id": "x" }])).is_err());
    }

    #[test]
    fn test_delivery_status_columns() {
        assert_eq!(DeliveryStatus::from_columns(None, None).unwrap(), DeliveryStatus::Preparing);
        assert_eq!(
            DeliveryStatus::from_columns(Some("배송 진행 중(운송장번호: 6891234567)"), None).unwrap(),
            DeliveryStatus::InTransit { tracking_number: Some("6891234567".into()) }
        );
        assert_eq!(
            DeliveryStatus::from_columns(Some("배송 진행 중"), Some("111")).unwrap().tracking_number(),
            Some("111")
        );
        assert_eq!(DeliveryStatus::from_columns(Some("배송완료"), None).unwrap(), DeliveryStatus::Delivered);
        assert!(DeliveryStatus::from_columns(Some("분실"), None).is_err());

        let shipped = DeliveryStatus::InTransit { tracking_number: Some("42".into()) };
        let (label, tracking) = shipped.to_columns();
        assert_eq!(DeliveryStatus::from_columns(Some(label), tracking.as_deref()).unwrap(), shipped);
    }

    #[test]
    fn test_status_labels_round_trip() {
        for status in [OrderStatus::Temp, OrderStatus::PaymentPending, OrderStatus::Paid, OrderStatus::RefundRequested, OrderStatus::Refunded] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
    }
}
