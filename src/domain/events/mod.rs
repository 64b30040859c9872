//! Domain events
//!
//! Raised by aggregates, drained by the service layer and published best-effort.

use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{OrderStatus, ProductStatus};
use crate::domain::value_objects::Won;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    Product(ProductEvent),
    Order(OrderEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProductEvent {
    Created { product_id: i64 },
    StatusChanged { product_id: i64, status: ProductStatus },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: Uuid, subtotal: Won },
    Submitted { order_id: Uuid, total: Won },
    Paid { order_id: Uuid, payment_key: String, total: Won },
    RefundRequested { order_id: Uuid, product_id: i64 },
    RefundCancelled { order_id: Uuid, product_id: i64 },
    Shipped { order_id: Uuid, tracking_number: Option<String> },
    Delivered { order_id: Uuid },
    StatusChanged { order_id: Uuid, status: OrderStatus },
}

impl DomainEvent {
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Product(ProductEvent::Created { .. }) => "products.created",
            Self::Product(ProductEvent::StatusChanged { .. }) => "products.status_changed",
            Self::Order(OrderEvent::Created { .. }) => "orders.created",
            Self::Order(OrderEvent::Submitted { .. }) => "orders.submitted",
            Self::Order(OrderEvent::Paid { .. }) => "orders.paid",
            Self::Order(OrderEvent::RefundRequested { .. }) => "orders.refund_requested",
            Self::Order(OrderEvent::RefundCancelled { .. }) => "orders.refund_cancelled",
            Self::Order(OrderEvent::Shipped { .. }) => "orders.shipped",
            Self::Order(OrderEvent::Delivered { .. }) => "orders.delivered",
            Self::Order(OrderEvent::StatusChanged { .. }) => "orders.status_changed",
        }
    }
}
