//! Per-product refund requests on a paid order.

use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{OrderStatus, ProductStatus, RefundToggle};
use crate::error::{ApiError, ApiResult};
use crate::services::checkout::{load_order, product_status_events};
use crate::services::session::Session;
use crate::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct RefundOutcome {
    pub order_id: Uuid,
    pub product_id: i64,
    pub action: RefundToggle,
    pub order_status: OrderStatus,
    pub refund_product_ids: Vec<i64>,
}

/// Request a refund for one item, or withdraw the request if it is already pending.
/// The order write only lands if nobody else wrote the order since it was read.
pub async fn toggle_refund(state: &AppState, order_id: Uuid, product_id: i64, session: &Session) -> ApiResult<RefundOutcome> {
    let mut order = load_order(state, order_id).await?;
    if !order.is_owned_by(&session.identity) {
        return Err(ApiError::Forbidden);
    }

    let action = order.toggle_refund(product_id, state.clock.now()).map_err(|e| {
        tracing::info!(%order_id, product_id, "refund toggle refused: {e}");
        e
    })?;
    if !state.repos.orders.update(&order).await? {
        tracing::warn!(%order_id, product_id, "refund toggle lost a concurrent write");
        return Err(ApiError::Conflict("order was changed by another request; reload and try again".into()));
    }

    let product_status = match action {
        RefundToggle::Requested => ProductStatus::RefundRequested,
        RefundToggle::Cancelled => ProductStatus::Sold,
    };
    state.repos.products.set_status(&[product_id], product_status).await?;
    tracing::info!(%order_id, product_id, ?action, order_status = %order.status, "refund toggled");
    let mut events = order.take_events();
    events.extend(product_status_events(&[product_id], product_status));
    state.events.publish_all(events).await;

    Ok(RefundOutcome { order_id, product_id, action, order_status: order.status, refund_product_ids: order.refund_product_ids })
}
