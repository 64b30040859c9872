//! Checkout: temp order → order form → payment confirmation.
//!
//! Payment confirmation is a small saga over the `payment_steps` ledger. The
//! gateway step is claimed before the outbound call; the effect steps are
//! idempotent and recorded once applied. The browser redirect and the gateway
//! webhook both drive the same steps, so whichever arrives second only fills in
//! what is missing. A gateway claim whose holder vanished (the shopper navigated
//! away mid-call) lapses after [`CONFIRM_LEASE_SECS`] and can be claimed again.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;
use validator::Validate;

use crate::db::{Claim, PaymentStep};
use crate::domain::aggregates::{Order, OrderLine, OrderStatus, ProductStatus, Recipient};
use crate::domain::events::{DomainEvent, ProductEvent};
use crate::domain::pricing::{quote, Coupon, Quote};
use crate::domain::value_objects::{PhoneNumber, Won};
use crate::error::{ApiError, ApiResult};
use crate::services::session::Session;
use crate::services::toss::{GatewayError, Payment};
use crate::AppState;

const WRITE_ATTEMPTS: usize = 3;

/// How long a pending gateway claim blocks other confirmations. Outlasts the
/// outbound request timeout so a live call is never raced.
pub const CONFIRM_LEASE_SECS: i64 = 30;

// ============ Step A: temp order ============

#[derive(Debug, Clone, Deserialize)]
pub struct TempOrderItem {
    pub product_id: i64,
    /// Amount the storefront displayed. Only compared, never trusted.
    #[serde(default)]
    pub amount: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<TempOrderItem>,
}

pub async fn create_temp_order(state: &AppState, request: CreateOrderRequest) -> ApiResult<Order> {
    if request.items.is_empty() {
        return Err(ApiError::validation("order has no items"));
    }
    let mut seen = HashSet::new();
    if let Some(dup) = request.items.iter().find(|i| !seen.insert(i.product_id)) {
        return Err(ApiError::validation(format!("product {} appears twice", dup.product_id)));
    }

    let ids: Vec<i64> = request.items.iter().map(|i| i.product_id).collect();
    let products = state.repos.products.find_many(&ids).await?;

    let mut lines = Vec::with_capacity(request.items.len());
    for item in &request.items {
        let product = products.iter().find(|p| p.id == item.product_id).ok_or(ApiError::NotFound("Product"))?;
        if !product.is_available() {
            return Err(ApiError::rejected("PRODUCT_UNAVAILABLE", format!("'{}' is no longer for sale", product.name)));
        }
        let amount = product.sale_price();
        if let Some(shown) = item.amount.filter(|shown| *shown != amount.value()) {
            tracing::warn!(product_id = product.id, shown, computed = amount.value(), "client amount disagrees; using computed amount");
        }
        lines.push(OrderLine { product_id: product.id, order_name: product.name.clone(), amount });
    }

    let mut order = Order::new_temp(lines, state.clock.now())?;
    state.repos.orders.insert(&order).await?;
    tracing::info!(order_id = %order.id, subtotal = order.subtotal_amount.value(), "temp order created");
    state.events.publish_all(order.take_events()).await;
    Ok(order)
}

// ============ Step B: quote and order form ============

pub async fn quote_order(state: &AppState, order_id: Uuid, coupon_code: Option<&str>) -> ApiResult<Quote> {
    let order = load_order(state, order_id).await?;
    Ok(quote(order.subtotal(), Coupon::lookup(coupon_code)?))
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OrderForm {
    #[validate(length(min = 1, message = "recipient name is required"))]
    pub recipient_name: String,
    #[validate(length(min = 1, message = "recipient phone is required"))]
    pub recipient_phone: String,
    #[validate(length(min = 1, message = "postal code is required"))]
    pub postal_code: String,
    #[validate(length(min = 1, message = "address is required"))]
    pub address: String,
    #[serde(default)]
    pub address_detail: Option<String>,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub coupon_code: Option<String>,
}

impl OrderForm {
    fn trimmed(self) -> Self {
        let opt = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Self {
            recipient_name: self.recipient_name.trim().to_string(),
            recipient_phone: self.recipient_phone.trim().to_string(),
            postal_code: self.postal_code.trim().to_string(),
            address: self.address.trim().to_string(),
            address_detail: opt(self.address_detail),
            memo: opt(self.memo),
            coupon_code: opt(self.coupon_code),
        }
    }
}

/// What the payment widget needs to open.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentRequest {
    pub order_id: Uuid,
    pub order_name: String,
    pub amount: Won,
    pub customer_name: String,
    #[serde(flatten)]
    pub quote: Quote,
}

pub async fn submit_order_form(state: &AppState, order_id: Uuid, session: &Session, form: OrderForm) -> ApiResult<PaymentRequest> {
    let form = form.trimmed();
    form.validate()?;
    let recipient_phone = PhoneNumber::parse(&form.recipient_phone)?;
    let coupon = Coupon::lookup(form.coupon_code.as_deref())?;

    let mut order = load_order(state, order_id).await?;
    if order.has_buyer() && !order.is_owned_by(&session.identity) {
        return Err(ApiError::Forbidden);
    }
    let products = state.repos.products.find_many(&order.product_ids()).await?;
    if let Some(gone) = order.lines.iter().find(|l| !products.iter().any(|p| p.id == l.product_id && p.is_available())) {
        return Err(ApiError::rejected("PRODUCT_UNAVAILABLE", format!("'{}' is no longer for sale", gone.order_name)));
    }

    let priced = quote(order.subtotal(), coupon);
    let recipient = Recipient {
        name: form.recipient_name,
        phone: recipient_phone.as_str().to_string(),
        postal_code: form.postal_code,
        address: form.address,
        address_detail: form.address_detail,
        memo: form.memo,
    };
    order.submit(&session.identity, recipient.clone(), &priced, state.clock.now())?;
    if !state.repos.orders.update(&order).await? {
        return Err(ApiError::Conflict("order was changed by another request; please retry".into()));
    }
    tracing::info!(order_id = %order.id, total = order.total_amount.value(), coupon = ?order.coupon_code, "order form submitted");
    state.events.publish_all(order.take_events()).await;

    Ok(PaymentRequest {
        order_id: order.id,
        order_name: order.order_name(),
        amount: order.total_amount,
        customer_name: recipient.name,
        quote: priced,
    })
}

// ============ Step D: payment saga ============

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub payment_key: String,
    pub order_id: Uuid,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentOutcome {
    pub order_id: Uuid,
    pub order_name: String,
    pub status: OrderStatus,
    pub total_amount: Won,
    pub steps: Vec<PaymentStep>,
}

pub async fn confirm_payment(state: &AppState, request: ConfirmRequest) -> ApiResult<PaymentOutcome> {
    let order = load_order(state, request.order_id).await?;
    if !matches!(order.status, OrderStatus::PaymentPending | OrderStatus::Paid) {
        return Err(ApiError::rejected("INVALID_ORDER_STATE", format!("order is {}", order.status)));
    }
    if request.amount != order.total_amount.value() {
        tracing::warn!(order_id = %order.id, requested = request.amount, expected = order.total_amount.value(), "payment amount mismatch");
        return Err(ApiError::rejected("AMOUNT_MISMATCH", "payment amount does not match the order total"));
    }

    let ledger = &state.repos.payments;
    let now = state.clock.now();
    let stale_before = now - chrono::Duration::seconds(CONFIRM_LEASE_SECS);
    match ledger.claim(order.id, PaymentStep::GatewayConfirmed, &request.payment_key, now, stale_before).await? {
        Claim::Acquired => match confirm_with_gateway(state, &order, &request.payment_key).await {
            Ok(payment) if payment.is_done() => {
                ledger.complete(order.id, PaymentStep::GatewayConfirmed, state.clock.now()).await?;
                tracing::info!(
                    order_id = %order.id,
                    payment_key = %request.payment_key,
                    method = payment.method.as_deref().unwrap_or("unknown"),
                    "gateway confirmed payment"
                );
            }
            Ok(payment) => {
                ledger.release(order.id, PaymentStep::GatewayConfirmed).await?;
                tracing::warn!(order_id = %order.id, status = %payment.status, "gateway returned a payment that is not done");
                return Err(ApiError::rejected("PAYMENT_NOT_COMPLETED", format!("payment is {}", payment.status)));
            }
            Err(e) => {
                ledger.release(order.id, PaymentStep::GatewayConfirmed).await?;
                return Err(ApiError::upstream("toss", e));
            }
        },
        Claim::InProgress => return Err(ApiError::Conflict("payment confirmation already in progress".into())),
        Claim::Done { payment_key } if payment_key != request.payment_key => {
            return Err(ApiError::Conflict("order was paid with a different payment".into()));
        }
        Claim::Done { .. } => tracing::debug!(order_id = %order.id, "gateway step already done; resuming"),
    }

    apply_payment_effects(state, order.id, &request.payment_key).await
}

/// Confirm with the gateway. When the call fails, the payment may still have been
/// confirmed by an earlier attempt that was cut off, so the gateway's own record
/// is consulted before giving up.
async fn confirm_with_gateway(state: &AppState, order: &Order, payment_key: &str) -> Result<Payment, GatewayError> {
    let err = match state.gateway.confirm(payment_key, order.id, order.total_amount).await {
        Ok(payment) => return Ok(payment),
        Err(err) => err,
    };
    match state.gateway.fetch(payment_key).await {
        Ok(payment) if payment.is_done() && payment.order_id == order.id.to_string() && payment.total_amount == order.total_amount.value() => {
            tracing::warn!(order_id = %order.id, payment_key, "confirm failed ({err}) but the gateway already holds the payment as done");
            Ok(payment)
        }
        _ => Err(err),
    }
}

/// Runs the idempotent effect steps that are not yet in the ledger.
async fn apply_payment_effects(state: &AppState, order_id: Uuid, payment_key: &str) -> ApiResult<PaymentOutcome> {
    let ledger = &state.repos.payments;
    let done = ledger.completed(order_id).await?;

    if !done.contains(&PaymentStep::OrderPaid) {
        mark_order_paid(state, order_id, payment_key).await?;
        ledger.record(order_id, PaymentStep::OrderPaid, payment_key, state.clock.now()).await?;
    }

    let order = load_order(state, order_id).await?;
    if !done.contains(&PaymentStep::ProductsSold) {
        let product_ids = order.product_ids();
        let changed = state.repos.products.set_status(&product_ids, ProductStatus::Sold).await?;
        ledger.record(order_id, PaymentStep::ProductsSold, payment_key, state.clock.now()).await?;
        tracing::info!(%order_id, products = changed, "products marked sold");
        state.events.publish_all(product_status_events(&product_ids, ProductStatus::Sold)).await;
    }

    Ok(PaymentOutcome {
        order_id,
        order_name: order.order_name(),
        status: order.status,
        total_amount: order.total_amount,
        steps: ledger.completed(order_id).await?,
    })
}

pub(crate) fn product_status_events(product_ids: &[i64], status: ProductStatus) -> Vec<DomainEvent> {
    product_ids.iter().map(|&product_id| DomainEvent::Product(ProductEvent::StatusChanged { product_id, status })).collect()
}

async fn mark_order_paid(state: &AppState, order_id: Uuid, payment_key: &str) -> ApiResult<()> {
    for _ in 0..WRITE_ATTEMPTS {
        let mut order = load_order(state, order_id).await?;
        let before = (order.status, order.payment_key.clone());
        order.mark_paid(payment_key, state.clock.now())?;
        if (order.status, order.payment_key.clone()) == before {
            return Ok(());
        }
        if state.repos.orders.update(&order).await? {
            tracing::info!(%order_id, payment_key, "order marked paid");
            state.events.publish_all(order.take_events()).await;
            return Ok(());
        }
    }
    Err(ApiError::Conflict("order is being updated concurrently; please retry".into()))
}

// ============ Webhook ============

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookData {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub payment_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WebhookPayload {
    Envelope {
        #[serde(rename = "eventType")]
        event_type: String,
        data: WebhookData,
    },
    Flat(WebhookData),
}

impl WebhookPayload {
    pub fn data(&self) -> &WebhookData {
        match self {
            Self::Envelope { data, .. } => data,
            Self::Flat(data) => data,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub handled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
}

pub async fn handle_webhook(state: &AppState, payload: WebhookPayload) -> ApiResult<WebhookAck> {
    if let WebhookPayload::Envelope { event_type, .. } = &payload {
        tracing::debug!(event_type, "webhook envelope received");
    }
    let data = payload.data();
    let status = data.status.as_deref().unwrap_or_default();
    if status != "DONE" {
        tracing::info!(order_id = ?data.order_id, status, "webhook acknowledged without action");
        return Ok(WebhookAck { handled: false, order_id: None, status: None });
    }

    let payment_key = data.payment_key.as_deref().filter(|k| !k.is_empty()).ok_or_else(|| ApiError::validation("paymentKey is required"))?;
    let order_id: Uuid = data
        .order_id
        .as_deref()
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| ApiError::validation("orderId must be an order id"))?;
    let order = load_order(state, order_id).await?;
    if !matches!(order.status, OrderStatus::PaymentPending) && !order.status.is_settled() {
        return Err(ApiError::rejected("INVALID_ORDER_STATE", format!("order is {}", order.status)));
    }

    // The webhook is unsigned: trust only what the gateway itself reports.
    let payment = state.gateway.fetch(payment_key).await.map_err(|e| ApiError::upstream("toss", e))?;
    if !payment.is_done() || payment.order_id != order_id.to_string() || payment.total_amount != order.total_amount.value() {
        tracing::warn!(%order_id, payment_key, gateway_order = %payment.order_id, gateway_amount = payment.total_amount, gateway_status = %payment.status, "webhook does not match gateway record");
        return Err(ApiError::rejected("PAYMENT_MISMATCH", "payment does not match the order"));
    }

    state.repos.payments.record(order_id, PaymentStep::GatewayConfirmed, payment_key, state.clock.now()).await?;
    let outcome = apply_payment_effects(state, order_id, payment_key).await?;
    Ok(WebhookAck { handled: true, order_id: Some(order_id), status: Some(outcome.status) })
}

// ============ Reading orders ============

#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub order_name: String,
    pub delivery_label: &'static str,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        Self { order_name: order.order_name(), delivery_label: order.delivery.label(), order }
    }
}

pub async fn get_order(state: &AppState, order_id: Uuid, session: Option<&Session>) -> ApiResult<OrderView> {
    let order = load_order(state, order_id).await?;
    if order.has_buyer() {
        let session = session.ok_or(ApiError::Unauthorized("login required"))?;
        if !order.is_owned_by(&session.identity) {
            return Err(ApiError::Forbidden);
        }
    }
    Ok(order.into())
}

pub async fn list_my_orders(state: &AppState, session: &Session) -> ApiResult<Vec<OrderView>> {
    let orders = state.repos.orders.list_for_buyer(&session.identity).await?;
    Ok(orders.into_iter().map(OrderView::from).collect())
}

pub(crate) async fn load_order(state: &AppState, order_id: Uuid) -> ApiResult<Order> {
    state.repos.orders.find(order_id).await?.ok_or(ApiError::NotFound("Order"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::OUTBOUND_TIMEOUT;

    #[test]
    fn lease_outlasts_a_live_gateway_call() {
        assert!(CONFIRM_LEASE_SECS > i64::try_from(OUTBOUND_TIMEOUT.as_secs()).unwrap());
    }

    #[test]
    fn sold_events_cover_every_product() {
        let events = product_status_events(&[4, 9], ProductStatus::Sold);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.subject() == "products.status_changed"));
    }
}
