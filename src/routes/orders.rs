//! Buyer-side order endpoints: temp order, form submission, reading, refunds
//! and review links.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::aggregates::ReviewToken;
use crate::domain::pricing::Quote;
use crate::error::ApiResult;
use crate::services::checkout::{self, CreateOrderRequest, OrderForm, OrderView, PaymentRequest};
use crate::services::refunds::{self, RefundOutcome};
use crate::services::reviews;
use crate::services::Session;
use crate::AppState;

/// POST /api/orders
///
/// No session needed: guests become buyers when they submit the form.
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> ApiResult<(StatusCode, Json<OrderView>)> {
    let order = checkout::create_temp_order(&state, request).await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

#[derive(Debug, Default, Deserialize)]
pub struct QuoteRequest {
    #[serde(default)]
    pub coupon_code: Option<String>,
}

/// POST /api/orders/:id/quote
pub async fn quote_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<QuoteRequest>,
) -> ApiResult<Json<Quote>> {
    Ok(Json(checkout::quote_order(&state, id, request.coupon_code.as_deref()).await?))
}

/// PUT /api/orders/:id/submit
pub async fn submit_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    session: Session,
    Json(form): Json<OrderForm>,
) -> ApiResult<Json<PaymentRequest>> {
    Ok(Json(checkout::submit_order_form(&state, id, &session, form).await?))
}

/// GET /api/orders/:id
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    session: Option<Session>,
) -> ApiResult<Json<OrderView>> {
    Ok(Json(checkout::get_order(&state, id, session.as_ref()).await?))
}

/// GET /api/orders
pub async fn list_my_orders(State(state): State<AppState>, session: Session) -> ApiResult<Json<Vec<OrderView>>> {
    Ok(Json(checkout::list_my_orders(&state, &session).await?))
}

/// POST /api/orders/:id/refunds/:product_id
pub async fn toggle_refund(
    State(state): State<AppState>,
    Path((id, product_id)): Path<(Uuid, i64)>,
    session: Session,
) -> ApiResult<Json<RefundOutcome>> {
    Ok(Json(refunds::toggle_refund(&state, id, product_id, &session).await?))
}

/// POST /api/orders/:id/review-tokens
pub async fn issue_review_tokens(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    session: Session,
) -> ApiResult<Json<Vec<ReviewToken>>> {
    Ok(Json(reviews::issue_review_tokens(&state, id, &session).await?))
}
