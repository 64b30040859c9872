//! Payment confirmation: the success redirect and the provider webhook both land here.

use axum::{extract::State, Json};

use crate::error::ApiResult;
use crate::services::checkout::{self, ConfirmRequest, PaymentOutcome, WebhookAck, WebhookPayload};
use crate::AppState;

/// POST /api/payments/confirm
pub async fn confirm_payment(State(state): State<AppState>, Json(request): Json<ConfirmRequest>) -> ApiResult<Json<PaymentOutcome>> {
    Ok(Json(checkout::confirm_payment(&state, request).await?))
}

/// POST /api/payments/webhook
pub async fn payment_webhook(State(state): State<AppState>, Json(payload): Json<WebhookPayload>) -> ApiResult<Json<WebhookAck>> {
    Ok(Json(checkout::handle_webhook(&state, payload).await?))
}
