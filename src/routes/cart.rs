//! Cart pricing. The cart itself lives in the browser.

use axum::{extract::State, Json};

use crate::error::ApiResult;
use crate::services::catalog::{self, CartQuote};
use crate::AppState;

/// POST /api/cart/quote
///
/// Accepts the stored cart in either the current or the legacy list shape.
pub async fn quote_cart(State(state): State<AppState>, Json(raw): Json<serde_json::Value>) -> ApiResult<Json<CartQuote>> {
    Ok(Json(catalog::quote_cart(&state, raw).await?))
}
