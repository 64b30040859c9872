//! Operator endpoints. Every route here sits behind [`require_admin`].

pub mod orders;
pub mod products;
pub mod reports;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::{self, Next},
    response::Response,
    routing::{get, patch, put},
    Router,
};

use crate::error::ApiError;
use crate::AppState;

/// Accepts `Authorization: Bearer <ADMIN_API_KEY>` and nothing else.
pub async fn require_admin(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, ApiError> {
    let presented = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim);

    match presented {
        Some(key) if key == state.config.admin_api_key => Ok(next.run(req).await),
        Some(_) => {
            tracing::warn!(uri = %req.uri(), "admin key rejected");
            Err(ApiError::Forbidden)
        }
        None => Err(ApiError::Unauthorized("admin key required")),
    }
}

/// Routes mounted under `/api/admin`.
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/products", get(products::list_products).post(products::create_product))
        .route("/products/:id", put(products::update_product))
        .route("/products/:id/status", patch(products::set_product_status))
        .route("/orders", get(orders::list_orders))
        .route("/orders/:id", patch(orders::update_order))
        .route("/reports/visitors", get(reports::visitors))
        .route("/reports/referrers", get(reports::referrers))
        .route("/reports/funnel", get(reports::funnel))
        .route_layer(middleware::from_fn_with_state(state, require_admin))
}
