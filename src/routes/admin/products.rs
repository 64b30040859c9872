//! Product management.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::domain::aggregates::{Product, ProductStatus};
use crate::error::ApiResult;
use crate::services::admin::{self, ProductForm, ProductPatch};
use crate::services::catalog::{Page, ProductQuery, ProductView};
use crate::AppState;

/// GET /api/admin/products (every status, drafts included)
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> ApiResult<Json<Page<ProductView>>> {
    let filter = query.into_filter(true)?;
    Ok(Json(admin::list_products(&state, filter).await?))
}

/// POST /api/admin/products
pub async fn create_product(State(state): State<AppState>, Json(form): Json<ProductForm>) -> ApiResult<(StatusCode, Json<Product>)> {
    Ok((StatusCode::CREATED, Json(admin::create_product(&state, form).await?)))
}

/// PUT /api/admin/products/:id
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(patch): Json<ProductPatch>,
) -> ApiResult<Json<Product>> {
    Ok(Json(admin::update_product(&state, id, patch).await?))
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: ProductStatus,
}

/// PATCH /api/admin/products/:id/status
pub async fn set_product_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(change): Json<StatusChange>,
) -> ApiResult<StatusCode> {
    admin::set_product_status(&state, id, change.status).await?;
    Ok(StatusCode::NO_CONTENT)
}
