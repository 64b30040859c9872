//! Catalog endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::domain::aggregates::Review;
use crate::error::ApiResult;
use crate::services::{catalog, reviews};
use crate::services::catalog::{CategoryNode, Page, ProductQuery, ProductView};
use crate::AppState;

/// GET /api/products?category1=&category2=&brand=&q=&page=&per_page=
///
/// Only products on sale (or sold out) are listed; drafts stay hidden.
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> ApiResult<Json<Page<ProductView>>> {
    let filter = query.into_filter(false)?;
    Ok(Json(catalog::search_products(&state, filter).await?))
}

/// GET /api/products/:id
pub async fn get_product(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<ProductView>> {
    Ok(Json(catalog::get_product(&state, id).await?))
}

/// GET /api/products/:id/review
pub async fn get_product_review(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Option<Review>>> {
    Ok(Json(reviews::product_review(&state, id).await?))
}

/// GET /api/categories
pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Json<Vec<CategoryNode>>> {
    Ok(Json(catalog::list_categories(&state).await?))
}

/// GET /api/brands
pub async fn list_brands(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(catalog::list_brands(&state).await?))
}
