//! One-time review links per purchased item.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::{NewReview, Review, ReviewError, ReviewToken};
use crate::error::{ApiError, ApiResult};
use crate::services::checkout::load_order;
use crate::services::session::Session;
use crate::AppState;

/// One token per line of a paid order; tokens that already exist are returned as-is.
pub async fn issue_review_tokens(state: &AppState, order_id: Uuid, session: &Session) -> ApiResult<Vec<ReviewToken>> {
    let order = load_order(state, order_id).await?;
    if !order.is_owned_by(&session.identity) {
        return Err(ApiError::Forbidden);
    }
    if !order.status.is_settled() {
        return Err(ApiError::rejected("ORDER_NOT_PAID", format!("order is {}", order.status)));
    }

    let now = state.clock.now();
    let mut tokens = Vec::with_capacity(order.lines.len());
    for product_id in order.product_ids() {
        tokens.push(state.repos.reviews.insert_token(&ReviewToken::issue(order_id, product_id, now)).await?);
    }
    Ok(tokens)
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenInfo {
    pub order_id: Uuid,
    pub product_id: i64,
    pub product_name: Option<String>,
    pub used: bool,
    pub already_reviewed: bool,
}

pub async fn inspect_review_token(state: &AppState, token: &str) -> ApiResult<TokenInfo> {
    let token = state.repos.reviews.find_token(token).await?.ok_or(ApiError::NotFound("Review token"))?;
    let product_name = state.repos.products.find(token.product_id).await?.map(|p| p.name);
    let already_reviewed = state.repos.reviews.find_for_product(token.product_id).await?.is_some();
    Ok(TokenInfo { order_id: token.order_id, product_id: token.product_id, product_name, used: token.is_used(), already_reviewed })
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewSubmission {
    pub token: String,
    pub content: String,
    pub rating: u8,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

pub async fn submit_review(state: &AppState, submission: ReviewSubmission) -> ApiResult<Review> {
    let token = state.repos.reviews.find_token(&submission.token).await?.ok_or(ApiError::NotFound("Review token"))?;
    if state.repos.reviews.find_for_product(token.product_id).await?.is_some() {
        return Err(ApiError::Conflict("this product already has a review".into()));
    }
    let review = NewReview::from_token(&token, &submission.content, submission.rating, submission.nickname, submission.image_url)?;

    // Spend the token first so a losing concurrent submission stores nothing.
    let now = state.clock.now();
    if !state.repos.reviews.mark_token_used(&token.token, now).await? {
        tracing::warn!(product_id = token.product_id, "review token was spent concurrently");
        return Err(ReviewError::TokenUsed.into());
    }
    let stored = state
        .repos
        .reviews
        .insert_review(&review, now)
        .await?
        .ok_or_else(|| ApiError::Conflict("this product already has a review".into()))?;
    tracing::info!(product_id = stored.product_id, order_id = %stored.order_id, rating = stored.rating, "review stored");
    Ok(stored)
}

pub async fn product_review(state: &AppState, product_id: i64) -> ApiResult<Option<Review>> {
    Ok(state.repos.reviews.find_for_product(product_id).await?)
}
