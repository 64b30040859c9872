//! Review links sent to buyers after delivery.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::domain::aggregates::Review;
use crate::error::ApiResult;
use crate::services::reviews::{self, ReviewSubmission, TokenInfo};
use crate::AppState;

/// GET /api/reviews/tokens/:token
pub async fn inspect_token(State(state): State<AppState>, Path(token): Path<String>) -> ApiResult<Json<TokenInfo>> {
    Ok(Json(reviews::inspect_review_token(&state, &token).await?))
}

/// POST /api/reviews
pub async fn submit_review(
    State(state): State<AppState>,
    Json(submission): Json<ReviewSubmission>,
) -> ApiResult<(StatusCode, Json<Review>)> {
    Ok((StatusCode::CREATED, Json(reviews::submit_review(&state, submission).await?)))
}
