//! The signed-in buyer's profile.

use axum::{extract::State, Json};

use crate::domain::aggregates::{User, UserContactUpdate};
use crate::error::ApiResult;
use crate::services::identity::{self, Me};
use crate::services::Session;
use crate::AppState;

/// GET /api/users/me
pub async fn get_me(State(state): State<AppState>, session: Session) -> ApiResult<Json<Me>> {
    Ok(Json(identity::me(&state, &session).await?))
}

/// PUT /api/users/me
pub async fn update_me(
    State(state): State<AppState>,
    session: Session,
    Json(update): Json<UserContactUpdate>,
) -> ApiResult<Json<User>> {
    Ok(Json(identity::update_me(&state, &session, update).await?))
}
