//! Login flows. Both end by setting the `session` cookie.

use axum::{
    extract::{Query, State},
    http::{header::SET_COOKIE, StatusCode},
    response::{AppendHeaders, IntoResponse, Redirect},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::domain::aggregates::verification::CODE_TTL_MINUTES;
use crate::error::{ApiError, ApiResult};
use crate::services::identity::{self, OtpRequest, OtpVerifyRequest};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct OtpSent {
    pub phone: String,
    pub expires_in_seconds: i64,
}

/// POST /api/auth/otp/request
pub async fn request_otp(State(state): State<AppState>, Json(request): Json<OtpRequest>) -> ApiResult<Json<OtpSent>> {
    let phone = identity::request_code(&state, request).await?;
    Ok(Json(OtpSent {
        phone: phone.as_str().to_string(),
        expires_in_seconds: CODE_TTL_MINUTES * 60,
    }))
}

#[derive(Debug, Serialize)]
pub struct OtpVerified {
    pub verified: bool,
    pub phone: String,
}

/// POST /api/auth/otp/verify
pub async fn verify_otp(State(state): State<AppState>, Json(request): Json<OtpVerifyRequest>) -> ApiResult<impl IntoResponse> {
    let (phone, token) = identity::verify_code(&state, request).await?;
    Ok((
        AppendHeaders([(SET_COOKIE, state.sessions.cookie(&token))]),
        Json(OtpVerified { verified: true, phone: phone.as_str().to_string() }),
    ))
}

/// GET /api/auth/kakao/authorize
pub async fn kakao_authorize(State(state): State<AppState>) -> Redirect {
    Redirect::temporary(&state.identity.authorize_url())
}

#[derive(Debug, Deserialize)]
pub struct KakaoCallback {
    pub code: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// GET /api/auth/kakao/callback?code=
///
/// Redirects to the storefront home once the session cookie is set.
pub async fn kakao_callback(State(state): State<AppState>, Query(callback): Query<KakaoCallback>) -> ApiResult<impl IntoResponse> {
    if let Some(error) = callback.error {
        tracing::warn!(error, description = callback.error_description.as_deref().unwrap_or(""), "kakao authorization denied");
        return Err(ApiError::Unauthorized("login failed"));
    }
    let code = callback.code.ok_or(ApiError::Unauthorized("login failed"))?;
    let (_, token) = identity::kakao_login(&state, &code).await?;
    Ok((AppendHeaders([(SET_COOKIE, state.sessions.cookie(&token))]), Redirect::to(&state.config.storefront_home())))
}

/// POST /api/auth/logout
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::NO_CONTENT, AppendHeaders([(SET_COOKIE, state.sessions.clear_cookie())]))
}
