//! Who is buying: phone verification, Kakao login and the profile behind a session.

use serde::{Deserialize, Serialize};

use crate::domain::aggregates::verification::{check, generate_code};
use crate::domain::aggregates::{BuyerIdentity, User, UserContactUpdate, VerificationError};
use crate::domain::value_objects::PhoneNumber;
use crate::error::{ApiError, ApiResult};
use crate::services::session::Session;
use crate::services::sms::verification_text;
use crate::AppState;

// ============ Phone verification ============

#[derive(Debug, Clone, Deserialize)]
pub struct OtpRequest {
    pub phone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtpVerifyRequest {
    pub phone: String,
    pub code: String,
}

/// Stores a fresh code for `phone`, then texts it. The row is kept even when the
/// SMS provider fails.
pub async fn request_code(state: &AppState, request: OtpRequest) -> ApiResult<PhoneNumber> {
    let phone = PhoneNumber::parse(&request.phone)?;
    let code = generate_code();
    state.repos.verifications.insert(phone.as_str(), &code, state.clock.now()).await?;

    state.sms.send(&phone, &verification_text(&code)).await.map_err(|e| {
        tracing::warn!(phone = phone.as_str(), "verification sms failed: {e}");
        ApiError::upstream("sms", e)
    })?;
    tracing::info!(phone = phone.as_str(), "verification code sent");
    Ok(phone)
}

/// Checks the newest matching code and, if it is still valid, spends it and
/// returns a signed phone session.
pub async fn verify_code(state: &AppState, request: OtpVerifyRequest) -> ApiResult<(PhoneNumber, String)> {
    let phone = PhoneNumber::parse(&request.phone)?;
    let now = state.clock.now();
    let candidate = state.repos.verifications.latest_unverified(phone.as_str(), request.code.trim()).await?;
    let id = check(candidate.as_ref(), now).map_err(|e| {
        tracing::info!(phone = phone.as_str(), "verification failed: {e}");
        e
    })?;
    if !state.repos.verifications.mark_verified(id).await? {
        return Err(VerificationError::Incorrect.into());
    }

    let identity = BuyerIdentity::Phone { phone: phone.clone() };
    let token = state.sessions.issue(&identity, None, None, Some(phone.as_str().to_string()), now)?;
    tracing::info!(phone = phone.as_str(), "phone verified");
    Ok((phone, token))
}

// ============ Kakao ============

/// Exchange → profile → upsert → session. Every failure collapses to `login failed`.
pub async fn kakao_login(state: &AppState, code: &str) -> ApiResult<(User, String)> {
    const FAILED: ApiError = ApiError::Unauthorized("login failed");

    let code = code.trim();
    if code.is_empty() {
        return Err(FAILED);
    }
    let access_token = state.identity.exchange_code(code).await.map_err(|e| {
        tracing::warn!("kakao token exchange failed: {e}");
        FAILED
    })?;
    let profile = state.identity.profile(&access_token).await.map_err(|e| {
        tracing::warn!("kakao profile lookup failed: {e}");
        FAILED
    })?;
    let address = state.identity.shipping_address(&access_token).await.unwrap_or_else(|e| {
        tracing::info!(kakao_id = %profile.id, "no shipping address: {e}");
        None
    });

    let now = state.clock.now();
    let user = state
        .repos
        .users
        .upsert(&User {
            kakao_id: profile.id.clone(),
            nickname: profile.nickname.clone(),
            email: profile.email.clone(),
            phone: profile.phone.clone(),
            address,
            created_at: now,
            updated_at: now,
        })
        .await
        .map_err(|e| {
            tracing::error!(kakao_id = %profile.id, "user upsert failed: {e:?}");
            FAILED
        })?;

    let identity = BuyerIdentity::Kakao { kakao_id: user.kakao_id.clone() };
    let token = state.sessions.issue(&identity, user.nickname.clone(), user.email.clone(), user.phone.clone(), now)?;
    tracing::info!(kakao_id = %user.kakao_id, "kakao login");
    Ok((user, token))
}

// ============ Profile ============

#[derive(Debug, Clone, Serialize)]
pub struct Me {
    pub identity: BuyerIdentity,
    pub nickname: Option<String>,
    pub phone: Option<String>,
    /// Stored profile; only Kakao buyers have one.
    pub user: Option<User>,
}

pub async fn me(state: &AppState, session: &Session) -> ApiResult<Me> {
    let user = match session.identity.kakao_id() {
        Some(kakao_id) => state.repos.users.find(kakao_id).await?,
        None => None,
    };
    Ok(Me {
        identity: session.identity.clone(),
        nickname: user.as_ref().and_then(|u| u.nickname.clone()).or_else(|| session.claims.nickname.clone()),
        phone: user.as_ref().and_then(|u| u.phone.clone()).or_else(|| session.claims.phone.clone()),
        user,
    })
}

pub async fn update_me(state: &AppState, session: &Session, update: UserContactUpdate) -> ApiResult<User> {
    let kakao_id = session.identity.kakao_id().ok_or(ApiError::Forbidden)?;
    let mut user = state.repos.users.find(kakao_id).await?.ok_or(ApiError::NotFound("User"))?;
    user.apply(update, state.clock.now());
    state.repos.users.save(&user).await?;
    Ok(user)
}
