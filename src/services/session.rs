//! Session tokens and the extractor that reads them.
//!
//! A session is an HS256 JWT in an HTTP-only `session` cookie, valid for 7 days.
//! Expiry is checked against the app clock rather than by `jsonwebtoken`.

use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::domain::aggregates::BuyerIdentity;
use crate::domain::value_objects::PhoneNumber;
use crate::error::ApiError;
use crate::AppState;

pub const COOKIE_NAME: &str = "session";
pub const SESSION_DAYS: i64 = 7;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Kakao,
    Phone,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Kakao id or normalised phone number, depending on `provider`.
    pub sub: String,
    pub provider: Provider,
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

/// The signed-in buyer behind a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub identity: BuyerIdentity,
    pub claims: SessionClaims,
}

#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    secure_cookie: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session token is invalid: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("session expired")]
    Expired,
    #[error("session subject is malformed")]
    Malformed,
}

impl SessionKeys {
    pub fn new(secret: &str, secure_cookie: bool) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            secure_cookie,
        }
    }

    pub fn issue(&self, identity: &BuyerIdentity, nickname: Option<String>, email: Option<String>, phone: Option<String>, now: DateTime<Utc>) -> Result<String, SessionError> {
        let (sub, provider) = match identity {
            BuyerIdentity::Kakao { kakao_id } => (kakao_id.clone(), Provider::Kakao),
            BuyerIdentity::Phone { phone } => (phone.as_str().to_string(), Provider::Phone),
        };
        let claims = SessionClaims {
            sub,
            provider,
            nickname,
            email,
            phone,
            iat: now.timestamp(),
            exp: (now + Duration::days(SESSION_DAYS)).timestamp(),
        };
        Ok(jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<Session, SessionError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        let claims = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &validation)?.claims;
        if claims.exp <= now.timestamp() {
            return Err(SessionError::Expired);
        }
        let identity = match claims.provider {
            Provider::Kakao if !claims.sub.is_empty() => BuyerIdentity::Kakao { kakao_id: claims.sub.clone() },
            Provider::Phone => BuyerIdentity::Phone { phone: PhoneNumber::parse(&claims.sub).map_err(|_| SessionError::Malformed)? },
            Provider::Kakao => return Err(SessionError::Malformed),
        };
        Ok(Session { identity, claims })
    }

    pub fn cookie(&self, token: &str) -> String {
        format!("{COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}", SESSION_DAYS * 86_400, self.secure_suffix())
    }

    pub fn clear_cookie(&self) -> String {
        format!("{COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0{}", self.secure_suffix())
    }

    fn secure_suffix(&self) -> &'static str {
        if self.secure_cookie { "; Secure" } else { "" }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        tracing::error!("session signing failed: {err}");
        ApiError::Internal
    }
}

/// Value of the `session` cookie, if the request carries one.
pub fn session_cookie(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get_all(axum::http::header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == COOKIE_NAME)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

#[axum::async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<Session>() {
            return Ok(session.clone());
        }
        let token = session_cookie(parts).ok_or(ApiError::Unauthorized("login required"))?;
        let session = state.sessions.verify(token, state.clock.now()).map_err(|e| {
            tracing::debug!(uri = %parts.uri, "session rejected: {e}");
            ApiError::Unauthorized("login required")
        })?;
        parts.extensions.insert(session.clone());
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> SessionKeys { SessionKeys::new("test-secret", false) }

    #[test]
    fn phone_session_round_trip() {
        let now = Utc::now();
        let identity = BuyerIdentity::Phone { phone: PhoneNumber::parse("010-1234-5678").unwrap() };
        let token = keys().issue(&identity, None, None, Some("01012345678".into()), now).unwrap();
        let session = keys().verify(&token, now + Duration::days(6)).unwrap();
        assert_eq!(session.identity, identity);
        assert_eq!(session.claims.provider, Provider::Phone);
    }

    #[test]
    fn sessions_expire_after_seven_days() {
        let now = Utc::now();
        let identity = BuyerIdentity::Kakao { kakao_id: "42".into() };
        let token = keys().issue(&identity, Some("하나".into()), None, None, now).unwrap();
        assert!(matches!(keys().verify(&token, now + Duration::days(7)), Err(SessionError::Expired)));
        assert!(matches!(SessionKeys::new("other", false).verify(&token, now), Err(SessionError::Invalid(_))));
    }

    #[test]
    fn cookie_attributes() {
        assert_eq!(keys().cookie("abc"), "session=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=604800");
        assert!(SessionKeys::new("s", true).clear_cookie().ends_with("Max-Age=0; Secure"));
    }
}
