//! Kakao OAuth client: authorize redirect, code exchange, profile lookup.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::KakaoConfig;
use crate::domain::value_objects::PhoneNumber;

/// What the shop keeps from a Kakao account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KakaoProfile {
    pub id: String,
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("kakao rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("kakao unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn authorize_url(&self) -> String;
    async fn exchange_code(&self, code: &str) -> Result<String, IdentityError>;
    async fn profile(&self, access_token: &str) -> Result<KakaoProfile, IdentityError>;
    /// Default shipping address, when the user consented to share one.
    async fn shipping_address(&self, access_token: &str) -> Result<Option<String>, IdentityError>;
}

pub struct KakaoClient {
    http: reqwest::Client,
    config: KakaoConfig,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct MeResponse {
    id: i64,
    #[serde(default)]
    kakao_account: KakaoAccount,
    #[serde(default)]
    properties: Properties,
}

#[derive(Default, Deserialize)]
struct KakaoAccount {
    email: Option<String>,
    phone_number: Option<String>,
    #[serde(default)]
    profile: Properties,
}

#[derive(Default, Deserialize)]
struct Properties {
    nickname: Option<String>,
}

#[derive(Deserialize)]
struct ShippingAddresses {
    #[serde(default)]
    shipping_addresses: Vec<ShippingAddress>,
}

#[derive(Deserialize)]
struct ShippingAddress {
    #[serde(default)]
    is_default: bool,
    base_address: Option<String>,
    detail_address: Option<String>,
}

impl From<MeResponse> for KakaoProfile {
    fn from(me: MeResponse) -> Self {
        let phone = me.kakao_account.phone_number.as_deref().and_then(|p| PhoneNumber::parse(p).ok()).map(|p| p.as_str().to_string());
        KakaoProfile {
            id: me.id.to_string(),
            nickname: me.kakao_account.profile.nickname.or(me.properties.nickname),
            email: me.kakao_account.email,
            phone,
        }
    }
}

impl KakaoClient {
    pub fn new(http: reqwest::Client, config: KakaoConfig) -> Self { Self { http, config } }

    async fn checked(response: reqwest::Response) -> Result<reqwest::Response, IdentityError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(IdentityError::Rejected { status, body })
    }
}

#[async_trait]
impl IdentityProvider for KakaoClient {
    fn authorize_url(&self) -> String {
        let base = format!("{}/oauth/authorize", self.config.auth_base);
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("response_type", "code"),
        ];
        reqwest::Url::parse_with_params(&base, &params).map(String::from).unwrap_or(base)
    }

    async fn exchange_code(&self, code: &str) -> Result<String, IdentityError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code", code),
        ];
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret", secret.as_str()));
        }
        let response = self.http.post(format!("{}/oauth/token", self.config.auth_base)).form(&form).send().await?;
        Ok(Self::checked(response).await?.json::<TokenResponse>().await?.access_token)
    }

    async fn profile(&self, access_token: &str) -> Result<KakaoProfile, IdentityError> {
        let response = self.http.get(format!("{}/v2/user/me", self.config.api_base)).bearer_auth(access_token).send().await?;
        Ok(Self::checked(response).await?.json::<MeResponse>().await?.into())
    }

    async fn shipping_address(&self, access_token: &str) -> Result<Option<String>, IdentityError> {
        let response = self
            .http
            .get(format!("{}/v1/user/shipping_address", self.config.api_base))
            .bearer_auth(access_token)
            .send()
            .await?;
        let addresses = Self::checked(response).await?.json::<ShippingAddresses>().await?.shipping_addresses;
        let chosen = addresses.iter().find(|a| a.is_default).or(addresses.first());
        Ok(chosen.and_then(|a| {
            let base = a.base_address.as_deref()?.trim();
            Some(match a.detail_address.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
                Some(detail) => format!("{base} {detail}"),
                None => base.to_string(),
            })
        }))
    }
}
