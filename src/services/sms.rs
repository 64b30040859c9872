//! CoolSMS sender.
//!
//! Requests are signed with `HMAC-SHA256(api_secret, date + salt)` in the
//! `Authorization` header, as the CoolSMS v4 API expects.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::Sha256;

use crate::config::SmsConfig;
use crate::domain::value_objects::PhoneNumber;

#[derive(Debug, thiserror::Error)]
pub enum SmsError {
    #[error("sms provider rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("sms provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("sms signing failed")]
    Signing,
}

#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, to: &PhoneNumber, text: &str) -> Result<(), SmsError>;
}

pub struct CoolSmsClient {
    http: reqwest::Client,
    config: SmsConfig,
}

impl CoolSmsClient {
    pub fn new(http: reqwest::Client, config: SmsConfig) -> Self { Self { http, config } }
}

/// `Authorization` header value for one request.
pub fn authorization(api_key: &str, api_secret: &str, date: DateTime<Utc>, salt: &str) -> Result<String, SmsError> {
    let date = date.to_rfc3339_opts(SecondsFormat::Millis, true);
    let mut mac = Hmac::<Sha256>::new_from_slice(api_secret.as_bytes()).map_err(|_| SmsError::Signing)?;
    mac.update(date.as_bytes());
    mac.update(salt.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());
    Ok(format!("HMAC-SHA256 apiKey={api_key}, date={date}, salt={salt}, signature={signature}"))
}

pub fn verification_text(code: &str) -> String {
    format!("[키즈웨어] 인증번호 [{code}]를 입력해주세요.")
}

#[async_trait]
impl SmsSender for CoolSmsClient {
    async fn send(&self, to: &PhoneNumber, text: &str) -> Result<(), SmsError> {
        let salt: String = rand::thread_rng().sample_iter(&Alphanumeric).take(32).map(char::from).collect();
        let auth = authorization(&self.config.api_key, &self.config.api_secret, Utc::now(), &salt)?;
        let response = self
            .http
            .post(format!("{}/messages/v4/send", self.config.api_base))
            .header(reqwest::header::AUTHORIZATION, auth)
            .json(&serde_json::json!({
                "message": { "to": to.as_str(), "from": self.config.sender, "text": text }
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SmsError::Rejected { status, body });
        }
        tracing::info!(phone = to.as_str(), "sms sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn authorization_header_shape() {
        let date = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
        let header = authorization("KEY", "SECRET", date, "salt123").unwrap();
        assert!(header.starts_with("HMAC-SHA256 apiKey=KEY, date=2025-05-01T00:00:00.000Z, salt=salt123, signature="));
        let signature = header.rsplit_once("signature=").unwrap().1;
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(header, authorization("KEY", "SECRET", date, "salt123").unwrap());
    }

    #[test]
    fn text_carries_code() {
        assert!(verification_text("123456").contains("123456"));
    }
}
