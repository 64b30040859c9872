//! Application services: one module per storefront flow, plus the outbound clients.

pub mod admin;
pub mod catalog;
pub mod checkout;
pub mod events;
pub mod identity;
pub mod kakao;
pub mod refunds;
pub mod reports;
pub mod reviews;
pub mod session;
pub mod sms;
pub mod toss;
pub mod tracking;

use std::time::Duration;

pub use events::EventPublisher;
pub use kakao::{IdentityProvider, KakaoClient, KakaoProfile};
pub use session::{Session, SessionKeys};
pub use sms::{CoolSmsClient, SmsSender};
pub use toss::{PaymentGateway, TossClient};

pub const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared client for every outbound call (Toss, Kakao, CoolSMS).
pub fn http_client() -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(OUTBOUND_TIMEOUT)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?)
}
