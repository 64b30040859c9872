//! Toss Payments REST client (no SDK dependency).

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::config::TossConfig;
use crate::domain::value_objects::Won;

/// The parts of a Toss payment object the saga checks.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub payment_key: String,
    pub order_id: String,
    pub status: String,
    pub total_amount: i64,
    #[serde(default)]
    pub method: Option<String>,
}

impl Payment {
    pub fn is_done(&self) -> bool { self.status == "DONE" }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("payment gateway rejected the request: {code} {message}")]
    Rejected { code: String, message: String },
    #[error("payment gateway unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn confirm(&self, payment_key: &str, order_id: Uuid, amount: Won) -> Result<Payment, GatewayError>;
    async fn fetch(&self, payment_key: &str) -> Result<Payment, GatewayError>;
}

pub struct TossClient {
    http: reqwest::Client,
    config: TossConfig,
}

#[derive(Deserialize)]
struct TossFailure {
    code: String,
    message: String,
}

impl TossClient {
    pub fn new(http: reqwest::Client, config: TossConfig) -> Self { Self { http, config } }

    async fn read(response: reqwest::Response) -> Result<Payment, GatewayError> {
        if response.status().is_success() {
            return Ok(response.json::<Payment>().await?);
        }
        let status = response.status();
        let failure = response.json::<TossFailure>().await.unwrap_or(TossFailure { code: status.as_str().to_string(), message: "unexpected response".into() });
        Err(GatewayError::Rejected { code: failure.code, message: failure.message })
    }
}

#[async_trait]
impl PaymentGateway for TossClient {
    async fn confirm(&self, payment_key: &str, order_id: Uuid, amount: Won) -> Result<Payment, GatewayError> {
        tracing::info!(%order_id, payment_key, amount = amount.value(), "confirming payment with Toss");
        let response = self
            .http
            .post(format!("{}/v1/payments/confirm", self.config.api_base))
            .basic_auth(&self.config.secret_key, Some(""))
            .json(&serde_json::json!({
                "paymentKey": payment_key,
                "orderId": order_id.to_string(),
                "amount": amount.value(),
            }))
            .send()
            .await?;
        Self::read(response).await
    }

    async fn fetch(&self, payment_key: &str) -> Result<Payment, GatewayError> {
        let response = self
            .http
            .get(format!("{}/v1/payments/{payment_key}", self.config.api_base))
            .basic_auth(&self.config.secret_key, Some(""))
            .send()
            .await?;
        Self::read(response).await
    }
}
