//! Repository Pattern
//!
//! Services only see these traits. `Database` implements them over PostgreSQL and
//! `MemoryStore` over process memory for tests and database-less development.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::aggregates::{
    BuyerIdentity, NewProduct, NewReview, Order, OrderStatus, Product, ProductFilter, ProductStatus, Review,
    ReviewToken, UnknownStatus, User, VerificationCode,
};
use crate::reporting::{CartLog, OrderFact, PageView};

#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Inserts the row and returns it with its id; the description is still empty.
    async fn insert(&self, product: &NewProduct, now: DateTime<Utc>) -> Result<Product>;
    async fn find(&self, id: i64) -> Result<Option<Product>>;
    async fn find_many(&self, ids: &[i64]) -> Result<Vec<Product>>;
    /// One page of matches, newest first, plus the total match count.
    async fn search(&self, filter: &ProductFilter) -> Result<(Vec<Product>, i64)>;
    async fn save(&self, product: &Product) -> Result<()>;
    async fn set_status(&self, ids: &[i64], status: ProductStatus) -> Result<u64>;
    /// Distinct `(category1, category2)` pairs of products a shopper can see.
    async fn category_pairs(&self) -> Result<Vec<(String, Option<String>)>>;
    async fn brands(&self) -> Result<Vec<String>>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<()>;
    async fn find(&self, id: Uuid) -> Result<Option<Order>>;
    /// Writes `order` only if the stored version still equals `order.version`,
    /// bumping it. `false` means someone else wrote first.
    async fn update(&self, order: &Order) -> Result<bool>;
    /// Orders past the temp stage that belong to `buyer`, newest first.
    async fn list_for_buyer(&self, buyer: &BuyerIdentity) -> Result<Vec<Order>>;
    async fn list(&self, status: Option<OrderStatus>) -> Result<Vec<Order>>;
    async fn facts_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<OrderFact>>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert or overwrite the contact fields of the user with this Kakao id.
    async fn upsert(&self, user: &User) -> Result<User>;
    async fn find(&self, kakao_id: &str) -> Result<Option<User>>;
    async fn save(&self, user: &User) -> Result<()>;
}

#[async_trait]
pub trait VerificationRepository: Send + Sync {
    async fn insert(&self, phone: &str, code: &str, now: DateTime<Utc>) -> Result<VerificationCode>;
    async fn latest_unverified(&self, phone: &str, code: &str) -> Result<Option<VerificationCode>>;
    /// Flips `verified` on one row. `false` when it was already set.
    async fn mark_verified(&self, id: i64) -> Result<bool>;
}

#[async_trait]
pub trait ReviewRepository: Send + Sync {
    /// Stores the token unless one exists for the same order and product; returns whichever is stored.
    async fn insert_token(&self, token: &ReviewToken) -> Result<ReviewToken>;
    async fn find_token(&self, token: &str) -> Result<Option<ReviewToken>>;
    async fn mark_token_used(&self, token: &str, now: DateTime<Utc>) -> Result<bool>;
    async fn find_for_product(&self, product_id: i64) -> Result<Option<Review>>;
    /// `None` when the product already has a review.
    async fn insert_review(&self, review: &NewReview, now: DateTime<Utc>) -> Result<Option<Review>>;
}

#[async_trait]
pub trait EventLogRepository: Send + Sync {
    async fn insert_page_view(&self, view: &PageView) -> Result<()>;
    async fn insert_cart_log(&self, log: &CartLog) -> Result<()>;
    async fn page_views_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<PageView>>;
    async fn cart_logs_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<CartLog>>;
}

/// Steps of the payment saga, in the order they run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStep {
    GatewayConfirmed,
    OrderPaid,
    ProductsSold,
}

impl PaymentStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GatewayConfirmed => "gateway_confirmed",
            Self::OrderPaid => "order_paid",
            Self::ProductsSold => "products_sold",
        }
    }
}

impl FromStr for PaymentStep {
    type Err = UnknownStatus;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gateway_confirmed" => Ok(Self::GatewayConfirmed),
            "order_paid" => Ok(Self::OrderPaid),
            "products_sold" => Ok(Self::ProductsSold),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for PaymentStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Claim {
    /// The caller now owns the step and must `complete` or `release` it. A pending
    /// claim older than `stale_before` is handed over as well.
    Acquired,
    /// Another request holds the step.
    InProgress,
    Done { payment_key: String },
}

/// Idempotency ledger for the payment saga, keyed by `(order_id, step)`.
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    async fn claim(&self, order_id: Uuid, step: PaymentStep, payment_key: &str, now: DateTime<Utc>, stale_before: DateTime<Utc>) -> Result<Claim>;
    async fn complete(&self, order_id: Uuid, step: PaymentStep, now: DateTime<Utc>) -> Result<()>;
    async fn release(&self, order_id: Uuid, step: PaymentStep) -> Result<()>;
    /// Mark a step done whether or not it was claimed.
    async fn record(&self, order_id: Uuid, step: PaymentStep, payment_key: &str, now: DateTime<Utc>) -> Result<()>;
    async fn completed(&self, order_id: Uuid) -> Result<Vec<PaymentStep>>;
}

#[async_trait]
pub trait StorageHealth: Send + Sync {
    fn backend(&self) -> &'static str;
    async fn ping(&self) -> Result<()>;
}
