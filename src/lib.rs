//! Kidswear Store
//!
//! Storefront and admin API for a resale shop of imported children's clothing.
//!
//! ## Features
//! - Product catalog, categories and brands
//! - Cart pricing with coupons and free-shipping threshold
//! - Phone OTP and Kakao login with signed session cookies
//! - Checkout with a resumable Toss payment saga (redirect and webhook)
//! - Per-item refund requests within 10 days of delivery
//! - One-time review links
//! - Visit logging and admin traffic/funnel reports
//!
//! ## Modules
//!
//! - `config`: environment configuration
//! - `error`: API error type and HTTP mapping
//! - `domain`: aggregates, pricing rules, value objects, events
//! - `db`: repository traits with PostgreSQL and in-memory stores
//! - `services`: one module per flow, plus the outbound clients
//! - `routes`: HTTP handlers
//! - `reporting`: report aggregation

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod clock;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod reporting;
pub mod routes;
pub mod services;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use db::{Database, MemoryStore, Repositories};
pub use error::{ApiError, ApiResult};

use services::{EventPublisher, IdentityProvider, PaymentGateway, SessionKeys, SmsSender};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repos: Repositories,
    pub gateway: Arc<dyn PaymentGateway>,
    pub identity: Arc<dyn IdentityProvider>,
    pub sms: Arc<dyn SmsSender>,
    pub sessions: SessionKeys,
    pub events: EventPublisher,
    pub clock: Arc<dyn Clock>,
}

/// Build the full router.
///
/// ```text
/// GET  /health
///
/// GET  /api/products                       GET  /api/products/:id
/// GET  /api/products/:id/review            GET  /api/categories
/// GET  /api/brands                         POST /api/cart/quote
///
/// POST /api/auth/otp/request               POST /api/auth/otp/verify
/// GET  /api/auth/kakao/authorize           GET  /api/auth/kakao/callback
/// POST /api/auth/logout                    GET|PUT /api/users/me
///
/// GET|POST /api/orders                     GET  /api/orders/:id
/// POST /api/orders/:id/quote               PUT  /api/orders/:id/submit
/// POST /api/orders/:id/refunds/:product_id POST /api/orders/:id/review-tokens
/// POST /api/payments/confirm               POST /api/payments/webhook
///
/// GET  /api/reviews/tokens/:token          POST /api/reviews
/// POST /api/events/page-view               POST /api/events/cart
///
/// /api/admin/...                           (Bearer ADMIN_API_KEY)
/// ```
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(routes::health::health_check))
        // Catalog
        .route("/api/products", get(routes::products::list_products))
        .route("/api/products/:id", get(routes::products::get_product))
        .route("/api/products/:id/review", get(routes::products::get_product_review))
        .route("/api/categories", get(routes::products::list_categories))
        .route("/api/brands", get(routes::products::list_brands))
        .route("/api/cart/quote", post(routes::cart::quote_cart))
        // Identity
        .route("/api/auth/otp/request", post(routes::auth::request_otp))
        .route("/api/auth/otp/verify", post(routes::auth::verify_otp))
        .route("/api/auth/kakao/authorize", get(routes::auth::kakao_authorize))
        .route("/api/auth/kakao/callback", get(routes::auth::kakao_callback))
        .route("/api/auth/logout", post(routes::auth::logout))
        .route("/api/users/me", get(routes::users::get_me).put(routes::users::update_me))
        // Checkout
        .route("/api/orders", get(routes::orders::list_my_orders).post(routes::orders::create_order))
        .route("/api/orders/:id", get(routes::orders::get_order))
        .route("/api/orders/:id/quote", post(routes::orders::quote_order))
        .route("/api/orders/:id/submit", put(routes::orders::submit_order))
        .route("/api/orders/:id/refunds/:product_id", post(routes::orders::toggle_refund))
        .route("/api/orders/:id/review-tokens", post(routes::orders::issue_review_tokens))
        .route("/api/payments/confirm", post(routes::payments::confirm_payment))
        .route("/api/payments/webhook", post(routes::payments::payment_webhook))
        // Reviews and tracking
        .route("/api/reviews", post(routes::reviews::submit_review))
        .route("/api/reviews/tokens/:token", get(routes::reviews::inspect_token))
        .route("/api/events/page-view", post(routes::events::page_view))
        .route("/api/events/cart", post(routes::events::cart_click))
        .nest("/api/admin", routes::admin::router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Development allows any origin; elsewhere only `ALLOWED_ORIGINS`, with
/// credentials so the session cookie travels.
fn cors_layer(config: &Config) -> CorsLayer {
    if config.is_development() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin, "ignoring malformed allowed origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
