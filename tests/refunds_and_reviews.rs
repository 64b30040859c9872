mod common;

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use common::{TestApp, BUYER_PHONE};
use kidswear_store::db::ReviewRepository;
use kidswear_store::domain::aggregates::{NewReview, ProductStatus, Review, ReviewToken};
use kidswear_store::domain::events::{DomainEvent, ProductEvent};
use kidswear_store::MemoryStore;

/// Review storage where another request spends the token right after it is read.
struct ContendedReviews {
    store: Arc<MemoryStore>,
}

#[async_trait]
impl ReviewRepository for ContendedReviews {
    async fn insert_token(&self, token: &ReviewToken) -> anyhow::Result<ReviewToken> { self.store.insert_token(token).await }

    async fn find_token(&self, token: &str) -> anyhow::Result<Option<ReviewToken>> {
        let found = self.store.find_token(token).await?;
        self.store.mark_token_used(token, Utc::now()).await?;
        Ok(found)
    }

    async fn mark_token_used(&self, token: &str, now: DateTime<Utc>) -> anyhow::Result<bool> { self.store.mark_token_used(token, now).await }

    async fn find_for_product(&self, product_id: i64) -> anyhow::Result<Option<Review>> { self.store.find_for_product(product_id).await }

    async fn insert_review(&self, review: &NewReview, now: DateTime<Utc>) -> anyhow::Result<Option<Review>> {
        self.store.insert_review(review, now).await
    }
}

async fn mark_delivered(app: &TestApp, order_id: Uuid) {
    let patched = app
        .send(
            Method::PATCH,
            &format!("/api/admin/orders/{order_id}"),
            Some(json!({ "delivery": { "status": "delivered" } })),
            &[app.admin_auth()],
        )
        .await;
    assert_eq!(patched.status, StatusCode::OK, "{:?}", patched.body);
    assert!(patched.body["delivery_complete_date"].is_string());
}

async fn toggle(app: &TestApp, order_id: Uuid, product_id: i64, phone: &str) -> common::TestResponse {
    app.send(Method::POST, &format!("/api/orders/{order_id}/refunds/{product_id}"), None, &[app.phone_cookie(phone)])
        .await
}

#[tokio::test]
async fn refund_toggles_on_and_off_within_the_window() {
    let app = TestApp::new();
    app.seed_product(1, "원피스", 30_000, 0);
    app.seed_product(2, "가디건", 25_000, 0);
    let order_id = app.paid_order(&[1, 2]).await;
    mark_delivered(&app, order_id).await;

    app.clock.advance(Duration::days(10));
    let mut events = app.state.events.subscribe();
    let requested = toggle(&app, order_id, 1, BUYER_PHONE).await;
    assert_eq!(requested.status, StatusCode::OK, "{:?}", requested.body);
    assert_eq!(requested.body["action"], "requested");
    assert_eq!(requested.body["order_status"], "환불요청");
    assert_eq!(requested.body["refund_product_ids"], json!([1]));
    assert_eq!(app.get("/api/products/1").await.body["status"], "환불요청");

    let cancelled = toggle(&app, order_id, 1, BUYER_PHONE).await;
    assert_eq!(cancelled.body["action"], "cancelled");
    assert_eq!(cancelled.body["order_status"], "결제완료");
    assert_eq!(app.get("/api/products/1").await.body["status"], "판매완료");

    let mut product_events = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let DomainEvent::Product(product) = event {
            product_events.push(product);
        }
    }
    assert_eq!(
        product_events,
        vec![
            ProductEvent::StatusChanged { product_id: 1, status: ProductStatus::RefundRequested },
            ProductEvent::StatusChanged { product_id: 1, status: ProductStatus::Sold },
        ]
    );
}

#[tokio::test]
async fn refund_window_closes_after_ten_days() {
    let app = TestApp::new();
    app.seed_product(1, "원피스", 30_000, 0);
    let order_id = app.paid_order(&[1]).await;

    let early = toggle(&app, order_id, 1, BUYER_PHONE).await;
    assert_eq!(early.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(early.code(), "NOT_DELIVERED");

    mark_delivered(&app, order_id).await;
    app.clock.advance(Duration::days(10) + Duration::seconds(1));
    let late = toggle(&app, order_id, 1, BUYER_PHONE).await;
    assert_eq!(late.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(late.code(), "REFUND_WINDOW_CLOSED");

    let order = app.send(Method::GET, &format!("/api/orders/{order_id}"), None, &[app.phone_cookie(BUYER_PHONE)]).await;
    assert_eq!(order.body["status"], "결제완료");
    assert_eq!(order.body["refund_product_ids"], json!([]));
}

#[tokio::test]
async fn refunds_are_limited_to_the_owner_and_the_order_lines() {
    let app = TestApp::new();
    app.seed_product(1, "원피스", 30_000, 0);
    app.seed_product(9, "다른 상품", 10_000, 0);
    let order_id = app.paid_order(&[1]).await;
    mark_delivered(&app, order_id).await;

    assert_eq!(toggle(&app, order_id, 1, "01055556666").await.status, StatusCode::FORBIDDEN);
    assert_eq!(toggle(&app, order_id, 9, BUYER_PHONE).await.status, StatusCode::NOT_FOUND);

    let kakao = app
        .send(Method::POST, &format!("/api/orders/{order_id}/refunds/1"), None, &[app.kakao_cookie("kakao-1")])
        .await;
    assert_eq!(kakao.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn review_link_is_issued_once_and_spent_once() {
    let app = TestApp::new();
    app.seed_product(1, "원피스", 30_000, 0);
    app.seed_product(2, "가디건", 25_000, 0);
    let order_id = app.paid_order(&[1, 2]).await;
    let issue_uri = format!("/api/orders/{order_id}/review-tokens");

    let issued = app.send(Method::POST, &issue_uri, None, &[app.phone_cookie(BUYER_PHONE)]).await;
    assert_eq!(issued.status, StatusCode::OK, "{:?}", issued.body);
    let tokens = issued.body.as_array().unwrap().clone();
    assert_eq!(tokens.len(), 2);
    let token = tokens.iter().find(|t| t["product_id"] == 1).unwrap()["token"].as_str().unwrap().to_string();
    assert_eq!(token.len(), 32);

    let reissued = app.send(Method::POST, &issue_uri, None, &[app.phone_cookie(BUYER_PHONE)]).await;
    assert!(reissued.body.as_array().unwrap().iter().any(|t| t["token"] == token.as_str()));

    let info = app.get(&format!("/api/reviews/tokens/{token}")).await;
    assert_eq!(info.body["product_name"], "원피스");
    assert_eq!(info.body["already_reviewed"], false);

    let review = json!({ "token": token, "content": "  사이즈 딱 맞아요  ", "rating": 5, "nickname": "민지맘" });
    let written = app.post("/api/reviews", review.clone()).await;
    assert_eq!(written.status, StatusCode::CREATED, "{:?}", written.body);
    assert_eq!(written.body["content"], "사이즈 딱 맞아요");

    let duplicate = app.post("/api/reviews", review).await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let shown = app.get("/api/products/1/review").await;
    assert_eq!(shown.body["rating"], 5);
    assert!(app.get("/api/products/2/review").await.body.is_null());

    let info = app.get(&format!("/api/reviews/tokens/{token}")).await;
    assert_eq!(info.body["used"], true);
    assert_eq!(info.body["already_reviewed"], true);
}

#[tokio::test]
async fn losing_a_token_race_stores_no_review() {
    let mut app = TestApp::new();
    app.seed_product(1, "원피스", 30_000, 0);
    let order_id = app.paid_order(&[1]).await;
    let issued = app
        .send(Method::POST, &format!("/api/orders/{order_id}/review-tokens"), None, &[app.phone_cookie(BUYER_PHONE)])
        .await;
    let token = issued.body[0]["token"].as_str().unwrap().to_string();

    app.state.repos.reviews = Arc::new(ContendedReviews { store: app.store.clone() });
    let lost = app.post("/api/reviews", json!({ "token": token, "content": "좋아요", "rating": 5 })).await;
    assert_eq!(lost.status, StatusCode::CONFLICT);
    assert!(app.get("/api/products/1/review").await.body.is_null());
}

#[tokio::test]
async fn review_input_is_validated() {
    let app = TestApp::new();
    app.seed_product(1, "원피스", 30_000, 0);
    let order_id = app.paid_order(&[1]).await;
    let issued = app
        .send(Method::POST, &format!("/api/orders/{order_id}/review-tokens"), None, &[app.phone_cookie(BUYER_PHONE)])
        .await;
    let token = issued.body[0]["token"].as_str().unwrap().to_string();

    let bad_rating = app.post("/api/reviews", json!({ "token": token, "content": "좋아요", "rating": 6 })).await;
    assert_eq!(bad_rating.status, StatusCode::BAD_REQUEST);
    let blank = app.post("/api/reviews", json!({ "token": token, "content": "   ", "rating": 4 })).await;
    assert_eq!(blank.status, StatusCode::BAD_REQUEST);
    let unknown = app.post("/api/reviews", json!({ "token": "nope", "content": "좋아요", "rating": 4 })).await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unpaid_orders_get_no_review_links() {
    let app = TestApp::new();
    app.seed_product(1, "원피스", 30_000, 0);
    let (order_id, _) = app.pending_order(&[1], None).await;

    let issued = app
        .send(Method::POST, &format!("/api/orders/{order_id}/review-tokens"), None, &[app.phone_cookie(BUYER_PHONE)])
        .await;
    assert_eq!(issued.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(issued.code(), "ORDER_NOT_PAID");
}
