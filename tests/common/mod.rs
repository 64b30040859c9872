//! Shared harness: the real router over the in-memory store, a fixed clock and
//! fake Toss / Kakao / CoolSMS clients.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use kidswear_store::config::{Environment, KakaoConfig, SmsConfig, TossConfig};
use kidswear_store::domain::aggregates::{BuyerIdentity, Product, ProductStatus};
use kidswear_store::domain::value_objects::{PhoneNumber, Won};
use kidswear_store::reporting::IpExclusion;
use kidswear_store::services::kakao::IdentityError;
use kidswear_store::services::sms::SmsError;
use kidswear_store::services::toss::{GatewayError, Payment};
use kidswear_store::services::{EventPublisher, IdentityProvider, KakaoProfile, PaymentGateway, SessionKeys, SmsSender};
use kidswear_store::{app, AppState, Config, FixedClock, MemoryStore, Repositories};

pub const ADMIN_KEY: &str = "test-admin-key";
pub const BUYER_PHONE: &str = "01012345678";

// ============ Fakes ============

/// Approves every confirm with the requested amount unless told to fail or hang.
#[derive(Default)]
pub struct FakeGateway {
    pub confirm_calls: AtomicUsize,
    pub fail_next: AtomicBool,
    /// The next confirm never answers, like a call cut off by the shopper leaving.
    pub hang_next: AtomicBool,
    pub payments: Mutex<Vec<Payment>>,
}

impl FakeGateway {
    pub fn confirms(&self) -> usize { self.confirm_calls.load(Ordering::SeqCst) }

    /// Make `fetch` report this payment, as the provider would after a widget payment.
    pub fn register(&self, payment_key: &str, order_id: Uuid, amount: i64, status: &str) {
        self.payments.lock().unwrap().push(Payment {
            payment_key: payment_key.to_string(),
            order_id: order_id.to_string(),
            status: status.to_string(),
            total_amount: amount,
            method: Some("카드".to_string()),
        });
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn confirm(&self, payment_key: &str, order_id: Uuid, amount: Won) -> Result<Payment, GatewayError> {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang_next.swap(false, Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(GatewayError::Rejected { code: "PROVIDER_ERROR".into(), message: "temporary failure".into() });
        }
        let payment = Payment {
            payment_key: payment_key.to_string(),
            order_id: order_id.to_string(),
            status: "DONE".to_string(),
            total_amount: amount.value(),
            method: Some("카드".to_string()),
        };
        self.payments.lock().unwrap().push(payment.clone());
        Ok(payment)
    }

    async fn fetch(&self, payment_key: &str) -> Result<Payment, GatewayError> {
        self.payments
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|p| p.payment_key == payment_key)
            .cloned()
            .ok_or_else(|| GatewayError::Rejected { code: "NOT_FOUND_PAYMENT".into(), message: "no such payment".into() })
    }
}

/// Accepts the code `good-code` and returns whatever `profile` currently holds.
pub struct FakeIdentity {
    pub profile: Mutex<KakaoProfile>,
}

impl Default for FakeIdentity {
    fn default() -> Self {
        Self {
            profile: Mutex::new(KakaoProfile {
                id: "kakao-1".to_string(),
                nickname: Some("민지맘".to_string()),
                email: Some("mom@example.com".to_string()),
                phone: Some("01099998888".to_string()),
            }),
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    fn authorize_url(&self) -> String { "https://kauth.example/oauth/authorize?client_id=test".to_string() }

    async fn exchange_code(&self, code: &str) -> Result<String, IdentityError> {
        if code == "good-code" {
            Ok("access-token".to_string())
        } else {
            Err(IdentityError::Rejected { status: 400, body: "invalid_grant".into() })
        }
    }

    async fn profile(&self, _access_token: &str) -> Result<KakaoProfile, IdentityError> {
        Ok(self.profile.lock().unwrap().clone())
    }

    async fn shipping_address(&self, _access_token: &str) -> Result<Option<String>, IdentityError> {
        Err(IdentityError::Rejected { status: 403, body: "no consent".into() })
    }
}

/// Records every message instead of sending it, including the ones it is told to fail.
#[derive(Default)]
pub struct FakeSms {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail: AtomicBool,
}

impl FakeSms {
    /// The 6-digit code in the last message sent to `phone`.
    pub fn last_code(&self, phone: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, _)| to == phone)
            .map(|(_, text)| text.chars().filter(char::is_ascii_digit).collect())
    }
}

#[async_trait]
impl SmsSender for FakeSms {
    async fn send(&self, to: &PhoneNumber, text: &str) -> Result<(), SmsError> {
        self.sent.lock().unwrap().push((to.as_str().to_string(), text.to_string()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(SmsError::Rejected { status: 500, body: "provider down".into() });
        }
        Ok(())
    }
}

// ============ Harness ============

pub fn start_time() -> DateTime<Utc> { Utc.with_ymd_and_hms(2025, 5, 10, 3, 0, 0).unwrap() }

pub fn test_config() -> Config {
    Config {
        port: 0,
        environment: Environment::Development,
        database_url: None,
        nats_url: None,
        session_secret: "test-session-secret".to_string(),
        admin_api_key: ADMIN_KEY.to_string(),
        public_base_url: "http://localhost:3000".to_string(),
        allowed_origins: vec![],
        toss: TossConfig { secret_key: "test_sk".to_string(), api_base: "http://toss.invalid".to_string() },
        kakao: KakaoConfig {
            client_id: "test".to_string(),
            client_secret: None,
            redirect_uri: "http://localhost/api/auth/kakao/callback".to_string(),
            auth_base: "http://kauth.invalid".to_string(),
            api_base: "http://kapi.invalid".to_string(),
        },
        sms: SmsConfig {
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            sender: "01000000000".to_string(),
            api_base: "http://sms.invalid".to_string(),
        },
        ip_exclusion: IpExclusion::default(),
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
    pub gateway: Arc<FakeGateway>,
    pub identity: Arc<FakeIdentity>,
    pub sms: Arc<FakeSms>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn code(&self) -> &str { self.body["code"].as_str().unwrap_or_default() }

    pub fn set_cookie(&self) -> Option<String> {
        self.headers.get(header::SET_COOKIE).map(|v| v.to_str().unwrap().to_string())
    }
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(start_time()));
        let gateway = Arc::new(FakeGateway::default());
        let identity = Arc::new(FakeIdentity::default());
        let sms = Arc::new(FakeSms::default());
        let config = test_config();
        let state = AppState {
            repos: Repositories::from_store(store.clone()),
            gateway: gateway.clone(),
            identity: identity.clone(),
            sms: sms.clone(),
            sessions: SessionKeys::new(&config.session_secret, false),
            events: EventPublisher::disabled(),
            clock: clock.clone(),
            config: Arc::new(config),
        };
        Self { state, store, clock, gateway, identity, sms }
    }

    pub fn router(&self) -> Router { app(self.state.clone()) }

    pub async fn send(&self, method: Method, uri: &str, body: Option<Value>, headers: &[(header::HeaderName, String)]) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        let request = match body {
            Some(json) => builder.header(header::CONTENT_TYPE, "application/json").body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
        TestResponse { status, headers, body }
    }

    pub async fn get(&self, uri: &str) -> TestResponse { self.send(Method::GET, uri, None, &[]).await }

    pub async fn post(&self, uri: &str, body: Value) -> TestResponse { self.send(Method::POST, uri, Some(body), &[]).await }

    /// `Cookie` header for a phone-verified buyer, minted directly.
    pub fn phone_cookie(&self, phone: &str) -> (header::HeaderName, String) {
        let identity = BuyerIdentity::Phone { phone: PhoneNumber::parse(phone).unwrap() };
        let token = self.state.sessions.issue(&identity, None, None, Some(phone.to_string()), self.clock_now()).unwrap();
        (header::COOKIE, format!("session={token}"))
    }

    pub fn kakao_cookie(&self, kakao_id: &str) -> (header::HeaderName, String) {
        let identity = BuyerIdentity::Kakao { kakao_id: kakao_id.to_string() };
        let token = self.state.sessions.issue(&identity, Some("tester".into()), None, None, self.clock_now()).unwrap();
        (header::COOKIE, format!("session={token}"))
    }

    pub fn admin_auth(&self) -> (header::HeaderName, String) { (header::AUTHORIZATION, format!("Bearer {ADMIN_KEY}")) }

    pub fn clock_now(&self) -> DateTime<Utc> { kidswear_store::Clock::now(self.clock.as_ref()) }

    /// A product on sale at `price` with `discount_rate` percent off.
    pub fn seed_product(&self, id: i64, name: &str, price: i64, discount_rate: u8) -> Product {
        let product = Product {
            id,
            name: name.to_string(),
            brand: "Bonpoint".to_string(),
            category1: "상의".to_string(),
            category2: Some("티셔츠".to_string()),
            size: Some("4Y".to_string()),
            price: Won::new(price),
            purchase_price: Won::new(price / 3),
            discount_rate,
            condition: Some("A".to_string()),
            description: String::new(),
            status: ProductStatus::Selling,
            image_count: 2,
            created_at: start_time(),
        };
        self.store.put_product(product.clone()).unwrap();
        product
    }

    /// Temp order → submitted form (phone buyer) → id and payable total.
    pub async fn pending_order(&self, product_ids: &[i64], coupon: Option<&str>) -> (Uuid, i64) {
        let items: Vec<Value> = product_ids.iter().map(|id| serde_json::json!({ "product_id": id })).collect();
        let created = self.post("/api/orders", serde_json::json!({ "items": items })).await;
        assert_eq!(created.status, StatusCode::CREATED, "{:?}", created.body);
        let order_id: Uuid = created.body["id"].as_str().unwrap().parse().unwrap();

        let form = serde_json::json!({
            "recipient_name": "김민지",
            "recipient_phone": "010-1234-5678",
            "postal_code": "06236",
            "address": "서울 강남구 테헤란로 1",
            "address_detail": "101호",
            "coupon_code": coupon,
        });
        let submitted = self
            .send(Method::PUT, &format!("/api/orders/{order_id}/submit"), Some(form), &[self.phone_cookie(BUYER_PHONE)])
            .await;
        assert_eq!(submitted.status, StatusCode::OK, "{:?}", submitted.body);
        (order_id, submitted.body["amount"].as_i64().unwrap())
    }

    /// A paid phone order, confirmed through the redirect path.
    pub async fn paid_order(&self, product_ids: &[i64]) -> Uuid {
        let (order_id, amount) = self.pending_order(product_ids, None).await;
        let confirmed = self
            .post("/api/payments/confirm", serde_json::json!({ "paymentKey": format!("pk-{order_id}"), "orderId": order_id, "amount": amount }))
            .await;
        assert_eq!(confirmed.status, StatusCode::OK, "{:?}", confirmed.body);
        order_id
    }
}
