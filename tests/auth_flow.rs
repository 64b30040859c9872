mod common;

use std::sync::atomic::Ordering;

use axum::http::{header, Method, StatusCode};
use chrono::Duration;
use serde_json::json;

use common::{TestApp, BUYER_PHONE};

async fn request_code(app: &TestApp) -> String {
    let sent = app.post("/api/auth/otp/request", json!({ "phone": "010-1234-5678" })).await;
    assert_eq!(sent.status, StatusCode::OK, "{:?}", sent.body);
    assert_eq!(sent.body["phone"], BUYER_PHONE);
    app.sms.last_code(BUYER_PHONE).expect("code was texted")
}

#[tokio::test]
async fn code_is_accepted_within_five_minutes_and_only_once() {
    let app = TestApp::new();
    let code = request_code(&app).await;
    assert_eq!(code.len(), 6);

    app.clock.advance(Duration::minutes(4));
    let verified = app.post("/api/auth/otp/verify", json!({ "phone": BUYER_PHONE, "code": code })).await;
    assert_eq!(verified.status, StatusCode::OK, "{:?}", verified.body);
    let cookie = verified.set_cookie().expect("session cookie");
    assert!(cookie.starts_with("session="));
    assert!(cookie.contains("HttpOnly"));

    let again = app.post("/api/auth/otp/verify", json!({ "phone": BUYER_PHONE, "code": code })).await;
    assert_eq!(again.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(again.code(), "CODE_INCORRECT");
}

#[tokio::test]
async fn code_expires_after_five_minutes() {
    let app = TestApp::new();
    let code = request_code(&app).await;

    app.clock.advance(Duration::minutes(6));
    let verified = app.post("/api/auth/otp/verify", json!({ "phone": BUYER_PHONE, "code": code })).await;
    assert_eq!(verified.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(verified.code(), "CODE_EXPIRED");
    assert!(verified.set_cookie().is_none());
}

#[tokio::test]
async fn wrong_code_and_bad_phone_are_rejected() {
    let app = TestApp::new();
    let code = request_code(&app).await;
    let wrong = if code == "000000" { "111111" } else { "000000" };

    let verified = app.post("/api/auth/otp/verify", json!({ "phone": BUYER_PHONE, "code": wrong })).await;
    assert_eq!(verified.code(), "CODE_INCORRECT");

    let bad_phone = app.post("/api/auth/otp/request", json!({ "phone": "02-123-4567" })).await;
    assert_eq!(bad_phone.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sms_failure_is_reported_but_code_is_kept() {
    let app = TestApp::new();
    app.sms.fail.store(true, Ordering::SeqCst);

    let sent = app.post("/api/auth/otp/request", json!({ "phone": BUYER_PHONE })).await;
    assert_eq!(sent.status, StatusCode::BAD_GATEWAY);
    assert_eq!(sent.code(), "UPSTREAM_ERROR");

    // The message may still arrive late; its code must work.
    let code = app.sms.last_code(BUYER_PHONE).expect("code was generated");
    let verified = app.post("/api/auth/otp/verify", json!({ "phone": BUYER_PHONE, "code": code })).await;
    assert_eq!(verified.status, StatusCode::OK, "{:?}", verified.body);
    assert!(verified.set_cookie().is_some());
}

#[tokio::test]
async fn kakao_callback_sets_session_and_redirects_home() {
    let app = TestApp::new();

    let callback = app.get("/api/auth/kakao/callback?code=good-code").await;
    assert_eq!(callback.status, StatusCode::SEE_OTHER);
    assert_eq!(callback.headers.get(header::LOCATION).unwrap(), "http://localhost:3000/");
    let cookie = callback.set_cookie().expect("session cookie");
    let token = cookie.split(';').next().unwrap().to_string();

    let me = app.send(Method::GET, "/api/users/me", None, &[(header::COOKIE, token)]).await;
    assert_eq!(me.status, StatusCode::OK, "{:?}", me.body);
    assert_eq!(me.body["identity"]["provider"], "kakao");
    assert_eq!(me.body["identity"]["kakao_id"], "kakao-1");
    assert_eq!(me.body["nickname"], "민지맘");
    assert!(me.body["user"]["address"].is_null());
}

#[tokio::test]
async fn each_kakao_login_refreshes_the_stored_profile() {
    let app = TestApp::new();
    app.get("/api/auth/kakao/callback?code=good-code").await;
    let edited = app
        .send(Method::PUT, "/api/users/me", Some(json!({ "phone": "010-2222-3333" })), &[app.kakao_cookie("kakao-1")])
        .await;
    assert_eq!(edited.body["phone"], "01022223333");

    {
        let mut profile = app.identity.profile.lock().unwrap();
        profile.nickname = Some("하은맘".to_string());
        profile.phone = Some("01077776666".to_string());
    }
    let again = app.get("/api/auth/kakao/callback?code=good-code").await;
    assert_eq!(again.status, StatusCode::SEE_OTHER);

    let me = app.send(Method::GET, "/api/users/me", None, &[app.kakao_cookie("kakao-1")]).await;
    assert_eq!(me.status, StatusCode::OK, "{:?}", me.body);
    assert_eq!(me.body["user"]["nickname"], "하은맘");
    assert_eq!(me.body["user"]["phone"], "01077776666");
}

#[tokio::test]
async fn kakao_failures_collapse_to_login_failed() {
    let app = TestApp::new();

    let bad = app.get("/api/auth/kakao/callback?code=expired").await;
    assert_eq!(bad.status, StatusCode::UNAUTHORIZED);
    assert_eq!(bad.body["error"], "login failed");

    let denied = app.get("/api/auth/kakao/callback?error=access_denied").await;
    assert_eq!(denied.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn profile_requires_session_and_updates_are_kakao_only() {
    let app = TestApp::new();
    assert_eq!(app.get("/api/users/me").await.status, StatusCode::UNAUTHORIZED);

    let phone_update = app
        .send(Method::PUT, "/api/users/me", Some(json!({ "nickname": "x" })), &[app.phone_cookie(BUYER_PHONE)])
        .await;
    assert_eq!(phone_update.status, StatusCode::FORBIDDEN);

    app.get("/api/auth/kakao/callback?code=good-code").await;
    let updated = app
        .send(
            Method::PUT,
            "/api/users/me",
            Some(json!({ "address": "서울 마포구 1", "phone": "010-2222-3333" })),
            &[app.kakao_cookie("kakao-1")],
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK, "{:?}", updated.body);
    assert_eq!(updated.body["phone"], "01022223333");
    assert_eq!(updated.body["address"], "서울 마포구 1");
}

#[tokio::test]
async fn expired_session_is_unauthorized_and_logout_clears_cookie() {
    let app = TestApp::new();
    let cookie = app.phone_cookie(BUYER_PHONE);

    let me = app.send(Method::GET, "/api/users/me", None, &[cookie.clone()]).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["identity"]["phone"], BUYER_PHONE);

    app.clock.advance(Duration::days(8));
    let stale = app.send(Method::GET, "/api/users/me", None, &[cookie]).await;
    assert_eq!(stale.status, StatusCode::UNAUTHORIZED);

    let logout = app.send(Method::POST, "/api/auth/logout", None, &[]).await;
    assert_eq!(logout.status, StatusCode::NO_CONTENT);
    assert!(logout.set_cookie().unwrap().contains("Max-Age=0"));
}
