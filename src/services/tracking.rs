//! Visit and cart-click logging for the funnel reports.

use axum::http::HeaderMap;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::reporting::{CartLog, PageView};
use crate::AppState;

pub const UNKNOWN_IP: &str = "unknown";

/// First `X-Forwarded-For` hop, else `X-Real-IP`, else `unknown`.
pub fn client_ip(headers: &HeaderMap) -> String {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|v| !v.is_empty());
    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header("x-real-ip"))
        .unwrap_or(UNKNOWN_IP)
        .to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageViewEvent {
    pub path: String,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CartClickEvent {
    pub product_id: i64,
    pub action: String,
}

pub async fn log_page_view(state: &AppState, ip: String, event: PageViewEvent, header_agent: Option<String>) -> ApiResult<()> {
    let path = event.path.trim();
    if path.is_empty() {
        return Err(ApiError::validation("path is required"));
    }
    let view = PageView {
        ip,
        path: path.to_string(),
        referrer: event.referrer.filter(|r| !r.trim().is_empty()),
        user_agent: event.user_agent.or(header_agent),
        created_at: state.clock.now(),
    };
    state.repos.event_logs.insert_page_view(&view).await?;
    Ok(())
}

pub async fn log_cart_click(state: &AppState, ip: String, event: CartClickEvent) -> ApiResult<()> {
    let action = event.action.trim();
    if action.is_empty() {
        return Err(ApiError::validation("action is required"));
    }
    let log = CartLog { ip, product_id: event.product_id, action: action.to_string(), created_at: state.clock.now() };
    state.repos.event_logs.insert_cart_log(&log).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), "unknown");
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_ip(&headers), "10.0.0.2");
        headers.insert("x-forwarded-for", HeaderValue::from_static(" 1.2.3.4 , 10.0.0.1"));
        assert_eq!(client_ip(&headers), "1.2.3.4");
    }
}
