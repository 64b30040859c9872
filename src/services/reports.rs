//! Admin reports: one range query per table, aggregation in `crate::reporting`.

use serde::Deserialize;

use crate::error::ApiResult;
use crate::reporting::{funnel_report, referrer_report, visitor_report, DateRange, FunnelReport, ReferrerReport, VisitorReport};
use crate::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct RangeQuery {
    pub from: String,
    pub to: String,
}

impl RangeQuery {
    pub fn range(&self) -> ApiResult<DateRange> {
        Ok(DateRange::parse(&self.from, &self.to)?)
    }
}

pub async fn visitors(state: &AppState, range: DateRange) -> ApiResult<VisitorReport> {
    let views = state.repos.event_logs.page_views_between(range.start_utc(), range.end_utc()).await?;
    Ok(visitor_report(range, &views, &state.config.ip_exclusion))
}

pub async fn referrers(state: &AppState, range: DateRange) -> ApiResult<ReferrerReport> {
    let views = state.repos.event_logs.page_views_between(range.start_utc(), range.end_utc()).await?;
    Ok(referrer_report(range, &views, &state.config.ip_exclusion))
}

pub async fn funnel(state: &AppState, range: DateRange) -> ApiResult<FunnelReport> {
    let (from, to) = (range.start_utc(), range.end_utc());
    let views = state.repos.event_logs.page_views_between(from, to).await?;
    let carts = state.repos.event_logs.cart_logs_between(from, to).await?;
    let orders = state.repos.orders.facts_between(from, to).await?;
    Ok(funnel_report(&views, &carts, &orders, &state.config.ip_exclusion))
}
