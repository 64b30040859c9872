//! Admin reporting over raw visit, cart and order rows.
//!
//! Everything is aggregated in memory after one range query per table. Days are
//! counted in a fixed +09:00 offset, not a tz database zone.

pub mod funnel;
pub mod ip_filter;
pub mod referrer;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

use crate::domain::aggregates::OrderStatus;

pub use funnel::{funnel_report, FunnelReport};
pub use ip_filter::IpExclusion;
pub use referrer::{classify_channel, classify_device, Channel, Device};

pub const LOCAL_OFFSET_SECS: i32 = 9 * 3600;
pub const MAX_RANGE_DAYS: i64 = 366;

pub fn local_offset() -> FixedOffset {
    FixedOffset::east_opt(LOCAL_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PageView {
    pub ip: String,
    pub path: String,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CartLog {
    pub ip: String,
    pub product_id: i64,
    pub action: String,
    pub created_at: DateTime<Utc>,
}

/// The two order columns the funnel needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderFact {
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("dates must look like YYYY-MM-DD")]
    BadDate,
    #[error("'from' must not be after 'to'")]
    Inverted,
    #[error("ranges are limited to 366 days")]
    TooLong,
}

/// Inclusive range of local calendar days.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, RangeError> {
        if from > to { return Err(RangeError::Inverted); }
        if (to - from).num_days() >= MAX_RANGE_DAYS { return Err(RangeError::TooLong); }
        Ok(Self { from, to })
    }

    pub fn parse(from: &str, to: &str) -> Result<Self, RangeError> {
        let parse = |s: &str| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| RangeError::BadDate);
        Self::new(parse(from)?, parse(to)?)
    }

    /// Local midnight starting `from`, as UTC.
    pub fn start_utc(&self) -> DateTime<Utc> { local_midnight_utc(self.from) }

    /// Local midnight after `to`, as UTC (exclusive bound).
    pub fn end_utc(&self) -> DateTime<Utc> { local_midnight_utc(self.to + Duration::days(1)) }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool { ts >= self.start_utc() && ts < self.end_utc() }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let from = self.from;
        (0..=(self.to - self.from).num_days()).map(move |n| from + Duration::days(n))
    }
}

fn local_midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    let local = date.and_time(NaiveTime::MIN);
    (local - Duration::seconds(i64::from(LOCAL_OFFSET_SECS))).and_utc()
}

pub fn local_date(ts: DateTime<Utc>) -> NaiveDate {
    ts.with_timezone(&local_offset()).date_naive()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DailyVisitors {
    pub date: NaiveDate,
    pub visitors: usize,
    pub views: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VisitorReport {
    pub range: DateRange,
    pub unique_visitors: usize,
    pub total_views: usize,
    pub excluded_views: usize,
    pub daily: Vec<DailyVisitors>,
}

pub fn visitor_report(range: DateRange, views: &[PageView], exclusion: &IpExclusion) -> VisitorReport {
    let mut per_day: BTreeMap<NaiveDate, (HashSet<&str>, usize)> = range.days().map(|d| (d, (HashSet::new(), 0))).collect();
    let mut everyone = HashSet::new();
    let mut excluded = 0;
    let mut total = 0;
    for view in views.iter().filter(|v| range.contains(v.created_at)) {
        if exclusion.is_excluded(&view.ip) { excluded += 1; continue; }
        total += 1;
        everyone.insert(view.ip.as_str());
        let entry = per_day.entry(local_date(view.created_at)).or_default();
        entry.0.insert(view.ip.as_str());
        entry.1 += 1;
    }
    VisitorReport {
        range,
        unique_visitors: everyone.len(),
        total_views: total,
        excluded_views: excluded,
        daily: per_day.into_iter().map(|(date, (ips, views))| DailyVisitors { date, visitors: ips.len(), views }).collect(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReferrerBucket {
    pub channel: Channel,
    pub device: Device,
    pub host: Option<String>,
    pub views: usize,
    pub visitors: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DailyReferrers {
    pub date: NaiveDate,
    pub buckets: Vec<ReferrerBucket>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChannelTotal {
    pub channel: Channel,
    pub views: usize,
    pub visitors: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReferrerReport {
    pub range: DateRange,
    pub daily: Vec<DailyReferrers>,
    pub channels: Vec<ChannelTotal>,
}

type BucketKey = (Channel, Device, Option<String>);

pub fn referrer_report(range: DateRange, views: &[PageView], exclusion: &IpExclusion) -> ReferrerReport {
    let mut per_day: BTreeMap<NaiveDate, HashMap<BucketKey, (usize, HashSet<&str>)>> = BTreeMap::new();
    let mut per_channel: BTreeMap<Channel, (usize, HashSet<&str>)> = BTreeMap::new();

    for view in views.iter().filter(|v| range.contains(v.created_at) && !exclusion.is_excluded(&v.ip)) {
        let source = view.referrer.as_deref();
        let channel = classify_channel(source);
        let key = (channel, classify_device(source), source.and_then(referrer::host_of));
        let bucket = per_day.entry(local_date(view.created_at)).or_default().entry(key).or_default();
        bucket.0 += 1;
        bucket.1.insert(view.ip.as_str());
        let total = per_channel.entry(channel).or_default();
        total.0 += 1;
        total.1.insert(view.ip.as_str());
    }

    let daily = per_day
        .into_iter()
        .map(|(date, buckets)| {
            let mut buckets: Vec<ReferrerBucket> = buckets
                .into_iter()
                .map(|((channel, device, host), (views, ips))| ReferrerBucket { channel, device, host, views, visitors: ips.len() })
                .collect();
            buckets.sort_by(|a, b| b.views.cmp(&a.views).then_with(|| (a.channel, a.device, &a.host).cmp(&(b.channel, b.device, &b.host))));
            DailyReferrers { date, buckets }
        })
        .collect();

    let mut channels: Vec<ChannelTotal> = per_channel
        .into_iter()
        .map(|(channel, (views, ips))| ChannelTotal { channel, views, visitors: ips.len() })
        .collect();
    channels.sort_by(|a, b| b.views.cmp(&a.views).then(a.channel.cmp(&b.channel)));

    ReferrerReport { range, daily, channels }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> { Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap() }

    fn view(ip: &str, referrer: Option<&str>, ts: DateTime<Utc>) -> PageView {
        PageView { ip: ip.into(), path: "/".into(), referrer: referrer.map(String::from), user_agent: None, created_at: ts }
    }

    fn range(from: &str, to: &str) -> DateRange { DateRange::parse(from, to).unwrap() }

    #[test]
    fn range_bounds_follow_local_offset() {
        let r = range("2025-05-01", "2025-05-02");
        assert_eq!(r.start_utc(), at(2025, 4, 30, 15));
        assert_eq!(r.end_utc(), at(2025, 5, 2, 15));
        assert!(r.contains(at(2025, 4, 30, 15)));
        assert!(!r.contains(at(2025, 5, 2, 15)));
        assert_eq!(r.days().count(), 2);
        assert_eq!(local_date(at(2025, 4, 30, 16)), NaiveDate::from_ymd_opt(2025, 5, 1).unwrap());
    }

    #[test]
    fn range_validation() {
        assert_eq!(DateRange::parse("2025-05-02", "2025-05-01"), Err(RangeError::Inverted));
        assert_eq!(DateRange::parse("2025/05/01", "2025-05-01"), Err(RangeError::BadDate));
        assert_eq!(DateRange::parse("2024-01-01", "2025-12-31"), Err(RangeError::TooLong));
    }

    #[test]
    fn visitors_are_distinct_ips_and_skip_operators() {
        let r = range("2025-05-01", "2025-05-02");
        let views = vec![
            view("1.2.3.4", None, at(2025, 5, 1, 1)),
            view("1.2.3.4", None, at(2025, 5, 1, 2)),
            view("5.6.7.8", None, at(2025, 5, 1, 20)), // 05-02 local
            view("223.38.99.1", None, at(2025, 5, 1, 3)),
            view("9.9.9.9", None, at(2025, 5, 3, 0)), // outside
        ];
        let report = visitor_report(r, &views, &IpExclusion::default());
        assert_eq!(report.unique_visitors, 2);
        assert_eq!(report.total_views, 3);
        assert_eq!(report.excluded_views, 1);
        assert_eq!(report.daily.len(), 2);
        assert_eq!((report.daily[0].visitors, report.daily[0].views), (1, 2));
        assert_eq!((report.daily[1].visitors, report.daily[1].views), (1, 1));
    }

    #[test]
    fn referrers_group_per_day() {
        let r = range("2025-05-01", "2025-05-01");
        let views = vec![
            view("1.1.1.1", Some("https://m.search.naver.com/a"), at(2025, 5, 1, 1)),
            view("2.2.2.2", Some("https://m.search.naver.com/b"), at(2025, 5, 1, 2)),
            view("2.2.2.2", Some("https://m.search.naver.com/c"), at(2025, 5, 1, 3)),
            view("3.3.3.3", None, at(2025, 5, 1, 4)),
            view("223.38.1.1", Some("https://www.google.com"), at(2025, 5, 1, 4)),
        ];
        let report = referrer_report(r, &views, &IpExclusion::default());
        assert_eq!(report.daily.len(), 1);
        let top = &report.daily[0].buckets[0];
        assert_eq!((top.channel, top.device, top.views, top.visitors), (Channel::Naver, Device::Mobile, 3, 2));
        assert_eq!(top.host.as_deref(), Some("m.search.naver.com"));
        assert_eq!(report.channels.len(), 2);
        assert!(report.channels.iter().all(|c| c.channel != Channel::Google));
    }
}
