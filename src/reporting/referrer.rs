//! Referrer classification by plain substring matching.

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Direct,
    Naver,
    Instagram,
    Kakao,
    Google,
    Facebook,
    Youtube,
    Daum,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    Mobile,
    Desktop,
    Unknown,
}

// First hit wins, so "m.blog.naver" is Naver and "l.instagram" is Instagram.
const CHANNEL_PATTERNS: &[(&str, Channel)] = &[
    ("naver", Channel::Naver),
    ("instagram", Channel::Instagram),
    ("kakao", Channel::Kakao),
    ("google", Channel::Google),
    ("facebook", Channel::Facebook),
    ("fb.", Channel::Facebook),
    ("youtube", Channel::Youtube),
    ("youtu.be", Channel::Youtube),
    ("daum", Channel::Daum),
];

const MOBILE_PATTERNS: &[&str] = &["mobile", "android-app://", "l.instagram.com", "ios-app://"];

pub fn classify_channel(referrer: Option<&str>) -> Channel {
    let referrer = match referrer.map(str::trim) {
        Some(r) if !r.is_empty() => r.to_lowercase(),
        _ => return Channel::Direct,
    };
    CHANNEL_PATTERNS
        .iter()
        .find(|(needle, _)| referrer.contains(needle))
        .map_or(Channel::Other, |(_, channel)| *channel)
}

pub fn classify_device(referrer: Option<&str>) -> Device {
    let referrer = match referrer.map(str::trim) {
        Some(r) if !r.is_empty() => r.to_lowercase(),
        _ => return Device::Unknown,
    };
    let mobile_host = host_of(&referrer).is_some_and(|h| h.starts_with("m."));
    if mobile_host || MOBILE_PATTERNS.iter().any(|p| referrer.contains(p)) { Device::Mobile } else { Device::Desktop }
}

/// Host part of a referrer URL, without scheme, port, path or query.
pub fn host_of(referrer: &str) -> Option<String> {
    let trimmed = referrer.trim();
    if trimmed.is_empty() { return None; }
    let without_scheme = trimmed.split_once("://").map_or(trimmed, |(_, rest)| rest);
    let host = without_scheme.split(['/', '?', '#']).next().unwrap_or_default();
    let host = host.rsplit_once('@').map_or(host, |(_, h)| h);
    let host = host.split(':').next().unwrap_or_default();
    (!host.is_empty()).then(|| host.to_lowercase())
}
