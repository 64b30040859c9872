//! Phone verification codes
//!
//! Rows are never deleted: a phone accumulates one row per request, and a row is
//! spent by flipping `verified`.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use thiserror::Error;

pub const CODE_TTL_MINUTES: i64 = 5;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerificationCode {
    pub id: i64,
    pub phone: String,
    pub code: String,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("인증번호가 올바르지 않습니다.")]
    Incorrect,
    #[error("인증번호가 만료되었습니다. 다시 요청해주세요.")]
    Expired,
}

/// Six digits, leading zeros kept.
pub fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

impl VerificationCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > Duration::minutes(CODE_TTL_MINUTES)
    }
}

/// Judge the latest unverified row that matched phone and code.
pub fn check(candidate: Option<&VerificationCode>, now: DateTime<Utc>) -> Result<i64, VerificationError> {
    let row = candidate.filter(|row| !row.verified).ok_or(VerificationError::Incorrect)?;
    if row.is_expired(now) { return Err(VerificationError::Expired); }
    Ok(row.id)
}

/// Pick the row `verify` should judge out of everything stored for a phone.
pub fn latest_match<'a>(rows: impl IntoIterator<Item = &'a VerificationCode>, phone: &str, code: &str) -> Option<&'a VerificationCode> {
    rows.into_iter()
        .filter(|r| r.phone == phone && r.code == code && !r.verified)
        .max_by_key(|r| (r.created_at, r.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, code: &str, created_at: DateTime<Utc>, verified: bool) -> VerificationCode {
        VerificationCode { id, phone: "01012345678".into(), code: code.into(), verified, created_at }
    }

    #[test]
    fn test_generated_codes_are_six_digits() {
        for _ in 0..200 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_check_window() {
        let sent = Utc::now();
        let r = row(1, "123456", sent, false);
        assert_eq!(check(Some(&r), sent + Duration::minutes(4)), Ok(1));
        assert_eq!(check(Some(&r), sent + Duration::minutes(5)), Ok(1));
        assert_eq!(check(Some(&r), sent + Duration::minutes(6)), Err(VerificationError::Expired));
        assert_eq!(check(None, sent), Err(VerificationError::Incorrect));
        let spent = row(2, "123456", sent, true);
        assert_eq!(check(Some(&spent), sent), Err(VerificationError::Incorrect));
    }

    #[test]
    fn test_latest_match_prefers_newest_unverified() {
        let t = Utc::now();
        let rows = vec![
            row(1, "111111", t, false),
            row(2, "111111", t + Duration::minutes(1), true),
            row(3, "111111", t + Duration::seconds(30), false),
            row(4, "222222", t + Duration::minutes(2), false),
        ];
        assert_eq!(latest_match(&rows, "01012345678", "111111").map(|r| r.id), Some(3));
        assert_eq!(latest_match(&rows, "01099999999", "111111"), None);
    }
}
