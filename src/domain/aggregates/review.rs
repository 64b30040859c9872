//! Reviews and the tokens that gate them

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

pub const TOKEN_LEN: usize = 32;

/// One per (order, product). Whoever holds it may write that product's review, once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReviewToken {
    pub token: String,
    pub order_id: Uuid,
    pub product_id: i64,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ReviewToken {
    pub fn issue(order_id: Uuid, product_id: i64, now: DateTime<Utc>) -> Self {
        let token = rand::thread_rng().sample_iter(&Alphanumeric).take(TOKEN_LEN).map(char::from).collect();
        Self { token, order_id, product_id, used_at: None, created_at: now }
    }

    pub fn is_used(&self) -> bool { self.used_at.is_some() }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Review {
    pub id: i64,
    pub product_id: i64,
    pub order_id: Uuid,
    pub content: String,
    pub rating: u8,
    pub nickname: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewReview {
    pub product_id: i64,
    pub order_id: Uuid,
    pub content: String,
    pub rating: u8,
    pub nickname: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReviewError {
    #[error("rating must be between 1 and 5")]
    RatingOutOfRange,
    #[error("review text is required")]
    EmptyContent,
    #[error("this review link was already used")]
    TokenUsed,
}

impl NewReview {
    pub fn from_token(token: &ReviewToken, content: &str, rating: u8, nickname: Option<String>, image_url: Option<String>) -> Result<Self, ReviewError> {
        if token.is_used() { return Err(ReviewError::TokenUsed); }
        if !(1..=5).contains(&rating) { return Err(ReviewError::RatingOutOfRange); }
        let content = content.trim();
        if content.is_empty() { return Err(ReviewError::EmptyContent); }
        let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Ok(Self {
            product_id: token.product_id,
            order_id: token.order_id,
            content: content.to_string(),
            rating,
            nickname: clean(nickname),
            image_url: clean(image_url),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_shape() {
        let a = ReviewToken::issue(Uuid::new_v4(), 1, Utc::now());
        let b = ReviewToken::issue(a.order_id, 1, Utc::now());
        assert_eq!(a.token.len(), TOKEN_LEN);
        assert!(a.token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn test_review_validation() {
        let mut token = ReviewToken::issue(Uuid::new_v4(), 3, Utc::now());
        assert_eq!(NewReview::from_token(&token, "good", 0, None, None), Err(ReviewError::RatingOutOfRange));
        assert_eq!(NewReview::from_token(&token, "good", 6, None, None), Err(ReviewError::RatingOutOfRange));
        assert_eq!(NewReview::from_token(&token, "   ", 5, None, None), Err(ReviewError::EmptyContent));

        let review = NewReview::from_token(&token, " 예뻐요 ", 5, Some(" ".into()), Some("https://img/1.jpg".into())).unwrap();
        assert_eq!(review.product_id, 3);
        assert_eq!(review.content, "예뻐요");
        assert_eq!(review.nickname, None);

        token.used_at = Some(Utc::now());
        assert_eq!(NewReview::from_token(&token, "again", 4, None, None), Err(ReviewError::TokenUsed));
    }
}
