//! Shopper identity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::PhoneNumber;

/// Who is buying: either a Kakao account or a phone number proven by OTP.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum BuyerIdentity {
    Kakao { kakao_id: String },
    Phone { phone: PhoneNumber },
}

impl BuyerIdentity {
    pub fn kakao_id(&self) -> Option<&str> {
        match self { Self::Kakao { kakao_id } => Some(kakao_id), Self::Phone { .. } => None }
    }

    pub fn phone(&self) -> Option<&PhoneNumber> {
        match self { Self::Phone { phone } => Some(phone), Self::Kakao { .. } => None }
    }
}

/// Stored Kakao account. Contact fields are overwritten by every login.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub kakao_id: String,
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a shopper may edit from the order form.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct UserContactUpdate {
    pub nickname: Option<String>,
    pub phone: Option<PhoneNumber>,
    pub address: Option<String>,
}

impl User {
    pub fn apply(&mut self, update: UserContactUpdate, now: DateTime<Utc>) {
        if let Some(nickname) = update.nickname { self.nickname = Some(nickname); }
        if let Some(phone) = update.phone { self.phone = Some(phone.as_str().to_string()); }
        if let Some(address) = update.address { self.address = Some(address); }
        self.updated_at = now;
    }
}
