//! Configuration Module
//!
//! Everything is read from the environment (optionally seeded from `.env`).
//! Required secrets must be present outside development; in development they fall
//! back to placeholder values so the service can boot against fakes.

use std::env;

use anyhow::{bail, Context, Result};

use crate::reporting::IpExclusion;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "production" => Self::Production,
            "staging" => Self::Staging,
            _ => Self::Development,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TossConfig {
    pub secret_key: String,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct KakaoConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub auth_base: String,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub api_key: String,
    pub api_secret: String,
    pub sender: String,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub environment: Environment,
    /// `None` runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    pub session_secret: String,
    pub admin_api_key: String,
    pub public_base_url: String,
    pub allowed_origins: Vec<String>,
    pub toss: TossConfig,
    pub kakao: KakaoConfig,
    pub sms: SmsConfig,
    pub ip_exclusion: IpExclusion,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Only `PORT` is parsed strictly; secrets are checked for presence according
    /// to [`Environment`].
    pub fn from_env() -> Result<Self> {
        let environment = Environment::parse(&env::var("ENVIRONMENT").unwrap_or_default());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "8083".to_string())
            .parse()
            .context("PORT must be a valid number")?;

        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.is_empty());
        if database_url.is_none() && environment != Environment::Development {
            bail!("DATABASE_URL must be set in {} environment", environment.as_str());
        }

        Ok(Self {
            port,
            database_url,
            nats_url: env::var("NATS_URL").ok().filter(|v| !v.is_empty()),
            session_secret: require_secret("SESSION_SECRET", &environment)?,
            admin_api_key: require_secret("ADMIN_API_KEY", &environment)?,
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            allowed_origins: list_var("ALLOWED_ORIGINS"),
            toss: TossConfig {
                secret_key: require_secret("TOSS_SECRET_KEY", &environment)?,
                api_base: env::var("TOSS_API_BASE")
                    .unwrap_or_else(|_| "https://api.tosspayments.com".to_string()),
            },
            kakao: KakaoConfig {
                client_id: require_secret("KAKAO_CLIENT_ID", &environment)?,
                client_secret: env::var("KAKAO_CLIENT_SECRET").ok().filter(|v| !v.is_empty()),
                redirect_uri: env::var("KAKAO_REDIRECT_URI").unwrap_or_else(|_| {
                    "http://localhost:8083/api/auth/kakao/callback".to_string()
                }),
                auth_base: env::var("KAKAO_AUTH_BASE")
                    .unwrap_or_else(|_| "https://kauth.kakao.com".to_string()),
                api_base: env::var("KAKAO_API_BASE")
                    .unwrap_or_else(|_| "https://kapi.kakao.com".to_string()),
            },
            sms: SmsConfig {
                api_key: require_secret("COOLSMS_API_KEY", &environment)?,
                api_secret: require_secret("COOLSMS_API_SECRET", &environment)?,
                sender: env::var("COOLSMS_SENDER").unwrap_or_else(|_| "01000000000".to_string()),
                api_base: env::var("COOLSMS_API_BASE")
                    .unwrap_or_else(|_| "https://api.coolsms.co.kr".to_string()),
            },
            ip_exclusion: IpExclusion::from_lists(
                optional_list_var("EXCLUDED_IPS"),
                optional_list_var("EXCLUDED_IP_PREFIXES"),
                optional_list_var("EXCLUDED_IP_SUBSTRINGS"),
            ),
            environment,
        })
    }

    /// Storefront landing page, where a completed login sends the browser.
    pub fn storefront_home(&self) -> String {
        format!("{}/", self.public_base_url.trim_end_matches('/'))
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }
}

fn require_secret(name: &str, environment: &Environment) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ if *environment == Environment::Development => Ok(format!("dev-{name}-not-for-production")),
        _ => bail!("{name} must be set in {} environment", environment.as_str()),
    }
}

fn list_var(name: &str) -> Vec<String> {
    optional_list_var(name).unwrap_or_default()
}

/// `None` when the variable is absent, so callers can tell "unset" from "set to empty".
fn optional_list_var(name: &str) -> Option<Vec<String>> {
    env::var(name).ok().map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parsing_defaults_to_development() {
        assert_eq!(Environment::parse("PRODUCTION"), Environment::Production);
        assert_eq!(Environment::parse("staging"), Environment::Staging);
        assert_eq!(Environment::parse(""), Environment::Development);
    }

    #[test]
    fn development_secret_falls_back() {
        let value = require_secret("KIDSWEAR_TEST_UNSET_SECRET", &Environment::Development).unwrap();
        assert!(value.starts_with("dev-"));
        assert!(require_secret("KIDSWEAR_TEST_UNSET_SECRET", &Environment::Production).is_err());
    }
}
