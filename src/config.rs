use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub api_prefix: String,
    pub log_dir: String,

    // Rate limiting
    pub rate_protected_per_min: u32,
    pub rate_checkin_per_min: u32,

    // Cache lifetimes (seconds)
    pub permission_cache_ttl: u64,
    pub settings_cache_ttl: u64,

    /// Outbound email delivery, disabled when `None`
    pub email: Option<EmailConfig>,
}

#[derive(Clone, Debug)]
pub struct EmailConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn or_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let email = match env::var("EMAIL_API_URL") {
            Ok(api_url) if !api_url.trim().is_empty() => Some(EmailConfig {
                api_url,
                api_key: env::var("EMAIL_API_KEY").unwrap_or_default(),
                from: env::var("EMAIL_FROM")
                    .unwrap_or_else(|_| "no-reply@localhost".to_string()),
            }),
            _ => None,
        };

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),

            rate_protected_per_min: or_default("RATE_PROTECTED_PER_MIN", 1000)?,
            rate_checkin_per_min: or_default("RATE_CHECKIN_PER_MIN", 30)?,

            permission_cache_ttl: or_default("PERMISSION_CACHE_TTL_SECS", 60)?,
            settings_cache_ttl: or_default("SETTINGS_CACHE_TTL_SECS", 300)?,

            email,
        })
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            database_url: "mysql://localhost/test".into(),
            jwt_secret: jwt_secret.into(),
            server_addr: "127.0.0.1:0".into(),
            api_prefix: "/api".into(),
            log_dir: "logs".into(),
            rate_protected_per_min: 1000,
            rate_checkin_per_min: 30,
            permission_cache_ttl: 60,
            settings_cache_ttl: 300,
            email: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_defaults_apply_when_unset() {
        let value: u32 = or_default("HRM_TEST_SURELY_UNSET_KEY", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn missing_required_key_reports_name() {
        let err = required("HRM_TEST_SURELY_UNSET_REQUIRED").unwrap_err();
        assert!(err.to_string().contains("HRM_TEST_SURELY_UNSET_REQUIRED"));
    }
}
