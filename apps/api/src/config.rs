use anyhow::{Context, Result};

use crate::autofill::GateThresholds;

pub const DEFAULT_WEBHOOK_MAX_SKEW_SECS: u64 = 300;

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub gemini_api_key: String,
    pub openai_api_key: Option<String>,
    pub gemini_model: String,
    pub mercadopago_webhook_secret: String,
    /// Max distance in seconds between a webhook's signed `ts` and now; 0 disables.
    pub mercadopago_webhook_max_skew_secs: u64,
    pub mercadopago_access_token: String,
    pub free_daily_limit: i32,
    pub premium_daily_limit: i32,
    pub autofill_thresholds: GateThresholds,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = GateThresholds::default();

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            gemini_api_key: require_env("GEMINI_API_KEY")?,
            openai_api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            gemini_model: std::env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| crate::llm_client::DEFAULT_GEMINI_MODEL.to_string()),
            mercadopago_webhook_secret: require_env("MERCADOPAGO_WEBHOOK_SECRET")?,
            mercadopago_webhook_max_skew_secs: parse_env(
                "MERCADOPAGO_WEBHOOK_MAX_SKEW_SECS",
                DEFAULT_WEBHOOK_MAX_SKEW_SECS,
            )?,
            mercadopago_access_token: require_env("MERCADOPAGO_ACCESS_TOKEN")?,
            free_daily_limit: parse_env("FREE_DAILY_LIMIT", 5)?,
            premium_daily_limit: parse_env("PREMIUM_DAILY_LIMIT", 100)?,
            autofill_thresholds: GateThresholds {
                personal: parse_env("AUTOFILL_MIN_PERSONAL", defaults.personal)?,
                section: parse_env("AUTOFILL_MIN_SECTION", defaults.section)?,
                summary: parse_env("AUTOFILL_MIN_SUMMARY", defaults.summary)?,
            },
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        _ => Ok(default),
    }
}
