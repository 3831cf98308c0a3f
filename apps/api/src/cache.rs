//! Best-effort JSON cache for LLM results.
//!
//! A cache failure never fails the request: reads degrade to a miss and
//! writes are dropped with a log line.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, error, warn};

pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[async_trait]
pub trait JsonCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;
    async fn set(&self, key: &str, value: &Value, ttl: Duration);
}

pub struct RedisCache {
    client: redis::Client,
}

impl RedisCache {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl JsonCache for RedisCache {
    async fn get(&self, key: &str) -> Option<Value> {
        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(c) => c,
            Err(e) => {
                error!("Redis connection error: {e}");
                return None;
            }
        };
        match conn.get::<_, Option<String>>(key).await {
            Ok(Some(data)) => match serde_json::from_str(&data) {
                Ok(value) => {
                    debug!("Cache HIT: {key}");
                    Some(value)
                }
                Err(e) => {
                    warn!("Cache entry {key} is not JSON: {e}");
                    None
                }
            },
            Ok(None) => {
                debug!("Cache MISS: {key}");
                None
            }
            Err(e) => {
                error!("Redis GET error: {e}");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &Value, ttl: Duration) {
        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(c) => c,
            Err(e) => {
                error!("Redis connection error: {e}");
                return;
            }
        };
        match conn
            .set_ex::<_, _, ()>(key, value.to_string(), ttl.as_secs())
            .await
        {
            Ok(()) => debug!("Cache SET: {key} (TTL: {}s)", ttl.as_secs()),
            Err(e) => error!("Redis SET error: {e}"),
        }
    }
}

fn sha256_hex(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// Lowercase, trimmed, inner whitespace collapsed.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// `analysis_<sha256>` over the mode, target career and CV text.
pub fn analysis_key(mode: &str, target_career: Option<&str>, text: &str) -> String {
    let target = normalize(target_career.unwrap_or_default());
    format!("analysis_{}", sha256_hex(&[mode, &target, text]))
}

pub fn career_details_key(
    query: &str,
    category: Option<&str>,
    offset: u32,
    email: Option<&str>,
) -> String {
    let offset = offset.to_string();
    let hash = sha256_hex(&[
        &normalize(query),
        &normalize(category.unwrap_or_default()),
        &offset,
        &normalize(email.unwrap_or_default()),
    ]);
    format!("career_details_{}", &hash[..32])
}
