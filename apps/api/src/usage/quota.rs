//! Daily AI request quota, keyed by user and UTC day.

use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::user::{Role, UserRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    pub free: i32,
    pub premium: i32,
}

impl QuotaLimits {
    pub fn for_role(&self, role: Role) -> i32 {
        match role {
            Role::Free => self.free,
            Role::Premium => self.premium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    pub allowed: bool,
    pub used: i32,
    pub daily_limit: i32,
}

/// Quota backend. Carried in `AppState` as `Arc<dyn QuotaStore>`.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    async fn role(&self, user_id: Uuid) -> Result<Role, AppError>;

    /// Counts one request against today's quota, refusing once `limit` is hit.
    async fn try_consume(&self, user_id: Uuid, limit: i32) -> Result<QuotaStatus, AppError>;
}

/// Resolves the caller's limit and consumes one unit, or fails with 429.
pub async fn enforce(
    store: &dyn QuotaStore,
    limits: &QuotaLimits,
    user_id: Uuid,
) -> Result<QuotaStatus, AppError> {
    let role = store.role(user_id).await?;
    let limit = limits.for_role(role);
    let status = store.try_consume(user_id, limit).await?;
    if !status.allowed {
        info!("User {user_id} hit the daily limit of {limit} ({})", role.as_str());
        return Err(AppError::QuotaExceeded { daily_limit: limit });
    }
    debug!("User {user_id} AI usage {}/{}", status.used, status.daily_limit);
    Ok(status)
}

pub struct PgQuotaStore {
    pool: PgPool,
}

impl PgQuotaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuotaStore for PgQuotaStore {
    async fn role(&self, user_id: Uuid) -> Result<Role, AppError> {
        let user = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user.map_or(Role::Free, |u| u.role()))
    }

    async fn try_consume(&self, user_id: Uuid, limit: i32) -> Result<QuotaStatus, AppError> {
        // The conditional upsert keeps the check and the increment atomic.
        let used: Option<i32> = sqlx::query_scalar(
            r#"
            INSERT INTO ai_usage (user_id, day, request_count)
            VALUES ($1, CURRENT_DATE, 1)
            ON CONFLICT (user_id, day) DO UPDATE
                SET request_count = ai_usage.request_count + 1
                WHERE ai_usage.request_count < $2
            RETURNING request_count
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match used {
            Some(used) => QuotaStatus {
                allowed: true,
                used,
                daily_limit: limit,
            },
            None => QuotaStatus {
                allowed: false,
                used: limit,
                daily_limit: limit,
            },
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory quota for handler tests.
    #[derive(Default)]
    pub struct MemoryQuotaStore {
        pub roles: Mutex<HashMap<Uuid, Role>>,
        pub used: Mutex<HashMap<Uuid, i32>>,
    }

    #[async_trait]
    impl QuotaStore for MemoryQuotaStore {
        async fn role(&self, user_id: Uuid) -> Result<Role, AppError> {
            Ok(self
                .roles
                .lock()
                .unwrap()
                .get(&user_id)
                .copied()
                .unwrap_or(Role::Free))
        }

        async fn try_consume(&self, user_id: Uuid, limit: i32) -> Result<QuotaStatus, AppError> {
            let mut used = self.used.lock().unwrap();
            let count = used.entry(user_id).or_insert(0);
            if *count >= limit {
                return Ok(QuotaStatus {
                    allowed: false,
                    used: *count,
                    daily_limit: limit,
                });
            }
            *count += 1;
            Ok(QuotaStatus {
                allowed: true,
                used: *count,
                daily_limit: limit,
            })
        }
    }
}
