use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One processed webhook notification. `event_id` is the dedup key.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentEventRow {
    pub event_id: String,
    pub payment_id: String,
    pub user_id: Option<Uuid>,
    pub status: String,
    pub received_at: DateTime<Utc>,
}
