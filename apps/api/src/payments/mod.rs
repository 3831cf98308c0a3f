//! MercadoPago payment notifications.
//!
//! Each notification is verified, deduplicated by event id, resolved against
//! the payments API and, when approved, promotes the paying user to premium.

pub mod gateway;
pub mod signature;

use std::collections::HashMap;

use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::payment::PaymentEventRow;
use crate::models::user::Role;
use crate::state::AppState;

use gateway::PaymentGateway;
use signature::{SignatureHeader, WebhookError};

impl From<WebhookError> for AppError {
    fn from(e: WebhookError) -> Self {
        warn!("Rejected payment webhook: {e}");
        AppError::InvalidSignature
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPaymentEvent {
    pub event_id: String,
    pub payment_id: String,
    pub user_id: Option<Uuid>,
    pub status: String,
}

/// Processed-event ledger and role updates. Carried as `Arc<dyn PaymentLedger>`.
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    async fn find(&self, event_id: &str) -> Result<Option<PaymentEventRow>, AppError>;

    /// Returns `false` when the event was already recorded.
    async fn record(&self, event: &NewPaymentEvent) -> Result<bool, AppError>;

    async fn promote(&self, user_id: Uuid, role: Role) -> Result<(), AppError>;
}

pub struct PgPaymentLedger {
    pool: PgPool,
}

impl PgPaymentLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentLedger for PgPaymentLedger {
    async fn find(&self, event_id: &str) -> Result<Option<PaymentEventRow>, AppError> {
        Ok(
            sqlx::query_as::<_, PaymentEventRow>(
                "SELECT * FROM payment_events WHERE event_id = $1",
            )
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?,
        )
    }

    async fn record(&self, event: &NewPaymentEvent) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO payment_events (event_id, payment_id, user_id, status)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&event.event_id)
        .bind(&event.payment_id)
        .bind(event.user_id)
        .bind(&event.status)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn promote(&self, user_id: Uuid, role: Role) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, role, premium_since)
            VALUES ($1, $2, now())
            ON CONFLICT (id) DO UPDATE
                SET role = EXCLUDED.role,
                    premium_since = COALESCE(users.premium_since, EXCLUDED.premium_since)
            "#,
        )
        .bind(user_id)
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Ignored {
        reason: String,
    },
    Duplicate {
        event_id: String,
    },
    Processed {
        payment_id: String,
        payment_status: String,
        promoted: bool,
    },
}

/// Signature verification settings.
#[derive(Debug, Clone, Copy)]
pub struct WebhookPolicy<'a> {
    pub secret: &'a str,
    pub max_skew_secs: u64,
}

/// What the handler pulled out of the HTTP request.
#[derive(Debug, Clone, Copy)]
pub struct Notification<'a> {
    pub signature: Option<&'a str>,
    pub request_id: Option<&'a str>,
    pub query: &'a HashMap<String, String>,
    pub body: &'a Value,
}

fn value_to_id(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl Notification<'_> {
    /// The signed id: `data.id` from the query string, else from the body.
    fn data_id(&self) -> Option<String> {
        self.query
            .get("data.id")
            .filter(|s| !s.is_empty())
            .cloned()
            .or_else(|| value_to_id(&self.body["data"]["id"]))
    }

    fn topic(&self) -> Option<String> {
        ["type", "topic"]
            .iter()
            .find_map(|k| self.body[*k].as_str().map(str::to_string))
            .or_else(|| self.query.get("type").cloned())
            .or_else(|| self.query.get("topic").cloned())
    }
}

pub async fn process_notification(
    ledger: &dyn PaymentLedger,
    gateway: &dyn PaymentGateway,
    policy: WebhookPolicy<'_>,
    notification: Notification<'_>,
) -> Result<WebhookOutcome, AppError> {
    let raw_signature = notification
        .signature
        .ok_or(WebhookError::Missing("x-signature"))?;
    let request_id = notification
        .request_id
        .ok_or(WebhookError::Missing("x-request-id"))?;
    let data_id = notification
        .data_id()
        .ok_or_else(|| AppError::Validation("data.id ausente na notificação".into()))?;

    let header = SignatureHeader::parse(raw_signature)?;
    signature::verify(policy.secret, &header, &data_id, request_id)?;
    signature::check_fresh(&header.ts, Utc::now().timestamp(), policy.max_skew_secs)?;

    let topic = notification.topic().unwrap_or_default();
    if topic != "payment" {
        info!("Ignoring MercadoPago notification of type '{topic}'");
        return Ok(WebhookOutcome::Ignored {
            reason: format!("unsupported type '{topic}'"),
        });
    }

    let event_id = value_to_id(&notification.body["id"]).unwrap_or_else(|| request_id.to_string());
    if ledger.find(&event_id).await?.is_some() {
        info!("Payment event {event_id} already processed");
        return Ok(WebhookOutcome::Duplicate { event_id });
    }

    let payment = gateway.fetch_payment(&data_id).await?;
    let user_id = payment
        .external_reference
        .as_deref()
        .and_then(|r| Uuid::parse_str(r.trim()).ok());

    // Promote before recording; the upsert is idempotent and a redelivery
    // after a failed promote must reach it again.
    let mut promoted = false;
    if payment.is_approved() {
        match user_id {
            Some(user_id) => {
                ledger.promote(user_id, Role::Premium).await?;
                info!("User {user_id} promoted to premium (payment {})", payment.id);
                promoted = true;
            }
            None => warn!(
                "Approved payment {} has no usable external_reference",
                payment.id
            ),
        }
    }

    let inserted = ledger
        .record(&NewPaymentEvent {
            event_id: event_id.clone(),
            payment_id: payment.id.clone(),
            user_id,
            status: payment.status.clone(),
        })
        .await?;
    if !inserted {
        return Ok(WebhookOutcome::Duplicate { event_id });
    }

    Ok(WebhookOutcome::Processed {
        payment_id: payment.id,
        payment_status: payment.status,
        promoted,
    })
}

/// POST /functions/webhook-mercadopago
pub async fn handle_mercadopago_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Result<Json<WebhookOutcome>, AppError> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let notification = Notification {
        signature: header("x-signature"),
        request_id: header("x-request-id"),
        query: &query,
        body: &body,
    };
    let outcome = process_notification(
        state.payment_ledger.as_ref(),
        state.payments.as_ref(),
        WebhookPolicy {
            secret: &state.config.mercadopago_webhook_secret,
            max_skew_secs: state.config.mercadopago_webhook_max_skew_secs,
        },
        notification,
    )
    .await?;
    Ok(Json(outcome))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::gateway::PaymentInfo;
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryLedger {
        pub events: Mutex<Vec<PaymentEventRow>>,
        pub promoted: Mutex<Vec<(Uuid, Role)>>,
    }

    #[async_trait]
    impl PaymentLedger for MemoryLedger {
        async fn find(&self, event_id: &str) -> Result<Option<PaymentEventRow>, AppError> {
            Ok(self
                .events
                .lock()
                .unwrap()
                .iter()
                .find(|e| e.event_id == event_id)
                .cloned())
        }

        async fn record(&self, event: &NewPaymentEvent) -> Result<bool, AppError> {
            let mut events = self.events.lock().unwrap();
            if events.iter().any(|e| e.event_id == event.event_id) {
                return Ok(false);
            }
            events.push(PaymentEventRow {
                event_id: event.event_id.clone(),
                payment_id: event.payment_id.clone(),
                user_id: event.user_id,
                status: event.status.clone(),
                received_at: Utc::now(),
            });
            Ok(true)
        }

        async fn promote(&self, user_id: Uuid, role: Role) -> Result<(), AppError> {
            self.promoted.lock().unwrap().push((user_id, role));
            Ok(())
        }
    }

    pub struct FixedGateway(pub PaymentInfo);

    #[async_trait]
    impl PaymentGateway for FixedGateway {
        async fn fetch_payment(&self, _payment_id: &str) -> Result<PaymentInfo, AppError> {
            Ok(self.0.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::gateway::PaymentInfo;
    use super::testing::{FixedGateway, MemoryLedger};
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    const SECRET: &str = "webhook-secret";

    fn policy() -> WebhookPolicy<'static> {
        WebhookPolicy {
            secret: SECRET,
            max_skew_secs: 300,
        }
    }

    fn sign_now(secret: &str) -> String {
        signature::sign(secret, "555", "req-1", &Utc::now().timestamp().to_string())
    }

    fn approved_for(user: Uuid) -> FixedGateway {
        FixedGateway(PaymentInfo {
            id: "555".into(),
            status: "approved".into(),
            external_reference: Some(user.to_string()),
        })
    }

    fn body() -> Value {
        json!({ "id": 9001, "type": "payment", "action": "payment.updated", "data": { "id": "555" } })
    }

    async fn run(
        ledger: &dyn PaymentLedger,
        gateway: &FixedGateway,
        signature: &str,
        body: &Value,
    ) -> Result<WebhookOutcome, AppError> {
        let query = HashMap::new();
        process_notification(
            ledger,
            gateway,
            policy(),
            Notification {
                signature: Some(signature),
                request_id: Some("req-1"),
                query: &query,
                body,
            },
        )
        .await
    }

    #[tokio::test]
    async fn test_approved_payment_promotes_user() {
        let user = Uuid::new_v4();
        let ledger = MemoryLedger::default();
        let sig = sign_now(SECRET);

        let outcome = run(&ledger, &approved_for(user), &sig, &body()).await.unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::Processed {
                payment_id: "555".into(),
                payment_status: "approved".into(),
                promoted: true,
            }
        );
        assert_eq!(*ledger.promoted.lock().unwrap(), vec![(user, Role::Premium)]);
        assert_eq!(ledger.events.lock().unwrap()[0].event_id, "9001");
    }

    #[tokio::test]
    async fn test_redelivery_is_deduplicated() {
        let user = Uuid::new_v4();
        let ledger = MemoryLedger::default();
        let gateway = approved_for(user);
        let sig = sign_now(SECRET);

        run(&ledger, &gateway, &sig, &body()).await.unwrap();
        let second = run(&ledger, &gateway, &sig, &body()).await.unwrap();
        assert_eq!(
            second,
            WebhookOutcome::Duplicate {
                event_id: "9001".into()
            }
        );
        assert_eq!(ledger.promoted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_signature_rejected() {
        let ledger = MemoryLedger::default();
        let sig = sign_now("wrong");
        let result = run(&ledger, &approved_for(Uuid::new_v4()), &sig, &body()).await;
        assert!(matches!(result, Err(AppError::InvalidSignature)));
        assert!(ledger.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pending_payment_not_promoted() {
        let ledger = MemoryLedger::default();
        let gateway = FixedGateway(PaymentInfo {
            id: "555".into(),
            status: "pending".into(),
            external_reference: Some(Uuid::new_v4().to_string()),
        });
        let sig = sign_now(SECRET);
        match run(&ledger, &gateway, &sig, &body()).await.unwrap() {
            WebhookOutcome::Processed { promoted, .. } => assert!(!promoted),
            other => panic!("unexpected {other:?}"),
        }
        assert!(ledger.promoted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_topics_ignored() {
        let ledger = MemoryLedger::default();
        let sig = sign_now(SECRET);
        let body = json!({ "id": 1, "type": "merchant_order", "data": { "id": "555" } });
        let outcome = run(&ledger, &approved_for(Uuid::new_v4()), &sig, &body)
            .await
            .unwrap();
        assert!(matches!(outcome, WebhookOutcome::Ignored { .. }));
    }

    #[tokio::test]
    async fn test_stale_signature_rejected() {
        let ledger = MemoryLedger::default();
        let old = (Utc::now().timestamp() - 3600).to_string();
        let sig = signature::sign(SECRET, "555", "req-1", &old);
        let result = run(&ledger, &approved_for(Uuid::new_v4()), &sig, &body()).await;
        assert!(matches!(result, Err(AppError::InvalidSignature)));
        assert!(ledger.events.lock().unwrap().is_empty());
    }

    /// Ledger whose first promote fails.
    #[derive(Default)]
    struct FailFirstPromote {
        inner: MemoryLedger,
        failed: AtomicBool,
    }

    #[async_trait]
    impl PaymentLedger for FailFirstPromote {
        async fn find(&self, event_id: &str) -> Result<Option<PaymentEventRow>, AppError> {
            self.inner.find(event_id).await
        }

        async fn record(&self, event: &NewPaymentEvent) -> Result<bool, AppError> {
            self.inner.record(event).await
        }

        async fn promote(&self, user_id: Uuid, role: Role) -> Result<(), AppError> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(AppError::Internal(anyhow::anyhow!("db down")));
            }
            self.inner.promote(user_id, role).await
        }
    }

    #[tokio::test]
    async fn test_redelivery_after_failed_promote_still_promotes() {
        let user = Uuid::new_v4();
        let ledger = FailFirstPromote::default();
        let gateway = approved_for(user);
        let sig = sign_now(SECRET);

        assert!(run(&ledger, &gateway, &sig, &body()).await.is_err());
        assert!(ledger.inner.events.lock().unwrap().is_empty());

        let retry = run(&ledger, &gateway, &sig, &body()).await.unwrap();
        assert!(matches!(
            retry,
            WebhookOutcome::Processed { promoted: true, .. }
        ));
        assert_eq!(
            *ledger.inner.promoted.lock().unwrap(),
            vec![(user, Role::Premium)]
        );
    }
}
