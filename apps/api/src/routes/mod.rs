pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;
use crate::{analysis, careers, cv, drafts, payments, usage};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Edge functions
        .route(
            "/functions/gemini-json",
            post(analysis::handle_gemini_json),
        )
        .route("/functions/analyze-cv", post(analysis::handle_analyze_cv))
        .route(
            "/functions/webhook-mercadopago",
            post(payments::handle_mercadopago_webhook),
        )
        // CV document API
        .route("/api/v1/cv/import", post(analysis::handle_import_cv))
        .route("/api/v1/cv/patch", post(cv::handlers::handle_apply_patches))
        .route(
            "/api/v1/cv/actions",
            post(cv::handlers::handle_dispatch_actions),
        )
        .route(
            "/api/v1/cv/apply-contacts",
            post(cv::handlers::handle_apply_contacts),
        )
        .route("/api/v1/cv/export", post(cv::handlers::handle_export))
        // Drafts
        .route(
            "/api/v1/drafts/:id",
            get(drafts::handle_get_draft)
                .put(drafts::handle_put_draft)
                .delete(drafts::handle_delete_draft),
        )
        // Careers and usage
        .route(
            "/api/v1/careers/details",
            post(careers::handle_career_details),
        )
        .route("/api/v1/usage/stats", get(usage::handle_usage_stats))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::auth::USER_ID_HEADER;
    use crate::autofill::{GateThresholds, SHORT_TEXT_WARNING};
    use crate::cache::testing::MemoryCache;
    use crate::config::Config;
    use crate::cv::autosave::DEFAULT_DEBOUNCE;
    use crate::drafts::testing::MemoryDraftSink;
    use crate::drafts::AutosaveRegistry;
    use crate::llm_client::{LlmClient, LlmSettings};
    use crate::payments::gateway::PaymentInfo;
    use crate::payments::testing::{FixedGateway, MemoryLedger};
    use crate::usage::quota::testing::MemoryQuotaStore;
    use crate::usage::quota::QuotaLimits;
    use crate::usage::UsageTracker;

    fn test_config() -> Config {
        Config {
            database_url: "postgres://localhost/cvkit".into(),
            redis_url: "redis://localhost".into(),
            s3_bucket: "drafts".into(),
            s3_endpoint: "http://localhost:9000".into(),
            aws_access_key_id: "minio".into(),
            aws_secret_access_key: "minio123".into(),
            gemini_api_key: "test-key".into(),
            openai_api_key: None,
            gemini_model: "gemini-2.0-flash".into(),
            mercadopago_webhook_secret: "secret".into(),
            mercadopago_webhook_max_skew_secs: 300,
            mercadopago_access_token: "token".into(),
            free_daily_limit: 1,
            premium_daily_limit: 10,
            autofill_thresholds: GateThresholds::default(),
            port: 0,
            rust_log: "debug".into(),
        }
    }

    struct Harness {
        state: AppState,
        quota: Arc<MemoryQuotaStore>,
        sink: Arc<MemoryDraftSink>,
    }

    fn harness() -> Harness {
        let config = test_config();
        let mut settings = LlmSettings::new(config.gemini_api_key.clone());
        // Nothing listens here; tests below must not reach the model.
        settings.gemini_base_url = "http://127.0.0.1:9".into();
        let quota = Arc::new(MemoryQuotaStore::default());
        let sink = Arc::new(MemoryDraftSink::default());
        let state = AppState {
            quota_limits: QuotaLimits {
                free: config.free_daily_limit,
                premium: config.premium_daily_limit,
            },
            config,
            llm: LlmClient::new(settings),
            quota: quota.clone(),
            cache: Arc::new(MemoryCache::default()),
            drafts: Arc::new(AutosaveRegistry::new(sink.clone(), DEFAULT_DEBOUNCE)),
            payments: Arc::new(FixedGateway(PaymentInfo {
                id: "1".into(),
                status: "approved".into(),
                external_reference: None,
            })),
            payment_ledger: Arc::new(MemoryLedger::default()),
            usage: Arc::new(UsageTracker::default()),
        };
        Harness { state, quota, sink }
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn multipart_request(user: Uuid, fields: &[(&str, &str)]) -> Request<Body> {
        let boundary = "cvkit-boundary";
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!("--{boundary}--\r\n"));
        Request::builder()
            .method("POST")
            .uri("/api/v1/cv/import")
            .header(USER_ID_HEADER, user.to_string())
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = build_router(harness().state);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["service"], "cvkit-api");
    }

    #[tokio::test]
    async fn test_short_import_skips_ai_and_quota() {
        let h = harness();
        let app = build_router(h.state.clone());
        let user = Uuid::new_v4();
        let draft = Uuid::new_v4().to_string();

        let response = app
            .oneshot(multipart_request(
                user,
                &[("text", "Ana Lima\nana@x.com"), ("draft_id", draft.as_str())],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["autofill"]["warnings"], json!([SHORT_TEXT_WARNING]));
        assert_eq!(body["decision"]["decision"], "manual_review");
        assert!(h.quota.used.lock().unwrap().is_empty());
        assert_eq!(h.state.usage.snapshot().totals.calls, 0);
        assert_eq!(h.sink.blobs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let app = build_router(harness().state);
        let response = app
            .oneshot(
                Request::post("/functions/gemini-json")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({ "prompt": "oi" }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_quota_denial_shape() {
        let h = harness();
        let user = Uuid::new_v4();
        h.quota.used.lock().unwrap().insert(user, 1);
        let app = build_router(h.state);

        let response = app
            .oneshot(
                Request::post("/functions/gemini-json")
                    .header(USER_ID_HEADER, user.to_string())
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({ "prompt": "oi", "requestType": "chat" }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_json(response).await["dailyLimit"], 1);
    }

    #[tokio::test]
    async fn test_webhook_without_signature_rejected() {
        let app = build_router(harness().state);
        let response = app
            .oneshot(
                Request::post("/functions/webhook-mercadopago?data.id=1&type=payment")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({ "type": "payment", "data": { "id": "1" } }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_draft_put_then_get() {
        let app = build_router(harness().state);
        let user = Uuid::new_v4();
        let draft = Uuid::new_v4();
        let doc = crate::cv::EditableCV::empty();
        let uri = format!("/api/v1/drafts/{draft}");

        let put = app
            .clone()
            .oneshot(
                Request::put(&uri)
                    .header(USER_ID_HEADER, user.to_string())
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_string(&doc).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(put.status(), StatusCode::ACCEPTED);

        let get = app
            .oneshot(
                Request::get(&uri)
                    .header(USER_ID_HEADER, user.to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(get.status(), StatusCode::OK);
        assert_eq!(body_json(get).await["id"], json!(doc.id));
    }
}
