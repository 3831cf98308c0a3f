//! Career lookups: LLM-generated career details, cached for a day.

use std::future::Future;

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::analysis::service::AiServices;
use crate::auth::AuthUser;
use crate::cache::{career_details_key, DAY};
use crate::errors::AppError;
use crate::llm_client::prompts::{build_career_details_prompt, JSON_ONLY_SYSTEM};
use crate::llm_client::{LlmError, LlmRequest};
use crate::state::AppState;
use crate::usage::quota;

#[derive(Debug, Clone, Deserialize)]
pub struct CareerDetailsRequest {
    pub query: String,
    pub category: Option<String>,
    #[serde(default)]
    pub offset: u32,
    pub email: Option<String>,
}

/// `{ careers: [...] }` regardless of whether the model wrapped the list.
fn normalize_careers(value: Value) -> Value {
    match value {
        Value::Array(items) => json!({ "careers": items }),
        Value::Object(ref obj) if obj.get("careers").is_some_and(Value::is_array) => value,
        other => json!({ "careers": [other] }),
    }
}

/// Cached lookup; only a cache miss reaches the model. `on_miss` is awaited
/// just before the model call and can veto it.
pub async fn career_details<F, T>(
    ai: AiServices<'_>,
    req: &CareerDetailsRequest,
    on_miss: F,
) -> Result<(Value, bool), AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    let key = career_details_key(
        &req.query,
        req.category.as_deref(),
        req.offset,
        req.email.as_deref(),
    );
    if let Some(hit) = ai.cache.get(&key).await {
        return Ok((hit, true));
    }
    on_miss.await?;

    let prompt = build_career_details_prompt(&req.query, req.category.as_deref(), req.offset);
    let mut llm_req = LlmRequest::new(prompt).system(JSON_ONLY_SYSTEM);
    llm_req.temperature = Some(0.4);

    let value = ai
        .generate_json("career_details", &llm_req)
        .await
        .map_err(|e| match e {
            LlmError::Repair(e) => AppError::UpstreamJson(e.to_string()),
            other => AppError::Llm(other),
        })?;
    let careers = normalize_careers(value);
    ai.cache.set(&key, &careers, DAY).await;
    Ok((careers, false))
}

/// POST /api/v1/careers/details
pub async fn handle_career_details(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<CareerDetailsRequest>,
) -> Result<Json<Value>, AppError> {
    if req.query.trim().is_empty() {
        return Err(AppError::Validation("query is required".into()));
    }

    let ai = AiServices {
        llm: &state.llm,
        cache: state.cache.as_ref(),
        usage: &state.usage,
    };
    // Cached answers are free.
    let charge = quota::enforce(state.quota.as_ref(), &state.quota_limits, user_id);
    let (careers, cached) = career_details(ai, &req, charge).await?;
    info!("Career details for '{}' (cached: {cached})", req.query.trim());
    Ok(Json(careers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::MemoryCache;
    use crate::llm_client::{LlmClient, LlmSettings};
    use crate::usage::UsageTracker;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_normalize_careers() {
        let wrapped = normalize_careers(json!([{ "title": "Analista" }]));
        assert_eq!(wrapped["careers"][0]["title"], "Analista");
        let kept = normalize_careers(json!({ "careers": [] }));
        assert_eq!(kept, json!({ "careers": [] }));
        let single = normalize_careers(json!({ "title": "Cientista" }));
        assert_eq!(single["careers"][0]["title"], "Cientista");
    }

    #[tokio::test]
    async fn test_second_lookup_served_from_cache() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "[{\"title\": \"Engenheiro de Dados\"}]" }] } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut settings = LlmSettings::new("k".into());
        settings.gemini_base_url = server.uri();
        settings.retry.base_delay = Duration::from_millis(1);
        let llm = LlmClient::new(settings);
        let cache = MemoryCache::default();
        let usage = UsageTracker::default();
        let ai = AiServices { llm: &llm, cache: &cache, usage: &usage };

        let req = CareerDetailsRequest {
            query: "Dados".into(),
            category: Some("Tecnologia".into()),
            offset: 0,
            email: None,
        };
        let (first, cached) = career_details(ai, &req, async { Ok(()) }).await.unwrap();
        assert!(!cached);
        assert_eq!(first["careers"][0]["title"], "Engenheiro de Dados");

        let req = CareerDetailsRequest {
            query: "  dados ".into(),
            ..req
        };
        // A hit never reaches the miss hook.
        let denied = async { Err::<(), _>(AppError::Validation("quota".into())) };
        let (second, cached) = career_details(ai, &req, denied).await.unwrap();
        assert!(cached);
        assert_eq!(first, second);
    }
}
