//! AI edge functions (`/functions/*`) and the CV import endpoint.

pub mod service;
pub mod types;
pub mod upload;

use axum::{
    extract::{Multipart, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::auth::AuthUser;
use crate::autofill::{apply_contacts_only, autofill_to_document};
use crate::cv::autosave::DraftKey;
use crate::cv::EditableCV;
use crate::errors::AppError;
use crate::json_repair::repair_json;
use crate::llm_client::{InlineImage, LlmRequest};
use crate::state::AppState;
use crate::usage::quota;

use service::{has_enough_text, AiServices};
use types::{AnalysisMode, AnalyzeRequest, ImportResponse};

fn ai(state: &AppState) -> AiServices<'_> {
    AiServices {
        llm: &state.llm,
        cache: state.cache.as_ref(),
        usage: &state.usage,
    }
}

async fn consume_quota(state: &AppState, user: &AuthUser) -> Result<(), AppError> {
    quota::enforce(state.quota.as_ref(), &state.quota_limits, user.0).await?;
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// POST /functions/gemini-json
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    #[default]
    Json,
    Text,
}

fn default_request_type() -> String {
    "generic".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiJsonRequest {
    pub prompt: String,
    #[serde(default = "default_request_type")]
    pub request_type: String,
    #[serde(default)]
    pub mode: ResponseMode,
    pub system: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub model: Option<String>,
    #[serde(default)]
    pub images: Vec<InlineImage>,
}

/// Generic LLM proxy. JSON mode answers `{ data }`, text mode `{ text }`.
pub async fn handle_gemini_json(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<GeminiJsonRequest>,
) -> Result<Response, AppError> {
    if req.prompt.trim().is_empty() {
        return Err(AppError::Validation("prompt is required".into()));
    }
    consume_quota(&state, &user).await?;

    let mut llm_req = LlmRequest::new(req.prompt);
    llm_req.system = req.system;
    llm_req.temperature = req.temperature;
    llm_req.max_output_tokens = req.max_output_tokens;
    llm_req.model = req.model;
    llm_req.images = req.images;
    llm_req.json = req.mode == ResponseMode::Json;

    let output = ai(&state).generate(&req.request_type, &llm_req).await?;
    info!(
        "gemini-json '{}' answered by {} ({} output tokens)",
        req.request_type, output.model, output.output_tokens
    );

    match req.mode {
        ResponseMode::Json => {
            let data =
                repair_json(&output.text).map_err(|e| AppError::UpstreamJson(e.to_string()))?;
            Ok(Json(json!({ "data": data })).into_response())
        }
        ResponseMode::Text => Ok(Json(json!({ "text": output.text })).into_response()),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// POST /functions/analyze-cv
// ────────────────────────────────────────────────────────────────────────────

pub async fn handle_analyze_cv(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Response, AppError> {
    let text = req.text().trim();
    if text.is_empty() && req.images.is_empty() {
        return Err(AppError::Validation(
            "Envie o texto ou as imagens do currículo".into(),
        ));
    }
    info!(
        "analyze-cv mode={} file={}",
        req.mode.as_str(),
        req.filename.as_deref().unwrap_or("-")
    );

    match req.mode {
        AnalysisMode::Analysis => {
            consume_quota(&state, &user).await?;
            let analysis = ai(&state)
                .analyze(text, &req.images, req.target_career.as_deref())
                .await?;
            Ok(Json(json!({ "analysis": analysis })).into_response())
        }
        AnalysisMode::Extract => {
            consume_quota(&state, &user).await?;
            let extracted = ai(&state).extract(text, &req.images).await;
            Ok(Json(extracted).into_response())
        }
        AnalysisMode::Autofill => {
            // Short texts get the default result without touching the quota.
            if has_enough_text(text) {
                consume_quota(&state, &user).await?;
            }
            let outcome = ai(&state)
                .autofill(text, &state.config.autofill_thresholds)
                .await;
            Ok(Json(outcome.result).into_response())
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// POST /api/v1/cv/import
// ────────────────────────────────────────────────────────────────────────────

/// Multipart upload (`file` as PDF or text, or a `text` field, plus an
/// optional `draft_id`). Auto-applied results become the new document;
/// otherwise only the contact details are applied to a blank one.
pub async fn handle_import_cv(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<Json<ImportResponse>, AppError> {
    let upload = upload::read_import(multipart).await?;

    if has_enough_text(&upload.text) {
        consume_quota(&state, &user).await?;
    }
    let outcome = ai(&state)
        .autofill(&upload.text, &state.config.autofill_thresholds)
        .await;

    let document = if outcome.decision.is_auto_apply() {
        autofill_to_document(&outcome.result)
    } else {
        apply_contacts_only(&EditableCV::empty(), &outcome.result.patch)
    };

    if let Some(draft_id) = upload.draft_id {
        let key = DraftKey::new(user.0, draft_id);
        state.drafts.import(&key, &document).await?;
        info!("Imported {} into draft {key}", upload.filename.as_deref().unwrap_or("text"));
    }

    Ok(Json(ImportResponse {
        autofill: outcome.result,
        decision: outcome.decision,
        document,
    }))
}
