//! The AI paths behind the analysis endpoints, each with its fallback.
//!
//! Analysis results are cached; extraction and autofill degrade to the
//! heuristic parser when the model fails or answers with unusable JSON.

use serde_json::Value;
use tracing::{info, warn};

use crate::analysis::types::{AutofillOutcome, CVAnalysis, ExtractResponse};
use crate::autofill::mapping::HEURISTIC_WARNING;
use crate::autofill::{
    evaluate, evaluate_raw, cv_data_to_autofill, CVAutofillResult, GateDecision, GateThresholds,
    MIN_AUTOFILL_TEXT_CHARS, SHORT_TEXT_WARNING,
};
use crate::cache::{self, JsonCache, DAY};
use crate::errors::AppError;
use crate::llm_client::prompts::{
    build_analysis_prompt, build_autofill_prompt, build_extract_prompt, JSON_ONLY_SYSTEM,
    RECRUITER_SYSTEM,
};
use crate::llm_client::{InlineImage, LlmClient, LlmError, LlmOutput, LlmRequest};
use crate::parser::{extract_contacts, parse_cv_text, CVData, ExtractedContacts};
use crate::usage::UsageTracker;

pub const BLANK_WARNING: &str = "Não foi possível identificar seções no currículo";

/// True when the text is long enough to be worth an AI autofill call.
pub fn has_enough_text(text: &str) -> bool {
    text.trim().chars().count() >= MIN_AUTOFILL_TEXT_CHARS
}

/// Borrowed view of the shared services one analysis needs.
#[derive(Clone, Copy)]
pub struct AiServices<'a> {
    pub llm: &'a LlmClient,
    pub cache: &'a dyn JsonCache,
    pub usage: &'a UsageTracker,
}

impl AiServices<'_> {
    /// Generates text and records the call under `request_type`.
    pub async fn generate(
        &self,
        request_type: &str,
        req: &LlmRequest,
    ) -> Result<LlmOutput, LlmError> {
        match self.llm.generate(req).await {
            Ok(output) => {
                self.usage.record_success(request_type, &output);
                Ok(output)
            }
            Err(e) => {
                self.usage.record_failure(request_type);
                Err(e)
            }
        }
    }

    /// Like `generate`, with the answer run through JSON repair.
    /// An unrepairable answer counts as a failed call.
    pub async fn generate_json(
        &self,
        request_type: &str,
        req: &LlmRequest,
    ) -> Result<Value, LlmError> {
        match self.llm.generate_json(req).await {
            Ok((value, output)) => {
                self.usage.record_success(request_type, &output);
                Ok(value)
            }
            Err(e) => {
                self.usage.record_failure(request_type);
                Err(e)
            }
        }
    }

    pub async fn analyze(
        &self,
        text: &str,
        images: &[InlineImage],
        target_career: Option<&str>,
    ) -> Result<CVAnalysis, AppError> {
        // Image-only requests are not cached; the key covers text only.
        let key = images
            .is_empty()
            .then(|| cache::analysis_key("analysis", target_career, text));
        if let Some(key) = &key {
            if let Some(hit) = self.cache.get(key).await {
                if let Ok(analysis) = serde_json::from_value::<CVAnalysis>(hit) {
                    info!("Analysis served from cache");
                    return Ok(analysis);
                }
            }
        }

        let mut req = LlmRequest::new(build_analysis_prompt(text, target_career))
            .system(format!("{RECRUITER_SYSTEM} {JSON_ONLY_SYSTEM}"));
        req.images = images.to_vec();
        req.temperature = Some(0.3);

        let value = self.generate_json("analysis", &req).await.map_err(|e| match e {
            LlmError::Repair(e) => AppError::UpstreamJson(e.to_string()),
            other => AppError::Llm(other),
        })?;
        let analysis = serde_json::from_value::<CVAnalysis>(value)
            .map_err(|e| AppError::UpstreamJson(e.to_string()))?
            .normalized();

        if let Some(key) = &key {
            match serde_json::to_value(&analysis) {
                Ok(value) => self.cache.set(key, &value, DAY).await,
                Err(e) => warn!("Could not cache analysis: {e}"),
            }
        }
        Ok(analysis)
    }

    /// Structured extraction. Falls back to the heuristic parser when the model fails.
    pub async fn extract(&self, text: &str, images: &[InlineImage]) -> ExtractResponse {
        let contacts = extract_contacts(text);

        let mut req = LlmRequest::new(build_extract_prompt(text)).system(JSON_ONLY_SYSTEM);
        req.images = images.to_vec();
        req.temperature = Some(0.1);

        let structured = match self.generate_json("extract", &req).await {
            Ok(value) => match serde_json::from_value::<CVData>(value) {
                Ok(data) => data,
                Err(e) => {
                    warn!("Extraction JSON did not match the schema, using heuristic parser: {e}");
                    parse_cv_text(text)
                }
            },
            Err(e) => {
                warn!("AI extraction failed, using heuristic parser: {e}");
                parse_cv_text(text)
            }
        };

        ExtractResponse {
            structured_cv: fill_contacts(structured, &contacts),
            extracted_contacts: contacts,
        }
    }

    /// Autofill with degradation: AI JSON, then heuristic parser, then blank.
    ///
    /// Text below the minimum length never reaches the model.
    pub async fn autofill(&self, text: &str, thresholds: &GateThresholds) -> AutofillOutcome {
        if !has_enough_text(text) {
            info!("Autofill skipped: text too short");
            let result = CVAutofillResult::empty_with_warning(SHORT_TEXT_WARNING);
            let decision = evaluate(&result, thresholds);
            return AutofillOutcome { result, decision };
        }

        let req = LlmRequest::new(build_autofill_prompt(text)).system(JSON_ONLY_SYSTEM);
        let mut structure_reasons = Vec::new();
        match self.generate_json("autofill", &req).await {
            Ok(raw) => match evaluate_raw(&raw, thresholds) {
                (Some(result), decision) => return AutofillOutcome { result, decision },
                (None, GateDecision::ManualReview { reasons }) => {
                    warn!("Autofill JSON failed structural checks: {}", reasons.join("; "));
                    structure_reasons = reasons;
                }
                (None, GateDecision::AutoApply) => {}
            },
            Err(e) => warn!("AI autofill failed, using heuristic parser: {e}"),
        }

        let result = heuristic_autofill(text);
        let decision = match evaluate(&result, thresholds) {
            GateDecision::ManualReview { mut reasons } => {
                structure_reasons.append(&mut reasons);
                GateDecision::ManualReview {
                    reasons: structure_reasons,
                }
            }
            GateDecision::AutoApply if structure_reasons.is_empty() => GateDecision::AutoApply,
            GateDecision::AutoApply => GateDecision::ManualReview {
                reasons: structure_reasons,
            },
        };
        AutofillOutcome { result, decision }
    }
}

/// Local fallback: heuristic parse, or a blank result when nothing was found.
pub fn heuristic_autofill(text: &str) -> CVAutofillResult {
    let data = parse_cv_text(text);
    if data.has_body() || !data.name.is_empty() {
        cv_data_to_autofill(&data)
    } else {
        let mut result = CVAutofillResult::empty_with_warning(HEURISTIC_WARNING);
        result.warnings.push(BLANK_WARNING.to_string());
        result
    }
}

/// Regex hits fill whatever the structured result left empty.
fn fill_contacts(mut data: CVData, contacts: &ExtractedContacts) -> CVData {
    let pairs = [
        (&mut data.email, &contacts.email),
        (&mut data.phone, &contacts.phone),
        (&mut data.linkedin, &contacts.linkedin),
    ];
    for (field, found) in pairs {
        if field.trim().is_empty() {
            if let Some(found) = found {
                *field = found.clone();
            }
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::MemoryCache;
    use crate::llm_client::LlmSettings;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CV: &str = "Ana Lima\n\
        ana.lima@email.com | (11) 98765-4321\n\
        linkedin.com/in/analima\n\
        \n\
        Resumo\n\
        Engenheira de dados com oito anos de experiência em pipelines e governança.\n\
        \n\
        Experiência\n\
        ACME – Engenheira de Dados (jan 2020 - Atual)\n\
        Construção de pipelines em Spark e Airflow para o time de risco.\n\
        \n\
        Formação\n\
        USP – Bacharelado em Ciência da Computação (2012 - 2016)\n\
        \n\
        Habilidades\n\
        Python\nSQL\nSpark\n";

    fn gemini_text(text: &str) -> Value {
        json!({
            "candidates": [{ "content": { "parts": [{ "text": text }] } }],
            "usageMetadata": { "promptTokenCount": 10, "candidatesTokenCount": 5 }
        })
    }

    fn llm_for(server: &MockServer) -> LlmClient {
        let mut settings = LlmSettings::new("test-key".into());
        settings.gemini_base_url = server.uri();
        settings.retry.base_delay = Duration::from_millis(1);
        LlmClient::new(settings)
    }

    async fn respond_with(server: &MockServer, status: u16, body: Value) {
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_short_text_never_calls_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(gemini_text("{}")))
            .expect(0)
            .mount(&server)
            .await;
        let llm = llm_for(&server);
        let cache = MemoryCache::default();
        let usage = UsageTracker::default();
        let ai = AiServices { llm: &llm, cache: &cache, usage: &usage };

        let outcome = ai.autofill("Ana Lima\nDev", &GateThresholds::default()).await;
        assert_eq!(outcome.result.warnings, vec![SHORT_TEXT_WARNING.to_string()]);
        assert!(!outcome.decision.is_auto_apply());
        assert_eq!(usage.snapshot().totals.calls, 0);
    }

    #[tokio::test]
    async fn test_autofill_confident_ai_result_auto_applies() {
        let server = MockServer::start().await;
        let answer = json!({
            "ok": true,
            "applyMode": "replace",
            "patch": {
                "personal": { "name": "Ana Lima", "email": "ana.lima@email.com" },
                "summary": "<p>Engenheira de dados</p>",
                "experience": [{ "title": "Engenheira de Dados", "subtitle": "ACME", "date": "01/2020 - Atual" }],
                "skills": ["Python", "SQL"]
            },
            "confidence": { "personal": 90, "summary": 80, "experience": 85 },
            "warnings": []
        });
        respond_with(&server, 200, gemini_text(&format!("```json\n{answer}\n```"))).await;
        let llm = llm_for(&server);
        let cache = MemoryCache::default();
        let usage = UsageTracker::default();
        let ai = AiServices { llm: &llm, cache: &cache, usage: &usage };

        let outcome = ai.autofill(CV, &GateThresholds::default()).await;
        assert!(outcome.decision.is_auto_apply());
        assert_eq!(outcome.result.patch.personal.name, "Ana Lima");
        assert_eq!(usage.snapshot().by_request_type["autofill"].calls, 1);
    }

    #[tokio::test]
    async fn test_autofill_falls_back_to_heuristics_on_garbage() {
        let server = MockServer::start().await;
        respond_with(&server, 200, gemini_text("desculpe, não consigo")).await;
        let llm = llm_for(&server);
        let cache = MemoryCache::default();
        let usage = UsageTracker::default();
        let ai = AiServices { llm: &llm, cache: &cache, usage: &usage };

        let outcome = ai.autofill(CV, &GateThresholds::default()).await;
        assert!(!outcome.decision.is_auto_apply());
        assert_eq!(outcome.result.patch.personal.email, "ana.lima@email.com");
        assert!(outcome.result.warnings.contains(&HEURISTIC_WARNING.to_string()));
    }

    #[tokio::test]
    async fn test_extract_falls_back_when_provider_rejects() {
        let server = MockServer::start().await;
        respond_with(&server, 401, json!({ "error": { "message": "API key not valid" } })).await;
        let llm = llm_for(&server);
        let cache = MemoryCache::default();
        let usage = UsageTracker::default();
        let ai = AiServices { llm: &llm, cache: &cache, usage: &usage };

        let response = ai.extract(CV, &[]).await;
        assert_eq!(response.structured_cv.name, "Ana Lima");
        assert_eq!(
            response.extracted_contacts.email.as_deref(),
            Some("ana.lima@email.com")
        );
        assert_eq!(usage.snapshot().totals.failures, 1);
    }

    #[tokio::test]
    async fn test_analysis_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(gemini_text(
                r#"{"score": 81, "summary": "Sólido", "sections": [], "red_flags": []}"#,
            )))
            .expect(1)
            .mount(&server)
            .await;
        let llm = llm_for(&server);
        let cache = MemoryCache::default();
        let usage = UsageTracker::default();
        let ai = AiServices { llm: &llm, cache: &cache, usage: &usage };

        let first = ai.analyze(CV, &[], Some("Dados")).await.unwrap();
        let second = ai.analyze(CV, &[], Some("dados")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.score, 81.0);

        let entries = cache.entries.lock().unwrap();
        let (_, ttl) = entries.values().next().unwrap();
        assert_eq!(*ttl, DAY);
    }

    #[test]
    fn test_heuristic_autofill_blank_when_nothing_found() {
        let result = heuristic_autofill("   \n  \n");
        assert!(!result.ok);
        assert!(result.warnings.contains(&BLANK_WARNING.to_string()));
    }

    #[test]
    fn test_fill_contacts_keeps_model_values() {
        let data = CVData {
            email: "model@x.com".into(),
            ..Default::default()
        };
        let contacts = ExtractedContacts {
            email: Some("regex@x.com".into()),
            phone: Some("11987654321".into()),
            ..Default::default()
        };
        let filled = fill_contacts(data, &contacts);
        assert_eq!(filled.email, "model@x.com");
        assert_eq!(filled.phone, "11987654321");
    }
}
