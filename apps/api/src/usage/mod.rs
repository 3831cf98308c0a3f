//! AI usage accounting: the per-user daily quota and process-wide call stats.

pub mod quota;

use std::collections::BTreeMap;
use std::sync::Mutex;

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::llm_client::LlmOutput;
use crate::state::AppState;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestTypeStats {
    pub calls: u64,
    pub failures: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl RequestTypeStats {
    fn add_success(&mut self, output: &LlmOutput) {
        self.calls += 1;
        self.input_tokens += u64::from(output.input_tokens);
        self.output_tokens += u64::from(output.output_tokens);
    }

    fn add_failure(&mut self) {
        self.calls += 1;
        self.failures += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageStats {
    pub since: DateTime<Utc>,
    pub totals: RequestTypeStats,
    pub by_request_type: BTreeMap<String, RequestTypeStats>,
}

/// Process-wide LLM call counters. Reset on restart.
pub struct UsageTracker {
    inner: Mutex<UsageStats>,
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self {
            inner: Mutex::new(UsageStats {
                since: Utc::now(),
                totals: RequestTypeStats::default(),
                by_request_type: BTreeMap::new(),
            }),
        }
    }
}

impl UsageTracker {
    pub fn record_success(&self, request_type: &str, output: &LlmOutput) {
        let mut stats = self.lock();
        stats.totals.add_success(output);
        stats
            .by_request_type
            .entry(request_type.to_string())
            .or_default()
            .add_success(output);
    }

    pub fn record_failure(&self, request_type: &str) {
        let mut stats = self.lock();
        stats.totals.add_failure();
        stats
            .by_request_type
            .entry(request_type.to_string())
            .or_default()
            .add_failure();
    }

    pub fn snapshot(&self) -> UsageStats {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, UsageStats> {
        // Counters stay usable even if a holder panicked mid-update.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// GET /api/v1/usage/stats
pub async fn handle_usage_stats(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    Ok(Json(json!({ "gemini_usage_stats": state.usage.snapshot() })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::Provider;

    fn output(input: u32, output: u32) -> LlmOutput {
        LlmOutput {
            text: "{}".into(),
            model: "gemini-2.0-flash".into(),
            provider: Provider::Gemini,
            input_tokens: input,
            output_tokens: output,
        }
    }

    #[test]
    fn test_tracker_aggregates_per_request_type() {
        let tracker = UsageTracker::default();
        tracker.record_success("analysis", &output(100, 20));
        tracker.record_success("analysis", &output(50, 10));
        tracker.record_failure("autofill");

        let stats = tracker.snapshot();
        assert_eq!(stats.totals.calls, 3);
        assert_eq!(stats.totals.failures, 1);
        assert_eq!(stats.totals.input_tokens, 150);
        assert_eq!(stats.by_request_type["analysis"].output_tokens, 30);
        assert_eq!(stats.by_request_type["autofill"].failures, 1);
    }
}
