//! Decides whether an autofill result may be applied without review.
//!
//! The thresholds are fixed heuristics, not a calibrated classifier. They
//! come from configuration and default to 50/35/30.

use serde::Serialize;
use serde_json::Value;

use crate::autofill::html::disallowed_tags;
use crate::autofill::types::{ApplyMode, AutofillItem, CVAutofillResult};

const REQUIRED_KEYS: [&str; 5] = ["ok", "applyMode", "patch", "confidence", "warnings"];
const MAX_SKILL_WORDS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateThresholds {
    pub personal: u8,
    pub section: u8,
    pub summary: u8,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            personal: 50,
            section: 35,
            summary: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    AutoApply,
    ManualReview { reasons: Vec<String> },
}

impl GateDecision {
    pub fn is_auto_apply(&self) -> bool {
        matches!(self, GateDecision::AutoApply)
    }
}

/// Checks the raw JSON for the top-level contract before a typed parse.
///
/// Returns the typed result, or the list of problems found.
pub fn validate_structure(raw: &Value) -> Result<CVAutofillResult, Vec<String>> {
    let Some(obj) = raw.as_object() else {
        return Err(vec!["resultado não é um objeto JSON".to_string()]);
    };

    let mut problems: Vec<String> = REQUIRED_KEYS
        .iter()
        .filter(|k| !obj.contains_key(**k))
        .map(|k| format!("campo obrigatório ausente: {k}"))
        .collect();

    if let Some(mode) = obj.get("applyMode") {
        if mode.as_str() != Some("replace") {
            problems.push(format!("applyMode inválido: {mode}"));
        }
    }

    if !problems.is_empty() {
        return Err(problems);
    }

    serde_json::from_value(raw.clone()).map_err(|e| vec![format!("formato inválido: {e}")])
}

/// Shape heuristic for a single skill string.
pub fn is_valid_skill(skill: &str) -> bool {
    let s = skill.trim();
    if s.is_empty() {
        return false;
    }
    if s.split_whitespace().count() > MAX_SKILL_WORDS {
        return false;
    }
    if s.chars().any(|c| c.is_ascii_digit()) || s.contains('/') {
        return false;
    }
    let lower = s.to_lowercase();
    !(lower.contains("http") || lower.contains("www.") || lower.contains("://"))
}

/// Structural problems in an already-typed result.
pub fn structural_problems(result: &CVAutofillResult) -> Vec<String> {
    let mut problems = Vec::new();

    if result.apply_mode != ApplyMode::Replace {
        problems.push("applyMode deve ser replace".to_string());
    }

    let bad_tags = disallowed_tags(&result.patch.summary);
    if !bad_tags.is_empty() {
        problems.push(format!("resumo contém tags não permitidas: {}", bad_tags.join(", ")));
    }

    for skill in result.patch.skills.iter().filter(|s| !is_valid_skill(s)) {
        problems.push(format!("habilidade com formato suspeito: {skill:?}"));
    }

    let groups: [(&str, &[AutofillItem]); 3] = [
        ("experience", &result.patch.experience),
        ("education", &result.patch.education),
        ("projects", &result.patch.projects),
    ];
    for (name, items) in groups {
        let untitled = items.iter().filter(|i| i.title.trim().is_empty()).count();
        if untitled > 0 {
            problems.push(format!("{name}: {untitled} item(ns) sem título"));
        }
    }

    problems
}

/// Confidence problems given the configured thresholds.
pub fn confidence_problems(result: &CVAutofillResult, t: &GateThresholds) -> Vec<String> {
    let c = &result.confidence;
    let mut problems = Vec::new();

    if c.personal < t.personal {
        problems.push(format!(
            "confiança em dados pessoais {} < {}",
            c.personal, t.personal
        ));
    }

    if c.experience.max(c.education).max(c.projects) < t.section {
        problems.push(format!(
            "nenhuma seção (experiência, formação, projetos) com confiança >= {}",
            t.section
        ));
    }

    let summary_empty = result.patch.summary.trim().is_empty();
    if !summary_empty && c.summary < t.summary {
        problems.push(format!("confiança no resumo {} < {}", c.summary, t.summary));
    }

    problems
}

pub fn evaluate(result: &CVAutofillResult, thresholds: &GateThresholds) -> GateDecision {
    let mut reasons = structural_problems(result);
    reasons.extend(confidence_problems(result, thresholds));
    if reasons.is_empty() {
        GateDecision::AutoApply
    } else {
        GateDecision::ManualReview { reasons }
    }
}

/// Full check from raw JSON: structure first, then the typed gate.
pub fn evaluate_raw(
    raw: &Value,
    thresholds: &GateThresholds,
) -> (Option<CVAutofillResult>, GateDecision) {
    match validate_structure(raw) {
        Ok(result) => {
            let decision = evaluate(&result, thresholds);
            (Some(result), decision)
        }
        Err(reasons) => (None, GateDecision::ManualReview { reasons }),
    }
}
