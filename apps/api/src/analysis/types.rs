use serde::{Deserialize, Serialize};

use crate::autofill::{CVAutofillResult, GateDecision};
use crate::cv::EditableCV;
use crate::llm_client::InlineImage;
use crate::parser::contacts::ExtractedContacts;
use crate::parser::CVData;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    #[default]
    Analysis,
    Extract,
    Autofill,
}

impl AnalysisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::Analysis => "analysis",
            AnalysisMode::Extract => "extract",
            AnalysisMode::Autofill => "autofill",
        }
    }
}

/// Body of `POST /functions/analyze-cv`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub text: Option<String>,
    pub images: Vec<InlineImage>,
    pub filename: Option<String>,
    pub target_career: Option<String>,
    pub mode: AnalysisMode,
}

impl AnalyzeRequest {
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionFeedback {
    pub section: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Read-only review shown next to the editor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CVAnalysis {
    pub score: f32,
    pub summary: String,
    pub sections: Vec<SectionFeedback>,
    pub red_flags: Vec<String>,
}

impl CVAnalysis {
    /// Clamps the score into 0..=100; models occasionally answer on a 0..=10 scale.
    pub fn normalized(mut self) -> Self {
        if self.score > 0.0 && self.score <= 10.0 && self.score.fract() != 0.0 {
            self.score *= 10.0;
        }
        self.score = self.score.clamp(0.0, 100.0).round();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractResponse {
    pub structured_cv: CVData,
    pub extracted_contacts: ExtractedContacts,
}

/// Autofill result together with the gate's verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutofillOutcome {
    pub result: CVAutofillResult,
    pub decision: GateDecision,
}

/// Response of `POST /api/v1/cv/import`.
#[derive(Debug, Clone, Serialize)]
pub struct ImportResponse {
    pub autofill: CVAutofillResult,
    pub decision: GateDecision,
    pub document: EditableCV,
}
