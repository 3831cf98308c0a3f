use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Warning attached when the uploaded text is too short to be worth an AI call.
pub const SHORT_TEXT_WARNING: &str = "CV_TEXT ausente ou muito curto";

/// Texts shorter than this never reach the AI autofill path.
pub const MIN_AUTOFILL_TEXT_CHARS: usize = 200;

/// Models sometimes send `null` for fields they could not fill.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Any JSON number (or numeric string), rounded and clamped to 0..=100.
/// Anything else scores 0.
fn lenient_score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    };
    Ok(raw
        .filter(|n| n.is_finite())
        .map_or(0, |n| n.round().clamp(0.0, 100.0) as u8))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyMode {
    #[default]
    Replace,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonalPatch {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub headline: String,
    #[serde(deserialize_with = "null_as_default")]
    pub email: String,
    #[serde(deserialize_with = "null_as_default")]
    pub phone: String,
    #[serde(deserialize_with = "null_as_default")]
    pub location: String,
    #[serde(deserialize_with = "null_as_default")]
    pub linkedin: String,
    #[serde(deserialize_with = "null_as_default")]
    pub website: String,
}

impl PersonalPatch {
    /// Non-empty fields as (key, value) pairs, in a stable order.
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        [
            ("name", self.name.as_str()),
            ("headline", self.headline.as_str()),
            ("email", self.email.as_str()),
            ("phone", self.phone.as_str()),
            ("location", self.location.as_str()),
            ("linkedin", self.linkedin.as_str()),
            ("website", self.website.as_str()),
        ]
        .into_iter()
        .filter(|(_, v)| !v.trim().is_empty())
        .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutofillItem {
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub subtitle: String,
    #[serde(deserialize_with = "null_as_default")]
    pub date: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
}

/// Subset of the CV document proposed by the extraction service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutofillPatch {
    #[serde(deserialize_with = "null_as_default")]
    pub personal: PersonalPatch,
    /// HTML fragment restricted to the formatting allow-list.
    #[serde(deserialize_with = "null_as_default")]
    pub summary: String,
    #[serde(deserialize_with = "null_as_default")]
    pub experience: Vec<AutofillItem>,
    #[serde(deserialize_with = "null_as_default")]
    pub education: Vec<AutofillItem>,
    #[serde(deserialize_with = "null_as_default")]
    pub projects: Vec<AutofillItem>,
    #[serde(deserialize_with = "null_as_default")]
    pub skills: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub languages: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub certifications: Vec<String>,
}

/// Per-field 0-100 heuristic scores reported by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutofillConfidence {
    #[serde(deserialize_with = "lenient_score")]
    pub personal: u8,
    #[serde(deserialize_with = "lenient_score")]
    pub summary: u8,
    #[serde(deserialize_with = "lenient_score")]
    pub experience: u8,
    #[serde(deserialize_with = "lenient_score")]
    pub education: u8,
    #[serde(deserialize_with = "lenient_score")]
    pub projects: u8,
    #[serde(deserialize_with = "lenient_score")]
    pub skills: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CVAutofillResult {
    pub ok: bool,
    pub apply_mode: ApplyMode,
    pub patch: AutofillPatch,
    pub confidence: AutofillConfidence,
    #[serde(deserialize_with = "null_as_default")]
    pub warnings: Vec<String>,
}

impl CVAutofillResult {
    /// Blank result carrying a single warning; never auto-applied.
    pub fn empty_with_warning(warning: impl Into<String>) -> Self {
        Self {
            ok: false,
            warnings: vec![warning.into()],
            ..Default::default()
        }
    }
}
