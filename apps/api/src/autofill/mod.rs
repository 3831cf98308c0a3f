pub mod gate;
pub mod html;
pub mod mapping;
pub mod types;

pub use gate::{evaluate, evaluate_raw, GateDecision, GateThresholds};
pub use mapping::{apply_contacts_only, autofill_to_document, cv_data_to_autofill};
pub use types::{CVAutofillResult, MIN_AUTOFILL_TEXT_CHARS, SHORT_TEXT_WARNING};
