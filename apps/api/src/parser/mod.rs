// Local, no-LLM résumé parsing: contacts, section bodies and date periods.
// Used as the fallback when the AI extraction path fails.

pub mod contacts;
pub mod dates;
pub mod heuristic;

pub use contacts::{extract_contacts, ExtractedContacts};
pub use heuristic::{parse_cv_text, CVData};
