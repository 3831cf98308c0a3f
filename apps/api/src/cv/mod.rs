pub mod autosave;
pub mod document;
pub mod export;
pub mod handlers;
pub mod patch;
pub mod store;

pub use document::EditableCV;
