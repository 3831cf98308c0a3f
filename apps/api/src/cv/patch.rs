//! Patches proposed by the chat assistant.
//!
//! Each variant targets a section by key and is applied through the store
//! reducers, so provenance tracking behaves exactly as for manual edits.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::autofill::html::sanitize_html;
use crate::cv::document::{EditableCV, SectionContent, SectionItem};
use crate::cv::store::{self, SectionUpdate, StoreError};

#[derive(Debug, Error, PartialEq)]
pub enum PatchError {
    #[error("section '{0}' not found")]
    SectionNotFound(String),

    #[error("section '{section}' is {found}, patch expects {expected}")]
    WrongSectionType {
        section: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemDraft {
    pub title: String,
    pub subtitle: String,
    pub date: String,
    pub description: String,
}

impl From<ItemDraft> for SectionItem {
    fn from(draft: ItemDraft) -> Self {
        let mut item = SectionItem::new(draft.title);
        item.subtitle = draft.subtitle;
        item.date = draft.date;
        item.description = draft.description;
        item
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Patch {
    /// Merges the given keys into a personal section; other keys are untouched.
    SetFields {
        section: String,
        fields: BTreeMap<String, String>,
    },
    SetHtml {
        section: String,
        html: String,
    },
    SetList {
        section: String,
        items: Vec<String>,
    },
    AppendList {
        section: String,
        items: Vec<String>,
    },
    AddItem {
        section: String,
        item: ItemDraft,
    },
    UpdateItem {
        section: String,
        item_id: Uuid,
        fields: BTreeMap<String, String>,
    },
    RemoveItem {
        section: String,
        item_id: Uuid,
    },
    RenameSection {
        section: String,
        title: String,
    },
}

impl Patch {
    pub fn section(&self) -> &str {
        match self {
            Patch::SetFields { section, .. }
            | Patch::SetHtml { section, .. }
            | Patch::SetList { section, .. }
            | Patch::AppendList { section, .. }
            | Patch::AddItem { section, .. }
            | Patch::UpdateItem { section, .. }
            | Patch::RemoveItem { section, .. }
            | Patch::RenameSection { section, .. } => section,
        }
    }
}

/// Applies patches in order; the first failure aborts and nothing is returned.
pub fn apply_patches(doc: &EditableCV, patches: &[Patch]) -> Result<EditableCV, PatchError> {
    patches
        .iter()
        .try_fold(doc.clone(), |current, patch| apply_patch(&current, patch))
}

pub fn apply_patch(doc: &EditableCV, patch: &Patch) -> Result<EditableCV, PatchError> {
    let key = patch.section();
    let section = doc
        .section(key)
        .ok_or_else(|| PatchError::SectionNotFound(key.to_string()))?;
    let section_id = section.id;

    let content = match patch {
        Patch::SetFields { fields, .. } => match &section.content {
            SectionContent::Personal { fields: current } => {
                let mut merged = current.clone();
                merged.extend(fields.iter().map(|(k, v)| (k.clone(), v.trim().to_string())));
                SectionContent::Personal { fields: merged }
            }
            other => return Err(wrong_type(key, "personal", other)),
        },
        Patch::SetHtml { html, .. } => match &section.content {
            SectionContent::Richtext { .. } => SectionContent::Richtext {
                html: sanitize_html(html),
            },
            other => return Err(wrong_type(key, "richtext", other)),
        },
        Patch::SetList { items, .. } => match &section.content {
            SectionContent::List { .. } => SectionContent::List {
                items: clean_list(items),
            },
            other => return Err(wrong_type(key, "list", other)),
        },
        Patch::AppendList { items, .. } => match &section.content {
            SectionContent::List { items: current } => {
                let mut merged = current.clone();
                for item in clean_list(items) {
                    if !merged.iter().any(|m| m.eq_ignore_ascii_case(&item)) {
                        merged.push(item);
                    }
                }
                SectionContent::List { items: merged }
            }
            other => return Err(wrong_type(key, "list", other)),
        },
        Patch::AddItem { item, .. } => {
            return Ok(store::add_section_item(doc, section_id, item.clone().into())?);
        }
        Patch::UpdateItem {
            item_id, fields, ..
        } => {
            return Ok(store::update_section_item(doc, section_id, *item_id, fields)?);
        }
        Patch::RemoveItem { item_id, .. } => {
            return Ok(store::remove_section_item(doc, section_id, *item_id)?);
        }
        Patch::RenameSection { title, .. } => {
            let update = SectionUpdate {
                title: Some(title.clone()),
                ..Default::default()
            };
            return Ok(store::update_section(doc, section_id, update)?);
        }
    };

    let update = SectionUpdate {
        content: Some(content),
        ..Default::default()
    };
    Ok(store::update_section(doc, section_id, update)?)
}

fn clean_list(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn wrong_type(section: &str, expected: &'static str, found: &SectionContent) -> PatchError {
    PatchError::WrongSectionType {
        section: section.to_string(),
        expected,
        found: found.type_name(),
    }
}
