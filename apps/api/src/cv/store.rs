//! CV document reducers.
//!
//! Every reducer takes the current snapshot and returns a new one; the input
//! is never mutated. Per-field provenance is refreshed by shallow comparison:
//! a field whose value changed is stamped `user-edited` with the current time.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::cv::document::{EditableCV, FieldMeta, FieldSource, Section, SectionContent, SectionItem};

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("section {0} not found")]
    SectionNotFound(Uuid),

    #[error("item {0} not found")]
    ItemNotFound(Uuid),

    #[error("the document already has a personal section")]
    DuplicatePersonal,

    #[error("a section with key '{0}' already exists")]
    DuplicateKey(String),

    #[error("the personal section cannot be removed")]
    CannotRemovePersonal,

    #[error("the personal section cannot hold {0} content")]
    PersonalContentKind(&'static str),

    #[error("section '{0}' does not hold repeatable items")]
    NotRepeatable(String),

    #[error("unknown item field '{0}'")]
    UnknownField(String),

    #[error("index {index} out of range for {len} elements")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("cannot apply a suggestion to section '{0}'")]
    NotApplicable(String),
}

/// Partial update of a section's own attributes.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SectionUpdate {
    pub title: Option<String>,
    pub visible: Option<bool>,
    pub collapsed: Option<bool>,
    pub content: Option<SectionContent>,
}

/// Serializable reducer invocation, as sent by the editor.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StoreAction {
    AddSection {
        section: Section,
    },
    UpdateSection {
        section_id: Uuid,
        update: SectionUpdate,
    },
    RemoveSection {
        section_id: Uuid,
    },
    ToggleVisibility {
        section_id: Uuid,
    },
    ToggleCollapsed {
        section_id: Uuid,
    },
    ReorderSections {
        from: usize,
        to: usize,
    },
    AddSectionItem {
        section_id: Uuid,
        item: SectionItem,
    },
    UpdateSectionItem {
        section_id: Uuid,
        item_id: Uuid,
        fields: BTreeMap<String, String>,
    },
    RemoveSectionItem {
        section_id: Uuid,
        item_id: Uuid,
    },
    ReorderSectionItems {
        section_id: Uuid,
        from: usize,
        to: usize,
    },
    SetTemplate {
        template: String,
    },
    ApplySuggestion {
        section_key: String,
        text: String,
    },
}

pub fn dispatch(doc: &EditableCV, action: StoreAction) -> Result<EditableCV, StoreError> {
    match action {
        StoreAction::AddSection { section } => add_section(doc, section),
        StoreAction::UpdateSection { section_id, update } => update_section(doc, section_id, update),
        StoreAction::RemoveSection { section_id } => remove_section(doc, section_id),
        StoreAction::ToggleVisibility { section_id } => toggle_visibility(doc, section_id),
        StoreAction::ToggleCollapsed { section_id } => toggle_collapsed(doc, section_id),
        StoreAction::ReorderSections { from, to } => reorder_sections(doc, from, to),
        StoreAction::AddSectionItem { section_id, item } => add_section_item(doc, section_id, item),
        StoreAction::UpdateSectionItem {
            section_id,
            item_id,
            fields,
        } => update_section_item(doc, section_id, item_id, &fields),
        StoreAction::RemoveSectionItem {
            section_id,
            item_id,
        } => remove_section_item(doc, section_id, item_id),
        StoreAction::ReorderSectionItems {
            section_id,
            from,
            to,
        } => reorder_section_items(doc, section_id, from, to),
        StoreAction::SetTemplate { template } => Ok(set_template(doc, template)),
        StoreAction::ApplySuggestion { section_key, text } => {
            apply_suggestion(doc, &section_key, &text)
        }
    }
}

pub fn add_section(doc: &EditableCV, section: Section) -> Result<EditableCV, StoreError> {
    if section.is_personal() && doc.personal_count() > 0 {
        return Err(StoreError::DuplicatePersonal);
    }
    if doc.section(&section.key).is_some() {
        return Err(StoreError::DuplicateKey(section.key));
    }
    let mut next = doc.clone();
    next.sections.push(section);
    Ok(stamp(next))
}

pub fn update_section(
    doc: &EditableCV,
    section_id: Uuid,
    update: SectionUpdate,
) -> Result<EditableCV, StoreError> {
    let target_is_personal = doc
        .section_by_id(section_id)
        .map(Section::is_personal)
        .unwrap_or(false);
    match &update.content {
        Some(SectionContent::Personal { .. }) => {
            if !target_is_personal && doc.personal_count() > 0 {
                return Err(StoreError::DuplicatePersonal);
            }
        }
        Some(other) if target_is_personal => {
            return Err(StoreError::PersonalContentKind(other.type_name()));
        }
        _ => {}
    }

    with_section(doc, section_id, |section, now| {
        if let Some(title) = update.title {
            if title != section.title {
                section.title = title;
                section
                    .field_meta
                    .insert("title".into(), FieldMeta::new(FieldSource::UserEdited, now));
            }
        }
        if let Some(visible) = update.visible {
            section.visible = visible;
        }
        if let Some(collapsed) = update.collapsed {
            section.collapsed = collapsed;
        }
        if let Some(content) = update.content {
            record_content_changes(&mut section.field_meta, &section.content, &content, now);
            section.content = content;
        }
        Ok(())
    })
}

pub fn remove_section(doc: &EditableCV, section_id: Uuid) -> Result<EditableCV, StoreError> {
    let idx = section_index(doc, section_id)?;
    if doc.sections[idx].is_personal() {
        return Err(StoreError::CannotRemovePersonal);
    }
    let mut next = doc.clone();
    next.sections.remove(idx);
    Ok(stamp(next))
}

pub fn toggle_visibility(doc: &EditableCV, section_id: Uuid) -> Result<EditableCV, StoreError> {
    with_section(doc, section_id, |section, _| {
        section.visible = !section.visible;
        Ok(())
    })
}

pub fn toggle_collapsed(doc: &EditableCV, section_id: Uuid) -> Result<EditableCV, StoreError> {
    with_section(doc, section_id, |section, _| {
        section.collapsed = !section.collapsed;
        Ok(())
    })
}

/// Moves the section at `from` to position `to` (drag and drop).
pub fn reorder_sections(doc: &EditableCV, from: usize, to: usize) -> Result<EditableCV, StoreError> {
    let mut next = doc.clone();
    move_element(&mut next.sections, from, to)?;
    Ok(stamp(next))
}

pub fn add_section_item(
    doc: &EditableCV,
    section_id: Uuid,
    item: SectionItem,
) -> Result<EditableCV, StoreError> {
    with_items(doc, section_id, |items, _| {
        items.push(item);
        Ok(())
    })
}

/// Updates the named item fields; unchanged values keep their provenance.
pub fn update_section_item(
    doc: &EditableCV,
    section_id: Uuid,
    item_id: Uuid,
    fields: &BTreeMap<String, String>,
) -> Result<EditableCV, StoreError> {
    if let Some(unknown) = fields.keys().find(|k| !SectionItem::FIELDS.contains(&k.as_str())) {
        return Err(StoreError::UnknownField(unknown.clone()));
    }
    with_items(doc, section_id, |items, now| {
        let item = items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or(StoreError::ItemNotFound(item_id))?;
        for (name, value) in fields {
            if item.field(name) == Some(value.as_str()) {
                continue;
            }
            item.set_field(name, value.clone());
            item.field_meta
                .insert(name.clone(), FieldMeta::new(FieldSource::UserEdited, now));
        }
        Ok(())
    })
}

pub fn remove_section_item(
    doc: &EditableCV,
    section_id: Uuid,
    item_id: Uuid,
) -> Result<EditableCV, StoreError> {
    with_items(doc, section_id, |items, _| {
        let idx = items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or(StoreError::ItemNotFound(item_id))?;
        items.remove(idx);
        Ok(())
    })
}

pub fn reorder_section_items(
    doc: &EditableCV,
    section_id: Uuid,
    from: usize,
    to: usize,
) -> Result<EditableCV, StoreError> {
    with_items(doc, section_id, |items, _| move_element(items, from, to))
}

pub fn set_template(doc: &EditableCV, template: String) -> EditableCV {
    let mut next = doc.clone();
    next.meta.template = template;
    stamp(next)
}

/// Wholesale replacement on import or draft load.
pub fn replace_document(incoming: EditableCV) -> EditableCV {
    stamp(ensure_personal(incoming))
}

/// Restores the personal section at the top if the document lost it.
pub fn ensure_personal(mut doc: EditableCV) -> EditableCV {
    if doc.personal_count() == 0 {
        debug!("Document {} had no personal section, adding one", doc.id);
        doc.sections.insert(0, Section::personal());
    }
    doc
}

/// Copies suggestion text from an analysis into a section.
/// A missing `summary` section is created on the fly.
pub fn apply_suggestion(
    doc: &EditableCV,
    section_key: &str,
    text: &str,
) -> Result<EditableCV, StoreError> {
    let text = text.trim();
    let mut next = doc.clone();
    let now = Utc::now();

    if next.section(section_key).is_none() {
        if section_key != "summary" {
            return Err(StoreError::NotApplicable(section_key.to_string()));
        }
        next.sections.push(Section::new(
            "summary",
            "Resumo",
            SectionContent::Richtext {
                html: String::new(),
            },
        ));
    }

    let section = next
        .section_mut(section_key)
        .ok_or_else(|| StoreError::NotApplicable(section_key.to_string()))?;

    let changed_field = match &mut section.content {
        SectionContent::Richtext { html } => {
            html.push_str(&format!("<p>{}</p>", escape_html(text)));
            "html"
        }
        SectionContent::List { items } => {
            items.push(text.to_string());
            "items"
        }
        SectionContent::RepeatableGroup { items } => {
            let mut item = SectionItem::new("");
            item.description = text.to_string();
            item.field_meta.insert(
                "description".into(),
                FieldMeta::new(FieldSource::UserEdited, now),
            );
            items.push(item);
            "items"
        }
        SectionContent::Personal { .. } => {
            return Err(StoreError::NotApplicable(section_key.to_string()));
        }
    };
    section
        .field_meta
        .insert(changed_field.into(), FieldMeta::new(FieldSource::UserEdited, now));

    Ok(stamp(next))
}

pub(crate) fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Records `user-edited` provenance for content fields that differ.
pub(crate) fn record_content_changes(
    meta: &mut BTreeMap<String, FieldMeta>,
    old: &SectionContent,
    new: &SectionContent,
    now: DateTime<Utc>,
) {
    let edited = FieldMeta::new(FieldSource::UserEdited, now);
    match (old, new) {
        (SectionContent::Personal { fields: before }, SectionContent::Personal { fields: after }) => {
            for (key, value) in after {
                if before.get(key) != Some(value) {
                    meta.insert(key.clone(), edited.clone());
                }
            }
        }
        (SectionContent::Richtext { html: before }, SectionContent::Richtext { html: after }) => {
            if before != after {
                meta.insert("html".into(), edited);
            }
        }
        (SectionContent::List { items: before }, SectionContent::List { items: after }) => {
            if before != after {
                meta.insert("items".into(), edited);
            }
        }
        (
            SectionContent::RepeatableGroup { items: before },
            SectionContent::RepeatableGroup { items: after },
        ) => {
            if before != after {
                meta.insert("items".into(), edited);
            }
        }
        _ => {
            meta.insert("content".into(), edited);
        }
    }
}

fn section_index(doc: &EditableCV, section_id: Uuid) -> Result<usize, StoreError> {
    doc.sections
        .iter()
        .position(|s| s.id == section_id)
        .ok_or(StoreError::SectionNotFound(section_id))
}

fn with_section<F>(doc: &EditableCV, section_id: Uuid, f: F) -> Result<EditableCV, StoreError>
where
    F: FnOnce(&mut Section, DateTime<Utc>) -> Result<(), StoreError>,
{
    let idx = section_index(doc, section_id)?;
    let mut next = doc.clone();
    f(&mut next.sections[idx], Utc::now())?;
    Ok(stamp(next))
}

fn with_items<F>(doc: &EditableCV, section_id: Uuid, f: F) -> Result<EditableCV, StoreError>
where
    F: FnOnce(&mut Vec<SectionItem>, DateTime<Utc>) -> Result<(), StoreError>,
{
    with_section(doc, section_id, |section, now| match &mut section.content {
        SectionContent::RepeatableGroup { items } => f(items, now),
        _ => Err(StoreError::NotRepeatable(section.key.clone())),
    })
}

fn move_element<T>(v: &mut Vec<T>, from: usize, to: usize) -> Result<(), StoreError> {
    let len = v.len();
    for index in [from, to] {
        if index >= len {
            return Err(StoreError::IndexOutOfRange { index, len });
        }
    }
    let element = v.remove(from);
    v.insert(to, element);
    Ok(())
}

fn stamp(mut doc: EditableCV) -> EditableCV {
    doc.meta.updated_at = Utc::now();
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cv::document::PERSONAL_KEY;

    fn doc_with_experience() -> (EditableCV, Uuid, Uuid) {
        let mut item = SectionItem::new("Engenheira de Software");
        item.subtitle = "Acme".into();
        let item_id = item.id;
        let section = Section::new(
            "experience",
            "Experiência",
            SectionContent::RepeatableGroup { items: vec![item] },
        );
        let section_id = section.id;
        let doc = add_section(&EditableCV::empty(), section).unwrap();
        (doc, section_id, item_id)
    }

    #[test]
    fn test_reducers_do_not_mutate_input() {
        let (doc, section_id, _) = doc_with_experience();
        let before = doc.clone();
        let next = toggle_visibility(&doc, section_id).unwrap();
        assert_eq!(doc, before);
        assert!(!next.section("experience").unwrap().visible);
    }

    #[test]
    fn test_second_personal_section_rejected() {
        let doc = EditableCV::empty();
        let err = add_section(&doc, Section::personal()).unwrap_err();
        assert_eq!(err, StoreError::DuplicatePersonal);
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let (doc, _, _) = doc_with_experience();
        let dup = Section::new(
            "experience",
            "Outra",
            SectionContent::List { items: vec![] },
        );
        assert!(matches!(
            add_section(&doc, dup),
            Err(StoreError::DuplicateKey(_))
        ));
    }

    #[test]
    fn test_personal_section_cannot_be_removed() {
        let doc = EditableCV::empty();
        let id = doc.sections[0].id;
        assert_eq!(
            remove_section(&doc, id).unwrap_err(),
            StoreError::CannotRemovePersonal
        );
    }

    #[test]
    fn test_personal_section_keeps_its_content_kind() {
        let doc = EditableCV::empty();
        let id = doc.sections[0].id;
        let update = SectionUpdate {
            content: Some(SectionContent::Richtext {
                html: "<p>oi</p>".into(),
            }),
            ..Default::default()
        };
        assert_eq!(
            update_section(&doc, id, update).unwrap_err(),
            StoreError::PersonalContentKind("richtext")
        );

        let retitled = SectionUpdate {
            title: Some("Contato".into()),
            ..Default::default()
        };
        let next = update_section(&doc, id, retitled).unwrap();
        assert_eq!(next.personal_count(), 1);
        assert_eq!(next.sections[0].title, "Contato");
    }

    #[test]
    fn test_reorder_sections_moves_element() {
        let (doc, section_id, _) = doc_with_experience();
        let next = reorder_sections(&doc, 1, 0).unwrap();
        assert_eq!(next.sections[0].id, section_id);
        assert_eq!(next.sections[1].key, PERSONAL_KEY);
    }

    #[test]
    fn test_reorder_out_of_range() {
        let doc = EditableCV::empty();
        assert_eq!(
            reorder_sections(&doc, 0, 3).unwrap_err(),
            StoreError::IndexOutOfRange { index: 3, len: 1 }
        );
    }

    #[test]
    fn test_update_item_tracks_only_changed_fields() {
        let (doc, section_id, item_id) = doc_with_experience();
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), "Engenheira de Software".to_string());
        fields.insert("date".to_string(), "2020 - Atual".to_string());

        let next = update_section_item(&doc, section_id, item_id, &fields).unwrap();
        let item = &next.section("experience").unwrap().items().unwrap()[0];
        assert_eq!(item.date, "2020 - Atual");
        assert!(item.field_meta.contains_key("date"));
        assert!(!item.field_meta.contains_key("title"));
        assert_eq!(item.field_meta["date"].source, FieldSource::UserEdited);
    }

    #[test]
    fn test_update_item_unknown_field() {
        let (doc, section_id, item_id) = doc_with_experience();
        let mut fields = BTreeMap::new();
        fields.insert("salary".to_string(), "10k".to_string());
        assert_eq!(
            update_section_item(&doc, section_id, item_id, &fields).unwrap_err(),
            StoreError::UnknownField("salary".into())
        );
    }

    #[test]
    fn test_items_on_non_repeatable_section() {
        let doc = EditableCV::empty();
        let personal_id = doc.sections[0].id;
        assert!(matches!(
            add_section_item(&doc, personal_id, SectionItem::new("x")),
            Err(StoreError::NotRepeatable(_))
        ));
    }

    #[test]
    fn test_update_personal_fields_provenance() {
        let doc = EditableCV::empty();
        let personal_id = doc.sections[0].id;
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), "Ana".to_string());
        let update = SectionUpdate {
            content: Some(SectionContent::Personal { fields }),
            ..Default::default()
        };
        let next = update_section(&doc, personal_id, update).unwrap();
        let meta = &next.sections[0].field_meta;
        assert_eq!(meta["name"].source, FieldSource::UserEdited);
        assert_eq!(next.personal_fields().unwrap()["name"], "Ana");
    }

    #[test]
    fn test_apply_suggestion_creates_summary() {
        let doc = EditableCV::empty();
        let next = apply_suggestion(&doc, "summary", "Engenheira com 5 anos <Rust>").unwrap();
        match &next.section("summary").unwrap().content {
            SectionContent::Richtext { html } => {
                assert_eq!(html, "<p>Engenheira com 5 anos &lt;Rust&gt;</p>")
            }
            other => panic!("unexpected content {other:?}"),
        }
    }

    #[test]
    fn test_apply_suggestion_to_personal_rejected() {
        let doc = EditableCV::empty();
        assert!(matches!(
            apply_suggestion(&doc, PERSONAL_KEY, "x"),
            Err(StoreError::NotApplicable(_))
        ));
    }

    #[test]
    fn test_replace_document_restores_personal() {
        let mut incoming = EditableCV::empty();
        incoming.sections.clear();
        let doc = replace_document(incoming);
        assert_eq!(doc.personal_count(), 1);
    }

    #[test]
    fn test_dispatch_from_json_action() {
        let (doc, section_id, item_id) = doc_with_experience();
        let action: StoreAction = serde_json::from_value(serde_json::json!({
            "action": "remove_section_item",
            "section_id": section_id,
            "item_id": item_id
        }))
        .unwrap();
        let next = dispatch(&doc, action).unwrap();
        assert!(next.section("experience").unwrap().items().unwrap().is_empty());
    }
}
