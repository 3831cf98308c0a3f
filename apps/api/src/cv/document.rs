//! The editable CV document: an ordered list of typed sections plus metadata.
//!
//! Section order is render order. Exactly one `personal` section is expected;
//! the store keeps that true but the type does not enforce it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PERSONAL_KEY: &str = "personal";
pub const DEFAULT_TEMPLATE: &str = "classic";

/// Where a field's current value came from. Only drives UI hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldSource {
    #[serde(rename = "user-edited")]
    UserEdited,
    #[serde(rename = "parsed:file")]
    ParsedFile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub source: FieldSource,
    pub updated_at: DateTime<Utc>,
}

impl FieldMeta {
    pub fn new(source: FieldSource, at: DateTime<Utc>) -> Self {
        Self {
            source,
            updated_at: at,
        }
    }
}

/// One entry of a repeatable group (a job, a degree, a project).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionItem {
    pub id: Uuid,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub field_meta: BTreeMap<String, FieldMeta>,
}

impl SectionItem {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            subtitle: String::new(),
            date: String::new(),
            description: String::new(),
            field_meta: BTreeMap::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "title" => Some(&self.title),
            "subtitle" => Some(&self.subtitle),
            "date" => Some(&self.date),
            "description" => Some(&self.description),
            _ => None,
        }
    }

    /// Sets a known field, returning `false` for unknown names.
    pub fn set_field(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            "title" => &mut self.title,
            "subtitle" => &mut self.subtitle,
            "date" => &mut self.date,
            "description" => &mut self.description,
            _ => return false,
        };
        *slot = value;
        true
    }

    pub const FIELDS: [&'static str; 4] = ["title", "subtitle", "date", "description"];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SectionContent {
    Personal { fields: BTreeMap<String, String> },
    Richtext { html: String },
    List { items: Vec<String> },
    RepeatableGroup { items: Vec<SectionItem> },
}

impl SectionContent {
    pub fn type_name(&self) -> &'static str {
        match self {
            SectionContent::Personal { .. } => "personal",
            SectionContent::Richtext { .. } => "richtext",
            SectionContent::List { .. } => "list",
            SectionContent::RepeatableGroup { .. } => "repeatable_group",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: Uuid,
    /// Stable semantic key (`personal`, `summary`, `experience`, ...).
    pub key: String,
    pub title: String,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub collapsed: bool,
    pub content: SectionContent,
    #[serde(default)]
    pub field_meta: BTreeMap<String, FieldMeta>,
}

fn default_true() -> bool {
    true
}

impl Section {
    pub fn new(key: impl Into<String>, title: impl Into<String>, content: SectionContent) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: key.into(),
            title: title.into(),
            visible: true,
            collapsed: false,
            content,
            field_meta: BTreeMap::new(),
        }
    }

    pub fn personal() -> Self {
        Self::new(
            PERSONAL_KEY,
            "Dados pessoais",
            SectionContent::Personal {
                fields: BTreeMap::new(),
            },
        )
    }

    pub fn is_personal(&self) -> bool {
        matches!(self.content, SectionContent::Personal { .. })
    }

    pub fn items(&self) -> Option<&[SectionItem]> {
        match &self.content {
            SectionContent::RepeatableGroup { items } => Some(items),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvMeta {
    pub template: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditableCV {
    pub id: Uuid,
    pub sections: Vec<Section>,
    pub meta: CvMeta,
    #[serde(default)]
    pub parse_warnings: Vec<String>,
}

impl EditableCV {
    /// An empty document holding only the personal section.
    pub fn empty() -> Self {
        Self {
            id: Uuid::new_v4(),
            sections: vec![Section::personal()],
            meta: CvMeta {
                template: DEFAULT_TEMPLATE.to_string(),
                updated_at: Utc::now(),
            },
            parse_warnings: Vec::new(),
        }
    }

    pub fn section(&self, key: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.key == key)
    }

    pub fn section_mut(&mut self, key: &str) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.key == key)
    }

    pub fn section_by_id(&self, id: Uuid) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }

    pub fn personal_fields(&self) -> Option<&BTreeMap<String, String>> {
        self.sections.iter().find_map(|s| match &s.content {
            SectionContent::Personal { fields } => Some(fields),
            _ => None,
        })
    }

    pub fn personal_count(&self) -> usize {
        self.sections.iter().filter(|s| s.is_personal()).count()
    }
}

impl Default for EditableCV {
    fn default() -> Self {
        Self::empty()
    }
}
