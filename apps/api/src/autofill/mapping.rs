//! Mapping between extraction results and the editable document.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::autofill::html::sanitize_html;
use crate::autofill::types::{AutofillItem, AutofillPatch, CVAutofillResult};
use crate::cv::document::{
    EditableCV, FieldMeta, FieldSource, Section, SectionContent, SectionItem, PERSONAL_KEY,
};
use crate::cv::store::{self, escape_html};
use crate::parser::dates::sort_most_recent_first;
use crate::parser::CVData;

pub const HEURISTIC_WARNING: &str =
    "Extração automática indisponível; dados obtidos por leitura simples do texto";

const CONTACT_KEYS: [&str; 5] = ["email", "phone", "linkedin", "website", "location"];

/// Converts the heuristic parser output into an autofill result.
///
/// Confidence stays at zero so the gate always routes it to manual review.
pub fn cv_data_to_autofill(data: &CVData) -> CVAutofillResult {
    let mut patch = AutofillPatch::default();
    patch.personal.name = data.name.clone();
    patch.personal.email = data.email.clone();
    patch.personal.phone = data.phone.clone();
    patch.personal.linkedin = data.linkedin.clone();
    patch.personal.location = data.location.clone();

    if !data.summary.trim().is_empty() {
        patch.summary = format!("<p>{}</p>", escape_html(data.summary.trim()));
    }

    patch.experience = data
        .experience
        .iter()
        .map(|e| item(&e.role, &e.company, &e.period, &e.description))
        .filter(|i| !i.title.is_empty())
        .collect();
    patch.education = data
        .education
        .iter()
        .map(|e| item(&e.degree, &e.institution, &e.period, &e.description))
        .filter(|i| !i.title.is_empty())
        .collect();
    patch.projects = data
        .projects
        .iter()
        .map(|p| item(&p.name, "", &p.period, &p.description))
        .filter(|i| !i.title.is_empty())
        .collect();

    patch.skills = data.skills.clone();
    patch.languages = data.languages.clone();
    patch.certifications = data.certifications.clone();

    CVAutofillResult {
        ok: data.has_body() || !patch.personal.entries().is_empty(),
        patch,
        warnings: vec![HEURISTIC_WARNING.to_string()],
        ..Default::default()
    }
}

/// Title falls back to the subtitle so entries without a role keep their company.
fn item(title: &str, subtitle: &str, date: &str, description: &str) -> AutofillItem {
    let (title, subtitle) = if title.trim().is_empty() {
        (subtitle.trim(), "")
    } else {
        (title.trim(), subtitle.trim())
    };
    AutofillItem {
        title: title.to_string(),
        subtitle: subtitle.to_string(),
        date: date.trim().to_string(),
        description: description.trim().to_string(),
    }
}

/// Builds a fresh document from an autofill patch. Every imported field is
/// stamped `parsed:file`; repeatable items are ordered most recent first.
pub fn autofill_to_document(result: &CVAutofillResult) -> EditableCV {
    let now = Utc::now();
    let parsed = FieldMeta::new(FieldSource::ParsedFile, now);
    let patch = &result.patch;

    let mut doc = EditableCV::empty();
    doc.parse_warnings = result.warnings.clone();

    if let Some(personal) = doc.section_mut(PERSONAL_KEY) {
        let fields: BTreeMap<String, String> = patch
            .personal
            .entries()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.trim().to_string()))
            .collect();
        personal.field_meta = fields.keys().map(|k| (k.clone(), parsed.clone())).collect();
        personal.content = SectionContent::Personal { fields };
    }

    let summary = sanitize_html(&patch.summary);
    if !summary.is_empty() {
        doc.sections.push(parsed_section(
            "summary",
            "Resumo",
            SectionContent::Richtext { html: summary },
            "html",
            &parsed,
        ));
    }

    let groups: [(&str, &str, &[AutofillItem]); 3] = [
        ("experience", "Experiência", &patch.experience),
        ("education", "Formação", &patch.education),
        ("projects", "Projetos", &patch.projects),
    ];
    for (key, title, items) in groups {
        if items.is_empty() {
            continue;
        }
        let mut items: Vec<SectionItem> = items.iter().map(|i| parsed_item(i, &parsed)).collect();
        sort_most_recent_first(&mut items, |i| i.date.as_str());
        doc.sections.push(parsed_section(
            key,
            title,
            SectionContent::RepeatableGroup { items },
            "items",
            &parsed,
        ));
    }

    let lists: [(&str, &str, &[String]); 3] = [
        ("skills", "Habilidades", &patch.skills),
        ("languages", "Idiomas", &patch.languages),
        ("certifications", "Certificações", &patch.certifications),
    ];
    for (key, title, values) in lists {
        let items: Vec<String> = values
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if items.is_empty() {
            continue;
        }
        doc.sections.push(parsed_section(
            key,
            title,
            SectionContent::List { items },
            "items",
            &parsed,
        ));
    }

    store::replace_document(doc)
}

fn parsed_section(
    key: &str,
    title: &str,
    content: SectionContent,
    meta_key: &str,
    parsed: &FieldMeta,
) -> Section {
    let mut section = Section::new(key, title, content);
    section.field_meta.insert(meta_key.to_string(), parsed.clone());
    section
}

fn parsed_item(source: &AutofillItem, parsed: &FieldMeta) -> SectionItem {
    let mut item = SectionItem::new(source.title.trim());
    item.subtitle = source.subtitle.trim().to_string();
    item.date = source.date.trim().to_string();
    item.description = source.description.trim().to_string();
    for field in SectionItem::FIELDS {
        if item.field(field).is_some_and(|v| !v.is_empty()) {
            item.field_meta.insert(field.to_string(), parsed.clone());
        }
    }
    item
}

/// Fallback offered on manual review: copies only the contact details (and
/// the name when the document has none) into the existing personal section.
pub fn apply_contacts_only(doc: &EditableCV, patch: &AutofillPatch) -> EditableCV {
    let now = Utc::now();
    let mut next = store::ensure_personal(doc.clone());

    let Some(section) = next.sections.iter_mut().find(|s| s.is_personal()) else {
        return next;
    };
    let SectionContent::Personal { fields } = &mut section.content else {
        return next;
    };

    for (key, value) in patch.personal.entries() {
        let is_contact = CONTACT_KEYS.contains(&key);
        let fills_missing_name = key == "name" && fields.get(key).map_or(true, |n| n.is_empty());
        if !(is_contact || fills_missing_name) {
            continue;
        }
        let value = value.trim().to_string();
        if fields.get(key) == Some(&value) {
            continue;
        }
        fields.insert(key.to_string(), value);
        section
            .field_meta
            .insert(key.to_string(), FieldMeta::new(FieldSource::ParsedFile, now));
    }

    next.meta.updated_at = now;
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autofill::types::PersonalPatch;
    use crate::parser::heuristic::{EducationEntry, ExperienceEntry};

    fn sample_result() -> CVAutofillResult {
        CVAutofillResult {
            ok: true,
            patch: AutofillPatch {
                personal: PersonalPatch {
                    name: "Ana Lima".into(),
                    email: "ana@x.com".into(),
                    ..Default::default()
                },
                summary: "<p class=\"x\">Engenheira <em>backend</em></p>".into(),
                experience: vec![
                    AutofillItem {
                        title: "Estagiária".into(),
                        subtitle: "Beta".into(),
                        date: "2018 - 2019".into(),
                        ..Default::default()
                    },
                    AutofillItem {
                        title: "Engenheira".into(),
                        subtitle: "Acme".into(),
                        date: "jan 2020 - Atual".into(),
                        ..Default::default()
                    },
                ],
                skills: vec!["Rust".into(), " ".into()],
                ..Default::default()
            },
            warnings: vec!["revisar datas".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_autofill_to_document_builds_sections() {
        let doc = autofill_to_document(&sample_result());
        let keys: Vec<&str> = doc.sections.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["personal", "summary", "experience", "skills"]);
        assert_eq!(doc.parse_warnings, vec!["revisar datas"]);

        let personal = doc.section(PERSONAL_KEY).unwrap();
        assert_eq!(personal.field_meta["email"].source, FieldSource::ParsedFile);
        assert_eq!(doc.personal_fields().unwrap()["name"], "Ana Lima");

        match &doc.section("summary").unwrap().content {
            SectionContent::Richtext { html } => {
                assert_eq!(html, "<p>Engenheira <em>backend</em></p>")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_items_sorted_most_recent_first() {
        let doc = autofill_to_document(&sample_result());
        let items = doc.section("experience").unwrap().items().unwrap();
        assert_eq!(items[0].subtitle, "Acme");
        assert_eq!(items[1].subtitle, "Beta");
        assert_eq!(items[0].field_meta["date"].source, FieldSource::ParsedFile);
        assert!(!items[0].field_meta.contains_key("description"));
    }

    #[test]
    fn test_heuristic_result_has_zero_confidence() {
        let data = CVData {
            name: "Bruno Souza".into(),
            email: "bruno@x.com".into(),
            summary: "Dev <full-stack>".into(),
            experience: vec![ExperienceEntry {
                company: "Acme".into(),
                role: String::new(),
                period: "2021 - Atual".into(),
                ..Default::default()
            }],
            education: vec![EducationEntry::default()],
            ..Default::default()
        };
        let result = cv_data_to_autofill(&data);
        assert!(result.ok);
        assert_eq!(result.confidence.personal, 0);
        assert_eq!(result.warnings, vec![HEURISTIC_WARNING]);
        assert_eq!(result.patch.summary, "<p>Dev &lt;full-stack&gt;</p>");
        assert_eq!(result.patch.experience[0].title, "Acme");
        assert_eq!(result.patch.experience[0].subtitle, "");
        assert!(result.patch.education.is_empty());
    }

    #[test]
    fn test_contacts_only_keeps_existing_name_and_sections() {
        let mut doc = EditableCV::empty();
        if let Some(SectionContent::Personal { fields }) =
            doc.section_mut(PERSONAL_KEY).map(|s| &mut s.content)
        {
            fields.insert("name".into(), "Ana Paula Lima".into());
        }

        let patch = AutofillPatch {
            personal: PersonalPatch {
                name: "Ana Lima".into(),
                email: "ana@x.com".into(),
                phone: "(11) 98888-7777".into(),
                headline: "Engenheira".into(),
                ..Default::default()
            },
            summary: "<p>ignorado</p>".into(),
            ..Default::default()
        };
        let next = apply_contacts_only(&doc, &patch);
        let fields = next.personal_fields().unwrap();
        assert_eq!(fields["name"], "Ana Paula Lima");
        assert_eq!(fields["email"], "ana@x.com");
        assert_eq!(fields["phone"], "(11) 98888-7777");
        assert!(!fields.contains_key("headline"));
        assert_eq!(next.sections.len(), 1);
        let meta = &next.section(PERSONAL_KEY).unwrap().field_meta;
        assert_eq!(meta["email"].source, FieldSource::ParsedFile);
        assert!(!meta.contains_key("name"));
    }
}
