//! Markdown and plain-text rendering of a CV document.
//!
//! Hidden sections are skipped. Rich text goes through the HTML sanitiser
//! before being flattened, so exports never carry markup.

use serde::{Deserialize, Serialize};

use crate::autofill::html::html_to_text;
use crate::cv::document::{EditableCV, Section, SectionContent, SectionItem};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Markdown,
    Text,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Markdown => "text/markdown; charset=utf-8",
            ExportFormat::Text => "text/plain; charset=utf-8",
        }
    }
}

const CONTACT_ORDER: [&str; 5] = ["email", "phone", "location", "linkedin", "website"];

pub fn render(doc: &EditableCV, format: ExportFormat) -> String {
    let mut out = String::new();
    for section in doc.sections.iter().filter(|s| s.visible) {
        let block = match format {
            ExportFormat::Markdown => render_section_md(section),
            ExportFormat::Text => render_section_text(section),
        };
        if block.trim().is_empty() {
            continue;
        }
        out.push_str(&block);
        out.push('\n');
    }
    out.trim_end().to_string() + "\n"
}

fn contact_line(fields: &std::collections::BTreeMap<String, String>) -> String {
    CONTACT_ORDER
        .iter()
        .filter_map(|k| fields.get(*k))
        .filter(|v| !v.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(" | ")
}

fn item_heading(item: &SectionItem) -> String {
    match (item.title.is_empty(), item.subtitle.is_empty()) {
        (false, false) => format!("{} - {}", item.title, item.subtitle),
        (false, true) => item.title.clone(),
        (true, false) => item.subtitle.clone(),
        (true, true) => String::new(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Markdown
// ────────────────────────────────────────────────────────────────────────────

fn render_section_md(section: &Section) -> String {
    let mut md = String::new();
    match &section.content {
        SectionContent::Personal { fields } => {
            if let Some(name) = fields.get("name").filter(|n| !n.is_empty()) {
                md.push_str(&format!("# {name}\n\n"));
            }
            if let Some(headline) = fields.get("headline").filter(|h| !h.is_empty()) {
                md.push_str(&format!("**{headline}**\n\n"));
            }
            let contacts = contact_line(fields);
            if !contacts.is_empty() {
                md.push_str(&format!("{contacts}\n"));
            }
        }
        SectionContent::Richtext { html } => {
            let text = html_to_text(html);
            if !text.is_empty() {
                md.push_str(&format!("## {}\n\n{text}\n", section.title));
            }
        }
        SectionContent::List { items } => {
            if !items.is_empty() {
                md.push_str(&format!("## {}\n\n", section.title));
                for item in items {
                    md.push_str(&format!("- {item}\n"));
                }
            }
        }
        SectionContent::RepeatableGroup { items } => {
            if !items.is_empty() {
                md.push_str(&format!("## {}\n\n", section.title));
                for item in items {
                    md.push_str(&format!("### {}\n", item_heading(item)));
                    if !item.date.is_empty() {
                        md.push_str(&format!("*{}*\n", item.date));
                    }
                    let description = html_to_text(&item.description);
                    if !description.is_empty() {
                        md.push_str(&format!("\n{description}\n"));
                    }
                    md.push('\n');
                }
            }
        }
    }
    md
}

// ────────────────────────────────────────────────────────────────────────────
// Plain text
// ────────────────────────────────────────────────────────────────────────────

fn render_section_text(section: &Section) -> String {
    let mut txt = String::new();
    let heading = |txt: &mut String| {
        let title = section.title.to_uppercase();
        txt.push_str(&format!("{title}\n{}\n", "=".repeat(title.chars().count())));
    };
    match &section.content {
        SectionContent::Personal { fields } => {
            for key in ["name", "headline"] {
                if let Some(v) = fields.get(key).filter(|v| !v.is_empty()) {
                    txt.push_str(&format!("{v}\n"));
                }
            }
            let contacts = contact_line(fields);
            if !contacts.is_empty() {
                txt.push_str(&format!("{contacts}\n"));
            }
        }
        SectionContent::Richtext { html } => {
            let text = html_to_text(html);
            if !text.is_empty() {
                heading(&mut txt);
                txt.push_str(&format!("{text}\n"));
            }
        }
        SectionContent::List { items } => {
            if !items.is_empty() {
                heading(&mut txt);
                txt.push_str(&format!("{}\n", items.join(", ")));
            }
        }
        SectionContent::RepeatableGroup { items } => {
            if !items.is_empty() {
                heading(&mut txt);
                for item in items {
                    let head = item_heading(item);
                    if item.date.is_empty() {
                        txt.push_str(&format!("{head}\n"));
                    } else {
                        txt.push_str(&format!("{head} ({})\n", item.date));
                    }
                    let description = html_to_text(&item.description);
                    if !description.is_empty() {
                        txt.push_str(&format!("{description}\n"));
                    }
                }
            }
        }
    }
    txt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cv::document::PERSONAL_KEY;
    use std::collections::BTreeMap;

    fn sample() -> EditableCV {
        let mut doc = EditableCV::empty();
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), "Ana Lima".to_string());
        fields.insert("email".to_string(), "ana@x.com".to_string());
        fields.insert("phone".to_string(), "(11) 99999-0000".to_string());
        doc.section_mut(PERSONAL_KEY).unwrap().content = SectionContent::Personal { fields };

        doc.sections.push(Section::new(
            "summary",
            "Resumo",
            SectionContent::Richtext {
                html: "<p>Engenheira <strong>backend</strong></p>".into(),
            },
        ));
        let mut job = SectionItem::new("Engenheira de Software");
        job.subtitle = "Acme".into();
        job.date = "2020 - Atual".into();
        job.description = "APIs em Rust".into();
        doc.sections.push(Section::new(
            "experience",
            "Experiência",
            SectionContent::RepeatableGroup { items: vec![job] },
        ));
        let mut hidden = Section::new(
            "skills",
            "Habilidades",
            SectionContent::List {
                items: vec!["Rust".into(), "SQL".into()],
            },
        );
        hidden.visible = false;
        doc.sections.push(hidden);
        doc
    }

    #[test]
    fn test_markdown_export() {
        let md = render(&sample(), ExportFormat::Markdown);
        assert!(md.starts_with("# Ana Lima\n\nana@x.com | (11) 99999-0000\n"));
        assert!(md.contains("## Resumo\n\nEngenheira backend\n"));
        assert!(md.contains("### Engenheira de Software - Acme\n*2020 - Atual*\n\nAPIs em Rust\n"));
        assert!(!md.contains("Habilidades"));
    }

    #[test]
    fn test_text_export() {
        let txt = render(&sample(), ExportFormat::Text);
        assert!(txt.starts_with("Ana Lima\nana@x.com | (11) 99999-0000\n"));
        assert!(txt.contains("RESUMO\n======\nEngenheira backend\n"));
        assert!(txt.contains("Engenheira de Software - Acme (2020 - Atual)\nAPIs em Rust\n"));
        assert!(!txt.contains('<'));
    }

    #[test]
    fn test_empty_sections_are_skipped() {
        let mut doc = EditableCV::empty();
        doc.sections.push(Section::new(
            "languages",
            "Idiomas",
            SectionContent::List { items: vec![] },
        ));
        assert_eq!(render(&doc, ExportFormat::Markdown), "\n");
    }
}
