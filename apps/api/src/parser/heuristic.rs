//! Heuristic plain-text résumé parser.
//!
//! Works on text extracted from a PDF or pasted by the user, with no layout
//! information. Section bodies are delimited by recognised headers; inside a
//! section each line is matched against a few common shapes and anything
//! unrecognised is appended to the current item's description. Unknown
//! layouts silently produce empty fields.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::parser::contacts::{extract_contacts, is_contact_line};
use crate::parser::dates::is_period_line;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Summary,
    Experience,
    Education,
    Skills,
    Languages,
    Certifications,
    Projects,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperienceEntry {
    pub company: String,
    pub role: String,
    pub period: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EducationEntry {
    pub institution: String,
    pub degree: String,
    pub period: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectEntry {
    pub name: String,
    pub period: String,
    pub description: String,
}

/// Structured résumé produced by the heuristic parser and by the LLM
/// `extract` mode. Every field defaults so partial LLM output still loads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CVData {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub linkedin: String,
    pub location: String,
    pub summary: String,
    pub experience: Vec<ExperienceEntry>,
    pub education: Vec<EducationEntry>,
    pub skills: Vec<String>,
    pub languages: Vec<String>,
    pub certifications: Vec<String>,
    pub projects: Vec<ProjectEntry>,
}

impl CVData {
    /// True when nothing beyond contact details was recognised.
    pub fn has_body(&self) -> bool {
        !self.summary.is_empty()
            || !self.experience.is_empty()
            || !self.education.is_empty()
            || !self.skills.is_empty()
            || !self.projects.is_empty()
    }
}

static HEADERS: Lazy<Vec<(SectionKind, Regex)>> = Lazy::new(|| {
    [
        (
            SectionKind::Summary,
            r"(?i)^(resumo( profissional)?|sobre( mim)?|perfil( profissional)?|objetivos?( profissional)?|summary|profile|about( me)?)$",
        ),
        (
            SectionKind::Experience,
            r"(?i)^(experi[êe]ncias?( profissional| profissionais)?|hist[óo]rico profissional|(work |professional )?experience)$",
        ),
        (
            SectionKind::Education,
            r"(?i)^(forma[çc][ãa]o( acad[êe]mica)?|educa[çc][ãa]o|escolaridade|education)$",
        ),
        (
            SectionKind::Skills,
            r"(?i)^(habilidades( t[ée]cnicas)?|compet[êe]ncias( t[ée]cnicas)?|conhecimentos( t[ée]cnicos)?|(technical )?skills)$",
        ),
        (SectionKind::Languages, r"(?i)^(idiomas|l[íi]nguas|languages)$"),
        (
            SectionKind::Certifications,
            r"(?i)^(certifica[çc][õo]es|cursos( complementares)?|certifications|courses)$",
        ),
        (SectionKind::Projects, r"(?i)^(projetos( pessoais)?|projects)$"),
    ]
    .into_iter()
    .map(|(kind, pattern)| (kind, Regex::new(pattern).unwrap()))
    .collect()
});

/// "Empresa X – Desenvolvedor (jan 2020 - mar 2022)"
static RE_SEPARATED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<left>[^–—|(]+?)\s+[–—|-]\s+(?P<right>[^(]+?)\s*(?:\((?P<dates>[^)]*)\))?$")
        .unwrap()
});

/// "Desenvolvedor Backend em Empresa X (2019 - 2021)"
static RE_ROLE_AT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<role>[^,.]+?)\s+(?:em|na|no|at)\s+(?P<company>[^,.(]+?)\s*(?:\((?P<dates>[^)]*)\))?$")
        .unwrap()
});

static RE_BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*[•\-*·▪●◦]\s*").unwrap());

static RE_LIST_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,;|•·]").unwrap());

static RE_LOCATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<loc>[\p{Lu}][\p{L} ]+?\s*[-,/]\s*(?:AC|AL|AP|AM|BA|CE|DF|ES|GO|MA|MT|MS|MG|PA|PB|PR|PE|PI|RJ|RN|RS|RO|RR|SC|SP|SE|TO))\b")
        .unwrap()
});

const MAX_HEADER_LEN: usize = 40;
const MAX_ITEM_LINE_LEN: usize = 90;
const MAX_SKILL_LEN: usize = 60;

/// Returns the section a header line opens, if any.
pub fn detect_header(line: &str) -> Option<SectionKind> {
    let candidate = line.trim().trim_end_matches(':').trim();
    if candidate.is_empty() || candidate.chars().count() > MAX_HEADER_LEN {
        return None;
    }
    HEADERS
        .iter()
        .find(|(_, re)| re.is_match(candidate))
        .map(|(kind, _)| *kind)
}

/// Parses raw résumé text into `CVData`. Never fails.
pub fn parse_cv_text(text: &str) -> CVData {
    let contacts = extract_contacts(text);
    let mut cv = CVData {
        email: contacts.email.unwrap_or_default(),
        phone: contacts.phone.unwrap_or_default(),
        linkedin: contacts.linkedin.unwrap_or_default(),
        ..CVData::default()
    };

    let mut preamble: Vec<&str> = Vec::new();
    let mut blocks: Vec<(SectionKind, Vec<&str>)> = Vec::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(kind) = detect_header(line) {
            blocks.push((kind, Vec::new()));
            continue;
        }
        match blocks.last_mut() {
            Some((_, lines)) => lines.push(line),
            None => preamble.push(line),
        }
    }

    cv.name = preamble
        .iter()
        .find(|l| looks_like_name(l))
        .map(|l| l.to_string())
        .unwrap_or_default();
    cv.location = preamble
        .iter()
        .find_map(|l| RE_LOCATION.captures(l))
        .map(|c| c["loc"].trim().to_string())
        .unwrap_or_default();

    for (kind, lines) in blocks {
        match kind {
            SectionKind::Summary => {
                let body = lines.join(" ");
                cv.summary = if cv.summary.is_empty() {
                    body
                } else {
                    format!("{} {}", cv.summary, body)
                };
            }
            SectionKind::Experience => cv.experience.extend(parse_experience(&lines)),
            SectionKind::Education => cv.education.extend(parse_education(&lines)),
            SectionKind::Skills => cv.skills.extend(split_list(&lines)),
            SectionKind::Languages => cv.languages.extend(split_list(&lines)),
            SectionKind::Certifications => {
                cv.certifications.extend(lines.iter().map(|l| strip_bullet(l)))
            }
            SectionKind::Projects => cv.projects.extend(parse_projects(&lines)),
        }
    }

    cv
}

fn parse_experience(lines: &[&str]) -> Vec<ExperienceEntry> {
    let mut entries: Vec<ExperienceEntry> = Vec::new();

    for raw in lines {
        let is_bullet = RE_BULLET.is_match(raw);
        let line = strip_bullet(raw);

        if !is_bullet && is_period_line(&line) {
            match entries.last_mut() {
                Some(current) if current.period.is_empty() => {
                    current.period = trim_parens(&line);
                }
                _ => entries.push(ExperienceEntry {
                    period: trim_parens(&line),
                    ..Default::default()
                }),
            }
            continue;
        }

        if !is_bullet && line.chars().count() <= MAX_ITEM_LINE_LEN {
            if let Some(caps) = RE_SEPARATED.captures(&line) {
                entries.push(ExperienceEntry {
                    company: caps["left"].trim().to_string(),
                    role: caps["right"].trim().to_string(),
                    period: caps.name("dates").map(|m| m.as_str().trim().to_string()).unwrap_or_default(),
                    description: String::new(),
                });
                continue;
            }
            if !line.ends_with('.') {
                if let Some(caps) = RE_ROLE_AT.captures(&line) {
                    entries.push(ExperienceEntry {
                        company: caps["company"].trim().to_string(),
                        role: caps["role"].trim().to_string(),
                        period: caps.name("dates").map(|m| m.as_str().trim().to_string()).unwrap_or_default(),
                        description: String::new(),
                    });
                    continue;
                }
            }
        }

        match entries.last_mut() {
            Some(current) => append_line(&mut current.description, &line),
            None => entries.push(ExperienceEntry {
                description: line,
                ..Default::default()
            }),
        }
    }

    entries
}

fn parse_education(lines: &[&str]) -> Vec<EducationEntry> {
    let mut entries: Vec<EducationEntry> = Vec::new();

    for raw in lines {
        let is_bullet = RE_BULLET.is_match(raw);
        let line = strip_bullet(raw);

        if !is_bullet && is_period_line(&line) {
            match entries.last_mut() {
                Some(current) if current.period.is_empty() => {
                    current.period = trim_parens(&line);
                }
                _ => entries.push(EducationEntry {
                    period: trim_parens(&line),
                    ..Default::default()
                }),
            }
            continue;
        }

        if !is_bullet && line.chars().count() <= MAX_ITEM_LINE_LEN {
            if let Some(caps) = RE_SEPARATED.captures(&line) {
                entries.push(EducationEntry {
                    institution: caps["left"].trim().to_string(),
                    degree: caps["right"].trim().to_string(),
                    period: caps.name("dates").map(|m| m.as_str().trim().to_string()).unwrap_or_default(),
                    description: String::new(),
                });
                continue;
            }
            match entries.last_mut() {
                Some(current) if current.institution.is_empty() && current.description.is_empty() => {
                    current.institution = line;
                    continue;
                }
                Some(current) if !current.degree.is_empty() && !current.institution.is_empty() => {}
                _ => {
                    entries.push(EducationEntry {
                        degree: line,
                        ..Default::default()
                    });
                    continue;
                }
            }
        }

        match entries.last_mut() {
            Some(current) => append_line(&mut current.description, &line),
            None => entries.push(EducationEntry {
                description: line,
                ..Default::default()
            }),
        }
    }

    entries
}

fn parse_projects(lines: &[&str]) -> Vec<ProjectEntry> {
    let mut entries: Vec<ProjectEntry> = Vec::new();

    for raw in lines {
        let is_bullet = RE_BULLET.is_match(raw);
        let line = strip_bullet(raw);

        let starts_project = !is_bullet
            && line.chars().count() <= MAX_ITEM_LINE_LEN
            && !line.ends_with('.')
            && entries
                .last()
                .map_or(true, |p| !p.description.is_empty() || p.name.is_empty());

        if starts_project {
            let (name, period) = split_trailing_period(&line);
            entries.push(ProjectEntry {
                name,
                period,
                description: String::new(),
            });
            continue;
        }

        match entries.last_mut() {
            Some(current) => append_line(&mut current.description, &line),
            None => entries.push(ProjectEntry {
                description: line,
                ..Default::default()
            }),
        }
    }

    entries
}

fn split_list(lines: &[&str]) -> Vec<String> {
    lines
        .iter()
        .flat_map(|line| RE_LIST_SPLIT.split(line))
        .map(strip_bullet)
        .filter(|s| !s.is_empty() && s.chars().count() <= MAX_SKILL_LEN)
        .collect()
}

fn looks_like_name(line: &str) -> bool {
    let words = line.split_whitespace().count();
    (1..=6).contains(&words)
        && line.chars().count() <= 60
        && !is_contact_line(line)
        && !line.chars().any(|c| c.is_ascii_digit())
        && RE_LOCATION.find(line).is_none()
}

fn strip_bullet(line: &str) -> String {
    RE_BULLET.replace(line, "").trim().to_string()
}

fn trim_parens(line: &str) -> String {
    line.trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .trim()
        .to_string()
}

/// "Portal X (2021)" -> ("Portal X", "2021")
fn split_trailing_period(line: &str) -> (String, String) {
    if let Some(open) = line.rfind('(') {
        if line.ends_with(')') {
            let inner = &line[open + 1..line.len() - 1];
            if inner.chars().any(|c| c.is_ascii_digit()) {
                return (line[..open].trim().to_string(), inner.trim().to_string());
            }
        }
    }
    (line.to_string(), String::new())
}

fn append_line(target: &mut String, line: &str) {
    if !target.is_empty() {
        target.push('\n');
    }
    target.push_str(line);
}
