// Prompt fragments and builders for the CV edge functions.
// Prompts are written in Portuguese; the product targets Brazilian users.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "Você é um assistente preciso e estruturado. \
    Responda SOMENTE com JSON válido. \
    Não inclua texto fora do objeto JSON. \
    Não use blocos de código markdown. \
    Não inclua explicações ou desculpas.";

pub const RECRUITER_SYSTEM: &str = "Você é um recrutador sênior e especialista em currículos \
    para o mercado brasileiro. Seja direto, específico e construtivo.";

/// Caps the CV text forwarded to the model.
pub const MAX_CV_CHARS: usize = 30_000;

const ANALYSIS_SHAPE: &str = r#"{
  "score": 0-100,
  "summary": "visão geral em 2-3 frases",
  "sections": [
    {"section": "experience", "strengths": ["..."], "weaknesses": ["..."], "suggestions": ["..."]}
  ],
  "red_flags": ["..."]
}"#;

const EXTRACT_SHAPE: &str = r#"{
  "name": "", "email": "", "phone": "", "linkedin": "", "location": "", "summary": "",
  "experience": [{"company": "", "role": "", "period": "", "description": ""}],
  "education": [{"institution": "", "degree": "", "period": "", "description": ""}],
  "skills": [], "languages": [], "certifications": [],
  "projects": [{"name": "", "period": "", "description": ""}]
}"#;

const AUTOFILL_SHAPE: &str = r#"{
  "ok": true,
  "applyMode": "replace",
  "patch": {
    "personal": {"name": "", "headline": "", "email": "", "phone": "", "location": "", "linkedin": "", "website": ""},
    "summary": "<p>...</p>",
    "experience": [{"title": "cargo", "subtitle": "empresa", "date": "mm/aaaa - mm/aaaa ou Atual", "description": ""}],
    "education": [{"title": "curso", "subtitle": "instituição", "date": "", "description": ""}],
    "projects": [{"title": "", "subtitle": "", "date": "", "description": ""}],
    "skills": ["..."], "languages": ["..."], "certifications": ["..."]
  },
  "confidence": {"personal": 0-100, "summary": 0-100, "experience": 0-100, "education": 0-100, "projects": 0-100, "skills": 0-100},
  "warnings": ["..."]
}"#;

fn clip(text: &str) -> &str {
    match text.char_indices().nth(MAX_CV_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn build_analysis_prompt(cv_text: &str, target_career: Option<&str>) -> String {
    let target = target_career
        .filter(|t| !t.trim().is_empty())
        .map(|t| format!("A vaga/carreira alvo é: {t}. Avalie a aderência a ela.\n"))
        .unwrap_or_default();
    format!(
        "Analise o currículo abaixo.\n{target}\
         Retorne um JSON com exatamente este formato:\n{ANALYSIS_SHAPE}\n\n\
         CURRÍCULO:\n{}",
        clip(cv_text)
    )
}

pub fn build_extract_prompt(cv_text: &str) -> String {
    format!(
        "Extraia os dados estruturados do currículo abaixo. \
         Use string vazia ou lista vazia para o que não existir; não invente dados.\n\
         Retorne um JSON com exatamente este formato:\n{EXTRACT_SHAPE}\n\n\
         CURRÍCULO:\n{}",
        clip(cv_text)
    )
}

pub fn build_autofill_prompt(cv_text: &str) -> String {
    format!(
        "Preencha o editor de currículo a partir do texto abaixo.\n\
         Regras:\n\
         - \"summary\" é HTML usando apenas as tags p, br, strong, b, em, i, u, ul, ol, li.\n\
         - Cada habilidade tem no máximo 4 palavras, sem números, URLs ou barras.\n\
         - Todo item de experiência, formação ou projeto precisa de título.\n\
         - \"confidence\" é sua confiança (0-100) em cada bloco extraído.\n\
         - Liste em \"warnings\" tudo que ficou ambíguo.\n\
         Retorne um JSON com exatamente este formato:\n{AUTOFILL_SHAPE}\n\n\
         CV_TEXT:\n{}",
        clip(cv_text)
    )
}

pub fn build_career_details_prompt(query: &str, category: Option<&str>, offset: u32) -> String {
    let category = category
        .filter(|c| !c.trim().is_empty())
        .map(|c| format!(" na área de {c}"))
        .unwrap_or_default();
    format!(
        "Liste até 5 carreiras relacionadas a \"{query}\"{category}, \
         pulando as {offset} primeiras da sua ordem de relevância.\n\
         Para cada uma retorne: title, description, average_salary_brl, \
         required_skills (lista), growth_outlook.\n\
         Retorne um JSON no formato {{\"careers\": [ ... ]}}."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_prompt_mentions_target() {
        let prompt = build_analysis_prompt("Ana Lima\nDev", Some("Engenharia de Dados"));
        assert!(prompt.contains("Engenharia de Dados"));
        assert!(prompt.ends_with("Ana Lima\nDev"));
    }

    #[test]
    fn test_long_cv_is_clipped() {
        let text = "á".repeat(MAX_CV_CHARS + 10);
        let prompt = build_extract_prompt(&text);
        assert_eq!(prompt.matches('á').count(), MAX_CV_CHARS);
    }

    #[test]
    fn test_career_prompt_offset() {
        let prompt = build_career_details_prompt("dados", Some("tecnologia"), 5);
        assert!(prompt.contains("pulando as 5"));
        assert!(prompt.contains("na área de tecnologia"));
    }
}
