use axum::{
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tracing::debug;

use crate::autofill::{apply_contacts_only, CVAutofillResult};
use crate::cv::document::EditableCV;
use crate::cv::export::{self, ExportFormat};
use crate::cv::patch::{self, Patch};
use crate::cv::store::{self, StoreAction};
use crate::errors::AppError;

#[derive(Debug, Deserialize)]
pub struct PatchRequest {
    pub document: EditableCV,
    pub patches: Vec<Patch>,
}

/// POST /api/v1/cv/patch
/// Applies chat-assistant patches atomically: any failure leaves nothing applied.
pub async fn handle_apply_patches(
    Json(req): Json<PatchRequest>,
) -> Result<Json<EditableCV>, AppError> {
    debug!("Applying {} patches to {}", req.patches.len(), req.document.id);
    Ok(Json(patch::apply_patches(&req.document, &req.patches)?))
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub document: EditableCV,
    pub actions: Vec<StoreAction>,
}

/// POST /api/v1/cv/actions
pub async fn handle_dispatch_actions(
    Json(req): Json<ActionRequest>,
) -> Result<Json<EditableCV>, AppError> {
    let doc = req
        .actions
        .into_iter()
        .try_fold(req.document, |doc, action| store::dispatch(&doc, action))?;
    Ok(Json(doc))
}

#[derive(Debug, Deserialize)]
pub struct ApplyContactsRequest {
    pub document: EditableCV,
    pub autofill: CVAutofillResult,
}

/// POST /api/v1/cv/apply-contacts
pub async fn handle_apply_contacts(
    Json(req): Json<ApplyContactsRequest>,
) -> Json<EditableCV> {
    Json(apply_contacts_only(&req.document, &req.autofill.patch))
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub document: EditableCV,
    #[serde(default)]
    pub format: ExportFormat,
}

/// POST /api/v1/cv/export
pub async fn handle_export(Json(req): Json<ExportRequest>) -> Response {
    let body = export::render(&req.document, req.format);
    ([(header::CONTENT_TYPE, req.format.content_type())], body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cv::document::SectionContent;
    use axum::body::to_bytes;
    use std::collections::BTreeMap;

    fn doc_with_name(name: &str) -> EditableCV {
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), name.to_string());
        patch::apply_patch(
            &EditableCV::empty(),
            &Patch::SetFields {
                section: "personal".into(),
                fields,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_actions_fold_in_order() {
        let req = ActionRequest {
            document: EditableCV::empty(),
            actions: vec![
                StoreAction::SetTemplate {
                    template: "classic".into(),
                },
                StoreAction::ApplySuggestion {
                    section_key: "summary".into(),
                    text: "Engenheira de dados".into(),
                },
            ],
        };
        let Json(doc) = handle_dispatch_actions(Json(req)).await.unwrap();
        assert_eq!(doc.meta.template, "classic");
        assert!(matches!(
            &doc.section("summary").unwrap().content,
            SectionContent::Richtext { html } if html.contains("Engenheira de dados")
        ));
    }

    #[tokio::test]
    async fn test_failing_action_is_an_error() {
        let req = ActionRequest {
            document: EditableCV::empty(),
            actions: vec![StoreAction::ReorderSections { from: 0, to: 9 }],
        };
        assert!(matches!(
            handle_dispatch_actions(Json(req)).await,
            Err(AppError::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_export_sets_content_type() {
        let req = ExportRequest {
            document: doc_with_name("Ana Lima"),
            format: ExportFormat::Text,
        };
        let response = handle_export(Json(req)).await;
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("Ana Lima"));
    }

    #[tokio::test]
    async fn test_apply_contacts_keeps_existing_name() {
        let mut autofill = CVAutofillResult::default();
        autofill.patch.personal.name = "Outro Nome".into();
        autofill.patch.personal.email = "ana@x.com".into();
        let req = ApplyContactsRequest {
            document: doc_with_name("Ana Lima"),
            autofill,
        };
        let Json(doc) = handle_apply_contacts(Json(req)).await;
        let fields = doc.personal_fields().unwrap();
        assert_eq!(fields["name"], "Ana Lima");
        assert_eq!(fields["email"], "ana@x.com");
    }
}
