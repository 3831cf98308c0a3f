use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::errors::AppError;
use crate::llm_client::retry::{with_retry, Classify, ErrorKind, RetryPolicy};

pub const MERCADOPAGO_API_BASE: &str = "https://api.mercadopago.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentInfo {
    pub id: String,
    pub status: String,
    /// Our user id, set when the checkout preference was created.
    pub external_reference: Option<String>,
}

impl PaymentInfo {
    pub fn is_approved(&self) -> bool {
        self.status == "approved"
    }
}

/// Payment provider lookups. Carried in `AppState` as `Arc<dyn PaymentGateway>`.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn fetch_payment(&self, payment_id: &str) -> Result<PaymentInfo, AppError>;
}

#[derive(Debug, Error)]
pub enum PaymentApiError {
    #[error("network error talking to MercadoPago: {0}")]
    Http(#[from] reqwest::Error),

    #[error("MercadoPago API error (status {status}): {body}")]
    Api { status: u16, body: String },
}

impl Classify for PaymentApiError {
    fn kind(&self) -> ErrorKind {
        match self {
            PaymentApiError::Http(_) => ErrorKind::Network,
            PaymentApiError::Api { status, .. } => match *status {
                401 | 403 => ErrorKind::Authentication,
                429 | 500..=599 => ErrorKind::Api,
                _ => ErrorKind::Validation,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    id: Value,
    status: String,
    external_reference: Option<String>,
}

pub struct MercadoPagoClient {
    client: Client,
    access_token: String,
    base_url: String,
    retry: RetryPolicy,
}

impl MercadoPagoClient {
    pub fn new(access_token: String) -> Self {
        Self::with_base_url(access_token, MERCADOPAGO_API_BASE.to_string())
    }

    pub fn with_base_url(access_token: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            access_token,
            base_url,
            retry: RetryPolicy::exponential(),
        }
    }

    async fn get_payment(&self, payment_id: &str) -> Result<PaymentResponse, PaymentApiError> {
        let url = format!("{}/v1/payments/{}", self.base_url, payment_id);
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

/// Payment ids are numeric and go into the URL path as-is.
pub fn is_payment_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

#[async_trait]
impl PaymentGateway for MercadoPagoClient {
    async fn fetch_payment(&self, payment_id: &str) -> Result<PaymentInfo, AppError> {
        if !is_payment_id(payment_id) {
            return Err(AppError::Validation(format!(
                "id de pagamento inválido: '{payment_id}'"
            )));
        }
        let response = with_retry(&self.retry, move || self.get_payment(payment_id))
            .await
            .map_err(|e| AppError::Internal(e.into()))?;

        let id = match response.id {
            Value::String(s) => s,
            other => other.to_string(),
        };
        debug!("Payment {id} status: {}", response.status);
        Ok(PaymentInfo {
            id,
            status: response.status,
            external_reference: response.external_reference.filter(|r| !r.is_empty()),
        })
    }
}
