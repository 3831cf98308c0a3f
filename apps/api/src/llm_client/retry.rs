//! Error taxonomy and retry helpers shared by outbound calls.
//!
//! Most failures arrive as free-form messages, so the kind is usually
//! recovered by substring matching. Network and API failures are retryable;
//! everything else fails fast.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Network,
    Api,
    Authentication,
    Validation,
    Unknown,
}

const AUTH_MARKERS: &[&str] = &[
    "401",
    "403",
    "unauthorized",
    "forbidden",
    "api key",
    "api_key",
    "permission denied",
    "authentication",
];
const NETWORK_MARKERS: &[&str] = &[
    "network",
    "timeout",
    "timed out",
    "connection",
    "connect",
    "dns",
    "error sending request",
    "fetch",
];
const VALIDATION_MARKERS: &[&str] = &["400", "invalid", "validation", "required", "malformed"];
const API_MARKERS: &[&str] = &[
    "429",
    "500",
    "502",
    "503",
    "504",
    "rate limit",
    "quota",
    "overloaded",
    "unavailable",
    "server error",
    "api error",
];

impl ErrorKind {
    /// Classifies by message. Authentication wins over the others because
    /// provider messages about bad keys often also say "invalid".
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        let has = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));
        if has(AUTH_MARKERS) {
            ErrorKind::Authentication
        } else if has(NETWORK_MARKERS) {
            ErrorKind::Network
        } else if has(VALIDATION_MARKERS) {
            ErrorKind::Validation
        } else if has(API_MARKERS) {
            ErrorKind::Api
        } else {
            ErrorKind::Unknown
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::Api)
    }

    pub fn friendly_message(&self) -> &'static str {
        match self {
            ErrorKind::Network => {
                "Falha de conexão. Verifique sua internet e tente novamente."
            }
            ErrorKind::Api => {
                "O serviço de IA está indisponível no momento. Tente novamente em instantes."
            }
            ErrorKind::Authentication => "Sessão expirada ou sem permissão. Faça login novamente.",
            ErrorKind::Validation => "Os dados enviados são inválidos. Revise e tente novamente.",
            ErrorKind::Unknown => "Ocorreu um erro inesperado. Tente novamente.",
        }
    }
}

/// Errors that know their own kind. Structured errors override `kind`;
/// the default falls back to message classification.
pub trait Classify: Display {
    fn kind(&self) -> ErrorKind {
        ErrorKind::classify(&self.to_string())
    }
}

impl Classify for anyhow::Error {}

/// User-facing view of an error. `detail` is only filled in debug builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FriendlyError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl FriendlyError {
    pub fn from_error<E: Classify + ?Sized>(err: &E) -> Self {
        let kind = err.kind();
        Self {
            kind,
            message: kind.friendly_message().to_string(),
            detail: cfg!(debug_assertions).then(|| err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Policy of the LLM shim: 3 attempts, 500 ms, 1000 ms.
    pub const fn linear() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            backoff: Backoff::Linear,
        }
    }

    /// General-purpose policy: 3 attempts, 1 s, 2 s.
    pub const fn exponential() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            backoff: Backoff::Exponential,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self.backoff {
            Backoff::Linear => self.base_delay * retry,
            Backoff::Exponential => self.base_delay * 2u32.saturating_pow(retry.saturating_sub(1)),
        }
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// attempts run out. The last error is returned.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    E: Classify,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let kind = e.kind();
                if !kind.is_retryable() || attempt >= attempts {
                    return Err(e);
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    "Attempt {attempt}/{attempts} failed ({kind:?}): {e}; retrying after {}ms",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
