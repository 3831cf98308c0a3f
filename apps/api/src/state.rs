use std::sync::Arc;

use crate::cache::JsonCache;
use crate::config::Config;
use crate::drafts::AutosaveRegistry;
use crate::llm_client::LlmClient;
use crate::payments::gateway::PaymentGateway;
use crate::payments::PaymentLedger;
use crate::usage::quota::{QuotaLimits, QuotaStore};
use crate::usage::UsageTracker;

/// Shared application state injected into all route handlers via Axum extractors.
/// Storage-backed services sit behind traits so handlers run against in-memory fakes in tests.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub llm: LlmClient,
    pub quota: Arc<dyn QuotaStore>,
    pub quota_limits: QuotaLimits,
    /// Redis-backed in production. Best-effort: failures read as misses.
    pub cache: Arc<dyn JsonCache>,
    pub drafts: Arc<AutosaveRegistry>,
    pub payments: Arc<dyn PaymentGateway>,
    pub payment_ledger: Arc<dyn PaymentLedger>,
    pub usage: Arc<UsageTracker>,
}
