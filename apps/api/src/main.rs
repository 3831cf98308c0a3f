mod analysis;
mod auth;
mod autofill;
mod cache;
mod careers;
mod config;
mod cv;
mod db;
mod drafts;
mod errors;
mod json_repair;
mod llm_client;
mod models;
mod parser;
mod payments;
mod routes;
mod state;
mod usage;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cache::RedisCache;
use crate::config::Config;
use crate::cv::autosave::DEFAULT_DEBOUNCE;
use crate::db::create_pool;
use crate::drafts::{s3::S3DraftSink, AutosaveRegistry};
use crate::llm_client::{LlmClient, LlmSettings};
use crate::payments::gateway::MercadoPagoClient;
use crate::payments::PgPaymentLedger;
use crate::routes::build_router;
use crate::state::AppState;
use crate::usage::quota::{PgQuotaStore, QuotaLimits};
use crate::usage::UsageTracker;

#[tokio::main]
async fn main() -> Result<()> {
    // Fails fast on missing required env vars
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting CVKit API v{}", env!("CARGO_PKG_VERSION"));

    // PostgreSQL: users, daily quota, payment events
    let db = create_pool(&config.database_url).await?;

    let redis = redis::Client::open(config.redis_url.clone())?;
    info!("Redis client initialized");

    let s3 = build_s3_client(&config).await;
    info!("S3 client initialized (bucket: {})", config.s3_bucket);

    let mut llm_settings = LlmSettings::new(config.gemini_api_key.clone());
    llm_settings.openai_api_key = config.openai_api_key.clone();
    llm_settings.default_model = config.gemini_model.clone();
    let llm = LlmClient::new(llm_settings);
    info!(
        "LLM client initialized (model: {}, openai: {})",
        llm.default_model(),
        config.openai_api_key.is_some()
    );

    let drafts = Arc::new(AutosaveRegistry::new(
        Arc::new(S3DraftSink::new(s3, config.s3_bucket.clone())),
        DEFAULT_DEBOUNCE,
    ));

    let state = AppState {
        llm,
        quota: Arc::new(PgQuotaStore::new(db.clone())),
        quota_limits: QuotaLimits {
            free: config.free_daily_limit,
            premium: config.premium_daily_limit,
        },
        cache: Arc::new(RedisCache::new(redis)),
        drafts: drafts.clone(),
        payments: Arc::new(MercadoPagoClient::new(
            config.mercadopago_access_token.clone(),
        )),
        payment_ledger: Arc::new(PgPaymentLedger::new(db)),
        usage: Arc::new(UsageTracker::default()),
        config: config.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins to the web app's domain

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Pending autosaves are written before exit
    drafts.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// S3 client for MinIO locally or AWS in production.
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "cvkit-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
