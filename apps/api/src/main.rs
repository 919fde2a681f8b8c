mod assessment;
mod chat;
mod config;
mod content;
mod db;
mod errors;
mod llm_client;
mod models;
mod normalizer;
mod performance;
mod routes;
mod state;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::content::uploads::S3UploadStore;
use crate::db::{create_pool, run_migrations};
use crate::llm_client::LlmClient;
use crate::normalizer::RetryPolicy;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::{PgChatStore, PgRecordStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Essay API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL, the evaluation store and chat threads
    let db = create_pool(&config.database_url).await?;
    run_migrations(&db).await?;
    let store = Arc::new(PgRecordStore::new(db.clone()));
    let chats = Arc::new(PgChatStore::new(db));

    // Initialize S3 / MinIO
    let s3 = build_s3_client(&config).await;
    let uploads = Arc::new(S3UploadStore::new(s3, config.s3_bucket.clone()));
    info!("S3 client initialized (bucket: {})", config.s3_bucket);

    // Initialize LLM client
    let llm = Arc::new(LlmClient::new(config.anthropic_api_key.clone())?);
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let retry_policy = RetryPolicy::from_config(&config);
    info!(
        "Normalization retry policy: {} attempts, {:?} backoff, {}s budget",
        retry_policy.max_attempts, retry_policy.backoff, config.normalize_max_elapsed_secs
    );

    // Build app state
    let state = AppState {
        llm,
        store,
        chats,
        uploads,
        retry_policy,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict CORS origins to the web client domain

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "essay-api-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
