use axum::extract::DefaultBodyLimit;
use axum::{middleware, routing::{get, post}, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod config;
mod events;
mod models;
mod routes;
mod schema;
mod services;

use amora_shared::clients::db::{self, DbPool};
use amora_shared::clients::rabbitmq::RabbitMQClient;
use amora_shared::clients::storage::StorageClient;
use config::AppConfig;

pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub rabbitmq: RabbitMQClient,
    pub storage: StorageClient,
    pub metrics_handle: PrometheusHandle,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    amora_shared::middleware::init_tracing("amora-discovery");

    let config = AppConfig::load()?;
    let port = config.port;

    let metrics_handle = amora_shared::middleware::init_metrics()?;
    let db = db::create_pool(&config.database_url, config.db_pool_size)?;
    let rabbitmq = RabbitMQClient::connect(&config.rabbitmq_url).await?;
    let storage = StorageClient::new(
        &config.storage_endpoint,
        &config.storage_access_key,
        &config.storage_secret_key,
        &config.storage_bucket,
        &config.storage_public_url,
    )
    .await;

    let state = Arc::new(AppState { db, config, rabbitmq, storage, metrics_handle });

    let sub_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = events::subscriber::listen_user_registered(sub_state).await {
            tracing::error!(error = %e, "user.registered subscriber failed");
        }
    });

    // Multipart framing needs a little room above the image limit
    let upload_limit = DefaultBodyLimit::max(routes::photos::MAX_UPLOAD_BYTES + 64 * 1024);

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::metrics))
        .route(
            "/me",
            get(routes::profile::get_profile)
                .patch(routes::profile::update_profile)
                .delete(routes::profile::hide_profile),
        )
        .route("/onboarding", post(routes::profile::complete_onboarding))
        .route("/profiles/:id", get(routes::profile::get_public_profile))
        .route(
            "/photos",
            post(routes::photos::upload_photo)
                .delete(routes::photos::delete_photo)
                .layer(upload_limit),
        )
        .route("/verification", post(routes::verification::submit_verification).layer(upload_limit))
        .route("/discover", get(routes::discover::discover))
        .route("/swipes", post(routes::swipes::record_swipe))
        .route("/matches", get(routes::matches::list_matches))
        .route("/matches/check/:user_id", get(routes::matches::check_match))
        .layer(middleware::from_fn(amora_shared::middleware::metrics_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "amora-discovery starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
