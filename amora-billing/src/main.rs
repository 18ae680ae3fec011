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
use config::AppConfig;
use services::paystack::{PaymentGateway, PaystackClient};

pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub rabbitmq: RabbitMQClient,
    pub gateway: Arc<dyn PaymentGateway>,
    pub metrics_handle: PrometheusHandle,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    amora_shared::middleware::init_tracing("amora-billing");

    let config = AppConfig::load()?;
    let port = config.port;

    let metrics_handle = amora_shared::middleware::init_metrics()?;
    let db = db::create_pool(&config.database_url, config.db_pool_size)?;
    let rabbitmq = RabbitMQClient::connect(&config.rabbitmq_url).await?;
    let gateway = Arc::new(PaystackClient::new(
        &config.paystack_base_url,
        &config.paystack_secret_key,
        config.gateway_timeout_secs,
    )?);

    let state = Arc::new(AppState { db, config, rabbitmq, gateway, metrics_handle });

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::metrics))
        .route("/plans", get(routes::plans::list_plans))
        .route("/initialize", post(routes::checkout::initialize))
        .route("/verify/:reference", get(routes::checkout::verify))
        .route("/webhook", post(routes::webhook::handle_webhook))
        .route("/subscription", get(routes::subscription::get_subscription))
        .layer(middleware::from_fn(amora_shared::middleware::metrics_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "amora-billing starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
