mod config;
mod db;
mod dtos;
mod error;
mod handler;
mod middleware;
mod models;
mod routes;
mod service;
mod utils;

use std::sync::Arc;

use axum::http::{header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE}, HeaderValue, Method};
use config::Config;
use dotenv::dotenv;
use routes::create_router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tracing_subscriber::filter::LevelFilter;

use crate::db::db::{DBClient, MarketStore};
use service::{
    audit_service::AuditService,
    consultation_service::ConsultationService,
    dispute_service::DisputeService,
    escrow_service::{EscrowService, EscrowSettings},
    history::HistoryService,
    milestone_service::MilestoneService,
    notification_service::NotificationService,
    payment_provider::{PaymentGateway, PaystackGateway},
    payment_service::PaymentService,
    project_service::ProjectService,
};

#[derive(Clone)]
pub struct AppState {
    pub env: Config,
    pub db_client: Arc<DBClient>,
    pub project_service: Arc<ProjectService>,
    pub milestone_service: Arc<MilestoneService>,
    pub escrow_service: Arc<EscrowService>,
    pub dispute_service: Arc<DisputeService>,
    pub consultation_service: Arc<ConsultationService>,
    pub payment_service: Arc<PaymentService>,
    pub history_service: Arc<HistoryService>,
    pub audit_service: Arc<AuditService>,
}

impl AppState {
    pub fn new(db_client: DBClient, config: Config) -> Self {
        let db_client = Arc::new(db_client);
        let gateway: Arc<dyn PaymentGateway> = Arc::new(PaystackGateway::new(&config));
        let store: Arc<dyn MarketStore> = db_client.clone();
        Self::build(config, db_client, store, gateway)
    }

    pub(crate) fn build(
        config: Config,
        db_client: Arc<DBClient>,
        store: Arc<dyn MarketStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let settings = EscrowSettings::from_config(&config);

        let audit_service = Arc::new(AuditService::new(store.clone()));
        let notification_service = Arc::new(NotificationService::new(store.clone()));

        let project_service = Arc::new(ProjectService::new(
            store.clone(),
            audit_service.clone(),
            notification_service.clone(),
        ));
        let milestone_service = Arc::new(MilestoneService::new(
            store.clone(),
            audit_service.clone(),
            notification_service.clone(),
        ));
        let escrow_service = Arc::new(EscrowService::new(
            store.clone(),
            gateway.clone(),
            project_service.clone(),
            audit_service.clone(),
            notification_service.clone(),
            settings.clone(),
        ));
        let dispute_service = Arc::new(DisputeService::new(
            store.clone(),
            project_service.clone(),
            audit_service.clone(),
            notification_service.clone(),
        ));
        let consultation_service = Arc::new(ConsultationService::new(
            store.clone(),
            gateway.clone(),
            audit_service.clone(),
            notification_service,
            settings,
        ));
        let payment_service = Arc::new(PaymentService::new(
            store.clone(),
            gateway,
            escrow_service.clone(),
            consultation_service.clone(),
            audit_service.clone(),
            config.paystack_secret_key.clone(),
        ));
        let history_service = Arc::new(HistoryService::new(store));

        Self {
            env: config,
            db_client,
            project_service,
            milestone_service,
            escrow_service,
            dispute_service,
            consultation_service,
            payment_service,
            history_service,
            audit_service,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::DEBUG)
        .init();

    dotenv().ok();

    let config = Config::init();

    let pool = match PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => {
            tracing::info!("Connection to the database is successful");
            pool
        }
        Err(err) => {
            tracing::error!("Failed to connect to the database: {:?}", err);
            std::process::exit(1);
        }
    };

    if let Err(err) = sqlx::migrate!("./migrations").run(&pool).await {
        tracing::error!("Failed to run database migrations: {:?}", err);
        std::process::exit(1);
    }

    let allowed_origin = config
        .app_url
        .parse::<HeaderValue>()
        .unwrap_or_else(|_| HeaderValue::from_static("http://localhost:8000"));
    let cors = CorsLayer::new()
        .allow_origin(allowed_origin)
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT]);

    let db_client = DBClient::new(pool);
    let app_state = Arc::new(AppState::new(db_client, config.clone()));

    let app = create_router(app_state).layer(cors);

    tracing::info!("Server is running on http://0.0.0.0:{}", config.port);

    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{}", &config.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("Failed to bind port {}: {:?}", config.port, err);
            std::process::exit(1);
        }
    };

    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!("Server error: {:?}", err);
    }
}
