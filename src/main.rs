//! Checkout Orchestrator - cart to paid, shipped order

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use checkout_orchestrator::api::{self, AppState};
use checkout_orchestrator::auth::{HttpSessionResolver, SessionResolver, StaticSessions};
use checkout_orchestrator::config::Config;
use checkout_orchestrator::gateways::{HttpPaymentGateway, HttpShippingGateway};
use checkout_orchestrator::notify::{LogNotifier, NatsNotifier, Notifier};
use checkout_orchestrator::repository::{PgCatalog, PgCouponRepository, PgOrderRepository};
use checkout_orchestrator::service::{fulfillment, CheckoutService, Collaborators};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env()?;

    let db = PgPoolOptions::new().max_connections(10).connect(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let notifier: Arc<dyn Notifier> = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsNotifier::new(client)),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, notifications will only be logged");
                Arc::new(LogNotifier)
            }
        },
        None => Arc::new(LogNotifier),
    };

    let deps = Collaborators {
        catalog: Arc::new(PgCatalog::new(db.clone())),
        orders: Arc::new(PgOrderRepository::new(db.clone())),
        coupons: Arc::new(PgCouponRepository::new(db)),
        payments: Arc::new(HttpPaymentGateway::new(config.payment.clone())?),
        shipping: Arc::new(HttpShippingGateway::new(config.shipping.clone())?),
        notifier,
    };
    let (jobs, queue) = fulfillment::channel();
    let service = Arc::new(CheckoutService::new(deps, config.checkout.clone(), jobs));
    let _worker = fulfillment::spawn_worker(service.clone(), queue, config.post_payment_concurrency);

    let sessions: Arc<dyn SessionResolver> = match &config.auth_service_url {
        Some(url) => Arc::new(HttpSessionResolver::new(url.as_str(), config.payment.connect_timeout, config.payment.timeout)?),
        None => {
            tracing::warn!("AUTH_SERVICE_URL not set, only the operator token is recognised");
            Arc::new(StaticSessions::operator_only(config.operator_token.clone()))
        }
    };

    let app = api::router(AppState { service, sessions });
    tracing::info!("🚀 Checkout orchestrator listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
