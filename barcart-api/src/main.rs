use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use barcart_api::{app, AppState, Collaborators};
use barcart_core::payment::PaymentProvider;
use barcart_order::{FeeRule, FeeSchedule, StateTaxTable};
use barcart_store::app_config::Config;
use barcart_store::{DbClient, PgMarketplace, PgOrderRepository, RedisClient, StripeClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "barcart_api=debug,barcart_order=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Barcart API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let fee_overrides = match db.fetch_fee_overrides(config.fees.state_overrides.clone()).await {
        Ok(overrides) => overrides,
        Err(e) => {
            tracing::warn!("Using file fee overrides only: {}", e);
            config.fees.state_overrides.clone()
        }
    };
    let fees = fee_overrides.iter().fold(
        FeeSchedule::new(FeeRule {
            percent: config.fees.commission_percent,
            fixed_cents: config.fees.fixed_fee_cents,
        }),
        |schedule, (state, rule)| {
            schedule.with_override(
                state,
                FeeRule {
                    percent: rule.commission_percent,
                    fixed_cents: rule.fixed_fee_cents,
                },
            )
        },
    );

    let tax = StateTaxTable::new(config.tax.default_rate)
        .with_state_rates(config.tax.state_rates.clone())
        .with_alcohol_surcharges(config.tax.alcohol_surcharge_rates.clone());

    let payments: Option<Arc<dyn PaymentProvider>> = if config.stripe.is_configured() {
        let client = StripeClient::new(&config.stripe).context("Failed to build Stripe client")?;
        Some(Arc::new(client))
    } else {
        tracing::warn!("Stripe secret key not set; checkout will answer 503");
        None
    };

    let marketplace = Arc::new(PgMarketplace::new(db.pool.clone()));
    let collaborators = Collaborators {
        payments,
        stores: marketplace.clone(),
        inventory: marketplace.clone(),
        orders: Arc::new(PgOrderRepository::new(db.pool.clone())),
        deliveries: marketplace.clone(),
        notifications: marketplace,
        tax: Arc::new(tax),
        fees: Arc::new(fees),
    };

    let mut app_state = AppState::new(
        collaborators,
        &config.checkout.currency,
        config.checkout.default_delivery_fee_cents,
    );
    match config.redis.url.as_deref() {
        Some(url) => {
            let redis = RedisClient::new(url).context("Invalid Redis URL")?;
            app_state = app_state.with_rate_limit(Arc::new(redis), config.rate_limit.requests_per_minute);
        }
        None => tracing::info!("Redis not configured; rate limiting disabled"),
    }

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
