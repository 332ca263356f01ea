use sqlx::sqlite::SqlitePoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use barber_server::{
    booking::{BookingService, Repositories},
    cache::TtlCache,
    clock::SystemClock,
    config::Config,
    db,
    gateway::{HttpPaymentGateway, PaymentGateway},
    notify::Notifier,
    store::Store,
    sweeper::Sweeper,
    webhook::Reconciler,
    AppState,
};

/// Cache purge interval (seconds).
const CACHE_PURGE_SECS: u64 = 300;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // ── Tracing ──
    let env_filter = EnvFilter::from_default_env().add_directive("info".parse()?);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    if config.payment.access_token.is_empty() {
        tracing::warn!("PAYMENT_ACCESS_TOKEN not set, checkouts will fail");
    }
    if config.payment.webhook_secret.is_none() {
        tracing::warn!("PAYMENT_WEBHOOK_SECRET not set, webhook signatures are not checked");
    }
    if config.staff_api_token.is_empty() {
        tracing::warn!("STAFF_API_TOKEN not set, staff routes are locked");
    }

    // ── Database ──
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    db::run_migrations(&pool).await?;

    // ── Booking engine ──
    let gateway: Arc<dyn PaymentGateway> =
        Arc::new(HttpPaymentGateway::new(&config.payment, &config.public_url)?);
    let cache = TtlCache::new(config.cache.clone());
    let notifier = Notifier::default();

    let bookings = Arc::new(BookingService::new(
        Repositories::from_store(Store::new(pool.clone())),
        gateway.clone(),
        Arc::new(SystemClock),
        cache.clone(),
        notifier.clone(),
        config.policy.clone(),
    ));
    let reconciler = Arc::new(Reconciler::new(
        bookings.clone(),
        gateway,
        config.payment.webhook_secret.clone(),
    ));

    let state = Arc::new(AppState {
        db: pool,
        bookings: bookings.clone(),
        reconciler,
        staff_api_token: config.staff_api_token.clone(),
        started_at: Instant::now(),
    });

    // ── Background task: release expired holds ──
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = Sweeper::new(bookings, config.sweep_interval).spawn(shutdown_rx.clone());

    // ── Background task: drop expired cache entries ──
    let mut purge_shutdown = shutdown_rx;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(CACHE_PURGE_SECS));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let purged = cache.purge_expired();
                    if purged > 0 {
                        tracing::debug!("Purged {} expired cache entries", purged);
                    }
                }
                _ = purge_shutdown.changed() => break,
            }
        }
    });

    // ── Event log: the only subscriber until a push channel exists ──
    let mut events = notifier.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!(?event, "Booking event"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event log lagged, {} event(s) skipped", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // ── CORS: whitelist PUBLIC_URL when configured, otherwise allow any ──
    let cors = match config.public_url.parse::<axum::http::HeaderValue>() {
        Ok(origin) if !config.public_url.contains("localhost") => CorsLayer::new()
            .allow_origin(AllowOrigin::list([origin]))
            .allow_methods(Any)
            .allow_headers(Any),
        _ => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };

    let app = barber_server::app(state).layer(cors);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Barber booking server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        tracing::error!("Sweeper task ended abnormally: {}", e);
    }
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
