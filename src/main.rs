use {
    axum::http::StatusCode,
    escrow_sync::{
        AppState,
        config::Config,
        domain::{policy::DefaultAuthorizationPolicy, webhook::ProviderStatusMapper},
        infra::{
            outbound::{TracingNotifier, TracingPayoutGateway},
            postgres::{
                audit_repo::PgAuditLog, escrow_repo::PgEscrowRepository,
                payment_repo::PgPaymentRepository,
            },
        },
        services::{
            escrow_manager::EscrowManager,
            reconciliation::WebhookEngine,
            side_effects::{Collaborators, SideEffects},
        },
    },
    sqlx::postgres::PgPoolOptions,
    std::{sync::Arc, time::Duration},
    tokio::{signal, sync::watch},
    tower_http::timeout::TimeoutLayer,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let payments = Arc::new(PgPaymentRepository::new(pool.clone()));
    let escrows = Arc::new(PgEscrowRepository::new(pool.clone()));
    let collaborators = Collaborators {
        notifier: Arc::new(TracingNotifier),
        audit: Arc::new(PgAuditLog::new(pool.clone())),
        payouts: Arc::new(TracingPayoutGateway),
    };

    let (effects, worker) = SideEffects::queued(collaborators, config.effect_max_attempts);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    let manager = Arc::new(EscrowManager::new(
        payments.clone(),
        escrows,
        Arc::new(DefaultAuthorizationPolicy),
        effects.clone(),
    ));
    let engine = Arc::new(WebhookEngine::new(
        payments,
        manager.clone(),
        Arc::new(ProviderStatusMapper::new(config.pending_policy)),
        effects,
        config.webhook_secret.as_str().into(),
        config.provider_name.clone(),
    )?);

    let app = escrow_sync::router(AppState {
        escrows: manager,
        webhooks: engine,
    })
    .layer(TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        Duration::from_secs(10),
    ));

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, provider = %config.provider_name, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the worker only after in-flight requests have emitted their effects.
    let _ = shutdown_tx.send(true);
    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "effect worker panicked");
    }
    pool.close().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
