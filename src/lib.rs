pub mod adapters;
pub mod config;
pub mod domain;
pub mod infra;
pub mod services;

use {
    axum::{
        Router,
        extract::DefaultBodyLimit,
        routing::{get, post},
    },
    services::{escrow_manager::EscrowManager, reconciliation::WebhookEngine},
    std::sync::Arc,
};

/// Provider callbacks are a few hundred bytes; escrow requests not much more.
pub const BODY_LIMIT: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub escrows: Arc<EscrowManager>,
    pub webhooks: Arc<WebhookEngine>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "ok" }))
        .route("/webhook", post(adapters::webhook::webhook_handler))
        .route("/escrows", post(adapters::escrow_api::create_escrow))
        .route("/escrows/{id}", get(adapters::escrow_api::get_escrow))
        .route(
            "/escrows/{id}/{action}",
            post(adapters::escrow_api::escrow_action),
        )
        .route(
            "/users/{user_id}/escrows",
            get(adapters::escrow_api::user_escrows),
        )
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state)
}
