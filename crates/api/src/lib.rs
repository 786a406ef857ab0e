//! HTTP API server for the coupon marketplace.
//!
//! Exposes accounts, coupon listings and the purchase orchestrator over REST,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use purchase::{
    ExpiryReminderJob, InMemoryReconciliationQueue, LoggingNotificationSink, PurchaseOrchestrator,
};
use record_store::RecordStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::{AppState, SharedNotifier};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: RecordStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/accounts", post(routes::accounts::create::<S>))
        .route("/accounts/{id}", get(routes::accounts::get::<S>))
        .route("/coupons", post(routes::coupons::create::<S>))
        .route("/coupons/{id}", get(routes::coupons::get::<S>))
        .route("/coupons/{id}/purchase", post(routes::coupons::purchase::<S>))
        .route("/coupons/{id}/ledger", get(routes::coupons::ledger::<S>))
        .route("/incidents", get(routes::incidents::list::<S>))
        .route(
            "/notifications/expiry-reminder",
            get(routes::notifications::expiry_reminder::<S>)
                .post(routes::notifications::expiry_reminder::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state around a record store and notification sink.
pub fn create_state<S: RecordStore + Clone + 'static>(
    store: S,
    notifier: SharedNotifier,
    config: &Config,
) -> Arc<AppState<S>> {
    let purchase_config = config.purchase_config();
    let orchestrator = PurchaseOrchestrator::with_config(
        store.clone(),
        notifier.clone(),
        InMemoryReconciliationQueue::new(),
        purchase_config,
    );
    let reminders = ExpiryReminderJob::with_config(store, notifier, purchase_config);

    Arc::new(AppState {
        orchestrator,
        reminders,
        cron_secret: config.cron_secret.clone(),
    })
}

/// Creates the default application state, logging notifications instead of
/// sending them.
pub fn create_default_state<S: RecordStore + Clone + 'static>(
    store: S,
    config: &Config,
) -> Arc<AppState<S>> {
    create_state(store, Arc::new(LoggingNotificationSink), config)
}
