pub mod auth;
pub mod booking;
pub mod cache;
pub mod clock;
pub mod config;
pub mod coupon;
pub mod db;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod models;
pub mod notify;
pub mod policy;
pub mod repository;
pub mod store;
pub mod sweeper;
pub mod webhook;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

use booking::BookingService;
use webhook::Reconciler;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub bookings: Arc<BookingService>,
    pub reconciler: Arc<Reconciler>,
    pub staff_api_token: String,
    pub started_at: Instant,
}

/// All routes. CORS is left to the caller.
pub fn app(state: Arc<AppState>) -> Router {
    // 1. Unauthenticated: health, processor webhook, catalog and availability
    let public_routes = Router::new()
        .route("/api/health", get(handlers::health::health))
        .route(
            "/api/payments/webhook",
            post(handlers::payment::payment_webhook),
        )
        .route("/api/services", get(handlers::client::list_services))
        .route("/api/slots", get(handlers::client::list_slots));

    // 2. Client: identified by X-Client-Id from the upstream gateway
    let client_routes = Router::new()
        .route("/api/bookings", post(handlers::client::create_booking))
        .route("/api/bookings/{id}", get(handlers::client::get_booking))
        .route(
            "/api/bookings/{id}/reschedule",
            post(handlers::client::reschedule_booking),
        )
        .route(
            "/api/bookings/{id}/cancel-preview",
            get(handlers::client::cancel_preview),
        )
        .route(
            "/api/bookings/{id}/cancel",
            post(handlers::client::cancel_booking),
        )
        .route(
            "/api/coupons/{code}",
            get(handlers::client::validate_coupon),
        );

    // 3. Staff: bearer token
    let staff_routes = Router::new()
        .route("/api/staff/slots", post(handlers::staff::create_slots))
        .route(
            "/api/staff/slots/open-day",
            post(handlers::staff::open_day),
        )
        .route(
            "/api/staff/bookings/upcoming",
            get(handlers::staff::upcoming),
        )
        .route(
            "/api/staff/bookings/pending",
            get(handlers::staff::pending),
        )
        .route(
            "/api/staff/bookings/{id}/complete",
            post(handlers::staff::complete),
        )
        .route(
            "/api/staff/providers/{id}/stats",
            get(handlers::staff::stats),
        )
        .route("/api/staff/coupons", post(handlers::staff::issue_coupon))
        .route_layer(from_fn_with_state(state.clone(), auth::require_staff));

    Router::new()
        .merge(public_routes)
        .merge(client_routes)
        .merge(staff_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
