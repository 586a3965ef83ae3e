//! API routes

pub mod bookings;
pub mod claims;
pub mod health;
pub mod payments;
pub mod tenants;
pub mod trials;
pub mod webhooks;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{
    auth::{require_auth, require_service_role},
    state::AppState,
};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Public API routes (no auth; webhooks verify their own signatures)
    let public_api_routes = Router::new()
        .route(
            "/create-stripe-payment-intent",
            post(payments::create_stripe_payment_intent),
        )
        .route("/create-paypal-order", post(payments::create_paypal_order))
        .route("/capture-paypal-order", post(payments::capture_paypal_order))
        .route("/mpesa-stk-push", post(payments::mpesa_stk_push))
        .route("/mpesa-stk-query", post(payments::mpesa_stk_query))
        .route("/stripe-webhook", post(webhooks::stripe_webhook))
        .route("/paypal-webhook", post(webhooks::paypal_webhook))
        .route(
            "/get-tenant-by-domain",
            get(tenants::get_tenant_by_domain).post(tenants::get_tenant_by_domain_post),
        )
        .route(
            "/get-booking-by-cancel-token",
            get(bookings::get_booking_by_cancel_token),
        )
        .route("/cancel-booking", post(bookings::cancel_booking))
        .route(
            "/send-booking-confirmation",
            post(bookings::send_booking_confirmation),
        )
        .route(
            "/send-booking-cancellation",
            post(bookings::send_booking_cancellation),
        )
        .route("/send-booking-no-show", post(bookings::send_booking_no_show))
        .route("/send-booking-reminder", post(bookings::send_booking_reminder));

    // Protected API routes (user bearer token)
    let protected_api_routes = Router::new()
        .route("/claim-stripe-tenant", post(claims::claim_stripe_tenant))
        .route("/claim-paypal-tenant", post(claims::claim_paypal_tenant))
        .route(
            "/remove-my-expired-trial",
            post(trials::remove_my_expired_trial),
        )
        .layer(middleware::from_fn_with_state(
            auth_state.clone(),
            require_auth,
        ));

    // Service-role routes (infrastructure callers only)
    let service_api_routes = Router::new()
        .route(
            "/remove-expired-trial-data",
            post(trials::remove_expired_trial_data),
        )
        .layer(middleware::from_fn_with_state(
            auth_state,
            require_service_role,
        ));

    let api_v1_routes = Router::new()
        .merge(public_api_routes)
        .merge(protected_api_routes)
        .merge(service_api_routes);

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        // The SPA and payment-provider dashboards call this API from other
        // origins; preflight OPTIONS must always succeed.
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB: webhook payloads are small
        .with_state(state)
}
