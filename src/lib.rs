//! Resale API Library
//!
//! This crate provides the core functionality for the resale marketplace API:
//! seller-owned listings, per-user carts, wallet coupons, multi-seller
//! checkout with order splitting, and the order lifecycle state machine.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod metrics;
pub mod migrator;
pub mod openapi;
pub mod services;

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use http::HeaderValue;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<db::DbPool>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

/// Builds the CORS layer from configuration.
///
/// Explicitly configured origins always win. Otherwise a permissive layer is
/// used, which `load_config` only permits in development or behind the
/// explicit override flag.
pub fn build_cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    if let Some(origins) = configured_origins {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if cfg.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        CorsLayer::permissive()
    }
}

/// Builds the full application router: versioned API, health endpoints and
/// Swagger UI, wrapped in the standard middleware stack.
pub fn app(state: AppState) -> Router {
    let cors_layer = build_cors_layer(&state.config);

    Router::new()
        .route("/", get(|| async { "resale-api up" }))
        .nest("/api/v1/products", handlers::products::products_routes())
        .nest("/api/v1/cart", handlers::carts::carts_routes())
        .nest("/api/v1/coupons", handlers::coupons::coupons_routes())
        .nest("/api/v1/checkout", handlers::checkout::checkout_routes())
        .nest("/api/v1/orders", handlers::orders::orders_routes())
        .nest(
            "/api/v1/transaction-groups",
            handlers::orders::transaction_groups_routes(),
        )
        .merge(handlers::health::health_routes())
        .merge(openapi::swagger_ui())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(cors_layer)
        .with_state(state)
}
