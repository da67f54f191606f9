//! HTTP surface for web-relay.
//!
//! Every path that is not one of the service endpoints below is a relay
//! path, `/<authorID>/<path>` or `/subscribe/<authorID>/<path>`, handled by
//! [`relay::relay_handler`].

pub mod health;
mod metrics;
pub mod relay;

use crate::server::WebRelay;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_EXPOSE_HEADERS,
};
use axum::http::HeaderValue;
use axum::{routing::get, Extension, Router};
use relay_types::protocol::{ALLOWED_METHODS, HEADER_NAMES};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

pub use health::{HealthStatus, VersionInfo};

/// Build the HTTP router with all endpoints.
pub fn build_router(relay: Arc<WebRelay>) -> Router {
    let http = relay.config().http.clone();

    let mut router = Router::new()
        .route("/health-check", get(health::health_handler))
        .route("/version", get(health::version_handler));
    if http.metrics_enabled {
        router = router.route("/metrics", get(metrics::metrics_handler));
    }

    let router = router
        .fallback(relay::relay_handler)
        .layer(Extension(relay))
        .layer(TraceLayer::new_for_http());

    if !http.cors {
        return router;
    }
    router
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(HEADER_NAMES),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static(HEADER_NAMES),
        ))
}

/// Serve `relay` on `listener` until the future is dropped.
pub async fn serve(listener: TcpListener, relay: Arc<WebRelay>) -> std::io::Result<()> {
    axum::serve(listener, build_router(relay)).await
}
