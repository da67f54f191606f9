//! Health check and version endpoints.

use crate::server::WebRelay;
use axum::extract::Query;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Detailed health status, served for `?format=json`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Overall status.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
    /// Stored records.
    pub records: u64,
    /// Distinct authors.
    pub authors: u64,
    /// Stored blobs.
    pub blobs: u64,
    /// Live subscriptions.
    pub subscriptions: u64,
}

/// Name and version of the running server.
#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: String,
}

/// Query parameters for the health check.
#[derive(Debug, Default, Deserialize)]
pub struct HealthQuery {
    /// `json` selects the detailed report.
    pub format: Option<String>,
}

/// Health check handler.
///
/// Plain `OK` by default so load balancers can probe it cheaply.
pub async fn health_handler(
    Extension(relay): Extension<Arc<WebRelay>>,
    Query(query): Query<HealthQuery>,
) -> Response {
    if query.format.as_deref() != Some("json") {
        return "OK".into_response();
    }

    let stats = match relay.stats().await {
        Ok(stats) => stats,
        Err(e) => {
            warn!(error = %e, "Failed to collect relay stats");
            Default::default()
        }
    };

    Json(HealthStatus {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: relay.uptime().as_secs(),
        records: stats.records,
        authors: stats.authors,
        blobs: stats.blobs,
        subscriptions: stats.subscriptions,
    })
    .into_response()
}

/// Version handler.
pub async fn version_handler() -> Json<VersionInfo> {
    Json(VersionInfo {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
