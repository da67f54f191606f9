//! Prometheus metrics endpoint.

use crate::server::WebRelay;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Gauges describe current state; counters are monotonic since startup.
pub async fn metrics_handler(Extension(relay): Extension<Arc<WebRelay>>) -> impl IntoResponse {
    let m = relay.metrics();

    let gets = m.gets_total.load(Ordering::Relaxed);
    let puts = m.puts_accepted.load(Ordering::Relaxed);
    let conflicts = m.conflicts_total.load(Ordering::Relaxed);
    let rejections = m.rejections_total.load(Ordering::Relaxed);
    let bytes_rx = m.bytes_received.load(Ordering::Relaxed);
    let bytes_tx = m.bytes_sent.load(Ordering::Relaxed);
    let subscribers = m.subscribers_total.load(Ordering::Relaxed);

    // Storage stats are best effort
    let stats = relay.stats().await.unwrap_or_default();

    let body = format!(
        r#"# HELP web_relay_info Server information
# TYPE web_relay_info gauge
web_relay_info{{version="{version}"}} 1

# HELP web_relay_gets_total Total GET requests answered with content
# TYPE web_relay_gets_total counter
web_relay_gets_total {gets}

# HELP web_relay_puts_accepted_total Total PUT requests accepted
# TYPE web_relay_puts_accepted_total counter
web_relay_puts_accepted_total {puts}

# HELP web_relay_conflicts_total Total PUT requests refused for an older timestamp
# TYPE web_relay_conflicts_total counter
web_relay_conflicts_total {conflicts}

# HELP web_relay_rejections_total Total PUT requests rejected as invalid
# TYPE web_relay_rejections_total counter
web_relay_rejections_total {rejections}

# HELP web_relay_bytes_received_total Total content bytes received
# TYPE web_relay_bytes_received_total counter
web_relay_bytes_received_total {bytes_rx}

# HELP web_relay_bytes_sent_total Total content bytes sent
# TYPE web_relay_bytes_sent_total counter
web_relay_bytes_sent_total {bytes_tx}

# HELP web_relay_subscribers_total Total subscriptions opened
# TYPE web_relay_subscribers_total counter
web_relay_subscribers_total {subscribers}

# HELP web_relay_subscriptions_active Live subscriptions
# TYPE web_relay_subscriptions_active gauge
web_relay_subscriptions_active {subscriptions}

# HELP web_relay_records Stored records
# TYPE web_relay_records gauge
web_relay_records {records}

# HELP web_relay_authors Distinct authors with stored records
# TYPE web_relay_authors gauge
web_relay_authors {authors}

# HELP web_relay_blobs Stored blobs
# TYPE web_relay_blobs gauge
web_relay_blobs {blobs}

# HELP web_relay_blob_bytes Bytes of stored blob content
# TYPE web_relay_blob_bytes gauge
web_relay_blob_bytes {blob_bytes}
"#,
        version = env!("CARGO_PKG_VERSION"),
        subscriptions = stats.subscriptions,
        records = stats.records,
        authors = stats.authors,
        blobs = stats.blobs,
        blob_bytes = stats.blob_bytes,
    );

    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
