//! Relay endpoints: GET, PUT, OPTIONS and SUBSCRIBE on record paths.

use crate::error::{ApiError, RelayError};
use crate::server::WebRelay;
use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use futures_util::{StreamExt, TryStreamExt};
use percent_encoding::percent_decode_str;
use relay_content::ByteStream;
use relay_types::protocol::{OCTET_STREAM, RECORD_HEADER, SUBSCRIBE_PREFIX};
use relay_types::{full_path, split_full_path};
use std::convert::Infallible;
use std::io;
use std::sync::Arc;

/// Where a request points.
#[derive(Debug, PartialEq, Eq)]
struct Target {
    subscribe: bool,
    full_path: String,
}

/// Fallback handler for every record path.
///
/// The author id is checked before anything else, for every method.
pub async fn relay_handler(
    Extension(relay): Extension<Arc<WebRelay>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    match dispatch(relay, method, uri, headers, body).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn dispatch(
    relay: Arc<WebRelay>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let target = parse_target(uri.path())?;
    let record_header = headers.get(RECORD_HEADER).and_then(|v| v.to_str().ok());

    match method {
        Method::OPTIONS => Ok(StatusCode::NO_CONTENT.into_response()),
        Method::GET if target.subscribe => {
            subscribe(&relay, &target.full_path, record_header).await
        }
        Method::GET => get(&relay, &target.full_path).await,
        Method::PUT if !target.subscribe => {
            put(&relay, &target.full_path, record_header, body).await
        }
        _ => Err(ApiError::MethodNotAllowed),
    }
}

fn parse_target(path: &str) -> Result<Target, ApiError> {
    let (subscribe, raw) = match path.strip_prefix(SUBSCRIBE_PREFIX) {
        Some(rest) => (true, rest),
        None => (false, path.strip_prefix('/').unwrap_or(path)),
    };

    let invalid = || ApiError::from(RelayError::InvalidUserId(raw.to_string()));
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| invalid())?;
    let (author, path) = split_full_path(&decoded).map_err(|_| invalid())?;

    Ok(Target {
        subscribe,
        full_path: full_path(&author, &path),
    })
}

async fn get(relay: &WebRelay, full_path: &str) -> Result<Response, ApiError> {
    let (record, body) = relay.get(full_path).await?;

    let mut response = Body::from_stream(body).into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(OCTET_STREAM));
    if let Ok(value) = HeaderValue::from_str(record.to_base64()) {
        headers.insert(RECORD_HEADER, value);
    }
    Ok(response)
}

async fn put(
    relay: &WebRelay,
    full_path: &str,
    record_header: Option<&str>,
    body: Body,
) -> Result<Response, ApiError> {
    let body: ByteStream = Box::pin(body.into_data_stream().map_err(io::Error::other));
    relay.put(full_path, record_header, body).await?;
    Ok((StatusCode::OK, "OK").into_response())
}

async fn subscribe(
    relay: &WebRelay,
    full_path: &str,
    last_known: Option<&str>,
) -> Result<Response, ApiError> {
    let records = relay.subscribe(full_path, last_known).await?;
    let events = records
        .map(|record| Ok::<_, Infallible>(Event::default().data(record.to_base64())));

    Ok(Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response())
}
