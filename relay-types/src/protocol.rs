//! HTTP protocol constants shared by relay and client.

/// Header carrying the base64-encoded binary [`Record`](crate::Record).
pub const RECORD_HEADER: &str = "x-slashtags-web-relay-record";

/// Content type header name.
pub const CONTENT_TYPE_HEADER: &str = "content-type";

/// Comma-separated protocol header names, advertised in CORS allow/expose lists.
pub const HEADER_NAMES: &str = "content-type, x-slashtags-web-relay-record";

/// Content type of every blob body.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Methods advertised in CORS preflight responses.
pub const ALLOWED_METHODS: &str = "GET, PUT, OPTIONS";

/// Path prefix of the live-update endpoint.
pub const SUBSCRIBE_PREFIX: &str = "/subscribe/";

/// Scheme of shareable URLs.
pub const URL_SCHEME: &str = "slash:";
