//! Local key layout.
//!
//! The client keeps everything in one ordered key-value space, split into
//! three ranges so a single batch can update all of them atomically:
//!
//! ```text
//! records!<fullPath>          latest verified record per entry
//! blobs!<hex digest>          content by digest
//! pending-records!<fullPath>  local writes not yet acknowledged by the relay
//! ```

/// Prefix of the active record range.
pub const RECORDS_PREFIX: &str = "records!";

/// Prefix of the blob range.
pub const BLOBS_PREFIX: &str = "blobs!";

/// Prefix of the pending-write range.
pub const PENDING_PREFIX: &str = "pending-records!";

/// Key of the active record for `full_path`.
pub fn record_key(full_path: &str) -> Vec<u8> {
    prefixed(RECORDS_PREFIX, full_path.as_bytes())
}

/// Key of the blob with digest `hash`.
pub fn blob_key(hash: &[u8; 32]) -> Vec<u8> {
    prefixed(BLOBS_PREFIX, hex::encode(hash).as_bytes())
}

/// Key of the pending-write marker for `full_path`.
pub fn pending_key(full_path: &str) -> Vec<u8> {
    prefixed(PENDING_PREFIX, full_path.as_bytes())
}

/// Half-open key range `[start, end)` covering every pending-write marker.
pub fn pending_range() -> (Vec<u8>, Vec<u8>) {
    prefix_range(PENDING_PREFIX)
}

/// Recover the full path from a pending-write key.
pub fn path_from_pending_key(key: &[u8]) -> Option<&str> {
    let rest = key.strip_prefix(PENDING_PREFIX.as_bytes())?;
    std::str::from_utf8(rest).ok()
}

/// Half-open key range `[start, end)` covering every key starting with `prefix`.
pub fn prefix_range(prefix: &str) -> (Vec<u8>, Vec<u8>) {
    let start = prefix.as_bytes().to_vec();
    let mut end = start.clone();
    // Prefixes end in '!', so the increment never overflows.
    if let Some(last) = end.last_mut() {
        *last += 1;
    }
    (start, end)
}

fn prefixed(prefix: &str, rest: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + rest.len());
    key.extend_from_slice(prefix.as_bytes());
    key.extend_from_slice(rest);
    key
}
