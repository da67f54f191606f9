//! Shareable URLs.
//!
//! A shareable reference names an author's entry and, optionally, where to
//! fetch it and how to decrypt it:
//!
//! ```text
//! slash:<authorID>/<path>?relay=<address>#encryptionKey=<z32 key>
//! ```
//!
//! The fragment never leaves the reader, so the key stays unknown to the
//! relay and to any intermediary. Paths are percent-encoded when formatted
//! and percent-decoded when parsed.

use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use relay_types::protocol::URL_SCHEME;
use relay_types::{absolute_path, AuthorId};
use thiserror::Error;

/// Characters escaped in the path component.
const PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Size of a path encryption key in bytes.
pub const ENCRYPTION_KEY_SIZE: usize = 32;

/// Errors from parsing shareable URLs and paths.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlError {
    /// URL does not start with `slash:`.
    #[error("missing 'slash:' scheme")]
    MissingScheme,

    /// Author segment is not a valid author id.
    #[error("invalid author id: {0}")]
    InvalidAuthorId(String),

    /// Path is empty, not UTF-8 after decoding, or contains `?`/`#`.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// `encryptionKey` fragment is not a z-base-32 encoded 32-byte key.
    #[error("invalid encryption key")]
    InvalidEncryptionKey,
}

/// A parsed shareable URL.
#[derive(Clone, PartialEq, Eq)]
pub struct SlashUrl {
    /// Author owning the entry.
    pub author: AuthorId,
    /// Absolute, decoded, author-relative path.
    pub path: String,
    /// Relay to fetch from, as given in the `relay` query parameter.
    pub relay: Option<String>,
    /// Decryption key from the fragment.
    pub encryption_key: Option<[u8; ENCRYPTION_KEY_SIZE]>,
}

impl SlashUrl {
    /// Create a URL for `path` under `author` with no relay or key.
    pub fn new(author: AuthorId, path: &str) -> Self {
        Self {
            author,
            path: absolute_path(path),
            relay: None,
            encryption_key: None,
        }
    }

    /// Set the relay address.
    pub fn with_relay(mut self, relay: Option<&str>) -> Self {
        self.relay = relay.map(str::to_string);
        self
    }

    /// Set the decryption key.
    pub fn with_encryption_key(mut self, key: Option<[u8; ENCRYPTION_KEY_SIZE]>) -> Self {
        self.encryption_key = key;
        self
    }

    /// Whether `s` looks like a shareable URL rather than a local path.
    pub fn is_url(s: &str) -> bool {
        s.starts_with(URL_SCHEME)
    }

    /// Parse a `slash:` URL.
    pub fn parse(url: &str) -> Result<Self, UrlError> {
        let rest = url.strip_prefix(URL_SCHEME).ok_or(UrlError::MissingScheme)?;

        let (rest, fragment) = match rest.split_once('#') {
            Some((rest, fragment)) => (rest, Some(fragment)),
            None => (rest, None),
        };
        let (rest, query) = match rest.split_once('?') {
            Some((rest, query)) => (rest, Some(query)),
            None => (rest, None),
        };
        let (id, raw_path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };

        let author =
            AuthorId::from_z32(id).map_err(|_| UrlError::InvalidAuthorId(id.to_string()))?;
        let path = percent_decode_str(raw_path)
            .decode_utf8()
            .map_err(|_| UrlError::InvalidPath(raw_path.to_string()))?
            .into_owned();

        let relay = query
            .and_then(|q| param(q, "relay"))
            .filter(|relay| !relay.is_empty());

        let encryption_key = match fragment.and_then(|f| param(f, "encryptionKey")) {
            Some(encoded) => Some(decode_key(&encoded)?),
            None => None,
        };

        Ok(Self {
            author,
            path,
            relay,
            encryption_key,
        })
    }

    /// The `<authorID>/<path>` this URL refers to.
    pub fn full_path(&self) -> String {
        relay_types::full_path(&self.author, &self.path)
    }
}

impl fmt::Display for SlashUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            URL_SCHEME,
            self.author,
            utf8_percent_encode(&self.path, PATH)
        )?;
        if let Some(relay) = &self.relay {
            write!(f, "?relay={relay}")?;
        }
        if let Some(key) = &self.encryption_key {
            write!(f, "#encryptionKey={}", z32::encode(key))?;
        }
        Ok(())
    }
}

impl fmt::Debug for SlashUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlashUrl")
            .field("author", &self.author)
            .field("path", &self.path)
            .field("relay", &self.relay)
            .field(
                "encryption_key",
                &self.encryption_key.map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Reduce a relay address to its origin.
///
/// Strips the fragment, the query and a trailing slash.
pub fn relay_origin(address: &str) -> String {
    let address = address.split('#').next().unwrap_or_default();
    let address = address.split('?').next().unwrap_or_default();
    address.strip_suffix('/').unwrap_or(address).to_string()
}

/// Percent-encode a path for use in a URL.
pub fn encode_path(path: &str) -> String {
    utf8_percent_encode(path, PATH).to_string()
}

/// Reject paths that are empty or contain `?` or `#`.
pub fn validate_path(path: &str) -> Result<(), UrlError> {
    if path.is_empty() || path.contains(['?', '#']) {
        return Err(UrlError::InvalidPath(path.to_string()));
    }
    Ok(())
}

fn param(pairs: &str, name: &str) -> Option<String> {
    pairs
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| percent_decode_str(value).decode_utf8_lossy().into_owned())
}

fn decode_key(encoded: &str) -> Result<[u8; ENCRYPTION_KEY_SIZE], UrlError> {
    let bytes = z32::decode(encoded.as_bytes()).map_err(|_| UrlError::InvalidEncryptionKey)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| UrlError::InvalidEncryptionKey)
}
