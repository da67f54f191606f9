//! Author identity and path helpers.

use ed25519_dalek::{SigningKey, VerifyingKey};
use std::fmt;
use std::str::FromStr;

use crate::error::RecordError;

/// Size of an author's public key in bytes.
pub const AUTHOR_ID_SIZE: usize = 32;

/// The public identity of an author.
///
/// 32 bytes of Ed25519 public key, displayed as z-base-32. The textual form
/// is the first segment of every path the author writes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AuthorId([u8; AUTHOR_ID_SIZE]);

impl AuthorId {
    /// Create an AuthorId from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; AUTHOR_ID_SIZE] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Derive the AuthorId that belongs to a signing key.
    pub fn from_signing_key(key: &SigningKey) -> Self {
        Self(key.verifying_key().to_bytes())
    }

    /// Decode a z-base-32 author id.
    ///
    /// Only the length is checked here; a string that decodes to 32 bytes
    /// which are not a valid curve point fails later, at verification.
    pub fn from_z32(s: &str) -> Result<Self, RecordError> {
        let bytes =
            z32::decode(s.as_bytes()).map_err(|_| RecordError::InvalidAuthorId(s.to_string()))?;
        Self::from_bytes(&bytes).ok_or_else(|| RecordError::InvalidAuthorId(s.to_string()))
    }

    /// Get the raw bytes of this AuthorId.
    pub fn as_bytes(&self) -> &[u8; AUTHOR_ID_SIZE] {
        &self.0
    }

    /// Interpret the id as an Ed25519 verifying key.
    pub fn verifying_key(&self) -> Option<VerifyingKey> {
        VerifyingKey::from_bytes(&self.0).ok()
    }
}

impl fmt::Display for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", z32::encode(&self.0))
    }
}

impl fmt::Debug for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthorId({})", &self.to_string()[..8])
    }
}

impl FromStr for AuthorId {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_z32(s)
    }
}

/// Generate a new random signing key.
pub fn generate_signing_key() -> SigningKey {
    SigningKey::generate(&mut rand::rngs::OsRng)
}

/// Build a signing key from a fixed 32-byte seed.
pub fn signing_key_from_seed(seed: &[u8; 32]) -> SigningKey {
    SigningKey::from_bytes(seed)
}

/// Make a path absolute (`/` prefixed).
pub fn absolute_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Join an author and an author-relative path into `<authorID>/<path>`.
pub fn full_path(author: &AuthorId, path: &str) -> String {
    format!("{}{}", author, absolute_path(path))
}

/// Split `<authorID>/<path>` into its author and absolute path.
///
/// A full path with no path segment yields `/`.
pub fn split_full_path(full_path: &str) -> Result<(AuthorId, String), RecordError> {
    let (id, rest) = match full_path.find('/') {
        Some(idx) => (&full_path[..idx], &full_path[idx..]),
        None => (full_path, "/"),
    };
    Ok((AuthorId::from_z32(id)?, rest.to_string()))
}
