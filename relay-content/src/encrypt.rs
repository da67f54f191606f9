//! Path encryption.
//!
//! Every `(author, path)` pair gets its own symmetric key, derived on demand
//! so nothing per-path has to be stored:
//!
//! ```text
//! key = SHA-256("slashtags-web-relay" || author keypair bytes || path)
//! ```
//!
//! Blobs are sealed with XChaCha20-Poly1305 under a random 192-bit nonce and
//! laid out as `nonce (24) || tag (16) || ciphertext`. Empty content is
//! never encrypted, so a deletion stays recognisable as empty.

use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{Key, Tag, XChaCha20Poly1305, XNonce};
use sha2::{Digest, Sha256};

use crate::error::ContentError;

/// Domain separator mixed into every derived key.
pub const KEY_NAMESPACE: &[u8] = b"slashtags-web-relay";

/// Size of a path encryption key in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// Size of XChaCha20-Poly1305 nonce in bytes (192 bits).
pub const NONCE_SIZE: usize = 24;

/// Size of the Poly1305 authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Derive the encryption key for `path` from the author's secret.
///
/// `secret` is the author's 64-byte keypair (secret half followed by the
/// public half); `path` is the absolute author-relative path.
pub fn derive_key(secret: &[u8], path: &str) -> [u8; KEY_SIZE] {
    Sha256::new()
        .chain_update(KEY_NAMESPACE)
        .chain_update(secret)
        .chain_update(path.as_bytes())
        .finalize()
        .into()
}

/// Encrypt `content`, returning `nonce || tag || ciphertext`.
///
/// Empty input is returned unchanged.
pub fn encrypt(content: &[u8], key: &[u8; KEY_SIZE]) -> Result<Vec<u8>, ContentError> {
    if content.is_empty() {
        return Ok(Vec::new());
    }

    let mut nonce = [0u8; NONCE_SIZE];
    getrandom::getrandom(&mut nonce).map_err(|e| ContentError::EncryptionFailed(e.to_string()))?;

    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let mut buffer = content.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(XNonce::from_slice(&nonce), b"", &mut buffer)
        .map_err(|e| ContentError::EncryptionFailed(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + TAG_SIZE + buffer.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&tag);
    out.extend_from_slice(&buffer);
    Ok(out)
}

/// Decrypt `nonce || tag || ciphertext`.
///
/// Empty input is returned unchanged. Anything else that fails
/// authentication is an error; garbage is never returned.
pub fn decrypt(content: &[u8], key: &[u8; KEY_SIZE]) -> Result<Vec<u8>, ContentError> {
    if content.is_empty() {
        return Ok(Vec::new());
    }
    if content.len() < NONCE_SIZE + TAG_SIZE {
        return Err(ContentError::DecryptionFailed);
    }

    let (nonce, rest) = content.split_at(NONCE_SIZE);
    let (tag, ciphertext) = rest.split_at(TAG_SIZE);

    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            XNonce::from_slice(nonce),
            b"",
            &mut buffer,
            Tag::from_slice(tag),
        )
        .map_err(|_| ContentError::DecryptionFailed)?;
    Ok(buffer)
}
