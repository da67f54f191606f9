//! Signed record envelope.
//!
//! A [`Record`] binds a path to the BLAKE3 digest of its content, a writer
//! chosen timestamp and optional JSON metadata, signed by the path's author.
//!
//! ```text
//!  0        1            7            39             103
//!  |   1    |     6      |     32     |      64      |    N     |
//!  |version | timestamp  |    hash    |  signature   | metadata |
//! ```
//!
//! The timestamp is little-endian milliseconds since the epoch, 48 bits wide.
//! The signature covers `fullPath ∥ hash ∥ timestamp ∥ metadata`.

use std::fmt;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{Signature, Signer, SigningKey};
use serde_json::Value;

use crate::error::RecordError;
use crate::ids::split_full_path;

/// Current envelope version.
pub const RECORD_VERSION: u8 = 0;

/// Size of the BLAKE3 content hash in bytes.
pub const HASH_SIZE: usize = 32;

/// Size of the Ed25519 signature in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// Width of the encoded timestamp in bytes.
pub const TIMESTAMP_SIZE: usize = 6;

/// Largest timestamp representable in 48 bits.
pub const MAX_TIMESTAMP: u64 = (1 << 48) - 1;

const TIMESTAMP_OFFSET: usize = 1;
const HASH_OFFSET: usize = TIMESTAMP_OFFSET + TIMESTAMP_SIZE;
const SIGNATURE_OFFSET: usize = HASH_OFFSET + HASH_SIZE;

/// Size of the fixed-width part of an encoded record.
pub const HEADER_SIZE: usize = SIGNATURE_OFFSET + SIGNATURE_SIZE;

/// Optional inputs for [`Record::create`].
#[derive(Debug, Clone, Default)]
pub struct RecordOptions {
    /// Milliseconds since the epoch; defaults to now.
    pub timestamp: Option<u64>,
    /// JSON metadata; `None` encodes as zero bytes.
    pub metadata: Option<Value>,
}

/// A signed, timestamped envelope binding a path to a content digest.
///
/// Records are immutable. The encoded bytes are kept alongside the decoded
/// fields so the signature is always checked against what was actually sent,
/// and the base64 form is computed at most once.
#[derive(Clone)]
pub struct Record {
    timestamp: u64,
    hash: [u8; HASH_SIZE],
    signature: [u8; SIGNATURE_SIZE],
    metadata: Option<Value>,
    encoded: Vec<u8>,
    base64: OnceLock<String>,
}

impl Record {
    /// Create and sign a record for `content` at `full_path`.
    ///
    /// `full_path` is `<authorID>/<path>`; the caller is responsible for it
    /// naming the author of `signing_key`, otherwise the record will not verify.
    pub fn create(
        signing_key: &SigningKey,
        full_path: &str,
        content: &[u8],
        opts: RecordOptions,
    ) -> Result<Self, RecordError> {
        let hash = *blake3::hash(content).as_bytes();
        Self::create_with_hash(signing_key, full_path, hash, opts)
    }

    /// Create and sign a record for content whose digest is already known.
    pub fn create_with_hash(
        signing_key: &SigningKey,
        full_path: &str,
        hash: [u8; HASH_SIZE],
        opts: RecordOptions,
    ) -> Result<Self, RecordError> {
        let timestamp = opts.timestamp.unwrap_or_else(now_millis);
        if timestamp > MAX_TIMESTAMP {
            return Err(RecordError::TimestampOverflow(timestamp));
        }

        let metadata_bytes = encode_metadata(opts.metadata.as_ref());
        let signable = signable(full_path, &hash, timestamp, &metadata_bytes);
        let signature = signing_key.sign(&signable).to_bytes();

        let mut encoded = Vec::with_capacity(HEADER_SIZE + metadata_bytes.len());
        encoded.push(RECORD_VERSION);
        encoded.extend_from_slice(&encode_timestamp(timestamp));
        encoded.extend_from_slice(&hash);
        encoded.extend_from_slice(&signature);
        encoded.extend_from_slice(&metadata_bytes);

        Ok(Self {
            timestamp,
            hash,
            signature,
            metadata: opts.metadata,
            encoded,
            base64: OnceLock::new(),
        })
    }

    /// Decode a record from its binary form.
    ///
    /// Malformed metadata decodes to `None` rather than failing; a corrupt
    /// signature is only detected by [`Record::verify`].
    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() < HEADER_SIZE {
            return Err(RecordError::Truncated { len: bytes.len() });
        }
        if bytes[0] != RECORD_VERSION {
            return Err(RecordError::UnsupportedVersion(bytes[0]));
        }

        let mut hash = [0u8; HASH_SIZE];
        hash.copy_from_slice(&bytes[HASH_OFFSET..SIGNATURE_OFFSET]);
        let mut signature = [0u8; SIGNATURE_SIZE];
        signature.copy_from_slice(&bytes[SIGNATURE_OFFSET..HEADER_SIZE]);

        Ok(Self {
            timestamp: decode_timestamp(&bytes[TIMESTAMP_OFFSET..HASH_OFFSET]),
            hash,
            signature,
            metadata: serde_json::from_slice(&bytes[HEADER_SIZE..]).ok(),
            encoded: bytes.to_vec(),
            base64: OnceLock::new(),
        })
    }

    /// Decode a record from the base64 form carried in HTTP headers.
    pub fn from_base64(s: &str) -> Result<Self, RecordError> {
        let bytes = STANDARD
            .decode(s.trim())
            .map_err(|_| RecordError::InvalidBase64)?;
        Self::decode(&bytes)
    }

    /// Check the signature against `full_path`.
    ///
    /// The public key is recovered from the first segment of `full_path`.
    pub fn verify(&self, full_path: &str) -> bool {
        let Ok((author, _)) = split_full_path(full_path) else {
            return false;
        };
        let Some(key) = author.verifying_key() else {
            return false;
        };

        let signable = signable(full_path, &self.hash, self.timestamp, self.metadata_bytes());
        key.verify_strict(&signable, &Signature::from_bytes(&self.signature))
            .is_ok()
    }

    /// Milliseconds since the epoch, as chosen by the writer.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// BLAKE3 digest of the content blob.
    pub fn hash(&self) -> &[u8; HASH_SIZE] {
        &self.hash
    }

    /// Hex form of the content hash, used as the blob key.
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    /// Ed25519 signature bytes.
    pub fn signature(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.signature
    }

    /// Decoded metadata, if any was present and well-formed.
    pub fn metadata(&self) -> Option<&Value> {
        self.metadata.as_ref()
    }

    /// Whether the writer flagged the content as encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("encrypted"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// The exact encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.encoded
    }

    /// The encoded bytes as standard base64.
    pub fn to_base64(&self) -> &str {
        self.base64.get_or_init(|| STANDARD.encode(&self.encoded))
    }

    fn metadata_bytes(&self) -> &[u8] {
        &self.encoded[HEADER_SIZE..]
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.encoded == other.encoded
    }
}

impl Eq for Record {}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("timestamp", &self.timestamp)
            .field("hash", &self.hash_hex())
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Current time in milliseconds since the epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn signable(full_path: &str, hash: &[u8; HASH_SIZE], timestamp: u64, metadata: &[u8]) -> Vec<u8> {
    let mut buf =
        Vec::with_capacity(full_path.len() + HASH_SIZE + TIMESTAMP_SIZE + metadata.len());
    buf.extend_from_slice(full_path.as_bytes());
    buf.extend_from_slice(hash);
    buf.extend_from_slice(&encode_timestamp(timestamp));
    buf.extend_from_slice(metadata);
    buf
}

fn encode_metadata(metadata: Option<&Value>) -> Vec<u8> {
    match metadata {
        Some(value) => serde_json::to_vec(value).unwrap_or_default(),
        None => Vec::new(),
    }
}

fn encode_timestamp(timestamp: u64) -> [u8; TIMESTAMP_SIZE] {
    let mut out = [0u8; TIMESTAMP_SIZE];
    out.copy_from_slice(&timestamp.to_le_bytes()[..TIMESTAMP_SIZE]);
    out
}

fn decode_timestamp(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[..TIMESTAMP_SIZE].copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}
