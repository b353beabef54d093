//! Signed timestamp token codec
//!
//! Mints and verifies tamper-evident, time-limited opaque tokens without
//! server-side session storage, in the style of Python's itsdangerous:
//! `message.timestamp.signature` with URL-safe unpadded base64 and an
//! HMAC-SHA256 signature covering both message and timestamp. Used by the
//! delegated-auth layer to remember authenticated visitors in a cookie.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Fixed epoch offset (2011-01-01T00:00:00Z) keeping encoded timestamps
/// short. Must match between signer and verifier.
pub const EPOCH: u64 = 1_293_840_000;

const SEP: char = '.';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignerError {
    /// Signature mismatch or structurally broken token
    #[error("invalid token")]
    Invalid,

    /// Signature valid but the embedded timestamp is too old
    #[error("token expired")]
    Expired,
}

/// Signs and verifies opaque messages with HMAC-SHA256
pub struct Signer {
    key: Vec<u8>,
}

impl Signer {
    pub fn new(key: &[u8]) -> Self {
        Self { key: key.to_vec() }
    }

    fn mac(&self, message: &str) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(message.as_bytes());
        mac
    }

    /// `message + "." + base64(HMAC(message))`
    pub fn sign(&self, message: &str) -> String {
        let signature = self.mac(message).finalize().into_bytes();
        format!("{message}{SEP}{}", URL_SAFE_NO_PAD.encode(signature))
    }

    /// Recover the message if the signature checks out
    pub fn verify(&self, token: &str) -> Result<String, SignerError> {
        let (message, signature) = split_right(token).ok_or(SignerError::Invalid)?;
        let decoded = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| SignerError::Invalid)?;
        // verify_slice is a constant-time comparison
        self.mac(message)
            .verify_slice(&decoded)
            .map_err(|_| SignerError::Invalid)?;
        Ok(message.to_string())
    }
}

/// A [`Signer`] that embeds a signed timestamp so tokens can expire
pub struct TimestampSigner {
    signer: Signer,
}

impl TimestampSigner {
    pub fn new(key: &[u8]) -> Self {
        Self {
            signer: Signer::new(key),
        }
    }

    /// Sign with the current time
    pub fn sign(&self, message: &str) -> String {
        self.sign_with_time(message, now_unix())
    }

    /// Sign with an explicit unix timestamp. The timestamp is encoded
    /// compactly relative to [`EPOCH`] and covered by the signature.
    pub fn sign_with_time(&self, message: &str, now: u64) -> String {
        let ts = URL_SAFE_NO_PAD.encode(int_to_bytes(now.saturating_sub(EPOCH)));
        self.signer.sign(&format!("{message}{SEP}{ts}"))
    }

    /// Verify against the current time
    pub fn verify(&self, token: &str, max_age: Duration) -> Result<String, SignerError> {
        self.verify_with_time(token, now_unix(), max_age)
    }

    /// Recover the message if the signature checks out and the embedded
    /// timestamp is no older than `max_age` relative to `now`
    pub fn verify_with_time(
        &self,
        token: &str,
        now: u64,
        max_age: Duration,
    ) -> Result<String, SignerError> {
        let inner = self.signer.verify(token)?;
        let (message, ts) = split_right(&inner).ok_or(SignerError::Invalid)?;
        let decoded = URL_SAFE_NO_PAD.decode(ts).map_err(|_| SignerError::Invalid)?;
        let issued_at = bytes_to_int(&decoded) + EPOCH;

        if now.saturating_sub(issued_at) > max_age.as_secs() {
            return Err(SignerError::Expired);
        }
        Ok(message.to_string())
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn split_right(value: &str) -> Option<(&str, &str)> {
    value.rfind(SEP).map(|idx| (&value[..idx], &value[idx + 1..]))
}

/// Big-endian encoding with leading zero bytes stripped
fn int_to_bytes(mut value: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(8);
    while value > 0 {
        bytes.push((value & 0xff) as u8);
        value >>= 8;
    }
    bytes.reverse();
    bytes
}

fn bytes_to_int(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}
