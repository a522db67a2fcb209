//! Shared-secret authentication primitives.
//!
//! The passphrase is stretched once with PBKDF2-HMAC-SHA1 into an
//! [`AuthKey`]. A privileged request is authorised by
//! `HMAC-SHA256(key, nonce || raw_request_line)`.

use std::fmt;

use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha1::Sha1;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Bytes of entropy in a handshake nonce.
pub const NONCE_BYTES: usize = 32;
/// Length of the derived key.
pub const KEY_BYTES: usize = 32;
/// Default PBKDF2 round count.
pub const DEFAULT_KDF_ITERATIONS: u32 = 1000;
/// Default deployment salt.
pub const DEFAULT_SALT: [u8; 32] = [
    0xc9, 0xb5, 0x04, 0xe7, 0x8b, 0x45, 0x70, 0x03, 0x36, 0x50, 0x13, 0x7e, 0x56, 0xda, 0xab, 0x10,
    0x4a, 0x8b, 0x84, 0xc4, 0x45, 0xd4, 0xc0, 0xcb, 0x7b, 0xfb, 0xb1, 0xaa, 0x10, 0xc2, 0x5d, 0x72,
];

/// Errors raised by the authentication primitives.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("key derivation needs at least one iteration")]
    NoIterations,
    #[error("invalid key length")]
    KeyLength,
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Password-derived signing key. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthKey([u8; KEY_BYTES]);

impl AuthKey {
    /// Derives the key from a passphrase.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NoIterations`] when `iterations` is zero.
    pub fn derive(passphrase: &str, salt: &[u8], iterations: u32) -> Result<Self, AuthError> {
        if iterations == 0 {
            return Err(AuthError::NoIterations);
        }
        let mut key = [0_u8; KEY_BYTES];
        pbkdf2::pbkdf2_hmac::<Sha1>(passphrase.as_bytes(), salt, iterations, &mut key);
        Ok(Self(key))
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; KEY_BYTES]) -> Self {
        Self(bytes)
    }

    fn mac(&self, nonce: &[u8], line: &[u8]) -> Result<HmacSha256, AuthError> {
        let mut mac = HmacSha256::new_from_slice(&self.0).map_err(|_| AuthError::KeyLength)?;
        mac.update(nonce);
        mac.update(line);
        Ok(mac)
    }

    /// Signs `nonce || line`.
    ///
    /// # Errors
    ///
    /// Fails only if the HMAC rejects the key length.
    pub fn sign(&self, nonce: &[u8], line: &[u8]) -> Result<Vec<u8>, AuthError> {
        Ok(self.mac(nonce, line)?.finalize().into_bytes().to_vec())
    }

    /// Signs `nonce || line` and hex-encodes the result.
    ///
    /// # Errors
    ///
    /// See [`AuthKey::sign`].
    pub fn sign_hex(&self, nonce: &[u8], line: &[u8]) -> Result<String, AuthError> {
        self.sign(nonce, line).map(hex::encode)
    }

    /// Checks `signature` against `nonce || line` in constant time.
    #[must_use]
    pub fn verify(&self, nonce: &[u8], line: &[u8], signature: &[u8]) -> bool {
        self.mac(nonce, line)
            .is_ok_and(|mac| mac.verify_slice(signature).is_ok())
    }
}

impl fmt::Debug for AuthKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("AuthKey(<redacted>)")
    }
}

/// Returns a fresh random nonce from the operating system.
#[must_use]
pub fn generate_nonce() -> [u8; NONCE_BYTES] {
    let mut nonce = [0_u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Decodes a hex string such as a nonce or signature.
///
/// # Errors
///
/// Returns [`AuthError::Hex`] for malformed input.
pub fn decode_hex(text: &str) -> Result<Vec<u8>, AuthError> {
    Ok(hex::decode(text)?)
}
