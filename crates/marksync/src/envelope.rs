//! Encryption envelope for the remote document body.
//!
//! A remote document is either a raw [`SyncSnapshot`] JSON or an
//! [`EncryptedEnvelope`] wrapping its serialization. The two are
//! distinguished structurally, by the presence of the envelope's marker and
//! algorithm fields, never by side-channel metadata.
//!
//! The envelope is AES-256-GCM over a key derived from the configured
//! password with PBKDF2-HMAC-SHA256. Salt and nonce are drawn fresh from the
//! OS RNG on every [`encode`] call and carried base64-encoded inside the
//! envelope. The format carries a version tag so a future algorithm change
//! stays decodable.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{Error, Result};
use crate::tree::SyncSnapshot;

/// Current envelope format version.
pub const ENVELOPE_FORMAT_VERSION: u32 = 1;

/// Cipher recorded in the envelope's algorithm field.
pub const ENVELOPE_ALGORITHM: &str = "AES-GCM";

/// PBKDF2-HMAC-SHA256 iteration count.
const KDF_ITERATIONS: u32 = 100_000;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// The versioned wrapper distinguishing an encrypted document from a plain one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedEnvelope {
    /// Structural marker, always `true`.
    pub marker: bool,
    /// Envelope format version.
    pub format_version: u32,
    /// Cipher identifier.
    pub algorithm: String,
    /// Nonce, base64.
    pub iv: String,
    /// KDF salt, base64.
    pub salt: String,
    /// Ciphertext, base64.
    pub ciphertext: String,
}

/// Whether a raw document body is an encrypted envelope.
#[must_use]
pub fn is_envelope(raw: &str) -> bool {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => {
            value.get("marker").is_some()
                && value.get("algorithm").is_some()
                && value.get("ciphertext").is_some()
        }
        Err(_) => false,
    }
}

/// Serialize a snapshot for the remote document.
///
/// With a password, the snapshot JSON is wrapped in an [`EncryptedEnvelope`]
/// under a key derived from the password with a fresh random salt; the nonce
/// is also fresh per call. Without a password the snapshot JSON is returned
/// as-is.
pub fn encode(snapshot: &SyncSnapshot, password: Option<&str>) -> Result<String> {
    let plain = serde_json::to_string(snapshot)
        .map_err(|e| Error::serialization(format!("snapshot encode failed: {e}")))?;

    let Some(password) = password else {
        return Ok(plain);
    };

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let mut iv = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut iv);

    let key = derive_key(password, &salt);
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| Error::encryption(format!("invalid key length: {e}")))?;
    let nonce = Nonce::from_slice(&iv);
    let ciphertext = cipher
        .encrypt(nonce, plain.as_bytes())
        .map_err(|e| Error::encryption(format!("encrypt failed: {e}")))?;

    let envelope = EncryptedEnvelope {
        marker: true,
        format_version: ENVELOPE_FORMAT_VERSION,
        algorithm: ENVELOPE_ALGORITHM.to_string(),
        iv: BASE64.encode(iv),
        salt: BASE64.encode(salt),
        ciphertext: BASE64.encode(ciphertext),
    };

    serde_json::to_string(&envelope)
        .map_err(|e| Error::serialization(format!("envelope encode failed: {e}")))
}

/// Parse a remote document body into a snapshot.
///
/// Errors with [`Error::PasswordMissing`] when the body is an envelope but no
/// password is configured, and with [`Error::WrongPassword`] when
/// authenticated decryption fails. A plain body is parsed directly whether or
/// not a password is configured.
pub fn decode(raw: &str, password: Option<&str>) -> Result<SyncSnapshot> {
    if !is_envelope(raw) {
        return serde_json::from_str(raw)
            .map_err(|e| Error::serialization(format!("snapshot decode failed: {e}")));
    }

    let envelope: EncryptedEnvelope = serde_json::from_str(raw)
        .map_err(|e| Error::encryption(format!("malformed envelope: {e}")))?;

    if envelope.format_version > ENVELOPE_FORMAT_VERSION {
        return Err(Error::encryption(format!(
            "unsupported envelope version {}",
            envelope.format_version
        )));
    }
    if envelope.algorithm != ENVELOPE_ALGORITHM {
        return Err(Error::encryption(format!(
            "unsupported algorithm {}",
            envelope.algorithm
        )));
    }

    let password = password.ok_or(Error::PasswordMissing)?;

    let iv = BASE64
        .decode(&envelope.iv)
        .map_err(|e| Error::encryption(format!("invalid iv: {e}")))?;
    let salt = BASE64
        .decode(&envelope.salt)
        .map_err(|e| Error::encryption(format!("invalid salt: {e}")))?;
    let ciphertext = BASE64
        .decode(&envelope.ciphertext)
        .map_err(|e| Error::encryption(format!("invalid ciphertext: {e}")))?;

    if iv.len() != NONCE_LEN {
        return Err(Error::encryption(format!("invalid iv length {}", iv.len())));
    }

    let key = derive_key(password, &salt);
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| Error::encryption(format!("invalid key length: {e}")))?;
    let nonce = Nonce::from_slice(&iv);

    // AEAD verification failure means the key is wrong (or the body was
    // tampered with); either way the configured password cannot open it.
    let plain = cipher
        .decrypt(nonce, ciphertext.as_ref())
        .map_err(|_| Error::WrongPassword)?;

    serde_json::from_slice(&plain)
        .map_err(|e| Error::serialization(format!("decrypted snapshot decode failed: {e}")))
}

fn derive_key(password: &str, salt: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, KDF_ITERATIONS, &mut key);
    key
}
