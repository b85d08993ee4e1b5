//! Signed, encrypted envelopes.
//!
//! Wire shape:
//!
//! ```text
//! Envelope (outer JSON, what the relay forwards)
//! ┌──────────────┬──────────────────────────────────────────────┐
//! │ algo         │ "sign-ed25519"                               │
//! │ data         │ base64(inner JSON bytes)                     │
//! │ publicKey    │ base64(sender Ed25519 public key, 32 bytes)  │
//! │ signature    │ base64(Ed25519(SHA-256(inner JSON bytes)))   │
//! └──────────────┴──────────────────────────────────────────────┘
//!
//! Inner JSON (signed bytes)
//! ┌──────────────┬──────────────────────────────────────────────┐
//! │ algo         │ "AES-GCM"                                    │
//! │ ciphertext   │ base64(AES-256-GCM(payload JSON) || tag)     │
//! │ iv           │ base64(12 bytes)                             │
//! └──────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! The signature covers the exact bytes carried in `data`. Receivers verify
//! over the decoded bytes as received and never re-serialize the inner
//! object before checking it.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chatspace_crypto::{ChannelKey, Fingerprint, IV_SIZE, Identity, decrypt, encrypt, verify_digest};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::errors::{EnvelopeError, Result};

/// Outer algorithm identifier.
pub const SIGNATURE_ALGORITHM: &str = "sign-ed25519";

/// Inner algorithm identifier.
pub const CIPHER_ALGORITHM: &str = "AES-GCM";

/// Signed wire unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Always [`SIGNATURE_ALGORITHM`] for envelopes this crate accepts.
    pub algo: String,
    /// Base64 of the inner encrypted JSON object.
    pub data: String,
    /// Base64 of the sender's Ed25519 public key.
    pub public_key: String,
    /// Base64 of the Ed25519 signature over SHA-256 of the decoded `data`.
    pub signature: String,
}

#[derive(Serialize, Deserialize)]
struct EncryptedPayload {
    algo: String,
    ciphertext: String,
    iv: String,
}

/// Payload recovered from an envelope together with its verified sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opened<T> {
    /// Decrypted, decoded payload.
    pub payload: T,
    /// Fingerprint of the public key that signed the envelope.
    pub sender: Fingerprint,
}

impl Envelope {
    /// Encrypt `payload` under `key` and sign it with `identity`.
    ///
    /// `iv` must be fresh random bytes for every call.
    ///
    /// # Errors
    ///
    /// - `Encoding`: the payload does not serialize to JSON
    pub fn seal<T: Serialize>(
        payload: &T,
        key: &ChannelKey,
        identity: &Identity,
        iv: [u8; IV_SIZE],
    ) -> Result<Self> {
        let plaintext = serde_json::to_vec(payload)
            .map_err(|e| EnvelopeError::Encoding { reason: e.to_string() })?;

        let inner = EncryptedPayload {
            algo: CIPHER_ALGORITHM.to_string(),
            ciphertext: BASE64.encode(encrypt(key, iv, &plaintext)),
            iv: BASE64.encode(iv),
        };
        let data = serde_json::to_vec(&inner)
            .map_err(|e| EnvelopeError::Encoding { reason: e.to_string() })?;

        let signature = identity.sign_digest(&data);

        Ok(Self {
            algo: SIGNATURE_ALGORITHM.to_string(),
            data: BASE64.encode(&data),
            public_key: BASE64.encode(identity.public_key()),
            signature: BASE64.encode(signature),
        })
    }

    /// Verify, decrypt and decode the envelope.
    ///
    /// Checks run outermost first: algorithm, signature, inner algorithm,
    /// decryption, then payload shape.
    ///
    /// # Errors
    ///
    /// - `UnknownAlgorithm`: outer or inner `algo` mismatch
    /// - `InvalidSignature`: undecodable or unverifiable signature material
    /// - `MalformedEnvelope`: signed bytes are not the inner object shape
    /// - `DecryptionFailed`: sealed under a different key, or tampered
    /// - `MalformedPayload`: plaintext does not decode as `T`
    pub fn open<T: DeserializeOwned>(&self, key: &ChannelKey) -> Result<Opened<T>> {
        if self.algo != SIGNATURE_ALGORITHM {
            return Err(EnvelopeError::UnknownAlgorithm { found: self.algo.clone() });
        }

        let data = BASE64.decode(&self.data).map_err(|_| EnvelopeError::InvalidSignature)?;
        let public_key =
            BASE64.decode(&self.public_key).map_err(|_| EnvelopeError::InvalidSignature)?;
        let signature =
            BASE64.decode(&self.signature).map_err(|_| EnvelopeError::InvalidSignature)?;

        let sender = verify_digest(&public_key, &data, &signature)
            .map_err(|_| EnvelopeError::InvalidSignature)?;

        let inner: EncryptedPayload = from_object(&data, "inner object")?;
        if inner.algo != CIPHER_ALGORITHM {
            return Err(EnvelopeError::UnknownAlgorithm { found: inner.algo });
        }

        let ciphertext = BASE64.decode(&inner.ciphertext).map_err(|e| {
            EnvelopeError::MalformedEnvelope { reason: format!("ciphertext: {e}") }
        })?;
        let iv = BASE64
            .decode(&inner.iv)
            .map_err(|e| EnvelopeError::MalformedEnvelope { reason: format!("iv: {e}") })?;

        let plaintext =
            decrypt(key, &iv, &ciphertext).map_err(|_| EnvelopeError::DecryptionFailed)?;

        let payload = serde_json::from_slice(&plaintext)
            .map_err(|e| EnvelopeError::MalformedPayload { reason: e.to_string() })?;

        Ok(Opened { payload, sender })
    }

    /// Serialize for a WebSocket text frame.
    ///
    /// # Errors
    ///
    /// - `Encoding`: serialization failed
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| EnvelopeError::Encoding { reason: e.to_string() })
    }

    /// Parse a WebSocket text frame.
    ///
    /// # Errors
    ///
    /// - `MalformedEnvelope`: not a JSON object, or missing envelope fields
    pub fn from_json(frame: &str) -> Result<Self> {
        from_object(frame.as_bytes(), "envelope")
    }
}

/// Decode a struct that must be written as a JSON object.
///
/// Derived `Deserialize` also accepts the positional array form, which the
/// wire format does not allow.
fn from_object<T: DeserializeOwned>(bytes: &[u8], what: &str) -> Result<T> {
    let malformed = |e: serde_json::Error| EnvelopeError::MalformedEnvelope {
        reason: format!("{what}: {e}"),
    };
    let object: Map<String, Value> = serde_json::from_slice(bytes).map_err(malformed)?;
    serde_json::from_value(Value::Object(object)).map_err(malformed)
}
