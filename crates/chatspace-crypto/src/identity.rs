//! Long-term Ed25519 identity and fingerprints.
//!
//! A client owns one [`Identity`] for its whole lifetime. Peers know it only
//! by its [`Fingerprint`], the SHA-256 digest of the public key, which every
//! envelope binds to its content through the signature.
//!
//! Signatures are computed over the SHA-256 digest of the message rather than
//! over the message itself; both sides of the wire must agree on that.

use std::{fmt, str::FromStr};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Size of an Ed25519 private key seed.
pub const PRIVATE_KEY_SIZE: usize = 32;

/// Size of an Ed25519 public key.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of an Ed25519 signature.
pub const SIGNATURE_SIZE: usize = 64;

/// `algo` tag of an exported private key object.
pub const PRIVATE_KEY_ALGORITHM: &str = "ed25519-private-key";

/// SHA-256 digest of an Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint of the given public key bytes.
    pub fn of(public_key: &[u8]) -> Self {
        Self(Sha256::digest(public_key).into())
    }

    /// Wrap a raw 32-byte digest.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex of the full digest (64 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 4 bytes as hex, the form shown to users.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl FromStr for Fingerprint {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| CryptoError::InvalidFingerprint { reason: e.to_string() })?;
        Ok(Self(bytes))
    }
}

/// Exported private key object, as kept by the persistence layer.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedPrivateKey {
    /// Always [`PRIVATE_KEY_ALGORITHM`].
    pub algo: String,
    /// Base64 of the 32-byte seed.
    pub private_key: String,
}

impl fmt::Debug for ExportedPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportedPrivateKey").field("algo", &self.algo).finish_non_exhaustive()
    }
}

/// Long-term Ed25519 keypair with its fingerprint.
///
/// The signing key zeroizes itself on drop.
#[derive(Clone)]
pub struct Identity {
    signing_key: SigningKey,
    fingerprint: Fingerprint,
}

impl Identity {
    /// Build an identity from a 32-byte private key seed.
    ///
    /// Callers provide the seed so that tests can use a seeded RNG.
    pub fn from_secret(secret: [u8; PRIVATE_KEY_SIZE]) -> Self {
        let secret = Zeroizing::new(secret);
        let signing_key = SigningKey::from_bytes(&secret);
        let fingerprint = Fingerprint::of(signing_key.verifying_key().as_bytes());
        Self { signing_key, fingerprint }
    }

    /// Build an identity from raw private key bytes.
    ///
    /// # Errors
    ///
    /// - `InvalidLocalKey`: the slice is not exactly 32 bytes
    pub fn from_secret_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let secret: [u8; PRIVATE_KEY_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLocalKey {
                reason: format!(
                    "private key must be {PRIVATE_KEY_SIZE} bytes, got {}",
                    bytes.len()
                ),
            })?;
        Ok(Self::from_secret(secret))
    }

    /// Import a base64-encoded private key.
    ///
    /// # Errors
    ///
    /// - `InvalidLocalKey`: not valid base64, or not exactly 32 bytes
    pub fn import_private_key(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(BASE64.decode(encoded.trim()).map_err(|e| {
            CryptoError::InvalidLocalKey { reason: format!("private key is not base64: {e}") }
        })?);
        Self::from_secret_slice(&bytes)
    }

    /// Import an exported key object.
    ///
    /// # Errors
    ///
    /// - `InvalidLocalKey`: wrong `algo`, or the key itself is invalid
    pub fn import(exported: &ExportedPrivateKey) -> Result<Self, CryptoError> {
        if exported.algo != PRIVATE_KEY_ALGORITHM {
            return Err(CryptoError::InvalidLocalKey {
                reason: format!("unsupported key algorithm: {}", exported.algo),
            });
        }
        Self::import_private_key(&exported.private_key)
    }

    /// Base64 of the private key seed.
    pub fn export_private_key(&self) -> Zeroizing<String> {
        Zeroizing::new(BASE64.encode(self.signing_key.as_bytes()))
    }

    /// Exported key object suitable for persistence.
    pub fn export(&self) -> ExportedPrivateKey {
        ExportedPrivateKey {
            algo: PRIVATE_KEY_ALGORITHM.to_string(),
            private_key: self.export_private_key().to_string(),
        }
    }

    /// Raw public key bytes.
    pub fn public_key(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Stable peer identity.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Sign the SHA-256 digest of `message`.
    pub fn sign_digest(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        let digest = Sha256::digest(message);
        self.signing_key.sign(&digest).to_bytes()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity").field("fingerprint", &self.fingerprint).finish_non_exhaustive()
    }
}

/// Verify a signature produced by [`Identity::sign_digest`].
///
/// Returns the signer's fingerprint on success.
///
/// # Errors
///
/// - `InvalidSignature`: malformed key or signature bytes, or verification
///   failure
pub fn verify_digest(
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<Fingerprint, CryptoError> {
    let key_bytes: [u8; PUBLIC_KEY_SIZE] =
        public_key.try_into().map_err(|_| CryptoError::InvalidSignature)?;
    let verifying_key =
        VerifyingKey::from_bytes(&key_bytes).map_err(|_| CryptoError::InvalidSignature)?;
    let signature = Signature::from_slice(signature).map_err(|_| CryptoError::InvalidSignature)?;

    let digest = Sha256::digest(message);
    verifying_key.verify(&digest, &signature).map_err(|_| CryptoError::InvalidSignature)?;

    Ok(Fingerprint::of(&key_bytes))
}
