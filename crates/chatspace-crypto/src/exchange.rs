//! X25519 ephemeral key exchange and room token derivation.
//!
//! Two peers who swap ephemeral public keys compute the same shared secret
//! and hash it into the same room token, so the token itself never crosses
//! the wire. The token is shaped like a UUIDv4 so it reads like any other
//! room name.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha2::{Digest, Sha256};
use uuid::Builder;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Size of an X25519 public key.
pub const EXCHANGE_KEY_SIZE: usize = 32;

/// Ephemeral X25519 keypair held for one outstanding invite.
///
/// The secret half zeroizes itself on drop.
pub struct EphemeralKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl EphemeralKeyPair {
    /// Build a keypair from 32 caller-provided random bytes.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let secret = StaticSecret::from(seed);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Raw public key bytes.
    pub fn public_key(&self) -> [u8; EXCHANGE_KEY_SIZE] {
        self.public.to_bytes()
    }

    /// Base64 public key, as carried in invite messages.
    pub fn public_key_base64(&self) -> String {
        BASE64.encode(self.public.as_bytes())
    }

    /// Compute the shared secret with a peer's raw public key.
    ///
    /// # Errors
    ///
    /// - `InvalidPublicKey`: the key is not 32 bytes
    /// - `WeakKeyExchange`: the peer key is a low-order point
    pub fn agree(&self, peer_public: &[u8]) -> Result<SharedSecret, CryptoError> {
        let peer: [u8; EXCHANGE_KEY_SIZE] =
            peer_public.try_into().map_err(|_| CryptoError::InvalidPublicKey {
                reason: format!(
                    "exchange key must be {EXCHANGE_KEY_SIZE} bytes, got {}",
                    peer_public.len()
                ),
            })?;

        let shared = self.secret.diffie_hellman(&PublicKey::from(peer));
        if !shared.was_contributory() {
            return Err(CryptoError::WeakKeyExchange);
        }

        Ok(SharedSecret(Zeroizing::new(shared.to_bytes())))
    }

    /// Compute the shared secret with a peer's base64 public key.
    ///
    /// # Errors
    ///
    /// - `InvalidPublicKey`: not base64, or not 32 bytes
    /// - `WeakKeyExchange`: the peer key is a low-order point
    pub fn agree_base64(&self, peer_public: &str) -> Result<SharedSecret, CryptoError> {
        let bytes = BASE64.decode(peer_public).map_err(|e| CryptoError::InvalidPublicKey {
            reason: format!("exchange key is not base64: {e}"),
        })?;
        self.agree(&bytes)
    }
}

impl std::fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("public", &self.public_key_base64())
            .finish_non_exhaustive()
    }
}

/// X25519 shared secret.
pub struct SharedSecret(Zeroizing<[u8; 32]>);

impl SharedSecret {
    /// Raw secret bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Room token both peers derive from this secret.
    pub fn room_token(&self) -> String {
        derive_room_token(self.as_bytes())
    }
}

/// UUIDv4-shaped token from the first 16 bytes of SHA-256(`shared_secret`).
///
/// Version and variant bits are forced the same way a random UUIDv4 would
/// set them.
pub fn derive_room_token(shared_secret: &[u8]) -> String {
    let digest = Sha256::digest(shared_secret);
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    random_room_token(bytes)
}

/// UUIDv4 token from 16 caller-provided random bytes.
pub fn random_room_token(random: [u8; 16]) -> String {
    Builder::from_random_bytes(random).into_uuid().hyphenated().to_string()
}
