//! Key transport for the session handshake.
//!
//! Each session generates an ephemeral RSA key pair and a fresh symmetric
//! key. The symmetric key travels to the server exactly once, wrapped with
//! RSA-OAEP under the server's public key (SHA-256 for both the label hash and
//! MGF1).

use rand::rngs::OsRng;
use rsa::{Oaep, RsaPrivateKey};
use sha2::Sha256;

use crate::armor::{PublicKeyHandle, encode_armored_public_key};
use crate::error::CryptoError;
use crate::key::{SYMMETRIC_KEY_SIZE, SymmetricKey};

/// Modulus size of generated client key pairs.
pub const RSA_KEY_BITS: usize = 2048;

/// Smallest server modulus we are willing to wrap a session key under.
pub const MIN_SERVER_KEY_BITS: usize = 2048;

/// OAEP-SHA256 capacity of the smallest accepted modulus: k - 2*hLen - 2.
const MAX_OAEP_PAYLOAD: usize = MIN_SERVER_KEY_BITS / 8 - 2 * 32 - 2;

const _: () = assert!(SYMMETRIC_KEY_SIZE <= MAX_OAEP_PAYLOAD);

/// An ephemeral RSA key pair used for encryption, not signing.
pub struct KeyPair {
    private: RsaPrivateKey,
    public: PublicKeyHandle,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .field("private", &"[REDACTED]")
            .finish()
    }
}

impl KeyPair {
    /// Generate a fresh key pair from the OS CSPRNG.
    pub fn generate() -> Result<Self, CryptoError> {
        Self::generate_with_bits(RSA_KEY_BITS)
    }

    fn generate_with_bits(bits: usize) -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public = PublicKeyHandle::from_rsa(private.to_public_key())?;
        Ok(Self { private, public })
    }

    pub const fn public_key(&self) -> &PublicKeyHandle {
        &self.public
    }

    /// Public half in armored form, ready to send to the peer.
    pub fn armored_public_key(&self) -> String {
        encode_armored_public_key(&self.public)
    }

    /// Unwrap a symmetric key encrypted to this key pair.
    ///
    /// This is the server half of the exchange; the client never needs it.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn decrypt_symmetric_key(&self, ciphertext: &[u8]) -> Result<SymmetricKey, CryptoError> {
        let bytes = zeroize::Zeroizing::new(
            self.private
                .decrypt(Oaep::new::<Sha256>(), ciphertext)
                .map_err(|e| CryptoError::Decryption(e.to_string()))?,
        );
        SymmetricKey::from_bytes(&bytes)
    }
}

/// Wrap `key` under the server's public key with RSA-OAEP/SHA-256.
///
/// Padding is re-randomized on every call.
pub fn encrypt_symmetric_key(
    server_key: &PublicKeyHandle,
    key: &SymmetricKey,
) -> Result<Vec<u8>, CryptoError> {
    if server_key.bits() < MIN_SERVER_KEY_BITS {
        return Err(CryptoError::Encryption(format!(
            "server key is {} bits, at least {MIN_SERVER_KEY_BITS} required",
            server_key.bits()
        )));
    }
    server_key
        .as_rsa()
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), key.as_bytes())
        .map_err(|e| CryptoError::Encryption(e.to_string()))
}
