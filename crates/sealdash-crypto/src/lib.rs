//! sealdash session crypto
//!
//! Primitives behind the dashboard's secure session layer.
//!
//! ## Crypto primitives
//!
//! - **Key armor**: PEM-style `PUBLIC KEY` text <-> RSA public keys
//! - **Key transport**: ephemeral RSA-2048 pair per session, symmetric key
//!   wrapped with RSA-OAEP/SHA-256 under the server's public key
//! - **Envelopes**: AES-256-CBC + PKCS#7 under a fresh random IV, with an
//!   HMAC-SHA256 tag (HKDF-derived MAC key) in the default suite

pub mod armor;
pub mod cipher;
pub mod envelope;
pub mod error;
pub mod exchange;
pub mod key;

pub use armor::{
    PublicKeyHandle, decode_armored_public_key, encode_armored_public_key, fingerprint_of,
};
pub use cipher::{BLOCK_SIZE, CipherSuite, SessionCipher, pkcs7_pad, pkcs7_unpad};
pub use envelope::{EncryptedEnvelope, IV_SIZE, TAG_SIZE};
pub use error::CryptoError;
pub use exchange::{KeyPair, MIN_SERVER_KEY_BITS, RSA_KEY_BITS, encrypt_symmetric_key};
pub use key::{SYMMETRIC_KEY_SIZE, SymmetricKey};
