//! Session cipher for API payloads.
//!
//! Payloads are serialized with `serde_json`, PKCS#7 padded to the AES block
//! size and encrypted with AES-256-CBC under a fresh random IV. The default
//! suite adds an HMAC-SHA256 tag over `iv || data` (encrypt-then-MAC) with a
//! MAC key derived from the session key via HKDF-SHA256; the tag is checked
//! before anything is decrypted. The tagless legacy suite exists only for
//! servers that still speak the original protocol.

use aes::Aes256;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::envelope::{EncryptedEnvelope, IV_SIZE};
use crate::error::CryptoError;
use crate::key::SymmetricKey;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// HKDF info string for the envelope MAC key.
const HKDF_INFO: &[u8] = b"sealdash-envelope-mac-v1";

/// HKDF salt for the envelope MAC key.
const HKDF_SALT: &[u8] = b"sealdash-envelope-hkdf-salt-v1";

/// Envelope protection scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CipherSuite {
    /// AES-256-CBC without integrity protection.
    #[serde(rename = "aes256-cbc")]
    Aes256Cbc,
    /// AES-256-CBC with an HMAC-SHA256 tag (encrypt-then-MAC).
    #[default]
    #[serde(rename = "aes256-cbc-hmac-sha256")]
    Aes256CbcHmacSha256,
}

impl CipherSuite {
    pub const fn is_authenticated(self) -> bool {
        matches!(self, Self::Aes256CbcHmacSha256)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Aes256Cbc => "aes256-cbc",
            Self::Aes256CbcHmacSha256 => "aes256-cbc-hmac-sha256",
        }
    }
}

impl std::fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CipherSuite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aes256-cbc" => Ok(Self::Aes256Cbc),
            "aes256-cbc-hmac-sha256" => Ok(Self::Aes256CbcHmacSha256),
            other => Err(format!(
                "unknown cipher suite {other:?} (expected aes256-cbc or aes256-cbc-hmac-sha256)"
            )),
        }
    }
}

/// Symmetric cipher bound to one session key.
///
/// Immutable after construction, so it can be shared across concurrent
/// requests without locking.
pub struct SessionCipher {
    key: SymmetricKey,
    mac_key: Option<Zeroizing<[u8; 32]>>,
    suite: CipherSuite,
}

impl std::fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCipher")
            .field("suite", &self.suite)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Derive the 32-byte envelope MAC key from the session key via HKDF-SHA256.
fn derive_mac_key(key: &SymmetricKey) -> Result<[u8; 32], CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), key.as_bytes());
    let mut mac_key = [0u8; 32];
    hk.expand(HKDF_INFO, &mut mac_key)
        .map_err(|e| CryptoError::KeyGeneration(format!("MAC key derivation failed: {e}")))?;
    Ok(mac_key)
}

fn compute_tag(mac_key: &[u8; 32], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(mac_key)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    mac.update(iv);
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Append PKCS#7 padding. Block-aligned input gains a full block.
#[allow(clippy::cast_possible_truncation)]
pub fn pkcs7_pad(data: &[u8]) -> Vec<u8> {
    let pad = BLOCK_SIZE - data.len() % BLOCK_SIZE;
    let mut out = Vec::with_capacity(data.len() + pad);
    out.extend_from_slice(data);
    // pad is in 1..=16
    out.resize(data.len() + pad, pad as u8);
    out
}

/// Strip PKCS#7 padding, checking every pad byte rather than trusting the last.
pub fn pkcs7_unpad(data: &[u8]) -> Result<&[u8], CryptoError> {
    let Some(&last) = data.last() else {
        return Err(CryptoError::Decryption("empty plaintext".into()));
    };
    let pad = usize::from(last);
    if pad == 0 || pad > BLOCK_SIZE || pad > data.len() {
        return Err(CryptoError::Decryption("invalid padding".into()));
    }
    let (body, padding) = data.split_at(data.len() - pad);
    if padding.iter().any(|&b| b != last) {
        return Err(CryptoError::Decryption("invalid padding".into()));
    }
    Ok(body)
}

impl SessionCipher {
    pub fn new(key: SymmetricKey, suite: CipherSuite) -> Result<Self, CryptoError> {
        let mac_key = if suite.is_authenticated() {
            Some(Zeroizing::new(derive_mac_key(&key)?))
        } else {
            None
        };
        Ok(Self {
            key,
            mac_key,
            suite,
        })
    }

    pub const fn suite(&self) -> CipherSuite {
        self.suite
    }

    pub const fn key(&self) -> &SymmetricKey {
        &self.key
    }

    /// Serialize and encrypt a payload.
    pub fn encrypt<T: Serialize + ?Sized>(
        &self,
        payload: &T,
    ) -> Result<EncryptedEnvelope, CryptoError> {
        let plaintext = Zeroizing::new(serde_json::to_vec(payload).map_err(|e| {
            CryptoError::Encryption(format!("payload serialization failed: {e}"))
        })?);
        self.encrypt_bytes(&plaintext)
    }

    /// Encrypt raw bytes under a fresh random IV.
    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> Result<EncryptedEnvelope, CryptoError> {
        let mut iv = [0u8; IV_SIZE];
        OsRng
            .try_fill_bytes(&mut iv)
            .map_err(|e| CryptoError::Encryption(format!("IV generation failed: {e}")))?;

        let mut data = pkcs7_pad(plaintext);
        let len = data.len();
        Aes256CbcEnc::new_from_slices(self.key.as_bytes(), &iv)
            .map_err(|_| CryptoError::Encryption("invalid key or IV length".into()))?
            .encrypt_padded_mut::<NoPadding>(&mut data, len)
            .map_err(|_| CryptoError::Encryption("plaintext not block aligned".into()))?;

        let tag = self
            .mac_key
            .as_ref()
            .map(|mac_key| compute_tag(mac_key, &iv, &data))
            .transpose()?;

        Ok(EncryptedEnvelope {
            iv: iv.to_vec(),
            data,
            tag,
        })
    }

    /// Decrypt an envelope and deserialize it into `T`.
    pub fn decrypt<T: DeserializeOwned>(&self, envelope: &EncryptedEnvelope) -> Result<T, CryptoError> {
        let plaintext = self.decrypt_bytes(envelope)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| CryptoError::Deserialization(e.to_string()))
    }

    /// Decrypt an envelope given in either wire shape.
    pub fn decrypt_wire<T: DeserializeOwned>(
        &self,
        value: &serde_json::Value,
    ) -> Result<T, CryptoError> {
        let envelope = EncryptedEnvelope::from_wire(value)?;
        self.decrypt(&envelope)
    }

    /// Verify (authenticated suite), decrypt and unpad an envelope.
    pub fn decrypt_bytes(
        &self,
        envelope: &EncryptedEnvelope,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        if envelope.iv.len() != IV_SIZE {
            return Err(CryptoError::Decryption(format!(
                "invalid IV length: expected {IV_SIZE}, got {}",
                envelope.iv.len()
            )));
        }

        if let Some(mac_key) = &self.mac_key {
            let tag = envelope
                .tag
                .as_deref()
                .ok_or_else(|| CryptoError::Decryption("missing authentication tag".into()))?;
            let expected = compute_tag(mac_key, &envelope.iv, &envelope.data)?;
            if !bool::from(expected.as_slice().ct_eq(tag)) {
                return Err(CryptoError::Decryption(
                    "authentication tag mismatch".into(),
                ));
            }
        }

        if envelope.data.is_empty() || envelope.data.len() % BLOCK_SIZE != 0 {
            return Err(CryptoError::Decryption(format!(
                "ciphertext length {} is not a positive multiple of {BLOCK_SIZE}",
                envelope.data.len()
            )));
        }

        let mut buf = Zeroizing::new(envelope.data.clone());
        Aes256CbcDec::new_from_slices(self.key.as_bytes(), &envelope.iv)
            .map_err(|_| CryptoError::Decryption("invalid key or IV length".into()))?
            .decrypt_padded_mut::<NoPadding>(buf.as_mut_slice())
            .map_err(|_| CryptoError::Decryption("ciphertext not block aligned".into()))?;

        let len = pkcs7_unpad(&buf)?.len();
        buf.truncate(len);
        Ok(buf)
    }
}
