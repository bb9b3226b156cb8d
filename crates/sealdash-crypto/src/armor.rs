//! Armored public key codec.
//!
//! Converts between the PEM-style text form servers publish
//! (`-----BEGIN PUBLIC KEY-----`, base64 body, `-----END PUBLIC KEY-----`)
//! and RSA public key material. We always emit SubjectPublicKeyInfo under the
//! `PUBLIC KEY` label; PKCS#1 (`RSA PUBLIC KEY`) is also accepted on input.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rsa::RsaPublicKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;

use crate::error::CryptoError;

const SPKI_LABEL: &str = "PUBLIC KEY";
const PKCS1_LABEL: &str = "RSA PUBLIC KEY";
const LINE_WIDTH: usize = 64;

/// An RSA public key together with its canonical SPKI DER encoding.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKeyHandle {
    key: RsaPublicKey,
    der: Vec<u8>,
}

impl std::fmt::Debug for PublicKeyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKeyHandle")
            .field("bits", &self.bits())
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

impl PublicKeyHandle {
    /// Wrap an RSA public key.
    pub fn from_rsa(key: RsaPublicKey) -> Result<Self, CryptoError> {
        let der = key
            .to_public_key_der()
            .map_err(|e| CryptoError::MalformedKey(format!("SPKI encoding failed: {e}")))?
            .as_bytes()
            .to_vec();
        Ok(Self { key, der })
    }

    pub const fn as_rsa(&self) -> &RsaPublicKey {
        &self.key
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        self.key.size() * 8
    }

    /// SubjectPublicKeyInfo DER bytes.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Colon-separated SHA-256 fingerprint of the SPKI DER.
    pub fn fingerprint(&self) -> String {
        fingerprint_of(&self.der)
    }
}

/// Decode an armored public key.
///
/// Fails with [`CryptoError::MalformedKey`] when the BEGIN/END markers are
/// missing or disagree, when the body is not valid base64, or when the DER is
/// not an RSA public key.
pub fn decode_armored_public_key(text: &str) -> Result<PublicKeyHandle, CryptoError> {
    let (label, body) = strip_armor(text)?;
    let der = STANDARD
        .decode(body.as_bytes())
        .map_err(|e| CryptoError::MalformedKey(format!("key body is not valid base64: {e}")))?;

    let key = match label {
        SPKI_LABEL => RsaPublicKey::from_public_key_der(&der)
            .map_err(|e| CryptoError::MalformedKey(format!("invalid SPKI key: {e}")))?,
        PKCS1_LABEL => RsaPublicKey::from_pkcs1_der(&der)
            .map_err(|e| CryptoError::MalformedKey(format!("invalid PKCS#1 key: {e}")))?,
        other => {
            return Err(CryptoError::MalformedKey(format!(
                "unsupported armor label {other:?}"
            )));
        }
    };
    PublicKeyHandle::from_rsa(key)
}

/// Encode a public key as `PUBLIC KEY` armor: 64-column base64, LF endings.
pub fn encode_armored_public_key(key: &PublicKeyHandle) -> String {
    let body = STANDARD.encode(&key.der);
    let mut out = String::with_capacity(body.len() + body.len() / LINE_WIDTH + 64);
    out.push_str("-----BEGIN PUBLIC KEY-----\n");
    for line in body.as_bytes().chunks(LINE_WIDTH) {
        out.push_str(&String::from_utf8_lossy(line));
        out.push('\n');
    }
    out.push_str("-----END PUBLIC KEY-----\n");
    out
}

/// Split armor into its label and whitespace-free base64 body.
fn strip_armor(text: &str) -> Result<(&str, String), CryptoError> {
    let text = text.trim();
    let rest = text
        .strip_prefix("-----BEGIN ")
        .ok_or_else(|| CryptoError::MalformedKey("missing BEGIN marker".into()))?;
    let (label, rest) = rest
        .split_once("-----")
        .ok_or_else(|| CryptoError::MalformedKey("unterminated BEGIN marker".into()))?;

    let end_marker = format!("-----END {label}-----");
    let body = rest
        .strip_suffix(end_marker.as_str())
        .ok_or_else(|| CryptoError::MalformedKey(format!("missing END marker for {label:?}")))?;

    let body: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if body.is_empty() {
        return Err(CryptoError::MalformedKey("empty key body".into()));
    }
    Ok((label, body))
}

/// Compute a colon-separated hex fingerprint from raw key bytes.
pub fn fingerprint_of(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let hash = Sha256::digest(bytes);
    hash.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}
