//! Encrypted envelope and its wire shapes.
//!
//! On the wire an envelope is `{ "iv": base64, "data": base64 }`, plus
//! `"tag": base64` under the authenticated suite. Some endpoints wrap that
//! object once more as a base64-encoded JSON string; [`EncryptedEnvelope::from_wire`]
//! accepts either form.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CryptoError;

/// AES block / IV size in bytes.
pub const IV_SIZE: usize = 16;

/// HMAC-SHA256 tag size in bytes.
pub const TAG_SIZE: usize = 32;

/// One protected payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    #[serde(with = "b64")]
    pub iv: Vec<u8>,
    #[serde(with = "b64")]
    pub data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "b64_opt")]
    pub tag: Option<Vec<u8>>,
}

impl EncryptedEnvelope {
    /// Parse an envelope from either wire shape.
    ///
    /// A JSON string is treated as base64(JSON object); an object is used
    /// directly. Anything unparseable is a [`CryptoError::Decryption`]: the
    /// payload cannot be decrypted, whatever the reason.
    pub fn from_wire(value: &Value) -> Result<Self, CryptoError> {
        match value {
            Value::String(wrapped) => Self::from_base64_json(wrapped),
            Value::Object(_) => Self::deserialize(value)
                .map_err(|e| CryptoError::Decryption(format!("malformed envelope: {e}"))),
            Value::Null => Err(CryptoError::Decryption("envelope is null".into())),
            other => Err(CryptoError::Decryption(format!(
                "unexpected envelope type: {}",
                json_kind(other)
            ))),
        }
    }

    /// Parse the base64(JSON) wrapped shape.
    pub fn from_base64_json(wrapped: &str) -> Result<Self, CryptoError> {
        let raw = STANDARD.decode(wrapped.trim().as_bytes()).map_err(|e| {
            CryptoError::Decryption(format!("wrapped envelope is not valid base64: {e}"))
        })?;
        serde_json::from_slice(&raw)
            .map_err(|e| CryptoError::Decryption(format!("malformed wrapped envelope: {e}")))
    }

    /// Structured wire shape.
    pub fn to_wire(&self) -> Value {
        let mut obj = serde_json::Map::new();
        obj.insert("iv".into(), Value::String(STANDARD.encode(&self.iv)));
        obj.insert("data".into(), Value::String(STANDARD.encode(&self.data)));
        if let Some(tag) = &self.tag {
            obj.insert("tag".into(), Value::String(STANDARD.encode(tag)));
        }
        Value::Object(obj)
    }

    /// base64(JSON) wrapped wire shape.
    pub fn to_base64_json(&self) -> String {
        STANDARD.encode(self.to_wire().to_string())
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

mod b64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        STANDARD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

mod b64_opt {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => s.serialize_some(&STANDARD.encode(b)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|text| STANDARD.decode(text.as_bytes()))
            .transpose()
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample() -> EncryptedEnvelope {
        EncryptedEnvelope {
            iv: vec![1u8; IV_SIZE],
            data: vec![2u8; 32],
            tag: None,
        }
    }

    #[test]
    fn wire_shape_uses_base64_fields() {
        let wire = sample().to_wire();
        assert_eq!(wire["iv"], json!(STANDARD.encode([1u8; IV_SIZE])));
        assert_eq!(wire["data"], json!(STANDARD.encode([2u8; 32])));
        assert!(wire.get("tag").is_none());
    }

    #[test]
    fn serde_and_to_wire_agree() {
        let env = EncryptedEnvelope {
            tag: Some(vec![3u8; TAG_SIZE]),
            ..sample()
        };
        assert_eq!(serde_json::to_value(&env).unwrap(), env.to_wire());
    }

    #[test]
    fn from_wire_accepts_object_shape() {
        let env = sample();
        assert_eq!(EncryptedEnvelope::from_wire(&env.to_wire()).unwrap(), env);
    }

    #[test]
    fn from_wire_accepts_base64_json_shape() {
        let env = EncryptedEnvelope {
            tag: Some(vec![9u8; TAG_SIZE]),
            ..sample()
        };
        let wrapped = Value::String(env.to_base64_json());
        assert_eq!(EncryptedEnvelope::from_wire(&wrapped).unwrap(), env);
    }

    #[test]
    fn from_wire_rejects_missing_fields() {
        let err = EncryptedEnvelope::from_wire(&json!({ "iv": "AAAA" })).unwrap_err();
        assert!(matches!(err, CryptoError::Decryption(_)));
    }

    #[test]
    fn from_wire_rejects_bad_base64_field() {
        let err =
            EncryptedEnvelope::from_wire(&json!({ "iv": "%%%", "data": "AAAA" })).unwrap_err();
        assert!(matches!(err, CryptoError::Decryption(_)));
    }

    #[test]
    fn from_wire_rejects_non_base64_string() {
        let err = EncryptedEnvelope::from_wire(&json!("{not base64}")).unwrap_err();
        assert!(matches!(err, CryptoError::Decryption(msg) if msg.contains("base64")));
    }

    #[test]
    fn from_wire_rejects_other_json_types() {
        for value in [json!(null), json!(42), json!([1, 2]), json!(true)] {
            assert!(EncryptedEnvelope::from_wire(&value).is_err(), "{value}");
        }
    }
}
