//! Serde adapters for the canonical JSON encodings.

/// Base64 (standard alphabet, padded) encoding for byte fields.
///
/// Stored blocks and wire payloads carry raw bytes inside JSON values;
/// annotate those fields with `#[serde(with = "crate::encoding::b64")]`.
pub mod b64 {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(de::Error::custom)
    }
}
