//! Small (de)serialization helpers shared by the data and server crates.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// Simply returns `true`. Useful for `#[serde(default = "default_true")]`.
pub fn default_true() -> bool {
    true
}

/// Simply returns `false`. Useful for `#[serde(default = "default_false")]`.
pub fn default_false() -> bool {
    false
}

/// Check whether a value equals its default, for `#[serde(skip_serializing_if = ...)]`.
pub fn is_default<T: Default + PartialEq>(val: &T) -> bool {
    *val == T::default()
}

/// Maps an empty or absent string to `None`, forwarding non-empty strings to `T`.
pub fn empty_string_as_none<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(de)?;
    Ok(opt.filter(|s| !s.is_empty()))
}

/// A byte buffer that (de)serializes as a base64 string.
///
/// Credential blobs embed arbitrary binary key material inside a JSON
/// document; wrapping every `Vec<u8>` field in this newtype is a bijection
/// on buffer values, so `round_trip(x) == x` for every `x`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Base64Bytes(pub Vec<u8>);

impl Base64Bytes {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Base64Bytes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&BASE64.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Base64Bytes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BASE64
            .decode(s.as_bytes())
            .map(Base64Bytes)
            .map_err(de::Error::custom)
    }
}

impl From<Vec<u8>> for Base64Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_bytes_round_trips_arbitrary_buffers() {
        let original = Base64Bytes::new(vec![0u8, 1, 2, 255, 254, 10, 13]);
        let json = serde_json::to_string(&original).expect("serialize");
        let decoded: Base64Bytes = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(original, decoded);
    }

    #[test]
    fn empty_string_as_none_filters_blank_display_name() {
        #[derive(Deserialize)]
        struct Body {
            #[serde(default, deserialize_with = "empty_string_as_none")]
            display_name: Option<String>,
        }
        let body: Body = serde_json::from_str(r#"{"display_name":""}"#).unwrap();
        assert_eq!(body.display_name, None);
        let body: Body = serde_json::from_str(r#"{"display_name":"Bot"}"#).unwrap();
        assert_eq!(body.display_name, Some("Bot".to_owned()));
    }
}
