//! On-disk encoding of data files
//!
//! Content is pretty-printed JSON, optionally passed through a repeating-key
//! XOR so files are not trivially readable at rest. The transform is its own
//! inverse. Decoding auto-detects the format: plain JSON is tried first, then
//! the de-obfuscated bytes.
//!
//! The [`datetime_format`] and [`date_format`] modules are `#[serde(with)]`
//! helpers for the `yyyy-MM-dd HH:mm:ss` and `yyyy-MM-dd` patterns used inside
//! the files.

use serde::de::DeserializeOwned;
use serde::Serialize;
use worksync_core::config::StorageConfig;

use crate::error::StoreError;

/// Encoder/decoder for data file content
#[derive(Debug, Clone)]
pub struct Codec {
    key: Vec<u8>,
    obfuscate: bool,
}

impl Codec {
    pub fn new(key: impl AsRef<[u8]>, obfuscate: bool) -> Self {
        Self {
            key: key.as_ref().to_vec(),
            obfuscate,
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.obfuscation_key.as_bytes(), config.obfuscate)
    }

    /// Whether writes are obfuscated unless the caller says otherwise
    pub fn obfuscates_by_default(&self) -> bool {
        self.obfuscate
    }

    /// XOR every byte with the key, cycling through it. An empty key is the identity.
    pub fn xor(&self, data: &[u8]) -> Vec<u8> {
        if self.key.is_empty() {
            return data.to_vec();
        }
        data.iter()
            .zip(self.key.iter().cycle())
            .map(|(b, k)| b ^ k)
            .collect()
    }

    pub fn encode<T: Serialize + ?Sized>(
        &self,
        value: &T,
        obfuscate: bool,
    ) -> Result<Vec<u8>, StoreError> {
        let json = serde_json::to_vec_pretty(value)?;
        if obfuscate {
            Ok(self.xor(&json))
        } else {
            Ok(json)
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, StoreError> {
        match serde_json::from_slice(bytes) {
            Ok(value) => Ok(value),
            Err(plain_err) => {
                if self.key.is_empty() {
                    return Err(plain_err.into());
                }
                serde_json::from_slice(&self.xor(bytes)).map_err(StoreError::from)
            }
        }
    }
}

/// `yyyy-MM-dd HH:mm:ss` for `chrono::NaiveDateTime`
pub mod datetime_format {
    use chrono::NaiveDateTime;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, FORMAT).map_err(D::Error::custom)
    }
}

/// `yyyy-MM-dd` for `chrono::NaiveDate`
pub mod date_format {
    use chrono::NaiveDate;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S: Serializer>(value: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveDate::parse_from_str(&s, FORMAT).map_err(D::Error::custom)
    }
}
