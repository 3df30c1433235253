//! Asset records exchanged between the local store and the remote namespace.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{BridgeError, Result};

/// Kind of media an asset carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    Image,
    Video,
    Audio,
}

/// Asset payload in either of its two representations.
///
/// The local store keeps native bytes; the remote JSON object carries base64
/// text. Serialization always produces base64 text, and deserialization keeps
/// the text as-is until [`AssetPayload::decode`] is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetPayload {
    Binary(Bytes),
    Encoded(String),
}

impl AssetPayload {
    /// Decode into raw bytes.
    ///
    /// A `data:<mime>;base64,` prefix on the encoded form is stripped first.
    pub fn decode(&self) -> Result<Bytes> {
        match self {
            AssetPayload::Binary(bytes) => Ok(bytes.clone()),
            AssetPayload::Encoded(text) => {
                let raw = strip_data_url(text);
                STANDARD
                    .decode(raw.trim())
                    .map(Bytes::from)
                    .map_err(|e| BridgeError::InvalidPayload {
                        key: "data".to_string(),
                        reason: e.to_string(),
                    })
            }
        }
    }

    /// Base64 text form, as stored remotely
    pub fn encode(&self) -> String {
        match self {
            AssetPayload::Binary(bytes) => STANDARD.encode(bytes),
            AssetPayload::Encoded(text) => strip_data_url(text).to_string(),
        }
    }

    /// Convert to the native binary form
    pub fn into_native(self) -> Result<Self> {
        match self {
            AssetPayload::Binary(_) => Ok(self),
            encoded => encoded.decode().map(AssetPayload::Binary),
        }
    }

    /// Convert to the text-safe transport form
    pub fn to_transport(&self) -> Self {
        AssetPayload::Encoded(self.encode())
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, AssetPayload::Binary(_))
    }
}

fn strip_data_url(text: &str) -> &str {
    if text.starts_with("data:") {
        if let Some(idx) = text.find(";base64,") {
            return &text[idx + ";base64,".len()..];
        }
    }
    text
}

impl Serialize for AssetPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for AssetPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(AssetPayload::Encoded)
    }
}

/// A single inlay asset. The asset id is the key it is stored under and is
/// not part of the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub name: String,
    pub data: AssetPayload,
    pub ext: String,
    pub width: u32,
    pub height: u32,
    #[serde(rename = "type", default)]
    pub media_type: MediaType,
}

impl AssetRecord {
    /// Copy of this record with a binary payload
    pub fn into_native(self) -> Result<Self> {
        let data = self.data.into_native()?;
        Ok(Self { data, ..self })
    }

    /// Copy of this record with a base64 payload
    pub fn to_transport(&self) -> Self {
        Self {
            data: self.data.to_transport(),
            ..self.clone()
        }
    }
}
