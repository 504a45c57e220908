//! Record envelope and its JSON codec.
//!
//! An envelope wraps connector schema metadata and the report payload. The
//! schema is echoed through untouched; only `XML_DATEN` is ever rewritten.
//!
//! Encoding is compact JSON with the keys in declaration order, markup
//! characters (`<`, `>`, `&`) written literally and a trailing newline.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CodecError;

/// A decoded bus record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub schema: Schema,
    pub payload: Payload,
}

/// Connector schema metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "type")]
    pub schema_type: String,

    pub fields: Vec<Field>,

    pub optional: bool,

    /// Keys this crate does not know about, kept in their original order
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// A single field descriptor of the schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    #[serde(rename = "type")]
    pub field_type: String,

    pub optional: bool,

    pub field: String,

    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// The report payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(rename = "YEAR")]
    pub year: i64,

    #[serde(rename = "VERSIONSNUMMER")]
    pub version_number: i64,

    #[serde(rename = "ID")]
    pub id: i64,

    /// Serialized XML document, treated as opaque text
    #[serde(rename = "XML_DATEN")]
    pub xml_data: String,
}

impl Record {
    /// Decode a record from the raw message value
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(bytes).map_err(CodecError::MalformedInput)
    }

    /// Encode the record as a single newline-terminated JSON line
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut buffer = serde_json::to_vec(self).map_err(CodecError::EncodingFailure)?;
        buffer.push(b'\n');
        Ok(buffer)
    }
}
