use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// 元数据字段：`type` 仅为标签，匹配只看 `value` 的原文
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub value: String,
}

impl Field {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            kind: "string".to_string(),
            value: value.into(),
        }
    }
}

/// 存储单元。`value` 为不透明负载，落盘时按 base64 编码
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    #[serde(
        default,
        serialize_with = "serialize_payload",
        deserialize_with = "deserialize_payload",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub value: Vec<u8>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Field>,
}

impl Record {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn with_value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.metadata.insert(name.into(), field);
        self
    }

    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    pub fn decode(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

fn serialize_payload<S: Serializer>(value: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&STANDARD.encode(value))
}

fn deserialize_payload<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(d)?;
    STANDARD
        .decode(encoded.as_bytes())
        .map_err(serde::de::Error::custom)
}

/// 索引文档：Record 的投影，不含负载，永远不是权威数据
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub database: String,
    pub table: String,
    pub metadata: HashMap<String, Field>,
}

impl IndexDocument {
    pub fn project(database: &str, table: &str, record: &Record) -> Self {
        Self {
            database: database.to_string(),
            table: table.to_string(),
            metadata: record.metadata.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_base64_on_disk() {
        let rec = Record::new("k1")
            .with_value(b"hello".to_vec())
            .with_field("email", Field::string("a@x.com"));
        let text = String::from_utf8(rec.encode().unwrap()).unwrap();
        assert!(text.contains("\"aGVsbG8=\""));
        assert!(text.contains("\"type\": \"string\""));
        assert_eq!(Record::decode(text.as_bytes()).unwrap(), rec);
    }

    #[test]
    fn decode_tolerates_missing_optional_parts() {
        let rec = Record::decode(br#"{"key":"only"}"#).unwrap();
        assert_eq!(rec.key, "only");
        assert!(rec.value.is_empty());
        assert!(rec.metadata.is_empty());
    }

    #[test]
    fn decode_rejects_bad_payload() {
        assert!(Record::decode(br#"{"key":"k","value":"@@not-base64@@"}"#).is_err());
        assert!(Record::decode(b"not json").is_err());
    }
}
