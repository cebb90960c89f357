//! The JSON envelope written by database exports.
//!
//! ```json
//! { "metadata": { ... }, "data": { "home.User": [ { "model": "home.user", "pk": 1, "fields": { ... } } ] } }
//! ```

use crate::groups::RecordGroup;
use crate::kind::BackupKind;
use crate::utils::errors::{BackupError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::Write;

/// Name of the envelope entry inside a full archive.
pub const DATABASE_ENTRY: &str = "database.json";

/// Prefix for media entries inside archives.
pub const MEDIA_PREFIX: &str = "media/";

/// One row of a record group. Foreign keys are kept by primary key inside `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedRow {
    pub model: String,
    pub pk: Value,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl SerializedRow {
    pub fn new(group: RecordGroup, pk: impl Into<Value>, fields: Map<String, Value>) -> Self {
        Self {
            model: group.label(),
            pk: pk.into(),
            fields,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    pub created_at: String,
    pub backup_type: BackupKind,
    pub tool_version: String,
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub metadata: EnvelopeMetadata,
    pub data: Map<String, Value>,
}

impl Envelope {
    /// Build an envelope from serialized groups, keeping their order.
    pub fn new(groups: Vec<(RecordGroup, Vec<SerializedRow>)>) -> Result<Self> {
        let mut data = Map::new();
        let mut names = Vec::with_capacity(groups.len());
        for (group, rows) in groups {
            names.push(group.name().to_string());
            data.insert(group.name().to_string(), serde_json::to_value(rows)?);
        }

        Ok(Self {
            metadata: EnvelopeMetadata {
                created_at: chrono::Local::now().to_rfc3339(),
                backup_type: BackupKind::Database,
                tool_version: env!("CARGO_PKG_VERSION").to_string(),
                groups: names,
            },
            data,
        })
    }

    /// Write as indented UTF-8 JSON.
    pub fn write_pretty<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    metadata: Option<Value>,
    #[serde(default)]
    data: Option<Value>,
}

/// Envelope as read back for restore. Only `data` is mandatory here.
#[derive(Debug)]
pub struct ParsedEnvelope {
    pub metadata: Option<Value>,
    pub data: Map<String, Value>,
}

pub fn parse_envelope(bytes: &[u8]) -> Result<ParsedEnvelope> {
    let raw: RawEnvelope = serde_json::from_slice(bytes)?;
    match raw.data {
        Some(Value::Object(data)) => Ok(ParsedEnvelope {
            metadata: raw.metadata,
            data,
        }),
        Some(_) => Err(BackupError::InvalidEnvelope("'data' section is not an object".into())),
        None => Err(BackupError::InvalidEnvelope("missing 'data' section".into())),
    }
}

/// Structural check used by validation: both top-level keys must be present.
pub fn has_envelope_shape(value: &Value) -> bool {
    value
        .as_object()
        .map(|obj| obj.contains_key("metadata") && obj.contains_key("data"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pk: i64, name: &str) -> SerializedRow {
        let mut fields = Map::new();
        fields.insert("role_name".into(), json!(name));
        SerializedRow::new(RecordGroup::Role, pk, fields)
    }

    #[test]
    fn test_envelope_keeps_group_order() {
        let envelope = Envelope::new(vec![
            (RecordGroup::Vacancy, vec![]),
            (RecordGroup::Role, vec![row(1, "hr")]),
        ])
        .unwrap();

        let keys: Vec<_> = envelope.data.keys().cloned().collect();
        assert_eq!(keys, vec!["home.Vacancy", "home.Role"]);
        assert_eq!(envelope.metadata.groups, keys);
        assert_eq!(envelope.metadata.backup_type, BackupKind::Database);
    }

    #[test]
    fn test_pretty_output_is_parseable() {
        let envelope = Envelope::new(vec![(RecordGroup::Role, vec![row(7, "Менеджер")])]).unwrap();
        let mut buf = Vec::new();
        envelope.write_pretty(&mut buf).unwrap();

        let text = String::from_utf8(buf.clone()).unwrap();
        assert!(text.contains("\n  \"metadata\""));
        assert!(text.contains("Менеджер"));

        let parsed = parse_envelope(&buf).unwrap();
        assert!(parsed.metadata.is_some());
        let rows = parsed.data["home.Role"].as_array().unwrap();
        assert_eq!(rows[0]["model"], json!("home.role"));
        assert_eq!(rows[0]["pk"], json!(7));
    }

    #[test]
    fn test_parse_requires_data_object() {
        assert!(matches!(
            parse_envelope(br#"{"metadata": {}}"#),
            Err(BackupError::InvalidEnvelope(_))
        ));
        assert!(matches!(
            parse_envelope(br#"{"data": []}"#),
            Err(BackupError::InvalidEnvelope(_))
        ));
        assert!(matches!(parse_envelope(b"not json"), Err(BackupError::Json(_))));
        assert!(parse_envelope(br#"{"data": {}}"#).is_ok());
    }

    #[test]
    fn test_envelope_shape() {
        assert!(has_envelope_shape(&json!({"metadata": {}, "data": {}})));
        assert!(!has_envelope_shape(&json!({"metadata": {}})));
        assert!(!has_envelope_shape(&json!([1, 2])));
    }
}
