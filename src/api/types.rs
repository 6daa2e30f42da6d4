//! Splat API types
//!
//! Defines the response envelope and the asset record returned by the API,
//! plus the request bodies for create/update.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Deserialize an ID that might be encoded as a number, a string or null.
/// The API is not consistent about numeric IDs and uses null for unset ones.
fn deserialize_flexible_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de;

    struct FlexibleU64Visitor;

    impl<'de> de::Visitor<'de> for FlexibleU64Visitor {
        type Value = u64;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a u64, a string containing a u64, or null")
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<u64, E> {
            Ok(value)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<u64, E> {
            u64::try_from(value).map_err(|_| de::Error::custom("negative value for u64"))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<u64, E> {
            value.trim().parse::<u64>().map_err(de::Error::custom)
        }

        fn visit_none<E: de::Error>(self) -> Result<u64, E> {
            Ok(0)
        }

        fn visit_unit<E: de::Error>(self) -> Result<u64, E> {
            Ok(0)
        }
    }

    deserializer.deserialize_any(FlexibleU64Visitor)
}

/// Deserialize a string field that the API may send as null
fn deserialize_null_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// JSON envelope wrapping every API response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub response_object: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Total item count (list responses only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl<T> Envelope<T> {
    /// A successful envelope around `value`
    pub fn ok(value: T) -> Self {
        Self {
            success: true,
            response_object: Some(value),
            message: None,
            total: None,
        }
    }

    /// A failed envelope carrying `message`
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            response_object: None,
            message: Some(message.into()),
            total: None,
        }
    }

    /// Failure message, or a generic one when the API sent none
    pub fn failure_message(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| "Request was not successful".to_string())
    }
}

impl<T, E: std::fmt::Display> From<Result<T, E>> for Envelope<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Envelope::ok(value),
            Err(e) => Envelope::failure(e.to_string()),
        }
    }
}

/// A Splat asset record as stored by the remote API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SplatRecord {
    #[serde(default, deserialize_with = "deserialize_flexible_u64")]
    pub id: u64,
    #[serde(default, deserialize_with = "deserialize_null_string")]
    pub title: String,
    #[serde(default, deserialize_with = "deserialize_null_string")]
    pub description: String,
    #[serde(default, deserialize_with = "deserialize_null_string")]
    pub slug: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_null_string")]
    pub storage_url: String,
    #[serde(default)]
    pub is_animated: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl SplatRecord {
    /// Embed directive an editor pastes into a page to show this splat
    pub fn embed_snippet(&self) -> String {
        format!("[splat id='{}']", self.id)
    }

    /// Creation date formatted as `YYYY-MM-DD HH:MM` for listings
    pub fn created_display(&self) -> String {
        let Some(created) = self.created_at.as_deref() else {
            return String::new();
        };
        // ISO-8601 timestamps: "2024-05-01T10:22:31.000Z"
        match (created.get(..10), created.get(11..16)) {
            (Some(date), Some(time)) => format!("{} {}", date, time),
            _ => created.to_string(),
        }
    }
}

/// Whether a decoded `responseObject` counts as present.
/// Null, false, zero, empty strings, empty arrays and empty objects do not.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Request body for `POST /create`
#[derive(Debug, Clone, Serialize)]
pub struct CreateSplatRequest {
    pub storage_id: String,
    pub title: String,
    pub description: String,
    pub thumbnail_id: Option<String>,
    pub is_animated: bool,
}

/// Request body for `PUT /update/{id}`
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateSplatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_animated: Option<bool>,
}

/// Response object of `POST /upload`
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedFile {
    pub id: Value,
}

impl UploadedFile {
    /// Storage identifier as sent back in create/update payloads
    pub fn storage_id(&self) -> Option<String> {
        match &self.id {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accepts_string_id_and_null_fields() {
        let json = r#"{
            "id": "42",
            "title": "Garden",
            "description": null,
            "slug": "garden",
            "thumbnail_url": null,
            "storage_url": "https://cdn.example/garden.splat",
            "is_animated": true,
            "created_at": "2024-05-01T10:22:31.000Z"
        }"#;
        let record: SplatRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, 42);
        assert_eq!(record.description, "");
        assert!(record.thumbnail_url.is_none());
        assert!(record.is_animated);
        assert_eq!(record.created_display(), "2024-05-01 10:22");
    }

    #[test]
    fn test_record_with_missing_fields() {
        let json = r#"{"storage_url":"https://x/a.splat","thumbnail_url":null,"title":"T"}"#;
        let record: SplatRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, 0);
        assert_eq!(record.title, "T");
        assert_eq!(record.storage_url, "https://x/a.splat");
    }

    #[test]
    fn test_envelope_camel_case() {
        let json = r#"{"success":true,"responseObject":[{"id":1},{"id":2}],"total":12}"#;
        let envelope: Envelope<Vec<SplatRecord>> = serde_json::from_str(json).unwrap();
        assert!(envelope.success);
        assert_eq!(envelope.response_object.unwrap().len(), 2);
        assert_eq!(envelope.total, Some(12));

        let failed = Envelope::<SplatRecord>::failure("HTTP Error: 500");
        let out = serde_json::to_string(&failed).unwrap();
        assert_eq!(out, r#"{"success":false,"message":"HTTP Error: 500"}"#);
    }

    #[test]
    fn test_is_present() {
        assert!(!is_present(&Value::Null));
        assert!(!is_present(&serde_json::json!({})));
        assert!(!is_present(&serde_json::json!([])));
        assert!(!is_present(&serde_json::json!("")));
        assert!(is_present(&serde_json::json!({"id": 1})));
    }

    #[test]
    fn test_uploaded_file_storage_id() {
        let numeric: UploadedFile = serde_json::from_str(r#"{"id": 17}"#).unwrap();
        assert_eq!(numeric.storage_id().as_deref(), Some("17"));
        let text: UploadedFile = serde_json::from_str(r#"{"id": "abc-1"}"#).unwrap();
        assert_eq!(text.storage_id().as_deref(), Some("abc-1"));
        let empty: UploadedFile = serde_json::from_str(r#"{"id": null}"#).unwrap();
        assert!(empty.storage_id().is_none());
    }

    #[test]
    fn test_update_request_skips_unset_fields() {
        let request = UpdateSplatRequest {
            title: Some("New".into()),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&request).unwrap(), r#"{"title":"New"}"#);
    }
}
