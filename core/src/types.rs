//! Domain DTOs for the Domo API.
//!
//! # Design
//! Identifiers are opaque. Dataset ids come back as strings while stream and
//! execution ids come back as JSON numbers, so every id type accepts either
//! form and stores it as text. Each id is its own type so a stream id cannot
//! be passed where a dataset id is expected.
//!
//! Response types keep the fields this crate reads and collect everything
//! else the service sends into `extra`.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(text) => text,
            RawId::Number(number) => number.to_string(),
        }
    }
}

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                RawId::deserialize(deserializer).map(|raw| Self(raw.into_string()))
            }
        }
    };
}

opaque_id!(
    /// Identifier of a dataset, as generated by the service.
    DatasetId
);
opaque_id!(
    /// Identifier of a stream.
    StreamId
);
opaque_id!(
    /// Identifier of one execution (upload transaction) on a stream.
    ExecutionId
);

/// Bearer token obtained from the OAuth endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// One column of a dataset schema. The type name (`STRING`, `DECIMAL`,
/// `LONG`, `DOUBLE`, `DATE`, `DATETIME`) is passed through as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    #[serde(rename = "type")]
    pub column_type: String,
    pub name: String,
}

impl Column {
    pub fn new(column_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            column_type: column_type.into(),
            name: name.into(),
        }
    }

    /// Shorthand for the most common column type.
    pub fn string(name: impl Into<String>) -> Self {
        Self::new("STRING", name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: &[Column]) -> Self {
        Self {
            columns: columns.to_vec(),
        }
    }
}

/// Whether uploaded data is added to or overwrites the dataset contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateMethod {
    #[default]
    Append,
    Replace,
}

/// Dataset metadata as returned by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub id: DatasetId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Schema>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A stream and the dataset it feeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    pub id: StreamId,
    pub data_set: Dataset,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_method: Option<UpdateMethod>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One upload transaction on a stream. Parts, commit and abort all answer
/// with the execution's current view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: ExecutionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_state: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Request payload for creating a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDataset {
    pub name: String,
    pub description: String,
    pub schema: Schema,
}

impl CreateDataset {
    pub fn new(name: &str, description: &str, columns: &[Column]) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            schema: Schema::new(columns),
        }
    }
}

/// Request payload for replacing a dataset's column schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDataset {
    pub schema: Schema,
}

impl UpdateDataset {
    pub fn new(columns: &[Column]) -> Self {
        Self {
            schema: Schema::new(columns),
        }
    }
}

/// Dataset description nested in a stream creation request. `columns` is the
/// column count, not the column list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDataSet {
    pub name: String,
    pub description: String,
    pub columns: usize,
    pub schema: Schema,
}

/// Request payload for creating a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStream {
    pub data_set: StreamDataSet,
    pub update_method: UpdateMethod,
}

impl CreateStream {
    pub fn new(
        name: &str,
        description: &str,
        columns: &[Column],
        update_method: UpdateMethod,
    ) -> Self {
        Self {
            data_set: StreamDataSet {
                name: name.to_string(),
                description: description.to_string(),
                columns: columns.len(),
                schema: Schema::new(columns),
            },
            update_method,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_accept_numbers_and_strings() {
        let stream: StreamId = serde_json::from_str("42").unwrap();
        assert_eq!(stream.as_str(), "42");
        let dataset: DatasetId = serde_json::from_str(r#""b4c1-22""#).unwrap();
        assert_eq!(dataset.to_string(), "b4c1-22");
    }

    #[test]
    fn ids_serialize_as_strings() {
        let id = ExecutionId::from(7);
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""7""#);
    }

    #[test]
    fn column_uses_type_key() {
        let json = serde_json::to_value(Column::string("Status")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "STRING", "name": "Status"}));
    }

    #[test]
    fn update_method_defaults_to_append() {
        assert_eq!(UpdateMethod::default(), UpdateMethod::Append);
        assert_eq!(
            serde_json::to_string(&UpdateMethod::Replace).unwrap(),
            r#""REPLACE""#
        );
    }

    #[test]
    fn create_stream_counts_columns() {
        let columns = [Column::string("Status"), Column::new("LONG", "Count")];
        let body = serde_json::to_value(CreateStream::new(
            "Sales",
            "daily",
            &columns,
            UpdateMethod::Append,
        ))
        .unwrap();
        assert_eq!(body["dataSet"]["columns"], 2);
        assert_eq!(body["dataSet"]["schema"]["columns"][1]["name"], "Count");
        assert_eq!(body["updateMethod"], "APPEND");
    }

    #[test]
    fn dataset_keeps_unknown_fields() {
        let raw = r#"{"id":"abc","name":"Test","rows":2,"columns":2,"owner":{"id":1}}"#;
        let dataset: Dataset = serde_json::from_str(raw).unwrap();
        assert_eq!(dataset.rows, Some(2));
        assert!(dataset.schema.is_none());
        assert_eq!(dataset.extra["owner"]["id"], 1);
    }

    #[test]
    fn stream_reads_nested_dataset_id() {
        let raw = r#"{"id":12,"dataSet":{"id":"ds-1","name":"S"},"updateMethod":"REPLACE"}"#;
        let stream: Stream = serde_json::from_str(raw).unwrap();
        assert_eq!(stream.id, StreamId::from(12));
        assert_eq!(stream.data_set.id.as_str(), "ds-1");
        assert_eq!(stream.update_method, Some(UpdateMethod::Replace));
    }

    #[test]
    fn access_token_debug_is_redacted() {
        let token = AccessToken::new("secret-value");
        assert!(!format!("{token:?}").contains("secret-value"));
    }
}
