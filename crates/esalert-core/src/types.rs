//! Alert payload types: fields, records and the alert itself.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::traits::AlertMethod;

/// One aggregation bucket reduced to its key and document count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub key: String,
    #[serde(rename = "doc_count")]
    pub count: i64,
}

impl Field {
    /// A field is only attached to a record when it has a key and a positive count.
    pub fn is_valid(&self) -> bool {
        !self.key.is_empty() && self.count > 0
    }
}

/// One content unit of an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Record {
    /// Buckets found under a filter path.
    Fields { filter: String, fields: Vec<Field> },
    /// Rendered hit documents found under the body field path.
    Body { filter: String, text: String },
}

impl Record {
    /// Path this record was extracted from.
    pub fn filter(&self) -> &str {
        match self {
            Record::Fields { filter, .. } | Record::Body { filter, .. } => filter,
        }
    }

    /// Whether this record carries free text rather than fields.
    pub fn is_body(&self) -> bool {
        matches!(self, Record::Body { .. })
    }
}

/// One firing of a rule, ready to be fanned out to its delivery methods.
#[derive(Clone)]
pub struct Alert {
    /// Unique per firing.
    pub id: String,
    pub rule_name: String,
    pub methods: Vec<Arc<dyn AlertMethod>>,
    pub records: Vec<Record>,
}

impl std::fmt::Debug for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let methods: Vec<&str> = self.methods.iter().map(|m| m.name()).collect();
        f.debug_struct("Alert")
            .field("id", &self.id)
            .field("rule_name", &self.rule_name)
            .field("methods", &methods)
            .field("records", &self.records)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_validity() {
        assert!(Field { key: "x".into(), count: 1 }.is_valid());
        assert!(!Field { key: String::new(), count: 4 }.is_valid());
        assert!(!Field { key: "x".into(), count: 0 }.is_valid());
        assert!(!Field { key: "x".into(), count: -2 }.is_valid());
    }

    #[test]
    fn test_record_serialization_shapes() {
        let fields = Record::Fields {
            filter: "agg.buckets".into(),
            fields: vec![Field { key: "x".into(), count: 5 }],
        };
        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(json["filter"], "agg.buckets");
        assert_eq!(json["fields"][0]["doc_count"], 5);
        assert!(json.get("text").is_none());

        let body = Record::Body {
            filter: "hits.hits._source".into(),
            text: "{}".into(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["text"], "{}");
        assert!(body.is_body());
        assert!(!fields.is_body());
    }
}
