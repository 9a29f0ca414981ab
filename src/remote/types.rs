//! Shapes exchanged with the remote store

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::schema::{FieldMap, FieldType, FieldValue};

/// Point-in-time shape of a live remote collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    /// Field name -> live type
    pub properties: BTreeMap<String, FieldType>,
    /// Enum field name -> live options, in remote order
    #[serde(default)]
    pub enum_options: BTreeMap<String, Vec<String>>,
}

impl SchemaSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.properties.insert(name.into(), field_type);
        self
    }

    pub fn with_options<S: AsRef<str>>(mut self, field: impl Into<String>, options: &[S]) -> Self {
        self.enum_options.insert(
            field.into(),
            options.iter().map(|o| o.as_ref().to_string()).collect(),
        );
        self
    }

    /// Live options of `field`, empty if the field has none
    pub fn options(&self, field: &str) -> &[String] {
        self.enum_options
            .get(field)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_option(&self, field: &str, option: &str) -> bool {
        self.options(field).iter().any(|o| o == option)
    }
}

/// A record as stored remotely
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub collection_id: String,
    pub fields: FieldMap,
}

/// Query filter understood by every remote store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RecordFilter {
    /// Field equals the value (for multi-valued fields: contains every item)
    Equals { field: String, value: FieldValue },
    /// Every nested filter matches
    And { filters: Vec<RecordFilter> },
}

impl RecordFilter {
    pub fn equals(field: impl Into<String>, value: FieldValue) -> Self {
        RecordFilter::Equals {
            field: field.into(),
            value,
        }
    }

    /// Evaluates the filter locally against a record
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            RecordFilter::Equals { field, value } => match (record.fields.get(field), value) {
                (Some(FieldValue::MultiEnum(have)), FieldValue::MultiEnum(want))
                | (Some(FieldValue::Relation(have)), FieldValue::Relation(want)) => {
                    want.iter().all(|w| have.contains(w))
                }
                (Some(actual), expected) => actual == expected,
                (None, _) => false,
            },
            RecordFilter::And { filters } => filters.iter().all(|f| f.matches(record)),
        }
    }
}
