//! Typed field values submitted to and read back from the remote store

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::FieldType;

/// Field name -> value, ordered for deterministic iteration
pub type FieldMap = BTreeMap<String, FieldValue>;

/// A field value, one variant per declared field type.
///
/// JSON form is `{"type": "<variant>", "value": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Title(String),
    Text(String),
    Number(Option<f64>),
    /// ISO-8601 date or datetime
    Date(Option<String>),
    SingleEnum(Option<String>),
    MultiEnum(Vec<String>),
    /// Target record ids
    Relation(Vec<String>),
    Checkbox(bool),
    Url(Option<String>),
    /// Untyped payload for fields of unknown type
    Raw(serde_json::Value),
}

impl FieldValue {
    pub fn title(text: impl Into<String>) -> Self {
        FieldValue::Title(text.into())
    }

    pub fn text(text: impl Into<String>) -> Self {
        FieldValue::Text(text.into())
    }

    pub fn select(option: impl Into<String>) -> Self {
        FieldValue::SingleEnum(Some(option.into()))
    }

    pub fn multi_select<S: AsRef<str>>(options: &[S]) -> Self {
        FieldValue::MultiEnum(options.iter().map(|o| o.as_ref().to_string()).collect())
    }

    /// Variant name, matching [`FieldType::type_name`] for modelled types
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Title(_) => "title",
            FieldValue::Text(_) => "text",
            FieldValue::Number(_) => "number",
            FieldValue::Date(_) => "date",
            FieldValue::SingleEnum(_) => "single_enum",
            FieldValue::MultiEnum(_) => "multi_enum",
            FieldValue::Relation(_) => "relation",
            FieldValue::Checkbox(_) => "checkbox",
            FieldValue::Url(_) => "url",
            FieldValue::Raw(_) => "raw",
        }
    }

    /// Whether this value can be stored in a field of `field_type`.
    ///
    /// Unknown field types accept anything; a raw value is only accepted by
    /// unknown field types.
    pub fn is_compatible_with(&self, field_type: &FieldType) -> bool {
        match (field_type, self) {
            (FieldType::Unknown(_), _) => true,
            (FieldType::Title, FieldValue::Title(_))
            | (FieldType::Text, FieldValue::Text(_))
            | (FieldType::Number, FieldValue::Number(_))
            | (FieldType::Date, FieldValue::Date(_))
            | (FieldType::SingleEnum, FieldValue::SingleEnum(_))
            | (FieldType::MultiEnum, FieldValue::MultiEnum(_))
            | (FieldType::Relation, FieldValue::Relation(_))
            | (FieldType::Checkbox, FieldValue::Checkbox(_))
            | (FieldType::Url, FieldValue::Url(_)) => true,
            _ => false,
        }
    }

    /// Enum option names carried by this value
    pub fn enum_values(&self) -> Vec<&str> {
        match self {
            FieldValue::SingleEnum(Some(option)) => vec![option.as_str()],
            FieldValue::MultiEnum(options) => options.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Type-aware emptiness: blank text, null select/number/date/url and
    /// empty lists are empty; a checkbox never is.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Title(text) | FieldValue::Text(text) => text.trim().is_empty(),
            FieldValue::Number(n) => n.is_none(),
            FieldValue::Date(d) | FieldValue::Url(d) => {
                d.as_deref().map_or(true, |s| s.trim().is_empty())
            }
            FieldValue::SingleEnum(option) => option.is_none(),
            FieldValue::MultiEnum(items) | FieldValue::Relation(items) => items.is_empty(),
            FieldValue::Checkbox(_) => false,
            FieldValue::Raw(value) => match value {
                serde_json::Value::Null => true,
                serde_json::Value::String(s) => s.is_empty(),
                serde_json::Value::Array(items) => items.is_empty(),
                serde_json::Value::Object(map) => map.is_empty(),
                _ => false,
            },
        }
    }

    /// The empty value of the same variant
    pub fn cleared(&self) -> Self {
        match self {
            FieldValue::Title(_) => FieldValue::Title(String::new()),
            FieldValue::Text(_) => FieldValue::Text(String::new()),
            FieldValue::Number(_) => FieldValue::Number(None),
            FieldValue::Date(_) => FieldValue::Date(None),
            FieldValue::SingleEnum(_) => FieldValue::SingleEnum(None),
            FieldValue::MultiEnum(_) => FieldValue::MultiEnum(Vec::new()),
            FieldValue::Relation(_) => FieldValue::Relation(Vec::new()),
            FieldValue::Checkbox(_) => FieldValue::Checkbox(false),
            FieldValue::Url(_) => FieldValue::Url(None),
            FieldValue::Raw(_) => FieldValue::Raw(serde_json::Value::Null),
        }
    }
}
