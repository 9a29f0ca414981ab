//! Declared collection schema types
//!
//! Supported field types:
//! - title: the record's display name
//! - text: rich text
//! - number: 64-bit float
//! - date: ISO-8601 date or datetime
//! - single_enum: one option out of an enumerated set (remote `select` and `status`)
//! - multi_enum: any number of options out of an enumerated set (remote `multi_select`)
//! - relation: links to records of another collection
//! - checkbox, url
//! - anything else is kept verbatim as an unknown type and passes through validation

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Field type of a collection property.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    Title,
    Text,
    Number,
    Date,
    SingleEnum,
    MultiEnum,
    Relation,
    Checkbox,
    Url,
    /// Type the engine does not model; carries the remote type name
    Unknown(String),
}

impl FieldType {
    /// Returns the type name used in definition files and messages
    pub fn type_name(&self) -> &str {
        match self {
            FieldType::Title => "title",
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::SingleEnum => "single_enum",
            FieldType::MultiEnum => "multi_enum",
            FieldType::Relation => "relation",
            FieldType::Checkbox => "checkbox",
            FieldType::Url => "url",
            FieldType::Unknown(name) => name,
        }
    }

    /// Whether the field carries an enumerated option set
    pub fn is_enum(&self) -> bool {
        matches!(self, FieldType::SingleEnum | FieldType::MultiEnum)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, FieldType::Unknown(_))
    }
}

impl From<String> for FieldType {
    fn from(name: String) -> Self {
        FieldType::from(name.as_str())
    }
}

impl From<&str> for FieldType {
    /// Accepts both definition-file names and the remote store's native names.
    fn from(name: &str) -> Self {
        match name {
            "title" => FieldType::Title,
            "text" | "rich_text" => FieldType::Text,
            "number" => FieldType::Number,
            "date" => FieldType::Date,
            "single_enum" | "select" | "status" => FieldType::SingleEnum,
            "multi_enum" | "multi_select" => FieldType::MultiEnum,
            "relation" => FieldType::Relation,
            "checkbox" => FieldType::Checkbox,
            "url" => FieldType::Url,
            other => FieldType::Unknown(other.to_string()),
        }
    }
}

impl From<FieldType> for String {
    fn from(field_type: FieldType) -> Self {
        field_type.type_name().to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Declared field definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl FieldSpec {
    pub fn new(field_type: FieldType) -> Self {
        Self { field_type }
    }
}

/// Insertion-ordered set of enum option names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct OptionSet(Vec<String>);

impl OptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, option: &str) -> bool {
        self.0.iter().any(|o| o == option)
    }

    /// Appends `option` unless already present. Returns whether it was added.
    pub fn insert(&mut self, option: impl Into<String>) -> bool {
        let option = option.into();
        if self.contains(&option) {
            return false;
        }
        self.0.push(option);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for OptionSet {
    fn from(options: Vec<String>) -> Self {
        options.into_iter().collect()
    }
}

impl From<OptionSet> for Vec<String> {
    fn from(set: OptionSet) -> Self {
        set.0
    }
}

impl<S: Into<String>> FromIterator<S> for OptionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = OptionSet::new();
        for option in iter {
            set.insert(option);
        }
        set
    }
}

/// Declared schema of one remote collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    /// Application-facing collection name (e.g. "tasks")
    pub name: String,
    /// Remote collection identifier
    pub remote_id: String,
    /// Human-readable display name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub properties: BTreeMap<String, FieldSpec>,
    #[serde(default)]
    pub enumerated_options: BTreeMap<String, OptionSet>,
    /// Relation field name -> target remote collection id
    #[serde(default)]
    pub relations: BTreeMap<String, String>,
}

impl CollectionSchema {
    pub fn new(name: impl Into<String>, remote_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            remote_id: remote_id.into(),
            title: String::new(),
            description: String::new(),
            properties: BTreeMap::new(),
            enumerated_options: BTreeMap::new(),
            relations: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.properties.insert(name.into(), FieldSpec::new(field_type));
        self
    }

    pub fn with_options<S: AsRef<str>>(mut self, field: impl Into<String>, options: &[S]) -> Self {
        let set = options.iter().map(|o| o.as_ref().to_string()).collect();
        self.enumerated_options.insert(field.into(), set);
        self
    }

    pub fn with_relation(mut self, field: impl Into<String>, target: impl Into<String>) -> Self {
        self.relations.insert(field.into(), target.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.properties.get(name)
    }

    /// Declared options of an enum field, empty if none are declared
    pub fn options(&self, field: &str) -> &[String] {
        self.enumerated_options
            .get(field)
            .map(OptionSet::as_slice)
            .unwrap_or(&[])
    }

    /// Validates the definition itself (not a record)
    pub fn validate_structure(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("collection name must not be empty".into());
        }

        if self.remote_id.trim().is_empty() {
            return Err(format!("collection '{}' is missing its remote id", self.name));
        }

        for field in self.enumerated_options.keys() {
            match self.properties.get(field) {
                Some(spec) if spec.field_type.is_enum() => {}
                Some(spec) => {
                    return Err(format!(
                        "collection '{}': options declared for non-enum field '{}' ({})",
                        self.name, field, spec.field_type
                    ))
                }
                None => {
                    return Err(format!(
                        "collection '{}': options declared for undeclared field '{}'",
                        self.name, field
                    ))
                }
            }
        }

        for field in self.relations.keys() {
            match self.properties.get(field) {
                Some(spec) if spec.field_type == FieldType::Relation => {}
                _ => {
                    return Err(format!(
                        "collection '{}': relation target declared for non-relation field '{}'",
                        self.name, field
                    ))
                }
            }
        }

        Ok(())
    }
}
