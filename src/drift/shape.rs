//! Normalized schema shapes and their diff

use std::collections::BTreeMap;

use crate::remote::SchemaSnapshot;
use crate::schema::CollectionSchema;

use super::change::ChangeType;

/// `{field -> type name}` plus `{enum field -> options}`, options in list order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaShape {
    pub fields: BTreeMap<String, String>,
    pub enum_options: BTreeMap<String, Vec<String>>,
}

/// A difference before it is stamped with collection, time and run id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeDiff {
    pub change_type: ChangeType,
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: String,
}

impl SchemaShape {
    pub fn from_snapshot(snapshot: &SchemaSnapshot) -> Self {
        let fields = snapshot
            .properties
            .iter()
            .map(|(name, t)| (name.clone(), t.type_name().to_string()))
            .collect();
        let enum_options = snapshot
            .properties
            .iter()
            .filter(|(_, t)| t.is_enum())
            .map(|(name, _)| (name.clone(), snapshot.options(name).to_vec()))
            .collect();
        Self {
            fields,
            enum_options,
        }
    }

    /// Every declared enum field is present, with no options if none are declared.
    pub fn from_collection(collection: &CollectionSchema) -> Self {
        let fields = collection
            .properties
            .iter()
            .map(|(name, spec)| (name.clone(), spec.field_type.type_name().to_string()))
            .collect();
        let enum_options = collection
            .properties
            .iter()
            .filter(|(_, spec)| spec.field_type.is_enum())
            .map(|(name, _)| (name.clone(), collection.options(name).to_vec()))
            .collect();
        Self {
            fields,
            enum_options,
        }
    }

    /// Differences from `self` (declared) to `live`, in emission order.
    pub fn diff(&self, live: &SchemaShape) -> Vec<ShapeDiff> {
        let mut out = Vec::new();

        for (name, live_type) in &live.fields {
            if !self.fields.contains_key(name) {
                out.push(ShapeDiff {
                    change_type: ChangeType::NewField,
                    field_name: name.clone(),
                    old_value: None,
                    new_value: live_type.clone(),
                });
            }
        }

        for (field, live_options) in &live.enum_options {
            if let Some(stored) = self.enum_options.get(field) {
                for option in live_options.iter().filter(|o| !stored.contains(o)) {
                    out.push(ShapeDiff {
                        change_type: ChangeType::NewEnumValue,
                        field_name: field.clone(),
                        old_value: None,
                        new_value: option.clone(),
                    });
                }
            }
        }

        for (name, stored_type) in &self.fields {
            if !live.fields.contains_key(name) {
                out.push(ShapeDiff {
                    change_type: ChangeType::RemovedField,
                    field_name: name.clone(),
                    old_value: Some(stored_type.clone()),
                    new_value: String::new(),
                });
            }
        }

        for (field, stored_options) in &self.enum_options {
            if let Some(live_options) = live.enum_options.get(field) {
                for option in stored_options.iter().filter(|o| !live_options.contains(o)) {
                    out.push(ShapeDiff {
                        change_type: ChangeType::RemovedEnumValue,
                        field_name: field.clone(),
                        old_value: Some(option.clone()),
                        new_value: String::new(),
                    });
                }
            }
        }

        out
    }
}
