//! Drift change records

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of schema drift.
///
/// Variant order is the emission order within a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    NewField,
    NewEnumValue,
    RemovedField,
    RemovedEnumValue,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::NewField => "new_field",
            ChangeType::NewEnumValue => "new_enum_value",
            ChangeType::RemovedField => "removed_field",
            ChangeType::RemovedEnumValue => "removed_enum_value",
        }
    }

    /// Removals are recorded only; applying them needs a human.
    pub fn is_removal(&self) -> bool {
        matches!(self, ChangeType::RemovedField | ChangeType::RemovedEnumValue)
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed difference between the declared and the live schema.
///
/// - `new_field`: `new_value` is the live type name
/// - `removed_field`: `old_value` is the declared type name, `new_value` is empty
/// - `new_enum_value`: `new_value` is the added option
/// - `removed_enum_value`: `old_value` is the removed option, `new_value` is empty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub collection: String,
    pub change_type: ChangeType,
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: String,
    pub timestamp: DateTime<Utc>,
    pub run_id: Uuid,
}

impl Change {
    pub(crate) fn new(
        collection: impl Into<String>,
        change_type: ChangeType,
        field_name: impl Into<String>,
        old_value: Option<String>,
        new_value: impl Into<String>,
        timestamp: DateTime<Utc>,
        run_id: Uuid,
    ) -> Self {
        Self {
            collection: collection.into(),
            change_type,
            field_name: field_name.into(),
            old_value,
            new_value: new_value.into(),
            timestamp,
            run_id,
        }
    }

    /// One-line human summary, used in notifications
    pub fn summary(&self) -> String {
        match self.change_type {
            ChangeType::NewField => format!(
                "{}: new field '{}' ({})",
                self.collection, self.field_name, self.new_value
            ),
            ChangeType::NewEnumValue => format!(
                "{}: new option '{}' in '{}'",
                self.collection, self.new_value, self.field_name
            ),
            ChangeType::RemovedField => format!(
                "{}: field '{}' removed",
                self.collection, self.field_name
            ),
            ChangeType::RemovedEnumValue => format!(
                "{}: option '{}' removed from '{}'",
                self.collection,
                self.old_value.as_deref().unwrap_or_default(),
                self.field_name
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emission_order() {
        let mut types = vec![
            ChangeType::RemovedEnumValue,
            ChangeType::RemovedField,
            ChangeType::NewEnumValue,
            ChangeType::NewField,
        ];
        types.sort();
        assert_eq!(
            types,
            vec![
                ChangeType::NewField,
                ChangeType::NewEnumValue,
                ChangeType::RemovedField,
                ChangeType::RemovedEnumValue,
            ]
        );
    }

    #[test]
    fn test_json_form() {
        let change = Change::new(
            "tasks",
            ChangeType::NewEnumValue,
            "Статус",
            None,
            "Blocked",
            Utc::now(),
            Uuid::new_v4(),
        );
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["change_type"], "new_enum_value");
        assert_eq!(json["new_value"], "Blocked");
        assert!(json["old_value"].is_null());
    }

    #[test]
    fn test_summary() {
        let change = Change::new(
            "tasks",
            ChangeType::RemovedEnumValue,
            "Статус",
            Some("Archived".into()),
            "",
            Utc::now(),
            Uuid::new_v4(),
        );
        assert_eq!(change.summary(), "tasks: option 'Archived' removed from 'Статус'");
    }
}
