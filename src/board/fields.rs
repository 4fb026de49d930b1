//! Custom field resolution.
//!
//! `resolve` is the single place that turns a card's stored custom field
//! value into display text, whatever shape the remote API used to store it.

use super::types::{Card, CustomFieldDefinition, CustomFieldValue, FieldType};

/// Field names the dashboard reads.
pub const CLIENT: &str = "Client";
pub const PROJECT: &str = "Project";
pub const MILESTONE: &str = "Milestone";
pub const EFFORT: &str = "Effort";
pub const PLANNED_START: &str = "Planned Start Date";
pub const PLANNED_END: &str = "Planned End Date";

pub fn find_field<'a>(
    definitions: &'a [CustomFieldDefinition],
    name: &str,
) -> Option<&'a CustomFieldDefinition> {
    definitions.iter().find(|d| d.name == name)
}

/// Resolve the display value of `field_name` on `card`.
///
/// Returns an empty string when the board has no such field, the card has no
/// value for it, or a dropdown value references an option that no longer
/// exists.
pub fn resolve(card: &Card, definitions: &[CustomFieldDefinition], field_name: &str) -> String {
    let Some(definition) = find_field(definitions, field_name) else {
        return String::new();
    };
    let Some(item) = card.field_item(&definition.id) else {
        return String::new();
    };

    match &item.value {
        Some(CustomFieldValue::InlineText(text)) => text.clone(),
        Some(CustomFieldValue::InlineDate(date)) => date.clone(),
        Some(CustomFieldValue::InlineScalar(scalar)) => scalar.clone(),
        Some(CustomFieldValue::OptionRef(option_id)) => definition
            .options
            .iter()
            .find(|o| &o.id == option_id)
            .map(|o| o.text().to_string())
            .unwrap_or_default(),
        None => String::new(),
    }
}

/// Display texts of a dropdown field's options, in board order.
pub fn field_options(definitions: &[CustomFieldDefinition], field_name: &str) -> Vec<String> {
    find_field(definitions, field_name)
        .map(|d| {
            d.options
                .iter()
                .map(|o| o.text().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Id of the option whose display text is exactly `text`.
pub fn find_option_id<'a>(definition: &'a CustomFieldDefinition, text: &str) -> Option<&'a str> {
    definition
        .options
        .iter()
        .find(|o| o.text() == text)
        .map(|o| o.id.as_str())
}

/// Build the value to write for `field` from user-facing text.
///
/// Dropdowns are matched by display text; returns `None` when no option
/// matches. An empty string clears the field.
pub fn encode_value(definition: &CustomFieldDefinition, text: &str) -> Option<FieldWrite> {
    if text.is_empty() {
        return Some(FieldWrite::Clear);
    }
    let value = match definition.field_type {
        FieldType::List => CustomFieldValue::OptionRef(find_option_id(definition, text)?.to_string()),
        FieldType::Date => CustomFieldValue::InlineDate(text.to_string()),
        FieldType::Number | FieldType::Checkbox => CustomFieldValue::InlineScalar(text.to_string()),
        FieldType::Text | FieldType::Other => CustomFieldValue::InlineText(text.to_string()),
    };
    Some(FieldWrite::Set(value))
}

/// A single custom field write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldWrite {
    Set(CustomFieldValue),
    Clear,
}

impl FieldWrite {
    /// Request body for `PUT /cards/{id}/customField/{fieldId}/item`.
    pub fn to_body(&self, definition_type: FieldType) -> serde_json::Value {
        match self {
            Self::Set(CustomFieldValue::OptionRef(id)) => serde_json::json!({ "idValue": id }),
            Self::Set(CustomFieldValue::InlineText(text)) => {
                serde_json::json!({ "value": { "text": text } })
            }
            Self::Set(CustomFieldValue::InlineDate(date)) => {
                serde_json::json!({ "value": { "date": date } })
            }
            Self::Set(CustomFieldValue::InlineScalar(scalar)) => {
                if definition_type == FieldType::Checkbox {
                    serde_json::json!({ "value": { "checked": scalar } })
                } else {
                    serde_json::json!({ "value": { "number": scalar } })
                }
            }
            Self::Clear if definition_type == FieldType::List => {
                serde_json::json!({ "idValue": "" })
            }
            Self::Clear => serde_json::json!({ "value": "" }),
        }
    }
}

/// A write addressed to one field of a card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomFieldWrite {
    pub field_id: String,
    pub field_type: FieldType,
    pub write: FieldWrite,
}

impl CustomFieldWrite {
    pub fn new(definition: &CustomFieldDefinition, write: FieldWrite) -> Self {
        Self {
            field_id: definition.id.clone(),
            field_type: definition.field_type,
            write,
        }
    }

    pub fn body(&self) -> serde_json::Value {
        self.write.to_body(self.field_type)
    }

    /// Entry for the bulk `customFieldItems` array.
    pub fn bulk_item(&self) -> serde_json::Value {
        let mut item = self.body();
        if let Some(map) = item.as_object_mut() {
            map.insert(
                "idCustomField".to_string(),
                serde_json::Value::String(self.field_id.clone()),
            );
        }
        item
    }
}
