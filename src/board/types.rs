//! Board snapshot data model.
//!
//! These types double as the deserialisation boundary for the remote API:
//! payload quirks (three shapes of custom field value, optional arrays) are
//! normalised here once so nothing downstream has to sniff JSON shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Boards ───────────────────────────────────────────────────────────

/// The three remote boards the dashboard reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardKind {
    AccountManagement,
    DesignUx,
    Development,
}

impl BoardKind {
    pub const ALL: [BoardKind; 3] = [Self::AccountManagement, Self::DesignUx, Self::Development];

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::AccountManagement => "Account Management",
            Self::DesignUx => "Design/UX",
            Self::Development => "Development",
        }
    }

    /// Short tag shown on cards in cross-board views.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::AccountManagement => "ACCT MGMT",
            Self::DesignUx => "DESIGN/UX",
            Self::Development => "DEV",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardList {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub closed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

// ── Custom fields ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Dropdown; values are references to `options`.
    List,
    Text,
    Date,
    Number,
    Checkbox,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionValue {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldOption {
    pub id: String,
    pub value: OptionValue,
}

impl FieldOption {
    pub fn text(&self) -> &str {
        &self.value.text
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldDefinition {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub options: Vec<FieldOption>,
}

/// A custom field value as stored on a card.
///
/// The remote API uses one endpoint for every field type but three payload
/// shapes: `{"value": {"text": ..}}`, `{"value": {"date"|"number"|"checked": ..}}`
/// and `{"idValue": ..}` for dropdowns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomFieldValue {
    InlineText(String),
    InlineDate(String),
    /// Numbers and checkbox states, kept in their string form.
    InlineScalar(String),
    OptionRef(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawCustomFieldItem", into = "RawCustomFieldItem")]
pub struct CustomFieldItem {
    pub custom_field_id: String,
    pub value: Option<CustomFieldValue>,
}

/// Wire shape of a custom field item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCustomFieldItem {
    id_custom_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<serde_json::Value>,
}

impl From<RawCustomFieldItem> for CustomFieldItem {
    fn from(raw: RawCustomFieldItem) -> Self {
        let value = match (raw.id_value, raw.value) {
            (Some(id), _) if !id.is_empty() => Some(CustomFieldValue::OptionRef(id)),
            (_, Some(value)) => decode_inline_value(&value),
            _ => None,
        };
        Self {
            custom_field_id: raw.id_custom_field,
            value,
        }
    }
}

impl From<CustomFieldItem> for RawCustomFieldItem {
    fn from(item: CustomFieldItem) -> Self {
        let (id_value, value) = match item.value {
            Some(CustomFieldValue::OptionRef(id)) => (Some(id), None),
            Some(CustomFieldValue::InlineText(text)) => {
                (None, Some(serde_json::json!({ "text": text })))
            }
            Some(CustomFieldValue::InlineDate(date)) => {
                (None, Some(serde_json::json!({ "date": date })))
            }
            Some(CustomFieldValue::InlineScalar(scalar)) => {
                let key = if matches!(scalar.as_str(), "true" | "false") {
                    "checked"
                } else {
                    "number"
                };
                (None, Some(serde_json::json!({ key: scalar })))
            }
            None => (None, None),
        };
        Self {
            id_custom_field: item.custom_field_id,
            id_value,
            value,
        }
    }
}

fn decode_inline_value(value: &serde_json::Value) -> Option<CustomFieldValue> {
    use serde_json::Value;

    match value {
        Value::String(s) if !s.is_empty() => Some(CustomFieldValue::InlineText(s.clone())),
        Value::Number(n) => Some(CustomFieldValue::InlineScalar(n.to_string())),
        Value::Bool(b) => Some(CustomFieldValue::InlineScalar(b.to_string())),
        Value::Object(map) => {
            if let Some(text) = map.get("text").and_then(Value::as_str) {
                return Some(CustomFieldValue::InlineText(text.to_string()));
            }
            if let Some(date) = map.get("date").and_then(Value::as_str) {
                return Some(CustomFieldValue::InlineDate(date.to_string()));
            }
            for key in ["number", "checked"] {
                match map.get(key) {
                    Some(Value::String(s)) => return Some(CustomFieldValue::InlineScalar(s.clone())),
                    Some(Value::Number(n)) => {
                        return Some(CustomFieldValue::InlineScalar(n.to_string()));
                    }
                    Some(Value::Bool(b)) => {
                        return Some(CustomFieldValue::InlineScalar(b.to_string()));
                    }
                    _ => {}
                }
            }
            None
        }
        _ => None,
    }
}

// ── Cards ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub desc: String,
    pub id_list: String,
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,
    #[serde(default)]
    pub due_complete: bool,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub custom_field_items: Vec<CustomFieldItem>,
}

impl Card {
    /// Completed cards are either marked done or archived.
    pub fn is_completed(&self) -> bool {
        self.due_complete || self.closed
    }

    pub fn field_item(&self, custom_field_id: &str) -> Option<&CustomFieldItem> {
        self.custom_field_items
            .iter()
            .find(|item| item.custom_field_id == custom_field_id)
    }
}

// ── Snapshot ─────────────────────────────────────────────────────────

/// Everything fetched for one board in one pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardData {
    pub lists: Vec<BoardList>,
    pub cards: Vec<Card>,
    pub custom_fields: Vec<CustomFieldDefinition>,
    pub members: Vec<Member>,
    pub labels: Vec<Label>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubBoard {
    pub kind: BoardKind,
    pub board_id: String,
    pub board_name: String,
    pub board_tag: String,
    pub lists: Vec<BoardList>,
    pub cards: Vec<Card>,
    pub custom_fields: Vec<CustomFieldDefinition>,
    pub members: Vec<Member>,
    pub labels: Vec<Label>,
}

impl SubBoard {
    pub fn from_data(kind: BoardKind, board_id: impl Into<String>, data: BoardData) -> Self {
        Self {
            kind,
            board_id: board_id.into(),
            board_name: kind.display_name().to_string(),
            board_tag: kind.tag().to_string(),
            lists: data.lists,
            cards: data.cards,
            custom_fields: data.custom_fields,
            members: data.members,
            labels: data.labels,
        }
    }

    pub fn list_name(&self, list_id: &str) -> Option<&str> {
        self.lists
            .iter()
            .find(|l| l.id == list_id)
            .map(|l| l.name.as_str())
    }

    pub fn list_by_name(&self, name: &str) -> Option<&BoardList> {
        self.lists.iter().find(|l| l.name == name)
    }

    pub fn has_list(&self, list_id: &str) -> bool {
        self.lists.iter().any(|l| l.id == list_id)
    }

    pub fn card(&self, card_id: &str) -> Option<&Card> {
        self.cards.iter().find(|c| c.id == card_id)
    }

    pub fn field(&self, name: &str) -> Option<&CustomFieldDefinition> {
        self.custom_fields.iter().find(|f| f.name == name)
    }
}

/// Immutable result of one fetch across all configured boards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSnapshot {
    pub account_management: SubBoard,
    pub design_ux: Option<SubBoard>,
    pub development: Option<SubBoard>,
}

impl BoardSnapshot {
    pub fn board(&self, kind: BoardKind) -> Option<&SubBoard> {
        match kind {
            BoardKind::AccountManagement => Some(&self.account_management),
            BoardKind::DesignUx => self.design_ux.as_ref(),
            BoardKind::Development => self.development.as_ref(),
        }
    }

    /// All present sub-boards in a fixed order.
    pub fn boards(&self) -> impl Iterator<Item = &SubBoard> {
        std::iter::once(&self.account_management)
            .chain(self.design_ux.iter())
            .chain(self.development.iter())
    }

    /// The design/UX and development boards, where task work lives.
    pub fn team_boards(&self) -> impl Iterator<Item = &SubBoard> {
        self.design_ux.iter().chain(self.development.iter())
    }

    pub fn find_card(&self, card_id: &str) -> Option<(&SubBoard, &Card)> {
        self.boards()
            .find_map(|board| board.card(card_id).map(|card| (board, card)))
    }

    pub fn board_for_list(&self, list_id: &str) -> Option<&SubBoard> {
        self.boards().find(|board| board.has_list(list_id))
    }

    pub fn card_count(&self) -> usize {
        self.boards().map(|b| b.cards.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropdown_item_decodes_to_option_ref() {
        let json = r#"{"id":"i1","idCustomField":"f1","idValue":"o1"}"#;
        let item: CustomFieldItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.custom_field_id, "f1");
        assert_eq!(item.value, Some(CustomFieldValue::OptionRef("o1".into())));
    }

    #[test]
    fn test_text_item_decodes_to_inline_text() {
        let json = r#"{"idCustomField":"f2","value":{"text":"Acme"}}"#;
        let item: CustomFieldItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.value, Some(CustomFieldValue::InlineText("Acme".into())));
    }

    #[test]
    fn test_date_item_decodes_to_inline_date() {
        let json = r#"{"idCustomField":"f3","value":{"date":"2025-10-13T00:00:00.000Z"}}"#;
        let item: CustomFieldItem = serde_json::from_str(json).unwrap();
        assert_eq!(
            item.value,
            Some(CustomFieldValue::InlineDate("2025-10-13T00:00:00.000Z".into()))
        );
    }

    #[test]
    fn test_number_and_checkbox_items_decode_to_scalar() {
        let number: CustomFieldItem =
            serde_json::from_str(r#"{"idCustomField":"f4","value":{"number":"3"}}"#).unwrap();
        assert_eq!(number.value, Some(CustomFieldValue::InlineScalar("3".into())));

        let checked: CustomFieldItem =
            serde_json::from_str(r#"{"idCustomField":"f5","value":{"checked":"true"}}"#).unwrap();
        assert_eq!(checked.value, Some(CustomFieldValue::InlineScalar("true".into())));
    }

    #[test]
    fn test_scalar_items_reserialize_under_their_own_key() {
        let checked: CustomFieldItem =
            serde_json::from_str(r#"{"idCustomField":"f5","value":{"checked":"false"}}"#).unwrap();
        let json = serde_json::to_value(&checked).unwrap();
        assert_eq!(json["value"]["checked"], "false");
        assert!(json["value"].get("number").is_none());

        let number: CustomFieldItem =
            serde_json::from_str(r#"{"idCustomField":"f4","value":{"number":"3"}}"#).unwrap();
        let json = serde_json::to_value(&number).unwrap();
        assert_eq!(json["value"]["number"], "3");
    }

    #[test]
    fn test_bare_string_value_decodes_to_inline_text() {
        let item: CustomFieldItem =
            serde_json::from_str(r#"{"idCustomField":"f6","value":"Legacy"}"#).unwrap();
        assert_eq!(item.value, Some(CustomFieldValue::InlineText("Legacy".into())));
    }

    #[test]
    fn test_cleared_item_has_no_value() {
        let item: CustomFieldItem =
            serde_json::from_str(r#"{"idCustomField":"f7","value":null}"#).unwrap();
        assert!(item.value.is_none());
    }

    #[test]
    fn test_item_serializes_back_to_wire_shape() {
        let item = CustomFieldItem {
            custom_field_id: "f1".into(),
            value: Some(CustomFieldValue::OptionRef("o9".into())),
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["idCustomField"], "f1");
        assert_eq!(json["idValue"], "o9");
        assert!(json.get("value").is_none());
    }

    #[test]
    fn test_card_deserializes_with_defaults() {
        let json = r#"{
            "id": "c1",
            "name": "Homepage copy",
            "idList": "l1",
            "due": "2025-10-10T17:00:00.000Z",
            "members": [{"id": "m1", "fullName": "Dana Reyes", "username": "dana"}]
        }"#;
        let card: Card = serde_json::from_str(json).unwrap();
        assert_eq!(card.id_list, "l1");
        assert!(card.due.is_some());
        assert!(!card.due_complete);
        assert!(!card.closed);
        assert!(card.labels.is_empty());
        assert!(card.custom_field_items.is_empty());
        assert_eq!(card.members[0].full_name, "Dana Reyes");
    }

    #[test]
    fn test_custom_field_definition_with_unknown_type() {
        let json = r#"{"id":"f1","name":"Rating","type":"stars"}"#;
        let def: CustomFieldDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.field_type, FieldType::Other);
        assert!(def.options.is_empty());
    }

    #[test]
    fn test_snapshot_lookups_span_boards() {
        let mut design = BoardData::default();
        design.lists.push(BoardList {
            id: "dl1".into(),
            name: "In Progress".into(),
            closed: false,
        });
        design.cards.push(Card {
            id: "dc1".into(),
            name: "Wireframes".into(),
            desc: String::new(),
            id_list: "dl1".into(),
            due: None,
            due_complete: false,
            closed: false,
            members: vec![],
            labels: vec![],
            custom_field_items: vec![],
        });
        let snapshot = BoardSnapshot {
            account_management: SubBoard::from_data(
                BoardKind::AccountManagement,
                "am",
                BoardData::default(),
            ),
            design_ux: Some(SubBoard::from_data(BoardKind::DesignUx, "dx", design)),
            development: None,
        };

        let (board, card) = snapshot.find_card("dc1").unwrap();
        assert_eq!(board.kind, BoardKind::DesignUx);
        assert_eq!(card.name, "Wireframes");
        assert_eq!(snapshot.board_for_list("dl1").unwrap().board_id, "dx");
        assert_eq!(snapshot.boards().count(), 2);
        assert_eq!(snapshot.team_boards().count(), 1);
        assert_eq!(snapshot.card_count(), 1);
        assert_eq!(board.board_tag, "DESIGN/UX");
    }
}
