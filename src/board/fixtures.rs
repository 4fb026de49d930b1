//! Snapshot builders shared by the board tests.

use chrono::{DateTime, NaiveDate, Utc};

use super::types::*;

pub const CLIENT_FIELD: &str = "f-client";
pub const PROJECT_FIELD: &str = "f-project";
pub const MILESTONE_FIELD: &str = "f-milestone";
pub const EFFORT_FIELD: &str = "f-effort";
pub const START_FIELD: &str = "f-start";
pub const END_FIELD: &str = "f-end";

pub const DELIVERABLES_LIST: &str = "l-deliverables";
pub const ADMIN_LIST: &str = "l-admin";
pub const DESIGN_TODO_LIST: &str = "l-dx-todo";
pub const DEV_TODO_LIST: &str = "l-dev-todo";

pub fn option(id: &str, text: &str) -> FieldOption {
    FieldOption {
        id: id.to_string(),
        value: OptionValue {
            text: text.to_string(),
        },
    }
}

pub fn dropdown(id: &str, name: &str, options: Vec<FieldOption>) -> CustomFieldDefinition {
    CustomFieldDefinition {
        id: id.to_string(),
        name: name.to_string(),
        field_type: FieldType::List,
        options,
    }
}

pub fn scalar_field(id: &str, name: &str, field_type: FieldType) -> CustomFieldDefinition {
    CustomFieldDefinition {
        id: id.to_string(),
        name: name.to_string(),
        field_type,
        options: vec![],
    }
}

/// Field definitions used by every fixture board.
pub fn standard_fields() -> Vec<CustomFieldDefinition> {
    vec![
        dropdown(
            CLIENT_FIELD,
            "Client",
            vec![option("o-acme", "Acme"), option("o-globex", "Globex")],
        ),
        dropdown(
            PROJECT_FIELD,
            "Project",
            vec![option("o-site", "Website"), option("o-app", "Mobile App")],
        ),
        scalar_field(MILESTONE_FIELD, "Milestone", FieldType::Text),
        dropdown(
            EFFORT_FIELD,
            "Effort",
            vec![option("o-s", "S"), option("o-m", "M"), option("o-l", "L")],
        ),
        scalar_field(START_FIELD, "Planned Start Date", FieldType::Date),
        scalar_field(END_FIELD, "Planned End Date", FieldType::Date),
    ]
}

pub fn card(id: &str, name: &str, list: &str) -> Card {
    Card {
        id: id.to_string(),
        name: name.to_string(),
        desc: String::new(),
        id_list: list.to_string(),
        due: None,
        due_complete: false,
        closed: false,
        members: vec![],
        labels: vec![],
        custom_field_items: vec![],
    }
}

pub fn with_option(mut card: Card, field_id: &str, option_id: &str) -> Card {
    card.custom_field_items.push(CustomFieldItem {
        custom_field_id: field_id.to_string(),
        value: Some(CustomFieldValue::OptionRef(option_id.to_string())),
    });
    card
}

pub fn with_text(mut card: Card, field_id: &str, text: &str) -> Card {
    card.custom_field_items.push(CustomFieldItem {
        custom_field_id: field_id.to_string(),
        value: Some(CustomFieldValue::InlineText(text.to_string())),
    });
    card
}

pub fn with_date(mut card: Card, field_id: &str, date: &str) -> Card {
    card.custom_field_items.push(CustomFieldItem {
        custom_field_id: field_id.to_string(),
        value: Some(CustomFieldValue::InlineDate(date.to_string())),
    });
    card
}

pub fn with_planned(card: Card, start: &str, end: Option<&str>) -> Card {
    let card = with_date(card, START_FIELD, start);
    match end {
        Some(end) => with_date(card, END_FIELD, end),
        None => card,
    }
}

pub fn with_due(mut card: Card, date: NaiveDate) -> Card {
    card.due = Some(noon_utc(date));
    card
}

pub fn with_member(mut card: Card, full_name: &str, username: &str) -> Card {
    card.members.push(Member {
        id: format!("m-{}", username),
        full_name: full_name.to_string(),
        username: username.to_string(),
    });
    card
}

pub fn noon_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(12, 0, 0)
        .expect("valid time")
        .and_utc()
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid fixture date")
}

pub fn account_board(cards: Vec<Card>) -> SubBoard {
    let data = BoardData {
        lists: vec![
            BoardList {
                id: DELIVERABLES_LIST.to_string(),
                name: "📦 Deliverables".to_string(),
                closed: false,
            },
            BoardList {
                id: ADMIN_LIST.to_string(),
                name: "👥 Account Tasks".to_string(),
                closed: false,
            },
        ],
        cards,
        custom_fields: standard_fields(),
        members: vec![],
        labels: vec![Label {
            id: "lb-urgent".to_string(),
            name: "Urgent".to_string(),
            color: Some("red".to_string()),
        }],
    };
    SubBoard::from_data(BoardKind::AccountManagement, "board-am", data)
}

pub fn todo_list(kind: BoardKind) -> &'static str {
    match kind {
        BoardKind::Development => DEV_TODO_LIST,
        _ => DESIGN_TODO_LIST,
    }
}

pub fn team_board(kind: BoardKind, cards: Vec<Card>) -> SubBoard {
    let data = BoardData {
        lists: vec![
            BoardList {
                id: todo_list(kind).to_string(),
                name: "To Do".to_string(),
                closed: false,
            },
            BoardList {
                id: format!("{}-deliverables", todo_list(kind)),
                name: "Deliverables".to_string(),
                closed: false,
            },
        ],
        cards,
        custom_fields: standard_fields(),
        members: vec![],
        labels: vec![],
    };
    let id = match kind {
        BoardKind::AccountManagement => "board-am",
        BoardKind::DesignUx => "board-dx",
        BoardKind::Development => "board-dev",
    };
    SubBoard::from_data(kind, id, data)
}

pub fn snapshot(account: Vec<Card>, design: Vec<Card>, development: Vec<Card>) -> BoardSnapshot {
    BoardSnapshot {
        account_management: account_board(account),
        design_ux: Some(team_board(BoardKind::DesignUx, design)),
        development: Some(team_board(BoardKind::Development, development)),
    }
}

/// Raw payload a mock API serves for `board`.
pub fn board_data(board: SubBoard) -> BoardData {
    BoardData {
        lists: board.lists,
        cards: board.cards,
        custom_fields: board.custom_fields,
        members: board.members,
        labels: board.labels,
    }
}
