//! View models derived from a board snapshot.
//!
//! Everything here is a pure projection: same snapshot in, same structures
//! out. Nothing is cached; callers rebuild on every snapshot refresh.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::dates::{WeekWindow, local_due_date, parse_planned_date};
use super::fields::{self, CLIENT, EFFORT, MILESTONE, PLANNED_END, PLANNED_START, PROJECT};
use super::types::{BoardKind, BoardSnapshot, Card, Label, Member, SubBoard};
use super::weekly::{self, Placement};

pub const UNASSIGNED: &str = "Unassigned";

/// Deliverables due within this many days show in a client's upcoming list.
pub const UPCOMING_DAYS: i64 = 14;

// ── List roles ───────────────────────────────────────────────────────

/// Exact list names that give a list its meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListRoles {
    /// Client deliverables on the account management board.
    pub deliverables: String,
    /// Admin tasks on the account management board.
    pub admin_tasks: String,
    /// Deliverable mirror list on the design/UX and development boards.
    pub team_deliverables: String,
}

impl Default for ListRoles {
    fn default() -> Self {
        Self {
            deliverables: "📦 Deliverables".to_string(),
            admin_tasks: "👥 Account Tasks".to_string(),
            team_deliverables: "Deliverables".to_string(),
        }
    }
}

// ── Enhanced card ────────────────────────────────────────────────────

/// A card with its custom fields resolved for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedCard {
    pub id: String,
    pub name: String,
    pub desc: String,
    pub list_id: String,
    pub list_name: String,
    pub board: BoardKind,
    pub board_tag: String,
    pub client: String,
    pub project: String,
    pub milestone: String,
    pub effort: String,
    pub assignee: String,
    pub members: Vec<Member>,
    pub labels: Vec<Label>,
    pub due: Option<DateTime<Utc>>,
    /// Due date in the configured local calendar.
    pub due_date: Option<NaiveDate>,
    pub due_complete: bool,
    pub closed: bool,
    pub planned_start: Option<NaiveDate>,
    pub planned_end: Option<NaiveDate>,
}

impl EnhancedCard {
    pub fn from_card(board: &SubBoard, card: &Card, offset: FixedOffset) -> Self {
        let resolve = |name: &str| fields::resolve(card, &board.custom_fields, name);
        let assignee = card
            .members
            .first()
            .map(|m| m.full_name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| UNASSIGNED.to_string());

        Self {
            id: card.id.clone(),
            name: card.name.clone(),
            desc: card.desc.clone(),
            list_id: card.id_list.clone(),
            list_name: board.list_name(&card.id_list).unwrap_or_default().to_string(),
            board: board.kind,
            board_tag: board.board_tag.clone(),
            client: resolve(CLIENT),
            project: resolve(PROJECT),
            milestone: resolve(MILESTONE),
            effort: resolve(EFFORT),
            assignee,
            members: card.members.clone(),
            labels: card.labels.clone(),
            due: card.due,
            due_date: card.due.map(|due| local_due_date(due, offset)),
            due_complete: card.due_complete,
            closed: card.closed,
            planned_start: parse_planned_date(&resolve(PLANNED_START)),
            planned_end: parse_planned_date(&resolve(PLANNED_END)),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.due_complete || self.closed
    }

    fn client_or_unassigned(&self) -> &str {
        if self.client.is_empty() {
            UNASSIGNED
        } else {
            &self.client
        }
    }
}

// ── Client grouping ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientGroup {
    pub name: String,
    pub deliverables: Vec<EnhancedCard>,
    pub admin_tasks: Vec<EnhancedCard>,
}

impl ClientGroup {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            deliverables: Vec::new(),
            admin_tasks: Vec::new(),
        }
    }
}

enum ListRole {
    Deliverable,
    AdminTask,
}

fn account_list_role(roles: &ListRoles, list_name: &str) -> Option<ListRole> {
    if list_name == roles.deliverables {
        Some(ListRole::Deliverable)
    } else if list_name == roles.admin_tasks {
        Some(ListRole::AdminTask)
    } else {
        None
    }
}

/// Group the account management board's cards by resolved client, in the
/// order clients are first seen. Cards on other lists are ignored.
pub fn group_clients(board: &SubBoard, roles: &ListRoles, offset: FixedOffset) -> Vec<ClientGroup> {
    let mut groups: Vec<ClientGroup> = Vec::new();

    for card in &board.cards {
        let Some(list_name) = board.list_name(&card.id_list) else {
            continue;
        };
        let Some(role) = account_list_role(roles, list_name) else {
            continue;
        };
        let enhanced = EnhancedCard::from_card(board, card, offset);
        let name = enhanced.client_or_unassigned().to_string();

        let index = match groups.iter().position(|g| g.name == name) {
            Some(i) => i,
            None => {
                groups.push(ClientGroup::new(&name));
                groups.len() - 1
            }
        };
        match role {
            ListRole::Deliverable => groups[index].deliverables.push(enhanced),
            ListRole::AdminTask => groups[index].admin_tasks.push(enhanced),
        }
    }

    groups
}

/// The group for a single client. Empty when the client has no cards.
pub fn client_detail(
    board: &SubBoard,
    roles: &ListRoles,
    client: &str,
    offset: FixedOffset,
) -> ClientGroup {
    group_clients(board, roles, offset)
        .into_iter()
        .find(|g| g.name == client)
        .unwrap_or_else(|| ClientGroup::new(client))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDeliverables {
    pub project: String,
    pub deliverables: Vec<EnhancedCard>,
}

/// Deliverables that are overdue or due within [`UPCOMING_DAYS`], grouped
/// by project in first-seen order. Undated deliverables are left out.
pub fn upcoming_by_project(group: &ClientGroup, today: NaiveDate) -> Vec<ProjectDeliverables> {
    let horizon = today + Duration::days(UPCOMING_DAYS);
    let mut projects: Vec<ProjectDeliverables> = Vec::new();

    for card in &group.deliverables {
        if !card.due_date.is_some_and(|d| d <= horizon) {
            continue;
        }
        let project = if card.project.is_empty() {
            UNASSIGNED
        } else {
            card.project.as_str()
        };
        match projects.iter_mut().find(|p| p.project == project) {
            Some(entry) => entry.deliverables.push(card.clone()),
            None => projects.push(ProjectDeliverables {
                project: project.to_string(),
                deliverables: vec![card.clone()],
            }),
        }
    }

    projects
}

// ── Task lists ───────────────────────────────────────────────────────

/// Open design/UX and development cards that are neither overdue nor
/// scheduled into the current week.
pub fn unplanned_tasks(
    snapshot: &BoardSnapshot,
    today: NaiveDate,
    offset: FixedOffset,
) -> Vec<EnhancedCard> {
    let window = WeekWindow::containing(today);
    snapshot
        .team_boards()
        .flat_map(|board| board.cards.iter().map(move |card| (board, card)))
        .filter(|(_, card)| !card.is_completed())
        .map(|(board, card)| EnhancedCard::from_card(board, card, offset))
        .filter(|card| matches!(weekly::classify(card, &window), Placement::Unplanned))
        .collect()
}

/// Who the assigned-task view is for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub id: String,
    pub full_name: String,
    pub username: String,
}

impl UserIdentity {
    fn matches(&self, member: &Member) -> bool {
        (!self.id.is_empty() && member.id == self.id)
            || (!self.full_name.is_empty() && member.full_name == self.full_name)
            || (!self.username.is_empty() && member.username == self.username)
    }
}

/// Cards assigned to `user` across all boards. Account management cards
/// count only on the admin task list; team board cards are excluded from
/// the deliverables mirror list.
pub fn assigned_tasks(
    snapshot: &BoardSnapshot,
    user: &UserIdentity,
    roles: &ListRoles,
    offset: FixedOffset,
) -> Vec<EnhancedCard> {
    let mut out = Vec::new();
    for board in snapshot.boards() {
        for card in &board.cards {
            if !card.members.iter().any(|m| user.matches(m)) {
                continue;
            }
            let list_name = board.list_name(&card.id_list).unwrap_or_default();
            let keep = match board.kind {
                BoardKind::AccountManagement => list_name == roles.admin_tasks,
                BoardKind::DesignUx | BoardKind::Development => {
                    list_name != roles.team_deliverables
                }
            };
            if keep {
                out.push(EnhancedCard::from_card(board, card, offset));
            }
        }
    }
    out
}

/// Every card of one board, enhanced.
pub fn board_cards(board: &SubBoard, offset: FixedOffset) -> Vec<EnhancedCard> {
    board
        .cards
        .iter()
        .map(|card| EnhancedCard::from_card(board, card, offset))
        .collect()
}

// ── Filters ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Open,
    Completed,
    All,
}

impl TaskStatus {
    pub fn matches(&self, card: &EnhancedCard) -> bool {
        match self {
            Self::Open => !card.is_completed(),
            Self::Completed => card.is_completed(),
            Self::All => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskFilter {
    /// Case-insensitive match on card name or assignee.
    pub search: Option<String>,
    pub client: Option<String>,
    pub project: Option<String>,
    pub list_name: Option<String>,
    pub status: TaskStatus,
}

impl TaskFilter {
    pub fn matches(&self, card: &EnhancedCard) -> bool {
        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            let in_name = card.name.to_lowercase().contains(&needle);
            let in_assignee = card
                .members
                .first()
                .is_some_and(|m| m.full_name.to_lowercase().contains(&needle));
            if !in_name && !in_assignee {
                return false;
            }
        }
        if let Some(client) = self.client.as_deref().filter(|s| !s.is_empty())
            && card.client != client
        {
            return false;
        }
        if let Some(project) = self.project.as_deref().filter(|s| !s.is_empty())
            && card.project != project
        {
            return false;
        }
        if let Some(list) = self.list_name.as_deref().filter(|s| !s.is_empty())
            && card.list_name != list
        {
            return false;
        }
        self.status.matches(card)
    }

    pub fn apply(&self, cards: Vec<EnhancedCard>) -> Vec<EnhancedCard> {
        cards.into_iter().filter(|c| self.matches(c)).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    pub clients: Vec<String>,
    pub projects: Vec<String>,
}

fn push_unique(values: &mut Vec<String>, value: &str) {
    if !value.is_empty() && !values.iter().any(|v| v == value) {
        values.push(value.to_string());
    }
}

/// Distinct non-empty clients and projects among `cards`, sorted.
pub fn filter_options(cards: &[EnhancedCard]) -> FilterOptions {
    let mut options = FilterOptions::default();
    for card in cards {
        push_unique(&mut options.clients, &card.client);
        push_unique(&mut options.projects, &card.project);
    }
    options.clients.sort();
    options.projects.sort();
    options
}

/// Dropdown choices for Client and Project across all boards, in board
/// order with duplicates removed.
pub fn field_choices(snapshot: &BoardSnapshot) -> FilterOptions {
    let mut options = FilterOptions::default();
    for board in snapshot.boards() {
        for client in fields::field_options(&board.custom_fields, CLIENT) {
            push_unique(&mut options.clients, &client);
        }
        for project in fields::field_options(&board.custom_fields, PROJECT) {
            push_unique(&mut options.projects, &project);
        }
    }
    options
}

// ── Sorting ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    Title,
    Due,
    Client,
    Project,
    Status,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

fn status_label<'a>(card: &'a EnhancedCard, roles: &ListRoles) -> &'a str {
    if card.is_completed() {
        "Completed"
    } else if card.list_name == roles.admin_tasks {
        "Open"
    } else if card.list_name.is_empty() {
        "Unknown"
    } else {
        &card.list_name
    }
}

/// Stable sort. Undated cards sort after dated ones when ascending by due.
pub fn sort_cards(
    cards: &mut [EnhancedCard],
    field: SortField,
    direction: SortDirection,
    roles: &ListRoles,
) {
    cards.sort_by(|a, b| {
        let ordering = match field {
            SortField::Title => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortField::Due => match (a.due, b.due) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
            SortField::Client => a.client_or_unassigned().cmp(b.client_or_unassigned()),
            SortField::Project => project_or_none(a).cmp(project_or_none(b)),
            SortField::Status => status_label(a, roles).cmp(status_label(b, roles)),
        };
        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

fn project_or_none(card: &EnhancedCard) -> &str {
    if card.project.is_empty() {
        "No Project"
    } else {
        &card.project
    }
}
