//! Multi-step writes against the remote boards.
//!
//! Sequences here are not transactional. When a step fails after a card was
//! created, the card stays and the error names the card and the failed step
//! so the caller can retry just that step. Every completed or partially
//! completed write invalidates the snapshot cache.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::cache::SnapshotCache;
use super::client::{BoardApi, CardUpdate, NewCard};
use super::dates::{
    WeekWindow, format_date, local_due_date, local_noon_utc, parse_planned_date, planned_range,
};
use super::fields::{self, CustomFieldWrite, FieldWrite, PLANNED_END, PLANNED_START};
use super::types::{BoardKind, BoardSnapshot, Card, CustomFieldValue, FieldType, SubBoard};
use super::views::{EnhancedCard, ListRoles};
use crate::errors::{BoardApiError, MutationError, MutationStep};

/// Completed cards whose due date is at least this old get archived.
pub const AUTO_ARCHIVE_AFTER_DAYS: i64 = 7;

// ── Requests ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAssignment {
    pub field: String,
    pub value: String,
}

impl FieldAssignment {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// A card to create together with its custom fields.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CardDraft {
    pub list_id: String,
    pub name: String,
    pub desc: Option<String>,
    pub due: Option<DateTime<Utc>>,
    pub member_ids: Vec<String>,
    /// Board member to assign, by full name.
    pub assignee: Option<String>,
    /// Applied in order after the card exists. Empty values are skipped.
    pub fields: Vec<FieldAssignment>,
    pub label_id: Option<String>,
}

/// Card property changes plus custom field values. An empty field value
/// clears the field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CardEdit {
    #[serde(flatten)]
    pub update: CardUpdate,
    pub fields: Vec<FieldAssignment>,
}

/// Which part of a planned range a drag moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DragEdge {
    Start,
    End,
    /// The whole task; the range keeps its length.
    Move,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    pub updated: Vec<String>,
    pub failed: Vec<MaintenanceFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceFailure {
    pub card_id: String,
    pub error: String,
}

// ── Project wizard ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WizardItem {
    pub name: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectWizard {
    pub client_name: String,
    pub project_type: String,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub deliverables: Vec<WizardItem>,
    pub milestones: Vec<WizardItem>,
}

/// Row for the relational `projects` table.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProject {
    pub name: String,
    pub client_name: String,
    pub project_type: String,
    pub description: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectCreated {
    pub project_id: i64,
    pub card_ids: Vec<String>,
    pub milestone_ids: Vec<i64>,
}

/// Where wizard projects and their milestones are stored.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn insert_project(&self, project: NewProject) -> anyhow::Result<i64>;

    async fn insert_milestone(
        &self,
        project_id: i64,
        name: String,
        end_date: Option<NaiveDate>,
    ) -> anyhow::Result<i64>;
}

// ── Pure helpers ─────────────────────────────────────────────────────

/// New planned range after dragging `edge` onto `target`.
///
/// Returns `None` when resizing a card that has no planned range. Moving
/// an unplanned card schedules it as a single day.
pub fn compute_range(
    current: Option<(NaiveDate, NaiveDate)>,
    target: NaiveDate,
    edge: DragEdge,
) -> Option<PlannedRange> {
    let (start, end) = match (edge, current) {
        (DragEdge::Move, Some((start, end))) => (target, target + (end - start)),
        (DragEdge::Move, None) => (target, target),
        (DragEdge::Start, Some((_, end))) => (target.min(end), end),
        (DragEdge::End, Some((start, _))) => (start, target.max(start)),
        (DragEdge::Start | DragEdge::End, None) => return None,
    };
    Some(PlannedRange { start, end })
}

/// Resolve a drop target: a `YYYY-MM-DD` date or a day name in the week
/// containing `today`.
pub fn resolve_target(target: &str, today: NaiveDate) -> Option<NaiveDate> {
    parse_planned_date(target).or_else(|| WeekWindow::containing(today).date_for_day(target))
}

fn resolve_writes(
    board: &SubBoard,
    assignments: &[FieldAssignment],
    skip_empty: bool,
) -> Result<Vec<(String, CustomFieldWrite)>, MutationError> {
    let mut writes = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        let value = assignment.value.trim();
        if skip_empty && value.is_empty() {
            continue;
        }
        let definition = board
            .field(&assignment.field)
            .ok_or_else(|| MutationError::UnknownField {
                field: assignment.field.clone(),
            })?;
        let write = fields::encode_value(definition, value).ok_or_else(|| {
            MutationError::UnknownOption {
                field: assignment.field.clone(),
                value: value.to_string(),
            }
        })?;
        writes.push((
            assignment.field.clone(),
            CustomFieldWrite::new(definition, write),
        ));
    }
    Ok(writes)
}

fn date_write(board: &SubBoard, field: &str, date: NaiveDate) -> Result<CustomFieldWrite, MutationError> {
    let definition = board.field(field).ok_or_else(|| MutationError::UnknownField {
        field: field.to_string(),
    })?;
    Ok(CustomFieldWrite::new(
        definition,
        FieldWrite::Set(CustomFieldValue::InlineDate(format_date(date))),
    ))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// ── Orchestrator ─────────────────────────────────────────────────────

pub struct MutationOrchestrator {
    api: Arc<dyn BoardApi>,
    cache: SnapshotCache,
    roles: ListRoles,
    offset: FixedOffset,
}

impl MutationOrchestrator {
    pub fn new(
        api: Arc<dyn BoardApi>,
        cache: SnapshotCache,
        roles: ListRoles,
        offset: FixedOffset,
    ) -> Self {
        Self {
            api,
            cache,
            roles,
            offset,
        }
    }

    async fn snapshot(&self) -> Result<Arc<BoardSnapshot>, MutationError> {
        self.cache
            .get_snapshot(false)
            .await
            .map_err(MutationError::Snapshot)
    }

    /// Invalidate when anything may have been written remotely.
    fn settle<T>(&self, result: Result<T, MutationError>, wrote: bool) -> Result<T, MutationError> {
        let partial = result
            .as_ref()
            .err()
            .is_some_and(|e| e.created_card_id().is_some());
        if wrote || partial {
            self.cache.invalidate();
        }
        if let Err(err) = &result {
            warn!(error = %err, "board mutation failed");
        }
        result
    }

    // ── Card creation ────────────────────────────────────────────────

    /// Create a card, then set each field in order, then add the label and
    /// assignee.
    pub async fn create_annotated_card(&self, draft: CardDraft) -> Result<Card, MutationError> {
        let result = self.create_inner(&draft).await;
        let wrote = result.is_ok();
        self.settle(result, wrote)
    }

    async fn create_inner(&self, draft: &CardDraft) -> Result<Card, MutationError> {
        if draft.name.trim().is_empty() {
            return Err(MutationError::Invalid("card name is required".into()));
        }
        let snapshot = self.snapshot().await?;
        let board =
            snapshot
                .board_for_list(&draft.list_id)
                .ok_or_else(|| MutationError::UnknownList {
                    list_id: draft.list_id.clone(),
                })?;
        let writes = resolve_writes(board, &draft.fields, true)?;
        let assignee_id = non_empty(&draft.assignee).and_then(|name| {
            let member = board.members.iter().find(|m| m.full_name == name);
            if member.is_none() {
                warn!(assignee = name, "assignee is not a board member, skipping");
            }
            member.map(|m| m.id.clone())
        });

        let new_card = NewCard {
            name: draft.name.trim().to_string(),
            desc: draft.desc.clone(),
            due: draft.due,
            member_ids: draft.member_ids.clone(),
        };
        let card = self
            .api
            .create_card(&draft.list_id, &new_card)
            .await
            .map_err(|source| MutationError::Failed {
                step: MutationStep::CreateCard,
                source,
            })?;
        info!(card_id = %card.id, list_id = %draft.list_id, "card created");

        let partial = |step: MutationStep| {
            let card_id = card.id.clone();
            move |source: BoardApiError| MutationError::Partial {
                card_id,
                step,
                source,
            }
        };

        for (field, write) in &writes {
            self.api
                .set_custom_field(&card.id, write)
                .await
                .map_err(partial(MutationStep::SetField {
                    field: field.clone(),
                }))?;
        }
        if let Some(label_id) = non_empty(&draft.label_id) {
            self.api
                .add_label(&card.id, label_id)
                .await
                .map_err(partial(MutationStep::AddLabel {
                    label_id: label_id.to_string(),
                }))?;
        }
        if let Some(member_id) = assignee_id {
            self.api
                .add_member(&card.id, &member_id)
                .await
                .map_err(partial(MutationStep::AddMember {
                    member_id: member_id.clone(),
                }))?;
        }

        Ok(card)
    }

    // ── Planned range ────────────────────────────────────────────────

    /// Move or resize a card's planned range with one bulk field write.
    pub async fn adjust_planned_range(
        &self,
        card_id: &str,
        target: &str,
        edge: DragEdge,
        today: NaiveDate,
    ) -> Result<PlannedRange, MutationError> {
        let result = self.adjust_inner(card_id, target, edge, today).await;
        let wrote = result.is_ok();
        self.settle(result, wrote)
    }

    async fn adjust_inner(
        &self,
        card_id: &str,
        target: &str,
        edge: DragEdge,
        today: NaiveDate,
    ) -> Result<PlannedRange, MutationError> {
        let target_date =
            resolve_target(target, today).ok_or_else(|| MutationError::InvalidDate(target.into()))?;
        let snapshot = self.snapshot().await?;
        let (board, card) =
            snapshot
                .find_card(card_id)
                .ok_or_else(|| MutationError::UnknownCard {
                    card_id: card_id.to_string(),
                })?;

        let enhanced = EnhancedCard::from_card(board, card, self.offset);
        let current = enhanced
            .planned_start
            .map(|start| planned_range(start, enhanced.planned_end));
        let range = compute_range(current, target_date, edge).ok_or_else(|| {
            MutationError::NotPlanned {
                card_id: card_id.to_string(),
            }
        })?;

        let writes = [
            date_write(board, PLANNED_START, range.start)?,
            date_write(board, PLANNED_END, range.end)?,
        ];
        self.api
            .set_custom_fields(card_id, &writes)
            .await
            .map_err(|source| MutationError::Failed {
                step: MutationStep::SetPlannedRange,
                source,
            })?;
        info!(
            card_id,
            start = %range.start,
            end = %range.end,
            "planned range updated"
        );
        Ok(range)
    }

    // ── Single-card edits ────────────────────────────────────────────

    pub async fn archive_card(&self, card_id: &str) -> Result<Card, MutationError> {
        self.update_only(card_id, CardUpdate::archive()).await
    }

    pub async fn mark_complete(&self, card_id: &str) -> Result<Card, MutationError> {
        self.update_only(card_id, CardUpdate::complete()).await
    }

    async fn update_only(&self, card_id: &str, update: CardUpdate) -> Result<Card, MutationError> {
        let result = self
            .api
            .update_card(card_id, &update)
            .await
            .map_err(|source| MutationError::Failed {
                step: MutationStep::UpdateCard,
                source,
            });
        let wrote = result.is_ok();
        if wrote {
            info!(card_id, "card updated");
        }
        self.settle(result, wrote)
    }

    /// Apply property changes, then field values in order.
    pub async fn update_card(&self, card_id: &str, edit: CardEdit) -> Result<(), MutationError> {
        let mut wrote = false;
        let result = self.update_inner(card_id, &edit, &mut wrote).await;
        self.settle(result, wrote)
    }

    async fn update_inner(
        &self,
        card_id: &str,
        edit: &CardEdit,
        wrote: &mut bool,
    ) -> Result<(), MutationError> {
        if edit.update.is_empty() && edit.fields.is_empty() {
            return Err(MutationError::Invalid("nothing to update".into()));
        }

        let writes = if edit.fields.is_empty() {
            Vec::new()
        } else {
            let snapshot = self.snapshot().await?;
            let (board, _) =
                snapshot
                    .find_card(card_id)
                    .ok_or_else(|| MutationError::UnknownCard {
                        card_id: card_id.to_string(),
                    })?;
            resolve_writes(board, &edit.fields, false)?
        };

        if !edit.update.is_empty() {
            self.api
                .update_card(card_id, &edit.update)
                .await
                .map_err(|source| MutationError::Failed {
                    step: MutationStep::UpdateCard,
                    source,
                })?;
            *wrote = true;
        }

        for (field, write) in &writes {
            if let Err(source) = self.api.set_custom_field(card_id, write).await {
                let step = MutationStep::SetField {
                    field: field.clone(),
                };
                return Err(if *wrote {
                    MutationError::Partial {
                        card_id: card_id.to_string(),
                        step,
                        source,
                    }
                } else {
                    MutationError::Failed { step, source }
                });
            }
            *wrote = true;
        }

        info!(card_id, fields = writes.len(), "card edited");
        Ok(())
    }

    pub async fn add_label(&self, card_id: &str, label_id: &str) -> Result<(), MutationError> {
        let result = self
            .api
            .add_label(card_id, label_id)
            .await
            .map_err(|source| MutationError::Failed {
                step: MutationStep::AddLabel {
                    label_id: label_id.to_string(),
                },
                source,
            });
        let wrote = result.is_ok();
        self.settle(result, wrote)
    }

    pub async fn remove_label(&self, card_id: &str, label_id: &str) -> Result<(), MutationError> {
        let result = self
            .api
            .remove_label(card_id, label_id)
            .await
            .map_err(|source| MutationError::Failed {
                step: MutationStep::RemoveLabel {
                    label_id: label_id.to_string(),
                },
                source,
            });
        let wrote = result.is_ok();
        self.settle(result, wrote)
    }

    pub async fn assign_member(&self, card_id: &str, member_id: &str) -> Result<(), MutationError> {
        let result = self
            .api
            .add_member(card_id, member_id)
            .await
            .map_err(|source| MutationError::Failed {
                step: MutationStep::AddMember {
                    member_id: member_id.to_string(),
                },
                source,
            });
        let wrote = result.is_ok();
        self.settle(result, wrote)
    }

    // ── Dropdown options ─────────────────────────────────────────────

    /// Make sure `text` is an option of a dropdown field. Returns whether an
    /// option was added. Non-dropdown fields accept any text.
    pub async fn ensure_field_option(
        &self,
        kind: BoardKind,
        field: &str,
        text: &str,
    ) -> Result<bool, MutationError> {
        let snapshot = self.snapshot().await?;
        let board = snapshot
            .board(kind)
            .ok_or_else(|| MutationError::UnknownBoard {
                board: kind.display_name().to_string(),
            })?;
        let result = self.ensure_option_on(board, field, text).await;
        let wrote = matches!(result, Ok(true));
        self.settle(result, wrote)
    }

    async fn ensure_option_on(
        &self,
        board: &SubBoard,
        field: &str,
        text: &str,
    ) -> Result<bool, MutationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MutationError::Invalid(format!("empty value for '{}'", field)));
        }
        let definition = board.field(field).ok_or_else(|| MutationError::UnknownField {
            field: field.to_string(),
        })?;
        if definition.field_type != FieldType::List
            || fields::find_option_id(definition, text).is_some()
        {
            return Ok(false);
        }
        self.api
            .add_custom_field_option(&definition.id, text)
            .await
            .map_err(|source| MutationError::Failed {
                step: MutationStep::AddFieldOption {
                    field: field.to_string(),
                },
                source,
            })?;
        info!(field, option = text, board = board.kind.tag(), "dropdown option added");
        Ok(true)
    }

    // ── Best-effort maintenance ──────────────────────────────────────

    /// Give every open card that has a due date but no planned start a
    /// single-day planned range on its due date. Per-card failures are
    /// logged and skipped.
    pub async fn auto_populate_planned_dates(&self) -> Result<MaintenanceReport, MutationError> {
        let snapshot = self.snapshot().await?;
        let mut report = MaintenanceReport::default();

        for board in snapshot.boards() {
            if board.field(PLANNED_START).is_none() || board.field(PLANNED_END).is_none() {
                continue;
            }
            for card in &board.cards {
                let enhanced = EnhancedCard::from_card(board, card, self.offset);
                if enhanced.is_completed() || enhanced.planned_start.is_some() {
                    continue;
                }
                let Some(due) = enhanced.due_date else {
                    continue;
                };
                let writes = [
                    date_write(board, PLANNED_START, due)?,
                    date_write(board, PLANNED_END, due)?,
                ];
                match self.api.set_custom_fields(&card.id, &writes).await {
                    Ok(()) => report.updated.push(card.id.clone()),
                    Err(err) => {
                        warn!(card_id = %card.id, error = %err, "auto-plan skipped card");
                        report.failed.push(MaintenanceFailure {
                            card_id: card.id.clone(),
                            error: err.to_string(),
                        });
                    }
                }
            }
        }

        if !report.updated.is_empty() {
            self.cache.invalidate();
        }
        info!(
            updated = report.updated.len(),
            failed = report.failed.len(),
            "auto-plan finished"
        );
        Ok(report)
    }

    /// Archive completed cards whose due date is [`AUTO_ARCHIVE_AFTER_DAYS`]
    /// or more days before `today`.
    pub async fn auto_archive_completed(
        &self,
        today: NaiveDate,
    ) -> Result<MaintenanceReport, MutationError> {
        let snapshot = self.snapshot().await?;
        let cutoff = today - Duration::days(AUTO_ARCHIVE_AFTER_DAYS);
        let mut report = MaintenanceReport::default();

        for board in snapshot.boards() {
            for card in &board.cards {
                if !card.due_complete || card.closed {
                    continue;
                }
                let Some(due) = card.due.map(|d| local_due_date(d, self.offset))
                else {
                    continue;
                };
                if due > cutoff {
                    continue;
                }
                match self.api.update_card(&card.id, &CardUpdate::archive()).await {
                    Ok(_) => report.updated.push(card.id.clone()),
                    Err(err) => {
                        warn!(card_id = %card.id, error = %err, "auto-archive skipped card");
                        report.failed.push(MaintenanceFailure {
                            card_id: card.id.clone(),
                            error: err.to_string(),
                        });
                    }
                }
            }
        }

        if !report.updated.is_empty() {
            self.cache.invalidate();
        }
        info!(
            archived = report.updated.len(),
            failed = report.failed.len(),
            "auto-archive finished"
        );
        Ok(report)
    }

    // ── Project wizard ───────────────────────────────────────────────

    /// Store the project, create one deliverable card per named deliverable
    /// with Client and Project set, then store one milestone row per named
    /// milestone. Blank names are skipped.
    pub async fn create_project(
        &self,
        wizard: ProjectWizard,
        store: &dyn ProjectStore,
    ) -> Result<ProjectCreated, MutationError> {
        let client = wizard.client_name.trim().to_string();
        let project_type = wizard.project_type.trim().to_string();
        if client.is_empty() || project_type.is_empty() {
            return Err(MutationError::Invalid(
                "client name and project type are required".into(),
            ));
        }

        let snapshot = self.snapshot().await?;
        let account = &snapshot.account_management;
        let list_id = account
            .list_by_name(&self.roles.deliverables)
            .map(|l| l.id.clone())
            .ok_or_else(|| MutationError::UnknownList {
                list_id: self.roles.deliverables.clone(),
            })?;

        let mut options_added = false;
        for (field, value) in [(fields::CLIENT, &client), (fields::PROJECT, &project_type)] {
            options_added |= self.ensure_option_on(account, field, value).await?;
        }
        drop(snapshot);
        if options_added {
            self.cache.invalidate();
        }

        let project_id = store
            .insert_project(NewProject {
                name: project_type.clone(),
                client_name: client.clone(),
                project_type: project_type.clone(),
                description: wizard.description.clone().unwrap_or_default(),
                start_date: wizard.start_date,
                end_date: wizard.end_date,
            })
            .await
            .map_err(MutationError::Store)?;
        info!(project_id, client = %client, project = %project_type, "project stored");

        let mut card_ids = Vec::new();
        for deliverable in wizard.deliverables.iter().filter(|d| !d.name.trim().is_empty()) {
            let draft = CardDraft {
                list_id: list_id.clone(),
                name: deliverable.name.clone(),
                desc: deliverable.description.clone(),
                due: deliverable
                    .due_date
                    .and_then(|d| local_noon_utc(d, self.offset)),
                fields: vec![
                    FieldAssignment::new(fields::CLIENT, client.clone()),
                    FieldAssignment::new(fields::PROJECT, project_type.clone()),
                ],
                ..CardDraft::default()
            };
            let created = self.create_inner(&draft).await;
            match self.settle(created, true) {
                Ok(card) => card_ids.push(card.id),
                Err(err) => {
                    let step = err.failed_step().cloned().unwrap_or(MutationStep::CreateCard);
                    card_ids.extend(err.created_card_id().map(str::to_string));
                    return Err(MutationError::ProjectPartial {
                        project_id,
                        card_ids,
                        milestone_ids: Vec::new(),
                        step,
                        source: Box::new(err),
                    });
                }
            }
        }

        let mut milestone_ids = Vec::new();
        for milestone in wizard.milestones.iter().filter(|m| !m.name.trim().is_empty()) {
            let name = milestone.name.trim().to_string();
            match store
                .insert_milestone(project_id, name.clone(), milestone.due_date)
                .await
            {
                Ok(id) => milestone_ids.push(id),
                Err(err) => {
                    warn!(project_id, milestone = %name, error = %err, "milestone insert failed");
                    return Err(MutationError::ProjectPartial {
                        project_id,
                        card_ids,
                        milestone_ids,
                        step: MutationStep::StoreMilestone { name },
                        source: Box::new(MutationError::Store(err)),
                    });
                }
            }
        }

        info!(
            project_id,
            cards = card_ids.len(),
            milestones = milestone_ids.len(),
            "project wizard finished"
        );
        Ok(ProjectCreated {
            project_id,
            card_ids,
            milestone_ids,
        })
    }
}
