use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use chrono::{FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{error, info};

use super::db::DbHandle;
use super::models::Session;
use super::ws::{DashboardEvent, broadcast_event};
use crate::board::cache::SnapshotCache;
use crate::board::client::{BoardApi, Credentials};
use crate::board::dates::{is_supported, local_today};
use crate::board::milestones::{aggregate_milestones, merge_scheduled, projects_for_client};
use crate::board::mutations::{
    CardDraft, CardEdit, DragEdge, MaintenanceReport, MutationOrchestrator, ProjectWizard,
};
use crate::board::types::{BoardKind, BoardSnapshot};
use crate::board::views::{
    self, ClientGroup, FilterOptions, ListRoles, ProjectDeliverables, SortDirection, SortField,
    TaskFilter, TaskStatus, UserIdentity,
};
use crate::board::weekly::build_weekly;
use crate::errors::{BoardApiError, DashboardError, ErrorKind, MutationError, MutationStep};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub api: Arc<dyn BoardApi>,
    pub credentials: Credentials,
    /// Token restored on logout; the configured one, if any.
    pub default_token: Option<String>,
    pub cache: SnapshotCache,
    pub orchestrator: MutationOrchestrator,
    pub db: DbHandle,
    pub ws_tx: broadcast::Sender<String>,
    pub roles: ListRoles,
    pub offset: FixedOffset,
    pub session: Mutex<Option<Session>>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        api: Arc<dyn BoardApi>,
        credentials: Credentials,
        cache: SnapshotCache,
        db: DbHandle,
        roles: ListRoles,
        offset: FixedOffset,
    ) -> Self {
        let (ws_tx, _) = broadcast::channel(256);
        let orchestrator =
            MutationOrchestrator::new(api.clone(), cache.clone(), roles.clone(), offset);
        Self {
            default_token: credentials.token(),
            api,
            credentials,
            cache,
            orchestrator,
            db,
            ws_tx,
            roles,
            offset,
            session: Mutex::new(None),
        }
    }

    /// The requested day, or today in the configured offset.
    fn today(&self, requested: Option<NaiveDate>) -> Result<NaiveDate, ApiError> {
        match requested {
            Some(date) if !is_supported(date) => Err(DashboardError::BadRequest(format!(
                "date {} is outside the supported range",
                date
            ))
            .into()),
            Some(date) => Ok(date),
            None => Ok(local_today(self.offset)),
        }
    }

    async fn snapshot(&self) -> Result<Arc<BoardSnapshot>, ApiError> {
        Ok(self.cache.get_snapshot(false).await?)
    }

    fn current_session(&self) -> Result<Option<Session>, ApiError> {
        self.session
            .lock()
            .map(|s| s.clone())
            .map_err(|_| ApiError::internal("Lock poisoned"))
    }

    fn set_session(&self, session: Option<Session>) -> Result<(), ApiError> {
        *self
            .session
            .lock()
            .map_err(|_| ApiError::internal("Lock poisoned"))? = session;
        Ok(())
    }

    fn broadcast(&self, event: DashboardEvent) {
        broadcast_event(&self.ws_tx, &event);
    }
}

// ── Error responses ───────────────────────────────────────────────────

/// Structured error body: `{kind, message, cardId?, failedStep?, projectId?, cardIds?}`.
#[derive(Debug)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    pub card_id: Option<String>,
    pub failed_step: Option<MutationStep>,
    pub project_id: Option<i64>,
    pub card_ids: Option<Vec<String>>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            card_id: None,
            failed_step: None,
            project_id: None,
            card_ids: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn status(&self) -> StatusCode {
        match self.kind {
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::NetworkError => StatusCode::BAD_GATEWAY,
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BoardApiError> for ApiError {
    fn from(err: BoardApiError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<MutationError> for ApiError {
    fn from(err: MutationError) -> Self {
        let failed_step = err.failed_step().cloned();
        let card_id = err.created_card_id().map(str::to_string);
        let (project_id, card_ids) = match &err {
            MutationError::ProjectPartial {
                project_id,
                card_ids,
                ..
            } => (Some(*project_id), Some(card_ids.clone())),
            _ => (None, None),
        };
        if err.kind() == ErrorKind::Internal {
            error!(error = ?err, "mutation failed");
        }
        Self {
            kind: err.kind(),
            message: err.to_string(),
            card_id,
            failed_step,
            project_id,
            card_ids,
        }
    }
}

impl From<DashboardError> for ApiError {
    fn from(err: DashboardError) -> Self {
        match err {
            DashboardError::Board(e) => e.into(),
            DashboardError::Mutation(e) => e.into(),
            other => {
                if other.kind() == ErrorKind::Internal {
                    error!(error = ?other, "request failed");
                }
                Self::new(other.kind(), other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = serde_json::json!({
            "kind": self.kind,
            "message": self.message,
        });
        if let Some(card_id) = self.card_id {
            body["cardId"] = serde_json::Value::String(card_id);
        }
        if let Some(step) = self.failed_step
            && let Ok(step) = serde_json::to_value(step)
        {
            body["failedStep"] = step;
        }
        if let Some(project_id) = self.project_id {
            body["projectId"] = project_id.into();
        }
        if let Some(card_ids) = self.card_ids {
            body["cardIds"] = card_ids.into();
        }
        (status, Json(body)).into_response()
    }
}

fn db_error(err: anyhow::Error) -> ApiError {
    DashboardError::Database(err).into()
}

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct TokenLoginRequest {
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshQuery {
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardAccessQuery {
    pub board_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TodayQuery {
    pub today: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct MilestoneQuery {
    pub client: String,
    pub project: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TasksQuery {
    pub search: Option<String>,
    pub client: Option<String>,
    pub project: Option<String>,
    pub list_name: Option<String>,
    pub status: Option<TaskStatus>,
    pub sort: Option<SortField>,
    pub direction: Option<SortDirection>,
}

impl TasksQuery {
    fn filter(&self) -> TaskFilter {
        TaskFilter {
            search: self.search.clone(),
            client: self.client.clone(),
            project: self.project.clone(),
            list_name: self.list_name.clone(),
            status: self.status.unwrap_or_default(),
        }
    }

    fn apply(&self, cards: Vec<views::EnhancedCard>, roles: &ListRoles) -> Vec<views::EnhancedCard> {
        let mut cards = self.filter().apply(cards);
        if let Some(field) = self.sort {
            views::sort_cards(&mut cards, field, self.direction.unwrap_or_default(), roles);
        }
        cards
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedRangeRequest {
    /// Day name in the current week or `YYYY-MM-DD`.
    pub target: String,
    pub edge: DragEdge,
    pub today: Option<NaiveDate>,
}

#[derive(Deserialize)]
pub struct FieldOptionRequest {
    pub board: BoardKind,
    pub field: String,
    pub value: String,
}

// ── Response types ────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: &'static str,
    pub snapshot_fresh: bool,
    pub fetched_at_millis: Option<i64>,
    pub signed_in: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDetail {
    #[serde(flatten)]
    pub group: ClientGroup,
    pub upcoming: Vec<ProjectDeliverables>,
    pub projects: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
    /// Dropdown options defined on the boards.
    pub field_options: FilterOptions,
    /// Values actually used on cards.
    pub card_values: FilterOptions,
}

#[derive(Serialize)]
pub struct OptionResult {
    pub added: bool,
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/token-login", post(token_login))
        .route("/api/auth/me", get(current_user))
        .route("/api/auth/logout", post(logout))
        .route("/api/boards/snapshot", get(get_snapshot))
        .route("/api/boards/access", get(check_board_access))
        .route("/api/boards/{board}/cards", get(list_board_cards))
        .route("/api/clients", get(list_clients))
        .route("/api/clients/{name}", get(get_client))
        .route("/api/weekly", get(get_weekly))
        .route("/api/tasks/unplanned", get(list_unplanned))
        .route("/api/tasks/assigned", get(list_assigned))
        .route("/api/milestones", get(list_milestones))
        .route("/api/filters", get(get_filters))
        .route("/api/cards", post(create_card))
        .route("/api/cards/{id}", patch(update_card))
        .route("/api/cards/{id}/archive", post(archive_card))
        .route("/api/cards/{id}/complete", post(complete_card))
        .route("/api/cards/{id}/planned-range", patch(adjust_planned_range))
        .route(
            "/api/cards/{id}/labels/{label_id}",
            post(add_label).delete(remove_label),
        )
        .route("/api/cards/{id}/members/{member_id}", post(assign_member))
        .route("/api/fields/options", post(ensure_field_option))
        .route("/api/projects", get(list_projects).post(create_project))
        .route("/api/projects/{id}/schedule", get(get_project_schedule))
        .route("/api/cache/invalidate", post(invalidate_cache))
        .route("/api/maintenance/auto-plan", post(auto_plan))
        .route("/api/maintenance/auto-archive", post(auto_archive))
}

// ── Health & auth ─────────────────────────────────────────────────────

async fn health_check(State(state): State<SharedState>) -> Result<Json<HealthStatus>, ApiError> {
    Ok(Json(HealthStatus {
        status: "ok",
        snapshot_fresh: state.cache.is_fresh(),
        fetched_at_millis: state.cache.fetched_at_millis(),
        signed_in: state.current_session()?.is_some(),
    }))
}

async fn token_login(
    State(state): State<SharedState>,
    Json(req): Json<TokenLoginRequest>,
) -> Result<Json<Session>, ApiError> {
    let token = req.token.trim().to_string();
    if token.is_empty() {
        return Err(ApiError::bad_request("Token is required"));
    }

    let member = state.api.member_for_token(&token).await?;
    state.credentials.set(&token);

    let session = Session {
        id: member.id,
        full_name: member.full_name,
        username: member.username,
        email: member.email,
        token,
    };
    state.set_session(Some(session.clone()))?;
    state.cache.invalidate();
    info!(username = %session.username, "signed in");
    Ok(Json(session))
}

async fn current_user(State(state): State<SharedState>) -> Result<Json<Session>, ApiError> {
    state
        .current_session()?
        .map(Json)
        .ok_or_else(|| DashboardError::NotAuthenticated.into())
}

async fn logout(State(state): State<SharedState>) -> Result<StatusCode, ApiError> {
    state.set_session(None)?;
    match &state.default_token {
        Some(token) => state.credentials.set(token),
        None => state.credentials.clear(),
    }
    state.cache.invalidate();
    info!("signed out");
    Ok(StatusCode::NO_CONTENT)
}

// ── Board reads ───────────────────────────────────────────────────────

async fn get_snapshot(
    State(state): State<SharedState>,
    Query(query): Query<RefreshQuery>,
) -> Result<Json<BoardSnapshot>, ApiError> {
    let snapshot = state.cache.get_snapshot(query.refresh).await?;
    Ok(Json((*snapshot).clone()))
}

async fn check_board_access(
    State(state): State<SharedState>,
    Query(query): Query<BoardAccessQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state.api.check_board_access(query.board_id.trim()).await?;
    Ok(Json(summary))
}

async fn list_board_cards(
    State(state): State<SharedState>,
    Path(kind): Path<BoardKind>,
    Query(query): Query<TasksQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.snapshot().await?;
    let board = snapshot
        .board(kind)
        .ok_or_else(|| ApiError::not_found(format!("{} board is not configured", kind.display_name())))?;
    let cards = views::board_cards(board, state.offset);
    Ok(Json(query.apply(cards, &state.roles)))
}

async fn list_clients(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.snapshot().await?;
    let groups = views::group_clients(&snapshot.account_management, &state.roles, state.offset);
    Ok(Json(groups))
}

async fn get_client(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Query(query): Query<TodayQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.snapshot().await?;
    let group = views::client_detail(
        &snapshot.account_management,
        &state.roles,
        &name,
        state.offset,
    );
    let upcoming = views::upcoming_by_project(&group, state.today(query.today)?);
    let projects = projects_for_client(&snapshot, &name);
    Ok(Json(ClientDetail {
        group,
        upcoming,
        projects,
    }))
}

async fn get_weekly(
    State(state): State<SharedState>,
    Query(query): Query<TodayQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.snapshot().await?;
    Ok(Json(build_weekly(
        &snapshot,
        state.today(query.today)?,
        state.offset,
    )))
}

async fn list_unplanned(
    State(state): State<SharedState>,
    Query(query): Query<TodayQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.snapshot().await?;
    Ok(Json(views::unplanned_tasks(
        &snapshot,
        state.today(query.today)?,
        state.offset,
    )))
}

async fn list_assigned(
    State(state): State<SharedState>,
    Query(query): Query<TasksQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .current_session()?
        .ok_or(DashboardError::NotAuthenticated)?;
    let user = UserIdentity {
        id: session.id,
        full_name: session.full_name,
        username: session.username,
    };
    let snapshot = state.snapshot().await?;
    let cards = views::assigned_tasks(&snapshot, &user, &state.roles, state.offset);
    Ok(Json(query.apply(cards, &state.roles)))
}

async fn list_milestones(
    State(state): State<SharedState>,
    Query(query): Query<MilestoneQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.snapshot().await?;
    let milestones = aggregate_milestones(&snapshot, &query.client, &query.project);

    let (client, project) = (query.client.clone(), query.project.clone());
    let scheduled = state
        .db
        .call(move |db| db.milestone_names(&client, &project))
        .await
        .map_err(db_error)?;
    Ok(Json(merge_scheduled(
        milestones,
        scheduled.iter().map(String::as_str),
    )))
}

async fn get_filters(State(state): State<SharedState>) -> Result<Json<Filters>, ApiError> {
    let snapshot = state.snapshot().await?;
    let cards: Vec<_> = snapshot
        .boards()
        .flat_map(|board| views::board_cards(board, state.offset))
        .collect();
    Ok(Json(Filters {
        field_options: views::field_choices(&snapshot),
        card_values: views::filter_options(&cards),
    }))
}

// ── Card mutations ────────────────────────────────────────────────────

async fn create_card(
    State(state): State<SharedState>,
    Json(draft): Json<CardDraft>,
) -> Result<impl IntoResponse, ApiError> {
    let card = state.orchestrator.create_annotated_card(draft).await?;
    state.broadcast(DashboardEvent::CardCreated {
        card_id: card.id.clone(),
        name: card.name.clone(),
    });
    Ok((StatusCode::CREATED, Json(card)))
}

async fn update_card(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(edit): Json<CardEdit>,
) -> Result<StatusCode, ApiError> {
    state.orchestrator.update_card(&id, edit).await?;
    state.broadcast(DashboardEvent::CardUpdated { card_id: id });
    Ok(StatusCode::NO_CONTENT)
}

async fn archive_card(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let card = state.orchestrator.archive_card(&id).await?;
    state.broadcast(DashboardEvent::CardArchived { card_id: id });
    Ok(Json(card))
}

async fn complete_card(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let card = state.orchestrator.mark_complete(&id).await?;
    state.broadcast(DashboardEvent::CardUpdated { card_id: id });
    Ok(Json(card))
}

async fn adjust_planned_range(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<PlannedRangeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let today = state.today(req.today)?;
    let range = state
        .orchestrator
        .adjust_planned_range(&id, &req.target, req.edge, today)
        .await?;
    state.broadcast(DashboardEvent::PlannedRangeChanged {
        card_id: id,
        start: range.start,
        end: range.end,
    });
    Ok(Json(range))
}

async fn add_label(
    State(state): State<SharedState>,
    Path((id, label_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state.orchestrator.add_label(&id, &label_id).await?;
    state.broadcast(DashboardEvent::CardUpdated { card_id: id });
    Ok(StatusCode::NO_CONTENT)
}

async fn remove_label(
    State(state): State<SharedState>,
    Path((id, label_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state.orchestrator.remove_label(&id, &label_id).await?;
    state.broadcast(DashboardEvent::CardUpdated { card_id: id });
    Ok(StatusCode::NO_CONTENT)
}

async fn assign_member(
    State(state): State<SharedState>,
    Path((id, member_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state.orchestrator.assign_member(&id, &member_id).await?;
    state.broadcast(DashboardEvent::CardUpdated { card_id: id });
    Ok(StatusCode::NO_CONTENT)
}

async fn ensure_field_option(
    State(state): State<SharedState>,
    Json(req): Json<FieldOptionRequest>,
) -> Result<Json<OptionResult>, ApiError> {
    let added = state
        .orchestrator
        .ensure_field_option(req.board, &req.field, &req.value)
        .await?;
    Ok(Json(OptionResult { added }))
}

// ── Projects ──────────────────────────────────────────────────────────

async fn list_projects(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let projects = state
        .db
        .call(|db| db.list_projects())
        .await
        .map_err(db_error)?;
    Ok(Json(projects))
}

async fn create_project(
    State(state): State<SharedState>,
    Json(wizard): Json<ProjectWizard>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.orchestrator.create_project(wizard, &state.db).await?;
    state.broadcast(DashboardEvent::ProjectCreated {
        project_id: created.project_id,
        card_ids: created.card_ids.clone(),
    });
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_project_schedule(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let items = state
        .db
        .call(move |db| match db.get_project(id)? {
            Some(_) => db.list_schedule(id).map(Some),
            None => Ok(None),
        })
        .await
        .map_err(db_error)?
        .ok_or(DashboardError::ProjectNotFound { id })?;
    Ok(Json(items))
}

// ── Cache & maintenance ───────────────────────────────────────────────

async fn invalidate_cache(State(state): State<SharedState>) -> StatusCode {
    state.cache.invalidate();
    StatusCode::NO_CONTENT
}

fn report_finished(state: &AppState, task: &str, report: &MaintenanceReport) {
    state.broadcast(DashboardEvent::MaintenanceFinished {
        task: task.to_string(),
        updated: report.updated.len(),
        failed: report.failed.len(),
    });
}

async fn auto_plan(State(state): State<SharedState>) -> Result<Json<MaintenanceReport>, ApiError> {
    let report = state.orchestrator.auto_populate_planned_dates().await?;
    report_finished(&state, "auto-plan", &report);
    Ok(Json(report))
}

async fn auto_archive(
    State(state): State<SharedState>,
    Query(query): Query<TodayQuery>,
) -> Result<Json<MaintenanceReport>, ApiError> {
    let report = state
        .orchestrator
        .auto_archive_completed(state.today(query.today)?)
        .await?;
    report_finished(&state, "auto-archive", &report);
    Ok(Json(report))
}
