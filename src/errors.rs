//! Typed error hierarchy for the dashboard.
//!
//! Three top-level enums cover the three layers:
//! - `BoardApiError`: remote task-board calls (and snapshot fetches built on them)
//! - `MutationError`: multi-step write sequences that may leave partial state
//! - `DashboardError`: everything the HTTP layer can surface

use serde::Serialize;
use thiserror::Error;

/// Errors from the remote task-board API.
///
/// Every variant is recoverable by a retry or a user action; none of them
/// should take the process down.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BoardApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Rate limited by the board API, wait a moment and try again")]
    RateLimited,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected response from board API: {0}")]
    Decode(String),
}

impl BoardApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::RateLimited => ErrorKind::RateLimited,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Network(_) | Self::Decode(_) => ErrorKind::NetworkError,
        }
    }
}

/// The step of a multi-step mutation that failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum MutationStep {
    CreateCard,
    UpdateCard,
    SetField { field: String },
    AddLabel { label_id: String },
    RemoveLabel { label_id: String },
    AddMember { member_id: String },
    AddFieldOption { field: String },
    SetPlannedRange,
    StoreMilestone { name: String },
}

impl std::fmt::Display for MutationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateCard => write!(f, "create card"),
            Self::UpdateCard => write!(f, "update card"),
            Self::SetField { field } => write!(f, "set field '{}'", field),
            Self::AddLabel { label_id } => write!(f, "add label {}", label_id),
            Self::RemoveLabel { label_id } => write!(f, "remove label {}", label_id),
            Self::AddMember { member_id } => write!(f, "add member {}", member_id),
            Self::AddFieldOption { field } => write!(f, "add option to field '{}'", field),
            Self::SetPlannedRange => write!(f, "set planned date range"),
            Self::StoreMilestone { name } => write!(f, "store milestone '{}'", name),
        }
    }
}

/// Errors from the mutation orchestrator.
#[derive(Debug, Error)]
pub enum MutationError {
    /// Nothing was written remotely.
    #[error("{step} failed: {source}")]
    Failed {
        step: MutationStep,
        #[source]
        source: BoardApiError,
    },

    /// The card exists remotely but one of the follow-up writes failed.
    /// The card is left in place for the caller to retry the failed step.
    #[error("Card {card_id} was left partially written: {step} failed: {source}")]
    Partial {
        card_id: String,
        step: MutationStep,
        #[source]
        source: BoardApiError,
    },

    /// The project row is stored but a later wizard step failed. `card_ids`
    /// lists every deliverable card that exists remotely, including one left
    /// partially written by the failed step.
    #[error("Project {project_id} was stored but {step} failed: {source}")]
    ProjectPartial {
        project_id: i64,
        card_ids: Vec<String>,
        milestone_ids: Vec<i64>,
        step: MutationStep,
        #[source]
        source: Box<MutationError>,
    },

    #[error("Custom field '{field}' not found on board")]
    UnknownField { field: String },

    #[error("Option '{value}' not found for custom field '{field}'")]
    UnknownOption { field: String, value: String },

    #[error("List {list_id} not found on any configured board")]
    UnknownList { list_id: String },

    #[error("Card {card_id} not found on any configured board")]
    UnknownCard { card_id: String },

    #[error("{board} board is not configured")]
    UnknownBoard { board: String },

    #[error("Card {card_id} has no planned start date")]
    NotPlanned { card_id: String },

    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Failed to load board snapshot: {0}")]
    Snapshot(#[source] BoardApiError),

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Project store error: {0}")]
    Store(#[source] anyhow::Error),
}

impl MutationError {
    /// Id of a card that was created before the failure, if any.
    pub fn created_card_id(&self) -> Option<&str> {
        match self {
            Self::Partial { card_id, .. } => Some(card_id),
            Self::ProjectPartial { source, .. } => source.created_card_id(),
            _ => None,
        }
    }

    /// The step that failed, when the error came from a write sequence.
    pub fn failed_step(&self) -> Option<&MutationStep> {
        match self {
            Self::Failed { step, .. }
            | Self::Partial { step, .. }
            | Self::ProjectPartial { step, .. } => Some(step),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Failed { source, .. }
            | Self::Partial { source, .. }
            | Self::Snapshot(source) => source.kind(),
            Self::ProjectPartial { source, .. } => source.kind(),
            Self::UnknownField { .. }
            | Self::UnknownOption { .. }
            | Self::UnknownList { .. }
            | Self::UnknownCard { .. }
            | Self::UnknownBoard { .. } => ErrorKind::NotFound,
            Self::NotPlanned { .. } | Self::InvalidDate(_) | Self::Invalid(_) => {
                ErrorKind::BadRequest
            }
            Self::Store(_) => ErrorKind::Internal,
        }
    }
}

/// Coarse error category exposed at the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthorized,
    RateLimited,
    NotFound,
    NetworkError,
    BadRequest,
    Internal,
}

/// Errors surfaced by the dashboard HTTP layer.
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error(transparent)]
    Board(#[from] BoardApiError),

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error("Not signed in")]
    NotAuthenticated,

    #[error("Project {id} not found")]
    ProjectNotFound { id: i64 },

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl DashboardError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Board(e) => e.kind(),
            Self::Mutation(e) => e.kind(),
            Self::NotAuthenticated => ErrorKind::Unauthorized,
            Self::ProjectNotFound { .. } => ErrorKind::NotFound,
            Self::BadRequest(_) => ErrorKind::BadRequest,
            Self::Database(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_api_error_kinds() {
        assert_eq!(
            BoardApiError::Unauthorized("expired".into()).kind(),
            ErrorKind::Unauthorized
        );
        assert_eq!(BoardApiError::RateLimited.kind(), ErrorKind::RateLimited);
        assert_eq!(
            BoardApiError::NotFound("card abc".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            BoardApiError::Network("reset".into()).kind(),
            ErrorKind::NetworkError
        );
    }

    #[test]
    fn test_partial_failure_carries_card_id_and_step() {
        let err = MutationError::Partial {
            card_id: "card-1".to_string(),
            step: MutationStep::SetField {
                field: "Project".to_string(),
            },
            source: BoardApiError::RateLimited,
        };
        assert_eq!(err.created_card_id(), Some("card-1"));
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        let msg = err.to_string();
        assert!(msg.contains("card-1"));
        assert!(msg.contains("Project"));
    }

    #[test]
    fn test_partial_message_fits_existing_cards() {
        let err = MutationError::Partial {
            card_id: "card-9".to_string(),
            step: MutationStep::UpdateCard,
            source: BoardApiError::Network("reset".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("card-9 was left partially written"));
        assert!(!msg.contains("created"));
    }

    #[test]
    fn test_project_partial_delegates_to_inner_error() {
        let err = MutationError::ProjectPartial {
            project_id: 7,
            card_ids: vec!["c1".to_string(), "c2".to_string()],
            milestone_ids: vec![],
            step: MutationStep::SetField {
                field: "Project".to_string(),
            },
            source: Box::new(MutationError::Partial {
                card_id: "c2".to_string(),
                step: MutationStep::SetField {
                    field: "Project".to_string(),
                },
                source: BoardApiError::RateLimited,
            }),
        };
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.created_card_id(), Some("c2"));
        assert_eq!(
            err.failed_step(),
            Some(&MutationStep::SetField {
                field: "Project".to_string()
            })
        );
        assert!(err.to_string().contains("Project 7 was stored"));
    }

    #[test]
    fn test_failed_before_create_has_no_card_id() {
        let err = MutationError::Failed {
            step: MutationStep::CreateCard,
            source: BoardApiError::Unauthorized("bad token".into()),
        };
        assert!(err.created_card_id().is_none());
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn test_mutation_step_serializes_with_tag() {
        let step = MutationStep::SetField {
            field: "Client".to_string(),
        };
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["step"], "set_field");
        assert_eq!(json["field"], "Client");
    }

    #[test]
    fn test_dashboard_error_converts_from_board_error() {
        let err: DashboardError = BoardApiError::NotFound("list".into()).into();
        assert!(matches!(err, DashboardError::Board(BoardApiError::NotFound(_))));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&BoardApiError::RateLimited);
        assert_std_error(&MutationError::InvalidDate("x".into()));
        assert_std_error(&DashboardError::NotAuthenticated);
    }
}
