use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    OnHold,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::OnHold => "on_hold",
        }
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(Self::NotStarted),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "on_hold" => Ok(Self::OnHold),
            _ => Err(format!("Invalid project status: {}", s)),
        }
    }
}

/// A wizard-created project row.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub client_name: String,
    pub project_type: String,
    pub description: String,
    pub status: ProjectStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleItemType {
    Milestone,
}

impl ScheduleItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Milestone => "milestone",
        }
    }
}

impl FromStr for ScheduleItemType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "milestone" => Ok(Self::Milestone),
            _ => Err(format!("Invalid schedule item type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleItem {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    pub item_type: ScheduleItemType,
    pub end_date: Option<NaiveDate>,
    pub percent_complete: u32,
    pub created_at: String,
}

/// The logged-in user. The token is never serialized.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub full_name: String,
    pub username: String,
    pub email: Option<String>,
    #[serde(skip)]
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_status_round_trips_through_str() {
        for status in [
            ProjectStatus::NotStarted,
            ProjectStatus::InProgress,
            ProjectStatus::Completed,
            ProjectStatus::OnHold,
        ] {
            assert_eq!(status.as_str().parse::<ProjectStatus>(), Ok(status));
        }
        assert!("paused".parse::<ProjectStatus>().is_err());
    }

    #[test]
    fn test_session_hides_token() {
        let session = Session {
            id: "m1".into(),
            full_name: "Dana Reyes".into(),
            username: "dana".into(),
            email: None,
            token: "secret".into(),
        };
        let json = serde_json::to_string(&session).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("fullName"));
    }
}
